//! Per-port state machine, sequencing a [`Transport`] through listen,
//! receive, process, reply and wait-for-send.
//!
//! ```text
//!             +-----------+  arm receive   +-----------+
//!   start --> | ToListen  | -------------> | Listening | <-+ no frame
//!             +-----------+                +-----------+ --+
//!                   ^                            | frame ready
//!                   |                            v
//!   +--------------+         +-----------+  +-----------+
//!   | WaitComplete | <-- Tx  | TxPrepare | <-| RxProcess |
//!   +--------------+         +-----------+  +-----------+
//!       |      ^                   |  empty reply
//!       +------+ send busy         +---------------> ToListen
//! ```
//!
//! The state machine is advanced one step per call to `tick()`, which never
//! blocks: each state either completes immediately or waits for a flag set
//! by an interrupt handler, checked again on the next tick.  Call `tick()`
//! at a fixed period ([`DEFAULT_POLL_PERIOD_MS`] by default).
//!
//! - [`PortStateMachine`] - for a fixed-period task or main loop
//! - [`AsyncPort`] - for an async executor (`async` feature)
//!
//! What is done with each frame is up to the application's
//! [`FrameHandler`] (or [`AsyncFrameHandler`]).  [`Echo`] sends every frame
//! straight back.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[cfg(feature = "async")]
pub mod futures;
pub mod sync;

#[cfg(feature = "async")]
pub use futures::{AsyncDelay, AsyncFrameHandler, AsyncPort};
pub use sync::PortStateMachine;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::transport::{Frame, Transport};
use crate::uart::Uart;
use crate::{Error, Result};

/// Poll period, in milliseconds, unless configured otherwise.
pub const DEFAULT_POLL_PERIOD_MS: u32 = 5;

/// Port state machine states.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// Arm a receive, if none is armed and no frame is pending
    #[default]
    ToListen = 0,
    /// Wait for a frame
    Listening = 1,
    /// Hand the frame to the application
    RxProcess = 2,
    /// Stage the reply
    TxPrepare = 3,
    /// Start sending the reply
    Tx = 4,
    /// Wait for the reply to finish sending
    WaitComplete = 5,
}

impl From<u8> for PortState {
    fn from(value: u8) -> Self {
        match value {
            0 => PortState::ToListen,
            1 => PortState::Listening,
            2 => PortState::RxProcess,
            3 => PortState::TxPrepare,
            4 => PortState::Tx,
            5 => PortState::WaitComplete,
            _ => PortState::ToListen,
        }
    }
}

/// Port configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    /// How often the state machine is ticked, in milliseconds.  Used by
    /// [`AsyncPort::run()`]; informational for [`PortStateMachine`], whose
    /// caller controls the period.
    pub poll_period_ms: u32,
    /// Number of bytes each receive is armed for.  `None` arms for half the
    /// Transport's buffer.
    pub rx_len: Option<usize>,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            poll_period_ms: DEFAULT_POLL_PERIOD_MS,
            rx_len: None,
        }
    }
}

impl PortConfig {
    /// Set the poll period.
    #[must_use]
    pub const fn with_poll_period_ms(mut self, ms: u32) -> Self {
        self.poll_period_ms = ms;
        self
    }

    /// Set the number of bytes each receive is armed for.
    #[must_use]
    pub const fn with_rx_len(mut self, len: usize) -> Self {
        self.rx_len = Some(len);
        self
    }

    /// Receive length to use with a buffer of `capacity` bytes.
    pub const fn rx_len_for(&self, capacity: usize) -> usize {
        match self.rx_len {
            Some(len) => len,
            None => capacity / 2,
        }
    }

    /// Check this configuration suits a buffer of `capacity` bytes.
    pub fn validate(&self, capacity: usize) -> Result<()> {
        let rx_len = self.rx_len_for(capacity);
        if self.poll_period_ms == 0 || rx_len == 0 || rx_len > capacity {
            Err(Error::InvalidConfig)
        } else {
            Ok(())
        }
    }
}

/// Application logic invoked for each received frame.
pub trait FrameHandler {
    /// Process `frame`, writing any reply into `reply`.
    ///
    /// Returns the number of reply bytes written.  Zero sends nothing.
    /// Whatever is left unread of the frame is discarded afterwards.
    fn on_frame(&mut self, frame: &mut Frame<'_>, reply: &mut [u8]) -> usize;
}

impl<F> FrameHandler for F
where
    F: FnMut(&mut Frame<'_>, &mut [u8]) -> usize,
{
    fn on_frame(&mut self, frame: &mut Frame<'_>, reply: &mut [u8]) -> usize {
        self(frame, reply)
    }
}

/// Frame handler which replies with the received frame, unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Echo;

impl FrameHandler for Echo {
    fn on_frame(&mut self, frame: &mut Frame<'_>, reply: &mut [u8]) -> usize {
        frame.read_into(reply)
    }
}

// Outcome of a tick for everything bar frame processing, which is left to the
// sync or async driver.
enum Step {
    Done(PortState),
    Process,
}

// State shared by the sync and async drivers.
struct PortCore<'a, H: Uart, const N: usize> {
    transport: &'a Transport<H, N>,
    config: PortConfig,
    rx_len: usize,
    state: PortState,
    reply: [u8; N],
    reply_len: usize,
}

impl<'a, H: Uart, const N: usize> PortCore<'a, H, N> {
    fn new(transport: &'a Transport<H, N>, config: PortConfig) -> Result<Self> {
        transport.policy().validate()?;
        config.validate(N)?;

        let rx_len = config.rx_len_for(N);
        debug!(
            "Created port: {} baud, silence {} bits ({}us), rx {rx_len} bytes, poll {}ms",
            transport.policy().baud_rate(),
            transport.policy().silence_bits(),
            transport.policy().silence_us(),
            config.poll_period_ms,
        );

        Ok(Self {
            transport,
            config,
            rx_len,
            state: PortState::ToListen,
            reply: [0; N],
            reply_len: 0,
        })
    }

    // Runs one tick, unless the state is RxProcess, in which case the caller
    // processes the frame and then calls finish_process().
    fn step(&mut self) -> Result<Step> {
        let next = match self.state {
            PortState::ToListen => {
                if !self.transport.is_receive_armed() && !self.transport.is_frame_ready() {
                    self.transport.begin_receive(self.rx_len)?;
                }
                PortState::Listening
            }
            PortState::Listening => {
                if self.transport.is_frame_ready() {
                    PortState::RxProcess
                } else {
                    PortState::Listening
                }
            }
            PortState::RxProcess => return Ok(Step::Process),
            PortState::TxPrepare => {
                if self.reply_len == 0 {
                    trace!("No reply to send");
                    PortState::ToListen
                } else {
                    PortState::Tx
                }
            }
            PortState::Tx => {
                self.transport.begin_send(&self.reply[..self.reply_len])?;
                self.reply_len = 0;
                PortState::WaitComplete
            }
            PortState::WaitComplete => {
                if self.transport.is_send_busy() {
                    PortState::WaitComplete
                } else {
                    PortState::ToListen
                }
            }
        };
        Ok(Step::Done(self.set_state(next)))
    }

    fn finish_process(&mut self, reply_len: usize) -> PortState {
        self.transport.release_frame();
        self.reply_len = reply_len.min(N);
        self.set_state(PortState::TxPrepare)
    }

    fn set_state(&mut self, next: PortState) -> PortState {
        if next != self.state {
            trace!("Port {:?} -> {:?}", self.state, next);
            self.state = next;
        }
        next
    }
}
