//! Queued debug output over a serial port.
//!
//! Any task or interrupt handler may queue messages on a shared
//! [`PrintQueue`], through `&self`, so it can live in a `static`.  A single
//! task owns the matching [`PrintDrain`] and calls [`PrintDrain::pump()`]
//! periodically, which sends queued messages one at a time through a
//! [`Transport`] whenever its transmitter is idle.
//!
//! ```rust,ignore
//! static DEBUG: PrintQueue<64, 8> = PrintQueue::new();
//!
//! fn uart8_irq() {
//!     let _ = DEBUG.push(b"irq\r\n");
//! }
//!
//! fn print_task() -> ! {
//!     let mut drain = PrintDrain::new(&DEBUG);
//!     let _ = DEBUG.print(format_args!("boot {}\r\n", VERSION));
//!     loop {
//!         drain.pump(&TRANSPORT).expect("debug UART failed");
//!         delay_ms(DEFAULT_POLL_PERIOD_MS);
//!     }
//! }
//! ```
//!
//! The queue is built on [`heapless::mpmc::MpMcQueue`], so `DEPTH` must be a
//! power of two, no larger than 128.  It requires compare-and-swap atomics.
//! On Cortex-M0/M0+ enable heapless's `portable-atomic` feature.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicU32, Ordering};
use heapless::mpmc::MpMcQueue;
use heapless::{String, Vec};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::transport::Transport;
use crate::uart::Uart;
use crate::{Error, Result};

/// Bounded queue of up to `DEPTH` messages, each at most `LEN` bytes,
/// shared by any number of producers.
pub struct PrintQueue<const LEN: usize, const DEPTH: usize> {
    messages: MpMcQueue<Vec<u8, LEN>, DEPTH>,
    dropped: AtomicU32,
}

impl<const LEN: usize, const DEPTH: usize> PrintQueue<LEN, DEPTH> {
    /// Create a new, empty, queue.
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            messages: MpMcQueue::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Queue a message.  May be called from any task or interrupt handler.
    ///
    /// Returns:
    /// - [`Error::EmptyPayload`] if `bytes` is empty
    /// - [`Error::PayloadTooLarge`] if `bytes` is longer than `LEN`
    /// - [`Error::QueueFull`] if the queue has no room, in which case the
    ///   message is counted as dropped
    pub fn push(&self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Err(Error::EmptyPayload);
        }
        let message = Vec::from_slice(bytes).map_err(|_| Error::PayloadTooLarge)?;
        self.messages.enqueue(message).map_err(|_| {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            Error::QueueFull
        })
    }

    /// Format and queue a message, as [`Self::push()`].
    ///
    /// ```rust,ignore
    /// DEBUG.print(format_args!("rx {} bytes\r\n", len))?;
    /// ```
    pub fn print(&self, args: fmt::Arguments<'_>) -> Result<()> {
        let mut text = String::<LEN>::new();
        text.write_fmt(args).map_err(|_| Error::PayloadTooLarge)?;
        self.push(text.as_bytes())
    }

    /// Messages dropped because the queue was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consuming end of a [`PrintQueue`].  Only one may exist per queue.
pub struct PrintDrain<'a, const LEN: usize, const DEPTH: usize> {
    queue: &'a PrintQueue<LEN, DEPTH>,
    // Taken off the queue but not yet accepted by the Transport
    pending: Option<Vec<u8, LEN>>,
}

impl<'a, const LEN: usize, const DEPTH: usize> PrintDrain<'a, LEN, DEPTH> {
    /// Create the drain for `queue`.
    pub fn new(queue: &'a PrintQueue<LEN, DEPTH>) -> Self {
        Self {
            queue,
            pending: None,
        }
    }

    /// Start sending the oldest queued message, if the Transport's
    /// transmitter is idle.
    ///
    /// Returns `Ok(true)` if a message was started, `Ok(false)` if the
    /// transmitter is busy or nothing is queued.  A message which finds the
    /// transmitter busy is kept, and is the next one sent.  A message the
    /// Transport refuses outright is discarded and the error returned.
    pub fn pump<H: Uart, const N: usize>(&mut self, transport: &Transport<H, N>) -> Result<bool> {
        if self.pending.is_none() {
            self.pending = self.queue.messages.dequeue();
        }
        let Some(message) = self.pending.as_ref() else {
            return Ok(false);
        };

        let len = message.len();
        match transport.begin_send(message) {
            Ok(()) => {
                self.pending = None;
                Ok(true)
            }
            Err(Error::SendOutstanding) => Ok(false),
            Err(e) => {
                warn!("Discarded {len} byte message: {e:?}");
                self.pending = None;
                Err(e)
            }
        }
    }

    /// Whether a message is held, waiting for the transmitter.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
