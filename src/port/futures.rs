//! Asynchronous port driver, for use with an async executor.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use alloc::boxed::Box;
use async_trait::async_trait;
use core::convert::Infallible;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::Result;
use crate::port::{Echo, PortConfig, PortCore, PortState, Step};
use crate::transport::{Frame, Transport};
use crate::uart::Uart;

/// Delay between ticks of [`AsyncPort::run()`].
///
/// Application must provide an implementation of this trait so the port can
/// yield to other tasks while waiting for frames.  This keeps `idleframe`
/// free of any specific async runtime.
///
/// Example:
///
/// ```rust,ignore
/// use embassy_time::{Duration, Timer};
/// struct Delay;
/// impl AsyncDelay for Delay {
///     async fn delay_ms(ms: u32) {
///         Timer::after(Duration::from_millis(ms as u64)).await;
///     }
/// }
/// ```
pub trait AsyncDelay {
    fn delay_ms(ms: u32) -> impl Future<Output = ()>;
}

/// Application logic invoked for each received frame, which may await.
#[async_trait(?Send)]
pub trait AsyncFrameHandler {
    /// Process `frame`, writing any reply into `reply`.
    ///
    /// Returns the number of reply bytes written.  Zero sends nothing.
    /// Whatever is left unread of the frame is discarded afterwards.
    async fn on_frame(&mut self, frame: &mut Frame<'_>, reply: &mut [u8]) -> usize;
}

#[async_trait(?Send)]
impl AsyncFrameHandler for Echo {
    async fn on_frame(&mut self, frame: &mut Frame<'_>, reply: &mut [u8]) -> usize {
        frame.read_into(reply)
    }
}

/// Port state machine driven from an async task.
///
/// See [`AsyncDelay`] for the required delay trait.
///
/// Example usage:
///
/// ```rust,ignore
/// static TRANSPORT: Transport<Usart8, 256> =
///     Transport::new(Usart8::new(), FramingPolicy::new(750_000));
///
/// #[embassy_executor::task]
/// async fn uart8_task() {
///     let mut port = AsyncPort::<_, Delay, 256>::new(&TRANSPORT, PortConfig::default())
///         .expect("invalid port configuration");
///     let Err(e) = port.run(&mut Echo).await;
///     panic!("UART8 failed: {e:?}");
/// }
/// ```
pub struct AsyncPort<'a, H: Uart, D: AsyncDelay, const N: usize> {
    core: PortCore<'a, H, N>,
    _delay: core::marker::PhantomData<D>,
}

impl<'a, H: Uart, D: AsyncDelay, const N: usize> AsyncPort<'a, H, D, N> {
    /// Create a new async port driving `transport`.
    ///
    /// Arguments:
    /// - `transport` - The port's Transport.  No other code may arm receives
    ///   or sends on it while the port is in use.
    /// - `config` - Port configuration, including the poll period used by
    ///   [`Self::run()`]
    pub fn new(transport: &'a Transport<H, N>, config: PortConfig) -> Result<Self> {
        Ok(Self {
            core: PortCore::new(transport, config)?,
            _delay: core::marker::PhantomData,
        })
    }

    /// Advance the state machine by one step, awaiting the handler if a
    /// frame is being processed.
    pub async fn tick<F: AsyncFrameHandler>(&mut self, handler: &mut F) -> Result<PortState> {
        match self.core.step()? {
            Step::Done(state) => Ok(state),
            Step::Process => {
                let transport = self.core.transport;
                let reply_len = match transport.frame() {
                    Some(mut frame) => handler.on_frame(&mut frame, &mut self.core.reply).await,
                    None => 0,
                };
                Ok(self.core.finish_process(reply_len))
            }
        }
    }

    /// Tick forever, delaying by the configured poll period between ticks.
    ///
    /// Only returns if the Transport fails.
    pub async fn run<F: AsyncFrameHandler>(&mut self, handler: &mut F) -> Result<Infallible> {
        info!("Port running, poll period {}ms", self.core.config.poll_period_ms);
        loop {
            if let Err(e) = self.tick(handler).await {
                error!("Port stopped: {e:?}");
                return Err(e);
            }
            D::delay_ms(self.core.config.poll_period_ms).await;
        }
    }

    /// Current state.
    pub fn state(&self) -> PortState {
        self.core.state
    }

    /// Transport driven by this port.
    pub fn transport(&self) -> &'a Transport<H, N> {
        self.core.transport
    }
}
