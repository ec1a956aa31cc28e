//! Port state machine for a fixed-period task or main loop.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::Result;
use crate::port::{FrameHandler, PortConfig, PortCore, PortState, Step};
use crate::transport::Transport;
use crate::uart::Uart;

/// Port state machine, ticked by the application at a fixed period.
///
/// Example, from an RTOS task with a 5ms period:
///
/// ```rust,ignore
/// static TRANSPORT: Transport<Usart8, 256> =
///     Transport::new(Usart8::new(), FramingPolicy::new(750_000));
///
/// fn uart8_task() -> ! {
///     let mut port = PortStateMachine::new(&TRANSPORT, PortConfig::default())
///         .expect("invalid port configuration");
///     loop {
///         if let Err(e) = port.tick(&mut Echo) {
///             panic!("UART8 failed: {e:?}");
///         }
///         delay_ms(DEFAULT_POLL_PERIOD_MS);
///     }
/// }
/// ```
pub struct PortStateMachine<'a, H: Uart, const N: usize> {
    core: PortCore<'a, H, N>,
}

impl<'a, H: Uart, const N: usize> PortStateMachine<'a, H, N> {
    /// Create a new state machine driving `transport`.
    ///
    /// Arguments:
    /// - `transport` - The port's Transport.  No other code may arm receives
    ///   or sends on it while the state machine is in use.
    /// - `config` - Port configuration
    ///
    /// Returns [`crate::Error::InvalidConfig`] if the Transport's framing
    /// policy or `config` cannot be used.
    pub fn new(transport: &'a Transport<H, N>, config: PortConfig) -> Result<Self> {
        Ok(Self {
            core: PortCore::new(transport, config)?,
        })
    }

    /// Advance the state machine by one step.  Never blocks.
    ///
    /// Returns the new state, or an error if the Transport could not arm a
    /// receive or send.  Errors for which [`crate::Error::is_fatal()`] is
    /// true leave the port unusable.
    pub fn tick<F: FrameHandler>(&mut self, handler: &mut F) -> Result<PortState> {
        match self.core.step()? {
            Step::Done(state) => Ok(state),
            Step::Process => {
                let transport = self.core.transport;
                let reply_len = match transport.frame() {
                    Some(mut frame) => handler.on_frame(&mut frame, &mut self.core.reply),
                    None => 0,
                };
                Ok(self.core.finish_process(reply_len))
            }
        }
    }

    /// Current state.
    pub fn state(&self) -> PortState {
        self.core.state
    }

    /// Reset to [`PortState::ToListen`], or to the state matching a raw
    /// value (unknown values also give [`PortState::ToListen`]).
    pub fn set_state_raw(&mut self, raw: u8) {
        let state = PortState::from(raw);
        self.core.set_state(state);
    }

    /// Transport driven by this state machine.
    pub fn transport(&self) -> &'a Transport<H, N> {
        self.core.transport
    }

    /// Port configuration.
    pub fn config(&self) -> &PortConfig {
        &self.core.config
    }
}
