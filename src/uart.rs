//! Traits the board support code implements for each UART.
//!
//! The transport is independent of any particular HAL or PAC.  Everything it
//! needs from the hardware is expressed by two traits:
//!
//! - [`SerialChannel`] - DMA backed receive and transmit, plus the status
//!   flag housekeeping the interrupt handlers perform
//! - [`IdleTimer`] - the UART's receiver timeout (idle line) detection
//!
//! On STM32 parts with a receiver timeout (USART RTOR/RTOF) a single type
//! wrapping the USART and its two DMA streams implements both.  [`Uart`] is
//! implemented automatically for such a type.
//!
//! All methods take `&self`.  Implementations are expected to be thin
//! wrappers around volatile register accesses, and are called both from the
//! task owning the port and from interrupt handlers.  The transport
//! guarantees that a given method is never used concurrently for the same
//! transfer direction.
//!
//! # Buffers
//!
//! [`SerialChannel::start_receive()`] and [`SerialChannel::start_send()`] are
//! given raw pointers into buffers owned by the
//! [`crate::transport::Transport`].  The pointers stay valid for as long as
//! the Transport lives.  If the Transport is placed in memory which the DMA
//! controller cannot reach (DTCM on STM32H7, for example) transfers will
//! silently fail.  On cores with a data cache the implementation must clean
//! the cache before starting a transmit, and invalidate it after a receive.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

/// DMA backed serial channel.
pub trait SerialChannel {
    /// The error type returned when a transfer cannot be started.
    ///
    /// This allows implementations to use their HAL's own error type.
    type Error: core::fmt::Debug;

    /// Start an asynchronous receive of up to `len` bytes into `buf`.
    ///
    /// Must return immediately.  Completion is signalled either by the
    /// receiver timeout (see [`IdleTimer`]) or by the DMA transfer complete
    /// interrupt once `len` bytes have arrived.
    ///
    /// # Errors
    ///
    /// Returns an error if the peripheral or DMA stream is busy or not
    /// initialized.
    fn start_receive(&self, buf: *mut u8, len: usize) -> Result<(), Self::Error>;

    /// Start an asynchronous transmit of `len` bytes from `data`.
    ///
    /// Must return immediately.  Completion is signalled by the transmit
    /// complete interrupt.
    ///
    /// # Errors
    ///
    /// Returns an error if the peripheral or DMA stream is busy or not
    /// initialized.
    fn start_send(&self, data: *const u8, len: usize) -> Result<(), Self::Error>;

    /// Abort an in-progress receive, leaving the DMA stream idle.
    fn abort_receive(&self);

    /// Number of bytes the current receive transfer has yet to write (the
    /// DMA stream's remaining data counter).
    fn rx_remaining(&self) -> usize;

    /// Clear the UART's transmission complete flag.
    fn clear_tx_complete(&self);

    /// Clear overrun, noise, parity and framing error flags.
    fn clear_line_errors(&self);

    /// Discard whatever is in the receive data register.
    fn flush_rx_data(&self);
}

/// Receiver timeout (idle line) detection.
pub trait IdleTimer {
    /// Program the idle period, in bit periods, after which the receiver
    /// timeout fires.
    fn set_silence_bits(&self, bits: u32);

    /// Enable receiver timeout detection and its interrupt.
    fn enable_timeout(&self);

    /// Disable receiver timeout detection and its interrupt.
    fn disable_timeout(&self);

    /// Clear a pending receiver timeout indication.
    fn clear_timeout(&self);
}

/// A UART usable by [`crate::transport::Transport`].
pub trait Uart: SerialChannel + IdleTimer {}

impl<T: SerialChannel + IdleTimer> Uart for T {}

/// Line errors reported alongside [`UartEvent::LineError`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineErrors {
    /// Parity error (PE)
    pub parity: bool,
    /// Framing error, stop bit not seen (FE)
    pub framing: bool,
    /// Noise detected on the line (NE)
    pub noise: bool,
    /// Receive data register overrun (ORE)
    pub overrun: bool,
}

impl LineErrors {
    /// No errors
    pub const NONE: Self = Self {
        parity: false,
        framing: false,
        noise: false,
        overrun: false,
    };

    /// Whether any error is flagged.
    pub const fn any(&self) -> bool {
        self.parity || self.framing || self.noise || self.overrun
    }
}

/// Interrupt sources an interrupt handler forwards to
/// [`crate::transport::Transport::dispatch()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartEvent {
    /// Receive line idle for the silence threshold
    ReceiverTimeout,
    /// Receive DMA transfer complete - armed length filled
    ReceiveComplete,
    /// Transmit complete
    TransmitComplete,
    /// Parity, framing, noise and/or overrun error
    LineError(LineErrors),
}
