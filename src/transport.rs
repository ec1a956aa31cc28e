//! Non-blocking, idle-line framed transport for a single UART.
//!
//! See [`Transport`].

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::sync::atomic::{AtomicU8, AtomicU32, AtomicUsize, Ordering};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::buffer::{DmaBuffer, FrameBuffer};
use crate::framing::FramingPolicy;
use crate::handoff::Handoff;
use crate::uart::{LineErrors, Uart, UartEvent};
use crate::{Error, Result};

/// How the most recently delivered frame ended.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FrameEnd {
    /// The line went idle for the silence threshold.  The normal case.
    #[default]
    Silence = 0,
    /// The armed length filled before the line went idle.  The frame may
    /// have been truncated, or may have been exactly the armed length.
    Filled = 1,
}

impl From<u8> for FrameEnd {
    fn from(value: u8) -> Self {
        match value {
            1 => FrameEnd::Filled,
            _ => FrameEnd::Silence,
        }
    }
}

/// Snapshot of a Transport's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransportStats {
    /// Frames delivered, however they ended
    pub frames: u32,
    /// Frames which filled the armed length before the line went idle
    pub overflows: u32,
    /// Parity, framing, noise and overrun events
    pub line_errors: u32,
    /// Receiver timeouts with no receive armed
    pub spurious_timeouts: u32,
}

/// Counter written only from interrupt context.
#[derive(Debug)]
struct HandlerCounter(AtomicU32);

impl HandlerCounter {
    const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    fn inc(&self) {
        let value = self.0.load(Ordering::Relaxed);
        self.0.store(value.wrapping_add(1), Ordering::Relaxed);
    }

    fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Non-blocking, idle-line framed transport for a single UART.
///
/// The Transport owns the UART, a receive buffer and a transmit staging
/// buffer, each `N` bytes long.  It is designed to be placed in a `static`
/// (in DMA accessible RAM) and shared between:
///
/// - the task owning the port, which calls [`Self::begin_receive()`],
///   [`Self::begin_send()`] and the frame consumption methods, and
/// - the UART/DMA interrupt handlers, which call [`Self::dispatch()`] or the
///   individual `on_*` callbacks.
///
/// Both sides use `&self`.  Every field shared between the two has exactly
/// one writer:
///
/// | State              | Written by | Read by     |
/// |--------------------|------------|-------------|
/// | receive armed      | task       | handler     |
/// | receive closed     | handler    | task        |
/// | frame published    | handler    | task        |
/// | frame consumed     | task       | handler     |
/// | send started       | task       | handler     |
/// | send completed     | handler    | task        |
/// | expected length    | task       | handler     |
/// | byte count, end    | handler    | task        |
/// | read cursor        | task       | -           |
/// | statistics         | handler    | task        |
///
/// The handler stores the byte count and end reason before publishing the
/// frame, and the task checks for a published frame before reading them, so
/// a ready frame is never seen with a stale count.
///
/// Only one task may use a given Transport.  The consumption methods are not
/// safe to call concurrently from two tasks.
pub struct Transport<H: Uart, const N: usize> {
    uart: H,
    policy: FramingPolicy,
    rx: FrameBuffer<N>,
    tx: DmaBuffer<N>,

    // Task publishes when a receive starts, handler consumes when the frame
    // closes.
    rx_armed: Handoff,

    // Handler publishes a completed frame, task consumes once read or
    // released.
    rx_frame: Handoff,

    // Task publishes when a send starts, handler consumes on transmit
    // complete.
    tx_busy: Handoff,

    // Written by task
    rx_expected: AtomicUsize,

    // Written by handler
    rx_count: AtomicUsize,
    rx_end: AtomicU8,
    frames: HandlerCounter,
    overflows: HandlerCounter,
    line_errors: HandlerCounter,
    spurious_timeouts: HandlerCounter,
}

impl<H: Uart, const N: usize> Transport<H, N> {
    /// Create a new Transport.
    ///
    /// Arguments:
    /// - `uart` - Object implementing the [`Uart`] traits for the physical
    ///   port.  The Transport takes exclusive ownership of it.
    /// - `policy` - Silence threshold used to delimit frames.
    pub const fn new(uart: H, policy: FramingPolicy) -> Self {
        Self {
            uart,
            policy,
            rx: FrameBuffer::new(),
            tx: DmaBuffer::new(),
            rx_armed: Handoff::new(),
            rx_frame: Handoff::new(),
            tx_busy: Handoff::new(),
            rx_expected: AtomicUsize::new(0),
            rx_count: AtomicUsize::new(0),
            rx_end: AtomicU8::new(FrameEnd::Silence as u8),
            frames: HandlerCounter::new(),
            overflows: HandlerCounter::new(),
            line_errors: HandlerCounter::new(),
            spurious_timeouts: HandlerCounter::new(),
        }
    }

    /// The UART this Transport drives.
    pub fn uart(&self) -> &H {
        &self.uart
    }

    /// Framing policy in use.
    pub fn policy(&self) -> &FramingPolicy {
        &self.policy
    }

    /// Capacity of the receive and transmit buffers.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Task: arm a non-blocking receive of up to `max_len` bytes.
    ///
    /// Discards any unread frame, starts the DMA transfer and enables the
    /// receiver timeout with the policy's silence threshold.  The frame is
    /// delivered once the line goes idle, or once `max_len` bytes have
    /// arrived, whichever happens first.
    ///
    /// Errors:
    /// - [`Error::InvalidLength`] - `max_len` is zero or exceeds the buffer
    /// - [`Error::ReceiveOutstanding`] - a receive is already armed
    /// - [`Error::ReceiveRejected`] - the UART refused to start the transfer.
    ///   Fatal.
    pub fn begin_receive(&self, max_len: usize) -> Result<()> {
        if max_len == 0 || max_len > N {
            return Err(Error::InvalidLength);
        }
        if self.rx_armed.is_pending() {
            return Err(Error::ReceiveOutstanding);
        }

        // Drop anything unread and set up for the new frame
        self.rx_frame.consume();
        self.rx.rewind();
        self.rx_expected.store(max_len, Ordering::Release);

        // Mark armed before the DMA starts, as completion may be signalled
        // before start_receive() returns.
        self.rx_armed.publish();
        if let Err(e) = self.uart.start_receive(self.rx.storage().as_mut_ptr(), max_len) {
            self.rx_armed.withdraw();
            error!("UART refused to arm receive of {max_len} bytes: {e:?}");
            return Err(Error::ReceiveRejected);
        }

        self.uart.set_silence_bits(self.policy.silence_bits());
        self.uart.clear_timeout();
        self.uart.enable_timeout();

        trace!("Armed receive of up to {max_len} bytes");
        Ok(())
    }

    /// Task: start a non-blocking send of `data`.
    ///
    /// `data` is copied into the Transport's transmit buffer, so need not
    /// outlive the call.  Poll [`Self::is_send_busy()`] to find out when the
    /// transmission has completed.
    ///
    /// Errors:
    /// - [`Error::EmptyPayload`] - `data` is empty
    /// - [`Error::PayloadTooLarge`] - `data` is longer than the buffer
    /// - [`Error::SendOutstanding`] - a send is already in progress
    /// - [`Error::SendRejected`] - the UART refused to start the transfer.
    ///   Fatal.
    pub fn begin_send(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::EmptyPayload);
        }
        if data.len() > N {
            return Err(Error::PayloadTooLarge);
        }
        if self.tx_busy.is_pending() {
            return Err(Error::SendOutstanding);
        }

        let len = self.tx.fill_from(data);

        self.tx_busy.publish();
        if let Err(e) = self.uart.start_send(self.tx.as_mut_ptr(), len) {
            self.tx_busy.withdraw();
            error!("UART refused to send {len} bytes: {e:?}");
            return Err(Error::SendRejected);
        }

        trace!("Started send of {len} bytes");
        Ok(())
    }

    /// Whether a send is in progress.
    pub fn is_send_busy(&self) -> bool {
        self.tx_busy.is_pending()
    }

    /// Whether a receive is armed and waiting for its frame to end.
    pub fn is_receive_armed(&self) -> bool {
        self.rx_armed.is_pending()
    }

    /// Whether a received frame is waiting to be consumed.
    pub fn is_frame_ready(&self) -> bool {
        self.rx_frame.is_pending()
    }

    /// Length of the frame waiting to be consumed, if any.
    pub fn received_len(&self) -> Option<usize> {
        if self.rx_frame.is_pending() {
            Some(self.rx_count.load(Ordering::Acquire))
        } else {
            None
        }
    }

    /// How the frame waiting to be consumed ended, if there is one.
    pub fn frame_end(&self) -> Option<FrameEnd> {
        if self.rx_frame.is_pending() {
            Some(FrameEnd::from(self.rx_end.load(Ordering::Acquire)))
        } else {
            None
        }
    }

    /// Task: read the next byte of the received frame.
    ///
    /// - Returns `None` if no frame is ready.
    /// - Returns `None` once every byte of the frame has been read, and at
    ///   the same time releases the frame, so a new receive may be armed.
    /// - Otherwise returns the next byte.
    ///
    /// This is a single pass over the frame.  There is no way to restart it.
    pub fn read_byte(&self) -> Option<u8> {
        if !self.rx_frame.is_pending() {
            return None;
        }

        let count = self.rx_count.load(Ordering::Acquire);
        match self.rx.next_within(count) {
            Some(byte) => Some(byte),
            None => {
                self.release_frame();
                None
            }
        }
    }

    /// Task: borrow the received frame as an iterator, if one is ready.
    ///
    /// Draining the iterator releases the frame.
    pub fn frame(&self) -> Option<Frame<'_>> {
        let len = self.received_len()?;
        let end = self.frame_end().unwrap_or_default();
        Some(Frame {
            source: self,
            len,
            end,
        })
    }

    /// Task: discard whatever remains of the received frame.
    pub fn release_frame(&self) {
        self.rx.rewind();
        self.rx_frame.consume();
    }

    /// Snapshot of the Transport's counters.
    pub fn stats(&self) -> TransportStats {
        TransportStats {
            frames: self.frames.get(),
            overflows: self.overflows.get(),
            line_errors: self.line_errors.get(),
            spurious_timeouts: self.spurious_timeouts.get(),
        }
    }

    /// Handler: route an interrupt event to the matching callback.
    pub fn dispatch(&self, event: UartEvent) {
        match event {
            UartEvent::ReceiverTimeout => self.on_receive_boundary_timeout(),
            UartEvent::ReceiveComplete => self.on_transfer_complete(),
            UartEvent::TransmitComplete => self.on_transmit_complete(),
            UartEvent::LineError(errors) => self.on_line_error(errors),
        }
    }

    /// Handler: the receive line has been idle for the silence threshold.
    ///
    /// This ends the frame.  The count of received bytes is derived from the
    /// DMA stream's remaining counter, the transfer is aborted and the frame
    /// is published.  A frame which reached the armed length is recorded as
    /// [`FrameEnd::Filled`], whichever of the two interrupts is handled
    /// first.
    pub fn on_receive_boundary_timeout(&self) {
        self.uart.clear_timeout();

        if !self.rx_armed.is_pending() {
            self.uart.disable_timeout();
            self.spurious_timeouts.inc();
            trace!("Receiver timeout with no receive armed");
            return;
        }

        let count = self.received_so_far();
        if count == 0 {
            // Nothing arrived - keep listening
            return;
        }

        self.uart.disable_timeout();
        self.uart.abort_receive();

        // The transfer complete interrupt may still be pending behind this
        // one, in which case it is ignored as nothing is armed by then.
        if count >= self.rx_expected.load(Ordering::Acquire) {
            self.overflows.inc();
            self.close_frame(count, FrameEnd::Filled);
        } else {
            self.close_frame(count, FrameEnd::Silence);
        }
    }

    /// Handler: the receive DMA transfer filled the armed length before the
    /// line went idle.
    pub fn on_transfer_complete(&self) {
        if !self.rx_armed.is_pending() {
            trace!("Receive complete with no receive armed");
            return;
        }

        self.uart.disable_timeout();
        self.uart.clear_timeout();

        let count = self.received_so_far();
        self.overflows.inc();
        self.close_frame(count, FrameEnd::Filled);
    }

    /// Handler: transmission finished.
    pub fn on_transmit_complete(&self) {
        self.uart.clear_tx_complete();
        self.tx_busy.consume();
    }

    /// Handler: a line error was flagged.
    ///
    /// The error is cleared and counted.  The frame in progress is not
    /// affected.
    pub fn on_line_error(&self, errors: LineErrors) {
        self.uart.clear_line_errors();
        self.uart.flush_rx_data();
        self.line_errors.inc();
        trace!("Line error {errors:?}");
    }
}

// Internal functions
impl<H: Uart, const N: usize> Transport<H, N> {
    fn received_so_far(&self) -> usize {
        let expected = self.rx_expected.load(Ordering::Acquire);
        expected.saturating_sub(self.uart.rx_remaining())
    }

    fn close_frame(&self, count: usize, end: FrameEnd) {
        self.rx_count.store(count, Ordering::Release);
        self.rx_end.store(end as u8, Ordering::Release);
        self.frames.inc();
        self.rx_armed.consume();

        // Publish last, so the task never sees a ready frame with a stale
        // count
        self.rx_frame.publish();
    }
}

/// Source of frame bytes, implemented by [`Transport`].
///
/// Lets [`Frame`] be used without naming the Transport's type parameters.
pub trait ByteSource {
    /// See [`Transport::read_byte()`].
    fn read_byte(&self) -> Option<u8>;

    /// Bytes of the current frame not yet read.
    fn remaining(&self) -> usize;
}

impl<H: Uart, const N: usize> ByteSource for Transport<H, N> {
    fn read_byte(&self) -> Option<u8> {
        Transport::read_byte(self)
    }

    fn remaining(&self) -> usize {
        self.received_len()
            .map_or(0, |len| len.saturating_sub(self.rx.cursor()))
    }
}

/// A received frame, read one byte at a time.
///
/// Created by [`Transport::frame()`].  Iterating yields exactly the frame's
/// bytes, in order, once.
pub struct Frame<'a> {
    source: &'a dyn ByteSource,
    len: usize,
    end: FrameEnd,
}

impl Frame<'_> {
    /// Number of bytes in the frame.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the frame is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// How the frame ended.
    pub fn end(&self) -> FrameEnd {
        self.end
    }

    /// Copy as much of the frame as fits into `out`, returning the number of
    /// bytes copied.
    pub fn read_into(&mut self, out: &mut [u8]) -> usize {
        let mut copied = 0;
        for slot in out.iter_mut() {
            match self.next() {
                Some(byte) => {
                    *slot = byte;
                    copied += 1;
                }
                None => break,
            }
        }
        copied
    }
}

impl Iterator for Frame<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        self.source.read_byte()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.source.remaining();
        (remaining, Some(remaining))
    }
}
