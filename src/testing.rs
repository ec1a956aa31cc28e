//! Simulated UART and receive line, for tests.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use std::cell::{Cell, RefCell};

use crate::transport::Transport;
use crate::uart::{IdleTimer, LineErrors, SerialChannel, UartEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

/// UART whose DMA writes straight into the Transport's buffer, with a
/// receiver timeout counting idle bit periods.
pub struct MockUart {
    rx_ptr: Cell<*mut u8>,
    rx_len: Cell<usize>,
    rx_pos: Cell<usize>,
    rx_active: Cell<bool>,
    rx_aborted: Cell<bool>,
    receive_starts: Cell<u32>,
    dropped: Cell<usize>,
    refuse_rx: Cell<bool>,
    refuse_tx: Cell<bool>,

    silence_bits: Cell<u32>,
    timeout_enabled: Cell<bool>,
    timeout_pending: Cell<bool>,
    idle_bits: Cell<u64>,
    byte_since_timeout: Cell<bool>,

    sent: RefCell<Vec<u8>>,
    tx_active: Cell<bool>,
    tx_complete_clears: Cell<u32>,
    line_error_clears: Cell<u32>,
    rx_flushes: Cell<u32>,
}

impl MockUart {
    pub fn new() -> Self {
        Self {
            rx_ptr: Cell::new(core::ptr::null_mut()),
            rx_len: Cell::new(0),
            rx_pos: Cell::new(0),
            rx_active: Cell::new(false),
            rx_aborted: Cell::new(false),
            receive_starts: Cell::new(0),
            dropped: Cell::new(0),
            refuse_rx: Cell::new(false),
            refuse_tx: Cell::new(false),
            silence_bits: Cell::new(0),
            timeout_enabled: Cell::new(false),
            timeout_pending: Cell::new(false),
            idle_bits: Cell::new(0),
            byte_since_timeout: Cell::new(false),
            sent: RefCell::new(Vec::new()),
            tx_active: Cell::new(false),
            tx_complete_clears: Cell::new(0),
            line_error_clears: Cell::new(0),
            rx_flushes: Cell::new(0),
        }
    }

    pub fn refuse_receive(&self, refuse: bool) {
        self.refuse_rx.set(refuse);
    }

    pub fn refuse_send(&self, refuse: bool) {
        self.refuse_tx.set(refuse);
    }

    pub fn silence_bits(&self) -> u32 {
        self.silence_bits.get()
    }

    pub fn timeout_enabled(&self) -> bool {
        self.timeout_enabled.get()
    }

    pub fn receive_aborted(&self) -> bool {
        self.rx_aborted.get()
    }

    pub fn receive_starts(&self) -> u32 {
        self.receive_starts.get()
    }

    pub fn dropped(&self) -> usize {
        self.dropped.get()
    }

    pub fn sent(&self) -> Vec<u8> {
        self.sent.borrow().clone()
    }

    pub fn tx_complete_clears(&self) -> u32 {
        self.tx_complete_clears.get()
    }

    pub fn line_error_clears(&self) -> u32 {
        self.line_error_clears.get()
    }

    pub fn rx_flushes(&self) -> u32 {
        self.rx_flushes.get()
    }

    /// A character arrives on the receive line.
    fn receive_byte(&self, byte: u8) -> Option<UartEvent> {
        self.idle_bits.set(0);
        self.byte_since_timeout.set(true);

        if !self.rx_active.get() || self.rx_pos.get() >= self.rx_len.get() {
            self.dropped.set(self.dropped.get() + 1);
            return None;
        }

        let pos = self.rx_pos.get();
        unsafe { core::ptr::write_volatile(self.rx_ptr.get().add(pos), byte) };
        self.rx_pos.set(pos + 1);

        if pos + 1 == self.rx_len.get() {
            self.rx_active.set(false);
            Some(UartEvent::ReceiveComplete)
        } else {
            None
        }
    }

    /// The receive line stays idle for `bits` bit periods.
    fn idle(&self, bits: u64) -> Option<UartEvent> {
        let idle = self.idle_bits.get() + bits;
        self.idle_bits.set(idle);

        if self.timeout_enabled.get()
            && self.byte_since_timeout.get()
            && !self.timeout_pending.get()
            && idle >= self.silence_bits.get() as u64
        {
            self.timeout_pending.set(true);
            self.byte_since_timeout.set(false);
            Some(UartEvent::ReceiverTimeout)
        } else {
            None
        }
    }

    /// The last character of the current transmit leaves the shift register.
    fn complete_send(&self) -> Option<UartEvent> {
        if self.tx_active.replace(false) {
            Some(UartEvent::TransmitComplete)
        } else {
            None
        }
    }
}

impl SerialChannel for MockUart {
    type Error = MockError;

    fn start_receive(&self, buf: *mut u8, len: usize) -> Result<(), MockError> {
        if self.refuse_rx.get() {
            return Err(MockError);
        }
        self.rx_ptr.set(buf);
        self.rx_len.set(len);
        self.rx_pos.set(0);
        self.rx_active.set(true);
        self.rx_aborted.set(false);
        self.byte_since_timeout.set(false);
        self.receive_starts.set(self.receive_starts.get() + 1);
        Ok(())
    }

    fn start_send(&self, data: *const u8, len: usize) -> Result<(), MockError> {
        if self.refuse_tx.get() {
            return Err(MockError);
        }
        let mut sent = self.sent.borrow_mut();
        for i in 0..len {
            sent.push(unsafe { core::ptr::read_volatile(data.add(i)) });
        }
        self.tx_active.set(true);
        Ok(())
    }

    fn abort_receive(&self) {
        self.rx_active.set(false);
        self.rx_aborted.set(true);
    }

    fn rx_remaining(&self) -> usize {
        self.rx_len.get() - self.rx_pos.get()
    }

    fn clear_tx_complete(&self) {
        self.tx_complete_clears.set(self.tx_complete_clears.get() + 1);
    }

    fn clear_line_errors(&self) {
        self.line_error_clears.set(self.line_error_clears.get() + 1);
    }

    fn flush_rx_data(&self) {
        self.rx_flushes.set(self.rx_flushes.get() + 1);
    }
}

impl IdleTimer for MockUart {
    fn set_silence_bits(&self, bits: u32) {
        self.silence_bits.set(bits);
    }

    fn enable_timeout(&self) {
        self.timeout_enabled.set(true);
    }

    fn disable_timeout(&self) {
        self.timeout_enabled.set(false);
    }

    fn clear_timeout(&self) {
        self.timeout_pending.set(false);
    }
}

/// The far end of the serial line, driving a Transport's interrupt
/// callbacks as the simulated hardware raises events.
pub struct Wire<'a, const N: usize> {
    transport: &'a Transport<MockUart, N>,
}

impl<'a, const N: usize> Wire<'a, N> {
    pub fn new(transport: &'a Transport<MockUart, N>) -> Self {
        Self { transport }
    }

    /// Send bytes back to back.
    pub fn send(&mut self, data: &[u8]) {
        for byte in data {
            self.byte(*byte);
        }
    }

    /// Send bytes with `gap_us` of idle line between consecutive bytes.
    pub fn send_with_gaps(&mut self, data: &[u8], gap_us: u64) {
        for (i, byte) in data.iter().enumerate() {
            if i > 0 {
                self.idle(gap_us);
            }
            self.byte(*byte);
        }
    }

    /// Send bytes back to back, returning the interrupts they raise instead
    /// of servicing them.
    pub fn send_held(&mut self, data: &[u8]) -> Vec<UartEvent> {
        data.iter()
            .filter_map(|byte| self.transport.uart().receive_byte(*byte))
            .collect()
    }

    /// Leave the line idle for `us` microseconds.
    pub fn idle(&mut self, us: u64) {
        let baud_rate = self.transport.policy().baud_rate() as u64;
        let bits = us * baud_rate / 1_000_000;
        if let Some(event) = self.transport.uart().idle(bits) {
            self.transport.dispatch(event);
        }
    }

    /// Raise a line error interrupt.
    pub fn line_error(&mut self, errors: LineErrors) {
        self.transport.dispatch(UartEvent::LineError(errors));
    }

    /// Finish the transmit in progress, if any.
    pub fn complete_send(&mut self) {
        if let Some(event) = self.transport.uart().complete_send() {
            self.transport.dispatch(event);
        }
    }

    /// Bytes which arrived with no receive armed.
    pub fn dropped(&self) -> usize {
        self.transport.uart().dropped()
    }

    fn byte(&mut self, byte: u8) {
        if let Some(event) = self.transport.uart().receive_byte(byte) {
            self.transport.dispatch(event);
        }
    }
}
