//! DMA accessible buffers.
//!
//! [`DmaBuffer`] is a fixed size byte array which the DMA controller writes
//! (receive) or reads (transmit) while the CPU holds only a shared reference
//! to it.  CPU accesses go through volatile reads and writes, and are only
//! made while the relevant transfer is known to be idle - see
//! [`crate::transport::Transport`] for the protocol which guarantees this.
//!
//! [`FrameBuffer`] adds the read cursor used to consume a received frame one
//! byte at a time.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Fixed size buffer shared with a DMA controller.
// DMA1/2 on STM32H7 require 32 byte alignment for cache maintenance by
// address.
#[repr(C, align(32))]
pub struct DmaBuffer<const N: usize> {
    data: UnsafeCell<[u8; N]>,
}

// Safety: all CPU access is volatile, and the transport only touches the
// buffer while no DMA transfer targets it.
unsafe impl<const N: usize> Sync for DmaBuffer<N> {}

impl<const N: usize> DmaBuffer<N> {
    /// Create a new, zeroed, buffer.
    // We need a new() rather than a default() as it must be const.
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            data: UnsafeCell::new([0; N]),
        }
    }

    /// Buffer capacity in bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Pointer handed to the DMA controller.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.data.get() as *mut u8
    }

    /// Byte at `index`, or 0 if `index` is out of range.
    pub fn byte_at(&self, index: usize) -> u8 {
        if index < N {
            unsafe { core::ptr::read_volatile(self.as_mut_ptr().add(index)) }
        } else {
            0
        }
    }

    /// Copy `data` into the start of the buffer.
    ///
    /// Returns the number of bytes copied, which is less than `data.len()`
    /// if `data` is longer than the buffer.
    pub fn fill_from(&self, data: &[u8]) -> usize {
        let len = data.len().min(N);
        let base = self.as_mut_ptr();
        for (i, byte) in data[..len].iter().enumerate() {
            unsafe { core::ptr::write_volatile(base.add(i), *byte) };
        }
        len
    }

    /// Copy the first `out.len()` bytes of the buffer into `out`.  Returns
    /// the number of bytes copied.
    pub fn copy_to(&self, out: &mut [u8]) -> usize {
        let len = out.len().min(N);
        for (i, slot) in out[..len].iter_mut().enumerate() {
            *slot = self.byte_at(i);
        }
        len
    }
}

/// Receive buffer and read cursor.
///
/// The cursor is only ever touched by the task consuming frames.
pub struct FrameBuffer<const N: usize> {
    storage: DmaBuffer<N>,
    cursor: AtomicUsize,
}

impl<const N: usize> FrameBuffer<N> {
    /// Create a new, empty, frame buffer.
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            storage: DmaBuffer::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Buffer capacity in bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Underlying DMA storage.
    pub fn storage(&self) -> &DmaBuffer<N> {
        &self.storage
    }

    /// Index of the next unread byte.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Move the cursor back to the start of the buffer.
    pub fn rewind(&self) {
        self.cursor.store(0, Ordering::Relaxed);
    }

    /// Read the byte under the cursor, provided the cursor is before `len`,
    /// and advance.
    ///
    /// Bytes beyond the buffer's capacity read as 0.
    pub fn next_within(&self, len: usize) -> Option<u8> {
        let cursor = self.cursor();
        if cursor >= len {
            return None;
        }
        let byte = self.storage.byte_at(cursor);
        self.cursor.store(cursor + 1, Ordering::Relaxed);
        Some(byte)
    }
}
