//! Single-writer flags shared between interrupt handlers and a task.
//!
//! A [`Handoff`] replaces a boolean flag which would otherwise be written by
//! both sides (set by an interrupt, cleared by the task, say).  It holds two
//! sequence numbers:
//!
//! - `produced` - written only by the producing context, incremented each
//!   time it hands something over
//! - `consumed` - written only by the consuming context, set equal to
//!   `produced` once it has dealt with the hand over
//!
//! The flag is "pending" whenever the two differ.  As each word has a single
//! writer there is never a lost update, whichever context preempts the other,
//! and no read-modify-write atomics are needed.
//!
//! Which context is the producer is a property of each individual Handoff and
//! is documented where the Handoff is declared.  The method names say which
//! side may call them: `publish()`/`withdraw()` belong to the producer,
//! `consume()` to the consumer.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::sync::atomic::{AtomicU32, Ordering};

/// Single-writer sequence number.
#[derive(Debug)]
pub struct Seq(AtomicU32);

impl Seq {
    /// Create a new sequence number, starting at zero.
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Current value.  Acquire, so data written before the matching
    /// [`Self::set()`] is visible.
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Store a new value.  Must only be called by this Seq's single writer.
    pub fn set(&self, value: u32) {
        self.0.store(value, Ordering::Release);
    }

    fn inc(&self) {
        let value = self.0.load(Ordering::Relaxed);
        self.set(value.wrapping_add(1));
    }

    fn dec(&self) {
        let value = self.0.load(Ordering::Relaxed);
        self.set(value.wrapping_sub(1));
    }
}

impl Default for Seq {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer/consumer pair of sequence numbers acting as a flag.
#[derive(Debug, Default)]
pub struct Handoff {
    produced: Seq,
    consumed: Seq,
}

impl Handoff {
    /// Create a new, idle, Handoff.
    pub const fn new() -> Self {
        Self {
            produced: Seq::new(),
            consumed: Seq::new(),
        }
    }

    /// Whether the producer has published something the consumer has not
    /// yet consumed.
    pub fn is_pending(&self) -> bool {
        let produced = self.produced.get();
        let consumed = self.consumed.get();
        produced != consumed
    }

    /// Producer: hand over.  Everything the producer wrote before calling this
    /// is visible to a consumer which subsequently sees
    /// [`Self::is_pending()`] return true.
    ///
    /// Publishing while already pending has no effect, so a hand over is
    /// never counted twice.
    pub fn publish(&self) {
        if !self.is_pending() {
            self.produced.inc();
        }
    }

    /// Producer: take back a hand over the consumer cannot have seen.
    ///
    /// Used when the operation that would eventually lead to
    /// [`Self::consume()`] failed to start.
    pub fn withdraw(&self) {
        if self.is_pending() {
            self.produced.dec();
        }
    }

    /// Consumer: mark everything published so far as dealt with.
    pub fn consume(&self) {
        let produced = self.produced.get();
        self.consumed.set(produced);
    }

    /// Number of hand overs published since creation (wrapping).
    pub fn published(&self) -> u32 {
        self.produced.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let handoff = Handoff::new();
        assert!(!handoff.is_pending());
        assert_eq!(handoff.published(), 0);
    }

    #[test]
    fn publish_then_consume() {
        let handoff = Handoff::new();
        handoff.publish();
        assert!(handoff.is_pending());
        handoff.consume();
        assert!(!handoff.is_pending());
        assert_eq!(handoff.published(), 1);
    }

    #[test]
    fn double_publish_counts_once() {
        let handoff = Handoff::new();
        handoff.publish();
        handoff.publish();
        assert_eq!(handoff.published(), 1);
        handoff.consume();
        assert!(!handoff.is_pending());
    }

    #[test]
    fn withdraw_reverts_publish() {
        let handoff = Handoff::new();
        handoff.publish();
        handoff.withdraw();
        assert!(!handoff.is_pending());
        assert_eq!(handoff.published(), 0);

        // Withdrawing with nothing pending is a no-op
        handoff.withdraw();
        assert_eq!(handoff.published(), 0);
    }

    #[test]
    fn consume_when_idle_is_noop() {
        let handoff = Handoff::new();
        handoff.consume();
        assert!(!handoff.is_pending());
    }

    #[test]
    fn sequence_wraps() {
        let handoff = Handoff::new();
        handoff.produced.set(u32::MAX);
        handoff.consumed.set(u32::MAX);
        handoff.publish();
        assert_eq!(handoff.published(), 0);
        assert!(handoff.is_pending());
        handoff.consume();
        assert!(!handoff.is_pending());
    }
}
