//! Inter-character silence threshold used to delimit frames.
//!
//! A frame ends once the receive line has been idle for a number of bit
//! periods.  By default this is 3.5 character times, with each character
//! taken to be 11 bits long (start, 8 data, parity or second stop, stop), the
//! RTU fieldbus convention:
//!
//! ```text
//! 11 bits * 3.5 chars = 38 bit periods
//! ```
//!
//! The fractional bit is truncated, as the UART's receiver timeout register
//! only accepts whole bit periods.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use crate::{Error, Result};

/// Bits per character used for timing, unless overridden.
pub const DEFAULT_BITS_PER_CHAR: u32 = 11;

/// Silence between frames, in tenths of a character, unless overridden.
pub const DEFAULT_SILENCE_CHARS_X10: u32 = 35;

/// Largest threshold the receiver timeout counter can hold (24 bits).
pub const MAX_SILENCE_BITS: u32 = 0x00FF_FFFF;

/// Timing rule deciding that a run of bytes is one complete frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingPolicy {
    baud_rate: u32,
    bits_per_char: u32,
    silence_chars_x10: u32,
}

impl FramingPolicy {
    /// Create the default policy (3.5 characters of 11 bits) for a baud rate.
    ///
    /// `const` so it can be used to build a static
    /// [`crate::transport::Transport`].  Call [`Self::validate()`] before
    /// relying on it, which [`crate::port::PortStateMachine::new()`] does.
    pub const fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            bits_per_char: DEFAULT_BITS_PER_CHAR,
            silence_chars_x10: DEFAULT_SILENCE_CHARS_X10,
        }
    }

    /// Override the number of bits each character is assumed to take.
    #[must_use]
    pub const fn with_bits_per_char(mut self, bits: u32) -> Self {
        self.bits_per_char = bits;
        self
    }

    /// Override the silence, in tenths of a character, which ends a frame.
    #[must_use]
    pub const fn with_silence_chars_x10(mut self, chars_x10: u32) -> Self {
        self.silence_chars_x10 = chars_x10;
        self
    }

    /// Check the policy can be programmed into the hardware.
    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 || self.bits_per_char == 0 || self.silence_chars_x10 == 0 {
            return Err(Error::InvalidConfig);
        }
        match self.checked_silence_bits() {
            Some(bits) if bits > 0 && bits <= MAX_SILENCE_BITS => Ok(()),
            _ => Err(Error::InvalidConfig),
        }
    }

    /// Baud rate this policy was created for.
    pub const fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Bits per character.
    pub const fn bits_per_char(&self) -> u32 {
        self.bits_per_char
    }

    /// Silence threshold in bit periods, clamped to what the receiver timeout
    /// counter can hold.
    pub fn silence_bits(&self) -> u32 {
        self.checked_silence_bits()
            .unwrap_or(MAX_SILENCE_BITS)
            .min(MAX_SILENCE_BITS)
    }

    /// Duration of one character, in microseconds, rounded up.
    pub fn char_time_us(&self) -> u32 {
        bits_to_us(self.bits_per_char, self.baud_rate)
    }

    /// Silence threshold as a duration, in microseconds, rounded up.
    pub fn silence_us(&self) -> u32 {
        bits_to_us(self.silence_bits(), self.baud_rate)
    }

    /// Whether a gap of `idle_bits` bit periods ends a frame.
    pub fn is_boundary(&self, idle_bits: u32) -> bool {
        idle_bits >= self.silence_bits()
    }

    fn checked_silence_bits(&self) -> Option<u32> {
        self.bits_per_char
            .checked_mul(self.silence_chars_x10)
            .map(|tenths| tenths / 10)
    }
}

fn bits_to_us(bits: u32, baud_rate: u32) -> u32 {
    if baud_rate == 0 {
        return u32::MAX;
    }
    let us = (bits as u64 * 1_000_000).div_ceil(baud_rate as u64);
    us.min(u32::MAX as u64) as u32
}
