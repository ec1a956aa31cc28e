//! Idle-line framed, DMA driven, non-blocking UART transport for embedded
//! targets.
//!
//! This crate turns the raw byte stream of a UART into discrete frames without
//! any length field or delimiter byte.  A frame is whatever arrives between two
//! periods of line silence: once the line has been idle for the configured
//! number of bit periods (3.5 characters by default, as used by RTU style
//! fieldbus framing) the receiver considers the frame complete.
//!
//! Both directions are non-blocking.  Reception and transmission are started
//! by the task owning the port, carried out by DMA, and completed by interrupt
//! handlers which only flip flags.  The task observes those flags on its next
//! poll.
//!
//! `no_std`.  Requires `alloc` for async traits.
//!
//! ## Architecture
//!
//! Each physical port is made up of:
//!
//! - A [`transport::Transport`], which owns the UART (via the [`uart::Uart`]
//!   traits), a receive buffer and a transmit staging buffer.  Its interrupt
//!   callbacks must be wired to the UART, DMA and receiver timeout interrupts.
//! - A [`port::PortStateMachine`] (or [`port::AsyncPort`]), which borrows the
//!   Transport and sequences it through listen, receive, process, reply and
//!   wait-for-send states, once per poll period.
//! - A [`port::FrameHandler`], supplied by the application, which is handed
//!   each received frame and writes the reply.
//!
//! State shared between interrupt handlers and the task is held in
//! [`handoff::Handoff`] pairs.  Each half of a pair has exactly one writer, so
//! no locking is required, and the only atomic operations needed are word
//! sized loads and stores.  This works on Cortex-M0/M0+ as well as M3 and
//! above.
//!
//! Receive is single-buffered.  After a frame is delivered the receiver is not
//! listening until the state machine re-arms it, so bytes arriving in the
//! meantime are lost.  Poll often enough, relative to the traffic pattern, to
//! avoid this.
//!
//! ## Modules
//!
//! - [`buffer`] - DMA accessible buffers and the frame read cursor
//! - [`framing`] - Silence threshold calculation
//! - [`handoff`] - Single-writer flags shared between interrupt and task
//!   contexts
//! - [`port`] - Per-port state machine, sync and async
//! - [`printer`] - Queue of debug messages drained through a Transport
//! - [`transport`] - Non-blocking send and receive for a single UART
//! - [`uart`] - Traits the board support code implements for each UART
//!
//! ## Getting Started
//!
//! 1. Implement [`uart::SerialChannel`] and [`uart::IdleTimer`] for your UART
//!    (usually one type does both).  The receive and transmit buffers live
//!    inside the Transport, so place the Transport in DMA accessible RAM and,
//!    on cores with a data cache, perform cache maintenance inside
//!    `start_send()`/`start_receive()`.
//! 2. Create a static [`transport::Transport`] for each UART.
//! 3. From the UART and DMA interrupt handlers call
//!    [`transport::Transport::dispatch()`] (or the individual `on_*`
//!    callbacks).
//! 4. Create a [`port::PortStateMachine`] for the Transport and call
//!    [`port::PortStateMachine::tick()`] every poll period (5ms by default)
//!    from a task, or use [`port::AsyncPort::run()`] from an async executor.
//!
//! ## Features
//!
//! Default features:
//! - `async` - Enable the async port driver and async frame handler trait
//!   (requires `alloc`).

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "async")]
extern crate alloc;

pub mod buffer;
pub mod framing;
pub mod handoff;
pub mod port;
pub mod printer;
pub mod transport;
pub mod uart;

#[cfg(test)]
pub(crate) mod testing;

/// Transport errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The UART refused to start a DMA receive.  Fatal.
    ReceiveRejected,
    /// The UART refused to start a DMA transmit.  Fatal.
    SendRejected,
    /// Framing or port configuration cannot be applied to the hardware.
    /// Fatal.
    InvalidConfig,
    /// A receive is already armed on this Transport
    ReceiveOutstanding,
    /// A send is already in progress on this Transport
    SendOutstanding,
    /// Requested receive length is zero or exceeds the buffer
    InvalidLength,
    /// Nothing to send
    EmptyPayload,
    /// Payload too large for buffer
    PayloadTooLarge,
    /// Queue has no room for another entry
    QueueFull,
}

impl Error {
    /// Whether this error indicates a configuration or resource failure from
    /// which the port cannot recover by retrying.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ReceiveRejected | Error::SendRejected | Error::InvalidConfig
        )
    }
}

/// Type to represent the result of a transport operation
pub type Result<T> = core::result::Result<T, Error>;
