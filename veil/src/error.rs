// Copyright (c) 2024 Botho Foundation

//! Errors raised while handling one message.
//!
//! None of these stop the relay. The dispatch loop logs the error, counts it
//! in [`RelayMetrics`](crate::relay::RelayMetrics) and moves on to the next
//! message.

use std::time::Duration;
use thiserror::Error;

use crate::{
    collab::TransportError,
    wire::{Id, WireError},
};

#[derive(Debug, Error)]
pub enum RelayError {
    /// The message could not be decoded.
    #[error("malformed message: {0}")]
    Wire(#[from] WireError),

    /// No local key matches the cloak. Indistinguishable from traffic
    /// that was never meant for this node.
    #[error("no local key matches cloak")]
    UnknownCloak,

    /// The session's balance is used up.
    #[error("session {0} exhausted")]
    SessionExhausted(Id),

    /// A cloak or request named a session that no longer exists.
    #[error("unknown session {0}")]
    UnknownSession(Id),

    /// A hidden-service advertisement failed signature verification.
    #[error("invalid signature on intro {0}")]
    InvalidSignature(Id),

    /// A hidden-service advertisement is expired or names another
    /// introducer.
    #[error("rejected intro {0}")]
    InvalidIntro(Id),

    /// No intro is known for the requested service key.
    #[error("no intro for requested service")]
    UnknownIntro,

    /// A session layer arrived without a matching payment.
    #[error("no payment for session {0}")]
    PaymentNotFound(Id),

    /// No local service listens on the requested port.
    #[error("no service on port {0}")]
    NoService(u16),

    /// A Delay layer asked to hold the message longer than this node
    /// allows.
    #[error("delay of {0:?} exceeds the limit")]
    DelayTooLong(Duration),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Not enough peers to build a path, or no return path for a
    /// connection.
    #[error("no path available")]
    NoPath,
}
