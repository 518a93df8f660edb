// Copyright (c) 2024 Botho Foundation

//! The onion engine.
//!
//! An [`Engine`] receives buffers from its transport and peels them one
//! layer at a time. Each layer either lets dispatch continue with the next
//! layer in the same buffer, sends the rest of the buffer on, restarts
//! dispatch with a reply the node built, or ends the message. Every error
//! is contained to the message that caused it.

mod accounting;
mod engine;
mod handling;
mod metrics;

pub use accounting::{charge_exit, charge_send, HandleContext};
pub use engine::{Collaborators, Engine, Identity, SessionTicket};
pub use handling::Flow;
pub use metrics::{RelayMetrics, RelayMetricsSnapshot};
