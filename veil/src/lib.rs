// Copyright (c) 2024 Botho Foundation

//! Veil: an onion-routing wire engine.
//!
//! Messages are chains of layers. Each node removes the layer addressed to
//! it, learns one next step, and either hands the rest to the next node or
//! consumes it. Replies travel back over fixed-size routing headers built
//! by the requester, so no relay learns more than its neighbours.
//!
//! - [`wire`]: the byte-level codec ([`wire::Splice`]) and field types
//! - [`onion`]: the layer types and path builders
//! - [`registry`]: tag-to-decoder lookup
//! - [`relay`]: the [`relay::Engine`] that receives, peels and routes
//! - [`collab`]: sessions, payments, pending replies, local services,
//!   hidden services, peers and transport
//!
//! # Architecture
//!
//! ```text
//!  client ──Crypt/Forward──▶ relay ──Crypt/Forward──▶ exit ──▶ local service
//!     ▲                                                 │
//!     └────────Reverse/Crypt routing header ◀───────────┘
//! ```

#![deny(clippy::print_stdout)]

pub mod collab;
pub mod config;
pub mod error;
pub mod onion;
pub mod registry;
pub mod relay;
pub mod telemetry;
pub mod wire;

pub use config::{EngineConfig, LoggingConfig};
pub use error::RelayError;
pub use relay::{Collaborators, Engine, Identity};
