// Copyright (c) 2024 Botho Foundation
//
//! Common test utilities for integration tests.
//!
//! Builds in-process networks of engines connected by a
//! [`MemoryNetwork`](veil::collab::MemoryNetwork). Nodes can either run
//! their receive loop on a task or be stepped by hand, one message at a
//! time, so tests can inspect every buffer on the wire.
//!
//! # Example
//!
//! ```ignore
//! use common::{TestNetwork, open_session};
//!
//! let mut network = TestNetwork::new();
//! let relay = network.add_node(7001);
//! let client = network.add_node(7000);
//! let hop = open_session(&relay, 10_000, 1);
//! network.start(&relay);
//! network.stop().await;
//! ```

#![allow(dead_code)]

mod constants;
mod network;

pub use constants::*;
pub use network::*;
