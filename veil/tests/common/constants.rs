// Copyright (c) 2024 Botho Foundation
//
//! Shared constants for integration tests.

use std::time::Duration;

/// Longest a test waits for a callback or whisper
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Sweep interval for running nodes (faster than production)
pub const TEST_SWEEP_MS: u64 = 20;

/// Default balance for sessions opened by tests
pub const TEST_SESSION_BALANCE: i64 = 1_000_000;
