// Copyright (c) 2024 Botho Foundation

//! In-process relay counters.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::RelayError;

/// Counters for messages handled by one engine.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Messages taken off the transport or handed in directly.
    pub messages_received: AtomicU64,
    /// Buffers sent on to another node.
    pub messages_forwarded: AtomicU64,
    /// Terminal layers consumed locally.
    pub messages_delivered: AtomicU64,
    /// Replies assembled by this node.
    pub replies_sent: AtomicU64,
    /// Dropped because a layer failed to decode.
    pub dropped_malformed: AtomicU64,
    /// Dropped because no local key matched the cloak.
    pub dropped_unknown_key: AtomicU64,
    /// Dropped because the session was exhausted or gone.
    pub dropped_exhausted: AtomicU64,
    /// Dropped for any other reason.
    pub dropped_invalid: AtomicU64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_forwarded(&self) {
        self.messages_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_delivered(&self) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reply(&self) {
        self.replies_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a dropped message under the bucket for its error.
    pub fn record_drop(&self, err: &RelayError) {
        let counter = match err {
            RelayError::Wire(_) => &self.dropped_malformed,
            RelayError::UnknownCloak => &self.dropped_unknown_key,
            RelayError::SessionExhausted(_) | RelayError::UnknownSession(_) => {
                &self.dropped_exhausted
            }
            _ => &self.dropped_invalid,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayMetricsSnapshot {
        RelayMetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_forwarded: self.messages_forwarded.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            replies_sent: self.replies_sent.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            dropped_unknown_key: self.dropped_unknown_key.load(Ordering::Relaxed),
            dropped_exhausted: self.dropped_exhausted.load(Ordering::Relaxed),
            dropped_invalid: self.dropped_invalid.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of relay metrics for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayMetricsSnapshot {
    pub messages_received: u64,
    pub messages_forwarded: u64,
    pub messages_delivered: u64,
    pub replies_sent: u64,
    pub dropped_malformed: u64,
    pub dropped_unknown_key: u64,
    pub dropped_exhausted: u64,
    pub dropped_invalid: u64,
}

impl RelayMetricsSnapshot {
    pub fn dropped(&self) -> u64 {
        self.dropped_malformed
            + self.dropped_unknown_key
            + self.dropped_exhausted
            + self.dropped_invalid
    }
}
