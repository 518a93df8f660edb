// Copyright (c) 2024 Botho Foundation

//! Requests waiting for an answer.
//!
//! A client registers a [`PendingResponse`] before sending anything that
//! expects a reply. The engine completes it when the matching
//! Confirmation, Response, Balance or Ready arrives, or times it out on the
//! next sweep after its deadline. Either way the callback runs exactly once.

use parking_lot::Mutex;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tracing::debug;
use veil_crypto_secp256k1::Hash;

use super::sessions::SessionStore;
use crate::{
    onion::{Balance, Response},
    wire::Id,
};

/// How a reply is matched to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    Id(Id),
    /// Hash of the response payload, for services that answer without
    /// echoing an id.
    Hash(Hash),
}

/// The outcome handed to a pending request's callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Confirmed(Id),
    Response(Response),
    Balance(Balance),
    Ready(Id),
    TimedOut(CorrelationKey),
}

pub type Callback = Box<dyn FnOnce(Completion) + Send>;

pub struct PendingResponse {
    pub key: CorrelationKey,
    /// Sessions charged for `sent_bytes` when the reply arrives.
    pub billable: Vec<Id>,
    /// Billable sessions already charged elsewhere.
    pub accounted: Vec<Id>,
    /// Session charged for the reply payload.
    pub return_session: Option<Id>,
    pub port: u16,
    pub sent_bytes: usize,
    pub callback: Callback,
    pub deadline: Instant,
}

impl PendingResponse {
    pub fn new(key: CorrelationKey, timeout: Duration, callback: Callback) -> Self {
        Self {
            key,
            billable: Vec::new(),
            accounted: Vec::new(),
            return_session: None,
            port: 0,
            sent_bytes: 0,
            callback,
            deadline: super::deadline_after(timeout),
        }
    }

    pub fn with_billing(mut self, billable: Vec<Id>, sent_bytes: usize) -> Self {
        self.billable = billable;
        self.sent_bytes = sent_bytes;
        self
    }

    pub fn with_return_session(mut self, session: Id) -> Self {
        self.return_session = Some(session);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    fn settle(&self, payload_len: usize, sessions: &dyn SessionStore) {
        for id in self.billable.iter().filter(|id| !self.accounted.contains(id)) {
            sessions.charge(*id, self.sent_bytes);
        }
        if let Some(id) = self.return_session {
            sessions.charge(id, payload_len);
        }
    }
}

#[derive(Default)]
pub struct PendingResponses {
    entries: Mutex<HashMap<CorrelationKey, PendingResponse>>,
}

impl PendingResponses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request. Replaces any entry with the same key.
    pub fn add(&self, entry: PendingResponse) {
        self.entries.lock().insert(entry.key, entry);
    }

    pub fn contains(&self, key: &CorrelationKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Drop a request without running its callback.
    pub fn remove(&self, key: &CorrelationKey) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Settle and remove the request under `key`, then run its callback
    /// with `completion`. Returns false if no such request is pending.
    pub fn process_and_delete(
        &self,
        key: CorrelationKey,
        payload_len: usize,
        completion: Completion,
        sessions: &dyn SessionStore,
    ) -> bool {
        // Removed under the lock, called back outside it
        let Some(entry) = self.entries.lock().remove(&key) else {
            return false;
        };
        entry.settle(payload_len, sessions);
        debug!(?key, port = entry.port, "pending request completed");
        (entry.callback)(completion);
        true
    }

    /// Time out every request whose deadline is before `now`.
    pub fn expire(&self, now: Instant) -> usize {
        let expired: Vec<PendingResponse> = {
            let mut entries = self.entries.lock();
            let keys: Vec<CorrelationKey> = entries
                .values()
                .filter(|e| e.deadline <= now)
                .map(|e| e.key)
                .collect();
            keys.iter().filter_map(|k| entries.remove(k)).collect()
        };
        let count = expired.len();
        for entry in expired {
            debug!(key = ?entry.key, "pending request timed out");
            (entry.callback)(Completion::TimedOut(entry.key));
        }
        count
    }
}
