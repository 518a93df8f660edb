// Copyright (c) 2024 Botho Foundation

//! Paid relay sessions and the keys that resolve cloaks.
//!
//! A node resolves every Crypt cloak against two kinds of key sets:
//!
//! - **Sessions**: key pairs a client bought with a payment. Each carries a
//!   balance which is decremented for the bytes relayed on its behalf; once
//!   it reaches zero the session's cloaks are refused.
//! - **Identities**: the node's own header/payload keys, used for reply
//!   paths and direct messages. They carry no balance.

use parking_lot::Mutex;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tracing::debug;
use veil_crypto_secp256k1::{Cloak, KeyPair, PrivateKey, PublicKey};

use crate::{onion::Hop, wire::{AddrPort, Id}};

/// Price of relaying `bytes` at `rate` per byte.
pub fn cost(rate: u64, bytes: usize) -> u64 {
    rate.saturating_mul(bytes as u64)
}

/// A paid relay session.
#[derive(Debug)]
pub struct Session {
    pub id: Id,
    pub header: KeyPair,
    pub payload: KeyPair,
    pub balance: i64,
    pub relay_rate: u64,
    pub expires_at: Instant,
}

impl Session {
    pub fn new(
        id: Id,
        header: KeyPair,
        payload: KeyPair,
        balance: i64,
        relay_rate: u64,
        ttl: Duration,
    ) -> Self {
        Self {
            id,
            header,
            payload,
            balance,
            relay_rate,
            expires_at: super::deadline_after(ttl),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.balance <= 0
    }

    /// The hop a client uses to route through the relay at `addr` under
    /// this session.
    pub fn hop(&self, addr: AddrPort) -> Hop {
        Hop {
            addr,
            header: self.header.public,
            payload: self.payload.public,
        }
    }
}

/// What a cloak resolved to.
#[derive(Debug)]
pub struct KeyMatch {
    pub header: PrivateKey,
    pub payload: PrivateKey,
    /// `None` for the node's own identity keys.
    pub session: Option<Id>,
}

/// Public view of a session, without key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: Id,
    pub header: PublicKey,
    pub balance: i64,
    pub relay_rate: u64,
    pub expires_at: Instant,
}

pub trait SessionStore: Send + Sync {
    fn find_by_cloak(&self, cloak: &Cloak) -> Option<KeyMatch>;

    fn find_by_header_key(&self, key: &PublicKey) -> Option<Id>;

    /// Subtract `amount` from a session's balance, returning the new
    /// balance.
    fn decrement(&self, id: Id, amount: u64) -> Option<i64>;

    fn balance(&self, id: Id) -> Option<i64>;

    fn relay_rate(&self, id: Id) -> Option<u64>;

    fn add(&self, session: Session);

    /// Register keys owned by this node.
    fn add_identity(&self, header: KeyPair, payload: KeyPair);

    fn sessions(&self) -> Vec<SessionSummary>;

    /// Drop sessions that expired before `now`, returning how many.
    fn expire(&self, now: Instant) -> usize;

    /// Charge a session for `bytes` at its own relay rate.
    fn charge(&self, id: Id, bytes: usize) -> Option<i64> {
        let rate = self.relay_rate(id)?;
        self.decrement(id, cost(rate, bytes))
    }

    /// Charge a session for `bytes` at an explicit rate.
    fn charge_at(&self, id: Id, rate: u64, bytes: usize) -> Option<i64> {
        self.decrement(id, cost(rate, bytes))
    }
}

#[derive(Default)]
struct SessionTable {
    sessions: HashMap<Id, Session>,
    identities: Vec<(KeyPair, KeyPair)>,
}

/// In-memory [`SessionStore`].
#[derive(Default)]
pub struct SessionManager {
    inner: Mutex<SessionTable>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for SessionManager {
    fn find_by_cloak(&self, cloak: &Cloak) -> Option<KeyMatch> {
        let table = self.inner.lock();
        if let Some((header, payload)) = table
            .identities
            .iter()
            .find(|(header, _)| cloak.matches(&header.public))
        {
            return Some(KeyMatch {
                header: header.private.duplicate(),
                payload: payload.private.duplicate(),
                session: None,
            });
        }
        table
            .sessions
            .values()
            .find(|session| cloak.matches(&session.header.public))
            .map(|session| KeyMatch {
                header: session.header.private.duplicate(),
                payload: session.payload.private.duplicate(),
                session: Some(session.id),
            })
    }

    fn find_by_header_key(&self, key: &PublicKey) -> Option<Id> {
        self.inner
            .lock()
            .sessions
            .values()
            .find(|session| &session.header.public == key)
            .map(|session| session.id)
    }

    fn decrement(&self, id: Id, amount: u64) -> Option<i64> {
        let mut table = self.inner.lock();
        let session = table.sessions.get_mut(&id)?;
        let was_exhausted = session.is_exhausted();
        let amount = i64::try_from(amount).unwrap_or(i64::MAX);
        session.balance = session.balance.saturating_sub(amount);
        if session.is_exhausted() && !was_exhausted {
            debug!(session = %id, balance = session.balance, "session exhausted");
        }
        Some(session.balance)
    }

    fn balance(&self, id: Id) -> Option<i64> {
        self.inner.lock().sessions.get(&id).map(|s| s.balance)
    }

    fn relay_rate(&self, id: Id) -> Option<u64> {
        self.inner.lock().sessions.get(&id).map(|s| s.relay_rate)
    }

    fn add(&self, session: Session) {
        self.inner.lock().sessions.insert(session.id, session);
    }

    fn add_identity(&self, header: KeyPair, payload: KeyPair) {
        self.inner.lock().identities.push((header, payload));
    }

    fn sessions(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<_> = self
            .inner
            .lock()
            .sessions
            .values()
            .map(|s| SessionSummary {
                id: s.id,
                header: s.header.public,
                balance: s.balance,
                relay_rate: s.relay_rate,
                expires_at: s.expires_at,
            })
            .collect();
        summaries.sort_by_key(|s| s.id);
        summaries
    }

    fn expire(&self, now: Instant) -> usize {
        let mut table = self.inner.lock();
        let before = table.sessions.len();
        table.sessions.retain(|_, s| s.expires_at > now);
        before - table.sessions.len()
    }
}
