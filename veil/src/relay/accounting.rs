// Copyright (c) 2024 Botho Foundation

//! Who pays for a relayed message.
//!
//! A Crypt that resolves to a paid session makes that session the payer for
//! whatever the node does next with the message. Replies assembled by this
//! node are charged once, when they are built, and then dispatched with
//! accounting switched off so their first hop is not billed a second time.

use crate::{collab::SessionStore, wire::Id};

/// Per-message accounting state carried through the dispatch loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleContext {
    /// Session matched by the most recent Crypt.
    pub session: Option<Id>,
    pub skip_accounting: bool,
}

impl HandleContext {
    /// Context for a reply this node built and already charged for.
    pub fn reply() -> Self {
        Self {
            session: None,
            skip_accounting: true,
        }
    }

    pub fn with_session(session: Option<Id>) -> Self {
        Self {
            session,
            skip_accounting: false,
        }
    }
}

/// Charge the current session for sending `bytes` at its relay rate.
pub fn charge_send(sessions: &dyn SessionStore, ctx: &HandleContext, bytes: usize) -> Option<i64> {
    if ctx.skip_accounting {
        return None;
    }
    sessions.charge(ctx.session?, bytes)
}

/// Charge the current session for an Exit round trip: the request that
/// arrived plus the reply sent back, at the service's rate.
pub fn charge_exit(
    sessions: &dyn SessionStore,
    ctx: &HandleContext,
    rate: u64,
    inbound: usize,
    reply: usize,
) -> Option<i64> {
    sessions.charge_at(ctx.session?, rate, inbound + reply)
}
