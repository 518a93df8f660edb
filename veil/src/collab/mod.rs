// Copyright (c) 2024 Botho Foundation

//! Collaborators the engine relies on but does not own.
//!
//! Each concern is a trait so a node can plug in real storage, payment
//! channels or sockets. The in-memory implementations here back the tests
//! and single-process networks.

mod hidden;
mod payments;
mod peers;
mod pending;
mod service;
mod sessions;
mod transport;

pub use hidden::{HiddenServiceStore, HiddenServices, LocalHiddenService, WhisperHandler};
pub use payments::{Payment, PaymentLedger, Payments};
pub use peers::{PeerDirectory, StaticPeers};
pub use pending::{Callback, Completion, CorrelationKey, PendingResponse, PendingResponses};
pub use service::{Handler, LocalService, ServiceDirectory};
pub use sessions::{cost, KeyMatch, Session, SessionManager, SessionStore, SessionSummary};
pub use transport::{MemoryNetwork, MemoryTransport, Transport, TransportError};

use std::time::{Duration, Instant, SystemTime};

/// Cap on how far ahead a deadline is placed.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// `now + ttl` for a monotonic deadline, capped instead of overflowing.
pub(crate) fn deadline_after(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE)
}

/// `now + ttl` on the wall clock, capped instead of overflowing.
pub(crate) fn expiry_after(ttl: Duration) -> SystemTime {
    let now = SystemTime::now();
    now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadlines_saturate() {
        assert!(deadline_after(Duration::MAX) > Instant::now() + Duration::from_secs(3600));
        assert!(expiry_after(Duration::MAX) > SystemTime::now() + Duration::from_secs(3600));
    }

    #[test]
    fn test_deadline_after_short_ttl() {
        let before = Instant::now();
        let deadline = deadline_after(Duration::from_secs(5));
        assert!(deadline >= before + Duration::from_secs(5));
        assert!(deadline <= Instant::now() + Duration::from_secs(5));
    }
}
