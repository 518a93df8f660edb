// Copyright (c) 2024 Botho Foundation

//! Relays available for building reply paths.

use parking_lot::RwLock;

use crate::onion::Hop;

pub trait PeerDirectory: Send + Sync {
    /// Up to `n` relay hops the local node holds sessions with, in the
    /// order a reply should traverse them.
    fn reply_hops(&self, n: usize) -> Vec<Hop>;
}

/// A fixed list of hops, used in configured order.
#[derive(Default)]
pub struct StaticPeers {
    hops: RwLock<Vec<Hop>>,
}

impl StaticPeers {
    pub fn new(hops: Vec<Hop>) -> Self {
        Self {
            hops: RwLock::new(hops),
        }
    }

    pub fn push(&self, hop: Hop) {
        self.hops.write().push(hop);
    }
}

impl PeerDirectory for StaticPeers {
    fn reply_hops(&self, n: usize) -> Vec<Hop> {
        self.hops.read().iter().take(n).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_crypto_secp256k1::KeyPair;

    fn hop(port: u16) -> Hop {
        Hop {
            addr: format!("127.0.0.1:{}", port).parse().unwrap(),
            header: KeyPair::random().public,
            payload: KeyPair::random().public,
        }
    }

    #[test]
    fn test_reply_hops_in_order() {
        let peers = StaticPeers::new(vec![hop(1), hop(2), hop(3)]);
        let chosen = peers.reply_hops(2);
        assert_eq!(chosen.len(), 2);
        assert_eq!(chosen[0].addr.port(), 1);
        assert_eq!(chosen[1].addr.port(), 2);
    }

    #[test]
    fn test_too_few_peers() {
        let peers = StaticPeers::default();
        assert!(peers.reply_hops(2).is_empty());
        peers.push(hop(5));
        assert_eq!(peers.reply_hops(2).len(), 1);
    }
}
