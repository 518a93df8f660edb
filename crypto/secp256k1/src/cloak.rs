// Copyright (c) 2024 Botho Foundation

//! Cloaked public key references.
//!
//! A cloak is `blinder (3 bytes) || SHA256(blinder || pubkey)[..5]`. The
//! blinder is fresh per message, so two cloaks of the same key are
//! unlinkable to anyone who does not already hold the candidate key. The
//! receiver tests each of its keys with [`Cloak::matches`].

use core::fmt;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::PublicKey;

/// Length of the random blinding prefix.
pub const BLINDER_LEN: usize = 3;

/// Length of the truncated hash suffix.
pub const CLOAK_HASH_LEN: usize = 5;

/// Total cloak length on the wire.
pub const CLOAK_LEN: usize = BLINDER_LEN + CLOAK_HASH_LEN;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Cloak([u8; CLOAK_LEN]);

impl Cloak {
    /// Cloak `key` with a fresh random blinder.
    pub fn new(key: &PublicKey) -> Self {
        let mut blinder = [0u8; BLINDER_LEN];
        rand::thread_rng().fill_bytes(&mut blinder);
        Self::with_blinder(blinder, key)
    }

    /// Cloak `key` with a caller-chosen blinder.
    pub fn with_blinder(blinder: [u8; BLINDER_LEN], key: &PublicKey) -> Self {
        let mut out = [0u8; CLOAK_LEN];
        out[..BLINDER_LEN].copy_from_slice(&blinder);
        out[BLINDER_LEN..].copy_from_slice(&Self::hash(&blinder, key));
        Self(out)
    }

    /// Whether this cloak was made from `key`.
    pub fn matches(&self, key: &PublicKey) -> bool {
        let mut blinder = [0u8; BLINDER_LEN];
        blinder.copy_from_slice(&self.0[..BLINDER_LEN]);
        let expected = Self::hash(&blinder, key);
        self.0[BLINDER_LEN..].ct_eq(&expected).into()
    }

    pub fn from_bytes(bytes: [u8; CLOAK_LEN]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; CLOAK_LEN] {
        &self.0
    }

    fn hash(blinder: &[u8; BLINDER_LEN], key: &PublicKey) -> [u8; CLOAK_HASH_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(blinder);
        hasher.update(key.to_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; CLOAK_HASH_LEN];
        out.copy_from_slice(&digest[..CLOAK_HASH_LEN]);
        out
    }
}

impl fmt::Debug for Cloak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cloak({})", hex::encode(self.0))
    }
}
