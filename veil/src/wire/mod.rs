// Copyright (c) 2024 Botho Foundation

//! Binary wire format.
//!
//! Every onion layer is a 4-byte [`Magic`] tag followed by fixed-width
//! fields. Integers are little-endian. The [`Splice`] buffer writes and
//! reads those fields at a cursor and exposes byte ranges for in-place
//! encryption.

mod address;
mod error;
mod magic;
mod splice;

pub use address::{AddrPort, ADDR_LEN};
pub use error::WireError;
pub use magic::{Magic, MAGIC_LEN};
pub use splice::Splice;

use rand::RngCore;
use std::fmt;

pub use veil_crypto_secp256k1::{
    CIPHER_LEN, CLOAK_LEN, HASH_LEN, IV_LEN, PRIVATE_KEY_LEN, PUBLIC_KEY_LEN, SIGNATURE_LEN,
};

/// Length of an [`Id`] on the wire.
pub const ID_LEN: usize = 8;

/// Length of a duration (u64 nanoseconds).
pub const DURATION_LEN: usize = 8;

/// Length of a signed balance.
pub const BALANCE_LEN: usize = 8;

/// Length of the u32 prefix in front of variable byte payloads.
pub const BYTES_PREFIX_LEN: usize = 4;

/// Length of a port number.
pub const PORT_LEN: usize = 2;

/// Length of a u64 rate or timestamp.
pub const U64_LEN: usize = 8;

/// A 64-bit identifier for requests, sessions and hidden-service
/// connections.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(pub u64);

impl Id {
    pub fn random() -> Self {
        Self(rand::thread_rng().next_u64())
    }
}

impl From<u64> for Id {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({:016x})", self.0)
    }
}
