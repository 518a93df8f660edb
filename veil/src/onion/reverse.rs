// Copyright (c) 2024 Botho Foundation

//! Reply-path hop marker and the routing-header peel.
//!
//! A routing header is three `Reverse | Crypt` slots. The relay named by the
//! first slot decrypts the two slots behind it and the reply body, shifts
//! those two slots forward and refills the last slot with noise:
//!
//! ```text
//! before: [R0 C0][R1 C1][R2 C2] body
//! after:  [R1 C1][R2 C2][noise] body
//! ```
//!
//! The message keeps its length at every hop.

use veil_crypto_secp256k1::{Cipher, Iv};

use super::{
    reply::{REVERSE_CRYPT_LEN, ROUTING_HEADER_LEN},
    Onion,
};
use crate::wire::{AddrPort, Magic, Splice, WireError, ADDR_LEN, MAGIC_LEN};

pub const REVERSE_LEN: usize = MAGIC_LEN + ADDR_LEN;

#[derive(Debug, PartialEq, Eq)]
pub struct Reverse {
    pub addr: AddrPort,
    pub next: Box<Onion>,
}

impl Reverse {
    pub fn new(addr: AddrPort, next: Onion) -> Self {
        Self {
            addr,
            next: Box::new(next),
        }
    }

    pub(crate) fn encode(&self, s: &mut Splice) {
        s.write_magic(Magic::REVERSE).write_addr(&self.addr);
        self.next.encode(s);
    }

    pub(crate) fn decode(s: &mut Splice) -> Result<Self, WireError> {
        s.require(Magic::REVERSE, REVERSE_LEN - MAGIC_LEN)?;
        Ok(Self::new(s.read_addr()?, Onion::End))
    }
}

/// Peel the routing-header slot starting at `start`.
///
/// `header` and `payload` are the ciphers derived from this hop's keys and
/// `iv` is the IV of the slot's Crypt. Leaves the cursor at `start` and
/// returns whether another `Reverse` now sits there; if not, this node is
/// the final hop and the reply body begins at `start + ROUTING_HEADER_LEN`.
pub fn peel(
    s: &mut Splice,
    start: usize,
    header: &Cipher,
    payload: &Cipher,
    iv: &Iv,
) -> Result<bool, WireError> {
    let len = s.len();
    if len < start + ROUTING_HEADER_LEN {
        return Err(WireError::TooShort {
            magic: Magic::REVERSE,
            needed: ROUTING_HEADER_LEN,
            available: len.saturating_sub(start),
        });
    }

    let slots = start + REVERSE_CRYPT_LEN;
    let body = start + ROUTING_HEADER_LEN;
    s.encrypt_range(header, iv, slots, body);
    s.encrypt_range(payload, iv, body, len);

    s.copy_within(slots..body, start);
    s.fill_noise(body - REVERSE_CRYPT_LEN, body);
    debug_assert_eq!(s.len(), len);

    s.set_cursor(start);
    Ok(s.peek_magic() == Some(Magic::REVERSE))
}
