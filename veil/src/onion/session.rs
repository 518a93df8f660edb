// Copyright (c) 2024 Botho Foundation

//! Session purchase.
//!
//! The buyer picks the session's header and payload keys and pays for
//! `SHA256(header || payload)`. The relay creates the session only when a
//! payment for that preimage has arrived.

use veil_crypto_secp256k1::{Hash, PrivateKey, PRIVATE_KEY_LEN};

use super::Onion;
use crate::wire::{Id, Magic, Splice, WireError, ID_LEN, MAGIC_LEN};

pub const SESSION_LEN: usize = MAGIC_LEN + ID_LEN + 2 * PRIVATE_KEY_LEN;

#[derive(Debug, PartialEq, Eq)]
pub struct Session {
    pub id: Id,
    pub header: PrivateKey,
    pub payload: PrivateKey,
    pub next: Box<Onion>,
}

impl Session {
    pub fn new(id: Id, header: PrivateKey, payload: PrivateKey) -> Self {
        Self {
            id,
            header,
            payload,
            next: Box::new(Onion::End),
        }
    }

    /// The payment preimage for this pair of keys.
    pub fn preimage(&self) -> Hash {
        preimage(&self.header, &self.payload)
    }

    pub(crate) fn encode(&self, s: &mut Splice) {
        s.write_magic(Magic::SESSION)
            .write_id(self.id)
            .write_priv_key(&self.header)
            .write_priv_key(&self.payload);
        self.next.encode(s);
    }

    pub(crate) fn decode(s: &mut Splice) -> Result<Self, WireError> {
        s.require(Magic::SESSION, SESSION_LEN - MAGIC_LEN)?;
        let id = s.read_id()?;
        let header = s.read_priv_key()?;
        let payload = s.read_priv_key()?;
        Ok(Self::new(id, header, payload))
    }
}

pub fn preimage(header: &PrivateKey, payload: &PrivateKey) -> Hash {
    let header = header.to_bytes();
    let payload = payload.to_bytes();
    Hash::digest_parts(&[&header[..], &payload[..]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preimage_depends_on_both_keys() {
        let header = PrivateKey::random();
        let payload = PrivateKey::random();
        let a = preimage(&header, &payload);

        assert_eq!(a, preimage(&header.duplicate(), &payload.duplicate()));
        assert_ne!(a, preimage(&payload, &header));
        assert_ne!(a, preimage(&header, &PrivateKey::random()));
    }
}
