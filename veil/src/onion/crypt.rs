// Copyright (c) 2024 Botho Foundation

//! Single-hop asymmetric envelope.
//!
//! ```text
//! magic(4) | iv(16) | cloak(8) | ephemeral public key(33) | encrypted remainder
//! ```
//!
//! The remainder up to the depth boundary is encrypted with
//! `SHA256(ECDH(ephemeral, header))`; anything after the boundary with
//! `SHA256(ECDH(ephemeral, payload))`. Depth 0 means the whole remainder
//! uses the header key.

use veil_crypto_secp256k1::{Cipher, Cloak, Iv, PrivateKey, PublicKey, CLOAK_LEN, IV_LEN, PUBLIC_KEY_LEN};

use super::{reply::REVERSE_CRYPT_LEN, Onion};
use crate::wire::{Magic, Splice, WireError, MAGIC_LEN};

pub const CRYPT_LEN: usize = MAGIC_LEN + IV_LEN + CLOAK_LEN + PUBLIC_KEY_LEN;

/// Key material of a [`Crypt`], depending on which side holds it.
#[derive(Debug, PartialEq, Eq)]
pub enum CryptKeys {
    /// Built by a sender: encrypt to `header`/`payload` with a one-time key.
    Seal {
        header: PublicKey,
        payload: PublicKey,
        ephemeral: PrivateKey,
    },
    /// Read off the wire: the recipient resolves `cloak` to a local key.
    Open { cloak: Cloak, ephemeral: PublicKey },
}

#[derive(Debug, PartialEq, Eq)]
pub struct Crypt {
    pub depth: u8,
    pub iv: Iv,
    pub keys: CryptKeys,
    pub next: Box<Onion>,
}

impl Crypt {
    /// Encrypt `next` to a recipient with a fresh ephemeral key and IV.
    pub fn new(header: PublicKey, payload: PublicKey, next: Onion) -> Self {
        Self {
            depth: 0,
            iv: Iv::random(),
            keys: CryptKeys::Seal {
                header,
                payload,
                ephemeral: PrivateKey::random(),
            },
            next: Box::new(next),
        }
    }

    pub fn with_depth(mut self, depth: u8) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_iv(mut self, iv: Iv) -> Self {
        self.iv = iv;
        self
    }

    /// The sender's one-time public key as it appears on the wire.
    pub fn ephemeral_public(&self) -> PublicKey {
        match &self.keys {
            CryptKeys::Seal { ephemeral, .. } => ephemeral.public_key(),
            CryptKeys::Open { ephemeral, .. } => *ephemeral,
        }
    }

    /// The cloak read off the wire, if this layer was decoded.
    pub fn cloak(&self) -> Option<&Cloak> {
        match &self.keys {
            CryptKeys::Open { cloak, .. } => Some(cloak),
            CryptKeys::Seal { .. } => None,
        }
    }

    pub(crate) fn encode(&self, s: &mut Splice) {
        s.write_magic(Magic::CRYPT).write_iv(&self.iv);
        match &self.keys {
            CryptKeys::Seal {
                header,
                payload,
                ephemeral,
            } => {
                s.write_cloak(&Cloak::new(header))
                    .write_pub_key(&ephemeral.public_key());
                let start = s.cursor();
                self.next.encode(s);
                // Bytes already placed after the nested layers are sealed too
                let end = s.len();

                let boundary = header_boundary(self.depth, start, end);
                s.encrypt_range(&Cipher::derive(ephemeral, header), &self.iv, start, boundary);
                if boundary < end {
                    s.encrypt_range(&Cipher::derive(ephemeral, payload), &self.iv, boundary, end);
                }
            }
            CryptKeys::Open { cloak, ephemeral } => {
                s.write_cloak(cloak).write_pub_key(ephemeral);
                self.next.encode(s);
            }
        }
    }

    pub(crate) fn decode(s: &mut Splice) -> Result<Self, WireError> {
        s.require(Magic::CRYPT, CRYPT_LEN - MAGIC_LEN)?;
        let iv = s.read_iv()?;
        let cloak = s.read_cloak()?;
        let ephemeral = s.read_pub_key()?;
        Ok(Self {
            depth: 0,
            iv,
            keys: CryptKeys::Open { cloak, ephemeral },
            next: Box::new(Onion::End),
        })
    }
}

/// End of the header-key range for a Crypt whose body starts at `start`.
///
/// Inside a routing header a Crypt at depth `d` covers only the `d - 1`
/// reverse slots that follow it.
pub fn header_boundary(depth: u8, start: usize, end: usize) -> usize {
    if depth == 0 {
        end
    } else {
        (start + (depth as usize - 1) * REVERSE_CRYPT_LEN).min(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onion::Confirmation;
    use crate::wire::Id;
    use veil_crypto_secp256k1::KeyPair;

    #[test]
    fn test_header_boundary() {
        assert_eq!(header_boundary(0, 100, 500), 500);
        assert_eq!(header_boundary(1, 100, 500), 100);
        assert_eq!(header_boundary(2, 100, 500), 100 + REVERSE_CRYPT_LEN);
        assert_eq!(header_boundary(3, 100, 200), 200);
    }

    #[test]
    fn test_recipient_can_decrypt() {
        let header = KeyPair::random();
        let payload = KeyPair::random();
        let inner = Onion::Confirmation(Confirmation { id: Id(7) });
        let crypt = Crypt::new(header.public, payload.public, inner);
        let ephemeral = crypt.ephemeral_public();

        let mut s = Splice::load(Onion::Crypt(crypt).to_bytes());
        assert_eq!(s.read_magic().unwrap(), Magic::CRYPT);
        let decoded = Crypt::decode(&mut s).unwrap();
        assert_eq!(s.cursor(), CRYPT_LEN);
        assert!(decoded.cloak().unwrap().matches(&header.public));
        assert_eq!(decoded.ephemeral_public(), ephemeral);

        // Body is ciphertext until the recipient applies its key
        assert_ne!(s.peek_magic(), Some(Magic::CONFIRMATION));
        let cipher = Cipher::derive(&header.private, &ephemeral);
        let (start, end) = (s.cursor(), s.len());
        s.encrypt_range(&cipher, &decoded.iv, start, end);
        assert_eq!(s.peek_magic(), Some(Magic::CONFIRMATION));
    }

    #[test]
    fn test_wrong_key_leaves_garbage() {
        let header = KeyPair::random();
        let crypt = Crypt::new(
            header.public,
            header.public,
            Onion::Confirmation(Confirmation { id: Id(1) }),
        );
        let ephemeral = crypt.ephemeral_public();

        let mut s = Splice::load(Onion::Crypt(crypt).to_bytes());
        s.read_magic().unwrap();
        let decoded = Crypt::decode(&mut s).unwrap();
        let cipher = Cipher::derive(&PrivateKey::random(), &ephemeral);
        let (start, end) = (s.cursor(), s.len());
        s.encrypt_range(&cipher, &decoded.iv, start, end);
        assert_ne!(s.peek_magic(), Some(Magic::CONFIRMATION));
    }
}
