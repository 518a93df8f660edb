// Copyright (c) 2024 Botho Foundation

//! Anonymous reply paths.
//!
//! A [`ReplyPath`] lets a node answer a request without learning where the
//! answer goes. The requester builds a three-slot routing header through two
//! relays and back to itself, and hands the replier the three payload
//! ciphers. The replier prepends the header to its answer and encrypts the
//! answer body under all three ciphers; each hop on the way back strips one.

use std::fmt;
use veil_crypto_secp256k1::{Cipher, Iv, PrivateKey, PublicKey, CIPHER_LEN, IV_LEN};

use super::{assemble, crypt::CRYPT_LEN, reverse::REVERSE_LEN, Crypt, CryptKeys, Onion, Reverse};
use crate::wire::{AddrPort, Magic, Splice, WireError};

/// Number of hops in every reply path.
pub const REPLY_HOPS: usize = 3;

/// One `Reverse | Crypt` slot of a routing header.
pub const REVERSE_CRYPT_LEN: usize = REVERSE_LEN + CRYPT_LEN;

pub const ROUTING_HEADER_LEN: usize = REPLY_HOPS * REVERSE_CRYPT_LEN;

pub const REPLY_PATH_LEN: usize = ROUTING_HEADER_LEN + REPLY_HOPS * (CIPHER_LEN + IV_LEN);

/// A relay and the keys used to address it.
///
/// For relays the keys are those of the session the local node holds there;
/// for the local node they are its own reply keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    pub addr: AddrPort,
    pub header: PublicKey,
    pub payload: PublicKey,
}

/// Pre-encrypted routing header bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct RoutingHeader([u8; ROUTING_HEADER_LEN]);

impl RoutingHeader {
    pub fn from_bytes(bytes: [u8; ROUTING_HEADER_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ROUTING_HEADER_LEN] {
        &self.0
    }
}

impl fmt::Debug for RoutingHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoutingHeader({}..)", hex::encode(&self.0[..8]))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ReplyPath {
    pub header: RoutingHeader,
    pub ciphers: [Cipher; REPLY_HOPS],
    pub nonces: [Iv; REPLY_HOPS],
}

impl ReplyPath {
    /// Build a path back through `hops`; the last hop is the requester.
    pub fn build(hops: &[Hop; REPLY_HOPS]) -> Self {
        let ephemerals: [PrivateKey; REPLY_HOPS] = std::array::from_fn(|_| PrivateKey::random());
        let nonces: [Iv; REPLY_HOPS] = std::array::from_fn(|_| Iv::random());

        let mut layers = Vec::with_capacity(2 * REPLY_HOPS);
        for (i, hop) in hops.iter().enumerate() {
            layers.push(Onion::Reverse(Reverse::new(hop.addr, Onion::End)));
            layers.push(Onion::Crypt(Crypt {
                depth: (REPLY_HOPS - i) as u8,
                iv: nonces[i],
                keys: CryptKeys::Seal {
                    header: hop.header,
                    payload: hop.payload,
                    ephemeral: ephemerals[i].duplicate(),
                },
                next: Box::new(Onion::End),
            }));
        }

        let bytes = assemble(layers).to_bytes();
        let mut header = [0u8; ROUTING_HEADER_LEN];
        header.copy_from_slice(&bytes);

        let ciphers = std::array::from_fn(|i| Cipher::derive(&ephemerals[i], &hops[i].payload));
        Self {
            header: RoutingHeader(header),
            ciphers,
            nonces,
        }
    }

    /// The relay the path starts at, read from the clear front slot.
    pub fn first_hop(&self) -> Result<AddrPort, WireError> {
        let mut s = Splice::load(self.header.as_bytes()[..REVERSE_LEN].to_vec());
        let magic = s.read_magic()?;
        if magic != Magic::REVERSE {
            return Err(WireError::UnknownMagic(magic));
        }
        s.read_addr()
    }

    /// Encrypt a reply body under every hop's payload cipher.
    ///
    /// Each keystream starts at the first body byte, so the order the hops
    /// remove them in does not matter.
    pub fn seal(&self, body: &mut [u8]) {
        for (cipher, iv) in self.ciphers.iter().zip(&self.nonces) {
            cipher.apply(iv, body);
        }
    }

    /// Prepend the routing header to `body` and seal it.
    pub fn assemble(&self, body: &Onion) -> Vec<u8> {
        let mut s = Splice::new(ROUTING_HEADER_LEN + body.len());
        s.write_raw(self.header.as_bytes());
        body.encode(&mut s);
        self.finish(s.into_bytes())
    }

    /// Like [`assemble`](Self::assemble) for an already encoded body.
    pub fn assemble_raw(&self, body: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ROUTING_HEADER_LEN + body.len());
        bytes.extend_from_slice(self.header.as_bytes());
        bytes.extend_from_slice(body);
        self.finish(bytes)
    }

    fn finish(&self, mut bytes: Vec<u8>) -> Vec<u8> {
        self.seal(&mut bytes[ROUTING_HEADER_LEN..]);
        bytes
    }

    pub fn duplicate(&self) -> Self {
        Self {
            header: self.header.clone(),
            ciphers: std::array::from_fn(|i| self.ciphers[i].duplicate()),
            nonces: self.nonces,
        }
    }

    pub(crate) fn encode(&self, s: &mut Splice) {
        s.write_raw(self.header.as_bytes())
            .write_ciphers(&self.ciphers)
            .write_nonces(&self.nonces);
    }

    pub(crate) fn decode(s: &mut Splice) -> Result<Self, WireError> {
        let mut header = [0u8; ROUTING_HEADER_LEN];
        header.copy_from_slice(&s.read_raw(ROUTING_HEADER_LEN)?);
        Ok(Self {
            header: RoutingHeader(header),
            ciphers: s.read_ciphers()?,
            nonces: s.read_nonces()?,
        })
    }
}
