// Copyright (c) 2024 Botho Foundation

#![deny(unsafe_code)]

//! Secp256k1 key material and symmetric primitives for onion layers.
//!
//! This crate provides everything a relay needs to build and peel one layer
//! of an onion message:
//!
//! - [`PrivateKey`] / [`PublicKey`]: secp256k1 keys, public keys encoded as
//!   33-byte compressed points
//! - [`Cipher`] / [`Iv`]: AES-256-CTR keyed by `SHA256(ECDH(private, public))`
//! - [`Cloak`]: a blinded, truncated hash of a public key that only the
//!   holder of the key set can recognise
//! - [`Signature`]: ECDSA signatures for long-lived advertisements
//!
//! # Examples
//!
//! ```
//! use veil_crypto_secp256k1::{Cipher, Cloak, Iv, PrivateKey};
//!
//! let relay = PrivateKey::random();
//! let sender = PrivateKey::random();
//!
//! // Both sides derive the same stream cipher
//! let a = Cipher::derive(&sender, &relay.public_key());
//! let b = Cipher::derive(&relay, &sender.public_key());
//! assert_eq!(a.as_bytes(), b.as_bytes());
//!
//! let iv = Iv::random();
//! let mut data = *b"layer";
//! a.apply(&iv, &mut data);
//! b.apply(&iv, &mut data);
//! assert_eq!(&data, b"layer");
//!
//! // Only the key holder recognises the cloak
//! let cloak = Cloak::new(&relay.public_key());
//! assert!(cloak.matches(&relay.public_key()));
//! assert!(!cloak.matches(&sender.public_key()));
//! ```

mod cipher;
mod cloak;
mod hash;
mod keys;

pub use cipher::{Cipher, Iv, CIPHER_LEN, IV_LEN};
pub use cloak::{Cloak, BLINDER_LEN, CLOAK_HASH_LEN, CLOAK_LEN};
pub use hash::{Hash, HASH_LEN};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature, PRIVATE_KEY_LEN, PUBLIC_KEY_LEN, SIGNATURE_LEN};

/// Errors that can occur during key operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Invalid signature encoding")]
    InvalidSignature,

    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
