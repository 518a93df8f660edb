// Copyright (c) 2024 Botho Foundation

//! ECDH-derived AES-256-CTR stream ciphers.
//!
//! A [`Cipher`] is the SHA-256 of the x-coordinate of an ECDH shared point.
//! Encryption and decryption are the same keystream XOR, so applying a
//! cipher twice with the same [`Iv`] over the same range restores the
//! original bytes. Onion layers rely on this to encrypt and decrypt byte
//! ranges in place.

use aes::Aes256;
use core::fmt;
use ctr::cipher::{KeyIvInit, StreamCipher};
use k256::ecdh::diffie_hellman;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Error, PrivateKey, PublicKey};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Length of a symmetric cipher key in bytes.
pub const CIPHER_LEN: usize = 32;

/// Length of an initialization vector in bytes.
pub const IV_LEN: usize = 16;

/// A 256-bit symmetric key for one onion layer.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Cipher([u8; CIPHER_LEN]);

impl Cipher {
    /// Derive the layer key shared between `private` and `public`.
    ///
    /// `derive(a, B) == derive(b, A)` for key pairs (a, A) and (b, B).
    pub fn derive(private: &PrivateKey, public: &PublicKey) -> Self {
        let shared = diffie_hellman(private.0.to_nonzero_scalar(), public.0.as_affine());
        let mut key = [0u8; CIPHER_LEN];
        key.copy_from_slice(&Sha256::digest(shared.raw_secret_bytes()));
        Self(key)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != CIPHER_LEN {
            return Err(Error::InvalidLength {
                expected: CIPHER_LEN,
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; CIPHER_LEN];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; CIPHER_LEN] {
        &self.0
    }

    pub fn duplicate(&self) -> Self {
        Self(self.0)
    }

    /// XOR the AES-CTR keystream for (`self`, `iv`) into `data`.
    ///
    /// The keystream always starts at counter `iv` for the first byte of
    /// `data`, so callers must pass the same range on both sides.
    pub fn apply(&self, iv: &Iv, data: &mut [u8]) {
        let mut stream = Aes256Ctr::new((&self.0).into(), (&iv.0).into());
        stream.apply_keystream(data);
    }
}

impl Default for Cipher {
    fn default() -> Self {
        Self([0u8; CIPHER_LEN])
    }
}

impl PartialEq for Cipher {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Cipher {}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hash = Sha256::digest(self.0);
        write!(f, "Cipher(sha256:{})", hex::encode(&hash[..4]))
    }
}

/// A 16-byte CTR initialization vector.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Iv([u8; IV_LEN]);

impl Iv {
    pub fn random() -> Self {
        let mut bytes = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; IV_LEN]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }
}

impl fmt::Debug for Iv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iv({})", hex::encode(self.0))
    }
}
