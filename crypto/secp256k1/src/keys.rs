// Copyright (c) 2024 Botho Foundation

//! Secp256k1 private and public keys.

use core::fmt;
use k256::{
    ecdsa::{
        signature::{Signer, Verifier},
        Signature as K256Signature, SigningKey, VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
    SecretKey,
};
use rand_core::{CryptoRngCore, OsRng};
use zeroize::Zeroizing;

use crate::Error;

/// Length of a compressed secp256k1 public key.
pub const PUBLIC_KEY_LEN: usize = 33;

/// Length of a serialized private key scalar.
pub const PRIVATE_KEY_LEN: usize = 32;

/// Length of a fixed-size (r || s) ECDSA signature.
pub const SIGNATURE_LEN: usize = 64;

/// A secp256k1 private key.
///
/// The inner scalar is zeroized when dropped. Clone is intentionally not
/// derived; use [`PrivateKey::duplicate`] when a second copy is required.
pub struct PrivateKey(pub(crate) SecretKey);

impl PrivateKey {
    /// Generate a key from the given cryptographically secure RNG.
    pub fn generate<R: CryptoRngCore>(rng: &mut R) -> Self {
        Self(SecretKey::random(rng))
    }

    /// Generate a key from the operating system RNG.
    pub fn random() -> Self {
        Self::generate(&mut OsRng)
    }

    /// Parse a big-endian 32-byte scalar.
    pub fn from_bytes(bytes: &[u8; PRIVATE_KEY_LEN]) -> Result<Self, Error> {
        SecretKey::from_bytes(bytes.into())
            .map(Self)
            .map_err(|_| Error::InvalidPrivateKey)
    }

    /// Serialize the scalar. The returned buffer is zeroized on drop.
    pub fn to_bytes(&self) -> Zeroizing<[u8; PRIVATE_KEY_LEN]> {
        let mut out = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
        out.copy_from_slice(&self.0.to_bytes());
        out
    }

    /// Derive the matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.public_key())
    }

    /// Sign a message (SHA-256 prehash, RFC 6979 nonce).
    pub fn sign(&self, message: &[u8]) -> Signature {
        let signing_key = SigningKey::from(&self.0);
        let signature: K256Signature = signing_key.sign(message);
        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(&signature.to_bytes());
        Signature(out)
    }

    /// Create an explicit copy of this key.
    ///
    /// Both copies are independently zeroized on drop.
    pub fn duplicate(&self) -> Self {
        Self(self.0.clone())
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        // SecretKey compares in constant time
        self.0 == other.0
    }
}

impl Eq for PrivateKey {}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the scalar, only the public half
        write!(f, "PrivateKey(pub:{})", self.public_key())
    }
}

/// A secp256k1 public key, 33 bytes on the wire.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(pub(crate) k256::PublicKey);

impl PublicKey {
    /// Parse a SEC1 compressed (or uncompressed) point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        k256::PublicKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| Error::InvalidPublicKey)
    }

    /// The 33-byte compressed encoding.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        let point = self.0.to_encoded_point(true);
        let mut out = [0u8; PUBLIC_KEY_LEN];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Verify an ECDSA signature produced by [`PrivateKey::sign`].
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(sig) = K256Signature::from_slice(&signature.0) else {
            return false;
        };
        VerifyingKey::from(&self.0).verify(message, &sig).is_ok()
    }
}

impl core::hash::Hash for PublicKey {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.to_bytes()[..8]))
    }
}

/// A fixed-size ECDSA signature (r || s).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let arr: [u8; SIGNATURE_LEN] = bytes.try_into().map_err(|_| Error::InvalidLength {
            expected: SIGNATURE_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self([0u8; SIGNATURE_LEN])
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.0[..8]))
    }
}

/// A private key together with its public key.
#[derive(Debug)]
pub struct KeyPair {
    pub private: PrivateKey,
    pub public: PublicKey,
}

impl KeyPair {
    pub fn random() -> Self {
        Self::from_private(PrivateKey::random())
    }

    pub fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }

    pub fn duplicate(&self) -> Self {
        Self {
            private: self.private.duplicate(),
            public: self.public,
        }
    }
}
