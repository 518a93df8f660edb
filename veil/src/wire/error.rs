// Copyright (c) 2024 Botho Foundation

//! Errors raised while reading the wire format.

use displaydoc::Display;
use thiserror::Error;
use veil_crypto_secp256k1::Error as CryptoError;

use super::Magic;

/// Errors that can occur while decoding a message.
///
/// All of these are contained to the message being decoded; the relay drops
/// the message and carries on.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum WireError {
    /// {magic}: message too short, need {needed} bytes but {available} remain
    TooShort {
        magic: Magic,
        needed: usize,
        available: usize,
    },

    /// Invalid address encoding
    InvalidAddress,

    /// Invalid key material: {0}
    InvalidKey(#[from] CryptoError),

    /// Unknown layer tag {0}
    UnknownMagic(Magic),
}
