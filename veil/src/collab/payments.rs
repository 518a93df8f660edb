// Copyright (c) 2024 Botho Foundation

//! Session payments.
//!
//! Payment itself happens outside the onion network. A client pays for a
//! session by committing to the hash of the session's private keys; when
//! the relay later receives the matching `Session` layer it claims the
//! payment and opens the session.

use parking_lot::Mutex;
use std::collections::HashMap;
use veil_crypto_secp256k1::Hash;

use crate::wire::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payment {
    pub id: Id,
    /// Credit granted; zero means the relay's default allowance.
    pub amount: u64,
}

pub trait Payments: Send + Sync {
    /// Take the payment committed to `preimage`. Each payment can be
    /// claimed once.
    fn claim(&self, preimage: &Hash) -> Option<Payment>;
}

/// In-memory [`Payments`] keyed by preimage.
#[derive(Default)]
pub struct PaymentLedger {
    received: Mutex<HashMap<Hash, Payment>>,
}

impl PaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an incoming payment.
    pub fn receive(&self, preimage: Hash, payment: Payment) {
        self.received.lock().insert(preimage, payment);
    }

    pub fn len(&self) -> usize {
        self.received.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Payments for PaymentLedger {
    fn claim(&self, preimage: &Hash) -> Option<Payment> {
        self.received.lock().remove(preimage)
    }
}
