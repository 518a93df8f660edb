// Copyright (c) 2024 Botho Foundation

//! Hidden-service control layers.
//!
//! A service advertises itself to an introducer with a signed [`IntroAd`]
//! and a reply path ([`HiddenService`]). Clients fetch the ad with an
//! [`IntroQuery`], then send a [`Route`] sealed to the service key, which
//! the introducer passes along the stored path. The service answers with
//! [`Ready`] and both sides continue with [`Whisper`]s, each carrying a
//! fresh reply path for the next message.

use std::time::{SystemTime, UNIX_EPOCH};
use veil_crypto_secp256k1::{
    Cipher, Cloak, Iv, PrivateKey, PublicKey, Signature, CLOAK_LEN, IV_LEN, PUBLIC_KEY_LEN,
    SIGNATURE_LEN,
};

use super::reply::{ReplyPath, REPLY_PATH_LEN};
use crate::wire::{
    AddrPort, Id, Magic, Splice, WireError, ADDR_LEN, BYTES_PREFIX_LEN, ID_LEN, MAGIC_LEN,
    U64_LEN,
};

pub const INTRO_AD_LEN: usize = ID_LEN + PUBLIC_KEY_LEN + ADDR_LEN + 2 * U64_LEN + SIGNATURE_LEN;

pub const HIDDEN_SERVICE_LEN: usize = MAGIC_LEN + INTRO_AD_LEN + REPLY_PATH_LEN;

pub const INTRO_QUERY_LEN: usize = MAGIC_LEN + ID_LEN + PUBLIC_KEY_LEN + REPLY_PATH_LEN;

/// The part of a Route encrypted to the service key.
pub const ROUTE_BODY_LEN: usize = ID_LEN + REPLY_PATH_LEN;

pub const ROUTE_LEN: usize = MAGIC_LEN + CLOAK_LEN + PUBLIC_KEY_LEN + IV_LEN + ROUTE_BODY_LEN;

pub const READY_LEN: usize = MAGIC_LEN + ID_LEN + REPLY_PATH_LEN;

/// Length of a Whisper with an empty payload.
pub const WHISPER_LEN: usize = MAGIC_LEN + ID_LEN + REPLY_PATH_LEN + BYTES_PREFIX_LEN;

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A hidden service's signed advertisement of where it can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntroAd {
    pub id: Id,
    /// The service's long-term key.
    pub key: PublicKey,
    /// The introducer holding the service's reply path.
    pub addr: AddrPort,
    pub relay_rate: u64,
    /// Expiry, seconds since the Unix epoch.
    pub expiry: u64,
    pub signature: Signature,
}

impl IntroAd {
    /// Create an ad signed by `service`.
    pub fn new(id: Id, service: &PrivateKey, addr: AddrPort, relay_rate: u64, expiry: SystemTime) -> Self {
        let mut ad = Self {
            id,
            key: service.public_key(),
            addr,
            relay_rate,
            expiry: unix_secs(expiry),
            signature: Signature::default(),
        };
        ad.signature = service.sign(&ad.signed_bytes());
        ad
    }

    fn signed_bytes(&self) -> Vec<u8> {
        let mut s = Splice::new(INTRO_AD_LEN - SIGNATURE_LEN);
        s.write_id(self.id)
            .write_pub_key(&self.key)
            .write_addr(&self.addr)
            .write_u64(self.relay_rate)
            .write_u64(self.expiry);
        s.into_bytes()
    }

    pub fn verify(&self) -> bool {
        self.key.verify(&self.signed_bytes(), &self.signature)
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        unix_secs(now) > self.expiry
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut s = Splice::new(INTRO_AD_LEN);
        self.encode(&mut s);
        s.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let mut s = Splice::load(bytes.to_vec());
        s.set_context(Magic::HIDDEN_SERVICE);
        Self::decode(&mut s)
    }

    pub(crate) fn encode(&self, s: &mut Splice) {
        s.write_id(self.id)
            .write_pub_key(&self.key)
            .write_addr(&self.addr)
            .write_u64(self.relay_rate)
            .write_u64(self.expiry)
            .write_signature(&self.signature);
    }

    pub(crate) fn decode(s: &mut Splice) -> Result<Self, WireError> {
        s.require(s.context(), INTRO_AD_LEN)?;
        Ok(Self {
            id: s.read_id()?,
            key: s.read_pub_key()?,
            addr: s.read_addr()?,
            relay_rate: s.read_u64()?,
            expiry: s.read_u64()?,
            signature: s.read_signature()?,
        })
    }
}

/// Registers `intro` and a path to the service with an introducer.
#[derive(Debug, PartialEq, Eq)]
pub struct HiddenService {
    pub intro: IntroAd,
    pub reply: ReplyPath,
}

impl HiddenService {
    pub(crate) fn encode(&self, s: &mut Splice) {
        s.write_magic(Magic::HIDDEN_SERVICE);
        self.intro.encode(s);
        self.reply.encode(s);
    }

    pub(crate) fn decode(s: &mut Splice) -> Result<Self, WireError> {
        s.require(Magic::HIDDEN_SERVICE, HIDDEN_SERVICE_LEN - MAGIC_LEN)?;
        Ok(Self {
            intro: IntroAd::decode(s)?,
            reply: ReplyPath::decode(s)?,
        })
    }
}

/// Ask an introducer for the ad of the service with `key`.
#[derive(Debug, PartialEq, Eq)]
pub struct IntroQuery {
    pub id: Id,
    pub key: PublicKey,
    pub reply: ReplyPath,
}

impl IntroQuery {
    pub(crate) fn encode(&self, s: &mut Splice) {
        s.write_magic(Magic::INTRO_QUERY)
            .write_id(self.id)
            .write_pub_key(&self.key);
        self.reply.encode(s);
    }

    pub(crate) fn decode(s: &mut Splice) -> Result<Self, WireError> {
        s.require(Magic::INTRO_QUERY, INTRO_QUERY_LEN - MAGIC_LEN)?;
        Ok(Self {
            id: s.read_id()?,
            key: s.read_pub_key()?,
            reply: ReplyPath::decode(s)?,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RouteKeys {
    /// Built by the client.
    Seal {
        service: PublicKey,
        ephemeral: PrivateKey,
        id: Id,
        reply: ReplyPath,
    },
    /// Read off the wire; `body` is still encrypted to the service key.
    Open {
        cloak: Cloak,
        ephemeral: PublicKey,
        body: Vec<u8>,
    },
}

/// Connection request sealed to a hidden service's long-term key.
#[derive(Debug, PartialEq, Eq)]
pub struct Route {
    pub iv: Iv,
    pub keys: RouteKeys,
}

impl Route {
    pub fn new(service: PublicKey, id: Id, reply: ReplyPath) -> Self {
        Self {
            iv: Iv::random(),
            keys: RouteKeys::Seal {
                service,
                ephemeral: PrivateKey::random(),
                id,
                reply,
            },
        }
    }

    pub fn cloak(&self) -> Option<&Cloak> {
        match &self.keys {
            RouteKeys::Open { cloak, .. } => Some(cloak),
            RouteKeys::Seal { .. } => None,
        }
    }

    /// Decrypt the connection id and the client's reply path.
    pub fn open(&self, service: &PrivateKey) -> Result<(Id, ReplyPath), WireError> {
        match &self.keys {
            RouteKeys::Seal { id, reply, .. } => Ok((*id, reply.duplicate())),
            RouteKeys::Open {
                ephemeral, body, ..
            } => {
                let mut body = body.clone();
                Cipher::derive(service, ephemeral).apply(&self.iv, &mut body);
                let mut s = Splice::load(body);
                s.set_context(Magic::ROUTE);
                Ok((s.read_id()?, ReplyPath::decode(&mut s)?))
            }
        }
    }

    pub(crate) fn encode(&self, s: &mut Splice) {
        s.write_magic(Magic::ROUTE);
        match &self.keys {
            RouteKeys::Seal {
                service,
                ephemeral,
                id,
                reply,
            } => {
                s.write_cloak(&Cloak::new(service))
                    .write_pub_key(&ephemeral.public_key())
                    .write_iv(&self.iv);
                let start = s.cursor();
                s.write_id(*id);
                reply.encode(s);
                let end = s.cursor();
                s.encrypt_range(&Cipher::derive(ephemeral, service), &self.iv, start, end);
            }
            RouteKeys::Open {
                cloak,
                ephemeral,
                body,
            } => {
                s.write_cloak(cloak)
                    .write_pub_key(ephemeral)
                    .write_iv(&self.iv)
                    .write_raw(body);
            }
        }
    }

    pub(crate) fn decode(s: &mut Splice) -> Result<Self, WireError> {
        s.require(Magic::ROUTE, ROUTE_LEN - MAGIC_LEN)?;
        let cloak = s.read_cloak()?;
        let ephemeral = s.read_pub_key()?;
        let iv = s.read_iv()?;
        let body = s.read_raw(ROUTE_BODY_LEN)?;
        Ok(Self {
            iv,
            keys: RouteKeys::Open {
                cloak,
                ephemeral,
                body,
            },
        })
    }
}

/// The service accepted connection `id`; `reply` reaches the service.
#[derive(Debug, PartialEq, Eq)]
pub struct Ready {
    pub id: Id,
    pub reply: ReplyPath,
}

impl Ready {
    pub(crate) fn encode(&self, s: &mut Splice) {
        s.write_magic(Magic::READY).write_id(self.id);
        self.reply.encode(s);
    }

    pub(crate) fn decode(s: &mut Splice) -> Result<Self, WireError> {
        s.require(Magic::READY, READY_LEN - MAGIC_LEN)?;
        Ok(Self {
            id: s.read_id()?,
            reply: ReplyPath::decode(s)?,
        })
    }
}

/// A message on an established hidden-service connection.
#[derive(Debug, PartialEq, Eq)]
pub struct Whisper {
    pub id: Id,
    pub reply: ReplyPath,
    pub bytes: Vec<u8>,
}

impl Whisper {
    pub(crate) fn len(&self) -> usize {
        WHISPER_LEN + self.bytes.len()
    }

    pub(crate) fn encode(&self, s: &mut Splice) {
        s.write_magic(Magic::WHISPER).write_id(self.id);
        self.reply.encode(s);
        s.write_bytes(&self.bytes);
    }

    pub(crate) fn decode(s: &mut Splice) -> Result<Self, WireError> {
        s.require(Magic::WHISPER, WHISPER_LEN - MAGIC_LEN)?;
        Ok(Self {
            id: s.read_id()?,
            reply: ReplyPath::decode(s)?,
            bytes: s.read_bytes()?,
        })
    }
}
