// Copyright (c) 2024 Botho Foundation

//! Hidden-service state.
//!
//! One store serves three roles. An introducer keeps the intro ads and
//! reply paths services registered with it. A service keeps its own
//! long-term keys so it can recognise Route cloaks. Both ends of a
//! connection keep the peer's latest reply path per connection id.

use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::SystemTime};
use tracing::debug;
use veil_crypto_secp256k1::{Cloak, KeyPair, PublicKey};

use crate::{
    onion::{IntroAd, ReplyPath},
    wire::Id,
};

/// A hidden service hosted on this node.
#[derive(Debug)]
pub struct LocalHiddenService {
    pub key: KeyPair,
    pub intro: IntroAd,
}

pub trait HiddenServiceStore: Send + Sync {
    fn add_intro(&self, ad: IntroAd, path: ReplyPath);

    fn find_intro(&self, key: &PublicKey) -> Option<IntroAd>;

    fn find_intro_by_cloak(&self, cloak: &Cloak) -> Option<(IntroAd, ReplyPath)>;

    fn add_service(&self, service: LocalHiddenService);

    /// The long-term key of a local service whose public key matches
    /// `cloak`.
    fn find_service_by_cloak(&self, cloak: &Cloak) -> Option<KeyPair>;

    fn set_return_path(&self, id: Id, path: ReplyPath);

    /// Remove and return the peer's reply path for `id`. A path carries
    /// one message; the next one needs the fresh path the peer sends back.
    fn take_return_path(&self, id: Id) -> Option<ReplyPath>;

    /// Hand a whisper payload to the application. Returns false if nothing
    /// consumes whispers here.
    fn deliver_whisper(&self, id: Id, bytes: Vec<u8>) -> bool;

    /// Drop intro ads that expired before `now`.
    fn expire(&self, now: SystemTime) -> usize;
}

pub type WhisperHandler = Arc<dyn Fn(Id, Vec<u8>) + Send + Sync>;

#[derive(Default)]
struct HiddenTable {
    intros: HashMap<PublicKey, (IntroAd, ReplyPath)>,
    services: Vec<LocalHiddenService>,
    return_paths: HashMap<Id, ReplyPath>,
}

/// In-memory [`HiddenServiceStore`].
#[derive(Default)]
pub struct HiddenServices {
    inner: Mutex<HiddenTable>,
    on_whisper: Option<WhisperHandler>,
}

impl HiddenServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_whisper_handler<F>(handler: F) -> Self
    where
        F: Fn(Id, Vec<u8>) + Send + Sync + 'static,
    {
        Self {
            inner: Mutex::default(),
            on_whisper: Some(Arc::new(handler)),
        }
    }

    pub fn intro_count(&self) -> usize {
        self.inner.lock().intros.len()
    }
}

impl HiddenServiceStore for HiddenServices {
    fn add_intro(&self, ad: IntroAd, path: ReplyPath) {
        self.inner.lock().intros.insert(ad.key, (ad, path));
    }

    fn find_intro(&self, key: &PublicKey) -> Option<IntroAd> {
        self.inner.lock().intros.get(key).map(|(ad, _)| ad.clone())
    }

    fn find_intro_by_cloak(&self, cloak: &Cloak) -> Option<(IntroAd, ReplyPath)> {
        self.inner
            .lock()
            .intros
            .values()
            .find(|(ad, _)| cloak.matches(&ad.key))
            .map(|(ad, path)| (ad.clone(), path.duplicate()))
    }

    fn add_service(&self, service: LocalHiddenService) {
        self.inner.lock().services.push(service);
    }

    fn find_service_by_cloak(&self, cloak: &Cloak) -> Option<KeyPair> {
        self.inner
            .lock()
            .services
            .iter()
            .find(|s| cloak.matches(&s.key.public))
            .map(|s| s.key.duplicate())
    }

    fn set_return_path(&self, id: Id, path: ReplyPath) {
        self.inner.lock().return_paths.insert(id, path);
    }

    fn take_return_path(&self, id: Id) -> Option<ReplyPath> {
        self.inner.lock().return_paths.remove(&id)
    }

    fn deliver_whisper(&self, id: Id, bytes: Vec<u8>) -> bool {
        match &self.on_whisper {
            Some(handler) => {
                handler(id, bytes);
                true
            }
            None => false,
        }
    }

    fn expire(&self, now: SystemTime) -> usize {
        let mut table = self.inner.lock();
        let before = table.intros.len();
        table.intros.retain(|_, (ad, _)| !ad.is_expired(now));
        let removed = before - table.intros.len();
        if removed > 0 {
            debug!(removed, "expired hidden service intros");
        }
        removed
    }
}
