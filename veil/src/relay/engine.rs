// Copyright (c) 2024 Botho Foundation

//! Engine setup, the receive loop and the client-side entry points.

use std::{
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};
use tokio::{
    sync::{mpsc, Mutex as AsyncMutex},
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use veil_crypto_secp256k1::{Hash, KeyPair, PublicKey};

use super::{
    accounting::HandleContext,
    handling::Parked,
    metrics::{RelayMetrics, RelayMetricsSnapshot},
};
use crate::{
    collab::{
        self, Callback, CorrelationKey, HiddenServiceStore, LocalHiddenService, LocalService,
        Payments, PeerDirectory, PendingResponse, PendingResponses, SessionStore, Transport,
    },
    config::EngineConfig,
    error::RelayError,
    onion::{
        self, assemble, route_through, Crypt, Exit, Forward, GetBalance, HiddenService, Hop,
        IntroAd, IntroQuery, Onion, ReplyPath, Route, Whisper, REPLY_HOPS,
    },
    registry::Registry,
    wire::{AddrPort, Id, Splice},
};

/// Everything the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub sessions: Arc<dyn SessionStore>,
    pub payments: Arc<dyn Payments>,
    pub pending: Arc<PendingResponses>,
    pub hidden: Arc<dyn HiddenServiceStore>,
    pub services: Arc<dyn LocalService>,
    pub peers: Arc<dyn PeerDirectory>,
}

/// The node's own keys. Reply paths and direct messages to this node are
/// encrypted to them.
#[derive(Debug)]
pub struct Identity {
    pub header: KeyPair,
    pub payload: KeyPair,
}

impl Identity {
    pub fn random() -> Self {
        Self {
            header: KeyPair::random(),
            payload: KeyPair::random(),
        }
    }

    pub fn duplicate(&self) -> Self {
        Self {
            header: self.header.duplicate(),
            payload: self.payload.duplicate(),
        }
    }
}

/// Keys for a session being bought from a relay.
///
/// The relay opens the session once it can claim a payment committed to
/// `preimage`.
#[derive(Debug)]
pub struct SessionTicket {
    pub id: Id,
    pub relay: AddrPort,
    pub header: KeyPair,
    pub payload: KeyPair,
    pub preimage: Hash,
}

impl SessionTicket {
    /// The hop for routing through the relay under this session.
    pub fn hop(&self) -> Hop {
        Hop {
            addr: self.relay,
            header: self.header.public,
            payload: self.payload.public,
        }
    }
}

pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) identity: Identity,
    pub(super) registry: Registry,
    pub(super) collab: Collaborators,
    pub(super) metrics: RelayMetrics,
    /// Messages whose Delay ran out, waiting to be resumed.
    pub(super) parked_tx: mpsc::UnboundedSender<Parked>,
    parked_rx: AsyncMutex<mpsc::UnboundedReceiver<Parked>>,
}

impl Engine {
    pub fn new(config: EngineConfig, identity: Identity, collab: Collaborators) -> Self {
        collab
            .sessions
            .add_identity(identity.header.duplicate(), identity.payload.duplicate());
        info!(listen = %config.listen, "onion engine ready");
        let (parked_tx, parked_rx) = mpsc::unbounded_channel();
        Self {
            config,
            identity,
            registry: Registry::with_all(),
            collab,
            metrics: RelayMetrics::new(),
            parked_tx,
            parked_rx: AsyncMutex::new(parked_rx),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn addr(&self) -> AddrPort {
        self.config.listen
    }

    /// The hop other nodes use to send directly to this node.
    pub fn identity_hop(&self) -> Hop {
        Hop {
            addr: self.addr(),
            header: self.identity.header.public,
            payload: self.identity.payload.public,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.collab.sessions
    }

    pub fn pending(&self) -> &Arc<PendingResponses> {
        &self.collab.pending
    }

    pub fn hidden(&self) -> &Arc<dyn HiddenServiceStore> {
        &self.collab.hidden
    }

    pub fn metrics(&self) -> RelayMetricsSnapshot {
        self.metrics.snapshot()
    }

    // ========================================================================
    // Receiving
    // ========================================================================

    /// Handle one inbound message to completion.
    ///
    /// The error is also logged and counted, so callers driving a receive
    /// loop can ignore it.
    pub async fn handle_message(&self, bytes: Vec<u8>) -> Result<(), RelayError> {
        self.metrics.inc_received();
        let len = bytes.len();
        let result = self.dispatch(Splice::load(bytes), HandleContext::default()).await;
        self.log_drop(len, &result);
        result
    }

    /// Continue a message after its Delay ran out.
    async fn resume(&self, parked: Parked) -> Result<(), RelayError> {
        let Parked { splice, ctx } = parked;
        let len = splice.len();
        let result = self.dispatch(splice, ctx).await;
        self.log_drop(len, &result);
        result
    }

    fn log_drop(&self, len: usize, result: &Result<(), RelayError>) {
        if let Err(err) = result {
            self.metrics.record_drop(err);
            match err {
                RelayError::Transport(_) => warn!(len, %err, "message dropped"),
                _ => debug!(len, %err, "message dropped"),
            }
        }
    }

    /// Handle a single inbound or delayed message. Returns false once the
    /// transport is closed.
    pub async fn step(&self) -> bool {
        let mut parked = self.parked_rx.lock().await;
        tokio::select! {
            received = self.collab.transport.receive() => match received {
                Some(bytes) => {
                    let _ = self.handle_message(bytes).await;
                    true
                }
                None => false,
            },
            Some(message) = parked.recv() => {
                let _ = self.resume(message).await;
                true
            }
        }
    }

    /// Receive and handle messages until `cancel` fires or the transport
    /// closes, sweeping expired state on a timer.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut sweep = tokio::time::interval(self.config.pending_sweep());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut parked = self.parked_rx.lock().await;
        info!(listen = %self.addr(), "onion engine running");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.collab.transport.receive() => match received {
                    Some(bytes) => tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.handle_message(bytes) => {}
                    },
                    None => {
                        warn!("transport closed");
                        break;
                    }
                },
                Some(message) = parked.recv() => tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.resume(message) => {}
                },
                _ = sweep.tick() => self.sweep(),
            }
        }

        self.sweep();
        info!(listen = %self.addr(), "onion engine stopped");
    }

    /// Time out overdue requests and drop expired sessions and intros.
    pub fn sweep(&self) {
        let timed_out = self.collab.pending.expire(Instant::now());
        let sessions = self.collab.sessions.expire(Instant::now());
        let intros = self.collab.hidden.expire(SystemTime::now());
        if timed_out + sessions + intros > 0 {
            debug!(timed_out, sessions, intros, "swept expired state");
        }
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Encode `onion` and send it to `to`. Returns the encoded length.
    pub async fn send(&self, to: AddrPort, onion: &Onion) -> Result<usize, RelayError> {
        let bytes = onion.to_bytes();
        let len = bytes.len();
        self.collab.transport.send(to, bytes).await?;
        Ok(len)
    }

    /// Route `terminal` through `hops` and send it to the first one.
    pub async fn send_through(&self, hops: &[Hop], terminal: Onion) -> Result<usize, RelayError> {
        let first = hops.first().ok_or(RelayError::NoPath)?;
        self.send(first.addr, &route_through(hops, terminal)).await
    }

    /// A fresh reply path through two peers back to this node.
    pub fn reply_path(&self) -> Result<ReplyPath, RelayError> {
        let peers = self.collab.peers.reply_hops(REPLY_HOPS - 1);
        let [first, second] = peers.as_slice() else {
            return Err(RelayError::NoPath);
        };
        Ok(ReplyPath::build(&[*first, *second, self.identity_hop()]))
    }

    /// Send `body` along a peer's reply path, led there through two of this
    /// node's own relays so the path's first hop never sees this node.
    pub(super) async fn send_hidden(
        &self,
        path: &ReplyPath,
        body: &Onion,
    ) -> Result<usize, RelayError> {
        let lead = self.collab.peers.reply_hops(2);
        let [first, second] = lead.as_slice() else {
            return Err(RelayError::NoPath);
        };
        let entry = path.first_hop()?;
        let onion = route_through(
            &[*first, *second],
            Onion::Forward(Forward::new(entry, Onion::End)),
        );
        let bytes = onion.to_bytes_with_tail(&path.assemble(body));
        let len = bytes.len();
        self.collab.transport.send(first.addr, bytes).await?;
        self.metrics.inc_reply();
        Ok(len)
    }

    /// Register `callback` under `key`, then route `terminal` through
    /// `hops`. The sessions in `billable` are charged for the sent bytes
    /// when the answer arrives.
    async fn send_pending(
        &self,
        key: CorrelationKey,
        hops: &[Hop],
        terminal: Onion,
        billable: Vec<Id>,
        callback: Callback,
    ) -> Result<usize, RelayError> {
        let first = hops.first().ok_or(RelayError::NoPath)?.addr;
        let onion = route_through(hops, terminal);
        let entry = PendingResponse::new(key, self.config.request_timeout(), callback)
            .with_billing(billable, onion.len());
        self.collab.pending.add(entry);

        match self.send(first, &onion).await {
            Ok(len) => Ok(len),
            Err(err) => {
                self.collab.pending.remove(&key);
                Err(err)
            }
        }
    }

    /// Send `bytes` to the service on `port` at the last of `hops`. The
    /// callback receives the service's Response, or a timeout.
    pub async fn request(
        &self,
        hops: &[Hop],
        port: u16,
        bytes: Vec<u8>,
        billable: Vec<Id>,
        callback: Callback,
    ) -> Result<Id, RelayError> {
        let id = Id::random();
        let exit = Onion::Exit(Exit {
            id,
            port,
            reply: self.reply_path()?,
            bytes,
        });
        self.send_pending(CorrelationKey::Id(id), hops, exit, billable, callback)
            .await?;
        debug!(request = %id, port, "request sent");
        Ok(id)
    }

    /// Ask the last of `hops` for the balance of `session`.
    pub async fn query_balance(
        &self,
        hops: &[Hop],
        session: Id,
        callback: Callback,
    ) -> Result<Id, RelayError> {
        let id = Id::random();
        let query = Onion::GetBalance(GetBalance {
            session,
            id,
            reply: self.reply_path()?,
        });
        self.send_pending(CorrelationKey::Id(id), hops, query, Vec::new(), callback)
            .await?;
        Ok(id)
    }

    /// Buy a session from the relay at `relay`.
    ///
    /// Sends the session keys to the relay; the relay opens the session
    /// once the payment committed to the ticket's preimage reaches it.
    pub async fn buy_session(&self, relay: &Hop) -> Result<SessionTicket, RelayError> {
        let id = Id::random();
        let header = KeyPair::random();
        let payload = KeyPair::random();
        let layer = onion::Session::new(id, header.private.duplicate(), payload.private.duplicate());
        let preimage = layer.preimage();

        let onion = Onion::Crypt(Crypt::new(relay.header, relay.payload, Onion::Session(layer)));
        self.send(relay.addr, &onion).await?;
        debug!(session = %id, relay = %relay.addr, "session keys sent");

        Ok(SessionTicket {
            id,
            relay: relay.addr,
            header,
            payload,
            preimage,
        })
    }

    // ========================================================================
    // Hidden services
    // ========================================================================

    /// Advertise a hidden service keyed by `service` at `introducer`,
    /// reaching it through `via`.
    pub async fn advertise(
        &self,
        service: KeyPair,
        introducer: AddrPort,
        via: &[Hop],
        ttl: Duration,
    ) -> Result<IntroAd, RelayError> {
        let intro = IntroAd::new(
            Id::random(),
            &service.private,
            introducer,
            self.config.relay_rate,
            collab::expiry_after(ttl),
        );
        let register = Onion::HiddenService(HiddenService {
            intro: intro.clone(),
            reply: self.reply_path()?,
        });
        self.collab.hidden.add_service(LocalHiddenService {
            key: service,
            intro: intro.clone(),
        });

        let terminal = assemble(vec![Onion::Forward(Forward::new(introducer, Onion::End)), register]);
        self.send_through(via, terminal).await?;
        info!(intro = %intro.id, introducer = %introducer, "hidden service advertised");
        Ok(intro)
    }

    /// Ask `introducer` for the intro ad of the service keyed by `key`.
    /// The ad arrives as a Response whose bytes decode with
    /// [`IntroAd::from_bytes`].
    pub async fn query_intro(
        &self,
        key: PublicKey,
        introducer: AddrPort,
        via: &[Hop],
        callback: Callback,
    ) -> Result<Id, RelayError> {
        let id = Id::random();
        let query = Onion::IntroQuery(IntroQuery {
            id,
            key,
            reply: self.reply_path()?,
        });
        let terminal = assemble(vec![Onion::Forward(Forward::new(introducer, Onion::End)), query]);
        self.send_pending(CorrelationKey::Id(id), via, terminal, Vec::new(), callback)
            .await?;
        Ok(id)
    }

    /// Open a connection to the service advertised by `intro`. The
    /// callback receives `Completion::Ready` once the service accepts.
    pub async fn connect(
        &self,
        intro: &IntroAd,
        via: &[Hop],
        callback: Callback,
    ) -> Result<Id, RelayError> {
        let id = Id::random();
        let route = Onion::Route(Route::new(intro.key, id, self.reply_path()?));
        let terminal = assemble(vec![Onion::Forward(Forward::new(intro.addr, Onion::End)), route]);
        self.send_pending(CorrelationKey::Id(id), via, terminal, Vec::new(), callback)
            .await?;
        debug!(connection = %id, service = %intro.key, "route sent");
        Ok(id)
    }

    /// Send `bytes` over connection `id` along the reply path the peer sent
    /// last. Each path carries one whisper; until the peer answers with a
    /// fresh one this fails with [`RelayError::NoPath`].
    pub async fn whisper(&self, id: Id, bytes: Vec<u8>) -> Result<(), RelayError> {
        let reply = self.reply_path()?;
        let path = self
            .collab
            .hidden
            .take_return_path(id)
            .ok_or(RelayError::NoPath)?;
        let whisper = Onion::Whisper(Whisper { id, reply, bytes });
        self.send_hidden(&path, &whisper).await?;
        Ok(())
    }
}
