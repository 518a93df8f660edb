// Copyright (c) 2024 Botho Foundation
//
//! Test network infrastructure for integration tests.

use std::{sync::Arc, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use veil::{
    collab::{
        Callback, Completion, HiddenServices, MemoryNetwork, MemoryTransport, PaymentLedger,
        PendingResponses, ServiceDirectory, Session, SessionManager, StaticPeers,
    },
    onion::Hop,
    wire::{AddrPort, Id},
    Collaborators, Engine, EngineConfig, Identity, RelayError,
};
use veil_crypto_secp256k1::KeyPair;

use crate::common::{RECV_TIMEOUT, TEST_SWEEP_MS};

pub fn addr(port: u16) -> AddrPort {
    format!("127.0.0.1:{}", port).parse().unwrap()
}

/// A node with handles on the collaborators tests poke at
pub struct TestNode {
    pub engine: Arc<Engine>,
    pub transport: Arc<MemoryTransport>,
    pub payments: Arc<PaymentLedger>,
    pub services: Arc<ServiceDirectory>,
    pub peers: Arc<StaticPeers>,
    /// Whispers delivered to this node
    pub whispers: mpsc::UnboundedReceiver<(Id, Vec<u8>)>,
}

impl TestNode {
    pub fn addr(&self) -> AddrPort {
        self.engine.addr()
    }

    pub fn hop(&self) -> Hop {
        self.engine.identity_hop()
    }

    /// Handle the next queued message by hand. Returns its length and the
    /// handling result.
    pub async fn deliver(&self) -> (usize, Result<(), RelayError>) {
        let bytes = self
            .transport
            .try_receive()
            .unwrap_or_else(|| panic!("no message queued for {}", self.addr()));
        let len = bytes.len();
        (len, self.engine.handle_message(bytes).await)
    }

    pub fn has_queued(&self) -> bool {
        !self.transport.is_empty()
    }
}

/// Open a session at `relay` directly, as if it had been paid for.
pub fn open_session(relay: &TestNode, balance: i64, rate: u64) -> (Id, Hop) {
    let id = Id::random();
    let session = Session::new(
        id,
        KeyPair::random(),
        KeyPair::random(),
        balance,
        rate,
        Duration::from_secs(3600),
    );
    let hop = session.hop(relay.addr());
    relay.engine.sessions().add(session);
    (id, hop)
}

/// A callback that forwards completions to a channel
pub fn completions() -> (Callback, mpsc::UnboundedReceiver<Completion>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: Callback = Box::new(move |c| {
        let _ = tx.send(c);
    });
    (callback, rx)
}

/// Wait for the next item on `rx`, failing the test after a timeout
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
}

/// In-process network of engines
pub struct TestNetwork {
    pub network: MemoryNetwork,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl TestNetwork {
    pub fn new() -> Self {
        Self {
            network: MemoryNetwork::new(),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn config(port: u16) -> EngineConfig {
        let mut config = EngineConfig::new(addr(port));
        config.pending_sweep_ms = TEST_SWEEP_MS;
        config
    }

    pub fn add_node(&self, port: u16) -> TestNode {
        self.add_node_with(Self::config(port))
    }

    pub fn add_node_with(&self, config: EngineConfig) -> TestNode {
        let transport = Arc::new(self.network.endpoint(config.listen));
        let payments = Arc::new(PaymentLedger::new());
        let services = Arc::new(ServiceDirectory::new());
        let peers = Arc::new(StaticPeers::default());
        let (tx, whispers) = mpsc::unbounded_channel();
        let hidden = HiddenServices::with_whisper_handler(move |id, bytes| {
            let _ = tx.send((id, bytes));
        });

        let engine = Engine::new(
            config,
            Identity::random(),
            Collaborators {
                transport: transport.clone(),
                sessions: Arc::new(SessionManager::new()),
                payments: payments.clone(),
                pending: Arc::new(PendingResponses::new()),
                hidden: Arc::new(hidden),
                services: services.clone(),
                peers: peers.clone(),
            },
        );

        TestNode {
            engine: Arc::new(engine),
            transport,
            payments,
            services,
            peers,
            whispers,
        }
    }

    /// Run `node`'s receive loop until the network stops
    pub fn start(&mut self, node: &TestNode) {
        let engine = node.engine.clone();
        let cancel = self.cancel.clone();
        self.tasks
            .push(tokio::spawn(async move { engine.run(cancel).await }));
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            tokio::time::timeout(RECV_TIMEOUT, task)
                .await
                .expect("engine did not stop")
                .expect("engine task panicked");
        }
    }
}
