// Copyright (c) 2024 Botho Foundation

//! Message transport.
//!
//! The engine only needs to send a buffer to an address and to receive the
//! next inbound buffer. [`MemoryNetwork`] connects engines in one process
//! through unbounded channels, one inbox per address.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::wire::AddrPort;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no route to {0}")]
    Unreachable(AddrPort),

    #[error("transport closed")]
    Closed,
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn local_addr(&self) -> AddrPort;

    async fn send(&self, to: AddrPort, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// The next inbound message, or `None` once the transport is closed.
    async fn receive(&self) -> Option<Vec<u8>>;
}

/// An in-process network of [`MemoryTransport`] endpoints.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inboxes: Arc<Mutex<HashMap<AddrPort, mpsc::UnboundedSender<Vec<u8>>>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an endpoint at `addr`, replacing any previous one.
    pub fn endpoint(&self, addr: AddrPort) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.lock().insert(addr, tx);
        MemoryTransport {
            addr,
            network: self.clone(),
            inbox: AsyncMutex::new(rx),
        }
    }

    /// Detach the endpoint at `addr`. Later sends to it fail.
    pub fn disconnect(&self, addr: &AddrPort) {
        self.inboxes.lock().remove(addr);
    }

    fn deliver(&self, to: AddrPort, bytes: Vec<u8>) -> Result<(), TransportError> {
        let inboxes = self.inboxes.lock();
        let inbox = inboxes.get(&to).ok_or(TransportError::Unreachable(to))?;
        inbox.send(bytes).map_err(|_| TransportError::Closed)
    }
}

pub struct MemoryTransport {
    addr: AddrPort,
    network: MemoryNetwork,
    inbox: AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryTransport {
    /// Take a queued message without waiting.
    pub fn try_receive(&self) -> Option<Vec<u8>> {
        self.inbox.try_lock().ok()?.try_recv().ok()
    }

    /// True if no message is queued, or the inbox is being read.
    pub fn is_empty(&self) -> bool {
        self.inbox.try_lock().map_or(true, |inbox| inbox.is_empty())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_addr(&self) -> AddrPort {
        self.addr
    }

    async fn send(&self, to: AddrPort, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.network.deliver(to, bytes)
    }

    async fn receive(&self) -> Option<Vec<u8>> {
        self.inbox.lock().await.recv().await
    }
}
