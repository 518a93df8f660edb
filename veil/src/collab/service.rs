// Copyright (c) 2024 Botho Foundation

//! Local services reachable through Exit layers.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::error::RelayError;

#[async_trait]
pub trait LocalService: Send + Sync {
    /// Price per byte for traffic to `port`, or `None` if nothing listens
    /// there.
    fn relay_rate(&self, port: u16) -> Option<u64>;

    async fn send_to(&self, port: u16, bytes: Vec<u8>) -> Result<(), RelayError>;

    /// Wait up to `timeout` for the service's answer.
    async fn receive_from(&self, port: u16, timeout: Duration) -> Option<Vec<u8>>;
}

pub type Handler = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

struct Port {
    rate: u64,
    handler: Option<Handler>,
    answers: mpsc::UnboundedSender<Vec<u8>>,
    inbox: Arc<AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

/// In-memory [`LocalService`] answering each request with a handler.
#[derive(Default)]
pub struct ServiceDirectory {
    ports: RwLock<HashMap<u16, Port>>,
}

impl ServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `port` with `handler`, charging `rate` per byte.
    pub fn register<F>(&self, port: u16, rate: u64, handler: F)
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        self.insert(port, rate, Some(Arc::new(handler)));
    }

    /// A service that accepts requests and never answers.
    pub fn register_silent(&self, port: u16, rate: u64) {
        self.insert(port, rate, None);
    }

    fn insert(&self, port: u16, rate: u64, handler: Option<Handler>) {
        let (answers, inbox) = mpsc::unbounded_channel();
        self.ports.write().insert(
            port,
            Port {
                rate,
                handler,
                answers,
                inbox: Arc::new(AsyncMutex::new(inbox)),
            },
        );
    }
}

#[async_trait]
impl LocalService for ServiceDirectory {
    fn relay_rate(&self, port: u16) -> Option<u64> {
        self.ports.read().get(&port).map(|p| p.rate)
    }

    async fn send_to(&self, port: u16, bytes: Vec<u8>) -> Result<(), RelayError> {
        let (handler, answers) = {
            let ports = self.ports.read();
            let entry = ports.get(&port).ok_or(RelayError::NoService(port))?;
            (entry.handler.clone(), entry.answers.clone())
        };
        if let Some(handler) = handler {
            let _ = answers.send(handler(&bytes));
        }
        Ok(())
    }

    async fn receive_from(&self, port: u16, timeout: Duration) -> Option<Vec<u8>> {
        let inbox = self.ports.read().get(&port)?.inbox.clone();
        let mut inbox = inbox.lock().await;
        tokio::time::timeout(timeout, inbox.recv()).await.ok().flatten()
    }
}
