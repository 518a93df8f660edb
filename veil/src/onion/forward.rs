// Copyright (c) 2024 Botho Foundation

//! Unidirectional redirect to another relay.

use super::Onion;
use crate::wire::{AddrPort, Magic, Splice, WireError, ADDR_LEN, MAGIC_LEN};

pub const FORWARD_LEN: usize = MAGIC_LEN + ADDR_LEN;

/// Send everything after this layer to `addr`, unchanged.
#[derive(Debug, PartialEq, Eq)]
pub struct Forward {
    pub addr: AddrPort,
    pub next: Box<Onion>,
}

impl Forward {
    pub fn new(addr: AddrPort, next: Onion) -> Self {
        Self {
            addr,
            next: Box::new(next),
        }
    }

    pub(crate) fn encode(&self, s: &mut Splice) {
        s.write_magic(Magic::FORWARD).write_addr(&self.addr);
        self.next.encode(s);
    }

    pub(crate) fn decode(s: &mut Splice) -> Result<Self, WireError> {
        s.require(Magic::FORWARD, FORWARD_LEN - MAGIC_LEN)?;
        Ok(Self::new(s.read_addr()?, Onion::End))
    }
}
