// Copyright (c) 2024 Botho Foundation

use crate::wire::{Id, Magic, Splice, WireError, BYTES_PREFIX_LEN, ID_LEN, MAGIC_LEN, PORT_LEN};

/// Length of a Response with an empty payload.
pub const RESPONSE_LEN: usize = MAGIC_LEN + ID_LEN + PORT_LEN + BYTES_PREFIX_LEN;

/// Answer to an [`Exit`](super::Exit) or [`IntroQuery`](super::IntroQuery),
/// matched to the pending request by `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub id: Id,
    pub port: u16,
    pub bytes: Vec<u8>,
}

impl Response {
    pub(crate) fn len(&self) -> usize {
        RESPONSE_LEN + self.bytes.len()
    }

    pub(crate) fn encode(&self, s: &mut Splice) {
        s.write_magic(Magic::RESPONSE)
            .write_id(self.id)
            .write_u16(self.port)
            .write_bytes(&self.bytes);
    }

    pub(crate) fn decode(s: &mut Splice) -> Result<Self, WireError> {
        s.require(Magic::RESPONSE, RESPONSE_LEN - MAGIC_LEN)?;
        Ok(Self {
            id: s.read_id()?,
            port: s.read_u16()?,
            bytes: s.read_bytes()?,
        })
    }
}
