// Copyright (c) 2024 Botho Foundation

//! Delivery to a local service with an anonymous reply.

use super::reply::{ReplyPath, REPLY_PATH_LEN};
use crate::wire::{Id, Magic, Splice, WireError, BYTES_PREFIX_LEN, ID_LEN, MAGIC_LEN, PORT_LEN};

/// Length of an Exit with an empty payload.
pub const EXIT_LEN: usize = MAGIC_LEN + ID_LEN + PORT_LEN + REPLY_PATH_LEN + BYTES_PREFIX_LEN;

/// Hand `bytes` to the service on `port` and send its answer back along
/// `reply` as a [`Response`](super::Response) carrying `id`.
#[derive(Debug, PartialEq, Eq)]
pub struct Exit {
    pub id: Id,
    pub port: u16,
    pub reply: ReplyPath,
    pub bytes: Vec<u8>,
}

impl Exit {
    pub(crate) fn len(&self) -> usize {
        EXIT_LEN + self.bytes.len()
    }

    pub(crate) fn encode(&self, s: &mut Splice) {
        s.write_magic(Magic::EXIT).write_id(self.id).write_u16(self.port);
        self.reply.encode(s);
        s.write_bytes(&self.bytes);
    }

    pub(crate) fn decode(s: &mut Splice) -> Result<Self, WireError> {
        s.require(Magic::EXIT, EXIT_LEN - MAGIC_LEN)?;
        Ok(Self {
            id: s.read_id()?,
            port: s.read_u16()?,
            reply: ReplyPath::decode(s)?,
            bytes: s.read_bytes()?,
        })
    }
}
