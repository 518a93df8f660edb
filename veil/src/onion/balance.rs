// Copyright (c) 2024 Botho Foundation

//! Session balance queries.

use super::reply::{ReplyPath, REPLY_PATH_LEN};
use crate::wire::{Id, Magic, Splice, WireError, BALANCE_LEN, ID_LEN, MAGIC_LEN};

pub const GET_BALANCE_LEN: usize = MAGIC_LEN + 2 * ID_LEN + REPLY_PATH_LEN;

pub const BALANCE_LAYER_LEN: usize = MAGIC_LEN + ID_LEN + BALANCE_LEN;

/// Ask a relay for the remaining balance of `session`; the answer is a
/// [`Balance`] tagged with `id`, sent back along `reply`.
#[derive(Debug, PartialEq, Eq)]
pub struct GetBalance {
    pub session: Id,
    pub id: Id,
    pub reply: ReplyPath,
}

impl GetBalance {
    pub(crate) fn encode(&self, s: &mut Splice) {
        s.write_magic(Magic::GET_BALANCE)
            .write_id(self.session)
            .write_id(self.id);
        self.reply.encode(s);
    }

    pub(crate) fn decode(s: &mut Splice) -> Result<Self, WireError> {
        s.require(Magic::GET_BALANCE, GET_BALANCE_LEN - MAGIC_LEN)?;
        Ok(Self {
            session: s.read_id()?,
            id: s.read_id()?,
            reply: ReplyPath::decode(s)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    pub id: Id,
    pub amount: i64,
}

impl Balance {
    pub(crate) fn encode(&self, s: &mut Splice) {
        s.write_magic(Magic::BALANCE)
            .write_id(self.id)
            .write_balance(self.amount);
    }

    pub(crate) fn decode(s: &mut Splice) -> Result<Self, WireError> {
        s.require(Magic::BALANCE, BALANCE_LAYER_LEN - MAGIC_LEN)?;
        Ok(Self {
            id: s.read_id()?,
            amount: s.read_balance()?,
        })
    }
}
