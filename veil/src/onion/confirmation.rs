// Copyright (c) 2024 Botho Foundation

use crate::wire::{Id, Magic, Splice, WireError, ID_LEN, MAGIC_LEN};

pub const CONFIRMATION_LEN: usize = MAGIC_LEN + ID_LEN;

/// Terminal layer acknowledging that a message reached the end of its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub id: Id,
}

impl Confirmation {
    pub(crate) fn encode(&self, s: &mut Splice) {
        s.write_magic(Magic::CONFIRMATION).write_id(self.id);
    }

    pub(crate) fn decode(s: &mut Splice) -> Result<Self, WireError> {
        s.require(Magic::CONFIRMATION, CONFIRMATION_LEN - MAGIC_LEN)?;
        Ok(Self { id: s.read_id()? })
    }
}
