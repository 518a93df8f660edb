// Copyright (c) 2024 Botho Foundation

use std::time::Duration;

use super::Onion;
use crate::wire::{Magic, Splice, WireError, DURATION_LEN, MAGIC_LEN};

pub const DELAY_LEN: usize = MAGIC_LEN + DURATION_LEN;

/// Hold the rest of the message for `duration` before handling it.
#[derive(Debug, PartialEq, Eq)]
pub struct Delay {
    pub duration: Duration,
    pub next: Box<Onion>,
}

impl Delay {
    pub fn new(duration: Duration, next: Onion) -> Self {
        Self {
            duration,
            next: Box::new(next),
        }
    }

    pub(crate) fn encode(&self, s: &mut Splice) {
        s.write_magic(Magic::DELAY).write_duration(self.duration);
        self.next.encode(s);
    }

    pub(crate) fn decode(s: &mut Splice) -> Result<Self, WireError> {
        s.require(Magic::DELAY, DELAY_LEN - MAGIC_LEN)?;
        Ok(Self::new(s.read_duration()?, Onion::End))
    }
}
