// Copyright (c) 2024 Botho Foundation

use std::fmt;

/// Length of a layer tag.
pub const MAGIC_LEN: usize = 4;

/// A 4-byte ASCII tag identifying an onion layer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Magic(pub [u8; MAGIC_LEN]);

impl Magic {
    pub const CRYPT: Magic = Magic(*b"cryp");
    pub const FORWARD: Magic = Magic(*b"forw");
    pub const REVERSE: Magic = Magic(*b"rvrs");
    pub const EXIT: Magic = Magic(*b"exit");
    pub const SESSION: Magic = Magic(*b"sess");
    pub const CONFIRMATION: Magic = Magic(*b"conf");
    pub const DELAY: Magic = Magic(*b"dely");
    pub const GET_BALANCE: Magic = Magic(*b"getb");
    pub const BALANCE: Magic = Magic(*b"bala");
    pub const ROUTE: Magic = Magic(*b"rout");
    pub const READY: Magic = Magic(*b"redy");
    pub const INTRO_QUERY: Magic = Magic(*b"intq");
    pub const HIDDEN_SERVICE: Magic = Magic(*b"hids");
    pub const WHISPER: Magic = Magic(*b"whis");
    pub const RESPONSE: Magic = Magic(*b"resp");
    pub const END: Magic = Magic(*b"!!!!");

    /// Placeholder for a tag that could not be read in full.
    pub const UNKNOWN: Magic = Magic(*b"????");

    /// Every tag a relay understands, in registration order.
    pub const ALL: [Magic; 16] = [
        Magic::CRYPT,
        Magic::FORWARD,
        Magic::REVERSE,
        Magic::EXIT,
        Magic::SESSION,
        Magic::CONFIRMATION,
        Magic::DELAY,
        Magic::GET_BALANCE,
        Magic::BALANCE,
        Magic::ROUTE,
        Magic::READY,
        Magic::INTRO_QUERY,
        Magic::HIDDEN_SERVICE,
        Magic::WHISPER,
        Magic::RESPONSE,
        Magic::END,
    ];

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Magic)
    }

    pub fn as_bytes(&self) -> &[u8; MAGIC_LEN] {
        &self.0
    }
}

impl fmt::Display for Magic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Magic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Magic({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tags_are_distinct() {
        let unique: HashSet<_> = Magic::ALL.iter().collect();
        assert_eq!(unique.len(), Magic::ALL.len());
        assert!(!unique.contains(&Magic::UNKNOWN));
    }

    #[test]
    fn test_display_escapes_binary() {
        assert_eq!(Magic::REVERSE.to_string(), "rvrs");
        assert_eq!(Magic([0, b'a', b'b', 0xff]).to_string(), "\\x00ab\\xff");
    }
}
