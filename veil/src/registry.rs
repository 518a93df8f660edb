// Copyright (c) 2024 Botho Foundation

//! Magic-tag to decoder lookup.

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::trace;

use crate::{
    onion::{
        Balance, Confirmation, Crypt, Delay, Exit, Forward, GetBalance, HiddenService, IntroQuery,
        Onion, Ready, Response, Reverse, Route, Session, Whisper,
    },
    wire::{Magic, Splice, WireError, MAGIC_LEN},
};

/// Reads one layer's fields; the cursor is just past its magic.
pub type Decoder = fn(&mut Splice) -> Result<Onion, WireError>;

/// Maps layer tags to decoders.
///
/// Each engine owns its registry, filled once at startup with
/// [`Registry::register_all`].
#[derive(Default)]
pub struct Registry {
    decoders: Mutex<HashMap<Magic, Decoder>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that knows every layer.
    pub fn with_all() -> Self {
        let registry = Self::new();
        registry.register_all();
        registry
    }

    pub fn register(&self, magic: Magic, decoder: Decoder) {
        self.decoders.lock().insert(magic, decoder);
    }

    pub fn register_all(&self) {
        self.register(Magic::CRYPT, |s| Crypt::decode(s).map(Onion::Crypt));
        self.register(Magic::FORWARD, |s| Forward::decode(s).map(Onion::Forward));
        self.register(Magic::REVERSE, |s| Reverse::decode(s).map(Onion::Reverse));
        self.register(Magic::EXIT, |s| Exit::decode(s).map(Onion::Exit));
        self.register(Magic::SESSION, |s| Session::decode(s).map(Onion::Session));
        self.register(Magic::CONFIRMATION, |s| {
            Confirmation::decode(s).map(Onion::Confirmation)
        });
        self.register(Magic::DELAY, |s| Delay::decode(s).map(Onion::Delay));
        self.register(Magic::GET_BALANCE, |s| {
            GetBalance::decode(s).map(Onion::GetBalance)
        });
        self.register(Magic::BALANCE, |s| Balance::decode(s).map(Onion::Balance));
        self.register(Magic::ROUTE, |s| Route::decode(s).map(Onion::Route));
        self.register(Magic::READY, |s| Ready::decode(s).map(Onion::Ready));
        self.register(Magic::INTRO_QUERY, |s| {
            IntroQuery::decode(s).map(Onion::IntroQuery)
        });
        self.register(Magic::HIDDEN_SERVICE, |s| {
            HiddenService::decode(s).map(Onion::HiddenService)
        });
        self.register(Magic::WHISPER, |s| Whisper::decode(s).map(Onion::Whisper));
        self.register(Magic::RESPONSE, |s| Response::decode(s).map(Onion::Response));
        self.register(Magic::END, |_| Ok(Onion::End));
    }

    /// Read the tag at the cursor and return its decoder.
    ///
    /// Returns `None` for an unknown tag, leaving the cursor past it.
    pub fn recognise(&self, s: &mut Splice) -> Option<Decoder> {
        let magic = s.read_magic().ok()?;
        s.set_context(magic);
        let decoder = self.decoders.lock().get(&magic).copied();
        if decoder.is_none() {
            trace!(%magic, "unrecognised layer");
        }
        decoder
    }

    /// Decode the layer at the cursor. An exhausted buffer decodes as `End`.
    pub fn decode_next(&self, s: &mut Splice) -> Result<Onion, WireError> {
        match s.remaining() {
            0 => return Ok(Onion::End),
            n if n < MAGIC_LEN => {
                return Err(WireError::TooShort {
                    magic: Magic::UNKNOWN,
                    needed: MAGIC_LEN,
                    available: n,
                })
            }
            _ => {}
        }
        let start = s.cursor();
        match self.recognise(s) {
            Some(decode) => decode(s),
            None => {
                let magic = Magic::from_slice(s.range(start, start + MAGIC_LEN))
                    .unwrap_or(Magic::UNKNOWN);
                Err(WireError::UnknownMagic(magic))
            }
        }
    }

    /// Decode every layer of an unencrypted chain, outermost first.
    pub fn peel_all(&self, bytes: Vec<u8>) -> Result<Vec<Onion>, WireError> {
        let mut s = Splice::load(bytes);
        let mut layers = Vec::new();
        loop {
            match self.decode_next(&mut s)? {
                Onion::End => return Ok(layers),
                layer => layers.push(layer),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onion::{assemble, Hop, ReplyPath};
    use crate::wire::{AddrPort, Id};
    use std::time::Duration;
    use veil_crypto_secp256k1::{KeyPair, PrivateKey};

    fn addr(port: u16) -> AddrPort {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn reply_path() -> ReplyPath {
        let hop = |port: u16| Hop {
            addr: addr(port),
            header: KeyPair::random().public,
            payload: KeyPair::random().public,
        };
        ReplyPath::build(&[hop(1), hop(2), hop(3)])
    }

    /// One instance of every layer with a fixed minimum length.
    fn minimal_layers() -> Vec<Onion> {
        let service = PrivateKey::random();
        vec![
            Onion::Crypt(Crypt::new(
                KeyPair::random().public,
                KeyPair::random().public,
                Onion::End,
            )),
            Onion::Forward(Forward::new(addr(1), Onion::End)),
            Onion::Reverse(Reverse::new(addr(2), Onion::End)),
            Onion::Exit(Exit {
                id: Id(1),
                port: 9,
                reply: reply_path(),
                bytes: vec![],
            }),
            Onion::Session(Session::new(Id(2), PrivateKey::random(), PrivateKey::random())),
            Onion::Confirmation(Confirmation { id: Id(3) }),
            Onion::Delay(Delay::new(Duration::from_secs(1), Onion::End)),
            Onion::GetBalance(GetBalance {
                session: Id(4),
                id: Id(5),
                reply: reply_path(),
            }),
            Onion::Balance(Balance {
                id: Id(6),
                amount: -3,
            }),
            Onion::Route(Route::new(service.public_key(), Id(7), reply_path())),
            Onion::Ready(Ready {
                id: Id(8),
                reply: reply_path(),
            }),
            Onion::IntroQuery(IntroQuery {
                id: Id(9),
                key: service.public_key(),
                reply: reply_path(),
            }),
            Onion::HiddenService(HiddenService {
                intro: crate::onion::IntroAd::new(
                    Id(10),
                    &service,
                    addr(3),
                    1,
                    std::time::SystemTime::now(),
                ),
                reply: reply_path(),
            }),
            Onion::Whisper(Whisper {
                id: Id(11),
                reply: reply_path(),
                bytes: vec![],
            }),
            Onion::Response(Response {
                id: Id(12),
                port: 9,
                bytes: vec![],
            }),
        ]
    }

    #[test]
    fn test_every_tag_registered() {
        let registry = Registry::with_all();
        for magic in Magic::ALL {
            let mut s = Splice::load(magic.as_bytes().to_vec());
            assert!(registry.recognise(&mut s).is_some(), "{} not registered", magic);
            assert_eq!(s.context(), magic);
        }
    }

    #[test]
    fn test_each_tag_decodes_to_its_variant() {
        let registry = Registry::with_all();
        for layer in minimal_layers() {
            let magic = layer.magic();
            let decoded = registry
                .decode_next(&mut Splice::load(layer.to_bytes()))
                .unwrap();
            assert_eq!(decoded.magic(), magic);
        }
    }

    /// Layers whose decoded form carries every encoded field.
    fn full_layers(bytes: &[u8]) -> Vec<Onion> {
        let service = PrivateKey::random();
        vec![
            Onion::Exit(Exit {
                id: Id(1),
                port: 8080,
                reply: reply_path(),
                bytes: bytes.to_vec(),
            }),
            Onion::Response(Response {
                id: Id(2),
                port: 8080,
                bytes: bytes.to_vec(),
            }),
            Onion::Whisper(Whisper {
                id: Id(3),
                reply: reply_path(),
                bytes: bytes.to_vec(),
            }),
            Onion::GetBalance(GetBalance {
                session: Id(4),
                id: Id(5),
                reply: reply_path(),
            }),
            Onion::Balance(Balance {
                id: Id(6),
                amount: i64::MIN + 1,
            }),
            Onion::IntroQuery(IntroQuery {
                id: Id(7),
                key: service.public_key(),
                reply: reply_path(),
            }),
            Onion::Ready(Ready {
                id: Id(8),
                reply: reply_path(),
            }),
            Onion::HiddenService(HiddenService {
                intro: crate::onion::IntroAd::new(
                    Id(9),
                    &service,
                    addr(3),
                    250,
                    std::time::SystemTime::now() + Duration::from_secs(600),
                ),
                reply: reply_path(),
            }),
            Onion::Forward(Forward::new(addr(4), Onion::End)),
            Onion::Delay(Delay::new(Duration::from_nanos(1_500_000_001), Onion::End)),
            Onion::Session(Session::new(Id(10), PrivateKey::random(), PrivateKey::random())),
        ]
    }

    #[test]
    fn test_decoded_layers_equal_encoded() {
        let registry = Registry::with_all();
        for bytes in [vec![], vec![7u8; 300]] {
            for layer in full_layers(&bytes) {
                let mut s = Splice::load(layer.to_bytes());
                let decoded = registry.decode_next(&mut s).unwrap();
                assert_eq!(decoded, layer, "{} with {} bytes", layer.magic(), bytes.len());
                assert_eq!(s.remaining(), 0);
            }
        }
    }

    #[test]
    fn test_unknown_tag() {
        let registry = Registry::with_all();
        let mut s = Splice::load(b"nope1234".to_vec());
        assert!(registry.recognise(&mut s).is_none());

        let mut s = Splice::load(b"nope1234".to_vec());
        assert_eq!(
            registry.decode_next(&mut s),
            Err(WireError::UnknownMagic(Magic(*b"nope")))
        );
    }

    #[test]
    fn test_empty_registry_knows_nothing() {
        let registry = Registry::new();
        let mut s = Splice::load(Magic::CRYPT.as_bytes().to_vec());
        assert!(registry.recognise(&mut s).is_none());
    }

    #[test]
    fn test_explicit_end_sentinel() {
        let registry = Registry::with_all();
        let mut s = Splice::load(b"!!!!".to_vec());
        assert_eq!(registry.decode_next(&mut s), Ok(Onion::End));
        assert_eq!(registry.decode_next(&mut s), Ok(Onion::End));
    }

    #[test]
    fn test_peel_matches_assembled_layers() {
        let registry = Registry::with_all();
        let layers = vec![
            Onion::Forward(Forward::new(addr(10), Onion::End)),
            Onion::Delay(Delay::new(Duration::from_millis(250), Onion::End)),
            Onion::Reverse(Reverse::new(addr(11), Onion::End)),
            Onion::Session(Session::new(Id(5), PrivateKey::random(), PrivateKey::random())),
            Onion::Confirmation(Confirmation { id: Id(0xdead) }),
        ];
        let magics: Vec<_> = layers.iter().map(Onion::magic).collect();
        let expected_addr = addr(10);
        let onion = assemble(layers);

        let peeled = registry.peel_all(onion.to_bytes()).unwrap();
        assert_eq!(peeled.iter().map(Onion::magic).collect::<Vec<_>>(), magics);
        match &peeled[0] {
            Onion::Forward(f) => assert_eq!(f.addr, expected_addr),
            other => panic!("unexpected {:?}", other.magic()),
        }
        assert_eq!(
            peeled[4],
            Onion::Confirmation(Confirmation { id: Id(0xdead) })
        );
    }

    #[test]
    fn test_truncated_layers_are_too_short() {
        let registry = Registry::with_all();
        for layer in minimal_layers() {
            let magic = layer.magic();
            let bytes = layer.to_bytes();
            for cut in MAGIC_LEN..bytes.len() {
                let mut s = Splice::load(bytes[..cut].to_vec());
                match registry.decode_next(&mut s) {
                    Err(WireError::TooShort { magic: m, .. }) => assert_eq!(m, magic),
                    other => panic!("{} cut at {}: {:?}", magic, cut, other.map(|o| o.magic())),
                }
            }
        }
    }

    #[test]
    fn test_partial_magic_is_too_short() {
        let registry = Registry::with_all();
        for cut in 1..MAGIC_LEN {
            let mut s = Splice::load(b"cryp"[..cut].to_vec());
            assert!(matches!(
                registry.decode_next(&mut s),
                Err(WireError::TooShort { .. })
            ));
        }
    }
}
