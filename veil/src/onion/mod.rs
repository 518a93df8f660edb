// Copyright (c) 2024 Botho Foundation

//! Onion layers.
//!
//! An onion is a chain of layers ending in [`Onion::End`]. Wrapper layers
//! ([`Crypt`], [`Forward`], [`Reverse`], [`Delay`], [`Session`]) carry the
//! rest of the chain in `next`; the others are terminal. Decoding reads only
//! a layer's own fields and leaves `next` as `End`; the relay decodes the
//! following layer from the same buffer once this one has been handled.
//!
//! # Example
//!
//! ```
//! use veil::onion::{assemble, Confirmation, Forward, Onion};
//! use veil::wire::Id;
//!
//! let addr = "127.0.0.1:9000".parse().unwrap();
//! let onion = assemble(vec![
//!     Onion::Forward(Forward::new(addr, Onion::End)),
//!     Onion::Confirmation(Confirmation { id: Id(1) }),
//! ]);
//! assert_eq!(onion.to_bytes().len(), onion.len());
//! ```

mod balance;
mod confirmation;
mod crypt;
mod delay;
mod exit;
mod forward;
mod hidden;
mod reply;
mod response;
mod reverse;
mod session;

pub use balance::{Balance, GetBalance, BALANCE_LAYER_LEN, GET_BALANCE_LEN};
pub use confirmation::{Confirmation, CONFIRMATION_LEN};
pub use crypt::{header_boundary, Crypt, CryptKeys, CRYPT_LEN};
pub use delay::{Delay, DELAY_LEN};
pub use exit::{Exit, EXIT_LEN};
pub use forward::{Forward, FORWARD_LEN};
pub use hidden::{
    HiddenService, IntroAd, IntroQuery, Ready, Route, RouteKeys, Whisper, HIDDEN_SERVICE_LEN,
    INTRO_AD_LEN, INTRO_QUERY_LEN, READY_LEN, ROUTE_BODY_LEN, ROUTE_LEN, WHISPER_LEN,
};
pub use reply::{
    Hop, ReplyPath, RoutingHeader, REPLY_HOPS, REPLY_PATH_LEN, REVERSE_CRYPT_LEN,
    ROUTING_HEADER_LEN,
};
pub use response::{Response, RESPONSE_LEN};
pub use reverse::{peel, Reverse, REVERSE_LEN};
pub use session::{preimage, Session, SESSION_LEN};

use crate::wire::{Magic, Splice};

#[derive(Debug, PartialEq, Eq)]
pub enum Onion {
    Crypt(Crypt),
    Forward(Forward),
    Reverse(Reverse),
    Exit(Exit),
    Session(Session),
    GetBalance(GetBalance),
    Balance(Balance),
    Confirmation(Confirmation),
    Delay(Delay),
    Route(Route),
    Ready(Ready),
    IntroQuery(IntroQuery),
    HiddenService(HiddenService),
    Whisper(Whisper),
    Response(Response),
    /// Terminates a chain. Encodes to zero bytes.
    End,
}

#[allow(clippy::len_without_is_empty)]
impl Onion {
    pub fn magic(&self) -> Magic {
        match self {
            Onion::Crypt(_) => Magic::CRYPT,
            Onion::Forward(_) => Magic::FORWARD,
            Onion::Reverse(_) => Magic::REVERSE,
            Onion::Exit(_) => Magic::EXIT,
            Onion::Session(_) => Magic::SESSION,
            Onion::GetBalance(_) => Magic::GET_BALANCE,
            Onion::Balance(_) => Magic::BALANCE,
            Onion::Confirmation(_) => Magic::CONFIRMATION,
            Onion::Delay(_) => Magic::DELAY,
            Onion::Route(_) => Magic::ROUTE,
            Onion::Ready(_) => Magic::READY,
            Onion::IntroQuery(_) => Magic::INTRO_QUERY,
            Onion::HiddenService(_) => Magic::HIDDEN_SERVICE,
            Onion::Whisper(_) => Magic::WHISPER,
            Onion::Response(_) => Magic::RESPONSE,
            Onion::End => Magic::END,
        }
    }

    /// Encoded length of this layer and everything nested in it.
    pub fn len(&self) -> usize {
        match self {
            Onion::Crypt(c) => CRYPT_LEN + c.next.len(),
            Onion::Forward(f) => FORWARD_LEN + f.next.len(),
            Onion::Reverse(r) => REVERSE_LEN + r.next.len(),
            Onion::Exit(e) => e.len(),
            Onion::Session(s) => SESSION_LEN + s.next.len(),
            Onion::GetBalance(_) => GET_BALANCE_LEN,
            Onion::Balance(_) => BALANCE_LAYER_LEN,
            Onion::Confirmation(_) => CONFIRMATION_LEN,
            Onion::Delay(d) => DELAY_LEN + d.next.len(),
            Onion::Route(_) => ROUTE_LEN,
            Onion::Ready(_) => READY_LEN,
            Onion::IntroQuery(_) => INTRO_QUERY_LEN,
            Onion::HiddenService(_) => HIDDEN_SERVICE_LEN,
            Onion::Whisper(w) => w.len(),
            Onion::Response(r) => r.len(),
            Onion::End => 0,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Onion::End)
    }

    /// Write this layer and everything nested in it at the cursor.
    pub fn encode(&self, s: &mut Splice) {
        match self {
            Onion::Crypt(c) => c.encode(s),
            Onion::Forward(f) => f.encode(s),
            Onion::Reverse(r) => r.encode(s),
            Onion::Exit(e) => e.encode(s),
            Onion::Session(l) => l.encode(s),
            Onion::GetBalance(g) => g.encode(s),
            Onion::Balance(b) => b.encode(s),
            Onion::Confirmation(c) => c.encode(s),
            Onion::Delay(d) => d.encode(s),
            Onion::Route(r) => r.encode(s),
            Onion::Ready(r) => r.encode(s),
            Onion::IntroQuery(q) => q.encode(s),
            Onion::HiddenService(h) => h.encode(s),
            Onion::Whisper(w) => w.encode(s),
            Onion::Response(r) => r.encode(s),
            Onion::End => {}
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut s = Splice::new(self.len());
        self.encode(&mut s);
        debug_assert_eq!(s.cursor(), self.len());
        s.into_bytes()
    }

    /// Encode in front of `tail`, an already encoded message. Crypt layers
    /// seal the tail along with the layers they wrap.
    pub fn to_bytes_with_tail(&self, tail: &[u8]) -> Vec<u8> {
        let len = self.len();
        let mut s = Splice::new(len + tail.len());
        s.set_cursor(len);
        s.write_raw(tail);
        s.set_cursor(0);
        self.encode(&mut s);
        debug_assert_eq!(s.cursor(), len);
        s.into_bytes()
    }

    /// The nested layer, for wrapper layers.
    pub fn next(&self) -> Option<&Onion> {
        match self {
            Onion::Crypt(c) => Some(&*c.next),
            Onion::Forward(f) => Some(&*f.next),
            Onion::Reverse(r) => Some(&*r.next),
            Onion::Session(s) => Some(&*s.next),
            Onion::Delay(d) => Some(&*d.next),
            _ => None,
        }
    }

    /// Replace the nested layer of a wrapper layer.
    ///
    /// Terminal layers have nowhere to put `next`; nesting anything but
    /// `End` under them is a construction error.
    pub fn with_next(mut self, next: Onion) -> Onion {
        match &mut self {
            Onion::Crypt(c) => c.next = Box::new(next),
            Onion::Forward(f) => f.next = Box::new(next),
            Onion::Reverse(r) => r.next = Box::new(next),
            Onion::Session(s) => s.next = Box::new(next),
            Onion::Delay(d) => d.next = Box::new(next),
            _ => debug_assert!(next.is_end(), "terminal layer cannot wrap another layer"),
        }
        self
    }
}

/// Nest `layers` so each one wraps the next, outermost first.
pub fn assemble(layers: Vec<Onion>) -> Onion {
    layers
        .into_iter()
        .rev()
        .fold(Onion::End, |inner, layer| layer.with_next(inner))
}

/// Wrap `terminal` for a forward path through `hops`.
///
/// The result is sent to the first hop. Each hop removes its Crypt and
/// forwards the rest to the next; the last hop handles `terminal`, which
/// may itself be a chain of layers.
pub fn route_through(hops: &[Hop], terminal: Onion) -> Onion {
    let mut layers = Vec::with_capacity(2 * hops.len());
    for (i, hop) in hops.iter().enumerate() {
        layers.push(Onion::Crypt(Crypt::new(hop.header, hop.payload, Onion::End)));
        if let Some(next) = hops.get(i + 1) {
            layers.push(Onion::Forward(Forward::new(next.addr, Onion::End)));
        }
    }
    layers
        .into_iter()
        .rev()
        .fold(terminal, |inner, layer| layer.with_next(inner))
}
