// Copyright (c) 2024 Botho Foundation

//! Per-layer message handling.
//!
//! [`Engine::dispatch`] decodes the layer at the cursor and hands it to the
//! matching handler. The handler says what happens next with a [`Flow`].

use std::time::SystemTime;
use tracing::{debug, info, trace};
use veil_crypto_secp256k1::{Cipher, Cloak, Hash, KeyPair};

use super::{
    accounting::{charge_exit, charge_send, HandleContext},
    engine::Engine,
};
use crate::{
    collab::{Completion, CorrelationKey, KeyMatch, Session},
    error::RelayError,
    onion::{
        self, peel, Balance, Crypt, Delay, Exit, Forward, GetBalance, HiddenService, IntroQuery, Onion,
        Ready, Response, Reverse, Route, Whisper, BALANCE_LAYER_LEN, CONFIRMATION_LEN, READY_LEN,
        RESPONSE_LEN, ROUTE_LEN, ROUTING_HEADER_LEN,
    },
    telemetry::layer_name,
    wire::{AddrPort, Magic, Splice, WireError},
};

/// The rest of a message held by a Delay layer, resumed by the receive loop
/// once the delay runs out.
pub struct Parked {
    pub(super) splice: Splice,
    pub(super) ctx: HandleContext,
}

/// What the dispatch loop does after a layer has been handled.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    /// Decode the next layer from the cursor.
    Continue,
    /// Start over on a reply this node built and already charged for.
    Reply(Vec<u8>),
    /// The message is finished.
    Done,
}

impl Engine {
    pub(super) async fn dispatch(
        &self,
        mut s: Splice,
        mut ctx: HandleContext,
    ) -> Result<(), RelayError> {
        loop {
            let start = s.cursor();
            let layer = self.registry.decode_next(&mut s)?;
            trace!(layer = layer_name(&layer), start, len = s.len(), "handling layer");

            match self.handle(layer, start, &mut s, &mut ctx).await? {
                Flow::Continue => {}
                Flow::Reply(bytes) => {
                    s = Splice::load(bytes);
                    ctx = HandleContext::reply();
                }
                Flow::Done => return Ok(()),
            }
        }
    }

    async fn handle(
        &self,
        layer: Onion,
        start: usize,
        s: &mut Splice,
        ctx: &mut HandleContext,
    ) -> Result<Flow, RelayError> {
        match layer {
            Onion::End => Ok(Flow::Done),
            Onion::Crypt(crypt) => self.handle_crypt(crypt, s, ctx),
            Onion::Forward(forward) => self.handle_forward(forward, s, ctx).await,
            Onion::Reverse(reverse) => self.handle_reverse(reverse, start, s, ctx).await,
            Onion::Exit(exit) => self.handle_exit(exit, s, ctx).await,
            Onion::Session(session) => self.handle_session(session),
            Onion::Delay(delay) => self.handle_delay(delay, s, ctx),
            Onion::GetBalance(query) => self.handle_get_balance(query, ctx),
            Onion::Balance(balance) => Ok(self.complete(
                CorrelationKey::Id(balance.id),
                BALANCE_LAYER_LEN,
                Completion::Balance(balance),
            )),
            Onion::Confirmation(conf) => Ok(self.complete(
                CorrelationKey::Id(conf.id),
                CONFIRMATION_LEN,
                Completion::Confirmed(conf.id),
            )),
            Onion::Response(response) => Ok(self.handle_response(response)),
            Onion::Route(route) => self.handle_route(route, start, s).await,
            Onion::Ready(ready) => Ok(self.handle_ready(ready)),
            Onion::IntroQuery(query) => self.handle_intro_query(query),
            Onion::HiddenService(service) => self.handle_hidden_service(service),
            Onion::Whisper(whisper) => Ok(self.handle_whisper(whisper)),
        }
    }

    /// Resolve a cloak to local keys, refusing exhausted sessions.
    fn resolve(&self, cloak: Option<&Cloak>) -> Result<KeyMatch, RelayError> {
        let cloak = cloak.ok_or(RelayError::UnknownCloak)?;
        let keys = self
            .collab
            .sessions
            .find_by_cloak(cloak)
            .ok_or(RelayError::UnknownCloak)?;
        if let Some(id) = keys.session {
            match self.collab.sessions.balance(id) {
                Some(balance) if balance > 0 => {}
                Some(_) => return Err(RelayError::SessionExhausted(id)),
                None => return Err(RelayError::UnknownSession(id)),
            }
        }
        Ok(keys)
    }

    fn handle_crypt(
        &self,
        crypt: Crypt,
        s: &mut Splice,
        ctx: &mut HandleContext,
    ) -> Result<Flow, RelayError> {
        let keys = self.resolve(crypt.cloak())?;
        let cipher = Cipher::derive(&keys.header, &crypt.ephemeral_public());
        let (start, end) = (s.cursor(), s.len());
        s.encrypt_range(&cipher, &crypt.iv, start, end);

        *ctx = HandleContext::with_session(keys.session);
        Ok(Flow::Continue)
    }

    /// Hand the rest of the message to a timer task. The dispatch loop
    /// returns at once so the receive loop keeps running.
    fn handle_delay(
        &self,
        delay: Delay,
        s: &mut Splice,
        ctx: &HandleContext,
    ) -> Result<Flow, RelayError> {
        let limit = self.config.max_delay();
        if delay.duration > limit {
            return Err(RelayError::DelayTooLong(delay.duration));
        }
        let parked = Parked {
            splice: std::mem::replace(s, Splice::new(0)),
            ctx: *ctx,
        };
        let resume = self.parked_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay.duration).await;
            // Closed only when the engine is gone.
            let _ = resume.send(parked);
        });
        trace!(delay = ?delay.duration, "message parked");
        Ok(Flow::Done)
    }

    /// Charge the current session for `bytes` and send them on.
    async fn relay(
        &self,
        to: AddrPort,
        bytes: Vec<u8>,
        ctx: &HandleContext,
    ) -> Result<(), RelayError> {
        let len = bytes.len();
        let balance = charge_send(self.collab.sessions.as_ref(), ctx, len);
        self.collab.transport.send(to, bytes).await?;
        self.metrics.inc_forwarded();
        debug!(to = %to, len, ?balance, "relayed");
        Ok(())
    }

    async fn handle_forward(
        &self,
        forward: Forward,
        s: &Splice,
        ctx: &HandleContext,
    ) -> Result<Flow, RelayError> {
        if forward.addr == self.addr() {
            return Ok(Flow::Continue);
        }
        self.relay(forward.addr, s.rest().to_vec(), ctx).await?;
        Ok(Flow::Done)
    }

    async fn handle_reverse(
        &self,
        reverse: Reverse,
        start: usize,
        s: &mut Splice,
        ctx: &mut HandleContext,
    ) -> Result<Flow, RelayError> {
        if reverse.addr != self.addr() {
            // The whole routing header travels on so its size never changes
            let bytes = s.range(start, s.len()).to_vec();
            self.relay(reverse.addr, bytes, ctx).await?;
            return Ok(Flow::Done);
        }

        let magic = s.read_magic()?;
        if magic != Magic::CRYPT {
            return Err(WireError::UnknownMagic(magic).into());
        }
        let crypt = Crypt::decode(s)?;
        let keys = self.resolve(crypt.cloak())?;
        let ephemeral = crypt.ephemeral_public();
        let header = Cipher::derive(&keys.header, &ephemeral);
        let payload = Cipher::derive(&keys.payload, &ephemeral);

        let more = peel(s, start, &header, &payload, &crypt.iv)?;
        *ctx = HandleContext::with_session(keys.session);
        if !more {
            // Final hop: the reply body follows the header
            s.set_cursor(start + ROUTING_HEADER_LEN);
        }
        Ok(Flow::Continue)
    }

    async fn handle_exit(
        &self,
        exit: Exit,
        s: &Splice,
        ctx: &HandleContext,
    ) -> Result<Flow, RelayError> {
        let Exit {
            id,
            port,
            reply,
            bytes,
        } = exit;
        let rate = self
            .collab
            .services
            .relay_rate(port)
            .ok_or(RelayError::NoService(port))?;

        self.collab.services.send_to(port, bytes).await?;
        let answer = self
            .collab
            .services
            .receive_from(port, self.config.service_timeout())
            .await
            .unwrap_or_else(|| {
                debug!(request = %id, port, "service timed out, replying empty");
                Vec::new()
            });

        let response = Onion::Response(Response {
            id,
            port,
            bytes: answer,
        });
        let message = reply.assemble(&response);
        let balance = charge_exit(
            self.collab.sessions.as_ref(),
            ctx,
            rate,
            s.len(),
            message.len(),
        );
        self.metrics.inc_delivered();
        self.metrics.inc_reply();
        debug!(request = %id, port, reply_len = message.len(), ?balance, "exit answered");
        Ok(Flow::Reply(message))
    }

    fn handle_session(&self, layer: onion::Session) -> Result<Flow, RelayError> {
        let preimage = layer.preimage();
        let payment = self
            .collab
            .payments
            .claim(&preimage)
            .ok_or(RelayError::PaymentNotFound(layer.id))?;
        let credit = match payment.amount {
            0 => self.config.session_allowance,
            amount => amount,
        };

        let session = Session::new(
            layer.id,
            KeyPair::from_private(layer.header),
            KeyPair::from_private(layer.payload),
            i64::try_from(credit).unwrap_or(i64::MAX),
            self.config.relay_rate,
            self.config.session_ttl(),
        );
        self.collab.sessions.add(session);
        info!(session = %layer.id, credit, "session opened");
        Ok(Flow::Continue)
    }

    fn handle_get_balance(
        &self,
        query: GetBalance,
        ctx: &HandleContext,
    ) -> Result<Flow, RelayError> {
        let amount = self
            .collab
            .sessions
            .balance(query.session)
            .ok_or(RelayError::UnknownSession(query.session))?;
        let balance = Onion::Balance(Balance {
            id: query.id,
            amount,
        });
        let message = query.reply.assemble(&balance);
        charge_send(self.collab.sessions.as_ref(), ctx, message.len());
        self.metrics.inc_reply();
        Ok(Flow::Reply(message))
    }

    /// Hand a reply to the pending request waiting for it.
    fn complete(&self, key: CorrelationKey, payload_len: usize, completion: Completion) -> Flow {
        let sessions = self.collab.sessions.as_ref();
        if self
            .collab
            .pending
            .process_and_delete(key, payload_len, completion, sessions)
        {
            self.metrics.inc_delivered();
        } else {
            debug!(?key, "reply with no pending request");
        }
        Flow::Done
    }

    fn handle_response(&self, response: Response) -> Flow {
        let by_id = CorrelationKey::Id(response.id);
        let key = if self.collab.pending.contains(&by_id) {
            by_id
        } else {
            CorrelationKey::Hash(Hash::digest(&response.bytes))
        };
        let len = RESPONSE_LEN + response.bytes.len();
        self.complete(key, len, Completion::Response(response))
    }

    async fn handle_route(
        &self,
        route: Route,
        start: usize,
        s: &Splice,
    ) -> Result<Flow, RelayError> {
        let cloak = route.cloak().ok_or(RelayError::UnknownCloak)?;

        if let Some(service) = self.collab.hidden.find_service_by_cloak(cloak) {
            let (id, client) = route.open(&service.private)?;
            let ready = Onion::Ready(Ready {
                id,
                reply: self.reply_path()?,
            });
            self.send_hidden(&client, &ready).await?;
            self.metrics.inc_delivered();
            info!(connection = %id, service = %service.public, "connection accepted");
            return Ok(Flow::Done);
        }

        if let Some((intro, path)) = self.collab.hidden.find_intro_by_cloak(cloak) {
            let message = path.assemble_raw(s.range(start, start + ROUTE_LEN));
            debug!(intro = %intro.id, "passing route to hidden service");
            return Ok(Flow::Reply(message));
        }

        Err(RelayError::UnknownCloak)
    }

    fn handle_ready(&self, ready: Ready) -> Flow {
        let id = ready.id;
        self.collab.hidden.set_return_path(id, ready.reply);
        self.complete(CorrelationKey::Id(id), READY_LEN, Completion::Ready(id))
    }

    fn handle_intro_query(&self, query: IntroQuery) -> Result<Flow, RelayError> {
        let intro = self
            .collab
            .hidden
            .find_intro(&query.key)
            .ok_or(RelayError::UnknownIntro)?;
        let response = Onion::Response(Response {
            id: query.id,
            port: 0,
            bytes: intro.to_bytes(),
        });
        self.metrics.inc_reply();
        Ok(Flow::Reply(query.reply.assemble(&response)))
    }

    fn handle_hidden_service(&self, service: HiddenService) -> Result<Flow, RelayError> {
        let HiddenService { intro, reply } = service;
        if !intro.verify() {
            return Err(RelayError::InvalidSignature(intro.id));
        }
        if intro.is_expired(SystemTime::now()) || intro.addr != self.addr() {
            return Err(RelayError::InvalidIntro(intro.id));
        }
        info!(intro = %intro.id, service = %intro.key, "intro stored");
        self.collab.hidden.add_intro(intro, reply);
        self.metrics.inc_delivered();
        Ok(Flow::Done)
    }

    fn handle_whisper(&self, whisper: Whisper) -> Flow {
        let Whisper { id, reply, bytes } = whisper;
        self.collab.hidden.set_return_path(id, reply);
        if self.collab.hidden.deliver_whisper(id, bytes) {
            self.metrics.inc_delivered();
        } else {
            debug!(connection = %id, "whisper with no consumer");
        }
        Flow::Done
    }
}
