// Copyright (c) 2024 Botho Foundation
//
//! Integration tests for forward routing, reply paths and accounting.
//!
//! These tests verify:
//! - Multi-hop forward delivery peels exactly one layer per hop
//! - Reply paths keep a constant size and change on every hop
//! - Sessions are charged per relayed byte and refused once exhausted
//! - Exit requests, balance queries and timeouts reach the requester

mod common;

use std::time::{Duration, Instant};

use common::*;
use veil::{
    collab::{Completion, CorrelationKey, Payment, PendingResponse},
    onion::{
        assemble, Balance, Confirmation, Delay, Onion, Response, BALANCE_LAYER_LEN,
        CONFIRMATION_LEN, CRYPT_LEN, EXIT_LEN, FORWARD_LEN, RESPONSE_LEN, REVERSE_CRYPT_LEN,
        ROUTING_HEADER_LEN,
    },
    wire::Id,
    RelayError,
};

fn expect_confirmation(node: &TestNode, id: Id) -> tokio::sync::mpsc::UnboundedReceiver<Completion> {
    let (callback, rx) = completions();
    node.engine.pending().add(PendingResponse::new(
        CorrelationKey::Id(id),
        Duration::from_secs(5),
        callback,
    ));
    rx
}

// ============================================================================
// Forward routing
// ============================================================================

#[tokio::test]
async fn test_three_hop_confirmation() {
    let network = TestNetwork::new();
    let client = network.add_node(7000);
    let r1 = network.add_node(7001);
    let r2 = network.add_node(7002);
    let r3 = network.add_node(7003);

    let id = Id(0x1122334455667788);
    let mut done = expect_confirmation(&r3, id);

    let hops = [r1.hop(), r2.hop(), r3.hop()];
    let sent = client
        .engine
        .send_through(&hops, Onion::Confirmation(Confirmation { id }))
        .await
        .unwrap();

    let (l1, result) = r1.deliver().await;
    result.unwrap();
    let (l2, result) = r2.deliver().await;
    result.unwrap();
    let (l3, result) = r3.deliver().await;
    result.unwrap();

    assert_eq!(l1, sent);
    assert_eq!(l1 - l2, CRYPT_LEN + FORWARD_LEN);
    assert_eq!(l2 - l3, CRYPT_LEN + FORWARD_LEN);
    assert_eq!(l3, CRYPT_LEN + CONFIRMATION_LEN);

    assert_eq!(recv(&mut done).await, Completion::Confirmed(id));
    assert!(done.try_recv().is_err());
    assert!(r3.engine.pending().is_empty());
    assert!(!client.has_queued() && !r1.has_queued() && !r2.has_queued());
    assert_eq!(r1.engine.metrics().messages_forwarded, 1);
    assert_eq!(r3.engine.metrics().messages_delivered, 1);
}

#[tokio::test]
async fn test_delay_postpones_delivery() {
    let mut network = TestNetwork::new();
    let client = network.add_node(7010);
    let relay = network.add_node(7011);
    network.start(&relay);

    let id = Id(7);
    let mut done = expect_confirmation(&relay, id);
    let terminal = assemble(vec![
        Onion::Delay(Delay::new(Duration::from_millis(50), Onion::End)),
        Onion::Confirmation(Confirmation { id }),
    ]);

    let started = Instant::now();
    client
        .engine
        .send_through(&[relay.hop()], terminal)
        .await
        .unwrap();
    assert_eq!(recv(&mut done).await, Completion::Confirmed(id));
    assert!(started.elapsed() >= Duration::from_millis(50));

    network.stop().await;
}

#[tokio::test]
async fn test_delay_does_not_block_later_messages() {
    let mut network = TestNetwork::new();
    let client = network.add_node(7012);
    let relay = network.add_node(7013);
    network.start(&relay);

    let (slow, fast) = (Id(8), Id(9));
    let mut slow_done = expect_confirmation(&relay, slow);
    let mut fast_done = expect_confirmation(&relay, fast);

    let delayed = assemble(vec![
        Onion::Delay(Delay::new(Duration::from_millis(300), Onion::End)),
        Onion::Confirmation(Confirmation { id: slow }),
    ]);
    let started = Instant::now();
    client
        .engine
        .send_through(&[relay.hop()], delayed)
        .await
        .unwrap();
    client
        .engine
        .send_through(&[relay.hop()], Onion::Confirmation(Confirmation { id: fast }))
        .await
        .unwrap();

    assert_eq!(recv(&mut fast_done).await, Completion::Confirmed(fast));
    assert!(started.elapsed() < Duration::from_millis(300));
    assert!(slow_done.try_recv().is_err());

    assert_eq!(recv(&mut slow_done).await, Completion::Confirmed(slow));
    assert!(started.elapsed() >= Duration::from_millis(300));

    network.stop().await;
}

#[tokio::test]
async fn test_delay_over_limit_rejected() {
    let network = TestNetwork::new();
    let client = network.add_node(7014);
    let relay = network.add_node(7015);

    let id = Id(10);
    let mut done = expect_confirmation(&relay, id);
    let terminal = assemble(vec![
        Onion::Delay(Delay::new(Duration::from_secs(3600), Onion::End)),
        Onion::Confirmation(Confirmation { id }),
    ]);
    client
        .engine
        .send_through(&[relay.hop()], terminal)
        .await
        .unwrap();

    let (_, result) = relay.deliver().await;
    assert!(matches!(result, Err(RelayError::DelayTooLong(d)) if d == Duration::from_secs(3600)));
    assert_eq!(relay.engine.metrics().dropped_invalid, 1);
    assert!(done.try_recv().is_err());
}

#[tokio::test]
async fn test_truncated_message_dropped() {
    let network = TestNetwork::new();
    let relay = network.add_node(7021);

    let mut bytes = b"cryp".to_vec();
    bytes.extend_from_slice(&[0u8; 20]);

    let err = relay.engine.handle_message(bytes).await.unwrap_err();
    assert!(matches!(err, RelayError::Wire(_)));
    assert_eq!(relay.engine.metrics().dropped_malformed, 1);
}

// ============================================================================
// Reply paths
// ============================================================================

#[tokio::test]
async fn test_reply_header_size_is_constant() {
    let network = TestNetwork::new();
    let client = network.add_node(7030);
    let r1 = network.add_node(7031);
    let r2 = network.add_node(7032);
    client.peers.push(r1.hop());
    client.peers.push(r2.hop());

    let id = Id(42);
    let mut done = expect_confirmation(&client, id);
    let path = client.engine.reply_path().unwrap();
    let first = path.assemble(&Onion::Confirmation(Confirmation { id }));
    assert_eq!(first.len(), ROUTING_HEADER_LEN + CONFIRMATION_LEN);

    r1.engine.handle_message(first.clone()).await.unwrap();
    let second = r2.transport.try_receive().unwrap();
    r2.engine.handle_message(second.clone()).await.unwrap();
    let third = client.transport.try_receive().unwrap();
    client.engine.handle_message(third.clone()).await.unwrap();

    assert_eq!(second.len(), first.len());
    assert_eq!(third.len(), first.len());
    assert_ne!(second, first);
    assert_ne!(third, second);
    // No hop can read the body in transit
    assert_ne!(&third[ROUTING_HEADER_LEN..], &first[ROUTING_HEADER_LEN..]);

    assert_eq!(recv(&mut done).await, Completion::Confirmed(id));
}

#[tokio::test]
async fn test_reply_through_same_relay_twice() {
    let network = TestNetwork::new();
    let client = network.add_node(7040);
    let r1 = network.add_node(7041);
    let stranger = network.add_node(7042);
    client.peers.push(r1.hop());
    client.peers.push(r1.hop());

    let id = Id(1);
    let mut done = expect_confirmation(&client, id);
    let path = client.engine.reply_path().unwrap();
    let bytes = path.assemble(&Onion::Confirmation(Confirmation { id }));

    // The first slot is addressed to r1, so a stranger just passes it on
    stranger.engine.handle_message(bytes.clone()).await.unwrap();
    assert_eq!(r1.transport.try_receive().unwrap(), bytes);

    // r1 peels both of its slots in one pass
    r1.engine.handle_message(bytes).await.unwrap();
    assert!(!r1.has_queued());
    let (len, result) = client.deliver().await;
    result.unwrap();
    assert_eq!(len, ROUTING_HEADER_LEN + CONFIRMATION_LEN);
    assert_eq!(recv(&mut done).await, Completion::Confirmed(id));
}

// ============================================================================
// Exit requests and accounting
// ============================================================================

#[tokio::test]
async fn test_exit_request_charges_every_session() {
    let mut network = TestNetwork::new();
    let client = network.add_node(7050);
    let r1 = network.add_node(7051);
    let r2 = network.add_node(7052);
    let exit = network.add_node(7053);
    exit.services.register(9, 3, |req| [b"pong:", req].concat());

    let balance = TEST_SESSION_BALANCE;
    let (s1, h1) = open_session(&r1, balance, 2);
    let (s2, h2) = open_session(&r2, balance, 2);
    let (sx, hx) = open_session(&exit, balance, 1);
    // Replies travel exit -> r2 -> r1 -> client
    client.peers.push(h2);
    client.peers.push(h1);

    for node in [&client, &r1, &r2, &exit] {
        network.start(node);
    }

    let (callback, mut done) = completions();
    let id = client
        .engine
        .request(&[h1, h2, hx], 9, b"ping".to_vec(), vec![], callback)
        .await
        .unwrap();

    let answer = b"pong:ping".to_vec();
    assert_eq!(
        recv(&mut done).await,
        Completion::Response(Response {
            id,
            port: 9,
            bytes: answer.clone(),
        })
    );

    let total = 3 * CRYPT_LEN + 2 * FORWARD_LEN + EXIT_LEN + 4;
    let l1 = (total - CRYPT_LEN - FORWARD_LEN) as i64;
    let l2 = l1 - REVERSE_CRYPT_LEN as i64;
    let lr = (ROUTING_HEADER_LEN + RESPONSE_LEN + answer.len()) as i64;

    assert_eq!(r1.engine.sessions().balance(s1), Some(balance - 2 * (l1 + lr)));
    assert_eq!(r2.engine.sessions().balance(s2), Some(balance - 2 * (l2 + lr)));
    assert_eq!(exit.engine.sessions().balance(sx), Some(balance - 3 * (l2 + lr)));

    network.stop().await;
}

#[tokio::test]
async fn test_silent_service_answers_empty() {
    let mut network = TestNetwork::new();
    let client = network.add_node(7060);
    let r1 = network.add_node(7061);
    let r2 = network.add_node(7062);
    let mut config = TestNetwork::config(7063);
    config.service_timeout_ms = 50;
    let exit = network.add_node_with(config);
    exit.services.register_silent(7, 1);
    client.peers.push(r1.hop());
    client.peers.push(r2.hop());

    for node in [&client, &r1, &r2, &exit] {
        network.start(node);
    }

    let (callback, mut done) = completions();
    let id = client
        .engine
        .request(&[exit.hop()], 7, b"anyone?".to_vec(), vec![], callback)
        .await
        .unwrap();
    assert_eq!(
        recv(&mut done).await,
        Completion::Response(Response {
            id,
            port: 7,
            bytes: Vec::new(),
        })
    );

    network.stop().await;
}

#[tokio::test]
async fn test_balance_query() {
    let mut network = TestNetwork::new();
    let client = network.add_node(7070);
    let r1 = network.add_node(7071);
    let r2 = network.add_node(7072);
    let (s1, h1) = open_session(&r1, 5000, 1);
    client.peers.push(r2.hop());
    client.peers.push(r1.hop());

    for node in [&client, &r1, &r2] {
        network.start(node);
    }

    let (callback, mut done) = completions();
    let id = client.engine.query_balance(&[h1], s1, callback).await.unwrap();
    assert_eq!(
        recv(&mut done).await,
        Completion::Balance(Balance { id, amount: 5000 })
    );

    let reply_len = (ROUTING_HEADER_LEN + BALANCE_LAYER_LEN) as i64;
    assert_eq!(r1.engine.sessions().balance(s1), Some(5000 - reply_len));

    network.stop().await;
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let mut network = TestNetwork::new();
    let mut config = TestNetwork::config(7080);
    config.request_timeout_ms = 100;
    let client = network.add_node_with(config);
    let r1 = network.add_node(7081);
    let r2 = network.add_node(7082);
    client.peers.push(r1.hop());
    client.peers.push(r2.hop());

    for node in [&client, &r1, &r2] {
        network.start(node);
    }

    // Nothing listens on port 1 at r1, so the request is dropped there
    let (callback, mut done) = completions();
    let id = client
        .engine
        .request(&[r1.hop()], 1, b"hello".to_vec(), vec![], callback)
        .await
        .unwrap();
    assert_eq!(
        recv(&mut done).await,
        Completion::TimedOut(CorrelationKey::Id(id))
    );
    assert!(client.engine.pending().is_empty());

    network.stop().await;
}

// ============================================================================
// Sessions and payments
// ============================================================================

#[tokio::test]
async fn test_session_needs_payment() {
    let network = TestNetwork::new();
    let client = network.add_node(7090);
    let relay = network.add_node(7091);
    let next = network.add_node(7092);

    let unpaid = client.engine.buy_session(&relay.hop()).await.unwrap();
    let (_, result) = relay.deliver().await;
    assert!(matches!(result, Err(RelayError::PaymentNotFound(id)) if id == unpaid.id));
    assert!(relay.engine.sessions().sessions().is_empty());
    assert!(!next.has_queued());

    let paid = client.engine.buy_session(&relay.hop()).await.unwrap();
    relay.payments.receive(
        paid.preimage,
        Payment {
            id: paid.id,
            amount: 4000,
        },
    );
    let (_, result) = relay.deliver().await;
    result.unwrap();
    assert_eq!(relay.engine.sessions().balance(paid.id), Some(4000));
    assert!(relay.payments.is_empty());

    // Route through the new session
    let id = Id(11);
    let mut done = expect_confirmation(&next, id);
    let sent = client
        .engine
        .send_through(&[paid.hop(), next.hop()], Onion::Confirmation(Confirmation { id }))
        .await
        .unwrap();
    relay.deliver().await.1.unwrap();
    next.deliver().await.1.unwrap();
    assert_eq!(recv(&mut done).await, Completion::Confirmed(id));

    let forwarded = (sent - CRYPT_LEN - FORWARD_LEN) as i64;
    assert_eq!(relay.engine.sessions().balance(paid.id), Some(4000 - forwarded));
}

#[tokio::test]
async fn test_exhausted_session_refused() {
    let network = TestNetwork::new();
    let client = network.add_node(7100);
    let relay = network.add_node(7101);
    let next = network.add_node(7102);
    let (session, hop) = open_session(&relay, 10, 1);

    let route = [hop, next.hop()];
    let confirm = || Onion::Confirmation(Confirmation { id: Id(1) });

    // The first message is allowed and drives the balance below zero
    client.engine.send_through(&route, confirm()).await.unwrap();
    relay.deliver().await.1.unwrap();
    assert!(next.has_queued());
    assert!(relay.engine.sessions().balance(session).unwrap() <= 0);
    next.deliver().await;

    client.engine.send_through(&route, confirm()).await.unwrap();
    let (_, result) = relay.deliver().await;
    assert!(matches!(result, Err(RelayError::SessionExhausted(id)) if id == session));
    assert!(!next.has_queued());
    assert_eq!(relay.engine.metrics().dropped_exhausted, 1);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_run_stops_on_cancel() {
    let mut network = TestNetwork::new();
    let node = network.add_node(7110);
    network.start(&node);
    tokio::time::sleep(Duration::from_millis(30)).await;
    network.stop().await;
}
