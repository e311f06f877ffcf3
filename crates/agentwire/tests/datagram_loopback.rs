// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Datagram channel over real loopback sockets.
//!
//! Covers the inbound observer fan-out, unicast round trips through the
//! engine's own socket, broadcast bookkeeping and drain accounting.

mod common;

use agentwire::{Engine, EngineError};
use common::{engine_with_executor, loopback_only, wait_until, SlowExecutor};
use parking_lot::Mutex;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn started_engine() -> Engine {
    let engine = engine_with_executor(Arc::new(SlowExecutor {
        delay: Duration::ZERO,
    }));
    engine.start(1).expect("start");
    engine
}

#[test]
fn test_ping_round_trip_through_own_socket() {
    let engine = started_engine();
    let received: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    engine.add_datagram_callback(move |d| sink.lock().push(d.payload.to_vec()));

    let port = engine.local_port().expect("bound port");
    engine
        .send_datagram("127.0.0.1", port, b"ping".to_vec())
        .expect("enqueue");

    assert!(wait_until(Duration::from_secs(5), || !received.lock().is_empty()));
    assert_eq!(received.lock()[0], b"ping");

    engine.stop();
    engine.wait_threads().expect("wait");
}

#[test]
fn test_observers_run_in_registration_order() {
    let engine = started_engine();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    for name in ["first", "second", "third"] {
        let order = Arc::clone(&order);
        engine.add_datagram_callback(move |_| order.lock().push(name));
    }

    let port = engine.local_port().expect("bound port");
    let peer = UdpSocket::bind("127.0.0.1:0").expect("peer");
    peer.send_to(b"hello", ("127.0.0.1", port)).expect("send");

    assert!(wait_until(Duration::from_secs(5), || order.lock().len() == 3));
    assert_eq!(*order.lock(), vec!["first", "second", "third"]);
}

#[test]
fn test_source_address_reported() {
    let engine = started_engine();
    let sources = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sources);
    engine.add_datagram_callback(move |d| sink.lock().push(d.source));

    let peer = UdpSocket::bind("127.0.0.1:0").expect("peer");
    let peer_addr = peer.local_addr().expect("peer addr");
    let port = engine.local_port().expect("bound port");
    peer.send_to(b"who", ("127.0.0.1", port)).expect("send");

    assert!(wait_until(Duration::from_secs(5), || !sources.lock().is_empty()));
    assert_eq!(sources.lock()[0], peer_addr);
}

#[test]
fn test_unicast_reaches_external_peer() {
    let engine = started_engine();
    let peer = UdpSocket::bind("127.0.0.1:0").expect("peer");
    peer.set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");
    let peer_port = peer.local_addr().expect("peer addr").port();

    engine
        .send_datagram("localhost", peer_port, b"status".to_vec())
        .expect("enqueue");

    let mut buf = [0u8; 64];
    let (n, from) = peer.recv_from(&mut buf).expect("recv");
    assert_eq!(&buf[..n], b"status");
    assert_eq!(from.port(), engine.local_port().expect("bound port"));
}

#[test]
fn test_unknown_host_counted_as_failure() {
    let engine = started_engine();
    engine
        .send_datagram("no-such-host.invalid", 9, b"x".to_vec())
        .expect("enqueue succeeds; resolution happens on the send thread");

    assert!(wait_until(Duration::from_secs(10), || {
        engine.metrics().datagrams_failed == 1
    }));
    assert_eq!(engine.metrics().datagrams_sent, 0);
}

#[test]
fn test_broadcast_without_eligible_interface_fails_quietly() {
    let engine = Engine::builder()
        .interface_source(loopback_only())
        .http_executor(Arc::new(SlowExecutor {
            delay: Duration::ZERO,
        }))
        .build();
    engine.start(1).expect("start");

    engine
        .send_broadcast_datagram(45000, b"discover".to_vec())
        .expect("enqueue");

    assert!(wait_until(Duration::from_secs(5), || {
        engine.metrics().datagrams_failed == 1
    }));
    assert_eq!(engine.metrics().broadcast_interface_sends, 0);
}

#[test]
fn test_every_job_sent_or_dropped_exactly_once() {
    let engine = started_engine();
    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    engine.add_datagram_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let port = engine.local_port().expect("bound port");
    for i in 0..200u32 {
        engine
            .send_datagram("127.0.0.1", port, i.to_be_bytes().to_vec())
            .expect("enqueue");
    }

    engine.stop();
    engine.wait_threads().expect("wait");

    let snap = engine.metrics();
    assert_eq!(snap.datagrams_queued, 200);
    assert_eq!(
        snap.datagrams_sent + snap.datagrams_failed + snap.datagrams_dropped,
        200
    );
    assert_eq!(snap.datagrams_outstanding(), 0);
    assert_eq!(engine.pending_datagrams(), 0);
    assert!(received.load(Ordering::SeqCst) as u64 <= snap.datagrams_sent);
}

#[test]
fn test_send_after_stop_rejected() {
    let engine = started_engine();
    engine.stop();
    assert!(matches!(
        engine.send_datagram("127.0.0.1", 9, b"late".to_vec()),
        Err(EngineError::NotRunning)
    ));
}

#[test]
fn test_last_reference_dropped_inside_datagram_handler() {
    let engine = Arc::new(started_engine());
    let slot: Arc<Mutex<Option<Arc<Engine>>>> = Arc::new(Mutex::new(Some(Arc::clone(&engine))));
    let (done_tx, done_rx) = crossbeam::channel::bounded(1);

    let handler_slot = Arc::clone(&slot);
    engine.add_datagram_callback(move |d| {
        let owner = handler_slot.lock().take();
        if let Some(owner) = owner {
            while Arc::strong_count(&owner) > 1 {
                std::thread::sleep(Duration::from_millis(5));
            }
            // Shuts the engine down from its own receive thread
            drop(owner);
            let _ = done_tx.send(d.payload.to_vec());
        }
    });

    let port = engine.local_port().expect("bound port");
    drop(engine);

    let peer = UdpSocket::bind("127.0.0.1:0").expect("peer");
    peer.send_to(b"last", ("127.0.0.1", port)).expect("send");

    let payload = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("handler finished after dropping the engine");
    assert_eq!(payload, b"last");
}
