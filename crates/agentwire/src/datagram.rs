// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP datagram channel.
//!
//! One socket bound to an ephemeral port, shared by two dedicated threads:
//!
//! ```text
//!   send_datagram() ---+
//!   send_broadcast() --+--> [FIFO queue] --> agentwire-udp-tx --> socket.send_to()
//!                                                                  (unicast or every
//!                                                                   broadcast interface)
//!
//!   socket.recv_from() --> agentwire-udp-rx --> handler 1, handler 2, ... (in order)
//! ```
//!
//! Shutdown: [`DatagramChannel::close`] raises the closed flag, drops the queue
//! producer, drains queued jobs and sends a zero-length wake datagram to the
//! socket's own loopback address so the blocking read returns and the receive
//! loop observes the flag.

use crate::config::MAX_DATAGRAM_SIZE;
use crate::error::{EngineError, Result};
use crate::iface::InterfaceRegistry;
use crate::metrics::EngineMetrics;
use arc_swap::ArcSwap;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockAddr, SockRef, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// An inbound datagram, borrowed from the receive buffer.
#[derive(Debug, Clone, Copy)]
pub struct ReceivedDatagram<'a> {
    pub source: SocketAddr,
    pub payload: &'a [u8],
}

/// Inbound datagram observer. Runs on the receive thread.
pub type DatagramHandler = Arc<dyn Fn(&ReceivedDatagram<'_>) + Send + Sync>;

/// Registration-ordered handler list; readers never block registration.
pub(crate) type HandlerList = Arc<ArcSwap<Vec<DatagramHandler>>>;

/// Where a queued datagram goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DatagramTarget {
    Unicast { host: String, port: u16 },
    Broadcast { port: u16 },
}

/// One outbound datagram. The payload is owned by the job and dropped once
/// the send attempt finishes.
#[derive(Debug)]
pub(crate) struct DatagramJob {
    pub(crate) target: DatagramTarget,
    pub(crate) payload: Vec<u8>,
}

/// Anything that can put a datagram on the wire.
pub(crate) trait DatagramSink {
    fn send_to(&self, payload: &[u8], dest: SocketAddr) -> io::Result<usize>;
}

impl DatagramSink for UdpSocket {
    fn send_to(&self, payload: &[u8], dest: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, payload, dest)
    }
}

/// UDP socket plus its send and receive threads.
pub(crate) struct DatagramChannel {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    closed: Arc<AtomicBool>,
    /// `None` once closed; enqueueing then fails.
    queue_tx: Mutex<Option<Sender<DatagramJob>>>,
    queue_rx: Receiver<DatagramJob>,
    handlers: HandlerList,
    registry: Arc<ArcSwap<InterfaceRegistry>>,
    metrics: Arc<EngineMetrics>,
    rx_thread: Mutex<Option<JoinHandle<()>>>,
    tx_thread: Mutex<Option<JoinHandle<()>>>,
}

impl DatagramChannel {
    /// Bind the socket to `0.0.0.0:0` with broadcast and address reuse enabled.
    ///
    /// No thread is started; see [`DatagramChannel::spawn`].
    pub(crate) fn open(
        handlers: HandlerList,
        registry: Arc<ArcSwap<InterfaceRegistry>>,
        metrics: Arc<EngineMetrics>,
    ) -> Result<Self> {
        let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(EngineError::socket("create"))?;
        socket2
            .set_broadcast(true)
            .map_err(EngineError::socket("set_broadcast"))?;
        socket2
            .set_reuse_address(true)
            .map_err(EngineError::socket("set_reuse_address"))?;

        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
        socket2
            .bind(&SockAddr::from(bind_addr))
            .map_err(EngineError::socket("bind"))?;

        let socket: UdpSocket = socket2.into();
        let local_addr = socket
            .local_addr()
            .map_err(EngineError::socket("local_addr"))?;
        log::info!("[UDP] Datagram socket bound to {}", local_addr);

        let (queue_tx, queue_rx) = channel::unbounded();

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            closed: Arc::new(AtomicBool::new(false)),
            queue_tx: Mutex::new(Some(queue_tx)),
            queue_rx,
            handlers,
            registry,
            metrics,
            rx_thread: Mutex::new(None),
            tx_thread: Mutex::new(None),
        })
    }

    /// Start the receive and send threads.
    ///
    /// On failure the threads already running keep running; the caller must
    /// [`close`](Self::close) and [`join`](Self::join).
    pub(crate) fn spawn(&self) -> Result<()> {
        let socket = Arc::clone(&self.socket);
        let closed = Arc::clone(&self.closed);
        let handlers = Arc::clone(&self.handlers);
        let metrics = Arc::clone(&self.metrics);
        let rx = thread::Builder::new()
            .name("agentwire-udp-rx".to_string())
            .spawn(move || receive_loop(&socket, &closed, &handlers, &metrics))
            .map_err(EngineError::ThreadSpawn)?;
        *self.rx_thread.lock() = Some(rx);

        let socket = Arc::clone(&self.socket);
        let closed = Arc::clone(&self.closed);
        let queue = self.queue_rx.clone();
        let registry = Arc::clone(&self.registry);
        let metrics = Arc::clone(&self.metrics);
        let tx = thread::Builder::new()
            .name("agentwire-udp-tx".to_string())
            .spawn(move || send_loop(&*socket, &queue, &closed, &registry, &metrics))
            .map_err(EngineError::ThreadSpawn)?;
        *self.tx_thread.lock() = Some(tx);

        Ok(())
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Queue a datagram; returns immediately.
    pub(crate) fn enqueue(&self, job: DatagramJob) -> Result<()> {
        let guard = self.queue_tx.lock();
        let tx = guard.as_ref().ok_or(EngineError::NotRunning)?;
        tx.send(job).map_err(|_| EngineError::NotRunning)?;
        self.metrics.record_datagram_queued();
        Ok(())
    }

    /// Jobs queued but not yet picked up by the send thread.
    pub(crate) fn pending(&self) -> usize {
        self.queue_rx.len()
    }

    /// Close the channel: stop accepting jobs, drop queued ones, unblock the
    /// receive thread. Returns how many queued jobs were dropped. Idempotent.
    pub(crate) fn close(&self) -> usize {
        if self.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }

        // Disconnecting the queue lets the send loop exit once it is empty.
        drop(self.queue_tx.lock().take());
        let dropped = self.queue_rx.try_iter().count();
        if dropped > 0 {
            self.metrics.record_datagrams_dropped(dropped);
            log::debug!("[UDP] Dropped {} queued datagrams on close", dropped);
        }

        let wake_addr = SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::LOCALHOST,
            self.local_addr.port(),
        ));
        if let Err(e) = self.socket.send_to(&[], wake_addr) {
            log::debug!("[UDP] Wake datagram to {} failed: {}", wake_addr, e);
        }
        if let Err(e) = SockRef::from(&*self.socket).shutdown(Shutdown::Read) {
            log::trace!("[UDP] shutdown(Read) on close: {}", e);
        }

        dropped
    }

    /// Join both threads. Safe to call more than once.
    ///
    /// Called from one of the channel's own threads (a handler dropping the
    /// last engine reference), that thread is detached instead.
    pub(crate) fn join(&self) {
        let current = thread::current().id();
        for (name, slot) in [("rx", &self.rx_thread), ("tx", &self.tx_thread)] {
            let handle = slot.lock().take();
            if let Some(handle) = handle {
                if handle.thread().id() == current {
                    log::debug!("[UDP] {} thread finishing shutdown itself, detaching", name);
                    continue;
                }
                if handle.join().is_err() {
                    log::warn!("[UDP] {} thread panicked", name);
                }
            }
        }
    }

    /// True when neither thread is running.
    pub(crate) fn is_finished(&self) -> bool {
        [&self.rx_thread, &self.tx_thread]
            .iter()
            .all(|slot| slot.lock().as_ref().map_or(true, JoinHandle::is_finished))
    }
}

fn receive_loop(
    socket: &UdpSocket,
    closed: &AtomicBool,
    handlers: &ArcSwap<Vec<DatagramHandler>>,
    metrics: &EngineMetrics,
) {
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    log::debug!("[UDP] Receive loop started");

    loop {
        match socket.recv_from(&mut buf) {
            Ok((n, source)) => {
                if closed.load(Ordering::Acquire) {
                    break;
                }
                if n == 0 {
                    log::debug!("[UDP] Zero-length datagram from {}, receive loop exiting", source);
                    break;
                }
                metrics.record_datagram_received(n);
                log::trace!("[UDP] recv {} bytes from {}", n, source);

                let datagram = ReceivedDatagram {
                    source,
                    payload: &buf[..n],
                };
                for handler in handlers.load().iter() {
                    let delivered = panic::catch_unwind(AssertUnwindSafe(|| handler(&datagram)));
                    if delivered.is_err() {
                        log::error!("[UDP] Datagram handler panicked on packet from {}", source);
                    }
                }
            }
            Err(e) if is_transient(&e) && !closed.load(Ordering::Acquire) => {
                log::trace!("[UDP] Transient receive error: {}", e);
            }
            Err(e) => {
                if !closed.load(Ordering::Acquire) {
                    log::warn!("[UDP] Receive failed, loop exiting: {}", e);
                }
                break;
            }
        }
    }

    log::debug!("[UDP] Receive loop stopped");
}

/// Receive errors that leave the socket usable.
///
/// ICMP port-unreachable from an earlier send surfaces as `ConnectionReset`
/// on some platforms.
fn is_transient(e: &io::Error) -> bool {
    is_oversized(e)
        || matches!(
            e.kind(),
            io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted
        )
}

/// Windows reports a datagram larger than the buffer as `WSAEMSGSIZE`
/// instead of truncating it.
#[cfg(windows)]
fn is_oversized(e: &io::Error) -> bool {
    const WSAEMSGSIZE: i32 = 10040;
    e.raw_os_error() == Some(WSAEMSGSIZE)
}

#[cfg(not(windows))]
fn is_oversized(_e: &io::Error) -> bool {
    false
}

fn send_loop(
    sink: &dyn DatagramSink,
    queue: &Receiver<DatagramJob>,
    closed: &AtomicBool,
    registry: &ArcSwap<InterfaceRegistry>,
    metrics: &EngineMetrics,
) {
    log::debug!("[UDP] Send loop started");

    // Ends once the queue is disconnected and empty.
    for job in queue.iter() {
        if closed.load(Ordering::Acquire) {
            metrics.record_datagrams_dropped(1);
            continue;
        }
        process_job(sink, &registry.load(), job, metrics);
    }

    log::debug!("[UDP] Send loop stopped");
}

/// Send one job and account for it. The payload is dropped on return.
pub(crate) fn process_job(
    sink: &dyn DatagramSink,
    registry: &InterfaceRegistry,
    job: DatagramJob,
    metrics: &EngineMetrics,
) {
    let result = match &job.target {
        DatagramTarget::Unicast { host, port } => {
            send_unicast(sink, host, *port, &job.payload).map(|_| ())
        }
        DatagramTarget::Broadcast { port } => {
            send_broadcast(sink, &registry.broadcast_targets(), *port, &job.payload, metrics)
                .map(|_| ())
        }
    };

    match result {
        Ok(()) => metrics.record_datagram_sent(),
        Err(e) => {
            metrics.record_datagram_failed();
            log::debug!(
                "[UDP] send failed target={:?} len={}: {}",
                job.target,
                job.payload.len(),
                e
            );
        }
    }
}

/// Resolve `host` and send one unicast datagram.
pub(crate) fn send_unicast(
    sink: &dyn DatagramSink,
    host: &str,
    port: u16,
    payload: &[u8],
) -> Result<usize> {
    let dest = resolve_ipv4(host, port)?;
    let sent = sink
        .send_to(payload, dest)
        .map_err(EngineError::SocketOperation)?;
    log::trace!("[UDP] send {} bytes -> {}", sent, dest);
    Ok(sent)
}

/// Send `payload` to every broadcast target.
///
/// Succeeds when at least one interface accepted the datagram; returns the
/// number of interfaces that did. Individual failures are only logged.
pub(crate) fn send_broadcast(
    sink: &dyn DatagramSink,
    targets: &[Ipv4Addr],
    port: u16,
    payload: &[u8],
    metrics: &EngineMetrics,
) -> Result<usize> {
    if targets.is_empty() {
        return Err(EngineError::NoBroadcastInterface);
    }

    let mut delivered = 0;
    let mut last_error = None;
    for &bcast in targets {
        let dest = SocketAddr::V4(SocketAddrV4::new(bcast, port));
        match sink.send_to(payload, dest) {
            Ok(_) => {
                delivered += 1;
                metrics.record_broadcast_interface_send();
                log::trace!("[UDP] broadcast {} bytes -> {}", payload.len(), dest);
            }
            Err(e) => {
                log::debug!("[UDP] broadcast to {} failed: {}", dest, e);
                last_error = Some(e);
            }
        }
    }

    match (delivered, last_error) {
        (0, Some(e)) => Err(EngineError::SocketOperation(e)),
        (n, _) => Ok(n),
    }
}

/// First IPv4 address `host` resolves to.
pub(crate) fn resolve_ipv4(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|_| EngineError::UnknownHost(host.to_string()))?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| EngineError::UnknownHost(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface::AdapterAddress;
    use std::sync::mpsc;
    use std::time::Duration;

    /// Records destinations; fails for addresses in `reject`.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<SocketAddr>>,
        reject: Vec<Ipv4Addr>,
    }

    impl DatagramSink for RecordingSink {
        fn send_to(&self, payload: &[u8], dest: SocketAddr) -> io::Result<usize> {
            if let SocketAddr::V4(v4) = dest {
                if self.reject.contains(v4.ip()) {
                    return Err(io::Error::new(io::ErrorKind::PermissionDenied, "rejected"));
                }
            }
            self.sent.lock().push(dest);
            Ok(payload.len())
        }
    }

    fn three_interfaces_two_down() -> InterfaceRegistry {
        let eth = |name: &str, addr: [u8; 4]| {
            AdapterAddress::new(name, Ipv4Addr::from(addr))
                .with_prefix_len(24)
                .with_broadcast(true)
        };
        InterfaceRegistry::from_adapters(vec![
            eth("eth0", [192, 168, 1, 10]).with_up(false),
            eth("eth1", [10, 0, 0, 4]).with_up(false),
            eth("wlan0", [172, 16, 5, 9]),
        ])
    }

    #[test]
    fn test_broadcast_succeeds_with_one_eligible_interface() {
        let registry = three_interfaces_two_down();
        let sink = RecordingSink::default();
        let metrics = EngineMetrics::new();

        let delivered = send_broadcast(&sink, &registry.broadcast_targets(), 9999, b"hello", &metrics)
            .expect("broadcast should succeed");

        assert_eq!(delivered, 1);
        assert_eq!(
            *sink.sent.lock(),
            vec!["172.16.5.255:9999".parse::<SocketAddr>().expect("addr")]
        );
    }

    #[test]
    fn test_broadcast_partial_failure_is_success() {
        let targets = [Ipv4Addr::new(192, 168, 1, 255), Ipv4Addr::new(10, 0, 0, 255)];
        let sink = RecordingSink {
            reject: vec![Ipv4Addr::new(192, 168, 1, 255)],
            ..Default::default()
        };
        let metrics = EngineMetrics::new();

        let delivered = send_broadcast(&sink, &targets, 5000, b"x", &metrics).expect("partial");
        assert_eq!(delivered, 1);
        assert_eq!(metrics.snapshot().broadcast_interface_sends, 1);
    }

    #[test]
    fn test_broadcast_all_failed() {
        let targets = [Ipv4Addr::new(192, 168, 1, 255)];
        let sink = RecordingSink {
            reject: targets.to_vec(),
            ..Default::default()
        };
        let err = send_broadcast(&sink, &targets, 5000, b"x", &EngineMetrics::new()).unwrap_err();
        assert!(matches!(err, EngineError::SocketOperation(_)));
    }

    #[test]
    fn test_broadcast_without_targets() {
        let sink = RecordingSink::default();
        let err = send_broadcast(&sink, &[], 5000, b"x", &EngineMetrics::new()).unwrap_err();
        assert!(matches!(err, EngineError::NoBroadcastInterface));
    }

    #[test]
    fn test_unicast_resolves_literal() {
        let sink = RecordingSink::default();
        let sent = send_unicast(&sink, "127.0.0.1", 4242, b"ping").expect("send");
        assert_eq!(sent, 4);
        assert_eq!(
            *sink.sent.lock(),
            vec!["127.0.0.1:4242".parse::<SocketAddr>().expect("addr")]
        );
    }

    #[test]
    fn test_unknown_host() {
        let err = resolve_ipv4("no-such-host.invalid", 80).unwrap_err();
        assert!(matches!(err, EngineError::UnknownHost(ref h) if h == "no-such-host.invalid"));
    }

    #[test]
    fn test_process_job_accounting() {
        let registry = three_interfaces_two_down();
        let sink = RecordingSink::default();
        let metrics = EngineMetrics::new();

        let jobs = vec![
            DatagramJob {
                target: DatagramTarget::Unicast {
                    host: "127.0.0.1".into(),
                    port: 1,
                },
                payload: b"a".to_vec(),
            },
            DatagramJob {
                target: DatagramTarget::Broadcast { port: 2 },
                payload: b"b".to_vec(),
            },
            DatagramJob {
                target: DatagramTarget::Unicast {
                    host: "no-such-host.invalid".into(),
                    port: 3,
                },
                payload: b"c".to_vec(),
            },
        ];
        for job in jobs {
            process_job(&sink, &registry, job, &metrics);
        }

        let snap = metrics.snapshot();
        assert_eq!(snap.datagrams_sent, 2);
        assert_eq!(snap.datagrams_failed, 1);
    }

    fn open_channel() -> (DatagramChannel, HandlerList, Arc<EngineMetrics>) {
        let handlers: HandlerList = Arc::new(ArcSwap::from_pointee(Vec::new()));
        let registry = Arc::new(ArcSwap::from_pointee(InterfaceRegistry::default()));
        let metrics = Arc::new(EngineMetrics::new());
        let channel = DatagramChannel::open(Arc::clone(&handlers), registry, Arc::clone(&metrics))
            .expect("open channel");
        (channel, handlers, metrics)
    }

    #[test]
    fn test_open_binds_ephemeral_port() {
        let (channel, _, _) = open_channel();
        assert_ne!(channel.local_addr().port(), 0);
        assert!(channel.local_addr().ip().is_unspecified());
    }

    #[test]
    fn test_loopback_round_trip() {
        let (channel, handlers, metrics) = open_channel();
        let (seen_tx, seen_rx) = mpsc::channel();
        let seen_tx = Mutex::new(seen_tx);
        handlers.store(Arc::new(vec![Arc::new(move |d: &ReceivedDatagram<'_>| {
            let _ = seen_tx.lock().send(d.payload.to_vec());
        }) as DatagramHandler]));

        channel.spawn().expect("spawn");
        channel
            .enqueue(DatagramJob {
                target: DatagramTarget::Unicast {
                    host: "127.0.0.1".into(),
                    port: channel.local_addr().port(),
                },
                payload: b"ping".to_vec(),
            })
            .expect("enqueue");

        let payload = seen_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("datagram should arrive");
        assert_eq!(payload, b"ping");

        channel.close();
        channel.join();
        assert!(channel.is_finished());
        assert_eq!(metrics.snapshot().datagrams_sent, 1);
    }

    #[test]
    fn test_close_drops_queue_and_rejects_new_jobs() {
        let (channel, _, metrics) = open_channel();
        // Threads not spawned: everything stays queued
        for i in 0..3u8 {
            channel
                .enqueue(DatagramJob {
                    target: DatagramTarget::Broadcast { port: 9 },
                    payload: vec![i],
                })
                .expect("enqueue");
        }
        assert_eq!(channel.pending(), 3);

        assert_eq!(channel.close(), 3);
        assert_eq!(channel.close(), 0);
        assert_eq!(channel.pending(), 0);
        assert_eq!(metrics.snapshot().datagrams_dropped, 3);

        let err = channel
            .enqueue(DatagramJob {
                target: DatagramTarget::Broadcast { port: 9 },
                payload: vec![9],
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::NotRunning));
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        cond()
    }

    fn peer_to(channel: &DatagramChannel) -> (UdpSocket, SocketAddr) {
        let peer = UdpSocket::bind("127.0.0.1:0").expect("bind peer");
        let dest = SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::LOCALHOST,
            channel.local_addr().port(),
        ));
        (peer, dest)
    }

    #[test]
    fn test_handler_panic_does_not_stop_delivery() {
        let (channel, handlers, metrics) = open_channel();
        let (seen_tx, seen_rx) = mpsc::channel();
        let seen_tx = Mutex::new(seen_tx);
        handlers.store(Arc::new(vec![
            Arc::new(|d: &ReceivedDatagram<'_>| {
                if d.payload == b"boom" {
                    panic!("handler rejects {:?}", d.payload);
                }
            }) as DatagramHandler,
            Arc::new(move |d: &ReceivedDatagram<'_>| {
                let _ = seen_tx.lock().send(d.payload.to_vec());
            }) as DatagramHandler,
        ]));
        channel.spawn().expect("spawn");

        let (peer, dest) = peer_to(&channel);
        peer.send_to(b"boom", dest).expect("send boom");
        peer.send_to(b"after", dest).expect("send after");

        // The second handler still sees the packet that made the first panic
        let first = seen_rx.recv_timeout(Duration::from_secs(5)).expect("boom");
        assert_eq!(first, b"boom");
        let second = seen_rx.recv_timeout(Duration::from_secs(5)).expect("after");
        assert_eq!(second, b"after");
        assert_eq!(metrics.snapshot().datagrams_received, 2);

        channel.close();
        channel.join();
    }

    #[test]
    fn test_zero_length_datagram_ends_receive_loop() {
        let (channel, _, _) = open_channel();
        channel.spawn().expect("spawn");

        let (peer, dest) = peer_to(&channel);
        peer.send_to(&[], dest).expect("send empty");

        let rx_finished = || {
            channel
                .rx_thread
                .lock()
                .as_ref()
                .map_or(true, JoinHandle::is_finished)
        };
        assert!(wait_until(Duration::from_secs(5), rx_finished));
        // Send side is independent of the receive loop
        assert!(!channel.is_finished());

        channel.close();
        channel.join();
        assert!(channel.is_finished());
    }

    // Windows rejects oversized reads with WSAEMSGSIZE instead of truncating.
    #[cfg(unix)]
    #[test]
    fn test_oversized_datagram_truncated_to_max_size() {
        let (channel, handlers, _) = open_channel();
        let (len_tx, len_rx) = mpsc::channel();
        let len_tx = Mutex::new(len_tx);
        handlers.store(Arc::new(vec![Arc::new(move |d: &ReceivedDatagram<'_>| {
            let _ = len_tx.lock().send(d.payload.len());
        }) as DatagramHandler]));
        channel.spawn().expect("spawn");

        let (peer, dest) = peer_to(&channel);
        peer.send_to(&[0xAB; 2000], dest).expect("send large");
        peer.send_to(b"small", dest).expect("send small");

        let first = len_rx.recv_timeout(Duration::from_secs(5)).expect("first packet");
        let second = len_rx.recv_timeout(Duration::from_secs(5)).expect("second packet");
        assert_eq!(first, MAX_DATAGRAM_SIZE);
        assert_eq!(second, 5);

        channel.close();
        channel.join();
    }
}
