// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine lifecycle: start, stop, drain, join.
//!
//! ```text
//! NotStarted --start()--> Started --stop()--> Stopping --wait_threads()--> Stopped
//!     |                                                                      ^
//!     +---------------------------- stop() ----------------------------------+
//! ```
//!
//! `start()` runs interface discovery, socket bind and thread spawn in that
//! order. A failure tears down whatever was already created and leaves the
//! engine in `NotStarted`. `stop()` closes the datagram socket, drains both
//! queues and wakes idle threads; HTTP requests already running finish.

use crate::config::EngineConfig;
use crate::datagram::{
    DatagramChannel, DatagramHandler, DatagramJob, DatagramTarget, HandlerList, ReceivedDatagram,
};
use crate::error::{EngineError, Result};
use crate::http::{
    HttpCallback, HttpCompletion, HttpDispatcher, HttpExecutor, HttpJob, HttpRequest,
    ReqwestExecutor,
};
use crate::iface::{InterfaceRegistry, InterfaceSource, SystemInterfaces};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NotStarted,
    Started,
    Stopping,
    Stopped,
}

/// Resources that only exist while the engine is (or was) started.
struct Running {
    datagram: DatagramChannel,
    http: HttpDispatcher,
}

/// The network transport engine.
///
/// Share it between collaborators by reference (typically `Arc<Engine>`).
/// Dropping the engine stops it and joins its threads.
///
/// # Example
///
/// ```no_run
/// use agentwire::{Engine, EngineConfig};
///
/// let engine = Engine::new(EngineConfig::default());
/// engine.add_datagram_callback(|d| println!("{} bytes from {}", d.payload.len(), d.source));
/// engine.start(4)?;
///
/// engine.send_broadcast_datagram(45000, b"hello".to_vec())?;
/// engine.send_http_get("http://192.168.1.20:8080/status", |c| {
///     println!("{} -> {}", c.url, c.status);
/// })?;
///
/// engine.stop();
/// engine.wait_threads()?;
/// # Ok::<(), agentwire::EngineError>(())
/// ```
pub struct Engine {
    config: EngineConfig,
    source: Arc<dyn InterfaceSource>,
    /// Built from `config` at start when not injected.
    executor: Option<Arc<dyn HttpExecutor>>,
    handlers: HandlerList,
    registry: Arc<ArcSwap<InterfaceRegistry>>,
    metrics: Arc<EngineMetrics>,
    state: Mutex<EngineState>,
    running: Mutex<Option<Arc<Running>>>,
}

impl Engine {
    /// Engine over the host's interfaces and a `reqwest` HTTP client.
    pub fn new(config: EngineConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Bring the engine online with `http_workers` HTTP worker threads.
    ///
    /// The lifecycle lock is held for the whole start sequence (discovery,
    /// bind, spawn). Concurrent `stop()`, `state()` and `is_stop_complete()`
    /// calls wait for it and then observe either `NotStarted` (start failed)
    /// or a fully started engine, never a half-built one.
    pub fn start(&self, http_workers: usize) -> Result<()> {
        let mut state = self.state.lock();
        if *state != EngineState::NotStarted {
            return Err(EngineError::InvalidState(format!(
                "start() called in state {:?}",
                *state
            )));
        }
        if http_workers == 0 {
            return Err(EngineError::InvalidConfiguration(
                "HTTP worker count must be > 0".into(),
            ));
        }
        self.config.validate()?;

        let executor = match &self.executor {
            Some(executor) => Arc::clone(executor),
            None => Arc::new(ReqwestExecutor::new(&self.config)?),
        };

        let registry = InterfaceRegistry::discover(self.source.as_ref())?;
        self.registry.store(Arc::new(registry));

        let datagram = DatagramChannel::open(
            Arc::clone(&self.handlers),
            Arc::clone(&self.registry),
            Arc::clone(&self.metrics),
        )?;
        if let Err(e) = datagram.spawn() {
            log::warn!("[ENGINE] Datagram thread spawn failed, rolling back: {}", e);
            datagram.close();
            datagram.join();
            return Err(e);
        }

        let http = match HttpDispatcher::start(http_workers, executor, Arc::clone(&self.metrics)) {
            Ok(http) => http,
            Err(e) => {
                log::warn!("[ENGINE] HTTP pool start failed, rolling back: {}", e);
                datagram.close();
                datagram.join();
                return Err(e);
            }
        };

        log::info!(
            "[ENGINE] Started: udp={} http_workers={} primary={}",
            datagram.local_addr(),
            http_workers,
            self.primary_interface_address()
        );
        *self.running.lock() = Some(Arc::new(Running { datagram, http }));
        *state = EngineState::Started;
        Ok(())
    }

    /// Begin graceful shutdown. Idempotent.
    ///
    /// Queued datagrams and HTTP jobs are dropped; HTTP requests already
    /// running complete and fire their callbacks.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        match *state {
            EngineState::NotStarted => {
                *state = EngineState::Stopped;
                log::debug!("[ENGINE] stop() before start()");
            }
            EngineState::Stopping | EngineState::Stopped => {}
            EngineState::Started => {
                *state = EngineState::Stopping;
                let running = self.running.lock().clone();
                if let Some(running) = running {
                    let datagrams = running.datagram.close();
                    let requests = running.http.stop();
                    log::info!(
                        "[ENGINE] Stopping: dropped {} datagrams, {} HTTP requests",
                        datagrams,
                        requests
                    );
                }
            }
        }
    }

    /// Block until every engine thread has returned.
    ///
    /// Must follow [`stop`](Self::stop); calling it on a started engine
    /// fails instead of blocking forever.
    pub fn wait_threads(&self) -> Result<()> {
        match self.state() {
            EngineState::Started => {
                return Err(EngineError::InvalidState(
                    "wait_threads() requires stop() first".into(),
                ));
            }
            EngineState::NotStarted | EngineState::Stopped => return Ok(()),
            EngineState::Stopping => {}
        }

        // Callbacks may re-enter the engine while we join; don't hold the lock.
        let running = self.running.lock().clone();
        if let Some(running) = running {
            running.datagram.join();
            running.http.join();
        }

        let mut state = self.state.lock();
        if *state == EngineState::Stopping {
            *state = EngineState::Stopped;
            log::info!("[ENGINE] Stopped");
        }
        Ok(())
    }

    /// Non-blocking: have all engine threads returned?
    pub fn is_stop_complete(&self) -> bool {
        match self.state() {
            EngineState::NotStarted | EngineState::Stopped => true,
            EngineState::Started => false,
            EngineState::Stopping => self
                .running
                .lock()
                .as_ref()
                .map_or(true, |r| r.datagram.is_finished() && r.http.is_stop_complete()),
        }
    }

    // ========================================================================
    // Datagrams
    // ========================================================================

    /// Register an inbound datagram observer.
    ///
    /// Observers run on the receive thread, in registration order, once per
    /// packet. They may be registered before or after `start()`.
    pub fn add_datagram_callback<F>(&self, callback: F)
    where
        F: Fn(&ReceivedDatagram<'_>) + Send + Sync + 'static,
    {
        let handler: DatagramHandler = Arc::new(callback);
        self.handlers.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&handler));
            next
        });
    }

    /// Queue a unicast datagram. The payload is consumed.
    pub fn send_datagram(&self, host: &str, port: u16, payload: Vec<u8>) -> Result<()> {
        self.running()?.datagram.enqueue(DatagramJob {
            target: DatagramTarget::Unicast {
                host: host.to_string(),
                port,
            },
            payload,
        })
    }

    /// Queue a datagram for every broadcast-capable interface.
    pub fn send_broadcast_datagram(&self, port: u16, payload: Vec<u8>) -> Result<()> {
        self.running()?.datagram.enqueue(DatagramJob {
            target: DatagramTarget::Broadcast { port },
            payload,
        })
    }

    /// Port the datagram socket is bound to, once started.
    pub fn local_port(&self) -> Option<u16> {
        self.running
            .lock()
            .as_ref()
            .map(|r| r.datagram.local_addr().port())
    }

    pub fn pending_datagrams(&self) -> usize {
        self.running
            .lock()
            .as_ref()
            .map_or(0, |r| r.datagram.pending())
    }

    // ========================================================================
    // HTTP
    // ========================================================================

    /// Queue a GET; `callback` fires exactly once on a worker thread.
    pub fn send_http_get<F>(&self, url: &str, callback: F) -> Result<()>
    where
        F: FnOnce(HttpCompletion) + Send + 'static,
    {
        self.submit_http(HttpRequest::get(url), Box::new(callback))
    }

    /// Queue a POST; `callback` fires exactly once on a worker thread.
    pub fn send_http_post<F>(&self, url: &str, body: Vec<u8>, callback: F) -> Result<()>
    where
        F: FnOnce(HttpCompletion) + Send + 'static,
    {
        self.submit_http(HttpRequest::post(url, body), Box::new(callback))
    }

    fn submit_http(&self, request: HttpRequest, callback: HttpCallback) -> Result<()> {
        self.running()?.http.submit(HttpJob { request, callback })
    }

    pub fn pending_http_jobs(&self) -> usize {
        self.running.lock().as_ref().map_or(0, |r| r.http.pending())
    }

    // ========================================================================
    // Interfaces
    // ========================================================================

    /// Best-guess local address for self-identification; empty if none.
    ///
    /// Computed from the registry captured at start (or at the last
    /// [`refresh_interfaces`](Self::refresh_interfaces)).
    pub fn primary_interface_address(&self) -> String {
        self.registry
            .load()
            .primary_address()
            .map(|addr| addr.to_string())
            .unwrap_or_default()
    }

    /// Current interface snapshot.
    pub fn interfaces(&self) -> Arc<InterfaceRegistry> {
        self.registry.load_full()
    }

    /// Re-enumerate adapters and publish the new snapshot.
    ///
    /// Later broadcasts and primary-address queries use the new snapshot.
    pub fn refresh_interfaces(&self) -> Result<()> {
        let registry = InterfaceRegistry::discover(self.source.as_ref())?;
        self.registry.store(Arc::new(registry));
        Ok(())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn running(&self) -> Result<Arc<Running>> {
        self.running.lock().clone().ok_or(EngineError::NotRunning)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
        let _ = self.wait_threads();
    }
}

/// Builder for [`Engine`] with injectable collaborators.
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    source: Option<Arc<dyn InterfaceSource>>,
    executor: Option<Arc<dyn HttpExecutor>>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Adapter enumeration to use instead of the host's.
    pub fn interface_source(mut self, source: impl InterfaceSource + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// HTTP executor to use instead of the `reqwest` client.
    pub fn http_executor(mut self, executor: Arc<dyn HttpExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            config: self.config,
            source: self.source.unwrap_or_else(|| Arc::new(SystemInterfaces)),
            executor: self.executor,
            handlers: Arc::new(ArcSwap::from_pointee(Vec::new())),
            registry: Arc::new(ArcSwap::from_pointee(InterfaceRegistry::default())),
            metrics: Arc::new(EngineMetrics::new()),
            state: Mutex::new(EngineState::NotStarted),
            running: Mutex::new(None),
        }
    }
}
