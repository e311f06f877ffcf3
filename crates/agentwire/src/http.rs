// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP dispatcher: a fixed worker pool over one shared FIFO queue.
//!
//! # Architecture
//!
//! ```text
//! send_http_get() --+
//! send_http_post() -+--> [FIFO queue] --+--> agentwire-http-0 --+
//!                                       +--> agentwire-http-1 --+--> callback(HttpCompletion)
//!                                       +--> agentwire-http-N --+
//! ```
//!
//! Every job fires its callback exactly once, on a worker thread. A transport
//! failure (DNS, refused, timeout, bad URL) is reported as `status == 0` with
//! no body. Jobs still queued when the dispatcher stops are dropped without
//! running; jobs already running finish.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::metrics::EngineMetrics;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// HTTP method supported by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// A request as handed to an [`HttpExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Empty for GET.
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            body: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            body,
        }
    }
}

/// A response the server actually produced (any status code).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// What a job's callback receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCompletion {
    pub url: String,
    /// HTTP status code, or 0 when no response was obtained.
    pub status: u16,
    /// Response body; `None` when no response was obtained.
    pub body: Option<Vec<u8>>,
}

impl HttpCompletion {
    fn transport_failure(url: String) -> Self {
        Self {
            url,
            status: 0,
            body: None,
        }
    }

    pub fn is_transport_failure(&self) -> bool {
        self.status == 0
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8 (lossy).
    pub fn body_text(&self) -> Option<Cow<'_, str>> {
        self.body.as_deref().map(String::from_utf8_lossy)
    }
}

/// Per-job completion callback.
pub type HttpCallback = Box<dyn FnOnce(HttpCompletion) + Send + 'static>;

/// Performs one blocking HTTP exchange.
pub trait HttpExecutor: Send + Sync {
    /// Return the server's response, or an error when none was obtained.
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// [`HttpExecutor`] backed by a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: reqwest::blocking::Client,
}

impl ReqwestExecutor {
    /// Build a client with the configured user-agent and timeouts.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.http_timeout())
            .connect_timeout(config.http_connect_timeout())
            .build()
            .map_err(|e| {
                EngineError::InvalidConfiguration(format!("HTTP client build failed: {}", e))
            })?;
        Ok(Self { client })
    }
}

impl HttpExecutor for ReqwestExecutor {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url).body(request.body.clone()),
        };

        let response = builder
            .send()
            .map_err(|e| EngineError::Http(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| EngineError::Http(format!("reading body: {}", e)))?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

pub(crate) struct HttpJob {
    pub(crate) request: HttpRequest,
    pub(crate) callback: HttpCallback,
}

/// The worker pool.
pub(crate) struct HttpDispatcher {
    worker_count: usize,
    /// `None` once stopped; submitting then fails.
    queue_tx: Mutex<Option<Sender<HttpJob>>>,
    queue_rx: Receiver<HttpJob>,
    stopping: Arc<AtomicBool>,
    exited: Arc<AtomicUsize>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<EngineMetrics>,
}

impl HttpDispatcher {
    /// Spawn `worker_count` workers.
    ///
    /// Fails before spawning anything when `worker_count == 0`. If a spawn
    /// fails midway, the workers already started are stopped and joined.
    pub(crate) fn start(
        worker_count: usize,
        executor: Arc<dyn HttpExecutor>,
        metrics: Arc<EngineMetrics>,
    ) -> Result<Self> {
        if worker_count == 0 {
            return Err(EngineError::InvalidConfiguration(
                "HTTP worker count must be > 0".into(),
            ));
        }

        let (queue_tx, queue_rx) = channel::unbounded();
        let dispatcher = Self {
            worker_count,
            queue_tx: Mutex::new(Some(queue_tx)),
            queue_rx,
            stopping: Arc::new(AtomicBool::new(false)),
            exited: Arc::new(AtomicUsize::new(0)),
            workers: Mutex::new(Vec::with_capacity(worker_count)),
            metrics,
        };

        for id in 0..worker_count {
            if let Err(e) = dispatcher.spawn_worker(id, Arc::clone(&executor)) {
                dispatcher.stop();
                dispatcher.join();
                return Err(e);
            }
        }

        log::info!("[HTTP] Started {} workers", worker_count);
        Ok(dispatcher)
    }

    fn spawn_worker(&self, id: usize, executor: Arc<dyn HttpExecutor>) -> Result<()> {
        let queue = self.queue_rx.clone();
        let stopping = Arc::clone(&self.stopping);
        let exited = Arc::clone(&self.exited);
        let metrics = Arc::clone(&self.metrics);

        let handle = thread::Builder::new()
            .name(format!("agentwire-http-{}", id))
            .spawn(move || {
                let _exit = ExitGuard(exited);
                worker_loop(id, &queue, &stopping, &*executor, &metrics);
            })
            .map_err(EngineError::ThreadSpawn)?;
        self.workers.lock().push(handle);
        Ok(())
    }

    /// Queue a job and wake one idle worker.
    pub(crate) fn submit(&self, job: HttpJob) -> Result<()> {
        let guard = self.queue_tx.lock();
        let tx = guard.as_ref().ok_or(EngineError::NotRunning)?;
        tx.send(job).map_err(|_| EngineError::NotRunning)?;
        self.metrics.record_http_queued();
        Ok(())
    }

    /// Jobs queued but not yet picked up by a worker.
    pub(crate) fn pending(&self) -> usize {
        self.queue_rx.len()
    }

    /// Stop accepting jobs, drop queued ones and let idle workers exit.
    /// Returns the number of dropped jobs. Idempotent.
    pub(crate) fn stop(&self) -> usize {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return 0;
        }

        // Disconnecting the queue wakes every idle worker.
        drop(self.queue_tx.lock().take());
        let dropped = self.queue_rx.try_iter().count();
        if dropped > 0 {
            self.metrics.record_http_dropped(dropped);
            log::debug!("[HTTP] Dropped {} queued requests on stop", dropped);
        }
        dropped
    }

    /// True once every worker has exited.
    pub(crate) fn is_stop_complete(&self) -> bool {
        self.exited.load(Ordering::Acquire) >= self.worker_count
    }

    /// Join every worker. Safe to call more than once.
    ///
    /// A worker calling this (its callback dropped the last engine
    /// reference) is detached rather than joined.
    pub(crate) fn join(&self) {
        let current = thread::current().id();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.thread().id() == current {
                log::debug!("[HTTP] Worker finishing shutdown itself, detaching");
                continue;
            }
            if handle.join().is_err() {
                log::warn!("[HTTP] Worker thread panicked");
            }
        }
    }
}

/// Counts a worker as exited however its thread ends.
struct ExitGuard(Arc<AtomicUsize>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
}

fn worker_loop(
    id: usize,
    queue: &Receiver<HttpJob>,
    stopping: &AtomicBool,
    executor: &dyn HttpExecutor,
    metrics: &EngineMetrics,
) {
    log::debug!("[HTTP] Worker {} started", id);

    // recv() fails once the queue is disconnected and empty.
    while let Ok(job) = queue.recv() {
        if stopping.load(Ordering::Acquire) {
            metrics.record_http_dropped(1);
            break;
        }
        run_job(executor, job, metrics);
        if stopping.load(Ordering::Acquire) {
            break;
        }
    }

    log::debug!("[HTTP] Worker {} exiting", id);
}

/// Execute one job and fire its callback exactly once.
fn run_job(executor: &dyn HttpExecutor, job: HttpJob, metrics: &EngineMetrics) {
    let HttpJob { request, callback } = job;

    metrics.record_http_started();
    let completion = match executor.execute(&request) {
        Ok(response) => {
            log::debug!(
                "[HTTP] {} {} -> {} ({} bytes)",
                request.method,
                request.url,
                response.status,
                response.body.len()
            );
            HttpCompletion {
                url: request.url,
                status: response.status,
                body: Some(response.body),
            }
        }
        Err(e) => {
            log::warn!("[HTTP] {} {} failed: {}", request.method, request.url, e);
            HttpCompletion::transport_failure(request.url)
        }
    };
    metrics.record_http_finished(completion.status);

    let url = completion.url.clone();
    if panic::catch_unwind(AssertUnwindSafe(move || callback(completion))).is_err() {
        log::error!("[HTTP] Completion callback for {} panicked", url);
    }
}
