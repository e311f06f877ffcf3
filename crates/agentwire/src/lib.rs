// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # agentwire - network transport engine
//!
//! The networking layer of a field agent: fire-and-forget UDP datagrams
//! (unicast and subnet broadcast) with inbound observers, and asynchronous
//! HTTP GET/POST on a fixed worker pool, all behind one start/stop lifecycle.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agentwire::{Engine, EngineConfig, Result};
//!
//! fn main() -> Result<()> {
//!     let engine = Engine::new(EngineConfig::default());
//!     engine.add_datagram_callback(|d| {
//!         println!("{} bytes from {}", d.payload.len(), d.source);
//!     });
//!     engine.start(4)?;
//!
//!     engine.send_datagram("192.168.1.20", 45000, b"ping".to_vec())?;
//!     engine.send_http_post("http://192.168.1.20:8080/report", b"{}".to_vec(), |c| {
//!         if c.is_transport_failure() {
//!             eprintln!("report to {} failed", c.url);
//!         }
//!     })?;
//!
//!     engine.stop();
//!     engine.wait_threads()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                              Engine                                 |
//! |       start / stop / wait_threads / is_stop_complete / metrics      |
//! +----------------------------------+----------------------------------+
//! |         Datagram Channel         |          HTTP Dispatcher         |
//! |  rx thread -> observers          |  FIFO queue -> N worker threads  |
//! |  tx thread <- job queue          |  executor -> callback(status)    |
//! +----------------------------------+----------------------------------+
//! |                        Interface Registry                           |
//! |      IPv4 adapters, broadcast addresses, primary address            |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Engine`] | Lifecycle owner and public entry points |
//! | [`EngineConfig`] | HTTP pool and client settings (TOML + env) |
//! | [`InterfaceRegistry`] | Snapshot of local IPv4 adapters |
//! | [`HttpCompletion`] | Result handed to an HTTP callback (status 0 = failure) |
//! | [`MetricsSnapshot`] | Delivery counters for the fire-and-forget paths |

pub mod config;
mod datagram;
pub mod engine;
pub mod error;
pub mod http;
pub mod iface;
pub mod metrics;

pub use config::{ConfigError, EngineConfig, MAX_DATAGRAM_SIZE};
pub use datagram::{DatagramHandler, ReceivedDatagram};
pub use engine::{Engine, EngineBuilder, EngineState};
pub use error::{EngineError, Result};
pub use http::{
    HttpCallback, HttpCompletion, HttpExecutor, HttpMethod, HttpRequest, HttpResponse,
    ReqwestExecutor,
};
pub use iface::{
    AdapterAddress, Interface, InterfaceRegistry, InterfaceSource, StaticInterfaces,
    SystemInterfaces,
};
pub use metrics::{EngineMetrics, MetricsSnapshot};

/// Crate version, used in the default HTTP user agent.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
