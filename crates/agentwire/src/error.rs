// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine error taxonomy.
//!
//! Errors fall into four classes:
//! - **Configuration**: rejected by `start()` before any thread spawns.
//! - **Setup**: adapter enumeration, socket creation/options/bind, thread spawn.
//!   Fatal to `start()`; partially created resources are torn down.
//! - **Per-job**: resolution, send and HTTP transport failures. Local to one
//!   job, logged and counted, never abort a worker.
//! - **Lifecycle**: calls made in the wrong engine state.

use crate::config::ConfigError;
use std::io;
use thiserror::Error;

/// Errors returned by the transport engine.
#[derive(Debug, Error)]
pub enum EngineError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid engine parameter (e.g. zero HTTP workers).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Configuration file could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // ========================================================================
    // Setup Errors
    // ========================================================================
    /// Platform adapter enumeration failed.
    #[error("Interface discovery failed: {0}")]
    Discovery(#[source] io::Error),

    /// A socket setup step failed.
    #[error("Socket {op} failed: {source}")]
    Socket {
        /// Which step failed (create, set_broadcast, bind, ...).
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// The OS refused to spawn an engine thread.
    #[error("Thread spawn failed: {0}")]
    ThreadSpawn(#[source] io::Error),

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Operation not allowed in the current engine state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Job submitted to an engine that is not running.
    #[error("Engine not running")]
    NotRunning,

    // ========================================================================
    // Per-job Errors
    // ========================================================================
    /// Hostname did not resolve to an IPv4 address.
    #[error("Unknown host: {0}")]
    UnknownHost(String),

    /// Socket-level send failure.
    #[error("Socket operation failed: {0}")]
    SocketOperation(#[source] io::Error),

    /// Broadcast requested but no interface is eligible.
    #[error("No broadcast-capable interface available")]
    NoBroadcastInterface,

    /// HTTP transport failure (DNS, refused, timeout, malformed request).
    #[error("HTTP transport error: {0}")]
    Http(String),
}

impl EngineError {
    /// Wrap a socket setup failure with the name of the failing step.
    pub(crate) fn socket(op: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| EngineError::Socket { op, source }
    }
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;
