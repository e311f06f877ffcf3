// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! agentwire probe CLI
//!
//! Drives every transport engine entry point from the command line.
//!
//! # Usage
//!
//! ```bash
//! # List adapters and the primary address
//! agentwire-probe interfaces
//!
//! # Unicast / broadcast datagrams
//! agentwire-probe send --host 192.168.1.20 --port 45000 "ping"
//! agentwire-probe broadcast --port 45000 "discover"
//!
//! # Print inbound datagrams for 30 seconds
//! agentwire-probe listen --seconds 30
//!
//! # HTTP through the worker pool
//! agentwire-probe get http://192.168.1.20:8080/status
//! agentwire-probe post http://192.168.1.20:8080/report --body '{"cpu":12}'
//!
//! # Using configuration file
//! agentwire-probe --config agentwire.toml get http://192.168.1.20:8080/status
//! ```

use agentwire::{Engine, EngineConfig, HttpCompletion};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// How long to wait for queued datagrams to leave before stopping.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// agentwire transport probe
#[derive(Parser, Debug)]
#[command(name = "agentwire-probe")]
#[command(about = "agentwire probe - UDP datagrams and HTTP requests through the transport engine")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List network interfaces and the primary address
    Interfaces,

    /// Send a unicast datagram
    Send {
        /// Destination host name or IPv4 address
        #[arg(long)]
        host: String,

        /// Destination port
        #[arg(short, long)]
        port: u16,

        /// Payload text
        message: String,
    },

    /// Broadcast a datagram on every broadcast-capable interface
    Broadcast {
        /// Destination port
        #[arg(short, long)]
        port: u16,

        /// Payload text
        message: String,
    },

    /// Print received datagrams
    Listen {
        /// How long to listen (seconds)
        #[arg(short, long, default_value = "10")]
        seconds: u64,
    },

    /// HTTP GET through the worker pool
    Get {
        url: String,
    },

    /// HTTP POST through the worker pool
    Post {
        url: String,

        /// Request body
        #[arg(short, long, default_value = "")]
        body: String,
    },

    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "agentwire.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging (also captures the engine's `log` records)
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Commands::GenConfig { output } = &args.command {
        return cmd_gen_config(output);
    }

    let config = load_config(args.config.as_deref())?;
    let workers = config.http_workers;
    let engine = Engine::new(config);

    let result = match args.command {
        Commands::Interfaces => cmd_interfaces(&engine),
        Commands::Send {
            host,
            port,
            message,
        } => {
            engine.start(1)?;
            engine.send_datagram(&host, port, message.into_bytes())?;
            flush_datagrams(&engine);
            Ok(())
        }
        Commands::Broadcast { port, message } => {
            engine.start(1)?;
            engine.send_broadcast_datagram(port, message.into_bytes())?;
            flush_datagrams(&engine);
            Ok(())
        }
        Commands::Listen { seconds } => cmd_listen(&engine, seconds),
        Commands::Get { url } => {
            engine.start(workers)?;
            let (tx, rx) = mpsc::channel();
            engine.send_http_get(&url, move |c| {
                let _ = tx.send(c);
            })?;
            print_completion(&rx.recv()?);
            Ok(())
        }
        Commands::Post { url, body } => {
            engine.start(workers)?;
            let (tx, rx) = mpsc::channel();
            engine.send_http_post(&url, body.into_bytes(), move |c| {
                let _ = tx.send(c);
            })?;
            print_completion(&rx.recv()?);
            Ok(())
        }
        Commands::GenConfig { .. } => Ok(()),
    };

    engine.stop();
    engine.wait_threads()?;
    tracing::debug!("Final metrics: {:?}", engine.metrics());
    result
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

fn cmd_interfaces(engine: &Engine) -> Result<(), Box<dyn std::error::Error>> {
    engine.refresh_interfaces()?;
    let registry = engine.interfaces();

    println!(
        "{:<4} {:<16} {:<16} {:<16} FLAGS",
        "ID", "NAME", "ADDRESS", "BROADCAST"
    );
    for iface in registry.iter() {
        let mut flags = Vec::new();
        if iface.is_up {
            flags.push("up");
        }
        if iface.is_loopback {
            flags.push("loopback");
        }
        if iface.is_broadcast {
            flags.push("broadcast");
        }
        println!(
            "{:<4} {:<16} {:<16} {:<16} {}",
            iface.id,
            iface.name,
            iface.address.to_string(),
            iface
                .broadcast_address
                .map(|a| a.to_string())
                .unwrap_or_else(|| "-".into()),
            flags.join(",")
        );
    }
    println!();

    let primary = engine.primary_interface_address();
    if primary.is_empty() {
        println!("Primary address: (none)");
    } else {
        println!("Primary address: {}", primary);
    }
    Ok(())
}

fn cmd_listen(engine: &Engine, seconds: u64) -> Result<(), Box<dyn std::error::Error>> {
    engine.add_datagram_callback(|d| {
        println!(
            "{} ({} bytes): {}",
            d.source,
            d.payload.len(),
            String::from_utf8_lossy(d.payload)
        );
    });
    engine.start(1)?;

    if let Some(port) = engine.local_port() {
        println!("Listening on UDP port {} for {}s...", port, seconds);
    }
    std::thread::sleep(Duration::from_secs(seconds));
    Ok(())
}

/// Wait until the send loop has dealt with every queued datagram.
fn flush_datagrams(engine: &Engine) {
    let deadline = Instant::now() + FLUSH_TIMEOUT;
    while engine.metrics().datagrams_outstanding() > 0 {
        if Instant::now() >= deadline {
            tracing::warn!("Datagram queue not flushed after {:?}", FLUSH_TIMEOUT);
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let snap = engine.metrics();
    if snap.datagrams_failed > 0 {
        println!("Send failed (see logs)");
    } else {
        println!(
            "Sent from port {} ({} interface sends)",
            engine.local_port().unwrap_or(0),
            snap.broadcast_interface_sends.max(snap.datagrams_sent)
        );
    }
}

fn print_completion(completion: &HttpCompletion) {
    if completion.is_transport_failure() {
        println!("{} -> transport failure (status 0)", completion.url);
        return;
    }
    println!("{} -> {}", completion.url, completion.status);
    if let Some(text) = completion.body_text() {
        println!("{}", text);
    }
}

fn cmd_gen_config(output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let toml_str = toml::to_string_pretty(&EngineConfig::default())?;

    // Add comments
    let content = format!(
        r#"# agentwire Engine Configuration
# Generated by agentwire-probe gen-config
#
# Environment overrides: AGENTWIRE_HTTP_WORKERS, AGENTWIRE_USER_AGENT,
# AGENTWIRE_HTTP_TIMEOUT_MS, AGENTWIRE_HTTP_CONNECT_TIMEOUT_MS

{}
"#,
        toml_str
    );

    std::fs::write(output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}
