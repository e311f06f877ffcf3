// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use agentwire::{
    AdapterAddress, Engine, EngineConfig, HttpExecutor, HttpRequest, HttpResponse,
    StaticInterfaces,
};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// `lo` + `eth0` (192.168.1.10/24, broadcast 192.168.1.255).
pub fn lan_interfaces() -> StaticInterfaces {
    StaticInterfaces::new(vec![
        AdapterAddress::new("lo", Ipv4Addr::LOCALHOST)
            .with_prefix_len(8)
            .with_loopback(true),
        AdapterAddress::new("eth0", Ipv4Addr::new(192, 168, 1, 10))
            .with_prefix_len(24)
            .with_broadcast(true),
    ])
}

/// Loopback only: no broadcast target exists.
pub fn loopback_only() -> StaticInterfaces {
    StaticInterfaces::new(vec![AdapterAddress::new("lo", Ipv4Addr::LOCALHOST)
        .with_prefix_len(8)
        .with_loopback(true)])
}

/// Executor that sleeps before answering 200 with the request body.
pub struct SlowExecutor {
    pub delay: Duration,
}

impl HttpExecutor for SlowExecutor {
    fn execute(&self, request: &HttpRequest) -> agentwire::Result<HttpResponse> {
        thread::sleep(self.delay);
        Ok(HttpResponse {
            status: 200,
            body: request.body.clone(),
        })
    }
}

pub fn engine_with_executor(executor: Arc<dyn HttpExecutor>) -> Engine {
    Engine::builder()
        .interface_source(lan_interfaces())
        .http_executor(executor)
        .build()
}

/// Engine over loopback with the real reqwest client and short timeouts.
pub fn engine_with_reqwest() -> Engine {
    let config = EngineConfig {
        user_agent: TEST_USER_AGENT.to_string(),
        http_timeout_ms: 5_000,
        http_connect_timeout_ms: 2_000,
        ..EngineConfig::default()
    };
    Engine::builder()
        .config(config)
        .interface_source(loopback_only())
        .build()
}

/// Poll `cond` until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

/// Mock HTTP server with the routes the HTTP tests exercise.
///
/// - `GET /status` -> `200 online`
/// - `POST /report` with body `{"cpu":12}` -> `201 stored`
/// - `GET /agent` with user agent [`TEST_USER_AGENT`] -> `200`
/// - anything else -> `404`
///
/// The server runs on its own thread; the runtime is only used to set it
/// up, so the blocking engine is driven from plain test threads.
pub struct HttpFixture {
    pub server: MockServer,
    _runtime: Runtime,
}

pub const TEST_USER_AGENT: &str = "agentwire-test/1";

impl HttpFixture {
    pub fn start() -> Self {
        let runtime = Runtime::new().expect("tokio runtime");
        let server = runtime.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/status"))
                .respond_with(ResponseTemplate::new(200).set_body_string("online"))
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path("/report"))
                .and(body_string(r#"{"cpu":12}"#))
                .respond_with(ResponseTemplate::new(201).set_body_string("stored"))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/agent"))
                .and(header("user-agent", TEST_USER_AGENT))
                .respond_with(ResponseTemplate::new(200))
                .mount(&server)
                .await;
            server
        });
        Self {
            server,
            _runtime: runtime,
        }
    }

    pub fn url(&self, route: &str) -> String {
        format!("{}{}", self.server.uri(), route)
    }
}
