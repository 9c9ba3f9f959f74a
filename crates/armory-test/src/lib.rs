//! Helpers for testing the service.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all
//!    console output is captured by the test runner.
//!
//!  - When using [`tempdir`], make sure that the handle to the temp
//!    directory is held for the entire lifetime of the test. When dropped
//!    too early, this might silently leak the temp directory, since the
//!    service will create it again lazily on the next write.
//!
//!  - When using [`Server`] or [`HitCounter`], make sure that the server is
//!    held until all requests to it have been made. If the server is
//!    dropped, the ports remain open and all connections to it will time
//!    out. To avoid this, assign it to a variable: `let server = ...`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

pub use tempfile::TempDir;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from this workspace's
///    crates and mutes all other logs (such as hyper's).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("armory_service=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped, unless
/// [`keep`](TempDir::keep) is called. Use it as a guard to automatically
/// clean up after tests.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

/// A test server that binds to a random port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a
/// `tokio::test`. It automatically stops serving when dropped.
#[derive(Debug)]
pub struct Server {
    pub handle: tokio::task::JoinHandle<()>,
    pub socket: SocketAddr,
}

impl Server {
    /// Spawns the given router on an ephemeral localhost port.
    pub fn with_router(router: Router) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Returns a full URL pointing to the given path.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://127.0.0.1:{}/{}", self.port(), path)
    }

    /// Returns the base URL of the server, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A [`Server`] that counts the requests made to each path.
pub struct HitCounter {
    server: Server,
    hits: Arc<Mutex<BTreeMap<String, usize>>>,
}

impl HitCounter {
    /// Spawns `router` on an ephemeral port, counting hits per request path.
    pub fn new(router: Router) -> Self {
        let hits: Arc<Mutex<BTreeMap<String, usize>>> = Arc::new(Mutex::new(BTreeMap::new()));

        let recorded = Arc::clone(&hits);
        let router = router.layer(middleware::from_fn(move |req: Request, next: Next| {
            let recorded = Arc::clone(&recorded);
            async move {
                let path = req.uri().path().to_owned();
                *recorded.lock().unwrap().entry(path).or_insert(0) += 1;
                next.run(req).await
            }
        }));

        Self {
            server: Server::with_router(router),
            hits,
        }
    }

    /// Number of requests made to `path` so far.
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    /// Returns a full URL pointing to the given path.
    pub fn url(&self, path: &str) -> String {
        self.server.url(path)
    }

    /// Returns the base URL of the server, without a trailing slash.
    pub fn base_url(&self) -> String {
        self.server.base_url()
    }
}

/// A router with a `/token` route mimicking the provider's OAuth2 token
/// endpoint. Merge your resource routes into it.
pub fn token_router() -> Router {
    Router::new().route(
        "/token",
        post(|| async {
            Json(json!({
                "access_token": "test-access-token",
                "token_type": "bearer",
                "expires_in": 86_400,
            }))
        }),
    )
}
