//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which wires a fresh [`WorkflowStore`] and default
//! config into a full [`AppContext`]. The [`with_server`] constructor starts
//! Axum on a random port for HTTP-level testing.

use std::net::SocketAddr;
use std::sync::Arc;

use reelforge::config::Config;
use reelforge::server::{create_router, AppContext};
use reelforge::store::WorkflowStore;

pub struct TestHarness {
    pub ctx: AppContext,
    pub store: Arc<WorkflowStore>,
}

impl TestHarness {
    /// Create a new harness with default configuration and an empty store.
    pub fn new() -> Self {
        let store = WorkflowStore::new();
        let ctx = AppContext {
            store: store.clone(),
            config: Arc::new(Config::default()),
        };
        Self { ctx, store }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        let harness = Self::new();
        let app = create_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }
}
