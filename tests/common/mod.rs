//! Common test utilities and fixtures.
//!
//! The HTTP tests run the real router and repository against an in-process
//! store, so no Tarantool instance is needed.

#![cfg(feature = "server")]
#![allow(dead_code)]

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};
use tarantool_kv::server::{AppState, router};
use tarantool_kv::store::{DEFAULT_INDEX, DEFAULT_SPACE};
use tarantool_kv::{MemoryClient, RawValue, TarantoolRepository};

// =============================================================================
// Test Application
// =============================================================================

/// Test application wrapper holding the server and its backing store.
pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<MemoryClient>,
}

impl TestApp {
    /// Create a new test application with an empty store.
    pub async fn new() -> anyhow::Result<Self> {
        let store = Arc::new(MemoryClient::new());
        let repository = TarantoolRepository::open(store.clone(), DEFAULT_SPACE, DEFAULT_INDEX).await?;
        let state = AppState::new(Arc::new(repository));
        let server = TestServer::new(router(state))?;
        Ok(Self { server, store })
    }

    /// Add a record through the API, expecting success.
    pub async fn add(&self, key: &str, value: Value) {
        self.server
            .post("/kv")
            .json(&json!({ "key": key, "value": value }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    /// Fetch a record through the API, expecting success, and return its value.
    pub async fn get(&self, key: &str) -> Value {
        let response = self.server.get(&format!("/kv/{}", key)).await;
        response.assert_status_ok();
        let body: Value = response.json();
        body["value"].clone()
    }

    /// Plant a raw `[key, value]` tuple directly in the store.
    pub fn put_raw(&self, key: &str, value: RawValue) {
        self.store
            .put_raw(RawValue::Array(vec![RawValue::from(key), value]));
    }
}

// =============================================================================
// Assertion Helpers
// =============================================================================

/// Assert that a JSON error body carries the expected error code.
pub fn assert_error_code(body: &Value, code: &str) {
    assert_eq!(
        body["error"]["code"].as_str(),
        Some(code),
        "unexpected error body: {}",
        body
    );
}
