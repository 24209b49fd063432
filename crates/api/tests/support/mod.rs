//! Shared setup for api integration tests.

#![allow(dead_code)]

use policydesk_api::AppContext;
use policydesk_domain::{
    Config, DatabaseConfig, Principal, QueueConfig, RemoteConfig, Role, SyncConfig,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Application context over a temporary database and a mock backend.
pub struct TestApp {
    pub ctx: AppContext,
    pub server: MockServer,
    /// Keep temporary directory alive for the lifetime of the app.
    _temp_dir: TempDir,
}

pub fn test_config(temp_dir: &TempDir, server: &MockServer, sync_enabled: bool) -> Config {
    Config {
        database: DatabaseConfig {
            path: temp_dir.path().join("policydesk.db").to_string_lossy().into_owned(),
            pool_size: 4,
        },
        remote: RemoteConfig {
            base_url: server.uri(),
            api_key: Some("anon-key".into()),
            schema: "public".into(),
            timeout_ms: 2_000,
        },
        sync: SyncConfig {
            enabled: sync_enabled,
            interval_seconds: 3_600,
            pass_timeout_seconds: 10,
            hook_timeout_ms: 2_000,
        },
        queue: QueueConfig::default(),
    }
}

pub async fn setup_app(sync_enabled: bool) -> TestApp {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("failed to create temporary directory");
    let config = test_config(&temp_dir, &server, sync_enabled);
    let ctx = AppContext::new(config).await.expect("failed to build application context");
    TestApp { ctx, server, _temp_dir: temp_dir }
}

pub fn admin() -> Principal {
    Principal {
        id: "u-admin".into(),
        email: "admin@policydesk.test".into(),
        role: Role::Admin,
        name: Some("Admin".into()),
        assigned_customer_id: None,
    }
}

/// Every mutation fails with 503.
pub async fn mount_outage(server: &MockServer) {
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(503))
        .mount(server)
        .await;
}

/// Mutations succeed; table reads return `rows` for customers and nothing else.
pub async fn mount_healthy(server: &MockServer, customers: serde_json::Value) {
    for verb in ["POST", "PATCH", "DELETE"] {
        Mock::given(method(verb))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "echo" }])))
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/rest/v1/customers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(customers))
        .mount(server)
        .await;
    for table in ["vehicles", "policies", "users"] {
        Mock::given(method("GET"))
            .and(path(format!("/rest/v1/{table}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(server)
            .await;
    }
}
