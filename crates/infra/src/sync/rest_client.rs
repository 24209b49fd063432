//! PostgREST-style implementation of the [`RemoteStore`] port.
//!
//! Rows live under `{base_url}/rest/v1/{table}`. Mutations ask for the stored
//! row back (`Prefer: return=representation`), which is also how a missing
//! row is detected on update and delete: the backend answers with an empty
//! array instead of an error status.

use std::time::Duration;

use async_trait::async_trait;
use policydesk_core::sync::errors::BackendPayload;
use policydesk_core::{RemoteError, RemoteStore};
use policydesk_domain::constants::REMOTE_REST_PATH;
use policydesk_domain::{PolicyDeskError, Record, RemoteConfig, Table};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use tracing::{debug, instrument, warn};

use crate::http::HttpClient;

const RETURN_REPRESENTATION: &str = "return=representation";

type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Remote store client for a PostgREST backend.
pub struct RestRemoteStore {
    http: HttpClient,
    rest_base: Url,
    schema: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl RestRemoteStore {
    /// Build a client from the remote configuration.
    ///
    /// Fails with `Config` when the base URL cannot be parsed.
    pub fn new(config: &RemoteConfig) -> Result<Self, PolicyDeskError> {
        let base = format!("{}/", config.base_url.trim_end_matches('/'));
        let rest_base = Url::parse(&base)
            .and_then(|url| url.join(&format!("{REMOTE_REST_PATH}/")))
            .map_err(|err| {
                PolicyDeskError::Config(format!("invalid remote url '{}': {err}", config.base_url))
            })?;

        let timeout = config.timeout();
        let http = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            rest_base,
            schema: config.schema.clone(),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            timeout,
        })
    }

    fn table_url(&self, table: Table) -> RemoteResult<Url> {
        self.rest_base
            .join(table.as_str())
            .map_err(|err| RemoteError::Config(format!("invalid table url for {table}: {err}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mutating = method != Method::GET;
        let mut builder = self.http.request(method, url).header("Accept-Profile", &self.schema);

        if mutating {
            builder = builder
                .header("Content-Profile", &self.schema)
                .header("Prefer", RETURN_REPRESENTATION);
        }

        if let Some(key) = &self.api_key {
            builder = builder.header("apikey", key).bearer_auth(key);
        }

        builder
    }

    async fn execute(&self, builder: RequestBuilder) -> RemoteResult<Response> {
        let response = tokio::time::timeout(self.timeout, self.http.send(builder))
            .await
            .map_err(|_| RemoteError::Timeout(self.timeout))??;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = classify_status(status, &body);
        warn!(status = status.as_u16(), error = %err, "remote request rejected");
        Err(err)
    }

    async fn rows(&self, builder: RequestBuilder) -> RemoteResult<Vec<Record>> {
        let response = self.execute(builder).await?;
        let body = response.text().await.map_err(crate::errors::http_to_remote)?;
        serde_json::from_str(&body)
            .map_err(|err| RemoteError::Decode(format!("expected an array of rows: {err}")))
    }
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    #[instrument(skip(self, row), fields(table = %table))]
    async fn insert(&self, table: Table, row: &Record) -> RemoteResult<Record> {
        let url = self.table_url(table)?;
        let rows = self.rows(self.request(Method::POST, url).json(row)).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RemoteError::Decode(format!("insert into {table} returned no row")))
    }

    #[instrument(skip(self, changes), fields(table = %table))]
    async fn update(&self, table: Table, id: &str, changes: &Record) -> RemoteResult<Record> {
        let url = self.table_url(table)?;
        let builder = self.request(Method::PATCH, url).query(&[("id", id_filter(id))]).json(changes);
        self.rows(builder)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotFound { table, id: id.to_string() })
    }

    #[instrument(skip(self), fields(table = %table))]
    async fn delete(&self, table: Table, id: &str) -> RemoteResult<()> {
        let url = self.table_url(table)?;
        let builder = self.request(Method::DELETE, url).query(&[("id", id_filter(id))]);
        if self.rows(builder).await?.is_empty() {
            return Err(RemoteError::NotFound { table, id: id.to_string() });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(table = %table))]
    async fn select_all(&self, table: Table) -> RemoteResult<Vec<Record>> {
        let url = self.table_url(table)?;
        let rows = self.rows(self.request(Method::GET, url).query(&[("select", "*")])).await?;
        debug!(rows = rows.len(), "remote table fetched");
        Ok(rows)
    }

    async fn ping(&self) -> RemoteResult<()> {
        let url = self.table_url(Table::Customers)?;
        let builder = self.request(Method::GET, url).query(&[("select", "id"), ("limit", "1")]);
        self.execute(builder).await.map(|_| ())
    }
}

fn id_filter(id: &str) -> String {
    format!("eq.{id}")
}

/// Classify an error response by status, keeping the backend's error body.
fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let payload = serde_json::from_str::<BackendPayload>(body)
        .unwrap_or_else(|_| BackendPayload::message(body.trim()));
    let code = status.as_u16();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Auth { status: code, payload },
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimit { payload },
        s if s.is_server_error() => RemoteError::Server { status: code, payload },
        _ => RemoteError::Rejected { status: code, payload },
    }
}
