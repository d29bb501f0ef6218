//! Remote sync endpoint contract and its HTTP client

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use super::protocol::{SyncEnvelope, SyncRequest, SyncResponse};
use super::{SyncError, SyncResult};
use crate::config::SyncSettings;
use crate::util::{compact_text, normalize_text_option};

/// Path of the sync route below the configured base URL.
pub const SYNC_PATH: &str = "/v1/sync";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The remote authority a coordinator exchanges batches with.
///
/// Implementations must be idempotent under repeated submission of the same
/// change and return every entity newer than the request watermark.
pub trait RemoteSyncEndpoint: Send + Sync {
    fn sync(
        &self,
        request: &SyncRequest,
    ) -> impl Future<Output = SyncResult<SyncResponse>> + Send;
}

/// JSON-over-HTTP endpoint
#[derive(Clone)]
pub struct HttpSyncEndpoint {
    url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpSyncEndpoint {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpSyncEndpoint")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpSyncEndpoint {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> SyncResult<Self> {
        let base_url = normalize_endpoint(base_url.into())?;
        Ok(Self {
            url: format!("{base_url}{SYNC_PATH}"),
            token: normalize_text_option(token),
            client: reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?,
        })
    }

    /// Build the endpoint from settings; `None` when sync is local-only.
    pub fn from_settings(settings: &SyncSettings) -> SyncResult<Option<Self>> {
        settings
            .endpoint
            .as_ref()
            .map(|endpoint| Self::new(endpoint.clone(), settings.token.clone()))
            .transpose()
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl RemoteSyncEndpoint for HttpSyncEndpoint {
    async fn sync(&self, request: &SyncRequest) -> SyncResult<SyncResponse> {
        let mut builder = self
            .client
            .post(&self.url)
            .header("Accept", "application/json")
            .json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Api(parse_api_error(status, &body)));
        }

        let body = response.text().await?;
        let envelope: SyncEnvelope = serde_json::from_str(&body).map_err(|error| {
            SyncError::InvalidPayload(format!("{error}: {}", compact_text(&body)))
        })?;
        Ok(envelope.data)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> SyncResult<String> {
    let endpoint = normalize_text_option(Some(raw)).ok_or_else(|| {
        SyncError::InvalidConfiguration("endpoint must not be empty".to_string())
    })?;
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(SyncError::InvalidConfiguration(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}
