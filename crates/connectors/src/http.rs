//! JSON-over-HTTP plumbing shared by the connectors.

use std::time::Duration;

use clearline_core::clients::ClientError;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{ConnectorError, classify};

/// A base URL plus a client with a request timeout.
#[derive(Debug, Clone)]
pub struct JsonEndpoint {
    service: &'static str,
    http: Client,
    base_url: Url,
}

impl JsonEndpoint {
    pub fn new(
        service: &'static str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ConnectorError> {
        if base_url.trim().is_empty() {
            return Err(ConnectorError::MissingUrl(service));
        }
        // a trailing slash keeps `join` from dropping the last path segment
        let normalized = format!("{}/", base_url.trim().trim_end_matches('/'));
        let base_url = Url::parse(&normalized).map_err(|e| ConnectorError::InvalidUrl {
            service,
            reason: e.to_string(),
        })?;
        let http = Client::builder().timeout(timeout).gzip(true).build()?;

        Ok(Self {
            service,
            http,
            base_url,
        })
    }

    /// Posts `body` to `path` and decodes a successful JSON answer.
    ///
    /// `503 Service Unavailable` means the service refused the request
    /// without acting on it. Other non-success statuses are protocol errors.
    pub async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ClientError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ClientError::Protocol(format!("bad path {path}: {e}")))?;

        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(service = self.service, path, error = %e, "Request failed");
                classify(&e)
            })?;

        let status = response.status();
        debug!(service = self.service, path, status = %status, "Response received");

        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(ClientError::Unavailable(format!(
                "{} answered {status}",
                self.service
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ClientError::Protocol(format!(
                "{} answered {status}: {detail}",
                self.service
            )));
        }

        response.json::<R>().await.map_err(|e| {
            warn!(service = self.service, path, error = %e, "Undecodable response");
            if e.is_timeout() {
                ClientError::Timeout
            } else {
                ClientError::Protocol(e.to_string())
            }
        })
    }
}
