use crate::api::{ApiEnvelope, Credentials, ServerRecord};
use crate::client::config::PanelConnectionConfig;
use crate::client::route::ServerId;
use crate::error::FetchError;

use serde::de::DeserializeOwned;
use std::future::Future;
use url::Url;

/// Resolves a server identifier to its metadata and daemon credentials.
///
/// Both lookups are independent so the session can run them concurrently.
pub trait CredentialStore: Send + Sync + 'static {
    fn get_server(
        &self,
        id: &ServerId,
    ) -> impl Future<Output = Result<ServerRecord, FetchError>> + Send;

    fn get_credentials(
        &self,
        id: &ServerId,
    ) -> impl Future<Output = Result<Credentials, FetchError>> + Send;
}

/// Credential store backed by the panel's client HTTP API.
pub struct HttpCredentialStore {
    config: PanelConnectionConfig,
    client: reqwest::Client,
}

impl HttpCredentialStore {
    pub fn new(config: PanelConnectionConfig) -> Result<Self, FetchError> {
        Url::parse(&config.panel_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", config.panel_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| FetchError::Request {
                url: config.panel_url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self { config, client })
    }

    /// `{panel_url}/api/client/servers/{id}[/{tail}...]`
    fn server_url(&self, id: &ServerId, tail: &[&str]) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.config.panel_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", self.config.panel_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl(self.config.panel_url.clone()))?
            .pop_if_empty()
            .extend(["api", "client", "servers", id.as_str()])
            .extend(tail);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        let url_str = url.to_string();
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let mut resp = request.send().await.map_err(|e| FetchError::Request {
            url: url_str.clone(),
            message: e.to_string(),
        })?;

        if !resp.status().is_success() {
            return Err(FetchError::from_status(&url_str, resp.status().as_u16()));
        }

        let limit = self.config.max_response_bytes;
        let too_large = || FetchError::TooLarge {
            url: url_str.clone(),
            limit,
        };
        if resp.content_length().is_some_and(|len| len > limit as u64) {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| FetchError::Request {
            url: url_str.clone(),
            message: e.to_string(),
        })? {
            if body.len() + chunk.len() > limit {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        let envelope: ApiEnvelope<T> =
            serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
                url: url_str,
                message: e.to_string(),
            })?;
        Ok(envelope.into_inner())
    }
}

impl CredentialStore for HttpCredentialStore {
    async fn get_server(&self, id: &ServerId) -> Result<ServerRecord, FetchError> {
        let url = self.server_url(id, &[])?;
        log::debug!("Fetching server record from {}", url);
        self.get_json(url).await
    }

    async fn get_credentials(&self, id: &ServerId) -> Result<Credentials, FetchError> {
        let url = self.server_url(id, &["credentials"])?;
        log::debug!("Fetching daemon credentials from {}", url);
        self.get_json(url).await
    }
}
