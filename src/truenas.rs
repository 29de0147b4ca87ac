use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::RemoteError;

/// Method that returns the full configuration export.
pub const EXPORT_METHOD: &str = "config.save";

const API_PREFIX: &str = "/api/v2.0";
const WS_API_PATH: &str = "/api/current";

/// Opens sessions to an appliance.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, verify_tls: bool) -> Result<Box<dyn Session>, RemoteError>;
}

/// One open session. Must be closed by the caller on every path.
#[async_trait]
pub trait Session: Send {
    async fn authenticate(&mut self, api_key: &str) -> Result<(), RemoteError>;
    async fn call(&mut self, method: &str, params: Value) -> Result<Vec<u8>, RemoteError>;
    async fn close(&mut self) -> Result<(), RemoteError>;
}

/// Turns whatever the operator passed as `--host` into the HTTP base URL.
///
/// Accepts a bare host or IP (defaults to https), `http(s)://` URLs, and the
/// `ws(s)://host/api/current` form used by the websocket API.
pub fn http_base(host: &str) -> String {
    let h = host.trim().trim_end_matches('/');
    let h = h.strip_suffix(WS_API_PATH).unwrap_or(h);
    if h.starts_with("http://") || h.starts_with("https://") {
        h.to_string()
    } else if let Some(rest) = h.strip_prefix("ws://") {
        format!("http://{rest}")
    } else if let Some(rest) = h.strip_prefix("wss://") {
        format!("https://{rest}")
    } else {
        format!("https://{h}")
    }
}

/// REST path for a dotted API method, e.g. `config.save` -> `/api/v2.0/config/save`.
pub fn method_path(method: &str) -> String {
    format!("{API_PREFIX}/{}", method.replace('.', "/"))
}

/// Endpoint for `method` under `base`, keeping any sub-path the appliance is
/// served from (e.g. behind a reverse proxy).
pub fn endpoint(base: &Url, method: &str) -> Url {
    let mut url = base.clone();
    let path = format!("{}{}", base.path().trim_end_matches('/'), method_path(method));
    url.set_path(&path);
    url
}

pub struct TrueNasConnector {
    timeout: Duration,
}

impl TrueNasConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Connector for TrueNasConnector {
    async fn connect(&self, host: &str, verify_tls: bool) -> Result<Box<dyn Session>, RemoteError> {
        let base = http_base(host);
        let base = Url::parse(&base).map_err(|e| RemoteError::InvalidHost {
            url: base.clone(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(self.timeout)
            .build()?;

        info!(url = %base, verify_tls, "opened session");
        Ok(Box::new(TrueNasSession {
            client: Some(client),
            base,
            api_key: None,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct AuthMe {
    pw_name: Option<String>,
}

pub struct TrueNasSession {
    client: Option<Client>,
    base: Url,
    api_key: Option<String>,
}

impl TrueNasSession {
    fn client(&self) -> Result<&Client, RemoteError> {
        self.client.as_ref().ok_or(RemoteError::Closed)
    }

    fn url(&self, method: &str) -> Url {
        endpoint(&self.base, method)
    }

    fn classify(&self, err: reqwest::Error) -> RemoteError {
        if err.is_connect() || err.is_timeout() {
            RemoteError::Connect {
                url: self.base.to_string(),
                source: err,
            }
        } else {
            RemoteError::Transport(err)
        }
    }
}

#[async_trait]
impl Session for TrueNasSession {
    async fn authenticate(&mut self, api_key: &str) -> Result<(), RemoteError> {
        let url = self.url("auth.me");
        let response = self
            .client()?
            .get(url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RemoteError::Auth(format!("API key rejected ({status})")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                method: "auth.me".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        // Some releases answer auth.me with an empty body; the key is still valid.
        let user = response
            .json::<AuthMe>()
            .await
            .ok()
            .and_then(|me| me.pw_name);
        info!(user = user.as_deref().unwrap_or("unknown"), "authenticated");

        self.api_key = Some(api_key.to_string());
        Ok(())
    }

    async fn call(&mut self, method: &str, params: Value) -> Result<Vec<u8>, RemoteError> {
        let api_key = self.api_key.as_deref().ok_or(RemoteError::NotAuthenticated)?;
        let url = self.url(method);
        debug!(%url, "calling {}", method);

        let response = self
            .client()?
            .post(url)
            .bearer_auth(api_key)
            .json(&params)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                method: method.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn close(&mut self) -> Result<(), RemoteError> {
        self.api_key = None;
        if self.client.take().is_some() {
            debug!(url = %self.base, "closed session");
        }
        Ok(())
    }
}
