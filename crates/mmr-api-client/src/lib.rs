//! HTTP client for the media repository admin API.
//!
//! [`ApiClient`] owns one [`ConnectionConfig`] and turns abstract admin operations
//! (see [`api`]) into requests against the repository's Matrix-style endpoints. The
//! credential travels as an `access_token` query parameter on every admin call. Every
//! failure comes back as an [`AdminError`]; nothing from reqwest escapes uninterpreted.
//!
//! [`validator`] implements the two-stage credential check callers run before using a
//! client.

pub mod api;
pub mod validator;

use mmr_core::{AdminError, AdminResult, ConnectionConfig};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Path prefix of the repository's admin surface.
pub const DEFAULT_ADMIN_PREFIX: &str = "/_matrix/media/unstable/admin";

/// Client-server identity endpoint on the origin homeserver.
pub const WHOAMI_PATH: &str = "/_matrix/client/v3/account/whoami";

/// Authenticated media download endpoint.
pub const DOWNLOAD_PREFIX: &str = "/_matrix/client/v1/media/download";

/// HTTP client for the admin API. Cheap to clone; clones share the connection pool.
///
/// There is no way to swap the config of an existing client: build a new one.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    config: ConnectionConfig,
    server_name: String,
    admin_prefix: String,
}

impl ApiClient {
    pub fn new(config: ConnectionConfig) -> AdminResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| AdminError::transport("Failed to create HTTP client", e))?;
        Self::with_http_client(config, client)
    }

    /// Build a client on top of an existing reqwest pool.
    pub fn with_http_client(config: ConnectionConfig, client: Client) -> AdminResult<Self> {
        let server_name = server_name_from_base_url(config.base_url())?;
        Ok(Self {
            client,
            config,
            server_name,
            admin_prefix: DEFAULT_ADMIN_PREFIX.to_string(),
        })
    }

    pub fn with_admin_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.admin_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        self.config.base_url()
    }

    /// Server name derived from the configured base URL.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn admin_prefix(&self) -> &str {
        &self.admin_prefix
    }

    /// Prefix an admin-relative path (e.g. `/datastores`).
    pub fn admin_path(&self, path: &str) -> String {
        format!("{}{}", self.admin_prefix, path)
    }

    /// Full URL for `path` with the credential appended as `access_token`.
    pub fn build_url(&self, path: &str) -> String {
        let separator = if path.contains('?') { '&' } else { '?' };
        format!(
            "{}{}{}access_token={}",
            self.config.base_url(),
            path,
            separator,
            urlencoding::encode(self.config.credential())
        )
    }

    /// Send one request and decode the JSON answer.
    ///
    /// `Content-Type: application/json` is only set when a body is sent.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> AdminResult<T> {
        tracing::debug!(method = %method, path = %path, "Sending admin request");

        let mut request = self.client.request(method.clone(), self.build_url(path));
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(body)?);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AdminError::transport(format!("Failed to send {} {}", method, path), e))?;

        let status = response.status();
        if !status.is_success() {
            let err = error_from_response(response).await;
            tracing::warn!(method = %method, path = %path, status = status.as_u16(), error = %err, "Admin request failed");
            return Err(err);
        }

        decode_body(response, &method, path).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> AdminResult<T> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> AdminResult<T> {
        self.request(Method::POST, path, body).await
    }

    /// Raw client for requests outside the admin surface.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Derive the Matrix server name from the base URL: the host, plus the port when one
/// other than the scheme default is given.
pub fn server_name_from_base_url(base_url: &str) -> AdminResult<String> {
    let url = url::Url::parse(base_url).map_err(|e| {
        AdminError::InvalidConfiguration(format!("Invalid homeserver URL {}: {}", base_url, e))
    })?;
    let host = url.host_str().ok_or_else(|| {
        AdminError::InvalidConfiguration(format!("Homeserver URL {} has no host", base_url))
    })?;

    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Percent-encode one path segment.
pub(crate) fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

async fn decode_body<T: DeserializeOwned>(
    response: Response,
    method: &Method,
    path: &str,
) -> AdminResult<T> {
    let text = response
        .text()
        .await
        .map_err(|e| AdminError::transport(format!("Failed to read response of {} {}", method, path), e))?;
    // Some admin calls answer 200 with an empty body
    let text = if text.trim().is_empty() { "{}" } else { text.as_str() };

    serde_json::from_str(text)
        .map_err(|e| AdminError::Decode(format!("{} {}: {}", method, path, e)))
}

/// Error body shape used by the repository (`{error, message, code}`); Matrix-style
/// `errcode` bodies are accepted too.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errcode: Option<String>,
}

pub(crate) async fn error_from_response(response: Response) -> AdminError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    normalize_error(status, &body)
}

/// Turn a non-2xx status and its body into a protocol error. The backend's message is
/// kept verbatim; without one, the message is derived from the status line.
pub fn normalize_error(status: StatusCode, body: &str) -> AdminError {
    let status_line = format!(
        "HTTP {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown Error")
    );

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => {
            let message = parsed
                .message
                .clone()
                .filter(|m| !m.is_empty())
                .or_else(|| parsed.error.clone().filter(|e| !e.is_empty()))
                .unwrap_or(status_line);
            AdminError::Protocol {
                status: status.as_u16(),
                error: parsed.errcode.or(parsed.error),
                message,
            }
        }
        Err(_) => AdminError::Protocol {
            status: status.as_u16(),
            error: None,
            message: status_line,
        },
    }
}

// Re-export domain types for convenience.
pub use mmr_core::models;
pub use validator::{CredentialValidator, ValidationFailure, ValidationStage, ValidationState};
