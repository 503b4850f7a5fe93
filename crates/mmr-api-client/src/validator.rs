//! Two-stage credential validation.
//!
//! Stage 1 asks the origin homeserver who the token belongs to (`whoami`). Stage 2,
//! only after stage 1 succeeded, lists datastores: the cheapest admin read that still
//! requires repository-admin rights. Either failure ends the run; nothing is retried.
//!
//! The validator does not gate [`ApiClient`] calls. Callers check
//! [`CredentialValidator::is_validated`] before handing a client to the rest of the
//! application.

use mmr_core::models::Identity;
use mmr_core::{AdminError, AdminResult, ConnectionConfig};
use reqwest::Client;
use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::{error_from_response, ApiClient, DEFAULT_ADMIN_PREFIX, WHOAMI_PATH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStage {
    Identity,
    Capability,
}

impl Display for ValidationStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ValidationStage::Identity => write!(f, "identity"),
            ValidationStage::Capability => write!(f, "capability"),
        }
    }
}

/// Why validation stopped, with the server's status and text as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub stage: ValidationStage,
    pub status: Option<u16>,
    pub message: String,
}

impl ValidationFailure {
    fn from_error(stage: ValidationStage, err: &AdminError) -> Self {
        Self {
            stage,
            status: err.status(),
            message: err.message(),
        }
    }
}

impl Display for ValidationFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.status {
            Some(status) => write!(
                f,
                "{} check failed (HTTP {}): {}",
                self.stage, status, self.message
            ),
            None => write!(f, "{} check failed: {}", self.stage, self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ValidationState {
    Unvalidated,
    ValidatingIdentity,
    ValidatingCapability,
    Validated { identity: Identity },
    Failed(ValidationFailure),
}

impl ValidationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ValidationState::Validated { .. } | ValidationState::Failed(_)
        )
    }
}

pub struct CredentialValidator {
    http: Client,
    admin_prefix: String,
    state: ValidationState,
}

impl CredentialValidator {
    pub fn new() -> AdminResult<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| AdminError::transport("Failed to create HTTP client", e))?;
        Ok(Self::with_http_client(http))
    }

    pub fn with_http_client(http: Client) -> Self {
        Self {
            http,
            admin_prefix: DEFAULT_ADMIN_PREFIX.to_string(),
            state: ValidationState::Unvalidated,
        }
    }

    pub fn with_admin_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.admin_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn state(&self) -> &ValidationState {
        &self.state
    }

    pub fn is_validated(&self) -> bool {
        matches!(self.state, ValidationState::Validated { .. })
    }

    fn transition(&mut self, next: ValidationState) {
        tracing::debug!(from = ?self.state, to = ?next, "Credential validation transition");
        self.state = next;
    }

    /// Stage 1: `whoami` against the origin with a bearer header.
    #[tracing::instrument(skip(self, credential))]
    pub async fn validate_identity(&self, origin: &str, credential: &str) -> AdminResult<Identity> {
        let url = format!("{}{}", origin.trim_end_matches('/'), WHOAMI_PATH);
        let response = self
            .http
            .get(&url)
            .bearer_auth(credential)
            .send()
            .await
            .map_err(|e| AdminError::transport(format!("Failed to reach {}", origin), e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let identity: Identity = response
            .json()
            .await
            .map_err(|e| AdminError::Decode(format!("whoami: {}", e)))?;
        if identity.user_id.is_empty() {
            return Err(AdminError::Decode("whoami: empty user_id".to_string()));
        }

        Ok(identity)
    }

    /// Stage 2: datastore listing on the admin surface with the same credential. Any
    /// 2xx answer passes; the listing itself is not decoded.
    #[tracing::instrument(skip(self, credential))]
    pub async fn validate_capability(&self, base_url: &str, credential: &str) -> AdminResult<()> {
        let config = ConnectionConfig::new(base_url, credential)?;
        let client = ApiClient::with_http_client(config, self.http.clone())?
            .with_admin_prefix(self.admin_prefix.clone());
        let path = client.admin_path("/datastores");

        let response = self
            .http
            .get(client.build_url(&path))
            .send()
            .await
            .map_err(|e| AdminError::transport(format!("Failed to reach {}", base_url), e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    /// Run both stages in order and return the terminal state.
    pub async fn validate(&mut self, config: &ConnectionConfig) -> &ValidationState {
        self.transition(ValidationState::ValidatingIdentity);
        let identity = match self
            .validate_identity(config.base_url(), config.credential())
            .await
        {
            Ok(identity) => identity,
            Err(err) => {
                tracing::warn!(error = %err, "Identity check failed");
                self.transition(ValidationState::Failed(ValidationFailure::from_error(
                    ValidationStage::Identity,
                    &err,
                )));
                return &self.state;
            }
        };

        self.transition(ValidationState::ValidatingCapability);
        match self
            .validate_capability(config.base_url(), config.credential())
            .await
        {
            Ok(()) => {
                tracing::info!(user_id = %identity.user_id, "Credentials validated");
                self.transition(ValidationState::Validated { identity });
            }
            Err(err) => {
                tracing::warn!(user_id = %identity.user_id, error = %err, "Capability check failed");
                self.transition(ValidationState::Failed(ValidationFailure::from_error(
                    ValidationStage::Capability,
                    &err,
                )));
            }
        }

        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const DATASTORES_PATH: &str = "/_matrix/media/unstable/admin/datastores";

    #[tokio::test]
    async fn identity_failure_skips_capability_check() {
        let mut server = mockito::Server::new_async().await;
        let whoami = server
            .mock("GET", WHOAMI_PATH)
            .match_header("authorization", "Bearer tok")
            .with_status(401)
            .with_body(r#"{"errcode":"M_UNKNOWN_TOKEN","error":"Invalid access token passed."}"#)
            .expect(1)
            .create_async()
            .await;
        let datastores = server
            .mock("GET", DATASTORES_PATH)
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let config = ConnectionConfig::new(server.url(), "tok").unwrap();
        let mut validator = CredentialValidator::new().unwrap();
        let state = validator.validate(&config).await.clone();

        assert_eq!(
            state,
            ValidationState::Failed(ValidationFailure {
                stage: ValidationStage::Identity,
                status: Some(401),
                message: "Invalid access token passed.".to_string(),
            })
        );
        assert!(!validator.is_validated());
        whoami.assert_async().await;
        datastores.assert_async().await;
    }

    #[tokio::test]
    async fn capability_failure_is_captured() {
        let mut server = mockito::Server::new_async().await;
        let whoami = server
            .mock("GET", WHOAMI_PATH)
            .with_status(200)
            .with_body(r#"{"user_id":"@admin:example.org","device_id":"ABC"}"#)
            .create_async()
            .await;
        let datastores = server
            .mock("GET", DATASTORES_PATH)
            .match_query(Matcher::UrlEncoded("access_token".into(), "tok".into()))
            .with_status(403)
            .with_body(r#"{"errcode":"M_FORBIDDEN","error":"User is not a repository admin"}"#)
            .expect(1)
            .create_async()
            .await;

        let config = ConnectionConfig::new(server.url(), "tok").unwrap();
        let mut validator = CredentialValidator::new().unwrap();
        validator.validate(&config).await;

        match validator.state() {
            ValidationState::Failed(failure) => {
                assert_eq!(failure.stage, ValidationStage::Capability);
                assert_eq!(failure.status, Some(403));
                assert_eq!(failure.message, "User is not a repository admin");
            }
            other => panic!("unexpected state: {:?}", other),
        }
        whoami.assert_async().await;
        datastores.assert_async().await;
    }

    #[tokio::test]
    async fn any_successful_listing_passes_capability_check() {
        let mut server = mockito::Server::new_async().await;
        let _whoami = server
            .mock("GET", WHOAMI_PATH)
            .with_status(200)
            .with_body(r#"{"user_id":"@admin:example.org"}"#)
            .create_async()
            .await;
        let datastores = server
            .mock("GET", DATASTORES_PATH)
            .match_query(Matcher::UrlEncoded("access_token".into(), "tok".into()))
            .with_status(200)
            .with_body(r#"{"ds1":{"uri":"/data"}}"#)
            .expect(1)
            .create_async()
            .await;

        let config = ConnectionConfig::new(server.url(), "tok").unwrap();
        let mut validator = CredentialValidator::new().unwrap();
        validator.validate(&config).await;

        assert!(validator.is_validated(), "state: {:?}", validator.state());
        datastores.assert_async().await;
    }

    #[tokio::test]
    async fn capability_check_accepts_non_json_success_body() {
        let mut server = mockito::Server::new_async().await;
        let _datastores = server
            .mock("GET", DATASTORES_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let validator = CredentialValidator::new().unwrap();
        validator
            .validate_capability(&server.url(), "tok")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn trailing_slash_in_admin_prefix_is_trimmed() {
        let mut server = mockito::Server::new_async().await;
        let datastores = server
            .mock("GET", DATASTORES_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let validator = CredentialValidator::new()
            .unwrap()
            .with_admin_prefix("/_matrix/media/unstable/admin/");
        validator
            .validate_capability(&server.url(), "tok")
            .await
            .unwrap();
        datastores.assert_async().await;
    }

    #[tokio::test]
    async fn both_stages_succeed() {
        let mut server = mockito::Server::new_async().await;
        let _whoami = server
            .mock("GET", WHOAMI_PATH)
            .with_status(200)
            .with_body(r#"{"user_id":"@admin:example.org"}"#)
            .create_async()
            .await;
        let _datastores = server
            .mock("GET", DATASTORES_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"abc":{"type":"file","uri":"/data/media"}}"#)
            .create_async()
            .await;

        let config = ConnectionConfig::new(server.url(), "tok").unwrap();
        let mut validator = CredentialValidator::new().unwrap();
        assert_eq!(validator.state(), &ValidationState::Unvalidated);
        validator.validate(&config).await;

        assert!(validator.is_validated());
        match validator.state() {
            ValidationState::Validated { identity } => {
                assert_eq!(identity.user_id, "@admin:example.org")
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unparseable_identity_payload_fails_stage_one() {
        let mut server = mockito::Server::new_async().await;
        let _whoami = server
            .mock("GET", WHOAMI_PATH)
            .with_status(200)
            .with_body("<html>captive portal</html>")
            .create_async()
            .await;
        let datastores = server
            .mock("GET", DATASTORES_PATH)
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let config = ConnectionConfig::new(server.url(), "tok").unwrap();
        let mut validator = CredentialValidator::new().unwrap();
        let state = validator.validate(&config).await.clone();

        match state {
            ValidationState::Failed(failure) => {
                assert_eq!(failure.stage, ValidationStage::Identity);
                assert_eq!(failure.status, None);
            }
            other => panic!("unexpected state: {:?}", other),
        }
        datastores.assert_async().await;
    }

    #[test]
    fn failure_display_includes_stage_and_status() {
        let failure = ValidationFailure {
            stage: ValidationStage::Capability,
            status: Some(403),
            message: "forbidden".to_string(),
        };
        assert_eq!(failure.to_string(), "capability check failed (HTTP 403): forbidden");
    }
}
