//! Configuration module
//!
//! Connection settings (homeserver URL and access token) can be persisted in two shapes:
//!
//! * a structured JSON document with nested `homeserver` / `auth` groups, and
//! * a flat key/value file holding `homeserver_url` and `access_token` independently
//!   (the older schema), optionally overridden per key by environment variables.
//!
//! Consumers never read either shape directly; they go through [`ConfigResolver`].

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AdminError, AdminResult};

const DEFAULT_CONFIG_PATH: &str = "config.json";
const DEFAULT_SETTINGS_PATH: &str = ".mmr-admin";

const HOMESERVER_URL_KEY: &str = "homeserver_url";
const ACCESS_TOKEN_KEY: &str = "access_token";

/// Homeserver origin plus the bearer credential used for every call.
///
/// Immutable once built. Changing credentials means building a new config and a new
/// client from it.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    base_url: String,
    credential: String,
}

impl ConnectionConfig {
    pub fn new(base_url: impl Into<String>, credential: impl Into<String>) -> AdminResult<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        let credential = credential.into().trim().to_string();

        if base_url.is_empty() {
            return Err(AdminError::IncompleteConfiguration(
                "homeserver URL is empty".to_string(),
            ));
        }
        if credential.is_empty() {
            return Err(AdminError::IncompleteConfiguration(
                "access token is empty".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            credential,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("base_url", &self.base_url)
            .field("credential", &"<redacted>")
            .finish()
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeserverSection {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(default)]
    pub access_token: String,
}

/// Structured configuration document (`config.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredConfig {
    #[serde(default)]
    pub homeserver: HomeserverSection,
    #[serde(default)]
    pub auth: AuthSection,
}

impl StructuredConfig {
    /// Both fields, or nothing.
    pub fn connection(&self) -> Option<(&str, &str)> {
        Some((
            non_empty(&self.homeserver.url)?,
            non_empty(&self.auth.access_token)?,
        ))
    }

    /// Read the document. A missing file is not an error; a malformed one is.
    pub fn load(path: &Path) -> AdminResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(path).map_err(|e| {
            AdminError::InvalidConfiguration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = serde_json::from_str(&raw).map_err(|e| {
            AdminError::InvalidConfiguration(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        Ok(Some(config))
    }

    pub fn save(&self, path: &Path) -> AdminResult<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw).map_err(|e| {
            AdminError::InvalidConfiguration(format!("Failed to write {}: {}", path.display(), e))
        })
    }
}

impl From<&ConnectionConfig> for StructuredConfig {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            homeserver: HomeserverSection {
                url: config.base_url().to_string(),
            },
            auth: AuthSection {
                access_token: config.credential().to_string(),
            },
        }
    }
}

/// Independently stored settings from the older flat schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatSettings {
    pub homeserver_url: Option<String>,
    pub access_token: Option<String>,
}

impl FlatSettings {
    pub fn connection(&self) -> Option<(&str, &str)> {
        Some((
            non_empty(self.homeserver_url.as_deref()?)?,
            non_empty(self.access_token.as_deref()?)?,
        ))
    }

    /// Read a dotenv-style key/value file. Unknown keys are ignored.
    pub fn load(path: &Path) -> AdminResult<Self> {
        let mut settings = FlatSettings::default();
        if !path.exists() {
            return Ok(settings);
        }

        let entries = dotenvy::from_path_iter(path).map_err(|e| {
            AdminError::InvalidConfiguration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        for entry in entries {
            let (key, value) = entry.map_err(|e| {
                AdminError::InvalidConfiguration(format!(
                    "Failed to parse {}: {}",
                    path.display(),
                    e
                ))
            })?;
            match key.to_lowercase().as_str() {
                HOMESERVER_URL_KEY => settings.homeserver_url = Some(value),
                ACCESS_TOKEN_KEY => settings.access_token = Some(value),
                _ => tracing::debug!(key = %key, "Ignoring unknown settings key"),
            }
        }

        Ok(settings)
    }

    /// Override individual values from `MMR_HOMESERVER_URL` / `MMR_ACCESS_TOKEN`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = env::var("MMR_HOMESERVER_URL") {
            self.homeserver_url = Some(url);
        }
        if let Ok(token) = env::var("MMR_ACCESS_TOKEN") {
            self.access_token = Some(token);
        }
        self
    }

    pub fn save(&self, path: &Path) -> AdminResult<()> {
        let mut raw = String::new();
        if let Some(url) = &self.homeserver_url {
            raw.push_str(&format!("{}=\"{}\"\n", HOMESERVER_URL_KEY, escape_value(url)));
        }
        if let Some(token) = &self.access_token {
            raw.push_str(&format!("{}=\"{}\"\n", ACCESS_TOKEN_KEY, escape_value(token)));
        }
        fs::write(path, raw).map_err(|e| {
            AdminError::InvalidConfiguration(format!("Failed to write {}: {}", path.display(), e))
        })
    }
}

fn escape_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$")
}

impl From<&ConnectionConfig> for FlatSettings {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            homeserver_url: Some(config.base_url().to_string()),
            access_token: Some(config.credential().to_string()),
        }
    }
}

/// Locations of the two persisted shapes.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub structured: PathBuf,
    pub flat: PathBuf,
}

impl ConfigPaths {
    /// `MMR_CONFIG_PATH` (default `config.json`) and `MMR_SETTINGS_PATH`
    /// (default `.mmr-admin`).
    pub fn from_env() -> Self {
        Self {
            structured: env::var("MMR_CONFIG_PATH")
                .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
                .into(),
            flat: env::var("MMR_SETTINGS_PATH")
                .unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string())
                .into(),
        }
    }
}

/// Where a resolved configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Structured,
    Flat,
}

/// Resolves a [`ConnectionConfig`] from the persisted shapes.
///
/// A complete structured document wins; otherwise complete flat settings are used.
/// Fields are never combined across the two shapes.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    structured: Option<StructuredConfig>,
    flat: FlatSettings,
}

impl ConfigResolver {
    pub fn new(structured: Option<StructuredConfig>, flat: FlatSettings) -> Self {
        Self { structured, flat }
    }

    pub fn load(paths: &ConfigPaths) -> AdminResult<Self> {
        let structured = StructuredConfig::load(&paths.structured)?;
        let flat = FlatSettings::load(&paths.flat)?.with_env_overrides();
        Ok(Self::new(structured, flat))
    }

    fn pick(&self) -> Option<(ConfigSource, &str, &str)> {
        if let Some((url, token)) = self.structured.as_ref().and_then(|s| s.connection()) {
            return Some((ConfigSource::Structured, url, token));
        }
        self.flat
            .connection()
            .map(|(url, token)| (ConfigSource::Flat, url, token))
    }

    pub fn source(&self) -> Option<ConfigSource> {
        self.pick().map(|(source, _, _)| source)
    }

    pub fn is_complete(&self) -> bool {
        self.pick().is_some()
    }

    pub fn resolve(&self) -> AdminResult<ConnectionConfig> {
        match self.pick() {
            Some((source, url, token)) => {
                tracing::debug!(source = ?source, base_url = %url, "Resolved connection configuration");
                ConnectionConfig::new(url, token)
            }
            None => Err(AdminError::IncompleteConfiguration(
                "a homeserver URL and an access token are both required".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(present: bool, v: &str) -> String {
        if present { v.to_string() } else { String::new() }
    }

    fn structured(url: bool, token: bool) -> StructuredConfig {
        StructuredConfig {
            homeserver: HomeserverSection {
                url: value(url, "https://matrix.example.org"),
            },
            auth: AuthSection {
                access_token: value(token, "syt_token"),
            },
        }
    }

    fn flat(url: bool, token: bool) -> FlatSettings {
        FlatSettings {
            homeserver_url: url.then(|| "https://old.example.org".to_string()),
            access_token: token.then(|| "old_token".to_string()),
        }
    }

    #[test]
    fn completeness_of_structured_shape() {
        for (url, token) in [(false, false), (true, false), (false, true), (true, true)] {
            let resolver = ConfigResolver::new(Some(structured(url, token)), FlatSettings::default());
            assert_eq!(resolver.is_complete(), url && token, "url={} token={}", url, token);
            assert_eq!(resolver.resolve().is_ok(), url && token);
        }
    }

    #[test]
    fn completeness_of_flat_shape() {
        for (url, token) in [(false, false), (true, false), (false, true), (true, true)] {
            let resolver = ConfigResolver::new(None, flat(url, token));
            assert_eq!(resolver.is_complete(), url && token, "url={} token={}", url, token);
            assert_eq!(resolver.resolve().is_ok(), url && token);
        }
    }

    #[test]
    fn empty_strings_in_flat_shape_are_incomplete() {
        let resolver = ConfigResolver::new(
            None,
            FlatSettings {
                homeserver_url: Some("https://old.example.org".to_string()),
                access_token: Some("   ".to_string()),
            },
        );
        assert!(!resolver.is_complete());
    }

    #[test]
    fn structured_wins_over_flat() {
        let resolver = ConfigResolver::new(Some(structured(true, true)), flat(true, true));
        let config = resolver.resolve().unwrap();
        assert_eq!(config.base_url(), "https://matrix.example.org");
        assert_eq!(config.credential(), "syt_token");
        assert_eq!(resolver.source(), Some(ConfigSource::Structured));
    }

    #[test]
    fn partial_structured_falls_back_to_flat() {
        let resolver = ConfigResolver::new(Some(structured(true, false)), flat(true, true));
        let config = resolver.resolve().unwrap();
        assert_eq!(config.base_url(), "https://old.example.org");
        assert_eq!(config.credential(), "old_token");
        assert_eq!(resolver.source(), Some(ConfigSource::Flat));
    }

    #[test]
    fn fields_are_never_mixed_across_shapes() {
        let resolver = ConfigResolver::new(Some(structured(true, false)), flat(false, true));
        assert!(!resolver.is_complete());
        assert!(matches!(
            resolver.resolve(),
            Err(AdminError::IncompleteConfiguration(_))
        ));
    }

    #[test]
    fn connection_config_rejects_empty_fields_and_trims_slash() {
        assert!(ConnectionConfig::new("", "token").is_err());
        assert!(ConnectionConfig::new("https://example.org", " ").is_err());

        let config = ConnectionConfig::new("https://example.org//", "token").unwrap();
        assert_eq!(config.base_url(), "https://example.org");
        assert!(format!("{:?}", config).contains("<redacted>"));
    }

    #[test]
    fn structured_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths {
            structured: dir.path().join("config.json"),
            flat: dir.path().join("missing"),
        };

        let config = ConnectionConfig::new("https://matrix.example.org", "syt_abc").unwrap();
        StructuredConfig::from(&config).save(&paths.structured).unwrap();

        let resolved = ConfigResolver::load(&paths).unwrap().resolve().unwrap();
        assert_eq!(resolved, config);
    }

    #[test]
    fn flat_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let settings_path = dir.path().join("settings");

        let config = ConnectionConfig::new("https://matrix.example.org:8448", "syt_abc-123").unwrap();
        FlatSettings::from(&config).save(&settings_path).unwrap();

        let flat = FlatSettings::load(&settings_path).unwrap();
        let resolved = ConfigResolver::new(None, flat).resolve().unwrap();
        assert_eq!(resolved.base_url(), config.base_url());
        assert_eq!(resolved.credential(), config.credential());
    }

    #[test]
    fn missing_files_are_incomplete_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        let structured = StructuredConfig::load(&dir.path().join("nope.json")).unwrap();
        let flat = FlatSettings::load(&dir.path().join("nope")).unwrap();
        assert!(!ConfigResolver::new(structured, flat).is_complete());
    }

    #[test]
    fn malformed_structured_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            StructuredConfig::load(&path),
            Err(AdminError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn structured_file_with_missing_groups_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "homeserver": { "url": "https://example.org" } }"#).unwrap();
        let config = StructuredConfig::load(&path).unwrap().unwrap();
        assert_eq!(config.homeserver.url, "https://example.org");
        assert!(config.connection().is_none());
    }
}
