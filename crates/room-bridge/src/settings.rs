//! Media service settings: API key, API secret and server URL.
//!
//! Settings are an explicit value handed to the credential issuer, never
//! process environment mutated at runtime. The live value is published on a
//! `watch` channel owned by [`SettingsService`]; the session actor reads the
//! latest value at each join.
//!
//! Persistence goes through the [`SettingsStore`] trait. The production store
//! merges into a flat `KEY=value` file shared with other tooling.

use crate::errors::{BridgeError, SETTINGS_INCOMPLETE_MESSAGE};
use async_trait::async_trait;
use common::env_file::EnvFile;
use common::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

/// Settings file key for the media service API key.
pub const API_KEY_VAR: &str = "LIVEKIT_API_KEY";

/// Settings file key for the media service API secret.
pub const API_SECRET_VAR: &str = "LIVEKIT_API_SECRET";

/// Settings file key for the media server URL.
pub const SERVER_URL_VAR: &str = "LIVEKIT_URL";

/// Errors from the settings store.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings from {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to write settings to {path}: {reason}")]
    Write { path: String, reason: String },
}

impl From<SettingsError> for BridgeError {
    fn from(err: SettingsError) -> Self {
        BridgeError::Settings(err.to_string())
    }
}

/// Media service settings. Any field may be absent.
#[derive(Clone, Default)]
pub struct RoomServiceSettings {
    pub api_key: Option<String>,
    pub api_secret: Option<SecretString>,
    pub server_url: Option<String>,
}

/// Custom Debug implementation that redacts the API secret.
impl fmt::Debug for RoomServiceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomServiceSettings")
            .field("api_key", &self.api_key)
            .field(
                "api_secret",
                &self.api_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("server_url", &self.server_url)
            .finish()
    }
}

impl RoomServiceSettings {
    /// Build settings from a key lookup. Blank values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            api_key: non_blank(API_KEY_VAR),
            api_secret: non_blank(API_SECRET_VAR).map(SecretString::from),
            server_url: non_blank(SERVER_URL_VAR),
        }
    }

    /// Fields present in `other` replace the ones in `self`.
    #[must_use]
    pub fn overlay(self, other: RoomServiceSettings) -> Self {
        Self {
            api_key: other.api_key.or(self.api_key),
            api_secret: other.api_secret.or(self.api_secret),
            server_url: other.server_url.or(self.server_url),
        }
    }

    /// Whether all three values are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some() && self.server_url.is_some()
    }
}

/// Settings as submitted by the settings form.
#[derive(Debug, Deserialize)]
pub struct SettingsForm {
    pub api_key: String,
    pub api_secret: SecretString,
    pub server_url: String,
}

impl SettingsForm {
    /// Trim every field and require all three to be non-empty.
    pub fn validate(&self) -> Result<RoomServiceSettings, BridgeError> {
        let api_key = self.api_key.trim();
        let api_secret = self.api_secret.expose_secret().trim();
        let server_url = self.server_url.trim();

        if api_key.is_empty() || api_secret.is_empty() || server_url.is_empty() {
            return Err(BridgeError::Validation(
                SETTINGS_INCOMPLETE_MESSAGE.to_string(),
            ));
        }

        Ok(RoomServiceSettings {
            api_key: Some(api_key.to_string()),
            api_secret: Some(SecretString::from(api_secret.to_string())),
            server_url: Some(server_url.to_string()),
        })
    }
}

/// Redacted view of settings returned to the settings page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsView {
    pub api_key: String,
    pub api_secret_configured: bool,
    pub server_url: String,
}

impl From<&RoomServiceSettings> for SettingsView {
    fn from(settings: &RoomServiceSettings) -> Self {
        Self {
            api_key: settings.api_key.clone().unwrap_or_default(),
            api_secret_configured: settings.api_secret.is_some(),
            server_url: settings.server_url.clone().unwrap_or_default(),
        }
    }
}

/// Persistence for media service settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load persisted settings. A missing store yields empty settings.
    async fn load(&self) -> Result<RoomServiceSettings, SettingsError>;

    /// Persist settings, merging with whatever else the store holds.
    async fn save(&self, settings: &RoomServiceSettings) -> Result<(), SettingsError>;
}

/// Settings store backed by a flat `KEY=value` file.
///
/// Saving rewrites only the three media service keys; other keys, comments
/// and blank lines are preserved in place. The file is replaced atomically
/// through a sibling temp file.
#[derive(Debug, Clone)]
pub struct EnvFileSettingsStore {
    path: PathBuf,
}

impl EnvFileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<EnvFile, SettingsError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(EnvFile::parse(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(EnvFile::default()),
            Err(e) => Err(SettingsError::Read {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn write_error(&self, e: &std::io::Error) -> SettingsError {
        SettingsError::Write {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl SettingsStore for EnvFileSettingsStore {
    async fn load(&self) -> Result<RoomServiceSettings, SettingsError> {
        let file = self.read_file().await?;
        Ok(RoomServiceSettings::from_lookup(|key| {
            file.get(key).map(str::to_string)
        }))
    }

    async fn save(&self, settings: &RoomServiceSettings) -> Result<(), SettingsError> {
        let mut file = self.read_file().await?;

        if let Some(api_key) = &settings.api_key {
            file.set(API_KEY_VAR, api_key);
        }
        if let Some(api_secret) = &settings.api_secret {
            file.set(API_SECRET_VAR, api_secret.expose_secret());
        }
        if let Some(server_url) = &settings.server_url {
            file.set(SERVER_URL_VAR, server_url);
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        tokio::fs::write(&tmp_path, file.render())
            .await
            .map_err(|e| self.write_error(&e))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| self.write_error(&e))?;

        Ok(())
    }
}

/// Owns the live settings value and its persistence.
pub struct SettingsService {
    store: Arc<dyn SettingsStore>,
    sender: watch::Sender<RoomServiceSettings>,
}

impl SettingsService {
    /// Create the service with an initial value (usually loaded from the
    /// store and overlaid with environment variables at startup).
    pub fn new(store: Arc<dyn SettingsStore>, initial: RoomServiceSettings) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { store, sender }
    }

    /// Receiver that always observes the latest settings.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RoomServiceSettings> {
        self.sender.subscribe()
    }

    /// Current settings value.
    #[must_use]
    pub fn current(&self) -> RoomServiceSettings {
        self.sender.borrow().clone()
    }

    /// Validate, persist and publish new settings.
    ///
    /// The published value only changes once persistence succeeded.
    pub async fn save(&self, form: &SettingsForm) -> Result<RoomServiceSettings, BridgeError> {
        let settings = form.validate()?;

        if let Err(e) = self.store.save(&settings).await {
            warn!(target: "bridge.settings", error = %e, "Failed to persist settings");
            return Err(e.into());
        }

        self.sender.send_replace(settings.clone());

        info!(
            target: "bridge.settings",
            server_url = settings.server_url.as_deref().unwrap_or_default(),
            "Media service settings updated"
        );

        Ok(settings)
    }
}
