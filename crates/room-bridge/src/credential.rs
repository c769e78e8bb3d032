//! Credential Issuer.
//!
//! Mints a room-scoped, time-bounded join credential locally from the media
//! service API key and secret. No network call is made.

use crate::errors::{BridgeError, CONFIGURATION_MESSAGE, VALIDATION_MESSAGE};
use crate::settings::RoomServiceSettings;
use common::jwt::{sign_room_token, RoomAccessClaims, MAX_ROOM_TOKEN_TTL};
use common::secret::{ExposeSecret, SecretString};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from credential issuance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// Identity or room is blank after trimming.
    #[error("identity and room are required")]
    Validation,

    /// API key, API secret or server URL is absent.
    #[error("media service settings incomplete (missing {0})")]
    Configuration(&'static str),

    /// Signing failed.
    #[error("{0}")]
    Signing(String),
}

impl From<CredentialError> for BridgeError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Validation => BridgeError::Validation(VALIDATION_MESSAGE.to_string()),
            CredentialError::Configuration(_) => {
                BridgeError::Configuration(CONFIGURATION_MESSAGE.to_string())
            }
            CredentialError::Signing(reason) => BridgeError::CredentialIssuance(reason),
        }
    }
}

/// A signed join credential. Opaque to everything except the transport.
#[derive(Clone)]
pub struct Credential(SecretString);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// The raw token, for handing to the media transport.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for Credential {}

/// Everything the adapter needs to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCredential {
    pub identity: String,
    pub room_id: String,
    pub server_url: String,
    pub credential: Credential,
}

/// Issues join credentials.
#[derive(Debug, Clone)]
pub struct CredentialIssuer {
    ttl: Duration,
}

impl CredentialIssuer {
    /// Create an issuer. `ttl` is capped at 24 hours.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: ttl.min(MAX_ROOM_TOKEN_TTL),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a credential valid from now.
    ///
    /// Inputs are trimmed; blank identity or room fails with
    /// `CredentialError::Validation` before settings are consulted.
    pub fn issue(
        &self,
        identity: &str,
        room_id: &str,
        settings: &RoomServiceSettings,
    ) -> Result<IssuedCredential, CredentialError> {
        self.issue_at(identity, room_id, settings, chrono::Utc::now().timestamp())
    }

    /// Issue a credential with an explicit issued-at timestamp.
    pub fn issue_at(
        &self,
        identity: &str,
        room_id: &str,
        settings: &RoomServiceSettings,
        now: i64,
    ) -> Result<IssuedCredential, CredentialError> {
        let identity = identity.trim();
        let room_id = room_id.trim();
        if identity.is_empty() || room_id.is_empty() {
            return Err(CredentialError::Validation);
        }

        let api_key = settings
            .api_key
            .as_deref()
            .ok_or(CredentialError::Configuration("api key"))?;
        let api_secret = settings
            .api_secret
            .as_ref()
            .ok_or(CredentialError::Configuration("api secret"))?;
        let server_url = settings
            .server_url
            .as_deref()
            .ok_or(CredentialError::Configuration("server url"))?;

        let claims = RoomAccessClaims::join_only(api_key, identity, room_id, now, self.ttl);
        let token = sign_room_token(&claims, api_secret.expose_secret().as_bytes()).map_err(|e| {
            warn!(target: "bridge.credential", error = %e, "Room token signing failed");
            CredentialError::Signing(e.to_string())
        })?;

        debug!(
            target: "bridge.credential",
            room = %room_id,
            identity = %identity,
            exp = claims.exp,
            "Issued room credential"
        );

        Ok(IssuedCredential {
            identity: identity.to_string(),
            room_id: room_id.to_string(),
            server_url: server_url.to_string(),
            credential: Credential::new(token),
        })
    }
}

impl Default for CredentialIssuer {
    fn default() -> Self {
        Self::new(common::jwt::DEFAULT_ROOM_TOKEN_TTL)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::jwt::verify_room_token;

    fn complete_settings() -> RoomServiceSettings {
        RoomServiceSettings {
            api_key: Some("APIkey".to_string()),
            api_secret: Some(SecretString::from("a-long-enough-api-secret-value")),
            server_url: Some("wss://media.example.com".to_string()),
        }
    }

    #[test]
    fn test_issue_scopes_grant_to_room_and_identity() {
        let issuer = CredentialIssuer::default();
        let issued = issuer.issue("alice", "room1", &complete_settings()).unwrap();

        assert_eq!(issued.identity, "alice");
        assert_eq!(issued.room_id, "room1");
        assert_eq!(issued.server_url, "wss://media.example.com");

        let claims = verify_room_token(
            issued.credential.expose(),
            b"a-long-enough-api-secret-value",
        )
        .unwrap();
        assert!(claims.grants_join("room1", "alice"));
        assert_eq!(claims.iss, "APIkey");
        assert_eq!(claims.exp - claims.iat, 6 * 60 * 60);
    }

    #[test]
    fn test_issue_trims_inputs() {
        let issued = CredentialIssuer::default()
            .issue("  alice ", "\troom1\n", &complete_settings())
            .unwrap();

        assert_eq!(issued.identity, "alice");
        assert_eq!(issued.room_id, "room1");
    }

    #[test]
    fn test_blank_inputs_fail_validation() {
        let issuer = CredentialIssuer::default();
        let settings = complete_settings();

        for (identity, room) in [("", "room1"), ("alice", ""), ("   ", "room1"), ("alice", " \t ")] {
            assert_eq!(
                issuer.issue(identity, room, &settings),
                Err(CredentialError::Validation),
                "identity={identity:?} room={room:?}"
            );
        }
    }

    #[test]
    fn test_validation_checked_before_configuration() {
        let result =
            CredentialIssuer::default().issue("", "room1", &RoomServiceSettings::default());
        assert_eq!(result, Err(CredentialError::Validation));
    }

    #[test]
    fn test_missing_settings_fail_configuration() {
        let issuer = CredentialIssuer::default();

        let mut settings = complete_settings();
        settings.server_url = None;
        assert_eq!(
            issuer.issue("alice", "room1", &settings),
            Err(CredentialError::Configuration("server url"))
        );

        let mut settings = complete_settings();
        settings.api_secret = None;
        assert_eq!(
            issuer.issue("alice", "room1", &settings),
            Err(CredentialError::Configuration("api secret"))
        );

        let mut settings = complete_settings();
        settings.api_key = None;
        assert_eq!(
            issuer.issue("alice", "room1", &settings),
            Err(CredentialError::Configuration("api key"))
        );
    }

    #[test]
    fn test_configuration_error_maps_to_user_message() {
        let err: BridgeError = CredentialError::Configuration("server url").into();
        assert_eq!(err.client_message(), CONFIGURATION_MESSAGE);

        let err: BridgeError = CredentialError::Validation.into();
        assert_eq!(err.client_message(), VALIDATION_MESSAGE);
    }

    #[test]
    fn test_issue_at_is_deterministic() {
        let issuer = CredentialIssuer::new(Duration::from_secs(600));
        let settings = complete_settings();

        let first = issuer.issue_at("alice", "room1", &settings, 1_700_000_000).unwrap();
        let second = issuer.issue_at("alice", "room1", &settings, 1_700_000_000).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_ttl_is_capped() {
        let issuer = CredentialIssuer::new(Duration::from_secs(7 * 24 * 60 * 60));
        assert_eq!(issuer.ttl(), MAX_ROOM_TOKEN_TTL);
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("eyJhbGciOiJIUzI1NiJ9.payload.sig");
        assert_eq!(format!("{credential:?}"), "Credential([REDACTED])");
    }
}
