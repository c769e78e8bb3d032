//! Room access token claims shared across Room Bridge components.
//!
//! A room access token is an HS256-signed JWT in the shape the media service
//! expects:
//!
//! ```json
//! {
//!   "iss": "<api key>",
//!   "sub": "<identity>",
//!   "name": "<identity>",
//!   "iat": 1700000000,
//!   "nbf": 1700000000,
//!   "exp": 1700021600,
//!   "video": { "roomJoin": true, "room": "<room>" }
//! }
//! ```
//!
//! The grant is limited to joining exactly one room as exactly one identity.
//! Signing lives here next to verification so tests on both sides of the wire
//! agree on the format.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only HS256 is accepted on verification
//! - Verification errors are deliberately generic; details go to debug logs

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum accepted token size in bytes (4KB).
///
/// A room token with a long room name and identity is still well under 1KB.
pub const MAX_JWT_SIZE_BYTES: usize = 4096;

/// Default room token lifetime (six hours, matching the media service SDKs).
pub const DEFAULT_ROOM_TOKEN_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Upper bound on room token lifetime (24 hours).
pub const MAX_ROOM_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// =============================================================================
// Error Types
// =============================================================================

/// Errors produced while signing or verifying room tokens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("The room token is invalid or expired")]
    TokenTooLarge,

    /// Signature, structure, or time validation failed.
    #[error("The room token is invalid or expired")]
    InvalidToken,

    /// The signing operation itself failed.
    #[error("Room token signing failed: {0}")]
    Signing(String),
}

// =============================================================================
// Claims Types
// =============================================================================

/// Video grant section of a room access token.
///
/// Only the two fields a listener-and-speaker audio room needs are issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    /// Permission to join a room.
    pub room_join: bool,
    /// The single room this grant is valid for.
    pub room: String,
}

/// Claims carried by a room access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomAccessClaims {
    /// Issuer: the media service API key.
    pub iss: String,
    /// Subject: the participant identity.
    pub sub: String,
    /// Display name shown to other participants.
    pub name: String,
    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,
    /// Not-before timestamp (Unix epoch seconds).
    pub nbf: i64,
    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,
    /// Room grant.
    pub video: VideoGrant,
}

impl RoomAccessClaims {
    /// Build join-only claims for `identity` in `room`, valid for `ttl` from `now`.
    #[must_use]
    pub fn join_only(api_key: &str, identity: &str, room: &str, now: i64, ttl: Duration) -> Self {
        // ttl is capped by callers to MAX_ROOM_TOKEN_TTL, well within i64 range
        #[allow(clippy::cast_possible_wrap)]
        let ttl_secs = ttl.as_secs() as i64;
        Self {
            iss: api_key.to_string(),
            sub: identity.to_string(),
            name: identity.to_string(),
            iat: now,
            nbf: now,
            exp: now + ttl_secs,
            video: VideoGrant {
                room_join: true,
                room: room.to_string(),
            },
        }
    }

    /// Whether these claims allow joining `room` as `identity`.
    #[must_use]
    pub fn grants_join(&self, room: &str, identity: &str) -> bool {
        self.video.room_join && self.video.room == room && self.sub == identity
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Sign claims with HS256 using the API secret.
///
/// # Errors
///
/// Returns `JwtError::Signing` if encoding fails.
pub fn sign_room_token(claims: &RoomAccessClaims, api_secret: &[u8]) -> Result<String, JwtError> {
    let mut header = Header::new(Algorithm::HS256);
    header.typ = Some("JWT".to_string());

    encode(&header, claims, &EncodingKey::from_secret(api_secret))
        .map_err(|e| JwtError::Signing(e.to_string()))
}

/// Verify a room token's signature, `exp` and `nbf`, returning its claims.
///
/// # Errors
///
/// - `TokenTooLarge` if the token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `InvalidToken` for any signature, format or time failure
pub fn verify_room_token(token: &str, api_secret: &[u8]) -> Result<RoomAccessClaims, JwtError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtError::TokenTooLarge);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.validate_nbf = true;

    decode::<RoomAccessClaims>(token, &DecodingKey::from_secret(api_secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(target: "common.jwt", error = %e, "Room token verification failed");
            JwtError::InvalidToken
        })
}
