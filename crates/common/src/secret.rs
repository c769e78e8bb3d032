//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Room Bridge holds
//! two kinds of sensitive material: the media service API secret used to sign
//! join credentials, and the signed credentials themselves (a credential is a
//! bearer token for one room).
//!
//! `SecretString` implements `Debug` with redaction, so any struct deriving
//! `Debug` that holds one is safe to log with `{:?}` or tracing fields.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct IssuedCredential {
//!     room: String,
//!     token: SecretString,
//! }
//!
//! let issued = IssuedCredential {
//!     room: "standup".to_string(),
//!     token: SecretString::from("eyJhbGciOi..."),
//! };
//!
//! // Room is visible, token is redacted
//! println!("{:?}", issued);
//!
//! // Reading the value is always an explicit call
//! let raw: &str = issued.token.expose_secret();
//! ```
//!
//! # Usage Guidelines
//!
//! Use `SecretString` for:
//! - Media service API keys and secrets
//! - Signed room credentials
//!
//! Plain `String` is fine for the media server URL, room names and identities.

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_api_secret_debug_is_redacted() {
        let secret = SecretString::from("lk-api-secret-value");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("lk-api-secret-value"));
    }

    #[test]
    fn test_settings_struct_with_secret_is_safe() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct Settings {
            server_url: String,
            api_secret: SecretString,
        }

        let settings = Settings {
            server_url: "wss://media.example.com".to_string(),
            api_secret: SecretString::from("do-not-log-me"),
        };

        let debug_str = format!("{settings:?}");

        assert!(debug_str.contains("wss://media.example.com"));
        assert!(!debug_str.contains("do-not-log-me"));
    }

    #[test]
    fn test_deserialize_keeps_value_readable() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct Form {
            api_key: String,
            api_secret: SecretString,
        }

        let json = r#"{"api_key": "APIkey", "api_secret": "s3cr3t"}"#;
        let form: Form = serde_json::from_str(json).expect("deserialize");

        assert_eq!(form.api_secret.expose_secret(), "s3cr3t");
        assert!(!format!("{form:?}").contains("s3cr3t"));
    }
}
