//! Common utilities and types shared across Room Bridge components.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for room access token claims and verification
pub mod jwt;

/// Module for flat `KEY=value` settings files
pub mod env_file;
