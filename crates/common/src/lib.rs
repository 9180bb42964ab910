//! Common utilities shared by the relying-party crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for compact JOSE token inspection (size limits, header peeking)
pub mod jwt;

/// Module for the outbound HTTP client used against the identity broker
pub mod http;
