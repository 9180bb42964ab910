//! FTN Relying Party Service Library
//!
//! An OpenID Connect relying party for the Finnish Trust Network. It sends
//! users to the identity broker with a signed request object, exchanges the
//! returned authorization code for an encrypted and signed ID token, and
//! verifies that token against the broker's rotating signing keys.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/mod.rs (TrustPipeline) -> crypto/*.rs
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `crypto` - Key loading, JWS signing and verification, JWE decryption
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `observability` - Metrics and log correlation helpers
//! - `routes` - Axum router setup
//! - `services` - Token-trust pipeline
//! - `session` - In-memory session store and cookie helpers

pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod observability;
pub mod routes;
pub mod services;
pub mod session;
