//! # RP Test Utilities
//!
//! Shared test utilities for the FTN relying party.
//!
//! This crate provides:
//! - Fixed RSA key fixtures and JWE helpers (`crypto_fixtures`)
//! - A simulated identity broker on wiremock (`broker_mock`)
//! - Server test harness (`TestRpServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rp_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let broker = MockBroker::start().await;
//!     broker.mount_valid_jwks(1).await;
//!
//!     let server = TestRpServer::spawn(&broker).await?;
//!     let client = server.client()?;
//!     // ...
//!     Ok(())
//! }
//! ```

pub mod broker_mock;
pub mod crypto_fixtures;
pub mod server_harness;

// Re-export commonly used items
pub use broker_mock::*;
pub use crypto_fixtures::*;
pub use server_harness::*;
