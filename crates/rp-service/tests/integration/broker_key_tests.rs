//! Broker key set fetching, pinning and caching.

use crate::support::identify;
use chrono::Utc;
use rp_service::errors::GENERIC_FAILURE_MESSAGE;
use rp_test_utils::*;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

const JWKS_PATH: &str = "/jwks/broker-signed";

#[tokio::test]
async fn test_key_set_is_cached_between_identifications() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    broker.mount_valid_jwks(1).await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    let first = identify(&client, &server, &broker).await?;
    assert_eq!(first["profile"]["sub"], TEST_SUBJECT);

    let second = identify(&client, &server, &broker).await?;
    assert_eq!(second["profile"]["sub"], TEST_SUBJECT);

    assert_eq!(broker.request_count(JWKS_PATH).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_expired_key_set_is_fetched_again() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    let exp = Utc::now().timestamp() + 3;
    broker
        .mount_signed_jwks(signed_jwks_document(BROKER_ISSUER, BROKER_ISSUER, exp), 2)
        .await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    let first = identify(&client, &server, &broker).await?;
    assert_eq!(first["profile"]["sub"], TEST_SUBJECT);

    tokio::time::sleep(Duration::from_secs(4)).await;

    // the only document on offer is now expired too, so the refresh fails
    let second = identify(&client, &server, &broker).await?;
    assert_eq!(second["error"], GENERIC_FAILURE_MESSAGE);
    assert!(second["profile"].is_null());

    // one fetch by the first identification, one refresh attempt after expiry
    assert_eq!(broker.request_count(JWKS_PATH).await, 2);
    Ok(())
}

#[tokio::test]
async fn test_key_set_signed_by_unpinned_key_is_rejected() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    let exp = Utc::now().timestamp() + 3600;
    broker
        .mount_signed_jwks(
            signed_jwks_document_with_key(FOREIGN_KEY_PEM, BROKER_ISSUER, BROKER_ISSUER, exp),
            1,
        )
        .await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    let after = identify(&client, &server, &broker).await?;
    assert_eq!(after["error"], GENERIC_FAILURE_MESSAGE);
    assert!(after["profile"].is_null());
    Ok(())
}

#[tokio::test]
async fn test_key_set_for_other_issuer_is_rejected() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    let exp = Utc::now().timestamp() + 3600;
    let other = "https://other-broker.test";
    broker
        .mount_signed_jwks(signed_jwks_document(other, other, exp), 1)
        .await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    let after = identify(&client, &server, &broker).await?;
    assert_eq!(after["error"], GENERIC_FAILURE_MESSAGE);
    assert!(server.state().pipeline.keys().is_available());
    Ok(())
}

#[tokio::test]
async fn test_failed_refresh_is_retried_on_next_request() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(broker.server())
        .await;
    broker.mount_valid_jwks(1).await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    let first = identify(&client, &server, &broker).await?;
    assert_eq!(first["error"], GENERIC_FAILURE_MESSAGE);

    let second = identify(&client, &server, &broker).await?;
    assert_eq!(second["profile"]["sub"], TEST_SUBJECT);
    assert!(second["error"].is_null());

    assert_eq!(broker.request_count(JWKS_PATH).await, 2);
    Ok(())
}
