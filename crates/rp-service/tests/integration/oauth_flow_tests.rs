//! End-to-end identification flow against a simulated broker.

use crate::support::{broker_id_token, callback, start_authorization, view};
use rp_service::errors::GENERIC_FAILURE_MESSAGE;
use rp_test_utils::*;

#[tokio::test]
async fn test_full_identification_flow() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    broker.mount_valid_jwks(1).await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    let landing = view(&client, &server, "/?lang=fi").await?;
    assert_eq!(landing["hosted"], true);
    assert_eq!(landing["landing"], true);

    let auth = start_authorization(&client, &server, "?idButton=fi-op&promptBox=1").await?;
    assert_eq!(auth.state.len(), 22);
    assert_eq!(auth.nonce.len(), 22);
    assert_ne!(auth.state, auth.nonce);
    assert_eq!(auth.request_object["client_id"], TEST_CLIENT_ID);
    assert_eq!(
        auth.request_object["redirect_uri"],
        format!("{}/oauth/code", server.url())
    );
    assert_eq!(auth.request_object["ui_locales"], "fi");
    assert_eq!(auth.request_object["ftn_spname"], "Saippuaa kansalle");
    assert_eq!(auth.request_object["ftn_idp_id"], "fi-op");
    assert_eq!(auth.request_object["prompt"], "consent");

    broker.mount_token_response(broker_id_token(&auth.nonce)).await;

    let target = callback(&client, &server, &format!("code=abc&state={}", auth.state)).await?;
    assert_eq!(target, "/");

    let form = broker
        .token_request_form()
        .await
        .ok_or_else(|| anyhow::anyhow!("no token request"))?;
    assert_eq!(form.get("code").map(String::as_str), Some("abc"));
    assert_eq!(
        form.get("redirect_uri"),
        Some(&format!("{}/oauth/code", server.url()))
    );

    let profile = view(&client, &server, "/").await?;
    assert_eq!(profile["landing"], false);
    assert!(profile["error"].is_null());
    assert_eq!(profile["profile"]["sub"], TEST_SUBJECT);
    assert_eq!(
        profile["profile"]["personal_identity_code"],
        TEST_PERSONAL_IDENTITY_CODE
    );
    assert_eq!(profile["authTime"], "November 15, 12:13 AM");
    assert!(profile["rawProfile"]
        .as_str()
        .is_some_and(|raw| raw.contains(TEST_SUBJECT)));

    Ok(())
}

#[tokio::test]
async fn test_callback_replay_is_rejected() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    broker.mount_valid_jwks(1).await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    view(&client, &server, "/").await?;
    let auth = start_authorization(&client, &server, "").await?;
    broker.mount_token_response(broker_id_token(&auth.nonce)).await;

    let query = format!("code=abc&state={}", auth.state);
    callback(&client, &server, &query).await?;
    assert_eq!(broker.request_count("/oauth/token").await, 1);

    // state was consumed by the first callback
    let target = callback(&client, &server, &query).await?;
    assert_eq!(target, "/");
    assert_eq!(broker.request_count("/oauth/token").await, 1);

    let after = view(&client, &server, "/").await?;
    assert_eq!(after["error"], GENERIC_FAILURE_MESSAGE);
    assert_eq!(after["profile"]["sub"], TEST_SUBJECT);

    Ok(())
}

#[tokio::test]
async fn test_state_mismatch_skips_token_exchange() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    broker.expect_no_token_requests().await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    view(&client, &server, "/").await?;
    start_authorization(&client, &server, "").await?;

    let target = callback(&client, &server, "code=abc&state=not-the-state").await?;
    assert_eq!(target, "/");

    let after = view(&client, &server, "/").await?;
    assert_eq!(after["error"], GENERIC_FAILURE_MESSAGE);
    assert!(after["profile"].is_null());

    Ok(())
}

#[tokio::test]
async fn test_tampered_id_token_is_rejected() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    // decryption fails before any key is looked up
    broker.mount_valid_jwks(0).await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    view(&client, &server, "/").await?;
    let auth = start_authorization(&client, &server, "").await?;
    broker
        .mount_token_response(flip_ciphertext_bit(&broker_id_token(&auth.nonce)))
        .await;

    callback(&client, &server, &format!("code=abc&state={}", auth.state)).await?;

    let after = view(&client, &server, "/").await?;
    assert_eq!(after["error"], GENERIC_FAILURE_MESSAGE);
    assert!(after["profile"].is_null());

    Ok(())
}

#[tokio::test]
async fn test_id_token_for_other_nonce_is_rejected() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    broker.mount_valid_jwks(1).await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    view(&client, &server, "/").await?;
    let auth = start_authorization(&client, &server, "").await?;
    broker.mount_token_response(broker_id_token("some-other-nonce")).await;

    callback(&client, &server, &format!("code=abc&state={}", auth.state)).await?;

    let after = view(&client, &server, "/").await?;
    assert_eq!(after["error"], GENERIC_FAILURE_MESSAGE);
    assert!(after["profile"].is_null());

    Ok(())
}

#[tokio::test]
async fn test_broker_error_is_shown_once() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    broker.expect_no_token_requests().await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    view(&client, &server, "/").await?;
    let auth = start_authorization(&client, &server, "").await?;

    let query = format!(
        "error=access_denied&error_description=User+denied&state={}",
        auth.state
    );
    callback(&client, &server, &query).await?;

    let first = view(&client, &server, "/").await?;
    assert_eq!(first["error"], "access_denied");
    assert_eq!(first["errorDescription"], "User denied");
    assert_eq!(first["landing"], false);

    let second = view(&client, &server, "/").await?;
    assert!(second["error"].is_null());
    assert_eq!(second["landing"], true);

    Ok(())
}

#[tokio::test]
async fn test_cancel_returns_to_landing() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    broker.expect_no_token_requests().await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    view(&client, &server, "/").await?;
    let auth = start_authorization(&client, &server, "").await?;

    callback(&client, &server, &format!("error=cancel&state={}", auth.state)).await?;

    let after = view(&client, &server, "/").await?;
    assert!(after["error"].is_null());
    assert_eq!(after["landing"], true);

    Ok(())
}

#[tokio::test]
async fn test_token_endpoint_failure() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    broker.mount_valid_jwks(0).await;
    broker.mount_token_error(400).await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    view(&client, &server, "/").await?;
    let auth = start_authorization(&client, &server, "").await?;
    callback(&client, &server, &format!("code=abc&state={}", auth.state)).await?;

    let after = view(&client, &server, "/").await?;
    assert_eq!(after["error"], GENERIC_FAILURE_MESSAGE);
    assert!(after["profile"].is_null());

    Ok(())
}

#[tokio::test]
async fn test_logout_clears_profile() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    broker.mount_valid_jwks(1).await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    view(&client, &server, "/").await?;
    let auth = start_authorization(&client, &server, "").await?;
    broker.mount_token_response(broker_id_token(&auth.nonce)).await;
    callback(&client, &server, &format!("code=abc&state={}", auth.state)).await?;

    let response = client.get(format!("{}/logout", server.url())).send().await?;
    assert_eq!(response.status(), reqwest::StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[reqwest::header::LOCATION], "/");

    let after = view(&client, &server, "/").await?;
    assert!(after["profile"].is_null());
    assert_eq!(after["landing"], true);

    Ok(())
}
