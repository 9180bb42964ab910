//! Shared steps for the integration tests.

use reqwest::{Client, StatusCode};
use rp_test_utils::*;
use serde_json::Value;

/// A started authorization: what the relying party put in the request object.
pub struct Authorization {
    pub state: String,
    pub nonce: String,
    pub request_object: Value,
}

/// GET /oauth/authorize and read `state`/`nonce` back from the request object.
pub async fn start_authorization(
    client: &Client,
    server: &TestRpServer,
    query: &str,
) -> Result<Authorization, anyhow::Error> {
    let response = client
        .get(format!("{}/oauth/authorize{query}", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let location = response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| anyhow::anyhow!("missing Location"))?;
    let jws = location
        .strip_prefix(&format!("https://{BROKER_HOST}/oauth/authorize?request="))
        .ok_or_else(|| anyhow::anyhow!("unexpected redirect {location}"))?;

    let request_object = decode_jws_payload(jws);
    Ok(Authorization {
        state: request_object["state"].as_str().unwrap_or_default().to_string(),
        nonce: request_object["nonce"].as_str().unwrap_or_default().to_string(),
        request_object,
    })
}

/// Encrypted ID token as the broker would return it for `nonce`.
pub fn broker_id_token(nonce: &str) -> String {
    let signed = sign_id_token(&id_token_claims(TEST_CLIENT_ID, nonce), Some(BROKER_SIGNING_KID));
    encrypt_compact(signed.as_bytes(), SP_ENCRYPTION_PUBLIC_KEY_PEM)
}

/// GET /oauth/code and return the redirect target.
pub async fn callback(
    client: &Client,
    server: &TestRpServer,
    query: &str,
) -> Result<String, anyhow::Error> {
    let response = client
        .get(format!("{}/oauth/code?{query}", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    Ok(response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string())
}

/// GET a view and return its JSON.
pub async fn view(client: &Client, server: &TestRpServer, path: &str) -> Result<Value, anyhow::Error> {
    let response = client.get(format!("{}{path}", server.url())).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(response.json().await?)
}

/// Run one identification to completion and return the hosted view.
pub async fn identify(
    client: &Client,
    server: &TestRpServer,
    broker: &MockBroker,
) -> Result<Value, anyhow::Error> {
    view(client, server, "/").await?;
    let auth = start_authorization(client, server, "").await?;
    broker
        .mount_token_response_once(broker_id_token(&auth.nonce))
        .await;
    callback(client, server, &format!("code=abc&state={}", auth.state)).await?;
    view(client, server, "/").await
}
