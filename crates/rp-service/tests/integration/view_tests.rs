//! Hosted and embedded views.

use crate::support::{broker_id_token, callback, start_authorization, view};
use reqwest::StatusCode;
use rp_service::handlers::profile_handler::EMBEDDED_UI_ERROR;
use rp_test_utils::*;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn identification_wall() -> serde_json::Value {
    json!({
        "identityProviders": [
            { "name": "Pankki", "imageUrl": "https://isb.test/img/pankki.png", "ftn_idp_id": "fi-pankki" }
        ],
        "isbProviderInfo": "Tunnistuspalvelu",
        "isbConsent": "Suostumus",
        "privacyNoticeText": "Tietosuojaseloste",
        "privacyNoticeLink": "https://isb.test/privacy",
        "disturbanceInfo": {
            "header": "<b>Huoltokatko</b>",
            "text": "Huolto tänään\r\nPalvelu voi olla hidas"
        }
    })
}

#[tokio::test]
async fn test_embedded_view_shows_identification_wall() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/api/embedded-ui/{TEST_CLIENT_ID}")))
        .and(query_param("lang", "fi"))
        .respond_with(ResponseTemplate::new(200).set_body_string(identification_wall().to_string()))
        .expect(1)
        .mount(broker.server())
        .await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    let page = view(&client, &server, "/embedded?lang=fi").await?;
    assert_eq!(page["embedded"], true);
    assert_eq!(page["landing"], true);
    assert_eq!(page["lang"], "fi");
    assert_eq!(page["returnUrl"], "/embedded");

    let info = &page["embeddedInfo"];
    assert_eq!(info["identityProviders"][0]["ftn_idp_id"], "fi-pankki");
    assert_eq!(info["disturbanceInfo"]["header"], "Huoltokatko");
    assert_eq!(
        info["disturbanceInfo"]["text"],
        "Huolto tänään<br><br>Palvelu voi olla hidas"
    );

    Ok(())
}

#[tokio::test]
async fn test_embedded_view_without_wall_data() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    let page = view(&client, &server, "/embedded").await?;
    assert_eq!(page["error"], EMBEDDED_UI_ERROR);
    assert!(page["errorDescription"].is_null());
    assert!(page.get("embeddedInfo").is_none());

    Ok(())
}

#[tokio::test]
async fn test_embedded_view_rejects_incomplete_wall_data() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    let mut wall = identification_wall();
    wall["isbConsent"] = json!("");
    broker.mount_embedded_ui(TEST_CLIENT_ID, wall).await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    let page = view(&client, &server, "/embedded").await?;
    assert_eq!(page["error"], EMBEDDED_UI_ERROR);

    Ok(())
}

#[tokio::test]
async fn test_embedded_flow_returns_to_embedded_view() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    broker.mount_valid_jwks(1).await;
    broker.mount_embedded_ui(TEST_CLIENT_ID, identification_wall()).await;
    let server = TestRpServer::spawn(&broker).await?;
    let client = server.client()?;

    view(&client, &server, "/embedded").await?;
    let auth = start_authorization(&client, &server, "?idButton=fi-pankki").await?;
    broker.mount_token_response(broker_id_token(&auth.nonce)).await;

    let target = callback(&client, &server, &format!("code=abc&state={}", auth.state)).await?;
    assert_eq!(target, "/embedded");

    let page = view(&client, &server, "/embedded").await?;
    assert_eq!(page["profile"]["sub"], TEST_SUBJECT);
    // identified sessions are not shown the wall
    assert!(page.get("embeddedInfo").is_none());
    assert_eq!(broker.request_count(&format!("/api/embedded-ui/{TEST_CLIENT_ID}")).await, 1);

    Ok(())
}

#[tokio::test]
async fn test_session_cookie_attributes() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    let server = TestRpServer::spawn(&broker).await?;

    let response = reqwest::get(format!("{}/", server.url())).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response.headers()[reqwest::header::SET_COOKIE].to_str()?;
    assert!(cookie.starts_with("rp_session="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(!cookie.contains("Secure"));

    Ok(())
}
