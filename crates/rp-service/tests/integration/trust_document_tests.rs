//! Signed JWKS and entity statement over HTTP.

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::StatusCode;
use rp_service::crypto::keys::KeyStore;
use rp_test_utils::*;
use serde_json::Value;

fn entity_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_aud = false;
    validation
}

fn origin(server: &TestRpServer) -> String {
    format!("https://{}", server.addr())
}

#[tokio::test]
async fn test_signed_jwks_is_verifiable_with_entity_key() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    let server = TestRpServer::spawn(&broker).await?;

    let response = server
        .client()?
        .get(format!("{}/signed-jwks", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[reqwest::header::CONTENT_TYPE],
        "application/jwk-set+jwt"
    );

    let token = response.text().await?;
    let key = DecodingKey::from_rsa_pem(SP_ENTITY_PUBLIC_KEY_PEM.as_bytes())?;
    let claims = decode::<Value>(&token, &key, &entity_validation())?.claims;

    assert_eq!(claims["iss"], origin(&server));
    assert_eq!(claims["sub"], origin(&server));

    let keys = claims["keys"]
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("keys missing"))?;
    let uses: Vec<_> = keys.iter().map(|k| k["use"].as_str()).collect();
    assert_eq!(uses, vec![Some("sig"), Some("enc")]);
    assert!(keys.iter().all(|k| k.get("d").is_none()));

    Ok(())
}

#[tokio::test]
async fn test_entity_statement_describes_relying_party() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    let server = TestRpServer::spawn(&broker).await?;

    let response = server
        .client()?
        .get(format!("{}/.well-known/openid-federation", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[reqwest::header::CONTENT_TYPE],
        "application/entity-statement+jwt"
    );

    let token = response.text().await?;
    assert_eq!(
        decode_header(&token)?.typ.as_deref(),
        Some("entity-statement+jwt")
    );

    let key = DecodingKey::from_rsa_pem(SP_ENTITY_PUBLIC_KEY_PEM.as_bytes())?;
    let claims = decode::<Value>(&token, &key, &entity_validation())?.claims;

    let rp = &claims["metadata"]["openid_relying_party"];
    assert_eq!(rp["redirect_uris"][0], format!("{}/oauth/code", origin(&server)));
    assert_eq!(rp["signed_jwks_uri"], format!("{}/signed-jwks", origin(&server)));
    assert_eq!(rp["token_endpoint_auth_method"], "private_key_jwt");

    Ok(())
}

#[tokio::test]
async fn test_documents_unavailable_without_keys() -> Result<(), anyhow::Error> {
    let broker = MockBroker::start().await;
    let keys = KeyStore::Unavailable {
        reason: "key directory missing".to_string(),
    };
    let server = TestRpServer::spawn_with(&broker, &[], keys).await?;
    let client = server.client()?;

    for document in ["/signed-jwks", "/.well-known/openid-federation"] {
        let response = client
            .get(format!("{}{document}", server.url()))
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = response.json().await?;
        assert_eq!(body["error"]["code"], "KEY_MATERIAL_ERROR");
        assert!(!body.to_string().contains("key directory missing"));
    }

    Ok(())
}
