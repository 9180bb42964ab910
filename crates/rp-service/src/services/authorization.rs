//! Authorization request objects and client assertions.
//!
//! Both are RS256 JWS signed with the service provider signing key. The
//! request object is passed to the broker's `/oauth/authorize` as the
//! `request` parameter; the client assertion authenticates the token
//! request (`private_key_jwt`).

use crate::crypto::generate_flow_token;
use crate::crypto::jws;
use crate::crypto::keys::SigningKey;
use crate::errors::RpError;
use common::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::instrument;

pub const AUTHORIZATION_SCOPE: &str = "openid profile personal_identity_code";

/// `ui_locales` when the session has no language.
pub const DEFAULT_UI_LOCALE: &str = "fi";

/// Client assertion lifetime (10 minutes).
pub const CLIENT_ASSERTION_LIFETIME_SECONDS: i64 = 600;

pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Requested assurance level, appended to the scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Weak,
    Strong,
}

impl Purpose {
    /// Parse the `purpose` query value; anything else means no purpose.
    pub fn from_query(value: &str) -> Option<Self> {
        match value {
            "weak" => Some(Purpose::Weak),
            "strong" => Some(Purpose::Strong),
            _ => None,
        }
    }

    fn scope_suffix(self) -> &'static str {
        match self {
            Purpose::Weak => " weak",
            Purpose::Strong => " strong",
        }
    }
}

/// Options chosen by the user on the landing view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationOptions {
    pub language: Option<String>,
    pub prompt_consent: bool,
    pub idp_hint: Option<String>,
    pub purpose: Option<Purpose>,
}

/// One authorization attempt, stored in the session until `/oauth/code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequestContext {
    pub state: String,
    pub nonce: String,
    pub language: Option<String>,
    pub prompt_consent: bool,
    pub idp_hint: Option<String>,
    pub purpose: Option<Purpose>,
}

impl AuthRequestContext {
    /// New context with a random 22 character `state` and `nonce`.
    pub fn new(options: AuthorizationOptions) -> Result<Self, RpError> {
        Ok(Self {
            state: generate_flow_token()?,
            nonce: generate_flow_token()?,
            language: options.language,
            prompt_consent: options.prompt_consent,
            idp_hint: options.idp_hint,
            purpose: options.purpose,
        })
    }
}

/// Inputs of a request object.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationRequest<'a> {
    pub client_id: Option<&'a str>,
    pub broker_host: Option<&'a str>,
    pub redirect_uri: &'a str,
    pub context: &'a AuthRequestContext,
    pub spname: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestObjectClaims {
    pub iss: String,
    pub aud: String,
    pub client_id: String,
    pub response_type: String,
    pub redirect_uri: String,
    pub state: String,
    pub nonce: String,
    pub scope: String,
    pub ui_locales: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftn_spname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftn_idp_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientAssertionClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub jti: String,
    pub exp: i64,
}

/// Service provider name in `language`, falling back to English.
pub fn localized_spname<'a>(
    spname: &'a BTreeMap<String, String>,
    language: Option<&str>,
) -> Option<&'a str> {
    language
        .and_then(|lang| spname.get(lang))
        .or_else(|| spname.get("en"))
        .map(String::as_str)
}

/// Claims of the request object for `request`.
pub fn request_object_claims(
    request: &AuthorizationRequest<'_>,
) -> Result<RequestObjectClaims, RpError> {
    let client_id = required(request.client_id, "CLIENT_ID")?;
    let broker_host = required(request.broker_host, "ISB_HOST")?;
    let context = request.context;

    let mut scope = AUTHORIZATION_SCOPE.to_string();
    if let Some(purpose) = context.purpose {
        scope.push_str(purpose.scope_suffix());
    }

    Ok(RequestObjectClaims {
        iss: client_id.to_string(),
        aud: format!("https://{broker_host}/oauth/authorize"),
        client_id: client_id.to_string(),
        response_type: "code".to_string(),
        redirect_uri: request.redirect_uri.to_string(),
        state: context.state.clone(),
        nonce: context.nonce.clone(),
        scope,
        ui_locales: context
            .language
            .clone()
            .unwrap_or_else(|| DEFAULT_UI_LOCALE.to_string()),
        ftn_spname: localized_spname(request.spname, context.language.as_deref())
            .map(str::to_string),
        prompt: context.prompt_consent.then(|| "consent".to_string()),
        ftn_idp_id: context.idp_hint.clone(),
    })
}

/// Sign the request object for `request`.
///
/// # Errors
///
/// - `Configuration` - client id or broker host missing
/// - `Signing` - signing failed
#[instrument(skip_all)]
pub fn build_request_object(
    request: &AuthorizationRequest<'_>,
    key: &SigningKey,
) -> Result<String, RpError> {
    let claims = request_object_claims(request)?;
    jws::sign(&claims, key, None)
}

/// Broker authorize URL carrying the request object.
pub fn authorization_url(broker_host: &str, request_object: &str) -> String {
    format!("https://{broker_host}/oauth/authorize?request={request_object}")
}

/// Sign a `private_key_jwt` client assertion for the token endpoint.
#[instrument(skip_all)]
pub fn build_client_assertion(
    client_id: &str,
    broker_host: &str,
    key: &SigningKey,
    now: i64,
) -> Result<SecretString, RpError> {
    let claims = ClientAssertionClaims {
        iss: client_id.to_string(),
        sub: client_id.to_string(),
        aud: format!("https://{broker_host}/oauth/token"),
        jti: uuid::Uuid::new_v4().to_string(),
        exp: now + CLIENT_ASSERTION_LIFETIME_SECONDS,
    };

    jws::sign(&claims, key, None).map(SecretString::from)
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, RpError> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| {
        tracing::error!(target: "rp.oauth", setting = name, "Required setting is missing");
        RpError::Configuration(format!("{name} is not configured"))
    })
}
