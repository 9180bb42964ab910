//! Identification wall data for the embedded view.
//!
//! The broker serves the identity provider list and consent texts for a
//! client at `/api/embedded-ui/{client_id}?lang=`. The raw body is cleaned
//! before parsing: HTML tags are removed and escaped line-break runs become
//! `<br><br>` so multi-line disturbance notices render as paragraphs.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityProvider {
    pub name: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    pub ftn_idp_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisturbanceInfo {
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EmbeddedUiData {
    #[serde(default)]
    pub identity_providers: Vec<IdentityProvider>,
    pub isb_provider_info: String,
    pub isb_consent: String,
    pub privacy_notice_text: String,
    pub privacy_notice_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disturbance_info: Option<DisturbanceInfo>,
}

impl EmbeddedUiData {
    /// Parse a raw broker response: clean it, deserialize it, then require
    /// every mandatory text to be non-empty.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let cleaned = convert_escaped_line_breaks(&strip_html_tags(raw));
        let data: EmbeddedUiData =
            serde_json::from_str(&cleaned).map_err(|e| format!("Invalid embedded UI data: {e}"))?;
        data.validate()?;
        Ok(data)
    }

    fn validate(&self) -> Result<(), String> {
        let required = [
            ("isbProviderInfo", &self.isb_provider_info),
            ("isbConsent", &self.isb_consent),
            ("privacyNoticeText", &self.privacy_notice_text),
            ("privacyNoticeLink", &self.privacy_notice_link),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(format!("{field} is empty"));
            }
        }

        for provider in &self.identity_providers {
            if provider.name.is_empty()
                || provider.image_url.is_empty()
                || provider.ftn_idp_id.is_empty()
            {
                return Err("identity provider entry is incomplete".to_string());
            }
        }

        Ok(())
    }
}

/// HTML tags, including ones spanning lines.
#[allow(clippy::expect_used)]
static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<.*?>").expect("tag pattern is valid"));

/// Runs of escaped `\r` / `\n` sequences as they appear in the raw JSON body.
#[allow(clippy::expect_used)]
static ESCAPED_LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\\[rn])+").expect("line break pattern is valid"));

/// Remove everything between `<` and the next `>`, inclusive.
///
/// An unterminated `<` is kept as text.
pub fn strip_html_tags(input: &str) -> String {
    TAG_PATTERN.replace_all(input, "").into_owned()
}

/// Replace each run of escaped `\r` / `\n` sequences with `<br><br>`.
pub fn convert_escaped_line_breaks(input: &str) -> String {
    ESCAPED_LINE_BREAKS.replace_all(input, "<br><br>").into_owned()
}
