//! Minting of short-lived client secrets for browser or CLI realtime sessions.

use crate::client::consts::OPENAI_BETA_HEADER;
use crate::types::Session;
use anyhow::Result;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

pub const CLIENT_SECRETS_URL: &str = "https://api.openai.com/v1/realtime/client_secrets";

/// The upstream answer to a mint request, kept verbatim so callers can pass
/// non-2xx statuses and bodies straight through.
#[derive(Debug, Clone)]
pub struct MintedSecret {
    pub status: StatusCode,
    pub body: Value,
}

impl MintedSecret {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The ephemeral key, wherever the upstream put it.
    pub fn value(&self) -> Option<&str> {
        secret_value(&self.body)
    }
}

/// Extracts the ephemeral key from any of the accepted response shapes:
/// `{value}`, `{client_secret: {value}}` or `{client_secret: "<key>"}`.
pub fn secret_value(body: &Value) -> Option<&str> {
    body.get("value")
        .and_then(Value::as_str)
        .or_else(|| body.pointer("/client_secret/value").and_then(Value::as_str))
        .or_else(|| body.get("client_secret").and_then(Value::as_str))
}

pub async fn mint_client_secret(
    http: &reqwest::Client,
    url: &str,
    api_key: &SecretString,
    session: &Session,
) -> Result<MintedSecret> {
    let response = http
        .post(url)
        .bearer_auth(api_key.expose_secret())
        .header(OPENAI_BETA_HEADER, "realtime=v1")
        .json(&json!({ "session": session }))
        .send()
        .await?;

    let status = response.status();
    let raw = response.text().await?;
    // Upstream errors are not always JSON; wrap raw text so callers still get
    // an error object.
    let body = serde_json::from_str::<Value>(&raw)
        .unwrap_or_else(|_| json!({ "error": { "message": raw } }));

    if !status.is_success() {
        tracing::warn!(%status, "client secret mint rejected upstream");
    }
    Ok(MintedSecret { status, body })
}
