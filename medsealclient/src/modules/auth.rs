use anyhow::{bail, Context};
use serde::Deserialize;

use medseal::client::crypto::{open_raw, seal_for_server};
use medseal::server::envelope::RawEnvelope;

#[derive(Deserialize, Debug)]
pub struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

#[derive(Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub details: Option<String>,
}

/// Turn a non-2xx response into an error carrying the server's message.
pub async fn error_from(what: &str, resp: reqwest::Response) -> anyhow::Error {
    let status = resp.status();
    match resp.json::<ErrorResponse>().await {
        Ok(body) => match body.details {
            Some(details) => anyhow::anyhow!("{} failed ({}): {} [{}]", what, status, body.error, details),
            None => anyhow::anyhow!("{} failed ({}): {}", what, status, body.error),
        },
        Err(_) => anyhow::anyhow!("{} failed: status {}", what, status),
    }
}

pub async fn fetch_public_key(client: &reqwest::Client, base_url: &str) -> anyhow::Result<String> {
    tracing::info!("Requesting server public key...");

    let resp = client
        .get(format!("{}/api/auth/public-key", base_url))
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(error_from("Public key request", resp).await);
    }

    let body: PublicKeyResponse = resp.json().await.context("public key response is not JSON")?;
    if !body.public_key.contains("-----BEGIN PUBLIC KEY-----") {
        bail!("server returned something other than a PEM public key");
    }
    Ok(body.public_key)
}

/// Encrypted login; returns the bearer token.
pub async fn login(
    client: &reqwest::Client,
    base_url: &str,
    public_key_pem: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<String> {
    tracing::info!("Sending encrypted login for {}...", email);

    let envelope = seal_for_server(&serde_json::json!({ "email": email, "password": password }), public_key_pem)?;
    let resp = client
        .post(format!("{}/api/auth/login", base_url))
        .json(&envelope)
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(error_from("Login", resp).await);
    }

    let sealed: RawEnvelope = resp.json().await.context("login response is not an envelope")?;
    let token = open_raw(&sealed)?;
    let token = String::from_utf8(token.to_vec()).context("decrypted token is not UTF-8")?;
    Ok(token)
}
