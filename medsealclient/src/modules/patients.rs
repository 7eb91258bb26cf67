use anyhow::Context;
use serde::Deserialize;

use medseal::client::crypto::{open_raw, seal_for_server};
use medseal::server::envelope::RawEnvelope;

use super::auth::error_from;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct Patient {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub email: String,
    #[serde(default)]
    pub medical_record: String,
}

async fn open_response<T: for<'de> Deserialize<'de>>(what: &str, resp: reqwest::Response) -> anyhow::Result<T> {
    if !resp.status().is_success() {
        return Err(error_from(what, resp).await);
    }
    let sealed: RawEnvelope = resp.json().await.with_context(|| format!("{} response is not an envelope", what))?;
    let plaintext = open_raw(&sealed)?;
    serde_json::from_slice(&plaintext).with_context(|| format!("{} payload is not valid JSON", what))
}

/// Doctor only.
pub async fn list(client: &reqwest::Client, base_url: &str, token: &str) -> anyhow::Result<Vec<Patient>> {
    let resp = client
        .get(format!("{}/api/patients", base_url))
        .bearer_auth(token)
        .send()
        .await?;
    open_response("Patient list", resp).await
}

/// Patient only. The id is sent as an encrypted `{ "id": n }` in the query string.
pub async fn get(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    public_key_pem: &str,
    patient_id: i32,
) -> anyhow::Result<Patient> {
    let envelope = seal_for_server(&serde_json::json!({ "id": patient_id }), public_key_pem)?;
    let resp = client
        .get(format!("{}/api/patients/{}", base_url, patient_id))
        .query(&[
            ("encryptedData", envelope.encrypted_data.as_str()),
            ("encryptedKey", envelope.encrypted_key.as_str()),
            ("iv", envelope.iv.as_str()),
        ])
        .bearer_auth(token)
        .send()
        .await?;
    open_response("Patient lookup", resp).await
}
