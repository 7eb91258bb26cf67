use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};
use crate::server::cipher::encrypt_envelope_raw;

/// How the symmetric key inside an envelope is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    /// Key is RSA-OAEP encrypted to the server (client -> server).
    AsymmetricallyWrapped,
    /// Key is the literal base64 bytes (server -> client).
    Raw,
}

/// Client -> server envelope. All fields are standard base64.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedEnvelope {
    #[serde(rename = "EncryptedData", alias = "encryptedData")]
    pub encrypted_data: String,
    #[serde(rename = "EncryptedKey", alias = "encryptedKey")]
    pub encrypted_key: String,
    #[serde(rename = "IV", alias = "iv", alias = "Iv")]
    pub iv: String,
}

impl WrappedEnvelope {
    pub const fn wrap_mode(&self) -> WrapMode {
        WrapMode::AsymmetricallyWrapped
    }
}

/// Server -> client envelope: ciphertext plus its key and IV in the clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "EncryptedData", alias = "encryptedData")]
    pub encrypted_data: String,
    #[serde(rename = "AESKey", alias = "aesKey")]
    pub aes_key: String,
    #[serde(rename = "IV", alias = "iv", alias = "Iv")]
    pub iv: String,
}

impl RawEnvelope {
    pub const fn wrap_mode(&self) -> WrapMode {
        WrapMode::Raw
    }
}

/// Serialize `value` to JSON and seal it in a raw outbound envelope.
pub fn seal_json<T: Serialize + ?Sized>(value: &T) -> Result<RawEnvelope> {
    let plaintext = serde_json::to_vec(value).map_err(|e| {
        tracing::error!("Failed to serialize response payload: {}", e);
        ServerError::EncryptionFailed
    })?;
    Ok(encrypt_envelope_raw(&plaintext))
}
