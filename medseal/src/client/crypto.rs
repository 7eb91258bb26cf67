//! Client half of the envelope protocol.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::Serialize;
use zeroize::Zeroizing;

use crate::error::{Result, ServerError};
use crate::server::cipher::{check_key_material, decode_ciphertext, decrypt_envelope, encrypt_with_public_key, encrypt_with_session_key, SessionKey};
use crate::server::envelope::{RawEnvelope, WrappedEnvelope};

/// Encrypt `plaintext` under a fresh session key wrapped for the server.
pub fn seal_bytes_for_server(plaintext: &[u8], public_key_pem: &str) -> Result<WrappedEnvelope> {
    let session = SessionKey::generate();
    let wrapped_key = encrypt_with_public_key(session.key(), public_key_pem)?;
    let ciphertext = encrypt_with_session_key(plaintext, &session);

    Ok(WrappedEnvelope {
        encrypted_data: BASE64.encode(ciphertext),
        encrypted_key: BASE64.encode(wrapped_key),
        iv: BASE64.encode(session.iv()),
    })
}

/// Serialize `value` as JSON and seal it for the server.
pub fn seal_for_server<T: Serialize + ?Sized>(value: &T, public_key_pem: &str) -> Result<WrappedEnvelope> {
    let plaintext = Zeroizing::new(
        serde_json::to_vec(value).map_err(|e| ServerError::MalformedPayload(e.to_string()))?,
    );
    seal_bytes_for_server(&plaintext, public_key_pem)
}

/// Decrypt an envelope returned by the server (key and IV in the clear).
pub fn open_raw(envelope: &RawEnvelope) -> Result<Zeroizing<Vec<u8>>> {
    let key = Zeroizing::new(
        BASE64
            .decode(envelope.aes_key.trim())
            .map_err(|_| ServerError::InvalidKeyMaterial { key_len: 0, iv_len: 0 })?,
    );
    let iv = BASE64
        .decode(envelope.iv.trim())
        .map_err(|_| ServerError::InvalidKeyMaterial { key_len: key.len(), iv_len: 0 })?;
    check_key_material(&key, &iv)?;

    let ciphertext = decode_ciphertext(&envelope.encrypted_data)?;
    decrypt_envelope(&ciphertext, &key, &iv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::cipher::{encrypt_envelope_raw, open_wrapped};
    use crate::server::keystore::KeyStore;

    fn loaded_keys() -> KeyStore {
        let keys = KeyStore::new();
        let secret = serde_json::json!({ "PKCS": include_str!("../../tests/fixtures/server_key_pkcs8.pem") });
        keys.load(&secret.to_string()).unwrap();
        keys
    }

    #[test]
    fn server_opens_what_the_client_sealed() {
        let keys = loaded_keys();
        let envelope = seal_for_server(&serde_json::json!({ "id": 7 }), keys.public_key_pem().unwrap()).unwrap();
        let plaintext = open_wrapped(&keys, &envelope).unwrap();
        assert_eq!(&plaintext[..], br#"{"id":7}"#);
    }

    #[test]
    fn client_opens_raw_server_envelopes() {
        let envelope = encrypt_envelope_raw(b"eyJhbGciOiJIUzI1NiJ9.e30.sig");
        assert_eq!(&open_raw(&envelope).unwrap()[..], b"eyJhbGciOiJIUzI1NiJ9.e30.sig");
    }

    #[test]
    fn short_raw_key_is_rejected() {
        let mut envelope = encrypt_envelope_raw(b"x");
        envelope.aes_key = BASE64.encode([0u8; 24]);
        assert_eq!(open_raw(&envelope), Err(ServerError::InvalidKeyMaterial { key_len: 24, iv_len: 16 }));
    }
}
