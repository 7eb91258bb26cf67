//! Envelope primitives: RSA-OAEP(SHA-256) key wrapping around AES-256-CBC.
//!
//! Known weakness kept for wire compatibility: CBC carries no MAC, so a
//! tampered ciphertext is only noticed when it happens to break the PKCS#7
//! padding. Anything else decrypts to garbage and is caught (if at all) by
//! the JSON parse that follows.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{Result, ServerError};
use crate::server::envelope::{RawEnvelope, WrappedEnvelope};
use crate::server::keystore::{strip_pem_framing, KeyStore, MIN_MODULUS_BITS};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;

const PUBLIC_KEY_HEADER: &str = "-----BEGIN PUBLIC KEY-----";

/// One-time AES-256 key and CBC IV. Generated per envelope, never reused.
pub struct SessionKey {
    key: Zeroizing<[u8; KEY_LEN]>,
    iv: [u8; IV_LEN],
}

impl SessionKey {
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(key.as_mut());
        OsRng.fill_bytes(&mut iv);
        Self { key, iv }
    }

    pub fn from_parts(key: [u8; KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        Self { key: Zeroizing::new(key), iv }
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }
}

/// RSA-OAEP(SHA-256) encrypt `plaintext` for the holder of `public_key_pem`.
///
/// This is the client side of key wrapping; the server only ever runs the
/// inverse, but both ends share the same checks.
pub fn encrypt_with_public_key(plaintext: &[u8], public_key_pem: &str) -> Result<Vec<u8>> {
    if !public_key_pem.contains(PUBLIC_KEY_HEADER) {
        return Err(ServerError::KeyFormat("expected a PEM public key".to_string()));
    }

    let der = BASE64
        .decode(strip_pem_framing(public_key_pem))
        .map_err(|_| ServerError::KeyFormat("public key is not valid base64".to_string()))?;
    let public_key = RsaPublicKey::from_public_key_der(&der)
        .map_err(|e| ServerError::KeyFormat(format!("public key import failed: {}", e)))?;

    let bits = public_key.n().bits();
    if bits < MIN_MODULUS_BITS {
        return Err(ServerError::WeakKey { bits });
    }

    public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|_| ServerError::EncryptionFailed)
}

/// Recover the client's symmetric key from its RSA-wrapped form.
pub fn unwrap_symmetric_key(keys: &KeyStore, wrapped_key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    keys.decrypt_oaep(wrapped_key)
}

/// Length gate shared by every decryption path; runs before any cipher work.
pub fn check_key_material(key: &[u8], iv: &[u8]) -> Result<()> {
    if key.len() != KEY_LEN || iv.len() != IV_LEN {
        return Err(ServerError::InvalidKeyMaterial { key_len: key.len(), iv_len: iv.len() });
    }
    Ok(())
}

/// AES-256-CBC decrypt and strip PKCS#7 padding.
pub fn decrypt_envelope(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    check_key_material(key, iv)?;

    let decryptor = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|_| ServerError::InvalidKeyMaterial { key_len: key.len(), iv_len: iv.len() })?;
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| ServerError::CipherIntegrity)
}

/// AES-256-CBC encrypt with PKCS#7 padding under a caller-supplied key.
pub fn encrypt_with_session_key(plaintext: &[u8], session: &SessionKey) -> Vec<u8> {
    Aes256CbcEnc::new(session.key().into(), session.iv().into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Encrypt under a fresh key and hand the key back in the clear.
///
/// The returned key and IV travel next to the ciphertext, so this protects
/// nothing beyond what the outer transport already does. Inbound envelopes
/// wrap their key with RSA; outbound ones do not. Changing that would change
/// the wire protocol, so it stays.
pub fn encrypt_envelope_raw(plaintext: &[u8]) -> RawEnvelope {
    let session = SessionKey::generate();
    let ciphertext = encrypt_with_session_key(plaintext, &session);

    RawEnvelope {
        encrypted_data: BASE64.encode(ciphertext),
        aes_key: BASE64.encode(session.key()),
        iv: BASE64.encode(session.iv()),
    }
}

/// Decode, unwrap and decrypt a client envelope in one go.
///
/// Base64 failures are reported as the error of the step the field feeds.
pub fn open_wrapped(keys: &KeyStore, envelope: &WrappedEnvelope) -> Result<Zeroizing<Vec<u8>>> {
    let wrapped_key = BASE64
        .decode(envelope.encrypted_key.trim())
        .map_err(|_| ServerError::Unwrap)?;
    let key = unwrap_symmetric_key(keys, &wrapped_key)?;
    let iv = decode_iv(&envelope.iv, key.len())?;
    check_key_material(&key, &iv)?;
    let ciphertext = decode_ciphertext(&envelope.encrypted_data)?;
    decrypt_envelope(&ciphertext, &key, &iv)
}

pub(crate) fn decode_iv(iv_b64: &str, key_len: usize) -> Result<Vec<u8>> {
    BASE64
        .decode(iv_b64.trim())
        .map_err(|_| ServerError::InvalidKeyMaterial { key_len, iv_len: 0 })
}

pub(crate) fn decode_ciphertext(ciphertext_b64: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(ciphertext_b64.trim())
        .map_err(|_| ServerError::CipherIntegrity)
}
