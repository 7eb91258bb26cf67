use std::collections::HashMap;
use std::sync::OnceLock;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{Result, ServerError};

/// Field of the secret JSON object that carries the PEM text.
pub const PRIVATE_KEY_FIELD: &str = "PKCS";

pub const MIN_MODULUS_BITS: usize = 2048;

const PEM_LINE_WIDTH: usize = 64;

struct LoadedKey {
    private_key: RsaPrivateKey,
    public_key_pem: String,
    modulus_bits: usize,
}

/// Holds the server's RSA keypair.
///
/// Starts empty, gets exactly one `load`, and is read-only from then on.
/// Reads go through a `OnceLock` so concurrent handlers never take a lock.
#[derive(Default)]
pub struct KeyStore {
    loaded: OnceLock<LoadedKey>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Import the private key from the secret provider's JSON object.
    ///
    /// PKCS#1 is used when the PEM text says `RSA PRIVATE KEY`, PKCS#8 otherwise.
    pub fn load(&self, secret_material: &str) -> Result<()> {
        if self.loaded.get().is_some() {
            return Err(ServerError::AlreadyLoaded);
        }

        let fields: HashMap<String, String> = serde_json::from_str(secret_material)
            .map_err(|e| ServerError::KeyFormat(format!("secret is not a JSON object of strings: {}", e)))?;
        let pem = fields
            .get(PRIVATE_KEY_FIELD)
            .ok_or_else(|| ServerError::KeyFormat(format!("field '{}' not found in secret", PRIVATE_KEY_FIELD)))?
            .trim();

        if pem.is_empty() {
            return Err(ServerError::KeyFormat("private key is empty".to_string()));
        }

        let der = Zeroizing::new(
            BASE64
                .decode(strip_pem_framing(pem))
                .map_err(|e| ServerError::KeyFormat(format!("invalid base64 in private key: {}", e)))?,
        );

        let private_key = if pem.contains("RSA PRIVATE KEY") {
            RsaPrivateKey::from_pkcs1_der(&der)
                .map_err(|e| ServerError::KeyFormat(format!("PKCS#1 import failed: {}", e)))?
        } else {
            RsaPrivateKey::from_pkcs8_der(&der)
                .map_err(|e| ServerError::KeyFormat(format!("PKCS#8 import failed: {}", e)))?
        };

        let modulus_bits = private_key.n().bits();
        if modulus_bits < MIN_MODULUS_BITS {
            return Err(ServerError::WeakKey { bits: modulus_bits });
        }

        let public_key_pem = encode_public_key_pem(&private_key)?;

        self.loaded
            .set(LoadedKey { private_key, public_key_pem, modulus_bits })
            .map_err(|_| ServerError::AlreadyLoaded)?;

        tracing::info!("🔐 RSA private key loaded ({} bits)", modulus_bits);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// SubjectPublicKeyInfo PEM, 64 characters per body line, trailing newline.
    pub fn public_key_pem(&self) -> Result<&str> {
        Ok(self.key()?.public_key_pem.as_str())
    }

    pub fn modulus_bits(&self) -> Result<usize> {
        Ok(self.key()?.modulus_bits)
    }

    /// RSA-OAEP(SHA-256) decrypt with the loaded private key.
    pub(crate) fn decrypt_oaep(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let key = self.key()?;
        key.private_key
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| ServerError::Unwrap)
    }

    fn key(&self) -> Result<&LoadedKey> {
        self.loaded.get().ok_or(ServerError::KeyNotLoaded)
    }
}

/// Drop every `-----BEGIN ...-----` / `-----END ...-----` marker wherever it
/// sits (secret stores often flatten a PEM onto one line) and all whitespace,
/// leaving the bare base64 body.
pub(crate) fn strip_pem_framing(pem: &str) -> String {
    const DASHES: &str = "-----";

    let mut body = String::with_capacity(pem.len());
    let mut rest = pem;
    while let Some(start) = rest.find(DASHES) {
        body.push_str(&rest[..start]);
        let label = &rest[start + DASHES.len()..];
        rest = match label.find(DASHES) {
            Some(end) => &label[end + DASHES.len()..],
            None => "",
        };
    }
    body.push_str(rest);
    body.retain(|c| !c.is_whitespace());
    body
}

fn encode_public_key_pem(private_key: &RsaPrivateKey) -> Result<String> {
    let der = private_key
        .to_public_key()
        .to_public_key_der()
        .map_err(|e| ServerError::KeyFormat(format!("public key export failed: {}", e)))?;
    let body: Vec<char> = BASE64.encode(der.as_bytes()).chars().collect();

    let mut pem = String::with_capacity(body.len() + body.len() / PEM_LINE_WIDTH + 64);
    pem.push_str("-----BEGIN PUBLIC KEY-----\n");
    for line in body.chunks(PEM_LINE_WIDTH) {
        pem.extend(line);
        pem.push('\n');
    }
    pem.push_str("-----END PUBLIC KEY-----\n");
    Ok(pem)
}
