use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Every failure the key store, envelope cipher and login exchange can report.
///
/// The `Display` text is diagnostic detail; what a client gets to see is
/// [`ServerError::public_message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    #[error("Invalid key format: {0}")]
    KeyFormat(String),
    #[error("Private key not loaded")]
    KeyNotLoaded,
    #[error("Private key already loaded")]
    AlreadyLoaded,
    #[error("RSA modulus too small: {bits} bits (minimum 2048)")]
    WeakKey { bits: usize },
    #[error("RSA unwrap of the symmetric key failed")]
    Unwrap,
    #[error("Invalid key material: key is {key_len} bytes (expected 32), IV is {iv_len} bytes (expected 16)")]
    InvalidKeyMaterial { key_len: usize, iv_len: usize },
    #[error("Ciphertext failed padding check")]
    CipherIntegrity,
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Invalid credentials")]
    Credential,
    #[error("Token signing secret is missing")]
    SigningKeyMissing,
    #[error("Stored password hash is malformed")]
    HashFormat,
    #[error("Encryption operation failed")]
    EncryptionFailed,
    #[error("Token signing failed")]
    TokenSigning,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Role not permitted for this resource")]
    Forbidden,
    #[error("Credential store error: {0}")]
    Store(String),
    #[error("Blocking worker failed")]
    WorkerFailed,
}

impl ServerError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::WeakKey { .. } |
            ServerError::Unwrap |
            ServerError::InvalidKeyMaterial { .. } |
            ServerError::CipherIntegrity |
            ServerError::MalformedPayload(_) => 400, // Bad Request
            ServerError::Credential |
            ServerError::InvalidToken => 401, // Unauthorized
            ServerError::Forbidden => 403,
            ServerError::KeyFormat(_) |
            ServerError::KeyNotLoaded |
            ServerError::AlreadyLoaded |
            ServerError::SigningKeyMissing |
            ServerError::HashFormat |
            ServerError::EncryptionFailed |
            ServerError::TokenSigning |
            ServerError::Store(_) |
            ServerError::WorkerFailed => 500, // Internal Server Error
        }
    }

    /// Generic text safe to hand to an unauthenticated client.
    ///
    /// `Credential` covers both an unknown identity and a wrong password.
    pub fn public_message(&self) -> &'static str {
        match self {
            ServerError::Credential => "Invalid credentials",
            ServerError::InvalidToken => "Invalid or expired token",
            ServerError::Forbidden => "Access denied",
            ServerError::MalformedPayload(_) => "Invalid request data format",
            ServerError::WeakKey { .. } |
            ServerError::Unwrap |
            ServerError::InvalidKeyMaterial { .. } |
            ServerError::CipherIntegrity => "Unable to decrypt request",
            _ => "Internal server error",
        }
    }

    /// Errors which must stop the process from serving rather than be
    /// answered per request.
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            ServerError::KeyFormat(_)
                | ServerError::KeyNotLoaded
                | ServerError::AlreadyLoaded
                | ServerError::WeakKey { .. }
                | ServerError::SigningKeyMissing
        )
    }

    /// Log the error with appropriate security context
    pub fn log_security_event(&self) {
        match self {
            ServerError::Unwrap => {
                tracing::warn!("Key unwrap failed - client used a stale public key or sent garbage");
            }
            ServerError::CipherIntegrity => {
                tracing::warn!("Padding check failed - possible ciphertext tampering or wrong key/IV");
            }
            ServerError::InvalidKeyMaterial { key_len, iv_len } => {
                tracing::warn!("Rejected key material (key {} bytes, iv {} bytes)", key_len, iv_len);
            }
            ServerError::Credential => {
                tracing::info!("Login rejected: invalid credentials");
            }
            ServerError::InvalidToken => {
                tracing::debug!("Bearer token rejected");
            }
            ServerError::Forbidden => {
                tracing::warn!("Authenticated caller attempted a resource outside its role");
            }
            ServerError::HashFormat | ServerError::Store(_) | ServerError::WorkerFailed => {
                tracing::error!("{}", self);
            }
            _ => {
                tracing::debug!("Crypto error: {}", self);
            }
        }
    }
}
