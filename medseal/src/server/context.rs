use crate::error::{Result, ServerError};
use crate::secrets::{SecretProvider, PRIVATE_KEY_SECRET_NAME, SIGNING_SECRET_NAME};
use crate::server::keystore::KeyStore;
use crate::server::token::TokenIssuer;

/// Everything a request handler needs from the crypto side.
///
/// Built once at startup and then only read; handlers share it behind an
/// `Arc` (`web::Data` on the server).
pub struct ServerContext {
    keys: KeyStore,
    tokens: TokenIssuer,
}

impl ServerContext {
    pub fn new(keys: KeyStore, tokens: TokenIssuer) -> Result<Self> {
        if !keys.is_loaded() {
            return Err(ServerError::KeyNotLoaded);
        }
        Ok(Self { keys, tokens })
    }

    /// Fetch both startup secrets, load the private key and set up the issuer.
    pub fn bootstrap(
        provider: &dyn SecretProvider,
        issuer: &str,
        audience: &str,
    ) -> std::result::Result<Self, BootstrapError> {
        let signing_secret = provider.fetch(SIGNING_SECRET_NAME)?;
        let private_key = provider.fetch(PRIVATE_KEY_SECRET_NAME)?;

        let tokens = TokenIssuer::new(signing_secret.as_bytes(), issuer, audience)?;
        let keys = KeyStore::new();
        keys.load(&private_key)?;

        tracing::info!("✅ Startup secrets loaded (issuer: {}, audience: {})", issuer, audience);
        Ok(Self::new(keys, tokens)?)
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Secret(#[from] crate::secrets::SecretError),
    #[error(transparent)]
    Crypto(#[from] ServerError),
}
