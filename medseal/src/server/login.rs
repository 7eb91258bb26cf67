//! End-to-end encrypted login exchange.
//!
//! One request drives one [`LoginState`] sequence from `EnvelopeReceived` to
//! either `Completed` or `LoginFailed`. Every state is reached only from its
//! predecessor, so no token can exist before the password check passed.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Result, ServerError};
use crate::server::cipher::{check_key_material, decode_ciphertext, decode_iv, decrypt_envelope, encrypt_envelope_raw, unwrap_symmetric_key};
use crate::server::context::ServerContext;
use crate::server::envelope::{RawEnvelope, WrappedEnvelope};
use crate::server::password;
use crate::server::token::Role;

/// What the credential store knows about one identity.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub user_id: i64,
    pub identity: String,
    pub password_hash: String,
    pub role: Role,
}

/// Lookup seam to whatever holds user accounts.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` for an unknown identity; `Err` only for store failures.
    async fn find_by_identity(&self, identity: &str) -> Result<Option<StoredCredential>>;
}

#[async_trait]
impl<S: CredentialStore + ?Sized> CredentialStore for Arc<S> {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<StoredCredential>> {
        (**self).find_by_identity(identity).await
    }
}

/// Decrypted login body. Field names are matched in any of the casings
/// clients have been seen to send.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct LoginRequest {
    #[serde(alias = "Email", alias = "EMAIL")]
    email: String,
    #[serde(alias = "Password", alias = "PASSWORD")]
    password: String,
}

impl LoginRequest {
    pub fn email(&self) -> &str {
        &self.email
    }
}

pub enum LoginState {
    EnvelopeReceived(WrappedEnvelope),
    KeyUnwrapped { envelope: WrappedEnvelope, key: Zeroizing<Vec<u8>> },
    LengthsValidated { ciphertext: String, key: Zeroizing<Vec<u8>>, iv: Vec<u8> },
    PayloadDecrypted(Zeroizing<Vec<u8>>),
    PayloadParsed(LoginRequest),
    IdentityResolved { request: LoginRequest, credential: StoredCredential },
    CredentialsValidated(StoredCredential),
    TokenIssued(Zeroizing<String>),
    ResponseEncrypted(RawEnvelope),
    Completed(RawEnvelope),
    LoginFailed(ServerError),
}

impl LoginState {
    pub fn stage(&self) -> &'static str {
        match self {
            LoginState::EnvelopeReceived(_) => "EnvelopeReceived",
            LoginState::KeyUnwrapped { .. } => "KeyUnwrapped",
            LoginState::LengthsValidated { .. } => "LengthsValidated",
            LoginState::PayloadDecrypted(_) => "PayloadDecrypted",
            LoginState::PayloadParsed(_) => "PayloadParsed",
            LoginState::IdentityResolved { .. } => "IdentityResolved",
            LoginState::CredentialsValidated(_) => "CredentialsValidated",
            LoginState::TokenIssued(_) => "TokenIssued",
            LoginState::ResponseEncrypted(_) => "ResponseEncrypted",
            LoginState::Completed(_) => "Completed",
            LoginState::LoginFailed(_) => "LoginFailed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoginState::Completed(_) | LoginState::LoginFailed(_))
    }

    /// Collapse a terminal state into the handler's result.
    pub fn into_result(self) -> Result<RawEnvelope> {
        match self {
            LoginState::Completed(envelope) => Ok(envelope),
            LoginState::LoginFailed(reason) => Err(reason),
            other => {
                tracing::error!("Login result taken from non-terminal stage {}", other.stage());
                Err(ServerError::WorkerFailed)
            }
        }
    }
}

// Key material, passwords and tokens never reach the log.
impl fmt::Debug for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginState::LoginFailed(reason) => f.debug_tuple("LoginFailed").field(reason).finish(),
            other => f.write_str(other.stage()),
        }
    }
}

/// Drives [`LoginState`] for one request at a time; cheap to share.
pub struct LoginOrchestrator<S> {
    context: Arc<ServerContext>,
    store: S,
}

impl<S: CredentialStore> LoginOrchestrator<S> {
    pub fn new(context: Arc<ServerContext>, store: S) -> Self {
        Self { context, store }
    }

    pub async fn run(&self, envelope: WrappedEnvelope) -> LoginState {
        let mut state = LoginState::EnvelopeReceived(envelope);
        while !state.is_terminal() {
            let from = state.stage();
            state = match self.advance(state).await {
                Ok(next) => {
                    tracing::debug!("login: {} -> {}", from, next.stage());
                    next
                }
                Err(reason) => {
                    tracing::warn!("login failed after {}: {}", from, reason);
                    LoginState::LoginFailed(reason)
                }
            };
        }
        state
    }

    async fn advance(&self, state: LoginState) -> Result<LoginState> {
        match state {
            LoginState::EnvelopeReceived(envelope) => {
                let wrapped_key = BASE64
                    .decode(envelope.encrypted_key.trim())
                    .map_err(|_| ServerError::Unwrap)?;
                let key = self
                    .offload(move |ctx| unwrap_symmetric_key(ctx.keys(), &wrapped_key))
                    .await?;
                Ok(LoginState::KeyUnwrapped { envelope, key })
            }
            LoginState::KeyUnwrapped { envelope, key } => {
                let iv = decode_iv(&envelope.iv, key.len())?;
                check_key_material(&key, &iv)?;
                Ok(LoginState::LengthsValidated { ciphertext: envelope.encrypted_data, key, iv })
            }
            LoginState::LengthsValidated { ciphertext, key, iv } => {
                let ciphertext = decode_ciphertext(&ciphertext)?;
                let plaintext = self
                    .offload(move |_| decrypt_envelope(&ciphertext, &key, &iv))
                    .await?;
                Ok(LoginState::PayloadDecrypted(plaintext))
            }
            LoginState::PayloadDecrypted(plaintext) => parse_login_request(&plaintext).map(LoginState::PayloadParsed),
            LoginState::PayloadParsed(request) => {
                match self.store.find_by_identity(request.email()).await? {
                    Some(credential) => Ok(LoginState::IdentityResolved { request, credential }),
                    None => {
                        // Unknown identity looks the same as a wrong password
                        tracing::debug!("No account for presented identity");
                        Err(ServerError::Credential)
                    }
                }
            }
            LoginState::IdentityResolved { request, credential } => {
                let hash = credential.password_hash.clone();
                let matched = self
                    .offload(move |_| password::verify(&request.password, &hash))
                    .await?;
                if !matched {
                    return Err(ServerError::Credential);
                }
                Ok(LoginState::CredentialsValidated(credential))
            }
            LoginState::CredentialsValidated(credential) => {
                let token = self
                    .offload(move |ctx| {
                        ctx.tokens()
                            .issue(&credential.identity, credential.role, credential.user_id)
                            .map(Zeroizing::new)
                    })
                    .await?;
                Ok(LoginState::TokenIssued(token))
            }
            LoginState::TokenIssued(token) => {
                let envelope = self
                    .offload(move |_| Ok(encrypt_envelope_raw(token.as_bytes())))
                    .await?;
                Ok(LoginState::ResponseEncrypted(envelope))
            }
            LoginState::ResponseEncrypted(envelope) => Ok(LoginState::Completed(envelope)),
            terminal @ (LoginState::Completed(_) | LoginState::LoginFailed(_)) => Ok(terminal),
        }
    }

    /// Run CPU-bound crypto on the blocking pool.
    async fn offload<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&ServerContext) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let context = Arc::clone(&self.context);
        tokio::task::spawn_blocking(move || work(&context))
            .await
            .map_err(|e| {
                tracing::error!("Blocking crypto task did not complete: {}", e);
                ServerError::WorkerFailed
            })?
    }
}

fn parse_login_request(plaintext: &[u8]) -> Result<LoginRequest> {
    let request: LoginRequest = serde_json::from_slice(plaintext)
        .map_err(|e| ServerError::MalformedPayload(format!("login body: {}", e)))?;

    if request.email.trim().is_empty() {
        return Err(ServerError::MalformedPayload("email is blank".to_string()));
    }
    if request.password.trim().is_empty() {
        return Err(ServerError::MalformedPayload("password is blank".to_string()));
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_any_field_casing() {
        let lower = parse_login_request(br#"{"email":"a@b.c","password":"pw"}"#).unwrap();
        let pascal = parse_login_request(br#"{"Email":"a@b.c","Password":"pw"}"#).unwrap();
        assert_eq!(lower.email(), pascal.email());
    }

    #[test]
    fn blank_or_missing_fields_are_malformed() {
        for body in [
            &br#"{"email":"  ","password":"pw"}"#[..],
            br#"{"email":"a@b.c","password":""}"#,
            br#"{"email":"a@b.c"}"#,
            b"not json",
            &[0xff, 0xfe, 0x00],
        ] {
            assert!(matches!(parse_login_request(body), Err(ServerError::MalformedPayload(_))));
        }
    }

    #[test]
    fn debug_output_hides_state_contents() {
        let state = LoginState::TokenIssued(Zeroizing::new("header.payload.signature".to_string()));
        assert_eq!(format!("{:?}", state), "TokenIssued");
        assert!(!state.is_terminal());
        assert!(matches!(state.into_result(), Err(ServerError::WorkerFailed)));
    }
}
