//! Startup secret sources.
//!
//! Two secrets are fetched exactly once before the server accepts traffic:
//! the token signing secret and the JSON object carrying the RSA private key.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use zeroize::Zeroizing;

/// Name of the HS256 signing secret.
pub const SIGNING_SECRET_NAME: &str = "SCP";
/// Name of the private key secret (JSON object, key PEM under `PKCS`).
pub const PRIVATE_KEY_SECRET_NAME: &str = "PKCS_SECRET_KEY";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret '{0}' not found or empty")]
    Missing(String),
    #[error("secret '{name}' unreadable: {reason}")]
    Unreadable { name: String, reason: String },
}

pub trait SecretProvider: Send + Sync {
    fn fetch(&self, name: &str) -> Result<Zeroizing<String>, SecretError>;
}

/// Reads `<prefix><name>` from the process environment.
#[derive(Debug, Clone)]
pub struct EnvSecretProvider {
    prefix: String,
}

impl EnvSecretProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl SecretProvider for EnvSecretProvider {
    fn fetch(&self, name: &str) -> Result<Zeroizing<String>, SecretError> {
        let var = format!("{}{}", self.prefix, name);
        match std::env::var(&var) {
            Ok(value) if !value.trim().is_empty() => Ok(Zeroizing::new(value)),
            Ok(_) | Err(std::env::VarError::NotPresent) => Err(SecretError::Missing(var)),
            Err(e) => Err(SecretError::Unreadable { name: var, reason: e.to_string() }),
        }
    }
}

/// Reads `<dir>/<name>`, one file per secret (docker/k8s secret mounts).
#[derive(Debug, Clone)]
pub struct FileSecretProvider {
    dir: PathBuf,
}

impl FileSecretProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SecretProvider for FileSecretProvider {
    fn fetch(&self, name: &str) -> Result<Zeroizing<String>, SecretError> {
        let path = self.dir.join(name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => Zeroizing::new(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SecretError::Missing(path.display().to_string()));
            }
            Err(e) => {
                return Err(SecretError::Unreadable { name: path.display().to_string(), reason: e.to_string() });
            }
        };

        let trimmed = content.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty() {
            return Err(SecretError::Missing(path.display().to_string()));
        }
        Ok(Zeroizing::new(trimmed.to_string()))
    }
}
