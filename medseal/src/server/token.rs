use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use jsonwebtoken::{decode, encode, get_current_timestamp, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// Fixed token lifetime: 2 hours.
pub const TOKEN_LIFETIME_SECS: u64 = 2 * 60 * 60;

/// Clock skew tolerated when validating `exp`.
const VALIDATION_LEEWAY_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Doctor,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Doctor => "Doctor",
            Role::Patient => "Patient",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Admin" => Ok(Role::Admin),
            "Doctor" => Ok(Role::Doctor),
            "Patient" => Ok(Role::Patient),
            other => Err(ServerError::MalformedPayload(format!("unknown role '{}'", other))),
        }
    }
}

/// JWT claims carried by an identity token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,            // identity (email)
    pub role: Role,
    #[serde(rename = "UserId")]
    pub user_id: String,        // string-encoded integer
    pub iss: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
}

impl Claims {
    pub fn user_id(&self) -> Option<i64> {
        self.user_id.parse().ok()
    }
}

/// Signs and verifies HS256 identity tokens.
///
/// Verification is stateless: there is no session table and no revocation.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    issued: AtomicUsize,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], issuer: impl Into<String>, audience: impl Into<String>) -> Result<Self> {
        if secret.iter().all(u8::is_ascii_whitespace) {
            return Err(ServerError::SigningKeyMissing);
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            audience: audience.into(),
            issued: AtomicUsize::new(0),
        })
    }

    pub fn issue(&self, identity: &str, role: Role, user_id: i64) -> Result<String> {
        self.issue_at(identity, role, user_id, get_current_timestamp())
    }

    /// Same as [`TokenIssuer::issue`] with an explicit issuance time (unix seconds).
    pub fn issue_at(&self, identity: &str, role: Role, user_id: i64, now: u64) -> Result<String> {
        let claims = Claims {
            sub: identity.to_string(),
            role,
            user_id: user_id.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!("JWT encoding failed: {:?}", e);
            ServerError::TokenSigning
        })?;

        self.issued.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Issued {} token for user {}", role, user_id);
        Ok(token)
    }

    /// Check signature, expiry, issuer and audience; return the claims.
    pub fn validate(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = VALIDATION_LEEWAY_SECS;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Token validation failed: {:?}", e);
                ServerError::InvalidToken
            })
    }

    /// Validate and additionally require one of `allowed` roles.
    pub fn authorize(&self, token: &str, allowed: &[Role]) -> Result<Claims> {
        let claims = self.validate(token)?;
        if !allowed.contains(&claims.role) {
            return Err(ServerError::Forbidden);
        }
        Ok(claims)
    }

    /// Number of tokens signed by this issuer since construction.
    pub fn issued_count(&self) -> usize {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }
}
