use actix_web::http::header::AUTHORIZATION;
use actix_web::HttpRequest;

use medseal::server::token::{Claims, Role, TokenIssuer};
use medseal::{Result, ServerError};

/// Pull the JWT out of `Authorization: Bearer <jwt>`.
pub fn bearer_token(req: &HttpRequest) -> Result<&str> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ServerError::InvalidToken)?;

    let (scheme, token) = header.split_once(' ').ok_or(ServerError::InvalidToken)?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(ServerError::InvalidToken);
    }
    Ok(token.trim())
}

/// Validate the caller's token and require one of `allowed` roles.
pub fn require_role(req: &HttpRequest, tokens: &TokenIssuer, allowed: &[Role]) -> Result<Claims> {
    let token = bearer_token(req)?;
    let claims = tokens.authorize(token, allowed)?;
    tracing::debug!("Authorized {} (user {}) for {}", claims.role, claims.user_id, req.path());
    Ok(claims)
}

/// Like [`require_role`] but a missing header is not an error.
pub fn optional_claims(req: &HttpRequest, tokens: &TokenIssuer) -> Result<Option<Claims>> {
    if req.headers().get(AUTHORIZATION).is_none() {
        return Ok(None);
    }
    tokens.validate(bearer_token(req)?).map(Some)
}
