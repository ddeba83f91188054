//! Bearer credential signing and verification.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::principal::{DirectoryError, Principal, PrincipalDirectory};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing bearer credential")]
    MissingCredential,

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Credential expired")]
    ExpiredCredential,

    #[error("Credential not yet valid")]
    CredentialNotYetValid,

    #[error("Unknown principal: {0}")]
    UnknownPrincipal(String),

    #[error("Server misconfigured: {0}")]
    ServerMisconfigured(String),

    #[error("Principal directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Token signing failed: {0}")]
    Signing(String),
}

impl AuthError {
    /// Stable name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::InvalidCredential(_) => "invalid_credential",
            Self::ExpiredCredential => "expired_credential",
            Self::CredentialNotYetValid => "credential_not_yet_valid",
            Self::UnknownPrincipal(_) => "unknown_principal",
            Self::ServerMisconfigured(_) => "server_misconfigured",
            Self::DirectoryUnavailable(_) => "directory_unavailable",
            Self::Signing(_) => "signing",
        }
    }
}

impl From<DirectoryError> for AuthError {
    fn from(e: DirectoryError) -> Self {
        AuthError::DirectoryUnavailable(e.to_string())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    pub sub: String, // Principal id
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

fn require_secret(secret: Option<&str>) -> Result<&str, AuthError> {
    match secret.map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(AuthError::ServerMisconfigured(
            "signing secret is not provisioned".to_string(),
        )),
    }
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.set_required_spec_claims(&["exp", "sub"]);
    validation
}

/// Extract the token from an `Authorization` header value.
pub fn bearer_token(raw_header: Option<&str>) -> Result<&str, AuthError> {
    let raw = raw_header.ok_or(AuthError::MissingCredential)?.trim();
    let (scheme, token) = raw.split_once(' ').ok_or(AuthError::MissingCredential)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MissingCredential);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    Ok(token)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: i64,
}

/// Signs credentials for authenticated principals.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: Option<&str>, ttl_seconds: u64) -> Result<Self, AuthError> {
        let secret = require_secret(secret)?;
        let ttl = i64::try_from(ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                AuthError::ServerMisconfigured(format!(
                    "token ttl of {}s is out of range",
                    ttl_seconds
                ))
            })?;
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            ttl,
        })
    }

    pub fn issue(&self, principal: &Principal) -> Result<IssuedToken, AuthError> {
        let now = Utc::now();
        let expires_at = now.checked_add_signed(self.ttl).ok_or_else(|| {
            AuthError::ServerMisconfigured("token expiry overflows the calendar".to_string())
        })?;
        let claims = Claims {
            sub: principal.id.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            nbf: Some(now.timestamp()),
            email: Some(principal.email.clone()),
        };
        let token = self.sign(&claims)?;
        Ok(IssuedToken {
            token,
            token_type: "Bearer",
            expires_at: claims.exp,
        })
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

/// Validates bearer credentials and resolves them to a [`Principal`].
///
/// Cannot be constructed without a signing secret, so a deployment missing
/// one fails at startup instead of serving requests.
pub struct IdentityVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    directory: Arc<dyn PrincipalDirectory>,
}

impl IdentityVerifier {
    pub fn new(
        secret: Option<&str>,
        directory: Arc<dyn PrincipalDirectory>,
    ) -> Result<Self, AuthError> {
        let secret = require_secret(secret)?;
        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: validation(),
            directory,
        })
    }

    /// Signature is checked before the time claims, so a forged token is
    /// always `InvalidCredential` regardless of its expiry.
    pub fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredCredential,
                ErrorKind::ImmatureSignature => AuthError::CredentialNotYetValid,
                _ => AuthError::InvalidCredential(e.to_string()),
            })
    }

    pub async fn verify(&self, raw_header: Option<&str>) -> Result<Principal, AuthError> {
        let token = bearer_token(raw_header)?;
        let claims = self.decode_claims(token)?;

        let principal = self
            .directory
            .find_principal_by_id(&claims.sub)
            .await?
            .ok_or_else(|| AuthError::UnknownPrincipal(claims.sub.clone()))?;

        debug!("Credential verified for principal {}", principal.id);
        Ok(principal)
    }
}
