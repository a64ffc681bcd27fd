//! Local access token checks
//!
//! Access tokens are JWTs minted by the application backend. The signature
//! can only be verified server side, but the structure, validity window and
//! grants are checked here before any network activity so obvious mistakes
//! fail fast with the same codes the backend would report.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;

use crate::error::{ErrorCode, VoiceError};

/// Longest identity the backend accepts
pub const MAX_IDENTITY_LEN: usize = 121;

/// Longest validity window a token may declare, in seconds
pub const MAX_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Deserialize)]
struct Claims {
    iss: Option<String>,
    sub: Option<String>,
    exp: Option<i64>,
    nbf: Option<i64>,
    iat: Option<i64>,
    jti: Option<String>,
    grants: Option<Grants>,
}

#[derive(Debug, Deserialize)]
struct Grants {
    identity: Option<String>,
    voice: Option<VoiceGrantClaims>,
}

#[derive(Debug, Default, Deserialize)]
struct VoiceGrantClaims {
    incoming: Option<IncomingClaims>,
    outgoing: Option<OutgoingClaims>,
    push_credential_sid: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IncomingClaims {
    #[serde(default)]
    allow: bool,
}

#[derive(Debug, Default, Deserialize)]
struct OutgoingClaims {
    application_sid: Option<String>,
}

/// Voice permissions carried by a token
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VoiceGrant {
    pub incoming_allowed: bool,
    pub outgoing_application_sid: Option<String>,
    pub push_credential_sid: Option<String>,
}

/// A structurally valid access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    raw: String,
    pub identity: String,
    pub issuer: String,
    /// Account the token was minted for
    pub subject: String,
    pub token_id: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub not_before: Option<DateTime<Utc>>,
    pub voice: VoiceGrant,
}

impl AccessToken {
    /// Validate a token against the current time
    pub fn parse(raw: &str) -> Result<Self, VoiceError> {
        let raw = raw.trim();
        if raw.split('.').count() != 3 || raw.split('.').any(str::is_empty) {
            return Err(token_error(ErrorCode::AccessTokenInvalid, "expected three dot separated segments"));
        }

        let header = decode_header(raw).map_err(|e| match e.kind() {
            ErrorKind::InvalidToken => token_error(ErrorCode::AccessTokenInvalid, e.to_string()),
            _ => token_error(ErrorCode::AccessTokenHeaderInvalid, e.to_string()),
        })?;

        // The signature is verified by the backend, only the claims are checked here
        let mut validation = Validation::new(header.alg);
        validation.insecure_disable_signature_validation();
        validation.set_required_spec_claims(&["exp"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.leeway = 0;

        let claims = decode::<Claims>(raw, &DecodingKey::from_secret(&[]), &validation)
            .map_err(claims_error)?
            .claims;

        let issuer = non_empty(claims.iss)
            .ok_or_else(|| token_error(ErrorCode::AccessTokenIssuerInvalid, "missing iss"))?;
        let subject = non_empty(claims.sub)
            .ok_or_else(|| token_error(ErrorCode::AccessTokenIssuerInvalid, "missing sub"))?;

        let grants = claims
            .grants
            .ok_or_else(|| token_error(ErrorCode::AccessTokenGrantsInvalid, "missing grants"))?;
        let voice = grants
            .voice
            .ok_or_else(|| token_error(ErrorCode::AccessTokenGrantsInvalid, "missing voice grant"))?;
        let identity = grants.identity.unwrap_or_default();
        validate_identity(&identity)?;

        let exp = claims
            .exp
            .ok_or_else(|| token_error(ErrorCode::AccessTokenExpired, "missing exp"))?;
        let issued = claims.iat.or(claims.nbf).unwrap_or_else(|| Utc::now().timestamp());
        if exp.checked_sub(issued).map_or(true, |ttl| ttl > MAX_TOKEN_TTL_SECS) {
            return Err(token_error(
                ErrorCode::ExpirationTimeExceedsMaxTimeAllowed,
                format!("validity from {} to {} exceeds {}s", issued, exp, MAX_TOKEN_TTL_SECS),
            ));
        }

        Ok(Self {
            raw: raw.to_string(),
            identity,
            issuer,
            subject,
            token_id: claims.jti,
            expires_at: timestamp(exp)?,
            not_before: claims.nbf.map(timestamp).transpose()?,
            voice: VoiceGrant {
                incoming_allowed: voice.incoming.map_or(false, |i| i.allow),
                outgoing_application_sid: voice.outgoing.and_then(|o| o.application_sid),
                push_credential_sid: voice.push_credential_sid,
            },
        })
    }

    /// The token as it was supplied
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Identities are 1 to 121 characters of ASCII letters, digits and underscores
pub fn validate_identity(identity: &str) -> Result<(), VoiceError> {
    if identity.is_empty() {
        return Err(token_error(ErrorCode::AccessTokenGrantsInvalid, "missing identity"));
    }
    if identity.chars().count() > MAX_IDENTITY_LEN {
        return Err(token_error(
            ErrorCode::AccessTokenGrantsInvalid,
            format!("identity longer than {} characters", MAX_IDENTITY_LEN),
        ));
    }
    if let Some(bad) = identity.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(token_error(
            ErrorCode::AccessTokenGrantsInvalid,
            format!("identity contains {:?}", bad),
        ));
    }
    Ok(())
}

fn claims_error(e: JwtError) -> VoiceError {
    let code = match e.kind() {
        ErrorKind::ExpiredSignature | ErrorKind::MissingRequiredClaim(_) => ErrorCode::AccessTokenExpired,
        ErrorKind::ImmatureSignature => ErrorCode::AccessTokenNotYetValid,
        _ => ErrorCode::AccessTokenInvalid,
    };
    token_error(code, e.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, VoiceError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| token_error(ErrorCode::AccessTokenExpired, format!("timestamp {} out of range", secs)))
}

fn token_error(code: ErrorCode, reason: impl Into<String>) -> VoiceError {
    VoiceError::new(code).with_failure_reason(reason)
}
