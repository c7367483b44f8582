//! Unverified access-token claim decoding.
//!
//! Signatures are never checked here; the backend verifies every token it
//! receives. The client only reads `sub` and `exp` to derive the user id
//! and to refresh ahead of expiry.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

use crate::models::UserId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Decode the payload segment of a JWT.
pub fn decode_claims(token: &str) -> Option<Claims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// User id carried in the `sub` claim.
pub fn user_id_from_token(token: &str) -> Option<UserId> {
    decode_claims(token)?
        .sub
        .filter(|sub| !sub.trim().is_empty())
        .map(UserId::new)
}

/// Whether `token` expires within `margin_secs` of `now`.
///
/// Tokens without a readable `exp` claim count as expired.
pub fn is_token_expired(token: &str, now: i64, margin_secs: i64) -> bool {
    decode_claims(token)
        .and_then(|claims| claims.exp)
        .map_or(true, |exp| exp.saturating_sub(now) < margin_secs)
}

/// Seconds since the epoch, the unit of the `exp` claim.
pub fn epoch_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
pub(crate) fn encode_test_token(sub: &str, exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{sub}","exp":{exp}}}"#));
    format!("{header}.{payload}.signature")
}
