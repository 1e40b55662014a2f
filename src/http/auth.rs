//! Join token verification

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha2::Sha256;

use crate::util::time::unix_millis;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by a join token issued by the lobby service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinClaims {
    /// Issuers may sign the id as a string or a number
    #[serde(deserialize_with = "string_or_number")]
    pub employee_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Expiration time (Unix seconds)
    pub exp: u64,
    /// Issued at (Unix seconds)
    #[serde(default)]
    pub iat: u64,
}

impl JoinClaims {
    /// Name shown to other participants
    pub fn display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.employee_id)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Verify an HS256 token and extract its claims
pub fn verify_jwt(token: &str, secret: &str) -> Result<JoinClaims, AuthError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::InvalidToken);
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());

    let provided_signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    mac.verify_slice(&provided_signature)
        .map_err(|_| AuthError::InvalidSignature)?;

    let payload_json = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    let claims: JoinClaims =
        serde_json::from_slice(&payload_json).map_err(|_| AuthError::InvalidToken)?;

    if claims.employee_id.trim().is_empty() {
        return Err(AuthError::MissingIdentity);
    }

    let now = unix_millis() / 1000;
    if claims.exp <= now {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims)
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token carries no employee id")]
    MissingIdentity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn sign(payload: serde_json::Value, secret: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{header}.{payload}").as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{header}.{payload}.{signature}")
    }

    fn future_exp() -> u64 {
        unix_millis() / 1000 + 3600
    }

    #[test]
    fn valid_token_yields_claims() {
        let token = sign(
            json!({"employeeId": "e-17", "displayName": "Ada", "exp": future_exp()}),
            SECRET,
        );
        let claims = tokio_test::assert_ok!(verify_jwt(&token, SECRET));
        assert_eq!(claims.employee_id, "e-17");
        assert_eq!(claims.display_name(), "Ada");
    }

    #[test]
    fn display_name_falls_back_to_employee_id() {
        let token = sign(
            json!({"employeeId": "e-17", "displayName": "  ", "exp": future_exp()}),
            SECRET,
        );
        let claims = verify_jwt(&token, SECRET).unwrap();
        assert_eq!(claims.display_name(), "e-17");
    }

    #[test]
    fn numeric_employee_id_is_accepted() {
        let token = sign(json!({"employeeId": 4711, "exp": future_exp()}), SECRET);
        let claims = tokio_test::assert_ok!(verify_jwt(&token, SECRET));
        assert_eq!(claims.employee_id, "4711");
        assert_eq!(claims.display_name(), "4711");

        let token = sign(json!({"employeeId": [1], "exp": future_exp()}), SECRET);
        assert!(matches!(
            verify_jwt(&token, SECRET),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = sign(json!({"employeeId": "e-17", "exp": future_exp()}), "other");
        assert!(matches!(
            verify_jwt(&token, SECRET),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = sign(json!({"employeeId": "e-17", "exp": 1}), SECRET);
        assert!(matches!(
            verify_jwt(&token, SECRET),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for token in ["", "abc", "a.b", "a.b.c.d", "a.b.c"] {
            assert!(verify_jwt(token, SECRET).is_err(), "accepted {token:?}");
        }

        let token = sign(json!({"employeeId": "", "exp": future_exp()}), SECRET);
        assert!(matches!(
            verify_jwt(&token, SECRET),
            Err(AuthError::MissingIdentity)
        ));
    }
}
