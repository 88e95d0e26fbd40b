//! Unverified JWT payload decoding. The backend validates signatures; the
//! client only needs `exp` and the identity claims.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::AuthError;
use crate::model::UserInfo;

/// Identity and expiry claims. Issuers disagree on claim shapes, so each
/// field takes what it can and a claim of the wrong shape reads as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Claims {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub exp: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sub: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub oid: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub preferred_username: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub upn: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub roles: Vec<String>,
    #[serde(default, deserialize_with = "first_string")]
    pub role: Option<String>,
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => vec![s],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    })
}

fn first_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(string_list(d)?.into_iter().next())
}

pub fn decode_claims(token: &str) -> Result<Claims, AuthError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::MalformedToken("missing payload segment".into()))?;
    // Some issuers pad, some don't.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::MalformedToken(e.to_string()))?;
    let value: Value =
        serde_json::from_slice(&bytes).map_err(|e| AuthError::MalformedToken(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| AuthError::MalformedToken(e.to_string()))
}

/// Seconds until expiry, negative once expired. `None` if the token cannot
/// be decoded or carries no `exp`.
pub fn seconds_until_expiry(token: &str, now: i64) -> Option<i64> {
    decode_claims(token).ok()?.exp.map(|exp| exp - now)
}

/// Undecodable tokens count as expired.
pub fn is_expired(token: &str, now: i64) -> bool {
    seconds_until_expiry(token, now).map_or(true, |left| left < 0)
}

pub fn expires_within(token: &str, now: i64, threshold_secs: i64) -> bool {
    seconds_until_expiry(token, now).map_or(true, |left| left <= threshold_secs)
}

impl Claims {
    pub fn user(&self) -> UserInfo {
        let username = self.preferred_username.clone();
        UserInfo {
            id: self
                .sub
                .clone()
                .or_else(|| self.oid.clone())
                .unwrap_or_default(),
            name: self
                .name
                .clone()
                .or_else(|| username.clone())
                .unwrap_or_default(),
            email: self
                .email
                .clone()
                .or(username)
                .or_else(|| self.upn.clone())
                .unwrap_or_default(),
            role: self.roles.first().cloned().or_else(|| self.role.clone()),
        }
    }
}

/// Builds an unsigned token carrying `claims`. Used where a token has to be
/// fabricated locally, e.g. fixtures.
pub fn encode_unsigned(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.", header, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_identity_claims() {
        let token = encode_unsigned(&json!({
            "exp": 2_000,
            "oid": "o-1",
            "preferred_username": "jdoe@corp.example",
            "roles": ["Reviewer", "Author"]
        }));
        let user = decode_claims(&token).unwrap().user();
        assert_eq!(user.id, "o-1");
        assert_eq!(user.name, "jdoe@corp.example");
        assert_eq!(user.email, "jdoe@corp.example");
        assert_eq!(user.role.as_deref(), Some("Reviewer"));
    }

    #[test]
    fn test_sub_and_email_take_precedence() {
        let token = encode_unsigned(&json!({
            "sub": "s-1", "oid": "o-1", "name": "J. Doe",
            "email": "j@corp.example", "role": "Admin"
        }));
        let user = decode_claims(&token).unwrap().user();
        assert_eq!(user.id, "s-1");
        assert_eq!(user.name, "J. Doe");
        assert_eq!(user.email, "j@corp.example");
        assert_eq!(user.role.as_deref(), Some("Admin"));
    }

    #[test]
    fn test_odd_claim_shapes_do_not_reject_token() {
        let token = encode_unsigned(&json!({
            "exp": 1_000.7,
            "sub": 42,
            "name": null,
            "roles": null,
            "role": ["Reviewer", "Author"],
            "email": ["not", "a", "string"]
        }));
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.exp, Some(1_000));
        assert!(claims.roles.is_empty());
        let user = claims.user();
        assert_eq!(user.id, "42");
        assert_eq!(user.name, "");
        assert_eq!(user.email, "");
        assert_eq!(user.role.as_deref(), Some("Reviewer"));

        let token = encode_unsigned(&json!({ "exp": "1000", "roles": "Admin" }));
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.exp, Some(1_000));
        assert_eq!(claims.roles, vec!["Admin".to_string()]);
    }

    #[test]
    fn test_expiry() {
        let token = encode_unsigned(&json!({ "exp": 1_000 }));
        assert!(!is_expired(&token, 999));
        assert!(is_expired(&token, 1_001));
        assert!(expires_within(&token, 800, 300));
        assert!(!expires_within(&token, 600, 300));
    }

    #[test]
    fn test_garbage_is_expired() {
        assert!(is_expired("not-a-jwt", 0));
        assert!(is_expired("a.!!!.c", 0));
        assert!(decode_claims("a.b").is_err());
    }
}
