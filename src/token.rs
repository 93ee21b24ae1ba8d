//! HS256 JSON Web Tokens, signed and checked in-process.
//!
//! Tokens are `base64url(header).base64url(payload).base64url(signature)`
//! with the signature an HMAC-SHA256 over the first two segments. Only the
//! one algorithm is supported and the header is never consulted when
//! verifying.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::{Map, Value, json};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use crate::clock::Clock;

type HmacSha256 = Hmac<Sha256>;

pub type Claims = Map<String, Value>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenError {
    #[error("Invalid token format: expected 3 segments, found {0}")]
    SegmentCount(usize),

    #[error("Invalid token encoding: {0}")]
    Encoding(String),

    #[error("Invalid token payload: {0}")]
    Json(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InvalidReason {
    Malformed(TokenError),
    BadSignature,
    Expired,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::Malformed(err) => write!(f, "{err}"),
            InvalidReason::BadSignature => f.write_str("Invalid signature"),
            InvalidReason::Expired => f.write_str("Token expired"),
        }
    }
}

/// Outcome of [`TokenIssuer::verify`].
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Valid {
        payload: Claims,
    },
    Invalid {
        reason: InvalidReason,
        // only filled in for correctly signed but expired tokens
        payload: Option<Claims>,
        expired_at: Option<DateTime<Utc>>,
    },
}

impl Verification {
    fn invalid(reason: InvalidReason) -> Self {
        Verification::Invalid {
            reason,
            payload: None,
            expired_at: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid { .. })
    }
}

// All three segments decoded, nothing verified
#[derive(Debug, Clone)]
pub struct DecodedToken {
    pub header: Value,
    pub payload: Claims,
    pub signature: String,
}

pub struct TokenIssuer {
    secret: Vec<u8>,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(secret: impl AsRef<[u8]>, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            clock,
        }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size")
    }

    fn signature_for(&self, signing_input: &str) -> String {
        let mut mac = self.mac();
        mac.update(signing_input.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Sign `claims`, adding `iat` (now) and `exp` (now + `ttl_seconds`).
    pub fn sign(&self, mut claims: Claims, ttl_seconds: i64) -> String {
        let now = self.clock.now().timestamp();
        claims.insert("iat".into(), json!(now));
        claims.insert("exp".into(), json!(now + ttl_seconds));

        let header = json!({ "alg": "HS256", "typ": "JWT" });
        let encoded_header = URL_SAFE_NO_PAD.encode(header.to_string());
        let encoded_payload = URL_SAFE_NO_PAD.encode(Value::Object(claims).to_string());

        let signing_input = format!("{encoded_header}.{encoded_payload}");
        let signature = self.signature_for(&signing_input);

        format!("{signing_input}.{signature}")
    }

    /// Check the signature first, then expiry. The payload is only parsed
    /// once the signature matches.
    pub fn verify(&self, token: &str) -> Verification {
        let segments: Vec<&str> = token.split('.').collect();
        let [header, payload, signature] = segments[..] else {
            return Verification::invalid(InvalidReason::Malformed(TokenError::SegmentCount(
                segments.len(),
            )));
        };

        let Ok(signature) = URL_SAFE_NO_PAD.decode(signature) else {
            return Verification::invalid(InvalidReason::BadSignature);
        };
        let mut mac = self.mac();
        mac.update(format!("{header}.{payload}").as_bytes());
        if mac.verify_slice(&signature).is_err() {
            return Verification::invalid(InvalidReason::BadSignature);
        }

        let claims = match decode_claims(payload) {
            Ok(claims) => claims,
            Err(err) => return Verification::invalid(InvalidReason::Malformed(err)),
        };

        let now = self.clock.now().timestamp();
        if let Some(exp) = claims.get("exp").and_then(Value::as_i64) {
            if exp < now {
                return Verification::Invalid {
                    reason: InvalidReason::Expired,
                    payload: Some(claims),
                    expired_at: DateTime::from_timestamp(exp, 0),
                };
            }
        }

        Verification::Valid { payload: claims }
    }

    /// Seconds until `exp`, negative once expired.
    pub fn seconds_remaining(&self, claims: &Claims) -> Option<i64> {
        claims
            .get("exp")
            .and_then(Value::as_i64)
            .map(|exp| exp - self.clock.now().timestamp())
    }
}

/// Payload of `token` WITHOUT checking signature or expiry.
pub fn decode(token: &str) -> Result<Claims, TokenError> {
    decode_parts(token).map(|decoded| decoded.payload)
}

pub fn decode_parts(token: &str) -> Result<DecodedToken, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header, payload, signature] = segments[..] else {
        return Err(TokenError::SegmentCount(segments.len()));
    };

    let header: Value = serde_json::from_slice(&decode_segment(header)?)
        .map_err(|e| TokenError::Json(e.to_string()))?;

    Ok(DecodedToken {
        header,
        payload: decode_claims(payload)?,
        signature: signature.to_string(),
    })
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::Encoding(e.to_string()))
}

fn decode_claims(segment: &str) -> Result<Claims, TokenError> {
    let value: Value = serde_json::from_slice(&decode_segment(segment)?)
        .map_err(|e| TokenError::Json(e.to_string()))?;

    match value {
        Value::Object(claims) => Ok(claims),
        other => Err(TokenError::Json(format!("expected an object, found {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    fn issuer() -> (TokenIssuer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (TokenIssuer::new("test-secret", clock.clone()), clock)
    }

    fn claims() -> Claims {
        let Value::Object(claims) = json!({ "userId": 1, "username": "demo", "role": "admin" })
        else {
            unreachable!()
        };
        claims
    }

    #[test]
    fn fresh_token_verifies_and_round_trips_payload() {
        let (issuer, clock) = issuer();
        let token = issuer.sign(claims(), 900);

        let Verification::Valid { mut payload } = issuer.verify(&token) else {
            panic!("token should be valid");
        };
        let now = clock.now().timestamp();
        assert_eq!(payload.remove("iat"), Some(json!(now)));
        assert_eq!(payload.remove("exp"), Some(json!(now + 900)));
        assert_eq!(payload, claims());
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let (issuer, clock) = issuer();
        let token = issuer.sign(claims(), 60);
        let exp = clock.now().timestamp() + 60;

        clock.advance(Duration::seconds(61));

        match issuer.verify(&token) {
            Verification::Invalid { reason, payload, expired_at } => {
                assert_eq!(reason, InvalidReason::Expired);
                assert_eq!(payload.and_then(|p| p.get("username").cloned()), Some(json!("demo")));
                assert_eq!(expired_at.map(|t| t.timestamp()), Some(exp));
            }
            other => panic!("expected expiry, got {other:?}"),
        }
    }

    #[test]
    fn token_is_still_valid_at_exact_expiry_second() {
        let (issuer, clock) = issuer();
        let token = issuer.sign(claims(), 60);
        clock.advance(Duration::seconds(60));

        assert!(issuer.verify(&token).is_valid());
    }

    #[test]
    fn altering_any_signature_character_fails_verification() {
        let (issuer, _clock) = issuer();
        let token = issuer.sign(claims(), 900);
        let split = token.rfind('.').unwrap() + 1;

        for i in split..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();

            assert_eq!(
                issuer.verify(&tampered),
                Verification::Invalid {
                    reason: InvalidReason::BadSignature,
                    payload: None,
                    expired_at: None,
                },
                "position {i} was not detected"
            );
        }
    }

    #[test]
    fn altered_payload_fails_verification() {
        let (issuer, _clock) = issuer();
        let token = issuer.sign(claims(), 900);
        let parts: Vec<&str> = token.split('.').collect();

        let mut forged = claims();
        forged.insert("role".into(), json!("superuser"));
        let forged_payload = URL_SAFE_NO_PAD.encode(Value::Object(forged).to_string());
        let forged_token = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(!issuer.verify(&forged_token).is_valid());
    }

    #[test]
    fn other_secret_is_rejected() {
        let (issuer, clock) = issuer();
        let other = TokenIssuer::new("different", clock);
        let token = other.sign(claims(), 900);

        assert!(matches!(
            issuer.verify(&token),
            Verification::Invalid { reason: InvalidReason::BadSignature, .. }
        ));
    }

    #[test]
    fn wrong_segment_count_is_malformed() {
        let (issuer, _clock) = issuer();

        assert_eq!(
            issuer.verify("only.two"),
            Verification::Invalid {
                reason: InvalidReason::Malformed(TokenError::SegmentCount(2)),
                payload: None,
                expired_at: None,
            }
        );
        assert_eq!(decode("a.b.c.d").unwrap_err(), TokenError::SegmentCount(4));
    }

    #[test]
    fn decode_skips_all_checks() {
        let (issuer, clock) = issuer();
        let token = issuer.sign(claims(), 1);
        clock.advance(Duration::days(1));

        let mut tampered = token.clone();
        tampered.push('x');

        let payload = decode(&tampered).unwrap();
        assert_eq!(payload.get("username"), Some(&json!("demo")));

        let parts = decode_parts(&token).unwrap();
        assert_eq!(parts.header, json!({ "alg": "HS256", "typ": "JWT" }));
    }

    #[test]
    fn seconds_remaining_counts_down() {
        let (issuer, clock) = issuer();
        let token = issuer.sign(claims(), 900);
        let payload = decode(&token).unwrap();

        clock.advance(Duration::seconds(300));
        assert_eq!(issuer.seconds_remaining(&payload), Some(600));
    }
}
