// Continuation-token codec
//
// A token binds one execution to its currently pending step. The wire format
// is base64url (no padding) over a UTF-8 JSON payload. The codec is not a
// signed MAC: replayed or fabricated tokens are rejected downstream by the
// current-step cross-check in the step executor. Keep tokens opaque to
// callers.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token lifetime. Expired tokens are rejected irrespective of store state.
pub const TOKEN_TTL_HOURS: i64 = 24;

/// Errors from token generation and validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// base64url or JSON decode failed
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Required payload fields absent or empty
    #[error("Invalid token payload: {0}")]
    Schema(String),

    /// issued_at is later than now plus the skew tolerance
    #[error("Token issued in the future")]
    FutureIssued,

    /// Token older than the 24h lifetime
    #[error("Token expired: issued more than {TOKEN_TTL_HOURS}h ago")]
    Expired,
}

/// Decoded token payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub execution_id: String,
    pub step_name: String,
    pub issued_at: DateTime<Utc>,
    /// 128-bit random hex nonce; makes every issued token unique
    pub nonce: String,
}

/// Encodes and validates continuation tokens
#[derive(Debug, Clone)]
pub struct TokenCodec {
    ttl: Duration,
    /// Tolerated forward clock skew when checking issued_at (default zero)
    skew: Duration,
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(TOKEN_TTL_HOURS),
            skew: Duration::zero(),
        }
    }
}

impl TokenCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the clock-skew tolerance
    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Issue a token for the given pending step
    pub fn generate(&self, execution_id: &str, step_name: &str) -> Result<String, TokenError> {
        if execution_id.trim().is_empty() {
            return Err(TokenError::Schema("execution_id must be non-empty".into()));
        }
        if step_name.trim().is_empty() {
            return Err(TokenError::Schema("step_name must be non-empty".into()));
        }

        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);

        let payload = TokenPayload {
            execution_id: execution_id.to_string(),
            step_name: step_name.to_string(),
            issued_at: Utc::now(),
            nonce: hex::encode(nonce),
        };

        Ok(Self::encode(&payload))
    }

    /// Encode a payload without validation. Public so tests can fabricate
    /// tokens with arbitrary issued_at values.
    pub fn encode(payload: &TokenPayload) -> String {
        // TokenPayload serialization cannot fail: all fields are strings/timestamps
        let json = serde_json::to_vec(payload).expect("token payload serializes");
        BASE64URL.encode(json)
    }

    /// Decode and validate a token against the current clock
    pub fn validate(&self, token: &str) -> Result<TokenPayload, TokenError> {
        self.validate_at(token, Utc::now())
    }

    /// Decode a token's payload without the age checks. Callers use this to
    /// learn which execution a token refers to; it is never a substitute for
    /// `validate`, which every advance goes through.
    pub fn peek(&self, token: &str) -> Result<TokenPayload, TokenError> {
        Self::decode(token)
    }

    /// Decode and validate against an explicit clock
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenPayload, TokenError> {
        let payload = Self::decode(token)?;

        if payload.issued_at > now + self.skew {
            return Err(TokenError::FutureIssued);
        }
        if now - payload.issued_at > self.ttl {
            return Err(TokenError::Expired);
        }

        Ok(payload)
    }

    /// Shared decode and shape checks
    fn decode(token: &str) -> Result<TokenPayload, TokenError> {
        let bytes = BASE64URL
            .decode(token.trim())
            .map_err(|e| TokenError::Malformed(format!("base64 decode failed: {}", e)))?;

        let payload: TokenPayload = serde_json::from_slice(&bytes)
            .map_err(|e| TokenError::Malformed(format!("JSON decode failed: {}", e)))?;

        if payload.execution_id.trim().is_empty() {
            return Err(TokenError::Schema("execution_id is empty".into()));
        }
        if payload.step_name.trim().is_empty() {
            return Err(TokenError::Schema("step_name is empty".into()));
        }
        if payload.nonce.trim().is_empty() {
            return Err(TokenError::Schema("nonce is empty".into()));
        }

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_then_validate_round_trips() {
        let codec = TokenCodec::new();
        let token = codec.generate("exec-1", "plan").unwrap();
        let payload = codec.validate(&token).unwrap();
        assert_eq!(payload.execution_id, "exec-1");
        assert_eq!(payload.step_name, "plan");
        assert_eq!(payload.nonce.len(), 32); // 16 bytes hex-encoded
    }

    #[test]
    fn tokens_are_unique_per_issue() {
        let codec = TokenCodec::new();
        let a = codec.generate("exec-1", "plan").unwrap();
        let b = codec.generate("exec-1", "plan").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn generate_rejects_empty_inputs() {
        let codec = TokenCodec::new();
        assert!(matches!(
            codec.generate("", "plan"),
            Err(TokenError::Schema(_))
        ));
        assert!(matches!(
            codec.generate("exec-1", "  "),
            Err(TokenError::Schema(_))
        ));
    }

    #[test]
    fn malformed_base64_is_rejected() {
        let codec = TokenCodec::new();
        assert!(matches!(
            codec.validate("!!not-base64url!!"),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn non_json_payload_is_rejected() {
        let codec = TokenCodec::new();
        let token = BASE64URL.encode(b"plain text");
        assert!(matches!(
            codec.validate(&token),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn empty_fields_are_a_schema_error() {
        let codec = TokenCodec::new();
        let payload = TokenPayload {
            execution_id: "".to_string(),
            step_name: "plan".to_string(),
            issued_at: Utc::now(),
            nonce: "ab".to_string(),
        };
        let token = TokenCodec::encode(&payload);
        assert!(matches!(codec.validate(&token), Err(TokenError::Schema(_))));
    }

    #[test]
    fn token_older_than_ttl_is_expired() {
        let codec = TokenCodec::new();
        let payload = TokenPayload {
            execution_id: "exec-2".to_string(),
            step_name: "plan".to_string(),
            issued_at: Utc::now() - Duration::hours(25),
            nonce: "00ff".to_string(),
        };
        let token = TokenCodec::encode(&payload);
        assert_eq!(codec.validate(&token), Err(TokenError::Expired));
    }

    #[test]
    fn token_just_inside_ttl_is_accepted() {
        let codec = TokenCodec::new();
        let issued = Utc::now();
        let payload = TokenPayload {
            execution_id: "exec-2".to_string(),
            step_name: "plan".to_string(),
            issued_at: issued,
            nonce: "00ff".to_string(),
        };
        let token = TokenCodec::encode(&payload);
        let almost_expired = issued + Duration::hours(TOKEN_TTL_HOURS) - Duration::seconds(1);
        assert!(codec.validate_at(&token, almost_expired).is_ok());
    }

    #[test]
    fn future_issued_token_is_rejected_without_skew() {
        let codec = TokenCodec::new();
        let payload = TokenPayload {
            execution_id: "exec-3".to_string(),
            step_name: "plan".to_string(),
            issued_at: Utc::now() + Duration::minutes(5),
            nonce: "00ff".to_string(),
        };
        let token = TokenCodec::encode(&payload);
        assert_eq!(codec.validate(&token), Err(TokenError::FutureIssued));

        let lenient = TokenCodec::new().with_skew(Duration::minutes(10));
        assert!(lenient.validate(&token).is_ok());
    }

    #[test]
    fn wire_format_is_urlsafe_without_padding() {
        let codec = TokenCodec::new();
        let token = codec.generate("exec-1", "plan").unwrap();
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
        assert!(token.len() <= 256);
    }
}
