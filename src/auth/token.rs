//! Bearer token decoding
//!
//! Tokens are three dot-separated segments. The middle segment is
//! URL-safe base64 (no padding) JSON carrying the expiry as Unix seconds and,
//! for snapshot tokens, the snapshot timestamp the token is bound to.

use crate::model::AuthError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Credential class a token authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenClass {
    /// Snapshot token: row, data, and scrollbar requests.
    Snapshot,
    /// Per-item token for thumbnail access, keyed by item hash.
    Hash(String),
}

impl TokenClass {
    /// Key under which the token is persisted.
    pub fn storage_key(&self) -> String {
        self.to_string()
    }

    /// Inverse of [`storage_key`](Self::storage_key).
    pub fn parse_key(key: &str) -> Option<Self> {
        match key {
            "snapshot" => Some(TokenClass::Snapshot),
            _ => key
                .strip_prefix("hash:")
                .filter(|hash| !hash.is_empty())
                .map(|hash| TokenClass::Hash(hash.to_string())),
        }
    }
}

impl fmt::Display for TokenClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenClass::Snapshot => write!(f, "snapshot"),
            TokenClass::Hash(hash) => write!(f, "hash:{}", hash),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

/// A decoded bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    raw: String,
    expires_at: DateTime<Utc>,
    timestamp: Option<String>,
}

impl Token {
    /// Decode the claims embedded in a raw token.
    ///
    /// The signature is not verified; the remote service owns that.
    pub fn decode(raw: impl Into<String>) -> Result<Self, AuthError> {
        let raw = raw.into();
        let mut segments = raw.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(AuthError::Malformed("expected three segments".to_string())),
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| AuthError::Malformed(format!("payload is not base64: {}", e)))?;
        let claims: Claims = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::Malformed(format!("payload is not claims JSON: {}", e)))?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::Malformed(format!("expiry {} out of range", claims.exp)))?;

        Ok(Self {
            raw,
            expires_at,
            timestamp: claims.timestamp,
        })
    }

    /// Build a token with the given claims.
    pub fn mint(expires_at: DateTime<Utc>, timestamp: Option<&str>, signature: &str) -> Self {
        let claims = Claims {
            exp: expires_at.timestamp(),
            timestamp: timestamp.map(str::to_string),
        };
        // Serializing a struct of an integer and an optional string cannot fail
        let json = serde_json::to_vec(&claims).unwrap_or_default();
        let raw = format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(json),
            signature
        );
        Self {
            raw,
            expires_at: DateTime::from_timestamp(claims.exp, 0).unwrap_or(expires_at),
            timestamp: claims.timestamp,
        }
    }

    /// Raw token string as sent on the wire.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Embedded expiry.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Snapshot timestamp the token is bound to, if any.
    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    /// True when the expiry is at or before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
