//! Token manager - per-class lifecycle and renewal coalescing
//!
//! Each class moves through `Absent -> Valid -> Expired -> Valid`. Expiry is
//! checked lazily at acquisition. The first caller that finds a token expired
//! receives a [`RenewCall`] to perform; every later caller gets
//! [`Acquire::Wait`] until [`TokenManager::finish_renewal`] runs, so any number
//! of concurrent callers produce exactly one renew round-trip.
//!
//! A failed renewal leaves the class expired and is reported once. Later
//! acquisitions fail with [`AuthError::ReauthRequired`] instead of renewing
//! again.

use super::store::TokenStore;
use super::token::{Token, TokenClass};
use crate::model::AuthError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Lifecycle state of one token class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// Never installed.
    Absent,
    /// Installed and unexpired.
    Valid,
    /// Expired, renewing, or failed to renew.
    Expired,
}

/// Renew round-trip the caller must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewCall {
    /// `renew-timestamp-token`, authenticated by the old snapshot token.
    Timestamp {
        /// Expired snapshot token.
        token: String,
    },
    /// `renew-hash-token`, authenticated by the snapshot token.
    Hash {
        /// Item hash.
        hash: String,
        /// Expired hash token.
        expired: String,
        /// Current snapshot token.
        bearer: String,
    },
}

impl RenewCall {
    /// Class this call renews.
    pub fn class(&self) -> TokenClass {
        match self {
            RenewCall::Timestamp { .. } => TokenClass::Snapshot,
            RenewCall::Hash { hash, .. } => TokenClass::Hash(hash.clone()),
        }
    }
}

/// Outcome of [`TokenManager::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
    /// Token is current.
    Ready(String),
    /// Caller must perform this renewal and report back.
    Renew(RenewCall),
    /// A renewal for this class is already in flight.
    Wait(TokenClass),
}

#[derive(Debug, Clone)]
struct Entry {
    token: Token,
    expired: bool,
    renewing: bool,
    renew_failed: bool,
}

impl Entry {
    fn fresh(token: Token) -> Self {
        Self {
            token,
            expired: false,
            renewing: false,
            renew_failed: false,
        }
    }
}

/// Token lifecycle for one worker.
#[derive(Debug, Clone, Default)]
pub struct TokenManager {
    store: TokenStore,
    entries: HashMap<TokenClass, Entry>,
}

impl TokenManager {
    /// Create a manager backed by `store`. Call [`restore`](Self::restore) to
    /// load persisted tokens.
    pub fn new(store: TokenStore) -> Self {
        Self {
            store,
            entries: HashMap::new(),
        }
    }

    /// Load persisted tokens, skipping any that fail to decode.
    ///
    /// Returns the number of tokens restored.
    pub fn restore(&mut self) -> usize {
        let mut restored = 0;
        for (class, raw) in self.store.load() {
            match Token::decode(raw) {
                Ok(token) => {
                    self.entries.insert(class, Entry::fresh(token));
                    restored += 1;
                }
                Err(e) => warn!(class = %class, error = %e, "Skipping persisted token"),
            }
        }
        info!(restored, "Restored persisted tokens");
        restored
    }

    /// Install a token obtained outside the renewal path.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Malformed` if the token cannot be decoded.
    pub fn install(&mut self, class: TokenClass, raw: &str) -> Result<(), AuthError> {
        if let Some(entry) = self.entries.get(&class) {
            if entry.token.raw() == raw && !entry.expired {
                return Ok(());
            }
        }
        let token = Token::decode(raw)?;
        self.persist(&class, raw);
        debug!(class = %class, expires_at = %token.expires_at(), "Installed token");
        self.entries.insert(class, Entry::fresh(token));
        Ok(())
    }

    /// Current state of a class at `now`.
    pub fn state(&self, class: &TokenClass, now: DateTime<Utc>) -> TokenState {
        match self.entries.get(class) {
            None => TokenState::Absent,
            Some(e) if e.expired || e.token.is_expired(now) => TokenState::Expired,
            Some(_) => TokenState::Valid,
        }
    }

    /// True while a renewal for `class` is outstanding.
    pub fn is_renewing(&self, class: &TokenClass) -> bool {
        self.entries.get(class).is_some_and(|e| e.renewing)
    }

    /// Obtain a usable token for `class`, or learn what to do instead.
    ///
    /// Hash tokens renew with the snapshot token as bearer. If the snapshot
    /// token itself is expired, the snapshot renewal is returned (or waited
    /// on) first.
    ///
    /// # Errors
    ///
    /// - `AuthError::Absent` if the class was never installed
    /// - `AuthError::ReauthRequired` if an earlier renewal failed
    pub fn acquire(&mut self, class: &TokenClass, now: DateTime<Utc>) -> Result<Acquire, AuthError> {
        let entry = self
            .entries
            .get(class)
            .ok_or_else(|| AuthError::Absent(class.clone()))?;
        if entry.renew_failed {
            return Err(AuthError::ReauthRequired(class.clone()));
        }
        if entry.renewing {
            return Ok(Acquire::Wait(class.clone()));
        }
        if !entry.expired && !entry.token.is_expired(now) {
            return Ok(Acquire::Ready(entry.token.raw().to_string()));
        }
        let expired = entry.token.raw().to_string();

        let call = match class {
            TokenClass::Snapshot => RenewCall::Timestamp { token: expired },
            TokenClass::Hash(hash) => match self.acquire(&TokenClass::Snapshot, now)? {
                Acquire::Ready(bearer) => RenewCall::Hash {
                    hash: hash.clone(),
                    expired,
                    bearer,
                },
                pending => return Ok(pending),
            },
        };

        if let Some(entry) = self.entries.get_mut(class) {
            entry.expired = true;
            entry.renewing = true;
        }
        debug!(class = %class, "Token expired; renewing");
        Ok(Acquire::Renew(call))
    }

    /// Mark a token the service rejected as expired.
    ///
    /// Ignored if `raw` is no longer the current token (it was already renewed).
    /// Returns true when the mark took effect.
    pub fn mark_expired(&mut self, class: &TokenClass, raw: &str) -> bool {
        match self.entries.get_mut(class) {
            Some(entry) if entry.token.raw() == raw && !entry.renewing => {
                entry.expired = true;
                true
            }
            _ => false,
        }
    }

    /// Report the outcome of a renew round-trip.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::RenewFailed` when the renewal failed, or when the
    /// renewed token cannot be decoded. The class stays expired.
    pub fn finish_renewal(
        &mut self,
        class: &TokenClass,
        outcome: Result<String, String>,
    ) -> Result<(), AuthError> {
        let decoded = outcome.and_then(|raw| {
            Token::decode(raw.as_str())
                .map(|token| (raw, token))
                .map_err(|e| e.to_string())
        });

        match decoded {
            Ok((raw, token)) => {
                self.persist(class, &raw);
                info!(class = %class, expires_at = %token.expires_at(), "Token renewed");
                self.entries.insert(class.clone(), Entry::fresh(token));
                Ok(())
            }
            Err(reason) => {
                if let Some(entry) = self.entries.get_mut(class) {
                    entry.renewing = false;
                    entry.renew_failed = true;
                }
                warn!(class = %class, reason = %reason, "Token renewal failed; re-authentication required");
                Err(AuthError::RenewFailed {
                    class: class.clone(),
                    reason,
                })
            }
        }
    }

    /// Forget every token, in memory and in the store.
    pub fn logout(&mut self) {
        self.entries.clear();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear token store");
        }
    }

    /// Backing store.
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    fn persist(&mut self, class: &TokenClass, raw: &str) {
        if let Err(e) = self.store.save(class, raw) {
            warn!(class = %class, error = %e, "Failed to persist token");
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
