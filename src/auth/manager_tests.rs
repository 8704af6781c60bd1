//! Tests for TokenManager lifecycle transitions

use super::*;
use chrono::{Duration, TimeZone};

// ===== Test Helpers =====

fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).single().expect("valid time")
}

fn token_expiring_in(secs: i64, sig: &str) -> String {
    Token::mint(now() + Duration::seconds(secs), Some("t1"), sig)
        .raw()
        .to_string()
}

fn hash(h: &str) -> TokenClass {
    TokenClass::Hash(h.to_string())
}

fn manager_with_snapshot(secs: i64) -> (TokenManager, String) {
    let mut manager = TokenManager::default();
    let raw = token_expiring_in(secs, "snap");
    manager.install(TokenClass::Snapshot, &raw).expect("installs");
    (manager, raw)
}

// ===== State Transitions =====

#[test]
fn absent_class_reports_absent() {
    let mut manager = TokenManager::default();
    assert_eq!(manager.state(&TokenClass::Snapshot, now()), TokenState::Absent);
    assert_eq!(
        manager.acquire(&TokenClass::Snapshot, now()),
        Err(AuthError::Absent(TokenClass::Snapshot))
    );
}

#[test]
fn installed_token_is_ready() {
    let (mut manager, raw) = manager_with_snapshot(3600);
    assert_eq!(manager.state(&TokenClass::Snapshot, now()), TokenState::Valid);
    assert_eq!(
        manager.acquire(&TokenClass::Snapshot, now()),
        Ok(Acquire::Ready(raw))
    );
}

#[test]
fn malformed_install_is_rejected() {
    let mut manager = TokenManager::default();
    let result = manager.install(TokenClass::Snapshot, "garbage");
    assert!(matches!(result, Err(AuthError::Malformed(_))));
    assert_eq!(manager.state(&TokenClass::Snapshot, now()), TokenState::Absent);
}

#[test]
fn expiry_is_detected_lazily() {
    let (mut manager, raw) = manager_with_snapshot(60);
    let later = now() + Duration::seconds(120);

    assert_eq!(manager.state(&TokenClass::Snapshot, later), TokenState::Expired);
    assert_eq!(
        manager.acquire(&TokenClass::Snapshot, later),
        Ok(Acquire::Renew(RenewCall::Timestamp { token: raw }))
    );
}

#[test]
fn concurrent_callers_coalesce_into_one_renewal() {
    let (mut manager, _) = manager_with_snapshot(-1);

    let outcomes: Vec<Acquire> = (0..5)
        .map(|_| manager.acquire(&TokenClass::Snapshot, now()).expect("acquire"))
        .collect();

    let renewals = outcomes
        .iter()
        .filter(|a| matches!(a, Acquire::Renew(_)))
        .count();
    assert_eq!(renewals, 1);
    assert!(outcomes[1..]
        .iter()
        .all(|a| *a == Acquire::Wait(TokenClass::Snapshot)));
    assert!(manager.is_renewing(&TokenClass::Snapshot));
}

#[test]
fn successful_renewal_makes_token_ready() {
    let (mut manager, _) = manager_with_snapshot(-1);
    manager.acquire(&TokenClass::Snapshot, now()).expect("acquire");
    let renewed = token_expiring_in(3600, "renewed");

    manager
        .finish_renewal(&TokenClass::Snapshot, Ok(renewed.clone()))
        .expect("renews");

    assert_eq!(
        manager.acquire(&TokenClass::Snapshot, now()),
        Ok(Acquire::Ready(renewed.clone()))
    );
    assert_eq!(manager.store().get(&TokenClass::Snapshot), Some(renewed.as_str()));
}

#[test]
fn failed_renewal_requires_reauthentication() {
    let (mut manager, _) = manager_with_snapshot(-1);
    manager.acquire(&TokenClass::Snapshot, now()).expect("acquire");

    let result = manager.finish_renewal(&TokenClass::Snapshot, Err("backend down".to_string()));

    assert_eq!(
        result,
        Err(AuthError::RenewFailed {
            class: TokenClass::Snapshot,
            reason: "backend down".to_string()
        })
    );
    assert_eq!(manager.state(&TokenClass::Snapshot, now()), TokenState::Expired);
    assert_eq!(
        manager.acquire(&TokenClass::Snapshot, now()),
        Err(AuthError::ReauthRequired(TokenClass::Snapshot))
    );
}

#[test]
fn malformed_renewal_counts_as_failure() {
    let (mut manager, _) = manager_with_snapshot(-1);
    manager.acquire(&TokenClass::Snapshot, now()).expect("acquire");

    let result = manager.finish_renewal(&TokenClass::Snapshot, Ok("nope".to_string()));

    assert!(matches!(result, Err(AuthError::RenewFailed { .. })));
}

#[test]
fn reinstall_after_failure_recovers() {
    let (mut manager, _) = manager_with_snapshot(-1);
    manager.acquire(&TokenClass::Snapshot, now()).expect("acquire");
    let _ = manager.finish_renewal(&TokenClass::Snapshot, Err("down".to_string()));

    let fresh = token_expiring_in(3600, "login");
    manager.install(TokenClass::Snapshot, &fresh).expect("installs");

    assert_eq!(
        manager.acquire(&TokenClass::Snapshot, now()),
        Ok(Acquire::Ready(fresh))
    );
}

#[test]
fn rejected_token_is_marked_expired_once() {
    let (mut manager, raw) = manager_with_snapshot(3600);

    assert!(manager.mark_expired(&TokenClass::Snapshot, &raw));
    assert!(!manager.mark_expired(&TokenClass::Snapshot, "other.token.value"));
    assert!(matches!(
        manager.acquire(&TokenClass::Snapshot, now()),
        Ok(Acquire::Renew(RenewCall::Timestamp { .. }))
    ));
}

// ===== Hash Tokens =====

#[test]
fn hash_renewal_uses_snapshot_bearer() {
    let (mut manager, snapshot) = manager_with_snapshot(3600);
    let expired = token_expiring_in(-1, "h1");
    manager.install(hash("h1"), &expired).expect("installs");

    let result = manager.acquire(&hash("h1"), now());

    assert_eq!(
        result,
        Ok(Acquire::Renew(RenewCall::Hash {
            hash: "h1".to_string(),
            expired,
            bearer: snapshot,
        }))
    );
}

#[test]
fn hash_renewal_waits_for_snapshot_renewal() {
    let (mut manager, snapshot) = manager_with_snapshot(-1);
    manager
        .install(hash("h1"), &token_expiring_in(-1, "h1"))
        .expect("installs");

    let first = manager.acquire(&hash("h1"), now());
    let second = manager.acquire(&hash("h1"), now());

    assert_eq!(
        first,
        Ok(Acquire::Renew(RenewCall::Timestamp { token: snapshot }))
    );
    assert_eq!(second, Ok(Acquire::Wait(TokenClass::Snapshot)));
    assert!(!manager.is_renewing(&hash("h1")));
}

#[test]
fn hash_without_snapshot_is_absent() {
    let mut manager = TokenManager::default();
    manager
        .install(hash("h1"), &token_expiring_in(-1, "h1"))
        .expect("installs");

    assert_eq!(
        manager.acquire(&hash("h1"), now()),
        Err(AuthError::Absent(TokenClass::Snapshot))
    );
}

#[test]
fn renew_call_reports_its_class() {
    let call = RenewCall::Hash {
        hash: "h9".to_string(),
        expired: String::new(),
        bearer: String::new(),
    };
    assert_eq!(call.class(), hash("h9"));
    assert_eq!(
        RenewCall::Timestamp {
            token: String::new()
        }
        .class(),
        TokenClass::Snapshot
    );
}

// ===== Persistence =====

#[test]
fn restore_loads_persisted_tokens() {
    let (manager, raw) = manager_with_snapshot(3600);
    let store = manager.store().clone();

    let mut restored = TokenManager::new(store);
    assert_eq!(restored.restore(), 1);
    assert_eq!(
        restored.acquire(&TokenClass::Snapshot, now()),
        Ok(Acquire::Ready(raw))
    );
}

#[test]
fn logout_forgets_everything() {
    let (mut manager, _) = manager_with_snapshot(3600);
    manager.logout();
    assert_eq!(manager.state(&TokenClass::Snapshot, now()), TokenState::Absent);
    assert!(manager.store().is_empty());
}
