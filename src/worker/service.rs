//! Remote collection service contract.
//!
//! The worker is the only caller. Every method returns the raw reply body so
//! decoding stays at the parsing boundary in [`crate::model::wire`].

use crate::auth::Token;
use crate::model::{ItemIndex, RowIndex, ServiceError, SnapshotId};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

/// Services the worker consumes, one method per endpoint.
pub trait CollectionService {
    /// `GET rows?index&timestamp&windowWidth`
    fn fetch_row(
        &mut self,
        index: RowIndex,
        timestamp: &SnapshotId,
        window_width: u32,
        token: &str,
    ) -> Result<String, ServiceError>;

    /// `GET data?timestamp&start&end`, items in `[start, end)`.
    fn fetch_data(
        &mut self,
        timestamp: &SnapshotId,
        start: ItemIndex,
        end: ItemIndex,
        token: &str,
    ) -> Result<String, ServiceError>;

    /// `GET scrollbar?timestamp`
    fn fetch_scrollbar(&mut self, timestamp: &SnapshotId, token: &str) -> Result<String, ServiceError>;

    /// `POST renew-timestamp-token`, authenticated by the old token.
    fn renew_timestamp_token(&mut self, token: &str) -> Result<String, ServiceError>;

    /// `POST renew-hash-token`, authenticated by the snapshot token.
    fn renew_hash_token(&mut self, expired: &str, bearer: &str) -> Result<String, ServiceError>;

    /// Tag edit; replies with the updated items.
    fn edit_tags(
        &mut self,
        items: &[ItemIndex],
        add: &[String],
        remove: &[String],
        token: &str,
    ) -> Result<String, ServiceError>;

    /// Album edit.
    fn edit_albums(
        &mut self,
        items: &[ItemIndex],
        add: &[String],
        remove: &[String],
        token: &str,
    ) -> Result<(), ServiceError>;

    /// Delete items.
    fn delete_data(&mut self, items: &[ItemIndex], token: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone)]
struct StoredItem {
    width: u32,
    height: u32,
    hash: String,
    taken_at: DateTime<Utc>,
    tags: Vec<String>,
    albums: Vec<String>,
    deleted: bool,
}

/// Call counters, for asserting request de-duplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `fetch_row` calls.
    pub rows: usize,
    /// `fetch_data` calls.
    pub data: usize,
    /// `fetch_scrollbar` calls.
    pub scrollbar: usize,
    /// Renewals of either kind.
    pub renewals: usize,
}

const SIGNATURE: &str = "memory";

/// In-process collection service backed by a vector of item dimensions.
///
/// Tokens are checked like the real service would: they must decode, carry
/// this service's signature, and be unexpired. Snapshot tokens must also name
/// the current snapshot.
#[derive(Debug, Clone)]
pub struct MemoryService {
    snapshot: SnapshotId,
    items: Vec<StoredItem>,
    row_capacity: usize,
    token_ttl: Duration,
    clock: fn() -> DateTime<Utc>,
    fail_renewals: bool,
    counts: CallCounts,
}

impl MemoryService {
    /// Build a service over `(width, height)` pairs, newest first.
    pub fn new(snapshot: SnapshotId, dimensions: &[(u32, u32)], row_capacity: usize) -> Self {
        let newest = Utc
            .with_ymd_and_hms(2024, 12, 31, 12, 0, 0)
            .single()
            .unwrap_or_default();
        let items = dimensions
            .iter()
            .enumerate()
            .map(|(i, &(width, height))| StoredItem {
                width,
                height,
                hash: format!("{:016x}", (i as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
                taken_at: newest - Duration::hours(6 * i as i64),
                tags: Vec::new(),
                albums: Vec::new(),
                deleted: false,
            })
            .collect();
        Self {
            snapshot,
            items,
            row_capacity: row_capacity.max(1),
            token_ttl: Duration::hours(1),
            clock: Utc::now,
            fail_renewals: false,
            counts: CallCounts::default(),
        }
    }

    /// Use a fixed clock for token issue and expiry checks.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Make every renewal fail.
    pub fn with_failing_renewals(mut self) -> Self {
        self.fail_renewals = true;
        self
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> &SnapshotId {
        &self.snapshot
    }

    /// Number of items, including deleted ones.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Call counters so far.
    pub fn counts(&self) -> CallCounts {
        self.counts
    }

    /// Issue a snapshot token, as logging in would.
    pub fn login(&self) -> String {
        self.issue(Some(self.snapshot.as_str()))
    }

    /// Issue a snapshot token that expired a minute ago.
    pub fn expired_login(&self) -> String {
        Token::mint(
            (self.clock)() - Duration::minutes(1),
            Some(self.snapshot.as_str()),
            SIGNATURE,
        )
        .raw()
        .to_string()
    }

    fn issue(&self, timestamp: Option<&str>) -> String {
        Token::mint((self.clock)() + self.token_ttl, timestamp, SIGNATURE)
            .raw()
            .to_string()
    }

    /// Decode a token signed by this service, ignoring expiry.
    fn verify_signature(&self, raw: &str) -> Result<Token, ServiceError> {
        if !raw.ends_with(SIGNATURE) {
            return Err(ServiceError::Unauthorized);
        }
        Token::decode(raw).map_err(|_| ServiceError::Unauthorized)
    }

    fn authorize(&self, raw: &str, timestamp: Option<&SnapshotId>) -> Result<(), ServiceError> {
        let token = self.verify_signature(raw)?;
        if token.is_expired((self.clock)()) {
            return Err(ServiceError::Unauthorized);
        }
        match timestamp {
            Some(ts) if token.timestamp() != Some(ts.as_str()) => Err(ServiceError::Unauthorized),
            _ => Ok(()),
        }
    }

    fn check_snapshot(&self, timestamp: &SnapshotId) -> Result<(), ServiceError> {
        if *timestamp != self.snapshot {
            return Err(ServiceError::Transport(format!(
                "snapshot {} is no longer current",
                timestamp
            )));
        }
        Ok(())
    }

    fn item_json(&self, index: usize) -> serde_json::Value {
        let item = &self.items[index];
        json!({
            "index": index,
            "hash": item.hash,
            "width": item.width,
            "height": item.height,
            "taken_at": item.taken_at,
            "tags": item.tags,
            "albums": item.albums,
            "token": self.issue(None),
        })
    }

    fn stored_mut(&mut self, index: ItemIndex) -> Result<&mut StoredItem, ServiceError> {
        self.items
            .get_mut(index.get())
            .filter(|item| !item.deleted)
            .ok_or_else(|| ServiceError::Transport(format!("item {} not found", index)))
    }
}

fn edit_list(list: &mut Vec<String>, add: &[String], remove: &[String]) {
    list.retain(|entry| !remove.contains(entry));
    for entry in add {
        if !list.contains(entry) {
            list.push(entry.clone());
        }
    }
}

impl CollectionService for MemoryService {
    fn fetch_row(
        &mut self,
        index: RowIndex,
        timestamp: &SnapshotId,
        _window_width: u32,
        token: &str,
    ) -> Result<String, ServiceError> {
        self.counts.rows += 1;
        self.authorize(token, Some(timestamp))?;
        self.check_snapshot(timestamp)?;

        let start = index.get() * self.row_capacity;
        if start >= self.items.len() && !(start == 0 && self.items.is_empty()) {
            return Err(ServiceError::Transport(format!("{} out of range", index)));
        }
        let end = (start + self.row_capacity).min(self.items.len());
        let items: Vec<_> = (start..end)
            .map(|i| json!({"index": i, "width": self.items[i].width, "height": self.items[i].height}))
            .collect();
        Ok(json!({"index": index.get(), "start": start, "end": end, "items": items}).to_string())
    }

    fn fetch_data(
        &mut self,
        timestamp: &SnapshotId,
        start: ItemIndex,
        end: ItemIndex,
        token: &str,
    ) -> Result<String, ServiceError> {
        self.counts.data += 1;
        self.authorize(token, Some(timestamp))?;
        self.check_snapshot(timestamp)?;

        let end = end.get().min(self.items.len());
        let items: Vec<_> = (start.get().min(end)..end)
            .filter(|&i| !self.items[i].deleted)
            .map(|i| self.item_json(i))
            .collect();
        Ok(serde_json::Value::Array(items).to_string())
    }

    fn fetch_scrollbar(&mut self, timestamp: &SnapshotId, token: &str) -> Result<String, ServiceError> {
        self.counts.scrollbar += 1;
        self.authorize(token, Some(timestamp))?;
        self.check_snapshot(timestamp)?;

        let mut markers = Vec::new();
        let mut previous = String::new();
        for (index, item) in self.items.iter().enumerate() {
            let label = item.taken_at.format("%Y-%m").to_string();
            if label != previous {
                markers.push(json!({"index": index, "label": label}));
                previous = label;
            }
        }
        Ok(serde_json::Value::Array(markers).to_string())
    }

    fn renew_timestamp_token(&mut self, token: &str) -> Result<String, ServiceError> {
        self.counts.renewals += 1;
        if self.fail_renewals {
            return Err(ServiceError::Transport("renewal backend unavailable".to_string()));
        }
        let old = self.verify_signature(token)?;
        let renewed = self.issue(old.timestamp());
        Ok(json!({ "token": renewed }).to_string())
    }

    fn renew_hash_token(&mut self, expired: &str, bearer: &str) -> Result<String, ServiceError> {
        self.counts.renewals += 1;
        if self.fail_renewals {
            return Err(ServiceError::Transport("renewal backend unavailable".to_string()));
        }
        self.authorize(bearer, Some(&self.snapshot))?;
        self.verify_signature(expired)?;
        Ok(json!({ "token": self.issue(None) }).to_string())
    }

    fn edit_tags(
        &mut self,
        items: &[ItemIndex],
        add: &[String],
        remove: &[String],
        token: &str,
    ) -> Result<String, ServiceError> {
        self.authorize(token, None)?;
        for &index in items {
            edit_list(&mut self.stored_mut(index)?.tags, add, remove);
        }
        let updated: Vec<_> = items.iter().map(|i| self.item_json(i.get())).collect();
        Ok(serde_json::Value::Array(updated).to_string())
    }

    fn edit_albums(
        &mut self,
        items: &[ItemIndex],
        add: &[String],
        remove: &[String],
        token: &str,
    ) -> Result<(), ServiceError> {
        self.authorize(token, None)?;
        for &index in items {
            edit_list(&mut self.stored_mut(index)?.albums, add, remove);
        }
        Ok(())
    }

    fn delete_data(&mut self, items: &[ItemIndex], token: &str) -> Result<(), ServiceError> {
        self.authorize(token, None)?;
        for &index in items {
            self.stored_mut(index)?.deleted = true;
        }
        Ok(())
    }
}
