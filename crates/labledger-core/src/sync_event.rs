//! Sync events: the cursor-ordered log devices pull from.
//!
//! An event is visible to a reader only if the reader owns it or acted in it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Cursor, Timestamp};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PULL_LIMIT: usize = 100;

/// Hard cap on a single page.
pub const MAX_PULL_LIMIT: usize = 500;

/// Resolve a requested page size: default when absent or zero, capped at
/// [`MAX_PULL_LIMIT`].
pub fn clamp_pull_limit(requested: Option<usize>) -> usize {
    match requested {
        None | Some(0) => DEFAULT_PULL_LIMIT,
        Some(n) => n.min(MAX_PULL_LIMIT),
    }
}

/// A sync event before storage assigns its cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncEvent {
    pub owner_user_id: String,
    pub actor_user_id: Option<String>,
    pub device_id: Option<String>,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: Option<String>,
    pub payload: Value,
}

impl NewSyncEvent {
    pub fn new(
        owner_user_id: impl Into<String>,
        event_type: impl Into<String>,
        aggregate_type: impl Into<String>,
    ) -> Self {
        Self {
            owner_user_id: owner_user_id.into(),
            actor_user_id: None,
            device_id: None,
            event_type: event_type.into(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: None,
            payload: Value::Null,
        }
    }

    pub fn actor(mut self, actor_user_id: impl Into<String>) -> Self {
        self.actor_user_id = Some(actor_user_id.into());
        self
    }

    pub fn device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn aggregate_id(mut self, aggregate_id: impl Into<String>) -> Self {
        self.aggregate_id = Some(aggregate_id.into());
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// A stored sync event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    pub cursor: Cursor,
    pub owner_user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub event_type: String,
    pub aggregate_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_id: Option<String>,
    pub payload: Value,
    pub created_at: Timestamp,
}

impl SyncEvent {
    /// Whether `user_id` may read this event.
    pub fn is_visible_to(&self, user_id: &str) -> bool {
        self.owner_user_id == user_id || self.actor_user_id.as_deref() == Some(user_id)
    }
}

/// One page of a pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPage {
    /// Watermark: the last returned cursor, or the caller's cursor if the
    /// page is empty.
    pub cursor: Cursor,
    pub events: Vec<SyncEvent>,
    pub has_more: bool,
}

impl SyncPage {
    /// Build a page from up to `limit + 1` rows fetched after `after`.
    ///
    /// The extra row only signals that more data exists; it is dropped.
    pub fn from_rows(after: Cursor, mut rows: Vec<SyncEvent>, limit: usize) -> Self {
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let cursor = rows.last().map(|e| e.cursor).unwrap_or(after);
        Self {
            cursor,
            events: rows,
            has_more,
        }
    }

    /// An empty page that makes no progress.
    pub fn empty(after: Cursor) -> Self {
        Self {
            cursor: after,
            events: Vec::new(),
            has_more: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(cursor: i64) -> SyncEvent {
        SyncEvent {
            cursor: Cursor(cursor),
            owner_user_id: "owner".into(),
            actor_user_id: None,
            device_id: None,
            event_type: "entry.created".into(),
            aggregate_type: "experiment".into(),
            aggregate_id: Some("exp-1".into()),
            payload: json!({}),
            created_at: Timestamp::from_micros(0),
        }
    }

    #[test]
    fn test_clamp_pull_limit() {
        assert_eq!(clamp_pull_limit(None), DEFAULT_PULL_LIMIT);
        assert_eq!(clamp_pull_limit(Some(0)), DEFAULT_PULL_LIMIT);
        assert_eq!(clamp_pull_limit(Some(7)), 7);
        assert_eq!(clamp_pull_limit(Some(10_000)), MAX_PULL_LIMIT);
    }

    #[test]
    fn test_page_trims_lookahead_row() {
        let rows = vec![event(4), event(5), event(9)];
        let page = SyncPage::from_rows(Cursor(3), rows, 2);
        assert!(page.has_more);
        assert_eq!(page.events.len(), 2);
        assert_eq!(page.cursor, Cursor(5));
    }

    #[test]
    fn test_exact_page_has_no_more() {
        let page = SyncPage::from_rows(Cursor(0), vec![event(1), event(2)], 2);
        assert!(!page.has_more);
        assert_eq!(page.cursor, Cursor(2));
    }

    #[test]
    fn test_empty_page_keeps_caller_cursor() {
        let page = SyncPage::from_rows(Cursor(17), Vec::new(), 100);
        assert_eq!(page, SyncPage::empty(Cursor(17)));
    }

    #[test]
    fn test_visibility() {
        let mut e = event(1);
        e.actor_user_id = Some("helper".into());
        assert!(e.is_visible_to("owner"));
        assert!(e.is_visible_to("helper"));
        assert!(!e.is_visible_to("stranger"));
    }

    #[test]
    fn test_pull_response_wire_shape() {
        let page = SyncPage::from_rows(Cursor(0), vec![event(1)], 100);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(
            json,
            json!({
                "cursor": 1,
                "hasMore": false,
                "events": [{
                    "cursor": 1,
                    "ownerUserId": "owner",
                    "eventType": "entry.created",
                    "aggregateType": "experiment",
                    "aggregateId": "exp-1",
                    "payload": {},
                    "createdAt": "1970-01-01T00:00:00.000000Z"
                }]
            })
        );
    }
}
