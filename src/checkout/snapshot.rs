use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Item fields copied into an order line at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFields {
    pub item_id: Uuid,
    pub title: String,
    pub description: String,
    pub price: i64,
    pub image: Option<String>,
    pub large_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotLine {
    pub bag_entry_id: Uuid,
    pub item: ItemFields,
    pub quantity: i32,
}

/// Point-in-time view of a user's bag joined with live item prices.
///
/// Taken once per checkout before anything is mutated; the charge, the order
/// lines and the set of entries to clear are all derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BagSnapshot {
    pub user_id: Uuid,
    pub lines: Vec<SnapshotLine>,
    pub taken_at: DateTime<Utc>,
}

impl BagSnapshot {
    pub fn new(user_id: Uuid, lines: Vec<SnapshotLine>, taken_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            lines,
            taken_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
