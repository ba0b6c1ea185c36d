//! Database entity models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Category, ItemStatus};

/// One row of the shopping list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroceryItem {
    pub id: i64,
    /// Canonical display name (column `article`).
    pub name: String,
    pub quantity: i64,
    pub category: Category,
    pub status: ItemStatus,
    /// Batch the item entered the list with. Kept after confirmation for
    /// audit; overwritten when a later batch merges into this row.
    pub batch_id: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Short-lived callback session bound to one outbound message.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub message_id: i64,
    /// JSON-encoded `session::SessionState`.
    pub data: String,
    pub expires_at: DateTime<Utc>,
}
