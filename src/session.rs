//! Per-message callback sessions. Every outbound message with buttons gets
//! a short opaque token whose row holds the message's context as JSON; the
//! buttons carry only the token (plus an index or item id). Expired or
//! deleted tokens make every button on that message a stale action.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::model::Category;

/// Fresh opaque session token: 8 hex chars, 4 bytes of entropy.
pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Where a shopping message currently is. Carried in the session instead of
/// being re-derived from the rendered text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum NavView {
    CategoryList,
    CategoryDetail { category: Category },
}

/// JSON payload of one session row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionState {
    /// A batch-confirmation message. `lines` keeps the raw input line per
    /// item so the cache can learn the variant once the item is confirmed;
    /// `editing` is the item whose quantity/category picker is open.
    Confirm {
        batch_id: String,
        lines: HashMap<i64, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        editing: Option<i64>,
    },
    /// A shopping-list message and its current navigation context.
    Shopping { nav: NavView },
}

impl SessionState {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(data: &str) -> serde_json::Result<SessionState> {
        serde_json::from_str(data)
    }
}
