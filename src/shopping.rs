//! Shopping pass over the committed list: category-grouped display and the
//! per-item tap cycle. The navigator holds no state of its own: which
//! category a given chat is looking at lives in that message's session,
//! so every call here is self-contained against the store.

use std::collections::HashMap;
use tracing::instrument;

use crate::db::{self, GroceryItem, Pool};
use crate::error::{Error, Result};
use crate::model::{Category, ItemStatus};

/// Grouped view of the list. `found` items are surfaced separately and
/// never bucketed into `grouped`.
#[derive(Debug, Default)]
pub struct GroupedList {
    /// Categories in case-insensitive label order; items within a category
    /// in creation order, stable across status changes.
    pub grouped: Vec<(Category, Vec<GroceryItem>)>,
    pub found: Vec<GroceryItem>,
}

impl GroupedList {
    pub fn is_empty(&self) -> bool {
        self.grouped.is_empty() && self.found.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.grouped.iter().map(|(_, items)| items.len()).sum()
    }

    pub fn items_in(&self, category: Category) -> &[GroceryItem] {
        self.grouped
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, items)| items.as_slice())
            .unwrap_or(&[])
    }
}

#[instrument(skip_all)]
pub async fn list_by_category(pool: &Pool) -> Result<GroupedList> {
    let active = db::list_active(pool).await?;
    let found = db::list_found(pool).await?;

    let mut buckets: HashMap<Category, Vec<GroceryItem>> = HashMap::new();
    for item in active {
        buckets.entry(item.category).or_default().push(item);
    }
    let mut grouped: Vec<(Category, Vec<GroceryItem>)> = buckets.into_iter().collect();
    grouped.sort_by_key(|(category, _)| category.as_str().to_lowercase());

    Ok(GroupedList { grouped, found })
}

/// Advance an item along the tap cycle: `pending -> selected -> found`,
/// with `not_found` tapping back to `pending`. Tapping a `found` item is a
/// no-op. Returns the resulting status so the caller can re-render just
/// the affected control.
#[instrument(skip_all)]
pub async fn advance_status(pool: &Pool, item_id: i64) -> Result<ItemStatus> {
    let item = db::get_item(pool, item_id).await?.ok_or(Error::NotFound)?;
    let next = match item.status {
        ItemStatus::Pending => ItemStatus::Selected,
        ItemStatus::Selected => ItemStatus::Found,
        ItemStatus::NotFound => ItemStatus::Pending,
        ItemStatus::Found => return Ok(ItemStatus::Found),
        // Confirming items are not part of the shopping pass.
        ItemStatus::Confirming => return Err(Error::NotFound),
    };
    db::update_status(pool, item_id, next).await?;
    Ok(next)
}

/// Mark an item as unavailable in store. Idempotent on `not_found`.
#[instrument(skip_all)]
pub async fn mark_not_found(pool: &Pool, item_id: i64) -> Result<ItemStatus> {
    let item = db::get_item(pool, item_id).await?.ok_or(Error::NotFound)?;
    match item.status {
        ItemStatus::Pending | ItemStatus::Selected => {
            db::update_status(pool, item_id, ItemStatus::NotFound).await?;
            Ok(ItemStatus::NotFound)
        }
        ItemStatus::NotFound => Ok(ItemStatus::NotFound),
        ItemStatus::Found => Ok(ItemStatus::Found),
        ItemStatus::Confirming => Err(Error::NotFound),
    }
}

/// Delete every `found` item. Ends a shopping pass.
#[instrument(skip_all)]
pub async fn clear_found(pool: &Pool) -> Result<u64> {
    db::delete_found(pool).await
}

/// Reset every `selected` item to `pending`: abandon the current pass
/// without losing the list.
#[instrument(skip_all)]
pub async fn clear_selection(pool: &Pool) -> Result<u64> {
    db::reset_selected(pool).await
}
