//! Batch lifecycle: a set of items parsed from one submission enters the
//! store as `confirming` rows sharing a batch id, then each row is either
//! confirmed into the shopping list (merging with an existing item of the
//! same name when there is one) or deleted by cancellation. Confirmation
//! of N items is N independent durable operations; a crash mid-batch
//! leaves the rest individually confirmable.

use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::{self, GroceryItem, Pool};
use crate::error::{Error, Result};
use crate::model::{Category, ItemStatus, ParsedItem};

/// Short random batch identifier: 8 hex chars, 4 bytes of entropy.
pub fn new_batch_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Persist parsed entries as a fresh `confirming` batch. Entries with a
/// blank name are skipped rather than failing the batch.
#[instrument(skip_all)]
pub async fn create_batch(
    pool: &Pool,
    parsed: &[ParsedItem],
) -> Result<(String, Vec<GroceryItem>)> {
    let batch_id = new_batch_id();
    let mut items = Vec::with_capacity(parsed.len());
    for entry in parsed {
        if entry.name.trim().is_empty() {
            continue;
        }
        let item = db::insert_item(
            pool,
            entry.name.trim(),
            entry.quantity,
            entry.category,
            ItemStatus::Confirming,
            Some(&batch_id),
        )
        .await?;
        items.push(item);
    }
    info!(batch_id, count = items.len(), "created batch");
    Ok((batch_id, items))
}

/// Commit one confirming item into the shopping list.
///
/// Fails with `NotFound` when the item does not exist or belongs to a
/// different batch (stale button defense). Already-committed items are
/// returned as-is, so double taps are safe. Otherwise the item either
/// merges into an existing item with the same name (quantities sum, the
/// incoming category wins, the batch id moves over, any found/not-found
/// state resets to pending) or simply flips to `pending` in place.
#[instrument(skip_all)]
pub async fn confirm_item(pool: &Pool, batch_id: &str, item_id: i64) -> Result<GroceryItem> {
    let item = db::get_batch_item(pool, batch_id, item_id)
        .await?
        .ok_or(Error::NotFound)?;
    if item.status != ItemStatus::Confirming {
        return Ok(item);
    }

    // First name match wins; the uniqueness invariant keeps this to at most
    // one row in practice. A found item only matches when nothing active
    // does, and the merge resets it to pending.
    if let Some(existing) = db::find_mergeable_by_name(pool, &item.name, item.id).await? {
        let merged = db::merge_items(
            pool,
            existing.id,
            item.quantity,
            item.category,
            batch_id,
            item.id,
        )
        .await?;
        info!(batch_id, item = %merged.name, quantity = merged.quantity, "merged into existing item");
        return Ok(merged);
    }

    db::update_status(pool, item.id, ItemStatus::Pending).await?;
    db::get_item(pool, item.id).await?.ok_or(Error::NotFound)
}

/// Confirm every remaining confirming item of a batch, sequentially. Each
/// confirmation is durable on completion; there is no cross-item
/// transaction.
#[instrument(skip_all)]
pub async fn confirm_all(pool: &Pool, batch_id: &str) -> Result<Vec<GroceryItem>> {
    let remaining = db::list_confirming(pool, batch_id).await?;
    let mut committed = Vec::with_capacity(remaining.len());
    for item in remaining {
        committed.push(confirm_item(pool, batch_id, item.id).await?);
    }
    Ok(committed)
}

/// Delete the batch's still-unconfirmed items. Items already confirmed out
/// of the batch are untouched.
#[instrument(skip_all)]
pub async fn cancel_batch(pool: &Pool, batch_id: &str) -> Result<u64> {
    let deleted = db::delete_confirming(pool, batch_id).await?;
    info!(batch_id, deleted, "cancelled batch");
    Ok(deleted)
}

/// Direct field overwrite on a single item; no merge logic, duplicates
/// elsewhere are left alone. Quantity clamps to a minimum of 1.
#[instrument(skip_all)]
pub async fn edit_item(
    pool: &Pool,
    item_id: i64,
    category: Category,
    quantity: i64,
    note: Option<&str>,
) -> Result<GroceryItem> {
    let updated = db::set_item_fields(pool, item_id, category, quantity.max(1), note).await?;
    if updated == 0 {
        return Err(Error::NotFound);
    }
    db::get_item(pool, item_id).await?.ok_or(Error::NotFound)
}
