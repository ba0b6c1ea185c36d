use super::model::{GroceryItem, SessionRow};
use crate::error::{Error, Result};
use crate::model::{Category, ItemStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

const ITEM_COLUMNS: &str =
    "id, article, quantity, category, status, batch_id, note, created_at, updated_at";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous=FULL;").execute(&pool).await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, make sure the parent directory exists so the
/// first connect can create the file. In-memory URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }
    let rest = url["sqlite:".len()..].trim_start_matches("//");
    let path = rest.split('?').next().unwrap_or(rest);
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
    url.to_string()
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| Error::Store(sqlx::Error::Migrate(Box::new(e))))?;
    Ok(())
}

fn map_item(row: &SqliteRow) -> std::result::Result<GroceryItem, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = ItemStatus::parse(&status_str).ok_or_else(|| {
        sqlx::Error::Decode(format!("unknown item status '{status_str}'").into())
    })?;
    let category_str: String = row.try_get("category")?;
    Ok(GroceryItem {
        id: row.try_get("id")?,
        name: row.try_get("article")?,
        quantity: row.try_get("quantity")?,
        category: Category::parse_lossy(&category_str),
        status,
        batch_id: row.try_get("batch_id")?,
        note: row.try_get("note")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[instrument(skip_all)]
pub async fn insert_item(
    pool: &Pool,
    name: &str,
    quantity: i64,
    category: Category,
    status: ItemStatus,
    batch_id: Option<&str>,
) -> Result<GroceryItem> {
    let sql = format!(
        "INSERT INTO grocery_items (article, quantity, category, status, batch_id) \
         VALUES (?, ?, ?, ?, ?) RETURNING {ITEM_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(name)
        .bind(quantity.max(1))
        .bind(category.as_str())
        .bind(status.as_str())
        .bind(batch_id)
        .fetch_one(pool)
        .await?;
    Ok(map_item(&row)?)
}

#[instrument(skip_all)]
pub async fn get_item(pool: &Pool, id: i64) -> Result<Option<GroceryItem>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM grocery_items WHERE id = ?");
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    row.as_ref().map(map_item).transpose().map_err(Error::from)
}

/// Fetch an item only if it belongs to the given batch. Used to reject
/// stale or replayed buttons referencing an already-purged batch.
#[instrument(skip_all)]
pub async fn get_batch_item(
    pool: &Pool,
    batch_id: &str,
    item_id: i64,
) -> Result<Option<GroceryItem>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM grocery_items WHERE id = ? AND batch_id = ?");
    let row = sqlx::query(&sql)
        .bind(item_id)
        .bind(batch_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_item).transpose().map_err(Error::from)
}

/// First item with the same canonical name that a confirm may merge into,
/// excluding `exclude_id`. Case-insensitive. Active items are preferred;
/// a `found` item is only matched when no active one exists (the merge
/// then resets its found state). Confirming rows never match.
#[instrument(skip_all)]
pub async fn find_mergeable_by_name(
    pool: &Pool,
    name: &str,
    exclude_id: i64,
) -> Result<Option<GroceryItem>> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM grocery_items \
         WHERE LOWER(article) = LOWER(?) \
           AND status IN ('pending', 'selected', 'not_found', 'found') \
           AND id <> ? \
         ORDER BY (CASE WHEN status = 'found' THEN 1 ELSE 0 END), id LIMIT 1"
    );
    let row = sqlx::query(&sql)
        .bind(name)
        .bind(exclude_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_item).transpose().map_err(Error::from)
}

#[instrument(skip_all)]
pub async fn update_status(pool: &Pool, id: i64, status: ItemStatus) -> Result<()> {
    sqlx::query(
        "UPDATE grocery_items SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn set_item_fields(
    pool: &Pool,
    id: i64,
    category: Category,
    quantity: i64,
    note: Option<&str>,
) -> Result<u64> {
    let res = sqlx::query(
        "UPDATE grocery_items SET category = ?, quantity = ?, note = ?, \
         updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(category.as_str())
    .bind(quantity.max(1))
    .bind(note)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

/// Fold a confirming item into an existing row: quantities sum, the incoming
/// category wins, the batch id is reassigned for audit, and the target is
/// reset to `pending` (clearing any prior found/not-found state). The
/// now-redundant confirming row is deleted in the same transaction.
#[instrument(skip_all)]
pub async fn merge_items(
    pool: &Pool,
    target_id: i64,
    add_quantity: i64,
    category: Category,
    batch_id: &str,
    source_id: i64,
) -> Result<GroceryItem> {
    let mut tx = pool.begin().await?;
    let sql = format!(
        "UPDATE grocery_items \
         SET quantity = quantity + ?, category = ?, batch_id = ?, status = 'pending', \
             updated_at = CURRENT_TIMESTAMP \
         WHERE id = ? RETURNING {ITEM_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(add_quantity)
        .bind(category.as_str())
        .bind(batch_id)
        .bind(target_id)
        .fetch_one(&mut *tx)
        .await?;
    let merged = map_item(&row)?;
    sqlx::query("DELETE FROM grocery_items WHERE id = ?")
        .bind(source_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(merged)
}

#[instrument(skip_all)]
pub async fn list_confirming(pool: &Pool, batch_id: &str) -> Result<Vec<GroceryItem>> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM grocery_items \
         WHERE batch_id = ? AND status = 'confirming' ORDER BY id"
    );
    let rows = sqlx::query(&sql).bind(batch_id).fetch_all(pool).await?;
    rows.iter()
        .map(map_item)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

#[instrument(skip_all)]
pub async fn delete_confirming(pool: &Pool, batch_id: &str) -> Result<u64> {
    let res = sqlx::query(
        "DELETE FROM grocery_items WHERE batch_id = ? AND status = 'confirming'",
    )
    .bind(batch_id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

/// Items still relevant to the shopping pass, in creation order. The order
/// is stable across status changes so the rendered list never reshuffles.
#[instrument(skip_all)]
pub async fn list_active(pool: &Pool) -> Result<Vec<GroceryItem>> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM grocery_items \
         WHERE status IN ('pending', 'selected', 'not_found') ORDER BY id"
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter()
        .map(map_item)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

#[instrument(skip_all)]
pub async fn list_found(pool: &Pool) -> Result<Vec<GroceryItem>> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM grocery_items WHERE status = 'found' ORDER BY id"
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter()
        .map(map_item)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

#[instrument(skip_all)]
pub async fn delete_found(pool: &Pool) -> Result<u64> {
    let res = sqlx::query("DELETE FROM grocery_items WHERE status = 'found'")
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

#[instrument(skip_all)]
pub async fn reset_selected(pool: &Pool) -> Result<u64> {
    let res = sqlx::query(
        "UPDATE grocery_items SET status = 'pending', updated_at = CURRENT_TIMESTAMP \
         WHERE status = 'selected'",
    )
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

// ---------------------------------------------------------------------------
// Sessions: short-lived callback tokens bound to one outbound message.
// Expired rows behave as absent; a background worker sweeps them.
// ---------------------------------------------------------------------------

#[instrument(skip_all)]
pub async fn create_session(
    pool: &Pool,
    id: &str,
    message_id: i64,
    data: &str,
    ttl_hours: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO sessions (id, message_id, data, expires_at) \
         VALUES (?, ?, ?, datetime('now', '+' || ? || ' hours'))",
    )
    .bind(id)
    .bind(message_id)
    .bind(data)
    .bind(ttl_hours)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_session(pool: &Pool, id: &str) -> Result<Option<SessionRow>> {
    let row = sqlx::query(
        "SELECT id, message_id, data, expires_at FROM sessions \
         WHERE id = ? AND datetime(expires_at) > datetime('now')",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(SessionRow {
        id: row.try_get("id")?,
        message_id: row.try_get("message_id")?,
        data: row.try_get("data")?,
        expires_at: row.try_get("expires_at")?,
    }))
}

#[instrument(skip_all)]
pub async fn update_session_data(pool: &Pool, id: &str, data: &str) -> Result<u64> {
    let res = sqlx::query("UPDATE sessions SET data = ? WHERE id = ?")
        .bind(data)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

#[instrument(skip_all)]
pub async fn delete_session(pool: &Pool, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn purge_expired_sessions(pool: &Pool) -> Result<u64> {
    let res = sqlx::query("DELETE FROM sessions WHERE datetime(expires_at) <= datetime('now')")
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}
