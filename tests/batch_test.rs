use tg_groceries::batch;
use tg_groceries::db;
use tg_groceries::error::Error;
use tg_groceries::model::{Category, ItemStatus, ParsedItem};

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn parsed(name: &str, quantity: i64, category: Category) -> ParsedItem {
    ParsedItem {
        name: name.to_string(),
        quantity,
        category,
        original_line: name.to_string(),
    }
}

async fn count_items(pool: &sqlx::SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM grocery_items")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn confirm_flips_item_to_pending() {
    let pool = setup_pool().await;
    let (batch_id, items) = batch::create_batch(
        &pool,
        &[parsed("tomates", 3, Category::FruitsLegumes)],
    )
    .await
    .unwrap();
    assert_eq!(items[0].status, ItemStatus::Confirming);

    let committed = batch::confirm_item(&pool, &batch_id, items[0].id)
        .await
        .unwrap();
    assert_eq!(committed.status, ItemStatus::Pending);
    assert_eq!(committed.batch_id.as_deref(), Some(batch_id.as_str()));
}

#[tokio::test]
async fn confirmation_is_idempotent() {
    let pool = setup_pool().await;
    let (batch_id, items) =
        batch::create_batch(&pool, &[parsed("lait", 2, Category::ProduitsLaitiers)])
            .await
            .unwrap();

    let first = batch::confirm_item(&pool, &batch_id, items[0].id)
        .await
        .unwrap();
    let second = batch::confirm_item(&pool, &batch_id, items[0].id)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.quantity, second.quantity);
    assert_eq!(second.status, ItemStatus::Pending);
    assert_eq!(count_items(&pool).await, 1);
}

#[tokio::test]
async fn confirm_merges_into_existing_active_item() {
    let pool = setup_pool().await;
    let existing = db::insert_item(
        &pool,
        "lait",
        2,
        Category::ProduitsLaitiers,
        ItemStatus::Pending,
        Some("oldbatch"),
    )
    .await
    .unwrap();

    let (batch_id, items) =
        batch::create_batch(&pool, &[parsed("Lait", 1, Category::ProduitsLaitiers)])
            .await
            .unwrap();
    let merged = batch::confirm_item(&pool, &batch_id, items[0].id)
        .await
        .unwrap();

    assert_eq!(merged.id, existing.id);
    assert_eq!(merged.quantity, 3);
    assert_eq!(merged.status, ItemStatus::Pending);
    assert_eq!(merged.batch_id.as_deref(), Some(batch_id.as_str()));
    assert_eq!(count_items(&pool).await, 1);
}

#[tokio::test]
async fn merge_resets_found_item_to_pending() {
    let pool = setup_pool().await;
    let already_found = db::insert_item(
        &pool,
        "pain",
        1,
        Category::Boulangerie,
        ItemStatus::Found,
        None,
    )
    .await
    .unwrap();

    let (batch_id, items) =
        batch::create_batch(&pool, &[parsed("pain", 1, Category::Boulangerie)])
            .await
            .unwrap();
    let merged = batch::confirm_item(&pool, &batch_id, items[0].id)
        .await
        .unwrap();

    // The found state is cleared, not preserved.
    assert_eq!(merged.id, already_found.id);
    assert_eq!(merged.status, ItemStatus::Pending);
    assert_eq!(merged.quantity, 2);
    assert_eq!(count_items(&pool).await, 1);
}

#[tokio::test]
async fn merge_resets_not_found_item_to_pending() {
    let pool = setup_pool().await;
    let stale = db::insert_item(
        &pool,
        "beurre",
        1,
        Category::ProduitsLaitiers,
        ItemStatus::NotFound,
        None,
    )
    .await
    .unwrap();

    let (batch_id, items) =
        batch::create_batch(&pool, &[parsed("beurre", 2, Category::ProduitsLaitiers)])
            .await
            .unwrap();
    let merged = batch::confirm_item(&pool, &batch_id, items[0].id)
        .await
        .unwrap();

    assert_eq!(merged.id, stale.id);
    assert_eq!(merged.status, ItemStatus::Pending);
    assert_eq!(merged.quantity, 3);
}

#[tokio::test]
async fn stale_batch_reference_is_rejected() {
    let pool = setup_pool().await;
    let (_batch_id, items) =
        batch::create_batch(&pool, &[parsed("riz", 1, Category::Epicerie)])
            .await
            .unwrap();

    let err = batch::confirm_item(&pool, "deadbeef", items[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound));

    // The item is untouched and still confirmable under its real batch.
    let item = db::get_item(&pool, items[0].id).await.unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Confirming);
}

#[tokio::test]
async fn cancel_deletes_only_unconfirmed_items() {
    let pool = setup_pool().await;
    let entries: Vec<_> = ["pommes", "pain", "lait", "riz", "eau"]
        .iter()
        .map(|n| parsed(n, 1, Category::Epicerie))
        .collect();
    let (batch_id, items) = batch::create_batch(&pool, &entries).await.unwrap();
    assert_eq!(items.len(), 5);

    batch::confirm_item(&pool, &batch_id, items[0].id)
        .await
        .unwrap();
    batch::confirm_item(&pool, &batch_id, items[1].id)
        .await
        .unwrap();

    let deleted = batch::cancel_batch(&pool, &batch_id).await.unwrap();
    assert_eq!(deleted, 3);

    let remaining: Vec<String> =
        sqlx::query_scalar("SELECT article FROM grocery_items ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(remaining, vec!["pommes".to_string(), "pain".to_string()]);
    for id in [items[0].id, items[1].id] {
        let item = db::get_item(&pool, id).await.unwrap().unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
    }
}

#[tokio::test]
async fn confirm_all_commits_the_rest() {
    let pool = setup_pool().await;
    let entries: Vec<_> = ["pommes", "pain", "lait"]
        .iter()
        .map(|n| parsed(n, 1, Category::Epicerie))
        .collect();
    let (batch_id, items) = batch::create_batch(&pool, &entries).await.unwrap();

    batch::confirm_item(&pool, &batch_id, items[0].id)
        .await
        .unwrap();
    let committed = batch::confirm_all(&pool, &batch_id).await.unwrap();
    assert_eq!(committed.len(), 2);

    let confirming: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM grocery_items WHERE status = 'confirming'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(confirming, 0);
}

#[tokio::test]
async fn create_batch_skips_nameless_entries() {
    let pool = setup_pool().await;
    let entries = vec![
        parsed("pommes", 1, Category::FruitsLegumes),
        parsed("  ", 2, Category::Epicerie),
    ];
    let (_batch_id, items) = batch::create_batch(&pool, &entries).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "pommes");
}

#[tokio::test]
async fn edit_overwrites_fields_and_clamps_quantity() {
    let pool = setup_pool().await;
    let item = db::insert_item(
        &pool,
        "eau",
        6,
        Category::Boissons,
        ItemStatus::Pending,
        None,
    )
    .await
    .unwrap();

    let updated = batch::edit_item(&pool, item.id, Category::Epicerie, 0, Some("gazeuse"))
        .await
        .unwrap();
    assert_eq!(updated.quantity, 1);
    assert_eq!(updated.category, Category::Epicerie);
    assert_eq!(updated.note.as_deref(), Some("gazeuse"));

    let err = batch::edit_item(&pool, 9999, Category::Epicerie, 1, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound));
}
