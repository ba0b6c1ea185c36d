use std::collections::VecDeque;
use std::sync::Arc;
use tg_groceries::ai::{AiItem, AiParser};
use tg_groceries::cache::ProductCache;
use tg_groceries::error::{Error, Result};
use tg_groceries::model::Category;
use tg_groceries::pipeline;
use tokio::sync::Mutex;

/// Scripted AI fake recording every call it receives.
#[derive(Clone, Default)]
struct RecordingAi {
    responses: Arc<Mutex<VecDeque<Result<Vec<AiItem>>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingAi {
    fn with_responses(responses: Vec<Result<Vec<AiItem>>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl AiParser for RecordingAi {
    async fn parse_items(&self, text: &str) -> Result<Vec<AiItem>> {
        self.calls.lock().await.push(text.to_string());
        let mut guard = self.responses.lock().await;
        guard.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

fn ai_item(article: &str, quantity: i64, category: &str) -> AiItem {
    AiItem {
        article: article.to_string(),
        quantity,
        category: category.to_string(),
    }
}

async fn empty_cache(td: &tempfile::TempDir) -> ProductCache {
    ProductCache::load(td.path().join("cache.json")).await.unwrap()
}

#[tokio::test]
async fn cache_hit_bypasses_ai() {
    let td = tempfile::tempdir().unwrap();
    let cache = empty_cache(&td).await;
    cache
        .record_variant("pommes", Category::FruitsLegumes, "pomme")
        .await
        .unwrap();
    let ai = RecordingAi::default();

    let items = pipeline::parse_for_batch(&cache, &ai, "2 pomme").await.unwrap();

    assert!(ai.calls().await.is_empty());
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "pommes");
    assert_eq!(items[0].quantity, 2);
    assert_eq!(items[0].category, Category::FruitsLegumes);
}

#[tokio::test]
async fn misses_go_to_ai_and_keep_their_lines() {
    let td = tempfile::tempdir().unwrap();
    let cache = empty_cache(&td).await;
    cache
        .record_variant("pommes", Category::FruitsLegumes, "pomme")
        .await
        .unwrap();
    let ai = RecordingAi::with_responses(vec![Ok(vec![
        ai_item("fromage bleu", 1, "Produits laitiers"),
        ai_item("jambon", 2, "Viandes et Poulet"),
    ])]);

    let items = pipeline::parse_for_batch(&cache, &ai, "pomme\nfromage bleu\n2 jambon")
        .await
        .unwrap();

    // One joined call with the raw miss lines, in input order.
    assert_eq!(ai.calls().await, vec!["fromage bleu\n2 jambon".to_string()]);

    // Cache hits first, then AI entries paired with their miss lines.
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].name, "pommes");
    assert_eq!(items[1].name, "fromage bleu");
    assert_eq!(items[1].original_line, "fromage bleu");
    assert_eq!(items[2].name, "jambon");
    assert_eq!(items[2].original_line, "2 jambon");
}

#[tokio::test]
async fn ai_failure_discards_cache_hits() {
    let td = tempfile::tempdir().unwrap();
    let cache = empty_cache(&td).await;
    cache
        .record_variant("pommes", Category::FruitsLegumes, "pomme")
        .await
        .unwrap();
    let ai = RecordingAi::with_responses(vec![Err(Error::ParsingFailed("boom".into()))]);

    let err = pipeline::parse_for_batch(&cache, &ai, "pomme\nfromage bleu")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ParsingFailed(_)));
}

#[tokio::test]
async fn extra_ai_entries_fall_back_to_their_own_name() {
    let td = tempfile::tempdir().unwrap();
    let cache = empty_cache(&td).await;
    let ai = RecordingAi::with_responses(vec![Ok(vec![
        ai_item("oeufs", 6, "Épicerie"),
        ai_item("farine", 1, "Épicerie"),
        ai_item("levure", 1, "Épicerie"),
    ])]);

    let items = pipeline::parse_for_batch(&cache, &ai, "6 oeufs\nfarine")
        .await
        .unwrap();

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].original_line, "6 oeufs");
    assert_eq!(items[1].original_line, "farine");
    // Out-of-range index: the entry's own name stands in.
    assert_eq!(items[2].original_line, "levure");
}

#[tokio::test]
async fn unknown_category_maps_to_sentinel() {
    let td = tempfile::tempdir().unwrap();
    let cache = empty_cache(&td).await;
    let ai = RecordingAi::with_responses(vec![Ok(vec![ai_item("clous", 1, "Bricolage")])]);

    let items = pipeline::parse_for_batch(&cache, &ai, "clous").await.unwrap();
    assert_eq!(items[0].category, Category::Inconnu);
}

#[tokio::test]
async fn every_line_is_accounted_for() {
    let td = tempfile::tempdir().unwrap();
    let cache = empty_cache(&td).await;
    cache
        .record_variant("pommes", Category::FruitsLegumes, "pomme")
        .await
        .unwrap();
    let ai = RecordingAi::with_responses(vec![Ok(vec![
        ai_item("fromage", 1, "Produits laitiers"),
        ai_item("mystère", 1, ""),
    ])]);

    let input = "pomme\n\nfromage\nmystère\n\n";
    let items = pipeline::parse_for_batch(&cache, &ai, input).await.unwrap();

    // 3 non-blank lines in, 3 items out; the uncategorizable one got the
    // sentinel rather than being dropped.
    assert_eq!(items.len(), 3);
    assert!(items.iter().any(|i| i.category == Category::Inconnu));
}

#[tokio::test]
async fn assimilation_makes_the_next_pass_a_cache_hit() {
    let td = tempfile::tempdir().unwrap();
    let cache = empty_cache(&td).await;

    pipeline::assimilate(&cache, "pommes", Category::FruitsLegumes, "2 pomme")
        .await
        .unwrap();

    let ai = RecordingAi::default();
    let items = pipeline::parse_for_batch(&cache, &ai, "3 pomme").await.unwrap();
    assert!(ai.calls().await.is_empty());
    assert_eq!(items[0].name, "pommes");
    assert_eq!(items[0].quantity, 3);
}
