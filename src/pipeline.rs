//! Cache-then-AI parsing pipeline. Lines the cache recognizes never reach
//! the AI service; the rest go out in one call whose failure fails the
//! whole submission; cache hits are discarded too, and the user retries
//! from scratch rather than getting half a batch.

use tracing::{info, instrument};

use crate::ai::AiParser;
use crate::cache::ProductCache;
use crate::error::Result;
use crate::model::{Category, ParsedItem};

/// Turn one multi-line submission into tentative line items, hits first.
///
/// AI entries are paired with the miss lines positionally; when the service
/// returns more entries than lines the extras keep their own name as the
/// original line. Unrecognized categories become the sentinel; no line the
/// user submitted is silently dropped here.
#[instrument(skip_all)]
pub async fn parse_for_batch(
    cache: &ProductCache,
    ai: &dyn AiParser,
    text: &str,
) -> Result<Vec<ParsedItem>> {
    let resolved = cache.resolve_batch(text).await;
    let mut items = resolved.hits;

    if !resolved.misses.is_empty() {
        let ai_items = ai.parse_items(&resolved.misses.join("\n")).await?;
        info!(
            misses = resolved.misses.len(),
            parsed = ai_items.len(),
            "AI resolved cache misses"
        );
        for (index, entry) in ai_items.into_iter().enumerate() {
            let original_line = resolved
                .misses
                .get(index)
                .cloned()
                .unwrap_or_else(|| entry.article.clone());
            items.push(ParsedItem {
                name: entry.article,
                quantity: entry.quantity.max(1),
                category: Category::parse_lossy(&entry.category),
                original_line,
            });
        }
    }

    Ok(items)
}

/// Feed a confirmed categorization back into the cache so the next
/// submission of the same surface form skips the AI entirely.
pub async fn assimilate(
    cache: &ProductCache,
    name: &str,
    category: Category,
    original_line: &str,
) -> anyhow::Result<()> {
    let (_, product_text) = crate::cache::parse_line(original_line);
    cache.record_variant(name, category, &product_text).await
}
