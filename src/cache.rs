//! Learned mapping from free-text product names to a canonical name and
//! category. Exists purely to short-circuit calls to the rate-limited AI
//! service: only exact canonical or known-variant matches are substituted,
//! so novel input always goes to the AI.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::model::{Category, ParsedItem};

/// One learned product, keyed in the store by its normalized canonical name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub correct_name: String,
    pub category: Category,
    pub variants: Vec<String>,
}

/// Outcome of resolving one multi-line submission against the cache.
#[derive(Debug, Default)]
pub struct ResolvedBatch {
    pub hits: Vec<ParsedItem>,
    pub misses: Vec<String>,
}

/// Product cache backed by a single JSON document, rewritten wholesale on
/// every mutation. One shared instance is injected into the handlers.
pub struct ProductCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

static LEADING_QTY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\s+(.+)$").unwrap());
static TRAILING_QTY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+?)\s+(\d+)$").unwrap());

/// Split a line into a quantity and the product text. A digit token must be
/// separated from the text by whitespace; leading digits are tried before
/// trailing ones. Lines without either default to quantity 1.
pub fn parse_line(line: &str) -> (i64, String) {
    let line = line.trim();
    if let Some(caps) = LEADING_QTY.captures(line) {
        if let Ok(qty) = caps[1].parse::<i64>() {
            return (qty.max(1), caps[2].trim().to_string());
        }
    }
    if let Some(caps) = TRAILING_QTY.captures(line) {
        if let Ok(qty) = caps[2].parse::<i64>() {
            return (qty.max(1), caps[1].trim().to_string());
        }
    }
    (1, line.to_string())
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

impl ProductCache {
    /// Load the cache document, or start empty when the file is missing.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("invalid cache document: {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read cache: {}", path.display()))
            }
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Exact canonical-name match first, then a linear scan of the variant
    /// sets. Returns the canonical name and category to substitute.
    pub async fn lookup(&self, product_text: &str) -> Option<(String, Category)> {
        let needle = normalize(product_text);
        let entries = self.entries.lock().await;
        if let Some(entry) = entries.get(&needle) {
            return Some((entry.correct_name.clone(), entry.category));
        }
        entries
            .values()
            .find(|e| e.variants.iter().any(|v| *v == needle))
            .map(|e| (e.correct_name.clone(), e.category))
    }

    /// Split a multi-line submission into cache hits and raw miss lines.
    /// Blank lines are discarded; miss lines pass through unchanged for the
    /// AI to resolve.
    #[instrument(skip_all)]
    pub async fn resolve_batch(&self, text: &str) -> ResolvedBatch {
        let mut resolved = ResolvedBatch::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (quantity, product_text) = parse_line(line);
            match self.lookup(&product_text).await {
                Some((name, category)) => resolved.hits.push(ParsedItem {
                    name,
                    quantity,
                    category,
                    original_line: line.to_string(),
                }),
                None => resolved.misses.push(line.to_string()),
            }
        }
        debug!(
            hits = resolved.hits.len(),
            misses = resolved.misses.len(),
            "resolved batch against cache"
        );
        resolved
    }

    /// Record that `variant_text` maps to `canonical_name`. Creates the
    /// entry on first sight, overwrites its category otherwise. A variant
    /// equal to the canonical name is a no-op. The document is persisted
    /// before returning.
    #[instrument(skip_all)]
    pub async fn record_variant(
        &self,
        canonical_name: &str,
        category: Category,
        variant_text: &str,
    ) -> Result<()> {
        let key = normalize(canonical_name);
        let variant = normalize(variant_text);
        if key.is_empty() || key == variant {
            return Ok(());
        }
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key).or_insert_with(|| CacheEntry {
            correct_name: canonical_name.trim().to_string(),
            category,
            variants: Vec::new(),
        });
        entry.category = category;
        if !variant.is_empty() && !entry.variants.contains(&variant) {
            entry.variants.push(variant);
        }
        self.persist(&entries).await
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Rewrite the whole document. Write-then-rename so a crash mid-write
    /// never leaves a truncated cache behind.
    async fn persist(&self, entries: &HashMap<String, CacheEntry>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("failed to write cache: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace cache: {}", self.path.display()))?;
        Ok(())
    }
}
