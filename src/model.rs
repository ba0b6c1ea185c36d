use serde::{Deserialize, Serialize};

/// Lifecycle status of a grocery item.
///
/// `Confirming` items belong to an in-flight batch and are invisible to the
/// shopping list; the other four statuses drive the shopping tap cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Confirming,
    Pending,
    Selected,
    Found,
    NotFound,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Confirming => "confirming",
            ItemStatus::Pending => "pending",
            ItemStatus::Selected => "selected",
            ItemStatus::Found => "found",
            ItemStatus::NotFound => "not_found",
        }
    }

    pub fn parse(s: &str) -> Option<ItemStatus> {
        match s {
            "confirming" => Some(ItemStatus::Confirming),
            "pending" => Some(ItemStatus::Pending),
            "selected" => Some(ItemStatus::Selected),
            "found" => Some(ItemStatus::Found),
            "not_found" => Some(ItemStatus::NotFound),
            _ => None,
        }
    }

    /// Statuses still relevant to an in-progress list. `Found` items are
    /// kept out so they never match during batch merges.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ItemStatus::Pending | ItemStatus::Selected | ItemStatus::NotFound
        )
    }
}

/// Closed set of shopping categories, plus the `Inconnu` sentinel for
/// anything the AI could not place.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    FruitsLegumes,
    Boulangerie,
    ProduitsLaitiers,
    ViandesPoulet,
    Epicerie,
    Surgeles,
    Boissons,
    Hygiene,
    Conserves,
    Inconnu,
}

/// Fixed picklist order used for keyboards and index-based callbacks.
pub const CATEGORIES: [Category; 10] = [
    Category::FruitsLegumes,
    Category::Boulangerie,
    Category::ProduitsLaitiers,
    Category::ViandesPoulet,
    Category::Epicerie,
    Category::Surgeles,
    Category::Boissons,
    Category::Hygiene,
    Category::Conserves,
    Category::Inconnu,
];

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::FruitsLegumes => "Fruits et légumes",
            Category::Boulangerie => "Boulangerie",
            Category::ProduitsLaitiers => "Produits laitiers",
            Category::ViandesPoulet => "Viandes et Poulet",
            Category::Epicerie => "Épicerie",
            Category::Surgeles => "Surgelés",
            Category::Boissons => "Boissons",
            Category::Hygiene => "Hygiène",
            Category::Conserves => "Conserves",
            Category::Inconnu => "Inconnu",
        }
    }

    /// Case-insensitive parse of a category label. Unrecognized labels map
    /// to the sentinel rather than failing: every line the user submitted
    /// must end up somewhere.
    pub fn parse_lossy(s: &str) -> Category {
        let normalized = s.trim().to_lowercase();
        CATEGORIES
            .into_iter()
            .find(|c| c.as_str().to_lowercase() == normalized)
            .unwrap_or(Category::Inconnu)
    }

    pub fn from_index(index: usize) -> Option<Category> {
        CATEGORIES.get(index).copied()
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Category::FruitsLegumes => "🥕",
            Category::Boulangerie => "🥖",
            Category::ProduitsLaitiers => "🧀",
            Category::ViandesPoulet => "🍗",
            Category::Epicerie => "🛒",
            Category::Surgeles => "❄️",
            Category::Boissons => "🥤",
            Category::Hygiene => "🧼",
            Category::Conserves => "🥫",
            Category::Inconnu => "❓",
        }
    }
}

/// One line of parsed input, either from the product cache or the AI.
/// `original_line` is the raw user text that produced it; it rides along
/// into the confirmation session so the cache can learn the variant once
/// the item is confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    pub name: String,
    pub quantity: i64,
    pub category: Category,
    pub original_line: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for s in [
            ItemStatus::Confirming,
            ItemStatus::Pending,
            ItemStatus::Selected,
            ItemStatus::Found,
            ItemStatus::NotFound,
        ] {
            assert_eq!(ItemStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(ItemStatus::parse("bogus"), None);
    }

    #[test]
    fn active_excludes_found_and_confirming() {
        assert!(ItemStatus::Pending.is_active());
        assert!(ItemStatus::Selected.is_active());
        assert!(ItemStatus::NotFound.is_active());
        assert!(!ItemStatus::Found.is_active());
        assert!(!ItemStatus::Confirming.is_active());
    }

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!(
            Category::parse_lossy("fruits et légumes"),
            Category::FruitsLegumes
        );
        assert_eq!(Category::parse_lossy("BOISSONS"), Category::Boissons);
        assert_eq!(Category::parse_lossy("Quincaillerie"), Category::Inconnu);
        assert_eq!(Category::parse_lossy(""), Category::Inconnu);
    }

    #[test]
    fn category_index_round_trip() {
        for (i, c) in CATEGORIES.iter().enumerate() {
            assert_eq!(Category::from_index(i), Some(*c));
        }
        assert_eq!(Category::from_index(CATEGORIES.len()), None);
    }
}
