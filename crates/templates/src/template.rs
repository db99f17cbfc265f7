use serde::{Deserialize, Serialize};

/// Static, per-store configuration of regex patterns. Loaded once at service
/// construction (TOML or the builtin catalog) and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptTemplate {
    pub store_id: String,
    /// Canonical display name adopted verbatim when a store pattern hits.
    pub store_name: String,
    pub store_patterns: Vec<String>,
    #[serde(default)]
    pub header_patterns: Vec<String>,
    #[serde(default)]
    pub item_patterns: Vec<ItemPattern>,
    pub totals_patterns: TotalsPatterns,
    #[serde(default)]
    pub date_patterns: Vec<String>,
    #[serde(default)]
    pub payment_patterns: Vec<String>,
    #[serde(default)]
    pub footer_patterns: Vec<String>,
}

/// A line-item pattern together with an explicit tag for its capture-group
/// layout, so matching code never has to sniff the pattern text to learn
/// which group is the quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemPattern {
    pub pattern: String,
    pub kind: ItemPatternKind,
}

impl ItemPattern {
    pub fn new(pattern: impl Into<String>, kind: ItemPatternKind) -> Self {
        Self {
            pattern: pattern.into(),
            kind,
        }
    }
}

/// Capture-group contract for an item pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemPatternKind {
    /// Groups: (name, price).
    NamePrice,
    /// Groups: (quantity, name, price).
    QtyNamePrice,
    /// Groups: (name, quantity, unit_price, price).
    NameQtyUnitPrice,
}

/// Per-section totals patterns. Only `total` is required; stores that never
/// print a tip or discount line just omit those.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotalsPatterns {
    #[serde(default)]
    pub subtotal: Option<String>,
    #[serde(default)]
    pub tax: Option<String>,
    pub total: String,
    #[serde(default)]
    pub tip: Option<String>,
    #[serde(default)]
    pub discount: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_deserializes_from_toml() {
        let toml = r#"
            store_id = "walmart"
            store_name = "Walmart"
            store_patterns = ["wal\\s*-?\\s*mart"]

            [[item_patterns]]
            pattern = "^(.+?)\\s+(\\d+\\.\\d{2})$"
            kind = "name_price"

            [totals_patterns]
            subtotal = "subtotal"
            total = "total"
        "#;
        let t: ReceiptTemplate = toml::from_str(toml).unwrap();
        assert_eq!(t.store_name, "Walmart");
        assert_eq!(t.item_patterns[0].kind, ItemPatternKind::NamePrice);
        assert!(t.totals_patterns.tax.is_none());
        assert!(t.header_patterns.is_empty());
    }

    #[test]
    fn item_pattern_kind_snake_case() {
        let p: ItemPattern = toml::from_str(
            "pattern = \"x\"\nkind = \"name_qty_unit_price\"",
        )
        .unwrap();
        assert_eq!(p.kind, ItemPatternKind::NameQtyUnitPrice);
    }
}
