use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::compiled::CompiledTemplate;
use crate::template::{ItemPattern, ItemPatternKind, ReceiptTemplate, TotalsPatterns};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read template file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse template TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("No usable templates after compilation")]
    Empty,
}

/// Retailer names the generic fallback scans the first lines of a receipt
/// for. All lowercase; matching is substring, case-insensitive.
pub const COMMON_RETAILERS: &[&str] = &[
    "walmart",
    "target",
    "costco",
    "kroger",
    "safeway",
    "albertsons",
    "publix",
    "aldi",
    "trader joe",
    "whole foods",
    "walgreens",
    "cvs",
    "rite aid",
    "home depot",
    "lowes",
    "best buy",
    "dollar general",
    "dollar tree",
    "7-eleven",
    "starbucks",
    "mcdonald",
    "chipotle",
];

/// Immutable set of compiled store templates. Shared read-only across
/// concurrent parses; construction is the only place it is ever written.
#[derive(Debug)]
pub struct TemplateCatalog {
    templates: Vec<CompiledTemplate>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    templates: Vec<ReceiptTemplate>,
}

impl TemplateCatalog {
    /// Compile raw templates, quarantining bad patterns and dropping
    /// templates left without a usable store pattern. Errors only when
    /// nothing at all survives.
    pub fn from_templates(raw: Vec<ReceiptTemplate>) -> Result<Self, CatalogError> {
        let before = raw.len();
        let templates: Vec<CompiledTemplate> =
            raw.iter().filter_map(CompiledTemplate::compile).collect();
        if templates.len() < before {
            warn!(
                dropped = before - templates.len(),
                kept = templates.len(),
                "some templates were rejected at load"
            );
        }
        if templates.is_empty() && before > 0 {
            return Err(CatalogError::Empty);
        }
        Ok(Self { templates })
    }

    /// Parse a `[[templates]]` TOML document.
    pub fn from_toml(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::from_templates(file.templates)
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// An empty catalog — every parse falls through to the generic detectors.
    pub fn empty() -> Self {
        Self { templates: Vec::new() }
    }

    /// The built-in catalog of common US retailers.
    pub fn builtin() -> Self {
        let templates = builtin_templates()
            .iter()
            .filter_map(CompiledTemplate::compile)
            .collect();
        Self { templates }
    }

    pub fn templates(&self) -> &[CompiledTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// First template whose store patterns match the given text.
    pub fn match_store(&self, text: &str) -> Option<&CompiledTemplate> {
        self.templates.iter().find(|t| t.matches_store(text))
    }

    /// Look a template up by a resolved store name (canonical name substring
    /// in either direction, case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<&CompiledTemplate> {
        let needle = name.to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.templates.iter().find(|t| {
            let canon = t.store_name.to_lowercase();
            canon.contains(&needle) || needle.contains(&canon)
        })
    }
}

/// Shipping a handful of the most common layouts keeps cold-start extraction
/// useful before any site-specific templates are configured.
fn builtin_templates() -> Vec<ReceiptTemplate> {
    fn totals_default() -> TotalsPatterns {
        TotalsPatterns {
            subtotal: Some(r"sub\s*-?\s*total".into()),
            tax: Some(r"\b(?:tax|hst|gst|pst|vat)\b".into()),
            total: r"\btotal\b".into(),
            tip: None,
            discount: Some(r"\b(?:discount|savings|coupon)\b".into()),
        }
    }

    fn grocery_items() -> Vec<ItemPattern> {
        vec![
            ItemPattern::new(
                r"^(.+?)\s+(\d+)\s*@\s*\$?(\d+\.\d{2})\s+\$?(-?\d+\.\d{2})$",
                ItemPatternKind::NameQtyUnitPrice,
            ),
            ItemPattern::new(
                r"^([A-Za-z][A-Za-z0-9 .,'&%/-]*?)\s+\$?(-?\d+\.\d{2})$",
                ItemPatternKind::NamePrice,
            ),
        ]
    }

    fn template(
        id: &str,
        name: &str,
        store_patterns: &[&str],
        footer: &[&str],
    ) -> ReceiptTemplate {
        ReceiptTemplate {
            store_id: id.into(),
            store_name: name.into(),
            store_patterns: store_patterns.iter().map(|s| s.to_string()).collect(),
            header_patterns: vec![],
            item_patterns: grocery_items(),
            totals_patterns: totals_default(),
            date_patterns: vec![r"\d{1,2}/\d{1,2}/\d{2,4}".into()],
            payment_patterns: vec![],
            footer_patterns: footer.iter().map(|s| s.to_string()).collect(),
        }
    }

    vec![
        template(
            "walmart",
            "Walmart",
            &[r"wal\s*-?\s*mart"],
            &[r"save money\.?\s*live better"],
        ),
        template("target", "Target", &[r"\btarget\b"], &[r"expect more\.?\s*pay less"]),
        template(
            "costco",
            "Costco Wholesale",
            &[r"costco\s*(wholesale)?"],
            &[r"member\s*(ship)?\s*#?\d*"],
        ),
        template("kroger", "Kroger", &[r"\bkroger\b"], &[r"fuel points"]),
        template("safeway", "Safeway", &[r"\bsafeway\b"], &[]),
        template(
            "wholefoods",
            "Whole Foods Market",
            &[r"whole\s*foods"],
            &[r"amazon prime"],
        ),
        template(
            "traderjoes",
            "Trader Joe's",
            &[r"trader\s*joe'?s?"],
            &[],
        ),
        template("walgreens", "Walgreens", &[r"\bwalgreens\b"], &[r"be well"]),
        template("cvs", "CVS Pharmacy", &[r"\bcvs\b"], &[r"extracare"]),
        template(
            "homedepot",
            "The Home Depot",
            &[r"home\s*depot"],
            &[r"how doers get more done"],
        ),
        template(
            "starbucks",
            "Starbucks",
            &[r"\bstarbucks\b"],
            &[r"rewards"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_catalog_compiles() {
        let catalog = TemplateCatalog::builtin();
        assert!(catalog.len() >= 10);
        assert!(catalog
            .templates()
            .iter()
            .all(|t| t.quarantined == 0));
    }

    #[test]
    fn match_store_finds_walmart() {
        let catalog = TemplateCatalog::builtin();
        let t = catalog.match_store("WAL-MART SUPERCENTER #1234").unwrap();
        assert_eq!(t.store_name, "Walmart");
    }

    #[test]
    fn find_by_name_is_bidirectional_substring() {
        let catalog = TemplateCatalog::builtin();
        assert!(catalog.find_by_name("WALMART SUPERCENTER").is_some());
        assert!(catalog.find_by_name("Foods").is_some());
        assert!(catalog.find_by_name("").is_none());
        assert!(catalog.find_by_name("bodega esquina").is_none());
    }

    #[test]
    fn from_toml_parses_catalog_file() {
        let toml = r#"
            [[templates]]
            store_id = "acme"
            store_name = "ACME Markets"
            store_patterns = ["acme"]

            [templates.totals_patterns]
            total = "total"
        "#;
        let catalog = TemplateCatalog::from_toml(toml).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.match_store("ACME #42").unwrap().store_name, "ACME Markets");
    }

    #[test]
    fn from_toml_all_templates_bad_is_error() {
        let toml = r#"
            [[templates]]
            store_id = "bad"
            store_name = "Bad"
            store_patterns = ["[unclosed"]

            [templates.totals_patterns]
            total = "total"
        "#;
        assert!(matches!(
            TemplateCatalog::from_toml(toml),
            Err(CatalogError::Empty)
        ));
    }

    #[test]
    fn empty_template_list_is_fine() {
        let catalog = TemplateCatalog::from_toml("").unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn from_path_reads_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"
            [[templates]]
            store_id = "acme"
            store_name = "ACME Markets"
            store_patterns = ["acme"]

            [templates.totals_patterns]
            total = "total"
            "#
        )
        .unwrap();
        let catalog = TemplateCatalog::from_path(f.path()).unwrap();
        assert_eq!(catalog.len(), 1);
    }
}
