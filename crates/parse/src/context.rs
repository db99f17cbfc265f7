use chrono::NaiveDate;

use recibo_core::{ReceiptItem, TextBlock};
use recibo_templates::{CompiledTemplate, TemplateCatalog};

/// Explicit context threaded between pipeline stages.
///
/// Each stage reads the fields earlier stages filled in; the two feedback
/// loops the pipeline allows are visible right here as fields: the store
/// stage writes `store_name`/`template` for the item stage, and the item
/// stage writes `items` for totals reconciliation.
#[derive(Debug)]
pub struct ParseContext<'a> {
    pub catalog: &'a TemplateCatalog,
    pub blocks: &'a [TextBlock],
    /// Upstream OCR engine's own confidence, when the provider reports one.
    pub ocr_confidence: Option<f32>,
    /// Injected clock for the plausible-date window; defaults to today.
    pub today: NaiveDate,
    /// Filled by the store stage.
    pub store_name: Option<String>,
    /// Filled by the matcher or looked up from the resolved store name.
    pub template: Option<&'a CompiledTemplate>,
    /// Filled by the item stage, read by totals reconciliation.
    pub items: Vec<ReceiptItem>,
}

impl<'a> ParseContext<'a> {
    pub fn new(catalog: &'a TemplateCatalog, blocks: &'a [TextBlock], today: NaiveDate) -> Self {
        Self {
            catalog,
            blocks,
            ocr_confidence: None,
            today,
            store_name: None,
            template: None,
            items: Vec::new(),
        }
    }

    pub fn items_sum(&self) -> recibo_core::Money {
        self.items
            .iter()
            .map(|i| i.price)
            .fold(recibo_core::Money::zero(), |a, b| a + b)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Bare context over an empty catalog — what most field-parser tests use.
    pub fn bare_context(today: NaiveDate) -> ParseContext<'static> {
        static EMPTY_CATALOG: std::sync::OnceLock<TemplateCatalog> = std::sync::OnceLock::new();
        let catalog = EMPTY_CATALOG.get_or_init(TemplateCatalog::empty);
        ParseContext::new(catalog, &[], today)
    }

    pub fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }
}
