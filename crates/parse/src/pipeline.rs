use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, error};

use recibo_core::{DateRange, ParserResult, RawOcrResult, Receipt};
use recibo_templates::TemplateCatalog;

use crate::context::ParseContext;
use crate::matcher::{find_best_match, MatchResult};
use crate::preprocess::preprocess;
use crate::tuning::{BlendTuning, TotalsTuning, Tuning};
use crate::{date, items, payment, store, totals};

/// Per-call options; the parser itself stays shared and read-only.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub user_id: Option<String>,
    /// Injected clock for the plausible-date window; `None` means today.
    pub today: Option<NaiveDate>,
}

/// The orchestrator: six ordered stages over one OCR result, each degrading
/// to defaults so a populated receipt always comes back. Shared read-only
/// across concurrent parses.
pub struct ReceiptParser {
    catalog: Arc<TemplateCatalog>,
    tuning: Tuning,
}

impl Default for ReceiptParser {
    fn default() -> Self {
        Self::new(Arc::new(TemplateCatalog::builtin()), Tuning::default())
    }
}

impl ReceiptParser {
    pub fn new(catalog: Arc<TemplateCatalog>, tuning: Tuning) -> Self {
        Self { catalog, tuning }
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Parse one OCR result into a confidence-scored receipt. Never panics:
    /// a stage blowing up on pathological input is downgraded to a
    /// zero-confidence result with one error entry.
    pub fn parse(&self, input: &RawOcrResult, opts: &ParseOptions) -> ParserResult<Receipt> {
        match catch_unwind(AssertUnwindSafe(|| self.parse_inner(input, opts))) {
            Ok(result) => result,
            Err(_) => {
                error!("receipt parse panicked; returning empty result");
                let receipt = Receipt::empty(opts.user_id.clone(), input.text.clone());
                let mut result = ParserResult::new(receipt, 0.0);
                result.push_error("Internal parser failure".to_string());
                result
            }
        }
    }

    fn parse_inner(&self, input: &RawOcrResult, opts: &ParseOptions) -> ParserResult<Receipt> {
        let today = opts.today.unwrap_or_else(|| Utc::now().date_naive());
        let ocr_confidence = (input.confidence > 0.0).then_some(input.confidence);

        let pre = preprocess(&input.text, &input.blocks, &self.tuning.preprocess);
        let text = pre.enhanced_text.as_str();

        let mut ctx = ParseContext::new(&self.catalog, &input.blocks, today);
        ctx.ocr_confidence = ocr_confidence;

        // Template selection up front; the store stage refines the name and
        // can still pull a template in by resolved name below.
        if let Some(MatchResult::Template { template, confidence }) =
            find_best_match(
                text,
                &input.blocks,
                &self.catalog,
                &self.tuning.matcher,
                &self.tuning.preprocess,
            )
        {
            debug!(template = %template.store_id, confidence, "matched store template");
            ctx.template = Some(template);
        }

        let mut errors: Vec<String> = Vec::new();

        // ── Store ──
        let store_result = store::parse(text, &ctx, &self.tuning.store);
        errors.extend(store_result.errors.iter().cloned());
        if !store_result.data.name.is_empty() {
            ctx.store_name = Some(store_result.data.name.clone());
            if ctx.template.is_none() {
                ctx.template = self.catalog.find_by_name(&store_result.data.name);
            }
        }

        // ── Date ──
        let date_result = date::parse(text, &ctx, &self.tuning.date);
        errors.extend(date_result.errors.iter().cloned());

        // ── Items ──
        let items_result = items::parse(text, &ctx, &self.tuning.items);
        errors.extend(items_result.errors.iter().cloned());
        ctx.items = items_result.data.clone();

        // ── Totals ──
        let totals_result = totals::parse(text, &ctx, &self.tuning.totals);
        errors.extend(totals_result.errors.iter().cloned());

        // ── Payment ──
        let payment = payment::parse(text);

        let mut receipt = Receipt::empty(opts.user_id.clone(), input.text.clone());
        receipt.store = store_result.data;
        receipt.date = date_result.data;
        receipt.items = items_result.data;
        receipt.totals = totals_result.data;
        receipt.payment = payment;

        // ── Cross-validate ──
        for flag in cross_validate(&receipt, today, &self.tuning.totals) {
            if !errors.contains(&flag) {
                errors.push(flag);
            }
        }

        let confidence = blend_confidence(
            &receipt,
            text,
            pre.confidence,
            ocr_confidence,
            &[
                (store_result.confidence, self.tuning.blend.store_weight),
                (date_result.confidence, self.tuning.blend.date_weight),
                (items_result.confidence, self.tuning.blend.items_weight),
                (totals_result.confidence, self.tuning.blend.totals_weight),
            ],
            &self.tuning.blend,
        );
        receipt.confidence = confidence;

        ParserResult::with_errors(receipt, confidence, errors)
    }
}

/// Whole-receipt consistency flags, checked after every field stage ran.
pub fn cross_validate(receipt: &Receipt, today: NaiveDate, tuning: &TotalsTuning) -> Vec<String> {
    let mut flags = Vec::new();

    if receipt.store.name.is_empty() {
        flags.push("Store name missing".to_string());
    }
    if receipt.items.is_empty() {
        flags.push("No line items found".to_string());
    }
    if receipt.totals.total.is_zero() {
        flags.push("Total amount is zero".to_string());
    }

    if !receipt.items.is_empty() && !receipt.totals.subtotal.is_zero() {
        let items_sum = receipt.items_sum();
        let diff = (items_sum - receipt.totals.subtotal).abs();
        let fraction = receipt.totals.subtotal.mul_decimal(
            rust_decimal::Decimal::try_from(tuning.mismatch_fraction).unwrap_or_default(),
        );
        let dollars = recibo_core::Money::from_decimal(
            rust_decimal::Decimal::try_from(tuning.mismatch_dollars).unwrap_or_default(),
        );
        if diff > dollars && diff > fraction {
            flags.push(format!(
                "Items sum {items_sum} does not match subtotal {}",
                receipt.totals.subtotal
            ));
        }
    }

    if let Some(date) = receipt.date {
        if !DateRange::trailing_year(today).contains(date) {
            flags.push(format!("Transaction date {date} is outside the past year"));
        }
    }

    flags
}

/// Weighted blend of the preprocessor base, the component mean, and the
/// upstream OCR confidence, renormalized when the OCR part is absent; then
/// the punitive multipliers for structural gaps.
fn blend_confidence(
    receipt: &Receipt,
    text: &str,
    preprocess_confidence: f32,
    ocr_confidence: Option<f32>,
    components: &[(f32, f32)],
    tuning: &BlendTuning,
) -> f32 {
    let (weighted, weight_sum) = components
        .iter()
        .fold((0.0f32, 0.0f32), |(num, den), (conf, weight)| {
            (num + conf * weight, den + weight)
        });
    let component_mean = if weight_sum > 0.0 { weighted / weight_sum } else { 0.0 };

    let base = preprocess_confidence * ocr_confidence.unwrap_or(1.0);
    let mut numerator = tuning.base_weight * base + tuning.components_weight * component_mean;
    let mut denominator = tuning.base_weight + tuning.components_weight;
    if let Some(ocr) = ocr_confidence {
        numerator += tuning.ocr_weight * ocr;
        denominator += tuning.ocr_weight;
    }
    let mut confidence = numerator / denominator;

    if receipt.items.is_empty() {
        confidence *= tuning.no_items_penalty;
    }
    if receipt.store.name.is_empty() {
        confidence *= tuning.no_store_penalty;
    }
    if receipt.totals.total.is_zero() {
        confidence *= tuning.zero_total_penalty;
    }
    let len = text.trim().len();
    if len < tuning.tiny_text_len {
        confidence *= tuning.tiny_text_penalty;
    } else if len < tuning.short_text_len {
        confidence *= tuning.short_text_penalty;
    }

    confidence.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use recibo_core::{Money, ReceiptItem, ReceiptTotals};

    const WALMART_RECEIPT: &str = "WALMART\n\
123 Main Street, Anytown\n\
01/15/2023 10:25 AM\n\
Apple                  $2.99\n\
Bananas 2 @ $0.59     $1.18\n\
Subtotal              $13.94\n\
Tax (6%)               $0.84\n\
Total                 $14.78";

    fn opts_on(today: NaiveDate) -> ParseOptions {
        ParseOptions {
            user_id: None,
            today: Some(today),
        }
    }

    fn june_2023() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 6, 1).unwrap()
    }

    fn receipt_with(items_cents: &[i64], totals: ReceiptTotals) -> Receipt {
        let mut r = Receipt::empty(None, "");
        r.store = recibo_core::Store::named("STORE");
        r.items = items_cents
            .iter()
            .map(|&c| ReceiptItem::new("Item", Money::from_cents(c), 0.7))
            .collect();
        r.totals = totals;
        r
    }

    #[test]
    fn walmart_receipt_end_to_end() {
        let parser = ReceiptParser::default();
        let input = RawOcrResult::from_text(WALMART_RECEIPT, 0.9);
        let result = parser.parse(&input, &opts_on(june_2023()));

        let receipt = &result.data;
        assert!(receipt.store.name.to_uppercase().contains("WALMART"));
        assert_eq!(receipt.date, NaiveDate::from_ymd_opt(2023, 1, 15));
        assert!(receipt.items.len() >= 2);
        assert_eq!(receipt.totals.total, Money::from_cents(1478));
        assert!(result.confidence > 0.5, "got {}", result.confidence);
    }

    #[test]
    fn payment_and_template_feed_through() {
        let text = format!("{WALMART_RECEIPT}\nVISA **** 4321\nAPPROVED");
        let parser = ReceiptParser::default();
        let input = RawOcrResult::from_text(text, 0.9);
        let result = parser.parse(&input, &opts_on(june_2023()));
        let payment = result.data.payment.as_ref().unwrap();
        assert_eq!(payment.method, recibo_core::PaymentMethod::Visa);
        assert_eq!(payment.last_four.as_deref(), Some("4321"));
    }

    #[test]
    fn empty_input_degrades_without_panicking() {
        let parser = ReceiptParser::default();
        let input = RawOcrResult::from_text("", 0.0);
        let result = parser.parse(&input, &ParseOptions::default());

        assert!(result.data.store.name.is_empty());
        assert!(result.data.items.is_empty());
        assert!(result.data.totals.total.is_zero());
        assert!(result.data.date.is_none());
        assert!(!result.errors.is_empty());
        assert!(result.confidence < 0.2);
    }

    #[test]
    fn cross_validate_is_silent_on_consistent_receipt() {
        let totals = ReceiptTotals {
            subtotal: Money::from_cents(1394),
            tax: Money::from_cents(84),
            total: Money::from_cents(1478),
            tip: None,
            discount: None,
        };
        let mut r = receipt_with(&[1175, 219], totals);
        r.date = NaiveDate::from_ymd_opt(2023, 5, 1);
        let flags = cross_validate(&r, june_2023(), &TotalsTuning::default());
        assert!(flags.is_empty(), "unexpected flags: {flags:?}");
    }

    #[test]
    fn cross_validate_flags_items_subtotal_mismatch() {
        let totals = ReceiptTotals {
            subtotal: Money::from_cents(1394),
            tax: Money::from_cents(84),
            total: Money::from_cents(1478),
            tip: None,
            discount: None,
        };
        let r = receipt_with(&[2000], totals);
        let flags = cross_validate(&r, june_2023(), &TotalsTuning::default());
        assert!(flags.iter().any(|f| f.contains("does not match subtotal")));
    }

    #[test]
    fn cross_validate_flags_stale_date() {
        let mut r = receipt_with(
            &[500],
            ReceiptTotals {
                subtotal: Money::from_cents(500),
                tax: Money::zero(),
                total: Money::from_cents(500),
                tip: None,
                discount: None,
            },
        );
        r.date = NaiveDate::from_ymd_opt(2019, 1, 1);
        let flags = cross_validate(&r, june_2023(), &TotalsTuning::default());
        assert!(flags.iter().any(|f| f.contains("outside the past year")));
    }

    #[test]
    fn missing_structure_is_punished_in_the_blend() {
        let parser = ReceiptParser::default();
        let full = parser.parse(
            &RawOcrResult::from_text(WALMART_RECEIPT, 0.9),
            &opts_on(june_2023()),
        );
        let bare = parser.parse(
            &RawOcrResult::from_text("random words on a page", 0.9),
            &opts_on(june_2023()),
        );
        assert!(full.confidence > bare.confidence);
    }

    #[test]
    fn stage_errors_concatenate_into_the_receipt() {
        let parser = ReceiptParser::default();
        // No date, no totals keywords.
        let input = RawOcrResult::from_text("CORNER SHOP\nWidget 4.99", 0.9);
        let result = parser.parse(&input, &opts_on(june_2023()));
        assert!(result.errors.iter().any(|e| e.contains("date")));
        assert!(result.errors.iter().any(|e| e.contains("Total amount")));
    }
}
