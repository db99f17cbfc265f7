use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use recibo_core::{Money, TextBlock};
use recibo_templates::{CompiledTemplate, TemplateCatalog, COMMON_RETAILERS};

use crate::date;
use crate::normalize::re;
use crate::preprocess::{spatial_sections, SectionMap};
use crate::tuning::{MatcherTuning, PreprocessTuning};

re!(
    re_labeled_total,
    r"(?i)\b(?:grand\s+total|amount\s+due|balance\s+due|total\s+due|total)\s*[:\$]?\s*\$?\s*([\d,]+\.\d{2})\b"
);
re!(re_any_amount, r"\$\s*([\d,]+\.\d{2})");
re!(re_trailing_price, r"\$?\d+\.\d{2}\s*$");

/// The best template for a text, or the generic feature detectors' findings
/// when no template matched strongly enough.
#[derive(Debug)]
pub enum MatchResult<'a> {
    Template {
        template: &'a CompiledTemplate,
        confidence: f32,
    },
    Generic(GenericFeatures),
}

impl MatchResult<'_> {
    pub fn confidence(&self) -> f32 {
        match self {
            MatchResult::Template { confidence, .. } => *confidence,
            MatchResult::Generic(g) => g.confidence,
        }
    }
}

/// What the generic fallback detectors found, each with its own confidence.
#[derive(Debug, Clone, Default)]
pub struct GenericFeatures {
    pub store_name: Option<(String, f32)>,
    pub date: Option<(NaiveDate, f32)>,
    pub total: Option<(Money, f32)>,
    pub item_line_count: Option<(usize, f32)>,
    /// Mean confidence of the detectors that fired.
    pub confidence: f32,
}

/// Score every template against the text, preferring spatially-bounded
/// matching when blocks are available. Falls back to the generic detectors
/// when no template clears the strong threshold.
pub fn find_best_match<'a>(
    text: &str,
    blocks: &[TextBlock],
    catalog: &'a TemplateCatalog,
    tuning: &MatcherTuning,
    bands: &PreprocessTuning,
) -> Option<MatchResult<'a>> {
    let sections = if blocks.is_empty() {
        None
    } else {
        Some(spatial_sections(blocks, bands))
    };

    let mut best: Option<(&CompiledTemplate, f32)> = None;
    for template in catalog.templates() {
        if let Some(confidence) = score_template(template, text, sections.as_ref(), tuning) {
            if best.map_or(true, |(_, c)| confidence > c) {
                best = Some((template, confidence));
            }
        }
    }

    if let Some((template, confidence)) = best {
        if confidence >= tuning.strong_threshold {
            return Some(MatchResult::Template { template, confidence });
        }
        debug!(
            template = %template.store_id,
            confidence,
            "best template below strong threshold, trying generic detectors"
        );
    }

    if let Some(generic) = detect_generic(text, tuning) {
        return Some(MatchResult::Generic(generic));
    }

    best.map(|(template, confidence)| MatchResult::Template { template, confidence })
}

/// Mean of the non-zero per-section confidences, or `None` when the template
/// is rejected outright (no store pattern hit, or below the accept bar).
fn score_template(
    template: &CompiledTemplate,
    text: &str,
    sections: Option<&SectionMap>,
    tuning: &MatcherTuning,
) -> Option<f32> {
    let store_hits = template
        .store_patterns
        .iter()
        .filter(|re| re.is_match(text))
        .count();
    if store_hits == 0 {
        return None;
    }
    // Uncapped at this stage: several store patterns agreeing is signal.
    let store_confidence = store_hits as f32 * tuning.store_pattern_weight;

    let item_regexes: Vec<&Regex> = template.item_patterns.iter().map(|p| &p.regex).collect();
    let header_regexes: Vec<&Regex> = template.header_patterns.iter().collect();
    let footer_regexes: Vec<&Regex> = template.footer_patterns.iter().collect();
    let totals_regexes = template.totals_patterns.present();

    let section_confs = [
        (header_regexes.as_slice(), sections.and_then(|s| s.header.as_deref())),
        (item_regexes.as_slice(), sections.and_then(|s| s.items.as_deref())),
        (totals_regexes.as_slice(), sections.and_then(|s| s.totals.as_deref())),
        (footer_regexes.as_slice(), sections.and_then(|s| s.footer.as_deref())),
    ]
    .into_iter()
    .filter(|(regexes, _)| !regexes.is_empty())
    .map(|(regexes, band)| section_confidence(regexes, band, text));

    let mut sum = store_confidence;
    let mut count = 1usize;
    for conf in section_confs {
        if conf > 0.0 {
            sum += conf;
            count += 1;
        }
    }
    let overall = sum / count as f32;
    (overall > tuning.accept_threshold).then_some(overall)
}

/// Matched-pattern fraction against the spatial band, falling back to the
/// full text when the band yields nothing.
fn section_confidence(regexes: &[&Regex], band: Option<&str>, full_text: &str) -> f32 {
    let fraction = |haystack: &str| {
        let matched = regexes.iter().filter(|re| re.is_match(haystack)).count();
        matched as f32 / regexes.len() as f32
    };
    if let Some(band) = band {
        let conf = fraction(band);
        if conf > 0.0 {
            return conf;
        }
    }
    fraction(full_text)
}

/// Independent feature detectors used when templates fail. Returns `None`
/// when nothing at all fired.
fn detect_generic(text: &str, tuning: &MatcherTuning) -> Option<GenericFeatures> {
    let mut features = GenericFeatures {
        store_name: detect_store_name(text, tuning),
        date: detect_date(text, tuning),
        total: detect_total(text, tuning),
        item_line_count: detect_item_lines(text, tuning),
        confidence: 0.0,
    };

    let fired: Vec<f32> = [
        features.store_name.as_ref().map(|(_, c)| *c),
        features.date.as_ref().map(|(_, c)| *c),
        features.total.as_ref().map(|(_, c)| *c),
        features.item_line_count.as_ref().map(|(_, c)| *c),
    ]
    .into_iter()
    .flatten()
    .collect();

    if fired.is_empty() {
        return None;
    }
    features.confidence = fired.iter().sum::<f32>() / fired.len() as f32;
    Some(features)
}

fn detect_store_name(text: &str, tuning: &MatcherTuning) -> Option<(String, f32)> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    for line in lines.iter().take(5) {
        let lower = line.to_lowercase();
        if COMMON_RETAILERS.iter().any(|r| lower.contains(r)) {
            return Some((line.to_string(), tuning.retailer_hit_confidence));
        }
    }
    lines
        .iter()
        .find(|l| !l.is_empty())
        .map(|l| (l.to_string(), tuning.first_line_confidence))
}

// The keyword-fragment fallback lives in the date parser, where a context
// year is available to complete the date; here only full shapes count.
fn detect_date(text: &str, tuning: &MatcherTuning) -> Option<(NaiveDate, f32)> {
    date::scan_date_shapes(text).map(|d| (d, tuning.date_shape_confidence))
}

fn detect_total(text: &str, tuning: &MatcherTuning) -> Option<(Money, f32)> {
    if let Some(c) = re_labeled_total().captures(text) {
        if let Some(amount) = Money::parse_str(&c[1]) {
            return Some((amount, tuning.labeled_total_confidence));
        }
    }
    // Largest plausible dollar amount in the bottom third of the receipt.
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len() - lines.len() / 3;
    let floor = Money::from_decimal(rust_decimal::Decimal::try_from(tuning.min_plausible_total).ok()?);
    lines[start..]
        .iter()
        .flat_map(|l| re_any_amount().captures_iter(l))
        .filter_map(|c| Money::parse_str(&c[1]))
        .filter(|m| *m > floor)
        .max()
        .map(|m| (m, tuning.largest_amount_confidence))
}

fn detect_item_lines(text: &str, tuning: &MatcherTuning) -> Option<(usize, f32)> {
    let count = text
        .lines()
        .filter(|l| re_trailing_price().is_match(l))
        .count();
    (count > tuning.min_item_lines).then_some((count, tuning.item_lines_confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use recibo_core::BoundingBox;
    use recibo_templates::{ReceiptTemplate, TotalsPatterns};

    const WALMART: &str = "WALMART\n123 Main Street, Anytown\n01/15/2023 10:25 AM\nApple $2.99\nBananas 2 @ $0.59 $1.18\nSubtotal $13.94\nTax (6%) $0.84\nTotal $14.78";

    fn tuning() -> MatcherTuning {
        MatcherTuning::default()
    }

    fn bands() -> PreprocessTuning {
        PreprocessTuning::default()
    }

    fn block(text: &str, y: f32) -> TextBlock {
        TextBlock {
            text: text.to_string(),
            confidence: 0.9,
            bounding_box: BoundingBox::new(0.0, y, 100.0, 50.0),
            words: vec![],
        }
    }

    #[test]
    fn empty_text_and_catalog_yields_none() {
        let catalog = TemplateCatalog::empty();
        assert!(find_best_match("", &[], &catalog, &tuning(), &bands()).is_none());
    }

    #[test]
    fn builtin_walmart_template_wins() {
        let catalog = TemplateCatalog::builtin();
        match find_best_match(WALMART, &[], &catalog, &tuning(), &bands()) {
            Some(MatchResult::Template { template, confidence }) => {
                assert_eq!(template.store_name, "Walmart");
                assert!(confidence >= 0.6, "confidence {confidence}");
            }
            other => panic!("expected template match, got {other:?}"),
        }
    }

    #[test]
    fn unknown_store_falls_back_to_generic() {
        let text = "CORNER BODEGA\n02/01/2024\nSandwich $6.50\nCoffee $2.25\nChips $1.75\nTotal $10.50";
        let catalog = TemplateCatalog::builtin();
        match find_best_match(text, &[], &catalog, &tuning(), &bands()) {
            Some(MatchResult::Generic(g)) => {
                assert_eq!(g.store_name.as_ref().unwrap().0, "CORNER BODEGA");
                assert!(g.total.unwrap().0 == Money::from_cents(1050));
                assert!(g.item_line_count.unwrap().0 >= 3);
                assert!(g.confidence > 0.0);
            }
            other => panic!("expected generic match, got {other:?}"),
        }
    }

    #[test]
    fn invalid_template_regex_never_blocks_others() {
        // One template with an invalid store pattern (quarantined at load),
        // one valid — the valid one must still match.
        let raw = vec![
            ReceiptTemplate {
                store_id: "broken".into(),
                store_name: "Broken".into(),
                store_patterns: vec!["[unclosed".into()],
                header_patterns: vec![],
                item_patterns: vec![],
                totals_patterns: TotalsPatterns {
                    subtotal: None,
                    tax: None,
                    total: "total".into(),
                    tip: None,
                    discount: None,
                },
                date_patterns: vec![],
                payment_patterns: vec![],
                footer_patterns: vec![],
            },
            ReceiptTemplate {
                store_id: "walmart".into(),
                store_name: "Walmart".into(),
                store_patterns: vec![r"walmart".into()],
                header_patterns: vec![],
                item_patterns: vec![],
                totals_patterns: TotalsPatterns {
                    subtotal: Some("subtotal".into()),
                    tax: Some("tax".into()),
                    total: "total".into(),
                    tip: None,
                    discount: None,
                },
                date_patterns: vec![],
                payment_patterns: vec![],
                footer_patterns: vec![],
            },
        ];
        let catalog = TemplateCatalog::from_templates(raw).unwrap();
        match find_best_match(WALMART, &[], &catalog, &tuning(), &bands()) {
            Some(MatchResult::Template { template, .. }) => {
                assert_eq!(template.store_name, "Walmart");
            }
            other => panic!("expected template match, got {other:?}"),
        }
    }

    #[test]
    fn spatial_band_overrides_reach_template_scoring() {
        // Two header patterns; a narrowed header band catches only one of
        // them, so the template score must drop relative to the default band.
        let raw = vec![ReceiptTemplate {
            store_id: "walmart".into(),
            store_name: "Walmart".into(),
            store_patterns: vec!["WALMART".into(), r"WAL-?MART".into()],
            header_patterns: vec!["WALMART".into(), "GROCERY".into()],
            item_patterns: vec![],
            totals_patterns: TotalsPatterns {
                subtotal: None,
                tax: None,
                total: "total".into(),
                tip: None,
                discount: None,
            },
            date_patterns: vec![],
            payment_patterns: vec![],
            footer_patterns: vec![],
        }];
        let catalog = TemplateCatalog::from_templates(raw).unwrap();
        let text = "WALMART\nGROCERY OUTLET\nTotal $14.78\nThank you";
        let blocks = vec![
            block("WALMART", 0.0),
            block("GROCERY OUTLET", 100.0),
            block("Total $14.78", 700.0),
            block("Thank you", 950.0),
        ];

        let wide = match find_best_match(text, &blocks, &catalog, &tuning(), &bands()) {
            Some(MatchResult::Template { confidence, .. }) => confidence,
            other => panic!("expected template match, got {other:?}"),
        };
        let mut narrow_bands = bands();
        narrow_bands.header_max = 0.05;
        let narrow = match find_best_match(text, &blocks, &catalog, &tuning(), &narrow_bands) {
            Some(MatchResult::Template { confidence, .. }) => confidence,
            other => panic!("expected template match, got {other:?}"),
        };
        assert!(narrow < wide, "narrow {narrow} vs wide {wide}");
    }

    #[test]
    fn generic_detects_retailer_in_first_lines() {
        let text = "Receipt\nCOSTCO WHOLESALE #412\nitems follow";
        let (name, conf) = detect_store_name(text, &tuning()).unwrap();
        assert!(name.contains("COSTCO"));
        assert_eq!(conf, 0.9);
    }

    #[test]
    fn generic_first_line_fallback_is_half_confidence() {
        let text = "Mom & Pop Shop\nstuff";
        let (name, conf) = detect_store_name(text, &tuning()).unwrap();
        assert_eq!(name, "Mom & Pop Shop");
        assert_eq!(conf, 0.5);
    }

    #[test]
    fn detect_total_prefers_label_over_magnitude() {
        let text = "STORE\n$99.99 item\nTotal $10.00";
        let (total, conf) = detect_total(text, &tuning()).unwrap();
        assert_eq!(total, Money::from_cents(1000));
        assert_eq!(conf, 0.8);
    }

    #[test]
    fn detect_total_bottom_third_needs_plausible_amount() {
        let text = "A\nB\nC\nD\nE\nF\nG\nH\n$3.00";
        // $3.00 is under the plausibility floor.
        assert!(detect_total(text, &tuning()).is_none());
    }
}
