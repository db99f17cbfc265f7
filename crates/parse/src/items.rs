use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use recibo_core::{ItemCategory, Money, ParserResult, ReceiptItem};
use recibo_templates::ItemPatternKind;

use crate::context::ParseContext;
use crate::normalize::re;
use crate::tuning::ItemsTuning;

re!(
    re_items_header,
    r"(?i)item.*(?:qty|quantity).*price|description.*(?:amount|price)|qty.*item"
);
re!(re_separator, r"^[-=*_]{5,}$");
re!(
    re_section_end,
    r"(?i)\b(sub\s*-?\s*total|total|tax|balance|amount\s+due|change\s+due)\b"
);
re!(re_qty_name_price, r"^(\d{1,3})\s+([A-Za-z].*?)\s+\$?(-?\d+\.\d{2})$");
re!(re_name_price, r"^([A-Za-z][A-Za-z .,'&%/-]*?)\s+\$?(-?\d+\.\d{2})$");
re!(
    re_name_qty_at,
    r"^(.+?)\s+(\d+(?:\.\d+)?)\s*@\s*\$?(\d+\.\d{2})\s+\$?(-?\d+\.\d{2})$"
);
re!(
    re_name_qty_x,
    r"^(.+?)\s+(\d+(?:\.\d+)?)\s*[xX*]\s*\$?(\d+\.\d{2})\s+\$?(-?\d+\.\d{2})$"
);
re!(re_price_token, r"\$?(-?\d+\.\d{2})");
re!(re_embedded_qty, r"(?i)\b(\d+(?:\.\d+)?)\s*(?:x\b|ea\b|@)");

/// Keyword → category, first match wins. Unmatched items stay uncategorized.
const CATEGORY_KEYWORDS: &[(&str, ItemCategory)] = &[
    // Longer phrases first so "ice cream" is not swallowed by "cream".
    ("ice cream", ItemCategory::Frozen),
    ("milk", ItemCategory::Dairy),
    ("cheese", ItemCategory::Dairy),
    ("yogurt", ItemCategory::Dairy),
    ("butter", ItemCategory::Dairy),
    ("cream", ItemCategory::Dairy),
    ("egg", ItemCategory::Dairy),
    ("bread", ItemCategory::Bakery),
    ("bagel", ItemCategory::Bakery),
    ("muffin", ItemCategory::Bakery),
    ("croissant", ItemCategory::Bakery),
    ("cake", ItemCategory::Bakery),
    ("donut", ItemCategory::Bakery),
    ("chicken", ItemCategory::Meat),
    ("beef", ItemCategory::Meat),
    ("pork", ItemCategory::Meat),
    ("turkey", ItemCategory::Meat),
    ("ham", ItemCategory::Meat),
    ("bacon", ItemCategory::Meat),
    ("sausage", ItemCategory::Meat),
    ("steak", ItemCategory::Meat),
    ("fish", ItemCategory::Seafood),
    ("salmon", ItemCategory::Seafood),
    ("tuna", ItemCategory::Seafood),
    ("shrimp", ItemCategory::Seafood),
    ("apple", ItemCategory::Produce),
    ("banana", ItemCategory::Produce),
    ("orange", ItemCategory::Produce),
    ("lettuce", ItemCategory::Produce),
    ("tomato", ItemCategory::Produce),
    ("potato", ItemCategory::Produce),
    ("onion", ItemCategory::Produce),
    ("carrot", ItemCategory::Produce),
    ("grape", ItemCategory::Produce),
    ("soda", ItemCategory::Beverages),
    ("juice", ItemCategory::Beverages),
    ("coffee", ItemCategory::Beverages),
    ("tea", ItemCategory::Beverages),
    ("water", ItemCategory::Beverages),
    ("beer", ItemCategory::Beverages),
    ("wine", ItemCategory::Beverages),
    ("cola", ItemCategory::Beverages),
    ("chip", ItemCategory::Snacks),
    ("cookie", ItemCategory::Snacks),
    ("candy", ItemCategory::Snacks),
    ("chocolate", ItemCategory::Snacks),
    ("cracker", ItemCategory::Snacks),
    ("popcorn", ItemCategory::Snacks),
    ("frozen", ItemCategory::Frozen),
    ("pizza", ItemCategory::Frozen),
    ("rice", ItemCategory::Pantry),
    ("pasta", ItemCategory::Pantry),
    ("cereal", ItemCategory::Pantry),
    ("flour", ItemCategory::Pantry),
    ("sugar", ItemCategory::Pantry),
    ("soup", ItemCategory::Pantry),
    ("sauce", ItemCategory::Pantry),
    ("bean", ItemCategory::Pantry),
    ("paper", ItemCategory::Household),
    ("towel", ItemCategory::Household),
    ("detergent", ItemCategory::Household),
    ("soap", ItemCategory::Household),
    ("cleaner", ItemCategory::Household),
    ("tissue", ItemCategory::Household),
    ("shampoo", ItemCategory::PersonalCare),
    ("toothpaste", ItemCategory::PersonalCare),
    ("deodorant", ItemCategory::PersonalCare),
    ("lotion", ItemCategory::PersonalCare),
];

/// Extract line items from the items section: store-template patterns first
/// (when the store stage resolved one), then the generic shapes, then an
/// unstructured trailing-price fallback per leftover line.
pub fn parse(
    text: &str,
    ctx: &ParseContext<'_>,
    tuning: &ItemsTuning,
) -> ParserResult<Vec<ReceiptItem>> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut errors: Vec<String> = Vec::new();

    let (start, end) = locate_section(&lines, &mut errors);

    let candidates: Vec<&str> = lines[start..end]
        .iter()
        .copied()
        .filter(|l| is_candidate(l, tuning))
        .collect();

    let mut items = match ctx.template {
        Some(template) => template_items(&candidates, template, tuning),
        None => Vec::new(),
    };
    if items.is_empty() {
        items = generic_items(&candidates, tuning);
    }

    if items.is_empty() {
        errors.push("Could not identify any line items".to_string());
    }

    for item in &mut items {
        postprocess(item);
    }

    let mut base = tuning.base_confidence;
    if items.len() < tuning.few_items && !errors.is_empty() {
        base *= tuning.few_items_penalty;
    }
    if items.is_empty() {
        base = tuning.zero_items_confidence;
    }
    let item_mean = if items.is_empty() {
        0.0
    } else {
        items.iter().map(|i| i.confidence).sum::<f32>() / items.len() as f32
    };
    let confidence = tuning.base_weight * base + tuning.item_weight * item_mean;

    ParserResult::with_errors(items, confidence, errors)
}

/// Header-like line (or separator) starts the section; a totals keyword or
/// separator ends it. Missing boundaries fall back to percentage guesses.
fn locate_section(lines: &[&str], errors: &mut Vec<String>) -> (usize, usize) {
    let n = lines.len();
    let header = lines
        .iter()
        .position(|l| re_items_header().is_match(l) || re_separator().is_match(l));
    let start = header.map(|i| i + 1);

    let search_from = start.unwrap_or(0);
    let terminator = (search_from..n)
        .find(|&i| re_section_end().is_match(lines[i]) || (start.is_some() && re_separator().is_match(lines[i])));

    if header.is_none() && terminator.is_none() {
        errors.push("Could not identify items section".to_string());
    }

    let start = start.unwrap_or_else(|| 5.min(n / 5));
    let mut end = terminator.unwrap_or_else(|| n.saturating_sub(5));
    if end <= start {
        end = n;
    }
    (start, end)
}

fn is_candidate(line: &str, tuning: &ItemsTuning) -> bool {
    line.len() >= tuning.min_line_len
        && !re_items_header().is_match(line)
        && !re_separator().is_match(line)
        && !re_section_end().is_match(line)
}

/// Per candidate line, the first template pattern that matches produces the
/// item. Lines no pattern recognizes are dropped, not guessed at; a store
/// template is a claim about the whole layout.
fn template_items(
    candidates: &[&str],
    template: &recibo_templates::CompiledTemplate,
    tuning: &ItemsTuning,
) -> Vec<ReceiptItem> {
    let items: Vec<ReceiptItem> = candidates
        .iter()
        .filter_map(|line| {
            template.item_patterns.iter().find_map(|pattern| {
                item_from_captures(&pattern.regex, pattern.kind, line, tuning.template_confidence)
            })
        })
        .collect();
    if !items.is_empty() {
        debug!(template = %template.store_id, count = items.len(), "template item patterns matched");
    }
    items
}

/// Build an item from a tagged pattern's capture groups. The tag, not the
/// pattern text, dictates which group means what.
fn item_from_captures(
    regex: &Regex,
    kind: ItemPatternKind,
    line: &str,
    confidence: f32,
) -> Option<ReceiptItem> {
    let c = regex.captures(line)?;
    let mut item = match kind {
        ItemPatternKind::NamePrice => {
            ReceiptItem::new(c.get(1)?.as_str().trim(), Money::parse_str(c.get(2)?.as_str())?, confidence)
        }
        ItemPatternKind::QtyNamePrice => {
            let mut item = ReceiptItem::new(
                c.get(2)?.as_str().trim(),
                Money::parse_str(c.get(3)?.as_str())?,
                confidence,
            );
            item.quantity = c.get(1)?.as_str().parse().unwrap_or(Decimal::ONE);
            item
        }
        ItemPatternKind::NameQtyUnitPrice => {
            let mut item = ReceiptItem::new(
                c.get(1)?.as_str().trim(),
                Money::parse_str(c.get(4)?.as_str())?,
                confidence,
            );
            item.quantity = c.get(2)?.as_str().parse().unwrap_or(Decimal::ONE);
            item.unit_price = Money::parse_str(c.get(3)?.as_str());
            item
        }
    };
    if item.quantity < Decimal::ONE {
        item.quantity = Decimal::ONE;
    }
    Some(item)
}

/// Ordered generic shapes per line, then the unstructured fallback for any
/// line that still carries a price-shaped token.
fn generic_items(candidates: &[&str], tuning: &ItemsTuning) -> Vec<ReceiptItem> {
    let mut items = Vec::new();
    for line in candidates {
        let shaped = item_from_captures(re_qty_name_price(), ItemPatternKind::QtyNamePrice, line, tuning.generic_confidence)
            .or_else(|| item_from_captures(re_name_price(), ItemPatternKind::NamePrice, line, tuning.generic_confidence))
            .or_else(|| item_from_captures(re_name_qty_at(), ItemPatternKind::NameQtyUnitPrice, line, tuning.generic_confidence))
            .or_else(|| item_from_captures(re_name_qty_x(), ItemPatternKind::NameQtyUnitPrice, line, tuning.generic_confidence));

        if let Some(item) = shaped {
            items.push(item);
        } else if let Some(item) = unstructured_item(line, tuning.fallback_confidence) {
            items.push(item);
        }
    }
    items
}

/// Best effort: trailing price token is the price, the rest is the name,
/// with an embedded `N x|@|ea` quantity token stripped out of the name.
fn unstructured_item(line: &str, confidence: f32) -> Option<ReceiptItem> {
    let last = re_price_token().captures_iter(line).last()?;
    let price = Money::parse_str(&last[1])?;
    let price_span = last.get(0)?.range();
    let mut name = format!("{}{}", &line[..price_span.start], &line[price_span.end..]);

    let mut quantity = Decimal::ONE;
    let name_scan = name.clone();
    if let Some(q) = re_embedded_qty().captures(&name_scan) {
        quantity = q[1].parse().unwrap_or(Decimal::ONE);
        if let Some(m) = q.get(0) {
            name.replace_range(m.range(), "");
        }
    }
    let name = name
        .trim_matches(|ch: char| ch.is_whitespace() || ch == '$' || ch == '-')
        .trim()
        .to_string();
    if name.is_empty() {
        return None;
    }
    let mut item = ReceiptItem::new(name, price, confidence);
    item.quantity = quantity.max(Decimal::ONE);
    Some(item)
}

fn postprocess(item: &mut ReceiptItem) {
    // Only a unit price read off the line itself can witness an overcharge;
    // a backfilled price/quantity division rounds and would re-multiply dirty.
    let overcharged = item
        .unit_price
        .map(|u| u.mul_decimal(item.quantity) > item.price)
        .unwrap_or(false);
    if item.unit_price.is_none() {
        item.unit_price = item.price.div_decimal(item.quantity);
    }
    let lower = item.name.to_lowercase();
    item.discounted = lower.contains("discount") || item.price.is_negative() || overcharged;
    item.category = CATEGORY_KEYWORDS
        .iter()
        .find(|(kw, _)| lower.contains(kw))
        .map(|(_, cat)| *cat);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::{bare_context, today};
    use crate::context::ParseContext;
    use recibo_templates::TemplateCatalog;

    fn run(text: &str) -> ParserResult<Vec<ReceiptItem>> {
        parse(text, &bare_context(today()), &ItemsTuning::default())
    }

    const RECEIPT: &str = "WALMART\nItem Qty Price\nApple $2.99\nBananas 2 @ $0.59 $1.18\nMilk 2% Gal 3.49\nSubtotal $13.94\nTax $0.84\nTotal $14.78";

    #[test]
    fn header_and_totals_bound_the_section() {
        let r = run(RECEIPT);
        assert_eq!(r.data.len(), 3);
        assert!(r.errors.is_empty());
    }

    #[test]
    fn generic_shapes_extract_quantity_forms() {
        let r = run(RECEIPT);
        let bananas = &r.data[1];
        assert_eq!(bananas.name, "Bananas");
        assert_eq!(bananas.quantity, Decimal::from(2));
        assert_eq!(bananas.unit_price, Some(Money::from_cents(59)));
        assert_eq!(bananas.price, Money::from_cents(118));
    }

    #[test]
    fn unstructured_fallback_strips_quantity_token() {
        let text = "STORE\n====================\nGranola 3 @ bulk bin 8.97\n--------------------\nTotal $8.97";
        let r = run(text);
        assert_eq!(r.data.len(), 1);
        let item = &r.data[0];
        assert_eq!(item.quantity, Decimal::from(3));
        assert_eq!(item.price, Money::from_cents(897));
        assert!(item.name.contains("Granola"));
        assert_eq!(item.confidence, 0.5);
    }

    #[test]
    fn qty_name_price_shape() {
        let r = run("STORE\nItem Qty Price\n2 Sparkling Water 4.50\nTotal $4.50");
        assert_eq!(r.data.len(), 1);
        assert_eq!(r.data[0].quantity, Decimal::from(2));
        assert_eq!(r.data[0].name, "Sparkling Water");
    }

    #[test]
    fn template_patterns_take_priority() {
        let catalog = TemplateCatalog::builtin();
        let template = catalog.match_store("WALMART").unwrap();
        let mut ctx = ParseContext::new(&catalog, &[], today());
        ctx.template = Some(template);
        let r = parse(RECEIPT, &ctx, &ItemsTuning::default());
        assert!(!r.data.is_empty());
        assert!(r.data.iter().all(|i| i.confidence == 0.8));
    }

    #[test]
    fn unit_price_backfilled_from_price() {
        let r = run(RECEIPT);
        let apple = &r.data[0];
        assert_eq!(apple.unit_price, Some(Money::from_cents(299)));
    }

    #[test]
    fn categories_assigned_by_keyword() {
        let r = run(RECEIPT);
        assert_eq!(r.data[0].category, Some(ItemCategory::Produce)); // Apple
        assert_eq!(r.data[1].category, Some(ItemCategory::Produce)); // Bananas
        assert_eq!(r.data[2].category, Some(ItemCategory::Dairy)); // Milk
    }

    #[test]
    fn negative_price_marks_discounted() {
        let r = run("STORE\nItem Qty Price\nCoupon Savings -1.50\nTotal $10.00");
        assert_eq!(r.data.len(), 1);
        assert!(r.data[0].discounted);
        assert!(r.data[0].price.is_negative());
    }

    #[test]
    fn discount_keyword_marks_discounted() {
        let r = run("STORE\nItem Qty Price\nMember Discount 2.00\nTotal $10.00");
        assert!(r.data[0].discounted);
    }

    #[test]
    fn backfilled_unit_price_never_marks_discounted() {
        // 2.00 / 3 rounds to 0.67; multiplying that back overshoots the line
        // price, which must not count as a markdown.
        let r = run("STORE\nItem Qty Price\n3 Gum Pack 2.00\nTotal $2.00");
        assert_eq!(r.data.len(), 1);
        assert_eq!(r.data[0].quantity, Decimal::from(3));
        assert_eq!(r.data[0].unit_price, Some(Money::from_cents(67)));
        assert!(!r.data[0].discounted);
    }

    #[test]
    fn extracted_unit_price_below_full_marks_discounted() {
        let r = run("STORE\nItem Qty Price\nCandy 3 @ $0.75 $2.00\nTotal $2.00");
        assert_eq!(r.data.len(), 1);
        assert_eq!(r.data[0].unit_price, Some(Money::from_cents(75)));
        assert!(r.data[0].discounted);
    }

    #[test]
    fn short_lines_are_excluded() {
        let r = run("STORE\nItem Qty Price\nab\n1.99\nTotal $1.99");
        assert!(r.data.is_empty());
    }

    #[test]
    fn empty_text_degrades_with_errors() {
        let r = run("");
        assert!(r.data.is_empty());
        assert!(r.errors.iter().any(|e| e.contains("items section")));
        assert!(r.errors.iter().any(|e| e.contains("line items")));
        // Forced floor: 0.4 × 0.2 + 0.6 × 0.
        assert!((r.confidence - 0.08).abs() < 1e-4);
    }

    #[test]
    fn aggregate_confidence_blends_base_and_items() {
        let r = run(RECEIPT);
        // Two shaped items at 0.7, one fallback at 0.5, no errors:
        // 0.4 × 0.8 + 0.6 × mean(0.7, 0.7, 0.5).
        assert!((r.confidence - 0.70).abs() < 1e-3, "got {}", r.confidence);
    }
}
