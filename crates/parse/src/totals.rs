use rust_decimal::Decimal;
use tracing::debug;

use recibo_core::{Money, ParserResult, ReceiptTotals};

use crate::context::ParseContext;
use crate::normalize::re;
use crate::tuning::TotalsTuning;

re!(re_amount_2dp, r"(-?\d+(?:,\d{3})*\.\d{2})");
re!(re_amount_any, r"(-?\d+\.\d+)");
re!(re_kw_subtotal, r"(?i)\bsub\s*-?\s*total\b");
re!(
    re_kw_total,
    r"(?i)\b(?:total|amount\s+due|balance\s+due|grand\s+total|total\s+due)\b"
);
re!(re_kw_tax, r"(?i)\b(?:tax|hst|gst|pst|vat)\b");
re!(re_kw_tip, r"(?i)\b(?:tip|gratuity)\b");
re!(re_kw_discount, r"(?i)\b(?:discount|savings|coupon)\b");

/// First currency-shaped number on a line (`13.94` in `Subtotal $13.94`),
/// else any bare decimal, else zero.
pub fn extract_amount_from_line(line: &str) -> Money {
    if let Some(c) = re_amount_2dp().captures(line) {
        if let Some(m) = Money::parse_str(&c[1]) {
            return m;
        }
    }
    if let Some(c) = re_amount_any().captures(line) {
        if let Some(m) = Money::parse_str(&c[1]) {
            return m;
        }
    }
    Money::zero()
}

/// Extract and reconcile subtotal/tax/total/tip/discount. With items in
/// context, the items sum backs a missing subtotal and cross-checks a
/// present one.
pub fn parse(
    text: &str,
    ctx: &ParseContext<'_>,
    tuning: &TotalsTuning,
) -> ParserResult<ReceiptTotals> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let section = locate_section(&lines, tuning);

    let mut totals = ReceiptTotals::default();
    let mut tip_found = false;
    let mut discount_found = false;
    let mut subtotal_found = false;
    let mut total_found = false;
    let mut tax_found = false;

    for line in &lines[section.clone()] {
        let is_subtotal_line = re_kw_subtotal().is_match(line);
        if !subtotal_found && is_subtotal_line {
            let amount = extract_amount_from_line(line);
            if !amount.is_zero() {
                totals.subtotal = amount;
                subtotal_found = true;
            }
        }
        if !total_found && !is_subtotal_line && re_kw_total().is_match(line) {
            let amount = extract_amount_from_line(line);
            if !amount.is_zero() {
                totals.total = amount;
                total_found = true;
            }
        }
        if !tax_found && re_kw_tax().is_match(line) {
            let amount = extract_amount_from_line(line);
            if !amount.is_zero() {
                totals.tax = amount;
                tax_found = true;
            }
        }
        if !tip_found && re_kw_tip().is_match(line) {
            let amount = extract_amount_from_line(line);
            if !amount.is_zero() {
                totals.tip = Some(amount);
                tip_found = true;
            }
        }
        if !discount_found && re_kw_discount().is_match(line) {
            let amount = extract_amount_from_line(line);
            if !amount.is_zero() {
                totals.discount = Some(amount.abs());
                discount_found = true;
            }
        }
    }

    let mut errors: Vec<String> = Vec::new();
    if !total_found {
        errors.push("Total amount not found".to_string());
    }
    if !subtotal_found {
        errors.push("Subtotal amount not found".to_string());
    }

    reconcile(&mut totals, ctx, tuning, &mut errors);

    let mut confidence = tuning.base_confidence;
    if !total_found {
        confidence *= tuning.missing_total_penalty;
    }
    if !subtotal_found {
        confidence *= tuning.missing_subtotal_penalty;
    }
    let drift = (totals.computed_total() - totals.total).abs();
    if drift > money(tuning.inconsistent_dollars) {
        confidence *= tuning.inconsistent_penalty;
    } else if !totals.total.is_zero() && drift < money(tuning.consistent_dollars) {
        confidence = (confidence + tuning.consistent_bonus).min(1.0);
    }

    ParserResult::with_errors(totals, confidence, errors)
}

/// First subtotal line, else a total line in the trailing fraction with
/// 3 lines of leading context, else the trailing fraction; capped.
fn locate_section(lines: &[&str], tuning: &TotalsTuning) -> std::ops::Range<usize> {
    let n = lines.len();
    if n == 0 {
        return 0..0;
    }
    let tail_start = n.saturating_sub(((n as f32) * tuning.tail_fraction).ceil() as usize);

    let start = lines
        .iter()
        .position(|l| re_kw_subtotal().is_match(l))
        .or_else(|| {
            (tail_start..n)
                .find(|&i| re_kw_total().is_match(lines[i]))
                .map(|i| i.saturating_sub(3))
        })
        .unwrap_or(tail_start);

    start..(start + tuning.section_cap).min(n)
}

fn reconcile(
    totals: &mut ReceiptTotals,
    ctx: &ParseContext<'_>,
    tuning: &TotalsTuning,
    errors: &mut Vec<String>,
) {
    let items_sum = ctx.items_sum();
    let have_items = !ctx.items.is_empty();

    if totals.subtotal.is_zero() && have_items {
        debug!(%items_sum, "adopting items sum as subtotal");
        totals.subtotal = items_sum;
    } else if have_items && !totals.subtotal.is_zero() {
        let diff = (items_sum - totals.subtotal).abs();
        let fraction = totals
            .subtotal
            .mul_decimal(Decimal::try_from(tuning.mismatch_fraction).unwrap_or_default());
        if diff > money(tuning.mismatch_dollars) && diff > fraction {
            errors.push(format!(
                "Items sum {items_sum} does not match subtotal {}",
                totals.subtotal
            ));
        }
    }

    if totals.total.is_zero() && !totals.subtotal.is_zero() {
        totals.total = totals.computed_total();
    }

    if totals.tax.is_zero() && !totals.subtotal.is_zero() && !totals.total.is_zero() {
        let derived = totals.total - totals.subtotal
            + totals.discount.unwrap_or_else(Money::zero)
            - totals.tip.unwrap_or_else(Money::zero);
        if !derived.is_negative() && !derived.is_zero() {
            match derived.ratio(totals.subtotal) {
                Some(rate) if in_tax_band(rate, tuning) => {
                    totals.tax = derived;
                    errors.push("Tax inferred from subtotal and total".to_string());
                }
                _ => {
                    errors.push("Derived tax rate is implausible".to_string());
                }
            }
        }
    }

    if totals.total < totals.subtotal && totals.discount.is_none() {
        errors.push("Total is less than subtotal without a discount".to_string());
    }

    if !totals.tax.is_zero() && !totals.subtotal.is_zero() {
        if let Some(rate) = totals.tax.ratio(totals.subtotal) {
            if !in_tax_band(rate, tuning) {
                errors.push(format!("Unusual tax rate: {:.1}%", rate * Decimal::from(100)));
            }
        }
    }
}

fn in_tax_band(rate: Decimal, tuning: &TotalsTuning) -> bool {
    let min = Decimal::try_from(tuning.tax_rate_min).unwrap_or_default();
    let max = Decimal::try_from(tuning.tax_rate_max).unwrap_or_default();
    rate >= min && rate <= max
}

fn money(v: f32) -> Money {
    Money::from_decimal(Decimal::try_from(v).unwrap_or_default())
}
