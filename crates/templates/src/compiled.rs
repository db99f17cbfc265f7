use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::template::{ItemPatternKind, ReceiptTemplate};

/// A template with every pattern compiled once, case-insensitively, at
/// catalog construction. Invalid patterns are quarantined here (skipped and
/// counted) so they can never fail again at match time.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    pub store_id: String,
    pub store_name: String,
    pub store_patterns: Vec<Regex>,
    pub header_patterns: Vec<Regex>,
    pub item_patterns: Vec<CompiledItemPattern>,
    pub totals_patterns: CompiledTotalsPatterns,
    pub date_patterns: Vec<Regex>,
    pub payment_patterns: Vec<Regex>,
    pub footer_patterns: Vec<Regex>,
    /// How many configured patterns failed to compile and were dropped.
    pub quarantined: usize,
}

#[derive(Debug, Clone)]
pub struct CompiledItemPattern {
    pub regex: Regex,
    pub kind: ItemPatternKind,
}

#[derive(Debug, Clone, Default)]
pub struct CompiledTotalsPatterns {
    pub subtotal: Option<Regex>,
    pub tax: Option<Regex>,
    pub total: Option<Regex>,
    pub tip: Option<Regex>,
    pub discount: Option<Regex>,
}

impl CompiledTotalsPatterns {
    /// Patterns configured for this template (present, compiled or not the
    /// caller's concern — quarantined ones are already `None`).
    pub fn present(&self) -> Vec<&Regex> {
        [
            self.subtotal.as_ref(),
            self.tax.as_ref(),
            self.total.as_ref(),
            self.tip.as_ref(),
            self.discount.as_ref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl CompiledTemplate {
    /// Compile a raw template. Returns `None` when the template is unusable:
    /// no store pattern survived compilation, so it could never match.
    pub fn compile(raw: &ReceiptTemplate) -> Option<Self> {
        let mut quarantined = 0usize;

        let store_patterns = compile_set(&raw.store_id, "store", &raw.store_patterns, &mut quarantined);
        if store_patterns.is_empty() {
            warn!(
                template = %raw.store_id,
                "rejecting template: no usable store pattern"
            );
            return None;
        }

        let header_patterns =
            compile_set(&raw.store_id, "header", &raw.header_patterns, &mut quarantined);
        let date_patterns = compile_set(&raw.store_id, "date", &raw.date_patterns, &mut quarantined);
        let payment_patterns =
            compile_set(&raw.store_id, "payment", &raw.payment_patterns, &mut quarantined);
        let footer_patterns =
            compile_set(&raw.store_id, "footer", &raw.footer_patterns, &mut quarantined);

        let item_patterns = raw
            .item_patterns
            .iter()
            .filter_map(|p| match compile_one(&p.pattern) {
                Ok(regex) => Some(CompiledItemPattern { regex, kind: p.kind }),
                Err(e) => {
                    warn!(template = %raw.store_id, pattern = %p.pattern, "skipping invalid item pattern: {e}");
                    quarantined += 1;
                    None
                }
            })
            .collect();

        let tp = &raw.totals_patterns;
        let totals_patterns = CompiledTotalsPatterns {
            subtotal: compile_opt(&raw.store_id, "subtotal", tp.subtotal.as_deref(), &mut quarantined),
            tax: compile_opt(&raw.store_id, "tax", tp.tax.as_deref(), &mut quarantined),
            total: compile_opt(&raw.store_id, "total", Some(&tp.total), &mut quarantined),
            tip: compile_opt(&raw.store_id, "tip", tp.tip.as_deref(), &mut quarantined),
            discount: compile_opt(&raw.store_id, "discount", tp.discount.as_deref(), &mut quarantined),
        };

        Some(CompiledTemplate {
            store_id: raw.store_id.clone(),
            store_name: raw.store_name.clone(),
            store_patterns,
            header_patterns,
            item_patterns,
            totals_patterns,
            date_patterns,
            payment_patterns,
            footer_patterns,
            quarantined,
        })
    }

    /// Whether any store pattern matches the given text.
    pub fn matches_store(&self, text: &str) -> bool {
        self.store_patterns.iter().any(|re| re.is_match(text))
    }
}

// Multi-line so `^`/`$`-anchored line patterns work against whole-receipt
// text as well as single lines.
fn compile_one(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
}

fn compile_set(
    template_id: &str,
    section: &str,
    patterns: &[String],
    quarantined: &mut usize,
) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match compile_one(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(template = %template_id, section, pattern = %p, "skipping invalid pattern: {e}");
                *quarantined += 1;
                None
            }
        })
        .collect()
}

fn compile_opt(
    template_id: &str,
    field: &str,
    pattern: Option<&str>,
    quarantined: &mut usize,
) -> Option<Regex> {
    let pattern = pattern?;
    match compile_one(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(template = %template_id, field, pattern = %pattern, "skipping invalid totals pattern: {e}");
            *quarantined += 1;
            None
        }
    }
}
