use rust_decimal::Decimal;

use recibo_core::{Money, TextBlock};

use crate::normalize::{correct_ocr_errors, normalize, re};
use crate::tuning::PreprocessTuning;

re!(re_totals_keyword, r"(?i)\b(total|subtotal|tax|balance|sum|amount due)\b");
re!(re_pp_name_price, r"^([A-Za-z][A-Za-z .,'&-]+?)\s+\$?(-?\d+\.\d{2})$");
re!(
    re_pp_qty_x,
    r"^(.+?)\s+(\d+(?:\.\d+)?)\s*[xX]\s*\$?(\d+\.\d{2})\s+\$?(-?\d+\.\d{2})$"
);
re!(
    re_pp_qty_at,
    r"^(.+?)\s+(\d+(?:\.\d+)?)\s*@\s*\$?(\d+\.\d{2})\s+\$?(-?\d+\.\d{2})$"
);

/// Candidate receipt regions, as joined text. Bands overlap by design, so a
/// line can appear in more than one section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionMap {
    pub header: Option<String>,
    pub items: Option<String>,
    pub totals: Option<String>,
    pub footer: Option<String>,
}

impl SectionMap {
    fn found(&self) -> (bool, bool, bool, bool) {
        (
            self.header.is_some(),
            self.items.is_some(),
            self.totals.is_some(),
            self.footer.is_some(),
        )
    }
}

/// A line item as the preprocessor sees it, before the item parser's
/// post-processing (categories, discount flags).
#[derive(Debug, Clone, PartialEq)]
pub struct RawLineItem {
    pub name: String,
    pub quantity: Decimal,
    pub unit_price: Option<Money>,
    pub price: Money,
}

#[derive(Debug, Clone)]
pub struct PreprocessResult {
    /// Normalized, OCR-corrected text all later stages consume.
    pub enhanced_text: String,
    pub sections: SectionMap,
    pub line_items: Vec<RawLineItem>,
    pub confidence: f32,
}

/// Segment the receipt into header/items/totals/footer regions and pull a
/// preliminary item list. Spatial mode when blocks are available, line-index
/// percentages otherwise.
pub fn preprocess(text: &str, blocks: &[TextBlock], tuning: &PreprocessTuning) -> PreprocessResult {
    let enhanced_text = correct_ocr_errors(&normalize(text));
    let lines: Vec<&str> = enhanced_text.lines().collect();

    let spatial = !blocks.is_empty();
    let sections = if spatial {
        spatial_sections(blocks, tuning)
    } else {
        text_sections(&lines, tuning)
    };

    let line_items = extract_line_items(&lines);

    let base = if spatial { tuning.base_spatial } else { tuning.base_text };
    let (header, items, totals, footer) = sections.found();
    let mut confidence = base;
    for present in [header, items, totals] {
        if present {
            confidence += tuning.section_bonus;
        }
    }
    if footer {
        confidence += tuning.footer_bonus;
    }
    if line_items.is_empty() {
        confidence -= tuning.zero_items_penalty;
    } else {
        confidence +=
            (line_items.len() as f32 * tuning.item_bonus_each).min(tuning.item_bonus_cap);
    }

    PreprocessResult {
        enhanced_text,
        sections,
        line_items,
        confidence: confidence.clamp(0.0, 1.0),
    }
}

/// Partition blocks into overlapping vertical percentage bands.
pub(crate) fn spatial_sections(blocks: &[TextBlock], tuning: &PreprocessTuning) -> SectionMap {
    let mut sorted: Vec<&TextBlock> = blocks.iter().collect();
    sorted.sort_by(|a, b| {
        a.bounding_box
            .y
            .partial_cmp(&b.bounding_box.y)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let top = sorted
        .first()
        .map(|b| b.bounding_box.y)
        .unwrap_or_default();
    let bottom = sorted
        .iter()
        .map(|b| b.bounding_box.bottom())
        .fold(top, f32::max);
    let extent = (bottom - top).max(f32::EPSILON);

    let mut header = Vec::new();
    let mut items = Vec::new();
    let mut totals = Vec::new();
    let mut footer = Vec::new();

    for block in &sorted {
        let rel = (block.bounding_box.center_y() - top) / extent;
        if rel <= tuning.header_max {
            header.push(block.text.as_str());
        }
        if rel >= tuning.items_min && rel <= tuning.items_max {
            items.push(block.text.as_str());
        }
        if rel >= tuning.totals_min && rel <= tuning.totals_max {
            totals.push(block.text.as_str());
        }
        if rel >= tuning.footer_min {
            footer.push(block.text.as_str());
        }
    }

    // Imprecise layouts sometimes leave the totals band empty; fall back to
    // a keyword scan across every block.
    if totals.is_empty() {
        totals = sorted
            .iter()
            .filter(|b| re_totals_keyword().is_match(&b.text))
            .map(|b| b.text.as_str())
            .collect();
    }

    SectionMap {
        header: join_nonempty(&header),
        items: join_nonempty(&items),
        totals: join_nonempty(&totals),
        footer: join_nonempty(&footer),
    }
}

/// The same percentage logic applied to line indices when no spatial
/// information is available.
fn text_sections(lines: &[&str], tuning: &PreprocessTuning) -> SectionMap {
    let n = lines.len();
    if n == 0 {
        return SectionMap::default();
    }

    let rel = |i: usize| i as f32 / n as f32;

    let header: Vec<&str> = lines
        .iter()
        .enumerate()
        .filter(|(i, _)| rel(*i) <= tuning.header_max)
        .map(|(_, l)| *l)
        .collect();
    let items: Vec<&str> = lines
        .iter()
        .enumerate()
        .filter(|(i, _)| rel(*i) >= tuning.items_min && rel(*i) <= tuning.items_max)
        .map(|(_, l)| *l)
        .collect();
    let footer: Vec<&str> = lines
        .iter()
        .enumerate()
        .filter(|(i, _)| rel(*i) >= tuning.footer_min)
        .map(|(_, l)| *l)
        .collect();

    // Totals: first keyword hit in the bottom half, windowed 2 lines before
    // through 3 after; else the fallback band.
    let totals: Vec<&str> = match (n / 2..n).find(|&i| re_totals_keyword().is_match(lines[i])) {
        Some(hit) => {
            let start = hit.saturating_sub(2);
            let end = (hit + 4).min(n);
            lines[start..end].to_vec()
        }
        None => lines
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                rel(*i) >= tuning.totals_fallback_min && rel(*i) <= tuning.totals_fallback_max
            })
            .map(|(_, l)| *l)
            .collect(),
    };

    SectionMap {
        header: join_nonempty(&header),
        items: join_nonempty(&items),
        totals: join_nonempty(&totals),
        footer: join_nonempty(&footer),
    }
}

fn join_nonempty(parts: &[&str]) -> Option<String> {
    let joined = parts
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Ordered regex families applied to each candidate line in the middle
/// 20–70% range; first match wins per line.
pub fn extract_line_items(lines: &[&str]) -> Vec<RawLineItem> {
    let n = lines.len();
    let start = (n as f32 * 0.20).floor() as usize;
    let end = ((n as f32 * 0.70).floor() as usize).min(n);

    let mut out = Vec::new();
    for line in lines.iter().take(end).skip(start.min(end)) {
        let line = line.trim();
        if let Some(c) = re_pp_name_price().captures(line) {
            if let Some(price) = Money::parse_str(&c[2]) {
                out.push(RawLineItem {
                    name: c[1].trim().to_string(),
                    quantity: Decimal::ONE,
                    unit_price: None,
                    price,
                });
            }
            continue;
        }
        let qty_form = re_pp_qty_x()
            .captures(line)
            .or_else(|| re_pp_qty_at().captures(line));
        if let Some(c) = qty_form {
            let quantity = c[2].parse::<Decimal>().unwrap_or(Decimal::ONE);
            if let (Some(unit), Some(price)) = (Money::parse_str(&c[3]), Money::parse_str(&c[4])) {
                out.push(RawLineItem {
                    name: c[1].trim().to_string(),
                    quantity,
                    unit_price: Some(unit),
                    price,
                });
            }
        }
    }
    out
}
