use serde::Deserialize;

/// Every heuristic knob in the pipeline, grouped per stage.
///
/// The defaults are the empirically tuned figures the extraction was
/// calibrated with; partial TOML overrides are supported so individual knobs
/// can be adjusted without restating the rest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub preprocess: PreprocessTuning,
    pub matcher: MatcherTuning,
    pub store: StoreTuning,
    pub date: DateTuning,
    pub items: ItemsTuning,
    pub totals: TotalsTuning,
    pub blend: BlendTuning,
}

impl Tuning {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Vertical percentage bands for section segmentation, plus the preprocessor
/// confidence model. Bands intentionally overlap to tolerate sloppy layouts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreprocessTuning {
    pub header_max: f32,
    pub items_min: f32,
    pub items_max: f32,
    pub totals_min: f32,
    pub totals_max: f32,
    /// Text-mode totals band used when no keyword line is found.
    pub totals_fallback_min: f32,
    pub totals_fallback_max: f32,
    pub footer_min: f32,
    /// Starting confidence when spatial blocks are available.
    pub base_spatial: f32,
    /// Starting confidence in text-only mode.
    pub base_text: f32,
    pub section_bonus: f32,
    pub footer_bonus: f32,
    pub item_bonus_each: f32,
    pub item_bonus_cap: f32,
    pub zero_items_penalty: f32,
}

impl Default for PreprocessTuning {
    fn default() -> Self {
        Self {
            header_max: 0.20,
            items_min: 0.15,
            items_max: 0.70,
            totals_min: 0.65,
            totals_max: 0.85,
            totals_fallback_min: 0.70,
            totals_fallback_max: 0.90,
            footer_min: 0.80,
            base_spatial: 0.5,
            base_text: 0.4,
            section_bonus: 0.1,
            footer_bonus: 0.05,
            item_bonus_each: 0.02,
            item_bonus_cap: 0.2,
            zero_items_penalty: 0.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatcherTuning {
    /// Confidence contributed by each matching store pattern.
    pub store_pattern_weight: f32,
    /// A template below this mean confidence is not accepted at all.
    pub accept_threshold: f32,
    /// Below this, the generic feature detectors run instead.
    pub strong_threshold: f32,
    pub retailer_hit_confidence: f32,
    pub first_line_confidence: f32,
    pub date_shape_confidence: f32,
    pub labeled_total_confidence: f32,
    pub largest_amount_confidence: f32,
    pub item_lines_confidence: f32,
    /// Minimum trailing-price lines before the item detector fires.
    pub min_item_lines: usize,
    /// A bottom-third amount must exceed this (dollars) to look like a total.
    pub min_plausible_total: f32,
}

impl Default for MatcherTuning {
    fn default() -> Self {
        Self {
            store_pattern_weight: 0.3,
            accept_threshold: 0.3,
            strong_threshold: 0.6,
            retailer_hit_confidence: 0.9,
            first_line_confidence: 0.5,
            date_shape_confidence: 0.8,
            labeled_total_confidence: 0.8,
            largest_amount_confidence: 0.4,
            item_lines_confidence: 0.6,
            min_item_lines: 2,
            min_plausible_total: 5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreTuning {
    /// Confidence when a template's store pattern names the store.
    pub template_confidence: f32,
    /// Base confidence for the first-lines heuristic.
    pub heuristic_base: f32,
    pub error_penalty: f32,
    /// Multiplier applied when no store name was found at all.
    pub missing_name_penalty: f32,
    pub address_bonus: f32,
    pub detail_bonus: f32,
    /// How many leading lines are scanned for the store name.
    pub scan_lines: usize,
    /// Candidates shorter than this absorb the following line.
    pub min_name_len: usize,
}

impl Default for StoreTuning {
    fn default() -> Self {
        Self {
            template_confidence: 0.9,
            heuristic_base: 0.8,
            error_penalty: 0.1,
            missing_name_penalty: 0.3,
            address_bonus: 0.1,
            detail_bonus: 0.05,
            scan_lines: 5,
            min_name_len: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DateTuning {
    pub shape_confidence: f32,
    pub keyword_confidence: f32,
    /// Two-digit years below this expand to 20xx, the rest to 19xx.
    pub century_pivot: i32,
}

impl Default for DateTuning {
    fn default() -> Self {
        Self {
            shape_confidence: 0.8,
            keyword_confidence: 0.4,
            century_pivot: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ItemsTuning {
    pub template_confidence: f32,
    pub generic_confidence: f32,
    pub fallback_confidence: f32,
    pub base_confidence: f32,
    /// Base-confidence multiplier when fewer than `few_items` items were
    /// found and errors were recorded.
    pub few_items_penalty: f32,
    pub few_items: usize,
    pub zero_items_confidence: f32,
    /// Aggregate = base_weight × base + item_weight × mean(per-item).
    pub base_weight: f32,
    pub item_weight: f32,
    /// Candidate lines shorter than this are skipped.
    pub min_line_len: usize,
}

impl Default for ItemsTuning {
    fn default() -> Self {
        Self {
            template_confidence: 0.8,
            generic_confidence: 0.7,
            fallback_confidence: 0.5,
            base_confidence: 0.8,
            few_items_penalty: 0.7,
            few_items: 3,
            zero_items_confidence: 0.2,
            base_weight: 0.4,
            item_weight: 0.6,
            min_line_len: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TotalsTuning {
    pub base_confidence: f32,
    pub missing_total_penalty: f32,
    pub missing_subtotal_penalty: f32,
    /// Applied when `subtotal + tax − discount + tip` is over a dollar off
    /// the printed total.
    pub inconsistent_penalty: f32,
    pub consistent_bonus: f32,
    /// Items-vs-subtotal mismatch thresholds: both must be exceeded.
    pub mismatch_dollars: f32,
    pub mismatch_fraction: f32,
    /// Self-consistency bands (dollars).
    pub inconsistent_dollars: f32,
    pub consistent_dollars: f32,
    /// Plausible sales-tax band.
    pub tax_rate_min: f32,
    pub tax_rate_max: f32,
    /// At most this many lines are treated as the totals section.
    pub section_cap: usize,
    /// The trailing fraction of lines searched for a total line.
    pub tail_fraction: f32,
}

impl Default for TotalsTuning {
    fn default() -> Self {
        Self {
            base_confidence: 0.8,
            missing_total_penalty: 0.5,
            missing_subtotal_penalty: 0.7,
            inconsistent_penalty: 0.7,
            consistent_bonus: 0.2,
            mismatch_dollars: 1.0,
            mismatch_fraction: 0.05,
            inconsistent_dollars: 1.0,
            consistent_dollars: 0.05,
            tax_rate_min: 0.01,
            tax_rate_max: 0.30,
            section_cap: 10,
            tail_fraction: 0.3,
        }
    }
}

/// Receipt-level confidence blend and punitive multipliers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlendTuning {
    pub base_weight: f32,
    pub components_weight: f32,
    pub ocr_weight: f32,
    pub store_weight: f32,
    pub date_weight: f32,
    pub items_weight: f32,
    pub totals_weight: f32,
    pub no_items_penalty: f32,
    pub no_store_penalty: f32,
    pub zero_total_penalty: f32,
    pub tiny_text_penalty: f32,
    pub short_text_penalty: f32,
    pub tiny_text_len: usize,
    pub short_text_len: usize,
}

impl Default for BlendTuning {
    fn default() -> Self {
        Self {
            base_weight: 0.2,
            components_weight: 0.5,
            ocr_weight: 0.3,
            store_weight: 0.2,
            date_weight: 0.1,
            items_weight: 0.4,
            totals_weight: 0.3,
            no_items_penalty: 0.3,
            no_store_penalty: 0.7,
            zero_total_penalty: 0.7,
            tiny_text_penalty: 0.5,
            short_text_penalty: 0.8,
            tiny_text_len: 20,
            short_text_len: 50,
        }
    }
}
