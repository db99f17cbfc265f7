use recibo_core::{ParserResult, Store};

use crate::context::ParseContext;
use crate::normalize::re;
use crate::tuning::StoreTuning;

re!(re_line_date, r"\d{1,2}[/-]\d{1,2}[/-]\d{2,4}");
re!(re_line_time, r"\d{1,2}:\d{2}");
re!(re_totals_or_price, r"(?i)\b(total|subtotal|tax|balance|change|cash)\b|\$\d");
re!(re_digit, r"\d");
re!(
    re_street_address,
    r"(?i)\b\d+\s+[A-Za-z0-9 .,'-]+?\s(street|st|avenue|ave|road|rd|boulevard|blvd|drive|dr|lane|ln|way|court|ct|plaza|parkway|pkwy)\b\.?"
);
re!(
    re_phone_labeled,
    r"(?i)\b(?:phone|tel|telephone)\b\s*[:#]?\s*(\(?\d{3}\)?[-. ]?\d{3}[-. ]?\d{4})"
);
re!(re_phone_bare, r"\(?\d{3}\)?[-. ]\d{3}[-. ]\d{4}");
re!(re_website, r"(?i)\b(?:https?://|www\.)\S+");
re!(
    re_tax_id,
    r"(?i)\b(?:tax\s*id|tin|ein|gst|vat|abn)\b\s*(?:no\.?|number)?\s*[:#]?\s*([A-Za-z0-9][A-Za-z0-9-]{3,})"
);

const GREETINGS: &[&str] = &[
    "welcome to ",
    "thank you for shopping at ",
    "thank you for shopping ",
];

/// Resolve the store block: canonical template name when a store pattern
/// hits, else the first plausible line of the receipt; address, phone,
/// website and tax id are extracted independently of that choice.
pub fn parse(text: &str, ctx: &ParseContext<'_>, tuning: &StoreTuning) -> ParserResult<Store> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut errors: Vec<String> = Vec::new();

    let template_hit = ctx.catalog.match_store(text);
    let (name, name_line, base) = match template_hit {
        Some(template) => {
            // Canonical name; the heuristic still locates the raw line so the
            // address scan below knows where to start.
            let line = heuristic_name_line(&lines, tuning).map(|(_, i)| i).unwrap_or(0);
            (template.store_name.clone(), line, tuning.template_confidence)
        }
        None => match heuristic_name_line(&lines, tuning) {
            Some((name, line)) => (name, line, tuning.heuristic_base),
            None => {
                errors.push("Could not identify store name".to_string());
                (String::new(), 0, tuning.heuristic_base)
            }
        },
    };

    let store = Store {
        name: name.clone(),
        address: extract_address(&lines, name_line, text),
        phone: extract_phone(text),
        website: extract_website(text),
        tax_id: extract_tax_id(text),
    };

    let mut confidence = base - tuning.error_penalty * errors.len() as f32;
    if store.name.is_empty() {
        confidence *= tuning.missing_name_penalty;
    }
    if store.address.is_some() {
        confidence += tuning.address_bonus;
    }
    for present in [&store.phone, &store.website, &store.tax_id] {
        if present.is_some() {
            confidence += tuning.detail_bonus;
        }
    }

    ParserResult::with_errors(store, confidence, errors)
}

/// First non-empty, non-date, non-time line among the leading lines; short
/// candidates absorb the following line, greeting phrases are stripped.
fn heuristic_name_line(lines: &[&str], tuning: &StoreTuning) -> Option<(String, usize)> {
    for (i, line) in lines.iter().take(tuning.scan_lines).enumerate() {
        if line.is_empty() || re_line_date().is_match(line) || re_line_time().is_match(line) {
            continue;
        }
        let mut name = strip_greeting(line);
        if name.len() < tuning.min_name_len {
            if let Some(next) = lines.get(i + 1) {
                name = format!("{name} {}", next.trim()).trim().to_string();
            }
        }
        if name.is_empty() {
            continue;
        }
        return Some((name, i));
    }
    None
}

fn strip_greeting(line: &str) -> String {
    let lower = line.to_lowercase();
    for greeting in GREETINGS {
        if lower.starts_with(greeting) {
            return line[greeting.len()..].trim().to_string();
        }
    }
    line.trim().to_string()
}

/// The two lines after the store name, else a street-shaped line anywhere.
fn extract_address(lines: &[&str], name_line: usize, text: &str) -> Option<String> {
    for line in lines.iter().skip(name_line + 1).take(2) {
        if re_digit().is_match(line) && !re_totals_or_price().is_match(line) {
            return Some(line.to_string());
        }
    }
    re_street_address()
        .find(text)
        .map(|m| m.as_str().trim().to_string())
}

fn extract_phone(text: &str) -> Option<String> {
    if let Some(c) = re_phone_labeled().captures(text) {
        return Some(c[1].to_string());
    }
    re_phone_bare().find(text).map(|m| m.as_str().to_string())
}

fn extract_website(text: &str) -> Option<String> {
    re_website()
        .find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string())
}

fn extract_tax_id(text: &str) -> Option<String> {
    re_tax_id().captures(text).map(|c| c[1].to_string())
}
