use chrono::{Datelike, NaiveDate};

use recibo_core::ParserResult;

use crate::context::ParseContext;
use crate::normalize::re;
use crate::tuning::DateTuning;

re!(re_slash_full, r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b");
re!(re_slash_short, r"\b(\d{1,2})/(\d{1,2})/(\d{2})\b");
re!(re_ymd, r"\b(\d{4})[/-](\d{1,2})[/-](\d{1,2})\b");
re!(
    re_month_name,
    r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sep|oct|nov|dec)\.?\s+(\d{1,2}),?\s+(\d{4})\b"
);
re!(re_dash, r"\b(\d{1,2})-(\d{1,2})-(\d{2,4})\b");
re!(re_date_keyword, r"(?i)\b(date|time)\b");
re!(re_fragment, r"\b(\d{1,2})[/-](\d{1,2})\b");

/// Extract the transaction date: ordered shape regexes over the full text,
/// each syntactic match gated on calendar validity, then a keyword-line
/// fragment fallback completed with the context year.
pub fn parse(
    text: &str,
    ctx: &ParseContext<'_>,
    tuning: &DateTuning,
) -> ParserResult<Option<NaiveDate>> {
    if let Some(date) = scan_shapes(text, tuning.century_pivot) {
        return ParserResult::new(Some(date), tuning.shape_confidence);
    }

    // Lower-confidence fallback: a "date"/"time" labeled line carrying a
    // month/day fragment, completed with the context year.
    for line in text.lines() {
        if !re_date_keyword().is_match(line) {
            continue;
        }
        if let Some(c) = re_fragment().captures(line) {
            let month: u32 = c[1].parse().unwrap_or(0);
            let day: u32 = c[2].parse().unwrap_or(0);
            if let Some(date) = NaiveDate::from_ymd_opt(ctx.today.year(), month, day) {
                return ParserResult::new(Some(date), tuning.keyword_confidence);
            }
        }
    }

    ParserResult::with_errors(None, 0.0, vec!["Transaction date not found".to_string()])
}

/// First valid calendar date matched by the ordered shape regexes. Used both
/// here and by the generic feature detector.
pub(crate) fn scan_date_shapes(text: &str) -> Option<NaiveDate> {
    scan_shapes(text, DateTuning::default().century_pivot)
}

fn scan_shapes(text: &str, pivot: i32) -> Option<NaiveDate> {
    // MM/DD/YYYY, falling back to DD/MM/YYYY when the US reading is not a
    // valid calendar date (e.g. 25/12/2023).
    if let Some(c) = re_slash_full().captures(text) {
        let a: u32 = c[1].parse().ok()?;
        let b: u32 = c[2].parse().ok()?;
        let year: i32 = c[3].parse().ok()?;
        if let Some(d) = NaiveDate::from_ymd_opt(year, a, b) {
            return Some(d);
        }
        if let Some(d) = NaiveDate::from_ymd_opt(year, b, a) {
            return Some(d);
        }
    }
    if let Some(c) = re_slash_short().captures(text) {
        let month: u32 = c[1].parse().ok()?;
        let day: u32 = c[2].parse().ok()?;
        let year = expand_year(c[3].parse().ok()?, pivot);
        if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(d);
        }
    }
    if let Some(c) = re_ymd().captures(text) {
        let year: i32 = c[1].parse().ok()?;
        let month: u32 = c[2].parse().ok()?;
        let day: u32 = c[3].parse().ok()?;
        if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(d);
        }
    }
    if let Some(c) = re_month_name().captures(text) {
        let month = month_to_num(&c[1])?;
        let day: u32 = c[2].parse().ok()?;
        let year: i32 = c[3].parse().ok()?;
        if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(d);
        }
    }
    if let Some(c) = re_dash().captures(text) {
        let month: u32 = c[1].parse().ok()?;
        let day: u32 = c[2].parse().ok()?;
        let year = {
            let raw: i32 = c[3].parse().ok()?;
            if raw < 100 {
                expand_year(raw, pivot)
            } else {
                raw
            }
        };
        if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(d);
        }
    }
    None
}

fn expand_year(two_digit: i32, pivot: i32) -> i32 {
    if two_digit < pivot {
        2000 + two_digit
    } else {
        1900 + two_digit
    }
}

fn month_to_num(name: &str) -> Option<u32> {
    match name.to_lowercase().as_str() {
        "january" | "jan" => Some(1),
        "february" | "feb" => Some(2),
        "march" | "mar" => Some(3),
        "april" | "apr" => Some(4),
        "may" => Some(5),
        "june" | "jun" => Some(6),
        "july" | "jul" => Some(7),
        "august" | "aug" => Some(8),
        "september" | "sep" => Some(9),
        "october" | "oct" => Some(10),
        "november" | "nov" => Some(11),
        "december" | "dec" => Some(12),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::{bare_context, today};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn run(text: &str) -> ParserResult<Option<NaiveDate>> {
        parse(text, &bare_context(today()), &DateTuning::default())
    }

    #[test]
    fn parses_mdy_slash() {
        let r = run("WALMART\n01/15/2023 10:25 AM\nTotal $5.00");
        assert_eq!(r.data, Some(date(2023, 1, 15)));
        assert_eq!(r.confidence, 0.8);
    }

    #[test]
    fn invalid_us_reading_flips_to_dmy() {
        let r = run("Receipt 25/12/2023");
        assert_eq!(r.data, Some(date(2023, 12, 25)));
    }

    #[test]
    fn two_digit_year_expands_at_pivot() {
        assert_eq!(run("03/07/24").data, Some(date(2024, 3, 7)));
        assert_eq!(run("03/07/99").data, Some(date(1999, 3, 7)));
    }

    #[test]
    fn parses_iso_shape() {
        assert_eq!(run("2023-01-15").data, Some(date(2023, 1, 15)));
        assert_eq!(run("2023/01/15").data, Some(date(2023, 1, 15)));
    }

    #[test]
    fn parses_month_name() {
        assert_eq!(run("January 15, 2023").data, Some(date(2023, 1, 15)));
        assert_eq!(run("Mar 3 2024").data, Some(date(2024, 3, 3)));
    }

    #[test]
    fn syntactic_match_requires_valid_calendar_date() {
        // 13/32 is no date in any reading; the parser must fall through
        // rather than accept it.
        let r = run("13/32/2023");
        assert_eq!(r.data, None);
        assert!(!r.errors.is_empty());
    }

    #[test]
    fn keyword_fragment_fallback_uses_context_year() {
        let r = run("Date: 6/14 Register 4");
        assert_eq!(r.data, Some(date(2024, 6, 14)));
        assert_eq!(r.confidence, 0.4);
    }

    #[test]
    fn empty_text_reports_missing_field() {
        let r = run("");
        assert_eq!(r.data, None);
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.errors, vec!["Transaction date not found".to_string()]);
    }
}
