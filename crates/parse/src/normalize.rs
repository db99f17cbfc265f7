macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static ::regex::Regex {
            static R: ::std::sync::OnceLock<::regex::Regex> = ::std::sync::OnceLock::new();
            R.get_or_init(|| ::regex::Regex::new($pat).expect("invalid regex"))
        }
    };
}

pub(crate) use re;

/// Canonicalize line endings and whitespace before any structural analysis.
///
/// `\r\n`/`\r` become `\n`, runs of spaces and tabs collapse to one space,
/// each line and the whole string are trimmed. Newlines are preserved — the
/// rest of the pipeline reasons line by line. Idempotent.
pub fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}

re!(re_l_after_digit, r"(\d)l");
re!(re_l_before_digit, r"l(\d)");
re!(re_o_after_digit, r"(\d)[Oo]");
re!(re_o_before_digit, r"[Oo](\d)");
re!(re_s_after_digit, r"(\d)S");
re!(re_s_before_digit, r"\bS(\d)");
re!(re_currency_gap, r"([$€£])\s+(\d)");
re!(re_decimal_gap, r"(\d)\s*\.\s*(\d{2})\b");

/// Rewrite the character confusions OCR engines most often make in numeric
/// context: `l`→`1`, `O`→`0`, `S`→`5` when digit-adjacent, and stray spaces
/// around currency symbols and decimal points. Purely textual and
/// idempotent; applied by the preprocessor before pattern matching.
pub fn correct_ocr_errors(text: &str) -> String {
    let s = re_l_after_digit().replace_all(text, "${1}1");
    let s = re_l_before_digit().replace_all(&s, "1${1}");
    let s = re_o_after_digit().replace_all(&s, "${1}0");
    let s = re_o_before_digit().replace_all(&s, "0${1}");
    let s = re_s_after_digit().replace_all(&s, "${1}5");
    let s = re_s_before_digit().replace_all(&s, "5${1}");
    let s = re_currency_gap().replace_all(&s, "${1}${2}");
    let s = re_decimal_gap().replace_all(&s, "${1}.${2}");
    s.into_owned()
}
