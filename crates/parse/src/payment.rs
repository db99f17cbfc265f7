use recibo_core::{PaymentInfo, PaymentMethod};

use crate::normalize::re;

re!(re_visa, r"(?i)\bvisa\b");
re!(re_mastercard, r"(?i)\b(?:master\s*card|mastercard|mc)\b");
re!(re_amex, r"(?i)\b(?:amex|american\s+express)\b");
re!(re_discover, r"(?i)\bdiscover\b");
re!(re_debit, r"(?i)\bdebit\b");
re!(re_cash, r"(?i)\bcash\b");
re!(re_check, r"(?i)\b(?:check|cheque)\b");
re!(re_apple_pay, r"(?i)\bapple\s*pay\b");
re!(re_google_pay, r"(?i)\bgoogle\s*pay\b");
re!(re_paypal, r"(?i)\bpay\s*pal\b");
re!(re_credit, r"(?i)\bcredit\b");
// `ending in 1234`, `****1234`, `xxxx-1234`, `•••• 1234`.
re!(re_last_four, r"(?i)(?:ending\s+in\s+|[x•*]{2,}[\s-]*)(\d{4})\b");

/// Classify the payment method from receipt text. Wallets win over card
/// brands (an Apple Pay line usually names the underlying card too).
pub fn parse(text: &str) -> Option<PaymentInfo> {
    let method = if re_apple_pay().is_match(text) {
        PaymentMethod::ApplePay
    } else if re_google_pay().is_match(text) {
        PaymentMethod::GooglePay
    } else if re_paypal().is_match(text) {
        PaymentMethod::PayPal
    } else if re_visa().is_match(text) {
        PaymentMethod::Visa
    } else if re_mastercard().is_match(text) {
        PaymentMethod::Mastercard
    } else if re_amex().is_match(text) {
        PaymentMethod::Amex
    } else if re_discover().is_match(text) {
        PaymentMethod::Discover
    } else if re_debit().is_match(text) {
        PaymentMethod::Debit
    } else if re_check().is_match(text) {
        PaymentMethod::Check
    } else if re_cash().is_match(text) {
        PaymentMethod::Cash
    } else if re_credit().is_match(text) {
        PaymentMethod::Other("Credit".to_string())
    } else {
        return None;
    };

    Some(PaymentInfo {
        last_four: extract_last_four(text),
        method,
    })
}

fn extract_last_four(text: &str) -> Option<String> {
    re_last_four()
        .captures(text)
        .map(|c| c[1].to_string())
}
