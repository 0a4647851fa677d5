//! Phone number normalization for Kenyan mobile-money numbers.

use crate::error::{AppError, AppResult};
use regex::Regex;
use std::sync::OnceLock;

pub const COUNTRY_CODE: &str = "254";

fn msisdn_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^254\d{9}$").expect("valid msisdn regex"))
}

/// Canonical international form (`254XXXXXXXXX`).
///
/// - `07…` (local trunk prefix) becomes `2547…`
/// - `254…` is left untouched
/// - anything else gets `254` prepended
///
/// A leading `+` and surrounding whitespace are dropped first. The result
/// always starts with the country code, so normalizing twice is a no-op.
pub fn normalize_phone(input: &str) -> String {
    let number = input.trim();
    let number = number.strip_prefix('+').unwrap_or(number);

    if let Some(local) = number.strip_prefix('0') {
        format!("{}{}", COUNTRY_CODE, local)
    } else if number.starts_with(COUNTRY_CODE) {
        number.to_string()
    } else {
        format!("{}{}", COUNTRY_CODE, number)
    }
}

/// Normalize and check the number is a full Kenyan MSISDN.
pub fn parse_msisdn(input: &str) -> AppResult<String> {
    let normalized = normalize_phone(input);
    if !msisdn_pattern().is_match(&normalized) {
        return Err(AppError::validation(format!(
            "Invalid phone number \"{}\": expected a Kenyan mobile number such as 0712345678",
            input.trim()
        )));
    }
    Ok(normalized)
}
