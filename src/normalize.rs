//! Value, status and phone normalization shared by the importer and the form handlers.
//!
//! Everything here is total: malformed input degrades to a default, it never errors.

use crate::models::ListingStatus;
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;

const ACTIVE_TERMS: &[&str] = &["ativo", "active"];
const INACTIVE_TERMS: &[&str] = &["inativo", "inactive"];

/// Parse a currency amount written in any of the usual spreadsheet shapes.
///
/// Accepts plain integers (`1200000`), US decimals (`1200000.00`), Brazilian
/// grouping (`1.200.000,00`) and currency prefixes (`R$ 260.000,00`).
/// Returns `0.0` for `None`, blank or unparseable input.
pub fn parse_price(raw: Option<&str>) -> f64 {
    let Some(raw) = raw else {
        return 0.0;
    };

    let trimmed = raw
        .trim_matches(|c: char| c.is_whitespace() || c == '\u{a0}' || c == '\u{202f}')
        .trim_start_matches("R$")
        .trim_start_matches("BRL");

    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | ',' | '.'))
        .collect();
    if cleaned.is_empty() {
        return 0.0;
    }

    let has_dot = cleaned.contains('.');
    let has_comma = cleaned.contains(',');
    let canonical = if has_dot && has_comma {
        cleaned.replace('.', "").replace(',', ".")
    } else if has_comma {
        cleaned.replace(',', ".")
    } else if cleaned.matches('.').count() > 1 {
        // "1.200.000": several dots can only be thousands grouping
        cleaned.replace('.', "")
    } else {
        cleaned
    };

    match canonical.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Price as stored on a listing: never negative.
pub fn listing_price(raw: Option<&str>) -> f64 {
    parse_price(raw).max(0.0)
}

/// Canonicalize a free-text status.
///
/// Unknown or blank values resolve to `fallback`, or to active without one.
pub fn normalize_status(raw: Option<&str>, fallback: Option<ListingStatus>) -> ListingStatus {
    let value = raw.map(|s| s.trim().to_lowercase()).unwrap_or_default();
    if ACTIVE_TERMS.contains(&value.as_str()) {
        ListingStatus::Active
    } else if INACTIVE_TERMS.contains(&value.as_str()) {
        ListingStatus::Inactive
    } else {
        fallback.unwrap_or_default()
    }
}

/// Validate and normalize Brazilian phone number
///
/// Uses phonenumber library (port of Google's libphonenumber) to:
/// - Parse phone number with Brazilian region (BR)
/// - Validate if it's a valid Brazilian number
/// - Return normalized E.164 format (+5548991054216)
///
/// Returns: (is_valid, normalized_phone_or_error_msg)
pub fn validate_br_phone(raw: &str) -> (bool, String) {
    // Skip empty or very short strings
    if raw.trim().is_empty() || raw.len() < 8 {
        return (false, "Phone too short".to_string());
    }

    match phonenumber::parse(Some(CountryId::BR), raw) {
        Ok(number) => {
            if phonenumber::is_valid(&number) {
                let formatted = number.format().mode(Mode::E164).to_string();
                tracing::debug!("Valid BR phone: {} -> {}", raw, formatted);
                (true, formatted)
            } else {
                tracing::warn!("Invalid BR phone number: {}", raw);
                (false, "Invalid Brazilian phone number".to_string())
            }
        }
        Err(e) => {
            tracing::warn!("Failed to parse BR phone '{}': {:?}", raw, e);
            (false, format!("Parse error: {:?}", e))
        }
    }
}

/// Phone as recorded on leads and tickets: E.164 when recognizable, otherwise the
/// trimmed input. Contact attempts are never dropped over formatting.
pub fn contact_phone(raw: &str) -> String {
    match validate_br_phone(raw) {
        (true, normalized) => normalized,
        (false, _) => raw.trim().to_string(),
    }
}

/// Render an amount with pt-BR thousands grouping and no decimals: `1.200.000`.
pub fn format_brl(value: f64) -> String {
    let rounded = value.round();
    let negative = rounded < 0.0;
    let digits = format!("{:.0}", rounded.abs());

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    if negative {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_trims_and_lowercases() {
        assert_eq!(
            normalize_status(Some("  Inativo "), None),
            ListingStatus::Inactive
        );
        assert_eq!(normalize_status(Some(""), None), ListingStatus::Active);
    }

    #[test]
    fn negative_prices_clamp_for_listings() {
        assert_eq!(parse_price(Some("-1500,50")), -1500.5);
        assert_eq!(listing_price(Some("-1500,50")), 0.0);
    }

    #[test]
    fn brl_grouping() {
        assert_eq!(format_brl(500_000.0), "500.000");
        assert_eq!(format_brl(1_200_000.4), "1.200.000");
        assert_eq!(format_brl(999.0), "999");
        assert_eq!(format_brl(0.0), "0");
    }
}
