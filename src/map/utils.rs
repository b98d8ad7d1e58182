/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse a thousands-separated amount such as `"1,234,567"`.
///
/// Returns `None` for empty input, the `nan` placeholder, or anything that
/// still fails to parse once separators and spaces are removed.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = clean_str(raw)
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("nan") {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Render an amount with thousands separators, for log lines only.
pub fn format_amount(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if rounded < 0.0 {
        out.insert(0, '-');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_str_strips_quotes_and_whitespace() {
        assert_eq!(clean_str("  \" France \"  "), "France");
        assert_eq!(clean_str("Japan\t"), "Japan");
        assert_eq!(clean_str("\""), "\"");
    }

    #[test]
    fn parses_thousands_separated_amounts() {
        assert_eq!(parse_amount("1,234,567"), Some(1_234_567.0));
        assert_eq!(parse_amount(" 500,000 "), Some(500_000.0));
        assert_eq!(parse_amount("12 345.5"), Some(12_345.5));
        assert_eq!(parse_amount("\"7,000\""), Some(7_000.0));
    }

    #[test]
    fn rejects_missing_and_garbage_amounts() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("   "), None);
        assert_eq!(parse_amount("nan"), None);
        assert_eq!(parse_amount("NaN"), None);
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("inf"), None);
    }

    #[test]
    fn formats_amounts_for_logs() {
        assert_eq!(format_amount(0.0), "0");
        assert_eq!(format_amount(999.0), "999");
        assert_eq!(format_amount(1_000.0), "1,000");
        assert_eq!(format_amount(1_234_567.4), "1,234,567");
        assert_eq!(format_amount(-42_000.0), "-42,000");
    }
}
