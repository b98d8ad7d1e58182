use chrono::{Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// `As of:` marker variants, tried in order. Each captures the rest of the line.
static AS_OF_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)As of:\s*([^\r\n\t]+)",
        r"(?i)As of\s*:\s*([^\r\n\t]+)",
        r"(?i)as of[:\s]+([^\r\n\t]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("as-of pattern should compile"))
    .collect()
});

/// `<Month name> <day>[,] <year>`
static LONG_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{1,2}),?\s+(\d{4})",
    )
    .expect("long date pattern should compile")
});

type Strategy = fn(&str) -> Option<NaiveDate>;

/// Date sources in priority order; the first one that yields a date wins.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("as-of header", from_as_of_marker),
    ("document body", from_body),
];

/// Extract the report month (`YYYY-MM`) from the raw artifact text.
///
/// Falls back to the month of `today` when the text carries no usable date.
/// Which source won is only visible in the logs.
pub fn extract_report_date(content: &str, today: NaiveDate) -> String {
    let found = STRATEGIES
        .iter()
        .find_map(|(source, strategy)| strategy(content).map(|date| (*source, date)));

    match found {
        Some((source, date)) => {
            let month = format_month(date);
            info!(source, %date, %month, "[OK] report date extracted");
            month
        }
        None => {
            let month = format_month(today);
            warn!(%month, "no report date found in source, using current month");
            month
        }
    }
}

/// [`extract_report_date`] against the local wall clock.
pub fn extract_report_date_now(content: &str) -> String {
    extract_report_date(content, Local::now().date_naive())
}

fn from_as_of_marker(content: &str) -> Option<NaiveDate> {
    for pattern in AS_OF_PATTERNS.iter() {
        let Some(caps) = pattern.captures(content) else {
            continue;
        };
        let tail = caps[1].trim();
        debug!(pattern = pattern.as_str(), tail, "as-of marker matched");
        if let Some(date) = parse_long_date(tail) {
            return Some(date);
        }
    }
    debug!("no dated as-of marker, scanning the whole document");
    None
}

fn from_body(content: &str) -> Option<NaiveDate> {
    parse_long_date(content)
}

/// Parse the first long-form date in `text`. A match that is not a real
/// calendar day (e.g. `February 30, 2024`) yields `None`.
fn parse_long_date(text: &str) -> Option<NaiveDate> {
    let caps = LONG_DATE.captures(text)?;
    let month_name = caps[1].to_ascii_lowercase();
    let month = MONTHS.iter().position(|m| *m == month_name)? as u32 + 1;
    let day: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day);
    if date.is_none() {
        warn!(matched = &caps[0], "long-form date is not a valid calendar day");
    }
    date
}

fn format_month(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2031, 3, 17).unwrap()
    }

    #[test]
    fn reads_as_of_header() {
        let content = "IMF Financial Data\nAs of: September 5, 2024\n\nMember\tCode\n";
        assert_eq!(extract_report_date(content, fixed_today()), "2024-09");
    }

    #[test]
    fn as_of_marker_is_case_and_space_insensitive() {
        assert_eq!(
            extract_report_date("AS OF :   june 30 2025", fixed_today()),
            "2025-06"
        );
        assert_eq!(
            extract_report_date("data as of January 1, 2020\n", fixed_today()),
            "2020-01"
        );
    }

    #[test]
    fn marker_capture_stops_at_tab() {
        // the marker tail ends at the next tab, so the header strategy finds
        // nothing and the body scan picks up the first date in the document
        let content = "As of:\tsee below\tMarch 3, 2022\nprinted December 1, 2021";
        assert_eq!(from_as_of_marker(content), None);
        assert_eq!(extract_report_date(content, fixed_today()), "2022-03");
    }

    #[test]
    fn header_date_wins_over_earlier_body_date() {
        let content = "Generated May 2, 2019\nAs of: August 31, 2024\n";
        assert_eq!(extract_report_date(content, fixed_today()), "2024-08");
    }

    #[test]
    fn falls_back_to_body_date() {
        let content = "Borrowing report\n...effective October 12, 2023...\n";
        assert_eq!(from_as_of_marker(content), None);
        assert_eq!(extract_report_date(content, fixed_today()), "2023-10");
    }

    #[test]
    fn undated_marker_falls_through_to_body() {
        let content = "As of: today\nsigned April 9, 2021";
        assert_eq!(extract_report_date(content, fixed_today()), "2021-04");
    }

    #[test]
    fn falls_back_to_clock_when_no_date() {
        let content = "Member\tCode\nFrance\tFRA\n";
        assert_eq!(from_as_of_marker(content), None);
        assert_eq!(from_body(content), None);
        assert_eq!(extract_report_date(content, fixed_today()), "2031-03");
    }

    #[test]
    fn invalid_calendar_day_is_not_a_date() {
        assert_eq!(parse_long_date("February 30, 2024"), None);
        assert_eq!(
            extract_report_date("As of: February 30, 2024", fixed_today()),
            "2031-03"
        );
    }

    #[test]
    fn month_is_zero_padded() {
        assert_eq!(
            parse_long_date("March 9, 2025").map(format_month),
            Some("2025-03".to_string())
        );
    }
}
