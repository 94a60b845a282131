//! Invoice date parsing.

use chrono::NaiveDate;

/// Date formats tried in order. US month-first forms come before
/// day-first, so ambiguous dates resolve the way US invoices write them.
pub const DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%m/%d/%y",
    "%d/%m/%y",
];

/// Parse a date string against the known format list.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_us_format() {
        assert_eq!(parse_date("06/01/2025"), Some(date(2025, 6, 1)));
        assert_eq!(parse_date("12/31/2024"), Some(date(2024, 12, 31)));
    }

    #[test]
    fn test_iso_format() {
        assert_eq!(parse_date("2025-06-01"), Some(date(2025, 6, 1)));
    }

    #[test]
    fn test_day_first_when_month_invalid() {
        // 25 can't be a month, so the day-first format matches.
        assert_eq!(parse_date("25/06/2025"), Some(date(2025, 6, 25)));
    }

    #[test]
    fn test_unparseable() {
        assert_eq!(parse_date("June 1st, whenever"), None);
        assert_eq!(parse_date(""), None);
    }
}
