use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Shift a requested visit date so it is always in the future and never on a
/// Sunday: a date on or before `today` moves to tomorrow, and a Sunday moves
/// forward to Monday. The two shifts cannot re-trigger each other.
pub fn adjust_visit_date(requested: NaiveDate, today: NaiveDate) -> NaiveDate {
    let mut date = requested;
    if date <= today {
        date = today + Duration::days(1);
    }
    if date.weekday() == Weekday::Sun {
        date += Duration::days(1);
    }
    date
}

/// Parse an extracted `YYYY-MM-DD` date and normalize it. Unparseable input
/// yields `None` rather than a guess.
pub fn normalize_visit_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let parsed = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()?;
    Some(adjust_visit_date(parsed, today))
}
