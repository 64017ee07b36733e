//! Relative date resolution for event payloads.
//!
//! Week and month offsets are fixed day counts (+7, +30), not calendar
//! arithmetic.

use std::sync::LazyLock;

use chrono::{Datelike, Days, Local, NaiveDate};
use regex::Regex;

use aira_core::types::Event;

const TODAY: &[&str] = &["hôm nay", "today"];
const TOMORROW: &[&str] = &["ngày mai", "mai", "tomorrow"];
const DAY_AFTER: &[&str] = &["ngày kia", "day after tomorrow"];
const YESTERDAY: &[&str] = &["hôm qua", "yesterday"];
const NEXT_WEEK: &[&str] = &["tuần tới", "tuần sau", "next week"];
const LAST_WEEK: &[&str] = &["tuần trước", "last week"];
const NEXT_MONTH: &[&str] = &["tháng tới", "tháng sau", "next month"];

static DAY_OF_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:ngày|day)\s*(\d{1,2})$").expect("valid day-of-month regex")
});

/// Resolve a relative date term against the local calendar date.
pub fn resolve_relative_date(term: &str) -> Option<NaiveDate> {
    resolve_relative_date_on(term, Local::now().date_naive())
}

/// Resolve a relative date term against `today`.
///
/// Returns `None` for unrecognized terms and for day-of-month terms that
/// do not exist in the resolved month.
pub fn resolve_relative_date_on(term: &str, today: NaiveDate) -> Option<NaiveDate> {
    let term = term.trim().to_lowercase();

    if TODAY.contains(&term.as_str()) {
        return Some(today);
    }
    if TOMORROW.contains(&term.as_str()) {
        return today.checked_add_days(Days::new(1));
    }
    if DAY_AFTER.contains(&term.as_str()) {
        return today.checked_add_days(Days::new(2));
    }
    if YESTERDAY.contains(&term.as_str()) {
        return today.checked_sub_days(Days::new(1));
    }
    if NEXT_WEEK.iter().any(|k| term.contains(k)) {
        return today.checked_add_days(Days::new(7));
    }
    if LAST_WEEK.iter().any(|k| term.contains(k)) {
        return today.checked_sub_days(Days::new(7));
    }
    if NEXT_MONTH.iter().any(|k| term.contains(k)) {
        return today.checked_add_days(Days::new(30));
    }

    let caps = DAY_OF_MONTH.captures(&term)?;
    let day: u32 = caps[1].parse().ok()?;
    let (year, month) = if day >= today.day() {
        (today.year(), today.month())
    } else if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Normalize an event `date` field.
///
/// ISO dates pass through, relative terms are resolved, and anything else
/// is returned as `None` so the caller can keep the literal.
pub fn normalize_event_date(value: &str, today: NaiveDate) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    resolve_relative_date_on(trimmed, today)
}

/// Events dated within `[today, today + days]`, ordered by date then time.
/// Events whose date is not ISO are skipped.
pub fn upcoming_events(events: &[Event], today: NaiveDate, days: u64) -> Vec<Event> {
    let Some(horizon) = today.checked_add_days(Days::new(days)) else {
        return Vec::new();
    };
    let mut upcoming: Vec<(NaiveDate, Event)> = events
        .iter()
        .filter_map(|e| {
            let date = NaiveDate::parse_from_str(e.date.trim(), "%Y-%m-%d").ok()?;
            (today..=horizon)
                .contains(&date)
                .then(|| (date, e.clone()))
        })
        .collect();
    upcoming.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.time.cmp(&b.1.time)));
    upcoming.into_iter().map(|(_, e)| e).collect()
}
