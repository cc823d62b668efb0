//! Invoice period parsing.

use chrono::NaiveDate;

use crate::error::ComposeError;
use crate::patterns::{DATE_DMY, DATE_FRENCH_LONG, DATE_FRENCH_MONTH_YEAR, DATE_YMD, PERIOD_RANGE};

/// A date found in free text and where it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateMatch {
    pub date: NaiveDate,
    pub position: usize,
    pub end: usize,
}

/// Every date in `text`, in reading order.
pub fn find_dates(text: &str) -> Vec<DateMatch> {
    let mut results: Vec<DateMatch> = Vec::new();

    // DD/MM/YYYY, DD.MM.YYYY, DD-MM-YYYY
    for caps in DATE_DMY.captures_iter(text) {
        let day: u32 = caps[1].parse().unwrap_or(0);
        let month: u32 = caps[2].parse().unwrap_or(0);
        let year = parse_year(&caps[3]);
        if let (Some(date), Some(m)) = (NaiveDate::from_ymd_opt(year, month, day), caps.get(0)) {
            results.push(DateMatch {
                date,
                position: m.start(),
                end: m.end(),
            });
        }
    }

    // YYYY-MM-DD
    for caps in DATE_YMD.captures_iter(text) {
        let year: i32 = caps[1].parse().unwrap_or(0);
        let month: u32 = caps[2].parse().unwrap_or(0);
        let day: u32 = caps[3].parse().unwrap_or(0);
        if let (Some(date), Some(m)) = (NaiveDate::from_ymd_opt(year, month, day), caps.get(0)) {
            results.push(DateMatch {
                date,
                position: m.start(),
                end: m.end(),
            });
        }
    }

    // "1er mai 2025"
    for caps in DATE_FRENCH_LONG.captures_iter(text) {
        let day: u32 = caps[1].parse().unwrap_or(0);
        let month = french_month_to_number(&caps[2]);
        let year: i32 = caps[3].parse().unwrap_or(0);
        if let (Some(date), Some(m)) = (NaiveDate::from_ymd_opt(year, month, day), caps.get(0)) {
            results.push(DateMatch {
                date,
                position: m.start(),
                end: m.end(),
            });
        }
    }

    // "mai 2025", only where no full date already covers it
    for caps in DATE_FRENCH_MONTH_YEAR.captures_iter(text) {
        let month = french_month_to_number(&caps[1]);
        let year: i32 = caps[2].parse().unwrap_or(0);
        let Some(m) = caps.get(0) else { continue };
        if results
            .iter()
            .any(|r| r.position <= m.start() && m.start() < r.end)
        {
            continue;
        }
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, 1) {
            results.push(DateMatch {
                date,
                position: m.start(),
                end: m.end(),
            });
        }
    }

    results.sort_by_key(|r| r.position);
    results
}

/// Date a billing period starts on.
///
/// A "start - end" range yields its start; otherwise the first date in the
/// text is taken.
pub fn period_start(text: &str) -> Result<NaiveDate, ComposeError> {
    if let Some(caps) = PERIOD_RANGE.captures(text) {
        if let Some(first) = find_dates(&caps[1]).first() {
            return Ok(first.date);
        }
    }

    find_dates(text)
        .first()
        .map(|m| m.date)
        .ok_or_else(|| ComposeError::InvalidDate {
            value: text.to_string(),
        })
}

/// `MMYYYY` component for a date or period string.
pub fn period_component(text: &str) -> Result<String, ComposeError> {
    period_start(text).map(|date| date.format("%m%Y").to_string())
}

/// Pick the string the period is read from: an explicit period field when
/// it parses, otherwise the invoice date.
pub fn choose_period_source<'a>(period: Option<&'a str>, date: Option<&'a str>) -> Option<&'a str> {
    let period = period.map(str::trim).filter(|p| !p.is_empty());
    let date = date.map(str::trim).filter(|d| !d.is_empty());
    match period {
        Some(p) if period_start(p).is_ok() => Some(p),
        _ => date.or(period),
    }
}

fn parse_year(s: &str) -> i32 {
    let year: i32 = s.parse().unwrap_or(0);
    if year < 100 {
        // Two-digit year: assume 2000s for 00-50, 1900s for 51-99
        if year <= 50 {
            2000 + year
        } else {
            1900 + year
        }
    } else {
        year
    }
}

fn french_month_to_number(month: &str) -> u32 {
    match month.to_lowercase().as_str() {
        "janvier" => 1,
        "février" | "fevrier" => 2,
        "mars" => 3,
        "avril" => 4,
        "mai" => 5,
        "juin" => 6,
        "juillet" => 7,
        "août" | "aout" => 8,
        "septembre" => 9,
        "octobre" => 10,
        "novembre" => 11,
        "décembre" | "decembre" => 12,
        _ => 0,
    }
}
