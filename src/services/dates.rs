// src/services/dates.rs

//! Date and time normalization for free-form Japanese listing text.
//!
//! Patterns are tried from the most qualified to the least qualified so a
//! year-less fragment never wins over a full date in the same text.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, NaiveTime};
use regex::{Captures, Regex};

use crate::models::EventTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum YearForm {
    /// Groups: year, month, day
    Gregorian,
    /// Groups: era name, era year, month, day
    Era,
    /// Groups: month, day
    Inferred,
}

static DATE_TIERS: LazyLock<Vec<(YearForm, Regex)>> = LazyLock::new(|| {
    [
        (
            YearForm::Gregorian,
            r"(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日",
        ),
        (
            YearForm::Era,
            r"(令和|平成)\s*(\d{1,2}|元)\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日",
        ),
        (YearForm::Gregorian, r"(\d{4})-(\d{1,2})-(\d{1,2})"),
        (YearForm::Gregorian, r"(\d{4})/(\d{1,2})/(\d{1,2})"),
        (YearForm::Gregorian, r"(\d{4})\.(\d{1,2})\.(\d{1,2})"),
        (
            YearForm::Inferred,
            r"(?:^|[^\d年\s])\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日?",
        ),
        (
            YearForm::Inferred,
            r"(?:^|[^\d/.])(\d{1,2})/(\d{1,2})(?:[^\d/]|$)",
        ),
        (
            YearForm::Inferred,
            r"(?:^|[^\d.])(\d{1,2})\.(\d{1,2})(?:[^\d.]|$)",
        ),
    ]
    .into_iter()
    .map(|(form, pattern)| (form, Regex::new(pattern).unwrap()))
    .collect()
});

static ISO_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{4})-(\d{2})-(\d{2})").unwrap());

static TIME_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2}):(\d{2})\s*[~\-−–〜]\s*(\d{1,2}):(\d{2})").unwrap()
});

static TIME_POINT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{1,2}):(\d{2})").unwrap());

static TIME_KANJI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})時(?:(\d{2})分)?(間)?").unwrap());

/// Fold full-width digits and separators to ASCII.
pub fn fold_width(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
            '／' => '/',
            '：' => ':',
            '．' => '.',
            '－' => '-',
            '～' => '~',
            _ => c,
        })
        .collect()
}

/// Normalize a date fragment to a calendar date.
///
/// `today` decides the year of year-less forms: a month/day earlier than
/// today refers to next year.
pub fn parse_date_on(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let text = fold_width(text.trim());
    if text.is_empty() {
        return None;
    }

    DATE_TIERS.iter().find_map(|(form, regex)| {
        regex
            .captures_iter(&text)
            .find_map(|caps| date_from_captures(*form, &caps, today))
    })
}

fn date_from_captures(form: YearForm, caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    let num = |i: usize| caps.get(i)?.as_str().parse::<u32>().ok();

    match form {
        YearForm::Gregorian => {
            NaiveDate::from_ymd_opt(num(1)? as i32, num(2)?, num(3)?)
        }
        YearForm::Era => {
            let base = match caps.get(1)?.as_str() {
                "令和" => 2018,
                "平成" => 1988,
                _ => return None,
            };
            let era_year = match caps.get(2)?.as_str() {
                "元" => 1,
                n => n.parse::<i32>().ok()?,
            };
            NaiveDate::from_ymd_opt(base + era_year, num(3)?, num(4)?)
        }
        YearForm::Inferred => {
            let (month, day) = (num(1)?, num(2)?);
            if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
                return None;
            }
            let passed = month < today.month() || (month == today.month() && day < today.day());
            let year = if passed { today.year() + 1 } else { today.year() };
            NaiveDate::from_ymd_opt(year, month, day)
        }
    }
}

/// Literal `YYYY-MM-DD` prefix of an ISO 8601 timestamp, without any
/// timezone conversion.
pub fn parse_iso_date_prefix(text: &str) -> Option<NaiveDate> {
    let caps = ISO_PREFIX.captures(text)?;
    let num = |i: usize| caps.get(i)?.as_str().parse::<u32>().ok();
    NaiveDate::from_ymd_opt(num(1)? as i32, num(2)?, num(3)?)
}

/// Extract a point time or a time range.
pub fn parse_time(text: &str) -> Option<EventTime> {
    let text = fold_width(text.trim());

    if let Some(caps) = TIME_RANGE.captures(&text) {
        if let (Some(start), Some(end)) = (hm(&caps, 1, Some(2)), hm(&caps, 3, Some(4))) {
            return Some(EventTime::Between(start, end));
        }
    }

    if let Some(at) = TIME_POINT
        .captures_iter(&text)
        .find_map(|caps| hm(&caps, 1, Some(2)))
    {
        return Some(EventTime::At(at));
    }

    TIME_KANJI
        .captures_iter(&text)
        .filter(|caps| caps.get(3).is_none())
        .find_map(|caps| hm(&caps, 1, Some(2)))
        .map(EventTime::At)
}

fn hm(caps: &Captures<'_>, hour: usize, minute: Option<usize>) -> Option<NaiveTime> {
    let h = caps.get(hour)?.as_str().parse().ok()?;
    let m = match minute.and_then(|i| caps.get(i)) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    NaiveTime::from_hms_opt(h, m, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_full_year_forms() {
        let today = d(2025, 6, 1);
        assert_eq!(parse_date_on("2025年11月7日", today), Some(d(2025, 11, 7)));
        assert_eq!(parse_date_on("開催日：2025年 1月 5日（日）", today), Some(d(2025, 1, 5)));
        assert_eq!(parse_date_on("2025-11-07", today), Some(d(2025, 11, 7)));
        assert_eq!(parse_date_on("2025/11/7", today), Some(d(2025, 11, 7)));
        assert_eq!(parse_date_on("2025.08.22 更新", today), Some(d(2025, 8, 22)));
    }

    #[test]
    fn test_era_forms() {
        let today = d(2025, 6, 1);
        assert_eq!(parse_date_on("令和7年11月7日", today), Some(d(2025, 11, 7)));
        assert_eq!(parse_date_on("令和元年5月1日", today), Some(d(2019, 5, 1)));
        assert_eq!(parse_date_on("平成31年4月30日", today), Some(d(2019, 4, 30)));
    }

    #[test]
    fn test_full_width_digits() {
        let today = d(2025, 6, 1);
        assert_eq!(parse_date_on("２０２５年１１月７日", today), Some(d(2025, 11, 7)));
        assert_eq!(parse_date_on("１１／７", today), Some(d(2025, 11, 7)));
    }

    #[test]
    fn test_yearless_rolls_to_next_year() {
        assert_eq!(parse_date_on("11月7日", d(2025, 12, 1)), Some(d(2026, 11, 7)));
        assert_eq!(parse_date_on("12月1日", d(2025, 12, 1)), Some(d(2025, 12, 1)));
        assert_eq!(parse_date_on("12/1", d(2025, 12, 2)), Some(d(2026, 12, 1)));
        assert_eq!(parse_date_on("8.22", d(2025, 6, 1)), Some(d(2025, 8, 22)));
    }

    #[test]
    fn test_impossible_dates_rejected() {
        let today = d(2025, 1, 1);
        assert_eq!(parse_date_on("2025年2月30日", today), None);
        assert_eq!(parse_date_on("2025-13-01", today), None);
        assert_eq!(parse_date_on("13月1日", today), None);
        assert_eq!(parse_date_on("2/29", d(2025, 1, 1)), None);
        assert_eq!(parse_date_on("2/29", d(2027, 3, 1)), Some(d(2028, 2, 29)));
    }

    #[test]
    fn test_yearless_ignores_fragments_of_full_dates() {
        // The invalid full date must not degrade into a year-less "2月30日" or "02/30".
        let today = d(2025, 1, 1);
        assert_eq!(parse_date_on("2025年2月30日", today), None);
        assert_eq!(parse_date_on("2025/02/30", today), None);

        // Whitespace after the year does not detach the month/day.
        let today = d(2027, 3, 1);
        assert_eq!(parse_date_on("令和7年 2月29日", today), None);
        assert_eq!(parse_date_on("2025年\u{3000}2月29日", today), None);
        assert_eq!(parse_date_on("2025年 \n 2月29日", today), None);
    }

    #[test]
    fn test_yearless_after_whitespace() {
        let today = d(2025, 1, 1);
        assert_eq!(parse_date_on("開催日 11月3日", today), Some(d(2025, 11, 3)));
        assert_eq!(parse_date_on("お知らせ\n 2月1日", today), Some(d(2025, 2, 1)));
    }

    #[test]
    fn test_first_valid_match_in_tier_wins() {
        let today = d(2025, 1, 1);
        assert_eq!(
            parse_date_on("2025/02/30 修正 2025/03/01", today),
            Some(d(2025, 3, 1))
        );
    }

    #[test]
    fn test_no_date() {
        let today = d(2025, 1, 1);
        assert_eq!(parse_date_on("", today), None);
        assert_eq!(parse_date_on("お知らせ", today), None);
    }

    #[test]
    fn test_iso_prefix_is_literal() {
        assert_eq!(
            parse_iso_date_prefix("2025-11-14T00:00:00+09:00"),
            Some(d(2025, 11, 14))
        );
        assert_eq!(parse_iso_date_prefix("2025-02-30T00:00:00Z"), None);
        assert_eq!(parse_iso_date_prefix("Fri, 14 Nov 2025"), None);
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(
            parse_time("10:00-16:00"),
            Some(EventTime::Between(t(10, 0), t(16, 0)))
        );
        assert_eq!(
            parse_time("９：３０～１５：００"),
            Some(EventTime::Between(t(9, 30), t(15, 0)))
        );
        assert_eq!(
            parse_time("9:00 〜 12:00"),
            Some(EventTime::Between(t(9, 0), t(12, 0)))
        );
        assert_eq!(parse_time("開演 18:30"), Some(EventTime::At(t(18, 30))));
        assert_eq!(parse_time("10時30分から"), Some(EventTime::At(t(10, 30))));
        assert_eq!(parse_time("13時開始"), Some(EventTime::At(t(13, 0))));
        assert_eq!(parse_time("所要2時間"), None);
        assert_eq!(parse_time("25:00"), None);
        assert_eq!(parse_time("時間未定"), None);
    }
}
