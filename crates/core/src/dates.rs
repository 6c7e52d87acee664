//! Localised calendar date helpers.
//!
//! Dates travel as `DD/MM/YYYY` text between clinicians and the record. Parsing is
//! strict about shape but lenient about calendar range: out-of-range day or month
//! values roll over into the neighbouring month or year instead of failing, so
//! `31/02/2024` reads as `02/03/2024`.

use chrono::{Datelike, Days, Months, NaiveDate};

/// Parses `DD/MM/YYYY` text.
///
/// Day and month take one or two digits, the year exactly four. Any other shape,
/// or a non-numeric component, yields `None`.
pub fn parse_local_date(text: &str) -> Option<NaiveDate> {
    let mut parts = text.trim().split('/');
    let (day, month, year) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let day = numeric_component(day, 1..=2)?;
    let month = numeric_component(month, 1..=2)?;
    let year = numeric_component(year, 4..=4)?;

    rolled_over_date(year as i32, month as i64, day as i64)
}

fn numeric_component(part: &str, width: std::ops::RangeInclusive<usize>) -> Option<u32> {
    if !width.contains(&part.len()) || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

/// Builds `1 Jan year + (month - 1) months + (day - 1) days`.
fn rolled_over_date(year: i32, month: i64, day: i64) -> Option<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let first_of_month = match month - 1 {
        m if m >= 0 => start.checked_add_months(Months::new(m as u32))?,
        m => start.checked_sub_months(Months::new(m.unsigned_abs() as u32))?,
    };
    match day - 1 {
        d if d >= 0 => first_of_month.checked_add_days(Days::new(d as u64)),
        d => first_of_month.checked_sub_days(Days::new(d.unsigned_abs())),
    }
}

/// Renders a date as zero-padded `DD/MM/YYYY`.
pub fn format_local_date(date: NaiveDate) -> String {
    format!(
        "{:02}/{:02}/{:04}",
        date.day(),
        date.month(),
        date.year()
    )
}

/// Renders an optional date, with an empty string standing in for "no date".
pub fn format_optional_date(date: Option<NaiveDate>) -> String {
    date.map(format_local_date).unwrap_or_default()
}

/// Whole-year age on `today`, one less if this year's birthday has not happened yet.
pub fn compute_age(birth_date: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth_date.year();
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }
    age
}

/// Whole days from `from` to `to`; negative when `to` is earlier.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Adds a number of days to a date, returning `None` on calendar overflow.
pub fn add_days(date: NaiveDate, days: u32) -> Option<NaiveDate> {
    date.checked_add_days(Days::new(u64::from(days)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_well_formed_dates() {
        assert_eq!(parse_local_date("05/03/2024"), Some(date(2024, 3, 5)));
        assert_eq!(parse_local_date(" 5/3/2024 "), Some(date(2024, 3, 5)));
        assert_eq!(parse_local_date("29/02/2024"), Some(date(2024, 2, 29)));
    }

    #[test]
    fn rejects_malformed_text() {
        for text in [
            "",
            "   ",
            "2024-03-05",
            "05/03",
            "05/03/2024/1",
            "aa/03/2024",
            "05/b3/2024",
            "05/03/24",
            "05/03/20245",
            "005/03/2024",
            "-1/03/2024",
            "05/+3/2024",
        ] {
            assert_eq!(parse_local_date(text), None, "{text:?} should not parse");
        }
    }

    #[test]
    fn out_of_range_components_roll_over() {
        // Accepted quirk: the calendar is not validated, values overflow.
        assert_eq!(parse_local_date("31/02/2024"), Some(date(2024, 3, 2)));
        assert_eq!(parse_local_date("31/02/2023"), Some(date(2023, 3, 3)));
        assert_eq!(parse_local_date("31/04/2024"), Some(date(2024, 5, 1)));
        assert_eq!(parse_local_date("00/01/2024"), Some(date(2023, 12, 31)));
        assert_eq!(parse_local_date("01/13/2024"), Some(date(2025, 1, 1)));
        assert_eq!(parse_local_date("15/00/2024"), Some(date(2023, 12, 15)));
        assert_eq!(parse_local_date("99/99/2024"), Some(date(2032, 6, 7)));
    }

    #[test]
    fn rollover_never_fails_for_two_digit_components() {
        for day in 0..=99 {
            for month in 0..=99 {
                let text = format!("{day:02}/{month:02}/2020");
                assert!(parse_local_date(&text).is_some(), "{text} should parse");
            }
        }
    }

    #[test]
    fn format_then_parse_round_trips() {
        let mut d = date(1999, 12, 25);
        let end = date(2027, 3, 1);
        while d <= end {
            assert_eq!(parse_local_date(&format_local_date(d)), Some(d));
            d = d.succ_opt().unwrap();
        }
        assert_eq!(parse_local_date(&format_local_date(date(1, 1, 1))), Some(date(1, 1, 1)));
    }

    #[test]
    fn formats_zero_padded() {
        assert_eq!(format_local_date(date(2024, 3, 5)), "05/03/2024");
        assert_eq!(format_optional_date(None), "");
        assert_eq!(format_optional_date(Some(date(987, 1, 9))), "09/01/0987");
    }

    #[test]
    fn age_is_decremented_before_the_birthday() {
        let birth = date(1990, 6, 15);
        assert_eq!(compute_age(birth, date(2024, 6, 14)), 33);
        assert_eq!(compute_age(birth, date(2024, 6, 15)), 34);
        assert_eq!(compute_age(birth, date(2024, 5, 20)), 33);
        assert_eq!(compute_age(birth, date(2024, 7, 1)), 34);
    }

    #[test]
    fn day_arithmetic() {
        assert_eq!(days_between(date(2024, 1, 1), date(2024, 3, 1)), 60);
        assert_eq!(days_between(date(2024, 3, 1), date(2024, 1, 1)), -60);
        assert_eq!(add_days(date(2024, 2, 20), 14), Some(date(2024, 3, 5)));
        assert_eq!(add_days(NaiveDate::MAX, 1), None);
    }
}
