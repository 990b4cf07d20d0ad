//! Gregorian → Solar Hijri labels and the two-week menu rotation.

use chrono::{Datelike, NaiveDate, Weekday};

const MEAN_YEAR_DAYS: f64 = 365.24219858156;

/// Julian day number of 1 Farvardin, year 1.
const EPOCH_JDN: f64 = 1948320.5;

/// Lengths of months 1..=11; month 12 takes whatever remains of the year.
const MONTH_DAYS: [u32; 11] = [31, 31, 31, 31, 31, 31, 30, 30, 30, 30, 30];

/// Approximate conversion through the mean solar year. Dates near the new
/// year can land a day off; that is accepted for display labels. Inputs are
/// not validated.
pub fn gregorian_to_local(year: i32, month: u32, day: u32) -> (i32, u32, u32) {
    let (mut y, mut m) = (year as i64, month as i64);
    if m <= 2 {
        y -= 1;
        m += 12;
    }
    let a = y / 100;
    let b = 2 - a + a / 4;
    let jdn = (365.25 * (y + 4716) as f64) as i64 + (30.6001 * (m + 1) as f64) as i64 + day as i64
        + b
        - 1524;

    let since_epoch = jdn as f64 - EPOCH_JDN;
    let mut elapsed_years = (since_epoch / MEAN_YEAR_DAYS) as i64;
    let mut remaining = since_epoch - elapsed_years as f64 * MEAN_YEAR_DAYS;
    if remaining < 0.0 {
        elapsed_years -= 1;
        remaining += MEAN_YEAR_DAYS;
    }

    let local_year = (elapsed_years + 1) as i32;
    for (i, &len) in MONTH_DAYS.iter().enumerate() {
        if remaining < len as f64 {
            return (local_year, i as u32 + 1, remaining.floor() as u32 + 1);
        }
        remaining -= len as f64;
    }
    (local_year, 12, remaining.floor() as u32 + 1)
}

pub fn local_date(date: NaiveDate) -> (i32, u32, u32) {
    gregorian_to_local(date.year(), date.month(), date.day())
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
    }
}

/// Weekday a menu slot falls on: slots 1 and 8 are Saturdays.
pub fn slot_weekday(slot: u8) -> Weekday {
    // Saturday is 5 days from Monday.
    Weekday::try_from((slot.saturating_sub(1) % 7 + 5) % 7).unwrap_or(Weekday::Sat)
}

/// Menu slot (1..=14) serving `date`. The rotation is anchored at Saturday 2000-01-01.
pub fn menu_slot(date: NaiveDate) -> u8 {
    let anchor = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default();
    let days = date.signed_duration_since(anchor).num_days();
    days.rem_euclid(crate::limits::MENU_SLOTS as i64) as u8 + 1
}

/// "Wednesday (7/23)" style label for buttons.
pub fn day_label(date: NaiveDate) -> String {
    let (_, month, day) = local_date(date);
    format!("{} ({month}/{day})", weekday_name(date.weekday()))
}
