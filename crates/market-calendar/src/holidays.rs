use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Full-day NYSE closures for `year`, rule-generated.
///
/// Saturday holidays are observed the Friday before and Sunday holidays the
/// Monday after, except that a Saturday New Year's Day is not observed.
pub fn exchange_holidays(year: i32) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(10);

    if let Some(new_year) = NaiveDate::from_ymd_opt(year, 1, 1) {
        match new_year.weekday() {
            Weekday::Sat => {}
            Weekday::Sun => days.push(new_year + Duration::days(1)),
            _ => days.push(new_year),
        }
    }

    days.extend(nth_weekday(year, 1, Weekday::Mon, 3)); // Martin Luther King Jr. Day
    days.extend(nth_weekday(year, 2, Weekday::Mon, 3)); // Washington's Birthday
    days.extend(easter_sunday(year).map(|easter| easter - Duration::days(2)));
    days.extend(last_weekday(year, 5, Weekday::Mon)); // Memorial Day

    if year >= 2022 {
        days.extend(fixed_observed(year, 6, 19));
    }

    days.extend(fixed_observed(year, 7, 4));
    days.extend(nth_weekday(year, 9, Weekday::Mon, 1)); // Labor Day
    days.extend(nth_weekday(year, 11, Weekday::Thu, 4)); // Thanksgiving
    days.extend(fixed_observed(year, 12, 25));

    days.sort();
    days
}

fn fixed_observed(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    })
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    nth_weekday(year, month, weekday, 5).or_else(|| nth_weekday(year, month, weekday, 4))
}

/// Gregorian Easter Sunday (anonymous Gregorian algorithm).
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;

    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}
