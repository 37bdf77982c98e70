use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, Weekday};

/// The first weekday strictly after `now`. Exchange holidays are not modelled.
pub fn next_trading_day(now: NaiveDateTime) -> NaiveDate {
    let mut day = now.date() + Days::new(1);
    while is_weekend(day) {
        day = day + Days::new(1);
    }
    day
}

pub fn is_weekend(day: NaiveDate) -> bool {
    matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}
