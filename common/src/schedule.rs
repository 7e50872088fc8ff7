use chrono::DateTime;

use crate::config::DailyTime;

pub const SECONDS_PER_DAY: i64 = 86_400;

pub fn start_of_day(epoch: i64) -> i64 {
    epoch - seconds_of_day(epoch)
}

pub fn seconds_of_day(epoch: i64) -> i64 {
    epoch.rem_euclid(SECONDS_PER_DAY)
}

// A target equal to `now` is not rolled over. Saturates at i64::MAX.
pub fn next_occurrence(now: i64, time: DailyTime) -> i64 {
    let candidate = start_of_day(now).saturating_add(time.seconds_from_midnight());
    if candidate < now {
        candidate.saturating_add(SECONDS_PER_DAY)
    } else {
        candidate
    }
}

pub fn format_epoch(epoch: i64) -> String {
    match DateTime::from_timestamp(epoch, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => epoch.to_string(),
    }
}
