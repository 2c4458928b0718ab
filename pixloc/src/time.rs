use chrono::{DateTime, Duration, Utc};

/// Absolute epoch used throughout the crate.
pub type Date = DateTime<Utc>;

/// Signed duration from `earlier` to `later`, in seconds.
pub fn seconds_between(earlier: Date, later: Date) -> f64 {
    let delta = later - earlier;
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 * 1e-9,
        // beyond i64 nanoseconds, fall back to microsecond resolution
        None => delta.num_microseconds().map(|us| us as f64 * 1e-6).unwrap_or_else(|| {
            delta.num_milliseconds() as f64 * 1e-3
        }),
    }
}

/// `date` shifted by `dt` seconds, at nanosecond resolution.
pub fn shifted(date: Date, dt: f64) -> Date {
    date + Duration::nanoseconds((dt * 1e9).round() as i64)
}
