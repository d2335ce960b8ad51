//! Simulated clock and astronomical time conversions.
//!
//! Julian dates are the engine's continuous time axis: every fade window
//! and orbital propagation is evaluated against `jd_now`, never against
//! wall-clock time. Also holds the two-line-element date codec and the
//! `TimeSpan` text format used for persisted fade spans.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

pub const SECONDS_PER_DAY: f64 = 86400.0;
pub const UNIX_EPOCH_JD: f64 = 2440587.5;
pub const J2000_JD: f64 = 2451545.0;

const TICKS_PER_SECOND: i64 = 10_000_000;

pub fn utc_to_julian(date: DateTime<Utc>) -> f64 {
    date.timestamp_millis() as f64 / (1000.0 * SECONDS_PER_DAY) + UNIX_EPOCH_JD
}

pub fn julian_to_utc(jd: f64) -> Option<DateTime<Utc>> {
    if !jd.is_finite() {
        return None;
    }
    let millis = ((jd - UNIX_EPOCH_JD) * SECONDS_PER_DAY * 1000.0).round();
    if millis.abs() > i64::MAX as f64 {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(millis as i64)
}

pub fn duration_to_days(span: Duration) -> f64 {
    span.num_milliseconds() as f64 / (1000.0 * SECONDS_PER_DAY)
}

fn start_of_year_jd(year: i32) -> Option<f64> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .map(utc_to_julian)
}

/// Decodes the `YYDDD.DDDDDDDD` epoch field of a TLE. Day 1.0 is
/// January 1st, 00:00 UTC. Malformed text yields NaN.
pub fn two_line_date_to_julian(text: &str) -> f64 {
    let text = text.trim();
    let (Some(year_text), Some(day_text)) = (text.get(0..2), text.get(2..)) else {
        return f64::NAN;
    };
    let Ok(yy) = year_text.parse::<i32>() else {
        return f64::NAN;
    };
    let year = if yy / 10 < 6 { 2000 + yy } else { 1900 + yy };
    let day = day_text.trim().parse::<f64>().unwrap_or(f64::NAN);
    match start_of_year_jd(year) {
        Some(jd0) => jd0 + day - 1.0,
        None => f64::NAN,
    }
}

/// Inverse of [`two_line_date_to_julian`]; always 14 characters for
/// finite input.
pub fn julian_to_two_line_date(jd: f64) -> String {
    let year = julian_to_utc(jd).map(|d| d.year()).unwrap_or(2000);
    let jd0 = start_of_year_jd(year).unwrap_or(J2000_JD);
    let day = jd - jd0 + 1.0;
    format!("{:02}{:012.8}", year.rem_euclid(100), day)
}

/// The simulated clock driven by the host's render loop.
#[derive(Clone, Debug)]
pub struct SimClock {
    now: DateTime<Utc>,
    pub rate: f64,
    pub paused: bool,
}

impl Default for SimClock {
    fn default() -> Self {
        Self { now: Utc::now(), rate: 1.0, paused: false }
    }
}

impl SimClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now, rate: 1.0, paused: false }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn set_now(&mut self, now: DateTime<Utc>) {
        self.now = now;
    }

    pub fn now_as_julian(&self) -> f64 {
        utc_to_julian(self.now)
    }

    /// Advances by `wall_seconds` of real time scaled by `rate`.
    pub fn advance(&mut self, wall_seconds: f64) {
        if self.paused {
            return;
        }
        let millis = (wall_seconds * self.rate * 1000.0).round();
        if millis.is_finite() {
            self.now += Duration::milliseconds(millis as i64);
        }
    }
}

/// Formats a span as `[-][d.]hh:mm:ss[.fffffff]`.
pub fn format_time_span(span: Duration) -> String {
    let negative = span < Duration::zero();
    let span = if negative { -span } else { span };
    let total_secs = span.num_seconds();
    let ticks = span
        .num_microseconds()
        .map(|us| (us % 1_000_000) * 10)
        .unwrap_or(0);
    let days = total_secs / 86400;
    let hours = (total_secs / 3600) % 24;
    let minutes = (total_secs / 60) % 60;
    let seconds = total_secs % 60;

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if days > 0 {
        out.push_str(&format!("{}.", days));
    }
    out.push_str(&format!("{:02}:{:02}:{:02}", hours, minutes, seconds));
    if ticks > 0 {
        out.push_str(&format!(".{:07}", ticks));
    }
    out
}

/// Parses the `TimeSpan` text written by [`format_time_span`]. Returns
/// `None` for anything that is not of that shape.
pub fn parse_time_span(text: &str) -> Option<Duration> {
    let text = text.trim();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let mut parts = text.split(':');
    let head = parts.next()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds_part = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let (days, hours) = match head.split_once('.') {
        Some((d, h)) => (d.parse::<i64>().ok()?, h.parse::<i64>().ok()?),
        None => (0, head.parse::<i64>().ok()?),
    };
    let (seconds, ticks) = match seconds_part.split_once('.') {
        Some((s, frac)) => {
            if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let digits = &frac[..frac.len().min(7)];
            let scale = 10_i64.pow(7 - digits.len() as u32);
            (s.parse::<i64>().ok()?, digits.parse::<i64>().ok()? * scale)
        }
        None => (seconds_part.parse::<i64>().ok()?, 0),
    };

    let total_ticks = days
        .checked_mul(24)?
        .checked_add(hours)?
        .checked_mul(60)?
        .checked_add(minutes)?
        .checked_mul(60)?
        .checked_add(seconds)?
        .checked_mul(TICKS_PER_SECOND)?
        .checked_add(ticks)?;
    let span = Duration::microseconds(total_ticks / 10);
    Some(if negative { -span } else { span })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_j2000_julian_date() {
        let j2000 = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert_abs_diff_eq!(utc_to_julian(j2000), J2000_JD, epsilon = 1e-9);
        let back = julian_to_utc(J2000_JD).unwrap();
        assert_eq!(back, j2000);
    }

    #[test]
    fn test_two_line_date_century_split() {
        let jd_2008 = two_line_date_to_julian("08264.51782528");
        let start_2008 = utc_to_julian(Utc.with_ymd_and_hms(2008, 1, 1, 0, 0, 0).unwrap());
        assert_abs_diff_eq!(jd_2008 - start_2008, 263.51782528, epsilon = 1e-8);

        let jd_1998 = two_line_date_to_julian("98001.00000000");
        let start_1998 = utc_to_julian(Utc.with_ymd_and_hms(1998, 1, 1, 0, 0, 0).unwrap());
        assert_abs_diff_eq!(jd_1998, start_1998, epsilon = 1e-9);
    }

    #[test]
    fn test_two_line_date_round_trip() {
        let text = "08264.51782528";
        let jd = two_line_date_to_julian(text);
        assert_eq!(julian_to_two_line_date(jd), text);
        assert_eq!(julian_to_two_line_date(two_line_date_to_julian("21005.50000000")), "21005.50000000");
    }

    #[test]
    fn test_malformed_two_line_date_is_nan() {
        assert!(two_line_date_to_julian("ab").is_nan());
        assert!(two_line_date_to_julian("08abc").is_nan());
        assert!(two_line_date_to_julian("").is_nan());
    }

    #[test]
    fn test_time_span_round_trip() {
        let span = Duration::days(2) + Duration::hours(3) + Duration::minutes(4) + Duration::seconds(5);
        let text = format_time_span(span);
        assert_eq!(text, "2.03:04:05");
        assert_eq!(parse_time_span(&text), Some(span));

        assert_eq!(format_time_span(Duration::zero()), "00:00:00");
        assert_eq!(parse_time_span("00:00:00"), Some(Duration::zero()));
        assert_eq!(parse_time_span("00:00:01.5"), Some(Duration::milliseconds(1500)));
        assert_eq!(parse_time_span("-01:00:00"), Some(-Duration::hours(1)));
        assert_eq!(parse_time_span("garbage"), None);
    }

    #[test]
    fn test_malformed_time_span_is_none() {
        assert_eq!(parse_time_span("00:00:01.ééééééé"), None);
        assert_eq!(parse_time_span("00:00:01."), None);
        assert_eq!(parse_time_span("9999999999999.00:00:00"), None);
        assert_eq!(parse_time_span("00:00:9223372036854775807"), None);
        assert_eq!(parse_time_span("00:00:01.12345678"), Some(Duration::microseconds(1_123_456)));
    }

    #[test]
    fn test_clock_advance_respects_rate_and_pause() {
        let start = Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap();
        let mut clock = SimClock::at(start);
        clock.rate = 60.0;
        clock.advance(1.0);
        assert_eq!(clock.now(), start + Duration::minutes(1));
        clock.paused = true;
        clock.advance(10.0);
        assert_eq!(clock.now(), start + Duration::minutes(1));
    }
}
