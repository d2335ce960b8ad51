//! Two-Line Element (TLE) text handling.
//!
//! Fixed-column field extraction, the mod-10 checksum, line formatting
//! for export, and the block reader used for multi-object TLE files.
//! Fields that fail to parse come back as NaN.

use std::f64::consts::PI;

use crate::time::{julian_to_two_line_date, two_line_date_to_julian, SECONDS_PER_DAY};

pub const TLE_LINE_LENGTH: usize = 69;

/// Earth's gravitational parameter, m^3/s^2, as used for TLE import.
pub const EARTH_GM: f64 = 398600441800000.0;

/// Elements carried by a TLE pair, in the units the text uses.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TleElements {
    pub epoch: f64,
    pub inclination: f64,
    pub raan: f64,
    pub eccentricity: f64,
    pub argument_of_periapsis: f64,
    pub mean_anomaly: f64,
    pub revs_per_day: f64,
}

/// A named (or anonymous) element pair from a TLE file.
#[derive(Clone, Debug, PartialEq)]
pub struct TleRecord {
    pub name: Option<String>,
    pub line1: String,
    pub line2: String,
}

fn field(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end)
        .or_else(|| line.get(start..))
        .unwrap_or("")
        .trim()
}

fn parse_f64(text: &str) -> f64 {
    text.parse().unwrap_or(f64::NAN)
}

/// Digit sum over the first 68 columns, '-' counting as one, mod 10.
pub fn tle_checksum(line: &str) -> u32 {
    line.chars()
        .take(TLE_LINE_LENGTH - 1)
        .map(|c| match c {
            '-' => 1,
            c => c.to_digit(10).unwrap_or(0),
        })
        .sum::<u32>()
        % 10
}

pub fn is_tle_checksum_good(line: &str) -> bool {
    if line.len() < TLE_LINE_LENGTH {
        return false;
    }
    line.chars()
        .nth(TLE_LINE_LENGTH - 1)
        .and_then(|c| c.to_digit(10))
        .is_some_and(|digit| digit == tle_checksum(line))
}

pub fn parse_tle_elements(line1: &str, line2: &str) -> TleElements {
    TleElements {
        epoch: two_line_date_to_julian(field(line1, 18, 32)),
        inclination: parse_f64(field(line2, 8, 16)),
        raan: parse_f64(field(line2, 17, 25)),
        eccentricity: parse_f64(&format!("0.{}", field(line2, 26, 33))),
        argument_of_periapsis: parse_f64(field(line2, 34, 42)),
        mean_anomaly: parse_f64(field(line2, 43, 51)),
        revs_per_day: parse_f64(field(line2, 52, 63)),
    }
}

/// Formats an element set as two 69-column lines with valid checksums.
/// Catalog and drag fields are placeholders.
pub fn format_tle_lines(el: &TleElements) -> (String, String) {
    let mut line1 = format!(
        "1 99999U 00111AAA {}  .00000000  00000-0  00000-0 0  999",
        julian_to_two_line_date(el.epoch)
    );
    line1.push_str(&tle_checksum(&line1).to_string());

    let ecc_digits = (el.eccentricity * 10_000_000.0).round() as i64;
    let mut line2 = format!(
        "2 99999 {:8.4} {:8.4} {:07} {:8.4} {:8.4} {:11.8}{:5}",
        el.inclination,
        el.raan,
        ecc_digits,
        el.argument_of_periapsis,
        el.mean_anomaly,
        el.revs_per_day,
        1
    );
    line2.push_str(&tle_checksum(&line2).to_string());
    (line1, line2)
}

/// Semi-major axis in meters for a mean motion in revolutions per day.
pub fn mean_motion_to_semi_major_axis(revs_per_day: f64, gm: f64) -> f64 {
    let n_rad_s = revs_per_day * 2.0 * PI / SECONDS_PER_DAY;
    (gm / (n_rad_s * n_rad_s)).powf(1.0 / 3.0)
}

pub fn is_element_line(line: &str, number: char) -> bool {
    line.starts_with(number) && line.len() == TLE_LINE_LENGTH
}

/// Reads `NAME / LINE1 / LINE2` and bare `LINE1 / LINE2` blocks, in any
/// mix. A non-element line names the pair that follows it.
pub fn parse_tle_blocks(data: &str) -> Vec<TleRecord> {
    let lines: Vec<&str> = data
        .lines()
        .map(|l| l.trim_end())
        .filter(|l| !l.trim().is_empty())
        .collect();
    let mut records = Vec::new();
    let mut pending_name: Option<String> = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if is_element_line(line, '1') {
            if let Some(next) = lines.get(i + 1).copied().filter(|l| is_element_line(l, '2')) {
                records.push(TleRecord {
                    name: pending_name.take(),
                    line1: line.to_string(),
                    line2: next.to_string(),
                });
                i += 2;
                continue;
            }
            log::debug!("TLE line 1 without a matching line 2 at line {}", i + 1);
        } else if !is_element_line(line, '2') {
            pending_name = Some(line.trim().to_string());
        }
        i += 1;
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ISS_LINE1: &str =
        "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    const ISS_LINE2: &str =
        "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    #[test]
    fn test_published_checksums_verify() {
        assert!(is_tle_checksum_good(ISS_LINE1));
        assert!(is_tle_checksum_good(ISS_LINE2));
        let mut corrupted = ISS_LINE2.to_string();
        corrupted.replace_range(9..10, "2");
        assert!(!is_tle_checksum_good(&corrupted));
    }

    #[test]
    fn test_field_extraction() {
        let el = parse_tle_elements(ISS_LINE1, ISS_LINE2);
        assert_relative_eq!(el.inclination, 51.6416);
        assert_relative_eq!(el.raan, 247.4627);
        assert_relative_eq!(el.eccentricity, 0.0006703);
        assert_relative_eq!(el.argument_of_periapsis, 130.5360);
        assert_relative_eq!(el.mean_anomaly, 325.0288);
        assert_relative_eq!(el.revs_per_day, 15.72125391);
    }

    #[test]
    fn test_formatted_lines_are_well_formed() {
        let el = parse_tle_elements(ISS_LINE1, ISS_LINE2);
        let (l1, l2) = format_tle_lines(&el);
        assert_eq!(l1.len(), TLE_LINE_LENGTH);
        assert_eq!(l2.len(), TLE_LINE_LENGTH);
        assert!(is_tle_checksum_good(&l1));
        assert!(is_tle_checksum_good(&l2));
        assert_eq!(&l2[8..63], &ISS_LINE2[8..63]);
        assert_eq!(&l1[18..32], "08264.51782528");
    }

    #[test]
    fn test_short_lines_give_nan() {
        let el = parse_tle_elements("1 short", "2 also short");
        assert!(el.epoch.is_nan());
        assert!(el.inclination.is_nan());
        assert!(el.revs_per_day.is_nan());
    }

    #[test]
    fn test_iss_semi_major_axis() {
        let a = mean_motion_to_semi_major_axis(15.72125391, EARTH_GM);
        assert_relative_eq!(a, 6_730_960.68, max_relative = 1e-6);
    }

    #[test]
    fn test_block_reader_handles_both_forms() {
        let text = format!("ISS (ZARYA)\n{ISS_LINE1}\n{ISS_LINE2}\n{ISS_LINE1}\n{ISS_LINE2}\n");
        let records = parse_tle_blocks(&text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name.as_deref(), Some("ISS (ZARYA)"));
        assert_eq!(records[1].name, None);
        assert_eq!(records[1].line2, ISS_LINE2);
    }

    #[test]
    fn test_block_reader_skips_orphan_lines() {
        let text = format!("{ISS_LINE1}\nGARBAGE\n{ISS_LINE2}\n");
        assert!(parse_tle_blocks(&text).is_empty());
    }
}
