//! Minor-moon table: one tab separated row per moon, turned into orbital
//! frames hung under their planet.

use crate::color::Color;
use crate::reference_frame::{Reference, ReferenceFrame, ReferenceFrameType};
use crate::units::AltUnit;

pub const MOON_ORBIT_COLOR: Color = Color::argb(255, 175, 216, 230);

const PLANET: usize = 0;
const EPOCH: usize = 1;
const NAME: usize = 2;
const SEMI_MAJOR_AXIS_KM: usize = 3;
const ECCENTRICITY: usize = 4;
const ARGUMENT_OF_PERIAPSIS: usize = 5;
const MEAN_ANOMALY: usize = 6;
const INCLINATION: usize = 7;
const ASCENDING_NODE: usize = 8;
const MEAN_DAILY_MOTION: usize = 9;
const RADIUS_KM: usize = 16;
const ROTATIONAL_PERIOD: usize = 17;

fn number(parts: &[&str], index: usize) -> f64 {
    parts
        .get(index)
        .map(|s| s.trim().parse().unwrap_or(f64::NAN))
        .unwrap_or(0.0)
}

/// Parses one row. Rows too short to carry a radius, and rows whose
/// semi-major axis is not a number (headers), give `None`.
pub fn parse_moon_row(line: &str) -> Option<ReferenceFrame> {
    let parts: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
    if parts.len() <= RADIUS_KM {
        return None;
    }
    let semi_major_axis_km: f64 = parts[SEMI_MAJOR_AXIS_KM].trim().parse().ok()?;
    let name = parts[NAME].trim();
    let planet = parts[PLANET].trim();
    if name.is_empty() || planet.is_empty() {
        return None;
    }

    let mut frame = ReferenceFrame::new(name, Reference::Custom);
    frame.parent = planet.to_string();
    frame.reference_frame_type = ReferenceFrameType::Orbital;
    frame.system_generated = true;
    frame.epoch = number(&parts, EPOCH);
    frame.semi_major_axis = semi_major_axis_km * 1000.0;
    frame.semi_major_axis_units = AltUnit::Meters;
    frame.eccentricity = number(&parts, ECCENTRICITY);
    frame.argument_of_periapsis = number(&parts, ARGUMENT_OF_PERIAPSIS);
    frame.mean_anomaly_at_epoch = number(&parts, MEAN_ANOMALY);
    frame.inclination = number(&parts, INCLINATION);
    frame.longitude_of_ascending_node = number(&parts, ASCENDING_NODE);
    frame.mean_daily_motion = number(&parts, MEAN_DAILY_MOTION);
    frame.mean_radius = number(&parts, RADIUS_KM) * 1000.0;
    frame.rotational_period = number(&parts, ROTATIONAL_PERIOD);
    frame.scale = 1.0;
    frame.oblateness = 0.0;
    frame.show_as_point = false;
    frame.show_orbit_path = true;
    frame.representative_color = MOON_ORBIT_COLOR;
    Some(frame)
}

/// All moons in the file, in file order. Each frame's `parent` names its
/// planet.
pub fn parse_moon_file(text: &str) -> Vec<ReferenceFrame> {
    let frames: Vec<ReferenceFrame> = text.lines().filter_map(parse_moon_row).collect();
    log::debug!("Moon file: {} rows usable", frames.len());
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn row(planet: &str, name: &str, a_km: &str) -> String {
        let cols = [
            planet, "2451545.0", name, a_km, "0.0151", "214.0", "49.5", "1.57", "110.2", "22.577", "", "", "", "",
            "", "", "105.0", "1.26",
        ];
        cols.join("\t")
    }

    #[test]
    fn test_row_becomes_orbital_frame() {
        let f = parse_moon_row(&row("Mars", "Phobos", "9376")).unwrap();
        assert_eq!(f.name, "Phobos");
        assert_eq!(f.parent, "Mars");
        assert_eq!(f.reference, Reference::Custom);
        assert_eq!(f.reference_frame_type, ReferenceFrameType::Orbital);
        assert!(f.system_generated && f.show_orbit_path && !f.show_as_point);
        assert_relative_eq!(f.semi_major_axis, 9_376_000.0);
        assert_relative_eq!(f.mean_radius, 105_000.0);
        assert_relative_eq!(f.eccentricity, 0.0151);
        assert_relative_eq!(f.argument_of_periapsis, 214.0);
        assert_relative_eq!(f.mean_anomaly_at_epoch, 49.5);
        assert_relative_eq!(f.inclination, 1.57);
        assert_relative_eq!(f.longitude_of_ascending_node, 110.2);
        assert_relative_eq!(f.mean_daily_motion, 22.577);
        assert_relative_eq!(f.rotational_period, 1.26);
        assert_eq!(f.representative_color, MOON_ORBIT_COLOR);
    }

    #[test]
    fn test_header_and_short_rows_skipped() {
        let text = format!(
            "Planet\tEpoch\tName\tA\n{}\nJupiter\t1\tShort\n{}\r\n",
            row("Mars", "Phobos", "9376"),
            row("Mars", "Deimos", "23458"),
        );
        let names: Vec<String> = parse_moon_file(&text).into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["Phobos", "Deimos"]);
        let header = "Planet\tEpoch\tName\tSemiMajor\te\tw\tM\ti\tO\tn\t\t\t\t\t\t\tRadius\tPeriod";
        assert!(parse_moon_row(header).is_none());
    }

    #[test]
    fn test_bad_cells_become_nan() {
        let line = row("Mars", "Phobos", "9376").replace("0.0151", "n/a");
        let f = parse_moon_row(&line).unwrap();
        assert!(f.eccentricity.is_nan());
    }
}
