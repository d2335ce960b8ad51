//! Reference frames: the coordinate systems layers are placed in.
//!
//! A frame either sits at a fixed latitude/longitude/altitude on its
//! parent body ([`ReferenceFrameType::FixedSpherical`]) or follows a
//! Keplerian orbit around it ([`ReferenceFrameType::Orbital`]). Each
//! frame computes a `world_matrix` relative to its parent for the
//! current simulated time; the layer manager multiplies it onto either
//! the parent's rotating or non-rotating basis.

use nalgebra::{Matrix4, Vector3};
use std::f64::consts::PI;

use crate::color::Color;
use crate::math::{face_towards, format_vector, parse_vector, rotation_yaw_pitch_roll, Transform};
use crate::orbit::Orbit;
use crate::orbit_solver::{KeplerSolver, OrbitSolver, OrbitalElements};
use crate::render::RenderContext;
use crate::tle::{format_tle_lines, mean_motion_to_semi_major_axis, parse_tle_elements, TleElements};
use crate::units::AltUnit;
use crate::xml::XmlElement;

/// Step used to sample the direction of travel, in days.
const VELOCITY_SAMPLE_DAYS: f64 = 1.0 / 86400.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Reference {
    Sky = 0,
    Ecliptic = 1,
    Galactic = 2,
    Sun = 3,
    Mercury = 4,
    Venus = 5,
    Earth = 6,
    Mars = 7,
    Jupiter = 8,
    Saturn = 9,
    Uranus = 10,
    Neptune = 11,
    Pluto = 12,
    Moon = 13,
    Io = 14,
    Europa = 15,
    Ganymede = 16,
    Callisto = 17,
    #[default]
    Custom = 18,
    Identity = 19,
    Sandbox = 20,
}

impl Reference {
    pub const ALL: [Reference; 21] = [
        Reference::Sky,
        Reference::Ecliptic,
        Reference::Galactic,
        Reference::Sun,
        Reference::Mercury,
        Reference::Venus,
        Reference::Earth,
        Reference::Mars,
        Reference::Jupiter,
        Reference::Saturn,
        Reference::Uranus,
        Reference::Neptune,
        Reference::Pluto,
        Reference::Moon,
        Reference::Io,
        Reference::Europa,
        Reference::Ganymede,
        Reference::Callisto,
        Reference::Custom,
        Reference::Identity,
        Reference::Sandbox,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Reference::Sky => "Sky",
            Reference::Ecliptic => "Ecliptic",
            Reference::Galactic => "Galactic",
            Reference::Sun => "Sun",
            Reference::Mercury => "Mercury",
            Reference::Venus => "Venus",
            Reference::Earth => "Earth",
            Reference::Mars => "Mars",
            Reference::Jupiter => "Jupiter",
            Reference::Saturn => "Saturn",
            Reference::Uranus => "Uranus",
            Reference::Neptune => "Neptune",
            Reference::Pluto => "Pluto",
            Reference::Moon => "Moon",
            Reference::Io => "Io",
            Reference::Europa => "Europa",
            Reference::Ganymede => "Ganymede",
            Reference::Callisto => "Callisto",
            Reference::Custom => "Custom",
            Reference::Identity => "Identity",
            Reference::Sandbox => "Sandbox",
        }
    }

    pub fn from_label(text: &str) -> Option<Reference> {
        Self::ALL.iter().copied().find(|r| r.label() == text.trim())
    }

    pub fn from_i32(value: i32) -> Option<Reference> {
        usize::try_from(value).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    /// Frames whose transform the layer manager computes itself. Built-in
    /// bodies are placed by the host.
    pub fn is_computed(&self) -> bool {
        matches!(self, Reference::Custom | Reference::Identity)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReferenceFrameType {
    #[default]
    FixedSpherical = 0,
    Orbital = 1,
    Trajectory = 2,
    Synodic = 3,
}

impl ReferenceFrameType {
    /// Persisted name. The fixed-spherical spelling is the legacy one
    /// existing files carry and must be written unchanged.
    pub fn label(&self) -> &'static str {
        match self {
            ReferenceFrameType::FixedSpherical => "FixedSherical",
            ReferenceFrameType::Orbital => "Orbital",
            ReferenceFrameType::Trajectory => "Trajectory",
            ReferenceFrameType::Synodic => "Synodic",
        }
    }

    pub fn from_label(text: &str) -> Option<ReferenceFrameType> {
        match text.trim() {
            "FixedSherical" | "FixedSpherical" => Some(ReferenceFrameType::FixedSpherical),
            "Orbital" => Some(ReferenceFrameType::Orbital),
            "Trajectory" => Some(ReferenceFrameType::Trajectory),
            "Synodic" => Some(ReferenceFrameType::Synodic),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReferenceFrame {
    pub name: String,
    pub parent: String,
    pub reference: Reference,
    pub reference_frame_type: ReferenceFrameType,

    pub heading: f64,
    pub pitch: f64,
    pub roll: f64,
    pub scale: f64,
    pub translation: Vector3<f64>,

    pub lat: f64,
    pub lng: f64,
    pub altitude: f64,

    pub semi_major_axis: f64,
    pub semi_major_axis_units: AltUnit,
    pub eccentricity: f64,
    pub inclination: f64,
    pub argument_of_periapsis: f64,
    pub longitude_of_ascending_node: f64,
    pub mean_anomaly_at_epoch: f64,
    pub mean_daily_motion: f64,
    pub epoch: f64,

    /// Days per revolution; zero disables spin.
    pub rotational_period: f64,
    pub zero_rotation_date: f64,
    /// Meters.
    pub mean_radius: f64,
    pub oblateness: f64,
    pub representative_color: Color,
    pub show_as_point: bool,
    pub show_orbit_path: bool,
    pub station_keeping: bool,
    pub system_generated: bool,

    /// Valid only right after [`ReferenceFrame::compute_frame`] for the
    /// current time.
    pub world_matrix: Matrix4<f64>,
    orbit: Option<Orbit>,
}

impl Default for ReferenceFrame {
    fn default() -> Self {
        Self {
            name: String::new(),
            parent: String::new(),
            reference: Reference::Custom,
            reference_frame_type: ReferenceFrameType::FixedSpherical,
            heading: 0.0,
            pitch: 0.0,
            roll: 0.0,
            scale: 1.0,
            translation: Vector3::zeros(),
            lat: 0.0,
            lng: 0.0,
            altitude: 0.0,
            semi_major_axis: 0.0,
            semi_major_axis_units: AltUnit::Meters,
            eccentricity: 0.0,
            inclination: 0.0,
            argument_of_periapsis: 0.0,
            longitude_of_ascending_node: 0.0,
            mean_anomaly_at_epoch: 0.0,
            mean_daily_motion: 0.0,
            epoch: 0.0,
            rotational_period: 0.0,
            zero_rotation_date: 0.0,
            mean_radius: 6371000.0,
            oblateness: 0.0033528,
            representative_color: Color::WHITE,
            show_as_point: false,
            show_orbit_path: false,
            station_keeping: false,
            system_generated: false,
            world_matrix: Matrix4::identity(),
            orbit: None,
        }
    }
}

impl ReferenceFrame {
    pub fn new(name: impl Into<String>, reference: Reference) -> Self {
        Self { name: name.into(), reference, ..Default::default() }
    }

    /// Orbiting frames are not carried around by the parent's spin.
    pub fn use_rotating_parent_frame(&self) -> bool {
        !matches!(
            self.reference_frame_type,
            ReferenceFrameType::Orbital | ReferenceFrameType::Trajectory | ReferenceFrameType::Synodic
        )
    }

    pub fn elements(&self) -> OrbitalElements {
        OrbitalElements {
            semi_major_axis: self.semi_major_axis,
            eccentricity: self.eccentricity,
            inclination: self.inclination,
            argument_of_periapsis: self.argument_of_periapsis,
            longitude_of_ascending_node: self.longitude_of_ascending_node,
            mean_anomaly_at_epoch: self.mean_anomaly_at_epoch,
            mean_daily_motion: self.mean_daily_motion,
            epoch: self.epoch,
        }
    }

    pub fn compute_frame(&mut self, ctx: &RenderContext) {
        self.compute_frame_at(ctx.jd_now, ctx.nominal_radius, &KeplerSolver);
    }

    pub fn compute_frame_at(&mut self, jd: f64, nominal_radius: f64, solver: &dyn OrbitSolver) {
        self.world_matrix = match self.reference_frame_type {
            ReferenceFrameType::FixedSpherical => self.fixed_spherical_matrix(jd, nominal_radius),
            ReferenceFrameType::Orbital => self.orbital_matrix(jd, nominal_radius, solver),
            ReferenceFrameType::Trajectory | ReferenceFrameType::Synodic => Matrix4::identity(),
        };
    }

    fn spin_angle(&self, jd: f64) -> f64 {
        ((jd - self.zero_rotation_date) / self.rotational_period * 2.0 * PI).rem_euclid(2.0 * PI)
    }

    fn local_transform(&self, start: Transform, nominal_radius: f64) -> Transform {
        let local_scale = (1.0 / nominal_radius) * self.scale * self.mean_radius;
        start
            .translate(self.translation)
            .scale(local_scale)
            .then(rotation_yaw_pitch_roll(
                self.heading.to_radians(),
                self.pitch.to_radians(),
                self.roll.to_radians(),
            ))
    }

    fn fixed_spherical_matrix(&self, jd: f64, nominal_radius: f64) -> Matrix4<f64> {
        let mut t = self
            .local_transform(Transform::identity(), nominal_radius)
            .rotate_z(-PI / 2.0);
        if self.rotational_period != 0.0 {
            t = t.rotate_x(-self.spin_angle(jd));
        }
        t.translate(Vector3::new(1.0 + self.altitude / nominal_radius, 0.0, 0.0))
            .rotate_z(self.lat.to_radians())
            .rotate_y(-(self.lng + 180.0).to_radians())
            .matrix()
    }

    fn orbital_matrix(&self, jd: f64, nominal_radius: f64, solver: &dyn OrbitSolver) -> Matrix4<f64> {
        let elements = self.elements();
        let (point, later) = match (
            solver.position(jd, &elements),
            solver.position(jd + VELOCITY_SAMPLE_DAYS, &elements),
        ) {
            (Ok(p), Ok(l)) => (p, l),
            (Err(e), _) | (_, Err(e)) => {
                log::debug!("Frame {} falls back to identity: {}", self.name, e);
                return Matrix4::identity();
            }
        };

        let mut start = Transform::identity();
        if self.station_keeping {
            match face_towards(&(later - point), &point) {
                Some(look) => start = Transform(look),
                None => log::debug!("Frame {} has no direction of travel; orientation skipped", self.name),
            }
        }

        let mut t = self.local_transform(start, nominal_radius);
        if self.rotational_period != 0.0 {
            t = t.rotate_x(-self.spin_angle(jd));
        }
        let unit_scale = self.semi_major_axis_units.to_meters() / nominal_radius;
        t.translate(point * unit_scale).matrix()
    }

    /// Loads orbital elements from a TLE pair. `gm` is the central body's
    /// gravitational parameter in m^3/s^2.
    pub fn from_tle(&mut self, line1: &str, line2: &str, gm: f64) {
        let el = parse_tle_elements(line1, line2);
        self.reference_frame_type = ReferenceFrameType::Orbital;
        self.epoch = el.epoch;
        self.eccentricity = el.eccentricity;
        self.inclination = el.inclination;
        self.longitude_of_ascending_node = el.raan;
        self.argument_of_periapsis = el.argument_of_periapsis;
        self.mean_anomaly_at_epoch = el.mean_anomaly;
        self.mean_daily_motion = el.revs_per_day * 360.0;
        self.semi_major_axis = mean_motion_to_semi_major_axis(el.revs_per_day, gm);
        self.semi_major_axis_units = AltUnit::Meters;
        self.orbit = None;
    }

    pub fn to_tle(&self) -> (String, String) {
        format_tle_lines(&TleElements {
            epoch: self.epoch,
            inclination: self.inclination,
            raan: self.longitude_of_ascending_node,
            eccentricity: self.eccentricity,
            argument_of_periapsis: self.argument_of_periapsis,
            mean_anomaly: self.mean_anomaly_at_epoch,
            revs_per_day: self.mean_daily_motion / 360.0,
        })
    }

    /// The orbit path in the parent's normalized units, rebuilt when the
    /// elements, units or radius changed since the last call.
    pub fn orbit(&mut self, segments: usize, nominal_radius: f64) -> &Orbit {
        let elements = self.elements();
        let unit_scale = self.semi_major_axis_units.to_meters() / nominal_radius;
        let stale = !matches!(&self.orbit, Some(o) if o.matches(&elements, unit_scale, segments));
        if stale {
            self.orbit = None;
        }
        let color = self.representative_color;
        let orbit = self
            .orbit
            .get_or_insert_with(|| Orbit::new(elements, unit_scale, segments, color, &KeplerSolver));
        orbit.color = color;
        orbit
    }

    pub fn invalidate_orbit(&mut self) {
        self.orbit = None;
    }

    pub fn save_to_xml(&self) -> XmlElement {
        let t = self.translation;
        XmlElement::new("ReferenceFrame")
            .with_attr("Name", &self.name)
            .with_attr("Parent", &self.parent)
            .with_attr("ReferenceFrameType", self.reference_frame_type.label())
            .with_attr("Reference", self.reference.label())
            .with_attr("MeanRadius", self.mean_radius)
            .with_attr("Oblateness", self.oblateness)
            .with_attr("Heading", self.heading)
            .with_attr("Pitch", self.pitch)
            .with_attr("Roll", self.roll)
            .with_attr("Scale", self.scale)
            .with_attr("Translation", format_vector(&t))
            .with_attr("Lat", self.lat)
            .with_attr("Lng", self.lng)
            .with_attr("Altitude", self.altitude)
            .with_attr("RotationalPeriod", self.rotational_period)
            .with_attr("ZeroRotationDate", self.zero_rotation_date)
            .with_attr("RepresentativeColor", self.representative_color.to_save_string())
            .with_attr("ShowAsPoint", self.show_as_point)
            .with_attr("ShowOrbitPath", self.show_orbit_path)
            .with_attr("StationKeeping", self.station_keeping)
            .with_attr("SemiMajorAxis", self.semi_major_axis)
            .with_attr("SemiMajorAxisScale", self.semi_major_axis_units.label())
            .with_attr("Eccentricity", self.eccentricity)
            .with_attr("Inclination", self.inclination)
            .with_attr("ArgumentOfPeriapsis", self.argument_of_periapsis)
            .with_attr("LongitudeOfAscendingNode", self.longitude_of_ascending_node)
            .with_attr("MeanAnomolyAtEpoch", self.mean_anomaly_at_epoch)
            .with_attr("MeanDailyMotion", self.mean_daily_motion)
            .with_attr("Epoch", self.epoch)
    }

    pub fn from_xml(el: &XmlElement) -> ReferenceFrame {
        let d = ReferenceFrame::default();
        ReferenceFrame {
            name: el.attr_string("Name"),
            parent: el.attr_string("Parent"),
            reference_frame_type: el
                .attr("ReferenceFrameType")
                .and_then(ReferenceFrameType::from_label)
                .unwrap_or_default(),
            reference: el.attr("Reference").and_then(Reference::from_label).unwrap_or_default(),
            mean_radius: el.attr_f64("MeanRadius", d.mean_radius),
            oblateness: el.attr_f64("Oblateness", d.oblateness),
            heading: el.attr_f64("Heading", 0.0),
            pitch: el.attr_f64("Pitch", 0.0),
            roll: el.attr_f64("Roll", 0.0),
            scale: el.attr_f64("Scale", 1.0),
            translation: el.attr("Translation").map(parse_vector).unwrap_or_else(Vector3::zeros),
            lat: el.attr_f64("Lat", 0.0),
            lng: el.attr_f64("Lng", 0.0),
            altitude: el.attr_f64("Altitude", 0.0),
            rotational_period: el.attr_f64("RotationalPeriod", 0.0),
            zero_rotation_date: el.attr_f64("ZeroRotationDate", 0.0),
            representative_color: el
                .attr("RepresentativeColor")
                .map(Color::from_save_string)
                .unwrap_or(d.representative_color),
            show_as_point: el.attr_bool("ShowAsPoint", false),
            show_orbit_path: el.attr_bool("ShowOrbitPath", false),
            station_keeping: el.attr_bool("StationKeeping", false),
            semi_major_axis: el.attr_f64("SemiMajorAxis", 0.0),
            semi_major_axis_units: el
                .attr("SemiMajorAxisScale")
                .and_then(AltUnit::from_label)
                .unwrap_or_default(),
            eccentricity: el.attr_f64("Eccentricity", 0.0),
            inclination: el.attr_f64("Inclination", 0.0),
            argument_of_periapsis: el.attr_f64("ArgumentOfPeriapsis", 0.0),
            longitude_of_ascending_node: el.attr_f64("LongitudeOfAscendingNode", 0.0),
            mean_anomaly_at_epoch: el.attr_f64("MeanAnomolyAtEpoch", 0.0),
            mean_daily_motion: el.attr_f64("MeanDailyMotion", 0.0),
            epoch: el.attr_f64("Epoch", 0.0),
            ..d
        }
    }
}
