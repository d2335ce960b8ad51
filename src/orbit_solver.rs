//! Keplerian propagation for orbital reference frames.

use nalgebra::Vector3;
use std::f64::consts::PI;
use thiserror::Error;

const MAX_ITERATIONS: usize = 50;
const TOLERANCE: f64 = 1e-12;
/// Gaussian gravitational constant expressed as degrees per day for a = 1 AU.
const GAUSS_DEG_PER_DAY: f64 = 0.9856076686;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrbitError {
    #[error("Eccentricity {0} is outside the elliptical range [0, 1)")]
    NotElliptical(f64),

    #[error("Kepler's equation did not converge for M={mean_anomaly}, e={eccentricity}")]
    NoConvergence { mean_anomaly: f64, eccentricity: f64 },
}

/// Classical elements. Angles in degrees, motion in degrees per day,
/// epoch as a Julian date. The semi-major axis is in whatever unit the
/// caller tracks; positions come back in the same unit.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OrbitalElements {
    pub semi_major_axis: f64,
    pub eccentricity: f64,
    pub inclination: f64,
    pub argument_of_periapsis: f64,
    pub longitude_of_ascending_node: f64,
    pub mean_anomaly_at_epoch: f64,
    pub mean_daily_motion: f64,
    pub epoch: f64,
}

impl OrbitalElements {
    pub fn mean_anomaly_at(&self, jd: f64) -> f64 {
        (self.mean_anomaly_at_epoch + self.mean_daily_motion * (jd - self.epoch)).rem_euclid(360.0)
    }

    /// One revolution in days; infinite for a stationary orbit.
    pub fn period_days(&self) -> f64 {
        360.0 / self.mean_daily_motion.abs()
    }
}

pub trait OrbitSolver {
    /// Position at `jd`, Y up, in the units of the semi-major axis.
    fn position(&self, jd: f64, elements: &OrbitalElements) -> Result<Vector3<f64>, OrbitError>;

    /// Mean motion in degrees per day for a heliocentric orbit of `a_au`.
    fn mean_motion_from_semi_major_axis(&self, a_au: f64) -> f64 {
        GAUSS_DEG_PER_DAY / a_au.powf(1.5)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct KeplerSolver;

pub fn solve_kepler(mean_anomaly: f64, e: f64) -> Result<f64, OrbitError> {
    let mut ea = if e > 0.8 { PI } else { mean_anomaly };
    for _ in 0..MAX_ITERATIONS {
        let delta = (ea - e * ea.sin() - mean_anomaly) / (1.0 - e * ea.cos());
        ea -= delta;
        if !delta.is_finite() || delta.abs() < TOLERANCE {
            return Ok(ea);
        }
    }
    Err(OrbitError::NoConvergence { mean_anomaly, eccentricity: e })
}

impl OrbitSolver for KeplerSolver {
    fn position(&self, jd: f64, el: &OrbitalElements) -> Result<Vector3<f64>, OrbitError> {
        let e = el.eccentricity;
        if e < 0.0 || e >= 1.0 {
            return Err(OrbitError::NotElliptical(e));
        }
        let ma = el.mean_anomaly_at(jd).to_radians();
        let ea = solve_kepler(ma, e)?;

        let x_orb = el.semi_major_axis * (ea.cos() - e);
        let y_orb = el.semi_major_axis * (1.0 - e * e).sqrt() * ea.sin();

        let (sin_w, cos_w) = el.argument_of_periapsis.to_radians().sin_cos();
        let (sin_om, cos_om) = el.longitude_of_ascending_node.to_radians().sin_cos();
        let (sin_i, cos_i) = el.inclination.to_radians().sin_cos();

        let x = (cos_om * cos_w - sin_om * sin_w * cos_i) * x_orb
            + (-cos_om * sin_w - sin_om * cos_w * cos_i) * y_orb;
        let y = (sin_om * cos_w + cos_om * sin_w * cos_i) * x_orb
            + (-sin_om * sin_w + cos_om * cos_w * cos_i) * y_orb;
        let z = sin_w * sin_i * x_orb + cos_w * sin_i * y_orb;

        Ok(Vector3::new(x, z, y))
    }
}
