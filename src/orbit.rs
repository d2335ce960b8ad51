//! Cached orbit path for an orbital reference frame.

use std::sync::Arc;

use nalgebra::{Matrix4, Vector3};

use crate::color::Color;
use crate::orbit_solver::{OrbitSolver, OrbitalElements};
use crate::render::{DrawCommand, RenderContext};

const MAX_POINTS: usize = 2000;

#[derive(Clone, Debug)]
pub struct Orbit {
    elements: OrbitalElements,
    unit_scale: f64,
    segments: usize,
    points: Arc<[Vector3<f32>]>,
    pub color: Color,
}

impl Orbit {
    /// Samples one revolution. `unit_scale` converts the element units
    /// into the parent frame's normalized units.
    pub fn new(
        elements: OrbitalElements,
        unit_scale: f64,
        segments: usize,
        color: Color,
        solver: &dyn OrbitSolver,
    ) -> Self {
        let period = elements.period_days();
        let e = elements.eccentricity;
        let size_ratio = ((1.0 + e) / (1.0 - e)).max(1.0);
        let count = ((segments.max(3) as f64) * size_ratio).min(MAX_POINTS as f64) as usize;

        let points: Vec<Vector3<f32>> = if period.is_finite() && period > 0.0 {
            (0..=count)
                .filter_map(|i| {
                    let jd = elements.epoch + period * i as f64 / count as f64;
                    solver.position(jd, &elements).ok()
                })
                .map(|p| (p * unit_scale).cast::<f32>())
                .collect()
        } else {
            log::debug!("Orbit with mean motion {} has no period; nothing to sample", elements.mean_daily_motion);
            Vec::new()
        };

        Self { elements, unit_scale, segments, points: points.into(), color }
    }

    pub fn matches(&self, elements: &OrbitalElements, unit_scale: f64, segments: usize) -> bool {
        self.elements == *elements && self.unit_scale == unit_scale && self.segments == segments
    }

    pub fn points(&self) -> &Arc<[Vector3<f32>]> {
        &self.points
    }

    pub fn draw(&self, ctx: &mut RenderContext, frame: &str, world: Matrix4<f64>, opacity: f64) {
        if self.points.is_empty() {
            return;
        }
        ctx.push(DrawCommand::Orbit {
            frame: frame.to_string(),
            points: Arc::clone(&self.points),
            color: self.color,
            opacity,
            world,
        });
    }
}
