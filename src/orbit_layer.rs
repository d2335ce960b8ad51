//! Satellites loaded from TLE text, drawn as orbit paths plus a point at
//! each object's current position.

use std::any::Any;
use std::sync::Arc;

use nalgebra::Vector3;

use crate::color::Color;
use crate::layer::{set_field, Layer, LayerCommon, LayerKind};
use crate::math::transform_point;
use crate::orbit_solver::KeplerSolver;
use crate::reference_frame::{Reference, ReferenceFrame};
use crate::render::{DrawCommand, PlotType, PointStyle, PointVertex, RenderContext};
use crate::tle::{parse_tle_blocks, EARTH_GM};
use crate::xml::XmlElement;

const POINT_SIZE: f32 = 6.0;

pub struct OrbitLayer {
    common: LayerCommon,
    tle_text: String,
    frames: Vec<ReferenceFrame>,
    point_color: Color,
    point_opacity: f64,
    gm: f64,
}

/// One orbital frame per TLE block. Unnamed blocks get a positional name.
fn frames_from_tle(text: &str, gm: f64) -> Vec<ReferenceFrame> {
    parse_tle_blocks(text)
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let name = record.name.unwrap_or_else(|| format!("Object {}", i + 1));
            let mut frame = ReferenceFrame::new(name, Reference::Custom);
            frame.from_tle(&record.line1, &record.line2, gm);
            frame.show_orbit_path = true;
            frame
        })
        .collect()
}

impl OrbitLayer {
    /// Frames orbit a body with Earth's gravitational parameter.
    pub fn new(name: &str, reference_frame: &str, tle_text: &str) -> Self {
        Self::with_gm(name, reference_frame, tle_text, EARTH_GM)
    }

    pub fn with_gm(name: &str, reference_frame: &str, tle_text: &str, gm: f64) -> Self {
        let frames = frames_from_tle(tle_text, gm);
        log::debug!("Orbit layer {} loaded {} objects", name, frames.len());
        Self {
            common: LayerCommon::new(name, reference_frame),
            tle_text: tle_text.to_string(),
            frames,
            point_color: Color::WHITE,
            point_opacity: 1.0,
            gm,
        }
    }

    pub fn frames(&self) -> &[ReferenceFrame] {
        &self.frames
    }

    pub fn tle_text(&self) -> &str {
        &self.tle_text
    }

    pub fn set_tle_text(&mut self, text: &str) -> bool {
        if !set_field(&mut self.common, &mut self.tle_text, text.to_string()) {
            return false;
        }
        self.frames = frames_from_tle(text, self.gm);
        true
    }

    pub fn point_color(&self) -> Color {
        self.point_color
    }

    pub fn set_point_color(&mut self, color: Color) -> bool {
        set_field(&mut self.common, &mut self.point_color, color)
    }

    pub fn point_opacity(&self) -> f64 {
        self.point_opacity
    }

    pub fn set_point_opacity(&mut self, opacity: f64) -> bool {
        set_field(&mut self.common, &mut self.point_opacity, opacity)
    }
}

impl Layer for OrbitLayer {
    fn common(&self) -> &LayerCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut LayerCommon {
        &mut self.common
    }

    fn kind(&self) -> LayerKind {
        LayerKind::Orbit
    }

    fn draw(&mut self, ctx: &mut RenderContext, opacity: f64, _flat: bool) -> bool {
        if self.frames.is_empty() {
            return false;
        }
        let opacity = opacity * self.common.opacity();
        let base = ctx.world_base_non_rotating;
        let segments = ctx.settings.orbit_segments;
        let nominal_radius = ctx.nominal_radius;
        let mut points = Vec::with_capacity(self.frames.len());

        for frame in &mut self.frames {
            frame.representative_color = self.common.color();
            let name = frame.name.clone();
            frame.orbit(segments, nominal_radius).draw(ctx, &name, base, opacity);

            frame.compute_frame_at(ctx.jd_now, nominal_radius, &KeplerSolver);
            let p = transform_point(&frame.world_matrix, &Vector3::zeros());
            if p.iter().all(|c| c.is_finite()) {
                points.push(PointVertex { position: p.cast::<f32>(), size: POINT_SIZE, color: self.point_color });
            }
        }

        if !points.is_empty() {
            ctx.push(DrawCommand::Points {
                layer: self.common.id().clone(),
                points: Arc::from(points),
                style: PointStyle { plot_type: PlotType::Circle, ..Default::default() },
                opacity: opacity * self.point_opacity,
                world: base,
            });
        }
        true
    }

    fn clean_up(&mut self) {
        for frame in &mut self.frames {
            frame.invalidate_orbit();
        }
    }

    fn write_layer_properties(&self, el: &mut XmlElement) {
        el.set_attr("PointOpacity", self.point_opacity);
        el.set_attr("PointColor", self.point_color.to_save_string());
        let mut tle = XmlElement::new("Tle");
        tle.text = self.tle_text.clone();
        el.push_child(tle);
    }

    fn initialize_from_xml(&mut self, el: &XmlElement) {
        self.set_point_opacity(el.attr_f64("PointOpacity", 1.0));
        if let Some(color) = el.attr("PointColor") {
            self.set_point_color(Color::from_save_string(color));
        }
        if let Some(tle) = el.child("Tle") {
            self.set_tle_text(&tle.text);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
