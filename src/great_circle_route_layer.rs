//! Great-circle arc between two surface points, optionally drawn only
//! part of the way.

use std::any::Any;
use std::sync::Arc;

use crate::layer::{set_field, Layer, LayerCommon, LayerKind, BASE_PARAM_NAMES};
use crate::math::{geo_to_3d, great_circle_angle, slerp};
use crate::render::{DrawCommand, Polyline, RenderContext};
use crate::xml::XmlElement;

pub const GREAT_CIRCLE_PARAM_NAMES: [&str; 6] = [
    "PercentComplete",
    "Color.Red",
    "Color.Green",
    "Color.Blue",
    "Color.Alpha",
    "Opacity",
];

/// Degrees of arc per segment.
const SEGMENT_DEGREES: f64 = 1.0;

/// Polyline from start toward end, stopping at `percent_complete` (0-100)
/// of the arc.
pub fn tessellate_route(lat_start: f64, lng_start: f64, lat_end: f64, lng_end: f64, percent_complete: f64) -> Polyline {
    let a = geo_to_3d(lat_start, lng_start, 1.0);
    let b = geo_to_3d(lat_end, lng_end, 1.0);
    let fraction = (percent_complete / 100.0).clamp(0.0, 1.0);
    let arc = great_circle_angle(lat_start, lng_start, lat_end, lng_end).to_degrees() * fraction;
    let segments = (arc / SEGMENT_DEGREES - 1e-6).ceil().max(1.0) as usize;
    (0..=segments)
        .map(|i| slerp(&a, &b, fraction * i as f64 / segments as f64).cast::<f32>())
        .collect()
}

pub struct GreatCircleRouteLayer {
    common: LayerCommon,
    lat_start: f64,
    lng_start: f64,
    lat_end: f64,
    lng_end: f64,
    width: f64,
    percent_complete: f64,
    cache: Option<Arc<[Polyline]>>,
}

impl GreatCircleRouteLayer {
    pub fn new(name: &str, reference_frame: &str) -> Self {
        Self {
            common: LayerCommon::new(name, reference_frame),
            lat_start: 0.0,
            lng_start: 0.0,
            lat_end: 0.0,
            lng_end: 0.0,
            width: 4.0,
            percent_complete: 100.0,
            cache: None,
        }
    }

    pub fn endpoints(&self) -> ((f64, f64), (f64, f64)) {
        ((self.lat_start, self.lng_start), (self.lat_end, self.lng_end))
    }

    pub fn set_start(&mut self, lat: f64, lng: f64) -> bool {
        let changed = set_field(&mut self.common, &mut self.lat_start, lat)
            | set_field(&mut self.common, &mut self.lng_start, lng);
        if changed {
            self.cache = None;
        }
        changed
    }

    pub fn set_end(&mut self, lat: f64, lng: f64) -> bool {
        let changed = set_field(&mut self.common, &mut self.lat_end, lat)
            | set_field(&mut self.common, &mut self.lng_end, lng);
        if changed {
            self.cache = None;
        }
        changed
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn set_width(&mut self, width: f64) -> bool {
        set_field(&mut self.common, &mut self.width, width)
    }

    pub fn percent_complete(&self) -> f64 {
        self.percent_complete
    }

    pub fn set_percent_complete(&mut self, percent: f64) -> bool {
        let changed = set_field(&mut self.common, &mut self.percent_complete, percent);
        if changed {
            self.cache = None;
        }
        changed
    }

    fn strips(&mut self) -> Arc<[Polyline]> {
        let (lat1, lng1, lat2, lng2, pct) =
            (self.lat_start, self.lng_start, self.lat_end, self.lng_end, self.percent_complete);
        Arc::clone(
            self.cache
                .get_or_insert_with(|| Arc::from(vec![tessellate_route(lat1, lng1, lat2, lng2, pct)])),
        )
    }
}

impl Layer for GreatCircleRouteLayer {
    fn common(&self) -> &LayerCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut LayerCommon {
        &mut self.common
    }

    fn kind(&self) -> LayerKind {
        LayerKind::GreatCircleRoute
    }

    fn draw(&mut self, ctx: &mut RenderContext, opacity: f64, _flat: bool) -> bool {
        let strips = self.strips();
        ctx.push(DrawCommand::Lines {
            layer: self.common.id().clone(),
            strips,
            color: self.common.color(),
            width: self.width as f32,
            opacity: opacity * self.common.opacity(),
            world: ctx.world,
        });
        true
    }

    fn clean_up(&mut self) {
        self.cache = None;
    }

    fn get_params(&self) -> Vec<f64> {
        let mut params = vec![self.percent_complete];
        params.extend(self.common.base_params());
        params
    }

    fn set_params(&mut self, params: &[f64]) {
        if let [percent, base @ ..] = params {
            if base.len() >= BASE_PARAM_NAMES.len() {
                self.set_percent_complete(*percent);
                self.common.set_base_params(base);
            }
        }
    }

    fn get_param_names(&self) -> Vec<&'static str> {
        GREAT_CIRCLE_PARAM_NAMES.to_vec()
    }

    fn write_layer_properties(&self, el: &mut XmlElement) {
        el.set_attr("LatStart", self.lat_start);
        el.set_attr("LngStart", self.lng_start);
        el.set_attr("LatEnd", self.lat_end);
        el.set_attr("LngEnd", self.lng_end);
        el.set_attr("Width", self.width);
        el.set_attr("PercentComplete", self.percent_complete);
    }

    fn initialize_from_xml(&mut self, el: &XmlElement) {
        self.set_start(el.attr_f64("LatStart", 0.0), el.attr_f64("LngStart", 0.0));
        self.set_end(el.attr_f64("LatEnd", 0.0), el.attr_f64("LngEnd", 0.0));
        self.set_width(el.attr_f64("Width", 4.0));
        self.set_percent_complete(el.attr_f64("PercentComplete", 100.0));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
