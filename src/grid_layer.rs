//! Latitude/longitude grid over the frame's unit sphere.

use std::any::Any;
use std::sync::Arc;

use crate::layer::{set_field, Layer, LayerCommon, LayerKind};
use crate::math::geo_to_3d;
use crate::render::{DrawCommand, Polyline, RenderContext};
use crate::xml::XmlElement;

pub struct GridLayer {
    common: LayerCommon,
    lat_spacing: f64,
    lng_spacing: f64,
    /// Degrees between vertices along a line.
    resolution: f64,
    cache: Option<(u64, Arc<[Polyline]>)>,
}

/// Upper bound on samples along one strip and on strips per family.
const MAX_STEPS: usize = 720;

fn steps(from: f64, to: f64, step: f64) -> impl Iterator<Item = f64> {
    let step = step.max((to - from) / MAX_STEPS as f64);
    let count = (((to - from) / step).floor() as usize).min(MAX_STEPS);
    (0..=count).map(move |i| from + i as f64 * step)
}

/// Meridians from pole to pole, then parallels as closed rings. Poles are
/// not drawn as rings.
pub fn tessellate_grid(lat_spacing: f64, lng_spacing: f64, resolution: f64) -> Vec<Polyline> {
    if !(lat_spacing > 0.0 && lng_spacing > 0.0 && resolution > 0.0) {
        return Vec::new();
    }
    let point = |lat: f64, lng: f64| geo_to_3d(lat, lng, 1.0).cast::<f32>();
    let meridians = steps(-180.0, 180.0 - lng_spacing * 0.5, lng_spacing)
        .map(|lng| steps(-90.0, 90.0, resolution).map(|lat| point(lat, lng)).collect::<Polyline>());
    let parallels = steps(-90.0 + lat_spacing, 90.0 - lat_spacing * 0.5, lat_spacing)
        .map(|lat| steps(-180.0, 180.0, resolution).map(|lng| point(lat, lng)).collect::<Polyline>());
    meridians.chain(parallels).collect()
}

impl GridLayer {
    pub fn new(name: &str, reference_frame: &str) -> Self {
        Self {
            common: LayerCommon::new(name, reference_frame),
            lat_spacing: 10.0,
            lng_spacing: 10.0,
            resolution: 2.0,
            cache: None,
        }
    }

    pub fn lat_spacing(&self) -> f64 {
        self.lat_spacing
    }

    pub fn set_lat_spacing(&mut self, degrees: f64) -> bool {
        set_field(&mut self.common, &mut self.lat_spacing, degrees)
    }

    pub fn lng_spacing(&self) -> f64 {
        self.lng_spacing
    }

    pub fn set_lng_spacing(&mut self, degrees: f64) -> bool {
        set_field(&mut self.common, &mut self.lng_spacing, degrees)
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn set_resolution(&mut self, degrees: f64) -> bool {
        set_field(&mut self.common, &mut self.resolution, degrees)
    }

    fn strips(&mut self) -> Arc<[Polyline]> {
        let version = self.common.version();
        match &self.cache {
            Some((v, strips)) if *v == version => Arc::clone(strips),
            _ => {
                let strips: Arc<[Polyline]> = tessellate_grid(self.lat_spacing, self.lng_spacing, self.resolution).into();
                self.cache = Some((version, Arc::clone(&strips)));
                strips
            }
        }
    }
}

impl Layer for GridLayer {
    fn common(&self) -> &LayerCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut LayerCommon {
        &mut self.common
    }

    fn kind(&self) -> LayerKind {
        LayerKind::Grid
    }

    fn draw(&mut self, ctx: &mut RenderContext, opacity: f64, _flat: bool) -> bool {
        let strips = self.strips();
        if strips.is_empty() {
            return false;
        }
        ctx.push(DrawCommand::Grid {
            layer: self.common.id().clone(),
            strips,
            color: self.common.color(),
            opacity: opacity * self.common.opacity(),
            world: ctx.world,
        });
        true
    }

    fn clean_up(&mut self) {
        self.cache = None;
    }

    fn write_layer_properties(&self, el: &mut XmlElement) {
        el.set_attr("LatSpacing", self.lat_spacing);
        el.set_attr("LngSpacing", self.lng_spacing);
        el.set_attr("Resolution", self.resolution);
    }

    fn initialize_from_xml(&mut self, el: &XmlElement) {
        self.set_lat_spacing(el.attr_f64("LatSpacing", 10.0));
        self.set_lng_spacing(el.attr_f64("LngSpacing", 10.0));
        self.set_resolution(el.attr_f64("Resolution", 2.0));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
