//! Mesh layer with an editable placement gizmo.
//!
//! Mesh decoding (.obj / .3ds) lives outside the engine; the layer holds
//! the decoded [`Object3d`] record and emits a [`DrawCommand::Mesh`]
//! under its heading/pitch/roll/scale/translate transform. While editing
//! is on, mouse input drives a small drag state machine over screen-space
//! handles.

use std::any::Any;
use std::sync::Arc;

use nalgebra::{Matrix4, Vector3};

use crate::color::Color;
use crate::layer::{set_field, Layer, LayerCommon, LayerKind};
use crate::math::{format_vector, parse_vector, rotation_yaw_pitch_roll, Transform};
use crate::render::{DrawCommand, RenderContext};
use crate::xml::XmlElement;

pub const OBJECT3D_PARAM_NAMES: [&str; 14] = [
    "Heading",
    "Pitch",
    "Roll",
    "Scale.X",
    "Scale.Y",
    "Scale.Z",
    "Translate.X",
    "Translate.Y",
    "Translate.Z",
    "Color.Red",
    "Color.Green",
    "Color.Blue",
    "Color.Alpha",
    "Opacity",
];

/// Pixels within which a press grabs a handle.
pub const HANDLE_HIT_RADIUS: f64 = 10.0;

const DEGREES_PER_PIXEL: f64 = 0.5;
const TRANSLATE_PER_PIXEL: f64 = 0.01;
const SCALE_PER_PIXEL: f64 = 0.01;
const MIN_SCALE: f64 = 1e-4;
const GIZMO_COLOR: Color = Color::argb(255, 255, 255, 0);

/// A decoded mesh, referenced by url so hosts can share GPU buffers.
#[derive(Clone, Debug, PartialEq)]
pub struct Object3d {
    pub name: String,
    pub url: String,
    pub bounding_radius: f64,
}

impl Object3d {
    pub fn new(name: &str, url: &str) -> Self {
        Self { name: name.to_string(), url: url.to_string(), bounding_radius: 1.0 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DragMode {
    #[default]
    None,
    TranslateX,
    TranslateY,
    TranslateZ,
    HeadingPitch,
    PitchRoll,
    RollHeading,
    Scale,
}

impl DragMode {
    const HANDLES: [DragMode; 7] = [
        DragMode::TranslateX,
        DragMode::TranslateY,
        DragMode::TranslateZ,
        DragMode::HeadingPitch,
        DragMode::PitchRoll,
        DragMode::RollHeading,
        DragMode::Scale,
    ];

    /// Handle position in gizmo units, before the object's rotation.
    fn handle_offset(&self) -> Vector3<f64> {
        let d = std::f64::consts::FRAC_1_SQRT_2;
        match self {
            DragMode::None | DragMode::Scale => Vector3::zeros(),
            DragMode::TranslateX => Vector3::x(),
            DragMode::TranslateY => Vector3::y(),
            DragMode::TranslateZ => Vector3::z(),
            DragMode::HeadingPitch => Vector3::new(d, 0.0, d),
            DragMode::PitchRoll => Vector3::new(0.0, d, d),
            DragMode::RollHeading => Vector3::new(d, d, 0.0),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Gizmo {
    editing: bool,
    drag: DragMode,
    last: (f64, f64),
}

pub struct Object3dLayer {
    common: LayerCommon,
    object: Option<Object3d>,
    heading: f64,
    pitch: f64,
    roll: f64,
    scale: Vector3<f64>,
    translate: Vector3<f64>,
    flip_v: bool,
    smooth: bool,
    two_sided: bool,
    light_id: u32,
    gizmo: Gizmo,
}

impl Object3dLayer {
    pub fn new(name: &str, reference_frame: &str) -> Self {
        Self {
            common: LayerCommon::new(name, reference_frame),
            object: None,
            heading: 0.0,
            pitch: 0.0,
            roll: 0.0,
            scale: Vector3::repeat(1.0),
            translate: Vector3::zeros(),
            flip_v: true,
            smooth: true,
            two_sided: false,
            light_id: 0,
            gizmo: Gizmo::default(),
        }
    }

    pub fn object(&self) -> Option<&Object3d> {
        self.object.as_ref()
    }

    pub fn set_object(&mut self, object: Option<Object3d>) -> bool {
        set_field(&mut self.common, &mut self.object, object)
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn set_heading(&mut self, degrees: f64) -> bool {
        set_field(&mut self.common, &mut self.heading, degrees)
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn set_pitch(&mut self, degrees: f64) -> bool {
        set_field(&mut self.common, &mut self.pitch, degrees)
    }

    pub fn roll(&self) -> f64 {
        self.roll
    }

    pub fn set_roll(&mut self, degrees: f64) -> bool {
        set_field(&mut self.common, &mut self.roll, degrees)
    }

    pub fn scale(&self) -> Vector3<f64> {
        self.scale
    }

    pub fn set_scale(&mut self, scale: Vector3<f64>) -> bool {
        set_field(&mut self.common, &mut self.scale, scale)
    }

    pub fn translate(&self) -> Vector3<f64> {
        self.translate
    }

    pub fn set_translate(&mut self, translate: Vector3<f64>) -> bool {
        set_field(&mut self.common, &mut self.translate, translate)
    }

    pub fn flip_v(&self) -> bool {
        self.flip_v
    }

    pub fn set_flip_v(&mut self, value: bool) -> bool {
        set_field(&mut self.common, &mut self.flip_v, value)
    }

    pub fn smooth(&self) -> bool {
        self.smooth
    }

    pub fn set_smooth(&mut self, value: bool) -> bool {
        set_field(&mut self.common, &mut self.smooth, value)
    }

    pub fn two_sided(&self) -> bool {
        self.two_sided
    }

    pub fn set_two_sided(&mut self, value: bool) -> bool {
        set_field(&mut self.common, &mut self.two_sided, value)
    }

    pub fn light_id(&self) -> u32 {
        self.light_id
    }

    pub fn set_light_id(&mut self, id: u32) -> bool {
        set_field(&mut self.common, &mut self.light_id, id)
    }

    fn rotation(&self) -> Matrix4<f64> {
        rotation_yaw_pitch_roll(self.heading.to_radians(), self.pitch.to_radians(), self.roll.to_radians())
    }

    /// Scale, then heading/pitch/roll, then translate.
    pub fn local_matrix(&self) -> Matrix4<f64> {
        Transform::identity()
            .scale_xyz(self.scale)
            .then(self.rotation())
            .translate(self.translate)
            .matrix()
    }

    // Editing

    pub fn editing(&self) -> bool {
        self.gizmo.editing
    }

    pub fn set_editing(&mut self, editing: bool) {
        self.gizmo.editing = editing;
        if !editing {
            self.gizmo.drag = DragMode::None;
        }
    }

    pub fn drag_mode(&self) -> DragMode {
        self.gizmo.drag
    }

    fn gizmo_size(&self) -> f64 {
        let radius = self.object.as_ref().map_or(1.0, |o| o.bounding_radius);
        radius * self.scale.amax()
    }

    fn handle_position(&self, mode: DragMode) -> Vector3<f64> {
        let offset = mode.handle_offset() * self.gizmo_size();
        let rotated = self.rotation().transform_vector(&offset);
        rotated + self.translate
    }

    /// Nearest handle within [`HANDLE_HIT_RADIUS`] of a screen point.
    pub fn hit_test(&self, ctx: &RenderContext, x: f64, y: f64) -> DragMode {
        DragMode::HANDLES
            .iter()
            .filter_map(|mode| {
                let (sx, sy) = ctx.project_to_screen(&self.handle_position(*mode))?;
                let d = ((sx - x).powi(2) + (sy - y).powi(2)).sqrt();
                (d <= HANDLE_HIT_RADIUS).then_some((*mode, d))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map_or(DragMode::None, |(mode, _)| mode)
    }

    /// Starts a drag when the press lands on a handle.
    pub fn mouse_down(&mut self, ctx: &RenderContext, x: f64, y: f64) -> bool {
        if !self.gizmo.editing {
            return false;
        }
        let mode = self.hit_test(ctx, x, y);
        self.gizmo.drag = mode;
        self.gizmo.last = (x, y);
        mode != DragMode::None
    }

    pub fn mouse_move(&mut self, x: f64, y: f64) -> bool {
        if self.gizmo.drag == DragMode::None {
            return false;
        }
        let (dx, dy) = (x - self.gizmo.last.0, y - self.gizmo.last.1);
        self.gizmo.last = (x, y);
        let step = TRANSLATE_PER_PIXEL * self.gizmo_size();
        match self.gizmo.drag {
            DragMode::None => {}
            DragMode::TranslateX => {
                self.set_translate(self.translate + Vector3::x() * dx * step);
            }
            DragMode::TranslateY => {
                self.set_translate(self.translate - Vector3::y() * dy * step);
            }
            DragMode::TranslateZ => {
                self.set_translate(self.translate + Vector3::z() * dx * step);
            }
            DragMode::HeadingPitch => {
                self.set_heading(self.heading + dx * DEGREES_PER_PIXEL);
                self.set_pitch(self.pitch + dy * DEGREES_PER_PIXEL);
            }
            DragMode::PitchRoll => {
                self.set_pitch(self.pitch + dy * DEGREES_PER_PIXEL);
                self.set_roll(self.roll + dx * DEGREES_PER_PIXEL);
            }
            DragMode::RollHeading => {
                self.set_roll(self.roll + dy * DEGREES_PER_PIXEL);
                self.set_heading(self.heading + dx * DEGREES_PER_PIXEL);
            }
            DragMode::Scale => {
                let factor = (1.0 - dy * SCALE_PER_PIXEL).max(MIN_SCALE);
                self.set_scale((self.scale * factor).map(|s| s.max(MIN_SCALE)));
            }
        }
        true
    }

    pub fn mouse_up(&mut self) -> bool {
        let was_dragging = self.gizmo.drag != DragMode::None;
        self.gizmo.drag = DragMode::None;
        was_dragging
    }

    fn push_gizmo(&self, ctx: &mut RenderContext, opacity: f64) {
        let origin = self.handle_position(DragMode::Scale).cast::<f32>();
        let strips: Vec<Vec<Vector3<f32>>> = [DragMode::TranslateX, DragMode::TranslateY, DragMode::TranslateZ]
            .iter()
            .map(|m| vec![origin, self.handle_position(*m).cast::<f32>()])
            .collect();
        ctx.push(DrawCommand::Lines {
            layer: self.common.id().clone(),
            strips: Arc::from(strips),
            color: GIZMO_COLOR,
            width: 1.0,
            opacity,
            world: ctx.world,
        });
    }
}

impl Layer for Object3dLayer {
    fn common(&self) -> &LayerCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut LayerCommon {
        &mut self.common
    }

    fn kind(&self) -> LayerKind {
        LayerKind::Object3d
    }

    fn draw(&mut self, ctx: &mut RenderContext, opacity: f64, _flat: bool) -> bool {
        let Some(object) = &self.object else {
            return false;
        };
        let opacity = opacity * self.common.opacity();
        ctx.push(DrawCommand::Mesh {
            layer: self.common.id().clone(),
            mesh: object.url.clone(),
            color: self.common.color(),
            two_sided: self.two_sided,
            smooth: self.smooth,
            opacity,
            world: ctx.world * self.local_matrix(),
        });
        if self.gizmo.editing {
            self.push_gizmo(ctx, opacity);
        }
        true
    }

    fn clean_up(&mut self) {
        self.gizmo.drag = DragMode::None;
    }

    fn get_params(&self) -> Vec<f64> {
        let mut params = vec![self.heading, self.pitch, self.roll];
        params.extend(self.scale.iter());
        params.extend(self.translate.iter());
        params.extend(self.common.base_params());
        params
    }

    fn set_params(&mut self, params: &[f64]) {
        if params.len() < OBJECT3D_PARAM_NAMES.len() {
            return;
        }
        self.set_heading(params[0]);
        self.set_pitch(params[1]);
        self.set_roll(params[2]);
        self.set_scale(Vector3::new(params[3], params[4], params[5]));
        self.set_translate(Vector3::new(params[6], params[7], params[8]));
        self.common.set_base_params(&params[9..]);
    }

    fn get_param_names(&self) -> Vec<&'static str> {
        OBJECT3D_PARAM_NAMES.to_vec()
    }

    fn write_layer_properties(&self, el: &mut XmlElement) {
        el.set_attr("Heading", self.heading);
        el.set_attr("Pitch", self.pitch);
        el.set_attr("Roll", self.roll);
        el.set_attr("Scale", format_vector(&self.scale));
        el.set_attr("Translate", format_vector(&self.translate));
        el.set_attr("FlipV", self.flip_v);
        el.set_attr("Smooth", self.smooth);
        el.set_attr("TwoSidedGeometry", self.two_sided);
        el.set_attr("LightID", self.light_id);
        if let Some(object) = &self.object {
            el.push_child(
                XmlElement::new("Object3d")
                    .with_attr("Name", &object.name)
                    .with_attr("Url", &object.url)
                    .with_attr("BoundingRadius", object.bounding_radius),
            );
        }
    }

    fn initialize_from_xml(&mut self, el: &XmlElement) {
        self.set_heading(el.attr_f64("Heading", 0.0));
        self.set_pitch(el.attr_f64("Pitch", 0.0));
        self.set_roll(el.attr_f64("Roll", 0.0));
        if let Some(scale) = el.attr("Scale") {
            self.set_scale(parse_vector(scale));
        }
        if let Some(translate) = el.attr("Translate") {
            self.set_translate(parse_vector(translate));
        }
        self.set_flip_v(el.attr_bool("FlipV", true));
        self.set_smooth(el.attr_bool("Smooth", true));
        self.set_two_sided(el.attr_bool("TwoSidedGeometry", false));
        self.set_light_id(el.attr("LightID").and_then(|v| v.trim().parse().ok()).unwrap_or(0));
        let object = el.child("Object3d").map(|o| Object3d {
            name: o.attr_string("Name"),
            url: o.attr_string("Url"),
            bounding_radius: o.attr_f64("BoundingRadius", 1.0),
        });
        self.set_object(object);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model() -> Object3dLayer {
        let mut l = Object3dLayer::new("iss", "ISS");
        l.set_object(Some(Object3d::new("iss", "http://example.org/iss.3ds")));
        l
    }

    fn screen() -> RenderContext {
        let mut ctx = RenderContext::new(0.0);
        ctx.viewport = (200.0, 200.0);
        ctx.world = Matrix4::new_scaling(0.5);
        ctx
    }

    #[test]
    fn test_mesh_command_carries_local_transform() {
        let mut l = model();
        l.set_translate(Vector3::new(1.0, 0.0, 0.0));
        l.set_two_sided(true);
        let mut ctx = RenderContext::new(0.0);
        assert!(l.draw(&mut ctx, 0.5, false));
        match &ctx.display_list[0] {
            DrawCommand::Mesh { world, two_sided, opacity, .. } => {
                assert!(*two_sided);
                assert_relative_eq!(*opacity, 0.5);
                assert_relative_eq!(world[(0, 3)], 1.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_no_mesh_draws_nothing() {
        let mut l = Object3dLayer::new("empty", "Sky");
        let mut ctx = RenderContext::new(0.0);
        assert!(!l.draw(&mut ctx, 1.0, false));
        assert!(ctx.display_list.is_empty());
    }

    #[test]
    fn test_local_matrix_order() {
        let mut l = model();
        l.set_scale(Vector3::repeat(2.0));
        l.set_heading(90.0);
        l.set_translate(Vector3::new(0.0, 5.0, 0.0));
        let p = crate::math::transform_point(&l.local_matrix(), &Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Vector3::new(0.0, 5.0, -2.0), epsilon = 1e-12);
    }

    #[test]
    fn test_drag_translate_x() {
        let mut l = model();
        let ctx = screen();
        assert!(!l.mouse_down(&ctx, 150.0, 100.0));
        l.set_editing(true);

        // X handle at world (0.5, 0, 0) projects to (150, 100).
        assert!(l.mouse_down(&ctx, 153.0, 104.0));
        assert_eq!(l.drag_mode(), DragMode::TranslateX);
        let v = l.version();
        assert!(l.mouse_move(163.0, 104.0));
        assert_relative_eq!(l.translate().x, 0.1, epsilon = 1e-12);
        assert!(l.version() > v);
        assert!(l.mouse_up());
        assert_eq!(l.drag_mode(), DragMode::None);
        assert!(!l.mouse_move(200.0, 100.0));
    }

    #[test]
    fn test_press_away_from_handles_is_ignored() {
        let mut l = model();
        l.set_editing(true);
        let ctx = screen();
        assert!(!l.mouse_down(&ctx, 10.0, 10.0));
        assert!(!l.mouse_up());
    }

    #[test]
    fn test_scale_handle_is_uniform() {
        let mut l = model();
        l.set_editing(true);
        // Tilted so no axis handle projects onto the center.
        let mut ctx = screen();
        ctx.world = Matrix4::new_scaling(0.5) * crate::math::rotation_x(0.5) * crate::math::rotation_y(0.5);
        assert!(l.mouse_down(&ctx, 100.0, 100.0));
        assert_eq!(l.drag_mode(), DragMode::Scale);
        l.mouse_move(100.0, 50.0);
        assert_relative_eq!(l.scale(), Vector3::repeat(1.5), epsilon = 1e-12);
    }

    #[test]
    fn test_fourteen_params() {
        let mut l = model();
        let params = vec![10.0, 20.0, 30.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 0.0, 1.0, 0.0, 1.0, 0.5];
        l.set_params(&params);
        assert_eq!(l.get_params(), params);
        assert_eq!(l.get_param_names().len(), 14);
    }

    #[test]
    fn test_properties_round_trip() {
        let mut l = model();
        l.set_heading(45.0);
        l.set_scale(Vector3::new(1.0, 2.0, 3.0));
        l.set_flip_v(false);
        l.set_light_id(2);
        let mut el = XmlElement::new("Layer");
        l.write_layer_properties(&mut el);

        let mut back = Object3dLayer::new("iss", "ISS");
        back.initialize_from_xml(&el);
        assert_eq!(back.heading(), 45.0);
        assert_eq!(back.scale(), Vector3::new(1.0, 2.0, 3.0));
        assert!(!back.flip_v());
        assert_eq!(back.light_id(), 2);
        assert_eq!(back.object(), l.object());
    }
}
