//! Per-frame render state and the display list handed to the host.
//!
//! The engine core never touches the GPU. Layers append [`DrawCommand`]s
//! to [`RenderContext::display_list`] in draw order and the host renderer
//! replays them. Geometry is shared through `Arc` so cached tessellations
//! are not copied per frame.

use std::collections::HashMap;
use std::sync::Arc;

use nalgebra::{Matrix4, Point3, Vector3, Vector4};

use crate::celestial::CelestialBody;
use crate::color::Color;
use crate::layer::LayerId;
use crate::settings::EngineSettings;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointVertex {
    pub position: Vector3<f32>,
    pub size: f32,
    pub color: Color,
}

pub type Polyline = Vec<Vector3<f32>>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PlotType {
    #[default]
    Gaussian,
    Point,
    Circle,
    Square,
    PushPin,
    Target,
}

impl PlotType {
    pub const ALL: [PlotType; 6] = [
        PlotType::Gaussian,
        PlotType::Point,
        PlotType::Circle,
        PlotType::Square,
        PlotType::PushPin,
        PlotType::Target,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PlotType::Gaussian => "Gaussian",
            PlotType::Point => "Point",
            PlotType::Circle => "Circle",
            PlotType::Square => "Square",
            PlotType::PushPin => "PushPin",
            PlotType::Target => "Target",
        }
    }

    pub fn from_label(text: &str) -> Option<PlotType> {
        Self::ALL.iter().copied().find(|p| p.label() == text.trim())
    }
}

/// Whether point sizes are pixels or world units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MarkerScale {
    #[default]
    Screen,
    World,
}

impl MarkerScale {
    pub fn label(&self) -> &'static str {
        match self {
            MarkerScale::Screen => "Screen",
            MarkerScale::World => "World",
        }
    }

    pub fn from_label(text: &str) -> Option<MarkerScale> {
        match text.trim() {
            "Screen" => Some(MarkerScale::Screen),
            "World" => Some(MarkerScale::World),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PointStyle {
    pub plot_type: PlotType,
    pub marker_scale: MarkerScale,
}

#[derive(Clone, Debug)]
pub enum DrawCommand {
    ImageSet {
        layer: LayerId,
        name: String,
        url: String,
        opacity: f64,
        world: Matrix4<f64>,
    },
    Points {
        layer: LayerId,
        points: Arc<[PointVertex]>,
        style: PointStyle,
        opacity: f64,
        world: Matrix4<f64>,
    },
    Lines {
        layer: LayerId,
        strips: Arc<[Polyline]>,
        color: Color,
        width: f32,
        opacity: f64,
        world: Matrix4<f64>,
    },
    Mesh {
        layer: LayerId,
        mesh: String,
        color: Color,
        two_sided: bool,
        smooth: bool,
        opacity: f64,
        world: Matrix4<f64>,
    },
    Orbit {
        frame: String,
        points: Arc<[Vector3<f32>]>,
        color: Color,
        opacity: f64,
        world: Matrix4<f64>,
    },
    Grid {
        layer: LayerId,
        strips: Arc<[Polyline]>,
        color: Color,
        opacity: f64,
        world: Matrix4<f64>,
    },
}

impl DrawCommand {
    pub fn opacity(&self) -> f64 {
        match self {
            DrawCommand::ImageSet { opacity, .. }
            | DrawCommand::Points { opacity, .. }
            | DrawCommand::Lines { opacity, .. }
            | DrawCommand::Mesh { opacity, .. }
            | DrawCommand::Orbit { opacity, .. }
            | DrawCommand::Grid { opacity, .. } => *opacity,
        }
    }

    pub fn layer_id(&self) -> Option<&LayerId> {
        match self {
            DrawCommand::ImageSet { layer, .. }
            | DrawCommand::Points { layer, .. }
            | DrawCommand::Lines { layer, .. }
            | DrawCommand::Mesh { layer, .. }
            | DrawCommand::Grid { layer, .. } => Some(layer),
            DrawCommand::Orbit { .. } => None,
        }
    }

    pub fn world(&self) -> &Matrix4<f64> {
        match self {
            DrawCommand::ImageSet { world, .. }
            | DrawCommand::Points { world, .. }
            | DrawCommand::Lines { world, .. }
            | DrawCommand::Mesh { world, .. }
            | DrawCommand::Orbit { world, .. }
            | DrawCommand::Grid { world, .. } => world,
        }
    }

    pub fn is_image_set(&self) -> bool {
        matches!(self, DrawCommand::ImageSet { .. })
    }
}

/// Where the host placed a built-in body this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyPlacement {
    pub world: Matrix4<f64>,
    pub world_base: Matrix4<f64>,
    pub world_base_non_rotating: Matrix4<f64>,
    pub nominal_radius: f64,
}

#[derive(Clone, Copy, Debug)]
struct SavedState {
    world: Matrix4<f64>,
    world_base: Matrix4<f64>,
    world_base_non_rotating: Matrix4<f64>,
    nominal_radius: f64,
}

#[derive(Clone, Debug)]
pub struct RenderContext {
    pub jd_now: f64,
    pub world: Matrix4<f64>,
    pub world_base: Matrix4<f64>,
    pub world_base_non_rotating: Matrix4<f64>,
    pub nominal_radius: f64,
    pub view_projection: Matrix4<f64>,
    pub viewport: (f64, f64),
    pub settings: EngineSettings,
    pub body_placements: HashMap<String, BodyPlacement>,
    pub display_list: Vec<DrawCommand>,
    stack: Vec<SavedState>,
}

impl RenderContext {
    pub fn new(jd_now: f64) -> Self {
        Self {
            jd_now,
            world: Matrix4::identity(),
            world_base: Matrix4::identity(),
            world_base_non_rotating: Matrix4::identity(),
            nominal_radius: CelestialBody::Earth.radius_m(),
            view_projection: Matrix4::identity(),
            viewport: (1.0, 1.0),
            settings: EngineSettings::default(),
            body_placements: HashMap::new(),
            display_list: Vec::new(),
            stack: Vec::new(),
        }
    }

    pub fn save_state(&mut self) {
        self.stack.push(SavedState {
            world: self.world,
            world_base: self.world_base,
            world_base_non_rotating: self.world_base_non_rotating,
            nominal_radius: self.nominal_radius,
        });
    }

    pub fn restore_state(&mut self) {
        if let Some(s) = self.stack.pop() {
            self.world = s.world;
            self.world_base = s.world_base;
            self.world_base_non_rotating = s.world_base_non_rotating;
            self.nominal_radius = s.nominal_radius;
        }
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn apply_placement(&mut self, placement: &BodyPlacement) {
        self.world = placement.world;
        self.world_base = placement.world_base;
        self.world_base_non_rotating = placement.world_base_non_rotating;
        self.nominal_radius = placement.nominal_radius;
    }

    pub fn push(&mut self, command: DrawCommand) {
        self.display_list.push(command);
    }

    pub fn take_display_list(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.display_list)
    }

    /// Projects a point in the current world space to pixel coordinates.
    /// `None` when the point is behind the camera.
    pub fn project_to_screen(&self, point: &Vector3<f64>) -> Option<(f64, f64)> {
        let world = self.world.transform_point(&Point3::from(*point));
        let clip = self.view_projection * Vector4::new(world.x, world.y, world.z, 1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let (nx, ny) = (clip.x / clip.w, clip.y / clip.w);
        let (width, height) = self.viewport;
        Some(((nx + 1.0) * 0.5 * width, (1.0 - ny) * 0.5 * height))
    }
}
