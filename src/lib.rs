//! Layer and reference-frame core for a sky and planet viewer.
//!
//! The host owns a [`LayerManager`], calls [`LayerManager::poll_fetches`]
//! once per tick, then walks the frames it wants drawn with
//! [`LayerManager::draw`]. Layers append [`DrawCommand`]s to the
//! [`RenderContext`]'s display list; turning those into pixels is the
//! host's job.

pub mod celestial;
pub mod color;
pub mod fetch;
pub mod great_circle_route_layer;
pub mod grid_layer;
pub mod imageset_layer;
pub mod layer;
pub mod layer_manager;
pub mod layer_map;
pub mod math;
pub mod moons;
pub mod object3d_layer;
pub mod orbit;
pub mod orbit_layer;
pub mod orbit_solver;
pub mod persistence;
pub mod reference_frame;
pub mod render;
pub mod settings;
pub mod table_layer;
pub mod time;
pub mod tle;
pub mod units;
pub mod xml;

pub use fetch::{FetchError, FetchState, Fetcher, MemoryFetcher};
pub use layer::{FadeType, Layer, LayerCommon, LayerId, LayerKind};
pub use layer_manager::{LayerInfo, LayerManager, LayerSet, MoveTo, TourOverride};
pub use layer_map::LayerMap;
pub use reference_frame::{Reference, ReferenceFrame, ReferenceFrameType};
pub use render::{BodyPlacement, DrawCommand, RenderContext};
pub use settings::EngineSettings;
pub use xml::XmlError;

/// Commit the library was built from; written into saved containers.
pub const BUILD_GIT_HASH: &str = env!("GIT_HASH");
