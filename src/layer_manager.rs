//! The frame tree, the layer registry and the per-frame traversal.
//!
//! A [`LayerManager`] is an explicit context object owned by the host's
//! render loop. It keeps two [`LayerSet`]s, the live one and the one a
//! tour loads into; `tour_layers` selects which of them edits and draws
//! go to. Unknown frame names and disabled frames are never errors:
//! frames arrive asynchronously, so lookups that miss are no-ops.
//!
//! Downloads (minor moons, the ISS elements) complete on other threads
//! and only send into a channel. [`LayerManager::poll_fetches`] applies
//! them between ticks so the tree never changes under a traversal.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use nalgebra::Matrix4;

use crate::celestial::CelestialBody;
use crate::fetch::{FetchError, FetchState, Fetcher};
use crate::great_circle_route_layer::GreatCircleRouteLayer;
use crate::grid_layer::GridLayer;
use crate::imageset_layer::{ImageSet, ImageSetLayer};
use crate::layer::{Layer, LayerId, LayerKind};
use crate::layer_map::LayerMap;
use crate::moons::parse_moon_file;
use crate::object3d_layer::{Object3d, Object3dLayer};
use crate::orbit_layer::OrbitLayer;
use crate::persistence::{read_container, write_container};
use crate::reference_frame::{Reference, ReferenceFrame, ReferenceFrameType};
use crate::render::RenderContext;
use crate::settings::EngineSettings;
use crate::table_layer::{SpreadSheetLayer, VoTable, VoTableLayer};
use crate::time::{two_line_date_to_julian, SimClock};
use crate::tle::parse_tle_blocks;
use crate::units::AltUnit;
use crate::xml::XmlError;

pub const SKY_FRAME: &str = "Sky";
pub const ISS_FRAME: &str = "ISS";

/// Elements the ISS frame starts from until a live TLE arrives.
fn iss_frame() -> ReferenceFrame {
    let mut frame = ReferenceFrame::new(ISS_FRAME, Reference::Custom);
    frame.parent = CelestialBody::Earth.label().to_string();
    frame.reference_frame_type = ReferenceFrameType::Orbital;
    frame.epoch = two_line_date_to_julian("10184.51609218");
    frame.semi_major_axis = 6728829.41;
    frame.semi_major_axis_units = AltUnit::Meters;
    frame.inclination = 51.6442;
    frame.longitude_of_ascending_node = 147.0262;
    frame.eccentricity = 0.0009909;
    frame.mean_anomaly_at_epoch = 325.5563;
    frame.mean_daily_motion = 360.0 * 15.72172655;
    frame.argument_of_periapsis = 286.4623;
    frame.scale = 1.0;
    frame.mean_radius = 130.0;
    frame.oblateness = 0.0;
    frame.show_orbit_path = true;
    frame.system_generated = true;
    frame
}

struct LayerEntry {
    kind: LayerKind,
    layer: Box<dyn Layer>,
}

fn layer_ref(entry: &LayerEntry) -> &dyn Layer {
    entry.layer.as_ref()
}

/// One complete tree: root frame names, every map by name, and every
/// layer by id.
#[derive(Default)]
pub struct LayerSet {
    roots: Vec<String>,
    all_maps: HashMap<String, LayerMap>,
    layer_list: HashMap<LayerId, LayerEntry>,
}

impl LayerSet {
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn map(&self, name: &str) -> Option<&LayerMap> {
        self.all_maps.get(name)
    }

    pub fn map_count(&self) -> usize {
        self.all_maps.len()
    }

    pub fn layer_count(&self) -> usize {
        self.layer_list.len()
    }

    pub fn contains_layer(&self, id: &LayerId) -> bool {
        self.layer_list.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.all_maps.is_empty() && self.layer_list.is_empty()
    }

    /// Frame names below and including `name`, parents before children.
    pub fn preorder_from(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![name.to_string()];
        let mut seen = HashSet::new();
        while let Some(name) = stack.pop() {
            let Some(map) = self.all_maps.get(&name) else { continue };
            if !seen.insert(name.clone()) {
                continue;
            }
            stack.extend(map.child_maps.iter().rev().cloned());
            out.push(name);
        }
        out
    }

    pub fn frame_names(&self) -> Vec<String> {
        self.roots.iter().flat_map(|r| self.preorder_from(r)).collect()
    }

    /// Every map reachable from exactly one root, every back-reference
    /// matching its parent's child list, and every layer registered on an
    /// existing frame.
    pub fn is_consistent(&self) -> bool {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();
        for root in &self.roots {
            match self.all_maps.get(root) {
                Some(m) if m.parent.is_none() => stack.push(root),
                _ => return false,
            }
        }
        while let Some(name) = stack.pop() {
            if !seen.insert(name) {
                return false;
            }
            let Some(map) = self.all_maps.get(name) else { return false };
            for child in &map.child_maps {
                match self.all_maps.get(child) {
                    Some(c) if c.parent.as_deref() == Some(name) => stack.push(child),
                    _ => return false,
                }
            }
        }
        if seen.len() != self.all_maps.len() {
            return false;
        }
        let layers_on_frames = self.layer_list.iter().all(|(id, entry)| {
            self.all_maps
                .get(entry.layer.common().reference_frame())
                .is_some_and(|m| m.layers.contains(id))
        });
        let frames_list_known_layers = self
            .all_maps
            .values()
            .all(|m| m.layers.iter().all(|id| self.layer_list.contains_key(id)));
        layers_on_frames && frames_list_known_layers
    }

    /// Links `map` under the frame its `frame.parent` names, or adds it as
    /// a root when that is empty. Fails on a duplicate name or a parent
    /// that does not exist yet.
    fn insert_map(&mut self, mut map: LayerMap) -> bool {
        let name = map.name().to_string();
        if name.is_empty() || self.all_maps.contains_key(&name) {
            return false;
        }
        let parent = map.frame.parent.clone();
        if parent.is_empty() {
            map.parent = None;
            self.roots.push(name.clone());
        } else {
            let Some(p) = self.all_maps.get_mut(&parent) else { return false };
            p.add_child(&name);
            map.parent = Some(parent);
        }
        self.all_maps.insert(name, map);
        true
    }

    fn register(&mut self, layer: Box<dyn Layer>) -> Result<LayerId, Box<dyn Layer>> {
        let id = layer.id().clone();
        if self.layer_list.contains_key(&id) {
            return Err(layer);
        }
        let Some(map) = self.all_maps.get_mut(layer.common().reference_frame()) else {
            return Err(layer);
        };
        map.layers.push(id.clone());
        self.layer_list.insert(id.clone(), LayerEntry { kind: layer.kind(), layer });
        Ok(id)
    }

    fn remove_layer(&mut self, id: &LayerId, remove_from_parent: bool) -> bool {
        let Some(mut entry) = self.layer_list.remove(id) else { return false };
        entry.layer.clean_up();
        if remove_from_parent {
            if let Some(map) = self.all_maps.get_mut(entry.layer.common().reference_frame()) {
                map.layers.retain(|l| l != id);
            }
        }
        true
    }

    fn clear(&mut self) {
        for entry in self.layer_list.values_mut() {
            entry.layer.clean_up();
        }
        self.layer_list.clear();
        self.all_maps.clear();
        self.roots.clear();
    }

    /// Attaches every map to the frame its `frame.parent` names. Parentless
    /// maps become roots. Returns the maps whose parent is missing.
    fn connect_all_children(&mut self) -> Vec<String> {
        let mut names: Vec<String> = self.all_maps.keys().cloned().collect();
        names.sort();
        let mut orphans = Vec::new();
        for name in names {
            let Some(parent) = self.all_maps.get(&name).map(|m| m.frame.parent.clone()) else { continue };
            if parent.is_empty() {
                if !self.roots.contains(&name) {
                    self.roots.push(name);
                }
                continue;
            }
            match self.all_maps.get_mut(&parent) {
                Some(p) => p.add_child(&name),
                None => {
                    orphans.push(name);
                    continue;
                }
            }
            if let Some(m) = self.all_maps.get_mut(&name) {
                m.parent = Some(parent);
            }
        }
        orphans
    }

    /// [`Self::connect_all_children`], then drops each orphan together with
    /// its layers and every map hanging off it.
    fn connect_and_prune(&mut self) -> Vec<String> {
        let orphans = self.connect_all_children();
        for name in &orphans {
            log::warn!("Frame {} has no parent in the tree; dropped", name);
        }
        if !orphans.is_empty() {
            self.rebuild_all_maps();
        }
        orphans
    }

    /// Re-derives parent links by walking from the roots. Maps no root
    /// reaches are dropped along with their layers. Returns how many maps
    /// were dropped.
    fn rebuild_all_maps(&mut self) -> usize {
        let mut claimed: HashSet<String> = HashSet::new();
        let roots: Vec<String> = std::mem::take(&mut self.roots)
            .into_iter()
            .filter(|r| self.all_maps.contains_key(r) && claimed.insert(r.clone()))
            .collect();
        self.roots = roots;

        let mut stack: Vec<(String, Option<String>)> = self.roots.iter().rev().map(|r| (r.clone(), None)).collect();
        while let Some((name, parent)) = stack.pop() {
            let children = self.all_maps.get(&name).map(|m| m.child_maps.clone()).unwrap_or_default();
            let kept: Vec<String> = children
                .into_iter()
                .filter(|c| self.all_maps.contains_key(c) && claimed.insert(c.clone()))
                .collect();
            stack.extend(kept.iter().rev().map(|c| (c.clone(), Some(name.clone()))));
            if let Some(map) = self.all_maps.get_mut(&name) {
                map.parent = parent;
                map.child_maps = kept;
            }
        }

        let dropped: Vec<String> = self.all_maps.keys().filter(|k| !claimed.contains(*k)).cloned().collect();
        for name in &dropped {
            if let Some(map) = self.all_maps.remove(name) {
                log::debug!("Frame {} is unreachable; dropping it with {} layers", name, map.layers.len());
                for id in &map.layers {
                    self.remove_layer(id, false);
                }
            }
        }
        dropped.len()
    }

    fn purge_deep(&mut self, name: &str, top_level: bool) {
        let Some(map) = self.all_maps.get_mut(name) else { return };
        let layers = std::mem::take(&mut map.layers);
        let children = std::mem::take(&mut map.child_maps);
        for id in &layers {
            self.remove_layer(id, false);
        }
        for child in &children {
            self.purge_deep(child, false);
            self.all_maps.remove(child);
        }
        if top_level {
            match self.all_maps.get(name).and_then(|m| m.parent.clone()) {
                Some(parent) => {
                    if let Some(p) = self.all_maps.get_mut(&parent) {
                        p.remove_child(name);
                    }
                }
                None => self.roots.retain(|r| r != name),
            }
            self.rebuild_all_maps();
        }
    }
}

/// Opacity and params of one layer at both ends of a tour transition.
/// `front_*` holds the values at the current tween position.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerInfo {
    pub id: LayerId,
    pub start_opacity: f64,
    pub end_opacity: f64,
    pub front_opacity: f64,
    pub start_params: Vec<f64>,
    pub end_params: Vec<f64>,
    pub front_params: Vec<f64>,
}

impl LayerInfo {
    pub fn snapshot(layer: &dyn Layer) -> Self {
        let opacity = layer.common().opacity();
        let params = layer.get_params();
        Self {
            id: layer.id().clone(),
            start_opacity: opacity,
            end_opacity: opacity,
            front_opacity: opacity,
            start_params: params.clone(),
            end_params: params.clone(),
            front_params: params,
        }
    }

    /// Linear blend: 0 gives the start values, 1 the end values.
    pub fn interpolate(&mut self, tween: f64) {
        self.front_opacity = self.start_opacity + (self.end_opacity - self.start_opacity) * tween;
        self.front_params = self
            .start_params
            .iter()
            .zip(&self.end_params)
            .map(|(s, e)| s + (e - s) * tween)
            .collect();
    }
}

/// The playing tour stop's layer snapshot. While set, it wins over
/// whatever the layers were set to by hand.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TourOverride {
    pub tween: f64,
    pub layers: Vec<LayerInfo>,
}

/// Position changes within a frame's layer list. `Top` is index 0, which
/// draws first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveTo {
    Up,
    Down,
    Top,
    Bottom,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FetchTarget {
    MoonFile,
    IssTle,
}

type FetchOutcome = (FetchTarget, Result<String, FetchError>);

#[cfg(not(target_arch = "wasm32"))]
fn default_fetcher(settings: &EngineSettings) -> Arc<dyn Fetcher> {
    use crate::fetch::{ProxyFallbackFetcher, ThreadFetcher};
    Arc::new(ProxyFallbackFetcher::new(
        ThreadFetcher::new(settings.fetch_timeout_secs),
        &settings.cors_proxy_url,
    ))
}

#[cfg(target_arch = "wasm32")]
fn default_fetcher(_settings: &EngineSettings) -> Arc<dyn Fetcher> {
    Arc::new(crate::fetch::NullFetcher)
}

pub struct LayerManager {
    live: LayerSet,
    tour: LayerSet,
    tour_layers: bool,
    version: u64,
    settings: EngineSettings,
    fetcher: Arc<dyn Fetcher>,
    fetch_tx: Sender<FetchOutcome>,
    fetch_rx: Receiver<FetchOutcome>,
    moon_file: Option<String>,
    moon_state: FetchState,
    iss_tle: Option<(String, String)>,
    iss_state: FetchState,
    tour_override: Option<TourOverride>,
    on_tree_changed: Option<Box<dyn FnMut(u64)>>,
}

impl LayerManager {
    pub fn new(settings: EngineSettings) -> Self {
        let fetcher = default_fetcher(&settings);
        Self::with_fetcher(settings, fetcher)
    }

    pub fn with_fetcher(settings: EngineSettings, fetcher: Arc<dyn Fetcher>) -> Self {
        let (fetch_tx, fetch_rx) = mpsc::channel();
        Self {
            live: LayerSet::default(),
            tour: LayerSet::default(),
            tour_layers: false,
            version: 0,
            settings,
            fetcher,
            fetch_tx,
            fetch_rx,
            moon_file: None,
            moon_state: FetchState::NotStarted,
            iss_tle: None,
            iss_state: FetchState::NotStarted,
            tour_override: None,
            on_tree_changed: None,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut EngineSettings {
        &mut self.settings
    }

    /// A fresh context for one frame, carrying a snapshot of the settings.
    pub fn render_context(&self, jd_now: f64) -> RenderContext {
        let mut ctx = RenderContext::new(jd_now);
        ctx.settings = self.settings.clone();
        ctx
    }

    pub fn render_context_for(&self, clock: &SimClock) -> RenderContext {
        self.render_context(clock.now_as_julian())
    }

    /// Called with the new version whenever the tree's shape changes.
    pub fn set_tree_changed_callback(&mut self, callback: impl FnMut(u64) + 'static) {
        self.on_tree_changed = Some(Box::new(callback));
    }

    fn notify_tree_changed(&mut self) {
        let version = self.version;
        if let Some(callback) = self.on_tree_changed.as_mut() {
            callback(version);
        }
    }

    fn structure_changed(&mut self) {
        self.version += 1;
        self.notify_tree_changed();
    }

    pub fn tour_layers(&self) -> bool {
        self.tour_layers
    }

    pub fn live(&self) -> &LayerSet {
        &self.live
    }

    pub fn tour(&self) -> &LayerSet {
        &self.tour
    }

    fn active(&self) -> &LayerSet {
        if self.tour_layers {
            &self.tour
        } else {
            &self.live
        }
    }

    fn active_mut(&mut self) -> &mut LayerSet {
        if self.tour_layers {
            &mut self.tour
        } else {
            &mut self.live
        }
    }

    pub fn moon_file_state(&self) -> &FetchState {
        &self.moon_state
    }

    pub fn iss_state(&self) -> &FetchState {
        &self.iss_state
    }

    /// Rebuilds the active tree as the solar-system skeleton plus the sky.
    /// The live tree also gets the ISS; minor moons follow once the moon
    /// file has arrived.
    pub fn init_layers(&mut self) {
        let with_iss = !self.tour_layers;
        let moon_file = self.moon_file.clone();
        let iss_tle = self.iss_tle.clone();
        let set = self.active_mut();
        set.clear();
        build_skeleton(set, with_iss);
        let moons = moon_file.map(|text| attach_moons(set, &text)).unwrap_or(0);
        if let (true, Some((line1, line2))) = (with_iss, iss_tle) {
            if let Some(map) = set.all_maps.get_mut(ISS_FRAME) {
                map.frame.from_tle(&line1, &line2, CelestialBody::Earth.gm_si());
            }
        }
        log::info!("Frame tree initialized with {} frames ({} minor moons)", set.map_count(), moons);
        self.structure_changed();

        if self.moon_file.is_none() {
            self.request(FetchTarget::MoonFile);
        }
        if with_iss && self.iss_tle.is_none() {
            self.request(FetchTarget::IssTle);
        }
    }

    fn request(&mut self, target: FetchTarget) {
        let (state, url) = match target {
            FetchTarget::MoonFile => (&mut self.moon_state, self.settings.moon_file_url.clone()),
            FetchTarget::IssTle => (&mut self.iss_state, self.settings.iss_tle_url.clone()),
        };
        if state.is_loading() || url.is_empty() {
            return;
        }
        *state = FetchState::Loading;
        let tx = self.fetch_tx.clone();
        self.fetcher.fetch_text(
            &url,
            Box::new(move |result| {
                let _ = tx.send((target, result));
            }),
        );
    }

    /// Applies finished downloads. Call between ticks, never from inside a
    /// traversal. Returns how many completions were handled.
    pub fn poll_fetches(&mut self) -> usize {
        let mut handled = 0;
        while let Ok((target, result)) = self.fetch_rx.try_recv() {
            handled += 1;
            match result {
                Ok(text) => match target {
                    FetchTarget::MoonFile => self.apply_moon_file(text),
                    FetchTarget::IssTle => self.apply_iss_tle(&text),
                },
                Err(e) => {
                    log::warn!("{:?} download failed: {}", target, e);
                    let state = match target {
                        FetchTarget::MoonFile => &mut self.moon_state,
                        FetchTarget::IssTle => &mut self.iss_state,
                    };
                    *state = FetchState::Failed(e.to_string());
                }
            }
        }
        handled
    }

    fn apply_moon_file(&mut self, text: String) {
        let mut attached = attach_moons(&mut self.live, &text);
        if !self.tour.all_maps.is_empty() {
            attached += attach_moons(&mut self.tour, &text);
        }
        log::info!("Moon file applied: {} frames attached", attached);
        self.moon_file = Some(text);
        self.moon_state = FetchState::Loaded;
        if attached > 0 {
            self.structure_changed();
        }
    }

    fn apply_iss_tle(&mut self, text: &str) {
        let Some(record) = parse_tle_blocks(text).into_iter().next() else {
            log::warn!("ISS elements download had no element lines");
            self.iss_state = FetchState::Failed("no element lines".to_string());
            return;
        };
        if let Some(map) = self.live.all_maps.get_mut(ISS_FRAME) {
            map.frame.from_tle(&record.line1, &record.line2, CelestialBody::Earth.gm_si());
        }
        self.iss_tle = Some((record.line1, record.line2));
        self.iss_state = FetchState::Loaded;
        self.version += 1;
    }

    /// Switching to tour mode builds a fresh tour tree; switching back
    /// throws the tour tree away.
    pub fn set_tour_layers(&mut self, value: bool) {
        if self.tour_layers == value {
            return;
        }
        if value {
            self.tour_layers = true;
            self.init_layers();
        } else {
            self.tour.clear();
            self.tour_layers = false;
            self.structure_changed();
        }
    }

    /// Registers `layer` on the frame it names. Does nothing when the frame
    /// is unknown or the id is already registered.
    pub fn add(&mut self, layer: Box<dyn Layer>, update_tree: bool) -> bool {
        match self.active_mut().register(layer) {
            Ok(id) => {
                log::debug!("Added layer {}", id);
                self.version += 1;
                if update_tree {
                    self.notify_tree_changed();
                }
                true
            }
            Err(layer) => {
                log::debug!(
                    "Layer {} not added: frame {:?} unknown or id taken",
                    layer.id(),
                    layer.common().reference_frame()
                );
                false
            }
        }
    }

    pub fn delete_layer_by_id(&mut self, id: &LayerId, remove_from_parent: bool, update_tree: bool) -> bool {
        if !self.active_mut().remove_layer(id, remove_from_parent) {
            return false;
        }
        self.version += 1;
        if update_tree {
            self.notify_tree_changed();
        }
        true
    }

    pub fn clear_layers(&mut self) {
        self.active_mut().clear();
        self.structure_changed();
    }

    pub fn layer(&self, id: &LayerId) -> Option<&dyn Layer> {
        self.active().layer_list.get(id).map(layer_ref)
    }

    pub fn layer_mut(&mut self, id: &LayerId) -> Option<&mut dyn Layer> {
        match self.active_mut().layer_list.get_mut(id) {
            Some(entry) => Some(entry.layer.as_mut()),
            None => None,
        }
    }

    pub fn layer_as<T: Layer>(&self, id: &LayerId) -> Option<&T> {
        self.layer(id)?.as_any().downcast_ref::<T>()
    }

    pub fn layer_as_mut<T: Layer>(&mut self, id: &LayerId) -> Option<&mut T> {
        self.active_mut().layer_list.get_mut(id)?.layer.as_any_mut().downcast_mut::<T>()
    }

    pub fn layer_map(&self, name: &str) -> Option<&LayerMap> {
        self.active().all_maps.get(name)
    }

    pub fn frame(&self, name: &str) -> Option<&ReferenceFrame> {
        self.layer_map(name).map(|m| &m.frame)
    }

    pub fn frame_mut(&mut self, name: &str) -> Option<&mut ReferenceFrame> {
        self.active_mut().all_maps.get_mut(name).map(|m| &mut m.frame)
    }

    /// Frame names of the active tree, parents before children.
    pub fn frame_names(&self) -> Vec<String> {
        self.active().frame_names()
    }

    pub fn layers_in(&self, frame: &str) -> Vec<LayerId> {
        self.layer_map(frame).map(|m| m.layers.clone()).unwrap_or_default()
    }

    pub fn set_frame_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let Some(map) = self.active_mut().all_maps.get_mut(name) else { return false };
        if map.enabled == enabled {
            return false;
        }
        map.enabled = enabled;
        self.structure_changed();
        true
    }

    /// Adds `frame` under `parent` (empty for a new root).
    pub fn add_reference_frame(&mut self, parent: &str, mut frame: ReferenceFrame) -> bool {
        frame.parent = parent.to_string();
        let name = frame.name.clone();
        if !self.active_mut().insert_map(LayerMap::new(frame)) {
            log::debug!("Frame {} not added under {:?}", name, parent);
            return false;
        }
        self.structure_changed();
        true
    }

    /// A frame that only groups layers; it adds no transform of its own.
    pub fn create_layer_group(&mut self, parent: &str, name: &str) -> bool {
        self.add_reference_frame(parent, ReferenceFrame::new(name, Reference::Identity))
    }

    /// Deletes a user frame with everything under it. Built-in frames
    /// stay.
    pub fn delete_frame(&mut self, name: &str) -> bool {
        match self.active().all_maps.get(name) {
            Some(map) if !map.frame.system_generated => {}
            _ => return false,
        }
        self.purge_layer_map_deep(name, true);
        true
    }

    /// Cleans up every layer in and below `name` and empties those maps.
    /// At the top level the map is also unlinked from its parent and
    /// dropped from the tree.
    pub fn purge_layer_map_deep(&mut self, name: &str, top_level: bool) {
        if !self.active().all_maps.contains_key(name) {
            return;
        }
        self.active_mut().purge_deep(name, top_level);
        self.structure_changed();
    }

    pub fn move_layer(&mut self, id: &LayerId, to: MoveTo) -> bool {
        let set = self.active_mut();
        let Some(frame) = set.layer_list.get(id).map(|e| e.layer.common().reference_frame().to_string()) else {
            return false;
        };
        let Some(map) = set.all_maps.get_mut(&frame) else { return false };
        let Some(index) = map.layers.iter().position(|l| l == id) else { return false };
        let last = map.layers.len() - 1;
        let target = match to {
            MoveTo::Up => index.saturating_sub(1),
            MoveTo::Down => (index + 1).min(last),
            MoveTo::Top => 0,
            MoveTo::Bottom => last,
        };
        if target == index {
            return false;
        }
        let moved = map.layers.remove(index);
        map.layers.insert(target, moved);
        self.structure_changed();
        true
    }

    /// Attaches maps to the parents their frames name. Maps whose parent
    /// is missing are dropped with their subtrees and layers, and returned.
    pub fn connect_all_children(&mut self) -> Vec<String> {
        let orphans = self.active_mut().connect_and_prune();
        if !orphans.is_empty() {
            self.structure_changed();
        }
        orphans
    }

    /// Re-derives the tree from its roots, dropping unreachable maps.
    pub fn rebuild_all_maps(&mut self) -> usize {
        let dropped = self.active_mut().rebuild_all_maps();
        if dropped > 0 {
            self.structure_changed();
        }
        dropped
    }

    pub fn is_consistent(&self) -> bool {
        self.live.is_consistent() && self.tour.is_consistent()
    }

    pub fn set_tour_override(&mut self, tour: Option<TourOverride>) {
        self.tour_override = tour;
    }

    /// Snapshot of every enabled layer. Layers present in `previous` keep
    /// its end values so a transition can run from now to there.
    pub fn get_visible_layer_list(&self, previous: &HashMap<LayerId, LayerInfo>) -> HashMap<LayerId, LayerInfo> {
        self.active()
            .layer_list
            .values()
            .filter(|e| e.layer.common().enabled())
            .map(|e| {
                let mut info = LayerInfo::snapshot(e.layer.as_ref());
                if let Some(prev) = previous.get(&info.id) {
                    info.end_opacity = prev.end_opacity;
                    info.end_params = prev.end_params.clone();
                }
                (info.id.clone(), info)
            })
            .collect()
    }

    /// Enables exactly the listed layers and applies their front values.
    /// The front opacity wins over an opacity carried in the params.
    pub fn set_visible_layer_list(&mut self, list: &HashMap<LayerId, LayerInfo>) {
        for (id, entry) in self.active_mut().layer_list.iter_mut() {
            let info = list.get(id);
            entry.layer.common_mut().set_enabled(info.is_some());
            if let Some(info) = info {
                entry.layer.set_params(&info.front_params);
                entry.layer.common_mut().set_opacity(info.front_opacity);
            }
        }
    }

    /// Folds the tour tree into the live one when playback ends. Frames the
    /// live tree lacks are copied over; a tour layer whose id is already
    /// live replaces the live one. Whether to overwrite is settled at the
    /// first collision and then applied to every later one.
    pub fn merge_tours_layers(&mut self) {
        self.tour_layers = false;
        let mut tour = std::mem::take(&mut self.tour);

        let mut names: Vec<String> = tour.all_maps.keys().cloned().collect();
        names.sort();
        for name in &names {
            if self.live.all_maps.contains_key(name) {
                continue;
            }
            if let Some(map) = tour.all_maps.get(name) {
                let mut copy = LayerMap::new(map.frame.clone());
                copy.enabled = map.enabled;
                copy.open = map.open;
                copy.loaded_from_tour = true;
                self.live.all_maps.insert(name.clone(), copy);
            }
        }
        self.live.connect_and_prune();
        self.live.rebuild_all_maps();

        let ordered: Vec<LayerId> = tour
            .frame_names()
            .iter()
            .filter_map(|n| tour.all_maps.get(n))
            .flat_map(|m| m.layers.iter().cloned())
            .collect();
        let mut overwrite: Option<bool> = None;
        let mut merged = 0;
        for id in ordered {
            let Some(entry) = tour.layer_list.remove(&id) else { continue };
            let mut layer = entry.layer;
            if self.live.layer_list.contains_key(&id) && *overwrite.get_or_insert(true) {
                self.live.remove_layer(&id, true);
            }
            if self.live.layer_list.contains_key(&id) {
                layer.clean_up();
                continue;
            }
            layer.common_mut().loaded_from_tour = true;
            match self.live.register(layer) {
                Ok(_) => merged += 1,
                Err(mut layer) => {
                    log::warn!(
                        "Tour layer {} dropped: frame {:?} missing",
                        layer.id(),
                        layer.common().reference_frame()
                    );
                    layer.clean_up();
                }
            }
        }
        for mut entry in tour.layer_list.into_values() {
            entry.layer.clean_up();
        }

        log::info!("Merged {} tour layers into the live tree", merged);
        self.structure_changed();
    }

    /// Draws `frame` and, when `nested`, everything below it.
    pub fn draw(
        &mut self,
        ctx: &mut RenderContext,
        opacity: f64,
        astronomical: bool,
        frame: &str,
        nested: bool,
        cosmos: bool,
    ) {
        let set = if self.tour_layers { &mut self.tour } else { &mut self.live };
        match set.all_maps.get(frame) {
            Some(map) if map.enabled && !map.is_empty() => {}
            Some(_) => return,
            None => {
                log::debug!("Draw skipped: no frame named {}", frame);
                return;
            }
        }
        if let Some(tour) = self.tour_override.as_mut() {
            apply_tour_override(set, tour);
        }
        draw_frame(set, ctx, opacity, astronomical, frame, nested, cosmos);
    }

    pub fn pre_draw(&mut self, ctx: &mut RenderContext, opacity: f64, astronomical: bool, frame: &str, nested: bool) {
        let set = if self.tour_layers { &mut self.tour } else { &mut self.live };
        if !set.all_maps.contains_key(frame) {
            return;
        }
        if let Some(tour) = self.tour_override.as_mut() {
            apply_tour_override(set, tour);
        }
        pre_draw_frame(set, ctx, opacity, astronomical, frame, nested);
    }

    fn add_new(&mut self, layer: Box<dyn Layer>) -> Option<LayerId> {
        let id = layer.id().clone();
        self.add(layer, true).then_some(id)
    }

    pub fn add_image_set_layer(&mut self, image_set: ImageSet, frame: &str) -> Option<LayerId> {
        self.add_new(Box::new(ImageSetLayer::new(image_set, frame)))
    }

    pub fn create_spreadsheet_layer(&mut self, frame: &str, name: &str, data: &str) -> Option<LayerId> {
        self.add_new(Box::new(SpreadSheetLayer::new(name, frame, data)))
    }

    pub fn add_votable_layer(&mut self, table: VoTable, frame: &str, name: &str) -> Option<LayerId> {
        self.add_new(Box::new(VoTableLayer::new(name, frame, table)))
    }

    pub fn add_orbit_file_layer(&mut self, frame: &str, name: &str, tle_text: &str) -> Option<LayerId> {
        self.add_new(Box::new(OrbitLayer::new(name, frame, tle_text)))
    }

    pub fn add_great_circle_layer(
        &mut self,
        frame: &str,
        name: &str,
        start: (f64, f64),
        end: (f64, f64),
    ) -> Option<LayerId> {
        let mut layer = GreatCircleRouteLayer::new(name, frame);
        layer.set_start(start.0, start.1);
        layer.set_end(end.0, end.1);
        self.add_new(Box::new(layer))
    }

    pub fn add_grid_layer(&mut self, frame: &str, name: &str) -> Option<LayerId> {
        self.add_new(Box::new(GridLayer::new(name, frame)))
    }

    pub fn add_object3d_layer(&mut self, frame: &str, name: &str, object: Object3d) -> Option<LayerId> {
        let mut layer = Object3dLayer::new(name, frame);
        layer.set_object(Some(object));
        self.add_new(Box::new(layer))
    }

    /// Container document for `frame`'s subtree: its user frames and every
    /// layer on it. An unknown frame gives an empty container.
    pub fn save_layers_to_xml(&self, frame: &str) -> Result<String, XmlError> {
        let set = self.active();
        let maps: Vec<&LayerMap> = set.preorder_from(frame).iter().filter_map(|n| set.all_maps.get(n)).collect();
        let frames = maps.iter().filter(|m| !m.frame.system_generated).map(|m| &m.frame);
        let layers = maps
            .iter()
            .flat_map(|m| m.layers.iter())
            .filter_map(|id| set.layer_list.get(id))
            .map(layer_ref);
        write_container(frames, layers).to_xml_string()
    }

    /// Loads a container into the active tree, or into the tour tree when
    /// `into_tour` is set (building its skeleton first if needed). Returns
    /// how many layers were registered.
    pub fn load_layers_from_xml(&mut self, text: &str, into_tour: bool) -> Result<usize, XmlError> {
        let container = read_container(text)?;
        if into_tour && self.tour.all_maps.is_empty() {
            build_skeleton(&mut self.tour, false);
        }
        let set = if into_tour || self.tour_layers { &mut self.tour } else { &mut self.live };

        for frame in container.frames {
            if set.all_maps.contains_key(&frame.name) {
                continue;
            }
            let mut map = LayerMap::new(frame);
            map.loaded_from_tour = into_tour;
            set.all_maps.insert(map.name().to_string(), map);
        }
        set.connect_and_prune();
        set.rebuild_all_maps();

        let mut added = 0;
        for mut layer in container.layers {
            layer.common_mut().loaded_from_tour = into_tour;
            match set.register(layer) {
                Ok(_) => added += 1,
                Err(layer) => log::warn!("Loaded layer {} not registered", layer.id()),
            }
        }
        self.structure_changed();
        Ok(added)
    }
}

fn build_skeleton(set: &mut LayerSet, with_iss: bool) {
    for body in CelestialBody::ALL {
        let mut frame = ReferenceFrame::new(body.label(), body.reference());
        frame.parent = body.parent().map(|p| p.label().to_string()).unwrap_or_default();
        frame.mean_radius = body.radius_m();
        frame.rotational_period = body.rotation_period_days();
        frame.system_generated = true;
        set.insert_map(LayerMap::new(frame));
    }
    if with_iss {
        set.insert_map(LayerMap::new(iss_frame()));
    }
    let mut sky = ReferenceFrame::new(SKY_FRAME, Reference::Sky);
    sky.system_generated = true;
    set.insert_map(LayerMap::new(sky));
    if let Some(sun) = set.all_maps.get_mut(CelestialBody::Sun.label()) {
        sun.open = true;
    }
}

fn attach_moons(set: &mut LayerSet, text: &str) -> usize {
    let mut attached = 0;
    for frame in parse_moon_file(text) {
        let name = frame.name.clone();
        if set.insert_map(LayerMap::new(frame)) {
            attached += 1;
        } else {
            log::debug!("Moon {} skipped: duplicate name or unknown planet", name);
        }
    }
    attached
}

fn apply_tour_override(set: &mut LayerSet, tour: &mut TourOverride) {
    let tween = tour.tween;
    for info in &mut tour.layers {
        info.interpolate(tween);
        if let Some(entry) = set.layer_list.get_mut(&info.id) {
            entry.layer.set_params(&info.front_params);
            entry.layer.common_mut().set_opacity(info.front_opacity);
        }
    }
}

/// Moves the context into `map`'s frame. Built-in bodies take the
/// placement the host supplied; custom frames compute their own matrix
/// and multiply it onto the rotating or non-rotating parent basis.
/// Returns the non-rotating basis child orbits are drawn in.
fn enter_frame(map: &mut LayerMap, ctx: &mut RenderContext) -> Matrix4<f64> {
    let frame = &mut map.frame;
    if !frame.reference.is_computed() {
        if let Some(placement) = ctx.body_placements.get(&frame.name).copied() {
            ctx.apply_placement(&placement);
        }
        return ctx.world_base_non_rotating;
    }

    let orbit_base = ctx.world_base_non_rotating;
    if frame.reference == Reference::Custom {
        frame.compute_frame(ctx);
    } else {
        frame.world_matrix = Matrix4::identity();
    }
    let rotating = frame.use_rotating_parent_frame();
    let base = if rotating { ctx.world } else { ctx.world_base_non_rotating };
    ctx.world = base * frame.world_matrix;
    ctx.world_base = ctx.world;
    if !rotating {
        ctx.world_base_non_rotating = ctx.world;
    }
    if frame.reference == Reference::Custom && frame.mean_radius > 0.0 {
        ctx.nominal_radius = frame.mean_radius;
    }
    orbit_base
}

fn draw_frame(
    set: &mut LayerSet,
    ctx: &mut RenderContext,
    opacity: f64,
    astronomical: bool,
    name: &str,
    nested: bool,
    cosmos: bool,
) {
    let Some(map) = set.all_maps.get_mut(name) else { return };
    if !map.enabled || map.is_empty() {
        return;
    }
    ctx.save_state();
    let orbit_base = enter_frame(map, ctx);
    let orbit_world = orbit_base * map.frame.world_matrix;
    let layers = map.layers.clone();
    let children = map.child_maps.clone();

    // Imagery first, then everything drawn over it.
    for images in [true, false] {
        for id in &layers {
            let Some(entry) = set.layer_list.get_mut(id) else { continue };
            if entry.kind.is_image_layer() != images {
                continue;
            }
            let layer = entry.layer.as_mut();
            if !layer.common().enabled() {
                continue;
            }
            if images && layer.override_default_layer() && !astronomical {
                continue;
            }
            let Some(fade) = layer.common().fade_opacity(ctx.jd_now) else { continue };
            layer.common_mut().astronomical = astronomical;
            layer.draw(ctx, opacity * fade, cosmos);
        }
    }

    if nested {
        for child in &children {
            draw_child_orbit(set, ctx, child, orbit_world, opacity);
            draw_frame(set, ctx, opacity, astronomical, child, nested, cosmos);
        }
    }
    ctx.restore_state();
}

fn draw_child_orbit(set: &mut LayerSet, ctx: &mut RenderContext, child: &str, world: Matrix4<f64>, opacity: f64) {
    if !(ctx.settings.solar_system_orbits && ctx.settings.solar_system_minor_orbits) {
        return;
    }
    let segments = ctx.settings.orbit_segments;
    let Some(map) = set.all_maps.get_mut(child) else { return };
    if !(map.enabled && map.frame.show_orbit_path && map.frame.reference_frame_type == ReferenceFrameType::Orbital) {
        return;
    }
    let nominal_radius = ctx.nominal_radius;
    let name = map.frame.name.clone();
    map.frame.orbit(segments, nominal_radius).draw(ctx, &name, world, opacity);
}

fn pre_draw_frame(
    set: &mut LayerSet,
    ctx: &mut RenderContext,
    opacity: f64,
    astronomical: bool,
    name: &str,
    nested: bool,
) {
    let Some(map) = set.all_maps.get_mut(name) else { return };
    if !map.enabled || map.is_empty() {
        return;
    }
    ctx.save_state();
    enter_frame(map, ctx);
    let layers = map.layers.clone();
    let children = map.child_maps.clone();

    for id in &layers {
        let Some(entry) = set.layer_list.get_mut(id) else { continue };
        let layer = entry.layer.as_mut();
        if !layer.common().enabled() {
            continue;
        }
        let Some(fade) = layer.common().fade_opacity(ctx.jd_now) else { continue };
        layer.common_mut().astronomical = astronomical;
        layer.pre_draw(ctx, opacity * fade);
    }

    if nested {
        for child in &children {
            pre_draw_frame(set, ctx, opacity, astronomical, child, nested);
        }
    }
    ctx.restore_state();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryFetcher;
    use crate::imageset_layer::DataSetType;
    use crate::render::DrawCommand;
    use crate::time::utc_to_julian;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn jd_2024() -> f64 {
        utc_to_julian(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
    }

    fn manager() -> LayerManager {
        let mut m = LayerManager::with_fetcher(EngineSettings::default(), Arc::new(MemoryFetcher::new()));
        m.init_layers();
        m.poll_fetches();
        m
    }

    fn image(name: &str) -> ImageSet {
        ImageSet::new(name, &format!("http://tiles/{}", name), DataSetType::Sky)
    }

    #[test]
    fn test_skeleton_shape() {
        let m = manager();
        assert_eq!(m.live().roots(), &["Sun".to_string(), "Sky".to_string()]);
        let earth = m.layer_map("Earth").unwrap();
        assert_eq!(earth.child_maps, vec!["Moon", "ISS"]);
        assert_eq!(earth.parent.as_deref(), Some("Sun"));
        assert_eq!(m.layer_map("Jupiter").unwrap().child_maps, vec!["Io", "Europa", "Ganymede", "Callisto"]);
        assert!(m.layer_map("Sun").unwrap().open);
        let iss = m.frame(ISS_FRAME).unwrap();
        assert_eq!(iss.reference_frame_type, ReferenceFrameType::Orbital);
        assert_relative_eq!(iss.semi_major_axis, 6728829.41);
        assert!(m.is_consistent());
    }

    #[test]
    fn test_failed_downloads_are_recorded() {
        let m = manager();
        assert!(matches!(m.moon_file_state(), FetchState::Failed(_)));
        assert!(matches!(m.iss_state(), FetchState::Failed(_)));
    }

    #[test]
    fn test_add_requires_known_frame_and_fresh_id() {
        let mut m = manager();
        let v = m.version();
        assert!(m.add_grid_layer("Atlantis", "grid").is_none());
        assert_eq!(m.version(), v);

        let id = m.add_grid_layer("Earth", "grid").unwrap();
        assert_eq!(m.version(), v + 1);
        let mut dup = GridLayer::new("again", "Earth");
        dup.common_mut().set_id(id.clone());
        assert!(!m.add(Box::new(dup), false));
        assert_eq!(m.layers_in("Earth"), vec![id]);
    }

    #[test]
    fn test_delete_layer() {
        let mut m = manager();
        let id = m.add_grid_layer("Earth", "grid").unwrap();
        assert!(m.delete_layer_by_id(&id, true, true));
        assert!(!m.delete_layer_by_id(&id, true, true));
        assert!(m.layers_in("Earth").is_empty());
        assert!(m.is_consistent());
    }

    #[test]
    fn test_tree_callback_sees_version() {
        use std::cell::RefCell;
        use std::rc::Rc;
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut m = manager();
        let sink = Rc::clone(&seen);
        m.set_tree_changed_callback(move |v| sink.borrow_mut().push(v));
        m.add_grid_layer("Earth", "grid");
        m.create_layer_group("Earth", "Group");
        assert_eq!(*seen.borrow(), vec![m.version() - 1, m.version()]);
    }

    #[test]
    fn test_move_layer() {
        let mut m = manager();
        let a = m.add_grid_layer("Earth", "a").unwrap();
        let b = m.add_grid_layer("Earth", "b").unwrap();
        let c = m.add_grid_layer("Earth", "c").unwrap();
        assert!(m.move_layer(&c, MoveTo::Top));
        assert_eq!(m.layers_in("Earth"), vec![c.clone(), a.clone(), b.clone()]);
        assert!(m.move_layer(&c, MoveTo::Down));
        assert_eq!(m.layers_in("Earth"), vec![a.clone(), c.clone(), b.clone()]);
        assert!(!m.move_layer(&b, MoveTo::Bottom));
        assert!(m.move_layer(&b, MoveTo::Up));
        assert_eq!(m.layers_in("Earth"), vec![a, b, c]);
    }

    #[test]
    fn test_purge_removes_subtree() {
        let mut m = manager();
        let mut lander = ReferenceFrame::new("Lander", Reference::Custom);
        lander.reference_frame_type = ReferenceFrameType::Orbital;
        assert!(m.add_reference_frame("Earth", lander));
        assert!(m.create_layer_group("Lander", "Instruments"));
        let outer = m.add_grid_layer("Lander", "grid").unwrap();
        let inner = m.add_grid_layer("Instruments", "grid").unwrap();

        assert!(!m.delete_frame("Earth"));
        assert!(m.delete_frame("Lander"));
        assert!(m.frame("Lander").is_none());
        assert!(m.frame("Instruments").is_none());
        assert!(m.layer(&outer).is_none() && m.layer(&inner).is_none());
        assert!(!m.layer_map("Earth").unwrap().child_maps.contains(&"Lander".to_string()));
        assert!(m.is_consistent());
    }

    #[test]
    fn test_non_top_level_purge_keeps_the_map() {
        let mut m = manager();
        let id = m.add_grid_layer("Mars", "grid").unwrap();
        m.purge_layer_map_deep("Mars", false);
        assert!(m.frame("Mars").is_some());
        assert!(m.layer(&id).is_none());
        assert!(m.is_consistent());
    }

    #[test]
    fn test_non_top_level_purge_drops_child_frames() {
        let mut m = manager();
        let earth = m.add_grid_layer("Earth", "grid").unwrap();
        let moon = m.add_grid_layer("Moon", "grid").unwrap();
        m.purge_layer_map_deep("Earth", false);

        assert!(m.frame("Earth").is_some());
        assert!(m.layer_map("Earth").unwrap().child_maps.is_empty());
        assert!(m.frame("Moon").is_none() && m.frame("ISS").is_none());
        assert!(m.layer(&earth).is_none() && m.layer(&moon).is_none());
        assert!(m.is_consistent());
    }

    #[test]
    fn test_orphans_drop_with_their_layers() {
        let mut m = manager();
        let mut lost = ReferenceFrame::new("Lost", Reference::Identity);
        lost.parent = "Vulcan".to_string();
        let mut below = ReferenceFrame::new("Below", Reference::Identity);
        below.parent = "Lost".to_string();
        let set = m.active_mut();
        set.all_maps.insert("Lost".to_string(), LayerMap::new(lost));
        set.all_maps.insert("Below".to_string(), LayerMap::new(below));
        let on_lost = set.register(Box::new(GridLayer::new("grid", "Lost"))).ok().unwrap();
        let on_below = set.register(Box::new(GridLayer::new("grid", "Below"))).ok().unwrap();
        let v = m.version();

        assert_eq!(m.connect_all_children(), vec!["Lost".to_string()]);
        assert!(m.frame("Lost").is_none() && m.frame("Below").is_none());
        assert!(m.layer(&on_lost).is_none() && m.layer(&on_below).is_none());
        assert!(m.version() > v);
        assert!(m.is_consistent());
        assert!(m.connect_all_children().is_empty());
    }

    #[test]
    fn test_frame_with_unknown_parent_rejected() {
        let mut m = manager();
        assert!(!m.add_reference_frame("Vulcan", ReferenceFrame::new("Lander", Reference::Custom)));
        assert!(!m.add_reference_frame("Earth", ReferenceFrame::new("Moon", Reference::Custom)));
        assert!(m.is_consistent());
    }

    #[test]
    fn test_override_default_image_needs_astronomical_pass() {
        let mut m = manager();
        let id = m.add_image_set_layer(image("dss"), "Sky").unwrap();
        m.layer_as_mut::<ImageSetLayer>(&id).unwrap().set_override_default_layer(true);
        let mut ctx = m.render_context(jd_2024());
        m.draw(&mut ctx, 1.0, false, "Sky", true, false);
        assert!(ctx.display_list.is_empty());
        m.draw(&mut ctx, 1.0, true, "Sky", true, false);
        assert_eq!(ctx.display_list.len(), 1);
        assert!(m.layer(&id).unwrap().common().astronomical);
    }

    #[test]
    fn test_traversal_restores_state() {
        let mut m = manager();
        let mut lander = ReferenceFrame::new("Lander", Reference::Custom);
        lander.translation = nalgebra::Vector3::new(1.0, 0.0, 0.0);
        lander.mean_radius = 1000.0;
        m.add_reference_frame("Earth", lander);
        m.add_grid_layer("Lander", "grid");
        let mut ctx = m.render_context(jd_2024());
        let nominal = ctx.nominal_radius;
        m.draw(&mut ctx, 1.0, false, "Earth", true, false);
        assert_eq!(ctx.stack_depth(), 0);
        assert_eq!(ctx.world, Matrix4::identity());
        assert_eq!(ctx.nominal_radius, nominal);
        let grids: Vec<&DrawCommand> =
            ctx.display_list.iter().filter(|c| matches!(c, DrawCommand::Grid { .. })).collect();
        assert_eq!(grids.len(), 1);
        assert_ne!(*grids[0].world(), Matrix4::identity());
    }

    #[test]
    fn test_child_orbits_follow_settings() {
        let mut m = manager();
        let mut ctx = m.render_context(jd_2024());
        m.draw(&mut ctx, 1.0, false, "Earth", true, false);
        let orbits = |ctx: &RenderContext| {
            ctx.display_list
                .iter()
                .filter(|c| matches!(c, DrawCommand::Orbit { frame, .. } if frame == ISS_FRAME))
                .count()
        };
        assert_eq!(orbits(&ctx), 1);

        m.settings_mut().solar_system_minor_orbits = false;
        let mut ctx = m.render_context(jd_2024());
        m.draw(&mut ctx, 1.0, false, "Earth", true, false);
        assert_eq!(orbits(&ctx), 0);
    }

    #[test]
    fn test_visible_layer_list_round_trip() {
        let mut m = manager();
        let a = m.add_grid_layer("Earth", "a").unwrap();
        let b = m.add_grid_layer("Earth", "b").unwrap();
        m.layer_mut(&b).unwrap().common_mut().set_enabled(false);

        let mut list = m.get_visible_layer_list(&HashMap::new());
        assert_eq!(list.len(), 1);
        let info = list.get_mut(&a).unwrap();
        info.end_opacity = 0.0;
        info.interpolate(0.25);
        assert_relative_eq!(info.front_opacity, 0.75);

        let again = m.get_visible_layer_list(&list);
        assert_eq!(again[&a].end_opacity, 0.0);
        assert_eq!(again[&a].start_opacity, 1.0);

        m.set_visible_layer_list(&list);
        assert_relative_eq!(m.layer(&a).unwrap().common().opacity(), 0.75);
        assert!(!m.layer(&b).unwrap().common().enabled());
    }

    #[test]
    fn test_tour_override_drives_params() {
        let mut m = manager();
        let id = m.add_image_set_layer(image("dss"), "Sky").unwrap();
        let mut info = LayerInfo::snapshot(m.layer(&id).unwrap());
        info.end_opacity = 0.0;
        info.end_params[4] = 0.0;
        m.set_tour_override(Some(TourOverride { tween: 0.5, layers: vec![info] }));

        let mut ctx = m.render_context(jd_2024());
        m.draw(&mut ctx, 1.0, false, "Sky", true, false);
        assert_relative_eq!(ctx.display_list[0].opacity(), 0.5);
        assert_relative_eq!(m.layer(&id).unwrap().common().opacity(), 0.5);
    }

    #[test]
    fn test_save_and_load_subtree() {
        let mut m = manager();
        let mut lander = ReferenceFrame::new("Lander", Reference::Custom);
        lander.lat = 12.0;
        m.add_reference_frame("Earth", lander);
        let grid = m.add_grid_layer("Lander", "grid").unwrap();
        let route = m.add_great_circle_layer("Earth", "route", (0.0, 0.0), (10.0, 10.0)).unwrap();
        let text = m.save_layers_to_xml("Earth").unwrap();

        let mut other = manager();
        assert_eq!(other.load_layers_from_xml(&text, false).unwrap(), 2);
        assert_eq!(other.frame("Lander").unwrap().lat, 12.0);
        assert_eq!(other.frame("Lander").unwrap().parent, "Earth");
        assert_eq!(other.layers_in("Lander"), vec![grid]);
        assert!(other.layer_as::<GreatCircleRouteLayer>(&route).is_some());
        assert!(other.is_consistent());
    }

    #[test]
    fn test_leaving_tour_mode_discards_tour_tree() {
        let mut m = manager();
        m.set_tour_layers(true);
        assert!(m.tour_layers());
        assert!(m.frame(ISS_FRAME).is_none());
        assert!(m.add_grid_layer("Earth", "tour grid").is_some());
        m.set_tour_layers(false);
        assert!(m.tour().is_empty());
        assert!(m.layers_in("Earth").is_empty());
        assert!(m.frame(ISS_FRAME).is_some());
    }
}
