//! Layer container documents and the type-name registry used to rebuild
//! layers from them.
//!
//! A container holds the custom reference frames a set of layers needs,
//! then the layers themselves:
//!
//! ```xml
//! <LayerContainer Generator="...">
//!   <ReferenceFrames><ReferenceFrame Name="Lander" Parent="Earth" .../></ReferenceFrames>
//!   <Layers><Layer Id="..." Type="TerraViewer.GridLayer" .../></Layers>
//! </LayerContainer>
//! ```

use crate::great_circle_route_layer::GreatCircleRouteLayer;
use crate::grid_layer::GridLayer;
use crate::imageset_layer::{ImageSet, ImageSetLayer};
use crate::layer::{Layer, LayerKind};
use crate::object3d_layer::Object3dLayer;
use crate::orbit_layer::OrbitLayer;
use crate::reference_frame::ReferenceFrame;
use crate::table_layer::{SpreadSheetLayer, VoTable, VoTableLayer};
use crate::xml::{XmlElement, XmlError};

/// Type name written for great-circle routes. The misspelling is part of
/// the saved file format and is kept on purpose.
pub const GREAT_CIRCLE_ROUTE_TYPE: &str = "TerraViewer.GreatCirlceRouteLayer";

const LAYER_TYPES: [(LayerKind, &str); 7] = [
    (LayerKind::ImageSet, "TerraViewer.ImageSetLayer"),
    (LayerKind::SpreadSheet, "TerraViewer.SpreadSheetLayer"),
    (LayerKind::VoTable, "TerraViewer.VoTableLayer"),
    (LayerKind::Object3d, "TerraViewer.Object3dLayer"),
    (LayerKind::Orbit, "TerraViewer.OrbitLayer"),
    (LayerKind::Grid, "TerraViewer.GridLayer"),
    (LayerKind::GreatCircleRoute, GREAT_CIRCLE_ROUTE_TYPE),
];

pub fn type_name(kind: LayerKind) -> &'static str {
    LAYER_TYPES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, name)| *name)
        .unwrap_or("TerraViewer.Layer")
}

/// Resolves a saved `Type` attribute. The corrected route spelling is
/// accepted on read as well.
pub fn kind_from_type_name(name: &str) -> Option<LayerKind> {
    let name = name.trim();
    if name == "TerraViewer.GreatCircleRouteLayer" {
        return Some(LayerKind::GreatCircleRoute);
    }
    LAYER_TYPES.iter().find(|(_, n)| *n == name).map(|(k, _)| *k)
}

/// An empty layer of the given kind, ready for `read_xml`.
pub fn construct_layer(kind: LayerKind) -> Box<dyn Layer> {
    match kind {
        LayerKind::ImageSet => Box::new(ImageSetLayer::new(ImageSet::default(), "")),
        LayerKind::SpreadSheet => Box::new(SpreadSheetLayer::new("", "", "")),
        LayerKind::VoTable => Box::new(VoTableLayer::new("", "", VoTable::default())),
        LayerKind::Object3d => Box::new(Object3dLayer::new("", "")),
        LayerKind::Orbit => Box::new(OrbitLayer::new("", "", "")),
        LayerKind::Grid => Box::new(GridLayer::new("", "")),
        LayerKind::GreatCircleRoute => Box::new(GreatCircleRouteLayer::new("", "")),
    }
}

pub fn save_layer_to_xml(layer: &dyn Layer) -> XmlElement {
    let mut el = XmlElement::new("Layer");
    layer.common().write_xml(&mut el);
    el.set_attr("Type", type_name(layer.kind()));
    layer.write_layer_properties(&mut el);
    el
}

pub fn load_layer_from_xml(el: &XmlElement) -> Result<Box<dyn Layer>, XmlError> {
    let type_attr = el.attr("Type").unwrap_or_default();
    let kind = kind_from_type_name(type_attr).ok_or_else(|| XmlError::UnknownType(type_attr.to_string()))?;
    let mut layer = construct_layer(kind);
    layer.common_mut().read_xml(el);
    layer.initialize_from_xml(el);
    Ok(layer)
}

/// Frames and layers read back from one container.
#[derive(Default)]
pub struct LayerContainer {
    pub frames: Vec<ReferenceFrame>,
    pub layers: Vec<Box<dyn Layer>>,
}

pub fn write_container<'a>(
    frames: impl IntoIterator<Item = &'a ReferenceFrame>,
    layers: impl IntoIterator<Item = &'a dyn Layer>,
) -> XmlElement {
    let mut frames_el = XmlElement::new("ReferenceFrames");
    for frame in frames {
        frames_el.push_child(frame.save_to_xml());
    }
    let mut layers_el = XmlElement::new("Layers");
    for layer in layers {
        layers_el.push_child(save_layer_to_xml(layer));
    }
    let mut root = XmlElement::new("LayerContainer").with_attr("Generator", crate::BUILD_GIT_HASH);
    root.push_child(frames_el);
    root.push_child(layers_el);
    root
}

/// Reads a container. Layers of unknown type are skipped with a warning;
/// a document that is not a container is an error.
pub fn read_container(text: &str) -> Result<LayerContainer, XmlError> {
    let root = XmlElement::parse(text)?;
    if root.name != "LayerContainer" {
        return Err(XmlError::MissingElement("LayerContainer".to_string()));
    }
    let mut container = LayerContainer::default();
    if let Some(frames) = root.child("ReferenceFrames") {
        container.frames = frames.children_named("ReferenceFrame").map(ReferenceFrame::from_xml).collect();
    }
    if let Some(layers) = root.child("Layers") {
        for el in layers.children_named("Layer") {
            match load_layer_from_xml(el) {
                Ok(layer) => container.layers.push(layer),
                Err(e) => log::warn!("Skipping layer {:?}: {}", el.attr("Name").unwrap_or_default(), e),
            }
        }
    }
    Ok(container)
}
