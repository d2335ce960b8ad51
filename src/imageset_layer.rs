//! Tiled image layers. The tile pyramid itself is the host's; this layer
//! only decides when and how opaque an image set is drawn.

use std::any::Any;

use crate::layer::{set_field, Layer, LayerCommon, LayerKind};
use crate::render::{DrawCommand, RenderContext};
use crate::xml::XmlElement;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DataSetType {
    Earth,
    Planet,
    #[default]
    Sky,
    Panorama,
    SolarSystem,
}

impl DataSetType {
    pub fn label(&self) -> &'static str {
        match self {
            DataSetType::Earth => "Earth",
            DataSetType::Planet => "Planet",
            DataSetType::Sky => "Sky",
            DataSetType::Panorama => "Panorama",
            DataSetType::SolarSystem => "SolarSystem",
        }
    }

    pub fn from_label(text: &str) -> Option<DataSetType> {
        [
            DataSetType::Earth,
            DataSetType::Planet,
            DataSetType::Sky,
            DataSetType::Panorama,
            DataSetType::SolarSystem,
        ]
        .into_iter()
        .find(|d| d.label() == text.trim())
    }
}

/// Catalog description of an imagery data set, as produced by the WTML
/// reader.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImageSet {
    pub name: String,
    pub url: String,
    pub data_set_type: DataSetType,
    pub thumbnail_url: String,
}

impl ImageSet {
    pub fn new(name: &str, url: &str, data_set_type: DataSetType) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            data_set_type,
            thumbnail_url: String::new(),
        }
    }

    fn to_xml(&self) -> XmlElement {
        XmlElement::new("ImageSet")
            .with_attr("Name", &self.name)
            .with_attr("Url", &self.url)
            .with_attr("DataSetType", self.data_set_type.label())
            .with_attr("ThumbnailUrl", &self.thumbnail_url)
    }

    fn from_xml(el: &XmlElement) -> Self {
        Self {
            name: el.attr_string("Name"),
            url: el.attr_string("Url"),
            data_set_type: el
                .attr("DataSetType")
                .and_then(DataSetType::from_label)
                .unwrap_or_default(),
            thumbnail_url: el.attr_string("ThumbnailUrl"),
        }
    }
}

pub struct ImageSetLayer {
    common: LayerCommon,
    image_set: ImageSet,
    override_default_layer: bool,
}

impl ImageSetLayer {
    pub fn new(image_set: ImageSet, reference_frame: &str) -> Self {
        Self {
            common: LayerCommon::new(image_set.name.clone(), reference_frame),
            image_set,
            override_default_layer: false,
        }
    }

    pub fn image_set(&self) -> &ImageSet {
        &self.image_set
    }

    pub fn set_image_set(&mut self, image_set: ImageSet) -> bool {
        set_field(&mut self.common, &mut self.image_set, image_set)
    }

    pub fn set_override_default_layer(&mut self, value: bool) -> bool {
        set_field(&mut self.common, &mut self.override_default_layer, value)
    }
}

impl Layer for ImageSetLayer {
    fn common(&self) -> &LayerCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut LayerCommon {
        &mut self.common
    }

    fn kind(&self) -> LayerKind {
        LayerKind::ImageSet
    }

    fn draw(&mut self, ctx: &mut RenderContext, opacity: f64, _flat: bool) -> bool {
        ctx.push(DrawCommand::ImageSet {
            layer: self.common.id().clone(),
            name: self.image_set.name.clone(),
            url: self.image_set.url.clone(),
            opacity: opacity * self.common.opacity(),
            world: ctx.world,
        });
        true
    }

    fn override_default_layer(&self) -> bool {
        self.override_default_layer
    }

    fn write_layer_properties(&self, el: &mut XmlElement) {
        el.set_attr("OverrideDefault", self.override_default_layer);
        el.push_child(self.image_set.to_xml());
    }

    fn initialize_from_xml(&mut self, el: &XmlElement) {
        self.set_override_default_layer(el.attr_bool("OverrideDefault", false));
        if let Some(child) = el.child("ImageSet") {
            self.set_image_set(ImageSet::from_xml(child));
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
