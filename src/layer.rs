//! The layer contract shared by every renderable overlay.
//!
//! Every layer carries a [`LayerCommon`] block (identity, time window,
//! opacity, color) and implements [`Layer`] for drawing, tour parameter
//! snapshots and XML persistence. Setters on the common block compare,
//! apply, and bump `version` only when the value actually changed, so a
//! cached tessellation keyed on the version stays valid across
//! idempotent writes.

use std::any::Any;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::color::Color;
use crate::render::RenderContext;
use crate::time::{duration_to_days, format_time_span, parse_time_span, utc_to_julian};
use crate::xml::XmlElement;

pub const BASE_PARAM_NAMES: [&str; 5] = ["Color.Red", "Color.Green", "Color.Blue", "Color.Alpha", "Opacity"];

const XML_DATE_FORMAT: &str = "%-m/%-d/%Y %-I:%M:%S %p";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(String);

impl LayerId {
    /// A random version-4 GUID in the 8-4-4-4-12 text form.
    pub fn new_random() -> Self {
        let mut b: [u8; 16] = rand::random();
        b[6] = (b[6] & 0x0f) | 0x40;
        b[8] = (b[8] & 0x3f) | 0x80;
        let hex: String = b.iter().map(|x| format!("{:02x}", x)).collect();
        Self(format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for LayerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Concrete layer variant, resolved once when a layer is registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerKind {
    ImageSet,
    SpreadSheet,
    VoTable,
    Object3d,
    Orbit,
    Grid,
    GreatCircleRoute,
}

impl LayerKind {
    pub fn is_image_layer(&self) -> bool {
        matches!(self, LayerKind::ImageSet)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FadeType {
    In,
    Out,
    Both,
    #[default]
    None,
}

impl FadeType {
    pub fn label(&self) -> &'static str {
        match self {
            FadeType::In => "In",
            FadeType::Out => "Out",
            FadeType::Both => "Both",
            FadeType::None => "None",
        }
    }

    pub fn from_label(text: &str) -> Option<FadeType> {
        match text.trim() {
            "In" => Some(FadeType::In),
            "Out" => Some(FadeType::Out),
            "Both" => Some(FadeType::Both),
            "None" => Some(FadeType::None),
            _ => None,
        }
    }

    fn fades_in(&self) -> bool {
        matches!(self, FadeType::In | FadeType::Both)
    }

    fn fades_out(&self) -> bool {
        matches!(self, FadeType::Out | FadeType::Both)
    }
}

/// Where a layer sits in its time window. Derived from the clock on every
/// call; never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FadeState {
    Inactive,
    FadingIn,
    FullyVisible,
    FadingOut,
}

/// Compare, apply, and advance `version` on change.
pub fn set_tracked<T: PartialEq>(slot: &mut T, value: T, version: &mut u64) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    *version += 1;
    true
}

/// [`set_tracked`] for fields a variant keeps outside its common block.
pub fn set_field<T: PartialEq>(common: &mut LayerCommon, slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    common.bump_version();
    true
}

fn utc_date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

pub fn default_start_time() -> DateTime<Utc> {
    utc_date(1900, 1, 1)
}

pub fn default_end_time() -> DateTime<Utc> {
    utc_date(2100, 1, 1)
}

pub fn format_xml_date(date: &DateTime<Utc>) -> String {
    date.format(XML_DATE_FORMAT).to_string()
}

/// Reads `M/d/yyyy h:mm:ss AM`, its 24-hour and date-only variants, or
/// RFC 3339.
pub fn parse_xml_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%m/%d/%Y %I:%M:%S %p", "%m/%d/%Y %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%m/%d/%Y")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
}

#[derive(Clone, Debug)]
pub struct LayerCommon {
    id: LayerId,
    name: String,
    reference_frame: String,
    opacity: f64,
    enabled: bool,
    color: Color,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    fade_span: Duration,
    fade_type: FadeType,
    version: u64,
    pub astronomical: bool,
    pub opened: bool,
    pub loaded_from_tour: bool,
}

impl Default for LayerCommon {
    fn default() -> Self {
        Self {
            id: LayerId::new_random(),
            name: String::new(),
            reference_frame: String::new(),
            opacity: 1.0,
            enabled: true,
            color: Color::WHITE,
            start_time: default_start_time(),
            end_time: default_end_time(),
            fade_span: Duration::zero(),
            fade_type: FadeType::None,
            version: 0,
            astronomical: false,
            opened: false,
            loaded_from_tour: false,
        }
    }
}

impl LayerCommon {
    pub fn new(name: impl Into<String>, reference_frame: impl Into<String>) -> Self {
        Self { name: name.into(), reference_frame: reference_frame.into(), ..Default::default() }
    }

    pub fn id(&self) -> &LayerId {
        &self.id
    }

    pub fn set_id(&mut self, id: LayerId) -> bool {
        set_tracked(&mut self.id, id, &mut self.version)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) -> bool {
        set_tracked(&mut self.name, name.to_string(), &mut self.version)
    }

    pub fn reference_frame(&self) -> &str {
        &self.reference_frame
    }

    pub fn set_reference_frame(&mut self, frame: &str) -> bool {
        set_tracked(&mut self.reference_frame, frame.to_string(), &mut self.version)
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    /// NaN is ignored and leaves the current opacity in place.
    pub fn set_opacity(&mut self, opacity: f64) -> bool {
        if opacity.is_nan() {
            return false;
        }
        set_tracked(&mut self.opacity, opacity, &mut self.version)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        set_tracked(&mut self.enabled, enabled, &mut self.version)
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn set_color(&mut self, color: Color) -> bool {
        set_tracked(&mut self.color, color, &mut self.version)
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn set_start_time(&mut self, t: DateTime<Utc>) -> bool {
        set_tracked(&mut self.start_time, t, &mut self.version)
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn set_end_time(&mut self, t: DateTime<Utc>) -> bool {
        set_tracked(&mut self.end_time, t, &mut self.version)
    }

    pub fn fade_span(&self) -> Duration {
        self.fade_span
    }

    pub fn set_fade_span(&mut self, span: Duration) -> bool {
        set_tracked(&mut self.fade_span, span, &mut self.version)
    }

    pub fn fade_type(&self) -> FadeType {
        self.fade_type
    }

    pub fn set_fade_type(&mut self, fade_type: FadeType) -> bool {
        set_tracked(&mut self.fade_type, fade_type, &mut self.version)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// For variant setters that track their own fields.
    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    /// `(fade_in, fade_out)` as Julian dates.
    pub fn fade_window(&self) -> (f64, f64) {
        let span = duration_to_days(self.fade_span);
        let start = utc_to_julian(self.start_time);
        let end = utc_to_julian(self.end_time);
        let fade_in = if self.fade_type.fades_in() { start - span } else { start };
        let fade_out = if self.fade_type.fades_out() { end + span } else { end };
        (fade_in, fade_out)
    }

    /// Opacity multiplier at `jd`, or `None` outside the window.
    pub fn fade_opacity(&self, jd: f64) -> Option<f64> {
        let (fade_in, fade_out) = self.fade_window();
        if !(fade_in < jd && jd < fade_out) {
            return None;
        }
        let span = duration_to_days(self.fade_span);
        let start = utc_to_julian(self.start_time);
        let end = utc_to_julian(self.end_time);
        if jd < start {
            Some((jd - fade_in) / span)
        } else if jd > end {
            Some((fade_out - jd) / span)
        } else {
            Some(1.0)
        }
    }

    pub fn fade_state(&self, jd: f64) -> FadeState {
        match self.fade_opacity(jd) {
            None => FadeState::Inactive,
            Some(_) if jd < utc_to_julian(self.start_time) => FadeState::FadingIn,
            Some(_) if jd > utc_to_julian(self.end_time) => FadeState::FadingOut,
            Some(_) => FadeState::FullyVisible,
        }
    }

    pub fn base_params(&self) -> Vec<f64> {
        let [r, g, b, a] = self.color.to_unit();
        vec![r, g, b, a, self.opacity]
    }

    /// Applies `[r, g, b, a, opacity]`; shorter slices are ignored.
    pub fn set_base_params(&mut self, params: &[f64]) {
        if let [r, g, b, a, opacity, ..] = *params {
            self.set_color(Color::from_unit(r, g, b, a));
            self.set_opacity(opacity);
        }
    }

    pub fn write_xml(&self, el: &mut XmlElement) {
        el.set_attr("Id", &self.id);
        el.set_attr("Name", &self.name);
        el.set_attr("ReferenceFrame", &self.reference_frame);
        el.set_attr("Color", self.color.to_save_string());
        el.set_attr("Opacity", self.opacity);
        el.set_attr("StartTime", format_xml_date(&self.start_time));
        el.set_attr("EndTime", format_xml_date(&self.end_time));
        el.set_attr("FadeSpan", format_time_span(self.fade_span));
        el.set_attr("FadeType", self.fade_type.label());
    }

    pub fn read_xml(&mut self, el: &XmlElement) {
        if let Some(id) = el.attr("Id").filter(|s| !s.is_empty()) {
            self.set_id(LayerId::from(id));
        }
        if let Some(name) = el.attr("Name") {
            self.set_name(name);
        }
        if let Some(frame) = el.attr("ReferenceFrame") {
            self.set_reference_frame(frame);
        }
        if let Some(color) = el.attr("Color") {
            self.set_color(Color::from_save_string(color));
        }
        self.set_opacity(el.attr_f64("Opacity", 1.0));
        if let Some(start) = el.attr("StartTime") {
            match parse_xml_date(start) {
                Some(t) => self.set_start_time(t),
                None => {
                    log::debug!("Layer {}: unreadable StartTime {:?}", self.id, start);
                    false
                }
            };
        }
        if let Some(end) = el.attr("EndTime") {
            match parse_xml_date(end) {
                Some(t) => self.set_end_time(t),
                None => {
                    log::debug!("Layer {}: unreadable EndTime {:?}", self.id, end);
                    false
                }
            };
        }
        if let Some(span) = el.attr("FadeSpan").and_then(parse_time_span) {
            self.set_fade_span(span);
        }
        if let Some(fade) = el.attr("FadeType").and_then(FadeType::from_label) {
            self.set_fade_type(fade);
        }
    }
}

/// A renderable overlay attached to a reference frame.
pub trait Layer: Any {
    fn common(&self) -> &LayerCommon;
    fn common_mut(&mut self) -> &mut LayerCommon;
    fn kind(&self) -> LayerKind;

    /// Emits this layer's draw commands. `opacity` already includes the
    /// caller's ambient and fade factors; the layer multiplies in its own.
    fn draw(&mut self, ctx: &mut RenderContext, opacity: f64, flat: bool) -> bool;

    fn pre_draw(&mut self, _ctx: &mut RenderContext, _opacity: f64) -> bool {
        true
    }

    /// Releases cached geometry. Safe to call repeatedly.
    fn clean_up(&mut self) {}

    fn get_params(&self) -> Vec<f64> {
        self.common().base_params()
    }

    fn set_params(&mut self, params: &[f64]) {
        self.common_mut().set_base_params(params);
    }

    fn get_param_names(&self) -> Vec<&'static str> {
        BASE_PARAM_NAMES.to_vec()
    }

    fn write_layer_properties(&self, _el: &mut XmlElement) {}

    fn initialize_from_xml(&mut self, _el: &XmlElement) {}

    /// Image layers that replace the default background are skipped in
    /// non-astronomical passes.
    fn override_default_layer(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn id(&self) -> &LayerId {
        self.common().id()
    }

    fn version(&self) -> u64 {
        self.common().version()
    }
}
