//! Point plotting over tabular data: delimited spreadsheets and VOTables.
//!
//! Both variants share [`PlotSettings`] and a version-keyed point cache.
//! Rows become [`PointVertex`]es once per layer version; time-series
//! filtering runs per draw against the simulated clock.

use std::any::Any;
use std::sync::Arc;

use crate::color::Color;
use crate::layer::{parse_xml_date, set_field, Layer, LayerCommon, LayerKind, BASE_PARAM_NAMES};
use crate::math::geo_to_3d;
use crate::render::{DrawCommand, MarkerScale, PlotType, PointStyle, PointVertex, RenderContext};
use crate::time::utc_to_julian;
use crate::units::AltUnit;
use crate::xml::XmlElement;

pub const TABLE_PARAM_NAMES: [&str; 7] = [
    "Decay",
    "ScaleFactor",
    "Color.Red",
    "Color.Green",
    "Color.Blue",
    "Color.Alpha",
    "Opacity",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Delimiter {
    #[default]
    Tab,
    Comma,
}

impl Delimiter {
    pub fn as_byte(&self) -> u8 {
        match self {
            Delimiter::Tab => b'\t',
            Delimiter::Comma => b',',
        }
    }

    /// Tab wins when the header line has one.
    pub fn detect(header: &str) -> Delimiter {
        if header.contains('\t') {
            Delimiter::Tab
        } else {
            Delimiter::Comma
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    pub delimiter: Delimiter,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Reads a spreadsheet with a header row. Short or long rows are kept
    /// as they are; records the reader rejects are skipped.
    pub fn parse_delimited(text: &str) -> Table {
        let Some(header) = text.lines().find(|l| !l.trim().is_empty()) else {
            return Table::default();
        };
        let delimiter = Delimiter::detect(header);
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter.as_byte())
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(text.as_bytes());

        let headers = match reader.headers() {
            Ok(record) => record.iter().map(str::to_string).collect(),
            Err(e) => {
                log::warn!("Unreadable table header: {}", e);
                return Table { delimiter, ..Table::default() };
            }
        };
        let rows = reader
            .records()
            .filter_map(|record| match record {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("Skipping table row: {}", e);
                    None
                }
            })
            .filter(|record| record.iter().any(|f| !f.trim().is_empty()))
            .map(|record| record.iter().map(str::to_string).collect())
            .collect();
        Table { delimiter, headers, rows }
    }

    pub fn to_delimited(&self) -> String {
        match self.write_delimited() {
            Ok(text) => text,
            Err(e) => {
                log::error!("Failed to write table: {}", e);
                String::new()
            }
        }
    }

    fn write_delimited(&self) -> csv::Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter.as_byte())
            .flexible(true)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VoColumn {
    pub name: String,
    pub ucd: String,
    pub unit: String,
}

/// Typed VOTable record as delivered by the external VOTable reader.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VoTable {
    pub columns: Vec<VoColumn>,
    pub rows: Vec<Vec<String>>,
}

impl VoTable {
    pub fn column_index(&self, ucd: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.ucd.eq_ignore_ascii_case(ucd))
    }

    fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColumnRoles {
    pub lat: Option<usize>,
    pub lng: Option<usize>,
    pub alt: Option<usize>,
    pub size: Option<usize>,
    pub color: Option<usize>,
    pub start_date: Option<usize>,
    pub end_date: Option<usize>,
}

impl ColumnRoles {
    /// Assigns roles from header names. First match wins per role.
    pub fn guess(headers: &[String]) -> ColumnRoles {
        let find = |keys: &[&str]| {
            headers.iter().position(|h| {
                let h = h.to_ascii_lowercase();
                keys.iter().any(|k| h == *k || h.starts_with(k))
            })
        };
        ColumnRoles {
            lat: find(&["lat", "dec"]),
            lng: find(&["lon", "lng", "ra"]),
            alt: find(&["alt", "depth", "elev"]),
            size: find(&["mag", "size"]),
            color: find(&["color", "colour"]),
            start_date: find(&["time", "date", "start"]),
            end_date: find(&["end"]),
        }
    }

    /// UCD-based assignment, falling back to names for anything the
    /// table does not tag.
    pub fn guess_votable(table: &VoTable) -> ColumnRoles {
        let by_name = ColumnRoles::guess(&table.headers());
        ColumnRoles {
            lat: table.column_index("pos.eq.dec;meta.main").or(table.column_index("pos.eq.dec")).or(by_name.lat),
            lng: table.column_index("pos.eq.ra;meta.main").or(table.column_index("pos.eq.ra")).or(by_name.lng),
            size: table.column_index("phot.mag").or(by_name.size),
            start_date: table.column_index("time.epoch").or(by_name.start_date),
            ..by_name
        }
    }

    fn write_xml(&self, el: &mut XmlElement) {
        let index = |c: Option<usize>| c.map_or(-1, |i| i as i64);
        el.set_attr("LatColumn", index(self.lat));
        el.set_attr("LngColumn", index(self.lng));
        el.set_attr("AltColumn", index(self.alt));
        el.set_attr("SizeColumn", index(self.size));
        el.set_attr("ColorMapColumn", index(self.color));
        el.set_attr("StartDateColumn", index(self.start_date));
        el.set_attr("EndDateColumn", index(self.end_date));
    }

    fn read_xml(el: &XmlElement) -> ColumnRoles {
        let index = |key: &str| el.attr(key).and_then(|v| v.trim().parse::<usize>().ok());
        ColumnRoles {
            lat: index("LatColumn"),
            lng: index("LngColumn"),
            alt: index("AltColumn"),
            size: index("SizeColumn"),
            color: index("ColorMapColumn"),
            start_date: index("StartDateColumn"),
            end_date: index("EndDateColumn"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AltType {
    Depth,
    #[default]
    Altitude,
    Distance,
}

impl AltType {
    pub fn label(&self) -> &'static str {
        match self {
            AltType::Depth => "Depth",
            AltType::Altitude => "Altitude",
            AltType::Distance => "Distance",
        }
    }

    pub fn from_label(text: &str) -> Option<AltType> {
        [AltType::Depth, AltType::Altitude, AltType::Distance]
            .into_iter()
            .find(|t| t.label() == text.trim())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PointScaleType {
    Linear,
    Log,
    #[default]
    Constant,
}

impl PointScaleType {
    pub fn label(&self) -> &'static str {
        match self {
            PointScaleType::Linear => "Linear",
            PointScaleType::Log => "Log",
            PointScaleType::Constant => "Constant",
        }
    }

    pub fn from_label(text: &str) -> Option<PointScaleType> {
        [PointScaleType::Linear, PointScaleType::Log, PointScaleType::Constant]
            .into_iter()
            .find(|t| t.label() == text.trim())
    }

    fn apply(&self, value: f64) -> f64 {
        match self {
            PointScaleType::Linear => value,
            PointScaleType::Log => value.log10().max(0.0),
            PointScaleType::Constant => 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlotSettings {
    pub roles: ColumnRoles,
    pub marker_scale: MarkerScale,
    pub scale_factor: f64,
    pub alt_units: AltUnit,
    pub alt_type: AltType,
    pub plot_type: PlotType,
    pub point_scale_type: PointScaleType,
    /// Days a time-series point stays visible after its start date.
    pub decay: f64,
    pub time_series: bool,
    pub ra_units_hours: bool,
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            roles: ColumnRoles::default(),
            marker_scale: MarkerScale::Screen,
            scale_factor: 1.0,
            alt_units: AltUnit::Meters,
            alt_type: AltType::Altitude,
            plot_type: PlotType::Gaussian,
            point_scale_type: PointScaleType::Constant,
            decay: 16.0,
            time_series: false,
            ra_units_hours: false,
        }
    }
}

impl PlotSettings {
    fn write_xml(&self, el: &mut XmlElement) {
        self.roles.write_xml(el);
        el.set_attr("MarkerScale", self.marker_scale.label());
        el.set_attr("ScaleFactor", self.scale_factor);
        el.set_attr("AltUnit", self.alt_units.label());
        el.set_attr("AltType", self.alt_type.label());
        el.set_attr("PlotType", self.plot_type.label());
        el.set_attr("PointScaleType", self.point_scale_type.label());
        el.set_attr("Decay", self.decay);
        el.set_attr("TimeSeries", self.time_series);
        el.set_attr("RaUnits", if self.ra_units_hours { "Hours" } else { "Degrees" });
    }

    fn read_xml(el: &XmlElement) -> PlotSettings {
        let d = PlotSettings::default();
        PlotSettings {
            roles: ColumnRoles::read_xml(el),
            marker_scale: el.attr("MarkerScale").and_then(MarkerScale::from_label).unwrap_or(d.marker_scale),
            scale_factor: el.attr_f64("ScaleFactor", d.scale_factor),
            alt_units: el.attr("AltUnit").and_then(AltUnit::from_label).unwrap_or(d.alt_units),
            alt_type: el.attr("AltType").and_then(AltType::from_label).unwrap_or(d.alt_type),
            plot_type: el.attr("PlotType").and_then(PlotType::from_label).unwrap_or(d.plot_type),
            point_scale_type: el
                .attr("PointScaleType")
                .and_then(PointScaleType::from_label)
                .unwrap_or(d.point_scale_type),
            decay: el.attr_f64("Decay", d.decay),
            time_series: el.attr_bool("TimeSeries", d.time_series),
            ra_units_hours: el.attr("RaUnits").is_some_and(|u| u.trim() == "Hours"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct PlotPoint {
    vertex: PointVertex,
    start_jd: Option<f64>,
    end_jd: Option<f64>,
}

fn parse_cell(row: &[String], column: Option<usize>) -> Option<&str> {
    column.and_then(|c| row.get(c)).map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn cell_f64(row: &[String], column: Option<usize>) -> Option<f64> {
    parse_cell(row, column).map(|s| s.parse().unwrap_or(f64::NAN))
}

fn cell_color(row: &[String], column: Option<usize>) -> Option<Color> {
    let text = parse_cell(row, column)?;
    if let Ok(argb) = text.parse::<u32>() {
        let [a, r, g, b] = argb.to_be_bytes();
        return Some(Color::argb(a, r, g, b));
    }
    Color::named(text)
}

fn cell_jd(row: &[String], column: Option<usize>) -> Option<f64> {
    parse_cell(row, column).and_then(parse_xml_date).map(utc_to_julian)
}

fn build_points(
    rows: &[Vec<String>],
    settings: &PlotSettings,
    default_color: Color,
    nominal_radius: f64,
    astronomical: bool,
) -> Vec<PlotPoint> {
    let roles = &settings.roles;
    if roles.lat.is_none() || roles.lng.is_none() {
        return Vec::new();
    }
    let alt_scale = settings.alt_units.to_meters();
    rows.iter()
        .filter_map(|row| {
            let lat = cell_f64(row, roles.lat)?;
            let mut lng = cell_f64(row, roles.lng)?;
            if settings.ra_units_hours {
                lng *= 15.0;
            }
            let radius = if astronomical {
                1.0
            } else {
                let alt = cell_f64(row, roles.alt).unwrap_or(0.0) * alt_scale;
                match settings.alt_type {
                    AltType::Altitude => 1.0 + alt / nominal_radius,
                    AltType::Depth => 1.0 - alt / nominal_radius,
                    AltType::Distance => alt / nominal_radius,
                }
            };
            let size = settings.point_scale_type.apply(cell_f64(row, roles.size).unwrap_or(1.0)) * settings.scale_factor;
            Some(PlotPoint {
                vertex: PointVertex {
                    position: geo_to_3d(lat, lng, radius).cast::<f32>(),
                    size: size as f32,
                    color: cell_color(row, roles.color).unwrap_or(default_color),
                },
                start_jd: cell_jd(row, roles.start_date),
                end_jd: cell_jd(row, roles.end_date),
            })
        })
        .collect()
}

/// Visibility weight of a time-series point at `jd`, or `None` when
/// hidden. Points with no start date are always shown at full weight.
fn time_series_weight(point: &PlotPoint, jd: f64, decay: f64) -> Option<f64> {
    let Some(start) = point.start_jd else {
        return Some(1.0);
    };
    if jd < start {
        return None;
    }
    if let Some(end) = point.end_jd {
        return (jd <= end).then_some(1.0);
    }
    let age = jd - start;
    if decay <= 0.0 {
        return Some(1.0);
    }
    (age < decay).then(|| 1.0 - age / decay)
}

#[derive(Clone, Debug, Default)]
struct PointCache {
    key: Option<(u64, u64, bool)>,
    points: Vec<PlotPoint>,
    vertices: Option<Arc<[PointVertex]>>,
}

impl PointCache {
    fn refresh(
        &mut self,
        common: &LayerCommon,
        rows: &[Vec<String>],
        settings: &PlotSettings,
        nominal_radius: f64,
    ) {
        let key = (common.version(), nominal_radius.to_bits(), common.astronomical);
        if self.key == Some(key) {
            return;
        }
        self.points = build_points(rows, settings, common.color(), nominal_radius, common.astronomical);
        self.vertices = Some(self.points.iter().map(|p| p.vertex).collect());
        self.key = Some(key);
    }

    fn visible(&self, settings: &PlotSettings, jd: f64) -> Arc<[PointVertex]> {
        if !settings.time_series {
            return self.vertices.clone().unwrap_or_else(|| Arc::from(Vec::new()));
        }
        self.points
            .iter()
            .filter_map(|p| {
                let weight = time_series_weight(p, jd, settings.decay)?;
                let mut vertex = p.vertex;
                vertex.color.a = (vertex.color.a as f64 * weight).round() as u8;
                Some(vertex)
            })
            .collect()
    }

    fn clear(&mut self) {
        *self = PointCache::default();
    }
}

fn draw_plot(
    common: &LayerCommon,
    cache: &mut PointCache,
    rows: &[Vec<String>],
    settings: &PlotSettings,
    ctx: &mut RenderContext,
    opacity: f64,
) -> bool {
    cache.refresh(common, rows, settings, ctx.nominal_radius);
    let points = cache.visible(settings, ctx.jd_now);
    if points.is_empty() {
        return false;
    }
    ctx.push(DrawCommand::Points {
        layer: common.id().clone(),
        points,
        style: PointStyle { plot_type: settings.plot_type, marker_scale: settings.marker_scale },
        opacity: opacity * common.opacity(),
        world: ctx.world,
    });
    true
}

fn table_params(common: &LayerCommon, settings: &PlotSettings) -> Vec<f64> {
    let mut params = vec![settings.decay, settings.scale_factor];
    params.extend(common.base_params());
    params
}

fn apply_table_params(common: &mut LayerCommon, settings: &mut PlotSettings, params: &[f64]) {
    if let [decay, scale_factor, base @ ..] = params {
        if base.len() < BASE_PARAM_NAMES.len() {
            return;
        }
        let updated = PlotSettings { decay: *decay, scale_factor: *scale_factor, ..settings.clone() };
        set_field(common, settings, updated);
        common.set_base_params(base);
    }
}

pub struct SpreadSheetLayer {
    common: LayerCommon,
    table: Table,
    settings: PlotSettings,
    cache: PointCache,
}

impl SpreadSheetLayer {
    /// Parses `text` and guesses column roles from its header.
    pub fn new(name: &str, reference_frame: &str, text: &str) -> Self {
        let table = Table::parse_delimited(text);
        let settings = PlotSettings { roles: ColumnRoles::guess(&table.headers), ..Default::default() };
        Self { common: LayerCommon::new(name, reference_frame), table, settings, cache: PointCache::default() }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn set_table_text(&mut self, text: &str) -> bool {
        set_field(&mut self.common, &mut self.table, Table::parse_delimited(text))
    }

    pub fn settings(&self) -> &PlotSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: PlotSettings) -> bool {
        set_field(&mut self.common, &mut self.settings, settings)
    }

    pub fn set_decay(&mut self, decay: f64) -> bool {
        let updated = PlotSettings { decay, ..self.settings.clone() };
        self.set_settings(updated)
    }

    pub fn set_scale_factor(&mut self, scale_factor: f64) -> bool {
        let updated = PlotSettings { scale_factor, ..self.settings.clone() };
        self.set_settings(updated)
    }

    pub fn set_time_series(&mut self, time_series: bool) -> bool {
        let updated = PlotSettings { time_series, ..self.settings.clone() };
        self.set_settings(updated)
    }
}

impl Layer for SpreadSheetLayer {
    fn common(&self) -> &LayerCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut LayerCommon {
        &mut self.common
    }

    fn kind(&self) -> LayerKind {
        LayerKind::SpreadSheet
    }

    fn draw(&mut self, ctx: &mut RenderContext, opacity: f64, _flat: bool) -> bool {
        draw_plot(&self.common, &mut self.cache, &self.table.rows, &self.settings, ctx, opacity)
    }

    fn clean_up(&mut self) {
        self.cache.clear();
    }

    fn get_params(&self) -> Vec<f64> {
        table_params(&self.common, &self.settings)
    }

    fn set_params(&mut self, params: &[f64]) {
        apply_table_params(&mut self.common, &mut self.settings, params);
    }

    fn get_param_names(&self) -> Vec<&'static str> {
        TABLE_PARAM_NAMES.to_vec()
    }

    fn write_layer_properties(&self, el: &mut XmlElement) {
        self.settings.write_xml(el);
        let mut data = XmlElement::new("Table");
        data.text = self.table.to_delimited();
        el.push_child(data);
    }

    fn initialize_from_xml(&mut self, el: &XmlElement) {
        if let Some(data) = el.child("Table") {
            self.set_table_text(&data.text);
        }
        self.set_settings(PlotSettings::read_xml(el));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub struct VoTableLayer {
    common: LayerCommon,
    table: VoTable,
    settings: PlotSettings,
    cache: PointCache,
}

impl VoTableLayer {
    pub fn new(name: &str, reference_frame: &str, table: VoTable) -> Self {
        let settings = PlotSettings { roles: ColumnRoles::guess_votable(&table), ..Default::default() };
        Self { common: LayerCommon::new(name, reference_frame), table, settings, cache: PointCache::default() }
    }

    pub fn table(&self) -> &VoTable {
        &self.table
    }

    pub fn set_table(&mut self, table: VoTable) -> bool {
        set_field(&mut self.common, &mut self.table, table)
    }

    pub fn settings(&self) -> &PlotSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: PlotSettings) -> bool {
        set_field(&mut self.common, &mut self.settings, settings)
    }
}

impl Layer for VoTableLayer {
    fn common(&self) -> &LayerCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut LayerCommon {
        &mut self.common
    }

    fn kind(&self) -> LayerKind {
        LayerKind::VoTable
    }

    fn draw(&mut self, ctx: &mut RenderContext, opacity: f64, _flat: bool) -> bool {
        draw_plot(&self.common, &mut self.cache, &self.table.rows, &self.settings, ctx, opacity)
    }

    fn clean_up(&mut self) {
        self.cache.clear();
    }

    fn get_params(&self) -> Vec<f64> {
        table_params(&self.common, &self.settings)
    }

    fn set_params(&mut self, params: &[f64]) {
        apply_table_params(&mut self.common, &mut self.settings, params);
    }

    fn get_param_names(&self) -> Vec<&'static str> {
        TABLE_PARAM_NAMES.to_vec()
    }

    fn write_layer_properties(&self, el: &mut XmlElement) {
        self.settings.write_xml(el);
        let mut data = XmlElement::new("VoTable");
        for c in &self.table.columns {
            data.push_child(
                XmlElement::new("Column")
                    .with_attr("Name", &c.name)
                    .with_attr("Ucd", &c.ucd)
                    .with_attr("Unit", &c.unit),
            );
        }
        let rows = Table { delimiter: Delimiter::Tab, headers: self.table.headers(), rows: self.table.rows.clone() };
        let mut body = XmlElement::new("Rows");
        body.text = rows.to_delimited();
        data.push_child(body);
        el.push_child(data);
    }

    fn initialize_from_xml(&mut self, el: &XmlElement) {
        if let Some(data) = el.child("VoTable") {
            let columns = data
                .children_named("Column")
                .map(|c| VoColumn { name: c.attr_string("Name"), ucd: c.attr_string("Ucd"), unit: c.attr_string("Unit") })
                .collect();
            let rows = data.child("Rows").map(|r| Table::parse_delimited(&r.text).rows).unwrap_or_default();
            self.set_table(VoTable { columns, rows });
        }
        self.set_settings(PlotSettings::read_xml(el));
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

    const QUAKES: &str = "Lat\tLng\tDepth\tMag\tTime\n\
                          10\t20\t5\t4.5\t1/2/2020 12:00:00 AM\n\
                          -30\t100\t10\t6.0\t1/10/2020 12:00:00 AM\n";

    fn jd(text: &str) -> f64 {
        utc_to_julian(parse_xml_date(text).unwrap())
    }

    #[test]
    fn test_delimiter_detection_and_quoting() {
        let t = Table::parse_delimited("name,lat,lng\n\"Paris, FR\",48.8,2.3\n");
        assert_eq!(t.delimiter, Delimiter::Comma);
        assert_eq!(t.headers, vec!["name", "lat", "lng"]);
        assert_eq!(t.rows[0][0], "Paris, FR");
        let again = Table::parse_delimited(&t.to_delimited());
        assert_eq!(again, t);
    }

    #[test]
    fn test_quoted_fields_span_lines() {
        let text = "name,note\r\n\"Mauna Kea\",\"summit\nsite\"\r\n\r\n\"say \"\"hi\"\"\",x\n";
        let t = Table::parse_delimited(text);
        assert_eq!(t.headers, vec!["name", "note"]);
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[0], vec!["Mauna Kea", "summit\nsite"]);
        assert_eq!(t.rows[1][0], "say \"hi\"");

        let again = Table::parse_delimited(&t.to_delimited());
        assert_eq!(again, t);
    }

    #[test]
    fn test_ragged_rows_are_kept() {
        let t = Table::parse_delimited("a\tb\tc\n1\t2\n1\t2\t3\t4\n");
        assert_eq!(t.delimiter, Delimiter::Tab);
        assert_eq!(t.rows[0].len(), 2);
        assert_eq!(t.rows[1].len(), 4);
        assert_eq!(Table::parse_delimited("  \n"), Table::default());
    }

    #[test]
    fn test_role_guessing() {
        let t = Table::parse_delimited(QUAKES);
        let roles = ColumnRoles::guess(&t.headers);
        assert_eq!(roles.lat, Some(0));
        assert_eq!(roles.lng, Some(1));
        assert_eq!(roles.alt, Some(2));
        assert_eq!(roles.size, Some(3));
        assert_eq!(roles.start_date, Some(4));
        assert_eq!(roles.color, None);
    }

    #[test]
    fn test_votable_roles_prefer_ucd() {
        let table = VoTable {
            columns: vec![
                VoColumn { name: "alpha".into(), ucd: "pos.eq.ra;meta.main".into(), unit: "deg".into() },
                VoColumn { name: "delta".into(), ucd: "pos.eq.dec;meta.main".into(), unit: "deg".into() },
            ],
            rows: vec![vec!["10".into(), "20".into()]],
        };
        let roles = ColumnRoles::guess_votable(&table);
        assert_eq!(roles.lng, Some(0));
        assert_eq!(roles.lat, Some(1));
    }

    #[test]
    fn test_points_cached_per_version() {
        let mut l = SpreadSheetLayer::new("quakes", "Earth", QUAKES);
        let mut ctx = RenderContext::new(jd("1/5/2020"));
        assert!(l.draw(&mut ctx, 1.0, false));
        assert!(l.draw(&mut ctx, 1.0, false));
        let (a, b) = match (&ctx.display_list[0], &ctx.display_list[1]) {
            (DrawCommand::Points { points: a, .. }, DrawCommand::Points { points: b, .. }) => (a.clone(), b.clone()),
            _ => panic!("expected point commands"),
        };
        assert_eq!(a.len(), 2);
        assert!(Arc::ptr_eq(&a, &b));

        l.set_scale_factor(2.0);
        l.draw(&mut ctx, 1.0, false);
        match &ctx.display_list[2] {
            DrawCommand::Points { points, .. } => assert!(!Arc::ptr_eq(points, &a)),
            _ => panic!("expected point commands"),
        }
    }

    #[test]
    fn test_depth_pushes_points_inward() {
        let mut l = SpreadSheetLayer::new("quakes", "Earth", QUAKES);
        let settings = PlotSettings { alt_type: AltType::Depth, alt_units: AltUnit::Kilometers, ..l.settings().clone() };
        l.set_settings(settings);
        let mut ctx = RenderContext::new(0.0);
        ctx.nominal_radius = 1_000_000.0;
        l.draw(&mut ctx, 1.0, false);
        match &ctx.display_list[0] {
            DrawCommand::Points { points, .. } => {
                assert_relative_eq!(points[0].position.norm(), 0.995, epsilon = 1e-5);
                assert_relative_eq!(points[1].position.norm(), 0.990, epsilon = 1e-5);
            }
            _ => panic!("expected point commands"),
        }
    }

    #[test]
    fn test_time_series_uses_decay() {
        let mut l = SpreadSheetLayer::new("quakes", "Earth", QUAKES);
        l.set_time_series(true);
        l.set_decay(4.0);

        let mut ctx = RenderContext::new(jd("1/4/2020"));
        l.draw(&mut ctx, 1.0, false);
        match &ctx.display_list[0] {
            DrawCommand::Points { points, .. } => {
                assert_eq!(points.len(), 1);
                assert_eq!(points[0].color.a, 128);
            }
            _ => panic!("expected point commands"),
        }

        ctx.jd_now = jd("1/7/2020");
        assert!(!l.draw(&mut ctx, 1.0, false));
    }

    #[test]
    fn test_ra_hours_scale_longitude() {
        let mut l = VoTableLayer::new(
            "stars",
            "Sky",
            VoTable {
                columns: vec![
                    VoColumn { name: "ra".into(), ucd: "pos.eq.ra".into(), unit: "h".into() },
                    VoColumn { name: "dec".into(), ucd: "pos.eq.dec".into(), unit: "deg".into() },
                ],
                rows: vec![vec!["6".into(), "0".into()]],
            },
        );
        let settings = PlotSettings { ra_units_hours: true, ..l.settings().clone() };
        l.set_settings(settings);
        l.common_mut().astronomical = true;
        let mut ctx = RenderContext::new(0.0);
        l.draw(&mut ctx, 1.0, false);
        match &ctx.display_list[0] {
            DrawCommand::Points { points, .. } => {
                let expected = geo_to_3d(0.0, 90.0, 1.0).cast::<f32>();
                assert_relative_eq!((points[0].position - expected).norm(), 0.0, epsilon = 1e-6);
            }
            _ => panic!("expected point commands"),
        }
    }

    #[test]
    fn test_params_layout() {
        let mut l = SpreadSheetLayer::new("quakes", "Earth", QUAKES);
        assert_eq!(l.get_param_names().len(), 7);
        let v = l.version();
        l.set_params(&[3.0, 0.5, 1.0, 0.0, 0.0, 1.0, 0.75]);
        assert!(l.version() > v);
        assert_eq!(l.settings().decay, 3.0);
        assert_eq!(l.settings().scale_factor, 0.5);
        assert_eq!(l.get_params(), vec![3.0, 0.5, 1.0, 0.0, 0.0, 1.0, 0.75]);
        let v = l.version();
        l.set_params(&l.get_params());
        assert_eq!(l.version(), v);
    }

    #[test]
    fn test_xml_properties_round_trip() {
        let mut l = SpreadSheetLayer::new("quakes", "Earth", QUAKES);
        l.set_time_series(true);
        let mut el = XmlElement::new("Layer");
        l.write_layer_properties(&mut el);

        let mut back = SpreadSheetLayer::new("quakes", "Earth", "");
        back.initialize_from_xml(&el);
        assert_eq!(back.settings(), l.settings());
        assert_eq!(back.table().rows, l.table().rows);
    }
}
