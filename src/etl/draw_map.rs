use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};

use crate::{
    data::{
        geometry::RelationGeometry,
        osm::OsmId,
        projection::{BoundingBox, Projection},
        OsmMapData,
    },
    errors::Result,
};

use super::{is_up_to_date, parse_osm, remove_if_exists, write_file, Etl};

pub const ETL_NAME: &str = "draw_map";
/// The style the current SVG was drawn with.
pub const STYLE_FILE_NAME: &str = "svg_style.json";

const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

use serialize_color::deserialize;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SvgStyle {
    #[serde(deserialize_with = "deserialize")]
    pub area_fill: String,
    pub area_fill_opacity: f64,

    #[serde(deserialize_with = "deserialize")]
    pub area_stroke: String,
    pub area_stroke_width: f64,

    #[serde(deserialize_with = "deserialize")]
    pub line_stroke: String,
    pub line_stroke_width: f64,

    pub point_radius: f64,

    #[serde(deserialize_with = "deserialize")]
    pub point_fill: String,

    #[serde(deserialize_with = "deserialize")]
    pub point_stroke: String,
    pub point_stroke_width: f64,
}

impl Default for SvgStyle {
    fn default() -> Self {
        SvgStyle {
            area_fill: "#ccc".to_string(),
            area_fill_opacity: 0.6,
            area_stroke: "#999".to_string(),
            area_stroke_width: 2.0,
            line_stroke: "#999".to_string(),
            line_stroke_width: 2.0,
            point_radius: 10.0,
            point_fill: "#999".to_string(),
            point_stroke: "#666".to_string(),
            point_stroke_width: 2.0,
        }
    }
}

mod serialize_color {
    use serde::{de, Deserializer};
    use serde::de::Visitor;


    struct ColorVisitor;

    impl<'de> Visitor<'de> for ColorVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(formatter, "a hex colour like '#999', '#c0c0c0' or '#c0c0c080'")
        }

        fn visit_str<E>(self, string: &str) -> Result<Self::Value, E> where E: de::Error {
            let digits = string.strip_prefix('#')
                .ok_or_else(|| E::invalid_value(de::Unexpected::Str(string), &self))?;
            if ![3, 4, 6, 8].contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(E::invalid_value(de::Unexpected::Str(string), &self))
            }
            Ok(string.to_string())
        }
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<String, D::Error>
        where D: Deserializer<'de> {
        deserializer.deserialize_str(ColorVisitor)
    }
}

/// Floats are written the way they were always written to these files: shortest form
/// that reads back the same, integral values keeping a trailing `.0`.
fn format_coord(value: f64) -> String {
    format!("{:?}", value)
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

/// Draws every relation of the dataset into one SVG document.
///
/// Nothing is produced unless every relation converts cleanly.
pub fn render_svg(data: &OsmMapData, style: &SvgStyle) -> Result<Vec<u8>> {
    let projection = Projection::new(BoundingBox::from_nodes(data.nodes.values())?);

    let geometries = data.relations.iter()
        .map(|relation| {
            info!(
                relation_id = relation.id,
                way_count = relation.ways.len(),
                node_count = relation.nodes.len();
                "Processing relation"
            );
            RelationGeometry::assemble(relation, data)
        })
        .collect::<Result<Vec<_>>>()?;
    if geometries.is_empty() {
        warn!("No relations found, the drawing will be empty");
    }

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let height = projection.canvas_height().to_string();
    let width = projection.canvas_width().to_string();
    writer.write_event(Event::Start(BytesStart::new("svg").with_attributes([
        ("xmlns", SVG_NAMESPACE),
        ("version", "1.1"),
        ("height", height.as_str()),
        ("width", width.as_str()),
    ])))?;

    let canvas = Canvas { data, projection: &projection, style };
    for geometry in &geometries {
        canvas.draw_relation(&mut writer, geometry)?;
    }

    writer.write_event(Event::End(BytesEnd::new("svg")))?;
    Ok(writer.into_inner())
}

struct Canvas<'a> {
    data: &'a OsmMapData,
    projection: &'a Projection,
    style: &'a SvgStyle,
}

impl Canvas<'_> {
    fn draw_relation(&self, writer: &mut Writer<Vec<u8>>, geometry: &RelationGeometry) -> Result<()> {
        debug!(
            relation_id = geometry.relation_id,
            area_count = geometry.areas.len(),
            line_count = geometry.lines.len(),
            point_count = geometry.points.len();
            "Drawing relation"
        );
        let relation_id = geometry.relation_id;
        let group_id = format!("osm-group-{}", relation_id);
        writer.write_event(Event::Start(BytesStart::new("g").with_attributes([("id", group_id.as_str())])))?;

        write_text_element(writer, "title", &format!("Relation {} from OpenStreetMap", relation_id))?;
        let way_count = self.data.ways.len();
        let node_count = self.data.nodes.len();
        write_text_element(writer, "desc", &format!(
            "Relation {} from OpenStreetMap, consisting of: {} way{}, {} node{}",
            relation_id, way_count, plural(way_count), node_count, plural(node_count),
        ))?;

        if !geometry.areas.is_empty() {
            let path_def = geometry.areas.iter()
                .map(|ring| self.path_def(ring).map(|def| def + "Z"))
                .collect::<Result<Vec<_>>>()?
                .join(" ");
            let path_id = format!("osm-relation-{}", relation_id);
            let opacity = self.style.area_fill_opacity.to_string();
            let stroke_width = self.style.area_stroke_width.to_string();
            writer.write_event(Event::Empty(BytesStart::new("path").with_attributes([
                ("id", path_id.as_str()),
                ("d", path_def.as_str()),
                ("fill", self.style.area_fill.as_str()),
                ("fill-opacity", opacity.as_str()),
                ("stroke", self.style.area_stroke.as_str()),
                ("stroke-width", stroke_width.as_str()),
            ])))?;
        }

        let line_stroke_width = self.style.line_stroke_width.to_string();
        for line in &geometry.lines {
            let path_def = self.path_def(line)?;
            writer.write_event(Event::Empty(BytesStart::new("path").with_attributes([
                ("d", path_def.as_str()),
                ("fill", "none"),
                ("stroke", self.style.line_stroke.as_str()),
                ("stroke-width", line_stroke_width.as_str()),
            ])))?;
        }

        for node_id in &geometry.points {
            self.draw_point(writer, *node_id)?;
        }

        writer.write_event(Event::End(BytesEnd::new("g")))?;
        Ok(())
    }

    fn draw_point(&self, writer: &mut Writer<Vec<u8>>, node_id: OsmId) -> Result<()> {
        let (x, y) = self.projection.project_id(&self.data.nodes, node_id)?;
        let circle_id = format!("osm-node-{}", node_id);
        let cx = format_coord(x);
        let cy = format_coord(y);
        let radius = self.style.point_radius.to_string();
        let stroke_width = self.style.point_stroke_width.to_string();
        writer.write_event(Event::Start(BytesStart::new("circle").with_attributes([
            ("id", circle_id.as_str()),
            ("cx", cx.as_str()),
            ("cy", cy.as_str()),
            ("r", radius.as_str()),
            ("fill", self.style.point_fill.as_str()),
            ("stroke", self.style.point_stroke.as_str()),
            ("stroke-width", stroke_width.as_str()),
        ])))?;
        write_text_element(writer, "title", &format!("Node {} from OpenStreetMap", node_id))?;
        writer.write_event(Event::End(BytesEnd::new("circle")))?;
        Ok(())
    }

    /// `Mx,y Lx,y Lx,y`, without closing the path.
    fn path_def(&self, chain: &[OsmId]) -> Result<String> {
        let mut path_def = String::new();
        for (index, node_id) in chain.iter().enumerate() {
            let (x, y) = self.projection.project_id(&self.data.nodes, *node_id)?;
            let command = if index == 0 { "M" } else { " L" };
            // Writing into a String cannot fail.
            let _ = write!(path_def, "{}{},{}", command, format_coord(x), format_coord(y));
        }
        Ok(path_def)
    }
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

pub struct DrawMapEtl<'a> {
    svg_path: PathBuf,
    style: &'a SvgStyle,
}

impl<'a> DrawMapEtl<'a> {
    pub fn new(svg_path: &Path, style: &'a SvgStyle) -> Self {
        DrawMapEtl {
            svg_path: svg_path.to_path_buf(),
            style,
        }
    }
}

impl Etl for DrawMapEtl<'_> {
    type Input = OsmMapData;
    type Output = Vec<u8>;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        let style_path = dir.join(STYLE_FILE_NAME);
        if !is_up_to_date(&self.svg_path, &dir.join(parse_osm::OUTPUT_FILE_NAME))? || !style_path.try_exists()? {
            return Ok(false);
        }
        let drawn_with = serde_json::from_reader::<_, SvgStyle>(fs::File::open(style_path)?);
        Ok(drawn_with.is_ok_and(|drawn_with| drawn_with == *self.style))
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        remove_if_exists(&self.svg_path)?;
        remove_if_exists(&dir.join(STYLE_FILE_NAME))
    }

    fn extract(&mut self, dir: &Path) -> Result<Self::Input> {
        parse_osm::read_cache(dir)
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        render_svg(&input, self.style)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        write_file(&self.svg_path, &output)?;
        write_file(&dir.join(STYLE_FILE_NAME), &serde_json::to_vec_pretty(self.style)?)?;
        let path = self.svg_path.display().to_string();
        info!(path = path.as_str(); "SVG file written");
        Ok(())
    }
}
