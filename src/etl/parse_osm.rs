use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::{self, FromStr};

use log::{debug, info};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use xz::bufread::XzDecoder;

use crate::data::osm::{Node, OsmId, Relation, Way};
use crate::data::OsmMapData;
use crate::errors::{Error, Result};

use super::{is_up_to_date, is_xz_file, remove_if_exists, Etl};

pub const ETL_NAME: &str = "parse_osm";
pub const OUTPUT_FILE_NAME: &str = "osm_elements.rkyv";

enum ParserState {
    Top,
    Way(Way),
    Relation(Relation),
}

pub struct ParseOsmEtl {
    xml_path: PathBuf,
}

impl ParseOsmEtl {
    pub fn new(xml_path: &Path) -> ParseOsmEtl {
        ParseOsmEtl {
            xml_path: xml_path.to_path_buf(),
        }
    }

    fn output_path(dir: &Path) -> PathBuf {
        dir.join(OUTPUT_FILE_NAME)
    }

    fn create_osm_reader(&self) -> Result<Reader<Box<dyn BufRead>>> {
        let file = fs::File::open(&self.xml_path)?;
        let file_reader = BufReader::new(file);
        let source: Box<dyn BufRead> = if is_xz_file(&self.xml_path) {
            Box::new(BufReader::new(XzDecoder::new(file_reader)))
        } else {
            Box::new(file_reader)
        };
        let mut reader = Reader::from_reader(source);
        reader.trim_text(true);

        Ok(reader)
    }
}

/// Reads nodes, ways and relations from OSM XML. Tags, metadata and anything else in
/// the document are skipped.
pub fn parse_osm<R: BufRead>(mut reader: Reader<R>) -> Result<OsmMapData> {
    // `<nd ref="1"/>` and `<nd ref="1"></nd>` both arrive as Start followed by End.
    reader.expand_empty_elements(true);
    let mut buf = Vec::new();
    let mut data = OsmMapData::default();
    let mut state = ParserState::Top;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => match e.name().as_ref() {
                b"node" => insert_node(&mut data, &e)?,
                b"way" => state = ParserState::Way(Way {
                    id: required_attribute(&e, b"id")?,
                    nodes: Vec::new(),
                }),
                b"relation" => state = ParserState::Relation(Relation {
                    id: required_attribute(&e, b"id")?,
                    ..Relation::default()
                }),
                b"nd" => {
                    if let ParserState::Way(way) = &mut state {
                        way.nodes.push(required_attribute(&e, b"ref")?);
                    }
                },
                b"member" => {
                    if let ParserState::Relation(relation) = &mut state {
                        push_member(relation, &e)?;
                    }
                },
                _ => (),
            },
            Event::End(e) => match (e.name().as_ref(), std::mem::replace(&mut state, ParserState::Top)) {
                (b"way", ParserState::Way(way)) => {
                    data.ways.insert(way.id, way);
                },
                (b"relation", ParserState::Relation(relation)) => data.relations.push(relation),
                (_, previous) => state = previous,
            },
            // Declarations, notes, comments and the like carry nothing we draw.
            _ => (),
        }
        buf.clear();
    }

    info!(
        node_count = data.nodes.len(),
        way_count = data.ways.len(),
        relation_count = data.relations.len();
        "Parsed OSM data"
    );
    Ok(data)
}

fn insert_node(data: &mut OsmMapData, e: &BytesStart) -> Result<()> {
    let node = Node {
        id: required_attribute(e, b"id")?,
        lat: required_attribute(e, b"lat")?,
        lon: required_attribute(e, b"lon")?,
    };
    if !node.lat.is_finite() || !node.lon.is_finite() {
        return Err(format!("Node {} has non-finite coordinates", node.id).into());
    }
    data.nodes.insert(node.id, node);
    Ok(())
}

fn push_member(relation: &mut Relation, e: &BytesStart) -> Result<()> {
    let member_type = attribute(e, b"type")?
        .ok_or_else(|| missing_attribute(e, b"type"))?;
    let reference: OsmId = required_attribute(e, b"ref")?;
    match member_type.as_str() {
        "way" => relation.ways.push(reference),
        "node" => relation.nodes.push(reference),
        _ => debug!(
            relation_id = relation.id,
            member_type = member_type.as_str(),
            member_id = reference;
            "Skipping relation member"
        ),
    }
    Ok(())
}

fn attribute(e: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    for attribute_res in e.attributes() {
        let attribute = attribute_res?;
        if attribute.key.as_ref() == key {
            return Ok(Some(str::from_utf8(&attribute.value)?.to_string()));
        }
    }
    Ok(None)
}

fn required_attribute<T>(e: &BytesStart, key: &[u8]) -> Result<T>
where
    T: FromStr,
    Error: From<T::Err>,
{
    let value = attribute(e, key)?.ok_or_else(|| missing_attribute(e, key))?;
    Ok(value.trim().parse()?)
}

fn missing_attribute(e: &BytesStart, key: &[u8]) -> Error {
    format!(
        "<{}> is missing the '{}' attribute",
        String::from_utf8_lossy(e.name().as_ref()),
        String::from_utf8_lossy(key),
    ).into()
}

/// Loads what `ParseOsmEtl` cached in `dir`.
pub fn read_cache(dir: &Path) -> Result<OsmMapData> {
    let mut input_file = fs::File::open(ParseOsmEtl::output_path(dir))?;
    let mut bytes = rkyv::AlignedVec::new();
    bytes.extend_from_reader(&mut input_file)?;

    // SAFETY: the cache is only ever written by `ParseOsmEtl::load`, from the same type.
    unsafe { rkyv::from_bytes_unchecked::<OsmMapData>(&bytes) }
        .map_err(|err| format!("Could not deserialize OSM element cache: {:?}", err).into())
}

impl Etl for ParseOsmEtl {
    type Input = Reader<Box<dyn BufRead>>;
    type Output = OsmMapData;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        is_up_to_date(&Self::output_path(dir), &self.xml_path)
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        remove_if_exists(&Self::output_path(dir))
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        let path = self.xml_path.display().to_string();
        info!(path = path.as_str(); "Loading data");
        self.create_osm_reader()
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        parse_osm(input)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        let bytes = rkyv::to_bytes::<_, 256>(&output)
            .map_err(|err| format!("Could not serialize OSM elements: {:?}", err))?;
        fs::create_dir_all(dir)?;
        let mut output_file = fs::File::create(Self::output_path(dir))?;
        output_file.write_all(&bytes)?;
        Ok(())
    }
}
