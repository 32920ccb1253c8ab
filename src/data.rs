use std::collections::HashMap;

use self::osm::{Node, OsmId, Relation, Way};

pub mod geometry;
pub mod osm;
pub mod projection;

/// Map data as defined in the .osm file. Tags and metadata are discarded; only what
/// is needed to draw relations is kept.
///
/// Relations stay in document order, since that is the order they are drawn in.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone, PartialEq)]
pub struct OsmMapData {
    pub nodes: HashMap<OsmId, Node>,
    pub ways: HashMap<OsmId, Way>,
    pub relations: Vec<Relation>,
}
