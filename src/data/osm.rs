pub type OsmId = i64;

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq)]
pub struct Node {
    pub id: OsmId,
    pub lon: f64,
    pub lat: f64,
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Way {
    pub id: OsmId,
    pub nodes: Vec<OsmId>,
}

/// A relation's members, split by type. Both lists keep member order; for ways that
/// order is the hint used to stitch them together.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Relation {
    pub id: OsmId,
    pub ways: Vec<OsmId>,
    pub nodes: Vec<OsmId>,
}
