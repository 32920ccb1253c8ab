use std::collections::HashMap;

use log::trace;

use crate::errors::{Error, Result};

use super::osm::{Node, OsmId, Relation, Way};
use super::OsmMapData;

/// Ordered node ids, accumulated from one or more ways.
pub type Chain = Vec<OsmId>;

/// Chains a relation's ways were stitched into. Rings are stored without their
/// closing node.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StitchedWays {
    pub rings: Vec<Chain>,
    pub lines: Vec<Chain>,
    pub points: Vec<OsmId>,
}

impl StitchedWays {
    /// Classifies a finished chain. The chain is moved in, so nothing that keeps
    /// accumulating afterwards can reach an emitted geometry.
    fn flush(&mut self, mut chain: Chain) {
        let closed = chain.len() > 1 && chain.first() == chain.last();
        if chain.len() == 1 {
            self.points.append(&mut chain);
        } else if closed {
            chain.pop();
            trace!(node_count = chain.len(); "Flushing ring");
            self.rings.push(chain);
        } else if !chain.is_empty() {
            trace!(node_count = chain.len(); "Flushing line");
            self.lines.push(chain);
        }
    }
}

/// Stitches ways, in the given order, into rings, lines and points.
///
/// One chain is grown at a time. A way whose first node is the chain's last node is
/// appended; a way whose last node is the chain's last node is appended backwards.
/// Any other way ends the chain and starts a new one. A way starting a chain is
/// reversed up front when its first node touches either end of the following way,
/// so that way can continue it.
///
/// Only the immediately following way is looked at when seeding. Ways that would
/// only connect after skipping one in between end up in separate chains.
///
/// Ways without nodes contribute nothing and do not interrupt the chain.
pub fn stitch_ways(way_ids: &[OsmId], ways: &HashMap<OsmId, Way>) -> Result<StitchedWays> {
    let mut stitched = StitchedWays::default();
    let mut chain: Chain = Vec::new();

    for (index, way_id) in way_ids.iter().enumerate() {
        let mut way_nodes = lookup_way(ways, *way_id)?.nodes.clone();
        if way_nodes.is_empty() {
            trace!(way_id = *way_id; "Skipping way without nodes");
            continue;
        }

        if let Some(&tail) = chain.last() {
            if way_nodes.first() == Some(&tail) {
                way_nodes.remove(0);
            } else if way_nodes.last() == Some(&tail) {
                way_nodes.pop();
                way_nodes.reverse();
            } else {
                trace!(way_id = *way_id; "Way does not continue the chain");
                stitched.flush(std::mem::take(&mut chain));
            }
        }

        if chain.is_empty() {
            if let Some(next_id) = way_ids.get(index + 1) {
                let next = lookup_way(ways, *next_id)?;
                let head = way_nodes.first();
                if head.is_some() && (next.nodes.first() == head || next.nodes.last() == head) {
                    trace!(way_id = *way_id, next_way_id = *next_id; "Reversing way to meet the next one");
                    way_nodes.reverse();
                }
            }
        }

        chain.extend(way_nodes);
    }
    stitched.flush(chain);

    Ok(stitched)
}

fn lookup_way(ways: &HashMap<OsmId, Way>, id: OsmId) -> Result<&Way> {
    ways.get(&id).ok_or_else(|| Error::unknown_way(id))
}

/// Everything drawn for one relation: stitched rings and lines, plus the relation's
/// own node members followed by ways that collapsed to a single node.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelationGeometry {
    pub relation_id: OsmId,
    pub areas: Vec<Chain>,
    pub lines: Vec<Chain>,
    pub points: Vec<OsmId>,
}

impl RelationGeometry {
    /// Fails if a member way is missing, or if any node the geometry refers to is
    /// missing, so nothing partial ever reaches the renderer.
    pub fn assemble(relation: &Relation, data: &OsmMapData) -> Result<Self> {
        let stitched = stitch_ways(&relation.ways, &data.ways)?;

        let mut points = relation.nodes.clone();
        points.extend(stitched.points);

        let geometry = RelationGeometry {
            relation_id: relation.id,
            areas: stitched.rings,
            lines: stitched.lines,
            points,
        };
        geometry.check_nodes(&data.nodes)?;

        Ok(geometry)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = OsmId> + '_ {
        self.areas.iter()
            .chain(self.lines.iter())
            .flatten()
            .chain(self.points.iter())
            .copied()
    }

    fn check_nodes(&self, nodes: &HashMap<OsmId, Node>) -> Result<()> {
        match self.node_ids().find(|id| !nodes.contains_key(id)) {
            Some(missing) => Err(Error::unknown_node(missing)),
            None => Ok(()),
        }
    }
}
