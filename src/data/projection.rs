use std::collections::HashMap;

use crate::errors::{Error, Result};

use super::osm::{Node, OsmId};

/// Pixels per unit, applied on top of the degree scales below.
pub const SVG_FACTOR: f64 = 100.0;

// These correction numbers are taken from <https://www.kompf.de/gps/distcalc.html>,
// roughly kilometres per degree at a mid-European latitude.
pub const LON_SCALE: f64 = 71.5;
pub const LAT_SCALE: f64 = 111.3;

/// Extent of every node in the dataset, not only the ones a relation draws.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Result<Self> {
        let mut nodes = nodes.into_iter();
        let first = nodes.next().ok_or_else(Error::no_nodes)?;

        let init = BoundingBox {
            min_lat: first.lat,
            max_lat: first.lat,
            min_lon: first.lon,
            max_lon: first.lon,
        };
        Ok(nodes.fold(init, |bbox, node| BoundingBox {
            min_lat: bbox.min_lat.min(node.lat),
            max_lat: bbox.max_lat.max(node.lat),
            min_lon: bbox.min_lon.min(node.lon),
            max_lon: bbox.max_lon.max(node.lon),
        }))
    }
}

/// Maps coordinates into the canvas: x grows eastwards from the westernmost node,
/// y grows southwards from the northernmost one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    bbox: BoundingBox,
}

impl Projection {
    pub fn new(bbox: BoundingBox) -> Self {
        Projection { bbox }
    }

    pub fn x(&self, lon: f64) -> f64 {
        round3((lon - self.bbox.min_lon) * SVG_FACTOR * LON_SCALE)
    }

    pub fn y(&self, lat: f64) -> f64 {
        round3((self.bbox.max_lat - lat) * SVG_FACTOR * LAT_SCALE)
    }

    pub fn project(&self, node: &Node) -> (f64, f64) {
        (self.x(node.lon), self.y(node.lat))
    }

    pub fn project_id(&self, nodes: &HashMap<OsmId, Node>, id: OsmId) -> Result<(f64, f64)> {
        let node = nodes.get(&id).ok_or_else(|| Error::unknown_node(id))?;
        Ok(self.project(node))
    }

    pub fn canvas_width(&self) -> u64 {
        canvas_extent(SVG_FACTOR * (self.bbox.max_lon - self.bbox.min_lon) * LON_SCALE)
    }

    pub fn canvas_height(&self) -> u64 {
        canvas_extent(SVG_FACTOR * (self.bbox.max_lat - self.bbox.min_lat) * LAT_SCALE)
    }
}

/// Rounds half away from zero to three decimal places.
fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

// The extent is never negative, the bounding box guarantees max >= min.
fn canvas_extent(value: f64) -> u64 {
    value.ceil() as u64
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::errors::ErrorKind;

    fn node(id: OsmId, lat: f64, lon: f64) -> Node {
        Node { id, lat, lon }
    }

    fn sample_nodes() -> Vec<Node> {
        vec![node(1, 1.0, 1.0), node(2, 1.0, 2.0), node(3, 2.0, 2.0)]
    }

    #[test]
    fn bounding_box_covers_all_nodes() {
        let bbox = BoundingBox::from_nodes(&sample_nodes()).unwrap();

        assert_eq!(bbox, BoundingBox { min_lat: 1.0, max_lat: 2.0, min_lon: 1.0, max_lon: 2.0 });
    }

    #[test]
    fn bounding_box_of_single_node_is_degenerate() {
        let bbox = BoundingBox::from_nodes(&[node(1, 52.5, 13.4)]).unwrap();
        let projection = Projection::new(bbox);

        assert_eq!(projection.canvas_width(), 0);
        assert_eq!(projection.canvas_height(), 0);
        assert_eq!(projection.project(&node(1, 52.5, 13.4)), (0.0, 0.0));
    }

    #[test]
    fn no_nodes_is_fatal() {
        let err = BoundingBox::from_nodes(&Vec::<Node>::new()).unwrap_err();

        assert_eq!(err.kind, ErrorKind::NoNodesAvailable);
    }

    #[test]
    fn projects_with_flipped_latitude() {
        let projection = Projection::new(BoundingBox::from_nodes(&sample_nodes()).unwrap());

        assert_eq!(projection.project(&node(1, 1.0, 1.0)), (0.0, 11130.0));
        assert_eq!(projection.project(&node(2, 1.0, 2.0)), (7150.0, 11130.0));
        assert_eq!(projection.project(&node(3, 2.0, 2.0)), (7150.0, 0.0));
        assert_eq!(projection.canvas_width(), 7150);
        assert_eq!(projection.canvas_height(), 11130);
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(0.000_001, 0.007)]
    #[case(0.000_000_1, 0.001)]
    #[case(0.000_000_01, 0.0)]
    fn x_is_rounded_to_three_decimals(#[case] offset: f64, #[case] expected: f64) {
        let bbox = BoundingBox { min_lat: 0.0, max_lat: 1.0, min_lon: 0.0, max_lon: 1.0 };

        assert_eq!(Projection::new(bbox).x(offset), expected);
    }

    #[test]
    fn canvas_rounds_up() {
        let bbox = BoundingBox { min_lat: 0.0, max_lat: 0.000_01, min_lon: 0.0, max_lon: 0.000_01 };
        let projection = Projection::new(bbox);

        assert_eq!(projection.canvas_width(), 1);
        assert_eq!(projection.canvas_height(), 1);
    }

    #[test]
    fn projected_nodes_stay_on_canvas_and_keep_their_order() {
        let nodes = vec![
            node(1, 48.137, 11.575),
            node(2, 48.1412, 11.5801),
            node(3, 48.139, 11.5611),
            node(4, 48.1301, 11.59),
            node(5, 48.1505, 11.5522),
        ];
        let projection = Projection::new(BoundingBox::from_nodes(&nodes).unwrap());
        let width = projection.canvas_width() as f64;
        let height = projection.canvas_height() as f64;

        for node in &nodes {
            let (x, y) = projection.project(node);
            assert!((0.0..=width).contains(&x), "x {} outside 0..={}", x, width);
            assert!((0.0..=height).contains(&y), "y {} outside 0..={}", y, height);
        }

        let mut by_lon: Vec<&Node> = nodes.iter().collect();
        by_lon.sort_by(|a, b| a.lon.total_cmp(&b.lon));
        let xs: Vec<f64> = by_lon.iter().map(|node| projection.x(node.lon)).collect();
        assert!(xs.windows(2).all(|pair| pair[0] <= pair[1]));

        let mut by_lat: Vec<&Node> = nodes.iter().collect();
        by_lat.sort_by(|a, b| a.lat.total_cmp(&b.lat));
        let ys: Vec<f64> = by_lat.iter().map(|node| projection.y(node.lat)).collect();
        assert!(ys.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[test]
    fn unknown_node_cannot_be_projected() {
        let projection = Projection::new(BoundingBox::from_nodes(&sample_nodes()).unwrap());

        let err = projection.project_id(&HashMap::new(), 9).unwrap_err();

        assert_eq!(err.kind, ErrorKind::UnknownNodeReference(9));
    }
}
