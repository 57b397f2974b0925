//! TopoJSON decoding into `geo` geometries.
//!
//! Only polygonal geometries are converted. Arcs are delta-decoded when
//! the topology carries a quantization transform.

use anyhow::{anyhow, Context, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct Topology {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub transform: Option<Transform>,
    pub arcs: Vec<Vec<Vec<f64>>>,
    pub objects: Map<String, Value>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct Transform {
    pub scale: [f64; 2],
    pub translate: [f64; 2],
}

#[derive(Debug, Deserialize)]
struct TopoObject {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    arcs: Value,
    #[serde(default)]
    geometries: Vec<TopoObject>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopoFeature {
    pub id: Option<Value>,
    pub properties: Map<String, Value>,
    pub geometry: MultiPolygon<f64>,
}

impl Topology {
    pub fn from_value(value: Value) -> Result<Self> {
        let topology: Topology = serde_json::from_value(value).context("Failed to parse TopoJSON topology")?;
        if topology.kind != "Topology" {
            return Err(anyhow!("Expected a TopoJSON Topology, found type {:?}", topology.kind));
        }
        Ok(topology)
    }

    fn decoded_arcs(&self) -> Vec<Vec<Coord<f64>>> {
        self.arcs
            .iter()
            .map(|arc| {
                let (mut x, mut y) = (0.0, 0.0);
                arc.iter()
                    .filter(|pos| pos.len() >= 2)
                    .map(|pos| match self.transform {
                        Some(t) => {
                            x += pos[0];
                            y += pos[1];
                            Coord { x: x * t.scale[0] + t.translate[0], y: y * t.scale[1] + t.translate[1] }
                        }
                        None => Coord { x: pos[0], y: pos[1] },
                    })
                    .collect()
            })
            .collect()
    }

    // Decode every geometry of the named object, flattening nested
    // collections. Non-polygonal geometries become empty regions.
    pub fn features(&self, object: &str) -> Result<Vec<TopoFeature>> {
        let raw = self
            .objects
            .get(object)
            .ok_or_else(|| anyhow!("Topology has no object named {:?}", object))?;
        let root: TopoObject = serde_json::from_value(raw.clone())
            .with_context(|| format!("Failed to parse topology object {:?}", object))?;

        let arcs = self.decoded_arcs();
        let mut features = Vec::new();
        collect_features(&root, &arcs, &mut features)?;
        Ok(features)
    }
}

fn collect_features(object: &TopoObject, arcs: &[Vec<Coord<f64>>], out: &mut Vec<TopoFeature>) -> Result<()> {
    let geometry = match object.kind.as_deref() {
        Some("GeometryCollection") => {
            for child in &object.geometries {
                collect_features(child, arcs, out)?;
            }
            return Ok(());
        }
        Some("Polygon") => {
            let rings: Vec<Vec<i64>> = serde_json::from_value(object.arcs.clone()).context("Invalid Polygon arcs")?;
            MultiPolygon::new(vec![polygon(&rings, arcs)?])
        }
        Some("MultiPolygon") => {
            let polygons: Vec<Vec<Vec<i64>>> =
                serde_json::from_value(object.arcs.clone()).context("Invalid MultiPolygon arcs")?;
            let polygons = polygons.iter().map(|rings| polygon(rings, arcs)).collect::<Result<Vec<_>>>()?;
            MultiPolygon::new(polygons)
        }
        other => {
            warn!(kind = ?other, id = ?object.id, "skipping non-polygonal topology geometry");
            MultiPolygon::new(vec![])
        }
    };

    out.push(TopoFeature {
        id: object.id.clone(),
        properties: object.properties.clone().unwrap_or_default(),
        geometry,
    });
    Ok(())
}

fn polygon(rings: &[Vec<i64>], arcs: &[Vec<Coord<f64>>]) -> Result<Polygon<f64>> {
    let mut rings = rings.iter().map(|ring| stitch_ring(ring, arcs));
    let exterior = match rings.next() {
        Some(ring) => ring?,
        None => LineString::new(vec![]),
    };
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

// Concatenate the referenced arcs; a negative index `i` is arc `!i`
// walked backwards. Consecutive arcs share their junction point.
fn stitch_ring(indices: &[i64], arcs: &[Vec<Coord<f64>>]) -> Result<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = Vec::new();
    for &index in indices {
        let (arc_index, reversed) = if index < 0 { (!index as usize, true) } else { (index as usize, false) };
        let arc = arcs
            .get(arc_index)
            .ok_or_else(|| anyhow!("Arc index {} out of range ({} arcs)", index, arcs.len()))?;

        let points: Vec<Coord<f64>> = if reversed {
            arc.iter().rev().copied().collect()
        } else {
            arc.clone()
        };
        let skip = usize::from(!coords.is_empty());
        coords.extend(points.into_iter().skip(skip));
    }
    Ok(LineString::new(coords))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square_topology() -> Value {
        // Two unit squares sharing the edge x = 1, with quantized arcs.
        json!({
            "type": "Topology",
            "transform": { "scale": [1.0, 1.0], "translate": [0.0, 0.0] },
            "arcs": [
                [[1, 0], [0, 1]],
                [[1, 1], [-1, 0], [0, -1], [1, 0]],
                [[1, 0], [1, 0], [0, 1], [-1, 0]]
            ],
            "objects": {
                "counties": {
                    "type": "GeometryCollection",
                    "geometries": [
                        { "type": "Polygon", "arcs": [[0, 1]], "id": "01001", "properties": { "GEOID": "01001" } },
                        { "type": "Polygon", "arcs": [[-1, 2]], "id": 1003 },
                        { "type": null, "id": "01005" }
                    ]
                }
            }
        })
    }

    #[test]
    fn decodes_quantized_arcs_and_shared_edges() {
        let topology = Topology::from_value(square_topology()).unwrap();
        let features = topology.features("counties").unwrap();
        assert_eq!(features.len(), 3);

        let left = &features[0].geometry.0[0];
        let coords: Vec<(f64, f64)> = left.exterior().coords().map(|c| (c.x, c.y)).collect();
        assert_eq!(coords, vec![(1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0), (1.0, 0.0)]);
        assert_eq!(features[0].properties.get("GEOID"), Some(&json!("01001")));

        let right = &features[1].geometry.0[0];
        let coords: Vec<(f64, f64)> = right.exterior().coords().map(|c| (c.x, c.y)).collect();
        assert_eq!(coords, vec![(1.0, 1.0), (1.0, 0.0), (2.0, 0.0), (2.0, 1.0), (1.0, 1.0)]);
        assert_eq!(features[1].id, Some(json!(1003)));
    }

    #[test]
    fn non_polygonal_geometries_are_kept_empty() {
        let topology = Topology::from_value(square_topology()).unwrap();
        let features = topology.features("counties").unwrap();
        assert!(features[2].geometry.0.is_empty());
        assert_eq!(features[2].id, Some(json!("01005")));
    }

    #[test]
    fn missing_object_is_an_error() {
        let topology = Topology::from_value(square_topology()).unwrap();
        assert!(topology.features("states").is_err());
    }

    #[test]
    fn rejects_documents_that_are_not_topologies() {
        let value = json!({ "type": "FeatureCollection", "arcs": [], "objects": {} });
        assert!(Topology::from_value(value).is_err());
    }
}
