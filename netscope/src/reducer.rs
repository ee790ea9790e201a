//! Result Reducer
//!
//! Folds raw traversal paths into a single presentation graph. Pins collapse
//! into their owning node unless pin granularity is requested; every hop
//! becomes at most one connection keyed by `(from, to)`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{Entity, Pin, PinSelector, SchematicNode};
use crate::traversal::RawPath;

/// Level of detail of a reduced path view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Pins collapse into their owning node
    #[default]
    Nodes,
    /// Pins are shown individually as `NODE.PIN`
    Pins,
}

/// Display variant, serialized as the `type` tag of a display node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DisplayKind {
    Node {
        #[serde(rename = "partName")]
        part_name: String,
    },
    Net,
    Pin {
        #[serde(rename = "nodeName")]
        node_name: String,
        #[serde(
            rename = "pinFriendlyName",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        friendly_name: Option<String>,
    },
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayNode {
    pub name: String,
    #[serde(flatten)]
    pub kind: DisplayKind,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_source: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_target: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayConnection {
    pub from: String,
    pub to: String,
    pub pin_name: String,
    pub pin_friendly_name: Option<String>,
}

/// Reduced `{nodes, connections}` view of a set of paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayGraph {
    pub nodes: Vec<DisplayNode>,
    pub connections: Vec<DisplayConnection>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated: bool,
}

impl DisplayGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, name: &str) -> Option<&DisplayNode> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

/// Path-to-view reducer for one query.
#[derive(Debug, Clone, Default)]
pub struct Reducer<'q> {
    granularity: Granularity,
    source: Option<&'q PinSelector>,
    target: Option<&'q PinSelector>,
}

impl<'q> Reducer<'q> {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            source: None,
            target: None,
        }
    }

    /// Flag display nodes that match the query endpoints.
    pub fn with_endpoints(mut self, source: &'q PinSelector, target: &'q PinSelector) -> Self {
        self.source = Some(source);
        self.target = Some(target);
        self
    }

    /// Reduce paths into a sorted, de-duplicated view.
    ///
    /// The result does not depend on the order or multiplicity of `paths`.
    pub fn reduce<'p>(&self, paths: impl IntoIterator<Item = &'p RawPath>) -> DisplayGraph {
        let mut nodes: BTreeMap<String, DisplayNode> = BTreeMap::new();
        let mut connections: BTreeMap<(String, String), DisplayConnection> = BTreeMap::new();

        for path in paths {
            for entity in path.entities() {
                if let Some(display) = self.display(entity) {
                    merge_node(&mut nodes, display);
                }
            }

            for segment in path.segments() {
                let (Some(from), Some(to)) = (self.display(segment.from), self.display(segment.to))
                else {
                    continue;
                };
                if from.name == to.name {
                    continue;
                }
                let Some(pin) = segment.from.as_pin().or_else(|| segment.to.as_pin()) else {
                    continue;
                };
                let connection = DisplayConnection {
                    from: from.name,
                    to: to.name,
                    pin_name: pin.name.clone(),
                    pin_friendly_name: pin.friendly_name.clone(),
                };
                let key = (connection.from.clone(), connection.to.clone());
                match connections.get(&key) {
                    Some(existing) if pin_rank(existing) <= pin_rank(&connection) => {}
                    _ => {
                        connections.insert(key, connection);
                    }
                }
            }
        }

        DisplayGraph {
            nodes: nodes.into_values().collect(),
            connections: connections.into_values().collect(),
            truncated: false,
        }
    }

    /// View of a node on its own, with no connections. Used when both
    /// endpoints select a node that has no pins to start a walk from.
    pub fn single_node(&self, node: &SchematicNode) -> DisplayGraph {
        DisplayGraph {
            nodes: self.display(&Entity::Node(node.clone())).into_iter().collect(),
            ..Default::default()
        }
    }

    fn display(&self, entity: &Entity) -> Option<DisplayNode> {
        match entity {
            Entity::Pin(pin) => Some(self.display_pin(pin)),
            Entity::Node(node) => Some(DisplayNode {
                is_source: self.source.map_or(false, |s| s.matches_node(&node.name)),
                is_target: self.target.map_or(false, |t| t.matches_node(&node.name)),
                name: node.name.clone(),
                kind: DisplayKind::Node {
                    part_name: node.part.clone(),
                },
            }),
            Entity::Net(net) => Some(DisplayNode {
                name: net.name.clone(),
                kind: DisplayKind::Net,
                is_source: false,
                is_target: false,
            }),
            Entity::Design(_) | Entity::Part(_) => None,
        }
    }

    fn display_pin(&self, pin: &Pin) -> DisplayNode {
        match self.granularity {
            Granularity::Nodes => DisplayNode {
                is_source: self.source.map_or(false, |s| s.matches_node(&pin.node)),
                is_target: self.target.map_or(false, |t| t.matches_node(&pin.node)),
                name: pin.node.clone(),
                kind: DisplayKind::Node {
                    part_name: pin.part.clone(),
                },
            },
            Granularity::Pins => {
                let key = pin.key();
                DisplayNode {
                    is_source: self.source.map_or(false, |s| s.matches_pin(&key)),
                    is_target: self.target.map_or(false, |t| t.matches_pin(&key)),
                    name: pin.display_name(),
                    kind: DisplayKind::Pin {
                        node_name: pin.node.clone(),
                        friendly_name: pin.friendly_name.clone(),
                    },
                }
            }
        }
    }
}

/// Keep one display node per name; on a clash the smaller variant wins.
fn merge_node(nodes: &mut BTreeMap<String, DisplayNode>, display: DisplayNode) {
    match nodes.get(&display.name) {
        Some(existing) if existing.kind <= display.kind => {}
        _ => {
            nodes.insert(display.name.clone(), display);
        }
    }
}

fn pin_rank(connection: &DisplayConnection) -> (&str, Option<&str>) {
    (
        connection.pin_name.as_str(),
        connection.pin_friendly_name.as_deref(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EdgeKind, Net};
    use crate::traversal::Step;

    fn pin(node: &str, part: &str, name: &str, friendly: Option<&str>) -> Entity {
        Entity::Pin(Pin {
            node: node.into(),
            part: part.into(),
            name: name.into(),
            friendly_name: friendly.map(str::to_string),
        })
    }

    fn net(name: &str) -> Entity {
        Entity::Net(Net { name: name.into() })
    }

    fn path(start: Entity, steps: Vec<(EdgeKind, Entity)>) -> RawPath {
        RawPath {
            start,
            steps: steps
                .into_iter()
                .map(|(via, entity)| Step { via, entity })
                .collect(),
        }
    }

    /// U1.1 - GND - U2.3
    fn direct() -> RawPath {
        path(
            pin("U1", "IC1", "1", Some("VSS")),
            vec![
                (EdgeKind::Connects, net("GND")),
                (EdgeKind::Connects, pin("U2", "IC2", "3", None)),
            ],
        )
    }

    /// U1.2 ~ U1.1 - GND - U2.3
    fn via_mapping() -> RawPath {
        path(
            pin("U1", "IC1", "2", None),
            vec![
                (EdgeKind::MapsTo, pin("U1", "IC1", "1", Some("VSS"))),
                (EdgeKind::Connects, net("GND")),
                (EdgeKind::Connects, pin("U2", "IC2", "3", None)),
            ],
        )
    }

    #[test]
    fn test_pins_collapse_into_nodes() {
        let graph = Reducer::new(Granularity::Nodes).reduce(&[direct()]);
        let names: Vec<&str> = graph.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["GND", "U1", "U2"]);
        assert_eq!(
            graph.node("U1").map(|n| n.kind.clone()),
            Some(DisplayKind::Node { part_name: "IC1".into() })
        );
        assert_eq!(graph.connections.len(), 2);
        assert_eq!(graph.connections[0].from, "GND");
        assert_eq!(graph.connections[0].to, "U2");
        assert_eq!(graph.connections[0].pin_name, "3");
        assert_eq!(graph.connections[1].from, "U1");
        assert_eq!(graph.connections[1].pin_friendly_name.as_deref(), Some("VSS"));
    }

    #[test]
    fn test_shared_hops_deduplicated() {
        let reducer = Reducer::new(Granularity::Nodes);
        let graph = reducer.reduce(&[direct(), via_mapping()]);
        // MAPS_TO inside U1 is dropped; U1 -> GND appears once
        assert_eq!(graph.connections.len(), 2);
        let u1_gnd: Vec<_> = graph
            .connections
            .iter()
            .filter(|c| c.from == "U1" && c.to == "GND")
            .collect();
        assert_eq!(u1_gnd.len(), 1);
        assert_eq!(u1_gnd[0].pin_name, "1");
    }

    #[test]
    fn test_idempotent_and_order_independent() {
        let reducer = Reducer::new(Granularity::Nodes);
        let once = reducer.reduce(&[direct(), via_mapping()]);
        let twice = reducer.reduce(&[via_mapping(), direct(), direct(), via_mapping()]);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_competing_pins_pick_smallest() {
        // two different pins of U1 reach GND
        let other = path(
            pin("U1", "IC1", "0", None),
            vec![(EdgeKind::Connects, net("GND"))],
        );
        let reducer = Reducer::new(Granularity::Nodes);
        let a = reducer.reduce(&[direct(), other.clone()]);
        let b = reducer.reduce(&[other, direct()]);
        assert_eq!(a, b);
        let conn = a.connections.iter().find(|c| c.from == "U1").unwrap();
        assert_eq!(conn.pin_name, "0");
    }

    #[test]
    fn test_pin_granularity_keeps_mapping_hop() {
        let graph = Reducer::new(Granularity::Pins).reduce(&[via_mapping()]);
        let names: Vec<&str> = graph.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["GND", "U1.1", "U1.2", "U2.3"]);
        assert!(graph
            .connections
            .iter()
            .any(|c| c.from == "U1.2" && c.to == "U1.1"));
    }

    #[test]
    fn test_zero_length_path_and_flags() {
        let from = PinSelector::parse("U1").unwrap();
        let to = PinSelector::parse("u1").unwrap();
        let single = RawPath::zero_length(pin("U1", "IC1", "1", None));
        let graph = Reducer::new(Granularity::Nodes)
            .with_endpoints(&from, &to)
            .reduce(&[single]);
        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.connections.is_empty());
        assert!(graph.nodes[0].is_source && graph.nodes[0].is_target);
    }

    #[test]
    fn test_single_node_view() {
        let endpoint = PinSelector::parse("tp1").unwrap();
        let node = SchematicNode {
            name: "TP1".to_string(),
            part: "TP".to_string(),
        };
        let graph = Reducer::new(Granularity::Pins)
            .with_endpoints(&endpoint, &endpoint)
            .single_node(&node);
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].name, "TP1");
        assert_eq!(
            graph.nodes[0].kind,
            DisplayKind::Node {
                part_name: "TP".to_string()
            }
        );
        assert!(graph.nodes[0].is_source && graph.nodes[0].is_target);
        assert!(graph.connections.is_empty());
    }

    #[test]
    fn test_serialized_shape() {
        let from = PinSelector::parse("U1").unwrap();
        let to = PinSelector::parse("U2").unwrap();
        let graph = Reducer::new(Granularity::Nodes)
            .with_endpoints(&from, &to)
            .reduce(&[direct()]);
        let json = serde_json::to_value(&graph).unwrap();
        assert_eq!(json["nodes"][0]["type"], "net");
        assert_eq!(json["nodes"][1]["partName"], "IC1");
        assert_eq!(json["nodes"][1]["isSource"], true);
        assert!(json["nodes"][1].get("isTarget").is_none());
        assert_eq!(json["connections"][1]["pinFriendlyName"], "VSS");
        assert!(json.get("truncated").is_none());
    }
}
