//! Search Index Adapter
//!
//! Case-insensitive prefix search over the three name namespaces of a
//! design: nets, nodes and `NODE.PIN`. A query splits on its first `.` into
//! a node part and an optional pin part.

use serde::{Deserialize, Serialize};

use crate::core::ExplorerError;
use crate::model::{normalize_name, Net, Pin, PinSelector, SchematicNode};
use crate::store::GraphModel;
use crate::traversal::TraversalEngine;

/// Per-call result caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchLimits {
    /// Hits per namespace in a design-wide search
    pub per_namespace: usize,
    /// Node hits in a connected search
    pub connected: usize,
    /// Pin hits in a connected pin enumeration
    pub enumeration: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            per_namespace: 10,
            connected: 10,
            enumeration: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitKind {
    Net,
    Node,
    Pin,
}

/// What a connected search returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectedMode {
    /// One hit per reachable node, listing its reached pins
    #[default]
    Nodes,
    /// One `NODE.PIN` hit per reached pin
    Pins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: HitKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_friendly_name: Option<String>,
    /// Reached pins of a connected node hit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pins: Option<Vec<String>>,
}

impl SearchHit {
    pub fn net(net: Net) -> Self {
        Self::named(net.name, HitKind::Net)
    }

    pub fn node(node: SchematicNode) -> Self {
        Self::named(node.name, HitKind::Node)
    }

    pub fn pin(pin: Pin) -> Self {
        Self {
            name: pin.display_name(),
            kind: HitKind::Pin,
            node_name: Some(pin.node),
            pin_name: Some(pin.name),
            pin_friendly_name: pin.friendly_name,
            pins: None,
        }
    }

    fn named(name: String, kind: HitKind) -> Self {
        Self {
            name,
            kind,
            node_name: None,
            pin_name: None,
            pin_friendly_name: None,
            pins: None,
        }
    }
}

/// Split a raw query into normalized node and pin prefixes.
fn split_query(raw: &str) -> (String, Option<String>) {
    match raw.split_once('.') {
        Some((node, pin)) => (normalize_name(node), Some(normalize_name(pin))),
        None => (normalize_name(raw), None),
    }
}

pub struct SearchIndex<'a> {
    model: GraphModel<'a>,
    limits: SearchLimits,
}

impl<'a> SearchIndex<'a> {
    pub fn new(model: GraphModel<'a>, limits: SearchLimits) -> Self {
        Self { model, limits }
    }

    /// Design-wide prefix search: nets, then nodes, then pins, each in name
    /// order and capped at `per_namespace`. An empty node part matches every
    /// name, so `""` browses the design and `.1` lists pin `1` of every node.
    pub fn search(&self, design: &str, query: &str) -> Result<Vec<SearchHit>, ExplorerError> {
        let design = self.model.require_design(design)?.name;
        let (node_prefix, pin_prefix) = split_query(query);

        let store = self.model.store();
        let cap = self.limits.per_namespace;
        let mut hits = Vec::new();
        hits.extend(
            store
                .scan_nets(&design, &node_prefix, cap)?
                .into_iter()
                .map(SearchHit::net),
        );
        hits.extend(
            store
                .scan_nodes(&design, &node_prefix, cap)?
                .into_iter()
                .map(SearchHit::node),
        );
        hits.extend(
            store
                .scan_pins(&design, &node_prefix, pin_prefix.as_deref().unwrap_or(""), cap)?
                .into_iter()
                .map(SearchHit::pin),
        );

        tracing::debug!("search '{}' in {}: {} hit(s)", query, design, hits.len());
        Ok(hits)
    }

    /// Prefix search restricted to nodes electrically reachable from
    /// `source`. The query's node part filters node names; its pin part, if
    /// any, filters the reached pins.
    pub fn connected(
        &self,
        engine: &TraversalEngine<'_>,
        design: &str,
        source: &PinSelector,
        query: Option<&str>,
        mode: ConnectedMode,
    ) -> Result<Vec<SearchHit>, ExplorerError> {
        let (node_prefix, pin_prefix) = query.map(split_query).unwrap_or_default();
        let pin_prefix = pin_prefix.filter(|p| !p.is_empty());
        let cap = match mode {
            ConnectedMode::Nodes => self.limits.connected,
            ConnectedMode::Pins => self.limits.enumeration,
        };
        // pin filtering or flattening happens after expansion, so only a
        // plain node listing can be capped by the engine
        let node_limit = match (mode, &pin_prefix) {
            (ConnectedMode::Nodes, None) => cap,
            _ => usize::MAX,
        };

        let prefix = Some(node_prefix.as_str()).filter(|p| !p.is_empty());
        let hood = engine.connected_neighborhood(design, source, prefix, node_limit)?;
        if let Some(bound) = hood.bound {
            tracing::warn!("connected search from {} cut short: {}", source, bound);
        }

        let matches_pin =
            |pin: &Pin| pin_prefix.as_deref().map_or(true, |p| pin.name.starts_with(p));

        let mut hits: Vec<SearchHit> = match mode {
            ConnectedMode::Nodes => hood
                .nodes
                .into_iter()
                .filter_map(|reached| {
                    let pins: Vec<String> = reached
                        .pins
                        .iter()
                        .filter(|&pin| matches_pin(pin))
                        .map(|pin| pin.name.clone())
                        .collect();
                    if pins.is_empty() {
                        return None;
                    }
                    let mut hit = SearchHit::node(reached.node);
                    hit.pins = Some(pins);
                    Some(hit)
                })
                .collect(),
            ConnectedMode::Pins => hood
                .nodes
                .into_iter()
                .flat_map(|reached| reached.pins)
                .filter(|pin| matches_pin(pin))
                .map(SearchHit::pin)
                .collect(),
        };

        if hits.len() > cap {
            tracing::warn!(
                "connected search from {} truncated to {} of {} hit(s)",
                source,
                cap,
                hits.len()
            );
            hits.truncate(cap);
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityKind;
    use crate::store::{MemoryStore, SnapshotFile};
    use crate::traversal::TraversalLimits;

    fn create_test_store() -> MemoryStore {
        let json = r#"{ "designs": [{
            "name": "BOARD1",
            "parts": [
                { "name": "IC1", "nodes": [{ "name": "U1", "pins": [{ "name": "1" }, { "name": "2" }, { "name": "10" }] }] },
                { "name": "IC2", "nodes": [{ "name": "U2", "pins": [{ "name": "1" }, { "name": "3" }] }] },
                { "name": "R1", "nodes": [{ "name": "R1", "pins": [{ "name": "1" }, { "name": "2" }] }] }
            ],
            "nets": [
                { "name": "U_BUS", "pins": ["U1.1", "U2.1"] },
                { "name": "GND", "pins": ["U1.2", "U2.3", "R1.1", "R1.2"] }
            ]
        }] }"#;
        MemoryStore::from_snapshot(SnapshotFile::from_json(json).unwrap()).unwrap()
    }

    fn names(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.name.as_str()).collect()
    }

    #[test]
    fn test_search_orders_namespaces() {
        let store = create_test_store();
        let index = SearchIndex::new(GraphModel::new(&store), SearchLimits::default());
        let hits = index.search("BOARD1", "u").unwrap();
        assert_eq!(
            names(&hits),
            vec!["U_BUS", "U1", "U2", "U1.1", "U1.10", "U1.2", "U2.1", "U2.3"]
        );
        assert_eq!(hits[0].kind, HitKind::Net);
        assert_eq!(hits[1].kind, HitKind::Node);
        assert_eq!(hits[3].node_name.as_deref(), Some("U1"));
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let store = create_test_store();
        let index = SearchIndex::new(GraphModel::new(&store), SearchLimits::default());
        assert_eq!(
            index.search("board1", "gn").unwrap(),
            index.search("BOARD1", "GN").unwrap()
        );
        assert_eq!(names(&index.search("BOARD1", "u1.1").unwrap()), vec!["U1", "U1.1", "U1.10"]);
    }

    #[test]
    fn test_search_caps_each_namespace() {
        let store = create_test_store();
        let limits = SearchLimits {
            per_namespace: 1,
            ..Default::default()
        };
        let index = SearchIndex::new(GraphModel::new(&store), limits);
        assert_eq!(names(&index.search("BOARD1", "U").unwrap()), vec!["U_BUS", "U1", "U1.1"]);
    }

    #[test]
    fn test_search_empty_query_browses_design() {
        let store = create_test_store();
        let index = SearchIndex::new(GraphModel::new(&store), SearchLimits::default());
        let hits = index.search("BOARD1", "").unwrap();
        assert_eq!(
            names(&hits),
            vec![
                "GND", "U_BUS", "R1", "U1", "U2", "R1.1", "R1.2", "U1.1", "U1.10", "U1.2", "U2.1",
                "U2.3"
            ]
        );
        assert_eq!(index.search("BOARD1", "  ").unwrap(), hits);

        let limits = SearchLimits {
            per_namespace: 2,
            ..Default::default()
        };
        let capped = SearchIndex::new(GraphModel::new(&store), limits);
        assert_eq!(
            names(&capped.search("BOARD1", "").unwrap()),
            vec!["GND", "U_BUS", "R1", "U1", "R1.1", "R1.2"]
        );
    }

    #[test]
    fn test_search_pin_only_query() {
        let store = create_test_store();
        let index = SearchIndex::new(GraphModel::new(&store), SearchLimits::default());
        let hits = index.search("BOARD1", ".1").unwrap();
        let pins: Vec<&str> = hits
            .iter()
            .filter(|h| h.kind == HitKind::Pin)
            .map(|h| h.name.as_str())
            .collect();
        assert_eq!(pins, vec!["R1.1", "U1.1", "U1.10", "U2.1"]);
        assert_eq!(hits[0].name, "GND");
    }

    #[test]
    fn test_search_no_match_and_unknown_design() {
        let store = create_test_store();
        let index = SearchIndex::new(GraphModel::new(&store), SearchLimits::default());
        assert!(index.search("BOARD1", "ZZZ").unwrap().is_empty());
        assert!(matches!(
            index.search("NOPE", "U"),
            Err(ExplorerError::NotFound { kind: EntityKind::Design, .. })
        ));
    }

    #[test]
    fn test_connected_modes() {
        let store = create_test_store();
        let model = GraphModel::new(&store);
        let engine = TraversalEngine::new(model, TraversalLimits::default());
        let index = SearchIndex::new(model, SearchLimits::default());
        let source = PinSelector::parse("U1").unwrap();

        let nodes = index
            .connected(&engine, "BOARD1", &source, None, ConnectedMode::Nodes)
            .unwrap();
        assert_eq!(names(&nodes), vec!["R1", "U2"]);
        assert_eq!(nodes[1].pins, Some(vec!["1".to_string(), "3".to_string()]));

        let pins = index
            .connected(&engine, "BOARD1", &source, Some("u2"), ConnectedMode::Pins)
            .unwrap();
        assert_eq!(names(&pins), vec!["U2.1", "U2.3"]);

        let filtered = index
            .connected(&engine, "BOARD1", &source, Some("U2.3"), ConnectedMode::Nodes)
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].pins, Some(vec!["3".to_string()]));
    }

    #[test]
    fn test_connected_respects_limit() {
        let store = create_test_store();
        let model = GraphModel::new(&store);
        let engine = TraversalEngine::new(model, TraversalLimits::default());
        let limits = SearchLimits {
            connected: 1,
            enumeration: 3,
            ..Default::default()
        };
        let index = SearchIndex::new(model, limits);
        let source = PinSelector::parse("U1.2").unwrap();

        let nodes = index
            .connected(&engine, "BOARD1", &source, None, ConnectedMode::Nodes)
            .unwrap();
        assert_eq!(nodes.len(), 1);
        let pins = index
            .connected(&engine, "BOARD1", &source, None, ConnectedMode::Pins)
            .unwrap();
        assert_eq!(pins.len(), 3);
    }
}
