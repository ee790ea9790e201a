//! In-memory Schematic Store
//!
//! Holds every loaded design in a single petgraph graph. Containment edges
//! point from parent to child; `CONNECTS` points from net to pin; `MAPS_TO`
//! keeps the direction given in the snapshot. Queries ignore direction.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::BTreeMap;
use std::path::Path;

use super::snapshot::{DesignRecords, DesignSnapshot, SnapshotFile};
use super::{SchematicStore, StoreError, StoreResult};
use crate::model::{
    Design, EdgeKind, Entity, EntityRef, Neighbor, Net, Part, Pin, PinKey, SchematicNode,
};

/// Index of one design's entities into the shared graph
#[derive(Debug, Clone)]
struct DesignIndex {
    root: NodeIndex,
    parts: BTreeMap<String, NodeIndex>,
    nodes: BTreeMap<String, NodeIndex>,
    pins: BTreeMap<PinKey, NodeIndex>,
    /// `NODE.PIN` display name -> index, for ordered prefix scans
    pin_names: BTreeMap<String, NodeIndex>,
    nets: BTreeMap<String, NodeIndex>,
}

impl DesignIndex {
    fn new(root: NodeIndex) -> Self {
        Self {
            root,
            parts: BTreeMap::new(),
            nodes: BTreeMap::new(),
            pins: BTreeMap::new(),
            pin_names: BTreeMap::new(),
            nets: BTreeMap::new(),
        }
    }

    fn lookup(&self, entity: &EntityRef) -> Option<NodeIndex> {
        match entity {
            EntityRef::Design(_) => Some(self.root),
            EntityRef::Part(name) => self.parts.get(name).copied(),
            EntityRef::Node(name) => self.nodes.get(name).copied(),
            EntityRef::Pin(key) => self.pins.get(key).copied(),
            EntityRef::Net(name) => self.nets.get(name).copied(),
        }
    }
}

/// Statistics about the loaded graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub design_count: usize,
    pub entity_count: usize,
    pub edge_count: usize,
}

/// petgraph-backed store
#[derive(Debug, Clone)]
pub struct MemoryStore {
    graph: DiGraph<Entity, EdgeKind>,
    designs: BTreeMap<String, DesignIndex>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            designs: BTreeMap::new(),
        }
    }

    pub fn from_snapshot(file: SnapshotFile) -> StoreResult<Self> {
        let mut store = Self::new();
        for design in &file.designs {
            store.add_design(design)?;
        }
        Ok(store)
    }

    /// Load a JSON snapshot file
    pub fn open(path: &Path) -> StoreResult<Self> {
        let store = Self::from_snapshot(SnapshotFile::read(path)?)?;
        tracing::info!(
            "Loaded {} design(s) from {}",
            store.designs.len(),
            path.display()
        );
        Ok(store)
    }

    /// Validate a design snapshot and add it to the graph
    pub fn add_design(&mut self, snapshot: &DesignSnapshot) -> StoreResult<()> {
        let records = snapshot.to_records()?;
        if self.designs.contains_key(&records.design.name) {
            return Err(StoreError::InvalidData(format!(
                "design {} is already loaded",
                records.design.name
            )));
        }
        self.insert_records(records);
        Ok(())
    }

    fn insert_records(&mut self, records: DesignRecords) {
        let name = records.design.name.clone();
        let root = self.graph.add_node(Entity::Design(records.design));
        let mut index = DesignIndex::new(root);

        for part in records.parts {
            let part_name = part.name.clone();
            let idx = self.graph.add_node(Entity::Part(part));
            self.graph.add_edge(root, idx, EdgeKind::Contains);
            index.parts.insert(part_name, idx);
        }

        for node in records.nodes {
            let node_name = node.name.clone();
            let parent = index.parts.get(&node.part).copied();
            let idx = self.graph.add_node(Entity::Node(node));
            if let Some(parent) = parent {
                self.graph.add_edge(parent, idx, EdgeKind::Contains);
            }
            index.nodes.insert(node_name, idx);
        }

        for pin in records.pins {
            let key = pin.key();
            let display = pin.display_name();
            let parent = index.nodes.get(&pin.node).copied();
            let idx = self.graph.add_node(Entity::Pin(pin));
            if let Some(parent) = parent {
                self.graph.add_edge(parent, idx, EdgeKind::Contains);
            }
            index.pins.insert(key, idx);
            index.pin_names.insert(display, idx);
        }

        for net in records.nets {
            let net_name = net.name.clone();
            let idx = self.graph.add_node(Entity::Net(net));
            self.graph.add_edge(root, idx, EdgeKind::Contains);
            index.nets.insert(net_name, idx);
        }

        for (net, pin) in records.connections {
            if let (Some(&net_idx), Some(&pin_idx)) = (index.nets.get(&net), index.pins.get(&pin)) {
                self.graph.add_edge(net_idx, pin_idx, EdgeKind::Connects);
            }
        }

        for (from, to) in records.mappings {
            if let (Some(&a), Some(&b)) = (index.pins.get(&from), index.pins.get(&to)) {
                self.graph.add_edge(a, b, EdgeKind::MapsTo);
            }
        }

        tracing::debug!(
            "Indexed design {}: {} parts, {} nodes, {} pins, {} nets",
            name,
            index.parts.len(),
            index.nodes.len(),
            index.pins.len(),
            index.nets.len()
        );
        self.designs.insert(name, index);
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            design_count: self.designs.len(),
            entity_count: self.graph.node_count(),
            edge_count: self.graph.edge_count(),
        }
    }

    fn entity(&self, idx: NodeIndex) -> Option<&Entity> {
        self.graph.node_weight(idx)
    }

    fn index(&self, design: &str) -> Option<&DesignIndex> {
        self.designs.get(design)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered prefix scan over a name-keyed map
fn scan<'a, V>(
    map: &'a BTreeMap<String, V>,
    prefix: &'a str,
) -> impl Iterator<Item = (&'a String, &'a V)> + 'a {
    map.range(prefix.to_string()..)
        .take_while(move |(name, _)| name.starts_with(prefix))
}

impl SchematicStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn designs(&self) -> StoreResult<Vec<Design>> {
        Ok(self
            .designs
            .keys()
            .map(|name| Design { name: name.clone() })
            .collect())
    }

    fn design(&self, name: &str) -> StoreResult<Option<Design>> {
        Ok(self.index(name).map(|_| Design {
            name: name.to_string(),
        }))
    }

    fn part(&self, design: &str, name: &str) -> StoreResult<Option<Part>> {
        Ok(self
            .index(design)
            .and_then(|index| index.parts.get(name))
            .and_then(|&idx| self.entity(idx))
            .and_then(|entity| match entity {
                Entity::Part(part) => Some(part.clone()),
                _ => None,
            }))
    }

    fn node(&self, design: &str, name: &str) -> StoreResult<Option<SchematicNode>> {
        Ok(self
            .index(design)
            .and_then(|index| index.nodes.get(name))
            .and_then(|&idx| self.entity(idx))
            .and_then(|entity| entity.as_node().cloned()))
    }

    fn pins_of(&self, design: &str, node: &str) -> StoreResult<Vec<Pin>> {
        let Some(index) = self.index(design) else {
            return Ok(Vec::new());
        };
        let start = PinKey::new(node, "");
        Ok(index
            .pins
            .range(start..)
            .take_while(|(key, _)| key.node == node)
            .filter_map(|(_, &idx)| self.entity(idx).and_then(|e| e.as_pin().cloned()))
            .collect())
    }

    fn pin(&self, design: &str, key: &PinKey) -> StoreResult<Option<Pin>> {
        Ok(self
            .index(design)
            .and_then(|index| index.pins.get(key))
            .and_then(|&idx| self.entity(idx))
            .and_then(|entity| entity.as_pin().cloned()))
    }

    fn net(&self, design: &str, name: &str) -> StoreResult<Option<Net>> {
        Ok(self
            .index(design)
            .and_then(|index| index.nets.get(name))
            .and_then(|&idx| self.entity(idx))
            .and_then(|entity| entity.as_net().cloned()))
    }

    fn neighbors(
        &self,
        design: &str,
        entity: &EntityRef,
        kinds: &[EdgeKind],
    ) -> StoreResult<Vec<Neighbor>> {
        let Some(idx) = self.index(design).and_then(|index| index.lookup(entity)) else {
            return Ok(Vec::new());
        };

        let outgoing = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|edge| (edge.target(), *edge.weight()));
        let incoming = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|edge| (edge.source(), *edge.weight()));

        Ok(outgoing
            .chain(incoming)
            .filter(|(_, kind)| kinds.contains(kind))
            .filter_map(|(other, kind)| {
                self.entity(other).map(|entity| Neighbor {
                    edge: kind,
                    entity: entity.clone(),
                })
            })
            .collect())
    }

    fn scan_nets(&self, design: &str, prefix: &str, limit: usize) -> StoreResult<Vec<Net>> {
        let Some(index) = self.index(design) else {
            return Ok(Vec::new());
        };
        Ok(scan(&index.nets, prefix)
            .filter_map(|(_, &idx)| self.entity(idx).and_then(|e| e.as_net().cloned()))
            .take(limit)
            .collect())
    }

    fn scan_nodes(
        &self,
        design: &str,
        prefix: &str,
        limit: usize,
    ) -> StoreResult<Vec<SchematicNode>> {
        let Some(index) = self.index(design) else {
            return Ok(Vec::new());
        };
        Ok(scan(&index.nodes, prefix)
            .filter_map(|(_, &idx)| self.entity(idx).and_then(|e| e.as_node().cloned()))
            .take(limit)
            .collect())
    }

    fn scan_pins(
        &self,
        design: &str,
        node_prefix: &str,
        pin_prefix: &str,
        limit: usize,
    ) -> StoreResult<Vec<Pin>> {
        let Some(index) = self.index(design) else {
            return Ok(Vec::new());
        };
        Ok(scan(&index.pin_names, node_prefix)
            .filter_map(|(_, &idx)| self.entity(idx).and_then(|e| e.as_pin()))
            .filter(|pin| pin.node.starts_with(node_prefix) && pin.name.starts_with(pin_prefix))
            .take(limit)
            .cloned()
            .collect())
    }
}
