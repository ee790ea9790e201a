//! Design snapshots
//!
//! JSON description of one or more designs, used to fill a store for tests,
//! demos and the CLI:
//!
//! ```json
//! { "designs": [{
//!     "name": "BOARD1",
//!     "parts": [{ "name": "IC1", "nodes": [{ "name": "U1", "pins": [{ "name": "1", "friendlyName": "VCC" }] }] }],
//!     "nets": [{ "name": "GND", "pins": ["U1.1"] }],
//!     "mappings": [{ "from": "U1.1", "to": "U1.2" }]
//! }] }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use super::{StoreError, StoreResult};
use crate::model::{normalize_name, Design, Net, Part, Pin, PinKey, SchematicNode};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotFile {
    #[serde(default)]
    pub designs: Vec<DesignSnapshot>,
}

impl SnapshotFile {
    pub fn from_json(content: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn read(path: &Path) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesignSnapshot {
    pub name: String,
    #[serde(default)]
    pub parts: Vec<PartSnapshot>,
    #[serde(default)]
    pub nets: Vec<NetSnapshot>,
    #[serde(default)]
    pub mappings: Vec<PinMapping>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartSnapshot {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub name: String,
    #[serde(default)]
    pub pins: Vec<PinSnapshot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinSnapshot {
    pub name: String,
    #[serde(default)]
    pub friendly_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetSnapshot {
    pub name: String,
    /// Connected pins as `NODE.PIN`
    #[serde(default)]
    pub pins: Vec<String>,
}

/// `MAPS_TO` edge between two pins of the same node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PinMapping {
    pub from: String,
    pub to: String,
}

/// Flat, normalized and validated content of one design.
#[derive(Debug, Clone)]
pub struct DesignRecords {
    pub design: Design,
    pub parts: Vec<Part>,
    pub nodes: Vec<SchematicNode>,
    pub pins: Vec<Pin>,
    pub nets: Vec<Net>,
    /// `(net, pin)` pairs
    pub connections: Vec<(String, PinKey)>,
    /// `(from, to)` pairs
    pub mappings: Vec<(PinKey, PinKey)>,
}

fn required_name(raw: &str, what: &str, context: &str) -> StoreResult<String> {
    let name = normalize_name(raw);
    if name.is_empty() {
        return Err(StoreError::InvalidData(format!(
            "{} without a name in {}",
            what, context
        )));
    }
    Ok(name)
}

impl DesignSnapshot {
    /// Normalize names and check containment invariants.
    pub fn to_records(&self) -> StoreResult<DesignRecords> {
        let design = required_name(&self.name, "design", "snapshot")?;

        let mut part_names = HashSet::new();
        let mut parts = Vec::new();
        let mut nodes = Vec::new();
        let mut node_names = HashSet::new();
        let mut pins: BTreeMap<PinKey, Pin> = BTreeMap::new();

        for part in &self.parts {
            let part_name = required_name(&part.name, "part", &design)?;
            if !part_names.insert(part_name.clone()) {
                return Err(StoreError::InvalidData(format!(
                    "duplicate part {} in {}",
                    part_name, design
                )));
            }

            for node in &part.nodes {
                let node_name = required_name(&node.name, "node", &design)?;
                if node_name.contains('.') {
                    return Err(StoreError::InvalidData(format!(
                        "node name {} must not contain '.'",
                        node_name
                    )));
                }
                if !node_names.insert(node_name.clone()) {
                    return Err(StoreError::InvalidData(format!(
                        "duplicate node {} in {}",
                        node_name, design
                    )));
                }

                for pin in &node.pins {
                    let pin_name = required_name(&pin.name, "pin", &node_name)?;
                    let key = PinKey::new(node_name.clone(), pin_name.clone());
                    if pins.contains_key(&key) {
                        return Err(StoreError::InvalidData(format!(
                            "duplicate pin {} in {}",
                            key, design
                        )));
                    }
                    let friendly_name = pin
                        .friendly_name
                        .as_deref()
                        .map(str::trim)
                        .filter(|f| !f.is_empty())
                        .map(str::to_string);
                    pins.insert(
                        key,
                        Pin {
                            node: node_name.clone(),
                            part: part_name.clone(),
                            name: pin_name,
                            friendly_name,
                        },
                    );
                }

                nodes.push(SchematicNode {
                    name: node_name,
                    part: part_name.clone(),
                });
            }

            parts.push(Part { name: part_name });
        }

        let mut net_names = HashSet::new();
        let mut nets = Vec::new();
        let mut connections = BTreeSet::new();
        for net in &self.nets {
            let net_name = required_name(&net.name, "net", &design)?;
            if !net_names.insert(net_name.clone()) {
                return Err(StoreError::InvalidData(format!(
                    "duplicate net {} in {}",
                    net_name, design
                )));
            }
            for raw in &net.pins {
                let key = resolve_pin_ref(raw, &pins, &design)?;
                connections.insert((net_name.clone(), key));
            }
            nets.push(Net { name: net_name });
        }

        let mut mappings = BTreeSet::new();
        for mapping in &self.mappings {
            let from = resolve_pin_ref(&mapping.from, &pins, &design)?;
            let to = resolve_pin_ref(&mapping.to, &pins, &design)?;
            if from.node != to.node {
                return Err(StoreError::InvalidData(format!(
                    "mapping {} -> {} crosses nodes",
                    from, to
                )));
            }
            if from != to {
                mappings.insert((from, to));
            }
        }

        Ok(DesignRecords {
            design: Design { name: design },
            parts,
            nodes,
            pins: pins.into_values().collect(),
            nets,
            connections: connections.into_iter().collect(),
            mappings: mappings.into_iter().collect(),
        })
    }
}

fn resolve_pin_ref(raw: &str, pins: &BTreeMap<PinKey, Pin>, design: &str) -> StoreResult<PinKey> {
    let key = PinKey::parse(raw).ok_or_else(|| {
        StoreError::InvalidData(format!("'{}' is not a NODE.PIN reference", raw))
    })?;
    if !pins.contains_key(&key) {
        return Err(StoreError::InvalidData(format!(
            "unknown pin {} in {}",
            key, design
        )));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(json: &str) -> DesignSnapshot {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_records_are_normalized() {
        let records = snapshot(
            r#"{ "name": "board1",
                 "parts": [{ "name": "ic1", "nodes": [{ "name": "u1", "pins": [{ "name": "a", "friendlyName": " Vcc " }] }] }],
                 "nets": [{ "name": "vcc", "pins": ["u1.a", "U1.A"] }] }"#,
        )
        .to_records()
        .unwrap();

        assert_eq!(records.design.name, "BOARD1");
        assert_eq!(records.nodes[0].part, "IC1");
        assert_eq!(records.pins[0].friendly_name.as_deref(), Some("Vcc"));
        // duplicate connection collapses
        assert_eq!(records.connections, vec![("VCC".to_string(), PinKey::new("U1", "A"))]);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let result = snapshot(
            r#"{ "name": "B",
                 "parts": [
                   { "name": "P1", "nodes": [{ "name": "U1" }] },
                   { "name": "P2", "nodes": [{ "name": "u1" }] }
                 ] }"#,
        )
        .to_records();
        assert!(matches!(result, Err(StoreError::InvalidData(_))));
    }

    #[test]
    fn test_unknown_net_pin_rejected() {
        let result = snapshot(
            r#"{ "name": "B",
                 "parts": [{ "name": "P1", "nodes": [{ "name": "U1", "pins": [{ "name": "1" }] }] }],
                 "nets": [{ "name": "N", "pins": ["U1.2"] }] }"#,
        )
        .to_records();
        assert!(matches!(result, Err(StoreError::InvalidData(_))));
    }

    #[test]
    fn test_cross_node_mapping_rejected() {
        let result = snapshot(
            r#"{ "name": "B",
                 "parts": [{ "name": "P1", "nodes": [
                    { "name": "U1", "pins": [{ "name": "1" }] },
                    { "name": "U2", "pins": [{ "name": "1" }] }
                 ] }],
                 "mappings": [{ "from": "U1.1", "to": "U2.1" }] }"#,
        )
        .to_records();
        assert!(matches!(result, Err(StoreError::InvalidData(_))));
    }
}
