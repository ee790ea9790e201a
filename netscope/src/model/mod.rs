//! Schematic Graph Model
//!
//! Typed, read-only entities of a schematic design and the edges between them.
//!
//! A design is a strict containment tree (design → part → node → pin, plus
//! design → net) overlaid with a connectivity layer:
//! - `CONNECTS` between a pin and a net
//! - `MAPS_TO` between two pins of the same node
//!
//! Every name is stored and compared in normalized (upper-case) form.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::ExplorerError;

/// Normalize a user-supplied or stored name for lookup and comparison.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Common "named identity" capability shared by all entities.
pub trait Named {
    fn name(&self) -> &str;
}

/// A named schematic scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Design {
    pub name: String,
}

/// A physical component instance inside a design.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Part {
    pub name: String,
}

/// A logical terminal grouping owned by exactly one part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchematicNode {
    pub name: String,
    /// Owning part name
    pub part: String,
}

/// A connection point on a node.
///
/// Carries the names of its owning node and part so that callers can resolve
/// the containment chain without another store round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pin {
    pub node: String,
    pub part: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
}

impl Pin {
    pub fn key(&self) -> PinKey {
        PinKey::new(&self.node, &self.name)
    }

    /// External `NODE.PIN` form
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.node, self.name)
    }

    pub fn owner(&self) -> SchematicNode {
        SchematicNode {
            name: self.node.clone(),
            part: self.part.clone(),
        }
    }
}

/// A named electrical connection group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Net {
    pub name: String,
}

impl Named for Design {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Part {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for SchematicNode {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Pin {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Net {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Identity of a pin within a design: `(node, pin)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PinKey {
    pub node: String,
    pub pin: String,
}

impl PinKey {
    pub fn new(node: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            pin: pin.into(),
        }
    }

    /// Parse a `NODE.PIN` compound name. Both parts are required.
    pub fn parse(raw: &str) -> Option<Self> {
        let (node, pin) = raw.split_once('.')?;
        let node = normalize_name(node);
        let pin = normalize_name(pin);
        if node.is_empty() || pin.is_empty() {
            return None;
        }
        Some(Self { node, pin })
    }
}

impl fmt::Display for PinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.pin)
    }
}

/// Entity type, used in error messages and search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Design,
    Part,
    Node,
    Pin,
    Net,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Design => write!(f, "design"),
            EntityKind::Part => write!(f, "part"),
            EntityKind::Node => write!(f, "node"),
            EntityKind::Pin => write!(f, "pin"),
            EntityKind::Net => write!(f, "net"),
        }
    }
}

/// Hashable identity of an entity within one design.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityRef {
    Design(String),
    Part(String),
    Node(String),
    Pin(PinKey),
    Net(String),
}

impl EntityRef {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::Design(_) => EntityKind::Design,
            EntityRef::Part(_) => EntityKind::Part,
            EntityRef::Node(_) => EntityKind::Node,
            EntityRef::Pin(_) => EntityKind::Pin,
            EntityRef::Net(_) => EntityKind::Net,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Design(name)
            | EntityRef::Part(name)
            | EntityRef::Node(name)
            | EntityRef::Net(name) => write!(f, "{}", name),
            EntityRef::Pin(key) => write!(f, "{}", key),
        }
    }
}

/// A node of the schematic graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Entity {
    Design(Design),
    Part(Part),
    Node(SchematicNode),
    Pin(Pin),
    Net(Net),
}

impl Entity {
    pub fn reference(&self) -> EntityRef {
        match self {
            Entity::Design(d) => EntityRef::Design(d.name.clone()),
            Entity::Part(p) => EntityRef::Part(p.name.clone()),
            Entity::Node(n) => EntityRef::Node(n.name.clone()),
            Entity::Pin(p) => EntityRef::Pin(p.key()),
            Entity::Net(n) => EntityRef::Net(n.name.clone()),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Design(_) => EntityKind::Design,
            Entity::Part(_) => EntityKind::Part,
            Entity::Node(_) => EntityKind::Node,
            Entity::Pin(_) => EntityKind::Pin,
            Entity::Net(_) => EntityKind::Net,
        }
    }

    pub fn is_pin(&self) -> bool {
        matches!(self, Entity::Pin(_))
    }

    pub fn is_net(&self) -> bool {
        matches!(self, Entity::Net(_))
    }

    pub fn as_pin(&self) -> Option<&Pin> {
        match self {
            Entity::Pin(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_net(&self) -> Option<&Net> {
        match self {
            Entity::Net(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&SchematicNode> {
        match self {
            Entity::Node(n) => Some(n),
            _ => None,
        }
    }
}

impl Named for Entity {
    fn name(&self) -> &str {
        match self {
            Entity::Design(d) => d.name(),
            Entity::Part(p) => p.name(),
            Entity::Node(n) => n.name(),
            Entity::Pin(p) => p.name(),
            Entity::Net(n) => n.name(),
        }
    }
}

/// Relationship type in the schematic graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Design → part/net, part → node, node → pin
    Contains,
    /// Pin ↔ net
    Connects,
    /// Pin ↔ pin of the same node
    MapsTo,
}

impl EdgeKind {
    /// Electrical edges; the only ones traversal follows.
    pub const CONNECTIVITY: [EdgeKind; 2] = [EdgeKind::Connects, EdgeKind::MapsTo];

    pub fn label(&self) -> &'static str {
        match self {
            EdgeKind::Contains => "CONTAINS",
            EdgeKind::Connects => "CONNECTS",
            EdgeKind::MapsTo => "MAPS_TO",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An adjacent entity and the edge leading to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbor {
    pub edge: EdgeKind,
    pub entity: Entity,
}

/// Parsed `NODE[.PIN]` argument.
///
/// Without a pin, the selector stands for every pin of the node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinSelector {
    pub node: String,
    pub pin: Option<String>,
}

impl PinSelector {
    pub fn node(node: &str) -> Self {
        Self {
            node: normalize_name(node),
            pin: None,
        }
    }

    /// Parse `NODE` or `NODE.PIN`, splitting on the first `.`.
    pub fn parse(raw: &str) -> Result<Self, ExplorerError> {
        let (node, pin) = match raw.split_once('.') {
            Some((node, pin)) => (node, Some(pin)),
            None => (raw, None),
        };
        let node = normalize_name(node);
        if node.is_empty() {
            return Err(ExplorerError::InvalidArgument(format!(
                "missing node name in '{}'",
                raw
            )));
        }
        let pin = pin.map(normalize_name).filter(|p| !p.is_empty());
        Ok(Self { node, pin })
    }

    pub fn matches_node(&self, node: &str) -> bool {
        self.node == node
    }

    pub fn matches_pin(&self, key: &PinKey) -> bool {
        self.node == key.node && self.pin.as_ref().map_or(true, |p| *p == key.pin)
    }
}

impl fmt::Display for PinSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pin {
            Some(pin) => write!(f, "{}.{}", self.node, pin),
            None => write!(f, "{}", self.node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  vdd_3v3 "), "VDD_3V3");
        assert_eq!(normalize_name("GND"), "GND");
    }

    #[test]
    fn test_selector_node_only() {
        let sel = PinSelector::parse("u1").unwrap();
        assert_eq!(sel.node, "U1");
        assert!(sel.pin.is_none());
        assert!(sel.matches_pin(&PinKey::new("U1", "7")));
        assert!(!sel.matches_pin(&PinKey::new("U10", "7")));
    }

    #[test]
    fn test_selector_with_pin() {
        let sel = PinSelector::parse("u1.a0").unwrap();
        assert_eq!(sel.to_string(), "U1.A0");
        assert!(sel.matches_pin(&PinKey::new("U1", "A0")));
        assert!(!sel.matches_pin(&PinKey::new("U1", "A1")));
    }

    #[test]
    fn test_selector_trailing_dot_is_node_only() {
        let sel = PinSelector::parse("U1.").unwrap();
        assert_eq!(sel, PinSelector::node("U1"));
    }

    #[test]
    fn test_selector_missing_node() {
        assert!(matches!(
            PinSelector::parse(".1"),
            Err(ExplorerError::InvalidArgument(_))
        ));
        assert!(matches!(
            PinSelector::parse("   "),
            Err(ExplorerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_pin_key_parse() {
        assert_eq!(PinKey::parse("u2.3"), Some(PinKey::new("U2", "3")));
        assert_eq!(PinKey::parse("U2"), None);
        assert_eq!(PinKey::parse("U2."), None);
        // Only the first dot separates node from pin
        assert_eq!(PinKey::parse("J1.A.1"), Some(PinKey::new("J1", "A.1")));
    }

    #[test]
    fn test_entity_reference() {
        let pin = Pin {
            node: "U1".into(),
            part: "IC1".into(),
            name: "1".into(),
            friendly_name: Some("VCC".into()),
        };
        let entity = Entity::Pin(pin.clone());
        assert_eq!(entity.reference(), EntityRef::Pin(PinKey::new("U1", "1")));
        assert_eq!(entity.kind(), EntityKind::Pin);
        assert_eq!(entity.name(), "1");
        assert_eq!(pin.display_name(), "U1.1");
        assert_eq!(pin.owner().part, "IC1");
    }
}
