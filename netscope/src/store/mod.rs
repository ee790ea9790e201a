//! Schematic Graph Store
//!
//! The store is the external collaborator that holds the design graph. The
//! engine only relies on four query shapes, all expressed by
//! [`SchematicStore`]:
//! - exact-name lookup scoped to a design
//! - adjacency with an edge-kind filter (path enumeration and spanning
//!   expansion are built on top of this by [`crate::traversal`])
//! - prefix scans over net, node and `NODE.PIN` names
//!
//! Backends:
//! - [`MemoryStore`]: petgraph-backed, loaded from a JSON snapshot
//! - [`SqliteStore`]: SQLite-backed via rusqlite

pub mod memory;
pub mod snapshot;
pub mod sqlite;

use thiserror::Error;

use crate::core::ExplorerError;
use crate::model::{
    normalize_name, Design, EdgeKind, Entity, EntityKind, EntityRef, Neighbor, Net, Part, Pin,
    PinKey, PinSelector, SchematicNode,
};

pub use memory::MemoryStore;
pub use snapshot::{DesignRecords, DesignSnapshot, SnapshotFile};
pub use sqlite::SqliteStore;

/// Errors raised by store backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read-only query interface of a schematic graph store.
///
/// All names passed in are already normalized; implementations compare them
/// verbatim. Lookups of entities that do not exist return `Ok(None)` or an
/// empty list, never an error.
pub trait SchematicStore: Send + Sync {
    /// Short backend name used in logs
    fn backend(&self) -> &'static str;

    /// All designs, ordered by name
    fn designs(&self) -> StoreResult<Vec<Design>>;

    fn design(&self, name: &str) -> StoreResult<Option<Design>>;

    fn part(&self, design: &str, name: &str) -> StoreResult<Option<Part>>;

    fn node(&self, design: &str, name: &str) -> StoreResult<Option<SchematicNode>>;

    /// Pins of a node, ordered by pin name
    fn pins_of(&self, design: &str, node: &str) -> StoreResult<Vec<Pin>>;

    fn pin(&self, design: &str, key: &PinKey) -> StoreResult<Option<Pin>> {
        Ok(self
            .pins_of(design, &key.node)?
            .into_iter()
            .find(|p| p.name == key.pin))
    }

    fn net(&self, design: &str, name: &str) -> StoreResult<Option<Net>>;

    /// Entities adjacent to `entity` over any of `kinds`, in either direction.
    fn neighbors(
        &self,
        design: &str,
        entity: &EntityRef,
        kinds: &[EdgeKind],
    ) -> StoreResult<Vec<Neighbor>>;

    /// Nets whose name starts with `prefix`, ordered by name
    fn scan_nets(&self, design: &str, prefix: &str, limit: usize) -> StoreResult<Vec<Net>>;

    /// Nodes whose name starts with `prefix`, ordered by name
    fn scan_nodes(
        &self,
        design: &str,
        prefix: &str,
        limit: usize,
    ) -> StoreResult<Vec<SchematicNode>>;

    /// Pins whose node and pin names start with the given prefixes, ordered
    /// by `NODE.PIN`
    fn scan_pins(
        &self,
        design: &str,
        node_prefix: &str,
        pin_prefix: &str,
        limit: usize,
    ) -> StoreResult<Vec<Pin>>;

    /// Pins connected to a net, ordered by node then pin
    fn pins_on_net(&self, design: &str, net: &str) -> StoreResult<Vec<Pin>> {
        let mut pins: Vec<Pin> = self
            .neighbors(design, &EntityRef::Net(net.to_string()), &[EdgeKind::Connects])?
            .into_iter()
            .filter_map(|n| match n.entity {
                Entity::Pin(pin) => Some(pin),
                _ => None,
            })
            .collect();
        pins.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(pins)
    }

    /// Nets a pin participates in, ordered by name
    fn nets_of_pin(&self, design: &str, key: &PinKey) -> StoreResult<Vec<Net>> {
        let mut nets: Vec<Net> = self
            .neighbors(design, &EntityRef::Pin(key.clone()), &[EdgeKind::Connects])?
            .into_iter()
            .filter_map(|n| match n.entity {
                Entity::Net(net) => Some(net),
                _ => None,
            })
            .collect();
        nets.sort();
        Ok(nets)
    }
}

/// Name-normalizing, error-translating view over a [`SchematicStore`].
///
/// Every miss becomes [`ExplorerError::NotFound`]; every backend failure
/// becomes [`ExplorerError::StoreUnavailable`].
#[derive(Clone, Copy)]
pub struct GraphModel<'a> {
    store: &'a dyn SchematicStore,
}

impl<'a> GraphModel<'a> {
    pub fn new(store: &'a dyn SchematicStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &'a dyn SchematicStore {
        self.store
    }

    pub fn require_design(&self, design: &str) -> Result<Design, ExplorerError> {
        let name = normalize_name(design);
        self.store
            .design(&name)?
            .ok_or_else(|| ExplorerError::not_found(EntityKind::Design, name))
    }

    pub fn find_node(&self, design: &str, name: &str) -> Result<SchematicNode, ExplorerError> {
        let design = normalize_name(design);
        let name = normalize_name(name);
        match self.store.node(&design, &name)? {
            Some(node) => Ok(node),
            None => Err(self.miss(&design, EntityKind::Node, name)?),
        }
    }

    /// Resolve `node[.pin]`. Without a pin name, all pins of the node are
    /// returned (possibly none).
    pub fn find_pin(
        &self,
        design: &str,
        node: &str,
        pin: Option<&str>,
    ) -> Result<Vec<Pin>, ExplorerError> {
        let node = self.find_node(design, node)?;
        let design = normalize_name(design);
        match pin.map(normalize_name) {
            Some(pin_name) => {
                let key = PinKey::new(node.name, pin_name);
                match self.store.pin(&design, &key)? {
                    Some(found) => Ok(vec![found]),
                    None => Err(ExplorerError::not_found(EntityKind::Pin, key.to_string())),
                }
            }
            None => Ok(self.store.pins_of(&design, &node.name)?),
        }
    }

    pub fn resolve(&self, design: &str, selector: &PinSelector) -> Result<Vec<Pin>, ExplorerError> {
        self.find_pin(design, &selector.node, selector.pin.as_deref())
    }

    pub fn find_net(&self, design: &str, name: &str) -> Result<Net, ExplorerError> {
        let design = normalize_name(design);
        let name = normalize_name(name);
        match self.store.net(&design, &name)? {
            Some(net) => Ok(net),
            None => Err(self.miss(&design, EntityKind::Net, name)?),
        }
    }

    /// Look up any entity by identity.
    pub fn find_entity(&self, design: &str, entity: &EntityRef) -> Result<Entity, ExplorerError> {
        let found = match entity {
            EntityRef::Design(name) => Entity::Design(self.require_design(name)?),
            EntityRef::Part(name) => {
                let design = normalize_name(design);
                let name = normalize_name(name);
                match self.store.part(&design, &name)? {
                    Some(part) => Entity::Part(part),
                    None => return Err(self.miss(&design, EntityKind::Part, name)?),
                }
            }
            EntityRef::Node(name) => Entity::Node(self.find_node(design, name)?),
            EntityRef::Pin(key) => {
                let mut pins = self.find_pin(design, &key.node, Some(&key.pin))?;
                match pins.pop() {
                    Some(pin) => Entity::Pin(pin),
                    None => {
                        return Err(ExplorerError::not_found(EntityKind::Pin, key.to_string()))
                    }
                }
            }
            EntityRef::Net(name) => Entity::Net(self.find_net(design, name)?),
        };
        Ok(found)
    }

    /// Adjacent entities, ordered by edge kind then identity so traversal is
    /// deterministic regardless of backend.
    pub fn neighbors(
        &self,
        design: &str,
        entity: &EntityRef,
        kinds: &[EdgeKind],
    ) -> Result<Vec<Neighbor>, ExplorerError> {
        let mut found = self.store.neighbors(design, entity, kinds)?;
        found.sort_by(|a, b| {
            a.edge
                .cmp(&b.edge)
                .then_with(|| a.entity.reference().cmp(&b.entity.reference()))
        });
        found.dedup_by(|a, b| a.edge == b.edge && a.entity == b.entity);
        Ok(found)
    }

    /// Build the NotFound for a missed lookup, naming the design if that is
    /// what is actually missing.
    fn miss(
        &self,
        design: &str,
        kind: EntityKind,
        name: String,
    ) -> Result<ExplorerError, ExplorerError> {
        if self.store.design(design)?.is_none() {
            return Ok(ExplorerError::not_found(EntityKind::Design, design));
        }
        Ok(ExplorerError::not_found(kind, name))
    }
}
