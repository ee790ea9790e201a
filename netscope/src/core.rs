//! Query façade shared by library callers and the CLI.
//! Holds an injected store handle and no other state.

use serde::{Deserialize, Serialize};

use crate::model::{Design, EdgeKind, EntityKind, EntityRef, Neighbor, PinSelector};
use crate::reducer::{DisplayGraph, Granularity, Reducer};
use crate::search::{ConnectedMode, SearchHit, SearchIndex, SearchLimits};
use crate::store::{GraphModel, SchematicStore, StoreError};
use crate::traversal::{Bound, TraversalEngine, TraversalLimits};

#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{kind} not found: {name}")]
    NotFound { kind: EntityKind, name: String },
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    /// Never raised by the explorer itself, which reports bounds as a
    /// `truncated` result. Reserved for callers that escalate a [`Bound`].
    #[error("Resource limit exceeded: {0}")]
    ResourceExceeded(Bound),
}

impl ExplorerError {
    pub fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        ExplorerError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ExplorerError::InvalidArgument(_) => ErrorCategory::BadRequest,
            ExplorerError::NotFound { .. } => ErrorCategory::NotFound,
            ExplorerError::StoreUnavailable(_) | ExplorerError::ResourceExceeded(_) => {
                ErrorCategory::Internal
            }
        }
    }
}

impl From<StoreError> for ExplorerError {
    fn from(e: StoreError) -> Self {
        tracing::error!("Store failure: {}", e);
        ExplorerError::StoreUnavailable(e.to_string())
    }
}

/// Caller-facing error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    BadRequest,
    NotFound,
    Internal,
}

/// `{error, category}` body returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    pub category: ErrorCategory,
}

impl From<&ExplorerError> for ErrorPayload {
    fn from(e: &ExplorerError) -> Self {
        Self {
            error: e.to_string(),
            category: e.category(),
        }
    }
}

/// Options for an [`Explorer`] (library or CLI).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerOptions {
    pub traversal: TraversalLimits,
    pub search: SearchLimits,
    /// Default path cap for `find_paths`
    pub max_paths: usize,
}

impl Default for ExplorerOptions {
    fn default() -> Self {
        Self {
            traversal: TraversalLimits::default(),
            search: SearchLimits::default(),
            max_paths: 10,
        }
    }
}

impl ExplorerOptions {
    pub fn from_json(content: &str) -> Result<Self, ExplorerError> {
        serde_json::from_str(content)
            .map_err(|e| ExplorerError::InvalidArgument(format!("invalid options: {}", e)))
    }
}

/// Per-call overrides for [`Explorer::find_paths_with`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PathOptions {
    pub max_paths: Option<usize>,
    pub granularity: Granularity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRef {
    pub name: String,
}

impl NameRef {
    fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePin {
    pub pin_name: String,
    pub pin_friendly_name: Option<String>,
    /// `None` for an unconnected pin
    pub net: Option<NameRef>,
}

/// Node with its part and every pin/net pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDetail {
    pub name: String,
    pub part: NameRef,
    pub pins: Vec<NodePin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinOwner {
    pub name: String,
    pub part: NameRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetPin {
    pub pin_name: String,
    pub pin_friendly_name: Option<String>,
    pub node: PinOwner,
}

/// Net with every connected pin and its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetDetail {
    pub name: String,
    pub pins: Vec<NetPin>,
}

/// Entry point for all connectivity queries.
pub struct Explorer {
    store: Box<dyn SchematicStore>,
    options: ExplorerOptions,
}

impl Explorer {
    pub fn new(store: Box<dyn SchematicStore>) -> Self {
        Self::with_options(store, ExplorerOptions::default())
    }

    pub fn with_options(store: Box<dyn SchematicStore>, options: ExplorerOptions) -> Self {
        tracing::debug!("Explorer over {} store, {:?}", store.backend(), options);
        Self { store, options }
    }

    pub fn options(&self) -> &ExplorerOptions {
        &self.options
    }

    fn model(&self) -> GraphModel<'_> {
        GraphModel::new(self.store.as_ref())
    }

    fn engine(&self) -> TraversalEngine<'_> {
        TraversalEngine::new(self.model(), self.options.traversal)
    }

    fn index(&self) -> SearchIndex<'_> {
        SearchIndex::new(self.model(), self.options.search)
    }

    pub fn list_designs(&self) -> Result<Vec<Design>, ExplorerError> {
        Ok(self.store.designs()?)
    }

    pub fn get_design(&self, name: &str) -> Result<Design, ExplorerError> {
        self.model().require_design(name)
    }

    pub fn get_node(&self, design: &str, node: &str) -> Result<NodeDetail, ExplorerError> {
        let model = self.model();
        let design = model.require_design(design)?.name;
        let node = model.find_node(&design, node)?;

        let mut pins = Vec::new();
        for pin in self.store.pins_of(&design, &node.name)? {
            let nets = self.store.nets_of_pin(&design, &pin.key())?;
            if nets.is_empty() {
                pins.push(NodePin {
                    pin_name: pin.name.clone(),
                    pin_friendly_name: pin.friendly_name.clone(),
                    net: None,
                });
            }
            for net in nets {
                pins.push(NodePin {
                    pin_name: pin.name.clone(),
                    pin_friendly_name: pin.friendly_name.clone(),
                    net: Some(NameRef::new(net.name)),
                });
            }
        }

        tracing::info!("Node {} in {}: {} pin entries", node.name, design, pins.len());
        Ok(NodeDetail {
            name: node.name,
            part: NameRef::new(node.part),
            pins,
        })
    }

    pub fn get_net(&self, design: &str, net: &str) -> Result<NetDetail, ExplorerError> {
        let model = self.model();
        let design = model.require_design(design)?.name;
        let net = model.find_net(&design, net)?;

        let pins: Vec<NetPin> = self
            .store
            .pins_on_net(&design, &net.name)?
            .into_iter()
            .map(|pin| NetPin {
                pin_name: pin.name,
                pin_friendly_name: pin.friendly_name,
                node: PinOwner {
                    name: pin.node,
                    part: NameRef::new(pin.part),
                },
            })
            .collect();

        tracing::info!("Net {} in {}: {} pin(s)", net.name, design, pins.len());
        Ok(NetDetail {
            name: net.name,
            pins,
        })
    }

    /// Immediate fan-out of an entity over the given edge kinds.
    pub fn neighbors(
        &self,
        design: &str,
        entity: &EntityRef,
        kinds: &[EdgeKind],
    ) -> Result<Vec<Neighbor>, ExplorerError> {
        let model = self.model();
        let design = model.require_design(design)?.name;
        let entity = model.find_entity(&design, entity)?;
        model.neighbors(&design, &entity.reference(), kinds)
    }

    pub fn search(&self, design: &str, query: &str) -> Result<Vec<SearchHit>, ExplorerError> {
        self.index().search(design, query)
    }

    pub fn connected_search(
        &self,
        design: &str,
        source: &str,
        query: Option<&str>,
    ) -> Result<Vec<SearchHit>, ExplorerError> {
        self.connected_search_with(design, source, query, ConnectedMode::Nodes)
    }

    pub fn connected_search_with(
        &self,
        design: &str,
        source: &str,
        query: Option<&str>,
        mode: ConnectedMode,
    ) -> Result<Vec<SearchHit>, ExplorerError> {
        let source = PinSelector::parse(source)?;
        let engine = self.engine();
        let hits = self.index().connected(&engine, design, &source, query, mode)?;
        tracing::info!("Connected search from {}: {} hit(s)", source, hits.len());
        Ok(hits)
    }

    pub fn find_paths(&self, design: &str, from: &str, to: &str) -> Result<DisplayGraph, ExplorerError> {
        self.find_paths_with(design, from, to, &PathOptions::default())
    }

    pub fn find_paths_with(
        &self,
        design: &str,
        from: &str,
        to: &str,
        options: &PathOptions,
    ) -> Result<DisplayGraph, ExplorerError> {
        let from = PinSelector::parse(from)?;
        let to = PinSelector::parse(to)?;
        let max_paths = options.max_paths.unwrap_or(self.options.max_paths);
        if max_paths == 0 {
            return Err(ExplorerError::InvalidArgument(
                "max_paths must be at least 1".to_string(),
            ));
        }

        let search = self.engine().paths_between(design, &from, &to, max_paths)?;
        let reducer = Reducer::new(options.granularity).with_endpoints(&from, &to);
        let mut graph = reducer.reduce(&search.paths);
        if graph.is_empty() && from == to {
            // a node without pins is still its own trivial path
            let node = self.model().find_node(design, &from.node)?;
            graph = reducer.single_node(&node);
        }

        if let Some(bound) = search.bound {
            tracing::warn!("Path search {} -> {} truncated: {}", from, to, bound);
            graph.truncated = true;
        }
        tracing::info!(
            "Found {} path(s) {} -> {}: {} nodes, {} connections",
            search.paths.len(),
            from,
            to,
            graph.nodes.len(),
            graph.connections.len()
        );
        Ok(graph)
    }
}
