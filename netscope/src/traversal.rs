//! Traversal Engine
//!
//! Bounded path enumeration and spanning-neighborhood expansion over the
//! electrical layer of a design (`CONNECTS` and `MAPS_TO`, both directions).
//! Containment edges are never crossed.
//!
//! Both walks stop early when a [`TraversalLimits`] guard trips. That is not
//! an error: the results found so far are returned together with the
//! [`Bound`] that was hit.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use crate::core::ExplorerError;
use crate::model::{EdgeKind, Entity, EntityRef, Pin, PinSelector, SchematicNode};
use crate::store::GraphModel;

/// Resource guard for a single traversal call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalLimits {
    /// Maximum hops in one path
    pub max_depth: usize,
    /// Maximum edge expansions in one call
    pub max_expansions: usize,
    /// Wall-clock budget in milliseconds; `None` disables the deadline
    pub time_budget_ms: Option<u64>,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self {
            max_depth: 24,
            max_expansions: 50_000,
            time_budget_ms: Some(2_000),
        }
    }
}

/// Which guard cut a traversal short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    /// The requested number of paths was reached
    MaxPaths,
    /// At least one branch was cut at `max_depth`
    Depth,
    /// `max_expansions` was exhausted
    Expansions,
    /// The time budget ran out
    Deadline,
    /// The result list was truncated to its limit
    Limit,
}

impl Bound {
    /// Whether hitting this bound aborts the whole walk.
    fn stops_walk(&self) -> bool {
        matches!(self, Bound::MaxPaths | Bound::Expansions | Bound::Deadline)
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::MaxPaths => write!(f, "path limit reached"),
            Bound::Depth => write!(f, "depth limit reached"),
            Bound::Expansions => write!(f, "expansion limit reached"),
            Bound::Deadline => write!(f, "time budget exhausted"),
            Bound::Limit => write!(f, "result limit reached"),
        }
    }
}

/// One hop of a raw path: the edge taken and the entity it leads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub via: EdgeKind,
    pub entity: Entity,
}

/// A hop with both endpoints, in traversal order.
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    pub from: &'a Entity,
    pub via: EdgeKind,
    pub to: &'a Entity,
}

/// An ordered simple path starting at a pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPath {
    pub start: Entity,
    pub steps: Vec<Step>,
}

impl RawPath {
    pub fn zero_length(start: Entity) -> Self {
        Self {
            start,
            steps: Vec::new(),
        }
    }

    /// Number of hops
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn end(&self) -> &Entity {
        self.steps.last().map_or(&self.start, |step| &step.entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        std::iter::once(&self.start).chain(self.steps.iter().map(|step| &step.entity))
    }

    pub fn segments(&self) -> impl Iterator<Item = Segment<'_>> {
        self.entities().zip(self.steps.iter()).map(|(from, step)| Segment {
            from,
            via: step.via,
            to: &step.entity,
        })
    }

    fn identity(&self) -> Vec<EntityRef> {
        self.entities().map(Entity::reference).collect()
    }
}

/// Outcome of [`TraversalEngine::paths_between`].
#[derive(Debug, Clone, Default)]
pub struct PathSearch {
    pub paths: Vec<RawPath>,
    pub bound: Option<Bound>,
}

/// A node reached by spanning expansion, with the pins through which it was
/// reached (ordered by name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachedNode {
    pub node: SchematicNode,
    pub pins: Vec<Pin>,
}

/// Outcome of [`TraversalEngine::connected_neighborhood`].
#[derive(Debug, Clone, Default)]
pub struct Neighborhood {
    pub nodes: Vec<ReachedNode>,
    pub bound: Option<Bound>,
}

/// Expansion counter and deadline shared by one call.
struct Budget {
    limits: TraversalLimits,
    deadline: Option<Instant>,
    expansions: usize,
}

impl Budget {
    fn start(limits: TraversalLimits) -> Self {
        let deadline = limits
            .time_budget_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        Self {
            limits,
            deadline,
            expansions: 0,
        }
    }

    /// Account for one edge expansion.
    fn spend(&mut self) -> Option<Bound> {
        self.expansions += 1;
        if self.expansions > self.limits.max_expansions {
            return Some(Bound::Expansions);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Bound::Deadline),
            _ => None,
        }
    }
}

/// State of one depth-first path enumeration.
struct PathWalk<'w> {
    model: GraphModel<'w>,
    design: &'w str,
    target: &'w PinSelector,
    max_paths: usize,
    budget: Budget,
    trail: Vec<Step>,
    on_trail: HashSet<EntityRef>,
    seen: HashSet<Vec<EntityRef>>,
    found: Vec<RawPath>,
    depth_hit: bool,
    stopped: Option<Bound>,
}

impl<'w> PathWalk<'w> {
    fn is_target(&self, entity: &Entity) -> bool {
        entity
            .as_pin()
            .map_or(false, |pin| self.target.matches_pin(&pin.key()))
    }

    fn record(&mut self, path: RawPath) {
        if self.seen.insert(path.identity()) {
            self.found.push(path);
            if self.found.len() >= self.max_paths {
                self.stopped = Some(Bound::MaxPaths);
            }
        }
    }

    fn walk(
        &mut self,
        start: &Entity,
        current: &Entity,
        last: Option<EdgeKind>,
    ) -> Result<(), ExplorerError> {
        if self.trail.len() >= self.budget.limits.max_depth {
            self.depth_hit = true;
            return Ok(());
        }

        let neighbors =
            self.model
                .neighbors(self.design, &current.reference(), &EdgeKind::CONNECTIVITY)?;

        for next in neighbors {
            // never two MAPS_TO hops in a row
            if last == Some(EdgeKind::MapsTo) && next.edge == EdgeKind::MapsTo {
                continue;
            }
            let identity = next.entity.reference();
            if self.on_trail.contains(&identity) {
                continue;
            }
            if let Some(bound) = self.budget.spend() {
                self.stopped = Some(bound);
                return Ok(());
            }

            let reached_target = self.is_target(&next.entity);
            self.on_trail.insert(identity.clone());
            self.trail.push(Step {
                via: next.edge,
                entity: next.entity,
            });

            if reached_target {
                let path = RawPath {
                    start: start.clone(),
                    steps: self.trail.clone(),
                };
                self.record(path);
            } else if let Some(step) = self.trail.last().cloned() {
                self.walk(start, &step.entity, Some(step.via))?;
            }

            self.trail.pop();
            self.on_trail.remove(&identity);

            if self.stopped.is_some() {
                return Ok(());
            }
        }
        Ok(())
    }
}

/// Runs bounded walks against a [`GraphModel`].
pub struct TraversalEngine<'a> {
    model: GraphModel<'a>,
    limits: TraversalLimits,
}

impl<'a> TraversalEngine<'a> {
    pub fn new(model: GraphModel<'a>, limits: TraversalLimits) -> Self {
        Self { model, limits }
    }

    pub fn limits(&self) -> &TraversalLimits {
        &self.limits
    }

    /// Enumerate up to `max_paths` simple paths from any pin selected by
    /// `from` to any pin selected by `to`.
    ///
    /// No entity repeats within a path. A path ends at the first target pin
    /// it reaches. A start pin that is itself a target yields a single
    /// zero-length path.
    pub fn paths_between(
        &self,
        design: &str,
        from: &PinSelector,
        to: &PinSelector,
        max_paths: usize,
    ) -> Result<PathSearch, ExplorerError> {
        let design = self.model.require_design(design)?.name;
        let starts = self.model.resolve(&design, from)?;
        self.model.resolve(&design, to)?;

        if max_paths == 0 {
            return Ok(PathSearch::default());
        }

        let mut walk = PathWalk {
            model: self.model,
            design: &design,
            target: to,
            max_paths,
            budget: Budget::start(self.limits),
            trail: Vec::new(),
            on_trail: HashSet::new(),
            seen: HashSet::new(),
            found: Vec::new(),
            depth_hit: false,
            stopped: None,
        };

        for pin in starts {
            let start = Entity::Pin(pin);
            if walk.is_target(&start) {
                walk.record(RawPath::zero_length(start));
            } else {
                walk.on_trail.insert(start.reference());
                walk.walk(&start, &start, None)?;
                walk.on_trail.clear();
            }
            if walk.stopped.is_some() {
                break;
            }
        }

        let bound = walk
            .stopped
            .or(if walk.depth_hit { Some(Bound::Depth) } else { None });
        tracing::debug!(
            "paths {} -> {} in {}: {} path(s), {} expansion(s)",
            from,
            to,
            design,
            walk.found.len(),
            walk.budget.expansions
        );
        Ok(PathSearch {
            paths: walk.found,
            bound,
        })
    }

    /// Collect the nodes electrically reachable from the `source` pins.
    ///
    /// Every entity is visited at most once. The source node itself is
    /// excluded. Nodes are ordered by name, optionally filtered by a
    /// normalized name prefix, and truncated to `limit`.
    pub fn connected_neighborhood(
        &self,
        design: &str,
        source: &PinSelector,
        prefix: Option<&str>,
        limit: usize,
    ) -> Result<Neighborhood, ExplorerError> {
        let design = self.model.require_design(design)?.name;
        let starts = self.model.resolve(&design, source)?;

        let mut budget = Budget::start(self.limits);
        let mut visited: HashSet<EntityRef> = HashSet::new();
        let mut queue: VecDeque<(Entity, usize)> = VecDeque::new();
        let mut reached: BTreeMap<String, (SchematicNode, BTreeMap<String, Pin>)> =
            BTreeMap::new();
        let mut bound = None;

        for pin in starts {
            let start = Entity::Pin(pin);
            if visited.insert(start.reference()) {
                queue.push_back((start, 0));
            }
        }

        'expand: while let Some((entity, depth)) = queue.pop_front() {
            if let Entity::Pin(pin) = &entity {
                let wanted = !source.matches_node(&pin.node)
                    && prefix.map_or(true, |p| pin.node.starts_with(p));
                if wanted {
                    reached
                        .entry(pin.node.clone())
                        .or_insert_with(|| (pin.owner(), BTreeMap::new()))
                        .1
                        .insert(pin.name.clone(), pin.clone());
                }
            }

            if depth >= self.limits.max_depth {
                bound.get_or_insert(Bound::Depth);
                continue;
            }

            for next in self
                .model
                .neighbors(&design, &entity.reference(), &EdgeKind::CONNECTIVITY)?
            {
                if !visited.insert(next.entity.reference()) {
                    continue;
                }
                if let Some(hit) = budget.spend() {
                    bound = Some(hit);
                    break 'expand;
                }
                queue.push_back((next.entity, depth + 1));
            }
        }

        if reached.len() > limit {
            bound = bound.filter(|b| b.stops_walk()).or(Some(Bound::Limit));
        }

        let nodes: Vec<ReachedNode> = reached
            .into_values()
            .take(limit)
            .map(|(node, pins)| ReachedNode {
                node,
                pins: pins.into_values().collect(),
            })
            .collect();

        tracing::debug!(
            "neighborhood of {} in {}: {} node(s), {} expansion(s)",
            source,
            design,
            nodes.len(),
            budget.expansions
        );
        Ok(Neighborhood { nodes, bound })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityKind, PinKey};
    use crate::store::{MemoryStore, SnapshotFile};

    fn load(json: &str) -> MemoryStore {
        MemoryStore::from_snapshot(SnapshotFile::from_json(json).unwrap()).unwrap()
    }

    /// U1.1 - N1 - U2.1 ~ U2.2 - N2 - U3.1 (MAPS_TO inside U2)
    fn make_chain() -> MemoryStore {
        load(
            r#"{ "designs": [{ "name": "D",
                "parts": [
                    { "name": "P1", "nodes": [{ "name": "U1", "pins": [{ "name": "1" }] }] },
                    { "name": "P2", "nodes": [{ "name": "U2", "pins": [{ "name": "1" }, { "name": "2" }] }] },
                    { "name": "P3", "nodes": [{ "name": "U3", "pins": [{ "name": "1" }] }] }
                ],
                "nets": [
                    { "name": "N1", "pins": ["U1.1", "U2.1"] },
                    { "name": "N2", "pins": ["U2.2", "U3.1"] }
                ],
                "mappings": [{ "from": "U2.1", "to": "U2.2" }]
            }] }"#,
        )
    }

    /// Two parallel nets between U1 and U2 plus a cycle back through U3
    fn make_cycle() -> MemoryStore {
        load(
            r#"{ "designs": [{ "name": "D",
                "parts": [
                    { "name": "P1", "nodes": [{ "name": "U1", "pins": [{ "name": "1" }, { "name": "2" }] }] },
                    { "name": "P2", "nodes": [{ "name": "U2", "pins": [{ "name": "1" }, { "name": "2" }] }] },
                    { "name": "P3", "nodes": [{ "name": "U3", "pins": [{ "name": "1" }] }] }
                ],
                "nets": [
                    { "name": "A", "pins": ["U1.1", "U2.1", "U3.1"] },
                    { "name": "B", "pins": ["U1.2", "U2.2", "U3.1"] }
                ]
            }] }"#,
        )
    }

    /// One hub net joining many nodes
    fn make_star(arms: usize) -> MemoryStore {
        let parts: Vec<String> = (0..arms)
            .map(|i| {
                format!(
                    r#"{{ "name": "P{i}", "nodes": [{{ "name": "N{i:02}", "pins": [{{ "name": "1" }}] }}] }}"#
                )
            })
            .collect();
        let pins: Vec<String> = (0..arms).map(|i| format!(r#""N{i:02}.1""#)).collect();
        load(&format!(
            r#"{{ "designs": [{{ "name": "D", "parts": [{}], "nets": [{{ "name": "HUB", "pins": [{}] }}] }}] }}"#,
            parts.join(","),
            pins.join(",")
        ))
    }

    fn engine(store: &MemoryStore) -> TraversalEngine<'_> {
        TraversalEngine::new(GraphModel::new(store), TraversalLimits::default())
    }

    fn sel(raw: &str) -> PinSelector {
        PinSelector::parse(raw).unwrap()
    }

    #[test]
    fn test_chain_path_crosses_single_mapping() {
        let store = make_chain();
        let result = engine(&store)
            .paths_between("D", &sel("U1"), &sel("U3"), 10)
            .unwrap();
        assert_eq!(result.paths.len(), 1);
        let path = &result.paths[0];
        let names: Vec<String> = path.entities().map(|e| e.reference().to_string()).collect();
        assert_eq!(names, vec!["U1.1", "N1", "U2.1", "U2.2", "N2", "U3.1"]);
        let kinds: Vec<EdgeKind> = path.segments().map(|s| s.via).collect();
        assert_eq!(kinds[2], EdgeKind::MapsTo);
        assert_eq!(result.bound, None);
    }

    #[test]
    fn test_path_is_symmetric() {
        let store = make_chain();
        let result = engine(&store)
            .paths_between("d", &sel("u3.1"), &sel("u1.1"), 10)
            .unwrap();
        assert_eq!(result.paths.len(), 1);
        assert_eq!(result.paths[0].end().reference(), EntityRef::Pin(PinKey::new("U1", "1")));
    }

    #[test]
    fn test_same_endpoint_is_zero_length() {
        let store = make_chain();
        let result = engine(&store)
            .paths_between("D", &sel("U2.1"), &sel("U2.1"), 10)
            .unwrap();
        assert_eq!(result.paths.len(), 1);
        assert!(result.paths[0].is_empty());
    }

    #[test]
    fn test_cycles_terminate_with_simple_paths() {
        let store = make_cycle();
        let result = engine(&store)
            .paths_between("D", &sel("U1.1"), &sel("U2"), 100)
            .unwrap();
        assert!(!result.paths.is_empty());
        for path in &result.paths {
            let ids = path.identity();
            let unique: HashSet<_> = ids.iter().collect();
            assert_eq!(unique.len(), ids.len(), "path revisits an entity");
            assert_eq!(path.end().as_pin().map(|p| p.node.as_str()), Some("U2"));
        }
        // direct hop plus detours through U3 and through net B
        assert!(result.paths.len() >= 2);
    }

    #[test]
    fn test_max_paths_caps_result() {
        let store = make_cycle();
        let result = engine(&store)
            .paths_between("D", &sel("U1"), &sel("U2"), 1)
            .unwrap();
        assert_eq!(result.paths.len(), 1);
        assert_eq!(result.bound, Some(Bound::MaxPaths));
    }

    #[test]
    fn test_depth_guard() {
        let store = make_chain();
        let limits = TraversalLimits {
            max_depth: 2,
            ..Default::default()
        };
        let engine = TraversalEngine::new(GraphModel::new(&store), limits);
        let result = engine
            .paths_between("D", &sel("U1"), &sel("U3"), 10)
            .unwrap();
        assert!(result.paths.is_empty());
        assert_eq!(result.bound, Some(Bound::Depth));
    }

    #[test]
    fn test_expansion_guard() {
        let store = make_star(30);
        let limits = TraversalLimits {
            max_expansions: 5,
            ..Default::default()
        };
        let engine = TraversalEngine::new(GraphModel::new(&store), limits);
        let result = engine
            .connected_neighborhood("D", &sel("N00"), None, 100)
            .unwrap();
        assert_eq!(result.bound, Some(Bound::Expansions));
        assert!(result.nodes.len() < 29);
    }

    #[test]
    fn test_deadline_guard() {
        let store = make_star(30);
        let limits = TraversalLimits {
            time_budget_ms: Some(0),
            ..Default::default()
        };
        let engine = TraversalEngine::new(GraphModel::new(&store), limits);

        let paths = engine
            .paths_between("D", &sel("N00"), &sel("N29"), 10)
            .unwrap();
        assert_eq!(paths.bound, Some(Bound::Deadline));
        assert!(paths.paths.is_empty());

        let hood = engine
            .connected_neighborhood("D", &sel("N00"), None, 100)
            .unwrap();
        assert_eq!(hood.bound, Some(Bound::Deadline));
        assert!(hood.nodes.len() < 29);
    }

    #[test]
    fn test_no_path_is_empty() {
        let store = load(
            r#"{ "designs": [{ "name": "D", "parts": [
                { "name": "P1", "nodes": [{ "name": "U1", "pins": [{ "name": "1" }] }] },
                { "name": "P2", "nodes": [{ "name": "U9", "pins": [{ "name": "1" }] }] }
            ] }] }"#,
        );
        let result = engine(&store)
            .paths_between("D", &sel("U1"), &sel("U9"), 10)
            .unwrap();
        assert!(result.paths.is_empty());
        assert_eq!(result.bound, None);
    }

    #[test]
    fn test_unknown_endpoints() {
        let store = make_chain();
        let engine = engine(&store);
        let err = engine
            .paths_between("D", &sel("U7"), &sel("U1"), 10)
            .unwrap_err();
        assert!(matches!(err, ExplorerError::NotFound { kind: EntityKind::Node, .. }));
        let err = engine
            .paths_between("D", &sel("U1"), &sel("U3.9"), 10)
            .unwrap_err();
        assert!(matches!(err, ExplorerError::NotFound { kind: EntityKind::Pin, .. }));
        let err = engine
            .connected_neighborhood("X", &sel("U1"), None, 10)
            .unwrap_err();
        assert!(matches!(err, ExplorerError::NotFound { kind: EntityKind::Design, .. }));
    }

    #[test]
    fn test_neighborhood_excludes_source_and_sorts() {
        let store = make_chain();
        let result = engine(&store)
            .connected_neighborhood("D", &sel("U2"), None, 10)
            .unwrap();
        let names: Vec<&str> = result.nodes.iter().map(|n| n.node.name.as_str()).collect();
        assert_eq!(names, vec!["U1", "U3"]);
        assert_eq!(result.nodes[0].pins[0].name, "1");
    }

    #[test]
    fn test_neighborhood_prefix_and_limit() {
        let store = make_star(15);
        let engine = engine(&store);

        let all = engine
            .connected_neighborhood("D", &sel("N00.1"), None, 10)
            .unwrap();
        assert_eq!(all.nodes.len(), 10);
        assert_eq!(all.bound, Some(Bound::Limit));
        assert_eq!(all.nodes[0].node.name, "N01");

        let filtered = engine
            .connected_neighborhood("D", &sel("N00"), Some("N1"), 10)
            .unwrap();
        let names: Vec<&str> = filtered.nodes.iter().map(|n| n.node.name.as_str()).collect();
        assert_eq!(names, vec!["N10", "N11", "N12", "N13", "N14"]);
        assert_eq!(filtered.bound, None);
    }
}
