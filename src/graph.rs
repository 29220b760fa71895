//! A per-frame labelled directed scene graph: the only mutable corner is the predicate cache.
//!
//! One [Graph] is handed to the monitor per time step. Nodes and edges are considered frozen for
//! the duration of that step; only [Graph::cache] is ever written to, and it is cleared again
//! before the next frame starts.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;

/// Attribute name used to look up a node's stable identity across frames.
pub const ENTITY_ID_ATTR: &str = "entity_id";

/// A single attribute value. Node attributes are heterogeneous (numbers, strings, flags), so this
/// is a small closed enum rather than `serde_json::Value` directly — it keeps `filterByAttr`'s
/// string/numeric distinction explicit in the type system.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl AttrValue {
    /// The string view used by `filterByAttr`'s regex branch. Returns `None` for non-string
    /// values, which the caller turns into `MonitorError::Input`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The numeric view used by `filterByAttr`'s comparison-predicate branch.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            AttrValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            AttrValue::String(_) => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::String(s) => write!(f, "{s}"),
            AttrValue::Number(n) => write!(f, "{n}"),
            AttrValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A node in a scene graph.
///
/// Two nodes are the "same entity" across frames iff [Node::id] agrees, even though they are
/// distinct `Node` values (one per frame). Within a single frame, nodes are compared and hashed
/// by identity (`id`), matching `original_source/SG_Utils.py::Node.get_id`.
#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub base_class: Option<String>,
    pub attr: BTreeMap<String, AttrValue>,
    /// Set when an upstream backfill step re-inserted this node to preserve presence across a
    /// frame where the sensor produced no fresh observation for it. Phantom nodes are never
    /// eligible as entity-binding candidates.
    pub phantom: bool,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Node {
            name: name.into(),
            base_class: None,
            attr: BTreeMap::new(),
            phantom: false,
        }
    }

    pub fn with_base_class(mut self, base_class: impl Into<String>) -> Self {
        self.base_class = Some(base_class.into());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attr.insert(key.into(), value);
        self
    }

    pub fn phantom(mut self, phantom: bool) -> Self {
        self.phantom = phantom;
        self
    }

    /// Stable cross-frame identity: the `entity_id` attribute if present, else the node's name.
    pub fn id(&self) -> &str {
        match self.attr.get(ENTITY_ID_ATTR) {
            Some(AttrValue::String(s)) => s.as_str(),
            _ => self.name.as_str(),
        }
    }

    pub fn is_ego(&self) -> bool {
        self.name == "ego"
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
impl Eq for Node {}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// One directed, labelled edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub label: String,
}

/// Which direction to follow when traversing a relation (`relSet`'s `edge_direction`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeDirection {
    Outgoing,
    Incoming,
}

/// Predicate memoisation cache, scoped to a single frame.
///
/// Keys are the deterministic cache strings
/// (`propertyName ⊕ symbol ⊕ sorted((entName, entityId))`); values are the already-evaluated
/// [crate::predicate::EvalResult] for that key, serialised into our internal set representation.
#[derive(Default)]
pub struct PredicateCache {
    entries: BTreeMap<String, crate::predicate::EvalResult>,
}

impl PredicateCache {
    pub fn get(&self, key: &str) -> Option<&crate::predicate::EvalResult> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, value: crate::predicate::EvalResult) {
        self.entries.insert(key, value);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A single frame's scene graph: a multi-digraph keyed by node identity, plus the frame's
/// scratch cache.
pub struct Graph {
    pub frame: String,
    pub name: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    cache: RefCell<PredicateCache>,
}

impl Graph {
    pub fn new(frame: impl Into<String>, name: impl Into<String>) -> Self {
        Graph {
            frame: frame.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            cache: RefCell::new(PredicateCache::default()),
        }
    }

    pub fn add_node(&mut self, node: Node) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(node);
        idx
    }

    pub fn add_edge(&mut self, from: usize, to: usize, label: impl Into<String>) {
        self.edges.push(Edge {
            from,
            to,
            label: label.into(),
        });
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// The unique node named `"ego"`, if present in this frame.
    pub fn ego(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.is_ego())
    }

    /// All nodes reachable from `node_idx` via an edge labelled `relation`, in the given
    /// direction. Mirrors `original_source/SG_Primitives.py::relSet`.
    pub fn related(&self, node_idx: usize, relation: &str, direction: EdgeDirection) -> Vec<usize> {
        self.edges
            .iter()
            .filter(|e| e.label == relation)
            .filter_map(|e| match direction {
                EdgeDirection::Outgoing if e.from == node_idx => Some(e.to),
                EdgeDirection::Incoming if e.to == node_idx => Some(e.from),
                _ => None,
            })
            .collect()
    }

    /// Index of the first non-phantom node whose `id()` equals `entity_id`, if any.
    pub fn find_by_id(&self, entity_id: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| !n.phantom && n.id() == entity_id)
    }

    pub fn cache_get(&self, key: &str) -> Option<crate::predicate::EvalResult> {
        self.cache.borrow().get(key).cloned()
    }

    pub fn cache_insert(&self, key: String, value: crate::predicate::EvalResult) {
        self.cache.borrow_mut().insert(key, value);
    }

    /// Clear the per-frame memoisation cache. Must be called between frames — a cache key
    /// captures `(property, symbol, bound entity ids)` but not the frame, so carrying entries
    /// across frames would answer for a relationship that may since have changed (see
    /// DESIGN.md).
    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Identity falls back to `name` when `entity_id` is absent.
    fn node_id_falls_back_to_name() {
        let n = Node::new("Lane1");
        assert_eq!(n.id(), "Lane1");
    }

    #[test]
    fn node_id_prefers_entity_id_attribute() {
        let n = Node::new("A").with_attr(ENTITY_ID_ATTR, AttrValue::String("veh-42".into()));
        assert_eq!(n.id(), "veh-42");
    }

    #[test]
    fn related_respects_direction() {
        let mut g = Graph::new("0", "frame0.rsv");
        let a = g.add_node(Node::new("A"));
        let b = g.add_node(Node::new("B"));
        g.add_edge(a, b, "isIn");
        assert_eq!(g.related(a, "isIn", EdgeDirection::Outgoing), vec![b]);
        assert_eq!(g.related(b, "isIn", EdgeDirection::Incoming), vec![a]);
        assert!(g.related(a, "isIn", EdgeDirection::Incoming).is_empty());
    }

    #[test]
    fn phantom_nodes_are_excluded_from_find_by_id() {
        let mut g = Graph::new("1", "frame1.rsv");
        g.add_node(Node::new("A").phantom(true));
        assert!(g.find_by_id("A").is_none());
    }

    #[test]
    fn cache_round_trips_and_clears() {
        let g = Graph::new("0", "frame0.rsv");
        g.cache_insert(
            "key".to_string(),
            crate::predicate::EvalResult::Decided(crate::predicate::Value::Bool(true)),
        );
        assert_eq!(g.cache_len(), 1);
        assert!(g.cache_get("key").is_some());
        g.clear_cache();
        assert_eq!(g.cache_len(), 0);
    }
}
