//! Symbolic entities, symbolic properties, and the concrete instances they expand into.
//!
//! This is the busiest module in the crate: it owns entity identity (by-name equality), the
//! node-acceptance rule each symbolic entity carries, the DFA-plus-predicates bundle a symbolic
//! property is, and the Cartesian-product expansion machinery that grows a binding as matching
//! nodes appear in the stream.

use crate::dfa::Dfa;
use crate::error::{MonitorError, StateId};
use crate::graph::Graph;
use crate::predicate::{self, AttrFilter, PredicateNode};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

/// Decides whether a graph node may bind to a particular symbolic entity.
///
/// Mirrors `original_source/SymbolicEntity.py`'s `base_filter`, which is either a list of
/// `base_class` names or an arbitrary callable. Represented here as a closed enum rather than a
/// boxed closure, consistent with the rest of the predicate layer being data, not closures.
#[derive(Clone, Debug)]
pub enum Acceptor {
    /// Accepts every non-phantom node.
    Any,
    /// Accepts nodes whose `base_class` is one of the given names.
    BaseClasses(Vec<String>),
    /// Accepts nodes whose named attribute passes the filter.
    Attr { attr: String, filter: AttrFilter },
}

impl Acceptor {
    pub fn any() -> Self {
        Acceptor::Any
    }

    pub fn base_classes(classes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Acceptor::BaseClasses(classes.into_iter().map(Into::into).collect())
    }

    pub fn attr(attr: impl Into<String>, filter: AttrFilter) -> Self {
        Acceptor::Attr {
            attr: attr.into(),
            filter,
        }
    }

    /// Small textual convenience form used by property definitions and tests: `"true"` accepts
    /// any node; `class(_) == "value"` accepts nodes whose `base_class` equals `value` (the
    /// parenthesised name is documentation only, it names the symbolic entity being described).
    pub fn new(expr: &str) -> Self {
        let expr = expr.trim();
        if expr.eq_ignore_ascii_case("true") {
            return Acceptor::Any;
        }
        if let Some(idx) = expr.find("==") {
            let rhs = expr[idx + 2..].trim().trim_matches('"');
            return Acceptor::BaseClasses(vec![rhs.to_string()]);
        }
        Acceptor::Any
    }

    pub fn accepts(&self, node: &crate::graph::Node) -> bool {
        match self {
            Acceptor::Any => true,
            Acceptor::BaseClasses(classes) => node
                .base_class
                .as_deref()
                .is_some_and(|bc| classes.iter().any(|c| c == bc)),
            Acceptor::Attr { attr, filter } => {
                let value = node.attr.get(attr);
                match filter {
                    AttrFilter::Regex(pattern) => value
                        .and_then(|v| v.as_str())
                        .and_then(|s| regex::Regex::new(pattern).ok().map(|re| re.is_match(s)))
                        .unwrap_or(false),
                    AttrFilter::Numeric(cmp) => value
                        .and_then(|v| v.as_f64())
                        .is_some_and(|n| cmp.matches(n)),
                }
            }
        }
    }
}

/// A named hole in a property. Equality, ordering, and hashing are all by `name` only — two
/// entities with the same name are the same entity even if constructed with different
/// acceptors, matching `original_source/SymbolicEntity.py`.
#[derive(Clone, Debug)]
pub struct SymbolicEntity {
    pub name: String,
    pub acceptor: Acceptor,
}

impl SymbolicEntity {
    pub fn new(name: impl Into<String>, acceptor: Acceptor) -> Self {
        SymbolicEntity {
            name: name.into(),
            acceptor,
        }
    }
}

impl PartialEq for SymbolicEntity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for SymbolicEntity {}

impl PartialOrd for SymbolicEntity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for SymbolicEntity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for SymbolicEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A symbolic entity resolved to a specific node identity. Resolution against a particular
/// frame's graph happens lazily via [ConcreteEntity::node_name].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConcreteEntity {
    pub symbolic: SymbolicEntity,
    pub entity_id: String,
}

impl ConcreteEntity {
    pub fn new(symbolic: SymbolicEntity, entity_id: impl Into<String>) -> Self {
        ConcreteEntity {
            symbolic,
            entity_id: entity_id.into(),
        }
    }

    /// The name of the node carrying this entity's id in `graph`, or `None` if the node is not
    /// present in the current frame. Mirrors `ConcreteEntity.get_node_name` in
    /// `original_source/SymbolicEntity.py`, which returns `None` rather than raising.
    pub fn node_name(&self, graph: &Graph) -> Option<String> {
        graph
            .find_by_id(&self.entity_id)
            .map(|idx| graph.nodes()[idx].name.clone())
    }
}

impl fmt::Display for ConcreteEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.symbolic.name, self.entity_id)
    }
}

/// A map from every declared symbolic entity to its resolved node, or `None` while unresolved.
pub type Binding = BTreeMap<SymbolicEntity, Option<ConcreteEntity>>;

/// A named DFA paired with the predicates that decide its guard symbols and the entities those
/// predicates may reference. Immutable once constructed; many [ConcretePropertyInstance]s share
/// one via [Rc].
pub struct SymbolicProperty {
    pub name: String,
    pub dfa: Dfa,
    pub symbol_to_predicate: BTreeMap<String, PredicateNode>,
    pub symbol_to_required_entities: BTreeMap<String, Vec<SymbolicEntity>>,
    pub declared_entities: Vec<SymbolicEntity>,
}

impl SymbolicProperty {
    /// Validates that every symbol referenced by the DFA's guards has a predicate, and that
    /// every predicate references only declared entities. Raises
    /// `MonitorError::MalformedProperty` otherwise.
    pub fn new(
        name: impl Into<String>,
        dfa: Dfa,
        symbol_to_predicate: BTreeMap<String, PredicateNode>,
        declared_entities: Vec<SymbolicEntity>,
    ) -> Result<Self, MonitorError> {
        let name = name.into();

        let mut dfa_symbols = BTreeSet::new();
        for state in 0..declared_state_count(&dfa) {
            for t in dfa.transitions(state) {
                dfa_symbols.extend(t.symbols.iter().cloned());
            }
        }
        for symbol in &dfa_symbols {
            if !symbol_to_predicate.contains_key(symbol) {
                return Err(MonitorError::MalformedProperty {
                    property: name.clone(),
                    reason: format!("DFA references symbol `{symbol}` with no predicate"),
                });
            }
        }

        let mut symbol_to_required_entities = BTreeMap::new();
        for (symbol, predicate) in &symbol_to_predicate {
            let entities = predicate.symbolic_entities();
            for e in &entities {
                if !declared_entities.contains(e) {
                    return Err(MonitorError::MalformedProperty {
                        property: name.clone(),
                        reason: format!(
                            "predicate for symbol `{symbol}` references undeclared entity `{}`",
                            e.name
                        ),
                    });
                }
            }
            symbol_to_required_entities.insert(symbol.clone(), entities);
        }

        Ok(SymbolicProperty {
            name,
            dfa,
            symbol_to_predicate,
            symbol_to_required_entities,
            declared_entities,
        })
    }
}

/// The DFA doesn't expose a state count directly; states are implicitly `0..n` where `n` is one
/// past the highest state index appearing in any transition target or the init state. Walking
/// `transitions(state)` past the real state count simply yields an empty slice, so this just
/// needs a safe upper bound.
fn declared_state_count(dfa: &Dfa) -> usize {
    let mut n = dfa.init_state() + 1;
    let mut state = 0;
    while state < n {
        for t in dfa.transitions(state) {
            if t.target + 1 > n {
                n = t.target + 1;
            }
        }
        state += 1;
    }
    n
}

/// One partially- or fully-bound pursuit of a [SymbolicProperty] against the live stream: a
/// current DFA state, a binding from declared entities to resolved nodes (or `None`), and the
/// full history needed to explain a later violation.
pub struct ConcretePropertyInstance {
    pub property: Rc<SymbolicProperty>,
    pub current_state: StateId,
    pub binding: Binding,
    pub initial_frame: String,
    pub data_history: Vec<(String, BTreeMap<String, Option<bool>>)>,
    pub name_history: Vec<(String, BTreeMap<String, Option<String>>)>,
    pub frames: Vec<String>,
    /// Entities that triggered `Unbound` during the step just taken; cleared at the start of
    /// every step.
    pub undef_scratch: BTreeSet<SymbolicEntity>,
}

/// `true` iff all non-`None` entries are pairwise distinct (by node id) and at least one entry
/// is non-`None`.
pub fn is_valid_binding(binding: &Binding) -> bool {
    let mut seen = BTreeSet::new();
    let mut any_bound = false;
    for concrete in binding.values().flatten() {
        any_bound = true;
        if !seen.insert(concrete.entity_id.as_str()) {
            return false;
        }
    }
    any_bound
}

/// Every non-phantom node `entity`'s acceptor admits, in `graph`.
fn candidates(entity: &SymbolicEntity, graph: &Graph) -> Vec<ConcreteEntity> {
    graph
        .nodes()
        .iter()
        .filter(|n| !n.phantom && entity.acceptor.accepts(n))
        .map(|n| ConcreteEntity::new(entity.clone(), n.id().to_string()))
        .collect()
}

/// Blank-instance creation: one instance per property per frame, all entities unbound, seeding
/// fresh matches.
pub fn expand_blank(property: &Rc<SymbolicProperty>, frame: &str) -> ConcretePropertyInstance {
    let binding = property
        .declared_entities
        .iter()
        .map(|e| (e.clone(), None))
        .collect();
    ConcretePropertyInstance {
        property: property.clone(),
        current_state: property.dfa.init_state(),
        binding,
        initial_frame: frame.to_string(),
        data_history: Vec::new(),
        name_history: Vec::new(),
        frames: Vec::new(),
        undef_scratch: BTreeSet::new(),
    }
}

/// Specific expansion: extend `instance`'s binding for exactly the entities in `entities`,
/// taking the Cartesian product of their candidate sets and discarding combinations that
/// collide with each other or with already-bound entities. The returned instances inherit
/// `inherit_state` rather than `instance.current_state`, since the extension is resuming the
/// step that just discovered these entities were missing, not starting a new one; plus
/// `data_history`/`name_history`/`frames`/`initial_frame` unchanged.
pub fn expand_specific(
    instance: &ConcretePropertyInstance,
    entities: &BTreeSet<SymbolicEntity>,
    graph: &Graph,
    inherit_state: StateId,
) -> Vec<ConcretePropertyInstance> {
    let entities: Vec<&SymbolicEntity> = entities.iter().collect();
    let candidate_lists: Vec<Vec<ConcreteEntity>> =
        entities.iter().map(|e| candidates(e, graph)).collect();
    if candidate_lists.iter().any(Vec::is_empty) {
        return Vec::new();
    }

    let mut combos: Vec<Vec<ConcreteEntity>> = vec![Vec::new()];
    for list in &candidate_lists {
        let mut next = Vec::with_capacity(combos.len() * list.len());
        for combo in &combos {
            for candidate in list {
                let mut extended = combo.clone();
                extended.push(candidate.clone());
                next.push(extended);
            }
        }
        combos = next;
    }

    let already_bound: BTreeSet<String> = instance
        .binding
        .values()
        .flatten()
        .map(|c| c.entity_id.clone())
        .collect();

    let mut out = Vec::new();
    'combo: for combo in combos {
        let mut seen = already_bound.clone();
        for candidate in &combo {
            if !seen.insert(candidate.entity_id.clone()) {
                continue 'combo;
            }
        }
        let mut binding = instance.binding.clone();
        for (entity, candidate) in entities.iter().zip(combo.into_iter()) {
            binding.insert((*entity).clone(), Some(candidate));
        }
        out.push(ConcretePropertyInstance {
            property: instance.property.clone(),
            current_state: inherit_state,
            binding,
            initial_frame: instance.initial_frame.clone(),
            data_history: instance.data_history.clone(),
            name_history: instance.name_history.clone(),
            frames: instance.frames.clone(),
            undef_scratch: BTreeSet::new(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dfa::RawTransition;
    use crate::graph::Node;

    fn tiny_dfa() -> Dfa {
        let states = vec!["s0".to_string(), "s1".to_string()];
        let accepting = BTreeSet::from(["s1".to_string()]);
        Dfa::build(
            &states,
            "s0",
            &accepting,
            vec![RawTransition {
                from: "s0".into(),
                guard: "a".into(),
                to: "s1".into(),
            }],
        )
        .unwrap()
    }

    #[test]
    fn symbolic_entities_compare_by_name_only() {
        let a = SymbolicEntity::new("x", Acceptor::any());
        let b = SymbolicEntity::new("x", Acceptor::base_classes(["car"]));
        assert_eq!(a, b);
    }

    #[test]
    fn property_construction_rejects_missing_predicate() {
        let dfa = tiny_dfa();
        let result = SymbolicProperty::new("p", dfa, BTreeMap::new(), vec![]);
        assert!(matches!(result, Err(MonitorError::MalformedProperty { .. })));
    }

    #[test]
    fn property_construction_rejects_undeclared_entity_reference() {
        let dfa = tiny_dfa();
        let e = SymbolicEntity::new("v1", Acceptor::any());
        let mut predicates = BTreeMap::new();
        predicates.insert("a".to_string(), PredicateNode::Defined(e));
        let result = SymbolicProperty::new("p", dfa, predicates, vec![]);
        assert!(matches!(result, Err(MonitorError::MalformedProperty { .. })));
    }

    #[test]
    fn blank_instance_has_all_none_binding() {
        let dfa = tiny_dfa();
        let e = SymbolicEntity::new("v1", Acceptor::any());
        let mut predicates = BTreeMap::new();
        predicates.insert("a".to_string(), PredicateNode::Defined(e.clone()));
        let property = Rc::new(SymbolicProperty::new("p", dfa, predicates, vec![e]).unwrap());
        let instance = expand_blank(&property, "0");
        assert!(instance.binding.values().all(Option::is_none));
        assert!(!is_valid_binding(&instance.binding));
    }

    #[test]
    fn specific_expansion_skips_colliding_candidates() {
        let dfa = tiny_dfa();
        let v1 = SymbolicEntity::new("v1", Acceptor::base_classes(["vehicle"]));
        let v2 = SymbolicEntity::new("v2", Acceptor::base_classes(["vehicle"]));
        let mut predicates = BTreeMap::new();
        predicates.insert("a".to_string(), PredicateNode::Const(crate::predicate::ConstValue::Bool(true)));
        let property = Rc::new(
            SymbolicProperty::new("p", dfa, predicates, vec![v1.clone(), v2.clone()]).unwrap(),
        );
        let mut g = Graph::new("0", "f0");
        g.add_node(Node::new("A").with_base_class("vehicle"));
        let instance = expand_blank(&property, "0");
        let extensions = expand_specific(
            &instance,
            &BTreeSet::from([v1.clone(), v2.clone()]),
            &g,
            instance.current_state,
        );
        // only one vehicle node exists, so v1 and v2 can never both bind to it
        assert!(extensions.is_empty());
    }
}
