//! The predicate algebra's syntax tree: a tagged tree of deferred operator applications.
//!
//! Predicates are data, not closures — this is what lets [crate::property::SymbolicProperty]
//! inspect a predicate for the symbolic entities it references and build the memoisation key
//! without ever calling it.

use crate::graph::EdgeDirection;
use crate::property::SymbolicEntity;
use std::fmt;

/// A literal set-introducing atom.
#[derive(Clone, Debug, PartialEq)]
pub enum SetLiteral {
    /// The singleton set containing the node named `"ego"`.
    Ego,
    /// The set of every node in the graph.
    All,
    /// Resolved via the binding to a singleton set or the empty set.
    Entity(SymbolicEntity),
}

/// A filter applied by `filterByAttr`.
#[derive(Clone, Debug)]
pub enum AttrFilter {
    /// Regular expression matched against a string-valued attribute.
    Regex(String),
    /// A comparison against a numeric attribute, e.g. `lt(1.5)`.
    Numeric(Comparison),
}

impl PartialEq for AttrFilter {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttrFilter::Regex(a), AttrFilter::Regex(b)) => a == b,
            (AttrFilter::Numeric(a), AttrFilter::Numeric(b)) => a == b,
            _ => false,
        }
    }
}

/// A numeric comparison operator paired with its right-hand-side constant, used by
/// [AttrFilter::Numeric].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Comparison {
    pub op: CompareOp,
    pub rhs: f64,
}

impl Comparison {
    pub fn matches(&self, value: f64) -> bool {
        match self.op {
            CompareOp::Lt => value < self.rhs,
            CompareOp::Le => value <= self.rhs,
            CompareOp::Gt => value > self.rhs,
            CompareOp::Ge => value >= self.rhs,
            CompareOp::Eq => value == self.rhs,
            CompareOp::Ne => value != self.rhs,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// One node in the predicate syntax tree.
#[derive(Clone, Debug, PartialEq)]
pub enum PredicateNode {
    /// A set literal: `"Ego"`, `"G"`, or a symbolic entity.
    Literal(SetLiteral),
    /// A boolean or numeric constant.
    Const(ConstValue),
    /// `filterByAttr(set, attr_name, filter)`.
    FilterByAttr {
        set: Box<PredicateNode>,
        attr: String,
        filter: AttrFilter,
    },
    /// `relSet(set, relation_label, edge_direction)`.
    RelSet {
        set: Box<PredicateNode>,
        relation: String,
        direction: EdgeDirection,
    },
    Union(Box<PredicateNode>, Box<PredicateNode>),
    Intersection(Box<PredicateNode>, Box<PredicateNode>),
    Difference(Box<PredicateNode>, Box<PredicateNode>),
    SymmetricDifference(Box<PredicateNode>, Box<PredicateNode>),
    /// `size(set) -> int`.
    Size(Box<PredicateNode>),
    Compare {
        op: CompareOp,
        lhs: Box<PredicateNode>,
        rhs: Box<PredicateNode>,
    },
    And(Box<PredicateNode>, Box<PredicateNode>),
    Or(Box<PredicateNode>, Box<PredicateNode>),
    Not(Box<PredicateNode>),
    Implies(Box<PredicateNode>, Box<PredicateNode>),
    Xor(Box<PredicateNode>, Box<PredicateNode>),
    BooleanEquals(Box<PredicateNode>, Box<PredicateNode>),
    Ite {
        cond: Box<PredicateNode>,
        then_branch: Box<PredicateNode>,
        else_branch: Box<PredicateNode>,
    },
    /// `defined(symbolic_entity)`.
    Defined(SymbolicEntity),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConstValue {
    Bool(bool),
    Int(i64),
}

impl PredicateNode {
    pub fn ego() -> Self {
        PredicateNode::Literal(SetLiteral::Ego)
    }

    pub fn all_nodes() -> Self {
        PredicateNode::Literal(SetLiteral::All)
    }

    pub fn entity(e: SymbolicEntity) -> Self {
        PredicateNode::Literal(SetLiteral::Entity(e))
    }

    pub fn filter_by_attr(
        set: PredicateNode,
        attr: impl Into<String>,
        filter: AttrFilter,
    ) -> Self {
        PredicateNode::FilterByAttr {
            set: Box::new(set),
            attr: attr.into(),
            filter,
        }
    }

    pub fn rel_set(set: PredicateNode, relation: impl Into<String>, direction: EdgeDirection) -> Self {
        PredicateNode::RelSet {
            set: Box::new(set),
            relation: relation.into(),
            direction,
        }
    }

    pub fn size(set: PredicateNode) -> Self {
        PredicateNode::Size(Box::new(set))
    }

    pub fn compare(op: CompareOp, lhs: PredicateNode, rhs: PredicateNode) -> Self {
        PredicateNode::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn ite(cond: PredicateNode, then_branch: PredicateNode, else_branch: PredicateNode) -> Self {
        PredicateNode::Ite {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        }
    }

    /// Every symbolic entity mentioned anywhere in this predicate's subtree, in the order
    /// first-seen. Used to compute `symbol_to_required_entities` at property construction.
    pub fn symbolic_entities(&self) -> Vec<SymbolicEntity> {
        let mut found = Vec::new();
        self.collect_entities(&mut found);
        found
    }

    fn collect_entities(&self, out: &mut Vec<SymbolicEntity>) {
        let mut push = |e: &SymbolicEntity| {
            if !out.contains(e) {
                out.push(e.clone());
            }
        };
        match self {
            PredicateNode::Literal(SetLiteral::Entity(e)) => push(e),
            PredicateNode::Defined(e) => push(e),
            PredicateNode::Literal(_) | PredicateNode::Const(_) => {}
            PredicateNode::FilterByAttr { set, .. } => set.collect_entities(out),
            PredicateNode::RelSet { set, .. } => set.collect_entities(out),
            PredicateNode::Size(set) => set.collect_entities(out),
            PredicateNode::Not(a) => a.collect_entities(out),
            PredicateNode::Union(a, b)
            | PredicateNode::Intersection(a, b)
            | PredicateNode::Difference(a, b)
            | PredicateNode::SymmetricDifference(a, b)
            | PredicateNode::And(a, b)
            | PredicateNode::Or(a, b)
            | PredicateNode::Implies(a, b)
            | PredicateNode::Xor(a, b)
            | PredicateNode::BooleanEquals(a, b) => {
                a.collect_entities(out);
                b.collect_entities(out);
            }
            PredicateNode::Compare { lhs, rhs, .. } => {
                lhs.collect_entities(out);
                rhs.collect_entities(out);
            }
            PredicateNode::Ite {
                cond,
                then_branch,
                else_branch,
            } => {
                cond.collect_entities(out);
                then_branch.collect_entities(out);
                else_branch.collect_entities(out);
            }
        }
    }
}

impl fmt::Display for PredicateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredicateNode::Literal(SetLiteral::Ego) => write!(f, "Ego"),
            PredicateNode::Literal(SetLiteral::All) => write!(f, "G"),
            PredicateNode::Literal(SetLiteral::Entity(e)) => write!(f, "{}", e.name),
            PredicateNode::Const(ConstValue::Bool(b)) => write!(f, "{b}"),
            PredicateNode::Const(ConstValue::Int(i)) => write!(f, "{i}"),
            PredicateNode::FilterByAttr { set, attr, .. } => {
                write!(f, "filterByAttr({set}, {attr})")
            }
            PredicateNode::RelSet { set, relation, .. } => write!(f, "relSet({set}, {relation})"),
            PredicateNode::Union(a, b) => write!(f, "({a} | {b})"),
            PredicateNode::Intersection(a, b) => write!(f, "({a} & {b})"),
            PredicateNode::Difference(a, b) => write!(f, "({a} - {b})"),
            PredicateNode::SymmetricDifference(a, b) => write!(f, "({a} ^ {b})"),
            PredicateNode::Size(a) => write!(f, "size({a})"),
            PredicateNode::Compare { op, lhs, rhs } => write!(f, "({lhs} {op:?} {rhs})"),
            PredicateNode::And(a, b) => write!(f, "({a} and {b})"),
            PredicateNode::Or(a, b) => write!(f, "({a} or {b})"),
            PredicateNode::Not(a) => write!(f, "(not {a})"),
            PredicateNode::Implies(a, b) => write!(f, "({a} => {b})"),
            PredicateNode::Xor(a, b) => write!(f, "({a} xor {b})"),
            PredicateNode::BooleanEquals(a, b) => write!(f, "({a} == {b})"),
            PredicateNode::Ite {
                cond,
                then_branch,
                else_branch,
            } => write!(f, "ite({cond}, {then_branch}, {else_branch})"),
            PredicateNode::Defined(e) => write!(f, "defined({})", e.name),
        }
    }
}
