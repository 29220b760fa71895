//! Three-valued evaluation of [PredicateNode] trees against a graph and a binding.
//!
//! Evaluation never panics or raises on an unbound symbolic entity: it instead produces
//! [EvalResult::Unbound] carrying the entities responsible,
//! and that value propagates through the set operators unchanged while the logical operators
//! implement short-circuit-tolerant three-valued semantics (`and(false, Unbound) = false`,
//! `or(true, Unbound) = true`, `not(Unbound) = Unbound`).

use super::node::{AttrFilter, CompareOp, ConstValue, PredicateNode, SetLiteral};
use crate::error::MonitorError;
use crate::graph::{EdgeDirection, Graph};
use crate::property::{Binding, SymbolicEntity};
use std::collections::BTreeSet;
use std::fmt;

/// A decided (fully resolved) predicate value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Nodes(BTreeSet<usize>),
    Int(i64),
    Bool(bool),
}

impl Value {
    fn as_nodes(&self) -> Option<&BTreeSet<usize>> {
        match self {
            Value::Nodes(s) => Some(s),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nodes(s) => write!(f, "{{{} nodes}}", s.len()),
            Value::Int(i) => write!(f, "{i}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// The three-valued result of evaluating a [PredicateNode].
#[derive(Clone, Debug, PartialEq)]
pub enum EvalResult {
    Decided(Value),
    /// Cannot be decided with the current binding; carries the entities responsible.
    Unbound(BTreeSet<SymbolicEntity>),
}

impl EvalResult {
    fn unbound_of(entities: impl IntoIterator<Item = SymbolicEntity>) -> Self {
        EvalResult::Unbound(entities.into_iter().collect())
    }

    /// If either side is [EvalResult::Unbound], returns the merged unbound result; otherwise
    /// `None`, meaning the caller should proceed to combine the two decided values.
    fn merge_unbound(a: &EvalResult, b: &EvalResult) -> Option<EvalResult> {
        match (a, b) {
            (EvalResult::Unbound(x), EvalResult::Unbound(y)) => {
                Some(EvalResult::unbound_of(x.iter().chain(y).cloned()))
            }
            (EvalResult::Unbound(x), _) => Some(EvalResult::unbound_of(x.iter().cloned())),
            (_, EvalResult::Unbound(y)) => Some(EvalResult::unbound_of(y.iter().cloned())),
            (EvalResult::Decided(_), EvalResult::Decided(_)) => None,
        }
    }

    pub fn is_unbound(&self) -> bool {
        matches!(self, EvalResult::Unbound(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            EvalResult::Decided(v) => v.as_bool(),
            EvalResult::Unbound(_) => None,
        }
    }
}

/// Evaluation context threaded through every recursive call: the current frame's graph and the
/// instance's entity binding.
pub struct EvalCtx<'a> {
    pub graph: &'a Graph,
    pub binding: &'a Binding,
}

#[derive(Clone, Copy)]
enum SetOp {
    Union,
    Intersection,
    Difference,
    SymmetricDifference,
}

fn apply_set_op(op: SetOp, a: &BTreeSet<usize>, b: &BTreeSet<usize>) -> BTreeSet<usize> {
    match op {
        SetOp::Union => a.union(b).copied().collect(),
        SetOp::Intersection => a.intersection(b).copied().collect(),
        SetOp::Difference => a.difference(b).copied().collect(),
        SetOp::SymmetricDifference => a.symmetric_difference(b).copied().collect(),
    }
}

/// Evaluate `node` against `ctx`. Returns `Err` only for [MonitorError::Input] conditions (a
/// malformed filter/attribute combination, or a type mismatch such as `size()` on a non-set) —
/// unresolved symbolic entities are reported through [EvalResult::Unbound], not as an `Err`.
pub fn eval(node: &PredicateNode, ctx: &EvalCtx) -> Result<EvalResult, MonitorError> {
    match node {
        PredicateNode::Literal(SetLiteral::Ego) => {
            let set = ctx
                .graph
                .nodes()
                .iter()
                .enumerate()
                .filter(|(_, n)| n.is_ego())
                .map(|(i, _)| i)
                .collect();
            Ok(EvalResult::Decided(Value::Nodes(set)))
        }
        PredicateNode::Literal(SetLiteral::All) => {
            let set = (0..ctx.graph.nodes().len()).collect();
            Ok(EvalResult::Decided(Value::Nodes(set)))
        }
        PredicateNode::Literal(SetLiteral::Entity(e)) => match ctx.binding.get(e) {
            None | Some(None) => Ok(EvalResult::unbound_of([e.clone()])),
            Some(Some(concrete)) => {
                let set = match ctx.graph.find_by_id(&concrete.entity_id) {
                    Some(idx) => BTreeSet::from([idx]),
                    None => BTreeSet::new(),
                };
                Ok(EvalResult::Decided(Value::Nodes(set)))
            }
        },
        PredicateNode::Const(ConstValue::Bool(b)) => Ok(EvalResult::Decided(Value::Bool(*b))),
        PredicateNode::Const(ConstValue::Int(i)) => Ok(EvalResult::Decided(Value::Int(*i))),

        PredicateNode::FilterByAttr { set, attr, filter } => {
            eval_filter_by_attr(set, attr, filter, ctx)
        }
        PredicateNode::RelSet {
            set,
            relation,
            direction,
        } => eval_rel_set(set, relation, *direction, ctx),

        PredicateNode::Union(a, b) => eval_set_op(a, b, ctx, SetOp::Union),
        PredicateNode::Intersection(a, b) => eval_set_op(a, b, ctx, SetOp::Intersection),
        PredicateNode::Difference(a, b) => eval_set_op(a, b, ctx, SetOp::Difference),
        PredicateNode::SymmetricDifference(a, b) => {
            eval_set_op(a, b, ctx, SetOp::SymmetricDifference)
        }

        PredicateNode::Size(a) => {
            let v = eval(a, ctx)?;
            match v {
                EvalResult::Unbound(e) => Ok(EvalResult::Unbound(e)),
                EvalResult::Decided(value) => {
                    let nodes = value.as_nodes().ok_or_else(|| {
                        MonitorError::Input("size() applied to a non-set value".into())
                    })?;
                    Ok(EvalResult::Decided(Value::Int(nodes.len() as i64)))
                }
            }
        }

        PredicateNode::Compare { op, lhs, rhs } => eval_compare(*op, lhs, rhs, ctx),

        PredicateNode::And(a, b) => eval_logic_and(a, b, ctx),
        PredicateNode::Or(a, b) => eval_logic_or(a, b, ctx),
        PredicateNode::Not(a) => eval_logic_not(a, ctx),
        PredicateNode::Implies(a, b) => {
            // a -> b is equivalent to ~a | b (original_source/SG_Primitives.py::logic_implies),
            // which also gives implication the right short-circuit behaviour for a false/unbound
            // antecedent for free.
            let not_a = eval_logic_not(a, ctx)?;
            combine_or(not_a, b, ctx)
        }
        PredicateNode::Xor(a, b) => eval_logic_xor(a, b, ctx),
        PredicateNode::BooleanEquals(a, b) => {
            let xor = eval_logic_xor(a, b, ctx)?;
            negate_result(xor)
        }
        PredicateNode::Ite {
            cond,
            then_branch,
            else_branch,
        } => {
            let c = eval(cond, ctx)?;
            match c {
                EvalResult::Unbound(e) => Ok(EvalResult::Unbound(e)),
                EvalResult::Decided(Value::Bool(true)) => eval(then_branch, ctx),
                EvalResult::Decided(Value::Bool(false)) => eval(else_branch, ctx),
                EvalResult::Decided(other) => Err(MonitorError::Input(format!(
                    "ite() condition must be boolean, got {other}"
                ))),
            }
        }
        PredicateNode::Defined(e) => {
            let defined = matches!(ctx.binding.get(e), Some(Some(_)));
            Ok(EvalResult::Decided(Value::Bool(defined)))
        }
    }
}

fn eval_filter_by_attr(
    set: &PredicateNode,
    attr: &str,
    filter: &AttrFilter,
    ctx: &EvalCtx,
) -> Result<EvalResult, MonitorError> {
    let v = eval(set, ctx)?;
    let nodes = match v {
        EvalResult::Unbound(e) => return Ok(EvalResult::Unbound(e)),
        EvalResult::Decided(value) => value
            .as_nodes()
            .ok_or_else(|| MonitorError::Input("filterByAttr() applied to a non-set value".into()))?
            .clone(),
    };
    let mut kept = BTreeSet::new();
    for idx in nodes {
        let node = &ctx.graph.nodes()[idx];
        let matches = match filter {
            AttrFilter::Regex(pattern) => {
                let value = match attr {
                    "name" => Some(node.name.as_str()),
                    "base_class" => node.base_class.as_deref(),
                    other => node.attr.get(other).and_then(|v| v.as_str()),
                };
                let value = value.ok_or_else(|| {
                    MonitorError::Input(format!(
                        "attribute `{attr}` on node `{}` is not a string",
                        node.name
                    ))
                })?;
                let re = regex::Regex::new(pattern)
                    .map_err(|e| MonitorError::Input(format!("invalid regex `{pattern}`: {e}")))?;
                re.is_match(value)
            }
            AttrFilter::Numeric(cmp) => {
                let value = match attr {
                    "name" | "base_class" => {
                        return Err(MonitorError::Input(format!(
                            "attribute `{attr}` cannot be compared numerically"
                        )));
                    }
                    other => node.attr.get(other).and_then(|v| v.as_f64()),
                };
                let value = value.ok_or_else(|| {
                    MonitorError::Input(format!(
                        "attribute `{attr}` on node `{}` is not numeric",
                        node.name
                    ))
                })?;
                match cmp.op {
                    CompareOp::Lt => value < cmp.rhs,
                    CompareOp::Le => value <= cmp.rhs,
                    CompareOp::Gt => value > cmp.rhs,
                    CompareOp::Ge => value >= cmp.rhs,
                    CompareOp::Eq => value == cmp.rhs,
                    CompareOp::Ne => value != cmp.rhs,
                }
            }
        };
        if matches {
            kept.insert(idx);
        }
    }
    Ok(EvalResult::Decided(Value::Nodes(kept)))
}

fn eval_rel_set(
    set: &PredicateNode,
    relation: &str,
    direction: EdgeDirection,
    ctx: &EvalCtx,
) -> Result<EvalResult, MonitorError> {
    let v = eval(set, ctx)?;
    let nodes = match v {
        EvalResult::Unbound(e) => return Ok(EvalResult::Unbound(e)),
        EvalResult::Decided(value) => value
            .as_nodes()
            .ok_or_else(|| MonitorError::Input("relSet() applied to a non-set value".into()))?
            .clone(),
    };
    let mut out = BTreeSet::new();
    for idx in nodes {
        out.extend(ctx.graph.related(idx, relation, direction));
    }
    Ok(EvalResult::Decided(Value::Nodes(out)))
}

fn eval_set_op(
    a: &PredicateNode,
    b: &PredicateNode,
    ctx: &EvalCtx,
    op: SetOp,
) -> Result<EvalResult, MonitorError> {
    let va = eval(a, ctx)?;
    let vb = eval(b, ctx)?;
    if let Some(u) = EvalResult::merge_unbound(&va, &vb) {
        return Ok(u);
    }
    let (EvalResult::Decided(va), EvalResult::Decided(vb)) = (va, vb) else {
        unreachable!("merge_unbound returns Some unless both sides are Decided");
    };
    let sa = va
        .as_nodes()
        .ok_or_else(|| MonitorError::Input("set operator applied to a non-set value".into()))?;
    let sb = vb
        .as_nodes()
        .ok_or_else(|| MonitorError::Input("set operator applied to a non-set value".into()))?;
    Ok(EvalResult::Decided(Value::Nodes(apply_set_op(op, sa, sb))))
}

fn eval_compare(
    op: CompareOp,
    lhs: &PredicateNode,
    rhs: &PredicateNode,
    ctx: &EvalCtx,
) -> Result<EvalResult, MonitorError> {
    let vl = eval(lhs, ctx)?;
    let vr = eval(rhs, ctx)?;
    if let Some(u) = EvalResult::merge_unbound(&vl, &vr) {
        return Ok(u);
    }
    let (EvalResult::Decided(vl), EvalResult::Decided(vr)) = (vl, vr) else {
        unreachable!("merge_unbound returns Some unless both sides are Decided");
    };
    let l = vl
        .as_int()
        .ok_or_else(|| MonitorError::Input(format!("comparison left-hand side is not numeric: {vl}")))?;
    let r = vr
        .as_int()
        .ok_or_else(|| MonitorError::Input(format!("comparison right-hand side is not numeric: {vr}")))?;
    let result = match op {
        CompareOp::Lt => l < r,
        CompareOp::Le => l <= r,
        CompareOp::Gt => l > r,
        CompareOp::Ge => l >= r,
        CompareOp::Eq => l == r,
        CompareOp::Ne => l != r,
    };
    Ok(EvalResult::Decided(Value::Bool(result)))
}

fn require_bool(v: EvalResult) -> Result<EvalResult, MonitorError> {
    match &v {
        EvalResult::Unbound(_) => Ok(v),
        EvalResult::Decided(Value::Bool(_)) => Ok(v),
        EvalResult::Decided(other) => Err(MonitorError::Input(format!(
            "expected a boolean operand, got {other}"
        ))),
    }
}

fn eval_logic_and(a: &PredicateNode, b: &PredicateNode, ctx: &EvalCtx) -> Result<EvalResult, MonitorError> {
    let va = require_bool(eval(a, ctx)?)?;
    match va {
        EvalResult::Decided(Value::Bool(false)) => Ok(EvalResult::Decided(Value::Bool(false))),
        EvalResult::Decided(Value::Bool(true)) => require_bool(eval(b, ctx)?),
        EvalResult::Unbound(ea) => {
            let vb = require_bool(eval(b, ctx)?)?;
            match vb {
                EvalResult::Decided(Value::Bool(false)) => Ok(EvalResult::Decided(Value::Bool(false))),
                EvalResult::Decided(Value::Bool(true)) => Ok(EvalResult::Unbound(ea)),
                EvalResult::Unbound(eb) => {
                    Ok(EvalResult::unbound_of(ea.into_iter().chain(eb)))
                }
                EvalResult::Decided(_) => unreachable!("require_bool guarantees a Bool"),
            }
        }
        EvalResult::Decided(_) => unreachable!("require_bool guarantees a Bool"),
    }
}

fn eval_logic_or(a: &PredicateNode, b: &PredicateNode, ctx: &EvalCtx) -> Result<EvalResult, MonitorError> {
    let va = require_bool(eval(a, ctx)?)?;
    combine_or(va, b, ctx)
}

/// Shared by [eval_logic_or] and `Implies`, which needs to combine an already-evaluated left
/// operand (`not a`) with a not-yet-evaluated right operand.
fn combine_or(va: EvalResult, b: &PredicateNode, ctx: &EvalCtx) -> Result<EvalResult, MonitorError> {
    match va {
        EvalResult::Decided(Value::Bool(true)) => Ok(EvalResult::Decided(Value::Bool(true))),
        EvalResult::Decided(Value::Bool(false)) => require_bool(eval(b, ctx)?),
        EvalResult::Unbound(ea) => {
            let vb = require_bool(eval(b, ctx)?)?;
            match vb {
                EvalResult::Decided(Value::Bool(true)) => Ok(EvalResult::Decided(Value::Bool(true))),
                EvalResult::Decided(Value::Bool(false)) => Ok(EvalResult::Unbound(ea)),
                EvalResult::Unbound(eb) => {
                    Ok(EvalResult::unbound_of(ea.into_iter().chain(eb)))
                }
                EvalResult::Decided(_) => unreachable!("require_bool guarantees a Bool"),
            }
        }
        EvalResult::Decided(_) => unreachable!("require_bool guarantees a Bool"),
    }
}

fn eval_logic_not(a: &PredicateNode, ctx: &EvalCtx) -> Result<EvalResult, MonitorError> {
    negate_result(require_bool(eval(a, ctx)?)?)
}

fn negate_result(v: EvalResult) -> Result<EvalResult, MonitorError> {
    match v {
        EvalResult::Decided(Value::Bool(b)) => Ok(EvalResult::Decided(Value::Bool(!b))),
        EvalResult::Unbound(e) => Ok(EvalResult::Unbound(e)),
        EvalResult::Decided(other) => Err(MonitorError::Input(format!(
            "expected a boolean operand, got {other}"
        ))),
    }
}

/// `xor` has no short-circuit: both sides must be decided to produce a decided result.
fn eval_logic_xor(a: &PredicateNode, b: &PredicateNode, ctx: &EvalCtx) -> Result<EvalResult, MonitorError> {
    let va = require_bool(eval(a, ctx)?)?;
    let vb = require_bool(eval(b, ctx)?)?;
    if let Some(u) = EvalResult::merge_unbound(&va, &vb) {
        return Ok(u);
    }
    let (EvalResult::Decided(Value::Bool(ba)), EvalResult::Decided(Value::Bool(bb))) = (va, vb) else {
        unreachable!("require_bool + merge_unbound guarantee two decided Bools here");
    };
    Ok(EvalResult::Decided(Value::Bool(ba ^ bb)))
}
