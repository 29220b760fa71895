//! Error types shared across the predicate, DFA, property, and monitor layers.

use crate::property::SymbolicEntity;

/// A DFA state index, re-exported here since several error variants reference it.
pub type StateId = usize;

/// All ways the monitor's components can fail.
///
/// [`MonitorError::Unbound`] is a control signal, not a fatal condition: it is always caught at
/// the monitor's work-queue boundary and never escapes `Monitor::check`. The remaining variants
/// propagate to the caller.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// A step could not decide any transition because some referenced symbolic entities are
    /// still unbound. Carries the entities responsible so the monitor can expand the instance.
    #[error("unresolved symbolic entities: {}", format_entities(.0))]
    Unbound(Vec<SymbolicEntity>),

    /// Zero or more than one outgoing transition evaluated true under a complete binding.
    #[error(
        "malformed DFA: state {state} had {fired} firing transitions under a complete binding (expected exactly 1)"
    )]
    MalformedDfa { state: StateId, fired: usize },

    /// A symbolic property's predicates reference symbols outside the DFA's alphabet, or
    /// predicates reference symbolic entities outside the property's declared entities.
    #[error("malformed property `{property}`: {reason}")]
    MalformedProperty { property: String, reason: String },

    /// The DFA artifact was unparsable or empty, a candidate node was missing a required
    /// attribute, or a predicate applied a non-string filter to a non-string attribute.
    #[error("input error: {0}")]
    Input(String),
}

fn format_entities(entities: &[SymbolicEntity]) -> String {
    entities
        .iter()
        .map(|e| e.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience alias used by the lower-level parsing/evaluation helpers.
pub type Result<T> = std::result::Result<T, MonitorError>;
