//! The DFA representation consumed by a symbolic property.
//!
//! The DFA itself is not compiled here — an external LTLf-to-DFA tool produces the raw artifact
//! (state labels, transition guard strings, the accepting set); this module only parses the
//! artifact into an evaluable [Dfa] once, at load time.

use super::guard::{eval_guard, parse_guard, GuardExpr};
use crate::error::{MonitorError, StateId};
use std::collections::{BTreeMap, BTreeSet};

/// State label that marks a DFA the upstream compiler failed to parse
/// (`original_source/LTLfDFA.py`: `"Mona could not parse DFA - formula may be too large"`).
const MONA_ERROR_MARKER: &str = "0.0";

/// State label the upstream compiler's output sometimes carries for a node with no real
/// transitions, left over from its dot-format serialisation.
const UNREACHABLE_PARSER_SENTINEL: &str = "\\n";

/// One outgoing transition: a parsed guard, the symbols it references, and the target state.
#[derive(Clone, Debug)]
pub struct DfaTransition {
    pub guard: GuardExpr,
    pub symbols: Vec<String>,
    pub target: StateId,
}

/// A single raw transition as read from the DFA artifact, before parsing.
pub struct RawTransition {
    pub from: String,
    pub guard: String,
    pub to: String,
}

/// A parsed, evaluable DFA. Construction is the only place guard strings are ever parsed.
pub struct Dfa {
    state_labels: Vec<String>,
    init_state: StateId,
    accepting: BTreeSet<StateId>,
    transitions: Vec<Vec<DfaTransition>>,
    trap_states: BTreeSet<StateId>,
}

impl Dfa {
    /// Build a [Dfa] from a raw artifact: every state label that appears anywhere (as a
    /// transition endpoint, the init state, or an accepting state), the init state's label, the
    /// accepting labels, and the raw `(from, guard, to)` transitions.
    pub fn build(
        states: &[String],
        init_label: &str,
        accepting_labels: &BTreeSet<String>,
        raw_transitions: Vec<RawTransition>,
    ) -> Result<Dfa, MonitorError> {
        if states.is_empty() {
            return Err(MonitorError::Input("DFA artifact has no states".to_string()));
        }
        for label in states {
            if label == MONA_ERROR_MARKER {
                return Err(MonitorError::Input(
                    "DFA artifact contains the Mona parse-failure marker state `0.0`".to_string(),
                ));
            }
            if label == UNREACHABLE_PARSER_SENTINEL {
                return Err(MonitorError::Input(
                    "DFA artifact contains the unreachable parser sentinel state".to_string(),
                ));
            }
        }

        let mut index_of: BTreeMap<&str, StateId> = BTreeMap::new();
        for (i, label) in states.iter().enumerate() {
            index_of.insert(label.as_str(), i);
        }
        let resolve = |label: &str| -> Result<StateId, MonitorError> {
            index_of.get(label).copied().ok_or_else(|| {
                MonitorError::Input(format!("DFA transition references undeclared state `{label}`"))
            })
        };

        let init_state = resolve(init_label)?;
        let mut accepting = BTreeSet::new();
        for label in accepting_labels {
            accepting.insert(resolve(label)?);
        }

        let mut transitions: Vec<Vec<DfaTransition>> = vec![Vec::new(); states.len()];
        for raw in raw_transitions {
            let from = resolve(&raw.from)?;
            let to = resolve(&raw.to)?;
            let guard = parse_guard(&raw.guard)
                .map_err(|reason| MonitorError::Input(format!("malformed guard `{}`: {reason}", raw.guard)))?;
            let symbols = guard.symbols();
            transitions[from].push(DfaTransition {
                guard,
                symbols,
                target: to,
            });
        }

        let trap_states = (0..states.len())
            .filter(|&s| !transitions[s].is_empty() && transitions[s].iter().all(|t| t.target == s))
            .collect();

        Ok(Dfa {
            state_labels: states.to_vec(),
            init_state,
            accepting,
            transitions,
            trap_states,
        })
    }

    pub fn init_state(&self) -> StateId {
        self.init_state
    }

    pub fn is_accepting(&self, state: StateId) -> bool {
        self.accepting.contains(&state)
    }

    pub fn is_trap(&self, state: StateId) -> bool {
        self.trap_states.contains(&state)
    }

    pub fn state_label(&self, state: StateId) -> &str {
        &self.state_labels[state]
    }

    pub fn transitions(&self, state: StateId) -> &[DfaTransition] {
        &self.transitions[state]
    }

    /// Every distinct symbol referenced by any transition out of `state` — the minimal set the
    /// monitor's step procedure must evaluate.
    pub fn symbols_for(&self, state: StateId) -> Vec<String> {
        let mut out = Vec::new();
        for t in &self.transitions[state] {
            for s in &t.symbols {
                if !out.contains(s) {
                    out.push(s.clone());
                }
            }
        }
        out
    }

    /// Select the unique transition out of `state` whose guard is true under `values`, where
    /// `values` holds a decided boolean for every symbol in `decided_symbols` and omits the rest.
    /// Returns:
    /// - `Ok(Some(target))` if exactly one transition fired.
    /// - `Ok(None)` if zero fired and at least one transition referenced an undecided symbol
    ///   (the caller turns this into an `Unbound` control signal).
    /// - `Err(MalformedDfa)` if zero fired with no undecided symbols, or more than one fired.
    pub fn step(
        &self,
        state: StateId,
        values: &BTreeMap<String, bool>,
    ) -> Result<Option<StateId>, MonitorError> {
        let mut fired = Vec::new();
        let mut any_undecided = false;
        for t in &self.transitions[state] {
            if t.symbols.iter().any(|s| !values.contains_key(s)) {
                any_undecided = true;
                continue;
            }
            if eval_guard(&t.guard, values) {
                fired.push(t.target);
            }
        }
        match fired.len() {
            1 => Ok(Some(fired[0])),
            0 if any_undecided => Ok(None),
            fired_count => Err(MonitorError::MalformedDfa {
                state,
                fired: fired_count,
            }),
        }
    }
}
