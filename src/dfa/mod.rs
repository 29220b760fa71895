//! The DFA layer: guard parsing and the automaton itself.

mod automaton;
mod guard;

pub use automaton::{Dfa, DfaTransition, RawTransition};
pub use guard::{eval_guard, parse_guard, GuardExpr};
