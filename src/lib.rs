//! A runtime monitor that checks an evolving scene graph against symbolic, LTLf-derived
//! properties, frame by frame. As of now, the library supports:
//!  - Three-valued predicate evaluation over a per-frame scene graph, with explicit
//!    handling of symbolic entities that aren't yet bound to a concrete node.
//!  - DFA-backed property tracking, where the DFA's guards are parsed once at construction
//!    and never re-parsed on the hot path.
//!  - Lazy, Cartesian-product expansion of symbolic entity bindings as matching nodes
//!    appear in the stream.
//!  - Per-frame predicate memoisation shared across every concrete instance of a property.
//!  - Synchronous violation and diagnostic-stats reporting to a log directory.

pub mod dfa;
pub mod error;
pub mod graph;
pub mod monitor;
pub mod predicate;
pub mod property;
pub mod violation;

pub use error::{MonitorError, Result};
pub use graph::{Edge, EdgeDirection, Graph, Node};
pub use monitor::Monitor;
pub use property::{Acceptor, SymbolicEntity, SymbolicProperty};
pub use violation::Violation;
