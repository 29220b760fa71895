//! The monitor: owns live concrete property instances and advances them one frame at a time.
//!
//! This is the only stateful, long-lived object in the crate — explicitly constructed and owned
//! by the embedding application. Everything else (graphs, predicates, DFAs, properties) is
//! immutable or frame-scoped.

use crate::error::MonitorError;
use crate::graph::Graph;
use crate::predicate::{self, EvalCtx, EvalResult, Value};
use crate::property::{self, ConcretePropertyInstance, SymbolicProperty};
use crate::violation::{MonitorStats, Violation};
use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Owns the live set of concrete property instances and drives them across frames.
pub struct Monitor {
    log_root: PathBuf,
    route: String,
    symbolic_properties: Vec<Rc<SymbolicProperty>>,
    concrete_properties: Vec<ConcretePropertyInstance>,
    /// Resolved once from the first frame containing a node named `"ego"`, then left untouched,
    /// following `original_source/SymbolicMonitor.py::check`.
    ego_id: OnceCell<Option<String>>,
    iterations: BTreeMap<String, BTreeMap<String, usize>>,
}

impl Monitor {
    /// Creates both `<log_root>/<route>` directories if absent.
    pub fn new(
        log_root: impl Into<PathBuf>,
        route: impl Into<String>,
        symbolic_properties: Vec<Rc<SymbolicProperty>>,
    ) -> Result<Self, MonitorError> {
        let log_root = log_root.into();
        let route = route.into();
        let dir = log_root.join(&route);
        std::fs::create_dir_all(&dir)
            .map_err(|e| MonitorError::Input(format!("could not create {}: {e}", dir.display())))?;
        Ok(Monitor {
            log_root,
            route,
            symbolic_properties,
            concrete_properties: Vec::new(),
            ego_id: OnceCell::new(),
            iterations: BTreeMap::new(),
        })
    }

    pub fn log_root(&self) -> &Path {
        &self.log_root
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// The number of concrete property instances carried into the next frame.
    pub fn live_instance_count(&self) -> usize {
        self.concrete_properties.len()
    }

    /// A short human-readable digest of the most recently processed frame, for a caller that
    /// wants a one-line progress indicator without parsing `stats.json` itself. Returns no
    /// output on its own — this is a pure function, and the embedding application chooses
    /// whether and how to print it.
    pub fn summary_line(&self) -> String {
        match self.iterations.iter().next_back() {
            Some((frame, counts)) => {
                let steps: usize = counts.values().sum();
                format!(
                    "frame {frame}: {} live instances, {steps} steps across {} properties",
                    self.concrete_properties.len(),
                    counts.len()
                )
            }
            None => "no frames processed yet".to_string(),
        }
    }

    /// Advances every live instance (plus a fresh blank instance per symbolic property) against
    /// `graph`, to fixpoint. Returns the violations detected this frame; each is also written to
    /// disk before this call returns, even if a fatal error aborts the frame partway through.
    pub fn check(&mut self, graph: &Graph) -> Result<Vec<Violation>, MonitorError> {
        graph.clear_cache();
        let ego_id = self
            .ego_id
            .get_or_init(|| graph.ego().map(|n| n.id().to_string()))
            .clone();

        let mut work_queue: Vec<ConcretePropertyInstance> = self
            .symbolic_properties
            .iter()
            .map(|p| property::expand_blank(p, &graph.frame))
            .collect();
        work_queue.extend(std::mem::take(&mut self.concrete_properties));

        let mut survivors = Vec::new();
        let mut violations = Vec::new();
        let mut frame_iterations: BTreeMap<String, usize> = BTreeMap::new();

        let outcome = self.drain(&mut work_queue, &mut survivors, &mut violations, &mut frame_iterations, graph, ego_id.as_deref());

        self.concrete_properties = survivors;
        self.iterations.insert(graph.frame.clone(), frame_iterations);
        let stats = MonitorStats(self.iterations.clone());
        stats.write(&self.log_root, &self.route)?;

        match outcome {
            Ok(()) => {
                log::info!(
                    "frame {}: {} instances processed, {} violations",
                    graph.frame,
                    self.iterations.get(&graph.frame).map_or(0, |m| m.values().sum()),
                    violations.len()
                );
                Ok(violations)
            }
            Err(e) => {
                log::error!("frame {}: aborting, {e}", graph.frame);
                Err(e)
            }
        }
    }

    fn drain(
        &self,
        work_queue: &mut Vec<ConcretePropertyInstance>,
        survivors: &mut Vec<ConcretePropertyInstance>,
        violations: &mut Vec<Violation>,
        frame_iterations: &mut BTreeMap<String, usize>,
        graph: &Graph,
        ego_id: Option<&str>,
    ) -> Result<(), MonitorError> {
        while let Some(mut inst) = work_queue.pop() {
            *frame_iterations.entry(inst.property.name.clone()).or_insert(0) += 1;
            let prev_state = inst.current_state;
            inst.undef_scratch.clear();

            match step_instance(&mut inst, graph) {
                Ok(record) => {
                    inst.frames.push(graph.frame.clone());
                    inst.data_history.push((graph.frame.clone(), record));
                    let name_row: BTreeMap<String, Option<String>> = inst
                        .binding
                        .iter()
                        .map(|(e, c)| (e.name.clone(), c.as_ref().and_then(|c| c.node_name(graph))))
                        .collect();
                    inst.name_history.push((graph.frame.clone(), name_row));

                    if !inst.undef_scratch.is_empty() {
                        let entities = inst.undef_scratch.clone();
                        let extensions = property::expand_specific(&inst, &entities, graph, prev_state);
                        log::debug!(
                            "property `{}` partially decided, spawning {} extensions for {:?}",
                            inst.property.name,
                            extensions.len(),
                            entities.iter().map(|e| e.name.as_str()).collect::<Vec<_>>()
                        );
                        work_queue.extend(extensions);
                    }

                    let trap = inst.property.dfa.is_trap(inst.current_state);
                    if trap {
                        if inst.property.dfa.is_accepting(inst.current_state) {
                            log::debug!("property `{}` reached an accepting trap", inst.property.name);
                        } else {
                            let violation = Violation::from_instance(&inst, &graph.frame, ego_id);
                            violation.write(&self.log_root, &self.route)?;
                            violations.push(violation);
                        }
                    } else {
                        survivors.push(inst);
                    }
                }
                Err(MonitorError::Unbound(entities)) => {
                    let entities: BTreeSet<_> = entities.into_iter().collect();
                    let extensions = property::expand_specific(&inst, &entities, graph, prev_state);
                    work_queue.extend(extensions);
                }
                Err(MonitorError::Input(reason)) => {
                    log::warn!("property `{}` instance dropped: {reason}", inst.property.name);
                }
                Err(malformed @ MonitorError::MalformedDfa { .. }) => {
                    log::error!(
                        "property `{}` aborting frame: {malformed}",
                        inst.property.name
                    );
                    return Err(malformed);
                }
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }
}

/// One instance's step: evaluate the current state's required symbols (via cache, falling back
/// to [predicate::eval]), then ask the DFA for the next state. Returns the symbol→value record
/// for this frame's `data_history` row on success.
fn step_instance(
    inst: &mut ConcretePropertyInstance,
    graph: &Graph,
) -> Result<BTreeMap<String, Option<bool>>, MonitorError> {
    let required_symbols = inst.property.dfa.symbols_for(inst.current_state);
    let mut values: BTreeMap<String, bool> = BTreeMap::new();
    let mut record: BTreeMap<String, Option<bool>> = BTreeMap::new();

    for symbol in &required_symbols {
        let key = predicate::cache_key(&inst.property.name, symbol, &inst.binding);
        let result = match graph.cache_get(&key) {
            Some(cached) => cached,
            None => {
                let node = inst
                    .property
                    .symbol_to_predicate
                    .get(symbol)
                    .expect("symbol set validated against predicates at property construction");
                let ctx = EvalCtx {
                    graph,
                    binding: &inst.binding,
                };
                let result = predicate::eval(node, &ctx)?;
                graph.cache_insert(key, result.clone());
                result
            }
        };
        match result {
            EvalResult::Decided(Value::Bool(b)) => {
                values.insert(symbol.clone(), b);
                record.insert(symbol.clone(), Some(b));
            }
            EvalResult::Decided(other) => {
                return Err(MonitorError::Input(format!(
                    "symbol `{symbol}` predicate did not evaluate to a boolean: {other}"
                )));
            }
            EvalResult::Unbound(entities) => {
                inst.undef_scratch.extend(entities);
                record.insert(symbol.clone(), None);
            }
        }
    }

    match inst.property.dfa.step(inst.current_state, &values)? {
        Some(target) => {
            inst.current_state = target;
            Ok(record)
        }
        None => Err(MonitorError::Unbound(inst.undef_scratch.iter().cloned().collect())),
    }
}
