//! Violation records and the per-route `stats.json` diagnostic file.
//!
//! Both are serialised with `serde_json` and written synchronously as soon as they're produced:
//! a run that later hits a fatal error still leaves whatever was written here on disk.

use crate::error::MonitorError;
use crate::property::ConcretePropertyInstance;
use std::collections::BTreeMap;
use std::path::Path;

/// One property instance's irrevocable failure, recorded with enough history to replay how the
/// binding evolved up to the moment of violation.
#[derive(Debug, serde::Serialize)]
pub struct Violation {
    pub property_name: String,
    pub violation_time: String,
    pub initial_frame: String,
    pub ego_id: Option<String>,
    pub entity_mapping: BTreeMap<String, Option<String>>,
    pub name_history: Vec<(String, BTreeMap<String, Option<String>>)>,
    pub data_history: Vec<(String, BTreeMap<String, Option<bool>>)>,
}

impl Violation {
    pub fn from_instance(
        instance: &ConcretePropertyInstance,
        violation_time: &str,
        ego_id: Option<&str>,
    ) -> Self {
        let entity_mapping = instance
            .binding
            .iter()
            .map(|(entity, concrete)| {
                (
                    entity.name.clone(),
                    concrete.as_ref().map(|c| c.entity_id.clone()),
                )
            })
            .collect();
        Violation {
            property_name: instance.property.name.clone(),
            violation_time: violation_time.to_string(),
            initial_frame: instance.initial_frame.clone(),
            ego_id: ego_id.map(str::to_string),
            entity_mapping,
            name_history: instance.name_history.clone(),
            data_history: instance.data_history.clone(),
        }
    }

    /// Writes this violation to `<log_root>/<route>/<property_name>/violations/<violation_time>.json`,
    /// creating parent directories as needed.
    pub fn write(&self, log_root: &Path, route: &str) -> Result<(), MonitorError> {
        let dir = log_root
            .join(route)
            .join(&self.property_name)
            .join("violations");
        std::fs::create_dir_all(&dir)
            .map_err(|e| MonitorError::Input(format!("could not create {}: {e}", dir.display())))?;
        let path = dir.join(format!("{}.json", self.violation_time));
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| MonitorError::Input(format!("could not serialise violation: {e}")))?;
        std::fs::write(&path, json)
            .map_err(|e| MonitorError::Input(format!("could not write {}: {e}", path.display())))?;
        log::debug!("wrote violation to {}", path.display());
        Ok(())
    }
}

/// `frame → { property_name → iteration_count }`, written once per `check()` call.
#[derive(Debug, Default, serde::Serialize)]
#[serde(transparent)]
pub struct MonitorStats(pub BTreeMap<String, BTreeMap<String, usize>>);

impl MonitorStats {
    pub fn write(&self, log_root: &Path, route: &str) -> Result<(), MonitorError> {
        let dir = log_root.join(route);
        std::fs::create_dir_all(&dir)
            .map_err(|e| MonitorError::Input(format!("could not create {}: {e}", dir.display())))?;
        let path = dir.join("stats.json");
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| MonitorError::Input(format!("could not serialise stats: {e}")))?;
        std::fs::write(&path, json)
            .map_err(|e| MonitorError::Input(format!("could not write {}: {e}", path.display())))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dfa::{Dfa, RawTransition};
    use crate::property::{expand_blank, SymbolicProperty};
    use std::collections::BTreeSet;
    use std::rc::Rc;

    fn tiny_property() -> Rc<SymbolicProperty> {
        let states = vec!["s0".to_string(), "s1".to_string()];
        let accepting = BTreeSet::new();
        let dfa = Dfa::build(
            &states,
            "s0",
            &accepting,
            vec![RawTransition {
                from: "s0".into(),
                guard: "true".into(),
                to: "s1".into(),
            }],
        )
        .unwrap();
        let mut predicates = BTreeMap::new();
        predicates.insert(
            "true".to_string(),
            crate::predicate::PredicateNode::Const(crate::predicate::ConstValue::Bool(true)),
        );
        Rc::new(SymbolicProperty::new("demo", dfa, predicates, vec![]).unwrap())
    }

    #[test]
    fn violation_serialises_with_expected_shape() {
        let property = tiny_property();
        let instance = expand_blank(&property, "0");
        let v = Violation::from_instance(&instance, "3", Some("ego-1"));
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains("\"property_name\":\"demo\""));
        assert!(json.contains("\"violation_time\":\"3\""));
        assert!(json.contains("\"ego_id\":\"ego-1\""));
    }

    #[test]
    fn writes_violation_to_the_expected_path() {
        let dir = std::env::temp_dir().join(format!(
            "symbolic-scene-monitor-test-{}",
            std::process::id()
        ));
        let property = tiny_property();
        let instance = expand_blank(&property, "0");
        let v = Violation::from_instance(&instance, "3", None);
        v.write(&dir, "route-a").unwrap();
        let expected = dir.join("route-a").join("demo").join("violations").join("3.json");
        assert!(expected.exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
