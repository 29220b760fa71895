//! The predicate algebra: syntax ([node]) and three-valued evaluation semantics ([eval]).

mod eval;
mod node;

pub use eval::{eval, EvalCtx, EvalResult, Value};
pub use node::{AttrFilter, CompareOp, Comparison, ConstValue, PredicateNode, SetLiteral};

/// Build the per-frame memoisation key: `propertyName ⊕ symbol ⊕ sorted((entName, entityId))`.
pub fn cache_key(
    property_name: &str,
    symbol: &str,
    binding: &crate::property::Binding,
) -> String {
    let mut pairs: Vec<(&str, &str)> = binding
        .iter()
        .filter_map(|(entity, concrete)| {
            concrete
                .as_ref()
                .map(|c| (entity.name.as_str(), c.entity_id.as_str()))
        })
        .collect();
    pairs.sort_unstable();
    let mut key = String::new();
    key.push_str(property_name);
    key.push('\u{1}');
    key.push_str(symbol);
    for (name, id) in pairs {
        key.push('\u{1}');
        key.push_str(name);
        key.push('=');
        key.push_str(id);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{Acceptor, ConcreteEntity, SymbolicEntity};
    use std::collections::BTreeMap;

    #[test]
    fn cache_key_is_order_independent_in_the_binding() {
        let e1 = SymbolicEntity::new("v1", Acceptor::new("true"));
        let e2 = SymbolicEntity::new("v2", Acceptor::new("true"));

        let mut binding_a = BTreeMap::new();
        binding_a.insert(e1.clone(), Some(ConcreteEntity::new(e1.clone(), "A")));
        binding_a.insert(e2.clone(), Some(ConcreteEntity::new(e2.clone(), "B")));

        let mut binding_b = BTreeMap::new();
        binding_b.insert(e2.clone(), Some(ConcreteEntity::new(e2.clone(), "B")));
        binding_b.insert(e1.clone(), Some(ConcreteEntity::new(e1.clone(), "A")));

        assert_eq!(
            cache_key("prop", "sym", &binding_a),
            cache_key("prop", "sym", &binding_b)
        );
    }

    #[test]
    fn cache_key_ignores_unbound_entities() {
        let e1 = SymbolicEntity::new("v1", Acceptor::new("true"));
        let mut binding = BTreeMap::new();
        binding.insert(e1, None);
        assert_eq!(cache_key("prop", "sym", &binding), "prop\u{1}sym");
    }
}
