//! The name → value mapping scripts run against

use std::collections::BTreeMap;

use crate::context::reserved::is_reserved;
use crate::engine::Value;

/// Ordered so snapshots and listings come out sorted by name
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: BTreeMap<String, Value>,
}

impl Bindings {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.values.get_mut(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Bindings created by user code, in name order
    pub fn user_bindings(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.iter().filter(|(name, _)| !is_reserved(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_bindings_skip_reserved() {
        let mut bindings = Bindings::default();
        bindings.insert("math", Value::None);
        bindings.insert("__meta", Value::None);
        bindings.insert("b", Value::Int(2));
        bindings.insert("a", Value::Int(1));

        let names: Vec<&str> = bindings.user_bindings().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(bindings.len(), 4);
    }

    #[test]
    fn test_insert_replaces() {
        let mut bindings = Bindings::default();
        assert!(bindings.insert("x", Value::Int(1)).is_none());
        assert_eq!(bindings.insert("x", Value::Int(2)), Some(Value::Int(1)));
        assert_eq!(bindings.remove("x"), Some(Value::Int(2)));
        assert!(bindings.is_empty());
    }
}
