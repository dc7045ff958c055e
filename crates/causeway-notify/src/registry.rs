//! A multi-value map with a reverse index.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Groups values under keys and remembers, for every value, the key it was
/// last added under.
///
/// `add` and `remove` consume the registry and return the updated one, so a
/// registry is replaced wholesale rather than edited in place.
#[derive(Clone, Debug)]
pub struct Registry<K, V> {
    buckets: HashMap<K, HashSet<V>>,
    index: HashMap<V, K>,
}

impl<K, V> Default for Registry<K, V> {
    fn default() -> Self {
        Self {
            buckets: HashMap::new(),
            index: HashMap::new(),
        }
    }
}

impl<K, V> Registry<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` to the bucket of `key` and point the reverse index at `key`.
    pub fn add(mut self, key: K, value: V) -> Self {
        self.buckets
            .entry(key.clone())
            .or_default()
            .insert(value.clone());
        self.index.insert(value, key);
        self
    }

    /// Remove `value` from the bucket of `key`; empty buckets disappear.
    pub fn remove(mut self, key: &K, value: &V) -> Self {
        if let Some(bucket) = self.buckets.get_mut(key) {
            bucket.remove(value);
            if bucket.is_empty() {
                self.buckets.remove(key);
            }
        }
        if self.index.get(value) == Some(key) {
            self.index.remove(value);
        }
        self
    }

    /// Values stored under `key` (nothing if the key is unknown).
    pub fn values(&self, key: &K) -> impl Iterator<Item = &V> {
        self.buckets.get(key).into_iter().flatten()
    }

    pub fn contains(&self, key: &K, value: &V) -> bool {
        self.buckets
            .get(key)
            .map_or(false, |bucket| bucket.contains(value))
    }

    /// Key `value` was registered under, via the reverse index.
    pub fn key_of(&self, value: &V) -> Option<&K> {
        self.index.get(value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.buckets.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted<'a>(values: impl Iterator<Item = &'a i32>) -> Vec<i32> {
        let mut values: Vec<i32> = values.copied().collect();
        values.sort();
        values
    }

    #[test]
    fn test_add_multiple_values_under_key() {
        let registry = Registry::new().add("a", 1).add("a", 2).add("b", 3);

        assert_eq!(sorted(registry.values(&"a")), vec![1, 2]);
        assert_eq!(sorted(registry.values(&"b")), vec![3]);
        assert_eq!(registry.key_of(&1), Some(&"a"));
        assert_eq!(registry.key_of(&2), Some(&"a"));
        assert_eq!(registry.key_of(&3), Some(&"b"));
    }

    #[test]
    fn test_remove_values_from_key() {
        let registry = Registry::new()
            .add("a", 1)
            .add("a", 2)
            .add("b", 3)
            .remove(&"a", &1)
            .remove(&"b", &1);

        assert_eq!(sorted(registry.values(&"a")), vec![2]);
        assert_eq!(sorted(registry.values(&"b")), vec![3]);
        assert_eq!(registry.key_of(&1), None);
        assert_eq!(registry.key_of(&2), Some(&"a"));
        assert_eq!(registry.key_of(&3), Some(&"b"));

        let registry = registry.remove(&"b", &3);
        assert_eq!(registry.values(&"b").count(), 0);
        assert_eq!(registry.key_of(&3), None);
        assert!(!registry.contains(&"b", &3));
    }

    #[test]
    fn test_unknown_key_is_empty() {
        let registry: Registry<&str, i32> = Registry::new();
        assert_eq!(registry.values(&"missing").count(), 0);
        assert!(registry.is_empty());
    }
}
