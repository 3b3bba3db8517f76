//! Immutable, case-insensitive, insertion-ordered multi-valued map.
//!
//! Used for request headers, query parameters and form attributes. Holders of
//! a `MultiMap` can never change it; every modifier returns a new map, and
//! clones share the underlying storage.

use std::{fmt, sync::Arc};

use serde::{ser::SerializeMap, Serialize, Serializer};

#[derive(Clone, Default, PartialEq, Eq)]
pub struct MultiMap {
    entries: Arc<Vec<(String, Vec<String>)>>,
}

impl MultiMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> MultiMapBuilder {
        MultiMapBuilder::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    /// All values stored under `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.position(name)
            .map(|idx| self.entries[idx].1.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a copy with `value` appended to the values of `name`.
    pub fn with_added(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut builder = self.to_builder();
        builder.insert(name, value);
        builder.build()
    }

    /// Returns a copy where `name` holds exactly `values`.
    pub fn with_replaced<I, V>(&self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        let mut entries = (*self.entries).clone();
        match self.position(&name) {
            Some(idx) => entries[idx].1 = values,
            None => entries.push((name, values)),
        }
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Returns a copy without `name`.
    pub fn without(&self, name: &str) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(key, _)| !key.eq_ignore_ascii_case(name))
            .cloned()
            .collect();
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Returns a copy holding only the names accepted by `keep`.
    pub fn filtered<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&str) -> bool,
    {
        let entries = self
            .entries
            .iter()
            .filter(|(key, _)| keep(key))
            .cloned()
            .collect();
        Self {
            entries: Arc::new(entries),
        }
    }

    pub fn to_builder(&self) -> MultiMapBuilder {
        MultiMapBuilder {
            entries: (*self.entries).clone(),
        }
    }
}

impl fmt::Debug for MultiMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl Serialize for MultiMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, values) in self.entries.iter() {
            map.serialize_entry(key, values)?;
        }
        map.end()
    }
}

impl<K, V> FromIterator<(K, V)> for MultiMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut builder = MultiMapBuilder::default();
        for (key, value) in iter {
            builder.insert(key, value);
        }
        builder.build()
    }
}

/// Mutable staging area for a [`MultiMap`].
#[derive(Debug, Default, Clone)]
pub struct MultiMapBuilder {
    entries: Vec<(String, Vec<String>)>,
}

impl MultiMapBuilder {
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some((_, values)) => values.push(value),
            None => self.entries.push((name, vec![value])),
        }
        self
    }

    pub fn add(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn build(self) -> MultiMap {
        MultiMap {
            entries: Arc::new(self.entries),
        }
    }
}
