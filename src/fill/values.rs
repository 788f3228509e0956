use std::collections::BTreeMap;

use serde::Serialize;

use super::format::format_value;
use crate::placeholder::{Catalog, PlaceholderDescriptor};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedValue {
    pub key: String,
    pub descriptor: PlaceholderDescriptor,
    pub raw: String,
    pub value: String,
}

/// Answers collected so far, one per key. Re-resolving a key replaces it.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ResolvedValues {
    map: BTreeMap<String, ResolvedValue>,
}

impl ResolvedValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Format `raw` against `desc` and store it under the descriptor's key.
    pub fn resolve(&mut self, desc: &PlaceholderDescriptor, raw: &str) -> &ResolvedValue {
        let value = format_value(raw, desc);
        let entry = ResolvedValue {
            key: desc.key.clone(),
            descriptor: desc.clone(),
            raw: raw.to_string(),
            value,
        };
        self.map.insert(desc.key.clone(), entry);
        &self.map[&desc.key]
    }

    /// Resolve by key against the catalog's primary descriptor.
    pub fn resolve_key(&mut self, catalog: &Catalog, key: &str, raw: &str) -> Option<&ResolvedValue> {
        let desc = catalog.primary(key)?;
        Some(self.resolve(desc, raw))
    }

    /// Resolve a batch of answers; returns the keys the catalog does not know.
    pub fn resolve_all<'a, I>(&mut self, catalog: &Catalog, answers: I) -> Vec<String>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut unknown = Vec::new();
        for (key, raw) in answers {
            if self.resolve_key(catalog, key, raw).is_none() {
                unknown.push(key.clone());
            }
        }
        unknown
    }

    pub fn get(&self, key: &str) -> Option<&ResolvedValue> {
        self.map.get(key)
    }

    pub fn value_of(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|v| v.value.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<ResolvedValue> {
        self.map.remove(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedValue> {
        self.map.values()
    }

    /// Catalog keys with no answer yet, in display order.
    pub fn missing_keys<'c>(&self, catalog: &'c Catalog) -> Vec<&'c str> {
        catalog
            .sorted_keys()
            .into_iter()
            .filter(|k| !self.map.contains_key(*k))
            .collect()
    }

    pub fn is_complete(&self, catalog: &Catalog) -> bool {
        self.missing_keys(catalog).is_empty()
    }
}
