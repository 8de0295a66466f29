use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Sections used when a template yields nothing usable.
pub const DEFAULT_SECTIONS: [&str; 5] = [
    "Objective",
    "Problem Analysis",
    "Solution",
    "Conclusion",
    "References",
];

pub const REFERENCES_SECTION: &str = "References";

/// A section whose name mentions "reference" holds a bibliography.
pub fn is_reference_section(name: &str) -> bool {
    name.to_lowercase().contains("reference")
}

pub fn default_sections() -> Vec<String> {
    DEFAULT_SECTIONS.iter().map(|s| s.to_string()).collect()
}

/// Ordered section name -> content map. Insertion order is document order.
/// Serialises as a JSON object in that order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionSet {
    entries: Vec<(String, String)>,
}

impl SectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replaces an existing section in place or appends a new one. Empty names are ignored.
    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<String>) {
        let name = name.into();
        if name.trim().is_empty() {
            return;
        }
        let content = content.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = content,
            None => self.entries.push((name, content)),
        }
    }

    /// Inserts a new section before `before` (or at the end when absent).
    /// Returns false if the name already exists.
    pub fn insert_before(
        &mut self,
        name: impl Into<String>,
        content: impl Into<String>,
        before: Option<&str>,
    ) -> bool {
        let name = name.into();
        if name.trim().is_empty() || self.contains(&name) {
            return false;
        }
        let at = before
            .and_then(|b| self.entries.iter().position(|(k, _)| k == b))
            .unwrap_or(self.entries.len());
        self.entries.insert(at, (name, content.into()));
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn first_reference_section(&self) -> Option<&str> {
        self.entries
            .iter()
            .map(|(k, _)| k.as_str())
            .find(|k| is_reference_section(k))
    }

    pub fn total_words(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, v)| v.split_whitespace().count())
            .sum()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SectionSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = SectionSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

impl Serialize for SectionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SectionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SectionSetVisitor;

        impl<'de> Visitor<'de> for SectionSetVisitor {
            type Value = SectionSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of section name to section text")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<SectionSet, A::Error> {
                let mut set = SectionSet::new();
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    set.insert(k, v);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(SectionSetVisitor)
    }
}
