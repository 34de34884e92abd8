//! Inclusion hierarchy
//!
//! Ordered nested mapping of included project names. It feeds the render
//! context and debug output; parameter precedence comes from the post-order
//! walk in `collection.rs`, not from this structure.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Included projects of one project, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hierarchy {
    children: Vec<(String, Hierarchy)>,
}

impl Hierarchy {
    pub(crate) fn push(&mut self, name: impl Into<String>, subtree: Hierarchy) {
        self.children.push((name.into(), subtree));
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Subtree of the first direct child called `name`
    pub fn get(&self, name: &str) -> Option<&Hierarchy> {
        self.children
            .iter()
            .find(|(child, _)| child == name)
            .map(|(_, subtree)| subtree)
    }

    /// Direct children, in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Hierarchy)> {
        self.children
            .iter()
            .map(|(name, subtree)| (name.as_str(), subtree))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|(name, _)| name.as_str())
    }
}

impl Serialize for Hierarchy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.children.len()))?;
        for (name, subtree) in &self.children {
            map.serialize_entry(name, subtree)?;
        }
        map.end()
    }
}
