use std::collections::BTreeSet;

use graphflow_primitives::{EntityId, PropertyMap};

/// §3 Node.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: EntityId,
    pub labels: BTreeSet<String>,
    pub properties: PropertyMap,
    pub source: String,
}

impl Node {
    pub fn primary_label(&self) -> &str {
        self.labels
            .iter()
            .next()
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// §3 Relationship. Synthetic relationships are derived solely by
/// `GraphStore::create_join_relationships` and are never asserted directly
/// by a `ChangeEvent`.
#[derive(Clone, Debug, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub start: EntityId,
    pub end: EntityId,
    pub properties: PropertyMap,
    pub source: String,
    pub synthetic: bool,
}
