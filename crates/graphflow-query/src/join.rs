use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One side of a `JoinDefinition`: the label a node must carry and the
/// property whose value is matched across labels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinKey {
    pub label: String,
    pub property: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinDefinitionError {
    #[error("a join definition needs at least two join keys, got {0}")]
    TooFewKeys(usize),
    #[error("join definitions with more than two keys are defined but not yet implemented (§4.1, §9)")]
    MultiWayNotSupported,
}

/// §3 JoinDefinition. "Currently specified for exactly two-label joins;
/// three-way joins are defined but may be deferred" (§4.1) — this crate
/// accepts exactly two keys and rejects more, so the limitation is enforced
/// at construction rather than discovered mid-materialization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinDefinition {
    pub join_id: String,
    pub keys: Vec<JoinKey>,
}

impl JoinDefinition {
    pub fn new(join_id: impl Into<String>, keys: Vec<JoinKey>) -> Result<Self, JoinDefinitionError> {
        if keys.len() < 2 {
            return Err(JoinDefinitionError::TooFewKeys(keys.len()));
        }
        if keys.len() > 2 {
            return Err(JoinDefinitionError::MultiWayNotSupported);
        }
        Ok(JoinDefinition {
            join_id: join_id.into(),
            keys,
        })
    }

    pub fn left(&self) -> &JoinKey {
        &self.keys[0]
    }

    pub fn right(&self) -> &JoinKey {
        &self.keys[1]
    }

    /// The relationship type asserted for matching pairs — "derived from the
    /// join-id" (§4.1).
    pub fn relationship_type(&self) -> &str {
        &self.join_id
    }
}
