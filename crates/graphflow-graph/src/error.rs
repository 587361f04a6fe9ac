use graphflow_primitives::EntityId;
use graphflow_query::ChangeEventError;
use thiserror::Error;

/// §4.1 failure semantics: "every operation is total; malformed events...
/// are logged and dropped — they do not abort the stream." Every variant
/// here is something `apply_change` detects and rejects without mutating
/// the store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("change event failed validation: {0}")]
    InvalidEvent(#[from] ChangeEventError),
    #[error("entity id is null")]
    NullEntityId,
    #[error("entity {id} already exists with label {existing_label:?} from source {existing_source}; event from {new_source} claims label {new_label:?}")]
    ConflictingLabel {
        id: EntityId,
        existing_label: String,
        existing_source: String,
        new_label: String,
        new_source: String,
    },
}
