use thiserror::Error;

use graphflow_query::QueryDefinitionError;

/// Failures surfaced by the admin surface (§4.4, §6). Never raised while
/// ingesting a `ChangeEvent` — ingest failures are contained per-event
/// (§4.1, §4.3, §7) and never propagate as a `Result` to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("a query with id {0:?} is already registered")]
    DuplicateQuery(String),
    #[error("no query registered with id {0:?}")]
    UnknownQuery(String),
    #[error(transparent)]
    Definition(#[from] QueryDefinitionError),
}
