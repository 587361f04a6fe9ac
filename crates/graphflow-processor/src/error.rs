use graphflow_eval::EvalError;
use thiserror::Error;

/// Failures that cause one event to be dropped for one query (§4.3 failure
/// semantics, §7 "predicate/projection errors ... log + drop that delta
/// only, continue"). Never crosses a query boundary; caught entirely inside
/// `IncrementalProcessor::process`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProcessError {
    #[error("middleware {0:?} is not registered")]
    UnknownMiddleware(String),
    #[error("predicate or projection evaluation failed: {0}")]
    Eval(#[from] EvalError),
}
