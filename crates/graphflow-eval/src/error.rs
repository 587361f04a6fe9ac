use thiserror::Error;

/// Errors raised while compiling query text or evaluating a compiled plan
/// against a node. Compile errors are returned once, at `ContinuousQuery`
/// construction time (§4.5 "ahead-of-time compilation"); evaluation errors
/// are returned per event and are always contained by the caller (§4.3,
/// §7 — "predicate/projection errors... cause the event to be dropped").
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum EvalError {
    #[error("query text is empty")]
    EmptyQuery,

    #[error("unexpected character {found:?} at position {pos}")]
    UnexpectedChar { found: char, pos: usize },

    #[error("unterminated string literal starting at position {pos}")]
    UnterminatedString { pos: usize },

    #[error("expected {expected}, found {found} at position {pos}")]
    UnexpectedToken {
        expected: String,
        found: String,
        pos: usize,
    },

    #[error("unexpected end of query, expected {expected}")]
    UnexpectedEof { expected: String },

    #[error("query references variable '{0}' which is not bound by the MATCH pattern")]
    UnknownVariable(String),

    #[error("trailing input after a complete query: {0:?}")]
    TrailingInput(String),

    #[error("property '{property}' is missing on the matched node and has no default")]
    MissingProperty { property: String },

    #[error("cannot compare a {lhs_type} to a {rhs_type}")]
    TypeMismatch { lhs_type: String, rhs_type: String },
}
