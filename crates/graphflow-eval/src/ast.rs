use graphflow_primitives::ScalarValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Comparison {
        property: String,
        op: CompareOp,
        literal: ScalarValue,
    },
    /// `NOT EXISTS(var.property)` — true when the property is null, absent,
    /// or literally `false` (§4.5, §9).
    NotExists { property: String },
    And(Vec<Predicate>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnItem {
    pub property: String,
    pub alias: String,
}

/// The compiled plan stored on a `ContinuousQuery` descriptor (§4.5:
/// "parse the query text once into an immutable plan... per-event
/// evaluation then executes the compiled plan without re-parsing").
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub variable: String,
    pub label: String,
    pub predicate: Option<Predicate>,
    pub projection: Vec<ReturnItem>,
}
