use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use graphflow_eval::{compile, CompiledQuery, EvalError};
use graphflow_primitives::ScalarValue;

use crate::join::JoinDefinition;
use crate::view::ViewConfig;

/// §3 ContinuousQuery mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryMode {
    Query,
    Filter,
}

/// A source-label to query-label translation consulted at event ingress
/// (§9: "captured as a small translation table... not a language-level
/// inheritance concern").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMapping {
    pub source_label: String,
    pub query_label: String,
    #[serde(default)]
    pub suppress_index: bool,
}

/// §3 SourceSubscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSubscription {
    pub source_id: String,
    #[serde(default)]
    pub node_label_mappings: Vec<LabelMapping>,
    #[serde(default)]
    pub relation_label_mappings: Vec<LabelMapping>,
    /// Ordered list of middleware names applied before evaluation (§4.3 step 2).
    #[serde(default)]
    pub middleware: Vec<String>,
}

impl SourceSubscription {
    /// Translates a source-side label to the label this query's pattern
    /// matches against, or passes it through unchanged if no mapping is
    /// registered for it.
    pub fn map_node_label<'a>(&'a self, source_label: &'a str) -> &'a str {
        self.node_label_mappings
            .iter()
            .find(|m| m.source_label == source_label)
            .map(|m| m.query_label.as_str())
            .unwrap_or(source_label)
    }
}

/// The plain config struct `ContinuousQuery::new` is built from — §9's
/// redesign flag ("builder-style descriptors with mutable setters" become
/// "immutable values constructed from a config struct; no
/// partially-initialized states").
pub struct ContinuousQueryConfig {
    pub query_id: String,
    pub name: String,
    pub mode: QueryMode,
    pub language: String,
    pub text: String,
    pub subscriptions: Vec<SourceSubscription>,
    pub joins: Vec<JoinDefinition>,
    pub middleware_pipeline: Vec<String>,
    pub params: BTreeMap<String, ScalarValue>,
    pub view: ViewConfig,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryDefinitionError {
    #[error("query id must not be empty")]
    EmptyId,
    #[error("unsupported query language {0:?}; only \"cypher\" is implemented")]
    UnsupportedLanguage(String),
    #[error("failed to compile query text: {0}")]
    Compile(#[from] EvalError),
}

/// §3 ContinuousQuery descriptor: immutable once constructed. The query text
/// is compiled exactly once here (§4.5 "ahead-of-time compilation"); nothing
/// downstream re-parses it.
#[derive(Clone, Debug, PartialEq)]
pub struct ContinuousQuery {
    pub query_id: String,
    pub name: String,
    pub mode: QueryMode,
    pub language: String,
    pub text: String,
    pub subscriptions: Vec<SourceSubscription>,
    pub joins: Vec<JoinDefinition>,
    pub middleware_pipeline: Vec<String>,
    pub params: BTreeMap<String, ScalarValue>,
    pub view: ViewConfig,
    pub plan: CompiledQuery,
}

impl ContinuousQuery {
    pub fn new(config: ContinuousQueryConfig) -> Result<Self, QueryDefinitionError> {
        if config.query_id.trim().is_empty() {
            return Err(QueryDefinitionError::EmptyId);
        }
        if !config.language.eq_ignore_ascii_case("cypher") {
            return Err(QueryDefinitionError::UnsupportedLanguage(config.language));
        }
        let plan = compile(&config.text)?;
        Ok(ContinuousQuery {
            query_id: config.query_id,
            name: config.name,
            mode: config.mode,
            language: config.language,
            text: config.text,
            subscriptions: config.subscriptions,
            joins: config.joins,
            middleware_pipeline: config.middleware_pipeline,
            params: config.params,
            view: config.view,
            plan,
        })
    }

    /// §4.3 step 1: "If the query's SourceSubscriptions are non-empty and do
    /// not include `ev.sourceId`, return empty."
    pub fn accepts_source(&self, source_id: &str) -> bool {
        self.subscriptions.is_empty() || self.subscriptions.iter().any(|s| s.source_id == source_id)
    }

    pub fn subscription_for(&self, source_id: &str) -> Option<&SourceSubscription> {
        self.subscriptions.iter().find(|s| s.source_id == source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(text: &str) -> ContinuousQueryConfig {
        ContinuousQueryConfig {
            query_id: "q1".into(),
            name: "ready orders".into(),
            mode: QueryMode::Query,
            language: "cypher".into(),
            text: text.into(),
            subscriptions: vec![],
            joins: vec![],
            middleware_pipeline: vec![],
            params: BTreeMap::new(),
            view: ViewConfig::default(),
        }
    }

    #[test]
    fn compiles_text_once_at_construction() {
        let q = ContinuousQuery::new(config("MATCH (o:Order) WHERE o.status = 'READY_FOR_PICKUP' RETURN o.id")).unwrap();
        assert_eq!(q.plan.label, "Order");
    }

    #[test]
    fn rejects_empty_id() {
        let mut c = config("MATCH (o:Order) RETURN o.id");
        c.query_id = String::new();
        assert_eq!(ContinuousQuery::new(c).unwrap_err(), QueryDefinitionError::EmptyId);
    }

    #[test]
    fn empty_subscriptions_accept_every_source() {
        let q = ContinuousQuery::new(config("MATCH (o:Order) RETURN o.id")).unwrap();
        assert!(q.accepts_source("anything"));
    }
}
