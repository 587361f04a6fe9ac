use serde::{Deserialize, Serialize};

use graphflow_primitives::{DateTime, EntityId, PropertyMap, ResultId, Utc};

use crate::change_event::ChangeKind;

/// §3 QueryResult.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub result_id: ResultId,
    pub query_id: String,
    pub data: PropertyMap,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResultMetadata>,
}

/// Provenance carried on a `QueryResult` row: which event produced this
/// version and what kind of change it was (§3: "metadata (source-event id,
/// kind)").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub source_event_entity_id: EntityId,
    pub kind: ChangeKind,
}

impl QueryResult {
    pub fn new(
        result_id: ResultId,
        query_id: impl Into<String>,
        data: PropertyMap,
        now: DateTime<Utc>,
        metadata: Option<ResultMetadata>,
    ) -> Self {
        QueryResult {
            result_id,
            query_id: query_id.into(),
            data,
            version: 1,
            created_at: now,
            updated_at: now,
            metadata,
        }
    }

    /// Returns an updated copy with `version` incremented and `data`
    /// replaced — QueryResult rows are replaced wholesale, never patched
    /// in place (mirrors `Node`'s UPDATE semantics in §3).
    pub fn with_new_data(&self, data: PropertyMap, now: DateTime<Utc>, metadata: Option<ResultMetadata>) -> Self {
        QueryResult {
            result_id: self.result_id,
            query_id: self.query_id.clone(),
            data,
            version: self.version + 1,
            created_at: self.created_at,
            updated_at: now,
            metadata,
        }
    }
}

/// §3 ResultChange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResultChangeKind {
    Added,
    Updated,
    Deleted,
}

/// §3 / §6: the source change carried through a `ResultChange` for
/// correlation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceChangeDescriptor {
    pub source_id: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub entity_type: String,
    pub entity_id: EntityId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultChange {
    pub query_id: String,
    #[serde(rename = "type")]
    pub kind: ResultChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<QueryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<QueryResult>,
    pub timestamp: DateTime<Utc>,
    pub source_change: SourceChangeDescriptor,
}

impl ResultChange {
    pub fn added(after: QueryResult, timestamp: DateTime<Utc>, source_change: SourceChangeDescriptor) -> Self {
        ResultChange {
            query_id: after.query_id.clone(),
            kind: ResultChangeKind::Added,
            before: None,
            after: Some(after),
            timestamp,
            source_change,
        }
    }

    pub fn updated(
        before: QueryResult,
        after: QueryResult,
        timestamp: DateTime<Utc>,
        source_change: SourceChangeDescriptor,
    ) -> Self {
        ResultChange {
            query_id: after.query_id.clone(),
            kind: ResultChangeKind::Updated,
            before: Some(before),
            after: Some(after),
            timestamp,
            source_change,
        }
    }

    pub fn deleted(before: QueryResult, timestamp: DateTime<Utc>, source_change: SourceChangeDescriptor) -> Self {
        ResultChange {
            query_id: before.query_id.clone(),
            kind: ResultChangeKind::Deleted,
            before: Some(before),
            after: None,
            timestamp,
            source_change,
        }
    }

    /// Ordering key used to sort the deltas produced for a single event:
    /// DELETED before UPDATED before ADDED (§4.3).
    pub fn ordering_rank(&self) -> u8 {
        match self.kind {
            ResultChangeKind::Deleted => 0,
            ResultChangeKind::Updated => 1,
            ResultChangeKind::Added => 2,
        }
    }
}
