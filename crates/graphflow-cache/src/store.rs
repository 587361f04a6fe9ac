use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;
use tracing::instrument;

use graphflow_primitives::{DateTime, EntityId, ResultId, ScalarValue, Utc};
use graphflow_query::{QueryResult, RetentionPolicy};

use crate::stats::{CacheStats, CacheStatsSnapshot};

/// The multi-dimensional current/historical result-row cache shared across
/// every live query (§4.2). Same coarse-locking shape as `GraphStore`: one
/// `RwLock<CacheInner>`, narrow methods that take it for the span of one
/// operation.
pub struct ResultCache {
    inner: RwLock<CacheInner>,
    stats: CacheStats,
}

#[derive(Default)]
struct CacheInner {
    rows: HashMap<ResultId, QueryResult>,
    history: HashMap<ResultId, Vec<QueryResult>>,
    by_query: HashMap<String, HashSet<ResultId>>,
    by_entity: HashMap<(String, ScalarValue), HashSet<ResultId>>,
    by_field: HashMap<(String, ScalarValue), HashSet<ResultId>>,
    retention: HashMap<String, RetentionPolicy>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultCache {
    pub fn new() -> Self {
        ResultCache {
            inner: RwLock::new(CacheInner::default()),
            stats: CacheStats::new(),
        }
    }

    /// §4.2 `put`: insert or replace, unindexing the prior row (if any)
    /// using *its* data mapping before indexing the new one.
    #[instrument(skip(self, result), fields(query_id = %result.query_id, result_id = %result.result_id))]
    pub fn put(&self, result: QueryResult) {
        let mut inner = self.inner.write();
        let retention = inner.retention.get(&result.query_id).copied().unwrap_or_default();

        if let Some(old) = inner.rows.get(&result.result_id).cloned() {
            inner.unindex_row(&old);
        }
        inner.index_row(&result);
        inner.by_query.entry(result.query_id.clone()).or_default().insert(result.result_id);

        match retention {
            RetentionPolicy::Latest => {}
            RetentionPolicy::All => {
                inner.history.entry(result.result_id).or_default().push(result.clone());
            }
            RetentionPolicy::Expire { ttl_seconds } => {
                let cutoff = result.updated_at - chrono::Duration::seconds(ttl_seconds);
                let entry = inner.history.entry(result.result_id).or_default();
                entry.push(result.clone());
                entry.retain(|r| r.updated_at >= cutoff);
            }
        }

        inner.rows.insert(result.result_id, result);
        self.stats.record_put();
    }

    pub fn get(&self, result_id: ResultId) -> Option<QueryResult> {
        let inner = self.inner.read();
        let row = inner.rows.get(&result_id).cloned();
        if row.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        row
    }

    /// §4.2 `remove`: drop every index entry derived from the row before
    /// dropping the row itself.
    pub fn remove(&self, result_id: ResultId) -> Option<QueryResult> {
        let mut inner = self.inner.write();
        let Some(row) = inner.rows.remove(&result_id) else {
            return None;
        };
        inner.unindex_row(&row);
        if let Some(set) = inner.by_query.get_mut(&row.query_id) {
            set.remove(&result_id);
        }
        inner.history.remove(&result_id);
        self.stats.record_remove();
        Some(row)
    }

    pub fn find_by_query(&self, query_id: &str) -> HashSet<ResultId> {
        self.inner.read().by_query.get(query_id).cloned().unwrap_or_default()
    }

    pub fn find_by_entity(&self, entity_type: &str, entity_id: &EntityId) -> HashSet<ResultId> {
        self.inner
            .read()
            .by_entity
            .get(&(entity_type.to_string(), entity_id.0.clone()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn find_by_field(&self, name: &str, value: &ScalarValue) -> HashSet<ResultId> {
        self.inner
            .read()
            .by_field
            .get(&(name.to_string(), value.clone()))
            .cloned()
            .unwrap_or_default()
    }

    /// §4.2 `results-at`: the row state for each resultId of the query whose
    /// latest history entry has timestamp ≤ instant. Under `Latest`
    /// retention this degrades to "the current row, if it's old enough".
    pub fn results_at(&self, query_id: &str, instant: DateTime<Utc>) -> Vec<QueryResult> {
        let inner = self.inner.read();
        let Some(ids) = inner.by_query.get(query_id) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| {
                if let Some(history) = inner.history.get(id) {
                    history.iter().rev().find(|r| r.updated_at <= instant).cloned()
                } else {
                    inner.rows.get(id).filter(|r| r.updated_at <= instant).cloned()
                }
            })
            .collect()
    }

    pub fn set_retention(&self, query_id: impl Into<String>, policy: RetentionPolicy) {
        self.inner.write().retention.insert(query_id.into(), policy);
    }

    /// §4.2 `clear-query`: drop every row belonging to this query and all
    /// of its index contributions.
    pub fn clear_query(&self, query_id: &str) {
        let mut inner = self.inner.write();
        let ids: Vec<ResultId> = inner.by_query.remove(query_id).unwrap_or_default().into_iter().collect();
        for id in ids {
            if let Some(row) = inner.rows.remove(&id) {
                inner.unindex_row(&row);
            }
            inner.history.remove(&id);
            self.stats.record_eviction();
        }
        inner.retention.remove(query_id);
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn row_count(&self) -> usize {
        self.inner.read().rows.len()
    }
}

impl CacheInner {
    fn index_row(&mut self, row: &QueryResult) {
        for (key, value) in &row.data {
            if value.is_null() {
                continue;
            }
            if let Some(entity_type) = entity_reference_type(key) {
                self.by_entity
                    .entry((entity_type, value.clone()))
                    .or_default()
                    .insert(row.result_id);
            }
            self.by_field
                .entry((key.clone(), value.clone()))
                .or_default()
                .insert(row.result_id);
        }
    }

    fn unindex_row(&mut self, row: &QueryResult) {
        for (key, value) in &row.data {
            if value.is_null() {
                continue;
            }
            if let Some(entity_type) = entity_reference_type(key) {
                if let Some(set) = self.by_entity.get_mut(&(entity_type, value.clone())) {
                    set.remove(&row.result_id);
                }
            }
            if let Some(set) = self.by_field.get_mut(&(key.clone(), value.clone())) {
                set.remove(&row.result_id);
            }
        }
    }
}

/// §4.2 indexing rule: "any key ending in `_id` or `Id` ... registers
/// (entityType, value) with entityType = key minus the suffix. The literal
/// key `id` registers the pair ("id", value)."
fn entity_reference_type(key: &str) -> Option<String> {
    if key == "id" {
        return Some("id".to_string());
    }
    if let Some(stripped) = key.strip_suffix("_id") {
        if !stripped.is_empty() {
            return Some(stripped.to_string());
        }
    }
    if let Some(stripped) = key.strip_suffix("Id") {
        if !stripped.is_empty() {
            return Some(stripped.to_string());
        }
    }
    None
}
