use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{instrument, warn};

use graphflow_cache::ResultCache;
use graphflow_graph::GraphStore;
use graphflow_primitives::{now, DateTime, EntityId, Utc};
use graphflow_processor::{IncrementalProcessor, MiddlewareRegistry};
use graphflow_query::{
    ChangeEvent, ChangeKind, ContinuousQuery, ContinuousQueryConfig, QueryResult, QueryStats, QueryStatsSnapshot,
    ResultChange, ResultChangeKind, SourceChangeDescriptor,
};

use crate::error::EngineError;
use crate::queue::{OutputQueue, Subscription, DEFAULT_QUEUE_CAPACITY};

struct QueryEntry {
    query: ContinuousQuery,
    stats: QueryStats,
    subscribers: Mutex<Vec<Arc<OutputQueue>>>,
}

impl QueryEntry {
    fn new(query: ContinuousQuery) -> Self {
        QueryEntry {
            query,
            stats: QueryStats::new(),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Publishes one event's deltas to every live subscriber, pruning
    /// subscribers that have closed since the last publish.
    fn publish(&self, changes: &[ResultChange]) {
        let mut subs = self.subscribers.lock();
        subs.retain(|queue| !queue.is_closed());
        for queue in subs.iter() {
            for change in changes {
                queue.push(change.clone());
            }
        }
    }

    fn close_all_subscribers(&self) {
        for queue in self.subscribers.lock().iter() {
            queue.close();
        }
    }
}

/// §4.4 ContinuousQuery orchestration: the engine owns the single shared
/// [`GraphStore`] and [`ResultCache`] (§5 "GraphStore and ResultCache are
/// shared across queries running in the same process") plus the registry of
/// live [`ContinuousQuery`] descriptors, and drives one [`IncrementalProcessor`]
/// over every registered query for each ingested [`ChangeEvent`].
pub struct Engine {
    graph: Arc<GraphStore>,
    cache: Arc<ResultCache>,
    processor: IncrementalProcessor,
    queries: RwLock<HashMap<String, Arc<QueryEntry>>>,
}

impl Engine {
    pub fn new(middleware: MiddlewareRegistry) -> Self {
        let graph = Arc::new(GraphStore::new());
        let cache = Arc::new(ResultCache::new());
        Engine {
            graph: graph.clone(),
            cache: cache.clone(),
            processor: IncrementalProcessor::new(graph, cache, middleware),
            queries: RwLock::new(HashMap::new()),
        }
    }

    /// §4.4 `create-query`: registers a [`ContinuousQuery`], applying its
    /// [`ViewConfig`] retention policy to the cache and materializing its
    /// [`JoinDefinition`]s against whatever the graph store already holds.
    pub fn create_query(&self, config: ContinuousQueryConfig) -> Result<(), EngineError> {
        let query = ContinuousQuery::new(config)?;

        let mut queries = self.queries.write();
        if queries.contains_key(&query.query_id) {
            return Err(EngineError::DuplicateQuery(query.query_id));
        }

        self.cache.set_retention(&query.query_id, query.view.retention);
        for join in &query.joins {
            self.graph.create_join_relationships(join);
        }

        queries.insert(query.query_id.clone(), Arc::new(QueryEntry::new(query)));
        Ok(())
    }

    /// §4.4 `delete-query`: graceful removal — clears the query's result set
    /// from the cache, cascades `clear-source` on the graph store only for
    /// sources no other live query still subscribes to, and closes every
    /// outstanding subscription.
    pub fn delete_query(&self, query_id: &str) -> Result<(), EngineError> {
        let entry = {
            let mut queries = self.queries.write();
            queries.remove(query_id).ok_or_else(|| EngineError::UnknownQuery(query_id.to_string()))?
        };

        self.cache.clear_query(query_id);
        self.release_unshared_sources(&entry.query);
        entry.close_all_subscribers();
        Ok(())
    }

    fn release_unshared_sources(&self, query: &ContinuousQuery) {
        let queries = self.queries.read();
        for sub in &query.subscriptions {
            let still_shared = queries
                .values()
                .any(|entry| entry.query.subscriptions.iter().any(|s| s.source_id == sub.source_id));
            if !still_shared {
                self.graph.clear_source(&sub.source_id);
            }
        }
    }

    pub fn get_query(&self, query_id: &str) -> Option<ContinuousQuery> {
        self.queries.read().get(query_id).map(|e| e.query.clone())
    }

    pub fn list_queries(&self) -> Vec<ContinuousQuery> {
        self.queries.read().values().map(|e| e.query.clone()).collect()
    }

    /// §4.2/§4.4 `current-results(queryId)`.
    pub fn get_results(&self, query_id: &str) -> Vec<QueryResult> {
        self.cache
            .find_by_query(query_id)
            .into_iter()
            .filter_map(|id| self.cache.get(id))
            .collect()
    }

    /// §4.4 `results-at(queryId, instant)`.
    pub fn get_results_at(&self, query_id: &str, instant: DateTime<Utc>) -> Vec<QueryResult> {
        self.cache.results_at(query_id, instant)
    }

    pub fn stats(&self, query_id: &str) -> Option<QueryStatsSnapshot> {
        self.queries.read().get(query_id).map(|e| e.stats.snapshot())
    }

    /// §6 `subscribe(queryId)`: replays the current result set as synthetic
    /// `ADDED` changes in an unspecified order, then continues with live
    /// deltas in arrival order. Registration and the replay snapshot happen
    /// under the same subscriber-list lock that `publish` takes, so no
    /// delta that arrives during replay construction can be interleaved
    /// into — or lost from — the subscriber's queue.
    pub fn subscribe(&self, query_id: &str) -> Result<Subscription, EngineError> {
        self.subscribe_with_capacity(query_id, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn subscribe_with_capacity(&self, query_id: &str, capacity: usize) -> Result<Subscription, EngineError> {
        let queries = self.queries.read();
        let entry = queries
            .get(query_id)
            .ok_or_else(|| EngineError::UnknownQuery(query_id.to_string()))?
            .clone();
        drop(queries);

        let queue = OutputQueue::new(capacity);
        let mut subs = entry.subscribers.lock();
        let replay = self
            .cache
            .find_by_query(query_id)
            .into_iter()
            .filter_map(|id| self.cache.get(id))
            .map(|row| synthetic_added(row, query_id))
            .collect();
        queue.push_replay_front(replay);
        subs.push(queue.clone());
        drop(subs);

        Ok(Subscription { queue })
    }

    /// §4.3 per-event pipeline, fanned out over every registered query.
    /// `GraphStore::apply_change` runs exactly once per event regardless of
    /// how many queries are registered (§5: the store is shared); a
    /// malformed event is logged and dropped without reaching any query
    /// (§4.1, §7 "Input errors").
    #[instrument(skip_all, fields(source = %ev.source_id, entity_type = %ev.entity_type, kind = ?ev.kind))]
    pub fn ingest(&self, ev: ChangeEvent) {
        if let Err(err) = self.graph.apply_change(&ev) {
            warn!(error = %err, "dropping malformed change event");
            return;
        }

        let queries = self.queries.read();
        for entry in queries.values() {
            let changes = self.processor.process(&entry.query, &entry.stats, &ev);
            if !changes.is_empty() {
                entry.publish(&changes);
            }
        }
    }

    pub fn graph(&self) -> &Arc<GraphStore> {
        &self.graph
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(MiddlewareRegistry::new())
    }
}

/// Builds the synthetic `ADDED` a replaying subscriber sees for one cached
/// row (§6). There is no real source change behind a replay, so the
/// correlation descriptor names the replay itself rather than inventing an
/// upstream event that never happened.
fn synthetic_added(row: QueryResult, query_id: &str) -> ResultChange {
    let timestamp = now();
    let source_change = SourceChangeDescriptor {
        source_id: "<replay>".to_string(),
        kind: ChangeKind::Snapshot,
        entity_type: query_id.to_string(),
        entity_id: EntityId::from(row.result_id.to_string().as_str()),
    };
    ResultChange {
        query_id: query_id.to_string(),
        kind: ResultChangeKind::Added,
        before: None,
        after: Some(row),
        timestamp,
        source_change,
    }
}
