use std::sync::Arc;
use std::time::Instant;

use hashbrown::HashSet;
use tracing::{instrument, warn};

use graphflow_cache::ResultCache;
use graphflow_eval::{evaluate_predicate, project};
use graphflow_graph::GraphStore;
use graphflow_primitives::{now, EntityId, PropertyMap, ResultId};
use graphflow_query::{
    ChangeEvent, ChangeKind, ContinuousQuery, QueryMode, QueryResult, QueryStats, ResultChange, ResultChangeKind,
    ResultMetadata, SourceChangeDescriptor,
};

use crate::error::ProcessError;
use crate::middleware::MiddlewareRegistry;

/// §4.3 IncrementalProcessor.
///
/// `GraphStore.apply-change(ev)` (spec step 3 of the per-event pipeline) is
/// deliberately *not* invoked from here: the store is shared across every
/// query in the process (§5), so the orchestration layer applies a change
/// exactly once per incoming event and only then fans it out to each
/// registered query's `process`. By the time `process` runs, the store (and
/// any join re-derivation it triggers) already reflects `ev`.
pub struct IncrementalProcessor {
    graph: Arc<GraphStore>,
    cache: Arc<ResultCache>,
    middleware: MiddlewareRegistry,
}

impl IncrementalProcessor {
    pub fn new(graph: Arc<GraphStore>, cache: Arc<ResultCache>, middleware: MiddlewareRegistry) -> Self {
        IncrementalProcessor { graph, cache, middleware }
    }

    #[instrument(skip_all, fields(query_id = %query.query_id, source = %ev.source_id))]
    pub fn process(&self, query: &ContinuousQuery, stats: &QueryStats, ev: &ChangeEvent) -> Vec<ResultChange> {
        let start = Instant::now();
        match self.process_inner(query, ev) {
            Ok(changes) => {
                stats.record_event(start.elapsed().as_micros() as u64, false, now());
                for change in &changes {
                    match change.kind {
                        ResultChangeKind::Added => stats.record_added(),
                        ResultChangeKind::Updated => stats.record_updated(),
                        ResultChangeKind::Deleted => stats.record_deleted(),
                    }
                }
                changes
            }
            Err(err) => {
                warn!(error = %err, "dropping change event for query");
                stats.record_event(start.elapsed().as_micros() as u64, true, now());
                stats.record_dropped();
                Vec::new()
            }
        }
    }

    fn process_inner(&self, query: &ContinuousQuery, ev: &ChangeEvent) -> Result<Vec<ResultChange>, ProcessError> {
        // Step 1: subscription filter.
        if !query.accepts_source(&ev.source_id) {
            return Ok(Vec::new());
        }

        // Step 2: middleware pipeline.
        let Some(events) = self.run_middleware(query, ev.clone())? else {
            return Ok(Vec::new());
        };

        let mut raw = Vec::new();
        for ev in &events {
            raw.extend(self.dispatch(query, ev)?);
        }

        Ok(finalize(raw, query.mode))
    }

    /// Resolves and runs the subscription-specific middleware names followed
    /// by the query-wide pipeline (§3 carries both: `SourceSubscription`'s
    /// per-source list and `ContinuousQuery`'s top-level
    /// `middleware_pipeline`). Returns `None` if any stage drops every event.
    fn run_middleware(&self, query: &ContinuousQuery, ev: ChangeEvent) -> Result<Option<Vec<ChangeEvent>>, ProcessError> {
        let mut names: Vec<&str> = Vec::new();
        if let Some(sub) = query.subscription_for(&ev.source_id) {
            names.extend(sub.middleware.iter().map(String::as_str));
        }
        names.extend(query.middleware_pipeline.iter().map(String::as_str));

        let mut events = vec![ev];
        for name in names {
            let mw = self
                .middleware
                .get(name)
                .ok_or_else(|| ProcessError::UnknownMiddleware(name.to_string()))?;
            let mut next = Vec::with_capacity(events.len());
            for ev in events {
                next.extend(mw.apply(ev));
            }
            if next.is_empty() {
                return Ok(None);
            }
            events = next;
        }
        Ok(Some(events))
    }

    fn dispatch(&self, query: &ContinuousQuery, ev: &ChangeEvent) -> Result<Vec<ResultChange>, ProcessError> {
        if !label_matches(query, ev) {
            return Ok(Vec::new());
        }

        match ev.kind {
            ChangeKind::Insert | ChangeKind::Snapshot => {
                let after = ev.after.as_ref().expect("validated by GraphStore.apply_change");
                self.handle_insert(query, ev, after)
            }
            ChangeKind::Update => self.handle_update(query, ev),
            ChangeKind::Delete => self.handle_delete(query, ev),
        }
    }

    fn handle_insert(
        &self,
        query: &ContinuousQuery,
        ev: &ChangeEvent,
        after: &PropertyMap,
    ) -> Result<Vec<ResultChange>, ProcessError> {
        if !evaluate_predicate(&query.plan, after)? {
            return Ok(Vec::new());
        }

        let result_id = ResultId::derive(&query.query_id, &[&ev.entity_id]);
        let data = project(&query.plan, after)?;
        let metadata = Some(ResultMetadata {
            source_event_entity_id: ev.entity_id.clone(),
            kind: ev.kind,
        });
        let source_change = source_change(ev);

        match self.cache.get(result_id) {
            Some(existing) if existing.data == data => Ok(Vec::new()),
            Some(existing) => {
                let updated = existing.with_new_data(data, ev.timestamp, metadata);
                self.cache.put(updated.clone());
                Ok(vec![ResultChange::updated(existing, updated, ev.timestamp, source_change)])
            }
            None => {
                let row = graphflow_query::QueryResult::new(result_id, &query.query_id, data, ev.timestamp, metadata);
                self.cache.put(row.clone());
                Ok(vec![ResultChange::added(row, ev.timestamp, source_change)])
            }
        }
    }

    fn handle_update(&self, query: &ContinuousQuery, ev: &ChangeEvent) -> Result<Vec<ResultChange>, ProcessError> {
        let before = ev.before.as_ref().expect("validated by GraphStore.apply_change");
        let after = ev.after.as_ref().expect("validated by GraphStore.apply_change");

        let before_matched = evaluate_predicate(&query.plan, before)?;
        let after_matched = evaluate_predicate(&query.plan, after)?;

        match (before_matched, after_matched) {
            (false, true) => self.handle_insert(query, ev, after),
            (true, false) => {
                let own_id = ResultId::derive(&query.query_id, &[&ev.entity_id]);
                let source_change = source_change(ev);
                let mut changes = Vec::new();
                if let Some(removed) = self.cache.remove(own_id) {
                    changes.push(ResultChange::deleted(removed, ev.timestamp, source_change.clone()));
                }
                for candidate in self.candidate_result_ids(query, ev, before, after) {
                    if candidate == own_id {
                        continue;
                    }
                    let Some(existing) = self.cache.get(candidate) else { continue };
                    if matches!(self.reproject_sibling(query, &existing), SiblingProjection::NoLongerMatches) {
                        if let Some(removed) = self.cache.remove(candidate) {
                            changes.push(ResultChange::deleted(removed, ev.timestamp, source_change.clone()));
                        }
                    }
                }
                Ok(changes)
            }
            (true, true) => {
                let own_id = ResultId::derive(&query.query_id, &[&ev.entity_id]);
                let data = project(&query.plan, after)?;
                let metadata = Some(ResultMetadata {
                    source_event_entity_id: ev.entity_id.clone(),
                    kind: ev.kind,
                });
                let source_change = source_change(ev);
                let mut changes = Vec::new();

                if let Some(existing) = self.cache.get(own_id) {
                    if existing.data != data {
                        let updated = existing.with_new_data(data.clone(), ev.timestamp, metadata.clone());
                        self.cache.put(updated.clone());
                        changes.push(ResultChange::updated(existing, updated, ev.timestamp, source_change.clone()));
                    }
                }

                for candidate in self.candidate_result_ids(query, ev, before, after) {
                    if candidate == own_id {
                        continue;
                    }
                    let Some(existing) = self.cache.get(candidate) else { continue };
                    match self.reproject_sibling(query, &existing) {
                        SiblingProjection::Unchanged => {}
                        SiblingProjection::Updated(new_data) => {
                            let row_metadata = existing.metadata.clone();
                            let updated = existing.with_new_data(new_data, ev.timestamp, row_metadata);
                            self.cache.put(updated.clone());
                            changes.push(ResultChange::updated(existing, updated, ev.timestamp, source_change.clone()));
                        }
                        SiblingProjection::NoLongerMatches => {
                            if let Some(removed) = self.cache.remove(candidate) {
                                changes.push(ResultChange::deleted(removed, ev.timestamp, source_change.clone()));
                            }
                        }
                    }
                }
                Ok(changes)
            }
            (false, false) => Ok(Vec::new()),
        }
    }

    /// A resultId widened in by `find-by-entity`/`find-by-field` may belong
    /// to an entity other than the one this event mutated — those indexes
    /// only say "this row's data mentions the same value", not "this row
    /// was produced by the same node". Re-deriving such a candidate's state
    /// from `ev`'s own before/after would bleed one entity's data onto
    /// another's row, so a sibling is always re-evaluated against its own
    /// contributing node (the id recorded in its `ResultMetadata`) instead.
    fn reproject_sibling(&self, query: &ContinuousQuery, existing: &QueryResult) -> SiblingProjection {
        let Some(metadata) = existing.metadata.as_ref() else {
            return SiblingProjection::NoLongerMatches;
        };
        let Some(node) = self.graph.get_node(&metadata.source_event_entity_id) else {
            return SiblingProjection::NoLongerMatches;
        };
        match evaluate_predicate(&query.plan, &node.properties) {
            Ok(true) => match project(&query.plan, &node.properties) {
                Ok(data) if data == existing.data => SiblingProjection::Unchanged,
                Ok(data) => SiblingProjection::Updated(data),
                Err(_) => SiblingProjection::NoLongerMatches,
            },
            _ => SiblingProjection::NoLongerMatches,
        }
    }

    fn handle_delete(&self, query: &ContinuousQuery, ev: &ChangeEvent) -> Result<Vec<ResultChange>, ProcessError> {
        let before = ev.before.as_ref().expect("validated by GraphStore.apply_change");
        let source_change = source_change(ev);
        let mut changes = Vec::new();
        for candidate in self.candidate_result_ids(query, ev, before, before) {
            if let Some(removed) = self.cache.remove(candidate) {
                changes.push(ResultChange::deleted(removed, ev.timestamp, source_change.clone()));
            }
        }
        Ok(changes)
    }

    /// The candidate resultIds an UPDATE/DELETE might need to touch (§4.3):
    /// the deterministic id this entity owns under this query (the only
    /// candidate a single-node pattern ever produces), widened by
    /// `find-by-entity` and, for every property whose value changed,
    /// `find-by-field` on the *old* value — these widenings exist for
    /// projections of *other* rows that reference this entity by foreign
    /// key, a case the MVP's single-pattern evaluator cannot itself produce
    /// but which the cache indexes generically regardless.
    fn candidate_result_ids(
        &self,
        query: &ContinuousQuery,
        ev: &ChangeEvent,
        before: &PropertyMap,
        after: &PropertyMap,
    ) -> HashSet<ResultId> {
        let mut candidates = HashSet::new();
        candidates.insert(ResultId::derive(&query.query_id, &[&ev.entity_id]));
        candidates.extend(self.cache.find_by_entity(&ev.entity_type, &ev.entity_id));
        for (name, old_value) in before {
            if after.get(name) != Some(old_value) {
                candidates.extend(self.cache.find_by_field(name, old_value));
            }
        }
        candidates
    }
}

/// Outcome of re-evaluating a widened candidate against its own
/// contributing node, independent of the entity that triggered the event.
enum SiblingProjection {
    Unchanged,
    Updated(PropertyMap),
    NoLongerMatches,
}

fn label_matches(query: &ContinuousQuery, ev: &ChangeEvent) -> bool {
    let mapped = query
        .subscription_for(&ev.source_id)
        .map(|sub| sub.map_node_label(&ev.entity_type))
        .unwrap_or(&ev.entity_type);
    mapped == query.plan.label
}

fn source_change(ev: &ChangeEvent) -> SourceChangeDescriptor {
    SourceChangeDescriptor {
        source_id: ev.source_id.clone(),
        kind: ev.kind,
        entity_type: ev.entity_type.clone(),
        entity_id: ev.entity_id.clone(),
    }
}

/// §4.3 tie-breaking + FILTER-mode specialization, applied once per event
/// after every candidate has produced its change: coalesce duplicate
/// resultIds to the strongest kind (DELETED < UPDATED < ADDED), suppress
/// everything but ADDED in FILTER mode, then sort DELETED-before-UPDATED-
/// before-ADDED.
fn finalize(raw: Vec<ResultChange>, mode: QueryMode) -> Vec<ResultChange> {
    let mut by_id: hashbrown::HashMap<ResultId, ResultChange> = hashbrown::HashMap::new();
    for change in raw {
        let rid = change
            .after
            .as_ref()
            .map(|r| r.result_id)
            .or_else(|| change.before.as_ref().map(|r| r.result_id));
        let Some(rid) = rid else { continue };
        match by_id.get(&rid) {
            Some(existing) if existing.ordering_rank() >= change.ordering_rank() => {}
            _ => {
                by_id.insert(rid, change);
            }
        }
    }

    let mut changes: Vec<ResultChange> = by_id.into_values().collect();
    if mode == QueryMode::Filter {
        changes.retain(|c| c.kind == ResultChangeKind::Added);
    }
    changes.sort_by_key(|c| c.ordering_rank());
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use graphflow_primitives::{DateTime, ScalarValue, Utc};
    use graphflow_query::{ContinuousQueryConfig, QueryMode, SourceSubscription, ViewConfig};

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, h, 0, 0).unwrap()
    }

    fn order_query(text: &str) -> ContinuousQuery {
        ContinuousQuery::new(ContinuousQueryConfig {
            query_id: "q1".into(),
            name: "ready orders".into(),
            mode: QueryMode::Query,
            language: "cypher".into(),
            text: text.into(),
            subscriptions: vec![],
            joins: vec![],
            middleware_pipeline: vec![],
            params: Default::default(),
            view: ViewConfig::default(),
        })
        .unwrap()
    }

    fn props(pairs: &[(&str, ScalarValue)]) -> PropertyMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn insert(entity_id: i64, h: u32, after: PropertyMap) -> ChangeEvent {
        ChangeEvent {
            kind: ChangeKind::Insert,
            source_id: "s".into(),
            entity_type: "Order".into(),
            entity_id: EntityId::from(entity_id),
            before: None,
            after: Some(after),
            timestamp: ts(h),
            metadata: PropertyMap::new(),
        }
    }

    fn update(entity_id: i64, h: u32, before: PropertyMap, after: PropertyMap) -> ChangeEvent {
        ChangeEvent {
            kind: ChangeKind::Update,
            source_id: "s".into(),
            entity_type: "Order".into(),
            entity_id: EntityId::from(entity_id),
            before: Some(before),
            after: Some(after),
            timestamp: ts(h),
            metadata: PropertyMap::new(),
        }
    }

    fn delete(entity_id: i64, h: u32, before: PropertyMap) -> ChangeEvent {
        ChangeEvent {
            kind: ChangeKind::Delete,
            source_id: "s".into(),
            entity_type: "Order".into(),
            entity_id: EntityId::from(entity_id),
            before: Some(before),
            after: None,
            timestamp: ts(h),
            metadata: PropertyMap::new(),
        }
    }

    fn processor() -> (IncrementalProcessor, Arc<ResultCache>, Arc<GraphStore>) {
        let graph = Arc::new(GraphStore::new());
        let cache = Arc::new(ResultCache::new());
        (IncrementalProcessor::new(graph.clone(), cache.clone(), MiddlewareRegistry::new()), cache, graph)
    }

    // S1
    #[test]
    fn insert_match_emits_added() {
        let (proc, _cache, _graph) = processor();
        let query = order_query("MATCH (o:Order) WHERE o.status = 'READY_FOR_PICKUP' RETURN o.id, o.customer");
        let stats = QueryStats::new();
        let ev = insert(
            5,
            0,
            props(&[
                ("id", ScalarValue::Int(5)),
                ("customer", ScalarValue::from("Alice")),
                ("status", ScalarValue::from("READY_FOR_PICKUP")),
                ("driverAssigned", ScalarValue::Bool(false)),
            ]),
        );
        let changes = proc.process(&query, &stats, &ev);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ResultChangeKind::Added);
        let data = &changes[0].after.as_ref().unwrap().data;
        assert_eq!(data.get("id"), Some(&ScalarValue::Int(5)));
        assert_eq!(data.get("customer"), Some(&ScalarValue::from("Alice")));
        assert_eq!(data.len(), 2);
    }

    // S2
    #[test]
    fn update_transition_into_match_emits_added() {
        let (proc, _cache, _graph) = processor();
        let query = order_query("MATCH (o:Order) WHERE o.status = 'READY_FOR_PICKUP' RETURN o.id");
        let stats = QueryStats::new();
        let ev = update(
            1,
            0,
            props(&[("id", ScalarValue::Int(1)), ("status", ScalarValue::from("PREPARING")), ("driverAssigned", ScalarValue::Bool(false))]),
            props(&[("id", ScalarValue::Int(1)), ("status", ScalarValue::from("READY_FOR_PICKUP")), ("driverAssigned", ScalarValue::Bool(false))]),
        );
        let changes = proc.process(&query, &stats, &ev);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ResultChangeKind::Added);
    }

    // S3
    #[test]
    fn update_staying_in_with_projection_change_emits_updated() {
        let (proc, _cache, _graph) = processor();
        let query = order_query("MATCH (o:Order) WHERE o.status = 'READY_FOR_PICKUP' RETURN o.id, o.customer");
        let stats = QueryStats::new();
        let ins = insert(5, 0, props(&[("id", ScalarValue::Int(5)), ("customer", ScalarValue::from("Alice")), ("status", ScalarValue::from("READY_FOR_PICKUP"))]));
        proc.process(&query, &stats, &ins);

        let upd = update(
            5,
            1,
            props(&[("id", ScalarValue::Int(5)), ("customer", ScalarValue::from("Alice")), ("status", ScalarValue::from("READY_FOR_PICKUP"))]),
            props(&[("id", ScalarValue::Int(5)), ("customer", ScalarValue::from("Alicia")), ("status", ScalarValue::from("READY_FOR_PICKUP"))]),
        );
        let changes = proc.process(&query, &stats, &upd);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ResultChangeKind::Updated);
        assert_eq!(changes[0].before.as_ref().unwrap().data.get("customer"), Some(&ScalarValue::from("Alice")));
        assert_eq!(changes[0].after.as_ref().unwrap().data.get("customer"), Some(&ScalarValue::from("Alicia")));
        assert_eq!(changes[0].before.as_ref().unwrap().result_id, changes[0].after.as_ref().unwrap().result_id);
    }

    // Regression: a changed field's *old* value may be shared by another
    // entity's row (both indexed under the same `by_field` entry). Updating
    // one entity must never rewrite or delete the other's row with data
    // that was never its own.
    #[test]
    fn update_does_not_bleed_into_a_sibling_row_sharing_the_changed_field() {
        let (proc, cache, graph) = processor();
        let query = order_query("MATCH (o:Order) RETURN o.id, o.customer");
        let stats = QueryStats::new();

        let ins5 = insert(5, 0, props(&[("id", ScalarValue::Int(5)), ("customer", ScalarValue::from("Alice"))]));
        graph.apply_change(&ins5).unwrap();
        proc.process(&query, &stats, &ins5);

        let ins7 = insert(7, 0, props(&[("id", ScalarValue::Int(7)), ("customer", ScalarValue::from("Alice"))]));
        graph.apply_change(&ins7).unwrap();
        proc.process(&query, &stats, &ins7);

        let upd5 = update(
            5,
            1,
            props(&[("id", ScalarValue::Int(5)), ("customer", ScalarValue::from("Alice"))]),
            props(&[("id", ScalarValue::Int(5)), ("customer", ScalarValue::from("Bob"))]),
        );
        graph.apply_change(&upd5).unwrap();
        let changes = proc.process(&query, &stats, &upd5);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ResultChangeKind::Updated);
        assert_eq!(changes[0].after.as_ref().unwrap().data.get("customer"), Some(&ScalarValue::from("Bob")));

        let r7 = ResultId::derive("q1", &[&EntityId::from(7i64)]);
        let row7 = cache.get(r7).expect("order 7's row must still be in the cache");
        assert_eq!(row7.data.get("id"), Some(&ScalarValue::Int(7)));
        assert_eq!(row7.data.get("customer"), Some(&ScalarValue::from("Alice")));
    }

    // S4
    #[test]
    fn update_leaving_match_emits_deleted() {
        let (proc, _cache, _graph) = processor();
        let query = order_query("MATCH (o:Order) WHERE o.status = 'READY_FOR_PICKUP' RETURN o.id");
        let stats = QueryStats::new();
        let ins = insert(5, 0, props(&[("id", ScalarValue::Int(5)), ("status", ScalarValue::from("READY_FOR_PICKUP"))]));
        proc.process(&query, &stats, &ins);

        let upd = update(
            5,
            1,
            props(&[("id", ScalarValue::Int(5)), ("status", ScalarValue::from("READY_FOR_PICKUP"))]),
            props(&[("id", ScalarValue::Int(5)), ("status", ScalarValue::from("PICKED_UP"))]),
        );
        let changes = proc.process(&query, &stats, &upd);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ResultChangeKind::Deleted);
        assert!(changes[0].after.is_none());
    }

    // Regression: the mirror of the sibling-bleed case above for an entity
    // leaving the match — a sibling sharing the old field value must not be
    // deleted just because it was widened into the candidate set.
    #[test]
    fn update_leaving_match_does_not_delete_a_sibling_row_sharing_the_old_field() {
        let (proc, cache, graph) = processor();
        let query = order_query("MATCH (o:Order) WHERE o.status = 'READY_FOR_PICKUP' RETURN o.id, o.customer");
        let stats = QueryStats::new();

        let ins5 = insert(
            5,
            0,
            props(&[("id", ScalarValue::Int(5)), ("status", ScalarValue::from("READY_FOR_PICKUP")), ("customer", ScalarValue::from("Alice"))]),
        );
        graph.apply_change(&ins5).unwrap();
        proc.process(&query, &stats, &ins5);

        let ins7 = insert(
            7,
            0,
            props(&[("id", ScalarValue::Int(7)), ("status", ScalarValue::from("READY_FOR_PICKUP")), ("customer", ScalarValue::from("Alice"))]),
        );
        graph.apply_change(&ins7).unwrap();
        proc.process(&query, &stats, &ins7);

        let upd5 = update(
            5,
            1,
            props(&[("id", ScalarValue::Int(5)), ("status", ScalarValue::from("READY_FOR_PICKUP")), ("customer", ScalarValue::from("Alice"))]),
            props(&[("id", ScalarValue::Int(5)), ("status", ScalarValue::from("PICKED_UP")), ("customer", ScalarValue::from("Bob"))]),
        );
        graph.apply_change(&upd5).unwrap();
        let changes = proc.process(&query, &stats, &upd5);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ResultChangeKind::Deleted);
        assert_eq!(changes[0].before.as_ref().unwrap().data.get("id"), Some(&ScalarValue::Int(5)));

        let r7 = ResultId::derive("q1", &[&EntityId::from(7i64)]);
        let row7 = cache.get(r7).expect("order 7's row must still be in the cache");
        assert_eq!(row7.data.get("customer"), Some(&ScalarValue::from("Alice")));
    }

    // S5
    #[test]
    fn delete_emits_deleted() {
        let (proc, _cache, _graph) = processor();
        let query = order_query("MATCH (o:Order) WHERE o.status = 'READY_FOR_PICKUP' RETURN o.id");
        let stats = QueryStats::new();
        let ins = insert(1, 0, props(&[("id", ScalarValue::Int(1)), ("status", ScalarValue::from("READY_FOR_PICKUP"))]));
        proc.process(&query, &stats, &ins);

        let del = delete(1, 1, props(&[("id", ScalarValue::Int(1)), ("status", ScalarValue::from("READY_FOR_PICKUP"))]));
        let changes = proc.process(&query, &stats, &del);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ResultChangeKind::Deleted);
    }

    // S6
    #[test]
    fn idempotent_replay_of_identical_insert_emits_nothing() {
        let (proc, _cache, _graph) = processor();
        let query = order_query("MATCH (o:Order) WHERE o.status = 'READY_FOR_PICKUP' RETURN o.id");
        let stats = QueryStats::new();
        let ev = insert(5, 0, props(&[("id", ScalarValue::Int(5)), ("status", ScalarValue::from("READY_FOR_PICKUP"))]));
        let first = proc.process(&query, &stats, &ev);
        assert_eq!(first.len(), 1);
        let second = proc.process(&query, &stats, &ev);
        assert!(second.is_empty());
    }

    #[test]
    fn non_matching_predicate_emits_nothing() {
        let (proc, _cache, _graph) = processor();
        let query = order_query("MATCH (o:Order) WHERE o.status = 'READY_FOR_PICKUP' RETURN o.id");
        let stats = QueryStats::new();
        let ev = insert(5, 0, props(&[("id", ScalarValue::Int(5)), ("status", ScalarValue::from("PREPARING"))]));
        assert!(proc.process(&query, &stats, &ev).is_empty());
    }

    #[test]
    fn subscription_filter_rejects_unlisted_source() {
        let (proc, _cache, _graph) = processor();
        let mut query = order_query("MATCH (o:Order) RETURN o.id");
        query.subscriptions = vec![SourceSubscription {
            source_id: "other".into(),
            node_label_mappings: vec![],
            relation_label_mappings: vec![],
            middleware: vec![],
        }];
        let stats = QueryStats::new();
        let ev = insert(5, 0, props(&[("id", ScalarValue::Int(5))]));
        assert!(proc.process(&query, &stats, &ev).is_empty());
    }

    #[test]
    fn unknown_middleware_drops_event_and_increments_error_count() {
        let (proc, _cache, _graph) = processor();
        let mut query = order_query("MATCH (o:Order) RETURN o.id");
        query.middleware_pipeline = vec!["missing".into()];
        let stats = QueryStats::new();
        let ev = insert(5, 0, props(&[("id", ScalarValue::Int(5))]));
        assert!(proc.process(&query, &stats, &ev).is_empty());
        assert_eq!(stats.error_count(), 1);
    }

    #[test]
    fn filter_mode_suppresses_updated_and_deleted() {
        let (proc, _cache, _graph) = processor();
        let mut query = order_query("MATCH (o:Order) WHERE o.status = 'READY_FOR_PICKUP' RETURN o.id");
        query.mode = QueryMode::Filter;
        let stats = QueryStats::new();

        let ins = insert(5, 0, props(&[("id", ScalarValue::Int(5)), ("status", ScalarValue::from("READY_FOR_PICKUP"))]));
        let added = proc.process(&query, &stats, &ins);
        assert_eq!(added.len(), 1);

        let upd = update(
            5,
            1,
            props(&[("id", ScalarValue::Int(5)), ("status", ScalarValue::from("READY_FOR_PICKUP"))]),
            props(&[("id", ScalarValue::Int(5)), ("status", ScalarValue::from("PICKED_UP"))]),
        );
        assert!(proc.process(&query, &stats, &upd).is_empty());
    }
}
