use hashbrown::HashMap;
use std::sync::Arc;

use graphflow_query::ChangeEvent;

/// One named pipeline stage (§4.3 step 2): "a function ChangeEvent → lazy
/// sequence of ChangeEvent (enabling enrichment, validation, or fan-out)."
/// Returning an empty `Vec` drops the event; returning more than one entry
/// fans it out into several.
pub trait Middleware: Send + Sync {
    fn apply(&self, ev: ChangeEvent) -> Vec<ChangeEvent>;
}

/// The set of middlewares an `IncrementalProcessor` can resolve names
/// against. A `SourceSubscription`/`ContinuousQuery` only ever carries
/// middleware *names* (§3) — the registry is where those names are bound to
/// actual behavior, the same separation `ContinuousQueryConfig` draws
/// between descriptor and compiled plan.
pub type MiddlewareRegistry = HashMap<String, Arc<dyn Middleware>>;
