//! The continuous query engine's orchestration layer (§4.4): owns the
//! shared [`graphflow_graph::GraphStore`] and [`graphflow_cache::ResultCache`],
//! registers [`graphflow_query::ContinuousQuery`] descriptors, drives the
//! [`graphflow_processor::IncrementalProcessor`] over every ingested
//! `ChangeEvent`, and exposes the admin surface from §6: create/delete/get/
//! list query, current- and point-in-time results, stats, and streaming
//! `subscribe`.

mod engine;
mod error;
mod queue;

pub use engine::Engine;
pub use error::EngineError;
pub use queue::{Subscription, DEFAULT_QUEUE_CAPACITY};
