//! The in-memory node/relationship graph that mirrors every upstream entity
//! a live continuous query might reference (§4.1). `GraphStore` is the sole
//! mutable surface: `graphflow-processor` drives it with `ChangeEvent`s and
//! reads it back while re-evaluating query patterns.

mod error;
mod model;
mod store;

pub use error::GraphError;
pub use model::{Node, Relationship};
pub use store::GraphStore;
