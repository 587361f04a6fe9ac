//! Scalar values, entity and result identifiers, and the deterministic
//! hashing helpers shared by every other crate in the engine.

mod ids;
mod value;

pub use ids::{ContentHash, EntityId, ResultId};
pub use value::{PropertyMap, ScalarValue};

pub use chrono::{DateTime, Utc};

/// The current instant, as used throughout the engine for `ChangeEvent`
/// ingestion timestamps and `QueryResult`/`ResultChange` bookkeeping. Tests
/// construct `DateTime<Utc>` values explicitly rather than calling this, to
/// keep scenarios deterministic.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
