//! The continuous-query data contract (§3, §4.4): `ChangeEvent`,
//! `ContinuousQuery` and its `SourceSubscription`/`JoinDefinition`/
//! `ViewConfig` building blocks, `QueryResult`, `ResultChange`, and
//! `QueryStats`. These are plain, immutable (once built) value types with no
//! behavior beyond validation and compilation — the algorithm that turns a
//! `ChangeEvent` into `ResultChange`s lives in `graphflow-processor`.

mod change_event;
mod join;
mod query;
mod result;
mod stats;
mod view;

pub use change_event::{ChangeEvent, ChangeEventError, ChangeKind};
pub use join::{JoinDefinition, JoinDefinitionError, JoinKey};
pub use query::{ContinuousQuery, ContinuousQueryConfig, LabelMapping, QueryDefinitionError, QueryMode, SourceSubscription};
pub use result::{QueryResult, ResultChange, ResultChangeKind, ResultMetadata, SourceChangeDescriptor};
pub use stats::{QueryStats, QueryStatsSnapshot};
pub use view::{RetentionPolicy, ViewConfig};
