use serde::{Deserialize, Serialize};

/// §3 ViewConfig retention policy — "already expressed as a sum type in the
/// source; preserve as an algebraic enum in the target" (§9).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RetentionPolicy {
    /// Keep only the current row; no history.
    Latest,
    /// Keep every historical version, forever.
    All,
    /// Keep historical versions for a bounded duration.
    Expire { ttl_seconds: i64 },
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::Latest
    }
}

/// §3 ViewConfig.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ViewConfig {
    pub retention: RetentionPolicy,
}
