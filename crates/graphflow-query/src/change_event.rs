use serde::{Deserialize, Serialize};

use graphflow_primitives::{DateTime, EntityId, PropertyMap, Utc};

/// §3 ChangeEvent. `Snapshot` behaves like `Insert` for store purposes but is
/// kept distinct so a bulk load can be told apart from steady-state traffic
/// in stats and logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    Snapshot,
}

/// §3 ChangeEvent / §6 ingress schema.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub source_id: String,
    pub entity_type: String,
    pub entity_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<PropertyMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<PropertyMap>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: PropertyMap,
}

/// Why an event was rejected before it ever reached `GraphStore::apply_change`
/// (§4.1 "malformed events... are logged and dropped — they do not abort the
/// stream", §7 "Input errors").
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChangeEventError {
    #[error("INSERT/SNAPSHOT event for {0:?} is missing its `after` attributes")]
    MissingAfter(ChangeKind),
    #[error("DELETE event is missing its `before` attributes")]
    MissingBefore,
    #[error("UPDATE event is missing {0}")]
    MissingUpdateHalf(&'static str),
}

impl ChangeEvent {
    /// Checks the invariants in §3: "INSERT and SNAPSHOT have *after* and no
    /// *before*; DELETE has *before* and no *after*; UPDATE has both."
    pub fn validate(&self) -> Result<(), ChangeEventError> {
        match self.kind {
            ChangeKind::Insert | ChangeKind::Snapshot => {
                if self.after.is_none() {
                    return Err(ChangeEventError::MissingAfter(self.kind));
                }
            }
            ChangeKind::Delete => {
                if self.before.is_none() {
                    return Err(ChangeEventError::MissingBefore);
                }
            }
            ChangeKind::Update => {
                if self.before.is_none() {
                    return Err(ChangeEventError::MissingUpdateHalf("`before`"));
                }
                if self.after.is_none() {
                    return Err(ChangeEventError::MissingUpdateHalf("`after`"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn insert_without_after_is_rejected() {
        let ev = ChangeEvent {
            kind: ChangeKind::Insert,
            source_id: "s".into(),
            entity_type: "Order".into(),
            entity_id: EntityId::from(1i64),
            before: None,
            after: None,
            timestamp: ts(),
            metadata: Default::default(),
        };
        assert_eq!(ev.validate(), Err(ChangeEventError::MissingAfter(ChangeKind::Insert)));
    }

    #[test]
    fn wire_shape_uses_camel_case_and_uppercase_kind() {
        let ev = ChangeEvent {
            kind: ChangeKind::Update,
            source_id: "pg".into(),
            entity_type: "Order".into(),
            entity_id: EntityId::from(5i64),
            before: Some(Default::default()),
            after: Some(Default::default()),
            timestamp: ts(),
            metadata: Default::default(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "UPDATE");
        assert_eq!(json["sourceId"], "pg");
        assert_eq!(json["entityType"], "Order");
    }
}
