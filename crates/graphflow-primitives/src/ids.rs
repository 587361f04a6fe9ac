use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value::ScalarValue;

/// The opaque primary-key value of an upstream entity — the identifier
/// carried by a `ChangeEvent` and the identifier of a `Node` (§3).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub ScalarValue);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ScalarValue> for EntityId {
    fn from(v: ScalarValue) -> Self {
        EntityId(v)
    }
}

impl From<i64> for EntityId {
    fn from(v: i64) -> Self {
        EntityId(ScalarValue::Int(v))
    }
}

impl From<&str> for EntityId {
    fn from(v: &str) -> Self {
        EntityId(ScalarValue::from(v))
    }
}

/// A deterministic content hash, the same technique `QueryHash` uses in the
/// teacher's `crates/core/src/subscription/execution_unit.rs`
/// (`blake3::hash(bytes).into()`), generalized to any identifier the engine
/// must derive rather than invent (§9: "the spec mandates deterministic
/// resultIds... implementers must not carry the UUID approach across").
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            // Length-prefix every part so that ("ab", "c") and ("a", "bc")
            // never collide.
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        ContentHash(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The deterministic identifier of a `QueryResult` row: a stable hash of the
/// owning query id and the tuple of contributing entity ids, in pattern
/// order (§3, §4.3). Two evaluations of the same pattern match over the same
/// entities always produce the same `ResultId`, which is what makes replay
/// (§8 property 4, idempotence) and `ADDED`-after-`DELETED` re-emission
/// (§3 ResultChange invariants) well defined.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ResultId(ContentHash);

impl ResultId {
    pub fn derive(query_id: &str, entity_ids: &[&EntityId]) -> Self {
        let mut parts: Vec<Vec<u8>> = Vec::with_capacity(entity_ids.len() + 1);
        parts.push(query_id.as_bytes().to_vec());
        for id in entity_ids {
            parts.push(id.to_string().into_bytes());
        }
        let refs: Vec<&[u8]> = parts.iter().map(|p| p.as_slice()).collect();
        ResultId(ContentHash::of(&refs))
    }
}

impl fmt::Debug for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResultId({})", self.0.to_hex())
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ResultId> for String {
    fn from(id: ResultId) -> Self {
        id.0.to_hex()
    }
}

impl TryFrom<String> for ResultId {
    type Error = hex::FromHexError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(ResultId(ContentHash(arr)))
    }
}
