//! Wire types exchanged with the ChamberView simulation service.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Identifier of a chamber artifact on the server.
///
/// The server may report ids as JSON numbers or strings; both are kept in
/// their textual form since the id is only ever used to build artifact paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChamberId(pub String);

impl ChamberId {
    /// Creates a chamber id from anything printable.
    pub fn new(id: impl std::fmt::Display) -> Self {
        Self(id.to_string())
    }
    
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChamberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawChamberId {
    Number(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for ChamberId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawChamberId::deserialize(deserializer)? {
            RawChamberId::Number(n) => Self(n.to_string()),
            RawChamberId::Text(s) => Self(s),
        })
    }
}

impl Serialize for ChamberId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Per-slot data inside a simulation step, addressed by slot index.
///
/// Accepts either a JSON array (position = slot index) or a JSON object whose
/// keys are slot indices.
#[derive(Debug, Clone, PartialEq)]
pub struct ChamberTable<T>(BTreeMap<usize, T>);

impl<T> ChamberTable<T> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }
    
    /// Returns the entry for a slot, if the server sent one.
    pub fn get(&self, slot: usize) -> Option<&T> {
        self.0.get(&slot)
    }
    
    /// Inserts or replaces the entry for a slot.
    pub fn insert(&mut self, slot: usize, value: T) {
        self.0.insert(slot, value);
    }
    
    /// Number of slots with data.
    pub fn len(&self) -> usize {
        self.0.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> Default for ChamberTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for ChamberTable<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().enumerate().collect())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TableRepr<T> {
    Seq(Vec<T>),
    Map(BTreeMap<String, T>),
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ChamberTable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match TableRepr::deserialize(deserializer)? {
            TableRepr::Seq(items) => Ok(items.into_iter().collect()),
            TableRepr::Map(entries) => {
                let mut table = BTreeMap::new();
                for (key, value) in entries {
                    let slot = key
                        .parse::<usize>()
                        .map_err(|_| D::Error::custom(format!("invalid chamber index `{}`", key)))?;
                    table.insert(slot, value);
                }
                Ok(Self(table))
            }
        }
    }
}

impl<T: Serialize> Serialize for ChamberTable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter())
    }
}

/// A single ball position, in chamber units (x in `[0, 1]`, y upward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallPosition {
    pub x: f64,
    pub y: f64,
    
    /// Ball radius in chamber units, when the server reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<f64>,
}

impl BallPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, r: None }
    }
}

/// One server-reported simulation tick (`GET /simulation_state`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationStep {
    /// Monotonically increasing step counter
    pub num_steps_taken: u64,
    
    /// Raw sandbox state bytes per slot
    #[serde(default)]
    pub chamber_states: ChamberTable<Vec<u8>>,
    
    /// Ball positions per slot
    #[serde(default)]
    pub chamber_balls: ChamberTable<Vec<BallPosition>>,
}

/// Layout bootstrap (`GET /init_info`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitInfo {
    /// Chamber height as a fraction of chamber width
    pub chamber_height: f64,
    
    /// Number of chambers laid out per grid row
    pub chambers_per_row: usize,
    
    /// Current ball count
    pub num_balls: u64,
    
    /// Artifact ids, one per populated slot
    pub chamber_ids: Vec<ChamberId>,
}

/// Logged-in user (`GET /userinfo`). Defaults to an anonymous non-admin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    
    #[serde(default)]
    pub is_admin: bool,
}
