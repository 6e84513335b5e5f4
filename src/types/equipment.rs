//! Equipment identity and occupancy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a vessel or other piece of process equipment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EquipmentId(String);

impl EquipmentId {
    /// Create an equipment id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EquipmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Physical occupancy flag of a piece of equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occupancy {
    /// Nothing in the vessel.
    Empty,
    /// Holds a batch.
    Occupied,
    /// Taking part in an active transfer.
    InTransfer,
}

impl Occupancy {
    /// Parse occupancy from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "empty" => Some(Self::Empty),
            "occupied" => Some(Self::Occupied),
            "in_transfer" | "in-transfer" => Some(Self::InTransfer),
            _ => None,
        }
    }
}

impl Default for Occupancy {
    fn default() -> Self {
        Self::Empty
    }
}

impl fmt::Display for Occupancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Occupied => write!(f, "occupied"),
            Self::InTransfer => write!(f, "in_transfer"),
        }
    }
}
