//! Transfer operation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use super::batch::BatchId;
use super::equipment::{EquipmentId, Occupancy};
use super::node::PortName;
use super::segment::{SegmentId, ValveId};

/// Unique identifier for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create an OperationId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for OperationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// What kind of material movement an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Vessel-to-vessel transfer.
    Transfer,
    /// Charging raw material into a vessel.
    Charge,
    /// Discharging product out of a vessel.
    Discharge,
    /// Circulating through an intermediate vessel and back.
    Recirculation,
}

impl OperationKind {
    /// Parse operation kind from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "transfer" => Some(Self::Transfer),
            "charge" => Some(Self::Charge),
            "discharge" => Some(Self::Discharge),
            "recirculation" => Some(Self::Recirculation),
            _ => None,
        }
    }
}

impl Default for OperationKind {
    fn default() -> Self {
        Self::Transfer
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transfer => write!(f, "transfer"),
            Self::Charge => write!(f, "charge"),
            Self::Discharge => write!(f, "discharge"),
            Self::Recirculation => write!(f, "recirculation"),
        }
    }
}

/// Operation status. There is no persisted pending state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Route reserved, valves open.
    Active,
    /// Ended normally; batch transfer performed.
    Completed,
    /// Cancelled; no batch transfer.
    Cancelled,
}

impl OperationStatus {
    /// Completed or Cancelled.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A planned and executed material transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Operation id.
    pub id: OperationId,
    /// Kind of movement.
    pub kind: OperationKind,
    /// Start node name.
    pub from_node: String,
    /// End node name.
    pub to_node: String,
    /// Intermediate vessel, if routed through one.
    pub via: Option<EquipmentId>,
    /// Batch being moved, if any.
    pub batch_id: Option<BatchId>,
    /// Current status.
    pub status: OperationStatus,
    /// When the route was reserved.
    pub started_at: DateTime<Utc>,
    /// When the operation ended or was cancelled.
    pub ended_at: Option<DateTime<Utc>>,
    /// Segments held in the reservation ledger, in route order.
    pub segments: Vec<SegmentId>,
    /// Valves the route depends on.
    pub valves: BTreeSet<ValveId>,
    /// Occupancy of each touched vessel before the operation started.
    pub prior_occupancy: BTreeMap<EquipmentId, Occupancy>,
    /// Mass moved on completion.
    pub transferred_mass: Option<f64>,
}

impl Operation {
    /// Whether the operation still holds its route.
    pub fn is_active(&self) -> bool {
        self.status == OperationStatus::Active
    }

    /// Equipment at the start node, if it is a port.
    pub fn source_equipment(&self) -> Option<EquipmentId> {
        PortName::parse(&self.from_node).equipment().cloned()
    }

    /// Equipment at the end node, if it is a port.
    pub fn destination_equipment(&self) -> Option<EquipmentId> {
        PortName::parse(&self.to_node).equipment().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(!OperationStatus::Active.is_terminal());
        assert!(OperationStatus::Completed.is_terminal());
        assert!(OperationStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_kind_roundtrip_display() {
        for kind in [
            OperationKind::Transfer,
            OperationKind::Charge,
            OperationKind::Discharge,
            OperationKind::Recirculation,
        ] {
            assert_eq!(OperationKind::from_str(&kind.to_string()), Some(kind));
        }
    }
}
