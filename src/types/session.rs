//! Continuous melting sessions and their event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::equipment::EquipmentId;
use crate::error::{KernelError, KernelResult};

/// Unique identifier for a continuous process session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a SessionId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An observation in a melting session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeltEvent {
    /// Solid material charged into the melter.
    Addition {
        /// Mass added (kg).
        mass: f64,
        /// When it was added.
        at: DateTime<Utc>,
    },
    /// Molten material drawn off.
    Withdrawal {
        /// Mass withdrawn (kg).
        mass: f64,
        /// When it was withdrawn.
        at: DateTime<Utc>,
    },
    /// Authoritative manual statement of the currently available mass.
    Correction {
        /// Declared available mass (kg).
        mass: f64,
        /// When it was declared.
        at: DateTime<Utc>,
    },
}

impl MeltEvent {
    /// Event mass (kg).
    pub fn mass(&self) -> f64 {
        match *self {
            Self::Addition { mass, .. }
            | Self::Withdrawal { mass, .. }
            | Self::Correction { mass, .. } => mass,
        }
    }

    /// Event timestamp.
    pub fn at(&self) -> DateTime<Utc> {
        match *self {
            Self::Addition { at, .. } | Self::Withdrawal { at, .. } | Self::Correction { at, .. } => at,
        }
    }

    /// Whether this is a correction.
    pub fn is_correction(&self) -> bool {
        matches!(self, Self::Correction { .. })
    }
}

/// A time-extended melting process.
///
/// Deserialising goes through the same checks as [`ContinuousSession::new`]
/// and [`ContinuousSession::record`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SessionRecord")]
pub struct ContinuousSession {
    /// Session id.
    pub id: SessionId,
    /// Melter the session runs in.
    pub equipment: EquipmentId,
    /// Material being melted.
    pub material: String,
    /// Configured melt rate (kg/h).
    pub melt_rate: f64,
    /// Session start.
    pub started_at: DateTime<Utc>,
    /// Events ordered by timestamp.
    events: Vec<MeltEvent>,
}

/// Unchecked wire form of a session.
#[derive(Deserialize)]
struct SessionRecord {
    id: SessionId,
    equipment: EquipmentId,
    material: String,
    melt_rate: f64,
    started_at: DateTime<Utc>,
    #[serde(default)]
    events: Vec<MeltEvent>,
}

impl TryFrom<SessionRecord> for ContinuousSession {
    type Error = KernelError;

    fn try_from(record: SessionRecord) -> KernelResult<Self> {
        let mut session = Self::new(record.equipment, record.material, record.melt_rate, record.started_at)?;
        session.id = record.id;
        for event in record.events {
            session.record(event)?;
        }
        Ok(session)
    }
}

impl ContinuousSession {
    /// Start a new session with an empty event log.
    pub fn new(
        equipment: EquipmentId,
        material: impl Into<String>,
        melt_rate: f64,
        started_at: DateTime<Utc>,
    ) -> KernelResult<Self> {
        if !melt_rate.is_finite() || melt_rate < 0.0 {
            return Err(KernelError::validation(format!(
                "melt rate must be a non-negative number, got {melt_rate}"
            )));
        }
        Ok(Self {
            id: SessionId::generate(),
            equipment,
            material: material.into(),
            melt_rate,
            started_at,
            events: Vec::new(),
        })
    }

    /// Record an event, keeping the log ordered by time.
    ///
    /// Events with equal timestamps keep their insertion order.
    pub fn record(&mut self, event: MeltEvent) -> KernelResult<()> {
        let mass = event.mass();
        if !mass.is_finite() || mass < 0.0 {
            return Err(KernelError::validation(format!(
                "event mass must be a non-negative number, got {mass}"
            )));
        }
        if event.at() < self.started_at {
            return Err(KernelError::validation(format!(
                "event at {} precedes session start {}",
                event.at(),
                self.started_at
            )));
        }
        let pos = self.events.partition_point(|e| e.at() <= event.at());
        self.events.insert(pos, event);
        Ok(())
    }

    /// Events in time order.
    pub fn events(&self) -> &[MeltEvent] {
        &self.events
    }

    /// The last correction in the log, if any.
    pub fn last_correction(&self) -> Option<&MeltEvent> {
        self.events.iter().rev().find(|e| e.is_correction())
    }

    /// Sum of all addition masses.
    pub fn total_added(&self) -> f64 {
        self.events
            .iter()
            .filter_map(|e| match e {
                MeltEvent::Addition { mass, .. } => Some(*mass),
                _ => None,
            })
            .sum()
    }
}
