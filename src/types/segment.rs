//! Pipe segment and valve types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a directed pipe segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    /// Create a segment id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a valve. One valve may gate several segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValveId(String);

impl ValveId {
    /// Create a valve id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Binary valve state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValveState {
    /// Flow enabled through every segment the valve gates.
    Open,
    /// Flow blocked.
    Closed,
}

impl ValveState {
    /// Parse valve state from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

impl Default for ValveState {
    fn default() -> Self {
        Self::Closed
    }
}

impl fmt::Display for ValveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// One row of the topology source: `(segment_id, valve_id, from, to)`.
///
/// Implements `Ord` by segment id so loaded edge lists can be canonicalised.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentSpec {
    /// Segment identifier.
    pub segment_id: SegmentId,
    /// Valve gating this segment.
    pub valve_id: ValveId,
    /// Upstream node name.
    pub from: String,
    /// Downstream node name.
    pub to: String,
}

impl SegmentSpec {
    /// Create a segment spec.
    pub fn new(
        segment_id: impl Into<String>,
        valve_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            segment_id: SegmentId::new(segment_id),
            valve_id: ValveId::new(valve_id),
            from: from.into(),
            to: to.into(),
        }
    }
}

impl PartialOrd for SegmentSpec {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SegmentSpec {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.segment_id
            .cmp(&other.segment_id)
            .then_with(|| self.valve_id.cmp(&other.valve_id))
            .then_with(|| self.from.cmp(&other.from))
            .then_with(|| self.to.cmp(&other.to))
    }
}
