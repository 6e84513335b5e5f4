//! Topology source documents.
//!
//! ```json
//! {
//!   "nodes": ["A_OUT", "J1", "B_IN"],
//!   "segments": [
//!     {"segment_id": "S1", "valve_id": "V1", "from": "A_OUT", "to": "J1"},
//!     {"segment_id": "S2", "valve_id": "V2", "from": "J1", "to": "B_IN"}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::graph::TopologyGraph;
use crate::error::{KernelError, KernelResult, StoreError};
use crate::types::SegmentSpec;

/// Static plant configuration a snapshot is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologySource {
    /// Node names.
    pub nodes: Vec<String>,
    /// Segment rows.
    #[serde(default)]
    pub segments: Vec<SegmentSpec>,
}

impl TopologySource {
    /// Create a source from parts.
    pub fn new(nodes: Vec<String>, segments: Vec<SegmentSpec>) -> Self {
        Self { nodes, segments }
    }

    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> KernelResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| KernelError::validation(format!("invalid topology document: {e}")))
    }

    /// Read and parse a JSON document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> KernelResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Backend(format!("reading topology {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Build a snapshot.
    pub fn build(&self) -> KernelResult<TopologyGraph> {
        TopologyGraph::build(self.nodes.iter().cloned(), &self.segments)
    }
}
