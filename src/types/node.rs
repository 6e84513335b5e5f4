//! Node handles and port-name parsing.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use super::equipment::EquipmentId;

/// Arena handle for a node in a topology snapshot.
///
/// Only meaningful for the snapshot that issued it; callers address nodes
/// by name and the graph translates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// Index into the snapshot's node table.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Which side of a vessel a port sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    /// `<Equipment>_IN`
    Inlet,
    /// `<Equipment>_OUT`
    Outlet,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inlet => write!(f, "IN"),
            Self::Outlet => write!(f, "OUT"),
        }
    }
}

/// Parsed classification of a node name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PortName {
    /// Equipment port.
    Equipment {
        /// Equipment the port belongs to.
        equipment: EquipmentId,
        /// Inlet or outlet.
        direction: PortDirection,
    },
    /// Pipeline junction.
    Junction(String),
}

fn port_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<equipment>.+)_(?P<direction>IN|OUT)$")
            .expect("port name pattern is valid")
    })
}

impl PortName {
    /// Classify a node name.
    pub fn parse(name: &str) -> Self {
        match port_pattern().captures(name) {
            Some(caps) => {
                let direction = if &caps["direction"] == "IN" {
                    PortDirection::Inlet
                } else {
                    PortDirection::Outlet
                };
                Self::Equipment {
                    equipment: EquipmentId::new(&caps["equipment"]),
                    direction,
                }
            }
            None => Self::Junction(name.to_string()),
        }
    }

    /// Inlet port name for a piece of equipment.
    pub fn inlet(equipment: &EquipmentId) -> String {
        format!("{}_IN", equipment)
    }

    /// Outlet port name for a piece of equipment.
    pub fn outlet(equipment: &EquipmentId) -> String {
        format!("{}_OUT", equipment)
    }

    /// Equipment this name belongs to, if it is a port.
    pub fn equipment(&self) -> Option<&EquipmentId> {
        match self {
            Self::Equipment { equipment, .. } => Some(equipment),
            Self::Junction(_) => None,
        }
    }
}
