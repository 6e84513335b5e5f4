//! Batch and material types.
//!
//! A batch tracks mass per named component. Its material type is derived
//! from the component names, so a mixed batch can never lose track of a
//! constituent: the type is exactly the set of components that carry mass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use super::equipment::EquipmentId;

/// Unique identifier for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchId(Uuid);

impl BatchId {
    /// Create a BatchId from a UUID.
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

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Material type: the sorted, deduplicated set of component names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MaterialType(BTreeSet<String>);

impl MaterialType {
    /// Single-component material.
    pub fn pure(name: impl Into<String>) -> Self {
        let mut set = BTreeSet::new();
        set.insert(name.into());
        Self(set)
    }

    /// Material made of the given components.
    pub fn from_components<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// Parse a label produced by `Display` (`A` or `MIX(A, B)`).
    pub fn parse(label: &str) -> Self {
        let trimmed = label.trim();
        match trimmed.strip_prefix("MIX(").and_then(|s| s.strip_suffix(')')) {
            Some(inner) => Self::from_components(
                inner.split(',').map(str::trim).filter(|s| !s.is_empty()),
            ),
            None => Self::pure(trimmed),
        }
    }

    /// Component names in sorted order.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Whether this is a mixture of more than one component.
    pub fn is_mixture(&self) -> bool {
        self.0.len() > 1
    }
}

impl fmt::Display for MaterialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_mixture() {
            let names: Vec<&str> = self.components().collect();
            write!(f, "MIX({})", names.join(", "))
        } else {
            write!(f, "{}", self.components().next().unwrap_or(""))
        }
    }
}

/// A constituent batch and the mass it contributed to a resulting batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constituent {
    /// Contributing batch.
    pub batch_id: BatchId,
    /// Mass contributed (kg).
    pub mass: f64,
}

/// A tracked quantity of material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Batch id.
    pub id: BatchId,
    /// Mass per component name (kg).
    pub components: BTreeMap<String, f64>,
    /// Equipment currently holding the batch.
    pub location: Option<EquipmentId>,
    /// Archived batches no longer occupy any equipment.
    pub archived: bool,
    /// Constituents this batch was created from (empty for raw batches).
    pub composition: Vec<Constituent>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Batch {
    /// Create a single-component batch.
    pub fn new(
        material: impl Into<String>,
        mass: f64,
        location: Option<EquipmentId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut components = BTreeMap::new();
        components.insert(material.into(), mass);
        Self {
            id: BatchId::generate(),
            components,
            location,
            archived: false,
            composition: Vec::new(),
            created_at,
        }
    }

    /// Total mass (kg).
    pub fn mass(&self) -> f64 {
        self.components.values().sum()
    }

    /// Material type derived from the components.
    pub fn material_type(&self) -> MaterialType {
        MaterialType::from_components(self.components.keys().cloned())
    }

    /// Whether the batch sits in the given equipment and is not archived.
    pub fn is_at(&self, equipment: &EquipmentId) -> bool {
        !self.archived && self.location.as_ref() == Some(equipment)
    }
}
