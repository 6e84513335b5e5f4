//! Kernel configuration.
//!
//! Loaded from JSON or from environment variables:
//!
//! - `PLANT_TOPOLOGY_PATH`: topology source document
//! - `PLANT_VALVE_SCOPE`: `open_only` (default) or `any_valve`
//! - `PLANT_QUANTITY_DECIMALS`: rounding of reported quantities (default: 2)
//! - `PLANT_STALE_AFTER_MINUTES`: age after which an Active operation is reported stale

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::canonical::canonical_hash_hex;
use crate::error::{KernelError, KernelResult};

/// Which valves the lifecycle routes over when starting an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValveScope {
    /// Only valves the valve store reports open.
    OpenOnly,
    /// Every valve in the topology snapshot; starting an operation opens them.
    AnyValve,
}

impl ValveScope {
    /// Parse valve scope from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open_only" | "open" => Some(Self::OpenOnly),
            "any_valve" | "any" => Some(Self::AnyValve),
            _ => None,
        }
    }
}

impl Default for ValveScope {
    fn default() -> Self {
        Self::OpenOnly
    }
}

/// Routing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Valve scope for `start`.
    #[serde(default)]
    pub valve_scope: ValveScope,
}

/// Melt estimation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Decimal places reported quantities are rounded to.
    pub quantity_decimals: u32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self { quantity_decimals: 2 }
    }
}

impl EstimatorConfig {
    /// Round a quantity to the configured precision.
    pub fn round(&self, value: f64) -> f64 {
        let factor = 10f64.powi(self.quantity_decimals as i32);
        (value * factor).round() / factor
    }
}

/// Top-level kernel configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Routing settings.
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Estimation settings.
    #[serde(default)]
    pub estimator: EstimatorConfig,
    /// Topology source document.
    #[serde(default)]
    pub topology_path: Option<PathBuf>,
    /// Active operations older than this are reported stale.
    #[serde(default)]
    pub stale_after_minutes: Option<u32>,
}

impl KernelConfig {
    /// Parse a JSON document. Missing sections take their defaults.
    pub fn from_json_str(json: &str) -> KernelResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| KernelError::validation(format!("invalid kernel config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> KernelResult<Self> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("PLANT_TOPOLOGY_PATH") {
            config.topology_path = Some(PathBuf::from(path));
        }
        if let Ok(scope) = std::env::var("PLANT_VALVE_SCOPE") {
            config.routing.valve_scope = ValveScope::from_str(&scope).ok_or_else(|| {
                KernelError::validation(format!("PLANT_VALVE_SCOPE: unknown scope {scope}"))
            })?;
        }
        if let Ok(decimals) = std::env::var("PLANT_QUANTITY_DECIMALS") {
            config.estimator.quantity_decimals = decimals.parse().map_err(|_| {
                KernelError::validation(format!("PLANT_QUANTITY_DECIMALS: not a number: {decimals}"))
            })?;
        }
        if let Ok(minutes) = std::env::var("PLANT_STALE_AFTER_MINUTES") {
            let minutes = minutes.parse().map_err(|_| {
                KernelError::validation(format!("PLANT_STALE_AFTER_MINUTES: not a number: {minutes}"))
            })?;
            config.stale_after_minutes = Some(minutes);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> KernelResult<()> {
        if self.estimator.quantity_decimals > 9 {
            return Err(KernelError::validation(format!(
                "quantity_decimals must be at most 9, got {}",
                self.estimator.quantity_decimals
            )));
        }
        Ok(())
    }

    /// Stable hash of the configuration, for logging which config a run used.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KernelConfig::default();
        assert_eq!(config.routing.valve_scope, ValveScope::OpenOnly);
        assert_eq!(config.estimator.quantity_decimals, 2);
        assert!(config.stale_after_minutes.is_none());
    }

    #[test]
    fn test_partial_json() {
        let config = KernelConfig::from_json_str(r#"{"routing": {"valve_scope": "any_valve"}}"#).unwrap();
        assert_eq!(config.routing.valve_scope, ValveScope::AnyValve);
        assert_eq!(config.estimator, EstimatorConfig::default());
    }

    #[test]
    fn test_rejects_excessive_precision() {
        let err = KernelConfig::from_json_str(r#"{"estimator": {"quantity_decimals": 12}}"#).unwrap_err();
        assert!(matches!(err, KernelError::ValidationError(_)));
    }

    #[test]
    fn test_rounding() {
        let cfg = EstimatorConfig::default();
        assert_eq!(cfg.round(249.99999), 250.0);
        assert_eq!(cfg.round(1.234), 1.23);
        assert_eq!(EstimatorConfig { quantity_decimals: 0 }.round(2.6), 3.0);
    }

    #[test]
    fn test_fingerprint_changes() {
        let a = KernelConfig::default();
        let mut b = KernelConfig::default();
        b.routing.valve_scope = ValveScope::AnyValve;
        assert_eq!(a.fingerprint(), KernelConfig::default().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
