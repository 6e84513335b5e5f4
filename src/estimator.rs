//! Event-log melt estimation.
//!
//! Estimates how much molten material a continuous melting session has
//! available right now, from its sparse event log and the configured melt
//! rate. The rate caps throughput: added material cannot become available
//! faster than the rate, and never beyond what was physically added.
//!
//! ## Formula
//!
//! ```text
//! baseline         = last Correction (time, mass), else (session start, 0)
//! events_after     = events strictly after the baseline time
//! withdrawn_after  = Σ Withdrawal in events_after
//! melt_cap         = Σ Addition in events_after   (Correction present)
//!                  = Σ Addition over all events   (no Correction)
//! elapsed_hours    = max(0, now − baseline time)
//! melted           = min(elapsed_hours × rate, melt_cap)
//! available        = max(0, baseline_mass + melted − withdrawn_after)
//! ```
//!
//! Pure function of the session and the caller's clock; nothing runs in
//! the background. See [`crate::balance`] for the bookkeeping view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EstimatorConfig;
use crate::types::{ContinuousSession, MeltEvent};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Breakdown of one estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeltEstimate {
    /// Baseline timestamp.
    pub baseline_at: DateTime<Utc>,
    /// Mass declared at the baseline (kg).
    pub baseline_mass: f64,
    /// Mass withdrawn after the baseline (kg).
    pub withdrawn_after: f64,
    /// Upper bound on melted mass (kg).
    pub melt_cap: f64,
    /// Hours since the baseline, floored at zero.
    pub elapsed_hours: f64,
    /// Mass melted since the baseline (kg).
    pub melted: f64,
    /// Available mass, rounded for reporting (kg).
    pub available: f64,
}

/// Event-log estimator for continuous melting sessions.
#[derive(Debug, Clone, Default)]
pub struct ContinuousProcessEstimator {
    config: EstimatorConfig,
}

impl ContinuousProcessEstimator {
    /// Create an estimator.
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    /// Available quantity (kg) at `now`. Always ≥ 0.
    pub fn available_quantity(&self, session: &ContinuousSession, now: DateTime<Utc>) -> f64 {
        self.estimate(session, now).available
    }

    /// Full estimate breakdown at `now`.
    pub fn estimate(&self, session: &ContinuousSession, now: DateTime<Utc>) -> MeltEstimate {
        let correction = session.last_correction().copied();
        let (baseline_at, baseline_mass) = match correction {
            Some(c) => (c.at(), c.mass()),
            None => (session.started_at, 0.0),
        };

        let mut withdrawn_after = 0.0;
        let mut added_after = 0.0;
        for event in session.events().iter().filter(|e| e.at() > baseline_at) {
            match event {
                MeltEvent::Addition { mass, .. } => added_after += mass,
                MeltEvent::Withdrawal { mass, .. } => withdrawn_after += mass,
                MeltEvent::Correction { .. } => {}
            }
        }

        let melt_cap = if correction.is_some() {
            added_after
        } else {
            session.total_added()
        };

        let elapsed_ms = (now - baseline_at).num_milliseconds().max(0);
        let elapsed_hours = elapsed_ms as f64 / MILLIS_PER_HOUR;
        let melted = (elapsed_hours * session.melt_rate).min(melt_cap);
        let raw = (baseline_mass + melted - withdrawn_after).max(0.0);

        MeltEstimate {
            baseline_at,
            baseline_mass,
            withdrawn_after,
            melt_cap,
            elapsed_hours,
            melted,
            available: self.config.round(raw).max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EquipmentId;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap()
    }

    fn session(rate: f64) -> ContinuousSession {
        ContinuousSession::new(EquipmentId::new("Melter1"), "Wax", rate, t0()).unwrap()
    }

    fn estimator() -> ContinuousProcessEstimator {
        ContinuousProcessEstimator::default()
    }

    #[test]
    fn test_quarter_hour_at_1000_kg_per_hour() {
        let mut s = session(1000.0);
        s.record(MeltEvent::Addition { mass: 500.0, at: t0() }).unwrap();

        let est = estimator().estimate(&s, t0() + Duration::minutes(15));
        assert_eq!(est.elapsed_hours, 0.25);
        assert_eq!(est.melt_cap, 500.0);
        assert_eq!(est.melted, 250.0);
        assert_eq!(est.available, 250.0);
    }

    #[test]
    fn test_capped_by_additions() {
        let mut s = session(1000.0);
        s.record(MeltEvent::Addition { mass: 500.0, at: t0() }).unwrap();
        assert_eq!(estimator().available_quantity(&s, t0() + Duration::hours(3)), 500.0);
    }

    #[test]
    fn test_withdrawals_subtract() {
        let mut s = session(1000.0);
        s.record(MeltEvent::Addition { mass: 500.0, at: t0() }).unwrap();
        s.record(MeltEvent::Withdrawal { mass: 100.0, at: t0() + Duration::minutes(20) }).unwrap();
        let available = estimator().available_quantity(&s, t0() + Duration::minutes(30));
        assert_eq!(available, 400.0);
    }

    #[test]
    fn test_never_negative() {
        let mut s = session(100.0);
        s.record(MeltEvent::Addition { mass: 50.0, at: t0() }).unwrap();
        s.record(MeltEvent::Withdrawal { mass: 80.0, at: t0() + Duration::minutes(1) }).unwrap();
        assert_eq!(estimator().available_quantity(&s, t0() + Duration::minutes(2)), 0.0);
    }

    #[test]
    fn test_correction_resets_baseline() {
        let mut s = session(600.0);
        s.record(MeltEvent::Addition { mass: 1000.0, at: t0() }).unwrap();
        s.record(MeltEvent::Correction { mass: 300.0, at: t0() + Duration::hours(1) }).unwrap();
        s.record(MeltEvent::Addition { mass: 200.0, at: t0() + Duration::minutes(70) }).unwrap();
        s.record(MeltEvent::Withdrawal { mass: 50.0, at: t0() + Duration::minutes(80) }).unwrap();

        // 30 min after the correction: 300 melt capacity, capped at 200 added since
        let est = estimator().estimate(&s, t0() + Duration::minutes(90));
        assert_eq!(est.baseline_mass, 300.0);
        assert_eq!(est.melt_cap, 200.0);
        assert_eq!(est.withdrawn_after, 50.0);
        assert_eq!(est.available, 450.0);
    }

    #[test]
    fn test_additions_before_correction_do_not_count() {
        let mut s = session(1000.0);
        s.record(MeltEvent::Addition { mass: 400.0, at: t0() }).unwrap();
        s.record(MeltEvent::Correction { mass: 120.0, at: t0() + Duration::minutes(10) }).unwrap();
        let est = estimator().estimate(&s, t0() + Duration::hours(2));
        assert_eq!(est.melt_cap, 0.0);
        assert_eq!(est.available, 120.0);
    }

    #[test]
    fn test_clock_before_baseline() {
        let mut s = session(1000.0);
        s.record(MeltEvent::Addition { mass: 400.0, at: t0() }).unwrap();
        let est = estimator().estimate(&s, t0() - Duration::minutes(5));
        assert_eq!(est.elapsed_hours, 0.0);
        assert_eq!(est.available, 0.0);
    }

    #[test]
    fn test_rounding_precision() {
        let mut s = session(100.0);
        s.record(MeltEvent::Addition { mass: 500.0, at: t0() }).unwrap();
        // 1 second at 100 kg/h = 0.02777... kg
        let now = t0() + Duration::seconds(1);
        assert_eq!(estimator().available_quantity(&s, now), 0.03);
        let precise = ContinuousProcessEstimator::new(EstimatorConfig { quantity_decimals: 4 });
        assert_eq!(precise.available_quantity(&s, now), 0.0278);
    }
}
