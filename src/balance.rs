//! Bookkeeping melt balance and per-equipment summary.
//!
//! A second, independent view of how much molten material a melter holds:
//!
//! ```text
//! stock        = Σ additions − Σ confirmed transfers out of the melter
//! capacity     = hours since the last confirmed transfer (or session start) × rate
//! available    = max(0, min(stock, capacity))
//! ```
//!
//! This view and [`crate::estimator`] can disagree; the summary reports both
//! side by side and never reconciles them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::EstimatorConfig;
use crate::estimator::{ContinuousProcessEstimator, MeltEstimate};
use crate::types::{ContinuousSession, EquipmentId, Operation, OperationStatus, SessionId};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// A completed transfer out of a melter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedTransfer {
    /// Mass moved (kg).
    pub mass: f64,
    /// When the transfer completed.
    pub at: DateTime<Utc>,
}

impl ConfirmedTransfer {
    /// Completed operations whose source is `melter` and that moved mass.
    pub fn from_operations(operations: &[Operation], melter: &EquipmentId) -> Vec<Self> {
        let mut transfers: Vec<Self> = operations
            .iter()
            .filter(|op| op.status == OperationStatus::Completed)
            .filter(|op| op.source_equipment().as_ref() == Some(melter))
            .filter_map(|op| match (op.transferred_mass, op.ended_at) {
                (Some(mass), Some(at)) => Some(Self { mass, at }),
                _ => None,
            })
            .collect();
        transfers.sort_by(|a, b| a.at.cmp(&b.at));
        transfers
    }
}

/// Result of the bookkeeping view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookkeepingBalance {
    /// Sum of additions in the session (kg).
    pub total_added: f64,
    /// Sum of confirmed transfers during the session (kg).
    pub total_transferred: f64,
    /// Start of the current melt interval.
    pub since: DateTime<Utc>,
    /// Hours in the current melt interval, floored at zero.
    pub elapsed_hours: f64,
    /// Mass the melter could have produced in the interval (kg).
    pub melt_capacity: f64,
    /// Available mass, rounded for reporting (kg).
    pub available: f64,
}

/// Bookkeeping balance for a session at `now`.
///
/// Only transfers between the session start and `now` count.
pub fn bookkeeping_balance(
    session: &ContinuousSession,
    transfers: &[ConfirmedTransfer],
    now: DateTime<Utc>,
    config: &EstimatorConfig,
) -> BookkeepingBalance {
    let relevant = transfers
        .iter()
        .filter(|t| t.at >= session.started_at && t.at <= now);

    let mut total_transferred = 0.0;
    let mut since = session.started_at;
    for t in relevant {
        total_transferred += t.mass;
        since = since.max(t.at);
    }

    let total_added = session.total_added();
    let elapsed_hours = (now - since).num_milliseconds().max(0) as f64 / MILLIS_PER_HOUR;
    let melt_capacity = elapsed_hours * session.melt_rate;
    let stock = total_added - total_transferred;
    let available = stock.min(melt_capacity).max(0.0);

    BookkeepingBalance {
        total_added,
        total_transferred,
        since,
        elapsed_hours,
        melt_capacity,
        available: config.round(available).max(0.0),
    }
}

/// Both melt views for one melter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentMeltSummary {
    /// Melter.
    pub equipment: EquipmentId,
    /// Session the figures come from.
    pub session_id: SessionId,
    /// Material being melted.
    pub material: String,
    /// Event-log view.
    pub event_log: MeltEstimate,
    /// Bookkeeping view.
    pub bookkeeping: BookkeepingBalance,
}

impl EquipmentMeltSummary {
    /// Event-log available minus bookkeeping available (kg).
    pub fn divergence(&self) -> f64 {
        self.event_log.available - self.bookkeeping.available
    }
}

/// Per-melter summary using each melter's most recently started session.
///
/// Sorted by equipment id.
pub fn equipment_summary(
    sessions: &[ContinuousSession],
    operations: &[Operation],
    now: DateTime<Utc>,
    config: &EstimatorConfig,
) -> Vec<EquipmentMeltSummary> {
    let mut latest: BTreeMap<&EquipmentId, &ContinuousSession> = BTreeMap::new();
    for session in sessions {
        latest
            .entry(&session.equipment)
            .and_modify(|cur| {
                if session.started_at > cur.started_at {
                    *cur = session;
                }
            })
            .or_insert(session);
    }

    let estimator = ContinuousProcessEstimator::new(config.clone());
    latest
        .into_values()
        .map(|session| {
            let transfers = ConfirmedTransfer::from_operations(operations, &session.equipment);
            EquipmentMeltSummary {
                equipment: session.equipment.clone(),
                session_id: session.id,
                material: session.material.clone(),
                event_log: estimator.estimate(session, now),
                bookkeeping: bookkeeping_balance(session, &transfers, now, config),
            }
        })
        .collect()
}
