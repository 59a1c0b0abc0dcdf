//! Reconciliation report types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one named check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Every examined row satisfied the check
    Passed,
    /// At least one divergence was found
    Failed,
}

/// One named conservation check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    /// Stable check name (e.g. `lot_conservation`)
    pub check_name: String,
    /// Passed / Failed
    pub status: CheckStatus,
    /// Human-readable summary (row counts, first divergence, ...)
    pub details: String,
}

/// One detected divergence, scoped to the tenant it was found in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Divergence {
    /// The check that found it
    pub check_name: String,
    /// Tenant the diverging rows belong to
    pub tenant: String,
    /// What diverged
    pub message: String,
}

/// Full reconciliation run output. Advisory: the checker never mutates
/// ledger state, it only reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Named check results, one per check
    pub checks: Vec<CheckReport>,
    /// Every divergence found, in discovery order
    pub divergences: Vec<Divergence>,
    /// When the run happened
    pub ran_at: DateTime<Utc>,
}

impl ReconcileReport {
    /// True when every check passed
    pub fn passed(&self) -> bool {
        self.divergences.is_empty()
    }

    /// The report for one named check, if present
    pub fn check(&self, name: &str) -> Option<&CheckReport> {
        self.checks.iter().find(|c| c.check_name == name)
    }
}

/// Result of one watchdog pass over pending reservations
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExpirySweep {
    /// Pending reservations examined
    pub scanned: usize,
    /// Reservations moved to `Expired`
    pub expired: usize,
}
