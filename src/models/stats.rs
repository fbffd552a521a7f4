// src/models/stats.rs

use serde::{Deserialize, Serialize};

/// Aggregated test figures, optionally scoped to one batch.
/// Recomputed from the submission ledger on every request.
#[derive(Debug, Serialize)]
pub struct TestStats {
    pub total_tests: i64,
    /// Tests currently "active for taking".
    pub active_tests: i64,
    /// Distinct tests with at least one submission.
    pub completed_tests: i64,
    /// Mean of obtained/total percentages over all submissions in scope;
    /// 0 when there are no submissions.
    pub average_score: f64,
}

/// Query filter for the stats endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct StatsFilter {
    pub batch_id: Option<i64>,
}
