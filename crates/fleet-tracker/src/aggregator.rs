//! Rolling-total aggregation
//!
//! Folds batch deltas into the per-scope rolling records: the default
//! daily scope keyed by owner and date, and one additional scope per
//! active task. Folding is additive and idempotence is the processor's
//! concern; everything handed here is accounted exactly once.

use std::sync::Arc;

use fleet_core::{DailyMetrics, DeltaSummary, DeviceProfile, MetricsScope, TaskAssignment};
use fleet_store::{MetricsStore, StoreResult};

/// Folds deltas into the metrics store
#[derive(Clone)]
pub struct Aggregator {
    metrics: Arc<dyn MetricsStore>,
}

impl Aggregator {
    pub fn new(metrics: Arc<dyn MetricsStore>) -> Self {
        Self { metrics }
    }

    /// Fold a delta into the owner's default daily record.
    ///
    /// The expected duration comes from the device's daily work target.
    pub async fn fold_daily(
        &self,
        profile: &DeviceProfile,
        date: chrono::NaiveDate,
        delta: &DeltaSummary,
    ) -> StoreResult<(MetricsScope, DailyMetrics)> {
        let scope = MetricsScope::daily(profile.owner.clone(), date);
        let record = self
            .metrics
            .apply(&scope, delta, profile.expected_daily_secs())
            .await?;
        Ok((scope, record))
    }

    /// Fold a zone-restricted delta into the task's own record.
    ///
    /// The expected duration is the task window; the record is keyed by
    /// the task's date, not the processing date.
    pub async fn fold_task(
        &self,
        profile: &DeviceProfile,
        task: &TaskAssignment,
        delta: &DeltaSummary,
    ) -> StoreResult<(MetricsScope, DailyMetrics)> {
        let scope = MetricsScope::for_task(profile.owner.clone(), task.date, task.id);
        let record = self.metrics.apply(&scope, delta, task.window_secs()).await?;
        Ok((scope, record))
    }

    /// Current record for a scope, if any delta ever reached it
    pub async fn current(&self, scope: &MetricsScope) -> StoreResult<Option<DailyMetrics>> {
        self.metrics.get(scope).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
