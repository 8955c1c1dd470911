//! # Fleet Store
//!
//! Per-device state store plus the persistence seams the core writes
//! through: report history, rolling totals, and task status. The state
//! store is the only unit of cross-batch memory; losing it behaves like a
//! brand-new device, never like an error.
//!
//! Repositories are trait objects so a real backend can replace the
//! in-memory reference implementations without touching the processing
//! pipeline.

pub mod error;

pub use error::{StoreError, StoreResult};

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use fleet_core::{
    DailyMetrics, DeltaSummary, DeviceId, MetricsScope, MotionState, NormalizedReport,
    PersistedReport, TaskId, TaskStatus, WorkdayMark,
};

// ============================================================================
// DEVICE STATE STORE
// ============================================================================

/// Day-start/day-end bookkeeping for one device and date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkdayMarks {
    pub date: NaiveDate,
    pub start_committed: bool,
    pub end_committed: bool,
}

impl WorkdayMarks {
    fn fresh(date: NaiveDate) -> Self {
        Self {
            date,
            start_committed: false,
            end_committed: false,
        }
    }
}

/// Cross-batch memory for one device
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    /// Last accepted report, left endpoint for the next delta
    pub previous_report: Option<NormalizedReport>,
    /// Last persisted report; may lag during a pending confirmation window
    pub latest_persisted: Option<PersistedReport>,
    pub validated_state: MotionState,
    pub consecutive_count: u32,
    /// Reports awaiting state confirmation, in arrival order
    pub pending_reports: Vec<PersistedReport>,
    pub workday: Option<WorkdayMarks>,
}

/// Keyed cache of [`DeviceState`], one namespace per device identity.
///
/// All reads return defaults when no prior state exists; state for
/// different devices never interacts.
#[derive(Debug, Default)]
pub struct DeviceStateStore {
    states: DashMap<DeviceId, DeviceState>,
}

impl DeviceStateStore {
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn previous_report(&self, device: &DeviceId) -> Option<NormalizedReport> {
        self.states
            .get(device)
            .and_then(|s| s.previous_report.clone())
    }

    pub fn set_previous_report(&self, device: &DeviceId, report: NormalizedReport) {
        self.states.entry(device.clone()).or_default().previous_report = Some(report);
    }

    pub fn latest_persisted(&self, device: &DeviceId) -> Option<PersistedReport> {
        self.states
            .get(device)
            .and_then(|s| s.latest_persisted.clone())
    }

    pub fn set_latest_persisted(&self, device: &DeviceId, report: PersistedReport) {
        self.states.entry(device.clone()).or_default().latest_persisted = Some(report);
    }

    pub fn validated_state(&self, device: &DeviceId) -> MotionState {
        self.states
            .get(device)
            .map(|s| s.validated_state)
            .unwrap_or_default()
    }

    pub fn set_validated_state(&self, device: &DeviceId, state: MotionState) {
        self.states.entry(device.clone()).or_default().validated_state = state;
    }

    pub fn consecutive_count(&self, device: &DeviceId) -> u32 {
        self.states
            .get(device)
            .map(|s| s.consecutive_count)
            .unwrap_or(0)
    }

    pub fn set_consecutive_count(&self, device: &DeviceId, count: u32) {
        self.states.entry(device.clone()).or_default().consecutive_count = count;
    }

    /// Increment and return the new count
    pub fn increment_consecutive_count(&self, device: &DeviceId) -> u32 {
        let mut state = self.states.entry(device.clone()).or_default();
        state.consecutive_count += 1;
        state.consecutive_count
    }

    pub fn reset_consecutive_count(&self, device: &DeviceId) {
        if let Some(mut state) = self.states.get_mut(device) {
            state.consecutive_count = 0;
        }
    }

    pub fn pending_reports(&self, device: &DeviceId) -> Vec<PersistedReport> {
        self.states
            .get(device)
            .map(|s| s.pending_reports.clone())
            .unwrap_or_default()
    }

    pub fn add_pending_report(&self, device: &DeviceId, report: PersistedReport) {
        self.states
            .entry(device.clone())
            .or_default()
            .pending_reports
            .push(report);
    }

    pub fn clear_pending_reports(&self, device: &DeviceId) {
        if let Some(mut state) = self.states.get_mut(device) {
            state.pending_reports.clear();
        }
    }

    /// Marks for the given date; a date change starts a fresh day
    pub fn workday_marks(&self, device: &DeviceId, date: NaiveDate) -> WorkdayMarks {
        self.states
            .get(device)
            .and_then(|s| s.workday)
            .filter(|m| m.date == date)
            .unwrap_or_else(|| WorkdayMarks::fresh(date))
    }

    pub fn commit_workday_mark(&self, device: &DeviceId, date: NaiveDate, mark: WorkdayMark) {
        let mut state = self.states.entry(device.clone()).or_default();
        let mut marks = state
            .workday
            .filter(|m| m.date == date)
            .unwrap_or_else(|| WorkdayMarks::fresh(date));
        match mark {
            WorkdayMark::Start => marks.start_committed = true,
            WorkdayMark::End => marks.end_committed = true,
        }
        state.workday = Some(marks);
    }

    /// Forget everything about a device; callers must treat the next
    /// report as coming from a brand-new device
    pub fn flush(&self, device: &DeviceId) {
        self.states.remove(device);
        debug!(device = %device, "flushed device state");
    }
}

// ============================================================================
// PERSISTENCE SEAMS
// ============================================================================

/// Persisted-report history, the audit/map-replay surface
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist one report, assigning its stable identity
    async fn insert(&self, report: &NormalizedReport) -> StoreResult<PersistedReport>;

    /// Flag an already-persisted report as the day's start or end point
    async fn set_workday_mark(
        &self,
        report_id: Uuid,
        mark: WorkdayMark,
    ) -> StoreResult<PersistedReport>;

    /// Reports for one device and date, in insertion order
    async fn history(&self, device: &DeviceId, date: NaiveDate) -> StoreResult<Vec<PersistedReport>>;

    async fn latest(&self, device: &DeviceId) -> StoreResult<Option<PersistedReport>>;
}

/// Rolling daily/task totals keyed by [`MetricsScope`]
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Return the scope's record, creating it zeroed on first use
    async fn fetch_or_create(&self, scope: &MetricsScope) -> StoreResult<DailyMetrics>;

    /// Fold a delta into the scope's record under its write lock
    async fn apply(
        &self,
        scope: &MetricsScope,
        delta: &DeltaSummary,
        expected_secs: i64,
    ) -> StoreResult<DailyMetrics>;

    async fn get(&self, scope: &MetricsScope) -> StoreResult<Option<DailyMetrics>>;
}

/// Stored task status, the only task field the core writes
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn status(&self, task: &TaskId) -> StoreResult<Option<TaskStatus>>;

    async fn set_status(&self, task: &TaskId, status: TaskStatus) -> StoreResult<()>;
}

// ============================================================================
// IN-MEMORY IMPLEMENTATIONS
// ============================================================================

/// In-memory report history
#[derive(Debug, Default)]
pub struct InMemoryReports {
    rows: RwLock<Vec<PersistedReport>>,
}

impl InMemoryReports {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for InMemoryReports {
    async fn insert(&self, report: &NormalizedReport) -> StoreResult<PersistedReport> {
        let persisted = PersistedReport::new(report.clone());
        self.rows.write().push(persisted.clone());
        Ok(persisted)
    }

    async fn set_workday_mark(
        &self,
        report_id: Uuid,
        mark: WorkdayMark,
    ) -> StoreResult<PersistedReport> {
        let mut rows = self.rows.write();
        let row = rows
            .iter_mut()
            .find(|r| r.id == report_id)
            .ok_or_else(|| StoreError::not_found(format!("report {report_id}")))?;

        match mark {
            WorkdayMark::Start => row.report.is_starting_point = true,
            WorkdayMark::End => row.report.is_ending_point = true,
        }
        Ok(row.clone())
    }

    async fn history(
        &self,
        device: &DeviceId,
        date: NaiveDate,
    ) -> StoreResult<Vec<PersistedReport>> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|r| &r.report.device_id == device && r.report.timestamp.date() == date)
            .cloned()
            .collect())
    }

    async fn latest(&self, device: &DeviceId) -> StoreResult<Option<PersistedReport>> {
        Ok(self
            .rows
            .read()
            .iter()
            .rev()
            .find(|r| &r.report.device_id == device)
            .cloned())
    }
}

/// In-memory rolling totals
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    rows: RwLock<HashMap<MetricsScope, DailyMetrics>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetrics {
    async fn fetch_or_create(&self, scope: &MetricsScope) -> StoreResult<DailyMetrics> {
        Ok(self
            .rows
            .write()
            .entry(scope.clone())
            .or_default()
            .clone())
    }

    async fn apply(
        &self,
        scope: &MetricsScope,
        delta: &DeltaSummary,
        expected_secs: i64,
    ) -> StoreResult<DailyMetrics> {
        // Single write lock over the map serializes concurrent folds for
        // the same scope, preventing lost updates
        let mut rows = self.rows.write();
        let record = rows.entry(scope.clone()).or_default();
        record.apply(delta, expected_secs);
        Ok(record.clone())
    }

    async fn get(&self, scope: &MetricsScope) -> StoreResult<Option<DailyMetrics>> {
        Ok(self.rows.read().get(scope).cloned())
    }
}

/// In-memory task status
#[derive(Debug, Default)]
pub struct InMemoryTasks {
    rows: RwLock<HashMap<TaskId, TaskStatus>>,
}

impl InMemoryTasks {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTasks {
    async fn status(&self, task: &TaskId) -> StoreResult<Option<TaskStatus>> {
        Ok(self.rows.read().get(task).copied())
    }

    async fn set_status(&self, task: &TaskId, status: TaskStatus) -> StoreResult<()> {
        self.rows.write().insert(*task, status);
        Ok(())
    }
}

// ============================================================================
// CLIENT FACADE
// ============================================================================

/// Facade bundling the state store and the persistence seams
#[derive(Clone)]
pub struct StoreClient {
    device_state: Arc<DeviceStateStore>,
    reports: Arc<dyn ReportStore>,
    metrics: Arc<dyn MetricsStore>,
    tasks: Arc<dyn TaskStore>,
}

impl StoreClient {
    pub fn new(
        device_state: Arc<DeviceStateStore>,
        reports: Arc<dyn ReportStore>,
        metrics: Arc<dyn MetricsStore>,
        tasks: Arc<dyn TaskStore>,
    ) -> Self {
        Self {
            device_state,
            reports,
            metrics,
            tasks,
        }
    }

    /// All seams backed by in-memory reference implementations
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(DeviceStateStore::new()),
            Arc::new(InMemoryReports::new()),
            Arc::new(InMemoryMetrics::new()),
            Arc::new(InMemoryTasks::new()),
        )
    }

    pub fn device_state(&self) -> &DeviceStateStore {
        &self.device_state
    }

    pub fn reports(&self) -> Arc<dyn ReportStore> {
        self.reports.clone()
    }

    pub fn metrics(&self) -> Arc<dyn MetricsStore> {
        self.metrics.clone()
    }

    pub fn tasks(&self) -> Arc<dyn TaskStore> {
        self.tasks.clone()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{GeoPoint, Heading, PowerStatus};

    fn report(device: &str, h: u32, m: u32) -> NormalizedReport {
        NormalizedReport {
            device_id: DeviceId::new(device),
            coordinate: GeoPoint::new(34.883333, 50.583333),
            speed: 0.0,
            status: PowerStatus::On,
            direction: Heading::default(),
            is_stopped: true,
            is_off: false,
            is_starting_point: false,
            is_ending_point: false,
            stoppage_secs: 0,
            timestamp: NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_defaults_for_unknown_device() {
        let store = DeviceStateStore::new();
        let device = DeviceId::new("TRACTOR-01");

        assert!(store.previous_report(&device).is_none());
        assert!(store.latest_persisted(&device).is_none());
        assert_eq!(store.validated_state(&device), MotionState::Unknown);
        assert_eq!(store.consecutive_count(&device), 0);
        assert!(store.pending_reports(&device).is_empty());
    }

    #[test]
    fn test_device_isolation() {
        let store = DeviceStateStore::new();
        let a = DeviceId::new("TRACTOR-01");
        let b = DeviceId::new("TRACTOR-02");

        store.set_validated_state(&a, MotionState::Moving);
        store.set_consecutive_count(&a, 3);

        assert_eq!(store.validated_state(&b), MotionState::Unknown);
        assert_eq!(store.consecutive_count(&b), 0);
    }

    #[test]
    fn test_flush_behaves_like_new_device() {
        let store = DeviceStateStore::new();
        let device = DeviceId::new("TRACTOR-01");

        store.set_previous_report(&device, report("TRACTOR-01", 7, 0));
        store.set_validated_state(&device, MotionState::Moving);
        store.flush(&device);

        assert!(store.previous_report(&device).is_none());
        assert_eq!(store.validated_state(&device), MotionState::Unknown);
    }

    #[test]
    fn test_pending_buffer_keeps_order() {
        let store = DeviceStateStore::new();
        let device = DeviceId::new("TRACTOR-01");

        let first = PersistedReport::new(report("TRACTOR-01", 7, 0));
        let second = PersistedReport::new(report("TRACTOR-01", 7, 1));
        store.add_pending_report(&device, first.clone());
        store.add_pending_report(&device, second);

        let pending = store.pending_reports(&device);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first.id);

        store.clear_pending_reports(&device);
        assert!(store.pending_reports(&device).is_empty());
    }

    #[test]
    fn test_workday_marks_reset_on_new_date() {
        let store = DeviceStateStore::new();
        let device = DeviceId::new("TRACTOR-01");
        let day1 = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();

        store.commit_workday_mark(&device, day1, WorkdayMark::Start);
        assert!(store.workday_marks(&device, day1).start_committed);
        assert!(!store.workday_marks(&device, day2).start_committed);
    }

    #[tokio::test]
    async fn test_report_insert_and_mark() {
        let repo = InMemoryReports::new();
        let persisted = repo.insert(&report("TRACTOR-01", 7, 0)).await.unwrap();
        assert!(!persisted.report.is_starting_point);

        let marked = repo
            .set_workday_mark(persisted.id, WorkdayMark::Start)
            .await
            .unwrap();
        assert!(marked.report.is_starting_point);
    }

    #[tokio::test]
    async fn test_mark_unknown_report_is_not_found() {
        let repo = InMemoryReports::new();
        let result = repo.set_workday_mark(Uuid::new_v4(), WorkdayMark::End).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_history_filters_device_and_date() {
        let repo = InMemoryReports::new();
        repo.insert(&report("TRACTOR-01", 7, 0)).await.unwrap();
        repo.insert(&report("TRACTOR-02", 7, 5)).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let rows = repo.history(&DeviceId::new("TRACTOR-01"), date).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].report.device_id.as_str(), "TRACTOR-01");
    }

    #[tokio::test]
    async fn test_metrics_accumulate_per_scope() {
        let repo = InMemoryMetrics::new();
        let owner = fleet_core::OwnerId::new("farm-7");
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let daily = MetricsScope::daily(owner.clone(), date);
        let scoped = MetricsScope::for_task(owner, date, TaskId::new());

        let delta = DeltaSummary {
            total_moving_secs: 600,
            total_distance_km: 2.0,
            ..Default::default()
        };

        repo.apply(&daily, &delta, 28_800).await.unwrap();
        let updated = repo.apply(&daily, &delta, 28_800).await.unwrap();
        assert_eq!(updated.work_secs, 1200);
        assert_eq!(updated.traveled_distance_km, 4.0);

        // Task scope is independent of the daily scope
        assert!(repo.get(&scoped).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_task_status_roundtrip() {
        let repo = InMemoryTasks::new();
        let task = TaskId::new();

        assert!(repo.status(&task).await.unwrap().is_none());
        repo.set_status(&task, TaskStatus::InProgress).await.unwrap();
        assert_eq!(
            repo.status(&task).await.unwrap(),
            Some(TaskStatus::InProgress)
        );
    }
}
