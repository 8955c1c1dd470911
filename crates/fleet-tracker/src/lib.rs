//! # Fleet Tracker
//!
//! Orchestration of the ingestion pipeline: raw transmission batches come
//! in, normalized reports flow through the per-device processor, deltas
//! fold into rolling totals, workday marks and task-status transitions go
//! out as events.
//!
//! The engine is the only entry point external collaborators call; the
//! device profile and the day's task assignment are supplied per call and
//! never stored here.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod events;
pub mod processor;
pub mod resolver;
pub mod task_status;
pub mod workday;

pub use aggregator::Aggregator;
pub use config::IngestConfig;
pub use error::{TrackerError, TrackerResult};
pub use events::EventBus;
pub use processor::{ProcessOutcome, ReportProcessor};
pub use task_status::StatusEvaluation;
pub use workday::WorkdayDetector;

use chrono::{Duration, NaiveDateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{info, instrument};

use fleet_core::{
    DailyMetrics, DeltaSummary, DeviceId, DeviceProfile, Event, MetricsScope, PersistedReport,
    TaskAssignment, WorkdayMark,
};
use fleet_protocol::ReportParser;
use fleet_store::StoreClient;
use fleet_telemetry::MetricsCollector;

/// Everything one ingested batch produced, for callers and tests
#[derive(Debug)]
pub struct IngestOutcome {
    /// Reports surviving batch parsing
    pub parsed: usize,
    /// Entries dropped for a field-format mismatch
    pub malformed: usize,
    /// Entries dropped for a date outside the current day
    pub stale: usize,
    /// Reports discarded by the ordering guard
    pub out_of_order: u64,
    /// Reports written to the history store
    pub persisted: usize,
    /// Workday marks committed, in order
    pub marks: Vec<(WorkdayMark, PersistedReport)>,
    /// Daily delta accrued by this batch
    pub delta: DeltaSummary,
    /// Updated daily record, when anything was persisted
    pub daily: Option<(MetricsScope, DailyMetrics)>,
    /// Updated task record, when in-zone work accrued
    pub task_metrics: Option<(MetricsScope, DailyMetrics)>,
    /// Committed status transition, if any
    pub status_change: Option<StatusEvaluation>,
}

/// Ingestion engine tying parser, processor, aggregator and event bus
/// together over one store
pub struct IngestEngine {
    config: IngestConfig,
    parser: ReportParser,
    store: StoreClient,
    aggregator: Aggregator,
    bus: EventBus,
    metrics: Option<Arc<MetricsCollector>>,
}

impl IngestEngine {
    pub fn new(config: IngestConfig, store: StoreClient) -> Self {
        let parser = ReportParser::new(config.parser_config());
        let aggregator = Aggregator::new(store.metrics());
        let bus = EventBus::new(config.event_capacity);

        Self {
            config,
            parser,
            store,
            aggregator,
            bus,
            metrics: None,
        }
    }

    /// Attach an operational metrics collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Subscribe to processing events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn store(&self) -> &StoreClient {
        &self.store
    }

    /// Current device-local time under the configured fixed offset
    pub fn local_now(&self) -> NaiveDateTime {
        (Utc::now() + Duration::minutes(self.config.offset_minutes)).naive_utc()
    }

    /// Ingest one raw transmission batch against the wall clock
    pub async fn ingest_batch(
        &self,
        profile: &DeviceProfile,
        task: Option<&TaskAssignment>,
        raw: &str,
    ) -> TrackerResult<IngestOutcome> {
        self.ingest_batch_at(profile, task, raw, self.local_now()).await
    }

    /// Ingest one raw transmission batch at an explicit device-local time.
    ///
    /// `now` fixes the current calendar day for the staleness filter and
    /// the clock for task-status evaluation.
    #[instrument(skip(self, profile, task, raw), fields(device = %profile.device_id))]
    pub async fn ingest_batch_at(
        &self,
        profile: &DeviceProfile,
        task: Option<&TaskAssignment>,
        raw: &str,
        now: NaiveDateTime,
    ) -> TrackerResult<IngestOutcome> {
        let started = Instant::now();

        let batch = self.parser.parse_batch(raw, now.date())?;
        let parsed = batch.reports.len();
        let malformed = batch.malformed;
        let stale = batch.stale;

        let zone = resolver::resolve_zone(task);
        let processor = ReportProcessor::new(
            profile,
            zone.as_ref(),
            self.store.device_state(),
            self.store.reports(),
            &self.config,
        );
        let outcome = processor.process(batch.reports).await?;
        let persisted = outcome.delta.touched_points.len();

        for (mark, report) in &outcome.marks {
            self.bus.publish(Event::workday_marked(
                report.report.device_id.clone(),
                report.id,
                *mark,
                report.report.timestamp,
            ));
            if let Some(metrics) = &self.metrics {
                metrics.record_workday_mark(*mark);
            }
        }

        let daily = if persisted > 0 {
            let (scope, record) = self
                .aggregator
                .fold_daily(profile, now.date(), &outcome.delta)
                .await?;
            self.bus
                .publish(Event::metrics_updated(scope.clone(), record.clone()));
            Some((scope, record))
        } else {
            None
        };

        let mut task_metrics = None;
        let mut status_change = None;
        if let Some(task) = task {
            let record = if !outcome.zone_delta.touched_points.is_empty() {
                let (scope, record) = self
                    .aggregator
                    .fold_task(profile, task, &outcome.zone_delta)
                    .await?;
                self.bus
                    .publish(Event::metrics_updated(scope.clone(), record.clone()));
                task_metrics = Some((scope, record.clone()));
                Some(record)
            } else {
                let scope = MetricsScope::for_task(profile.owner.clone(), task.date, task.id);
                self.aggregator.current(&scope).await?
            };

            let in_zone_secs = record.map(|r| r.work_secs).unwrap_or(0);
            status_change = self.commit_status(task, now, in_zone_secs).await?;
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_batch(parsed, malformed, stale, started.elapsed().as_secs_f64());
            metrics.record_reports(persisted, outcome.out_of_order as usize);
            metrics.set_devices_tracked(self.store.device_state().len() as i64);
        }

        info!(
            parsed,
            malformed,
            stale,
            out_of_order = outcome.out_of_order,
            persisted,
            "batch ingested"
        );

        Ok(IngestOutcome {
            parsed,
            malformed,
            stale,
            out_of_order: outcome.out_of_order,
            persisted,
            marks: outcome.marks,
            delta: outcome.delta,
            daily,
            task_metrics,
            status_change,
        })
    }

    /// Re-evaluate a task's status without a batch.
    ///
    /// Called periodically so a task whose window has passed settles even
    /// when the device went silent.
    pub async fn sweep_task_status(
        &self,
        profile: &DeviceProfile,
        task: &TaskAssignment,
    ) -> TrackerResult<Option<StatusEvaluation>> {
        self.sweep_task_status_at(profile, task, self.local_now()).await
    }

    /// Re-evaluate a task's status at an explicit device-local time
    pub async fn sweep_task_status_at(
        &self,
        profile: &DeviceProfile,
        task: &TaskAssignment,
        now: NaiveDateTime,
    ) -> TrackerResult<Option<StatusEvaluation>> {
        let scope = MetricsScope::for_task(profile.owner.clone(), task.date, task.id);
        let in_zone_secs = self
            .aggregator
            .current(&scope)
            .await?
            .map(|r| r.work_secs)
            .unwrap_or(0);
        self.commit_status(task, now, in_zone_secs).await
    }

    /// Forget a device's cross-batch state
    pub fn flush_device(&self, device: &DeviceId) {
        self.store.device_state().flush(device);
        if let Some(metrics) = &self.metrics {
            metrics.set_devices_tracked(self.store.device_state().len() as i64);
        }
    }

    async fn commit_status(
        &self,
        task: &TaskAssignment,
        now: NaiveDateTime,
        in_zone_secs: i64,
    ) -> TrackerResult<Option<StatusEvaluation>> {
        let stored = self
            .store
            .tasks()
            .status(&task.id)
            .await?
            .unwrap_or(task.status);

        let Some(eval) = task_status::evaluate(
            task,
            stored,
            now,
            in_zone_secs,
            self.config.presence_done_percent,
        ) else {
            return Ok(None);
        };

        self.store.tasks().set_status(&task.id, eval.new_status).await?;
        self.bus.publish(Event::task_status_changed(
            task.id,
            stored,
            eval.new_status,
            eval.presence_percent,
        ));
        if let Some(metrics) = &self.metrics {
            metrics.record_task_transition(eval.new_status);
        }
        info!(
            task = %task.id,
            from = %stored,
            to = %eval.new_status,
            "task status committed"
        );

        Ok(Some(eval))
    }
}

// ============================================================================
// TESTS
// ============================================================================
