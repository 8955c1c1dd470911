//! # Fleet Telemetry - Metrics & Observability
//!
//! Prometheus metrics exporter for the ingestion pipeline. Provides
//! operational counters for batch processing, dropped entries, persisted
//! reports, workday marks, and task status transitions.

use fleet_core::{TaskStatus, WorkdayMark};
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use tracing::info;

/// Metrics collector for the ingestion pipeline
pub struct MetricsCollector {
    registry: Registry,

    // Batch metrics
    batches_total: IntCounter,
    batch_reports_parsed: IntCounter,
    batch_entries_malformed: IntCounter,
    batch_entries_stale: IntCounter,
    batch_processing_seconds: Histogram,

    // Report metrics
    reports_persisted: IntCounter,
    reports_out_of_order: IntCounter,

    // State metrics
    devices_tracked: IntGauge,
    workday_marks: IntCounterVec,
    task_transitions: IntCounterVec,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let batches_total = IntCounter::new(
            "fleet_ingest_batches_total",
            "Total transmission batches processed",
        )?;
        registry.register(Box::new(batches_total.clone()))?;

        let batch_reports_parsed = IntCounter::new(
            "fleet_ingest_reports_parsed_total",
            "Reports surviving batch parsing",
        )?;
        registry.register(Box::new(batch_reports_parsed.clone()))?;

        let batch_entries_malformed = IntCounter::new(
            "fleet_ingest_entries_malformed_total",
            "Entries dropped for a field-format mismatch",
        )?;
        registry.register(Box::new(batch_entries_malformed.clone()))?;

        let batch_entries_stale = IntCounter::new(
            "fleet_ingest_entries_stale_total",
            "Entries dropped for a date outside the current day",
        )?;
        registry.register(Box::new(batch_entries_stale.clone()))?;

        let batch_processing_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "fleet_ingest_batch_processing_seconds",
                "Batch processing time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )?;
        registry.register(Box::new(batch_processing_seconds.clone()))?;

        let reports_persisted = IntCounter::new(
            "fleet_ingest_reports_persisted_total",
            "Reports written to the history store",
        )?;
        registry.register(Box::new(reports_persisted.clone()))?;

        let reports_out_of_order = IntCounter::new(
            "fleet_ingest_reports_out_of_order_total",
            "Reports discarded by the ordering guard",
        )?;
        registry.register(Box::new(reports_out_of_order.clone()))?;

        let devices_tracked = IntGauge::new(
            "fleet_ingest_devices_tracked",
            "Devices with live state in the state store",
        )?;
        registry.register(Box::new(devices_tracked.clone()))?;

        let workday_marks = IntCounterVec::new(
            Opts::new("fleet_ingest_workday_marks_total", "Workday marks committed"),
            &["mark"],
        )?;
        registry.register(Box::new(workday_marks.clone()))?;

        let task_transitions = IntCounterVec::new(
            Opts::new(
                "fleet_ingest_task_transitions_total",
                "Task status transitions",
            ),
            &["status"],
        )?;
        registry.register(Box::new(task_transitions.clone()))?;

        info!("Metrics collector initialized");

        Ok(Self {
            registry,
            batches_total,
            batch_reports_parsed,
            batch_entries_malformed,
            batch_entries_stale,
            batch_processing_seconds,
            reports_persisted,
            reports_out_of_order,
            devices_tracked,
            workday_marks,
            task_transitions,
        })
    }

    /// Get Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Record one processed batch
    pub fn record_batch(
        &self,
        parsed: usize,
        malformed: usize,
        stale: usize,
        processing_secs: f64,
    ) {
        self.batches_total.inc();
        self.batch_reports_parsed.inc_by(parsed as u64);
        self.batch_entries_malformed.inc_by(malformed as u64);
        self.batch_entries_stale.inc_by(stale as u64);
        self.batch_processing_seconds.observe(processing_secs);
    }

    /// Record persisted reports and ordering-guard discards
    pub fn record_reports(&self, persisted: usize, out_of_order: usize) {
        self.reports_persisted.inc_by(persisted as u64);
        self.reports_out_of_order.inc_by(out_of_order as u64);
    }

    /// Update the tracked-device gauge
    pub fn set_devices_tracked(&self, count: i64) {
        self.devices_tracked.set(count);
    }

    /// Record a committed workday mark
    pub fn record_workday_mark(&self, mark: WorkdayMark) {
        let label = match mark {
            WorkdayMark::Start => "start",
            WorkdayMark::End => "end",
        };
        self.workday_marks.with_label_values(&[label]).inc();
    }

    /// Record a task status transition
    pub fn record_task_transition(&self, status: TaskStatus) {
        self.task_transitions
            .with_label_values(&[&status.to_string()])
            .inc();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create MetricsCollector")
    }
}

// ============================================================================
// TESTS
// ============================================================================
