//! Per-device report processing
//!
//! Consumes a normalized batch in timestamp order, enforces monotonic
//! ordering against the device's previous accepted report, accrues
//! moving/stopped time and distance into delta summaries, persists every
//! accepted report, and feeds the workday detector.
//!
//! Two deltas come out of one pass: the default daily delta and the
//! zone-restricted delta used for task accounting. A report can count
//! toward both, one, or neither depending on working hours and the
//! resolved zone; persistence never depends on either filter.

use std::sync::Arc;
use tracing::{debug, warn};

use fleet_core::{
    DeltaSummary, DeviceProfile, NormalizedReport, PersistedReport, Polygon, WorkdayMark,
};
use fleet_store::{DeviceStateStore, ReportStore, StoreResult};

use crate::config::IngestConfig;
use crate::workday::WorkdayDetector;

/// Everything one processed batch produced
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    /// Delta for the default daily totals
    pub delta: DeltaSummary,
    /// Delta restricted to reports inside the task zone
    pub zone_delta: DeltaSummary,
    /// Workday marks committed while processing, in order
    pub marks: Vec<(WorkdayMark, PersistedReport)>,
    /// Reports rejected by the monotonic-ordering guard
    pub out_of_order: u64,
}

/// Single-batch processor bound to one device's profile and zone
pub struct ReportProcessor<'a> {
    profile: &'a DeviceProfile,
    zone: Option<&'a Polygon>,
    state: &'a DeviceStateStore,
    reports: Arc<dyn ReportStore>,
    config: &'a IngestConfig,
}

impl<'a> ReportProcessor<'a> {
    pub fn new(
        profile: &'a DeviceProfile,
        zone: Option<&'a Polygon>,
        state: &'a DeviceStateStore,
        reports: Arc<dyn ReportStore>,
        config: &'a IngestConfig,
    ) -> Self {
        Self {
            profile,
            zone,
            state,
            reports,
            config,
        }
    }

    /// Process one batch already sorted by timestamp.
    pub async fn process(&self, batch: Vec<NormalizedReport>) -> StoreResult<ProcessOutcome> {
        let detector = WorkdayDetector::new(
            self.state,
            self.reports.clone(),
            self.profile.working_hours,
            self.config.confirmations,
        );

        let mut outcome = ProcessOutcome::default();

        for mut report in batch {
            let device = report.device_id.clone();
            let previous = self.state.previous_report(&device);

            let in_hours = self
                .profile
                .working_hours
                .contains(report.timestamp.time());
            // An absent polygon is no restriction, not an empty one
            let in_zone = self
                .zone
                .map(|z| z.contains(&report.coordinate))
                .unwrap_or(true);

            if let Some(prev) = &previous {
                // Replays and out-of-order arrivals never move state backward
                if report.timestamp <= prev.timestamp {
                    outcome.out_of_order += 1;
                    warn!(
                        device = %device,
                        at = %report.timestamp,
                        previous = %prev.timestamp,
                        "dropping non-monotonic report"
                    );
                    continue;
                }

                let elapsed = (report.timestamp - prev.timestamp).num_seconds();
                if report.is_stopped {
                    report.stoppage_secs = if prev.is_stopped {
                        prev.stoppage_secs + elapsed
                    } else {
                        elapsed
                    };
                }

                if in_hours && (self.config.daily_includes_out_of_zone || in_zone) {
                    accrue(&mut outcome.delta, prev, &report, elapsed);
                }
                if in_hours && in_zone {
                    accrue(&mut outcome.zone_delta, prev, &report, elapsed);
                }
            } else {
                debug!(device = %device, "first report for device");
            }

            let persisted = self.reports.insert(&report).await?;
            outcome.delta.touched_points.push(persisted.clone());
            outcome.delta.latest_persisted = Some(persisted.clone());
            if in_hours && in_zone {
                outcome.zone_delta.touched_points.push(persisted.clone());
                outcome.zone_delta.latest_persisted = Some(persisted.clone());
            }

            if let Some((mark, updated)) = detector.observe(&persisted).await? {
                // Reflect the mark on the already-collected touched points
                let collected = outcome
                    .delta
                    .touched_points
                    .iter_mut()
                    .chain(outcome.zone_delta.touched_points.iter_mut());
                for point in collected {
                    if point.id == updated.id {
                        *point = updated.clone();
                    }
                }
                outcome.marks.push((mark, updated));
            }

            self.state.set_previous_report(&device, report);
            self.state.set_latest_persisted(&device, persisted);
        }

        Ok(outcome)
    }
}

/// Fold one report pair into a delta
fn accrue(delta: &mut DeltaSummary, prev: &NormalizedReport, current: &NormalizedReport, elapsed: i64) {
    if current.is_stopped {
        delta.total_stopped_secs += elapsed;
        // Count the episode once, when the device transitions into it
        if !prev.is_stopped {
            delta.stoppage_count += 1;
        }
    } else {
        delta.total_moving_secs += elapsed;
        delta.total_distance_km += prev.coordinate.distance_to(&current.coordinate);
        if current.speed > delta.max_speed {
            delta.max_speed = current.speed;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fleet_core::{DeviceId, GeoPoint, Heading, PowerStatus};
    use fleet_store::{InMemoryReports, StoreError, StoreResult};
    use uuid::Uuid;

    mockall::mock! {
        Reports {}

        #[async_trait::async_trait]
        impl ReportStore for Reports {
            async fn insert(&self, report: &NormalizedReport) -> StoreResult<PersistedReport>;
            async fn set_workday_mark(
                &self,
                report_id: Uuid,
                mark: WorkdayMark,
            ) -> StoreResult<PersistedReport>;
            async fn history(
                &self,
                device: &DeviceId,
                date: NaiveDate,
            ) -> StoreResult<Vec<PersistedReport>>;
            async fn latest(&self, device: &DeviceId) -> StoreResult<Option<PersistedReport>>;
        }
    }

    fn profile() -> DeviceProfile {
        DeviceProfile::new("TRACTOR-01", "farm-7")
    }

    fn report_at(h: u32, m: u32, lat: f64, lng: f64, speed: f64) -> NormalizedReport {
        NormalizedReport {
            device_id: DeviceId::new("TRACTOR-01"),
            coordinate: GeoPoint::new(lat, lng),
            speed,
            status: PowerStatus::On,
            direction: Heading::default(),
            is_stopped: speed < 2.0,
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

    fn zone() -> Polygon {
        Polygon::new(vec![
            GeoPoint::new(34.0, 50.0),
            GeoPoint::new(34.0, 51.0),
            GeoPoint::new(35.0, 51.0),
            GeoPoint::new(35.0, 50.0),
        ])
    }

    async fn run(
        zone: Option<&Polygon>,
        config: &IngestConfig,
        batch: Vec<NormalizedReport>,
    ) -> ProcessOutcome {
        let profile = profile();
        let state = DeviceStateStore::new();
        let reports: Arc<dyn ReportStore> = Arc::new(InMemoryReports::new());
        let processor = ReportProcessor::new(&profile, zone, &state, reports, config);
        processor.process(batch).await.unwrap()
    }

    #[tokio::test]
    async fn test_moving_pair_accrues_time_and_distance() {
        let config = IngestConfig::default();
        let outcome = run(
            None,
            &config,
            vec![
                report_at(7, 0, 34.883333, 50.583333, 10.0),
                report_at(7, 1, 34.884333, 50.583333, 12.0),
            ],
        )
        .await;

        assert_eq!(outcome.delta.total_moving_secs, 60);
        assert!(outcome.delta.total_distance_km > 0.0);
        assert_eq!(outcome.delta.max_speed, 12.0);
        assert_eq!(outcome.delta.touched_points.len(), 2);
        // Confirmed moving run starts the working day on the first report
        assert_eq!(outcome.marks.len(), 1);
        assert_eq!(outcome.marks[0].0, WorkdayMark::Start);
        assert!(outcome.marks[0].1.report.is_starting_point);
    }

    #[tokio::test]
    async fn test_stopped_then_moving_credits_moving_time() {
        let config = IngestConfig::default();
        let outcome = run(
            None,
            &config,
            vec![
                report_at(7, 0, 34.883333, 50.583333, 0.0),
                report_at(7, 1, 34.884333, 50.583333, 10.0),
            ],
        )
        .await;

        // Current report's state decides the credit, not the previous one
        assert_eq!(outcome.delta.total_moving_secs, 60);
        assert_eq!(outcome.delta.total_stopped_secs, 0);
        assert!(outcome.delta.total_distance_km > 0.0);
        assert_eq!(outcome.delta.touched_points.len(), 2);
    }

    #[tokio::test]
    async fn test_first_report_persisted_without_accrual() {
        let config = IngestConfig::default();
        let outcome = run(None, &config, vec![report_at(7, 0, 34.88, 50.58, 10.0)]).await;

        assert!(outcome.delta.is_zero());
        assert_eq!(outcome.delta.touched_points.len(), 1);
        assert!(outcome.delta.latest_persisted.is_some());
    }

    #[tokio::test]
    async fn test_out_of_order_report_dropped() {
        let config = IngestConfig::default();
        let outcome = run(
            None,
            &config,
            vec![
                report_at(7, 5, 34.88, 50.58, 10.0),
                report_at(7, 1, 34.89, 50.58, 10.0),
                report_at(7, 5, 34.89, 50.58, 10.0),
            ],
        )
        .await;

        assert_eq!(outcome.out_of_order, 2);
        assert_eq!(outcome.delta.touched_points.len(), 1);
    }

    #[tokio::test]
    async fn test_stoppage_episode_counted_once() {
        let config = IngestConfig::default();
        let outcome = run(
            None,
            &config,
            vec![
                report_at(7, 0, 34.88, 50.58, 10.0),
                report_at(7, 1, 34.88, 50.58, 0.0),
                report_at(7, 2, 34.88, 50.58, 0.0),
                report_at(7, 3, 34.88, 50.58, 0.0),
            ],
        )
        .await;

        assert_eq!(outcome.delta.stoppage_count, 1);
        assert_eq!(outcome.delta.total_stopped_secs, 180);
    }

    #[tokio::test]
    async fn test_stoppage_secs_accumulate_on_reports() {
        let config = IngestConfig::default();
        let outcome = run(
            None,
            &config,
            vec![
                report_at(7, 0, 34.88, 50.58, 10.0),
                report_at(7, 1, 34.88, 50.58, 0.0),
                report_at(7, 3, 34.88, 50.58, 0.0),
            ],
        )
        .await;

        let points = &outcome.delta.touched_points;
        assert_eq!(points[1].report.stoppage_secs, 60);
        assert_eq!(points[2].report.stoppage_secs, 180);
    }

    #[tokio::test]
    async fn test_zone_delta_excludes_outside_points() {
        let config = IngestConfig::default();
        let zone = zone();
        let outcome = run(
            Some(&zone),
            &config,
            vec![
                // Inside the zone
                report_at(7, 0, 34.5, 50.5, 10.0),
                report_at(7, 1, 34.5, 50.5, 10.0),
                // Outside the zone
                report_at(7, 2, 36.0, 52.0, 10.0),
            ],
        )
        .await;

        assert_eq!(outcome.zone_delta.total_moving_secs, 60);
        // Daily totals still include the out-of-zone travel
        assert_eq!(outcome.delta.total_moving_secs, 120);
        // Every report persisted regardless of filters
        assert_eq!(outcome.delta.touched_points.len(), 3);
    }

    #[tokio::test]
    async fn test_daily_can_exclude_out_of_zone() {
        let config = IngestConfig {
            daily_includes_out_of_zone: false,
            ..Default::default()
        };
        let zone = zone();
        let outcome = run(
            Some(&zone),
            &config,
            vec![
                report_at(7, 0, 36.0, 52.0, 10.0),
                report_at(7, 1, 36.0, 52.0, 10.0),
            ],
        )
        .await;

        assert_eq!(outcome.delta.total_moving_secs, 0);
        assert_eq!(outcome.delta.touched_points.len(), 2);
    }

    #[tokio::test]
    async fn test_absent_zone_is_unrestricted() {
        // Without a polygon the zone filter admits everything, even when
        // the daily scope excludes out-of-zone travel
        let config = IngestConfig {
            daily_includes_out_of_zone: false,
            ..Default::default()
        };
        let outcome = run(
            None,
            &config,
            vec![
                report_at(7, 0, 34.88, 50.58, 10.0),
                report_at(7, 1, 34.89, 50.58, 10.0),
            ],
        )
        .await;

        assert_eq!(outcome.delta.total_moving_secs, 60);
        assert_eq!(outcome.zone_delta.total_moving_secs, 60);
    }

    #[tokio::test]
    async fn test_zone_delta_tracks_admitted_points() {
        let config = IngestConfig::default();
        let zone = zone();
        let outcome = run(
            Some(&zone),
            &config,
            vec![
                report_at(7, 0, 34.5, 50.5, 10.0),
                report_at(7, 1, 34.5, 50.5, 10.0),
                report_at(7, 2, 36.0, 52.0, 10.0),
            ],
        )
        .await;

        // Only the in-zone reports land on the zone-restricted delta
        assert_eq!(outcome.zone_delta.touched_points.len(), 2);
        assert_eq!(
            outcome.zone_delta.latest_persisted.as_ref().unwrap().id,
            outcome.zone_delta.touched_points[1].id
        );
        assert_eq!(outcome.delta.touched_points.len(), 3);
    }

    #[tokio::test]
    async fn test_outside_working_hours_persisted_not_accrued() {
        let config = IngestConfig::default();
        let outcome = run(
            None,
            &config,
            vec![
                report_at(4, 0, 34.88, 50.58, 10.0),
                report_at(4, 1, 34.89, 50.58, 10.0),
            ],
        )
        .await;

        assert!(outcome.delta.is_zero());
        assert_eq!(outcome.delta.touched_points.len(), 2);
        assert!(outcome.marks.is_empty());
    }

    #[tokio::test]
    async fn test_state_survives_across_batches() {
        let profile = profile();
        let config = IngestConfig::default();
        let state = DeviceStateStore::new();
        let reports: Arc<dyn ReportStore> = Arc::new(InMemoryReports::new());
        let processor = ReportProcessor::new(&profile, None, &state, reports, &config);

        processor
            .process(vec![report_at(7, 0, 34.88, 50.58, 10.0)])
            .await
            .unwrap();
        let second = processor
            .process(vec![report_at(7, 1, 34.88, 50.58, 10.0)])
            .await
            .unwrap();

        // Accrual bridges the batch boundary through stored state
        assert_eq!(second.delta.total_moving_secs, 60);
        assert_eq!(second.marks.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_failure_surfaces() {
        let mut mock = MockReports::new();
        mock.expect_insert()
            .returning(|_| Err(StoreError::backend("history store unavailable")));

        let profile = profile();
        let config = IngestConfig::default();
        let state = DeviceStateStore::new();
        let reports: Arc<dyn ReportStore> = Arc::new(mock);
        let processor = ReportProcessor::new(&profile, None, &state, reports, &config);

        let result = processor
            .process(vec![report_at(7, 0, 34.88, 50.58, 10.0)])
            .await;
        assert!(matches!(result, Err(StoreError::Backend(_))));

        // Failed persistence must not advance the ordering state
        assert!(state.previous_report(&DeviceId::new("TRACTOR-01")).is_none());
    }
}
