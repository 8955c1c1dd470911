//! Start/end-of-work-day detection
//!
//! A constrained instance of the motion state machine: a transition is
//! committed only after a configured number of consecutive reports confirm
//! the new state, and only inside the device's working-hours window. At
//! most one starting point and one ending point are marked per device per
//! calendar day.

use std::sync::Arc;
use tracing::{debug, info};

use fleet_core::{MotionState, PersistedReport, WorkdayMark, WorkingHours};
use fleet_store::{DeviceStateStore, ReportStore, StoreResult};

/// Hysteresis-gated detector for day-start/day-end reports
pub struct WorkdayDetector<'a> {
    state: &'a DeviceStateStore,
    reports: Arc<dyn ReportStore>,
    working_hours: WorkingHours,
    /// Consecutive reports required to confirm a transition
    confirmations: u32,
}

impl<'a> WorkdayDetector<'a> {
    pub fn new(
        state: &'a DeviceStateStore,
        reports: Arc<dyn ReportStore>,
        working_hours: WorkingHours,
        confirmations: u32,
    ) -> Self {
        Self {
            state,
            reports,
            working_hours,
            confirmations,
        }
    }

    /// Observe one persisted report.
    ///
    /// Returns the committed mark and the updated report when this
    /// observation completed a confirmed transition that starts or ends
    /// the device's working day.
    pub async fn observe(
        &self,
        persisted: &PersistedReport,
    ) -> StoreResult<Option<(WorkdayMark, PersistedReport)>> {
        let report = &persisted.report;
        if !self.working_hours.contains(report.timestamp.time()) {
            return Ok(None);
        }

        let device = &report.device_id;
        let date = report.timestamp.date();
        let candidate = report.motion_state();
        let validated = self.state.validated_state(device);

        if candidate == validated {
            // Confirmation chain broken or nothing pending
            self.state.reset_consecutive_count(device);
            self.state.clear_pending_reports(device);
            return Ok(None);
        }

        // A flip mid-confirmation restarts the chain from this report
        if let Some(last) = self.state.pending_reports(device).last() {
            if last.report.motion_state() != candidate {
                self.state.clear_pending_reports(device);
                self.state.set_consecutive_count(device, 0);
            }
        }

        self.state.add_pending_report(device, persisted.clone());
        let count = self.state.increment_consecutive_count(device);
        if count < self.confirmations {
            debug!(
                device = %device,
                state = %candidate,
                count,
                "motion transition pending confirmation"
            );
            return Ok(None);
        }

        // Transition confirmed; the first pending report is where the new
        // state actually began
        let pending = self.state.pending_reports(device);
        self.state.set_validated_state(device, candidate);
        self.state.clear_pending_reports(device);
        self.state.set_consecutive_count(device, 0);

        let first = pending.first().cloned().unwrap_or_else(|| persisted.clone());
        let marks = self.state.workday_marks(device, date);
        let mark = match candidate {
            MotionState::Moving if !marks.start_committed => WorkdayMark::Start,
            MotionState::Stopped if marks.start_committed && !marks.end_committed => {
                WorkdayMark::End
            }
            // Already marked today, or a stop before any start
            _ => return Ok(None),
        };

        let updated = self.reports.set_workday_mark(first.id, mark).await?;
        self.state.commit_workday_mark(device, date, mark);
        info!(
            device = %device,
            mark = ?mark,
            at = %updated.report.timestamp,
            "workday mark committed"
        );

        Ok(Some((mark, updated)))
    }
}

// ============================================================================
// TESTS
// ============================================================================
