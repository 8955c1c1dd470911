//! Task-status state machine
//!
//! NOT_STARTED moves to IN_PROGRESS on the first in-zone work inside the
//! task window; once the window has passed, the task settles into DONE or
//! NOT_DONE based on the presence percentage. Terminal statuses never
//! change again.

use chrono::NaiveDateTime;
use tracing::debug;

use fleet_core::{TaskAssignment, TaskStatus};

/// Result of one status evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvaluation {
    pub new_status: TaskStatus,
    /// Set only for terminal verdicts
    pub presence_percent: Option<f64>,
}

/// Share of the task window spent working inside the zone
pub fn presence_percent(task: &TaskAssignment, in_zone_work_secs: i64) -> f64 {
    let window = task.window_secs();
    if window <= 0 {
        return 0.0;
    }
    in_zone_work_secs as f64 / window as f64 * 100.0
}

/// Evaluate a task's status against the clock and accumulated in-zone work.
///
/// Returns `None` when the status must not change: the stored status is
/// terminal, the window has not opened, or nothing warrants a transition
/// yet.
pub fn evaluate(
    task: &TaskAssignment,
    current: TaskStatus,
    now: NaiveDateTime,
    in_zone_work_secs: i64,
    done_threshold_percent: f64,
) -> Option<StatusEvaluation> {
    if current.is_terminal() {
        return None;
    }
    if now < task.starts_at() {
        return None;
    }

    if now <= task.ends_at() {
        // Window open: the only possible transition is into IN_PROGRESS
        if current == TaskStatus::NotStarted && in_zone_work_secs > 0 {
            return Some(StatusEvaluation {
                new_status: TaskStatus::InProgress,
                presence_percent: None,
            });
        }
        return None;
    }

    // Window passed: settle the terminal verdict
    let presence = presence_percent(task, in_zone_work_secs);
    let new_status = if presence >= done_threshold_percent {
        TaskStatus::Done
    } else {
        TaskStatus::NotDone
    };
    debug!(
        task = %task.id,
        presence = presence,
        verdict = %new_status,
        "task window closed"
    );

    Some(StatusEvaluation {
        new_status,
        presence_percent: Some(presence),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn task() -> TaskAssignment {
        // Four-hour window, 08:00-12:00
        TaskAssignment::new(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        )
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_before_window_no_change() {
        let task = task();
        assert!(evaluate(&task, TaskStatus::NotStarted, at(7, 30), 600, 30.0).is_none());
    }

    #[test]
    fn test_in_zone_work_starts_task() {
        let task = task();
        let eval = evaluate(&task, TaskStatus::NotStarted, at(9, 0), 60, 30.0).unwrap();
        assert_eq!(eval.new_status, TaskStatus::InProgress);
        assert!(eval.presence_percent.is_none());
    }

    #[test]
    fn test_no_work_inside_window_no_change() {
        let task = task();
        assert!(evaluate(&task, TaskStatus::NotStarted, at(9, 0), 0, 30.0).is_none());
        assert!(evaluate(&task, TaskStatus::InProgress, at(9, 0), 3600, 30.0).is_none());
    }

    #[test]
    fn test_presence_at_threshold_is_done() {
        let task = task();
        // 30% of the 14400-second window, inclusive boundary
        let eval = evaluate(&task, TaskStatus::InProgress, at(12, 1), 4320, 30.0).unwrap();
        assert_eq!(eval.new_status, TaskStatus::Done);
        assert_eq!(eval.presence_percent, Some(30.0));
    }

    #[test]
    fn test_presence_below_threshold_is_not_done() {
        let task = task();
        // 29% presence
        let eval = evaluate(&task, TaskStatus::InProgress, at(12, 1), 4176, 30.0).unwrap();
        assert_eq!(eval.new_status, TaskStatus::NotDone);
        assert_eq!(eval.presence_percent, Some(29.0));
    }

    #[test]
    fn test_never_started_settles_not_done() {
        let task = task();
        let eval = evaluate(&task, TaskStatus::NotStarted, at(13, 0), 0, 30.0).unwrap();
        assert_eq!(eval.new_status, TaskStatus::NotDone);
        assert_eq!(eval.presence_percent, Some(0.0));
    }

    #[test]
    fn test_terminal_status_never_changes() {
        let task = task();
        assert!(evaluate(&task, TaskStatus::Done, at(13, 0), 0, 30.0).is_none());
        assert!(evaluate(&task, TaskStatus::NotDone, at(13, 0), 14_400, 30.0).is_none());
    }

    #[test]
    fn test_presence_percent_zero_window() {
        let mut task = task();
        task.end_time = task.start_time;
        assert_eq!(presence_percent(&task, 600), 0.0);
    }
}
