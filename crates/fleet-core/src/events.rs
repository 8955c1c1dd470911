//! Event types for the fleet telemetry system
//!
//! These events are published to downstream collaborators (notification
//! and reporting services) whenever processing produces a state change.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DailyMetrics, DeviceId, MetricsScope, TaskId, TaskStatus, WorkdayMark};

/// Event envelope for all system events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(event_type: EventType, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            payload,
        }
    }

    pub fn workday_marked(
        device_id: DeviceId,
        report_id: Uuid,
        mark: WorkdayMark,
        marked_at: NaiveDateTime,
    ) -> Self {
        let event_type = match mark {
            WorkdayMark::Start => EventType::WorkdayStarted,
            WorkdayMark::End => EventType::WorkdayEnded,
        };
        Self::new(
            event_type,
            EventPayload::Workday(WorkdayEvent {
                device_id,
                report_id,
                mark,
                marked_at,
            }),
        )
    }

    pub fn task_status_changed(
        task_id: TaskId,
        old_status: TaskStatus,
        new_status: TaskStatus,
        presence_percent: Option<f64>,
    ) -> Self {
        Self::new(
            EventType::TaskStatusChanged,
            EventPayload::TaskStatus(TaskStatusEvent {
                task_id,
                old_status,
                new_status,
                presence_percent,
            }),
        )
    }

    pub fn metrics_updated(scope: MetricsScope, metrics: DailyMetrics) -> Self {
        Self::new(
            EventType::MetricsUpdated,
            EventPayload::Metrics(MetricsEvent { scope, metrics }),
        )
    }
}

/// Type of event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    WorkdayStarted,
    WorkdayEnded,
    TaskStatusChanged,
    MetricsUpdated,
}

/// Event payload variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    Workday(WorkdayEvent),
    TaskStatus(TaskStatusEvent),
    Metrics(MetricsEvent),
}

/// A day-start or day-end report was committed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkdayEvent {
    pub device_id: DeviceId,
    pub report_id: Uuid,
    pub mark: WorkdayMark,
    pub marked_at: NaiveDateTime,
}

/// A task assignment moved to a new status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusEvent {
    pub task_id: TaskId,
    pub old_status: TaskStatus,
    pub new_status: TaskStatus,
    /// Present when the transition was decided by presence percentage
    pub presence_percent: Option<f64>,
}

/// Rolling totals for a scope were updated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsEvent {
    pub scope: MetricsScope,
    pub metrics: DailyMetrics,
}

// ============================================================================
// TESTS
// ============================================================================
