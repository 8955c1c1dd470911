//! # Fleet Core
//!
//! Core domain models and types for the fleet telemetry system.
//! This crate provides shared types used across all ingestion crates.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod error;
pub mod events;
pub mod geo;

pub use error::CoreError;
pub use events::*;
pub use geo::*;

// ============================================================================
// IDENTITY
// ============================================================================

/// Unique identifier for a tracking device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identity of the party a device's metrics are accounted to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a task assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// REPORT MODELS
// ============================================================================

/// Ignition/power status reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerStatus {
    On,
    Off,
}

impl PowerStatus {
    pub fn is_off(&self) -> bool {
        matches!(self, PowerStatus::Off)
    }
}

impl fmt::Display for PowerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerStatus::On => write!(f, "ON"),
            PowerStatus::Off => write!(f, "OFF"),
        }
    }
}

/// Confirmed motion state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MotionState {
    Moving,
    Stopped,
    Unknown,
}

impl Default for MotionState {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for MotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionState::Moving => write!(f, "MOVING"),
            MotionState::Stopped => write!(f, "STOPPED"),
            MotionState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Heading indices as transmitted by the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// East-west direction index
    pub east_west: u8,
    /// North-south direction index
    pub north_south: u8,
}

impl Heading {
    pub fn new(east_west: u8, north_south: u8) -> Self {
        Self {
            east_west,
            north_south,
        }
    }
}

/// One normalized position/telemetry sample, immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReport {
    pub device_id: DeviceId,
    /// Position in decimal degrees
    pub coordinate: GeoPoint,
    /// Ground speed in km/h, non-negative
    pub speed: f64,
    pub status: PowerStatus,
    pub direction: Heading,
    /// Speed below the configured moving threshold
    pub is_stopped: bool,
    /// Ignition reported off
    pub is_off: bool,
    /// Marked by the workday detector, at most once per device per day
    pub is_starting_point: bool,
    /// Marked by the workday detector, at most once per device per day
    pub is_ending_point: bool,
    /// Seconds spent stopped leading into this report
    pub stoppage_secs: i64,
    /// Device-local timestamp after the fixed offset is applied
    pub timestamp: NaiveDateTime,
}

impl NormalizedReport {
    /// Motion state implied by this single report
    pub fn motion_state(&self) -> MotionState {
        if self.is_stopped {
            MotionState::Stopped
        } else {
            MotionState::Moving
        }
    }
}

/// A normalized report with a stable identity, stored for audit/history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedReport {
    pub id: Uuid,
    #[serde(flatten)]
    pub report: NormalizedReport,
}

impl PersistedReport {
    pub fn new(report: NormalizedReport) -> Self {
        Self {
            id: Uuid::new_v4(),
            report,
        }
    }
}

/// Which end of the working day a report marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkdayMark {
    Start,
    End,
}

// ============================================================================
// DELTA & ROLLING METRICS
// ============================================================================

/// Incremental metrics computed over one processed batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaSummary {
    pub total_distance_km: f64,
    pub total_moving_secs: i64,
    pub total_stopped_secs: i64,
    /// One count per stoppage episode, not per stopped report
    pub stoppage_count: u32,
    pub max_speed: f64,
    /// Persisted reports touched by this batch, in order
    pub touched_points: Vec<PersistedReport>,
    pub latest_persisted: Option<PersistedReport>,
}

impl DeltaSummary {
    /// True when the batch contributed nothing to metrics
    pub fn is_zero(&self) -> bool {
        self.total_distance_km == 0.0
            && self.total_moving_secs == 0
            && self.total_stopped_secs == 0
            && self.stoppage_count == 0
    }
}

/// Key of one rolling-total record: owner + date, optionally task-scoped
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricsScope {
    pub owner: OwnerId,
    pub date: NaiveDate,
    pub task_id: Option<TaskId>,
}

impl MetricsScope {
    pub fn daily(owner: OwnerId, date: NaiveDate) -> Self {
        Self {
            owner,
            date,
            task_id: None,
        }
    }

    pub fn for_task(owner: OwnerId, date: NaiveDate, task_id: TaskId) -> Self {
        Self {
            owner,
            date,
            task_id: Some(task_id),
        }
    }
}

impl fmt::Display for MetricsScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.task_id {
            Some(task) => write!(f, "{}/{}/{}", self.owner, self.date, task),
            None => write!(f, "{}/{}", self.owner, self.date),
        }
    }
}

/// Rolling daily totals for one metrics scope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub traveled_distance_km: f64,
    pub work_secs: i64,
    pub stoppage_secs: i64,
    pub stoppage_count: u32,
    pub max_speed: f64,
    pub average_speed: f64,
    /// Work duration as a percentage of the expected duration; may exceed 100
    pub efficiency: f64,
}

impl DailyMetrics {
    /// Fold one delta into the rolling totals.
    ///
    /// All accumulators are additive; negative deltas (corrections,
    /// backfills) are folded arithmetically without clamping.
    pub fn apply(&mut self, delta: &DeltaSummary, expected_secs: i64) {
        self.traveled_distance_km += delta.total_distance_km;
        self.work_secs += delta.total_moving_secs;
        self.stoppage_secs += delta.total_stopped_secs;
        self.stoppage_count += delta.stoppage_count;
        if delta.max_speed > self.max_speed {
            self.max_speed = delta.max_speed;
        }

        self.average_speed = if self.work_secs > 0 {
            self.traveled_distance_km / (self.work_secs as f64 / 3600.0)
        } else {
            0.0
        };
        self.efficiency = if expected_secs > 0 {
            self.work_secs as f64 / expected_secs as f64 * 100.0
        } else {
            0.0
        };
    }
}

// ============================================================================
// TASK MODELS
// ============================================================================

/// Lifecycle status of a task assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Done,
    NotDone,
}

impl TaskStatus {
    /// Done and NotDone are terminal; re-evaluation is a no-op
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::NotDone)
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::NotStarted => write!(f, "NOT_STARTED"),
            TaskStatus::InProgress => write!(f, "IN_PROGRESS"),
            TaskStatus::Done => write!(f, "DONE"),
            TaskStatus::NotDone => write!(f, "NOT_DONE"),
        }
    }
}

/// Area a task assignment targets, resolved once and never inspected
/// by string comparison downstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "boundary")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskTarget {
    /// Whole field; a plot-scoped assignment takes the plot boundary instead
    Field(Polygon),
    /// Sub-plot inside a field
    Plot(Polygon),
    /// Target type the resolver does not recognize
    Unknown,
}

/// A work assignment for a device, supplied externally; the core only
/// computes and writes `status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub id: TaskId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub target: TaskTarget,
    pub status: TaskStatus,
}

impl TaskAssignment {
    pub fn new(date: NaiveDate, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            id: TaskId::new(),
            date,
            start_time,
            end_time,
            target: TaskTarget::Unknown,
            status: TaskStatus::default(),
        }
    }

    pub fn with_target(mut self, target: TaskTarget) -> Self {
        self.target = target;
        self
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.date.and_time(self.end_time)
    }

    /// Length of the task window in seconds
    pub fn window_secs(&self) -> i64 {
        (self.ends_at() - self.starts_at()).num_seconds()
    }
}

// ============================================================================
// DEVICE PROFILE
// ============================================================================

/// Configured start/end-of-day window; supports windows crossing midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkingHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Check whether a local time falls inside the window
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time <= self.end
        } else {
            // Window crosses midnight
            time >= self.start || time <= self.end
        }
    }
}

/// Expected work-time targets for a device
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkTargets {
    pub daily_hours: f64,
    pub monthly_hours: f64,
    pub yearly_hours: f64,
}

impl Default for WorkTargets {
    fn default() -> Self {
        Self {
            daily_hours: 8.0,
            monthly_hours: 176.0,
            yearly_hours: 2112.0,
        }
    }
}

/// Everything the core needs to know about one device, supplied by
/// external collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub device_id: DeviceId,
    pub owner: OwnerId,
    pub working_hours: WorkingHours,
    pub targets: WorkTargets,
}

impl DeviceProfile {
    pub fn new(device_id: impl Into<DeviceId>, owner: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            owner: OwnerId::new(owner),
            working_hours: WorkingHours::new(
                NaiveTime::from_hms_opt(6, 0, 0).expect("valid time"),
                NaiveTime::from_hms_opt(20, 0, 0).expect("valid time"),
            ),
            targets: WorkTargets::default(),
        }
    }

    pub fn with_working_hours(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.working_hours = WorkingHours::new(start, end);
        self
    }

    pub fn with_daily_target_hours(mut self, hours: f64) -> Self {
        self.targets.daily_hours = hours;
        self
    }

    /// Daily target expressed in seconds
    pub fn expected_daily_secs(&self) -> i64 {
        (self.targets.daily_hours * 3600.0) as i64
    }
}

// ============================================================================
// TESTS
// ============================================================================
