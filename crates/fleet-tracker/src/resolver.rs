//! Geofence resolution for task assignments
//!
//! A task targets either a whole field or a sub-plot inside one; the
//! precedence (plot over field) is decided when the [`TaskTarget`] is
//! built by the assignment collaborator, so resolution here is a single
//! match with no string inspection.

use tracing::debug;

use fleet_core::{Polygon, TaskAssignment, TaskTarget};

/// Resolve the bounding polygon of a task's target area.
///
/// Returns `None` when the assignment is absent or its target type is
/// unrecognized; returns an empty polygon (not `None`) when the area has
/// no coordinates configured. Vertex validation is the caller's concern.
pub fn resolve_zone(task: Option<&TaskAssignment>) -> Option<Polygon> {
    let task = task?;

    match &task.target {
        TaskTarget::Field(polygon) | TaskTarget::Plot(polygon) => Some(polygon.clone()),
        TaskTarget::Unknown => {
            debug!(task = %task.id, "task target unrecognized, no zone restriction");
            None
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
