//! Ingestion pipeline configuration

use fleet_protocol::ParserConfig;

/// Ingestion configuration, fixed platform-wide
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Speed below this is classified as stopped (km/h); shared by the
    /// parser and the workday detector
    pub moving_speed_kmh: f64,
    /// Consecutive reports required to confirm a motion-state transition
    pub confirmations: u32,
    /// Fixed local-time offset applied to device timestamps (minutes)
    pub offset_minutes: i64,
    /// Presence percentage at or above which a finished task is done
    pub presence_done_percent: f64,
    /// Whether reports outside an active task zone still count toward
    /// the default daily totals
    pub daily_includes_out_of_zone: bool,
    /// Event bus channel capacity
    pub event_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            moving_speed_kmh: 2.0,
            confirmations: 2,
            offset_minutes: 210, // +03:30
            presence_done_percent: 30.0,
            daily_includes_out_of_zone: true,
            event_capacity: 1024,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let moving_speed_kmh = std::env::var("FLEET_MOVING_SPEED_KMH")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.moving_speed_kmh);

        let confirmations = std::env::var("FLEET_CONFIRMATIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.confirmations);

        let offset_minutes = std::env::var("FLEET_OFFSET_MINUTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.offset_minutes);

        let presence_done_percent = std::env::var("FLEET_PRESENCE_DONE_PERCENT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.presence_done_percent);

        let daily_includes_out_of_zone = std::env::var("FLEET_DAILY_INCLUDES_OUT_OF_ZONE")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(defaults.daily_includes_out_of_zone);

        let event_capacity = std::env::var("FLEET_EVENT_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.event_capacity);

        Self {
            moving_speed_kmh,
            confirmations,
            offset_minutes,
            presence_done_percent,
            daily_includes_out_of_zone,
            event_capacity,
        }
    }

    /// Parser configuration derived from this one
    pub fn parser_config(&self) -> ParserConfig {
        ParserConfig {
            moving_threshold_kmh: self.moving_speed_kmh,
            offset_minutes: self.offset_minutes,
        }
    }
}
