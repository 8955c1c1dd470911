//! # Fleet Protocol
//!
//! Parser for raw device transmissions. One batch is a JSON array of
//! delimited transmission strings; the parser normalizes every well-formed
//! entry into a [`NormalizedReport`], drops malformed entries silently,
//! filters to the current calendar day, and returns the survivors sorted
//! by timestamp.
//!
//! Field order of one transmission (fixed, preserved bit-for-bit):
//! `header, latitudeNMEA, longitudeNMEA, altitude/unused, date(yyMMdd),
//! time(HHmmss), speed, unused, ignitionStatus, eastWestIndex,
//! northSouthIndex, deviceId`

use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::debug;

use fleet_core::{DeviceId, GeoPoint, Heading, NormalizedReport, PowerStatus};

pub mod error;

pub use error::{ProtocolError, ProtocolResult};

/// Number of comma-delimited fields in one transmission
const FIELD_COUNT: usize = 12;

/// Parser configuration
#[derive(Debug, Clone, Copy)]
pub struct ParserConfig {
    /// Speed below this is classified as stopped (km/h); shared with the
    /// sustained-movement thresholds of the state machine
    pub moving_threshold_kmh: f64,
    /// Fixed local-time offset applied to device timestamps (minutes)
    pub offset_minutes: i64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            moving_threshold_kmh: 2.0,
            offset_minutes: 210, // +03:30
        }
    }
}

/// Result of parsing one batch
#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    /// Surviving reports, ascending by timestamp
    pub reports: Vec<NormalizedReport>,
    /// Entries dropped for a field-format mismatch
    pub malformed: usize,
    /// Entries dropped because their date is not the current day
    pub stale: usize,
}

/// Parser for raw transmission batches
#[derive(Debug, Clone, Default)]
pub struct ReportParser {
    config: ParserConfig,
}

impl ReportParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parse one raw batch into normalized reports.
    ///
    /// `today` is the current calendar day in device-local time; entries
    /// whose (offset-adjusted) date differs are dropped. Pure transform:
    /// no side effects beyond the returned value.
    pub fn parse_batch(&self, raw: &str, today: NaiveDate) -> ProtocolResult<ParsedBatch> {
        let entries: Vec<String> = serde_json::from_str(raw)?;

        let mut batch = ParsedBatch::default();
        for entry in &entries {
            let Some(report) = self.parse_entry(entry) else {
                debug!(entry = %entry, "dropping malformed transmission entry");
                batch.malformed += 1;
                continue;
            };

            if report.timestamp.date() != today {
                debug!(
                    device = %report.device_id,
                    date = %report.timestamp.date(),
                    "dropping transmission outside the current day"
                );
                batch.stale += 1;
                continue;
            }

            batch.reports.push(report);
        }

        // Stable sort keeps original order for equal timestamps
        batch.reports.sort_by_key(|r| r.timestamp);

        Ok(batch)
    }

    /// Parse one transmission string; `None` means the entry is dropped
    fn parse_entry(&self, raw: &str) -> Option<NormalizedReport> {
        let fields: Vec<&str> = raw.split(',').collect();
        if fields.len() != FIELD_COUNT {
            return None;
        }

        let lat_nmea: f64 = fields[1].trim().parse().ok()?;
        let lon_nmea: f64 = fields[2].trim().parse().ok()?;
        let coordinate = GeoPoint::from_nmea(lat_nmea, lon_nmea).ok()?;

        let date = NaiveDate::parse_from_str(fields[4].trim(), "%y%m%d").ok()?;
        let time = NaiveTime::parse_from_str(fields[5].trim(), "%H%M%S").ok()?;
        let timestamp = date.and_time(time) + Duration::minutes(self.config.offset_minutes);

        let speed: f64 = fields[6].trim().parse().ok()?;
        if speed < 0.0 {
            return None;
        }

        let status = match fields[8].trim() {
            "1" => PowerStatus::On,
            _ => PowerStatus::Off,
        };
        let east_west: u8 = fields[9].trim().parse().ok()?;
        let north_south: u8 = fields[10].trim().parse().ok()?;

        let device_id = fields[11].trim();
        if device_id.is_empty() {
            return None;
        }

        Some(NormalizedReport {
            device_id: DeviceId::new(device_id),
            coordinate,
            speed,
            status,
            direction: Heading::new(east_west, north_south),
            is_stopped: speed < self.config.moving_threshold_kmh,
            is_off: status.is_off(),
            is_starting_point: false,
            is_ending_point: false,
            stoppage_secs: 0,
            timestamp,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
