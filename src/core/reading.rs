use crate::core::chunk::Row;
use chrono::{DateTime, FixedOffset, SecondsFormat, TimeZone};
use serde::{Deserialize, Serialize};

/// One timestamped, asset-tagged data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Asset the reading belongs to
    pub asset: String,

    /// ISO-8601 timestamp with offset, microsecond precision
    pub timestamp: String,

    /// Column values of the row
    pub readings: Row,
}

impl Reading {
    pub fn new<Tz: TimeZone>(asset: &str, timestamp: &DateTime<Tz>, readings: Row) -> Self {
        Self {
            asset: asset.to_string(),
            timestamp: format_timestamp(timestamp),
            readings,
        }
    }

    /// Parse the timestamp back into an instant
    pub fn instant(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.timestamp).ok()
    }
}

/// What a single sink call receives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// Continuous mode: one reading per call
    Single(Reading),
    /// Burst mode: all readings of a chunk in one call
    Burst(Vec<Reading>),
}

impl Payload {
    /// Number of readings carried
    pub fn len(&self) -> usize {
        match self {
            Payload::Single(_) => 1,
            Payload::Burst(readings) => readings.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn readings(&self) -> &[Reading] {
        match self {
            Payload::Single(reading) => std::slice::from_ref(reading),
            Payload::Burst(readings) => readings,
        }
    }
}

pub fn format_timestamp<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> String {
    timestamp
        .fixed_offset()
        .to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_timestamp_keeps_offset_and_micros() {
        let ts = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 1).unwrap();
        assert_eq!(format_timestamp(&ts), "2021-01-01T00:00:01.000000+00:00");
    }

    #[test]
    fn test_payload_serializes_untagged() {
        let ts = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let mut row = Row::new();
        row.insert("x".into(), json!(1.5));
        let reading = Reading::new("pump", &ts, row);

        let single = serde_json::to_value(Payload::Single(reading.clone())).unwrap();
        assert_eq!(single["asset"], "pump");
        assert_eq!(single["readings"]["x"], 1.5);

        let burst = serde_json::to_value(Payload::Burst(vec![reading.clone(), reading])).unwrap();
        assert_eq!(burst.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_instant_round_trips() {
        let ts = Utc.with_ymd_and_hms(2022, 6, 1, 12, 30, 0).unwrap();
        let reading = Reading::new("a", &ts, Row::new());
        assert_eq!(reading.instant().unwrap(), ts.fixed_offset());
    }
}
