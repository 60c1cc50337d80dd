use crate::config::PlaybackConfig;
use crate::core::{Chunk, Payload, Reading, Row};
use crate::error::DecodeError;
use crate::playback::timestamp::{spread, Stamps, TimestampSynthesizer};
use chrono::{DateTime, FixedOffset, Local};

/// Turns chunks into the payloads handed to the sink
pub struct ReadingAssembler {
    asset: String,
    burst: bool,
    synthesizer: TimestampSynthesizer,
    /// Generation of the file the last chunk came from
    generation: Option<u64>,
}

impl ReadingAssembler {
    pub fn new(config: &PlaybackConfig) -> Self {
        let burst = config.is_burst();
        Self {
            asset: config.asset_name.clone(),
            burst,
            synthesizer: TimestampSynthesizer::new(config.timestamp.clone(), burst),
            generation: None,
        }
    }

    /// Assemble a chunk using the current time as emission instant
    pub fn assemble(&mut self, chunk: Chunk) -> Result<Vec<Payload>, DecodeError> {
        self.assemble_at(chunk, Local::now().fixed_offset())
    }

    /// Burst mode yields a single array payload; continuous mode one payload per row
    pub fn assemble_at(
        &mut self,
        chunk: Chunk,
        now: DateTime<FixedOffset>,
    ) -> Result<Vec<Payload>, DecodeError> {
        let (mut rows, source) = chunk.into_parts();
        if self.generation != Some(source.generation) {
            self.synthesizer.begin_file();
            self.generation = Some(source.generation);
        }
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let stamps = self.synthesizer.stamp(&mut rows, now)?;
        if let Some(metadata) = &source.metadata {
            for row in rows.iter_mut() {
                merge_metadata(row, metadata);
            }
        }

        let stamps = match stamps {
            Stamps::Shared(ts) => vec![ts; rows.len()],
            Stamps::PerRow(stamps) if stamps.len() >= rows.len() => stamps,
            Stamps::PerRow(mut stamps) => {
                // fill whatever the policy could not provide
                let fallback = spread(now, rows.len());
                stamps.extend_from_slice(&fallback[stamps.len()..]);
                stamps
            }
        };

        let readings = rows
            .into_iter()
            .zip(stamps)
            .map(|(row, ts)| Reading::new(&self.asset, &ts, row));

        Ok(if self.burst {
            vec![Payload::Burst(readings.collect())]
        } else {
            readings.map(Payload::Single).collect()
        })
    }
}

/// Stamp metadata into a row; row values win on key collisions
fn merge_metadata(row: &mut Row, metadata: &Row) {
    for (key, value) in metadata {
        if !row.contains_key(key) {
            row.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlaybackConfig, RawConfig};
    use crate::core::FileContext;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    fn config(overrides: RawConfig) -> PlaybackConfig {
        PlaybackConfig::from_raw(&RawConfig {
            csv_directory: "/tmp".to_string(),
            csv_filename: "x".to_string(),
            ..overrides
        })
        .unwrap()
    }

    fn chunk(values: &[i64], generation: u64, metadata: Option<Row>) -> Chunk {
        let rows = values
            .iter()
            .map(|v| {
                let mut row = Row::new();
                row.insert("value".into(), json!(v));
                row.insert("ts".into(), json!(format!("2021-01-01T00:00:0{}", v)));
                row
            })
            .collect();
        Chunk::new(rows, Arc::new(FileContext::new("f.csv", generation, metadata)))
    }

    fn now() -> DateTime<FixedOffset> {
        chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().fixed_offset()
    }

    #[test]
    fn test_burst_yields_one_payload_with_shared_timestamp() {
        let mut assembler = ReadingAssembler::new(&config(RawConfig::default()));
        let payloads = assembler.assemble_at(chunk(&[1, 2, 3], 0, None), now()).unwrap();
        assert_eq!(payloads.len(), 1);
        let readings = payloads[0].readings();
        assert_eq!(readings.len(), 3);
        assert!(readings.iter().all(|r| r.timestamp == readings[0].timestamp));
        assert!(readings.iter().all(|r| r.asset == "vibration"));
    }

    #[test]
    fn test_continuous_yields_one_payload_per_row() {
        let mut assembler = ReadingAssembler::new(&config(RawConfig {
            ingest_mode: "continuous".to_string(),
            ..RawConfig::default()
        }));
        let payloads = assembler.assemble_at(chunk(&[1, 2], 0, None), now()).unwrap();
        assert_eq!(payloads.len(), 2);
        assert!(matches!(payloads[0], Payload::Single(_)));
        assert_ne!(payloads[0].readings()[0].timestamp, payloads[1].readings()[0].timestamp);
        assert_eq!(payloads[1].readings()[0].readings["value"], json!(2));
    }

    #[test]
    fn test_metadata_stamped_into_every_row() {
        let mut metadata = Row::new();
        metadata.insert("metadata".into(), json!("site,north"));
        metadata.insert("value".into(), json!("shadowed"));

        let mut assembler = ReadingAssembler::new(&config(RawConfig::default()));
        let payloads = assembler
            .assemble_at(chunk(&[1, 2], 0, Some(metadata)), now())
            .unwrap();
        for reading in payloads[0].readings() {
            assert_eq!(reading.readings["metadata"], json!("site,north"));
            assert_ne!(reading.readings["value"], json!("shadowed"));
        }
    }

    #[test]
    fn test_missing_timestamp_column_falls_back_to_spread() {
        let mut assembler = ReadingAssembler::new(&config(RawConfig {
            ingest_mode: "continuous".to_string(),
            timestamp_style: "copy csv value".to_string(),
            timestamp_col: "absent".to_string(),
            ..RawConfig::default()
        }));
        let payloads = assembler.assemble_at(chunk(&[1, 2], 0, None), now()).unwrap();
        let first = payloads[0].readings()[0].instant().unwrap();
        let second = payloads[1].readings()[0].instant().unwrap();
        assert_eq!(first, now());
        assert_eq!(second - first, chrono::Duration::milliseconds(500));
    }

    #[test]
    fn test_delta_resets_on_new_generation() {
        let mut assembler = ReadingAssembler::new(&config(RawConfig {
            ingest_mode: "continuous".to_string(),
            timestamp_style: "use csv sample delta".to_string(),
            timestamp_col: "ts".to_string(),
            timestamp_format: "%Y-%m-%dT%H:%M:%S".to_string(),
            ..RawConfig::default()
        }));
        let first = assembler.assemble_at(chunk(&[1, 3], 0, None), now()).unwrap();
        let gap = first[1].readings()[0].instant().unwrap() - first[0].readings()[0].instant().unwrap();
        assert_eq!(gap, chrono::Duration::seconds(2));

        let later = now() + chrono::Duration::hours(1);
        let second = assembler.assemble_at(chunk(&[1, 2], 1, None), later).unwrap();
        let start = second[0].readings()[0].instant().unwrap();
        let gap = second[1].readings()[0].instant().unwrap() - start;
        assert_eq!(start, later);
        assert_eq!(gap, chrono::Duration::seconds(1));
    }

    #[test]
    fn test_empty_chunk_yields_nothing() {
        let mut assembler = ReadingAssembler::new(&config(RawConfig::default()));
        assert!(assembler.assemble_at(chunk(&[], 0, None), now()).unwrap().is_empty());
    }
}
