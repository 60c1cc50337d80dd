//! Playback configuration
//!
//! [`RawConfig`] is the JSON document handed over by the host, with the
//! plugin defaults filled in. [`PlaybackConfig`] is the validated form the
//! engine runs on: string options are resolved into tagged variants once,
//! and the chunk size and pacing period are derived here.

pub mod paths;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use paths::{resolve_directory, DATA_DIR_ALIAS};

pub const MIN_SAMPLE_RATE: i64 = 1;
pub const MAX_SAMPLE_RATE: i64 = 1_000_000;
/// One day
pub const MAX_BURST_INTERVAL_MS: i64 = 86_400_000;
pub const DEFAULT_QUEUE_CAPACITY: usize = 3;
pub const DEFAULT_LOCATOR_POLL_MS: u64 = 2_000;
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S.%f%z";

const TIMESTAMP_STYLES: [&str; 4] = [
    "current time",
    "copy csv value",
    "move csv value",
    "use csv sample delta",
];
const POST_PROCESS_METHODS: [&str; 4] = ["keep", "continue_playing", "delete", "rename"];

/// Configuration document as supplied by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawConfig {
    pub asset_name: String,
    /// Directory to scan; `@data` resolves to the playback data directory
    pub csv_directory: String,
    /// Substring a file name must contain
    pub csv_filename: String,
    /// Exact file to play instead of scanning for a pattern
    pub csv_path: Option<String>,
    /// `none`, `skip` or `fold`
    pub header_mode: String,
    pub header_rows: usize,
    pub metadata_key: String,
    pub header_row_index: Option<usize>,
    /// Comma separated `name[:type]` list
    pub use_columns: String,
    pub variable_columns: bool,
    pub column_prefix: String,
    pub ingest_mode: String,
    pub sample_rate: i64,
    /// Milliseconds between bursts
    pub burst_interval: i64,
    pub timestamp_style: String,
    pub timestamp_col: String,
    pub timestamp_format: String,
    #[serde(rename = "ignoreNaN")]
    pub ignore_nan: String,
    pub repeat_loop: bool,
    pub post_process_method: String,
    pub suffix_name: String,
    pub queue_capacity: usize,
    pub locator_poll_ms: u64,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            asset_name: "vibration".to_string(),
            csv_directory: DATA_DIR_ALIAS.to_string(),
            csv_filename: String::new(),
            csv_path: None,
            header_mode: "none".to_string(),
            header_rows: 0,
            metadata_key: "metadata".to_string(),
            header_row_index: None,
            use_columns: String::new(),
            variable_columns: false,
            column_prefix: "column".to_string(),
            ingest_mode: "burst".to_string(),
            sample_rate: 8000,
            burst_interval: 1000,
            timestamp_style: "current time".to_string(),
            timestamp_col: String::new(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            ignore_nan: "ignore".to_string(),
            repeat_loop: false,
            post_process_method: "keep".to_string(),
            suffix_name: ".done".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            locator_poll_ms: DEFAULT_LOCATOR_POLL_MS,
        }
    }
}

impl RawConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Check every field and cross-field constraint, returning all violations
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.asset_name.trim().is_empty() {
            errors.push("assetName cannot be empty".to_string());
        }

        let has_path = self
            .csv_path
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty());
        match (has_path, self.csv_filename.is_empty()) {
            (true, false) => {
                errors.push("only one of csvPath or csvFilename may be set".to_string())
            }
            (false, true) => errors.push("csv filename cannot be empty".to_string()),
            _ => {}
        }

        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            errors.push(format!(
                "sampleRate should be in range {}-{}",
                MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
            ));
        }
        if self.burst_interval < 1 {
            errors.push("burstInterval should not be less than 1".to_string());
        } else if self.burst_interval > MAX_BURST_INTERVAL_MS {
            errors.push(format!(
                "burstInterval should not be more than {}",
                MAX_BURST_INTERVAL_MS
            ));
        }
        if !matches!(self.ingest_mode.as_str(), "burst" | "continuous") {
            errors.push("ingestMode should be one of ('burst', 'continuous')".to_string());
        }

        match self.header_mode.as_str() {
            "none" => {}
            "skip" | "fold" if self.header_rows == 0 => errors.push(format!(
                "headerRows must be at least 1 for headerMode '{}'",
                self.header_mode
            )),
            "skip" | "fold" => {}
            other => errors.push(format!(
                "headerMode '{}' should be one of ('none', 'skip', 'fold')",
                other
            )),
        }
        if self.header_mode == "fold" && self.metadata_key.trim().is_empty() {
            errors.push("metadataKey cannot be empty when folding header rows".to_string());
        }

        let explicit_columns = !self.use_columns.trim().is_empty();
        if self.variable_columns {
            if explicit_columns {
                errors.push("useColumns cannot be combined with variableColumns".to_string());
            }
            if self.header_row_index.is_some() {
                errors.push("headerRowIndex cannot be combined with variableColumns".to_string());
            }
            if self.column_prefix.trim().is_empty() {
                errors.push("columnPrefix cannot be empty for variableColumns".to_string());
            }
        } else if explicit_columns && self.header_row_index.is_some() {
            errors.push("useColumns cannot be combined with headerRowIndex".to_string());
        }

        if !TIMESTAMP_STYLES.contains(&self.timestamp_style.as_str()) {
            errors.push(format!(
                "timestampStyle should be one of {:?}",
                TIMESTAMP_STYLES
            ));
        } else if self.timestamp_style != "current time" {
            if self.timestamp_col.is_empty() || self.timestamp_format.is_empty() {
                errors.push(
                    "timestamp Column (of csv File) and timestamp Format must be specified"
                        .to_string(),
                );
            }
            if self.ingest_mode == "burst" {
                errors.push(
                    "Historic and delta timestamps are only used in \"continuous\" mode".to_string(),
                );
            }
        }

        if !matches!(self.ignore_nan.as_str(), "ignore" | "report") {
            errors.push("ignoreNaN should be one of ('ignore', 'report')".to_string());
        }

        if !POST_PROCESS_METHODS.contains(&self.post_process_method.as_str()) {
            errors.push(format!(
                "postProcessMethod should be one of {:?}",
                POST_PROCESS_METHODS
            ));
        } else if self.post_process_method == "rename" && self.suffix_name.is_empty() {
            errors.push("suffixName cannot be empty for postProcessMethod 'rename'".to_string());
        }

        if self.queue_capacity == 0 {
            errors.push("queueCapacity must be at least 1".to_string());
        }
        if self.locator_poll_ms == 0 {
            errors.push("locatorPollMs must be at least 1".to_string());
        }

        errors
    }
}

/// Where the source files come from
#[derive(Debug, Clone, PartialEq)]
pub enum FileLocation {
    /// First file (lexicographically) in `directory` whose name contains `pattern`
    Pattern { directory: PathBuf, pattern: String },
    /// A single known file
    Exact(PathBuf),
}

impl FileLocation {
    pub fn directory(&self) -> &Path {
        match self {
            FileLocation::Pattern { directory, .. } => directory,
            FileLocation::Exact(path) => path.parent().unwrap_or_else(|| Path::new(".")),
        }
    }
}

/// What to do with the leading rows of a file
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderMode {
    /// The first row is the column header
    None,
    /// Discard this many rows before the column header
    Skip(usize),
    /// Fold this many rows into one metadata value under `key`
    Fold { rows: usize, key: String },
}

/// How column names are derived
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnMode {
    /// Use the header row
    Inferred,
    /// Use the row at this index (after header handling) as header
    HeaderRow(usize),
    /// `name[:type]` tokens, one per file column; parsed when a file is opened
    Explicit(Vec<String>),
    /// Headerless rows of differing widths, named `prefix_1, prefix_2, ...`
    Variable { prefix: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IngestMode {
    /// A chunk's readings go out together every `interval`
    Burst { interval: Duration },
    /// Readings go out one by one
    Continuous,
}

/// Timestamp column and its strftime format
#[derive(Debug, Clone, PartialEq)]
pub struct CsvTimestamp {
    pub column: String,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimestampPolicy {
    CurrentTime,
    /// Use the file's timestamp and keep the column
    CopyCsv(CsvTimestamp),
    /// Use the file's timestamp and drop the column
    MoveCsv(CsvTimestamp),
    /// Replay the file's first sample interval from the current time
    DeltaCsv(CsvTimestamp),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NanPolicy {
    Ignore,
    Report,
}

/// Disposition of a file once it has been played to the end
#[derive(Debug, Clone, PartialEq)]
pub enum EndOfFileAction {
    /// Reopen and play again
    Replay,
    /// Leave the file and stop playback
    Keep,
    /// Remove the file and look for the next one
    Delete,
    /// Append `suffix` to the file name and look for the next one
    Rename { suffix: String },
}

/// Validated configuration the engine runs on
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    pub asset_name: String,
    pub location: FileLocation,
    pub header: HeaderMode,
    pub columns: ColumnMode,
    pub ingest: IngestMode,
    pub sample_rate: u32,
    pub timestamp: TimestampPolicy,
    pub nan_policy: NanPolicy,
    pub end_of_file: EndOfFileAction,
    /// Rows per chunk
    pub chunk_size: usize,
    /// Burst interval, or one sample period in continuous mode
    pub period: Duration,
    pub queue_capacity: usize,
    pub locator_poll: Duration,
}

impl PlaybackConfig {
    pub fn from_raw(raw: &RawConfig) -> Result<Self, ConfigError> {
        let errors = raw.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }

        let directory = resolve_directory(&raw.csv_directory);
        let location = match raw.csv_path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => {
                let path = PathBuf::from(path);
                FileLocation::Exact(if path.is_absolute() {
                    path
                } else {
                    directory.join(path)
                })
            }
            _ => FileLocation::Pattern {
                directory,
                pattern: raw.csv_filename.clone(),
            },
        };

        let header = match raw.header_mode.as_str() {
            "skip" => HeaderMode::Skip(raw.header_rows),
            "fold" => HeaderMode::Fold {
                rows: raw.header_rows,
                key: raw.metadata_key.clone(),
            },
            _ => HeaderMode::None,
        };

        let columns = if raw.variable_columns {
            ColumnMode::Variable {
                prefix: raw.column_prefix.clone(),
            }
        } else if !raw.use_columns.trim().is_empty() {
            ColumnMode::Explicit(raw.use_columns.split(',').map(|t| t.trim().to_string()).collect())
        } else if let Some(index) = raw.header_row_index {
            ColumnMode::HeaderRow(index)
        } else {
            ColumnMode::Inferred
        };

        // validate() bounds both to positive ranges
        let sample_rate = raw.sample_rate as u32;
        let burst_ms = raw.burst_interval as u64;

        let (ingest, chunk_size, period) = if raw.ingest_mode == "burst" {
            // a burst's worth of samples
            let recs = burst_ms.saturating_mul(sample_rate as u64) / 1000;
            let recs = usize::try_from(recs.max(1)).unwrap_or(usize::MAX);
            let interval = Duration::from_millis(burst_ms);
            (IngestMode::Burst { interval }, recs, interval)
        } else {
            // a second's worth of samples
            let period = Duration::from_nanos(1_000_000_000 / sample_rate as u64);
            (IngestMode::Continuous, sample_rate as usize, period)
        };

        let csv_ts = || CsvTimestamp {
            column: raw.timestamp_col.clone(),
            format: raw.timestamp_format.clone(),
        };
        let timestamp = match raw.timestamp_style.as_str() {
            "copy csv value" => TimestampPolicy::CopyCsv(csv_ts()),
            "move csv value" => TimestampPolicy::MoveCsv(csv_ts()),
            "use csv sample delta" => TimestampPolicy::DeltaCsv(csv_ts()),
            _ => TimestampPolicy::CurrentTime,
        };

        let nan_policy = if raw.ignore_nan == "report" {
            NanPolicy::Report
        } else {
            NanPolicy::Ignore
        };

        let end_of_file = if raw.repeat_loop {
            EndOfFileAction::Replay
        } else {
            match raw.post_process_method.as_str() {
                "continue_playing" => EndOfFileAction::Replay,
                "delete" => EndOfFileAction::Delete,
                "rename" => EndOfFileAction::Rename {
                    suffix: raw.suffix_name.clone(),
                },
                _ => EndOfFileAction::Keep,
            }
        };

        Ok(Self {
            asset_name: raw.asset_name.clone(),
            location,
            header,
            columns,
            ingest,
            sample_rate,
            timestamp,
            nan_policy,
            end_of_file,
            chunk_size,
            period,
            queue_capacity: raw.queue_capacity,
            locator_poll: Duration::from_millis(raw.locator_poll_ms),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Self::from_raw(&RawConfig::from_json(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_raw(&RawConfig::load(path)?)
    }

    pub fn is_burst(&self) -> bool {
        matches!(self.ingest, IngestMode::Burst { .. })
    }

    /// Time one chunk of `rows` rows should take to emit
    ///
    /// A burst is one period regardless of size; in continuous mode every
    /// row is one sample period.
    pub fn chunk_cadence(&self, rows: usize) -> Duration {
        match self.ingest {
            IngestMode::Burst { interval } => interval,
            IngestMode::Continuous => self.period * rows as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawConfig {
        RawConfig {
            csv_directory: "/tmp/playback".to_string(),
            csv_filename: "vibration".to_string(),
            ..RawConfig::default()
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = PlaybackConfig::from_raw(&raw()).unwrap();
        assert!(config.is_burst());
        assert_eq!(config.chunk_size, 8000);
        assert_eq!(config.period, Duration::from_secs(1));
        assert_eq!(config.end_of_file, EndOfFileAction::Keep);
        assert_eq!(config.queue_capacity, 3);
        assert_eq!(config.columns, ColumnMode::Inferred);
    }

    #[test]
    fn test_burst_chunk_size_matches_rate() {
        let config = PlaybackConfig::from_raw(&RawConfig {
            sample_rate: 10,
            burst_interval: 1000,
            ..raw()
        })
        .unwrap();
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.period, Duration::from_millis(1000));

        let config = PlaybackConfig::from_raw(&RawConfig {
            sample_rate: 8000,
            burst_interval: 250,
            ..raw()
        })
        .unwrap();
        assert_eq!(config.chunk_size, 2000);
        let rate = config.chunk_size as f64 / config.period.as_secs_f64();
        assert!((rate - 8000.0).abs() < 1.0);
    }

    #[test]
    fn test_burst_interval_upper_bound() {
        let bad = RawConfig {
            burst_interval: i64::MAX / 1000,
            ..raw()
        };
        assert_eq!(
            bad.validate(),
            vec!["burstInterval should not be more than 86400000".to_string()]
        );
        assert!(matches!(PlaybackConfig::from_raw(&bad), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_largest_burst_at_top_rate() {
        let config = PlaybackConfig::from_raw(&RawConfig {
            sample_rate: MAX_SAMPLE_RATE,
            burst_interval: MAX_BURST_INTERVAL_MS,
            ..raw()
        })
        .unwrap();
        assert_eq!(config.chunk_size as u64, 86_400_000_000);
        assert_eq!(config.period, Duration::from_secs(86_400));
    }

    #[test]
    fn test_burst_chunk_size_never_zero() {
        let config = PlaybackConfig::from_raw(&RawConfig {
            sample_rate: 1,
            burst_interval: 10,
            ..raw()
        })
        .unwrap();
        assert_eq!(config.chunk_size, 1);
    }

    #[test]
    fn test_continuous_period_is_one_sample() {
        let config = PlaybackConfig::from_raw(&RawConfig {
            ingest_mode: "continuous".to_string(),
            sample_rate: 100,
            ..raw()
        })
        .unwrap();
        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.period, Duration::from_millis(10));
        assert_eq!(config.chunk_cadence(100), Duration::from_secs(1));
        assert_eq!(config.chunk_cadence(5), Duration::from_millis(50));
    }

    #[test]
    fn test_errors_are_aggregated() {
        let bad = RawConfig {
            sample_rate: 0,
            burst_interval: 0,
            ingest_mode: "trickle".to_string(),
            ignore_nan: "maybe".to_string(),
            ..raw()
        };
        let errors = bad.validate();
        assert_eq!(errors.len(), 4);

        match PlaybackConfig::from_raw(&bad) {
            Err(ConfigError::Invalid(list)) => assert_eq!(list, errors),
            other => panic!("expected aggregated error, got {:?}", other),
        }
    }

    #[test]
    fn test_historic_timestamps_need_continuous_mode() {
        let bad = RawConfig {
            timestamp_style: "move csv value".to_string(),
            timestamp_col: "ts".to_string(),
            ..raw()
        };
        let errors = bad.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("continuous"));
    }

    #[test]
    fn test_timestamp_column_required() {
        let bad = RawConfig {
            ingest_mode: "continuous".to_string(),
            timestamp_style: "use csv sample delta".to_string(),
            ..raw()
        };
        assert_eq!(bad.validate().len(), 1);
    }

    #[test]
    fn test_timestamp_policy_resolution() {
        let config = PlaybackConfig::from_raw(&RawConfig {
            ingest_mode: "continuous".to_string(),
            timestamp_style: "use csv sample delta".to_string(),
            timestamp_col: "ts".to_string(),
            timestamp_format: "%Y-%m-%dT%H:%M:%S".to_string(),
            ..raw()
        })
        .unwrap();
        assert_eq!(
            config.timestamp,
            TimestampPolicy::DeltaCsv(CsvTimestamp {
                column: "ts".to_string(),
                format: "%Y-%m-%dT%H:%M:%S".to_string(),
            })
        );
    }

    #[test]
    fn test_repeat_loop_forces_replay() {
        let config = PlaybackConfig::from_raw(&RawConfig {
            repeat_loop: true,
            post_process_method: "delete".to_string(),
            ..raw()
        })
        .unwrap();
        assert_eq!(config.end_of_file, EndOfFileAction::Replay);
    }

    #[test]
    fn test_rename_needs_suffix() {
        let bad = RawConfig {
            post_process_method: "rename".to_string(),
            suffix_name: String::new(),
            ..raw()
        };
        assert_eq!(bad.validate().len(), 1);
    }

    #[test]
    fn test_column_modes_are_exclusive() {
        let bad = RawConfig {
            variable_columns: true,
            use_columns: "a,b".to_string(),
            header_row_index: Some(2),
            ..raw()
        };
        assert_eq!(bad.validate().len(), 2);

        let config = PlaybackConfig::from_raw(&RawConfig {
            use_columns: "a:int, ,c".to_string(),
            ..raw()
        })
        .unwrap();
        assert_eq!(
            config.columns,
            ColumnMode::Explicit(vec!["a:int".into(), "".into(), "c".into()])
        );
    }

    #[test]
    fn test_exact_path_relative_to_directory() {
        let config = PlaybackConfig::from_raw(&RawConfig {
            csv_filename: String::new(),
            csv_path: Some("run1.csv".to_string()),
            ..raw()
        })
        .unwrap();
        assert_eq!(
            config.location,
            FileLocation::Exact(PathBuf::from("/tmp/playback/run1.csv"))
        );
    }

    #[test]
    fn test_json_uses_camel_case() {
        let raw = RawConfig::from_json(
            r#"{"assetName": "pump", "csvFilename": "pump", "ingestMode": "continuous",
                "sampleRate": 50, "ignoreNaN": "report", "postProcessMethod": "rename",
                "suffixName": ".played"}"#,
        )
        .unwrap();
        assert_eq!(raw.asset_name, "pump");
        assert_eq!(raw.ignore_nan, "report");
        assert_eq!(raw.burst_interval, 1000);

        let config = PlaybackConfig::from_raw(&raw).unwrap();
        assert_eq!(config.nan_policy, NanPolicy::Report);
        assert_eq!(
            config.end_of_file,
            EndOfFileAction::Rename {
                suffix: ".played".to_string()
            }
        );
    }
}
