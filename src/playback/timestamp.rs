use crate::config::{CsvTimestamp, TimestampPolicy};
use crate::core::chunk::Row;
use crate::core::time::parse_with_format;
use crate::error::DecodeError;
use chrono::{DateTime, Duration, FixedOffset};
use serde_json::Value;
use tracing::{debug, warn};

/// Timestamps produced for one chunk
#[derive(Debug, Clone, PartialEq)]
pub enum Stamps {
    /// Every reading of the chunk shares this instant
    Shared(DateTime<FixedOffset>),
    /// One instant per row in row order; may be empty when the policy
    /// had nothing to work with
    PerRow(Vec<DateTime<FixedOffset>>),
}

/// `len` instants spread evenly over one second starting at `now`
pub fn spread(now: DateTime<FixedOffset>, len: usize) -> Vec<DateTime<FixedOffset>> {
    let step = 1_000_000 / len.max(1) as i64;
    (0..len as i64)
        .map(|k| now + Duration::microseconds(k * step))
        .collect()
}

/// Assigns emission timestamps to rows according to a [`TimestampPolicy`]
///
/// Delta state lives for one file: [`TimestampSynthesizer::begin_file`]
/// must be called whenever a new file (or a replay of the same one) starts.
#[derive(Debug)]
pub struct TimestampSynthesizer {
    policy: TimestampPolicy,
    burst: bool,
    /// Instant assigned to the previous row of the file
    anchor: Option<DateTime<FixedOffset>>,
    /// Fixed sample interval once the first two rows were seen
    delta: Option<Duration>,
    first_source: Option<DateTime<FixedOffset>>,
    /// Last instant handed out, kept across files so replays never go back in time
    last: Option<DateTime<FixedOffset>>,
    warned_missing_column: bool,
}

impl TimestampSynthesizer {
    pub fn new(policy: TimestampPolicy, burst: bool) -> Self {
        Self {
            policy,
            burst,
            anchor: None,
            delta: None,
            first_source: None,
            last: None,
            warned_missing_column: false,
        }
    }

    pub fn policy(&self) -> &TimestampPolicy {
        &self.policy
    }

    pub fn begin_file(&mut self) {
        self.anchor = None;
        self.delta = None;
        self.first_source = None;
        self.warned_missing_column = false;
    }

    /// Sample interval in use, once known
    pub fn delta(&self) -> Option<Duration> {
        self.delta
    }

    /// Produce timestamps for `rows`, taking `now` as the emission instant
    ///
    /// With the move policy the timestamp column is removed from each row.
    pub fn stamp(&mut self, rows: &mut [Row], now: DateTime<FixedOffset>) -> Result<Stamps, DecodeError> {
        if self.burst {
            return Ok(Stamps::Shared(now));
        }

        let stamps = match self.policy.clone() {
            TimestampPolicy::CurrentTime => spread(now, rows.len()),
            TimestampPolicy::CopyCsv(ts) => self.historic(rows, &ts, false)?,
            TimestampPolicy::MoveCsv(ts) => self.historic(rows, &ts, true)?,
            TimestampPolicy::DeltaCsv(ts) => self.delta_stamps(rows, &ts, now)?,
        };
        if let Some(last) = stamps.last() {
            self.last = Some(*last);
        }
        Ok(Stamps::PerRow(stamps))
    }

    fn historic(
        &mut self,
        rows: &mut [Row],
        ts: &CsvTimestamp,
        drop_column: bool,
    ) -> Result<Vec<DateTime<FixedOffset>>, DecodeError> {
        if !self.has_column(rows, ts) {
            return Ok(Vec::new());
        }
        rows.iter_mut()
            .map(|row| {
                let parsed = parse_cell(row.get(&ts.column), &ts.format)?;
                if drop_column {
                    row.shift_remove(&ts.column);
                }
                Ok(parsed)
            })
            .collect()
    }

    fn delta_stamps(
        &mut self,
        rows: &[Row],
        ts: &CsvTimestamp,
        now: DateTime<FixedOffset>,
    ) -> Result<Vec<DateTime<FixedOffset>>, DecodeError> {
        if !self.has_column(rows, ts) {
            return Ok(Vec::new());
        }

        let mut stamps = Vec::with_capacity(rows.len());
        for row in rows {
            if self.delta.is_none() {
                let source = parse_cell(row.get(&ts.column), &ts.format)?;
                match self.first_source {
                    None => self.first_source = Some(source),
                    Some(first) => {
                        let delta = source - first;
                        debug!(delta = ?delta, "sample delta fixed for file");
                        self.delta = Some(delta);
                    }
                }
            }

            let stamp = match self.anchor {
                // first row of the file
                None => match self.last {
                    Some(last) if last >= now => last + Duration::microseconds(1),
                    _ => now,
                },
                Some(anchor) => anchor + self.delta.unwrap_or_else(Duration::zero),
            };
            self.anchor = Some(stamp);
            stamps.push(stamp);
        }
        Ok(stamps)
    }

    fn has_column(&mut self, rows: &[Row], ts: &CsvTimestamp) -> bool {
        let present = rows.first().map_or(true, |row| row.contains_key(&ts.column));
        if !present && !self.warned_missing_column {
            warn!(column = %ts.column, "timestamp column missing; using current time");
            self.warned_missing_column = true;
        }
        present
    }
}

fn parse_cell(value: Option<&Value>, format: &str) -> Result<DateTime<FixedOffset>, DecodeError> {
    let text = match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    parse_with_format(&text, format).ok_or_else(|| DecodeError::Timestamp {
        value: text,
        format: format.to_string(),
    })
}
