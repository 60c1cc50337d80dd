use crate::config::{ColumnMode, HeaderMode, NanPolicy, PlaybackConfig};
use crate::core::chunk::{is_blank, Chunk, FileContext, Row};
use crate::error::DecodeError;
use crate::input::columns::{infer_value, parse_column_specs, ColumnType};
use crate::input::source::open_source;
use csv::{StringRecord, StringRecordsIntoIter};
use serde_json::Value;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Upper bound on rows reserved up front; chunks larger than this grow as read
const MAX_RESERVED_ROWS: usize = 4096;

/// The parts of the playback configuration the decoder needs
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOptions {
    pub header: HeaderMode,
    pub columns: ColumnMode,
    pub chunk_size: usize,
    pub nan_policy: NanPolicy,
}

impl From<&PlaybackConfig> for DecodeOptions {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            header: config.header.clone(),
            columns: config.columns.clone(),
            chunk_size: config.chunk_size,
            nan_policy: config.nan_policy,
        }
    }
}

#[derive(Debug, Clone)]
struct Column {
    /// Position in the file row
    index: usize,
    name: String,
    ty: Option<ColumnType>,
}

enum Layout {
    Fixed { columns: Vec<Column>, width: usize },
    Variable { prefix: String },
}

/// Streams a source file as chunks of decoded rows
///
/// Header handling and column derivation happen in [`ChunkDecoder::open`];
/// rows are only read as chunks are requested. A decoder covers one pass
/// over one file: replaying means opening a new one.
pub struct ChunkDecoder {
    path: PathBuf,
    records: StringRecordsIntoIter<Box<dyn Read + Send>>,
    layout: Layout,
    chunk_size: usize,
    nan_policy: NanPolicy,
    context: Arc<FileContext>,
    /// Records consumed so far, header rows included
    line: u64,
    rows_decoded: u64,
    finished: bool,
}

impl ChunkDecoder {
    pub fn open(path: &Path, options: &DecodeOptions, generation: u64) -> Result<Self, DecodeError> {
        let source = open_source(path)?;

        // column specs are checked against the file being opened, not at validation
        let specs = match &options.columns {
            ColumnMode::Explicit(tokens) => Some(parse_column_specs(tokens)?),
            _ => None,
        };

        let records = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(source)
            .into_records();

        let mut decoder = Self {
            path: path.to_path_buf(),
            records,
            layout: Layout::Variable {
                prefix: String::new(),
            },
            chunk_size: options.chunk_size.max(1),
            nan_policy: options.nan_policy,
            context: Arc::new(FileContext::new(path, generation, None)),
            line: 0,
            rows_decoded: 0,
            finished: false,
        };

        let metadata = match &options.header {
            HeaderMode::None => None,
            HeaderMode::Skip(rows) => {
                for _ in 0..*rows {
                    if decoder.next_record()?.is_none() {
                        break;
                    }
                }
                None
            }
            HeaderMode::Fold { rows, key } => Some(decoder.fold_rows(*rows, key)?),
        };

        decoder.layout = match &options.columns {
            ColumnMode::Variable { prefix } => Layout::Variable {
                prefix: prefix.clone(),
            },
            ColumnMode::Inferred => decoder.header_layout(0)?,
            ColumnMode::HeaderRow(index) => decoder.header_layout(*index)?,
            ColumnMode::Explicit(_) => {
                // the file's own header row is replaced by the configured names
                let header = decoder.require_record()?;
                let specs = specs.unwrap_or_default();
                let columns = specs
                    .into_iter()
                    .enumerate()
                    .filter(|(_, spec)| spec.is_selected())
                    .map(|(index, spec)| Column {
                        index,
                        name: spec.name,
                        ty: spec.ty,
                    })
                    .collect();
                Layout::Fixed {
                    columns,
                    width: header.len(),
                }
            }
        };

        decoder.context = Arc::new(FileContext::new(path, generation, metadata));
        debug!(path = %decoder.path.display(), generation, "opened source file");
        Ok(decoder)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn context(&self) -> &Arc<FileContext> {
        &self.context
    }

    /// Data rows decoded so far
    pub fn rows_decoded(&self) -> u64 {
        self.rows_decoded
    }

    /// Next batch of rows, or `None` once the file is exhausted
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, DecodeError> {
        if self.finished {
            return Ok(None);
        }
        let result = if matches!(self.layout, Layout::Variable { .. }) {
            self.next_variable_chunk()
        } else {
            self.next_fixed_chunk()
        };
        if result.is_err() {
            self.finished = true;
        }
        result
    }

    fn next_fixed_chunk(&mut self) -> Result<Option<Chunk>, DecodeError> {
        let mut rows = Vec::with_capacity(self.chunk_size.min(MAX_RESERVED_ROWS));
        while rows.len() < self.chunk_size {
            let Some(record) = self.next_record()? else {
                self.finished = true;
                break;
            };
            if record.len() == 1 && record[0].is_empty() {
                continue;
            }
            rows.push(self.fixed_row(&record)?);
        }
        if rows.is_empty() {
            return Ok(None);
        }
        self.rows_decoded += rows.len() as u64;
        self.check_blanks(&rows)?;
        Ok(Some(Chunk::new(rows, self.context.clone())))
    }

    /// Every row is its own chunk, named after the values it actually has
    fn next_variable_chunk(&mut self) -> Result<Option<Chunk>, DecodeError> {
        let Some(record) = self.next_record()? else {
            self.finished = true;
            return Ok(None);
        };
        let Layout::Variable { prefix } = &self.layout else {
            return Ok(None);
        };

        // trailing empties only pad a short row; a gap before a value is missing data
        if self.nan_policy == NanPolicy::Report {
            let last_value = record.iter().collect::<Vec<_>>().iter().rposition(|cell| !cell.trim().is_empty());
            let gap = record.iter().position(|cell| cell.trim().is_empty());
            if let (Some(gap), Some(last_value)) = (gap, last_value) {
                if gap < last_value {
                    return Err(DecodeError::MissingValues {
                        path: self.path.clone(),
                        column: format!("{}_{}", prefix, gap + 1),
                    });
                }
            }
        }

        let row: Row = record
            .iter()
            .filter(|cell| !cell.trim().is_empty())
            .enumerate()
            .map(|(i, cell)| (format!("{}_{}", prefix, i + 1), infer_value(cell)))
            .collect();

        if row.is_empty() {
            debug!(path = %self.path.display(), line = self.line, "row without values");
            return Ok(Some(Chunk::new(Vec::new(), self.context.clone())));
        }
        self.rows_decoded += 1;
        Ok(Some(Chunk::new(vec![row], self.context.clone())))
    }

    fn fixed_row(&self, record: &StringRecord) -> Result<Row, DecodeError> {
        let Layout::Fixed { columns, width } = &self.layout else {
            return Ok(Row::new());
        };
        if record.len() > *width {
            return Err(DecodeError::RowWidth {
                path: self.path.clone(),
                row: self.line,
                found: record.len(),
                expected: *width,
            });
        }
        columns
            .iter()
            .map(|column| {
                let raw = record.get(column.index).unwrap_or("");
                let value = match column.ty {
                    Some(ty) => ty.convert(raw, self.line, &column.name)?,
                    None => infer_value(raw),
                };
                Ok((column.name.clone(), value))
            })
            .collect()
    }

    fn check_blanks(&self, rows: &[Row]) -> Result<(), DecodeError> {
        if self.nan_policy == NanPolicy::Ignore {
            return Ok(());
        }
        let Layout::Fixed { columns, .. } = &self.layout else {
            return Ok(());
        };
        for column in columns {
            let blank = rows
                .iter()
                .any(|row| row.get(&column.name).map_or(true, is_blank));
            if blank {
                return Err(DecodeError::MissingValues {
                    path: self.path.clone(),
                    column: column.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Read the header `skip` rows further down and derive columns from it
    fn header_layout(&mut self, skip: usize) -> Result<Layout, DecodeError> {
        for _ in 0..skip {
            self.require_record()?;
        }
        let header = self.require_record()?;
        let mut seen = HashSet::new();
        let columns = header
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let base = if name.trim().is_empty() {
                    format!("Unnamed: {}", index)
                } else {
                    name.trim().to_string()
                };
                let mut name = base.clone();
                let mut n = 1;
                while !seen.insert(name.clone()) {
                    name = format!("{}.{}", base, n);
                    n += 1;
                }
                Column {
                    index,
                    name,
                    ty: None,
                }
            })
            .collect();
        Ok(Layout::Fixed {
            columns,
            width: header.len(),
        })
    }

    /// Collapse the leading rows into a single text value
    fn fold_rows(&mut self, rows: usize, key: &str) -> Result<Row, DecodeError> {
        let mut lines = Vec::with_capacity(rows);
        for _ in 0..rows {
            let Some(record) = self.next_record()? else {
                warn!(path = %self.path.display(), "file ended inside folded header rows");
                break;
            };
            let cells: Vec<&str> = record.iter().map(str::trim).collect();
            let used = cells.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1);
            lines.push(cells[..used].join(","));
        }
        let mut metadata = Row::new();
        metadata.insert(key.to_string(), Value::String(lines.join("\n")));
        Ok(metadata)
    }

    fn require_record(&mut self) -> Result<StringRecord, DecodeError> {
        self.next_record()?.ok_or_else(|| DecodeError::MissingHeader {
            path: self.path.clone(),
        })
    }

    fn next_record(&mut self) -> Result<Option<StringRecord>, DecodeError> {
        match self.records.next() {
            None => Ok(None),
            Some(Ok(record)) => {
                self.line += 1;
                Ok(Some(record))
            }
            Some(Err(source)) => Err(DecodeError::Csv {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Iterator for ChunkDecoder {
    type Item = Result<Chunk, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn options(chunk_size: usize) -> DecodeOptions {
        DecodeOptions {
            header: HeaderMode::None,
            columns: ColumnMode::Inferred,
            chunk_size,
            nan_policy: NanPolicy::Ignore,
        }
    }

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn collect(decoder: ChunkDecoder) -> Vec<Chunk> {
        decoder.map(|chunk| chunk.unwrap()).collect()
    }

    #[test]
    fn test_chunks_follow_chunk_size() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.csv", "x,y\n1,2\n3,4\n5,6\n7,8\n9,10\n");
        let chunks = collect(ChunkDecoder::open(&path, &options(2), 0).unwrap());
        let sizes: Vec<usize> = chunks.iter().map(Chunk::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(chunks[0].rows()[0]["x"], json!(1));
        assert_eq!(chunks[2].rows()[0]["y"], json!(10));
        assert_eq!(chunks[0].columns(), vec!["x", "y"]);
    }

    #[test]
    fn test_empty_file_fails_before_any_chunk() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "empty.csv", "");
        assert!(matches!(
            ChunkDecoder::open(&path, &options(5), 0),
            Err(DecodeError::EmptyFile { .. })
        ));
    }

    #[test]
    fn test_header_only_file_has_no_chunks() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "h.csv", "x,y\n");
        let mut decoder = ChunkDecoder::open(&path, &options(5), 0).unwrap();
        assert!(decoder.next_chunk().unwrap().is_none());
        assert!(decoder.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_skip_rows_before_header() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "s.csv", "junk\nmore junk\nx,y\n1,2\n");
        let opts = DecodeOptions {
            header: HeaderMode::Skip(2),
            ..options(10)
        };
        let chunks = collect(ChunkDecoder::open(&path, &opts, 0).unwrap());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].rows()[0]["y"], json!(2));
    }

    #[test]
    fn test_folded_rows_become_metadata() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "f.csv", "device,pump-7,\nsite,north,\nx,y\n1,2\n");
        let opts = DecodeOptions {
            header: HeaderMode::Fold {
                rows: 2,
                key: "metadata".to_string(),
            },
            ..options(10)
        };
        let decoder = ChunkDecoder::open(&path, &opts, 3).unwrap();
        let metadata = decoder.context().metadata.clone().unwrap();
        assert_eq!(metadata["metadata"], json!("device,pump-7\nsite,north"));
        assert_eq!(decoder.context().generation, 3);

        let chunks = collect(decoder);
        assert_eq!(chunks[0].rows()[0]["x"], json!(1));
        assert!(chunks[0].source().metadata.is_some());
    }

    #[test]
    fn test_header_from_row_index() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "r.csv", "title\n\"units: m/s\"\nx,y\n1,2\n");
        let opts = DecodeOptions {
            columns: ColumnMode::HeaderRow(2),
            ..options(10)
        };
        let chunks = collect(ChunkDecoder::open(&path, &opts, 0).unwrap());
        assert_eq!(chunks[0].columns(), vec!["x", "y"]);
    }

    #[test]
    fn test_explicit_columns_rename_select_and_type() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "e.csv", "a,b,c\n1,2,3\n4,5,6\n");
        let opts = DecodeOptions {
            columns: ColumnMode::Explicit(vec!["first:float".into(), "".into(), "third:str".into()]),
            ..options(10)
        };
        let chunks = collect(ChunkDecoder::open(&path, &opts, 0).unwrap());
        let row = &chunks[0].rows()[1];
        assert_eq!(row.len(), 2);
        assert_eq!(row["first"], json!(4.0));
        assert_eq!(row["third"], json!("6"));
    }

    #[test]
    fn test_bad_column_type_fails_on_open() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "e.csv", "a\n1\n");
        let opts = DecodeOptions {
            columns: ColumnMode::Explicit(vec!["a:complex".into()]),
            ..options(10)
        };
        assert!(matches!(
            ChunkDecoder::open(&path, &opts, 0),
            Err(DecodeError::UnknownColumnType { .. })
        ));
    }

    #[test]
    fn test_bad_typed_cell_ends_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "e.csv", "a\n1\nx\n");
        let opts = DecodeOptions {
            columns: ColumnMode::Explicit(vec!["a:int".into()]),
            ..options(10)
        };
        let mut decoder = ChunkDecoder::open(&path, &opts, 0).unwrap();
        assert!(matches!(
            decoder.next_chunk(),
            Err(DecodeError::CellType { row: 3, .. })
        ));
        assert!(decoder.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_short_rows_fill_null_long_rows_fail() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "w.csv", "x,y\n1\n1,2,3\n");
        let mut decoder = ChunkDecoder::open(&path, &options(1), 0).unwrap();
        let first = decoder.next_chunk().unwrap().unwrap();
        assert_eq!(first.rows()[0]["y"], Value::Null);
        assert!(matches!(
            decoder.next_chunk(),
            Err(DecodeError::RowWidth { found: 3, expected: 2, .. })
        ));
    }

    #[test]
    fn test_variable_rows_are_single_row_chunks() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "v.csv", "1,2,3\n4,,5\n,,\n7\n");
        let opts = DecodeOptions {
            columns: ColumnMode::Variable {
                prefix: "ch".to_string(),
            },
            ..options(100)
        };
        let chunks = collect(ChunkDecoder::open(&path, &opts, 0).unwrap());
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].columns(), vec!["ch_1", "ch_2", "ch_3"]);
        assert_eq!(chunks[1].rows()[0]["ch_2"], json!(5));
        assert!(chunks[2].is_empty());
        assert_eq!(chunks[3].columns(), vec!["ch_1"]);
    }

    #[test]
    fn test_blank_cells_reported() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "n.csv", "x,y\n1,2\n3, \n");
        let opts = DecodeOptions {
            nan_policy: NanPolicy::Report,
            ..options(10)
        };
        let mut decoder = ChunkDecoder::open(&path, &opts, 0).unwrap();
        let err = decoder.next_chunk().unwrap_err();
        assert!(err.is_data_quality());
        assert!(matches!(err, DecodeError::MissingValues { ref column, .. } if column == "y"));
    }

    #[test]
    fn test_variable_interior_blank_reported() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "v.csv", "1,2,\n4,,5\n");
        let opts = DecodeOptions {
            columns: ColumnMode::Variable {
                prefix: "ch".to_string(),
            },
            nan_policy: NanPolicy::Report,
            ..options(100)
        };
        let mut decoder = ChunkDecoder::open(&path, &opts, 0).unwrap();
        // a trailing empty is just a short row
        assert_eq!(decoder.next_chunk().unwrap().unwrap().columns(), vec!["ch_1", "ch_2"]);
        let err = decoder.next_chunk().unwrap_err();
        assert!(matches!(err, DecodeError::MissingValues { ref column, .. } if column == "ch_2"));
    }

    #[test]
    fn test_huge_chunk_size_on_small_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "big.csv", "x\n1\n2\n");
        // one hour of bursts at a megahertz
        let chunks = collect(ChunkDecoder::open(&path, &options(3_600_000_000), 0).unwrap());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 2);
    }

    #[test]
    fn test_blank_cells_pass_when_ignored() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "n.csv", "x,y\n1,\n");
        let chunks = collect(ChunkDecoder::open(&path, &options(10), 0).unwrap());
        assert_eq!(chunks[0].rows()[0]["y"], Value::Null);
    }

    #[test]
    fn test_duplicate_and_blank_header_names() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "d.csv", "x,x,\n1,2,3\n");
        let chunks = collect(ChunkDecoder::open(&path, &options(10), 0).unwrap());
        assert_eq!(chunks[0].columns(), vec!["x", "x.1", "Unnamed: 2"]);
    }
}
