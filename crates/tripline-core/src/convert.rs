//! Delimited text (optionally gzipped) → Parquet.
//!
//! The whole source is decoded into memory before re-encoding. Monthly
//! extracts are bounded in size, so no row streaming happens here.

use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use flate2::read::MultiGzDecoder;

use crate::sink::ParquetSink;

/// Default number of rows per decoded `RecordBatch`.
pub const DEFAULT_BATCH_SIZE: usize = 64 * 1024;

/// How the source bytes are wrapped on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCompression {
    Gzip,
    None,
}

impl SourceCompression {
    /// Guess from the file name (`.gz` → gzip)
    pub fn from_file_name(name: &str) -> Self {
        if name.ends_with(".gz") {
            Self::Gzip
        } else {
            Self::None
        }
    }
}

#[derive(Debug)]
pub enum ConvertError {
    /// Malformed, truncated or empty input
    Parse(String),
    /// Writing the columnar output failed (disk full, ...)
    Encode(io::Error),
}

impl std::fmt::Display for ConvertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
            Self::Encode(e) => write!(f, "encode error: {e}"),
        }
    }
}

impl std::error::Error for ConvertError {}

impl ConvertError {
    fn parse(source: &Path, e: impl std::fmt::Display) -> Self {
        Self::Parse(format!("{}: {e}", source.display()))
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

/// One decoded source file, columns in source header order.
///
/// Types are whatever the CSV sniffing found; no schema is imposed.
#[derive(Debug, Clone)]
pub struct TabularDataset {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl TabularDataset {
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema.fields().iter().map(|f| f.name().as_str()).collect()
    }
}

/// Result of one conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertStats {
    pub rows: usize,
    pub columns: usize,
    pub output_bytes: u64,
}

/// Re-encodes a local source file as a columnar file at `output`.
pub trait Converter {
    fn convert(
        &self,
        source: &Path,
        compression: SourceCompression,
        output: &Path,
    ) -> Result<ConvertStats, ConvertError>;
}

impl<T: Converter + ?Sized> Converter for &T {
    fn convert(
        &self,
        source: &Path,
        compression: SourceCompression,
        output: &Path,
    ) -> Result<ConvertStats, ConvertError> {
        (**self).convert(source, compression, output)
    }
}

/// Decode the source into memory.
pub fn read_csv(
    source: &Path,
    compression: SourceCompression,
    batch_size: usize,
) -> Result<TabularDataset, ConvertError> {
    let file = File::open(source).map_err(|e| ConvertError::parse(source, e))?;
    let mut bytes = Vec::new();
    let decoded = match compression {
        SourceCompression::Gzip => MultiGzDecoder::new(file).read_to_end(&mut bytes),
        SourceCompression::None => io::BufReader::new(file).read_to_end(&mut bytes),
    };
    decoded.map_err(|e| ConvertError::parse(source, e))?;

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ConvertError::parse(source, "empty input"));
    }

    // Sniff types over every record, the way a dataframe reader would
    let (schema, _) = Format::default()
        .with_header(true)
        .infer_schema(Cursor::new(bytes.as_slice()), None)
        .map_err(|e| ConvertError::parse(source, e))?;
    let schema = Arc::new(schema);

    let batches = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_batch_size(batch_size)
        .build(Cursor::new(bytes.as_slice()))
        .and_then(|reader| reader.collect::<Result<Vec<_>, ArrowError>>())
        .map_err(|e| ConvertError::parse(source, e))?;

    Ok(TabularDataset { schema, batches })
}

/// Encode a dataset as ZSTD-compressed Parquet. Returns rows written.
pub fn write_parquet(
    dataset: &TabularDataset,
    output: &Path,
    zstd_level: i32,
) -> Result<usize, ConvertError> {
    let mut sink =
        ParquetSink::create(output, dataset.schema(), zstd_level).map_err(ConvertError::Encode)?;
    for batch in dataset.batches() {
        sink.write_batch(batch).map_err(ConvertError::Encode)?;
    }
    sink.finalize().map_err(ConvertError::Encode)
}

/// CSV → Parquet converter
#[derive(Debug, Clone)]
pub struct CsvToParquet {
    zstd_level: i32,
    batch_size: usize,
}

impl CsvToParquet {
    pub fn new(zstd_level: i32) -> Self {
        Self {
            zstd_level,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl Default for CsvToParquet {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Converter for CsvToParquet {
    fn convert(
        &self,
        source: &Path,
        compression: SourceCompression,
        output: &Path,
    ) -> Result<ConvertStats, ConvertError> {
        let dataset = read_csv(source, compression, self.batch_size)?;
        let columns = dataset.schema().fields().len();
        log::debug!(
            "{}: decoded {} rows x {columns} columns",
            source.display(),
            dataset.num_rows()
        );

        let rows = write_parquet(&dataset, output, self.zstd_level)?;
        let output_bytes = fs::metadata(output).map_err(ConvertError::Encode)?.len();

        Ok(ConvertStats {
            rows,
            columns,
            output_bytes,
        })
    }
}
