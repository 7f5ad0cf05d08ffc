//! Tripline Core - plumbing for archive-to-object-store ingestion
//!
//! Each piece sits behind a small trait so a pipeline can be driven with
//! real network and storage, or with in-process fakes in tests.

pub mod convert;
pub mod fetch;
pub mod logging;
pub mod progress;
pub mod scratch;
pub mod sink;
pub mod upload;

// Re-exports for convenience
pub use convert::{
    ConvertError, ConvertStats, Converter, CsvToParquet, SourceCompression, TabularDataset,
};
pub use fetch::{FetchError, Fetcher, HttpConfig, HttpFetcher, SHARED_RUNTIME};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use scratch::{ScratchRole, ScratchScope, ScratchSpace};
pub use sink::{ParquetSink, cleanup_tmp_files};
pub use upload::{ObjectStoreUploader, RemoteObjectRef, StoreBackend, Uploader};
