//! Tripline TLC - NYC taxi trip records to an object store
//!
//! Moves monthly trip-record extracts from the public archive into a bucket
//! as Parquet, one file at a time, followed by the zone lookup table.
//!
//! # Example
//!
//! ```ignore
//! use tripline_core::{CsvToParquet, HttpConfig, HttpFetcher, ObjectStoreUploader, ScratchSpace, StoreBackend};
//! use tripline_tlc::{Pipeline, RunConfig, run};
//!
//! let config = RunConfig::new("my-bucket");
//! let pipeline = Pipeline::new(
//!     HttpFetcher::new(HttpConfig::default())?,
//!     CsvToParquet::default(),
//!     ObjectStoreUploader::new(StoreBackend::Gcs { credential_path: "sa.json".into() }),
//!     ScratchSpace::new(&config.scratch_dir),
//! );
//! let summary = run(&config, &pipeline)?;
//! println!("{} done, {} skipped", summary.done, summary.skipped);
//! ```

pub mod config;
pub mod pipeline;
pub mod runner;
pub mod work_item;

// Re-exports
pub use config::{RunConfig, Selection};
pub use pipeline::{ItemError, ItemReport, ItemState, Outcome, Pipeline};
pub use runner::{Summary, run};
pub use work_item::{Job, LookupTable, Service, WorkItem};
