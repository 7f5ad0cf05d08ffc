//! Per-file state machine: download → convert → upload → cleanup.
//!
//! ```text
//! Pending → Downloading → Converting → Uploading → CleaningUp → Done
//!               │              │            │           ↑
//!               └──────────────┴────────────┴───────────┘ → Skipped | Failed
//! ```
//!
//! Every route passes through `CleaningUp`, where the item's scratch scope is
//! swept. The one exception to removal is the converted file of a failed
//! upload: it stays on disk for operator recovery and is reported in the
//! outcome.

use std::io;
use std::path::{Path, PathBuf};

use tripline_core::{
    ConvertError, Converter, FetchError, Fetcher, RemoteObjectRef, ScratchRole, ScratchScope,
    ScratchSpace, Uploader,
};

use crate::work_item::Job;

/// States an item passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Downloading,
    Converting,
    Uploading,
    CleaningUp,
    Done,
    Skipped,
    Failed,
}

impl ItemState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Skipped | Self::Failed)
    }
}

/// Why an item ended `Failed`
#[derive(Debug)]
pub enum ItemError {
    /// Transport fault or scratch write failure during download
    Fetch(FetchError),
    Convert(ConvertError),
    /// Store did not acknowledge the write; the converted file was kept
    Upload { retained: PathBuf },
    /// Scratch bookkeeping failed (stale file could not be removed, ...)
    Scratch(io::Error),
    /// A component panicked
    Panic(String),
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "download failed: {e}"),
            Self::Convert(e) => write!(f, "conversion failed: {e}"),
            Self::Upload { retained } => {
                write!(f, "upload failed, kept {}", retained.display())
            }
            Self::Scratch(e) => write!(f, "scratch space: {e}"),
            Self::Panic(msg) => write!(f, "panicked: {msg}"),
        }
    }
}

impl std::error::Error for ItemError {}

/// Terminal result of one item
#[derive(Debug)]
pub enum Outcome {
    Done {
        rows: usize,
        destination: RemoteObjectRef,
    },
    /// The archive has no file for this item
    Skipped { url: String },
    Failed(ItemError),
}

impl Outcome {
    pub fn state(&self) -> ItemState {
        match self {
            Self::Done { .. } => ItemState::Done,
            Self::Skipped { .. } => ItemState::Skipped,
            Self::Failed(_) => ItemState::Failed,
        }
    }
}

/// What happened to one item, with the states it went through
#[derive(Debug)]
pub struct ItemReport {
    pub label: String,
    pub outcome: Outcome,
    pub trace: Vec<ItemState>,
}

impl ItemReport {
    pub fn state(&self) -> ItemState {
        self.outcome.state()
    }

    /// Local file left behind on purpose (failed upload)
    pub fn retained(&self) -> Option<&Path> {
        match &self.outcome {
            Outcome::Failed(ItemError::Upload { retained }) => Some(retained),
            _ => None,
        }
    }

    /// Report for an item whose processing panicked
    pub fn panicked(label: &str, msg: String) -> Self {
        Self {
            label: label.to_string(),
            outcome: Outcome::Failed(ItemError::Panic(msg)),
            trace: vec![ItemState::Pending, ItemState::Failed],
        }
    }
}

/// Next transition
enum Step {
    Download,
    Convert(PathBuf),
    Upload { output: PathBuf, rows: usize },
    CleanUp(Outcome),
    Finish(Outcome),
}

/// Drives jobs through fetcher, converter and uploader, one at a time
pub struct Pipeline<F, C, U> {
    fetcher: F,
    converter: C,
    uploader: U,
    scratch: ScratchSpace,
}

impl<F: Fetcher, C: Converter, U: Uploader> Pipeline<F, C, U> {
    pub fn new(fetcher: F, converter: C, uploader: U, scratch: ScratchSpace) -> Self {
        Self {
            fetcher,
            converter,
            uploader,
            scratch,
        }
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    /// Resolve one job to `Done`, `Skipped` or `Failed`. Never returns early:
    /// every error becomes an outcome.
    pub fn process(&self, job: &Job) -> ItemReport {
        let mut scope = self.scratch.scope(&job.label);
        let mut trace = vec![ItemState::Pending];
        let mut step = Step::Download;

        let outcome = loop {
            step = match step {
                Step::Download => {
                    trace.push(ItemState::Downloading);
                    self.download(job, &mut scope)
                }
                Step::Convert(raw) => {
                    trace.push(ItemState::Converting);
                    self.convert(job, &raw, &mut scope)
                }
                Step::Upload { output, rows } => {
                    trace.push(ItemState::Uploading);
                    self.upload(job, output, rows)
                }
                Step::CleanUp(outcome) => {
                    trace.push(ItemState::CleaningUp);
                    clean_up(job, outcome, &mut scope)
                }
                Step::Finish(outcome) => break outcome,
            };
        };
        trace.push(outcome.state());

        match &outcome {
            Outcome::Done { rows, destination } => {
                log::info!("{}: done ({rows} rows -> {destination})", job.label)
            }
            Outcome::Skipped { .. } => log::debug!("{}: skipped", job.label),
            Outcome::Failed(e) => log::debug!("{}: failed: {e}", job.label),
        }

        ItemReport {
            label: job.label.clone(),
            outcome,
            trace,
        }
    }

    fn download(&self, job: &Job, scope: &mut ScratchScope<'_>) -> Step {
        let raw = match scope.acquire(ScratchRole::Raw, &job.raw_name) {
            Ok(path) => path,
            Err(e) => return Step::CleanUp(Outcome::Failed(ItemError::Scratch(e))),
        };

        log::info!("{}: downloading {}", job.label, job.url);
        match self.fetcher.fetch(&job.url, &raw) {
            Ok(path) => {
                log::info!("Downloaded: {}", job.raw_name);
                Step::Convert(path)
            }
            Err(e) if e.is_not_found() => {
                // The archive has known gaps; not a fault
                log::warn!(
                    "Could not find data for {} ({e}). Skipping.",
                    job.label
                );
                Step::CleanUp(Outcome::Skipped {
                    url: job.url.clone(),
                })
            }
            Err(e) => {
                log::error!("{}: download failed: {e}", job.label);
                Step::CleanUp(Outcome::Failed(ItemError::Fetch(e)))
            }
        }
    }

    fn convert(&self, job: &Job, raw: &Path, scope: &mut ScratchScope<'_>) -> Step {
        let output = match scope.acquire(ScratchRole::Converted, &job.output_name) {
            Ok(path) => path,
            Err(e) => return Step::CleanUp(Outcome::Failed(ItemError::Scratch(e))),
        };

        log::info!("Converting to Parquet: {}", output.display());
        let stats = match self.converter.convert(raw, job.compression, &output) {
            Ok(stats) => stats,
            Err(e) => {
                log::error!("{}: conversion failed: {e}", job.label);
                return Step::CleanUp(Outcome::Failed(ItemError::Convert(e)));
            }
        };
        log::info!(
            "{}: {} rows x {} columns, {} bytes",
            job.label,
            stats.rows,
            stats.columns,
            stats.output_bytes
        );

        // Only one large artifact on disk while uploading
        if let Err(e) = scope.release(ScratchRole::Raw) {
            log::warn!("{}: could not remove download early: {e}", job.label);
        }

        Step::Upload {
            output,
            rows: stats.rows,
        }
    }

    fn upload(&self, job: &Job, output: PathBuf, rows: usize) -> Step {
        if self.uploader.upload(&output, &job.destination) {
            Step::CleanUp(Outcome::Done {
                rows,
                destination: job.destination.clone(),
            })
        } else {
            Step::CleanUp(Outcome::Failed(ItemError::Upload { retained: output }))
        }
    }
}

/// Sweep the item's scratch files. A failed upload keeps its converted file.
fn clean_up(job: &Job, outcome: Outcome, scope: &mut ScratchScope<'_>) -> Step {
    if let Outcome::Failed(ItemError::Upload { retained }) = &outcome {
        scope.retain(ScratchRole::Converted);
        log::warn!(
            "{}: keeping {} for operator recovery",
            job.label,
            retained.display()
        );
    }
    scope.sweep();
    Step::Finish(outcome)
}
