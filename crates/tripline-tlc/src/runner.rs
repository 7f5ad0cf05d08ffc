//! Batch orchestration: every monthly file, then the lookup table

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tripline_core::{Converter, Fetcher, Uploader, fmt_num};

use crate::config::RunConfig;
use crate::pipeline::{ItemReport, ItemState, Outcome, Pipeline};
use crate::work_item::Job;

/// Run summary
#[derive(Debug)]
pub struct Summary {
    pub total_items: usize,
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
    pub rows_written: usize,
    /// Converted files kept after failed uploads
    pub retained: Vec<PathBuf>,
    /// One report per item, in processing order (lookup table last)
    pub reports: Vec<ItemReport>,
    pub elapsed: Duration,
}

impl Summary {
    pub fn from_reports(reports: Vec<ItemReport>, elapsed: Duration) -> Self {
        let mut summary = Self {
            total_items: reports.len(),
            done: 0,
            skipped: 0,
            failed: 0,
            rows_written: 0,
            retained: Vec::new(),
            reports: Vec::new(),
            elapsed,
        };
        for report in &reports {
            match &report.outcome {
                Outcome::Done { rows, .. } => {
                    summary.done += 1;
                    summary.rows_written += rows;
                }
                Outcome::Skipped { .. } => summary.skipped += 1,
                Outcome::Failed(_) => summary.failed += 1,
            }
            if let Some(path) = report.retained() {
                summary.retained.push(path.to_path_buf());
            }
        }
        summary.reports = reports;
        summary
    }

    /// Labels of items that ended in `state`
    pub fn labels_in(&self, state: ItemState) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| r.state() == state)
            .map(|r| r.label.as_str())
            .collect()
    }

    pub fn log(&self) {
        log::info!("=== Upload Summary ===");
        log::info!(
            "Items: {}/{} done ({} skipped, {} failed)",
            self.done,
            self.total_items,
            self.skipped,
            self.failed
        );
        log::info!("Rows: {}", fmt_num(self.rows_written));
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        for path in &self.retained {
            log::warn!("Kept after failed upload: {}", path.display());
        }
    }
}

/// Process one job, turning a panic into a `Failed` report.
///
/// The scratch scope is dropped during unwinding, so files are still removed.
fn process_isolated<F, C, U>(pipeline: &Pipeline<F, C, U>, job: &Job) -> ItemReport
where
    F: Fetcher,
    C: Converter,
    U: Uploader,
{
    match panic::catch_unwind(AssertUnwindSafe(|| pipeline.process(job))) {
        Ok(report) => report,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("{}: unexpected failure: {msg}", job.label);
            ItemReport::panicked(&job.label, msg)
        }
    }
}

/// Run every monthly item, then the lookup table.
///
/// Per-item failures never abort the batch. Only an unusable scratch
/// directory does, and that is checked before the first item.
pub fn run<F, C, U>(config: &RunConfig, pipeline: &Pipeline<F, C, U>) -> Result<Summary>
where
    F: Fetcher,
    C: Converter,
    U: Uploader,
{
    let start = Instant::now();

    pipeline.scratch().prepare().with_context(|| {
        format!(
            "Failed to prepare scratch directory {}",
            pipeline.scratch().dir().display()
        )
    })?;

    let items = config.selection.work_items();
    let total = items.len() + 1;
    log::info!(
        "Will upload {} monthly files and the zone lookup table to bucket {}",
        items.len(),
        config.bucket
    );

    let mut reports = Vec::with_capacity(total);
    for (i, item) in items.iter().enumerate() {
        log::info!("[{}/{total}] {}", i + 1, item.label());
        let job = item.job(&config.archive_base_url, &config.bucket);
        reports.push(process_isolated(pipeline, &job));
    }

    let lookup = config.lookup_table();
    log::info!("[{total}/{total}] lookup table {}", lookup.file_name);
    reports.push(process_isolated(pipeline, &lookup.job(&config.bucket)));

    let summary = Summary::from_reports(reports, start.elapsed());
    summary.log();
    Ok(summary)
}
