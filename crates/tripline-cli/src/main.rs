//! tripline - NYC taxi trip records into Cloud Storage as Parquet
//!
//! Reads its settings from the environment (and optionally `tripline.toml`),
//! processes every configured month plus the zone lookup table, and prints
//! a summary. Per-item failures are reported but do not change the exit
//! status; only configuration problems do.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use tripline_core::{
    CsvToParquet, HttpFetcher, ObjectStoreUploader, ProgressContext, ScratchSpace, SharedProgress,
    fmt_num, init_logging,
};
use tripline_tlc::{ItemState, Outcome, Pipeline, Summary};

mod config;

use config::{Environment, FileConfig, Settings};

fn main() -> ExitCode {
    // Progress context (TTY auto-detect)
    let progress = Arc::new(ProgressContext::new());
    let multi = progress.is_tty().then(|| progress.multi());
    if let Err(e) = init_logging(multi) {
        eprintln!("Failed to initialize logging: {e}");
    }

    log::info!("Starting NYC taxi trip data upload");

    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("{e:#}");
            return ExitCode::from(1);
        }
    };

    match run(&settings, &progress) {
        Ok(summary) => {
            print_summary(&summary, &progress);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn load_settings() -> Result<Settings> {
    let env = Environment::from_env()?;
    let file = FileConfig::load()?;
    let settings = Settings::resolve(env, file)?;
    log::info!(
        "Project {}, bucket {} ({})",
        settings.project_id,
        settings.run.bucket,
        settings.backend.scheme()
    );
    Ok(settings)
}

fn run(settings: &Settings, progress: &SharedProgress) -> Result<Summary> {
    let fetcher = HttpFetcher::new(settings.http)
        .context("Failed to build HTTP client")?
        .with_progress(Arc::clone(progress));
    let pipeline = Pipeline::new(
        fetcher,
        CsvToParquet::new(settings.compression_level),
        ObjectStoreUploader::new(settings.backend.clone()),
        ScratchSpace::new(&settings.run.scratch_dir),
    );
    tripline_tlc::run(&settings.run, &pipeline)
}

fn print_summary(summary: &Summary, progress: &ProgressContext) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Item").fg(Color::Cyan),
            Cell::new("State").fg(Color::Cyan),
            Cell::new("Detail").fg(Color::Cyan),
        ]);

    for report in &summary.reports {
        let (color, detail) = match &report.outcome {
            Outcome::Done { rows, destination } => {
                (Color::Green, format!("{} rows -> {destination}", fmt_num(*rows)))
            }
            Outcome::Skipped { .. } => (Color::Yellow, "not in archive".to_string()),
            Outcome::Failed(e) => (Color::Red, e.to_string()),
        };
        table.add_row(vec![
            Cell::new(&report.label),
            Cell::new(state_name(report.state())).fg(color),
            Cell::new(detail),
        ]);
    }

    progress.println(format!("\n{table}"));
    progress.println(format!(
        "{}/{} done, {} skipped, {} failed, {} rows in {:.1}s",
        summary.done,
        summary.total_items,
        summary.skipped,
        summary.failed,
        fmt_num(summary.rows_written),
        summary.elapsed.as_secs_f64()
    ));
}

fn state_name(state: ItemState) -> &'static str {
    match state {
        ItemState::Done => "done",
        ItemState::Skipped => "skipped",
        ItemState::Failed => "failed",
        _ => "unfinished",
    }
}
