//! Logging with indicatif integration
//!
//! Every line is `<timestamp> [LEVEL] message`.

use std::io::Write;

use indicatif::MultiProgress;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Padded label and ANSI color for a level
fn level_style(level: log::Level) -> (&'static str, &'static str) {
    match level {
        log::Level::Error => ("ERROR", "\x1b[31m"),
        log::Level::Warn => ("WARN ", "\x1b[33m"),
        log::Level::Info => ("INFO ", "\x1b[32m"),
        log::Level::Debug => ("DEBUG", "\x1b[36m"),
        log::Level::Trace => ("TRACE", "\x1b[35m"),
    }
}

fn format_line(level: log::Level, args: &std::fmt::Arguments<'_>, color: bool) -> String {
    let (label, ansi) = level_style(level);
    let ts = chrono::Local::now().format(TIMESTAMP_FORMAT);
    if color {
        format!("{ts} [{ansi}{label}\x1b[0m] {args}")
    } else {
        format!("{ts} [{label}] {args}")
    }
}

/// Logger that prints through indicatif MultiProgress so lines don't tear bars.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl IndicatifLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            // TTY only, so always colored
            let line = format_line(record.level(), record.args(), true);
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Initialize logging. `RUST_LOG` overrides the default `info` filter.
///
/// With a `MultiProgress` (TTY), log lines go through indicatif; otherwise
/// plain uncolored lines for log aggregation.
pub fn init_logging(multi: Option<&MultiProgress>) -> Result<(), log::SetLoggerError> {
    let env = env_logger::Env::default().default_filter_or("info");

    if let Some(multi) = multi {
        let logger = env_logger::Builder::from_env(env).build();
        let max_level = logger.filter();
        log::set_boxed_logger(Box::new(IndicatifLogger::new(logger, multi.clone())))?;
        log::set_max_level(max_level);
        Ok(())
    } else {
        env_logger::Builder::from_env(env)
            .format(|buf, record| {
                writeln!(buf, "{}", format_line(record.level(), record.args(), false))
            })
            .try_init()
    }
}
