//! Download progress on a terminal, silence elsewhere.
//!
//! On a TTY each download gets a byte bar that disappears when the file is
//! complete. Without one, bars are hidden and the log is the only record.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Widest file name shown before the bar (`yellow_tripdata_2020-12.csv.gz`)
const PREFIX_WIDTH: usize = 32;

fn bytes_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:<32.dim} {bar:30.green/dim} {binary_bytes:>7}/{binary_total_bytes:7} {eta:>4}",
    )
    .expect("invalid template")
    .progress_chars("--")
}

/// Until the response says how big the file is
fn unknown_size_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {prefix:<32.dim} {binary_bytes:>7} {msg:.dim}")
        .expect("invalid template")
}

/// Switch a download bar to byte progress once Content-Length is known.
pub fn upgrade_to_bar(pb: &ProgressBar, total: u64) {
    pb.set_length(total);
    pb.set_style(bytes_style());
}

/// Owns the terminal area shared by download bars and log lines
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Detect whether stderr is a terminal.
    pub fn new() -> Self {
        if std::io::stderr().is_terminal() {
            Self {
                multi: MultiProgress::new(),
                is_tty: true,
            }
        } else {
            Self::hidden()
        }
    }

    /// Never draws, whatever stderr is.
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            is_tty: false,
        }
    }

    pub fn download_bar(&self, file_name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(unknown_size_style());
        pb.set_prefix(truncate(file_name, PREFIX_WIDTH).to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    /// Print above the bars (plain stderr without a TTY).
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.is_tty {
            let _ = self.multi.println(msg);
        } else {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedProgress = Arc<ProgressContext>;

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// `7667792` → `7,667,792`
pub fn fmt_num(n: usize) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (i + 3 - head) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_num_groups_thousands() {
        assert_eq!(fmt_num(0), "0");
        assert_eq!(fmt_num(999), "999");
        assert_eq!(fmt_num(1000), "1,000");
        assert_eq!(fmt_num(630_918), "630,918");
        assert_eq!(fmt_num(7_667_792), "7,667,792");
    }

    #[test]
    fn hidden_context_hands_out_hidden_bars() {
        let progress = ProgressContext::hidden();
        assert!(!progress.is_tty());
        assert!(progress.download_bar("green_tripdata_2019-01.csv.gz").is_hidden());
    }

    #[test]
    fn upgrade_sets_length() {
        let pb = ProgressBar::hidden();
        upgrade_to_bar(&pb, 42);
        assert_eq!(pb.length(), Some(42));
    }

    #[test]
    fn truncate_on_char_boundary() {
        assert_eq!(truncate("taxi_zone_lookup.csv", 4), "taxi");
        assert_eq!(truncate("short", 32), "short");
        assert_eq!(truncate("zoné", 4), "zoné");
    }
}
