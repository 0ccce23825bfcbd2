//! Progress reporter implementation
//!
//! Uses indicatif spinners, since items are discovered while the copy is
//! already running and totals are not known up front:
//! - Item count (committed / failed)
//! - Byte count with throughput

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

fn spinner_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Progress reporter for copy runs
pub struct ProgressReporter {
    /// Item counter
    items_bar: ProgressBar,
    /// Byte counter
    bytes_bar: ProgressBar,
    /// Items that failed to write
    failed: AtomicU64,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        let items_bar = multi.add(ProgressBar::new_spinner());
        items_bar.set_style(spinner_style("{spinner:.cyan} {prefix:.bold.dim} {pos} items {msg}"));
        items_bar.set_prefix("Items");

        let bytes_bar = multi.add(ProgressBar::new_spinner());
        bytes_bar.set_style(spinner_style(
            "{spinner:.green} {prefix:.bold.dim} {bytes} ({bytes_per_sec})",
        ));
        bytes_bar.set_prefix("Data ");

        for bar in [&items_bar, &bytes_bar] {
            bar.enable_steady_tick(Duration::from_millis(120));
        }

        Self {
            items_bar,
            bytes_bar,
            failed: AtomicU64::new(0),
        }
    }

    /// Create a disabled progress reporter (for quiet mode)
    pub fn disabled() -> Self {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        Self {
            items_bar: multi.add(ProgressBar::hidden()),
            bytes_bar: multi.add(ProgressBar::hidden()),
            failed: AtomicU64::new(0),
        }
    }

    /// Record a written item
    pub fn record_committed(&self, bytes: u64) {
        self.items_bar.inc(1);
        self.bytes_bar.inc(bytes);
    }

    /// Record an item that could not be written
    pub fn record_failed(&self) {
        let failed = self.failed.fetch_add(1, Ordering::Relaxed) + 1;
        self.items_bar.set_message(format!("({} failed)", failed));
    }

    /// Set the item currently being written
    pub fn set_current(&self, path: &str) {
        // Keep the tail of long paths
        let display = match path.char_indices().rev().nth(56) {
            Some((idx, _)) => format!("...{}", &path[idx..]),
            None => path.to_string(),
        };
        self.bytes_bar.set_message(display);
    }

    /// Finish progress with success message
    pub fn finish_success(&self, message: &str) {
        self.items_bar.finish_with_message(format!("✓ {}", message));
        self.bytes_bar.finish();
    }

    /// Finish progress with error message
    pub fn finish_error(&self, message: &str) {
        self.items_bar.abandon_with_message(format!("✗ {}", message));
        self.bytes_bar.abandon();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
