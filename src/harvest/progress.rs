//! Progress reporting for long-running harvests.
//!
//! A historical harvest walks hundreds of station groups at one unit every
//! few seconds, so each unit gets an `[i/N]` line with completion, rate and
//! a remaining-time estimate.

use std::time::{Duration, Instant};

/// What a harvest walks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestItemType {
    /// Station groups of a historical harvest
    StationGroups,
    /// Municipalities of a forecast harvest
    Municipalities,
    /// Journaled URLs of an error replay
    JournalUrls,
}

impl HarvestItemType {
    /// Human-friendly lowercase plural label.
    pub fn plural(&self) -> &'static str {
        match self {
            Self::StationGroups => "station groups",
            Self::Municipalities => "municipalities",
            Self::JournalUrls => "journal URLs",
        }
    }
}

/// Unit-level progress of one harvest run.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    /// Units handled so far (any outcome).
    pub done: usize,
    /// Units scheduled for this run.
    pub total: usize,
    /// Timestamp when the run started.
    pub start_time: Instant,
    /// What is being walked.
    pub item_type: HarvestItemType,
}

impl ProgressReporter {
    /// Start reporting a run of `total` units.
    pub fn new(total: usize, item_type: HarvestItemType) -> Self {
        Self {
            done: 0,
            total,
            start_time: Instant::now(),
            item_type,
        }
    }

    /// Record one finished unit.
    pub fn advance(&mut self) {
        self.done = (self.done + 1).min(self.total);
    }

    /// `[i/N]` prefix for the unit about to start (1-based).
    pub fn position(&self) -> String {
        format!("[{}/{}]", (self.done + 1).min(self.total.max(1)), self.total)
    }

    /// Completion percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.done as f64 / self.total as f64) * 100.0
    }

    /// Units per minute since the start.
    pub fn rate_per_minute(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.done as f64 * 60.0 / elapsed
    }

    /// Estimate remaining time from the observed rate.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let remaining = self.total.saturating_sub(self.done);
        if remaining == 0 || self.done == 0 {
            return None;
        }
        let per_unit = self.start_time.elapsed().as_secs_f64() / self.done as f64;
        Some(Duration::from_secs_f64(per_unit * remaining as f64))
    }

    /// Human-readable progress string for logging.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] {}/{} {} - {:.1}% complete",
            self.done,
            self.total,
            self.item_type.plural(),
            self.percentage()
        )];

        let rate = self.rate_per_minute();
        if rate > 0.0 {
            parts.push(format!("at {rate:.1}/min"));
        }

        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
