//! Speed-test results: single timed rounds and the sessions that collect them

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::formatting::{format_megabytes, format_rate};
use crate::notify::Section;

pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Shortest elapsed time used for rate computation
///
/// A transfer that completes faster than the clock can resolve is treated as
/// having taken 1 ms, which keeps every rate finite.
pub const MIN_ELAPSED_SECS: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[value(alias = "down")]
    Download,
    #[value(alias = "up")]
    Upload,
}

impl Direction {
    pub fn section(self) -> Section {
        match self {
            Direction::Download => Section::Download,
            Direction::Upload => Section::Upload,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Download => f.write_str("download"),
            Direction::Upload => f.write_str("upload"),
        }
    }
}

/// How many rounds a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Single,
    Multi,
}

impl Mode {
    pub fn rounds(self, multi_rounds: usize) -> usize {
        match self {
            Mode::Single => 1,
            Mode::Multi => multi_rounds,
        }
    }

    pub fn toggled(self) -> Mode {
        match self {
            Mode::Single => Mode::Multi,
            Mode::Multi => Mode::Single,
        }
    }
}

/// One timed transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedTrial {
    /// 1-based round number
    pub round_index: usize,
    pub bytes_transferred: u64,
    pub elapsed: Duration,
    /// Bytes per second
    pub rate: f64,
}

impl SpeedTrial {
    pub fn new(round_index: usize, bytes_transferred: u64, elapsed: Duration) -> Self {
        let seconds = elapsed.as_secs_f64().max(MIN_ELAPSED_SECS);
        Self {
            round_index,
            bytes_transferred,
            elapsed,
            rate: bytes_transferred as f64 / seconds,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

impl fmt::Display for SpeedTrial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Round {}: {} ({} / {:.2} s)",
            self.round_index,
            format_rate(self.rate),
            format_megabytes(self.bytes_transferred),
            self.elapsed_secs()
        )
    }
}

/// Ordered rounds of one user-initiated test in one direction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedSession {
    pub direction: Direction,
    pub size_mb: u32,
    pub planned_rounds: usize,
    pub trials: Vec<SpeedTrial>,
    /// Set when the stop signal cut the session short
    pub cancelled: bool,
}

impl SpeedSession {
    pub fn new(direction: Direction, size_mb: u32, planned_rounds: usize) -> Self {
        Self {
            direction,
            size_mb,
            planned_rounds,
            trials: Vec::with_capacity(planned_rounds),
            cancelled: false,
        }
    }

    /// Arithmetic mean over the completed rounds, only when more than one ran
    pub fn mean_rate(&self) -> Option<f64> {
        if self.trials.len() < 2 {
            return None;
        }
        let total: f64 = self.trials.iter().map(|t| t.rate).sum();
        Some(total / self.trials.len() as f64)
    }

    pub fn is_complete(&self) -> bool {
        self.trials.len() == self.planned_rounds
    }

    /// Log lines for the render layer: one per round, then the mean if any
    pub fn log_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.trials.iter().map(|t| t.to_string()).collect();
        if let Some(mean) = self.mean_rate() {
            lines.push(format!("Average: {}", format_rate(mean)));
        }
        if self.cancelled {
            lines.push(format!(
                "Stopped after {} of {} round(s)",
                self.trials.len(),
                self.planned_rounds
            ));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_from_bytes_and_elapsed() {
        let trial = SpeedTrial::new(1, 20 * BYTES_PER_MB, Duration::from_secs(2));
        assert_eq!(trial.rate, 10.0 * BYTES_PER_MB as f64);
        assert_eq!(format_rate(trial.rate), "10.00 MB/s");
    }

    #[test]
    fn test_zero_elapsed_is_floored() {
        let trial = SpeedTrial::new(1, 1000, Duration::ZERO);
        assert!(trial.rate.is_finite());
        assert_eq!(trial.rate, 1_000_000.0);

        let empty = SpeedTrial::new(1, 0, Duration::ZERO);
        assert_eq!(empty.rate, 0.0);
    }

    #[test]
    fn test_mean_only_with_multiple_trials() {
        let mut session = SpeedSession::new(Direction::Download, 20, 5);
        assert_eq!(session.mean_rate(), None);

        session.trials.push(SpeedTrial::new(1, 4000, Duration::from_secs(1)));
        assert_eq!(session.mean_rate(), None);

        session.trials.push(SpeedTrial::new(2, 2000, Duration::from_secs(1)));
        assert_eq!(session.mean_rate(), Some(3000.0));
        assert!(!session.is_complete());
    }

    #[test]
    fn test_mode_rounds() {
        assert_eq!(Mode::Single.rounds(5), 1);
        assert_eq!(Mode::Multi.rounds(5), 5);
        assert_eq!(Mode::Single.toggled(), Mode::Multi);
    }

    #[test]
    fn test_log_lines() {
        let mut session = SpeedSession::new(Direction::Upload, 20, 5);
        session
            .trials
            .push(SpeedTrial::new(1, 20 * BYTES_PER_MB, Duration::from_secs(2)));
        session
            .trials
            .push(SpeedTrial::new(2, 10 * BYTES_PER_MB, Duration::from_secs(2)));
        session.cancelled = true;

        let lines = session.log_lines();
        assert_eq!(lines[0], "Round 1: 10.00 MB/s (20.0 MB / 2.00 s)");
        assert_eq!(lines[1], "Round 2: 5.00 MB/s (10.0 MB / 2.00 s)");
        assert_eq!(lines[2], "Average: 7.50 MB/s");
        assert_eq!(lines[3], "Stopped after 2 of 5 round(s)");
    }
}
