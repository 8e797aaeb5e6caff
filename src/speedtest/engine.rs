//! Round driver for download and upload throughput tests
//!
//! Rounds run strictly one after another: round n+1 starts only after round
//! n's clock has stopped. The stop token is checked before each round; a
//! transfer already in flight always runs to completion. A failed round ends
//! the session without retrying and hands back whatever completed before it.

use bytes::Bytes;
use futures::StreamExt;
use log::{debug, info, warn};
use rand::RngCore;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::api::FirewallApi;
use crate::client::errors::{ApiError, ApiResult};
use crate::speedtest::trial::{BYTES_PER_MB, Direction, Mode, SpeedSession, SpeedTrial};
use crate::validation::check_speedtest_size;

/// Rounds in multi mode unless configured otherwise
pub const DEFAULT_MULTI_ROUNDS: usize = 5;

#[derive(Debug, Error)]
pub enum SpeedTestError {
    /// Session parameters rejected before anything was sent
    #[error(transparent)]
    Rejected(ApiError),

    #[error("{direction} test failed in round {round}: {source}")]
    RoundFailed {
        direction: Direction,
        round: usize,
        source: ApiError,
        /// Rounds that finished before the failure
        completed: Box<SpeedSession>,
    },
}

impl SpeedTestError {
    /// Results gathered before the failure, if any round ran
    pub fn completed(&self) -> Option<&SpeedSession> {
        match self {
            SpeedTestError::Rejected(_) => None,
            SpeedTestError::RoundFailed { completed, .. } => Some(completed.as_ref()),
        }
    }
}

/// Progress notifications for a render layer following a running session
#[derive(Debug, Clone, PartialEq)]
pub enum SpeedEvent {
    RoundStarted {
        direction: Direction,
        round: usize,
        of: usize,
    },
    RoundFinished {
        direction: Direction,
        trial: SpeedTrial,
    },
    Stopped {
        direction: Direction,
        completed: usize,
    },
}

pub struct SpeedTestEngine {
    api: Arc<dyn FirewallApi>,
    multi_rounds: usize,
    events: Option<mpsc::UnboundedSender<SpeedEvent>>,
}

impl SpeedTestEngine {
    pub fn new(api: Arc<dyn FirewallApi>) -> Self {
        Self {
            api,
            multi_rounds: DEFAULT_MULTI_ROUNDS,
            events: None,
        }
    }

    pub fn with_multi_rounds(mut self, rounds: usize) -> Self {
        self.multi_rounds = rounds.max(1);
        self
    }

    /// Reports every round on `events` as the session progresses
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SpeedEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn run_download(
        &self,
        size_mb: u32,
        mode: Mode,
        stop: &CancellationToken,
    ) -> Result<SpeedSession, SpeedTestError> {
        self.run(Direction::Download, size_mb, mode, stop).await
    }

    pub async fn run_upload(
        &self,
        size_mb: u32,
        mode: Mode,
        stop: &CancellationToken,
    ) -> Result<SpeedSession, SpeedTestError> {
        self.run(Direction::Upload, size_mb, mode, stop).await
    }

    /// Runs a full session in one direction
    ///
    /// `stop` belongs to this session; a fresh token per session is what
    /// clears a previous stop request.
    pub async fn run(
        &self,
        direction: Direction,
        size_mb: u32,
        mode: Mode,
        stop: &CancellationToken,
    ) -> Result<SpeedSession, SpeedTestError> {
        let size_mb = check_speedtest_size(size_mb).map_err(SpeedTestError::Rejected)?;
        let rounds = mode.rounds(self.multi_rounds);
        let mut session = SpeedSession::new(direction, size_mb, rounds);
        info!(
            "Starting {} test: {} MB x {} round(s)",
            direction, size_mb, rounds
        );

        for round in 1..=rounds {
            if stop.is_cancelled() {
                info!(
                    "{} test stopped before round {} ({} completed)",
                    direction,
                    round,
                    session.trials.len()
                );
                session.cancelled = true;
                self.emit(SpeedEvent::Stopped {
                    direction,
                    completed: session.trials.len(),
                });
                break;
            }

            self.emit(SpeedEvent::RoundStarted {
                direction,
                round,
                of: rounds,
            });

            let outcome = match direction {
                Direction::Download => self.download_round(round, size_mb).await,
                Direction::Upload => self.upload_round(round, size_mb).await,
            };

            match outcome {
                Ok(trial) => {
                    info!("{} {}", direction, trial);
                    self.emit(SpeedEvent::RoundFinished {
                        direction,
                        trial: trial.clone(),
                    });
                    session.trials.push(trial);
                }
                Err(source) => {
                    warn!("{} test aborted in round {}: {}", direction, round, source);
                    return Err(SpeedTestError::RoundFailed {
                        direction,
                        round,
                        source,
                        completed: Box::new(session),
                    });
                }
            }
        }

        if let Some(mean) = session.mean_rate() {
            debug!("{} mean rate: {:.0} B/s", direction, mean);
        }
        Ok(session)
    }

    /// Streams the payload and counts bytes without keeping them
    async fn download_round(&self, round: usize, size_mb: u32) -> ApiResult<SpeedTrial> {
        let started = Instant::now();
        let mut body = self.api.speedtest_download(size_mb).await?;
        let mut received: u64 = 0;
        while let Some(chunk) = body.next().await {
            received += chunk?.len() as u64;
        }
        Ok(SpeedTrial::new(round, received, started.elapsed()))
    }

    /// Sends random bytes; the rate uses the server's received count
    async fn upload_round(&self, round: usize, size_mb: u32) -> ApiResult<SpeedTrial> {
        let payload = random_payload(size_mb);
        let started = Instant::now();
        let receipt = self.api.speedtest_upload(payload).await?;
        Ok(SpeedTrial::new(round, receipt.received, started.elapsed()))
    }

    fn emit(&self, event: SpeedEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// Incompressible payload of `size_mb` megabytes
pub fn random_payload(size_mb: u32) -> Bytes {
    let mut buffer = vec![0u8; size_mb as usize * BYTES_PER_MB as usize];
    rand::rng().fill_bytes(&mut buffer);
    Bytes::from(buffer)
}
