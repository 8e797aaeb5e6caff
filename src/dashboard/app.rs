//! State and key handling behind the live dashboard
//!
//! [`DashboardApp`] owns everything the dashboard shows. Background work
//! (poll cycles, speed-test sessions, prompt actions) runs in spawned tasks
//! and reports back over channels; [`DashboardApp::drain`] folds those
//! reports into the state between frames, so only the UI loop ever mutates it.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use log::{debug, info};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actions;
use crate::client::api::FirewallApi;
use crate::client::errors::{ApiError, ApiResult};
use crate::connections::SortKey;
use crate::dashboard::prompt::PromptCommand;
use crate::formatting::format_rate;
use crate::notify::NotificationCenter;
use crate::poller::{DashboardState, PollUpdate, Poller, SourcePayload};
use crate::settings::Settings;
use crate::speedtest::{Direction, Mode, SpeedEvent, SpeedSession, SpeedTestEngine, SpeedTestError};
use crate::validation::MAX_SPEEDTEST_MB;

/// Sizes offered by `+` and `-`
pub const SIZE_STEPS_MB: [u32; 7] = [1, 5, 10, 20, 50, 100, 200];

/// Traffic samples kept for the sparklines
const HISTORY_LEN: usize = 50;

const POLL_CHANNEL_CAPACITY: usize = 64;

type SessionOutcome = Result<SpeedSession, SpeedTestError>;

/// A speed-test session running in the background
pub struct RunningTest {
    pub direction: Direction,
    /// Current round and planned rounds, once the first round has started
    pub progress: Option<(usize, usize)>,
    stop: CancellationToken,
    done: oneshot::Receiver<SessionOutcome>,
}

impl RunningTest {
    pub fn stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }
}

/// Speed-test controls and the per-direction result logs
#[derive(Debug, Clone)]
pub struct SpeedPanel {
    pub mode: Mode,
    pub size_mb: u32,
    download_log: Vec<String>,
    upload_log: Vec<String>,
}

impl SpeedPanel {
    pub fn new(size_mb: u32) -> Self {
        Self {
            mode: Mode::Single,
            size_mb: size_mb.clamp(1, MAX_SPEEDTEST_MB),
            download_log: Vec::new(),
            upload_log: Vec::new(),
        }
    }

    pub fn log(&self, direction: Direction) -> &[String] {
        match direction {
            Direction::Download => &self.download_log,
            Direction::Upload => &self.upload_log,
        }
    }

    fn log_mut(&mut self, direction: Direction) -> &mut Vec<String> {
        match direction {
            Direction::Download => &mut self.download_log,
            Direction::Upload => &mut self.upload_log,
        }
    }

    /// Next preset above the current size, or the largest one
    pub fn grow(&mut self) {
        self.size_mb = SIZE_STEPS_MB
            .iter()
            .copied()
            .find(|step| *step > self.size_mb)
            .unwrap_or(MAX_SPEEDTEST_MB);
    }

    /// Next preset below the current size, or the smallest one
    pub fn shrink(&mut self) {
        self.size_mb = SIZE_STEPS_MB
            .iter()
            .rev()
            .copied()
            .find(|step| *step < self.size_mb)
            .unwrap_or(SIZE_STEPS_MB[0]);
    }
}

pub struct DashboardApp {
    api: Arc<dyn FirewallApi>,
    refresher: Poller,
    poll_interval: std::time::Duration,
    multi_rounds: usize,

    pub state: DashboardState,
    pub notices: NotificationCenter,
    pub speed: SpeedPanel,
    running: Option<RunningTest>,
    /// Text typed after `:`, while the prompt is open
    pub prompt: Option<String>,

    rx_history: VecDeque<f64>,
    tx_history: VecDeque<f64>,

    poll_tx: mpsc::Sender<PollUpdate>,
    poll_rx: mpsc::Receiver<PollUpdate>,
    speed_tx: mpsc::UnboundedSender<SpeedEvent>,
    speed_rx: mpsc::UnboundedReceiver<SpeedEvent>,
    action_tx: mpsc::UnboundedSender<ApiResult<String>>,
    action_rx: mpsc::UnboundedReceiver<ApiResult<String>>,

    should_quit: bool,
}

impl DashboardApp {
    pub fn new(api: Arc<dyn FirewallApi>, settings: &Settings) -> Self {
        let (poll_tx, poll_rx) = mpsc::channel(POLL_CHANNEL_CAPACITY);
        let (speed_tx, speed_rx) = mpsc::unbounded_channel();
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        Self {
            refresher: Poller::new(Arc::clone(&api), settings.poll_interval()),
            api,
            poll_interval: settings.poll_interval(),
            multi_rounds: settings.speedtest_rounds,
            state: DashboardState::new(),
            notices: NotificationCenter::new(settings.toast_duration()),
            speed: SpeedPanel::new(settings.speedtest_size_mb),
            running: None,
            prompt: None,
            rx_history: VecDeque::with_capacity(HISTORY_LEN),
            tx_history: VecDeque::with_capacity(HISTORY_LEN),
            poll_tx,
            poll_rx,
            speed_tx,
            speed_rx,
            action_tx,
            action_rx,
            should_quit: false,
        }
    }

    /// Starts the background poller; it stops once this app is dropped
    pub fn start_polling(&self) -> JoinHandle<()> {
        Poller::new(Arc::clone(&self.api), self.poll_interval).spawn(self.poll_tx.clone())
    }

    /// Fires one extra poll cycle outside the regular cadence
    pub fn refresh(&self) {
        debug!("Manual refresh requested");
        self.refresher.spawn_cycle(&self.poll_tx);
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn running(&self) -> Option<&RunningTest> {
        self.running.as_ref()
    }

    pub fn rx_history(&self) -> &VecDeque<f64> {
        &self.rx_history
    }

    pub fn tx_history(&self) -> &VecDeque<f64> {
        &self.tx_history
    }

    /// Applies everything the background tasks reported since the last frame
    ///
    /// Returns true when anything changed.
    pub fn drain(&mut self) -> bool {
        let mut changed = false;

        while let Ok(update) = self.poll_rx.try_recv() {
            if let PollUpdate::Loaded(SourcePayload::Traffic(snapshot)) = &update {
                push_sample(&mut self.rx_history, snapshot.rx_rate);
                push_sample(&mut self.tx_history, snapshot.tx_rate);
            }
            self.state.apply(update, &mut self.notices);
            changed = true;
        }

        // Round events are sent before the session result, so they are
        // always folded in first.
        while let Ok(event) = self.speed_rx.try_recv() {
            self.on_speed_event(event);
            changed = true;
        }
        changed |= self.collect_finished_test();

        while let Ok(outcome) = self.action_rx.try_recv() {
            actions::report(&mut self.notices, &outcome);
            if outcome.is_ok() {
                self.refresh();
            }
            changed = true;
        }

        changed | self.notices.expire(Instant::now())
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit();
            return;
        }
        if self.prompt.is_some() {
            self.handle_prompt_key(key.code);
            return;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.quit(),
            KeyCode::Char(digit @ '1'..='9') => {
                if let Some(sort_key) = SortKey::from_shortcut(digit) {
                    self.state.connections.set_sort_key(sort_key);
                }
            }
            KeyCode::Char('d') => self.start_speedtest(Direction::Download),
            KeyCode::Char('u') => self.start_speedtest(Direction::Upload),
            KeyCode::Char('x') => self.stop_speedtest(),
            KeyCode::Char('m') => {
                self.speed.mode = self.speed.mode.toggled();
            }
            KeyCode::Char('+') | KeyCode::Char('=') => self.speed.grow(),
            KeyCode::Char('-') => self.speed.shrink(),
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('c') => self.notices.dismiss_errors(),
            KeyCode::Char(':') => self.prompt = Some(String::new()),
            _ => {}
        }
    }

    fn handle_prompt_key(&mut self, code: KeyCode) {
        let Some(line) = self.prompt.as_mut() else {
            return;
        };
        match code {
            KeyCode::Esc => self.prompt = None,
            KeyCode::Backspace => {
                line.pop();
            }
            KeyCode::Char(c) => line.push(c),
            KeyCode::Enter => {
                if let Some(line) = self.prompt.take() {
                    self.submit(&line);
                }
            }
            _ => {}
        }
    }

    /// Parses a prompt line and runs the action in the background
    pub fn submit(&mut self, line: &str) {
        match PromptCommand::parse(line) {
            Ok(command) => {
                info!("Running prompt command {:?}", command);
                let api = Arc::clone(&self.api);
                let results = self.action_tx.clone();
                tokio::spawn(async move {
                    let outcome = command.run(api.as_ref()).await;
                    let _ = results.send(outcome);
                });
            }
            Err(err) => actions::report(&mut self.notices, &Err(err)),
        }
    }

    /// Starts a session with the current mode and size; one runs at a time
    pub fn start_speedtest(&mut self, direction: Direction) {
        if let Some(running) = &self.running {
            self.notices.notify(format!(
                "A {} test is already running (x to stop)",
                running.direction
            ));
            return;
        }

        let engine = SpeedTestEngine::new(Arc::clone(&self.api))
            .with_multi_rounds(self.multi_rounds)
            .with_events(self.speed_tx.clone());
        let stop = CancellationToken::new();
        let (done_tx, done_rx) = oneshot::channel();
        let (size_mb, mode) = (self.speed.size_mb, self.speed.mode);

        let token = stop.clone();
        tokio::spawn(async move {
            let outcome = engine.run(direction, size_mb, mode, &token).await;
            let _ = done_tx.send(outcome);
        });

        self.speed.log_mut(direction).clear();
        self.notices.clear_error(direction.section());
        self.running = Some(RunningTest {
            direction,
            progress: None,
            stop,
            done: done_rx,
        });
    }

    /// Cooperative stop: the round in flight finishes, later rounds are skipped
    pub fn stop_speedtest(&mut self) {
        match &self.running {
            Some(running) => {
                running.stop.cancel();
                self.notices.notify("Stopping after the current round");
            }
            None => self.notices.notify("No speed test is running"),
        }
    }

    fn quit(&mut self) {
        if let Some(running) = &self.running {
            running.stop.cancel();
        }
        self.should_quit = true;
    }

    fn on_speed_event(&mut self, event: SpeedEvent) {
        match event {
            SpeedEvent::RoundStarted { round, of, .. } => {
                if let Some(running) = self.running.as_mut() {
                    running.progress = Some((round, of));
                }
            }
            SpeedEvent::RoundFinished { direction, trial } => {
                self.speed.log_mut(direction).push(trial.to_string());
            }
            SpeedEvent::Stopped {
                direction,
                completed,
            } => {
                let planned = self
                    .running
                    .as_ref()
                    .and_then(|running| running.progress)
                    .map(|(_, of)| of);
                self.notices.notify(stopped_message(direction, completed, planned));
            }
        }
    }

    fn collect_finished_test(&mut self) -> bool {
        let Some(running) = self.running.as_mut() else {
            return false;
        };
        let outcome = match running.done.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::error::TryRecvError::Empty) => return false,
            Err(oneshot::error::TryRecvError::Closed) => Err(SpeedTestError::Rejected(
                ApiError::transport("speedtest", "session task ended unexpectedly"),
            )),
        };
        let direction = running.direction;
        self.running = None;

        match outcome {
            Ok(session) => {
                *self.speed.log_mut(direction) = session.log_lines();
                self.notices.clear_error(direction.section());
                // A stopped session was already announced by its Stopped event
                if !session.cancelled {
                    self.notices.notify(session_summary(&session));
                }
            }
            Err(SpeedTestError::Rejected(reason)) => {
                actions::report(&mut self.notices, &Err(reason));
            }
            Err(err) => {
                if let Some(partial) = err.completed() {
                    *self.speed.log_mut(direction) = partial.log_lines();
                }
                self.notices.set_error(direction.section(), err.to_string());
            }
        }
        true
    }
}

fn push_sample(history: &mut VecDeque<f64>, value: f64) {
    history.push_back(value);
    if history.len() > HISTORY_LEN {
        history.pop_front();
    }
}

fn direction_label(direction: Direction) -> &'static str {
    match direction {
        Direction::Download => "Download",
        Direction::Upload => "Upload",
    }
}

fn stopped_message(direction: Direction, completed: usize, planned: Option<usize>) -> String {
    match (completed, planned) {
        (0, _) => format!("{} test stopped before the first round", direction_label(direction)),
        (done, Some(of)) => format!(
            "{} test stopped after {} of {} round(s)",
            direction_label(direction),
            done,
            of
        ),
        (done, None) => format!(
            "{} test stopped after {} round(s)",
            direction_label(direction),
            done
        ),
    }
}

fn session_summary(session: &SpeedSession) -> String {
    let headline = session
        .mean_rate()
        .or_else(|| session.trials.last().map(|t| t.rate))
        .map(format_rate)
        .unwrap_or_else(|| "no rounds".to_string());
    format!("{} test finished: {}", direction_label(session.direction), headline)
}
