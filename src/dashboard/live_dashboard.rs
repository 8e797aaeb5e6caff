use anyhow::Result;
use chrono::Local;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{debug, error, info};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction as LayoutDirection, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Sparkline, Table},
    Frame, Terminal,
};
use std::{
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::client::api::FirewallApi;
use crate::connections::SortKey;
use crate::dashboard::app::DashboardApp;
use crate::dashboard::prompt::PROMPT_HELP;
use crate::formatting::{format_bytes, format_rate};
use crate::poller::{LoadStatus, Source};
use crate::settings::Settings;
use crate::speedtest::{Direction, Mode};

/// Most sticky errors listed at once in the status block
const MAX_ERROR_LINES: usize = 4;

/// Real-time terminal dashboard for the firewall service
/// Polls rules, whitelist, traffic and connections and drives speed tests from the keyboard
pub struct Dashboard {
    app: DashboardApp,
    base_url: String,
}

impl Dashboard {
    pub fn new(api: Arc<dyn FirewallApi>, settings: &Settings) -> Self {
        Self {
            app: DashboardApp::new(api, settings),
            base_url: settings.base_url.clone(),
        }
    }

    /// Main entry point for the dashboard
    /// Sets up terminal, runs the UI loop, and cleans up on exit
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting live dashboard for {}", self.base_url);

        // Setup terminal for full-screen UI
        debug!("Setting up terminal for full-screen UI");
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let poller = self.app.start_polling();
        let res = self.run_app(&mut terminal).await;
        poller.abort();

        // Cleanup terminal state before exiting
        debug!("Cleaning up terminal state");
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        if let Err(err) = res {
            error!("Dashboard error: {err:?}");
            eprintln!("Error: {err:?}");
        } else {
            info!("Dashboard exited normally");
        }

        Ok(())
    }

    /// Main application loop
    /// Folds in background results, renders, then waits briefly for a key
    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()>
    where
        B::Error: Send + Sync + 'static,
    {
        loop {
            self.app.drain();
            terminal.draw(|f| self.ui(f))?;

            // Non-blocking key check with a 100ms timeout
            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.app.handle_key(key);
                    }
                }
            }

            if self.app.should_quit() {
                return Ok(());
            }

            // Let spawned work make progress before the next frame
            tokio::task::yield_now().await;
        }
    }

    fn ui(&self, frame: &mut Frame) {
        let error_lines = self.app.notices.errors().count().min(MAX_ERROR_LINES) as u16;

        let chunks = Layout::default()
            .direction(LayoutDirection::Vertical)
            .margin(1)
            .constraints(
                [
                    Constraint::Length(3),                   // Header
                    Constraint::Length(3 + error_lines),     // Toast and sticky errors
                    Constraint::Length(4),                   // Traffic counters
                    Constraint::Length(5),                   // Sparklines
                    Constraint::Min(10),                     // Rules, whitelist, connections
                    Constraint::Length(9),                   // Speed test
                    Constraint::Length(3),                   // Footer / prompt
                ]
                .as_ref(),
            )
            .split(frame.area());

        self.render_header(frame, chunks[0]);
        self.render_status(frame, chunks[1]);
        self.render_traffic(frame, chunks[2]);
        self.render_sparklines(frame, chunks[3]);

        let body = Layout::default()
            .direction(LayoutDirection::Horizontal)
            .constraints([Constraint::Percentage(32), Constraint::Percentage(68)].as_ref())
            .split(chunks[4]);
        let left = Layout::default()
            .direction(LayoutDirection::Vertical)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
            .split(body[0]);
        self.render_rules(frame, left[0]);
        self.render_whitelist(frame, left[1]);
        self.render_connections(frame, body[1]);

        self.render_speedtest(frame, chunks[5]);
        self.render_footer(frame, chunks[6]);
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let header = vec![Line::from(vec![
            Span::raw("Firewall Watcher - Live Dashboard"),
            Span::raw("    "),
            Span::styled(self.base_url.clone(), Style::default().fg(Color::Cyan)),
            Span::raw("    "),
            Span::styled(
                Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                Style::default().fg(Color::Yellow),
            ),
        ])];

        let block = Block::default()
            .borders(Borders::ALL)
            .style(Style::default().fg(Color::White));

        let paragraph = Paragraph::new(header).block(block);
        frame.render_widget(paragraph, area);
    }

    /// Transient toast on top, sticky per-section errors below it
    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let mut lines = Vec::new();
        match self.app.notices.toast_at(Instant::now()) {
            Some(toast) => lines.push(Line::from(vec![
                Span::styled("● ", Style::default().fg(Color::Green)),
                Span::raw(toast.to_string()),
            ])),
            None => lines.push(Line::from(Span::styled(
                "Monitoring active",
                Style::default().fg(Color::DarkGray),
            ))),
        }
        for (section, message) in self.app.notices.errors().take(MAX_ERROR_LINES) {
            lines.push(Line::from(vec![
                Span::styled("⚠ ", Style::default().fg(Color::Yellow)),
                Span::styled(
                    format!("[{}] {}", section, message),
                    Style::default().fg(Color::Yellow),
                ),
            ]));
        }

        let title = if self.app.notices.has_errors() {
            "Status (c to dismiss errors)"
        } else {
            "Status"
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .style(Style::default().fg(Color::White));
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn render_traffic(&self, frame: &mut Frame, area: Rect) {
        let text = match &self.app.state.traffic {
            Some(traffic) => {
                let interfaces = traffic
                    .per_interface
                    .iter()
                    .map(|iface| {
                        format!(
                            "{} ↓ {} ↑ {}",
                            iface.name,
                            format_bytes(iface.rx),
                            format_bytes(iface.tx)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("   ");
                vec![
                    Line::from(vec![
                        Span::raw("Current Speed: "),
                        Span::styled(
                            format!("↓ {}", format_rate(traffic.rx_rate)),
                            Style::default().fg(Color::Green),
                        ),
                        Span::raw("  "),
                        Span::styled(
                            format!("↑ {}", format_rate(traffic.tx_rate)),
                            Style::default().fg(Color::Blue),
                        ),
                        Span::raw(format!(
                            "   Total: ↓ {} ↑ {}",
                            format_bytes(traffic.accumulated_rx),
                            format_bytes(traffic.accumulated_tx)
                        )),
                    ]),
                    Line::from(Span::styled(interfaces, Style::default().fg(Color::Cyan))),
                ]
            }
            None => vec![Line::from("No traffic data yet")],
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .title(self.section_title("Traffic", Source::Traffic))
            .style(Style::default().fg(Color::White));
        frame.render_widget(Paragraph::new(text).block(block), area);
    }

    /// Sparklines of the polled traffic rates
    fn render_sparklines(&self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(LayoutDirection::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
            .split(area);

        // Sparklines take integers; KB/s keeps small rates visible
        let download_data: Vec<u64> = self
            .app
            .rx_history()
            .iter()
            .map(|&rate| (rate / 1024.0) as u64)
            .collect();
        let upload_data: Vec<u64> = self
            .app
            .tx_history()
            .iter()
            .map(|&rate| (rate / 1024.0) as u64)
            .collect();

        let max_download = download_data.iter().max().copied().unwrap_or(1);
        let max_upload = upload_data.iter().max().copied().unwrap_or(1);

        let download_title = match self.app.rx_history().back() {
            Some(&current) => format!("Download Trend (Current: {})", format_rate(current)),
            None => "Download Trend (No data)".to_string(),
        };
        let upload_title = match self.app.tx_history().back() {
            Some(&current) => format!("Upload Trend (Current: {})", format_rate(current)),
            None => "Upload Trend (No data)".to_string(),
        };

        let download_sparkline = Sparkline::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(download_title)
                    .title_style(Style::default().fg(Color::Green)),
            )
            .data(&download_data)
            .max(max_download.max(1))
            .style(Style::default().fg(Color::Green));

        let upload_sparkline = Sparkline::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(upload_title)
                    .title_style(Style::default().fg(Color::Blue)),
            )
            .data(&upload_data)
            .max(max_upload.max(1))
            .style(Style::default().fg(Color::Blue));

        frame.render_widget(download_sparkline, chunks[0]);
        frame.render_widget(upload_sparkline, chunks[1]);
    }

    fn render_rules(&self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = self
            .app
            .state
            .rules
            .iter()
            .map(|rule| ListItem::new(Line::from(rule.as_str())))
            .collect();

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(self.section_title("Firewall Rules", Source::Rules)),
            )
            .style(Style::default().fg(Color::White));
        frame.render_widget(list, area);
    }

    fn render_whitelist(&self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = self
            .app
            .state
            .whitelist
            .iter()
            .map(|entry| {
                ListItem::new(Line::from(vec![
                    Span::raw(format!("{} ", entry.geo_flag.as_deref().unwrap_or(" "))),
                    Span::styled(entry.ip.clone(), Style::default().fg(Color::Cyan)),
                    Span::styled(
                        format!(
                            "  {}",
                            entry
                                .geo_online_label
                                .as_deref()
                                .or(entry.geo_local_label.as_deref())
                                .unwrap_or("")
                        ),
                        Style::default().fg(Color::DarkGray),
                    ),
                ]))
            })
            .collect();

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(self.section_title("Whitelist", Source::Whitelist)),
            )
            .style(Style::default().fg(Color::White));
        frame.render_widget(list, area);
    }

    /// Connection table with the active sort column marked in the header
    fn render_connections(&self, frame: &mut Frame, area: Rect) {
        let table = &self.app.state.connections;
        let spec = table.sort_spec();

        let header = Row::new(SortKey::ALL.iter().enumerate().map(|(i, key)| {
            let marker = if *key == spec.key {
                if spec.ascending { " ▲" } else { " ▼" }
            } else {
                ""
            };
            Cell::from(format!("{} {}{}", i + 1, key.label(), marker))
        }))
        .style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

        let rows = table.sorted().into_iter().map(|record| {
            let location = format!(
                "{} {}",
                record.geo_flag.as_deref().unwrap_or(""),
                record
                    .geo_online_label
                    .as_deref()
                    .or(record.geo_local_label.as_deref())
                    .unwrap_or("")
            );
            Row::new(vec![
                Cell::from(record.process.clone().unwrap_or_default()),
                Cell::from(record.pid.map(|p| p.to_string()).unwrap_or_default()),
                Cell::from(record.local_address.clone().unwrap_or_default()),
                Cell::from(record.remote_address.clone().unwrap_or_default()),
                Cell::from(record.status.clone().unwrap_or_default()),
                Cell::from(location),
            ])
        });

        let widths = [
            Constraint::Percentage(16),
            Constraint::Length(8),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
            Constraint::Length(12),
            Constraint::Min(10),
        ];
        let title = format!(
            "{} - {}",
            self.section_title("Connections", Source::Connections),
            table.len()
        );
        let widget = Table::new(rows, widths)
            .header(header)
            .block(Block::default().borders(Borders::ALL).title(title))
            .style(Style::default().fg(Color::White));
        frame.render_widget(widget, area);
    }

    fn render_speedtest(&self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(LayoutDirection::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
            .split(area);

        for (direction, chunk) in [Direction::Download, Direction::Upload]
            .into_iter()
            .zip(chunks.iter())
        {
            let items: Vec<ListItem> = self
                .app
                .speed
                .log(direction)
                .iter()
                .map(|line| ListItem::new(Line::from(line.as_str())))
                .collect();
            let list = List::new(items)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(self.speed_title(direction)),
                )
                .style(Style::default().fg(Color::White));
            frame.render_widget(list, *chunk);
        }
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let footer = match &self.app.prompt {
            Some(line) => Paragraph::new(Line::from(vec![
                Span::styled(":", Style::default().fg(Color::Yellow)),
                Span::raw(line.clone()),
                Span::styled("█", Style::default().fg(Color::Yellow)),
            ]))
            .block(Block::default().borders(Borders::TOP).title(PROMPT_HELP)),
            None => Paragraph::new(
                "1-6 sort  d/u speed test  m mode  +/- size  x stop  r refresh  : command  c clear errors  q quit",
            )
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::TOP)),
        };
        frame.render_widget(footer, area);
    }

    /// Section name with its load state, e.g. "Whitelist (updated 12:00:03)"
    fn section_title(&self, name: &str, source: Source) -> String {
        let status = self.app.state.status(source);
        let suffix = match (status.status, status.last_success) {
            (LoadStatus::Failed, _) => " (failed)".to_string(),
            (LoadStatus::Loading, None) | (LoadStatus::Idle, None) => " (loading...)".to_string(),
            (_, Some(at)) => format!(" (updated {})", at.format("%H:%M:%S")),
            _ => String::new(),
        };
        format!("{}{}", name, suffix)
    }

    fn speed_title(&self, direction: Direction) -> String {
        let name = match direction {
            Direction::Download => "Download Test [d]",
            Direction::Upload => "Upload Test [u]",
        };
        let mode = match self.app.speed.mode {
            Mode::Single => "single",
            Mode::Multi => "multi",
        };
        let running = self
            .app
            .running()
            .filter(|running| running.direction == direction);
        match running {
            Some(running) => {
                let progress = running
                    .progress
                    .map(|(round, of)| format!("round {}/{}", round, of))
                    .unwrap_or_else(|| "starting".to_string());
                let stopping = if running.stop_requested() { ", stopping" } else { "" };
                format!("{} - {}{}", name, progress, stopping)
            }
            None => format!("{} - {} MB, {}", name, self.app.speed.size_mb, mode),
        }
    }
}
