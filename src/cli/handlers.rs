use anyhow::{Context, Result, bail};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::actions;
use crate::cli::commands::{ForwardAction, WhitelistAction};
use crate::client::api::{ExportKind, FirewallApi};
use crate::client::errors::ApiResult;
use crate::client::models::ScanMode;
use crate::connections::{ConnectionTable, SortKey, SortSpec};
use crate::formatting::{format_bytes, format_rate};
use crate::notify::NotificationCenter;
use crate::poller::{DashboardState, Poller, Source};
use crate::settings::Settings;
use crate::speedtest::{Direction, Mode, SpeedSession, SpeedTestEngine};

/// Runs the one-shot commands against a connected client
pub struct CommandHandler {
    api: Arc<dyn FirewallApi>,
    settings: Settings,
}

impl CommandHandler {
    pub fn new(api: Arc<dyn FirewallApi>, settings: Settings) -> Self {
        Self { api, settings }
    }

    pub async fn handle_status_command(
        &self,
        detailed: bool,
        sort: SortKey,
        descending: bool,
    ) -> Result<()> {
        let poller = Poller::new(self.api.clone(), self.settings.poll_interval());
        let cycle = poller.poll_once().await;
        let failures = cycle.failures();

        let mut notices = NotificationCenter::new(self.settings.toast_duration());
        let mut state = DashboardState::new();
        state.connections = ConnectionTable::with_sort(SortSpec {
            key: sort,
            ascending: !descending,
        });
        for update in cycle.into_updates() {
            state.apply(update, &mut notices);
        }

        println!("Firewall Status ({})", self.settings.base_url);
        println!("====================");

        println!("\nTraffic:");
        match &state.traffic {
            Some(traffic) => {
                println!("  Download: {}", format_rate(traffic.rx_rate));
                println!("  Upload:   {}", format_rate(traffic.tx_rate));
                println!("  Total Received: {}", format_bytes(traffic.accumulated_rx));
                println!("  Total Sent:     {}", format_bytes(traffic.accumulated_tx));
                if detailed {
                    for iface in &traffic.per_interface {
                        println!(
                            "    {:<12} rx {:>12}  tx {:>12}",
                            iface.name,
                            format_bytes(iface.rx),
                            format_bytes(iface.tx)
                        );
                    }
                }
            }
            None => print_source_error(&state, Source::Traffic),
        }

        println!("\nWhitelist ({}):", state.whitelist.len());
        print_source_error(&state, Source::Whitelist);
        for entry in &state.whitelist {
            println!(
                "  {:<40} {} {}",
                entry.ip,
                entry.geo_flag.as_deref().unwrap_or(""),
                entry.geo_online_label.as_deref().unwrap_or("")
            );
        }

        if detailed {
            println!("\nRules ({}):", state.rules.len());
            print_source_error(&state, Source::Rules);
            for rule in &state.rules {
                println!("  {}", rule);
            }
        }

        let spec = state.connections.sort_spec();
        println!(
            "\nConnections ({}, by {} {}):",
            state.connections.len(),
            spec.key.label(),
            if spec.ascending { "asc" } else { "desc" }
        );
        print_source_error(&state, Source::Connections);
        for record in state.connections.sorted() {
            println!(
                "  {:<16} {:>7}  {:<24} {:<24} {:<12} {}",
                record.process.as_deref().unwrap_or(""),
                record.pid.map(|p| p.to_string()).unwrap_or_default(),
                record.local_address.as_deref().unwrap_or(""),
                record.remote_address.as_deref().unwrap_or(""),
                record.status.as_deref().unwrap_or(""),
                record.geo_online_label.as_deref().unwrap_or("")
            );
        }

        if failures == Source::ALL.len() {
            bail!("all {} sources failed", failures);
        }
        Ok(())
    }

    pub async fn handle_speedtest_command(
        &self,
        direction: Direction,
        size: Option<u32>,
        multi: bool,
    ) -> Result<()> {
        let size_mb = size.unwrap_or(self.settings.speedtest_size_mb);
        let mode = if multi { Mode::Multi } else { Mode::Single };
        let engine = SpeedTestEngine::new(self.api.clone())
            .with_multi_rounds(self.settings.speedtest_rounds);

        let stop = CancellationToken::new();
        let ctrl_c = tokio::spawn({
            let stop = stop.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    println!("Stopping after the current round...");
                    stop.cancel();
                }
            }
        });

        println!(
            "Running {} test: {} MB, {} round(s) (Ctrl-C to stop)",
            direction,
            size_mb,
            mode.rounds(self.settings.speedtest_rounds)
        );
        let outcome = engine.run(direction, size_mb, mode, &stop).await;
        ctrl_c.abort();

        match outcome {
            Ok(session) => {
                print_session(&session);
                Ok(())
            }
            Err(err) => {
                if let Some(partial) = err.completed() {
                    print_session(partial);
                }
                error!("Speed test failed: {}", err);
                Err(err.into())
            }
        }
    }

    pub async fn handle_strictify_command(&self) -> Result<()> {
        finish(actions::strictify(self.api.as_ref()).await)
    }

    pub async fn handle_panel_port_command(&self, port: &str) -> Result<()> {
        finish(actions::set_panel_port(self.api.as_ref(), port).await)
    }

    pub async fn handle_open_command(&self, port: &str) -> Result<()> {
        finish(actions::open_port(self.api.as_ref(), port).await)
    }

    pub async fn handle_allow_command(&self, ip: &str) -> Result<()> {
        finish(actions::whitelist_add(self.api.as_ref(), ip).await)
    }

    pub async fn handle_block_command(&self, ip: &str) -> Result<()> {
        finish(actions::block_ip(self.api.as_ref(), ip).await)
    }

    pub async fn handle_whitelist_command(&self, action: WhitelistAction) -> Result<()> {
        let outcome = match action {
            WhitelistAction::Add { ip } => actions::whitelist_add(self.api.as_ref(), &ip).await,
            WhitelistAction::Delete { ip } => {
                actions::whitelist_delete(self.api.as_ref(), &ip).await
            }
            WhitelistAction::Import { file } => {
                let contents = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                actions::import_whitelist(self.api.as_ref(), &contents).await
            }
        };
        finish(outcome)
    }

    pub async fn handle_log_limit_command(&self, megabytes: u32) -> Result<()> {
        finish(actions::set_log_limit(self.api.as_ref(), megabytes).await)
    }

    pub async fn handle_port_search_command(&self, port: &str) -> Result<()> {
        let reply = actions::port_search(self.api.as_ref(), port).await?;
        for line in actions::describe_port_holders(&reply) {
            println!("{}", line);
        }
        Ok(())
    }

    pub async fn handle_forward_command(&self, action: ForwardAction) -> Result<()> {
        match action {
            ForwardAction::List => {
                let forwards = self.api.forwards().await?.forwards;
                if forwards.is_empty() {
                    println!("No port forwards configured");
                }
                for forward in forwards {
                    println!(
                        "  {:>5} -> {}:{}",
                        forward.src_port, forward.dst_ip, forward.dst_port
                    );
                }
                Ok(())
            }
            ForwardAction::Add {
                src_port,
                dst_ip,
                dst_port,
            } => finish(actions::forward_add(self.api.as_ref(), &src_port, &dst_ip, &dst_port).await),
            ForwardAction::Delete { src_port } => {
                finish(actions::forward_delete(self.api.as_ref(), &src_port).await)
            }
        }
    }

    pub async fn handle_client_info_command(&self) -> Result<()> {
        let info = self.api.client_info().await?;
        println!("Address:  {}", info.ip);
        println!(
            "Location: {} {}",
            info.geo.flag.as_deref().unwrap_or(""),
            info.geo
                .online
                .as_deref()
                .or(info.geo.local.as_deref())
                .unwrap_or("unknown")
        );
        Ok(())
    }

    pub async fn handle_export_command(
        &self,
        kind: ExportKind,
        output: Option<PathBuf>,
    ) -> Result<()> {
        let body = self.api.export(kind).await?;
        match output {
            Some(path) => {
                std::fs::write(&path, &body)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Exported {} bytes to {}", body.len(), path.display());
                println!("Saved to {}", path.display());
            }
            None => print!("{}", body),
        }
        Ok(())
    }

    pub async fn handle_panel_cred_command(
        &self,
        username: &str,
        port: &str,
        new_password: &str,
    ) -> Result<()> {
        finish(
            actions::set_panel_credentials(self.api.as_ref(), username, new_password, port).await,
        )
    }

    pub async fn handle_scan_command(
        &self,
        hosts: &[String],
        mode: ScanMode,
        ports: &str,
        timeout: f64,
    ) -> Result<()> {
        let reply = actions::scan(self.api.as_ref(), hosts, mode, ports, timeout).await?;
        println!("Scan results ({}):", reply.mode);
        for line in actions::describe_scan(&reply) {
            println!("  {}", line);
        }
        Ok(())
    }

    pub async fn handle_doh_info_command(&self) -> Result<()> {
        let report = self.api.doh_info().await?;
        println!("DNS-over-HTTPS from the service:");
        for line in actions::describe_doh(&report) {
            println!("  {}", line);
        }
        Ok(())
    }

    pub async fn handle_logout_command(&self) -> Result<()> {
        self.api.logout().await?;
        println!("Logged out");
        Ok(())
    }
}

fn finish(outcome: ApiResult<String>) -> Result<()> {
    let message = outcome?;
    println!("{}", message);
    Ok(())
}

fn print_source_error(state: &DashboardState, source: Source) {
    if let Some(reason) = &state.status(source).error {
        println!("  (unavailable: {})", reason);
    }
}

fn print_session(session: &SpeedSession) {
    for line in session.log_lines() {
        println!("  {}", line);
    }
}
