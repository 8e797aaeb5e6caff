use anyhow::{Context, Result};
use clap::Parser;
use log::debug;
use std::sync::Arc;

use fw_watcher::cli::commands::Commands;
use fw_watcher::cli::{Cli, CommandHandler};
use fw_watcher::client::{FirewallApi, HttpFirewallClient};
use fw_watcher::dashboard::Dashboard;
use fw_watcher::settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?
        .with_overrides(cli.url, cli.user, cli.password)?;
    if let Commands::Live {
        interval: Some(seconds),
    } = &cli.command
    {
        settings.poll_interval_secs = *seconds;
        settings.validate()?;
    }
    debug!("Using firewall service at {}", settings.base_url);

    let api: Arc<dyn FirewallApi> = Arc::new(
        HttpFirewallClient::new(&settings).context("Failed to create the HTTP client")?,
    );

    if let Commands::Live { .. } = cli.command {
        let mut dashboard = Dashboard::new(api, &settings);
        return dashboard.run().await;
    }

    let handler = CommandHandler::new(api, settings);
    match cli.command {
        Commands::Live { .. } => Ok(()),
        Commands::Status {
            detailed,
            sort,
            descending,
        } => handler.handle_status_command(detailed, sort, descending).await,
        Commands::Speedtest {
            direction,
            size,
            multi,
        } => handler.handle_speedtest_command(direction, size, multi).await,
        Commands::Strictify => handler.handle_strictify_command().await,
        Commands::PanelPort { port } => handler.handle_panel_port_command(&port).await,
        Commands::Open { port } => handler.handle_open_command(&port).await,
        Commands::Allow { ip } => handler.handle_allow_command(&ip).await,
        Commands::Block { ip } => handler.handle_block_command(&ip).await,
        Commands::Whitelist { action } => handler.handle_whitelist_command(action).await,
        Commands::LogLimit { megabytes } => handler.handle_log_limit_command(megabytes).await,
        Commands::PortSearch { port } => handler.handle_port_search_command(&port).await,
        Commands::Forward { action } => handler.handle_forward_command(action).await,
        Commands::ClientInfo => handler.handle_client_info_command().await,
        Commands::Export { kind, output } => handler.handle_export_command(kind, output).await,
        Commands::PanelCred {
            username,
            port,
            new_password,
        } => {
            handler
                .handle_panel_cred_command(&username, &port, &new_password)
                .await
        }
        Commands::Scan {
            hosts,
            mode,
            ports,
            timeout,
        } => handler.handle_scan_command(&hosts, mode, &ports, timeout).await,
        Commands::DohInfo => handler.handle_doh_info_command().await,
        Commands::Logout => handler.handle_logout_command().await,
    }
}
