use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::client::api::ExportKind;
use crate::client::models::ScanMode;
use crate::connections::SortKey;
use crate::speedtest::Direction;

/// Main CLI structure for the fw-watcher application
/// Uses clap's derive macros for automatic CLI generation
#[derive(Parser)]
#[command(author = "Kaipo Chen")]
#[command(version)] // Automatically uses version from Cargo.toml
#[command(about = "Firewall Watcher - live dashboard, controls and speed tests for a remote host firewall service")]
#[command(long_about = "Firewall Watcher talks to a host firewall / traffic-monitoring service over HTTP. \
It polls firewall rules, the IP whitelist, traffic counters and active connections into a live terminal \
dashboard, runs download/upload throughput tests against the service, and exposes the service's \
rule and whitelist controls as commands.\n\n\
Settings are read from fww.toml (or --config), then FWW_* environment variables, then flags.")]
pub struct Cli {
    /// Settings file (TOML, YAML or JSON)
    #[arg(short, long, global = true, help = "Settings file path")]
    pub config: Option<PathBuf>,

    /// Root URL of the firewall service, e.g. http://10.0.0.1:48080
    #[arg(short = 'U', long, global = true, help = "Firewall service URL")]
    pub url: Option<String>,

    /// Username for HTTP Basic credentials
    #[arg(long, global = true, help = "Username for the service")]
    pub user: Option<String>,

    /// Password for HTTP Basic credentials
    #[arg(long, global = true, help = "Password for the service")]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands for the fw-watcher application
/// Each variant represents a different mode of operation
#[derive(Subcommand)]
pub enum Commands {
    /// Real-time dashboard polling rules, whitelist, traffic and connections
    #[command(about = "Open the live dashboard")]
    #[command(long_about = "Launches an interactive terminal dashboard that refreshes every poll interval. \
Each section updates independently: a failing source shows its own error while the others keep updating.\n\n\
Keys:\n  \
1-6        sort connections by column (again to reverse)\n  \
d / u      start a download / upload speed test\n  \
m          toggle single / multi-round mode\n  \
+ / -      change speed-test size\n  \
x          stop the running speed test after the current round\n  \
r          refresh now\n  \
c          dismiss errors\n  \
q / ESC    quit")]
    Live {
        /// How often to poll the service (in seconds)
        #[arg(short = 'i', long, help = "Poll interval in seconds (default from settings: 3)")]
        interval: Option<u64>,
    },

    /// One poll cycle printed to the terminal
    #[command(about = "Show rules, whitelist, traffic and connections once")]
    Status {
        /// Include per-interface counters and firewall rules
        #[arg(short, long, help = "Show detailed information")]
        detailed: bool,

        /// Column to sort connections by
        #[arg(short, long, value_enum, default_value = "process", help = "Sort connections by column")]
        sort: SortKey,

        /// Reverse the connection sort order
        #[arg(long, help = "Sort connections in descending order")]
        descending: bool,
    },

    /// Throughput measurement against the service
    #[command(about = "Run a download or upload speed test")]
    #[command(long_about = "Measures throughput by timing transfers of a fixed payload size. \
Download rounds stream server-generated bytes; upload rounds send random bytes and use the \
server's received count. Ctrl-C stops the session after the current round.\n\n\
Examples:\n  \
fww speedtest down                    # single 20 MB download round\n  \
fww speedtest up --size 50 --multi    # five 50 MB upload rounds with average")]
    Speedtest {
        #[arg(value_enum, help = "Direction: down or up")]
        direction: Direction,

        /// Payload size per round in megabytes (1-200)
        #[arg(short, long, help = "Megabytes per round (default from settings: 20)")]
        size: Option<u32>,

        /// Run the multi-round session instead of a single round
        #[arg(short, long, help = "Run multiple rounds and report the average")]
        multi: bool,
    },

    /// Delete every "allow from Anywhere" rule except the panel port
    #[command(about = "Tighten firewall rules")]
    Strictify,

    /// Move the admin panel to another port
    #[command(about = "Change the admin panel port")]
    PanelPort {
        #[arg(help = "New panel port (1-65535)")]
        port: String,
    },

    /// Open a port for whitelisted addresses only
    #[command(about = "Open a port to the whitelist")]
    Open {
        #[arg(help = "Port to open (1-65535)")]
        port: String,
    },

    /// Allow all traffic from an address (adds it to the whitelist)
    #[command(about = "Allow an IP address")]
    Allow {
        #[arg(help = "IPv4 or IPv6 address")]
        ip: String,
    },

    /// Block all traffic from an address
    #[command(about = "Block an IP address")]
    Block {
        #[arg(help = "IPv4 or IPv6 address")]
        ip: String,
    },

    /// Manage the IP whitelist
    #[command(about = "Add or remove whitelist entries")]
    Whitelist {
        #[command(subcommand)]
        action: WhitelistAction,
    },

    /// Cap the size of the service's audit log
    #[command(about = "Set the audit log size limit")]
    LogLimit {
        #[arg(help = "Limit in megabytes (at least 1)")]
        megabytes: u32,
    },

    /// Show which processes hold a port
    #[command(about = "Look up who is using a port")]
    PortSearch {
        #[arg(help = "Port to look up (1-65535)")]
        port: String,
    },

    /// Manage DNAT port forwards
    #[command(about = "List, add or delete port forwards")]
    Forward {
        #[command(subcommand)]
        action: ForwardAction,
    },

    /// Show how the service sees this client
    #[command(about = "Show this client's address and location")]
    ClientInfo,

    /// Download an export from the service
    #[command(about = "Export audit logs or the whitelist")]
    Export {
        #[arg(value_enum, help = "What to export: logs, whitelist")]
        kind: ExportKind,

        /// File to write; prints to stdout when omitted
        #[arg(short, long, help = "Output file path")]
        output: Option<PathBuf>,
    },

    /// Replace the panel login and move it to another port
    #[command(about = "Change the admin panel credentials and port")]
    #[command(long_about = "Stores a new username and password for the admin panel and moves it to PORT. \
The service restarts afterwards; later commands need the new --user/--password and --url.")]
    PanelCred {
        #[arg(help = "New panel username")]
        username: String,

        #[arg(help = "New panel port (1-65535)")]
        port: String,

        /// New panel password
        #[arg(long, help = "New panel password")]
        new_password: String,
    },

    /// Probe hosts from the service's side of the network
    #[command(about = "Ping or port-scan hosts from the firewall host")]
    #[command(long_about = "Asks the service to probe up to 64 hosts. ICMP sends three pings per host; \
TCP and UDP probe each listed port (or the service's common port list).\n\n\
Examples:\n  \
fww scan 10.0.0.1 10.0.0.2                        # ICMP reachability\n  \
fww scan db.internal --mode tcp --ports 22,5432   # TCP connect probes\n  \
fww scan 10.0.0.1 --mode udp --ports common       # UDP probes on common ports")]
    Scan {
        #[arg(required = true, num_args = 1.., help = "Host names or IP addresses")]
        hosts: Vec<String>,

        #[arg(short, long, value_enum, default_value = "icmp", help = "Probe kind")]
        mode: ScanMode,

        /// Comma-separated ports or "common"
        #[arg(short, long, default_value = "common", help = "Ports for tcp/udp probes")]
        ports: String,

        /// Per-probe timeout in seconds
        #[arg(short, long, default_value_t = 1.0, help = "Probe timeout in seconds (max 10)")]
        timeout: f64,
    },

    /// Time DNS-over-HTTPS lookups made by the service
    #[command(about = "Show DNS-over-HTTPS resolver latency")]
    DohInfo,

    /// End the session with the service
    #[command(about = "Log out")]
    Logout,
}

#[derive(Subcommand)]
pub enum WhitelistAction {
    /// Add an address
    Add {
        #[arg(help = "IPv4 or IPv6 address")]
        ip: String,
    },
    /// Remove an address
    Delete {
        #[arg(help = "IPv4 or IPv6 address")]
        ip: String,
    },
    /// Add every address listed in a file
    Import {
        #[arg(help = "File with one 'ip | ...' entry per line, as written by export")]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum ForwardAction {
    /// List configured forwards
    List,
    /// Forward a local port to another host
    Add {
        #[arg(help = "Local port")]
        src_port: String,
        #[arg(help = "Destination address")]
        dst_ip: String,
        #[arg(help = "Destination port")]
        dst_port: String,
    },
    /// Remove the forward on a local port
    Delete {
        #[arg(help = "Local port")]
        src_port: String,
    },
}
