//! User-initiated changes on the firewall service
//!
//! Each action validates its raw input first and only then issues a request.
//! On success it returns the text for a transient notification. A
//! [`ApiError::Validation`] means nothing was sent; an
//! [`ApiError::Transport`] belongs in the sticky error of [`Section::Actions`].

use log::info;

use crate::client::api::FirewallApi;
use crate::client::errors::{ApiError, ApiResult};
use crate::client::models::{
    DohReport, PortForward, PortSearchReply, ScanMode, ScanReply, ScanRequest,
};
use crate::formatting::format_latency;
use crate::notify::{NotificationCenter, Section};
use crate::validation::{
    check_credentials, check_log_limit, check_scan_hosts, check_scan_timeout, normalize_ip,
    parse_port, parse_scan_ports, parse_whitelist_import,
};

/// Routes the outcome of an action to the notification surface
pub fn report(notices: &mut NotificationCenter, outcome: &ApiResult<String>) {
    match outcome {
        Ok(message) => {
            notices.clear_error(Section::Actions);
            notices.notify(message.clone());
        }
        Err(ApiError::Validation(reason)) => notices.notify(reason.clone()),
        Err(err) => notices.set_error(Section::Actions, err.to_string()),
    }
}

/// Removes every "allow from Anywhere" rule except the panel port
pub async fn strictify(api: &dyn FirewallApi) -> ApiResult<String> {
    let reply = api.strictify().await?;
    info!(
        "Strictify removed {} rule(s), panel port {}",
        reply.deleted_anywhere, reply.panel_port
    );
    Ok(format!(
        "Removed {} 'Anywhere' allow rule(s); panel port {} stays open",
        reply.deleted_anywhere, reply.panel_port
    ))
}

/// Moves the admin panel; the service restarts on the new port
pub async fn set_panel_port(api: &dyn FirewallApi, input: &str) -> ApiResult<String> {
    let port = parse_port(input)?;
    api.set_panel_port(port).await?;
    Ok(format!(
        "Panel port saved, the service will restart on {}",
        port
    ))
}

/// Opens a port to whitelisted addresses only
pub async fn open_port(api: &dyn FirewallApi, input: &str) -> ApiResult<String> {
    let port = parse_port(input)?;
    api.open_port(port).await?;
    Ok(format!("Port {} opened for whitelisted addresses", port))
}

pub async fn whitelist_add(api: &dyn FirewallApi, input: &str) -> ApiResult<String> {
    let ip = normalize_ip(input)?;
    api.whitelist_add(&ip).await?;
    Ok(format!("{} added to the whitelist", ip))
}

/// Deletion is keyed by address; duplicates in the list are not distinguished
pub async fn whitelist_delete(api: &dyn FirewallApi, input: &str) -> ApiResult<String> {
    let ip = normalize_ip(input)?;
    api.whitelist_delete(&ip).await?;
    Ok(format!("{} removed from the whitelist", ip))
}

pub async fn block_ip(api: &dyn FirewallApi, input: &str) -> ApiResult<String> {
    let ip = normalize_ip(input)?;
    api.block_ip(&ip).await?;
    Ok(format!("{} blocked", ip))
}

pub async fn set_log_limit(api: &dyn FirewallApi, megabytes: u32) -> ApiResult<String> {
    let megabytes = check_log_limit(megabytes)?;
    api.set_log_limit(megabytes).await?;
    Ok(format!("Log limit set to {} MB, rotation checked", megabytes))
}

pub async fn port_search(api: &dyn FirewallApi, input: &str) -> ApiResult<PortSearchReply> {
    let port = parse_port(input)?;
    api.port_search(port).await
}

/// Lines describing who holds a port
pub fn describe_port_holders(reply: &PortSearchReply) -> Vec<String> {
    let mut lines = vec![format!("Port {} is held by:", reply.port)];
    if reply.results.is_empty() {
        lines.push("nothing".to_string());
        return lines;
    }
    for holder in &reply.results {
        lines.push(format!(
            "{} (PID {})  {}  -> {}  [{}]",
            holder.process.as_deref().unwrap_or(""),
            holder.pid.map(|p| p.to_string()).unwrap_or_default(),
            holder.local_address.as_deref().unwrap_or(""),
            holder.remote_address.as_deref().unwrap_or(""),
            holder.status.as_deref().unwrap_or(""),
        ));
        if let Some(exe) = holder.executable.as_deref().filter(|e| !e.is_empty()) {
            lines.push(format!("  {}", exe));
        }
    }
    lines
}

pub async fn forward_add(
    api: &dyn FirewallApi,
    src_port: &str,
    dst_ip: &str,
    dst_port: &str,
) -> ApiResult<String> {
    let forward = PortForward {
        src_port: parse_port(src_port)?,
        dst_ip: normalize_ip(dst_ip)?,
        dst_port: parse_port(dst_port)?,
    };
    api.forward_add(&forward).await?;
    Ok(format!(
        "Forwarding port {} to {}:{}",
        forward.src_port, forward.dst_ip, forward.dst_port
    ))
}

pub async fn forward_delete(api: &dyn FirewallApi, src_port: &str) -> ApiResult<String> {
    let port = parse_port(src_port)?;
    api.forward_delete(port).await?;
    Ok(format!("Forward on port {} removed", port))
}

/// Changes the panel login and port; the service restarts on the new port
pub async fn set_panel_credentials(
    api: &dyn FirewallApi,
    username: &str,
    password: &str,
    port: &str,
) -> ApiResult<String> {
    let port = parse_port(port)?;
    check_credentials(username, password)?;
    let username = username.trim();
    api.set_panel_credentials(username, password, port).await?;
    info!("Panel credentials changed for {}", username);
    Ok(format!(
        "Credentials for {} saved, the service will restart on {}",
        username, port
    ))
}

/// Adds every address found in a whitelist file
pub async fn import_whitelist(api: &dyn FirewallApi, contents: &str) -> ApiResult<String> {
    let import = parse_whitelist_import(contents)?;
    api.import_whitelist(import.to_file()).await?;
    let mut message = format!("{} address(es) sent to the whitelist", import.addresses.len());
    if import.skipped > 0 {
        message.push_str(&format!(", {} line(s) skipped", import.skipped));
    }
    Ok(message)
}

/// Asks the service to probe `hosts`; ports are ignored for ICMP
pub async fn scan(
    api: &dyn FirewallApi,
    hosts: &[String],
    mode: ScanMode,
    ports: &str,
    timeout_secs: f64,
) -> ApiResult<ScanReply> {
    let request = ScanRequest {
        hosts: check_scan_hosts(hosts)?,
        ports: match mode {
            ScanMode::Icmp => String::new(),
            ScanMode::Tcp | ScanMode::Udp => parse_scan_ports(ports)?,
        },
        timeout: check_scan_timeout(timeout_secs)?,
        mode,
    };
    info!(
        "Scanning {} host(s), mode {:?}, ports '{}'",
        request.hosts.len(),
        mode,
        request.ports
    );
    api.scan(&request).await
}

/// One line per probed host and port
pub fn describe_scan(reply: &ScanReply) -> Vec<String> {
    if reply.results.is_empty() {
        return vec!["No results".to_string()];
    }
    reply
        .results
        .iter()
        .map(|row| {
            let target = match row.port {
                Some(port) => format!("{}:{}", row.host, port),
                None => row.host.clone(),
            };
            let mut line = format!("{:<28} {:<16} {:<12}", target, row.ip, row.verdict());
            if let Some(ms) = row.latency() {
                line.push_str(&format_latency(ms));
            }
            if let Some(error) = &row.error {
                line.push_str(&format!("  ({})", error));
            }
            line.trim_end().to_string()
        })
        .collect()
}

/// One line per DNS-over-HTTPS resolver
pub fn describe_doh(report: &DohReport) -> Vec<String> {
    if report.doh.is_empty() {
        return vec!["No resolvers reported".to_string()];
    }
    report
        .doh
        .iter()
        .map(|(name, probe)| {
            if !probe.ok {
                let reason = probe.error.as_deref().unwrap_or("no answer");
                return format!("{:<12} failed ({})", name, reason);
            }
            let mut line = format!(
                "{:<12} ok {}",
                name,
                probe.ms.map(format_latency).unwrap_or_default()
            );
            if let Some(data) = probe.answer.as_ref().and_then(|a| a.data.as_deref()) {
                line.push_str(&format!("  -> {}", data));
            }
            line.trim_end().to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::models::{DohAnswer, DohProbe, PortHolder, ScanResult};

    #[test]
    fn test_report_routes_by_error_kind() {
        let mut notices = NotificationCenter::default();
        let now = std::time::Instant::now();

        report(&mut notices, &Err(ApiError::validation("please enter a port")));
        assert!(!notices.has_errors());
        assert_eq!(notices.toast_at(now), Some("please enter a port"));

        report(&mut notices, &Err(ApiError::transport("/api/open/22", "HTTP 500")));
        assert_eq!(
            notices.error(Section::Actions),
            Some("/api/open/22: HTTP 500")
        );

        report(&mut notices, &Ok("done".to_string()));
        assert!(!notices.has_errors());
    }

    #[test]
    fn test_describe_port_holders() {
        let empty = PortSearchReply {
            port: 8080,
            results: Vec::new(),
        };
        assert_eq!(
            describe_port_holders(&empty),
            vec!["Port 8080 is held by:", "nothing"]
        );

        let busy = PortSearchReply {
            port: 22,
            results: vec![PortHolder {
                process: Some("sshd".into()),
                pid: Some(700),
                local_address: Some("0.0.0.0:22".into()),
                remote_address: None,
                status: Some("LISTEN".into()),
                executable: Some("/usr/sbin/sshd".into()),
            }],
        };
        let lines = describe_port_holders(&busy);
        assert_eq!(lines[1], "sshd (PID 700)  0.0.0.0:22  ->   [LISTEN]");
        assert_eq!(lines[2], "  /usr/sbin/sshd");
    }

    #[test]
    fn test_describe_scan() {
        let reply = ScanReply {
            mode: "tcp".into(),
            results: vec![
                ScanResult {
                    host: "db".into(),
                    ip: "10.0.0.5".into(),
                    port: Some(5432),
                    open: Some(true),
                    latency_ms: Some(1.25),
                    ..ScanResult::default()
                },
                ScanResult {
                    host: "lost".into(),
                    ok: Some(false),
                    error: Some("timeout".into()),
                    ..ScanResult::default()
                },
            ],
            error: None,
        };
        let lines = describe_scan(&reply);
        assert!(lines[0].starts_with("db:5432"));
        assert!(lines[0].contains("open"));
        assert!(lines[0].ends_with("1.25 ms"));
        assert!(lines[1].contains("unreachable"));
        assert!(lines[1].ends_with("(timeout)"));

        assert_eq!(describe_scan(&ScanReply::default()), vec!["No results"]);
    }

    #[test]
    fn test_describe_doh() {
        let mut report = DohReport::default();
        report.doh.insert(
            "google".into(),
            DohProbe {
                ok: true,
                ms: Some(23.5),
                answer: Some(DohAnswer {
                    data: Some("93.184.215.14".into()),
                    ..DohAnswer::default()
                }),
                error: None,
            },
        );
        report.doh.insert(
            "cloudflare".into(),
            DohProbe {
                error: Some("timed out".into()),
                ..DohProbe::default()
            },
        );
        assert_eq!(
            describe_doh(&report),
            vec![
                "cloudflare   failed (timed out)",
                "google       ok 23.50 ms  -> 93.184.215.14",
            ]
        );
    }
}
