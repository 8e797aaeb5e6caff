//! Client-side input checks
//!
//! Every action validates its input here before a request is built. A rejected
//! input is reported as [`ApiError::Validation`] and nothing is sent.

use std::collections::BTreeSet;
use std::net::IpAddr;

use crate::client::errors::{ApiError, ApiResult};

/// Largest download the service will generate per round
pub const MAX_SPEEDTEST_MB: u32 = 200;

/// Parses a TCP port in `1..=65535`
pub fn parse_port(input: &str) -> ApiResult<u16> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("please enter a port"));
    }
    match trimmed.parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => Ok(port as u16),
        _ => Err(ApiError::validation(format!(
            "'{}' is not a valid port (1-65535)",
            trimmed
        ))),
    }
}

/// Parses an IPv4/IPv6 address and returns it in the form the service stores
///
/// IPv4-mapped IPv6 (`::ffff:1.2.3.4`) is reduced to the IPv4 address and any
/// `%zone` suffix is dropped.
pub fn normalize_ip(input: &str) -> ApiResult<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("please enter an IP address"));
    }

    let mut candidate = trimmed;
    if let Some(rest) = candidate.strip_prefix("::ffff:") {
        candidate = rest;
    }
    if let Some((address, _zone)) = candidate.split_once('%') {
        candidate = address;
    }

    candidate
        .parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .map_err(|_| ApiError::validation(format!("'{}' is not a valid IP address", trimmed)))
}

/// Audit log cap in megabytes, at least 1
pub fn check_log_limit(megabytes: u32) -> ApiResult<u32> {
    if megabytes < 1 {
        return Err(ApiError::validation("log limit must be at least 1 MB"));
    }
    Ok(megabytes)
}

/// Speed-test payload size in megabytes, `1..=200`
pub fn check_speedtest_size(megabytes: u32) -> ApiResult<u32> {
    if !(1..=MAX_SPEEDTEST_MB).contains(&megabytes) {
        return Err(ApiError::validation(format!(
            "speed test size must be between 1 and {} MB",
            MAX_SPEEDTEST_MB
        )));
    }
    Ok(megabytes)
}

/// Hosts accepted by one scan request
pub const MAX_SCAN_HOSTS: usize = 64;

/// Distinct ports accepted by one scan request
pub const MAX_SCAN_PORTS: usize = 256;

pub const MAX_SCAN_TIMEOUT_SECS: f64 = 10.0;

/// Accepts an IP address (normalised) or a DNS hostname
pub fn check_scan_host(input: &str) -> ApiResult<String> {
    let trimmed = input.trim();
    if let Ok(ip) = normalize_ip(trimmed) {
        return Ok(ip);
    }
    let name = trimmed.strip_suffix('.').unwrap_or(trimmed);
    let valid_label = |label: &str| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    if name.is_empty() || name.len() > 253 || !name.split('.').all(valid_label) {
        return Err(ApiError::validation(format!(
            "'{}' is not a valid host name or IP address",
            trimmed
        )));
    }
    Ok(name.to_ascii_lowercase())
}

/// Validates every scan target; at least one, at most [`MAX_SCAN_HOSTS`]
pub fn check_scan_hosts(inputs: &[String]) -> ApiResult<Vec<String>> {
    let hosts = inputs
        .iter()
        .filter(|h| !h.trim().is_empty())
        .map(|h| check_scan_host(h))
        .collect::<ApiResult<Vec<_>>>()?;
    if hosts.is_empty() {
        return Err(ApiError::validation("please enter at least one host"));
    }
    if hosts.len() > MAX_SCAN_HOSTS {
        return Err(ApiError::validation(format!(
            "at most {} hosts per scan",
            MAX_SCAN_HOSTS
        )));
    }
    Ok(hosts)
}

/// Normalises a scan port list to `common` or sorted, distinct ports
///
/// Both `,` and the full-width `，` separate ports.
pub fn parse_scan_ports(input: &str) -> ApiResult<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("common") {
        return Ok("common".to_string());
    }
    let ports = trimmed
        .split([',', '，'])
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(parse_port)
        .collect::<ApiResult<BTreeSet<u16>>>()?;
    if ports.is_empty() {
        return Err(ApiError::validation("please enter at least one port"));
    }
    if ports.len() > MAX_SCAN_PORTS {
        return Err(ApiError::validation(format!(
            "at most {} ports per scan",
            MAX_SCAN_PORTS
        )));
    }
    Ok(ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(","))
}

/// Per-probe timeout in seconds, `(0, 10]`
pub fn check_scan_timeout(seconds: f64) -> ApiResult<f64> {
    if !seconds.is_finite() || seconds <= 0.0 || seconds > MAX_SCAN_TIMEOUT_SECS {
        return Err(ApiError::validation(format!(
            "scan timeout must be above 0 and at most {} seconds",
            MAX_SCAN_TIMEOUT_SECS
        )));
    }
    Ok(seconds)
}

/// Panel login; both fields must be non-blank
pub fn check_credentials(username: &str, password: &str) -> ApiResult<()> {
    if username.trim().is_empty() {
        return Err(ApiError::validation("please enter a username"));
    }
    if password.is_empty() {
        return Err(ApiError::validation("please enter a password"));
    }
    Ok(())
}

/// Addresses read from a whitelist file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhitelistImport {
    /// Normalised and de-duplicated, in file order
    pub addresses: Vec<String>,
    /// Non-blank lines without a valid address
    pub skipped: usize,
}

impl WhitelistImport {
    /// File body sent to the service, one address per line
    pub fn to_file(&self) -> String {
        let mut body = self.addresses.join("\n");
        body.push('\n');
        body
    }
}

/// Reads `ip | flag | labels` lines as written by the whitelist export
pub fn parse_whitelist_import(contents: &str) -> ApiResult<WhitelistImport> {
    let mut import = WhitelistImport::default();
    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        let field = line.split('|').next().unwrap_or_default();
        match normalize_ip(field) {
            Ok(ip) if !import.addresses.contains(&ip) => import.addresses.push(ip),
            Ok(_) => {}
            Err(_) => import.skipped += 1,
        }
    }
    if import.addresses.is_empty() {
        return Err(ApiError::validation("no valid IP address in the file"));
    }
    Ok(import)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_bounds() {
        assert_eq!(parse_port("22").unwrap(), 22);
        assert_eq!(parse_port(" 65535 ").unwrap(), 65535);
        assert!(parse_port("0").unwrap_err().is_validation());
        assert!(parse_port("65536").is_err());
        assert!(parse_port("-1").is_err());
        assert!(parse_port("ssh").is_err());
        assert!(parse_port("").is_err());
    }

    #[test]
    fn test_normalize_ip() {
        assert_eq!(normalize_ip("1.2.3.4").unwrap(), "1.2.3.4");
        assert_eq!(normalize_ip(" 10.0.0.1 ").unwrap(), "10.0.0.1");
        assert_eq!(normalize_ip("::ffff:192.168.1.7").unwrap(), "192.168.1.7");
        assert_eq!(normalize_ip("fe80::1%eth0").unwrap(), "fe80::1");
        assert_eq!(normalize_ip("2001:DB8::1").unwrap(), "2001:db8::1");
    }

    #[test]
    fn test_normalize_ip_rejects_garbage() {
        assert!(normalize_ip("").is_err());
        assert!(normalize_ip("999.1.1.1").is_err());
        assert!(normalize_ip("example.com").is_err());
        assert!(normalize_ip("1.2.3.4/24").is_err());
    }

    #[test]
    fn test_limits() {
        assert!(check_log_limit(0).is_err());
        assert_eq!(check_log_limit(5).unwrap(), 5);

        assert!(check_speedtest_size(0).is_err());
        assert!(check_speedtest_size(201).is_err());
        assert_eq!(check_speedtest_size(200).unwrap(), 200);
    }

    #[test]
    fn test_scan_hosts() {
        assert_eq!(check_scan_host(" ::ffff:10.0.0.1 ").unwrap(), "10.0.0.1");
        assert_eq!(check_scan_host("DB-1.example.com.").unwrap(), "db-1.example.com");
        assert!(check_scan_host("-bad.example").is_err());
        assert!(check_scan_host("exa mple.com").is_err());
        assert!(check_scan_host("host;rm -rf").is_err());
        assert!(check_scan_host("").is_err());

        assert!(check_scan_hosts(&["  ".to_string()]).is_err());
        let many: Vec<String> = (0..65).map(|i| format!("10.0.0.{}", i)).collect();
        assert!(check_scan_hosts(&many).is_err());
        assert_eq!(check_scan_hosts(&many[..64]).unwrap().len(), 64);
    }

    #[test]
    fn test_scan_ports() {
        assert_eq!(parse_scan_ports("").unwrap(), "common");
        assert_eq!(parse_scan_ports("Common").unwrap(), "common");
        assert_eq!(parse_scan_ports("443, 22，80,22,").unwrap(), "22,80,443");
        assert!(parse_scan_ports("22,0").unwrap_err().is_validation());
        assert!(parse_scan_ports("ssh").is_err());
        assert!(parse_scan_ports(" , ").is_err());

        let too_many: Vec<String> = (1..=257).map(|p| p.to_string()).collect();
        assert!(parse_scan_ports(&too_many.join(",")).is_err());
    }

    #[test]
    fn test_scan_timeout_and_credentials() {
        assert_eq!(check_scan_timeout(1.0).unwrap(), 1.0);
        assert!(check_scan_timeout(0.0).is_err());
        assert!(check_scan_timeout(10.5).is_err());
        assert!(check_scan_timeout(f64::NAN).is_err());

        assert!(check_credentials("admin", "s3cret").is_ok());
        assert!(check_credentials(" ", "s3cret").is_err());
        assert!(check_credentials("admin", "").is_err());
    }

    #[test]
    fn test_whitelist_import_lines() {
        let file = "203.0.113.7 | 🇯🇵 local:Tokyo online:Tokyo\n\
                    \n\
                    not-an-ip | x\n\
                    ::ffff:10.0.0.5\n\
                    203.0.113.7\n";
        let import = parse_whitelist_import(file).unwrap();
        assert_eq!(import.addresses, vec!["203.0.113.7", "10.0.0.5"]);
        assert_eq!(import.skipped, 1);
        assert_eq!(import.to_file(), "203.0.113.7\n10.0.0.5\n");

        assert!(parse_whitelist_import("garbage\n\n").unwrap_err().is_validation());
    }
}
