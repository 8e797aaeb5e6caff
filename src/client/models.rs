//! Response shapes returned by the firewall service
//!
//! Payloads are untrusted: every field is optional on the wire. Missing or
//! `null` values decode to empty/zero defaults so the rest of the crate never
//! deals with raw JSON.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Decodes `null` the same way as a missing field
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decodes a byte counter sent either as an integer or as a float
fn counter<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = Option::<serde_json::Number>::deserialize(deserializer)?;
    Ok(number
        .and_then(|n| n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or(0))
}

/// Decodes a rate, clamping anything negative or non-finite to zero
fn rate<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    Ok(if value.is_finite() && value > 0.0 { value } else { 0.0 })
}

/// `GET /api/ports`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RulesResponse {
    #[serde(default, deserialize_with = "nullable")]
    pub rules: Vec<String>,
}

/// One whitelisted address with its geolocation labels
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct WhitelistEntry {
    #[serde(default, deserialize_with = "nullable")]
    pub ip: String,
    #[serde(default, rename = "flag")]
    pub geo_flag: Option<String>,
    #[serde(default, rename = "local")]
    pub geo_local_label: Option<String>,
    #[serde(default, rename = "online")]
    pub geo_online_label: Option<String>,
}

/// `GET /api/whitelist`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct WhitelistResponse {
    #[serde(default, deserialize_with = "nullable")]
    pub whitelist: Vec<WhitelistEntry>,
}

/// Counters for a single network interface
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct InterfaceTraffic {
    #[serde(default, rename = "iface", deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "counter")]
    pub rx: u64,
    #[serde(default, deserialize_with = "counter")]
    pub tx: u64,
}

/// `GET /api/traffic`, replaced wholesale on every successful poll
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TrafficSnapshot {
    #[serde(default, rename = "acc_rx", deserialize_with = "counter")]
    pub accumulated_rx: u64,
    #[serde(default, rename = "acc_tx", deserialize_with = "counter")]
    pub accumulated_tx: u64,
    #[serde(default, deserialize_with = "rate")]
    pub rx_rate: f64,
    #[serde(default, deserialize_with = "rate")]
    pub tx_rate: f64,
    #[serde(default, rename = "ifaces", deserialize_with = "nullable")]
    pub per_interface: Vec<InterfaceTraffic>,
}

/// One active network connection as reported by the service
///
/// Rows carry no unique key; they are identified by position only.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ConnectionRecord {
    #[serde(default, rename = "proc")]
    pub process: Option<String>,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default, rename = "laddr")]
    pub local_address: Option<String>,
    #[serde(default, rename = "raddr")]
    pub remote_address: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "flag")]
    pub geo_flag: Option<String>,
    #[serde(default, rename = "local")]
    pub geo_local_label: Option<String>,
    #[serde(default, rename = "online")]
    pub geo_online_label: Option<String>,
}

/// `GET /api/connections`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ConnectionsResponse {
    #[serde(default, deserialize_with = "nullable")]
    pub connections: Vec<ConnectionRecord>,
}

/// `POST /api/ufw/strictify`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct StrictifyReply {
    #[serde(default, deserialize_with = "nullable")]
    pub deleted_anywhere: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub panel_port: u16,
}

/// Generic `{status}` / `{error}` reply used by the form endpoints
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct StatusReply {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StatusReply {
    /// Interprets the reply: only `status == "ok"` counts as accepted
    pub fn into_outcome(self) -> Result<(), String> {
        match (self.status.as_deref(), self.error) {
            (Some("ok"), _) => Ok(()),
            (_, Some(error)) => Err(error),
            (Some(other), None) => Err(other.to_string()),
            (None, None) => Err("empty reply".to_string()),
        }
    }
}

/// A process holding a queried port
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct PortHolder {
    #[serde(default, rename = "proc")]
    pub process: Option<String>,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default, rename = "laddr")]
    pub local_address: Option<String>,
    #[serde(default, rename = "raddr")]
    pub remote_address: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "exe")]
    pub executable: Option<String>,
}

/// `GET /api/portsearch`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct PortSearchReply {
    #[serde(default, deserialize_with = "nullable")]
    pub port: u16,
    #[serde(default, deserialize_with = "nullable")]
    pub results: Vec<PortHolder>,
}

/// `POST /api/speedtest/up`: the server's count of bytes it actually received
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct UploadReceipt {
    #[serde(default, deserialize_with = "counter")]
    pub received: u64,
}

/// A DNAT port forward managed by the service
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct PortForward {
    #[serde(default, deserialize_with = "nullable")]
    pub src_port: u16,
    #[serde(default, deserialize_with = "nullable")]
    pub dst_ip: String,
    #[serde(default, deserialize_with = "nullable")]
    pub dst_port: u16,
}

/// `GET /api/forward/list`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ForwardList {
    #[serde(default, deserialize_with = "nullable")]
    pub forwards: Vec<PortForward>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct GeoLabels {
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub local: Option<String>,
    #[serde(default)]
    pub online: Option<String>,
}

/// `GET /api/clientinfo`: how the service sees this client
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ClientInfo {
    #[serde(default, deserialize_with = "nullable")]
    pub ip: String,
    #[serde(default, deserialize_with = "nullable")]
    pub geo: GeoLabels,
}

/// Probe kind run by `POST /api/scan`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Three pings per host
    #[default]
    Icmp,
    /// TCP connect per host and port
    Tcp,
    /// Empty datagram per host and port
    Udp,
}

/// Body of `POST /api/scan`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScanRequest {
    pub hosts: Vec<String>,
    pub mode: ScanMode,
    /// `common` or a comma-separated port list
    pub ports: String,
    pub timeout: f64,
}

/// One probed host, or host and port
///
/// ICMP rows carry `ok`/`avg_ms`, TCP rows `open`/`latency_ms` and UDP rows
/// `status`/`latency_ms`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ScanResult {
    #[serde(default, deserialize_with = "nullable")]
    pub host: String,
    #[serde(default, deserialize_with = "nullable")]
    pub ip: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub open: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub avg_ms: Option<f64>,
    #[serde(default)]
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ScanResult {
    pub fn verdict(&self) -> String {
        if let Some(status) = self.status.as_deref().filter(|s| !s.is_empty()) {
            return status.replace('_', " ");
        }
        match (self.open, self.ok) {
            (Some(true), _) => "open".to_string(),
            (Some(false), _) => "closed".to_string(),
            (None, Some(true)) => "reachable".to_string(),
            (None, Some(false)) => "unreachable".to_string(),
            (None, None) => "unknown".to_string(),
        }
    }

    pub fn latency(&self) -> Option<f64> {
        self.latency_ms.or(self.avg_ms)
    }
}

/// `POST /api/scan`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ScanReply {
    #[serde(default, deserialize_with = "nullable")]
    pub mode: String,
    #[serde(default, deserialize_with = "nullable")]
    pub results: Vec<ScanResult>,
    #[serde(default)]
    pub error: Option<String>,
}

/// First DNS answer returned by a resolver
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct DohAnswer {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default, rename = "TTL")]
    pub ttl: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct DohProbe {
    #[serde(default, deserialize_with = "nullable")]
    pub ok: bool,
    #[serde(default)]
    pub ms: Option<f64>,
    #[serde(default)]
    pub answer: Option<DohAnswer>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `GET /api/dohinfo`, keyed by resolver name
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct DohReport {
    #[serde(default, deserialize_with = "nullable")]
    pub doh: BTreeMap<String, DohProbe>,
}
