//! In-memory firewall service used by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use fw_watcher::client::api::{ByteStream, ExportKind, FirewallApi};
use fw_watcher::client::errors::{ApiError, ApiResult};
use fw_watcher::client::models::{
    ClientInfo, ConnectionRecord, DohProbe, DohReport, ForwardList, InterfaceTraffic,
    PortForward, PortSearchReply, ScanReply, ScanRequest, ScanResult, StrictifyReply,
    TrafficSnapshot, UploadReceipt, WhitelistEntry,
};

pub const MB: usize = 1024 * 1024;

#[derive(Default)]
struct FakeState {
    failing: HashSet<&'static str>,
    calls: Vec<String>,
    speed_rounds: usize,
    rules_loads: usize,
    scans: Vec<ScanRequest>,
    imports: Vec<String>,
}

/// Scriptable [`FirewallApi`]: canned data, per-endpoint failures and a call log
pub struct FakeApi {
    state: Mutex<FakeState>,
    pub rules: Vec<String>,
    pub whitelist: Vec<WhitelistEntry>,
    pub traffic: TrafficSnapshot,
    pub connections: Vec<ConnectionRecord>,
    /// Simulated duration of every speed-test transfer
    pub transfer_time: Duration,
    /// Overrides the byte count reported by the upload endpoint
    pub upload_received: Option<u64>,
    /// Speed-test call (1-based) that fails
    pub fail_speed_round: Option<usize>,
    /// Cancelled once the given speed-test call has been served
    pub stop_after_round: Option<(usize, CancellationToken)>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            rules: vec![
                "[ 1] 22/tcp ALLOW IN Anywhere".to_string(),
                "[ 2] 48080/tcp ALLOW IN Anywhere".to_string(),
            ],
            whitelist: vec![WhitelistEntry {
                ip: "203.0.113.7".to_string(),
                geo_flag: Some("🇯🇵".to_string()),
                geo_local_label: None,
                geo_online_label: Some("Tokyo".to_string()),
            }],
            traffic: TrafficSnapshot {
                accumulated_rx: 5 * MB as u64,
                accumulated_tx: MB as u64,
                rx_rate: 2048.0,
                tx_rate: 512.0,
                per_interface: vec![InterfaceTraffic {
                    name: "eth0".to_string(),
                    rx: 5 * MB as u64,
                    tx: MB as u64,
                }],
            },
            connections: vec![
                connection("sshd", 700, "ESTABLISHED"),
                connection("nginx", 80, "LISTEN"),
            ],
            transfer_time: Duration::ZERO,
            upload_received: None,
            fail_speed_round: None,
            stop_after_round: None,
        }
    }

    /// Makes every call to `endpoint` fail with a transport error
    pub fn failing(self, endpoint: &'static str) -> Self {
        self.lock().failing.insert(endpoint);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn rules_loads(&self) -> usize {
        self.lock().rules_loads
    }

    pub fn scans(&self) -> Vec<ScanRequest> {
        self.lock().scans.clone()
    }

    /// File bodies received by the whitelist import
    pub fn imports(&self) -> Vec<String> {
        self.lock().imports.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: String, endpoint: &'static str) -> ApiResult<()> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.failing.contains(endpoint) {
            return Err(ApiError::transport(endpoint, "HTTP 500 Internal Server Error"));
        }
        Ok(())
    }

    /// Counts a speed-test call and applies the scripted failure and stop
    async fn speed_round(&self) -> ApiResult<()> {
        let round = {
            let mut state = self.lock();
            state.speed_rounds += 1;
            state.speed_rounds
        };
        if !self.transfer_time.is_zero() {
            tokio::time::sleep(self.transfer_time).await;
        }
        if self.fail_speed_round == Some(round) {
            return Err(ApiError::transport("/api/speedtest/down", "connection reset"));
        }
        if let Some((after, token)) = &self.stop_after_round {
            if *after == round {
                token.cancel();
            }
        }
        Ok(())
    }
}

pub fn connection(process: &str, pid: u32, status: &str) -> ConnectionRecord {
    ConnectionRecord {
        process: Some(process.to_string()),
        pid: Some(pid),
        local_address: Some(format!("0.0.0.0:{}", pid)),
        remote_address: None,
        status: Some(status.to_string()),
        ..ConnectionRecord::default()
    }
}

#[async_trait]
impl FirewallApi for FakeApi {
    async fn rules(&self) -> ApiResult<Vec<String>> {
        self.record("rules".into(), "/api/ports")?;
        self.lock().rules_loads += 1;
        Ok(self.rules.clone())
    }

    async fn whitelist(&self) -> ApiResult<Vec<WhitelistEntry>> {
        self.record("whitelist".into(), "/api/whitelist")?;
        Ok(self.whitelist.clone())
    }

    async fn traffic(&self) -> ApiResult<TrafficSnapshot> {
        self.record("traffic".into(), "/api/traffic")?;
        Ok(self.traffic.clone())
    }

    async fn connections(&self) -> ApiResult<Vec<ConnectionRecord>> {
        self.record("connections".into(), "/api/connections")?;
        Ok(self.connections.clone())
    }

    async fn strictify(&self) -> ApiResult<StrictifyReply> {
        self.record("strictify".into(), "/api/ufw/strictify")?;
        Ok(StrictifyReply {
            deleted_anywhere: 1,
            panel_port: 48080,
        })
    }

    async fn set_panel_port(&self, port: u16) -> ApiResult<()> {
        self.record(format!("panel_port {}", port), "/api/panel/set")
    }

    async fn open_port(&self, port: u16) -> ApiResult<()> {
        self.record(format!("open {}", port), "/api/open")
    }

    async fn whitelist_add(&self, ip: &str) -> ApiResult<()> {
        self.record(format!("whitelist_add {}", ip), "/api/whitelist/add")
    }

    async fn whitelist_delete(&self, ip: &str) -> ApiResult<()> {
        self.record(format!("whitelist_delete {}", ip), "/api/whitelist/delete")
    }

    async fn block_ip(&self, ip: &str) -> ApiResult<()> {
        self.record(format!("block {}", ip), "/api/block_ip")
    }

    async fn set_log_limit(&self, megabytes: u32) -> ApiResult<()> {
        self.record(format!("log_limit {}", megabytes), "/api/loglimit")
    }

    async fn port_search(&self, port: u16) -> ApiResult<PortSearchReply> {
        self.record(format!("port_search {}", port), "/api/portsearch")?;
        Ok(PortSearchReply {
            port,
            results: Vec::new(),
        })
    }

    async fn forwards(&self) -> ApiResult<ForwardList> {
        self.record("forwards".into(), "/api/forward/list")?;
        Ok(ForwardList::default())
    }

    async fn forward_add(&self, forward: &PortForward) -> ApiResult<()> {
        self.record(
            format!(
                "forward_add {} {} {}",
                forward.src_port, forward.dst_ip, forward.dst_port
            ),
            "/api/forward/add",
        )
    }

    async fn forward_delete(&self, src_port: u16) -> ApiResult<()> {
        self.record(format!("forward_delete {}", src_port), "/api/forward/delete")
    }

    async fn client_info(&self) -> ApiResult<ClientInfo> {
        self.record("client_info".into(), "/api/clientinfo")?;
        Ok(ClientInfo {
            ip: "198.51.100.4".to_string(),
            ..ClientInfo::default()
        })
    }

    async fn export(&self, kind: ExportKind) -> ApiResult<String> {
        self.record(format!("export {:?}", kind), "/export")?;
        Ok(String::new())
    }

    async fn set_panel_credentials(
        &self,
        username: &str,
        _password: &str,
        port: u16,
    ) -> ApiResult<()> {
        self.record(format!("panel_cred {} {}", username, port), "/api/panel/cred")
    }

    async fn import_whitelist(&self, contents: String) -> ApiResult<()> {
        self.record("import_whitelist".into(), "/import/whitelist")?;
        self.lock().imports.push(contents);
        Ok(())
    }

    async fn scan(&self, request: &ScanRequest) -> ApiResult<ScanReply> {
        self.record(format!("scan {}", request.hosts.join(" ")), "/api/scan")?;
        self.lock().scans.push(request.clone());
        let results = request
            .hosts
            .iter()
            .map(|host| ScanResult {
                host: host.clone(),
                ip: host.clone(),
                ok: Some(true),
                avg_ms: Some(0.5),
                ..ScanResult::default()
            })
            .collect();
        Ok(ScanReply {
            mode: "icmp".to_string(),
            results,
            error: None,
        })
    }

    async fn doh_info(&self) -> ApiResult<DohReport> {
        self.record("doh_info".into(), "/api/dohinfo")?;
        let mut report = DohReport::default();
        report.doh.insert(
            "google".to_string(),
            DohProbe {
                ok: true,
                ms: Some(20.0),
                ..DohProbe::default()
            },
        );
        Ok(report)
    }

    async fn speedtest_download(&self, size_mb: u32) -> ApiResult<ByteStream> {
        self.record(format!("download {}", size_mb), "/api/speedtest/down")?;
        self.speed_round().await?;
        let chunks = (0..size_mb).map(|_| Ok(Bytes::from(vec![0u8; MB])));
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn speedtest_upload(&self, payload: Bytes) -> ApiResult<UploadReceipt> {
        self.record(format!("upload {}", payload.len()), "/api/speedtest/up")?;
        self.speed_round().await?;
        Ok(UploadReceipt {
            received: self.upload_received.unwrap_or(payload.len() as u64),
        })
    }

    async fn logout(&self) -> ApiResult<()> {
        self.record("logout".into(), "/logout")
    }
}
