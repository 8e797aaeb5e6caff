use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::client::errors::ApiResult;
use crate::client::models::{
    ClientInfo, ConnectionRecord, DohReport, ForwardList, PortForward, PortSearchReply,
    ScanReply, ScanRequest, StrictifyReply, TrafficSnapshot, UploadReceipt, WhitelistEntry,
};

/// Streamed response body, consumed chunk by chunk
pub type ByteStream = BoxStream<'static, ApiResult<Bytes>>;

/// Operations offered by the remote firewall service
///
/// Implementations attach the session credentials to every request and map any
/// failure to [`ApiError::Transport`](crate::client::errors::ApiError). Callers
/// validate their inputs before calling in.
#[async_trait]
pub trait FirewallApi: Send + Sync {
    async fn rules(&self) -> ApiResult<Vec<String>>;
    async fn whitelist(&self) -> ApiResult<Vec<WhitelistEntry>>;
    async fn traffic(&self) -> ApiResult<TrafficSnapshot>;
    async fn connections(&self) -> ApiResult<Vec<ConnectionRecord>>;

    async fn strictify(&self) -> ApiResult<StrictifyReply>;
    async fn set_panel_port(&self, port: u16) -> ApiResult<()>;
    async fn open_port(&self, port: u16) -> ApiResult<()>;
    async fn whitelist_add(&self, ip: &str) -> ApiResult<()>;
    async fn whitelist_delete(&self, ip: &str) -> ApiResult<()>;
    async fn block_ip(&self, ip: &str) -> ApiResult<()>;
    async fn set_log_limit(&self, megabytes: u32) -> ApiResult<()>;
    async fn port_search(&self, port: u16) -> ApiResult<PortSearchReply>;

    async fn forwards(&self) -> ApiResult<ForwardList>;
    async fn forward_add(&self, forward: &PortForward) -> ApiResult<()>;
    async fn forward_delete(&self, src_port: u16) -> ApiResult<()>;
    async fn client_info(&self) -> ApiResult<ClientInfo>;
    async fn export(&self, kind: ExportKind) -> ApiResult<String>;

    /// Replaces the panel login and port; the service restarts afterwards
    async fn set_panel_credentials(
        &self,
        username: &str,
        password: &str,
        port: u16,
    ) -> ApiResult<()>;
    /// Uploads a whitelist file, one `ip | ...` entry per line
    async fn import_whitelist(&self, contents: String) -> ApiResult<()>;
    /// Probes hosts from the service's side of the network
    async fn scan(&self, request: &ScanRequest) -> ApiResult<ScanReply>;
    async fn doh_info(&self) -> ApiResult<DohReport>;

    /// Starts a download of `size_mb` megabytes of server-generated payload
    async fn speedtest_download(&self, size_mb: u32) -> ApiResult<ByteStream>;
    /// Uploads `payload` and returns the server's count of received bytes
    async fn speedtest_upload(&self, payload: Bytes) -> ApiResult<UploadReceipt>;

    async fn logout(&self) -> ApiResult<()>;
}

/// Text exports offered by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportKind {
    /// Audit log of panel actions
    Logs,
    /// Whitelist with geolocation labels
    Whitelist,
}

impl ExportKind {
    pub fn path(self) -> &'static str {
        match self {
            ExportKind::Logs => "/export/logs",
            ExportKind::Whitelist => "/export/whitelist",
        }
    }
}
