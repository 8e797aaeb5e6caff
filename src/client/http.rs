//! reqwest-backed implementation of [`FirewallApi`]

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use log::{debug, trace};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::client::api::{ByteStream, ExportKind, FirewallApi};
use crate::client::errors::{ApiError, ApiResult};
use crate::client::models::{
    ClientInfo, ConnectionRecord, ConnectionsResponse, DohReport, ForwardList, PortForward,
    PortSearchReply, RulesResponse, ScanReply, ScanRequest, StatusReply, StrictifyReply,
    TrafficSnapshot, UploadReceipt, WhitelistEntry, WhitelistResponse,
};
use crate::settings::Settings;

const SPEEDTEST_DOWN: &str = "/api/speedtest/down";
const SPEEDTEST_UP: &str = "/api/speedtest/up";

/// HTTP client for the firewall service
///
/// Keeps a cookie store so a session cookie set by the service is sent back,
/// and attaches Basic credentials to every request when a username is known.
#[derive(Debug, Clone)]
pub struct HttpFirewallClient {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl HttpFirewallClient {
    pub fn new(settings: &Settings) -> ApiResult<Self> {
        let mut builder = Client::builder().cookie_store(true);
        if settings.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(settings.request_timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::transport(&settings.base_url, e.to_string()))?;

        debug!(
            "HTTP client ready for {} (timeout: {}s, credentials: {})",
            settings.base_url,
            settings.request_timeout_secs,
            settings.username.is_some()
        );

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            username: settings.username.clone(),
            password: settings.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }

    /// Sends a request and collapses every non-2xx outcome into a transport failure
    async fn send(&self, endpoint: &str, builder: RequestBuilder) -> ApiResult<Response> {
        trace!("-> {}", endpoint);
        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::transport(endpoint, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // Form endpoints explain rejections as {"error": "..."}
        let body = response.text().await.unwrap_or_default();
        let reason = match serde_json::from_str::<StatusReply>(&body)
            .ok()
            .and_then(|reply| reply.error)
        {
            Some(detail) => format!("HTTP {}: {}", status, detail),
            None => format!("HTTP {}", status),
        };
        Err(ApiError::transport(endpoint, reason))
    }

    async fn json<T: DeserializeOwned>(&self, endpoint: &str, builder: RequestBuilder) -> ApiResult<T> {
        let response = self.send(endpoint, builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::transport(endpoint, format!("unreadable response: {}", e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.json(path, self.request(Method::GET, path)).await
    }

    async fn post(&self, path: &str) -> ApiResult<()> {
        self.send(path, self.request(Method::POST, path)).await.map(|_| ())
    }

    async fn post_form(&self, path: &str, form: &[(&str, String)]) -> ApiResult<()> {
        let reply: StatusReply = self
            .json(path, self.request(Method::POST, path).form(form))
            .await?;
        reply
            .into_outcome()
            .map_err(|reason| ApiError::transport(path, reason))
    }
}

#[async_trait]
impl FirewallApi for HttpFirewallClient {
    async fn rules(&self) -> ApiResult<Vec<String>> {
        let reply: RulesResponse = self.get_json("/api/ports").await?;
        Ok(reply.rules)
    }

    async fn whitelist(&self) -> ApiResult<Vec<WhitelistEntry>> {
        let reply: WhitelistResponse = self.get_json("/api/whitelist").await?;
        Ok(reply.whitelist)
    }

    async fn traffic(&self) -> ApiResult<TrafficSnapshot> {
        self.get_json("/api/traffic").await
    }

    async fn connections(&self) -> ApiResult<Vec<ConnectionRecord>> {
        let reply: ConnectionsResponse = self.get_json("/api/connections").await?;
        Ok(reply.connections)
    }

    async fn strictify(&self) -> ApiResult<StrictifyReply> {
        let path = "/api/ufw/strictify";
        self.json(path, self.request(Method::POST, path)).await
    }

    async fn set_panel_port(&self, port: u16) -> ApiResult<()> {
        self.post_form("/api/panel/set", &[("port", port.to_string())])
            .await
    }

    async fn open_port(&self, port: u16) -> ApiResult<()> {
        self.post(&format!("/api/open/{}", port)).await
    }

    async fn whitelist_add(&self, ip: &str) -> ApiResult<()> {
        self.post(&format!("/api/whitelist/{}", ip)).await
    }

    async fn whitelist_delete(&self, ip: &str) -> ApiResult<()> {
        self.post(&format!("/api/whitelist/delete/{}", ip)).await
    }

    async fn block_ip(&self, ip: &str) -> ApiResult<()> {
        self.post(&format!("/api/block_ip/{}", ip)).await
    }

    async fn set_log_limit(&self, megabytes: u32) -> ApiResult<()> {
        self.post(&format!("/api/loglimit/{}", megabytes)).await
    }

    async fn port_search(&self, port: u16) -> ApiResult<PortSearchReply> {
        let path = "/api/portsearch";
        self.json(path, self.request(Method::GET, path).query(&[("port", port)]))
            .await
    }

    async fn forwards(&self) -> ApiResult<ForwardList> {
        self.get_json("/api/forward/list").await
    }

    async fn forward_add(&self, forward: &PortForward) -> ApiResult<()> {
        self.post_form(
            "/api/forward/add",
            &[
                ("src_port", forward.src_port.to_string()),
                ("dst_ip", forward.dst_ip.clone()),
                ("dst_port", forward.dst_port.to_string()),
            ],
        )
        .await
    }

    async fn forward_delete(&self, src_port: u16) -> ApiResult<()> {
        self.post(&format!("/api/forward/delete/{}", src_port)).await
    }

    async fn client_info(&self) -> ApiResult<ClientInfo> {
        self.get_json("/api/clientinfo").await
    }

    async fn export(&self, kind: ExportKind) -> ApiResult<String> {
        let path = kind.path();
        let response = self.send(path, self.request(Method::GET, path)).await?;
        response
            .text()
            .await
            .map_err(|e| ApiError::transport(path, e.to_string()))
    }

    async fn set_panel_credentials(
        &self,
        username: &str,
        password: &str,
        port: u16,
    ) -> ApiResult<()> {
        self.post_form(
            "/api/panel/cred",
            &[
                ("username", username.to_string()),
                ("password", password.to_string()),
                ("port", port.to_string()),
            ],
        )
        .await
    }

    async fn import_whitelist(&self, contents: String) -> ApiResult<()> {
        let path = "/import/whitelist";
        let part = Part::text(contents)
            .file_name("whitelist.txt")
            .mime_str("text/plain")
            .map_err(|e| ApiError::transport(path, e.to_string()))?;
        let form = Form::new().part("file", part);
        // The service answers with a redirect back to the panel
        self.send(path, self.request(Method::POST, path).multipart(form))
            .await
            .map(|_| ())
    }

    async fn scan(&self, request: &ScanRequest) -> ApiResult<ScanReply> {
        let path = "/api/scan";
        let reply: ScanReply = self
            .json(path, self.request(Method::POST, path).json(request))
            .await?;
        match reply.error {
            Some(reason) => Err(ApiError::transport(path, reason)),
            None => Ok(reply),
        }
    }

    async fn doh_info(&self) -> ApiResult<DohReport> {
        self.get_json("/api/dohinfo").await
    }

    async fn speedtest_download(&self, size_mb: u32) -> ApiResult<ByteStream> {
        let response = self
            .send(
                SPEEDTEST_DOWN,
                self.request(Method::GET, SPEEDTEST_DOWN)
                    .query(&[("size_mb", size_mb)]),
            )
            .await?;

        Ok(response
            .bytes_stream()
            .map_err(|e| ApiError::transport(SPEEDTEST_DOWN, e.to_string()))
            .boxed())
    }

    async fn speedtest_upload(&self, payload: Bytes) -> ApiResult<UploadReceipt> {
        self.json(
            SPEEDTEST_UP,
            self.request(Method::POST, SPEEDTEST_UP)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(payload),
        )
        .await
    }

    async fn logout(&self) -> ApiResult<()> {
        self.post("/logout").await
    }
}
