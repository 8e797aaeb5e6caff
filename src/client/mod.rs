//! Transport client for the remote firewall service
//!
//! - `api`: the [`FirewallApi`] trait the rest of the crate talks to
//! - `http`: reqwest implementation with credential propagation
//! - `models`: defensively decoded response shapes
//! - `errors`: the success/failure classification shared by every caller

pub mod api;
pub mod errors;
pub mod http;
pub mod models;

pub use api::{ByteStream, ExportKind, FirewallApi};
pub use errors::{ApiError, ApiResult};
pub use http::HttpFirewallClient;
pub use models::{
    ConnectionRecord, InterfaceTraffic, PortForward, TrafficSnapshot, WhitelistEntry,
};
