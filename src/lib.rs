//! fw-watcher: terminal dashboard and throughput tester for a remote host
//! firewall / traffic-monitoring service.

pub mod actions;
pub mod cli;
pub mod client;
pub mod connections;
pub mod dashboard;
pub mod formatting;
pub mod notify;
pub mod poller;
pub mod settings;
pub mod speedtest;
pub mod validation;
