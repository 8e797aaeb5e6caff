//! Interactive terminal dashboard
//!
//! - `app`: state, key handling and background task plumbing
//! - `live_dashboard`: ratatui rendering and the terminal loop
//! - `prompt`: the `:` command line

pub mod app;
pub mod live_dashboard;
pub mod prompt;

pub use app::DashboardApp;
pub use live_dashboard::Dashboard;
