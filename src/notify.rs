//! Notification and error surface
//!
//! Two kinds of outward signal: a transient toast that dismisses itself after a
//! fixed time, and a sticky error per section that stays until the next
//! successful operation in that section clears it or the user dismisses it.
//! How they are drawn is up to the render layer.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Logical area of the dashboard an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    Rules,
    Whitelist,
    Traffic,
    Connections,
    Actions,
    Download,
    Upload,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::Rules => "firewall rules",
            Section::Whitelist => "whitelist",
            Section::Traffic => "traffic",
            Section::Connections => "connections",
            Section::Actions => "action",
            Section::Download => "download test",
            Section::Upload => "upload test",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub text: String,
    pub expires_at: Instant,
}

#[derive(Debug, Clone)]
pub struct NotificationCenter {
    toast: Option<Toast>,
    toast_duration: Duration,
    errors: BTreeMap<Section, String>,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(Duration::from_millis(1500))
    }
}

impl NotificationCenter {
    pub fn new(toast_duration: Duration) -> Self {
        Self {
            toast: None,
            toast_duration,
            errors: BTreeMap::new(),
        }
    }

    /// Shows a transient message, replacing any visible one
    pub fn notify(&mut self, text: impl Into<String>) {
        self.notify_at(text, Instant::now());
    }

    pub fn notify_at(&mut self, text: impl Into<String>, now: Instant) {
        self.toast = Some(Toast {
            text: text.into(),
            expires_at: now + self.toast_duration,
        });
    }

    /// Visible toast text, if it has not expired yet
    pub fn toast_at(&self, now: Instant) -> Option<&str> {
        self.toast
            .as_ref()
            .filter(|toast| now < toast.expires_at)
            .map(|toast| toast.text.as_str())
    }

    /// Drops an expired toast; returns true if something was removed
    pub fn expire(&mut self, now: Instant) -> bool {
        if self.toast.as_ref().is_some_and(|t| now >= t.expires_at) {
            self.toast = None;
            return true;
        }
        false
    }

    pub fn set_error(&mut self, section: Section, message: impl Into<String>) {
        self.errors.insert(section, message.into());
    }

    pub fn clear_error(&mut self, section: Section) {
        self.errors.remove(&section);
    }

    pub fn error(&self, section: Section) -> Option<&str> {
        self.errors.get(&section).map(String::as_str)
    }

    /// Sticky errors ordered by section
    pub fn errors(&self) -> impl Iterator<Item = (Section, &str)> {
        self.errors.iter().map(|(s, m)| (*s, m.as_str()))
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Explicit dismissal of every sticky error
    pub fn dismiss_errors(&mut self) {
        self.errors.clear();
    }
}
