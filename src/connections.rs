//! Connection table model
//!
//! Holds the most recently fetched connection list together with the active
//! sort specification. Every poll replaces the list; the sort survives polls
//! and is re-applied to a view of the new rows, never to the rows themselves.

use std::cmp::Ordering;

use crate::client::models::ConnectionRecord;

/// Column a connection table can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortKey {
    #[default]
    Process,
    Pid,
    LocalAddress,
    RemoteAddress,
    Status,
    Location,
}

impl SortKey {
    pub const ALL: [SortKey; 6] = [
        SortKey::Process,
        SortKey::Pid,
        SortKey::LocalAddress,
        SortKey::RemoteAddress,
        SortKey::Status,
        SortKey::Location,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SortKey::Process => "Process",
            SortKey::Pid => "PID",
            SortKey::LocalAddress => "Local",
            SortKey::RemoteAddress => "Remote",
            SortKey::Status => "Status",
            SortKey::Location => "Location",
        }
    }

    /// Column for the 1-based shortcut shown in the dashboard
    pub fn from_shortcut(digit: char) -> Option<SortKey> {
        let index = digit.to_digit(10)? as usize;
        index.checked_sub(1).and_then(|i| SortKey::ALL.get(i).copied())
    }

    fn value(self, record: &ConnectionRecord) -> SortValue<'_> {
        fn text(field: &Option<String>) -> SortValue<'_> {
            SortValue::Text(field.as_deref().unwrap_or(""))
        }
        match self {
            SortKey::Process => text(&record.process),
            // pid 0 means "unknown" and sorts like a missing value
            SortKey::Pid => match record.pid {
                Some(pid) if pid != 0 => SortValue::Number(pid),
                _ => SortValue::Text(""),
            },
            SortKey::LocalAddress => text(&record.local_address),
            SortKey::RemoteAddress => text(&record.remote_address),
            SortKey::Status => text(&record.status),
            SortKey::Location => match record
                .geo_online_label
                .as_deref()
                .filter(|s| !s.is_empty())
            {
                Some(s) => SortValue::Text(s),
                None => text(&record.geo_local_label),
            },
        }
    }
}

#[derive(Debug)]
enum SortValue<'a> {
    Number(u32),
    Text(&'a str),
}

impl SortValue<'_> {
    /// Numbers compare numerically with each other; anything mixed compares as text
    fn compare(&self, other: &SortValue<'_>) -> Ordering {
        match (self, other) {
            (SortValue::Number(a), SortValue::Number(b)) => a.cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (a, b) => a.as_text().cmp(&b.as_text()),
        }
    }

    fn as_text(&self) -> String {
        match self {
            SortValue::Number(n) => n.to_string(),
            SortValue::Text(s) => s.to_string(),
        }
    }
}

/// Active sort column and direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub ascending: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            key: SortKey::Process,
            ascending: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionTable {
    records: Vec<ConnectionRecord>,
    sort: SortSpec,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sort(sort: SortSpec) -> Self {
        Self {
            records: Vec::new(),
            sort,
        }
    }

    /// Replaces the rows with a freshly fetched list; the sort is kept
    pub fn replace(&mut self, records: Vec<ConnectionRecord>) {
        self.records = records;
    }

    /// Rows in fetch order
    pub fn records(&self) -> &[ConnectionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn sort_spec(&self) -> SortSpec {
        self.sort
    }

    /// Selecting the current column flips direction, any other column sorts ascending
    pub fn set_sort_key(&mut self, key: SortKey) {
        if self.sort.key == key {
            self.sort.ascending = !self.sort.ascending;
        } else {
            self.sort = SortSpec {
                key,
                ascending: true,
            };
        }
    }

    /// Rows in display order
    ///
    /// Text compares by byte order: ASCII uppercase sorts before lowercase and
    /// the result does not depend on the host locale. Ties keep their fetch
    /// order in both directions.
    pub fn sorted(&self) -> Vec<&ConnectionRecord> {
        let SortSpec { key, ascending } = self.sort;
        let mut rows: Vec<&ConnectionRecord> = self.records.iter().collect();
        rows.sort_by(|a, b| {
            let ordering = key.value(a).compare(&key.value(b));
            if ascending { ordering } else { ordering.reverse() }
        });
        rows
    }
}
