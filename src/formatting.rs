//! Formatting utilities for byte counts and transfer rates
//!
//! Values are scaled with binary (1024-based) prefixes. The plain byte tier is
//! printed without decimals, every larger tier with two decimal places. Inputs
//! are expected to be non-negative; the service only ever reports counters and
//! rates.

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Formats a byte count with appropriate units (B, KB, MB, GB)
///
/// # Examples
///
/// ```
/// use fw_watcher::formatting::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 B");
/// assert_eq!(format_bytes(1023), "1023 B");
/// assert_eq!(format_bytes(1024), "1.00 KB");
/// assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    let value = bytes as f64;
    if value < KIB {
        format!("{} B", bytes)
    } else if value < MIB {
        format!("{:.2} KB", value / KIB)
    } else if value < GIB {
        format!("{:.2} MB", value / MIB)
    } else {
        format!("{:.2} GB", value / GIB)
    }
}

/// Formats a rate in bytes per second with appropriate units (B/s, KB/s, MB/s, GB/s)
///
/// # Examples
///
/// ```
/// use fw_watcher::formatting::format_rate;
///
/// assert_eq!(format_rate(512.4), "512 B/s");
/// assert_eq!(format_rate(1536.0), "1.50 KB/s");
/// assert_eq!(format_rate(10.0 * 1024.0 * 1024.0), "10.00 MB/s");
/// ```
pub fn format_rate(bytes_per_second: f64) -> String {
    if bytes_per_second < KIB {
        format!("{:.0} B/s", bytes_per_second)
    } else if bytes_per_second < MIB {
        format!("{:.2} KB/s", bytes_per_second / KIB)
    } else if bytes_per_second < GIB {
        format!("{:.2} MB/s", bytes_per_second / MIB)
    } else {
        format!("{:.2} GB/s", bytes_per_second / GIB)
    }
}

/// Formats a byte count as mebibytes with one decimal, as used in speed-test logs
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / MIB)
}

/// Formats a round-trip time reported in milliseconds
pub fn format_latency(millis: f64) -> String {
    format!("{:.2} ms", millis.max(0.0))
}
