//! Quota snapshots and byte formatting.

use serde::{Deserialize, Serialize};

/// Usage of one tenant, computed fresh from live references. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub used_bytes: u64,
    pub limit_bytes: u64,
    pub percentage: f64,
}

impl QuotaSnapshot {
    pub fn new(used_bytes: u64, limit_bytes: u64) -> Self {
        let percentage = if limit_bytes == 0 {
            100.0
        } else {
            used_bytes as f64 / limit_bytes as f64 * 100.0
        };
        Self {
            used_bytes,
            limit_bytes,
            percentage,
        }
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.limit_bytes.saturating_sub(self.used_bytes)
    }

    /// Whether `incoming` more bytes fit. Reaching the limit exactly is allowed.
    pub fn admits(&self, incoming: u64) -> bool {
        self.used_bytes.saturating_add(incoming) <= self.limit_bytes
    }
}

/// Human readable byte count using binary units (`1536` -> `"1.50 KB"`).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_boundary() {
        let snapshot = QuotaSnapshot::new(90, 100);
        assert!(snapshot.admits(10));
        assert!(!snapshot.admits(11));
        assert_eq!(snapshot.remaining_bytes(), 10);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(QuotaSnapshot::new(25, 100).percentage, 25.0);
        assert_eq!(QuotaSnapshot::new(0, 0).percentage, 100.0);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(30 * 1024 * 1024 * 1024), "30.00 GB");
    }
}
