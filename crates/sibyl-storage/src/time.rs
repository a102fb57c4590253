// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timestamp helpers.
//!
//! All persisted timestamps use one fixed-width UTC format so that string
//! comparison in SQL (`expires_at <= ?now`) agrees with chronological order.

use std::time::Duration;

const ISO_FMT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Current UTC time in the persisted timestamp format.
pub fn now_iso() -> String {
    chrono::Utc::now().format(ISO_FMT).to_string()
}

/// UTC time `d` from now, in the persisted timestamp format.
pub fn iso_after(d: Duration) -> String {
    let delta = chrono::TimeDelta::from_std(d).unwrap_or(chrono::TimeDelta::MAX);
    (chrono::Utc::now() + delta).format(ISO_FMT).to_string()
}

/// UTC time `d` before now, in the persisted timestamp format.
pub fn iso_before(d: Duration) -> String {
    let delta = chrono::TimeDelta::from_std(d).unwrap_or(chrono::TimeDelta::MAX);
    (chrono::Utc::now() - delta).format(ISO_FMT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_is_fixed_width_and_ordered() {
        let a = iso_before(Duration::from_secs(60));
        let b = now_iso();
        let c = iso_after(Duration::from_secs(60));
        assert_eq!(a.len(), b.len());
        assert_eq!(b.len(), c.len());
        assert!(a < b && b < c, "{a} < {b} < {c}");
    }
}
