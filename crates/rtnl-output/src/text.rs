//! Text formatting helpers.

/// Format bytes as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;

    if bytes >= GIB {
        format!("{:.2}GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.2}MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.2}KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Format a rate (bits per second) as a human-readable string.
pub fn format_rate(bps: u64) -> String {
    const KBIT: u64 = 1000;
    const MBIT: u64 = 1_000_000;
    const GBIT: u64 = 1_000_000_000;

    if bps >= GBIT {
        format!("{:.2}Gbit", bps as f64 / GBIT as f64)
    } else if bps >= MBIT {
        format!("{:.2}Mbit", bps as f64 / MBIT as f64)
    } else if bps >= KBIT {
        format!("{:.2}Kbit", bps as f64 / KBIT as f64)
    } else {
        format!("{}bit", bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.00KiB");
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(999), "999bit");
        assert_eq!(format_rate(1_500_000), "1.50Mbit");
    }
}
