//! Interface name <-> index resolution via sysfs.

use std::fs;
use std::path::Path;

/// Resolve an interface name to its index.
pub fn ifindex(name: &str) -> Option<u32> {
    let path = format!("/sys/class/net/{}/ifindex", name);
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Resolve an interface index back to its name.
///
/// Scans `/sys/class/net`; callers that print many records should cache
/// the result.
pub fn ifname(index: u32) -> Option<String> {
    let entries = fs::read_dir(Path::new("/sys/class/net")).ok()?;
    for entry in entries.flatten() {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let Ok(content) = fs::read_to_string(entry.path().join("ifindex")) else {
            continue;
        };
        if content.trim().parse::<u32>().ok() == Some(index) {
            return Some(name);
        }
    }
    None
}

/// Resolve an index to a name, falling back to the numeric string.
pub fn ifname_or_index(index: u32) -> String {
    ifname(index).unwrap_or_else(|| index.to_string())
}
