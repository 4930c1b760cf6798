//! Name <-> id tables for kernel object identifiers.
//!
//! File-backed tables ([`NameTable`]) follow the iproute2 layout: a
//! primary file under `/etc/iproute2` plus a `<base>.d` directory of
//! `*.conf` override fragments applied in directory-listing order (the
//! primary file loads first; fragment order is whatever readdir says).
//! Line format is `<id> <name>`, decimal or `0x`-hex id, `#` comments.
//!
//! Ethertype and IP-protocol names are fixed by IEEE/IANA and compiled
//! in.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration directory.
pub const CONF_DIR: &str = "/etc/iproute2";

/// Bidirectional name <-> id map, owned by the caller and immutable
/// after load.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    by_name: HashMap<String, u32>,
    by_id: HashMap<u32, String>,
}

impl NameTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table seeded with compiled-in defaults.
    pub fn with_defaults(defaults: &[(u32, &str)]) -> Self {
        let mut table = Self::new();
        for &(id, name) in defaults {
            table.insert(id, name);
        }
        table
    }

    /// Routing table names (`rt_tables`), used for `vrf` table ids.
    pub fn rt_tables() -> Self {
        let mut table = Self::with_defaults(&[
            (0, "unspec"),
            (252, "compat"),
            (253, "default"),
            (254, "main"),
            (255, "local"),
        ]);
        table.load_layered(Path::new(CONF_DIR), "rt_tables");
        table
    }

    /// Device group names (`group`), used for `ip link` rendering.
    pub fn device_groups() -> Self {
        let mut table = Self::with_defaults(&[(0, "default")]);
        table.load_layered(Path::new(CONF_DIR), "group");
        table
    }

    fn insert(&mut self, id: u32, name: &str) {
        self.by_name.insert(name.to_string(), id);
        self.by_id.insert(id, name.to_string());
    }

    /// Load the primary file plus its `.d` fragment directory.
    pub fn load_layered(&mut self, dir: &Path, base: &str) {
        self.load_file(&dir.join(base));

        let fragment_dir = dir.join(format!("{}.d", base));
        let Ok(entries) = fs::read_dir(&fragment_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path: PathBuf = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("conf") {
                self.load_file(&path);
            }
        }
    }

    /// Load one file. A corrupt line stops that file (the rest of the
    /// layering still applies).
    fn load_file(&mut self, path: &Path) {
        let Ok(content) = fs::read_to_string(path) else {
            return;
        };
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_line(line) {
                Some((id, name)) => self.insert(id, &name),
                None => {
                    tracing::warn!(path = %path.display(), line, "name database corrupted");
                    return;
                }
            }
        }
    }

    /// Resolve a name to its id, falling back to numeric parse.
    pub fn resolve(&self, name: &str) -> Option<u32> {
        if let Some(&id) = self.by_name.get(name) {
            return Some(id);
        }
        name.parse().ok()
    }

    /// Resolve an id to its name, falling back to the decimal string.
    pub fn resolve_reverse(&self, id: u32) -> String {
        self.by_id
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Resolve an id to its name only when one is registered.
    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.by_id.get(&id).map(|s| s.as_str())
    }
}

fn parse_line(line: &str) -> Option<(u32, String)> {
    let mut parts = line.split_whitespace();
    let id_str = parts.next()?;
    let name = parts.next()?;
    // Anything after the name must be a comment.
    if let Some(rest) = parts.next()
        && !rest.starts_with('#')
    {
        return None;
    }
    let id = if let Some(hex) = id_str.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        id_str.parse().ok()?
    };
    Some((id, name.to_string()))
}

/// Ethertype (link-layer protocol) names.
pub mod proto {
    pub const ALL: u16 = 0x0003;
    pub const IP: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const RARP: u16 = 0x8035;
    pub const IPV6: u16 = 0x86DD;
    pub const QINQ_8021Q: u16 = 0x8100;
    pub const QINQ_8021AD: u16 = 0x88A8;
    pub const MPLS_UC: u16 = 0x8847;
    pub const MPLS_MC: u16 = 0x8848;

    static NAMES: &[(u16, &str)] = &[
        (ALL, "all"),
        (IP, "ip"),
        (IP, "ipv4"),
        (ARP, "arp"),
        (RARP, "rarp"),
        (IPV6, "ipv6"),
        (QINQ_8021Q, "802.1Q"),
        (QINQ_8021AD, "802.1ad"),
        (MPLS_UC, "mpls_uc"),
        (MPLS_MC, "mpls_mc"),
    ];

    /// Parse an ethertype name or hex number.
    pub fn parse(s: &str) -> Option<u16> {
        for &(id, name) in NAMES {
            if name.eq_ignore_ascii_case(s) {
                return Some(id);
            }
        }
        let digits = s.strip_prefix("0x").unwrap_or(s);
        u16::from_str_radix(digits, 16).ok()
    }

    /// Canonical name of an ethertype, if it has one.
    pub fn name(id: u16) -> Option<&'static str> {
        NAMES.iter().find(|&&(i, _)| i == id).map(|&(_, n)| n)
    }
}

/// IP protocol numbers.
pub mod ipproto {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    pub const ICMPV6: u8 = 58;
    pub const SCTP: u8 = 132;

    static NAMES: &[(u8, &str)] = &[
        (ICMP, "icmp"),
        (TCP, "tcp"),
        (UDP, "udp"),
        (ICMPV6, "icmpv6"),
        (SCTP, "sctp"),
    ];

    /// Canonical name of a protocol, if it has one.
    pub fn name(id: u8) -> Option<&'static str> {
        NAMES.iter().find(|&&(i, _)| i == id).map(|&(_, n)| n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("254 main"), Some((254, "main".to_string())));
        assert_eq!(parse_line("0x10 vpn"), Some((16, "vpn".to_string())));
        assert_eq!(parse_line("42 lab # comment"), Some((42, "lab".to_string())));
        assert_eq!(parse_line("garbage"), None);
        assert_eq!(parse_line("12 two words"), None);
    }

    #[test]
    fn test_resolve_fallbacks() {
        let table = NameTable::with_defaults(&[(254, "main")]);
        assert_eq!(table.resolve("main"), Some(254));
        assert_eq!(table.resolve("100"), Some(100));
        assert_eq!(table.resolve("nonsense"), None);
        assert_eq!(table.resolve_reverse(254), "main");
        assert_eq!(table.resolve_reverse(77), "77");
    }

    #[test]
    fn test_layered_load() {
        let dir = std::env::temp_dir().join(format!("rtnl-names-{}", std::process::id()));
        let frag_dir = dir.join("rt_tables.d");
        fs::create_dir_all(&frag_dir).unwrap();
        fs::write(dir.join("rt_tables"), "# base\n10 ten\n").unwrap();
        fs::write(frag_dir.join("extra.conf"), "11 eleven\n").unwrap();
        fs::write(frag_dir.join("ignored.txt"), "12 twelve\n").unwrap();

        let mut table = NameTable::new();
        table.load_layered(&dir, "rt_tables");
        assert_eq!(table.resolve("ten"), Some(10));
        assert_eq!(table.resolve("eleven"), Some(11));
        assert_eq!(table.resolve("twelve"), None); // not a .conf fragment

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_proto_names() {
        assert_eq!(proto::parse("ipv6"), Some(proto::IPV6));
        assert_eq!(proto::parse("802.1Q"), Some(proto::QINQ_8021Q));
        assert_eq!(proto::parse("0x8847"), Some(proto::MPLS_UC));
        assert_eq!(proto::parse("86dd"), Some(proto::IPV6));
        assert_eq!(proto::name(proto::IP), Some("ip"));
        assert_eq!(ipproto::name(ipproto::SCTP), Some("sctp"));
    }
}
