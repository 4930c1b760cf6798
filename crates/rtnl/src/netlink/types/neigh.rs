//! Neighbor message types (struct ndmsg and NDA_* attributes).
//!
//! Bridge FDB entries travel as neighbor messages with family
//! `AF_BRIDGE`.

use crate::netlink::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// AF_BRIDGE address family.
pub const AF_BRIDGE: u8 = libc::AF_BRIDGE as u8;

/// Neighbor message (struct ndmsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NdMsg {
    /// Address family.
    pub ndm_family: u8,
    /// Padding.
    pub ndm_pad1: u8,
    /// Padding.
    pub ndm_pad2: u16,
    /// Interface index.
    pub ndm_ifindex: i32,
    /// Neighbor state (NUD_*).
    pub ndm_state: u16,
    /// Neighbor flags (NTF_*).
    pub ndm_flags: u8,
    /// Neighbor type.
    pub ndm_type: u8,
}

impl NdMsg {
    /// Size of this structure.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a new neighbor message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address family.
    pub fn with_family(mut self, family: u8) -> Self {
        self.ndm_family = family;
        self
    }

    /// Set the interface index.
    pub fn with_ifindex(mut self, ifindex: i32) -> Self {
        self.ndm_ifindex = ifindex;
        self
    }

    /// Set the neighbor state.
    pub fn with_state(mut self, state: u16) -> Self {
        self.ndm_state = state;
        self
    }

    /// Set the neighbor flags.
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.ndm_flags = flags;
        self
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: Self::SIZE,
                actual: data.len(),
            })
    }
}

/// Neighbor attributes (NDA_*).
pub mod nda {
    pub const UNSPEC: u16 = 0;
    pub const DST: u16 = 1;
    pub const LLADDR: u16 = 2;
    pub const CACHEINFO: u16 = 3;
    pub const PROBES: u16 = 4;
    pub const VLAN: u16 = 5;
    pub const PORT: u16 = 6;
    pub const VNI: u16 = 7;
    pub const IFINDEX: u16 = 8;
    pub const MASTER: u16 = 9;
    pub const LINK_NETNSID: u16 = 10;
    pub const SRC_VNI: u16 = 11;
    pub const PROTOCOL: u16 = 12;
    pub const NH_ID: u16 = 13;
    pub const FDB_EXT_ATTRS: u16 = 14;
    pub const FLAGS_EXT: u16 = 15;
    pub const NDM_STATE_MASK: u16 = 16;
    pub const NDM_FLAGS_MASK: u16 = 17;
    pub const MAX: u16 = 17;
}

/// Neighbor states (NUD_*).
pub mod nud {
    pub const INCOMPLETE: u16 = 0x01;
    pub const REACHABLE: u16 = 0x02;
    pub const STALE: u16 = 0x04;
    pub const DELAY: u16 = 0x08;
    pub const PROBE: u16 = 0x10;
    pub const FAILED: u16 = 0x20;
    pub const NOARP: u16 = 0x40;
    pub const PERMANENT: u16 = 0x80;
    pub const NONE: u16 = 0x00;
}

/// Neighbor flags (NTF_*).
pub mod ntf {
    pub const USE: u8 = 0x01;
    pub const SELF: u8 = 0x02;
    pub const MASTER: u8 = 0x04;
    pub const PROXY: u8 = 0x08;
    pub const EXT_LEARNED: u8 = 0x10;
    pub const OFFLOADED: u8 = 0x20;
    pub const STICKY: u8 = 0x40;
    pub const ROUTER: u8 = 0x80;
}

/// Extended neighbor flags (NTF_EXT_*), carried in NDA_FLAGS_EXT.
pub mod ntf_ext {
    pub const MANAGED: u32 = 0x01;
    pub const LOCKED: u32 = 0x02;
}

/// Render an FDB entry state the way `bridge fdb` does: the dominant
/// bit's name, an empty string for plain reachable entries, hex for
/// anything unexpected.
pub fn state_name(state: u16) -> Option<&'static str> {
    if state & nud::PERMANENT != 0 {
        Some("permanent")
    } else if state & nud::NOARP != 0 {
        Some("static")
    } else if state & nud::STALE != 0 {
        Some("stale")
    } else if state & nud::REACHABLE != 0 {
        Some("")
    } else {
        None
    }
}

/// Neighbor cache timing info (struct nda_cacheinfo).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NdaCacheInfo {
    /// Time since the entry was last confirmed, in clock ticks.
    pub ndm_confirmed: u32,
    /// Time since the entry was last used, in clock ticks.
    pub ndm_used: u32,
    /// Time since the entry was last updated, in clock ticks.
    pub ndm_updated: u32,
    /// Reference count.
    pub ndm_refcnt: u32,
}

impl NdaCacheInfo {
    /// Parse from an attribute payload.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ndmsg_roundtrip() {
        let msg = NdMsg::new()
            .with_family(AF_BRIDGE)
            .with_ifindex(4)
            .with_state(nud::PERMANENT)
            .with_flags(ntf::SELF);

        let parsed = NdMsg::from_bytes(msg.as_bytes()).unwrap();
        assert_eq!(parsed.ndm_family, AF_BRIDGE);
        assert_eq!(parsed.ndm_ifindex, 4);
        assert_eq!(parsed.ndm_state, nud::PERMANENT);
        assert_eq!(parsed.ndm_flags, ntf::SELF);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(state_name(nud::PERMANENT), Some("permanent"));
        assert_eq!(state_name(nud::PERMANENT | nud::NOARP), Some("permanent"));
        assert_eq!(state_name(nud::NOARP), Some("static"));
        assert_eq!(state_name(nud::STALE), Some("stale"));
        assert_eq!(state_name(nud::REACHABLE), Some(""));
        assert_eq!(state_name(nud::FAILED), None);
    }
}
