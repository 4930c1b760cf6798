//! Link message types (struct ifinfomsg and IFLA_* attributes),
//! including the nested link-info ids for the supported kinds.

use crate::netlink::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Link message (struct ifinfomsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IfInfoMsg {
    /// Address family (AF_UNSPEC for links).
    pub ifi_family: u8,
    /// Padding.
    pub ifi_pad: u8,
    /// Device type (ARPHRD_*).
    pub ifi_type: u16,
    /// Interface index.
    pub ifi_index: i32,
    /// Device flags (IFF_*).
    pub ifi_flags: u32,
    /// Change mask for ifi_flags.
    pub ifi_change: u32,
}

impl IfInfoMsg {
    /// Size of this structure.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a new link message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interface index.
    pub fn with_index(mut self, index: i32) -> Self {
        self.ifi_index = index;
        self
    }

    /// Set device flags together with their change mask.
    pub fn with_flags(mut self, flags: u32, change: u32) -> Self {
        self.ifi_flags = flags;
        self.ifi_change = change;
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

/// Device flags (IFF_*), the subset the link commands touch.
pub mod iff {
    pub const UP: u32 = 0x1;
    pub const RUNNING: u32 = 0x40;
    pub const LOWER_UP: u32 = 0x10000;
}

/// Link attributes (IFLA_*), the subset the link commands touch.
pub mod ifla {
    pub const UNSPEC: u16 = 0;
    pub const ADDRESS: u16 = 1;
    pub const BROADCAST: u16 = 2;
    pub const IFNAME: u16 = 3;
    pub const MTU: u16 = 4;
    pub const LINK: u16 = 5;
    pub const QDISC: u16 = 6;
    pub const MASTER: u16 = 10;
    pub const OPERSTATE: u16 = 16;
    pub const LINKMODE: u16 = 17;
    pub const LINKINFO: u16 = 18;
    pub const GROUP: u16 = 27;
    pub const CARRIER: u16 = 33;
    /// Upper bound for dump tables; the kernel grows this list steadily
    /// and anything above is skipped.
    pub const MAX: u16 = 64;
}

/// Nested IFLA_LINKINFO attributes (IFLA_INFO_*).
pub mod info {
    pub const UNSPEC: u16 = 0;
    pub const KIND: u16 = 1;
    pub const DATA: u16 = 2;
    pub const XSTATS: u16 = 3;
    pub const SLAVE_KIND: u16 = 4;
    pub const SLAVE_DATA: u16 = 5;
    pub const MAX: u16 = 5;
}

/// VRF link-info data attributes (IFLA_VRF_*).
pub mod vrf {
    pub const UNSPEC: u16 = 0;
    pub const TABLE: u16 = 1;
    pub const MAX: u16 = 1;
}

/// IPVLAN link-info data attributes (IFLA_IPVLAN_*).
pub mod ipvlan {
    pub const UNSPEC: u16 = 0;
    pub const MODE: u16 = 1;
    pub const FLAGS: u16 = 2;
    pub const MAX: u16 = 2;

    pub const MODE_L2: u16 = 0;
    pub const MODE_L3: u16 = 1;
    pub const MODE_L3S: u16 = 2;

    pub const F_PRIVATE: u16 = 0x01;
    pub const F_VEPA: u16 = 0x02;
}

/// Veth link-info data attributes (VETH_INFO_*).
pub mod veth {
    pub const UNSPEC: u16 = 0;
    /// Payload is a full ifinfomsg followed by the peer's attributes.
    pub const PEER: u16 = 1;
    pub const MAX: u16 = 1;
}

/// Operational state (IF_OPER_*).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OperState {
    #[default]
    Unknown = 0,
    NotPresent = 1,
    Down = 2,
    LowerLayerDown = 3,
    Testing = 4,
    Dormant = 5,
    Up = 6,
}

impl From<u8> for OperState {
    fn from(val: u8) -> Self {
        match val {
            1 => Self::NotPresent,
            2 => Self::Down,
            3 => Self::LowerLayerDown,
            4 => Self::Testing,
            5 => Self::Dormant,
            6 => Self::Up,
            _ => Self::Unknown,
        }
    }
}

impl OperState {
    /// Name as printed by `ip link`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::NotPresent => "NOTPRESENT",
            Self::Down => "DOWN",
            Self::LowerLayerDown => "LOWERLAYERDOWN",
            Self::Testing => "TESTING",
            Self::Dormant => "DORMANT",
            Self::Up => "UP",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ifinfomsg_size() {
        // Fixed by the kernel ABI.
        assert_eq!(IfInfoMsg::SIZE, 16);
    }

    #[test]
    fn test_operstate_names() {
        assert_eq!(OperState::from(6).name(), "UP");
        assert_eq!(OperState::from(2).name(), "DOWN");
        assert_eq!(OperState::from(99), OperState::Unknown);
    }
}
