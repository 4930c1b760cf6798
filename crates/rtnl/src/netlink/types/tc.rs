//! Traffic-control message types: struct tcmsg, the outer TCA_*
//! attributes, filter handles and the flower classifier's attribute ids.

use crate::netlink::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Traffic control message (struct tcmsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct TcMsg {
    /// Address family (AF_UNSPEC).
    pub tcm_family: u8,
    /// Padding.
    pub tcm_pad1: u8,
    /// Padding.
    pub tcm_pad2: u16,
    /// Interface index.
    pub tcm_ifindex: i32,
    /// Qdisc/class/filter handle.
    pub tcm_handle: u32,
    /// Parent qdisc/class.
    pub tcm_parent: u32,
    /// For filters: (protocol << 16) | priority.
    pub tcm_info: u32,
}

impl TcMsg {
    /// Size of this structure.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a new tc message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interface index.
    pub fn with_ifindex(mut self, ifindex: i32) -> Self {
        self.tcm_ifindex = ifindex;
        self
    }

    /// Set the handle.
    pub fn with_handle(mut self, handle: u32) -> Self {
        self.tcm_handle = handle;
        self
    }

    /// Set the parent.
    pub fn with_parent(mut self, parent: u32) -> Self {
        self.tcm_parent = parent;
        self
    }

    /// Set the raw info field.
    pub fn with_info(mut self, info: u32) -> Self {
        self.tcm_info = info;
        self
    }

    /// Pack a filter's priority and protocol into tcm_info. The
    /// protocol occupies the low 16 bits in network byte order; the
    /// priority sits above it.
    pub fn filter_info(prio: u16, protocol: u16) -> u32 {
        ((prio as u32) << 16) | protocol.to_be() as u32
    }

    /// Filter protocol (ethertype, host order) from tcm_info.
    pub fn protocol(&self) -> u16 {
        u16::from_be((self.tcm_info & 0xffff) as u16)
    }

    /// Filter priority from tcm_info.
    pub fn priority(&self) -> u16 {
        (self.tcm_info >> 16) as u16
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

/// Outer TCA_* attributes shared by qdiscs, classes and filters.
pub mod tca {
    pub const UNSPEC: u16 = 0;
    pub const KIND: u16 = 1;
    pub const OPTIONS: u16 = 2;
    pub const STATS: u16 = 3;
    pub const XSTATS: u16 = 4;
    pub const RATE: u16 = 5;
    pub const FCNT: u16 = 6;
    pub const STATS2: u16 = 7;
    pub const STAB: u16 = 8;
    pub const PAD: u16 = 9;
    pub const DUMP_INVISIBLE: u16 = 10;
    pub const CHAIN: u16 = 11;
    pub const MAX: u16 = 11;
}

/// Qdisc/class handle helpers ("maj:min" notation).
pub mod tc_handle {
    /// TC_H_ROOT.
    pub const ROOT: u32 = 0xFFFF_FFFF;
    /// TC_H_UNSPEC.
    pub const UNSPEC: u32 = 0;
    /// TC_H_INGRESS.
    pub const INGRESS: u32 = 0xFFFF_FFF1;

    /// Build a handle from major and minor parts.
    pub const fn make(maj: u16, min: u16) -> u32 {
        ((maj as u32) << 16) | min as u32
    }

    /// Major part of a handle.
    pub const fn maj(handle: u32) -> u16 {
        (handle >> 16) as u16
    }

    /// Minor part of a handle.
    pub const fn min(handle: u32) -> u16 {
        (handle & 0xffff) as u16
    }

    /// Parse "root", "ingress", "none" or hex "maj:[min]" / bare minor.
    pub fn parse(s: &str) -> Option<u32> {
        match s {
            "root" => return Some(ROOT),
            "ingress" => return Some(INGRESS),
            "none" => return Some(UNSPEC),
            _ => {}
        }
        if let Some((maj_s, min_s)) = s.split_once(':') {
            let maj = u16::from_str_radix(maj_s, 16).ok()?;
            let min = if min_s.is_empty() {
                0
            } else {
                u16::from_str_radix(min_s, 16).ok()?
            };
            Some(make(maj, min))
        } else {
            u16::from_str_radix(s, 16).ok().map(|min| min as u32)
        }
    }

    /// Format a handle as "maj:min" (empty minor omitted).
    pub fn format(handle: u32) -> String {
        match handle {
            ROOT => "root".to_string(),
            _ if min(handle) == 0 => format!("{:x}:", maj(handle)),
            _ => format!("{:x}:{:x}", maj(handle), min(handle)),
        }
    }
}

/// Classifier flags (TCA_CLS_FLAGS_*).
pub mod cls_flags {
    pub const SKIP_HW: u32 = 1 << 0;
    pub const SKIP_SW: u32 = 1 << 1;
    pub const IN_HW: u32 = 1 << 2;
    pub const NOT_IN_HW: u32 = 1 << 3;
    pub const VERBOSE: u32 = 1 << 4;
}

/// Flower classifier attributes (TCA_FLOWER_*).
pub mod flower {
    pub const UNSPEC: u16 = 0;
    pub const CLASSID: u16 = 1;
    pub const INDEV: u16 = 2;
    pub const ACT: u16 = 3;
    pub const KEY_ETH_DST: u16 = 4;
    pub const KEY_ETH_DST_MASK: u16 = 5;
    pub const KEY_ETH_SRC: u16 = 6;
    pub const KEY_ETH_SRC_MASK: u16 = 7;
    pub const KEY_ETH_TYPE: u16 = 8;
    pub const KEY_IP_PROTO: u16 = 9;
    pub const KEY_IPV4_SRC: u16 = 10;
    pub const KEY_IPV4_SRC_MASK: u16 = 11;
    pub const KEY_IPV4_DST: u16 = 12;
    pub const KEY_IPV4_DST_MASK: u16 = 13;
    pub const KEY_IPV6_SRC: u16 = 14;
    pub const KEY_IPV6_SRC_MASK: u16 = 15;
    pub const KEY_IPV6_DST: u16 = 16;
    pub const KEY_IPV6_DST_MASK: u16 = 17;
    pub const KEY_TCP_SRC: u16 = 18;
    pub const KEY_TCP_DST: u16 = 19;
    pub const KEY_UDP_SRC: u16 = 20;
    pub const KEY_UDP_DST: u16 = 21;
    pub const FLAGS: u16 = 22;
    pub const KEY_VLAN_ID: u16 = 23;
    pub const KEY_VLAN_PRIO: u16 = 24;
    pub const KEY_VLAN_ETH_TYPE: u16 = 25;
    pub const KEY_ENC_KEY_ID: u16 = 26;
    pub const KEY_ENC_IPV4_SRC: u16 = 27;
    pub const KEY_ENC_IPV4_SRC_MASK: u16 = 28;
    pub const KEY_ENC_IPV4_DST: u16 = 29;
    pub const KEY_ENC_IPV4_DST_MASK: u16 = 30;
    pub const KEY_ENC_IPV6_SRC: u16 = 31;
    pub const KEY_ENC_IPV6_SRC_MASK: u16 = 32;
    pub const KEY_ENC_IPV6_DST: u16 = 33;
    pub const KEY_ENC_IPV6_DST_MASK: u16 = 34;
    pub const KEY_TCP_SRC_MASK: u16 = 35;
    pub const KEY_TCP_DST_MASK: u16 = 36;
    pub const KEY_UDP_SRC_MASK: u16 = 37;
    pub const KEY_UDP_DST_MASK: u16 = 38;
    pub const KEY_SCTP_SRC_MASK: u16 = 39;
    pub const KEY_SCTP_DST_MASK: u16 = 40;
    pub const KEY_SCTP_SRC: u16 = 41;
    pub const KEY_SCTP_DST: u16 = 42;
    pub const KEY_ENC_UDP_SRC_PORT: u16 = 43;
    pub const KEY_ENC_UDP_SRC_PORT_MASK: u16 = 44;
    pub const KEY_ENC_UDP_DST_PORT: u16 = 45;
    pub const KEY_ENC_UDP_DST_PORT_MASK: u16 = 46;
    pub const KEY_FLAGS: u16 = 47;
    pub const KEY_FLAGS_MASK: u16 = 48;
    pub const KEY_ICMPV4_CODE: u16 = 49;
    pub const KEY_ICMPV4_CODE_MASK: u16 = 50;
    pub const KEY_ICMPV4_TYPE: u16 = 51;
    pub const KEY_ICMPV4_TYPE_MASK: u16 = 52;
    pub const KEY_ICMPV6_CODE: u16 = 53;
    pub const KEY_ICMPV6_CODE_MASK: u16 = 54;
    pub const KEY_ICMPV6_TYPE: u16 = 55;
    pub const KEY_ICMPV6_TYPE_MASK: u16 = 56;
    pub const KEY_ARP_SIP: u16 = 57;
    pub const KEY_ARP_SIP_MASK: u16 = 58;
    pub const KEY_ARP_TIP: u16 = 59;
    pub const KEY_ARP_TIP_MASK: u16 = 60;
    pub const KEY_ARP_OP: u16 = 61;
    pub const KEY_ARP_OP_MASK: u16 = 62;
    pub const KEY_ARP_SHA: u16 = 63;
    pub const KEY_ARP_SHA_MASK: u16 = 64;
    pub const KEY_ARP_THA: u16 = 65;
    pub const KEY_ARP_THA_MASK: u16 = 66;
    pub const KEY_MPLS_TTL: u16 = 67;
    pub const KEY_MPLS_BOS: u16 = 68;
    pub const KEY_MPLS_TC: u16 = 69;
    pub const KEY_MPLS_LABEL: u16 = 70;
    pub const KEY_TCP_FLAGS: u16 = 71;
    pub const KEY_TCP_FLAGS_MASK: u16 = 72;
    pub const KEY_IP_TOS: u16 = 73;
    pub const KEY_IP_TOS_MASK: u16 = 74;
    pub const KEY_IP_TTL: u16 = 75;
    pub const KEY_IP_TTL_MASK: u16 = 76;
    pub const KEY_CVLAN_ID: u16 = 77;
    pub const KEY_CVLAN_PRIO: u16 = 78;
    pub const KEY_CVLAN_ETH_TYPE: u16 = 79;
    pub const KEY_ENC_IP_TOS: u16 = 80;
    pub const KEY_ENC_IP_TOS_MASK: u16 = 81;
    pub const KEY_ENC_IP_TTL: u16 = 82;
    pub const KEY_ENC_IP_TTL_MASK: u16 = 83;
    pub const KEY_ENC_OPTS: u16 = 84;
    pub const KEY_ENC_OPTS_MASK: u16 = 85;
    pub const IN_HW_COUNT: u16 = 86;
    pub const KEY_PORT_SRC_MIN: u16 = 87;
    pub const KEY_PORT_SRC_MAX: u16 = 88;
    pub const KEY_PORT_DST_MIN: u16 = 89;
    pub const KEY_PORT_DST_MAX: u16 = 90;
    pub const MAX: u16 = 90;

    /// Matching-flag bits carried in KEY_FLAGS (network order on the wire).
    pub const KEY_FLAGS_IS_FRAGMENT: u32 = 1 << 0;
    pub const KEY_FLAGS_FRAG_IS_FIRST: u32 = 1 << 1;
}

/// Tunnel-option container attributes (inside KEY_ENC_OPTS{,_MASK}).
pub mod enc_opts {
    pub const UNSPEC: u16 = 0;
    pub const GENEVE: u16 = 1;
    pub const MAX: u16 = 1;
}

/// Geneve option attributes (inside enc_opts::GENEVE).
pub mod geneve_opt {
    pub const UNSPEC: u16 = 0;
    pub const CLASS: u16 = 1;
    pub const TYPE: u16 = 2;
    pub const DATA: u16 = 3;
    pub const MAX: u16 = 3;
}

/// MPLS field limits (from the label-stack entry layout).
pub mod mpls {
    pub const LABEL_MAX: u32 = 0xfffff;
    pub const TC_MAX: u8 = 0x7;
    pub const BOS_MAX: u8 = 0x1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcmsg_size() {
        assert_eq!(TcMsg::SIZE, 20);
    }

    #[test]
    fn test_tcm_info_split() {
        let msg = TcMsg::new().with_info(TcMsg::filter_info(10, 0x0800));
        assert_eq!(msg.protocol(), 0x0800);
        assert_eq!(msg.priority(), 10);
    }

    #[test]
    fn test_handle_parse() {
        assert_eq!(tc_handle::parse("root"), Some(tc_handle::ROOT));
        assert_eq!(tc_handle::parse("1:"), Some(0x0001_0000));
        assert_eq!(tc_handle::parse("1:10"), Some(0x0001_0010));
        assert_eq!(tc_handle::parse("ffff:2"), Some(0xffff_0002));
        assert_eq!(tc_handle::parse("bogus"), None);
    }

    #[test]
    fn test_handle_format() {
        assert_eq!(tc_handle::format(tc_handle::make(1, 0x10)), "1:10");
        assert_eq!(tc_handle::format(tc_handle::make(1, 0)), "1:");
        assert_eq!(tc_handle::format(tc_handle::ROOT), "root");
    }
}
