//! Attribute schema registry.
//!
//! One static table per object kind records every attribute's value kind
//! and byte order. [`MessageBuilder::put`](super::MessageBuilder::put)
//! and [`AttrTable::scalar`](super::AttrTable::scalar) both dispatch
//! through these tables, so an attribute's width and order are stated in
//! exactly one place. The wire protocol mixes host- and network-order
//! scalars within a single message (e.g. `NDA_VLAN` is host order while
//! `NDA_PORT` is big endian), which is precisely the class of mismatch
//! the registry exists to rule out.

use super::types::link::{ifla, info, ipvlan, vrf};
use super::types::neigh::nda;
use super::types::tc::{enc_opts, flower, geneve_opt, tca};

/// Value kind of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    U8,
    U16,
    U32,
    /// Variable-length payload (addresses, MACs, blobs, or containers
    /// whose layout depends on a sibling attribute).
    Bytes,
    /// NUL-terminated string.
    Str,
    /// Nested attribute run with its own schema.
    Nested,
}

impl AttrKind {
    /// Fixed payload width, if any.
    pub fn width(&self) -> Option<usize> {
        match self {
            Self::U8 => Some(1),
            Self::U16 => Some(2),
            Self::U32 => Some(4),
            _ => None,
        }
    }
}

/// Byte order of a scalar attribute on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Host,
    Network,
}

/// Registered properties of one attribute id.
#[derive(Debug, Clone, Copy)]
pub struct AttrSpec {
    pub id: u16,
    pub kind: AttrKind,
    pub order: ByteOrder,
    pub nested: Option<&'static Schema>,
}

impl AttrSpec {
    const fn scalar(id: u16, kind: AttrKind, order: ByteOrder) -> Self {
        Self {
            id,
            kind,
            order,
            nested: None,
        }
    }

    const fn u8(id: u16) -> Self {
        Self::scalar(id, AttrKind::U8, ByteOrder::Host)
    }

    const fn u16(id: u16) -> Self {
        Self::scalar(id, AttrKind::U16, ByteOrder::Host)
    }

    const fn u16_be(id: u16) -> Self {
        Self::scalar(id, AttrKind::U16, ByteOrder::Network)
    }

    const fn u32(id: u16) -> Self {
        Self::scalar(id, AttrKind::U32, ByteOrder::Host)
    }

    const fn u32_be(id: u16) -> Self {
        Self::scalar(id, AttrKind::U32, ByteOrder::Network)
    }

    const fn bytes(id: u16) -> Self {
        Self::scalar(id, AttrKind::Bytes, ByteOrder::Host)
    }

    const fn string(id: u16) -> Self {
        Self::scalar(id, AttrKind::Str, ByteOrder::Host)
    }

    const fn nested(id: u16, schema: &'static Schema) -> Self {
        Self {
            id,
            kind: AttrKind::Nested,
            order: ByteOrder::Host,
            nested: Some(schema),
        }
    }
}

/// Per-object-kind attribute table.
#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    /// Largest id the decoder accepts for this object kind.
    pub max_id: u16,
    specs: &'static [AttrSpec],
}

impl Schema {
    /// Look up the spec for an attribute id.
    pub fn get(&self, id: u16) -> Option<&AttrSpec> {
        self.specs.iter().find(|s| s.id == id)
    }

    /// All registered specs.
    pub fn specs(&self) -> &'static [AttrSpec] {
        self.specs
    }
}

/// Neighbor / bridge FDB attributes.
pub static NDA: Schema = Schema {
    name: "nda",
    max_id: nda::MAX,
    specs: &[
        AttrSpec::bytes(nda::DST),
        AttrSpec::bytes(nda::LLADDR),
        AttrSpec::bytes(nda::CACHEINFO),
        AttrSpec::u32(nda::PROBES),
        AttrSpec::u16(nda::VLAN),
        // VXLAN destination port travels big endian while VLAN is host
        // order; both live in the same message.
        AttrSpec::u16_be(nda::PORT),
        AttrSpec::u32(nda::VNI),
        AttrSpec::u32(nda::IFINDEX),
        AttrSpec::u32(nda::MASTER),
        AttrSpec::u32(nda::LINK_NETNSID),
        AttrSpec::u32(nda::SRC_VNI),
        AttrSpec::u8(nda::PROTOCOL),
        AttrSpec::u32(nda::NH_ID),
        AttrSpec::u32(nda::FLAGS_EXT),
        AttrSpec::u16(nda::NDM_STATE_MASK),
        AttrSpec::u8(nda::NDM_FLAGS_MASK),
    ],
};

/// Geneve tunnel option fields.
pub static GENEVE_OPT: Schema = Schema {
    name: "geneve_opt",
    max_id: geneve_opt::MAX,
    specs: &[
        AttrSpec::u16_be(geneve_opt::CLASS),
        AttrSpec::u8(geneve_opt::TYPE),
        AttrSpec::bytes(geneve_opt::DATA),
    ],
};

/// Tunnel option container (inside KEY_ENC_OPTS).
pub static ENC_OPTS: Schema = Schema {
    name: "enc_opts",
    max_id: enc_opts::MAX,
    specs: &[AttrSpec::nested(enc_opts::GENEVE, &GENEVE_OPT)],
};

/// Flower classifier options.
pub static FLOWER: Schema = Schema {
    name: "flower",
    max_id: flower::MAX,
    specs: &[
        AttrSpec::u32(flower::CLASSID),
        AttrSpec::string(flower::INDEV),
        AttrSpec::bytes(flower::KEY_ETH_DST),
        AttrSpec::bytes(flower::KEY_ETH_DST_MASK),
        AttrSpec::bytes(flower::KEY_ETH_SRC),
        AttrSpec::bytes(flower::KEY_ETH_SRC_MASK),
        AttrSpec::u16_be(flower::KEY_ETH_TYPE),
        AttrSpec::u8(flower::KEY_IP_PROTO),
        AttrSpec::bytes(flower::KEY_IPV4_SRC),
        AttrSpec::bytes(flower::KEY_IPV4_SRC_MASK),
        AttrSpec::bytes(flower::KEY_IPV4_DST),
        AttrSpec::bytes(flower::KEY_IPV4_DST_MASK),
        AttrSpec::bytes(flower::KEY_IPV6_SRC),
        AttrSpec::bytes(flower::KEY_IPV6_SRC_MASK),
        AttrSpec::bytes(flower::KEY_IPV6_DST),
        AttrSpec::bytes(flower::KEY_IPV6_DST_MASK),
        AttrSpec::u16_be(flower::KEY_TCP_SRC),
        AttrSpec::u16_be(flower::KEY_TCP_DST),
        AttrSpec::u16_be(flower::KEY_UDP_SRC),
        AttrSpec::u16_be(flower::KEY_UDP_DST),
        AttrSpec::u32(flower::FLAGS),
        AttrSpec::u16(flower::KEY_VLAN_ID),
        AttrSpec::u8(flower::KEY_VLAN_PRIO),
        AttrSpec::u16_be(flower::KEY_VLAN_ETH_TYPE),
        AttrSpec::u32_be(flower::KEY_ENC_KEY_ID),
        AttrSpec::bytes(flower::KEY_ENC_IPV4_SRC),
        AttrSpec::bytes(flower::KEY_ENC_IPV4_SRC_MASK),
        AttrSpec::bytes(flower::KEY_ENC_IPV4_DST),
        AttrSpec::bytes(flower::KEY_ENC_IPV4_DST_MASK),
        AttrSpec::bytes(flower::KEY_ENC_IPV6_SRC),
        AttrSpec::bytes(flower::KEY_ENC_IPV6_SRC_MASK),
        AttrSpec::bytes(flower::KEY_ENC_IPV6_DST),
        AttrSpec::bytes(flower::KEY_ENC_IPV6_DST_MASK),
        AttrSpec::u16_be(flower::KEY_TCP_SRC_MASK),
        AttrSpec::u16_be(flower::KEY_TCP_DST_MASK),
        AttrSpec::u16_be(flower::KEY_UDP_SRC_MASK),
        AttrSpec::u16_be(flower::KEY_UDP_DST_MASK),
        AttrSpec::u16_be(flower::KEY_SCTP_SRC_MASK),
        AttrSpec::u16_be(flower::KEY_SCTP_DST_MASK),
        AttrSpec::u16_be(flower::KEY_SCTP_SRC),
        AttrSpec::u16_be(flower::KEY_SCTP_DST),
        AttrSpec::u16_be(flower::KEY_ENC_UDP_SRC_PORT),
        AttrSpec::u16_be(flower::KEY_ENC_UDP_SRC_PORT_MASK),
        AttrSpec::u16_be(flower::KEY_ENC_UDP_DST_PORT),
        AttrSpec::u16_be(flower::KEY_ENC_UDP_DST_PORT_MASK),
        AttrSpec::u32_be(flower::KEY_FLAGS),
        AttrSpec::u32_be(flower::KEY_FLAGS_MASK),
        AttrSpec::u8(flower::KEY_ICMPV4_CODE),
        AttrSpec::u8(flower::KEY_ICMPV4_CODE_MASK),
        AttrSpec::u8(flower::KEY_ICMPV4_TYPE),
        AttrSpec::u8(flower::KEY_ICMPV4_TYPE_MASK),
        AttrSpec::u8(flower::KEY_ICMPV6_CODE),
        AttrSpec::u8(flower::KEY_ICMPV6_CODE_MASK),
        AttrSpec::u8(flower::KEY_ICMPV6_TYPE),
        AttrSpec::u8(flower::KEY_ICMPV6_TYPE_MASK),
        AttrSpec::bytes(flower::KEY_ARP_SIP),
        AttrSpec::bytes(flower::KEY_ARP_SIP_MASK),
        AttrSpec::bytes(flower::KEY_ARP_TIP),
        AttrSpec::bytes(flower::KEY_ARP_TIP_MASK),
        AttrSpec::u8(flower::KEY_ARP_OP),
        AttrSpec::u8(flower::KEY_ARP_OP_MASK),
        AttrSpec::bytes(flower::KEY_ARP_SHA),
        AttrSpec::bytes(flower::KEY_ARP_SHA_MASK),
        AttrSpec::bytes(flower::KEY_ARP_THA),
        AttrSpec::bytes(flower::KEY_ARP_THA_MASK),
        AttrSpec::u8(flower::KEY_MPLS_TTL),
        AttrSpec::u8(flower::KEY_MPLS_BOS),
        AttrSpec::u8(flower::KEY_MPLS_TC),
        AttrSpec::u32(flower::KEY_MPLS_LABEL),
        AttrSpec::u16_be(flower::KEY_TCP_FLAGS),
        AttrSpec::u16_be(flower::KEY_TCP_FLAGS_MASK),
        AttrSpec::u8(flower::KEY_IP_TOS),
        AttrSpec::u8(flower::KEY_IP_TOS_MASK),
        AttrSpec::u8(flower::KEY_IP_TTL),
        AttrSpec::u8(flower::KEY_IP_TTL_MASK),
        AttrSpec::u16(flower::KEY_CVLAN_ID),
        AttrSpec::u8(flower::KEY_CVLAN_PRIO),
        AttrSpec::u16_be(flower::KEY_CVLAN_ETH_TYPE),
        AttrSpec::u8(flower::KEY_ENC_IP_TOS),
        AttrSpec::u8(flower::KEY_ENC_IP_TOS_MASK),
        AttrSpec::u8(flower::KEY_ENC_IP_TTL),
        AttrSpec::u8(flower::KEY_ENC_IP_TTL_MASK),
        AttrSpec::nested(flower::KEY_ENC_OPTS, &ENC_OPTS),
        AttrSpec::nested(flower::KEY_ENC_OPTS_MASK, &ENC_OPTS),
        AttrSpec::u32(flower::IN_HW_COUNT),
        AttrSpec::u16_be(flower::KEY_PORT_SRC_MIN),
        AttrSpec::u16_be(flower::KEY_PORT_SRC_MAX),
        AttrSpec::u16_be(flower::KEY_PORT_DST_MIN),
        AttrSpec::u16_be(flower::KEY_PORT_DST_MAX),
    ],
};

/// Outer tc attributes (kind, options, chain).
pub static TCA: Schema = Schema {
    name: "tca",
    max_id: tca::MAX,
    specs: &[
        AttrSpec::string(tca::KIND),
        AttrSpec::bytes(tca::OPTIONS),
        AttrSpec::u32(tca::CHAIN),
    ],
};

/// VRF link-info data.
pub static VRF: Schema = Schema {
    name: "vrf",
    max_id: vrf::MAX,
    specs: &[AttrSpec::u32(vrf::TABLE)],
};

/// IPVLAN link-info data.
pub static IPVLAN: Schema = Schema {
    name: "ipvlan",
    max_id: ipvlan::MAX,
    specs: &[
        AttrSpec::u16(ipvlan::MODE),
        AttrSpec::u16(ipvlan::FLAGS),
    ],
};

/// IFLA_LINKINFO contents. INFO_DATA's layout depends on INFO_KIND, so
/// it stays an opaque container here and is decoded by kind-specific
/// code.
pub static LINKINFO: Schema = Schema {
    name: "linkinfo",
    max_id: info::MAX,
    specs: &[
        AttrSpec::string(info::KIND),
        AttrSpec::bytes(info::DATA),
        AttrSpec::string(info::SLAVE_KIND),
        AttrSpec::bytes(info::SLAVE_DATA),
    ],
};

/// Link attributes.
pub static IFLA: Schema = Schema {
    name: "ifla",
    max_id: ifla::MAX,
    specs: &[
        AttrSpec::bytes(ifla::ADDRESS),
        AttrSpec::bytes(ifla::BROADCAST),
        AttrSpec::string(ifla::IFNAME),
        AttrSpec::u32(ifla::MTU),
        AttrSpec::u32(ifla::LINK),
        AttrSpec::string(ifla::QDISC),
        AttrSpec::u32(ifla::MASTER),
        AttrSpec::u8(ifla::OPERSTATE),
        AttrSpec::u8(ifla::LINKMODE),
        AttrSpec::nested(ifla::LINKINFO, &LINKINFO),
        AttrSpec::u32(ifla::GROUP),
        AttrSpec::u8(ifla::CARRIER),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    static ALL: &[&Schema] = &[
        &NDA, &FLOWER, &TCA, &IFLA, &LINKINFO, &VRF, &IPVLAN, &ENC_OPTS, &GENEVE_OPT,
    ];

    /// Every registry must be internally consistent: unique ids within
    /// bounds, sub-schemas exactly on nested entries, and network order
    /// only on scalars that have a byte order to begin with.
    #[test]
    fn test_registry_self_consistency() {
        for schema in ALL {
            let mut seen = std::collections::HashSet::new();
            for spec in schema.specs() {
                assert!(
                    seen.insert(spec.id),
                    "{}: duplicate id {}",
                    schema.name,
                    spec.id
                );
                assert!(
                    spec.id <= schema.max_id,
                    "{}: id {} above max {}",
                    schema.name,
                    spec.id,
                    schema.max_id
                );
                assert_eq!(
                    spec.kind == AttrKind::Nested,
                    spec.nested.is_some(),
                    "{}: id {} nested marker and sub-schema disagree",
                    schema.name,
                    spec.id
                );
                if spec.order == ByteOrder::Network {
                    assert!(
                        matches!(spec.kind, AttrKind::U16 | AttrKind::U32),
                        "{}: id {} claims network order without a scalar width",
                        schema.name,
                        spec.id
                    );
                }
                if let Some(w) = spec.kind.width() {
                    assert!(w == 1 || w == 2 || w == 4);
                }
            }
        }
    }

    /// Round-trip every registered scalar through the builder and the
    /// attribute table; widths and orders must agree end to end.
    #[test]
    fn test_registry_roundtrip() {
        use crate::netlink::builder::MessageBuilder;
        use crate::netlink::message::{NLM_F_REQUEST, NLMSG_HDRLEN};
        use crate::netlink::attr::AttrTable;

        for schema in ALL {
            for spec in schema.specs() {
                let Some(width) = spec.kind.width() else {
                    continue;
                };
                let value: u64 = match width {
                    1 => 0xa5,
                    2 => 0xbeef,
                    _ => 0xdead_beef,
                };

                let mut builder = MessageBuilder::new(16, NLM_F_REQUEST);
                builder.put(schema, spec.id, value).unwrap();
                let msg = builder.finish();

                let table = AttrTable::for_schema(&msg[NLMSG_HDRLEN..], schema);
                assert_eq!(
                    table.scalar(schema, spec.id).unwrap(),
                    Some(value),
                    "{} id {} failed to round-trip",
                    schema.name,
                    spec.id
                );
            }
        }
    }
}
