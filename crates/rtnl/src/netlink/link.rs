//! Link (network interface) requests and replies.
//!
//! Typed link creation covers the kinds whose data nests this tool
//! understands: `vrf`, `ipvlan` and `veth`. The veth case is the
//! deepest nesting in the tree: `IFLA_LINKINFO` wraps `IFLA_INFO_DATA`
//! wraps `VETH_INFO_PEER`, whose payload is a complete ifinfomsg
//! followed by the peer's own attributes.

use super::attr::AttrTable;
use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{
    NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_EXCL, NLM_F_REQUEST, NlMsgType,
};
use super::parse::{FromNetlink, PResult, take_header};
use super::schema;
use super::types::link::{IfInfoMsg, OperState, iff, ifla, info, ipvlan, veth, vrf};

/// IPVLAN operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpvlanMode {
    L2,
    L3,
    L3s,
}

impl IpvlanMode {
    /// Parse the mode keyword.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "l2" => Ok(Self::L2),
            "l3" => Ok(Self::L3),
            "l3s" => Ok(Self::L3s),
            other => Err(Error::invalid_arg("ipvlan mode", other.to_string())),
        }
    }

    fn as_u16(self) -> u16 {
        match self {
            Self::L2 => ipvlan::MODE_L2,
            Self::L3 => ipvlan::MODE_L3,
            Self::L3s => ipvlan::MODE_L3S,
        }
    }

    /// Mode keyword for rendering.
    pub fn name(self) -> &'static str {
        match self {
            Self::L2 => "l2",
            Self::L3 => "l3",
            Self::L3s => "l3s",
        }
    }
}

/// IPVLAN port isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpvlanIsolation {
    /// Default: traffic between slaves crosses the master.
    #[default]
    Bridge,
    /// No cross-talk between slaves.
    Private,
    /// Hairpin via the external switch.
    Vepa,
}

impl IpvlanIsolation {
    fn as_u16(self) -> u16 {
        match self {
            Self::Bridge => 0,
            Self::Private => ipvlan::F_PRIVATE,
            Self::Vepa => ipvlan::F_VEPA,
        }
    }
}

/// Link type and its type-specific configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    /// Virtual routing and forwarding device bound to a routing table.
    Vrf { table: u32 },
    /// IPVLAN slave of some lower device.
    Ipvlan {
        mode: IpvlanMode,
        isolation: IpvlanIsolation,
    },
    /// Virtual ethernet pair; the peer may be named.
    Veth { peer: Option<String> },
}

impl LinkKind {
    /// The IFLA_INFO_KIND string.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Vrf { .. } => "vrf",
            Self::Ipvlan { .. } => "ipvlan",
            Self::Veth { .. } => "veth",
        }
    }

    fn write_info_data(&self, b: &mut MessageBuilder) -> Result<()> {
        match self {
            Self::Vrf { table } => {
                b.put(&schema::VRF, vrf::TABLE, *table as u64)?;
            }
            Self::Ipvlan { mode, isolation } => {
                b.put(&schema::IPVLAN, ipvlan::MODE, mode.as_u16() as u64)?;
                b.put(&schema::IPVLAN, ipvlan::FLAGS, isolation.as_u16() as u64)?;
            }
            Self::Veth { peer } => {
                // The peer record is a full link message nested inside
                // the data nest.
                let peer_nest = b.nest_start(veth::PEER)?;
                b.append(&IfInfoMsg::new())?;
                if let Some(name) = peer {
                    b.append_attr_str(ifla::IFNAME, name)?;
                }
                b.nest_end(peer_nest)?;
            }
        }
        Ok(())
    }
}

/// Builder for link add/del requests.
#[derive(Debug, Clone)]
pub struct LinkRequest {
    name: String,
    kind: Option<LinkKind>,
    mtu: Option<u32>,
    address: Option<[u8; 6]>,
    master_ifindex: Option<u32>,
    link_ifindex: Option<u32>,
    up: bool,
}

impl LinkRequest {
    /// Create a request for the given interface name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            mtu: None,
            address: None,
            master_ifindex: None,
            link_ifindex: None,
            up: false,
        }
    }

    /// Set the link kind and its configuration.
    pub fn kind(mut self, kind: LinkKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set the MTU.
    pub fn mtu(mut self, mtu: u32) -> Self {
        self.mtu = Some(mtu);
        self
    }

    /// Set the hardware address.
    pub fn address(mut self, address: [u8; 6]) -> Self {
        self.address = Some(address);
        self
    }

    /// Enslave to a master device (bridge, vrf, bond).
    pub fn master_ifindex(mut self, ifindex: u32) -> Self {
        self.master_ifindex = Some(ifindex);
        self
    }

    /// Set the lower device (ipvlan needs one).
    pub fn link_ifindex(mut self, ifindex: u32) -> Self {
        self.link_ifindex = Some(ifindex);
        self
    }

    /// Bring the link up on creation.
    pub fn up(mut self) -> Self {
        self.up = true;
        self
    }

    /// Build an add request.
    pub fn build_add(&self) -> Result<MessageBuilder> {
        if matches!(self.kind, Some(LinkKind::Ipvlan { .. })) && self.link_ifindex.is_none() {
            return Err(Error::InvalidMessage(
                "ipvlan requires a lower device (link)".into(),
            ));
        }

        let mut ifi = IfInfoMsg::new();
        if self.up {
            ifi = ifi.with_flags(iff::UP, iff::UP);
        }

        let mut b = MessageBuilder::new(
            NlMsgType::RTM_NEWLINK,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
        );
        b.append(&ifi)?;

        b.append_attr_str(ifla::IFNAME, &self.name)?;
        if let Some(mtu) = self.mtu {
            b.put(&schema::IFLA, ifla::MTU, mtu as u64)?;
        }
        if let Some(ref address) = self.address {
            b.put_bytes(&schema::IFLA, ifla::ADDRESS, address)?;
        }
        if let Some(master) = self.master_ifindex {
            b.put(&schema::IFLA, ifla::MASTER, master as u64)?;
        }
        if let Some(link) = self.link_ifindex {
            b.put(&schema::IFLA, ifla::LINK, link as u64)?;
        }

        if let Some(ref kind) = self.kind {
            let info_nest = b.nest_start(ifla::LINKINFO)?;
            b.append_attr_str(info::KIND, kind.kind_name())?;
            let data_nest = b.nest_start(info::DATA)?;
            kind.write_info_data(&mut b)?;
            b.nest_end(data_nest)?;
            b.nest_end(info_nest)?;
        }

        Ok(b)
    }

    /// Build a delete-by-name request.
    pub fn build_del(&self) -> Result<MessageBuilder> {
        let mut b = MessageBuilder::new(NlMsgType::RTM_DELLINK, NLM_F_REQUEST | NLM_F_ACK);
        b.append(&IfInfoMsg::new())?;
        b.append_attr_str(ifla::IFNAME, &self.name)?;
        Ok(b)
    }
}

/// Build a delete request by interface index.
pub fn build_del_by_index(ifindex: u32) -> Result<MessageBuilder> {
    let mut b = MessageBuilder::new(NlMsgType::RTM_DELLINK, NLM_F_REQUEST | NLM_F_ACK);
    b.append(&IfInfoMsg::new().with_index(ifindex as i32))?;
    Ok(b)
}

/// Build the link dump request.
pub fn build_dump() -> Result<MessageBuilder> {
    let mut b = MessageBuilder::new(NlMsgType::RTM_GETLINK, NLM_F_REQUEST | NLM_F_DUMP);
    b.append(&IfInfoMsg::new())?;
    Ok(b)
}

/// One decoded link record.
#[derive(Debug, Clone, Default)]
pub struct LinkEntry {
    /// Interface index.
    pub index: u32,
    /// Device flags (IFF_*).
    pub flags: u32,
    /// Interface name.
    pub name: Option<String>,
    /// MTU.
    pub mtu: Option<u32>,
    /// Operational state.
    pub operstate: OperState,
    /// Master device index.
    pub master: Option<u32>,
    /// Lower device index.
    pub link: Option<u32>,
    /// Device group.
    pub group: Option<u32>,
    /// Hardware address.
    pub address: Option<Vec<u8>>,
    /// Link kind from nested LINKINFO, when typed.
    pub kind: Option<String>,
}

impl FromNetlink for LinkEntry {
    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let header: IfInfoMsg = take_header(input)?;
        let attrs = *input;
        *input = &[];
        let table = AttrTable::for_schema(attrs, &schema::IFLA);

        let scalar = |id: u16| table.scalar(&schema::IFLA, id).ok().flatten();

        let mut entry = LinkEntry {
            index: header.ifi_index as u32,
            flags: header.ifi_flags,
            name: table
                .get(ifla::IFNAME)
                .and_then(|d| super::attr::get::string(d).ok())
                .map(String::from),
            mtu: scalar(ifla::MTU).map(|v| v as u32),
            operstate: scalar(ifla::OPERSTATE)
                .map(|v| OperState::from(v as u8))
                .unwrap_or_default(),
            master: scalar(ifla::MASTER).map(|v| v as u32),
            link: scalar(ifla::LINK).map(|v| v as u32),
            group: scalar(ifla::GROUP).map(|v| v as u32),
            address: table.get(ifla::ADDRESS).map(|d| d.to_vec()),
            ..Default::default()
        };

        if let Some(link_info) = table.get(ifla::LINKINFO) {
            let info_table = AttrTable::for_schema(link_info, &schema::LINKINFO);
            entry.kind = info_table
                .get(info::KIND)
                .and_then(|d| super::attr::get::string(d).ok())
                .map(String::from);
        }

        Ok(entry)
    }
}

impl LinkEntry {
    /// Whether the device is administratively up.
    pub fn is_up(&self) -> bool {
        self.flags & iff::UP != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::attr::{AttrIter, get};
    use crate::netlink::message::{NLMSG_HDRLEN, NlMsgHdr};

    fn payload(msg: &[u8]) -> &[u8] {
        &msg[NLMSG_HDRLEN..]
    }

    fn linkinfo_payload(msg: &[u8]) -> &[u8] {
        let table = AttrTable::for_schema(&payload(msg)[IfInfoMsg::SIZE..], &schema::IFLA);
        table.get(ifla::LINKINFO).unwrap()
    }

    #[test]
    fn test_vrf_add() {
        let req = LinkRequest::new("vrf-blue").kind(LinkKind::Vrf { table: 10 });
        let msg = req.build_add().unwrap().finish();

        let header = NlMsgHdr::from_bytes(&msg).unwrap();
        assert_eq!(header.nlmsg_type, NlMsgType::RTM_NEWLINK);
        assert!(header.nlmsg_flags & NLM_F_EXCL != 0);

        let link_info = AttrTable::for_schema(linkinfo_payload(&msg), &schema::LINKINFO);
        assert_eq!(get::string(link_info.get(info::KIND).unwrap()).unwrap(), "vrf");

        let data = AttrTable::for_schema(link_info.get(info::DATA).unwrap(), &schema::VRF);
        assert_eq!(data.scalar(&schema::VRF, vrf::TABLE).unwrap(), Some(10));
    }

    #[test]
    fn test_ipvlan_add() {
        let req = LinkRequest::new("ipvl0")
            .link_ifindex(2)
            .kind(LinkKind::Ipvlan {
                mode: IpvlanMode::L3,
                isolation: IpvlanIsolation::Vepa,
            });
        let msg = req.build_add().unwrap().finish();

        let link_info = AttrTable::for_schema(linkinfo_payload(&msg), &schema::LINKINFO);
        let data = AttrTable::for_schema(link_info.get(info::DATA).unwrap(), &schema::IPVLAN);
        assert_eq!(
            data.scalar(&schema::IPVLAN, ipvlan::MODE).unwrap(),
            Some(ipvlan::MODE_L3 as u64)
        );
        assert_eq!(
            data.scalar(&schema::IPVLAN, ipvlan::FLAGS).unwrap(),
            Some(ipvlan::F_VEPA as u64)
        );
    }

    #[test]
    fn test_ipvlan_requires_lower_device() {
        let req = LinkRequest::new("ipvl0").kind(LinkKind::Ipvlan {
            mode: IpvlanMode::L2,
            isolation: IpvlanIsolation::Bridge,
        });
        assert!(req.build_add().is_err());
    }

    #[test]
    fn test_veth_peer_nesting() {
        let req = LinkRequest::new("veth0").kind(LinkKind::Veth {
            peer: Some("veth1".to_string()),
        });
        let msg = req.build_add().unwrap().finish();

        // LINKINFO -> INFO_DATA -> VETH_INFO_PEER -> ifinfomsg + IFNAME
        let link_info = AttrTable::for_schema(linkinfo_payload(&msg), &schema::LINKINFO);
        let data = link_info.get(info::DATA).unwrap();

        let peer = AttrIter::new(data)
            .find(|(id, _)| *id == veth::PEER)
            .map(|(_, p)| p)
            .unwrap();

        let peer_header = IfInfoMsg::from_bytes(peer).unwrap();
        assert_eq!(peer_header.ifi_index, 0);

        let peer_attrs: Vec<_> = AttrIter::new(&peer[IfInfoMsg::SIZE..]).collect();
        assert_eq!(peer_attrs.len(), 1);
        assert_eq!(peer_attrs[0].0, ifla::IFNAME);
        assert_eq!(get::string(peer_attrs[0].1).unwrap(), "veth1");
    }

    #[test]
    fn test_up_sets_change_mask() {
        let msg = LinkRequest::new("veth0").up().build_add().unwrap().finish();
        let header = IfInfoMsg::from_bytes(payload(&msg)).unwrap();
        assert_eq!(header.ifi_flags & iff::UP, iff::UP);
        assert_eq!(header.ifi_change & iff::UP, iff::UP);
    }

    #[test]
    fn test_entry_roundtrip() {
        let req = LinkRequest::new("vrf-red")
            .mtu(1500)
            .kind(LinkKind::Vrf { table: 20 });
        let msg = req.build_add().unwrap().finish();

        let entry = LinkEntry::from_bytes(payload(&msg)).unwrap();
        assert_eq!(entry.name.as_deref(), Some("vrf-red"));
        assert_eq!(entry.mtu, Some(1500));
        assert_eq!(entry.kind.as_deref(), Some("vrf"));
        assert_eq!(entry.operstate, OperState::Unknown);
    }
}
