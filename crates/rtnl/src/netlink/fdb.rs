//! Bridge forwarding database (FDB) requests and replies.
//!
//! FDB entries ride the neighbor message family with `AF_BRIDGE`:
//! modify verbs are `RTM_NEWNEIGH`/`RTM_DELNEIGH`, lookups are
//! `RTM_GETNEIGH`, and a flush is a bulk delete whose state/flag masks
//! tell the kernel which entries qualify.

use std::net::IpAddr;

use super::attr::AttrTable;
use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{
    NLM_F_ACK, NLM_F_APPEND, NLM_F_BULK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_EXCL, NLM_F_REPLACE,
    NLM_F_REQUEST, NlMsgType,
};
use super::parse::{FromNetlink, PResult, take_header};
use super::schema;
use super::types::neigh::{AF_BRIDGE, NdMsg, NdaCacheInfo, nda, ntf, nud};
use crate::util;
use crate::util::addr::addr_from_octets;

/// Resolve a device name to an ifindex.
fn resolve_dev(name: &str) -> Result<u32> {
    util::ifindex(name).ok_or_else(|| Error::DeviceNotFound {
        name: name.to_string(),
    })
}

/// Largest value a VXLAN network identifier can take (24 bits).
const VNI_MAX: u32 = (1 << 24) - 1;

// ============================================================================
// Modify (add / append / replace / del)
// ============================================================================

/// Builder for FDB add/append/replace/del requests.
///
/// Defaults follow the kernel tooling conventions: an entry is `self`
/// unless `master` was requested, and `permanent` unless some other
/// state keyword was given.
///
/// # Example
///
/// ```ignore
/// let mac = rtnl::util::addr::parse_mac("aa:bb:cc:dd:ee:ff")?;
/// let req = FdbRequest::new(mac)
///     .dev("vxlan0")
///     .dst("192.168.1.100".parse().unwrap())
///     .vni(42)?;
/// conn.request_ack(req.build_add()?).await?;
/// ```
#[derive(Debug, Clone)]
pub struct FdbRequest {
    mac: [u8; 6],
    dev: Option<String>,
    ifindex: Option<u32>,
    dst: Option<IpAddr>,
    port: Option<u16>,
    vni: Option<u32>,
    src_vni: Option<u32>,
    via: Option<String>,
    via_ifindex: Option<u32>,
    nhid: Option<u32>,
    vlan: Option<u16>,
    state: u16,
    flags: u8,
}

impl FdbRequest {
    /// Create a request for the given MAC address.
    pub fn new(mac: [u8; 6]) -> Self {
        Self {
            mac,
            dev: None,
            ifindex: None,
            dst: None,
            port: None,
            vni: None,
            src_vni: None,
            via: None,
            via_ifindex: None,
            nhid: None,
            vlan: None,
            state: nud::NOARP,
            flags: 0,
        }
    }

    /// Set the device (bridge port) by name.
    pub fn dev(mut self, dev: impl Into<String>) -> Self {
        self.dev = Some(dev.into());
        self
    }

    /// Set the device by interface index, bypassing name resolution.
    pub fn ifindex(mut self, ifindex: u32) -> Self {
        self.ifindex = Some(ifindex);
        self
    }

    /// Set the destination IP (VXLAN remote endpoint).
    pub fn dst(mut self, dst: IpAddr) -> Self {
        self.dst = Some(dst);
        self
    }

    /// Set the destination UDP port (VXLAN).
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the VXLAN network identifier.
    pub fn vni(mut self, vni: u32) -> Result<Self> {
        if vni > VNI_MAX {
            return Err(Error::invalid_arg("vni", vni.to_string()));
        }
        self.vni = Some(vni);
        Ok(self)
    }

    /// Set the source VNI.
    pub fn src_vni(mut self, vni: u32) -> Result<Self> {
        if vni > VNI_MAX {
            return Err(Error::invalid_arg("src_vni", vni.to_string()));
        }
        self.src_vni = Some(vni);
        Ok(self)
    }

    /// Route the entry via another device.
    pub fn via(mut self, dev: impl Into<String>) -> Self {
        self.via = Some(dev.into());
        self
    }

    /// Route the entry via a device given by index.
    pub fn via_ifindex(mut self, ifindex: u32) -> Self {
        self.via_ifindex = Some(ifindex);
        self
    }

    /// Point the entry at a nexthop group instead of dst/port/vni.
    pub fn nhid(mut self, nhid: u32) -> Self {
        self.nhid = Some(nhid);
        self
    }

    /// Set the VLAN ID.
    pub fn vlan(mut self, vlan: u16) -> Self {
        self.vlan = Some(vlan);
        self
    }

    /// Mark the entry local/permanent.
    pub fn permanent(mut self) -> Self {
        self.state |= nud::PERMANENT;
        self
    }

    /// Mark the entry static (reachable, no ARP).
    pub fn static_entry(mut self) -> Self {
        self.state |= nud::REACHABLE;
        self
    }

    /// Mark the entry dynamic (subject to ageing).
    pub fn dynamic(mut self) -> Self {
        self.state |= nud::REACHABLE;
        self.state &= !nud::NOARP;
        self
    }

    /// Install into the device's own FDB (NTF_SELF).
    pub fn self_entry(mut self) -> Self {
        self.flags |= ntf::SELF;
        self
    }

    /// Forward to the master bridge (NTF_MASTER).
    pub fn master(mut self) -> Self {
        self.flags |= ntf::MASTER;
        self
    }

    /// Mark as a router entry.
    pub fn router(mut self) -> Self {
        self.flags |= ntf::ROUTER;
        self
    }

    /// Mark as in-use.
    pub fn use_entry(mut self) -> Self {
        self.flags |= ntf::USE;
        self
    }

    /// Mark as externally learned.
    pub fn extern_learn(mut self) -> Self {
        self.flags |= ntf::EXT_LEARNED;
        self
    }

    /// Mark as sticky (never migrates to another port).
    pub fn sticky(mut self) -> Self {
        self.flags |= ntf::STICKY;
        self
    }

    fn resolve_ifindex(&self) -> Result<u32> {
        if let Some(idx) = self.ifindex {
            Ok(idx)
        } else if let Some(ref dev) = self.dev {
            resolve_dev(dev)
        } else {
            Err(Error::InvalidMessage(
                "device and address are required arguments".into(),
            ))
        }
    }

    fn build_modify(&self, msg_type: u16, extra_flags: u16) -> Result<MessageBuilder> {
        // nhid points into the nexthop subsystem; the VXLAN trio would
        // contradict it.
        if self.nhid.is_some()
            && (self.dst.is_some() || self.port.is_some() || self.vni.is_some())
        {
            return Err(Error::ConflictingOptions(
                "dst, port, vni are mutually exclusive with nhid",
            ));
        }

        let ifindex = self.resolve_ifindex()?;
        let via = match (&self.via, self.via_ifindex) {
            (_, Some(idx)) => Some(idx),
            (Some(dev), None) => Some(resolve_dev(dev)?),
            (None, None) => None,
        };

        let mut state = self.state;
        let mut flags = self.flags;
        // Assume self
        if flags & (ntf::SELF | ntf::MASTER) == 0 {
            flags |= ntf::SELF;
        }
        // Assume permanent
        if state & (nud::PERMANENT | nud::REACHABLE) == 0 {
            state |= nud::PERMANENT;
        }

        let ndmsg = NdMsg::new()
            .with_family(AF_BRIDGE)
            .with_ifindex(ifindex as i32)
            .with_state(state)
            .with_flags(flags);

        let mut b = MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_ACK | extra_flags);
        b.append(&ndmsg)?;

        b.put_bytes(&schema::NDA, nda::LLADDR, &self.mac)?;

        if let Some(ref dst) = self.dst {
            b.put_bytes(&schema::NDA, nda::DST, &crate::util::addr::addr_octets(dst))?;
        }
        if let Some(vlan) = self.vlan {
            b.put(&schema::NDA, nda::VLAN, vlan as u64)?;
        }
        if let Some(nhid) = self.nhid {
            b.put(&schema::NDA, nda::NH_ID, nhid as u64)?;
        }
        if let Some(port) = self.port {
            b.put(&schema::NDA, nda::PORT, port as u64)?;
        }
        if let Some(vni) = self.vni {
            b.put(&schema::NDA, nda::VNI, vni as u64)?;
        }
        if let Some(src_vni) = self.src_vni {
            b.put(&schema::NDA, nda::SRC_VNI, src_vni as u64)?;
        }
        if let Some(via) = via {
            b.put(&schema::NDA, nda::IFINDEX, via as u64)?;
        }

        Ok(b)
    }

    /// Build an add request (fails if the entry exists).
    pub fn build_add(&self) -> Result<MessageBuilder> {
        self.build_modify(NlMsgType::RTM_NEWNEIGH, NLM_F_CREATE | NLM_F_EXCL)
    }

    /// Build an append request (adds another destination).
    pub fn build_append(&self) -> Result<MessageBuilder> {
        self.build_modify(NlMsgType::RTM_NEWNEIGH, NLM_F_CREATE | NLM_F_APPEND)
    }

    /// Build a replace request (add or update).
    pub fn build_replace(&self) -> Result<MessageBuilder> {
        self.build_modify(NlMsgType::RTM_NEWNEIGH, NLM_F_CREATE | NLM_F_REPLACE)
    }

    /// Build a delete request.
    pub fn build_del(&self) -> Result<MessageBuilder> {
        self.build_modify(NlMsgType::RTM_DELNEIGH, 0)
    }
}

// ============================================================================
// Get (single lookup)
// ============================================================================

/// Builder for `fdb get`: look up one entry by MAC.
#[derive(Debug, Clone, Default)]
pub struct FdbGetRequest {
    mac: [u8; 6],
    dev: Option<String>,
    ifindex: Option<u32>,
    br: Option<String>,
    br_ifindex: Option<u32>,
    vlan: Option<u16>,
    vni: Option<u32>,
    flags: u8,
}

impl FdbGetRequest {
    /// Create a lookup for the given MAC address.
    pub fn new(mac: [u8; 6]) -> Self {
        Self {
            mac,
            ..Default::default()
        }
    }

    /// Restrict to a bridge port device.
    pub fn dev(mut self, dev: impl Into<String>) -> Self {
        self.dev = Some(dev.into());
        self
    }

    /// Restrict to a bridge port by index.
    pub fn ifindex(mut self, ifindex: u32) -> Self {
        self.ifindex = Some(ifindex);
        self
    }

    /// Restrict to a bridge master device.
    pub fn br(mut self, br: impl Into<String>) -> Self {
        self.br = Some(br.into());
        self
    }

    /// Restrict to a bridge master by index.
    pub fn br_ifindex(mut self, ifindex: u32) -> Self {
        self.br_ifindex = Some(ifindex);
        self
    }

    /// Restrict to a VLAN.
    pub fn vlan(mut self, vlan: u16) -> Self {
        self.vlan = Some(vlan);
        self
    }

    /// Restrict to a VNI.
    pub fn vni(mut self, vni: u32) -> Result<Self> {
        if vni > VNI_MAX {
            return Err(Error::invalid_arg("vni", vni.to_string()));
        }
        self.vni = Some(vni);
        Ok(self)
    }

    /// Look in the device's own FDB.
    pub fn self_entry(mut self) -> Self {
        self.flags |= ntf::SELF;
        self
    }

    /// Look in the master bridge's FDB.
    pub fn master(mut self) -> Self {
        self.flags |= ntf::MASTER;
        self
    }

    /// Build the lookup request.
    pub fn build(&self) -> Result<MessageBuilder> {
        let dev_index = match (self.ifindex, &self.dev) {
            (Some(idx), _) => Some(idx),
            (None, Some(dev)) => Some(resolve_dev(dev)?),
            (None, None) => None,
        };
        let br_index = match (self.br_ifindex, &self.br) {
            (Some(idx), _) => Some(idx),
            (None, Some(br)) => Some(resolve_dev(br)?),
            (None, None) => None,
        };

        if dev_index.is_none() && br_index.is_none() {
            return Err(Error::InvalidMessage(
                "device or master and address are required arguments".into(),
            ));
        }

        let ndmsg = NdMsg::new()
            .with_family(AF_BRIDGE)
            .with_ifindex(dev_index.unwrap_or(0) as i32)
            .with_flags(self.flags);

        let mut b = MessageBuilder::new(NlMsgType::RTM_GETNEIGH, NLM_F_REQUEST);
        b.append(&ndmsg)?;

        b.put_bytes(&schema::NDA, nda::LLADDR, &self.mac)?;
        if let Some(vlan) = self.vlan {
            b.put(&schema::NDA, nda::VLAN, vlan as u64)?;
        }
        if let Some(vni) = self.vni {
            b.put(&schema::NDA, nda::VNI, vni as u64)?;
        }
        if let Some(br) = br_index {
            b.put(&schema::NDA, nda::MASTER, br as u64)?;
        }

        Ok(b)
    }
}

// ============================================================================
// Flush (bulk delete)
// ============================================================================

/// Builder for `fdb flush`: bulk-delete entries matching state/flag
/// conditions.
///
/// Each keyword contributes a bit to the value and to the mask; the
/// kernel deletes entries whose masked bits equal the value, so
/// `permanent().nostatic()` selects entries with NUD_PERMANENT set and
/// NUD_NOARP clear.
#[derive(Debug, Clone, Default)]
pub struct FdbFlushRequest {
    dev: Option<String>,
    ifindex: Option<u32>,
    brport: Option<String>,
    brport_ifindex: Option<u32>,
    vlan: Option<u16>,
    state: u16,
    state_mask: u16,
    flags: u8,
    flags_mask: u8,
    ndm_flags: u8,
}

impl FdbFlushRequest {
    /// Create a flush for the given device.
    pub fn new(dev: impl Into<String>) -> Self {
        Self {
            dev: Some(dev.into()),
            ..Default::default()
        }
    }

    /// Create a flush for a device given by index.
    pub fn with_ifindex(ifindex: u32) -> Self {
        Self {
            ifindex: Some(ifindex),
            ..Default::default()
        }
    }

    /// Restrict to one bridge port.
    pub fn brport(mut self, dev: impl Into<String>) -> Self {
        self.brport = Some(dev.into());
        self
    }

    /// Restrict to one bridge port by index.
    pub fn brport_ifindex(mut self, ifindex: u32) -> Self {
        self.brport_ifindex = Some(ifindex);
        self
    }

    /// Restrict to a VLAN.
    pub fn vlan(mut self, vlan: u16) -> Result<Self> {
        if vlan >= 4096 {
            return Err(Error::invalid_arg("vlan", vlan.to_string()));
        }
        self.vlan = Some(vlan);
        Ok(self)
    }

    /// Flush the device's own FDB.
    pub fn self_entries(mut self) -> Self {
        self.ndm_flags |= ntf::SELF;
        self
    }

    /// Flush the master bridge's FDB.
    pub fn master(mut self) -> Self {
        self.ndm_flags |= ntf::MASTER;
        self
    }

    /// Match entries with NUD_PERMANENT set.
    pub fn permanent(mut self) -> Self {
        self.state |= nud::PERMANENT;
        self.state_mask |= nud::PERMANENT;
        self
    }

    /// Match entries with NUD_PERMANENT clear.
    pub fn nopermanent(mut self) -> Self {
        self.state &= !nud::PERMANENT;
        self.state_mask |= nud::PERMANENT;
        self
    }

    /// Match static entries (NUD_NOARP set, NUD_PERMANENT clear).
    pub fn static_entries(mut self) -> Self {
        self.state |= nud::NOARP;
        self.state_mask |= nud::NOARP | nud::PERMANENT;
        self
    }

    /// Match entries with NUD_NOARP clear.
    pub fn nostatic(mut self) -> Self {
        self.state &= !nud::NOARP;
        self.state_mask |= nud::NOARP;
        self
    }

    /// Match dynamic entries (neither NUD_NOARP nor NUD_PERMANENT).
    pub fn dynamic(mut self) -> Self {
        self.state &= !nud::NOARP;
        self.state_mask |= nud::NOARP | nud::PERMANENT;
        self
    }

    /// Exclude dynamic entries.
    pub fn nodynamic(mut self) -> Self {
        self.state |= nud::NOARP;
        self.state_mask |= nud::NOARP;
        self
    }

    fn flag(mut self, bit: u8, set: bool) -> Self {
        if set {
            self.flags |= bit;
        } else {
            self.flags &= !bit;
        }
        self.flags_mask |= bit;
        self
    }

    /// Match entries added by userspace (or not, with `false`).
    pub fn added_by_user(self, set: bool) -> Self {
        self.flag(ntf::USE, set)
    }

    /// Match externally learned entries (or not).
    pub fn extern_learn(self, set: bool) -> Self {
        self.flag(ntf::EXT_LEARNED, set)
    }

    /// Match sticky entries (or not).
    pub fn sticky(self, set: bool) -> Self {
        self.flag(ntf::STICKY, set)
    }

    /// Match offloaded entries (or not).
    pub fn offloaded(self, set: bool) -> Self {
        self.flag(ntf::OFFLOADED, set)
    }

    /// Build the bulk delete request.
    pub fn build(&self) -> Result<MessageBuilder> {
        let ifindex = match (self.ifindex, &self.dev) {
            (Some(idx), _) => idx,
            (None, Some(dev)) => resolve_dev(dev)?,
            (None, None) => {
                return Err(Error::InvalidMessage("device is a required argument".into()));
            }
        };
        let brport = match (self.brport_ifindex, &self.brport) {
            (Some(idx), _) => Some(idx),
            (None, Some(dev)) => Some(resolve_dev(dev)?),
            (None, None) => None,
        };

        let mut ndm_flags = self.ndm_flags | self.flags;
        // if self and master were not specified assume self
        if ndm_flags & (ntf::SELF | ntf::MASTER) == 0 {
            ndm_flags |= ntf::SELF;
        }

        let ndmsg = NdMsg::new()
            .with_family(AF_BRIDGE)
            .with_ifindex(ifindex as i32)
            .with_state(self.state)
            .with_flags(ndm_flags);

        let mut b = MessageBuilder::new(
            NlMsgType::RTM_DELNEIGH,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_BULK,
        );
        b.append(&ndmsg)?;

        if let Some(port) = brport {
            b.put(&schema::NDA, nda::IFINDEX, port as u64)?;
        }
        if let Some(vlan) = self.vlan {
            b.put(&schema::NDA, nda::VLAN, vlan as u64)?;
        }
        if self.flags_mask != 0 {
            b.put(&schema::NDA, nda::NDM_FLAGS_MASK, self.flags_mask as u64)?;
        }
        if self.state_mask != 0 {
            b.put(&schema::NDA, nda::NDM_STATE_MASK, self.state_mask as u64)?;
        }

        Ok(b)
    }
}

// ============================================================================
// Show (dump) and filtering
// ============================================================================

/// Builder for the `fdb show` dump request plus its client-side filter.
#[derive(Debug, Clone, Default)]
pub struct FdbShowRequest {
    dev: Option<String>,
    dev_ifindex: Option<u32>,
    br: Option<String>,
    br_ifindex: Option<u32>,
    vlan: Option<u16>,
    state: u16,
    dynamic: bool,
}

impl FdbShowRequest {
    /// Create an unfiltered show request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one bridge port device.
    pub fn dev(mut self, dev: impl Into<String>) -> Self {
        self.dev = Some(dev.into());
        self
    }

    /// Restrict to one bridge port by index.
    pub fn dev_ifindex(mut self, ifindex: u32) -> Self {
        self.dev_ifindex = Some(ifindex);
        self
    }

    /// Restrict to ports of one bridge.
    pub fn br(mut self, br: impl Into<String>) -> Self {
        self.br = Some(br.into());
        self
    }

    /// Restrict to ports of one bridge by index.
    pub fn br_ifindex(mut self, ifindex: u32) -> Self {
        self.br_ifindex = Some(ifindex);
        self
    }

    /// Restrict to a VLAN.
    pub fn vlan(mut self, vlan: u16) -> Self {
        self.vlan = Some(vlan);
        self
    }

    /// Accumulate a state filter bit (entries matching any accumulated
    /// state pass).
    pub fn state(mut self, state: u16) -> Self {
        self.state |= state;
        self
    }

    /// Show only dynamic entries.
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    fn dev_index(&self) -> Result<Option<u32>> {
        match (self.dev_ifindex, &self.dev) {
            (Some(idx), _) => Ok(Some(idx)),
            (None, Some(dev)) => resolve_dev(dev).map(Some),
            (None, None) => Ok(None),
        }
    }

    fn br_index(&self) -> Result<Option<u32>> {
        match (self.br_ifindex, &self.br) {
            (Some(idx), _) => Ok(Some(idx)),
            (None, Some(br)) => resolve_dev(br).map(Some),
            (None, None) => Ok(None),
        }
    }

    /// Build the dump request. The kernel filters on ifindex and master
    /// where it can; everything else is [`FdbFilter`]'s job.
    pub fn build_dump(&self) -> Result<MessageBuilder> {
        let ndmsg = NdMsg::new()
            .with_family(AF_BRIDGE)
            .with_ifindex(self.dev_index()?.unwrap_or(0) as i32);

        let mut b = MessageBuilder::new(NlMsgType::RTM_GETNEIGH, NLM_F_REQUEST | NLM_F_DUMP);
        b.append(&ndmsg)?;

        if let Some(br) = self.br_index()? {
            b.put(&schema::NDA, nda::MASTER, br as u64)?;
        }

        Ok(b)
    }

    /// The client-side filter matching this request.
    pub fn filter(&self) -> Result<FdbFilter> {
        Ok(FdbFilter {
            ifindex: self.dev_index()?,
            vlan: self.vlan,
            state: self.state,
            dynamic_only: self.dynamic,
        })
    }
}

/// Client-side record filter with AND semantics; an unset condition
/// never excludes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FdbFilter {
    /// Only records on this port.
    pub ifindex: Option<u32>,
    /// Only records in this VLAN.
    pub vlan: Option<u16>,
    /// Only records whose state intersects this mask (0 = any).
    pub state: u16,
    /// Exclude permanent entries.
    pub dynamic_only: bool,
}

impl FdbFilter {
    /// Whether a record survives all active conditions.
    pub fn matches(&self, entry: &FdbEntry) -> bool {
        if entry.family != AF_BRIDGE {
            return false;
        }
        if let Some(ifindex) = self.ifindex
            && entry.ifindex != ifindex
        {
            return false;
        }
        if self.state != 0 && entry.state & self.state == 0 {
            return false;
        }
        if let Some(vlan) = self.vlan
            && entry.vlan != Some(vlan)
        {
            return false;
        }
        if self.dynamic_only && entry.state & nud::PERMANENT != 0 {
            return false;
        }
        true
    }
}

// ============================================================================
// Decoded entry
// ============================================================================

/// One decoded FDB record.
#[derive(Debug, Clone, Default)]
pub struct FdbEntry {
    /// Address family from the ndmsg header.
    pub family: u8,
    /// Bridge port interface index.
    pub ifindex: u32,
    /// Entry state bits (NUD_*).
    pub state: u16,
    /// Entry flag bits (NTF_*).
    pub flags: u8,
    /// Extended flag bits (NTF_EXT_*).
    pub ext_flags: u32,
    /// MAC address.
    pub mac: Option<[u8; 6]>,
    /// VLAN ID.
    pub vlan: Option<u16>,
    /// VXLAN remote endpoint.
    pub dst: Option<IpAddr>,
    /// VXLAN destination port.
    pub port: Option<u16>,
    /// VXLAN network identifier.
    pub vni: Option<u32>,
    /// Source VNI.
    pub src_vni: Option<u32>,
    /// Via device index.
    pub via_ifindex: Option<u32>,
    /// Nexthop group id.
    pub nhid: Option<u32>,
    /// Master bridge index.
    pub master: Option<u32>,
    /// Link netnsid for via devices in other namespaces.
    pub link_netnsid: Option<u32>,
    /// Cache timing (used, updated) in clock ticks.
    pub cacheinfo: Option<(u32, u32)>,
}

impl FromNetlink for FdbEntry {
    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let header: NdMsg = take_header(input)?;
        let attrs = *input;
        *input = &[];
        let table = AttrTable::for_schema(attrs, &schema::NDA);

        let mut entry = FdbEntry {
            family: header.ndm_family,
            ifindex: header.ndm_ifindex as u32,
            state: header.ndm_state,
            flags: header.ndm_flags,
            ..Default::default()
        };

        if let Some(lladdr) = table.get(nda::LLADDR)
            && lladdr.len() == 6
        {
            let mut mac = [0u8; 6];
            mac.copy_from_slice(lladdr);
            entry.mac = Some(mac);
        }
        if let Some(dst) = table.get(nda::DST) {
            entry.dst = addr_from_octets(dst);
        }

        let scalar = |id: u16| table.scalar(&schema::NDA, id).ok().flatten();
        entry.vlan = scalar(nda::VLAN).map(|v| v as u16);
        entry.port = scalar(nda::PORT).map(|v| v as u16);
        entry.vni = scalar(nda::VNI).map(|v| v as u32);
        entry.src_vni = scalar(nda::SRC_VNI).map(|v| v as u32);
        entry.via_ifindex = scalar(nda::IFINDEX).map(|v| v as u32);
        entry.nhid = scalar(nda::NH_ID).map(|v| v as u32);
        entry.master = scalar(nda::MASTER).map(|v| v as u32);
        entry.link_netnsid = scalar(nda::LINK_NETNSID).map(|v| v as u32);
        entry.ext_flags = scalar(nda::FLAGS_EXT).map(|v| v as u32).unwrap_or(0);

        if let Some(ci) = table.get(nda::CACHEINFO)
            && let Ok(info) = NdaCacheInfo::from_bytes(ci)
        {
            entry.cacheinfo = Some((info.ndm_used, info.ndm_updated));
        }

        Ok(entry)
    }
}

impl FdbEntry {
    /// MAC address as a colon-separated hex string.
    pub fn mac_str(&self) -> Option<String> {
        self.mac.map(|m| crate::util::addr::format_mac(&m))
    }

    /// Check if this is a permanent (static) entry.
    pub fn is_permanent(&self) -> bool {
        self.state & nud::PERMANENT != 0
    }

    /// Check if the entry is installed on the device itself.
    pub fn is_self(&self) -> bool {
        self.flags & ntf::SELF != 0
    }

    /// Check if the entry belongs to the master bridge.
    pub fn is_master(&self) -> bool {
        self.flags & ntf::MASTER != 0
    }

    /// Check if the entry was externally learned.
    pub fn is_extern_learn(&self) -> bool {
        self.flags & ntf::EXT_LEARNED != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::attr::get;
    use crate::netlink::message::{NLMSG_HDRLEN, NlMsgHdr};

    fn mac() -> [u8; 6] {
        [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]
    }

    fn payload(msg: &[u8]) -> &[u8] {
        &msg[NLMSG_HDRLEN..]
    }

    #[test]
    fn test_add_defaults_and_attrs() {
        // fdb add de:ad:be:ef:00:01 dev <5> dst 10.0.0.5 vlan 10
        let req = FdbRequest::new(mac())
            .ifindex(5)
            .dst("10.0.0.5".parse().unwrap())
            .vlan(10);
        let msg = req.build_add().unwrap().finish();

        let header = NlMsgHdr::from_bytes(&msg).unwrap();
        assert_eq!(header.nlmsg_type, NlMsgType::RTM_NEWNEIGH);
        assert_eq!(
            header.nlmsg_flags,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL
        );

        let ndmsg = NdMsg::from_bytes(payload(&msg)).unwrap();
        assert_eq!(ndmsg.ndm_family, AF_BRIDGE);
        assert_eq!(ndmsg.ndm_ifindex, 5);
        // Default state: permanent; default flag: self.
        assert!(ndmsg.ndm_state & nud::PERMANENT != 0);
        assert!(ndmsg.ndm_flags & ntf::SELF != 0);

        let table = AttrTable::for_schema(&payload(&msg)[NdMsg::SIZE..], &schema::NDA);
        assert_eq!(table.get(nda::LLADDR).unwrap(), &mac()[..]);
        assert_eq!(table.get(nda::DST).unwrap(), &[10, 0, 0, 5][..]);
        assert_eq!(get::u16_ne(table.get(nda::VLAN).unwrap()).unwrap(), 10);
    }

    #[test]
    fn test_port_is_network_order() {
        let req = FdbRequest::new(mac()).ifindex(2).port(4789);
        let msg = req.build_add().unwrap().finish();
        let table = AttrTable::for_schema(&payload(&msg)[NdMsg::SIZE..], &schema::NDA);
        assert_eq!(table.get(nda::PORT).unwrap(), &4789u16.to_be_bytes()[..]);
    }

    #[test]
    fn test_nhid_conflicts() {
        let req = FdbRequest::new(mac())
            .ifindex(2)
            .nhid(5)
            .dst("10.0.0.1".parse().unwrap());
        let err = req.build_add().unwrap_err();
        assert!(matches!(err, Error::ConflictingOptions(_)));

        // nhid alone is fine.
        let req = FdbRequest::new(mac()).ifindex(2).nhid(5);
        let msg = req.build_add().unwrap().finish();
        let table = AttrTable::for_schema(&payload(&msg)[NdMsg::SIZE..], &schema::NDA);
        assert_eq!(
            table.scalar(&schema::NDA, nda::NH_ID).unwrap(),
            Some(5)
        );
    }

    #[test]
    fn test_dynamic_clears_noarp() {
        let req = FdbRequest::new(mac()).ifindex(2).dynamic();
        let msg = req.build_add().unwrap().finish();
        let ndmsg = NdMsg::from_bytes(payload(&msg)).unwrap();
        assert_eq!(ndmsg.ndm_state, nud::REACHABLE);
    }

    #[test]
    fn test_vni_range() {
        assert!(FdbRequest::new(mac()).vni(VNI_MAX).is_ok());
        assert!(FdbRequest::new(mac()).vni(VNI_MAX + 1).is_err());
    }

    #[test]
    fn test_flush_permanent_nostatic_masks() {
        // fdb flush dev <3> permanent nostatic: match entries with the
        // permanent bit set and the noarp bit clear.
        let req = FdbFlushRequest::with_ifindex(3).permanent().nostatic();
        let msg = req.build().unwrap().finish();

        let header = NlMsgHdr::from_bytes(&msg).unwrap();
        assert_eq!(header.nlmsg_type, NlMsgType::RTM_DELNEIGH);
        assert!(header.nlmsg_flags & NLM_F_BULK != 0);

        let ndmsg = NdMsg::from_bytes(payload(&msg)).unwrap();
        assert_eq!(ndmsg.ndm_state, nud::PERMANENT);
        assert!(ndmsg.ndm_flags & ntf::SELF != 0);

        let table = AttrTable::for_schema(&payload(&msg)[NdMsg::SIZE..], &schema::NDA);
        assert_eq!(
            table.scalar(&schema::NDA, nda::NDM_STATE_MASK).unwrap(),
            Some((nud::PERMANENT | nud::NOARP) as u64)
        );
        assert_eq!(table.scalar(&schema::NDA, nda::NDM_FLAGS_MASK).unwrap(), None);
    }

    #[test]
    fn test_flush_flag_masks() {
        let req = FdbFlushRequest::with_ifindex(3)
            .extern_learn(true)
            .sticky(false);
        let msg = req.build().unwrap().finish();

        let ndmsg = NdMsg::from_bytes(payload(&msg)).unwrap();
        assert!(ndmsg.ndm_flags & ntf::EXT_LEARNED != 0);
        assert!(ndmsg.ndm_flags & ntf::STICKY == 0);

        let table = AttrTable::for_schema(&payload(&msg)[NdMsg::SIZE..], &schema::NDA);
        assert_eq!(
            table.scalar(&schema::NDA, nda::NDM_FLAGS_MASK).unwrap(),
            Some((ntf::EXT_LEARNED | ntf::STICKY) as u64)
        );
    }

    #[test]
    fn test_flush_vlan_range() {
        assert!(FdbFlushRequest::with_ifindex(1).vlan(4095).is_ok());
        assert!(FdbFlushRequest::with_ifindex(1).vlan(4096).is_err());
    }

    #[test]
    fn test_get_requires_dev_or_br() {
        let err = FdbGetRequest::new(mac()).build().unwrap_err();
        assert!(matches!(err, Error::InvalidMessage(_)));

        let msg = FdbGetRequest::new(mac())
            .br_ifindex(7)
            .build()
            .unwrap()
            .finish();
        let table = AttrTable::for_schema(&payload(&msg)[NdMsg::SIZE..], &schema::NDA);
        assert_eq!(table.scalar(&schema::NDA, nda::MASTER).unwrap(), Some(7));
    }

    #[test]
    fn test_entry_roundtrip() {
        let req = FdbRequest::new(mac())
            .ifindex(4)
            .dst("10.0.0.5".parse().unwrap())
            .vlan(10)
            .port(4789);
        let msg = req.build_add().unwrap().finish();

        let entry = FdbEntry::from_bytes(payload(&msg)).unwrap();
        assert_eq!(entry.family, AF_BRIDGE);
        assert_eq!(entry.ifindex, 4);
        assert_eq!(entry.mac_str().as_deref(), Some("de:ad:be:ef:00:01"));
        assert_eq!(entry.vlan, Some(10));
        assert_eq!(entry.port, Some(4789));
        assert_eq!(entry.dst, Some("10.0.0.5".parse().unwrap()));
        assert!(entry.is_permanent());
        assert!(entry.is_self());
    }

    #[test]
    fn test_filter_and_semantics() {
        let entry = FdbEntry {
            family: AF_BRIDGE,
            ifindex: 4,
            state: nud::PERMANENT,
            vlan: Some(10),
            ..Default::default()
        };

        // Unset filter never excludes.
        assert!(FdbFilter::default().matches(&entry));

        // Each mismatching condition excludes on its own.
        assert!(!FdbFilter {
            ifindex: Some(5),
            ..Default::default()
        }
        .matches(&entry));
        assert!(!FdbFilter {
            vlan: Some(20),
            ..Default::default()
        }
        .matches(&entry));
        assert!(!FdbFilter {
            dynamic_only: true,
            ..Default::default()
        }
        .matches(&entry));
        assert!(!FdbFilter {
            state: nud::REACHABLE,
            ..Default::default()
        }
        .matches(&entry));

        // All matching conditions pass together.
        assert!(FdbFilter {
            ifindex: Some(4),
            vlan: Some(10),
            state: nud::PERMANENT,
            dynamic_only: false,
        }
        .matches(&entry));

        // Non-bridge families never pass.
        let v4_neigh = FdbEntry {
            family: libc::AF_INET as u8,
            ..entry.clone()
        };
        assert!(!FdbFilter::default().matches(&v4_neigh));
    }
}
