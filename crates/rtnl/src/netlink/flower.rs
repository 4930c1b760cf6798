//! Flower classifier: match-list parsing and option decoding.
//!
//! The encode side consumes the match list strictly in argument order.
//! Several matches are gated by context accumulated earlier in the same
//! list (the outer ethertype, the VLAN and inner-VLAN ethertypes, the IP
//! protocol); a gate checks the context value at the moment its token is
//! parsed, so `dst_port` before `ip_proto` fails even when `ip_proto`
//! appears later. The kernel interprets attributes under the same
//! accumulated context, which is why the ordering is part of the
//! contract and not smoothed over.
//!
//! The decode side enforces no dependencies: it renders whatever
//! attributes are present, interpreting them in a fixed order (ethertype
//! before addresses, IP protocol before ports and ICMP fields).

use std::net::IpAddr;

use super::attr::{AttrIter, AttrTable, get};
use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::schema;
use super::types::tc::{cls_flags, enc_opts, flower, geneve_opt, mpls, tc_handle};
use crate::names::{ipproto, proto};
use crate::util::addr::{
    addr_from_octets, addr_octets, hex_to_bytes, mask_to_prefix, parse_mac, parse_prefix,
    prefix_to_mask,
};

/// A value plus the bitmask selecting which of its bits participate in
/// the match. An absent mask on the wire means exact match (all ones).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Masked<T> {
    pub value: T,
    pub mask: T,
}

impl<T> Masked<T> {
    pub fn new(value: T, mask: T) -> Self {
        Self { value, mask }
    }
}

impl Masked<u8> {
    /// Whether every bit participates.
    pub fn is_exact(&self) -> bool {
        self.mask == u8::MAX
    }
}

impl Masked<[u8; 6]> {
    /// Render as `addr`, `addr/prefixlen` or `addr/literal-mask`,
    /// preferring the prefix form when the mask is a clean run of
    /// leading ones.
    pub fn format(&self) -> String {
        let addr = crate::util::addr::format_mac(&self.value);
        match mask_to_prefix(&self.mask) {
            Some(48) => addr,
            Some(bits) => format!("{}/{}", addr, bits),
            None => format!("{}/{}", addr, crate::util::addr::format_mac(&self.mask)),
        }
    }
}

/// An IP address plus its match mask in network-order bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedIp {
    pub addr: IpAddr,
    pub mask: Vec<u8>,
}

impl MaskedIp {
    /// Render as `addr`, `addr/prefixlen` or `addr/literal-mask`.
    pub fn format(&self) -> String {
        let width_bits = self.mask.len() as u8 * 8;
        match mask_to_prefix(&self.mask) {
            Some(bits) if bits == width_bits => self.addr.to_string(),
            Some(bits) => format!("{}/{}", self.addr, bits),
            None => match addr_from_octets(&self.mask) {
                Some(mask) => format!("{}/{}", self.addr, mask),
                None => self.addr.to_string(),
            },
        }
    }
}

/// A transport-port match: one port, or an inclusive range selecting a
/// different pair of attribute ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSelector {
    Single(u16),
    Range(u16, u16),
}

impl PortSelector {
    /// Parse `N` or `N-M`.
    pub fn parse(s: &str) -> Result<Self> {
        if let Some((min_s, max_s)) = s.split_once('-') {
            let min: u16 = min_s
                .parse()
                .map_err(|_| Error::invalid_arg("port", s.to_string()))?;
            let max: u16 = max_s
                .parse()
                .map_err(|_| Error::invalid_arg("port", s.to_string()))?;
            if max <= min {
                return Err(Error::invalid_arg("port range", s.to_string()));
            }
            Ok(Self::Range(min, max))
        } else {
            let port: u16 = s
                .parse()
                .map_err(|_| Error::invalid_arg("port", s.to_string()))?;
            Ok(Self::Single(port))
        }
    }
}

/// Which end of the connection a port match applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Src,
    Dst,
}

/// ICMP header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IcmpField {
    Type,
    Code,
}

/// Context accumulated while scanning the match list. Downstream
/// matches read the values already recorded, never values still to
/// come.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext {
    /// Outer ethertype (the filter-level protocol).
    pub eth_type: u16,
    /// Ethertype behind the outer VLAN tag, once `vlan_ethtype` is seen.
    pub vlan_ethtype: Option<u16>,
    /// Ethertype behind the inner VLAN tag, once `cvlan_ethtype` is seen.
    pub cvlan_ethtype: Option<u16>,
    /// IP protocol, once `ip_proto` is seen.
    pub ip_proto: Option<u8>,
}

impl ParseContext {
    pub fn new(eth_type: u16) -> Self {
        Self {
            eth_type,
            vlan_ethtype: None,
            cvlan_ethtype: None,
            ip_proto: None,
        }
    }

    /// The ethertype of the innermost declared layer.
    pub fn effective_eth_type(&self) -> u16 {
        self.cvlan_ethtype
            .or(self.vlan_ethtype)
            .unwrap_or(self.eth_type)
    }

    /// The ethertype one VLAN layer in, used by the ARP gates.
    fn vlan_or_outer(&self) -> u16 {
        self.vlan_ethtype.unwrap_or(self.eth_type)
    }
}

fn is_vlan_ethtype(eth_type: u16) -> bool {
    eth_type == proto::QINQ_8021Q || eth_type == proto::QINQ_8021AD
}

fn is_arp_ethtype(eth_type: u16) -> bool {
    eth_type == proto::ARP || eth_type == proto::RARP
}

fn is_mpls_ethtype(eth_type: u16) -> bool {
    eth_type == proto::MPLS_UC || eth_type == proto::MPLS_MC
}

/// Scalar attribute id for a single-port match, selected by the IP
/// protocol already in context.
fn port_attr(ip_proto: Option<u8>, endpoint: Endpoint) -> Option<u16> {
    match (ip_proto?, endpoint) {
        (ipproto::TCP, Endpoint::Src) => Some(flower::KEY_TCP_SRC),
        (ipproto::TCP, Endpoint::Dst) => Some(flower::KEY_TCP_DST),
        (ipproto::UDP, Endpoint::Src) => Some(flower::KEY_UDP_SRC),
        (ipproto::UDP, Endpoint::Dst) => Some(flower::KEY_UDP_DST),
        (ipproto::SCTP, Endpoint::Src) => Some(flower::KEY_SCTP_SRC),
        (ipproto::SCTP, Endpoint::Dst) => Some(flower::KEY_SCTP_DST),
        _ => None,
    }
}

/// MIN/MAX attribute id pair for a port-range match.
fn port_range_attrs(ip_proto: Option<u8>, endpoint: Endpoint) -> Option<(u16, u16)> {
    match ip_proto? {
        ipproto::TCP | ipproto::UDP | ipproto::SCTP => Some(match endpoint {
            Endpoint::Src => (flower::KEY_PORT_SRC_MIN, flower::KEY_PORT_SRC_MAX),
            Endpoint::Dst => (flower::KEY_PORT_DST_MIN, flower::KEY_PORT_DST_MAX),
        }),
        _ => None,
    }
}

/// (value, mask) attribute ids for an ICMP field. The ids differ
/// between ICMPv4 and ICMPv6, so both the ethertype and the IP protocol
/// must already agree.
fn icmp_attrs(eth_type: u16, ip_proto: Option<u8>, field: IcmpField) -> Option<(u16, u16)> {
    match (eth_type, ip_proto?) {
        (proto::IP, ipproto::ICMP) => Some(match field {
            IcmpField::Type => (flower::KEY_ICMPV4_TYPE, flower::KEY_ICMPV4_TYPE_MASK),
            IcmpField::Code => (flower::KEY_ICMPV4_CODE, flower::KEY_ICMPV4_CODE_MASK),
        }),
        (proto::IPV6, ipproto::ICMPV6) => Some(match field {
            IcmpField::Type => (flower::KEY_ICMPV6_TYPE, flower::KEY_ICMPV6_TYPE_MASK),
            IcmpField::Code => (flower::KEY_ICMPV6_CODE, flower::KEY_ICMPV6_CODE_MASK),
        }),
        _ => None,
    }
}

// ============================================================================
// Masked value parsing
// ============================================================================

fn split_slash(s: &str) -> (&str, Option<&str>) {
    match s.split_once('/') {
        Some((v, m)) => (v, Some(m)),
        None => (s, None),
    }
}

/// Parse `LLADDR`, `LLADDR/MASK` or `LLADDR/BITS`. A decimal mask is a
/// prefix length over the 48 address bits; anything else must be a
/// literal MAC mask. No slash means exact match.
pub fn parse_masked_mac(s: &str) -> Result<Masked<[u8; 6]>> {
    let (value_s, mask_s) = split_slash(s);
    let value =
        parse_mac(value_s).map_err(|_| Error::invalid_arg("MAC address", value_s.to_string()))?;

    let mask = match mask_s {
        None => [0xff; 6],
        Some(m) => {
            if let Ok(bits) = m.parse::<u8>() {
                if bits > 48 {
                    return Err(Error::invalid_arg("MAC prefix length", m.to_string()));
                }
                let v = prefix_to_mask(bits, 6);
                let mut mask = [0u8; 6];
                mask.copy_from_slice(&v);
                mask
            } else {
                parse_mac(m).map_err(|_| Error::invalid_arg("MAC mask", m.to_string()))?
            }
        }
    };

    Ok(Masked::new(value, mask))
}

/// Parse `VALUE` or `VALUE/MASK` as decimal u8, optionally translating
/// a symbolic name and validating the result.
fn parse_masked_u8(
    s: &str,
    what: &'static str,
    value_from_name: Option<fn(&str) -> Option<u8>>,
    validate: Option<fn(u8) -> bool>,
) -> Result<Masked<u8>> {
    let (value_s, mask_s) = split_slash(s);

    let value = value_from_name
        .and_then(|f| f(value_s))
        .or_else(|| value_s.parse().ok())
        .ok_or_else(|| Error::invalid_arg(what, value_s.to_string()))?;

    if let Some(validate) = validate
        && !validate(value)
    {
        return Err(Error::invalid_arg(what, value_s.to_string()));
    }

    let mask = match mask_s {
        Some(m) => m
            .parse()
            .map_err(|_| Error::invalid_arg(what, m.to_string()))?,
        None => u8::MAX,
    };

    Ok(Masked::new(value, mask))
}

/// Parse a ToS/TTL style value: decimal first, hex fallback, hex mask.
fn parse_masked_tos_ttl(s: &str, what: &'static str) -> Result<Masked<u8>> {
    let (value_s, mask_s) = split_slash(s);

    let value = value_s
        .parse()
        .or_else(|_| u8::from_str_radix(value_s.trim_start_matches("0x"), 16))
        .map_err(|_| Error::invalid_arg(what, value_s.to_string()))?;

    let mask = match mask_s {
        Some(m) => u8::from_str_radix(m.trim_start_matches("0x"), 16)
            .map_err(|_| Error::invalid_arg(what, m.to_string()))?,
        None => u8::MAX,
    };

    Ok(Masked::new(value, mask))
}

/// TCP flags occupy 12 bits; values and masks are hex.
const TCP_FLAGS_MAX_MASK: u16 = 0xfff;

fn parse_masked_tcp_flags(s: &str) -> Result<Masked<u16>> {
    let (value_s, mask_s) = split_slash(s);

    let value = u16::from_str_radix(value_s.trim_start_matches("0x"), 16)
        .ok()
        .filter(|v| v & !TCP_FLAGS_MAX_MASK == 0)
        .ok_or_else(|| Error::invalid_arg("tcp_flags", value_s.to_string()))?;

    let mask = match mask_s {
        Some(m) => u16::from_str_radix(m.trim_start_matches("0x"), 16)
            .ok()
            .filter(|v| v & !TCP_FLAGS_MAX_MASK == 0)
            .ok_or_else(|| Error::invalid_arg("tcp_flags", m.to_string()))?,
        None => TCP_FLAGS_MAX_MASK,
    };

    Ok(Masked::new(value, mask))
}

fn arp_op_from_name(name: &str) -> Option<u8> {
    match name {
        "request" => Some(1),
        "reply" => Some(2),
        _ => None,
    }
}

fn arp_op_validate(op: u8) -> bool {
    op <= 2
}

/// `frag`/`firstfrag` tokens, `no`-prefixed to clear, `/`-separated.
fn parse_matching_flags(s: &str, mtf: &mut u32, mtf_mask: &mut u32) -> Result<()> {
    for token in s.split('/') {
        let (no, name) = match token.strip_prefix("no") {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        let bit = match name {
            "frag" => flower::KEY_FLAGS_IS_FRAGMENT,
            "firstfrag" => flower::KEY_FLAGS_FRAG_IS_FIRST,
            _ => return Err(Error::invalid_arg("ip_flags", token.to_string())),
        };
        if no {
            *mtf &= !bit;
        } else {
            *mtf |= bit;
        }
        *mtf_mask |= bit;
    }
    Ok(())
}

// ============================================================================
// Geneve options
// ============================================================================

/// A geneve key must be `class:type:data` with non-empty data.
fn check_geneve_key(key: &str) -> Result<()> {
    let parts: Vec<&str> = key.split(':').collect();
    if parts.len() != 3 || parts[2].is_empty() {
        return Err(Error::invalid_arg("geneve_opts", key.to_string()));
    }
    Ok(())
}

/// Synthesize the all-ones mask matching a key's shape: four `f` for
/// the 16-bit class, `ff` for the type, one `f` per data hex digit.
fn synth_geneve_mask(key: &str) -> String {
    let data_len = key.rsplit(':').next().map(str::len).unwrap_or(0);
    format!("ffff:ff:{}", "f".repeat(data_len))
}

/// Append one `class:type:data` triple as a GENEVE nest. Empty fields
/// are omitted from the nest.
fn append_geneve_opt(b: &mut MessageBuilder, triple: &str) -> Result<()> {
    let parts: Vec<&str> = triple.split(':').collect();
    if parts.len() != 3 {
        return Err(Error::invalid_arg("geneve_opts", triple.to_string()));
    }

    let nest = b.nest_start(enc_opts::GENEVE)?;
    if !parts[0].is_empty() {
        let class = u16::from_str_radix(parts[0], 16)
            .map_err(|_| Error::invalid_arg("geneve class", parts[0].to_string()))?;
        b.put(&schema::GENEVE_OPT, geneve_opt::CLASS, class as u64)?;
    }
    if !parts[1].is_empty() {
        let opt_type = u8::from_str_radix(parts[1], 16)
            .map_err(|_| Error::invalid_arg("geneve type", parts[1].to_string()))?;
        b.put(&schema::GENEVE_OPT, geneve_opt::TYPE, opt_type as u64)?;
    }
    if !parts[2].is_empty() {
        let data = hex_to_bytes(parts[2])
            .map_err(|_| Error::invalid_arg("geneve data", parts[2].to_string()))?;
        b.put_bytes(&schema::GENEVE_OPT, geneve_opt::DATA, &data)?;
    }
    b.nest_end(nest)?;
    Ok(())
}

/// Parse `class:type:data[/mask][,...]` into the two parallel nested
/// lists. The kernel pairs key and mask field-by-field, so both nests
/// must carry the same option count in the same order; a missing mask
/// is synthesized as all-ones with the key's shape.
fn parse_geneve_opts(s: &str, b: &mut MessageBuilder) -> Result<()> {
    let mut keys: Vec<&str> = Vec::new();
    let mut masks: Vec<String> = Vec::new();

    for option in s.split(',') {
        let (key, mask) = split_slash(option);
        check_geneve_key(key)?;
        keys.push(key);
        masks.push(match mask {
            Some(m) => m.to_string(),
            None => synth_geneve_mask(key),
        });
    }

    let nest = b.nest_start(flower::KEY_ENC_OPTS)?;
    for key in &keys {
        append_geneve_opt(b, key)?;
    }
    b.nest_end(nest)?;

    let nest = b.nest_start(flower::KEY_ENC_OPTS_MASK)?;
    for mask in &masks {
        append_geneve_opt(b, mask)?;
    }
    b.nest_end(nest)?;

    Ok(())
}

// ============================================================================
// Match-list parsing (encode side)
// ============================================================================

/// Traffic classes map onto the minor handle space above this floor.
const TC_H_MIN_PRIORITY: u32 = 0xFFE0;
const TC_QOPT_MAX_QUEUE: u32 = 16;

/// Parse a flower match list, appending attributes to `b` in token
/// order. Call inside an open `TCA_OPTIONS` nest.
///
/// `protocol` is the filter-level ethertype and seeds the parse
/// context; `parent` is the filter's parent handle (used by `hw_tc`).
pub fn parse_match_list(
    tokens: &[String],
    protocol: u16,
    parent: u32,
    b: &mut MessageBuilder,
) -> Result<()> {
    let mut ctx = ParseContext::new(protocol);
    let mut flags: u32 = 0;
    let mut mtf: u32 = 0;
    let mut mtf_mask: u32 = 0;

    let mut iter = tokens.iter();
    while let Some(token) = iter.next() {
        let mut next_arg = || iter.next().ok_or_else(|| Error::MissingValue(token.clone()));

        match token.as_str() {
            "classid" | "flowid" => {
                let val = next_arg()?;
                let handle = tc_handle::parse(val)
                    .ok_or_else(|| Error::invalid_arg("classid", val.to_string()))?;
                b.put(&schema::FLOWER, flower::CLASSID, handle as u64)?;
            }
            "hw_tc" => {
                let val = next_arg()?;
                let tc: u32 = val
                    .parse()
                    .ok()
                    .filter(|&tc| tc < TC_QOPT_MAX_QUEUE)
                    .ok_or_else(|| Error::invalid_arg("hw_tc", val.to_string()))?;
                let handle = (parent & 0xFFFF_0000) | ((TC_H_MIN_PRIORITY + tc) & 0xFFFF);
                b.put(&schema::FLOWER, flower::CLASSID, handle as u64)?;
            }
            "verbose" => flags |= cls_flags::VERBOSE,
            "skip_hw" => flags |= cls_flags::SKIP_HW,
            "skip_sw" => flags |= cls_flags::SKIP_SW,
            "indev" => {
                let val = next_arg()?;
                b.append_attr_str(flower::INDEV, val)?;
            }
            "ip_flags" => {
                let val = next_arg()?;
                parse_matching_flags(val, &mut mtf, &mut mtf_mask)?;
            }
            "vlan_id" => {
                let val = next_arg()?;
                if !is_vlan_ethtype(ctx.eth_type) {
                    return Err(Error::FieldDependency {
                        field: "vlan_id",
                        requires: "ethertype 802.1Q or 802.1ad",
                    });
                }
                let vid: u16 = val
                    .parse()
                    .ok()
                    .filter(|v| v & !0xfff == 0)
                    .ok_or_else(|| Error::invalid_arg("vlan_id", val.to_string()))?;
                b.put(&schema::FLOWER, flower::KEY_VLAN_ID, vid as u64)?;
            }
            "vlan_prio" => {
                let val = next_arg()?;
                if !is_vlan_ethtype(ctx.eth_type) {
                    return Err(Error::FieldDependency {
                        field: "vlan_prio",
                        requires: "ethertype 802.1Q or 802.1ad",
                    });
                }
                let prio: u8 = val
                    .parse()
                    .ok()
                    .filter(|v| v & !0x7 == 0)
                    .ok_or_else(|| Error::invalid_arg("vlan_prio", val.to_string()))?;
                b.put(&schema::FLOWER, flower::KEY_VLAN_PRIO, prio as u64)?;
            }
            "vlan_ethtype" => {
                let val = next_arg()?;
                if !is_vlan_ethtype(ctx.eth_type) {
                    return Err(Error::FieldDependency {
                        field: "vlan_ethtype",
                        requires: "ethertype 802.1Q or 802.1ad",
                    });
                }
                let eth = proto::parse(val)
                    .ok_or_else(|| Error::invalid_arg("vlan_ethtype", val.to_string()))?;
                b.put(&schema::FLOWER, flower::KEY_VLAN_ETH_TYPE, eth as u64)?;
                ctx.vlan_ethtype = Some(eth);
            }
            "cvlan_id" => {
                let val = next_arg()?;
                if !ctx.vlan_ethtype.is_some_and(is_vlan_ethtype) {
                    return Err(Error::FieldDependency {
                        field: "cvlan_id",
                        requires: "vlan_ethtype 802.1Q or 802.1ad",
                    });
                }
                let vid: u16 = val
                    .parse()
                    .ok()
                    .filter(|v| v & !0xfff == 0)
                    .ok_or_else(|| Error::invalid_arg("cvlan_id", val.to_string()))?;
                b.put(&schema::FLOWER, flower::KEY_CVLAN_ID, vid as u64)?;
            }
            "cvlan_prio" => {
                let val = next_arg()?;
                if !ctx.vlan_ethtype.is_some_and(is_vlan_ethtype) {
                    return Err(Error::FieldDependency {
                        field: "cvlan_prio",
                        requires: "vlan_ethtype 802.1Q or 802.1ad",
                    });
                }
                let prio: u8 = val
                    .parse()
                    .ok()
                    .filter(|v| v & !0x7 == 0)
                    .ok_or_else(|| Error::invalid_arg("cvlan_prio", val.to_string()))?;
                b.put(&schema::FLOWER, flower::KEY_CVLAN_PRIO, prio as u64)?;
            }
            "cvlan_ethtype" => {
                let val = next_arg()?;
                if !ctx.vlan_ethtype.is_some_and(is_vlan_ethtype) {
                    return Err(Error::FieldDependency {
                        field: "cvlan_ethtype",
                        requires: "vlan_ethtype 802.1Q or 802.1ad",
                    });
                }
                let eth = proto::parse(val)
                    .ok_or_else(|| Error::invalid_arg("cvlan_ethtype", val.to_string()))?;
                b.put(&schema::FLOWER, flower::KEY_CVLAN_ETH_TYPE, eth as u64)?;
                ctx.cvlan_ethtype = Some(eth);
            }
            "mpls_label" => {
                let val = next_arg()?;
                if !is_mpls_ethtype(ctx.eth_type) {
                    return Err(Error::FieldDependency {
                        field: "mpls_label",
                        requires: "ethertype mpls_uc or mpls_mc",
                    });
                }
                let label: u32 = val
                    .parse()
                    .ok()
                    .filter(|v| v & !mpls::LABEL_MAX == 0)
                    .ok_or_else(|| Error::invalid_arg("mpls_label", val.to_string()))?;
                b.put(&schema::FLOWER, flower::KEY_MPLS_LABEL, label as u64)?;
            }
            "mpls_tc" => {
                let val = next_arg()?;
                if !is_mpls_ethtype(ctx.eth_type) {
                    return Err(Error::FieldDependency {
                        field: "mpls_tc",
                        requires: "ethertype mpls_uc or mpls_mc",
                    });
                }
                let tc: u8 = val
                    .parse()
                    .ok()
                    .filter(|v| v & !mpls::TC_MAX == 0)
                    .ok_or_else(|| Error::invalid_arg("mpls_tc", val.to_string()))?;
                b.put(&schema::FLOWER, flower::KEY_MPLS_TC, tc as u64)?;
            }
            "mpls_bos" => {
                let val = next_arg()?;
                if !is_mpls_ethtype(ctx.eth_type) {
                    return Err(Error::FieldDependency {
                        field: "mpls_bos",
                        requires: "ethertype mpls_uc or mpls_mc",
                    });
                }
                let bos: u8 = val
                    .parse()
                    .ok()
                    .filter(|v| v & !mpls::BOS_MAX == 0)
                    .ok_or_else(|| Error::invalid_arg("mpls_bos", val.to_string()))?;
                b.put(&schema::FLOWER, flower::KEY_MPLS_BOS, bos as u64)?;
            }
            "mpls_ttl" => {
                let val = next_arg()?;
                if !is_mpls_ethtype(ctx.eth_type) {
                    return Err(Error::FieldDependency {
                        field: "mpls_ttl",
                        requires: "ethertype mpls_uc or mpls_mc",
                    });
                }
                let ttl: u8 = val
                    .parse()
                    .map_err(|_| Error::invalid_arg("mpls_ttl", val.to_string()))?;
                b.put(&schema::FLOWER, flower::KEY_MPLS_TTL, ttl as u64)?;
            }
            "dst_mac" => {
                let masked = parse_masked_mac(next_arg()?)?;
                b.put_bytes(&schema::FLOWER, flower::KEY_ETH_DST, &masked.value)?;
                b.put_bytes(&schema::FLOWER, flower::KEY_ETH_DST_MASK, &masked.mask)?;
            }
            "src_mac" => {
                let masked = parse_masked_mac(next_arg()?)?;
                b.put_bytes(&schema::FLOWER, flower::KEY_ETH_SRC, &masked.value)?;
                b.put_bytes(&schema::FLOWER, flower::KEY_ETH_SRC_MASK, &masked.mask)?;
            }
            "ip_proto" => {
                let val = next_arg()?;
                let eth = ctx.effective_eth_type();
                if eth != proto::IP && eth != proto::IPV6 {
                    return Err(Error::FieldDependency {
                        field: "ip_proto",
                        requires: "ethertype ipv4 or ipv6",
                    });
                }
                let p = match val.as_str() {
                    "tcp" => ipproto::TCP,
                    "udp" => ipproto::UDP,
                    "sctp" => ipproto::SCTP,
                    "icmp" => {
                        if eth != proto::IP {
                            return Err(Error::FieldDependency {
                                field: "ip_proto icmp",
                                requires: "ethertype ipv4",
                            });
                        }
                        ipproto::ICMP
                    }
                    "icmpv6" => {
                        if eth != proto::IPV6 {
                            return Err(Error::FieldDependency {
                                field: "ip_proto icmpv6",
                                requires: "ethertype ipv6",
                            });
                        }
                        ipproto::ICMPV6
                    }
                    other => u8::from_str_radix(other.trim_start_matches("0x"), 16)
                        .map_err(|_| Error::invalid_arg("ip_proto", other.to_string()))?,
                };
                b.put(&schema::FLOWER, flower::KEY_IP_PROTO, p as u64)?;
                ctx.ip_proto = Some(p);
            }
            "ip_tos" => {
                let masked = parse_masked_tos_ttl(next_arg()?, "ip_tos")?;
                b.put(&schema::FLOWER, flower::KEY_IP_TOS, masked.value as u64)?;
                b.put(&schema::FLOWER, flower::KEY_IP_TOS_MASK, masked.mask as u64)?;
            }
            "ip_ttl" => {
                let masked = parse_masked_tos_ttl(next_arg()?, "ip_ttl")?;
                b.put(&schema::FLOWER, flower::KEY_IP_TTL, masked.value as u64)?;
                b.put(&schema::FLOWER, flower::KEY_IP_TTL_MASK, masked.mask as u64)?;
            }
            "dst_ip" => {
                let val = next_arg()?;
                append_ip_addr(
                    b,
                    val,
                    "dst_ip",
                    Some(ctx.effective_eth_type()),
                    (flower::KEY_IPV4_DST, flower::KEY_IPV4_DST_MASK),
                    (flower::KEY_IPV6_DST, flower::KEY_IPV6_DST_MASK),
                )?;
            }
            "src_ip" => {
                let val = next_arg()?;
                append_ip_addr(
                    b,
                    val,
                    "src_ip",
                    Some(ctx.effective_eth_type()),
                    (flower::KEY_IPV4_SRC, flower::KEY_IPV4_SRC_MASK),
                    (flower::KEY_IPV6_SRC, flower::KEY_IPV6_SRC_MASK),
                )?;
            }
            "dst_port" => {
                let val = next_arg()?;
                append_port(b, val, ctx.ip_proto, Endpoint::Dst, "dst_port")?;
            }
            "src_port" => {
                let val = next_arg()?;
                append_port(b, val, ctx.ip_proto, Endpoint::Src, "src_port")?;
            }
            "tcp_flags" => {
                let masked = parse_masked_tcp_flags(next_arg()?)?;
                b.put(&schema::FLOWER, flower::KEY_TCP_FLAGS, masked.value as u64)?;
                b.put(
                    &schema::FLOWER,
                    flower::KEY_TCP_FLAGS_MASK,
                    masked.mask as u64,
                )?;
            }
            "type" => {
                let val = next_arg()?;
                append_icmp(b, val, &ctx, IcmpField::Type, "icmp type")?;
            }
            "code" => {
                let val = next_arg()?;
                append_icmp(b, val, &ctx, IcmpField::Code, "icmp code")?;
            }
            "arp_tip" | "arp_sip" => {
                let field: &'static str = if token == "arp_tip" { "arp_tip" } else { "arp_sip" };
                let val = next_arg()?;
                if !is_arp_ethtype(ctx.vlan_or_outer()) {
                    return Err(Error::FieldDependency {
                        field,
                        requires: "ethertype arp or rarp",
                    });
                }
                let ids = if field == "arp_tip" {
                    (flower::KEY_ARP_TIP, flower::KEY_ARP_TIP_MASK)
                } else {
                    (flower::KEY_ARP_SIP, flower::KEY_ARP_SIP_MASK)
                };
                append_ip_addr(b, val, field, Some(proto::IP), ids, ids)?;
            }
            "arp_op" => {
                let val = next_arg()?;
                if !is_arp_ethtype(ctx.vlan_or_outer()) {
                    return Err(Error::FieldDependency {
                        field: "arp_op",
                        requires: "ethertype arp or rarp",
                    });
                }
                let masked =
                    parse_masked_u8(val, "arp_op", Some(arp_op_from_name), Some(arp_op_validate))?;
                b.put(&schema::FLOWER, flower::KEY_ARP_OP, masked.value as u64)?;
                b.put(&schema::FLOWER, flower::KEY_ARP_OP_MASK, masked.mask as u64)?;
            }
            "arp_tha" | "arp_sha" => {
                let field: &'static str = if token == "arp_tha" { "arp_tha" } else { "arp_sha" };
                let val = next_arg()?;
                if !is_arp_ethtype(ctx.vlan_or_outer()) {
                    return Err(Error::FieldDependency {
                        field,
                        requires: "ethertype arp or rarp",
                    });
                }
                let masked = parse_masked_mac(val)?;
                let (addr_id, mask_id) = if field == "arp_tha" {
                    (flower::KEY_ARP_THA, flower::KEY_ARP_THA_MASK)
                } else {
                    (flower::KEY_ARP_SHA, flower::KEY_ARP_SHA_MASK)
                };
                b.put_bytes(&schema::FLOWER, addr_id, &masked.value)?;
                b.put_bytes(&schema::FLOWER, mask_id, &masked.mask)?;
            }
            "enc_dst_ip" => {
                let val = next_arg()?;
                append_ip_addr(
                    b,
                    val,
                    "enc_dst_ip",
                    None,
                    (flower::KEY_ENC_IPV4_DST, flower::KEY_ENC_IPV4_DST_MASK),
                    (flower::KEY_ENC_IPV6_DST, flower::KEY_ENC_IPV6_DST_MASK),
                )?;
            }
            "enc_src_ip" => {
                let val = next_arg()?;
                append_ip_addr(
                    b,
                    val,
                    "enc_src_ip",
                    None,
                    (flower::KEY_ENC_IPV4_SRC, flower::KEY_ENC_IPV4_SRC_MASK),
                    (flower::KEY_ENC_IPV6_SRC, flower::KEY_ENC_IPV6_SRC_MASK),
                )?;
            }
            "enc_key_id" => {
                let val = next_arg()?;
                let key_id: u32 = val
                    .parse()
                    .map_err(|_| Error::invalid_arg("enc_key_id", val.to_string()))?;
                b.put(&schema::FLOWER, flower::KEY_ENC_KEY_ID, key_id as u64)?;
            }
            "enc_dst_port" => {
                let val = next_arg()?;
                let port: u16 = val
                    .parse()
                    .map_err(|_| Error::invalid_arg("enc_dst_port", val.to_string()))?;
                b.put(&schema::FLOWER, flower::KEY_ENC_UDP_DST_PORT, port as u64)?;
            }
            "enc_tos" => {
                let masked = parse_masked_tos_ttl(next_arg()?, "enc_tos")?;
                b.put(&schema::FLOWER, flower::KEY_ENC_IP_TOS, masked.value as u64)?;
                b.put(
                    &schema::FLOWER,
                    flower::KEY_ENC_IP_TOS_MASK,
                    masked.mask as u64,
                )?;
            }
            "enc_ttl" => {
                let masked = parse_masked_tos_ttl(next_arg()?, "enc_ttl")?;
                b.put(&schema::FLOWER, flower::KEY_ENC_IP_TTL, masked.value as u64)?;
                b.put(
                    &schema::FLOWER,
                    flower::KEY_ENC_IP_TTL_MASK,
                    masked.mask as u64,
                )?;
            }
            "geneve_opts" => {
                let val = next_arg()?;
                parse_geneve_opts(val, b)?;
            }
            other => {
                return Err(Error::invalid_arg("match", other.to_string()));
            }
        }
    }

    b.put(&schema::FLOWER, flower::FLAGS, flags as u64)?;

    if mtf_mask != 0 {
        b.put(&schema::FLOWER, flower::KEY_FLAGS, mtf as u64)?;
        b.put(&schema::FLOWER, flower::KEY_FLAGS_MASK, mtf_mask as u64)?;
    }

    if ctx.eth_type != proto::ALL {
        b.put(&schema::FLOWER, flower::KEY_ETH_TYPE, ctx.eth_type as u64)?;
    }

    Ok(())
}

/// Append an address attribute and the mask expanded from its prefix.
/// With `gate` set, the address family must agree with the gating
/// ethertype; without, any family goes (tunnel addresses).
fn append_ip_addr(
    b: &mut MessageBuilder,
    s: &str,
    field: &'static str,
    gate: Option<u16>,
    v4_ids: (u16, u16),
    v6_ids: (u16, u16),
) -> Result<()> {
    if let Some(eth) = gate
        && eth != proto::IP
        && eth != proto::IPV6
    {
        return Err(Error::FieldDependency {
            field,
            requires: "ethertype ipv4 or ipv6",
        });
    }

    let (addr, prefix) =
        parse_prefix(s).map_err(|_| Error::invalid_arg(field, s.to_string()))?;

    if let Some(eth) = gate {
        let family_ok = match eth {
            proto::IP => addr.is_ipv4(),
            proto::IPV6 => addr.is_ipv6(),
            _ => false,
        };
        if !family_ok {
            return Err(Error::FieldDependency {
                field,
                requires: "ethertype matching the address family",
            });
        }
    }

    let octets = addr_octets(&addr);
    let (addr_id, mask_id) = if addr.is_ipv4() { v4_ids } else { v6_ids };
    b.put_bytes(&schema::FLOWER, addr_id, &octets)?;
    b.put_bytes(
        &schema::FLOWER,
        mask_id,
        &prefix_to_mask(prefix, octets.len()),
    )?;
    Ok(())
}

/// Append a port match. A single port uses the protocol-specific
/// scalar; a range uses the MIN/MAX pair. Both need the IP protocol in
/// context already.
fn append_port(
    b: &mut MessageBuilder,
    s: &str,
    ip_proto: Option<u8>,
    endpoint: Endpoint,
    field: &'static str,
) -> Result<()> {
    match PortSelector::parse(s)? {
        PortSelector::Single(port) => {
            let id = port_attr(ip_proto, endpoint).ok_or(Error::FieldDependency {
                field,
                requires: "ip_proto tcp, udp or sctp",
            })?;
            b.put(&schema::FLOWER, id, port as u64)?;
        }
        PortSelector::Range(min, max) => {
            let (min_id, max_id) =
                port_range_attrs(ip_proto, endpoint).ok_or(Error::FieldDependency {
                    field,
                    requires: "ip_proto tcp, udp or sctp",
                })?;
            b.put(&schema::FLOWER, min_id, min as u64)?;
            b.put(&schema::FLOWER, max_id, max as u64)?;
        }
    }
    Ok(())
}

/// Append an ICMP type/code match; ids depend on the (ethertype,
/// ip_proto) pair in context.
fn append_icmp(
    b: &mut MessageBuilder,
    s: &str,
    ctx: &ParseContext,
    field: IcmpField,
    what: &'static str,
) -> Result<()> {
    let (value_id, mask_id) =
        icmp_attrs(ctx.eth_type, ctx.ip_proto, field).ok_or(Error::FieldDependency {
            field: match field {
                IcmpField::Type => "type",
                IcmpField::Code => "code",
            },
            requires: "ip_proto icmp or icmpv6 matching the ethertype",
        })?;
    let masked = parse_masked_u8(s, what, None, None)?;
    b.put(&schema::FLOWER, value_id, masked.value as u64)?;
    b.put(&schema::FLOWER, mask_id, masked.mask as u64)?;
    Ok(())
}

// ============================================================================
// Decoding (no dependency enforcement)
// ============================================================================

/// One decoded geneve option, paired with its mask when the kernel
/// supplied one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneveOpt {
    pub class: Option<u16>,
    pub opt_type: Option<u8>,
    pub data: Vec<u8>,
}

/// Decoded flower options, interpreted in dependency order but rendered
/// permissively: whatever the kernel sent is shown.
#[derive(Debug, Clone, Default)]
pub struct FlowerOptions {
    pub classid: Option<u32>,
    pub indev: Option<String>,
    pub vlan_id: Option<u16>,
    pub vlan_prio: Option<u8>,
    pub vlan_ethtype: Option<u16>,
    pub cvlan_id: Option<u16>,
    pub cvlan_prio: Option<u8>,
    pub cvlan_ethtype: Option<u16>,
    pub dst_mac: Option<Masked<[u8; 6]>>,
    pub src_mac: Option<Masked<[u8; 6]>>,
    pub eth_type: Option<u16>,
    pub ip_proto: Option<u8>,
    pub ip_tos: Option<Masked<u8>>,
    pub ip_ttl: Option<Masked<u8>>,
    pub mpls_label: Option<u32>,
    pub mpls_tc: Option<u8>,
    pub mpls_bos: Option<u8>,
    pub mpls_ttl: Option<u8>,
    pub dst_ip: Option<MaskedIp>,
    pub src_ip: Option<MaskedIp>,
    pub dst_port: Option<PortSelector>,
    pub src_port: Option<PortSelector>,
    pub tcp_flags: Option<Masked<u16>>,
    pub icmp_type: Option<Masked<u8>>,
    pub icmp_code: Option<Masked<u8>>,
    pub arp_sip: Option<MaskedIp>,
    pub arp_tip: Option<MaskedIp>,
    pub arp_op: Option<Masked<u8>>,
    pub arp_sha: Option<Masked<[u8; 6]>>,
    pub arp_tha: Option<Masked<[u8; 6]>>,
    pub enc_dst_ip: Option<MaskedIp>,
    pub enc_src_ip: Option<MaskedIp>,
    pub enc_key_id: Option<u32>,
    pub enc_dst_port: Option<u16>,
    pub enc_tos: Option<Masked<u8>>,
    pub enc_ttl: Option<Masked<u8>>,
    pub geneve_opts: Vec<(GeneveOpt, Option<GeneveOpt>)>,
    pub ip_flags: Option<(u32, u32)>,
    pub flags: u32,
    pub in_hw_count: Option<u32>,
}

fn masked_mac_of(tb: &AttrTable<'_>, value_id: u16, mask_id: u16) -> Option<Masked<[u8; 6]>> {
    let value = tb.get(value_id)?;
    if value.len() != 6 {
        return None;
    }
    let mut mac = [0u8; 6];
    mac.copy_from_slice(value);

    let mut mask = [0xffu8; 6];
    if let Some(m) = tb.get(mask_id)
        && m.len() == 6
    {
        mask.copy_from_slice(m);
    }
    Some(Masked::new(mac, mask))
}

fn masked_ip_of(tb: &AttrTable<'_>, value_id: u16, mask_id: u16, width: usize) -> Option<MaskedIp> {
    let value = tb.get(value_id)?;
    if value.len() != width {
        return None;
    }
    let addr = addr_from_octets(value)?;
    let mask = match tb.get(mask_id) {
        Some(m) if m.len() == width => m.to_vec(),
        _ => vec![0xff; width],
    };
    Some(MaskedIp { addr, mask })
}

fn masked_u8_of(tb: &AttrTable<'_>, value_id: u16, mask_id: u16) -> Option<Masked<u8>> {
    let value = get::u8(tb.get(value_id)?).ok()?;
    let mask = tb
        .get(mask_id)
        .and_then(|m| get::u8(m).ok())
        .unwrap_or(u8::MAX);
    Some(Masked::new(value, mask))
}

fn parse_geneve_list(data: &[u8]) -> Vec<GeneveOpt> {
    let mut out = Vec::new();
    for (id, payload) in AttrIter::new(data) {
        if id != enc_opts::GENEVE {
            continue;
        }
        let tb = AttrTable::for_schema(payload, &schema::GENEVE_OPT);
        let scalar = |id: u16| tb.scalar(&schema::GENEVE_OPT, id).ok().flatten();
        out.push(GeneveOpt {
            class: scalar(geneve_opt::CLASS).map(|v| v as u16),
            opt_type: scalar(geneve_opt::TYPE).map(|v| v as u8),
            data: tb.get(geneve_opt::DATA).map(|d| d.to_vec()).unwrap_or_default(),
        });
    }
    out
}

impl FlowerOptions {
    /// Decode a `TCA_OPTIONS` payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let tb = AttrTable::for_schema(data, &schema::FLOWER);
        let scalar = |id: u16| tb.scalar(&schema::FLOWER, id).ok().flatten();

        let mut opts = FlowerOptions {
            classid: scalar(flower::CLASSID).map(|v| v as u32),
            indev: tb
                .get(flower::INDEV)
                .and_then(|d| get::string(d).ok())
                .map(String::from),
            vlan_id: scalar(flower::KEY_VLAN_ID).map(|v| v as u16),
            vlan_prio: scalar(flower::KEY_VLAN_PRIO).map(|v| v as u8),
            vlan_ethtype: scalar(flower::KEY_VLAN_ETH_TYPE).map(|v| v as u16),
            cvlan_id: scalar(flower::KEY_CVLAN_ID).map(|v| v as u16),
            cvlan_prio: scalar(flower::KEY_CVLAN_PRIO).map(|v| v as u8),
            cvlan_ethtype: scalar(flower::KEY_CVLAN_ETH_TYPE).map(|v| v as u16),
            dst_mac: masked_mac_of(&tb, flower::KEY_ETH_DST, flower::KEY_ETH_DST_MASK),
            src_mac: masked_mac_of(&tb, flower::KEY_ETH_SRC, flower::KEY_ETH_SRC_MASK),
            // Ethertype and IP protocol come out before anything whose
            // meaning depends on them.
            eth_type: scalar(flower::KEY_ETH_TYPE).map(|v| v as u16),
            ip_proto: scalar(flower::KEY_IP_PROTO).map(|v| v as u8),
            ip_tos: masked_u8_of(&tb, flower::KEY_IP_TOS, flower::KEY_IP_TOS_MASK),
            ip_ttl: masked_u8_of(&tb, flower::KEY_IP_TTL, flower::KEY_IP_TTL_MASK),
            mpls_label: scalar(flower::KEY_MPLS_LABEL).map(|v| v as u32),
            mpls_tc: scalar(flower::KEY_MPLS_TC).map(|v| v as u8),
            mpls_bos: scalar(flower::KEY_MPLS_BOS).map(|v| v as u8),
            mpls_ttl: scalar(flower::KEY_MPLS_TTL).map(|v| v as u8),
            tcp_flags: tb
                .get(flower::KEY_TCP_FLAGS)
                .and_then(|d| get::u16_be(d).ok())
                .map(|value| {
                    let mask = tb
                        .get(flower::KEY_TCP_FLAGS_MASK)
                        .and_then(|m| get::u16_be(m).ok())
                        .unwrap_or(u16::MAX);
                    Masked::new(value, mask)
                }),
            arp_sip: masked_ip_of(&tb, flower::KEY_ARP_SIP, flower::KEY_ARP_SIP_MASK, 4),
            arp_tip: masked_ip_of(&tb, flower::KEY_ARP_TIP, flower::KEY_ARP_TIP_MASK, 4),
            arp_op: masked_u8_of(&tb, flower::KEY_ARP_OP, flower::KEY_ARP_OP_MASK),
            arp_sha: masked_mac_of(&tb, flower::KEY_ARP_SHA, flower::KEY_ARP_SHA_MASK),
            arp_tha: masked_mac_of(&tb, flower::KEY_ARP_THA, flower::KEY_ARP_THA_MASK),
            enc_key_id: scalar(flower::KEY_ENC_KEY_ID).map(|v| v as u32),
            enc_dst_port: scalar(flower::KEY_ENC_UDP_DST_PORT).map(|v| v as u16),
            enc_tos: masked_u8_of(&tb, flower::KEY_ENC_IP_TOS, flower::KEY_ENC_IP_TOS_MASK),
            enc_ttl: masked_u8_of(&tb, flower::KEY_ENC_IP_TTL, flower::KEY_ENC_IP_TTL_MASK),
            flags: scalar(flower::FLAGS).map(|v| v as u32).unwrap_or(0),
            in_hw_count: scalar(flower::IN_HW_COUNT).map(|v| v as u32),
            ..Default::default()
        };

        // Addresses: the attribute pair to read is ethertype-dependent.
        match opts.eth_type {
            Some(proto::IP) => {
                opts.dst_ip =
                    masked_ip_of(&tb, flower::KEY_IPV4_DST, flower::KEY_IPV4_DST_MASK, 4);
                opts.src_ip =
                    masked_ip_of(&tb, flower::KEY_IPV4_SRC, flower::KEY_IPV4_SRC_MASK, 4);
            }
            Some(proto::IPV6) => {
                opts.dst_ip =
                    masked_ip_of(&tb, flower::KEY_IPV6_DST, flower::KEY_IPV6_DST_MASK, 16);
                opts.src_ip =
                    masked_ip_of(&tb, flower::KEY_IPV6_SRC, flower::KEY_IPV6_SRC_MASK, 16);
            }
            _ => {}
        }

        // Ports: the single-port ids are protocol-dependent; the range
        // pair applies to any of tcp/udp/sctp.
        let ip_proto = opts.ip_proto;
        let decode_port = |endpoint: Endpoint, range: (u16, u16)| -> Option<PortSelector> {
            let mut selector = None;
            if let Some(id) = port_attr(ip_proto, endpoint)
                && let Some(port) = scalar(id)
            {
                selector = Some(PortSelector::Single(port as u16));
            }
            if port_range_attrs(ip_proto, endpoint).is_some()
                && let (Some(min), Some(max)) = (scalar(range.0), scalar(range.1))
            {
                selector = Some(PortSelector::Range(min as u16, max as u16));
            }
            selector
        };
        opts.dst_port = decode_port(
            Endpoint::Dst,
            (flower::KEY_PORT_DST_MIN, flower::KEY_PORT_DST_MAX),
        );
        opts.src_port = decode_port(
            Endpoint::Src,
            (flower::KEY_PORT_SRC_MIN, flower::KEY_PORT_SRC_MAX),
        );

        // ICMP fields: ids depend on the (ethertype, ip_proto) pair.
        if let Some((type_id, type_mask)) =
            icmp_attrs(opts.eth_type.unwrap_or(0), opts.ip_proto, IcmpField::Type)
        {
            opts.icmp_type = masked_u8_of(&tb, type_id, type_mask);
        }
        if let Some((code_id, code_mask)) =
            icmp_attrs(opts.eth_type.unwrap_or(0), opts.ip_proto, IcmpField::Code)
        {
            opts.icmp_code = masked_u8_of(&tb, code_id, code_mask);
        }

        // Tunnel addresses: family decided by which mask attribute the
        // kernel included.
        opts.enc_dst_ip = if tb.contains(flower::KEY_ENC_IPV4_DST_MASK) {
            masked_ip_of(
                &tb,
                flower::KEY_ENC_IPV4_DST,
                flower::KEY_ENC_IPV4_DST_MASK,
                4,
            )
        } else {
            masked_ip_of(
                &tb,
                flower::KEY_ENC_IPV6_DST,
                flower::KEY_ENC_IPV6_DST_MASK,
                16,
            )
        };
        opts.enc_src_ip = if tb.contains(flower::KEY_ENC_IPV4_SRC_MASK) {
            masked_ip_of(
                &tb,
                flower::KEY_ENC_IPV4_SRC,
                flower::KEY_ENC_IPV4_SRC_MASK,
                4,
            )
        } else {
            masked_ip_of(
                &tb,
                flower::KEY_ENC_IPV6_SRC,
                flower::KEY_ENC_IPV6_SRC_MASK,
                16,
            )
        };

        // Geneve options: the key and mask nests carry the same option
        // count in the same order.
        if let Some(key_data) = tb.get(flower::KEY_ENC_OPTS) {
            let keys = parse_geneve_list(key_data);
            let masks = tb
                .get(flower::KEY_ENC_OPTS_MASK)
                .map(parse_geneve_list)
                .unwrap_or_default();
            let mut masks = masks.into_iter();
            opts.geneve_opts = keys
                .into_iter()
                .map(|key| (key, masks.next()))
                .collect();
        }

        if let (Some(value), Some(mask)) =
            (scalar(flower::KEY_FLAGS), scalar(flower::KEY_FLAGS_MASK))
        {
            opts.ip_flags = Some((value as u32, mask as u32));
        }

        Ok(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::message::{NLM_F_REQUEST, NLMSG_HDRLEN};

    fn build(tokens: &[&str], protocol: u16) -> Result<Vec<u8>> {
        let tokens: Vec<String> = tokens.iter().map(|s| s.to_string()).collect();
        let mut b = MessageBuilder::new(44, NLM_F_REQUEST);
        parse_match_list(&tokens, protocol, 0, &mut b)?;
        Ok(b.finish())
    }

    fn options(msg: &[u8]) -> AttrTable<'_> {
        AttrTable::for_schema(&msg[NLMSG_HDRLEN..], &schema::FLOWER)
    }

    #[test]
    fn test_vlan_requires_vlan_ethertype() {
        let err = build(&["vlan_id", "5"], proto::IP).unwrap_err();
        assert!(matches!(
            err,
            Error::FieldDependency {
                field: "vlan_id",
                ..
            }
        ));

        let msg = build(&["vlan_id", "5"], proto::QINQ_8021Q).unwrap();
        let tb = options(&msg);
        assert_eq!(
            tb.scalar(&schema::FLOWER, flower::KEY_VLAN_ID).unwrap(),
            Some(5)
        );
        assert_eq!(
            tb.scalar(&schema::FLOWER, flower::KEY_ETH_TYPE).unwrap(),
            Some(proto::QINQ_8021Q as u64)
        );
    }

    #[test]
    fn test_cvlan_requires_inner_vlan_ethertype() {
        let err = build(&["cvlan_id", "7"], proto::QINQ_8021Q).unwrap_err();
        assert!(matches!(
            err,
            Error::FieldDependency {
                field: "cvlan_id",
                ..
            }
        ));

        let msg = build(
            &["vlan_ethtype", "802.1Q", "cvlan_id", "7"],
            proto::QINQ_8021AD,
        )
        .unwrap();
        let tb = options(&msg);
        assert_eq!(
            tb.scalar(&schema::FLOWER, flower::KEY_CVLAN_ID).unwrap(),
            Some(7)
        );
    }

    #[test]
    fn test_port_requires_prior_ip_proto() {
        // Order sensitivity: ip_proto appearing later does not help.
        let err = build(&["dst_port", "80", "ip_proto", "tcp"], proto::IP).unwrap_err();
        assert!(matches!(
            err,
            Error::FieldDependency {
                field: "dst_port",
                ..
            }
        ));

        let msg = build(&["ip_proto", "tcp", "dst_port", "80"], proto::IP).unwrap();
        let tb = options(&msg);
        assert_eq!(
            tb.scalar(&schema::FLOWER, flower::KEY_TCP_DST).unwrap(),
            Some(80)
        );
        // Wire value is big endian.
        assert_eq!(tb.get(flower::KEY_TCP_DST).unwrap(), &80u16.to_be_bytes()[..]);
    }

    #[test]
    fn test_port_range_uses_min_max_pair() {
        let msg = build(
            &["dst_ip", "10.0.0.0/24", "ip_proto", "tcp", "dst_port", "80-443"],
            proto::IP,
        )
        .unwrap();
        let tb = options(&msg);
        assert_eq!(
            tb.scalar(&schema::FLOWER, flower::KEY_PORT_DST_MIN).unwrap(),
            Some(80)
        );
        assert_eq!(
            tb.scalar(&schema::FLOWER, flower::KEY_PORT_DST_MAX).unwrap(),
            Some(443)
        );
        assert!(!tb.contains(flower::KEY_TCP_DST));
    }

    #[test]
    fn test_port_range_validation() {
        assert!(PortSelector::parse("80-443").is_ok());
        assert!(PortSelector::parse("443-80").is_err());
        assert!(PortSelector::parse("80-80").is_err());
        assert!(PortSelector::parse("http").is_err());
    }

    #[test]
    fn test_ip_addr_mask_expansion() {
        let msg = build(&["dst_ip", "10.0.0.0/24"], proto::IP).unwrap();
        let tb = options(&msg);
        assert_eq!(tb.get(flower::KEY_IPV4_DST).unwrap(), &[10, 0, 0, 0][..]);
        assert_eq!(
            tb.get(flower::KEY_IPV4_DST_MASK).unwrap(),
            &[255, 255, 255, 0][..]
        );
    }

    #[test]
    fn test_ip_addr_family_must_match_ethertype() {
        let err = build(&["dst_ip", "fd00::1"], proto::IP).unwrap_err();
        assert!(matches!(err, Error::FieldDependency { field: "dst_ip", .. }));

        let err = build(&["dst_ip", "10.0.0.1"], proto::ARP).unwrap_err();
        assert!(matches!(err, Error::FieldDependency { field: "dst_ip", .. }));
    }

    #[test]
    fn test_masked_mac_forms() {
        let exact = parse_masked_mac("de:ad:be:ef:00:01").unwrap();
        assert_eq!(exact.mask, [0xff; 6]);

        let prefix = parse_masked_mac("de:ad:be:ef:00:01/24").unwrap();
        assert_eq!(prefix.mask, [0xff, 0xff, 0xff, 0, 0, 0]);

        let literal = parse_masked_mac("de:ad:be:ef:00:01/ff:ff:00:00:00:0f").unwrap();
        assert_eq!(literal.mask, [0xff, 0xff, 0, 0, 0, 0x0f]);

        assert!(parse_masked_mac("de:ad:be:ef:00:01/49").is_err());
        assert!(parse_masked_mac("junk").is_err());
    }

    #[test]
    fn test_icmp_gating() {
        let err = build(&["type", "8"], proto::IP).unwrap_err();
        assert!(matches!(err, Error::FieldDependency { .. }));

        let msg = build(&["ip_proto", "icmp", "type", "8", "code", "0"], proto::IP).unwrap();
        let tb = options(&msg);
        assert_eq!(
            tb.scalar(&schema::FLOWER, flower::KEY_ICMPV4_TYPE).unwrap(),
            Some(8)
        );

        let msg = build(&["ip_proto", "icmpv6", "type", "128"], proto::IPV6).unwrap();
        let tb = options(&msg);
        assert_eq!(
            tb.scalar(&schema::FLOWER, flower::KEY_ICMPV6_TYPE).unwrap(),
            Some(128)
        );

        // icmp on an ipv6 filter is contradictory.
        let err = build(&["ip_proto", "icmp"], proto::IPV6).unwrap_err();
        assert!(matches!(err, Error::FieldDependency { .. }));
    }

    #[test]
    fn test_mpls_gating() {
        let err = build(&["mpls_label", "100"], proto::IP).unwrap_err();
        assert!(matches!(err, Error::FieldDependency { .. }));

        let msg = build(&["mpls_label", "100", "mpls_tc", "3"], proto::MPLS_UC).unwrap();
        let tb = options(&msg);
        assert_eq!(
            tb.scalar(&schema::FLOWER, flower::KEY_MPLS_LABEL).unwrap(),
            Some(100)
        );
    }

    #[test]
    fn test_arp_gating() {
        let err = build(&["arp_op", "request"], proto::IP).unwrap_err();
        assert!(matches!(err, Error::FieldDependency { .. }));

        let msg = build(&["arp_op", "request", "arp_tip", "10.0.0.1"], proto::ARP).unwrap();
        let tb = options(&msg);
        assert_eq!(
            tb.scalar(&schema::FLOWER, flower::KEY_ARP_OP).unwrap(),
            Some(1)
        );
        assert_eq!(tb.get(flower::KEY_ARP_TIP).unwrap(), &[10, 0, 0, 1][..]);
    }

    #[test]
    fn test_ip_flags() {
        let msg = build(&["ip_flags", "frag/nofirstfrag"], proto::IP).unwrap();
        let tb = options(&msg);
        assert_eq!(
            tb.scalar(&schema::FLOWER, flower::KEY_FLAGS).unwrap(),
            Some(flower::KEY_FLAGS_IS_FRAGMENT as u64)
        );
        assert_eq!(
            tb.scalar(&schema::FLOWER, flower::KEY_FLAGS_MASK).unwrap(),
            Some((flower::KEY_FLAGS_IS_FRAGMENT | flower::KEY_FLAGS_FRAG_IS_FIRST) as u64)
        );
    }

    #[test]
    fn test_eth_type_omitted_for_all() {
        let msg = build(&[], proto::ALL).unwrap();
        let tb = options(&msg);
        assert!(!tb.contains(flower::KEY_ETH_TYPE));
        // FLAGS goes out regardless.
        assert_eq!(tb.scalar(&schema::FLOWER, flower::FLAGS).unwrap(), Some(0));
    }

    #[test]
    fn test_geneve_opts_parallel_nests() {
        let msg = build(&["geneve_opts", "0102:80:1122,0103:81:aabbcc/ffff:ff:ff0000"], proto::IP)
            .unwrap();
        let tb = options(&msg);

        let keys = parse_geneve_list(tb.get(flower::KEY_ENC_OPTS).unwrap());
        let masks = parse_geneve_list(tb.get(flower::KEY_ENC_OPTS_MASK).unwrap());

        // Same count, same order; absent mask synthesized as all-ones
        // in the key's shape.
        assert_eq!(keys.len(), 2);
        assert_eq!(masks.len(), 2);

        assert_eq!(keys[0].class, Some(0x0102));
        assert_eq!(keys[0].opt_type, Some(0x80));
        assert_eq!(keys[0].data, vec![0x11, 0x22]);
        assert_eq!(masks[0].class, Some(0xffff));
        assert_eq!(masks[0].opt_type, Some(0xff));
        assert_eq!(masks[0].data, vec![0xff, 0xff]);

        assert_eq!(keys[1].class, Some(0x0103));
        assert_eq!(keys[1].data, vec![0xaa, 0xbb, 0xcc]);
        assert_eq!(masks[1].data, vec![0xff, 0x00, 0x00]);
    }

    #[test]
    fn test_geneve_opts_malformed() {
        assert!(build(&["geneve_opts", "0102:80"], proto::IP).is_err());
        assert!(build(&["geneve_opts", "0102:80:"], proto::IP).is_err());
    }

    #[test]
    fn test_unknown_match_token() {
        let err = build(&["frobnicate", "1"], proto::IP).unwrap_err();
        assert!(matches!(err, Error::InvalidArg { what: "match", .. }));

        let err = build(&["dst_ip"], proto::IP).unwrap_err();
        assert!(matches!(err, Error::MissingValue(_)));
    }

    #[test]
    fn test_decode_roundtrip() {
        let msg = build(
            &[
                "dst_mac", "de:ad:be:ef:00:01/24",
                "ip_proto", "tcp",
                "dst_ip", "10.0.0.0/24",
                "dst_port", "80-443",
                "tcp_flags", "0x2/0x1f",
            ],
            proto::IP,
        )
        .unwrap();

        let opts = FlowerOptions::parse(&msg[NLMSG_HDRLEN..]).unwrap();
        assert_eq!(opts.eth_type, Some(proto::IP));
        assert_eq!(opts.ip_proto, Some(ipproto::TCP));
        assert_eq!(opts.dst_port, Some(PortSelector::Range(80, 443)));
        assert_eq!(opts.dst_mac.unwrap().format(), "de:ad:be:ef:00:01/24");
        assert_eq!(opts.dst_ip.as_ref().unwrap().format(), "10.0.0.0/24");
        assert_eq!(opts.tcp_flags, Some(Masked::new(0x2, 0x1f)));
    }

    #[test]
    fn test_decode_single_port() {
        let msg = build(&["ip_proto", "udp", "src_port", "53"], proto::IP).unwrap();
        let opts = FlowerOptions::parse(&msg[NLMSG_HDRLEN..]).unwrap();
        assert_eq!(opts.src_port, Some(PortSelector::Single(53)));
        assert_eq!(opts.dst_port, None);
    }

    #[test]
    fn test_decode_has_no_dependency_enforcement() {
        // A table carrying vlan_id without any ethertype still decodes;
        // only the encode side validates context.
        let mut b = MessageBuilder::new(44, NLM_F_REQUEST);
        b.put(&schema::FLOWER, flower::KEY_VLAN_ID, 5).unwrap();
        let msg = b.finish();

        let opts = FlowerOptions::parse(&msg[NLMSG_HDRLEN..]).unwrap();
        assert_eq!(opts.vlan_id, Some(5));
        assert_eq!(opts.eth_type, None);
    }

    #[test]
    fn test_mask_rendering() {
        let clean = MaskedIp {
            addr: "10.1.2.0".parse().unwrap(),
            mask: vec![255, 255, 255, 0],
        };
        assert_eq!(clean.format(), "10.1.2.0/24");

        let gappy = MaskedIp {
            addr: "10.1.2.3".parse().unwrap(),
            mask: vec![255, 255, 0, 255],
        };
        assert_eq!(gappy.format(), "10.1.2.3/255.255.0.255");

        let full = MaskedIp {
            addr: "10.1.2.3".parse().unwrap(),
            mask: vec![255, 255, 255, 255],
        };
        assert_eq!(full.format(), "10.1.2.3");
    }
}
