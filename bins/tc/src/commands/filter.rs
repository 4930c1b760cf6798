//! `tc filter` command implementation.

use clap::{Args, Subcommand};
use rtnl::names::{ipproto, proto};
use rtnl::netlink::attr::{AttrTable, get};
use rtnl::netlink::flower::{self, FlowerOptions, Masked, PortSelector};
use rtnl::netlink::message::{NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL, NLM_F_REQUEST};
use rtnl::netlink::schema;
use rtnl::netlink::types::tc::{TcMsg, cls_flags, tc_handle, tca};
use rtnl::netlink::{
    Connection, Error, MessageBuilder, NLMSG_HDRLEN, NlMsgHdr, NlMsgType, Result,
};
use rtnl::util;
use rtnl::util::addr::bytes_to_hex;
use rtnl_output::{OutputFormat, OutputOptions, Printer};

#[derive(Args)]
pub struct FilterCmd {
    #[command(subcommand)]
    action: FilterAction,
}

#[derive(Subcommand)]
enum FilterAction {
    /// Add a filter
    Add(FilterModArgs),
    /// Replace a filter (add or update)
    Replace(FilterModArgs),
    /// Delete a filter
    Del(FilterDelArgs),
    /// Show filters
    #[command(visible_alias = "ls", visible_alias = "list")]
    Show(FilterShowArgs),
}

#[derive(Args)]
struct FilterModArgs {
    /// Device name
    dev: String,

    /// Parent qdisc/class ("root", "ingress", "maj:min")
    #[arg(long, default_value = "root")]
    parent: String,

    /// Protocol (ip, ipv6, 802.1Q, all, hex ethertype)
    #[arg(long, default_value = "all")]
    protocol: String,

    /// Priority/preference (lower matches first)
    #[arg(long, default_value_t = 0)]
    prio: u16,

    /// Filter handle
    #[arg(long)]
    handle: Option<String>,

    /// Filter type (only flower is supported)
    #[arg(name = "TYPE")]
    kind: String,

    /// Match list, consumed in order (e.g. ip_proto tcp dst_port 80-443)
    #[arg(trailing_var_arg = true)]
    matches: Vec<String>,
}

#[derive(Args)]
struct FilterDelArgs {
    /// Device name
    dev: String,

    /// Parent qdisc/class
    #[arg(long, default_value = "root")]
    parent: String,

    /// Protocol
    #[arg(long, default_value = "all")]
    protocol: String,

    /// Priority/preference
    #[arg(long, default_value_t = 0)]
    prio: u16,

    /// Filter handle
    #[arg(long)]
    handle: Option<String>,
}

#[derive(Args)]
struct FilterShowArgs {
    /// Device name
    dev: String,

    /// Parent qdisc/class
    #[arg(long, default_value = "root")]
    parent: String,

    /// Protocol
    #[arg(long)]
    protocol: Option<String>,

    /// Priority/preference
    #[arg(long)]
    prio: Option<u16>,
}

impl FilterCmd {
    pub async fn run(
        self,
        conn: &Connection,
        format: OutputFormat,
        opts: &OutputOptions,
    ) -> Result<()> {
        match self.action {
            FilterAction::Add(args) => modify_filter(conn, args, false).await,
            FilterAction::Replace(args) => modify_filter(conn, args, true).await,
            FilterAction::Del(args) => del_filter(conn, args).await,
            FilterAction::Show(args) => show_filters(conn, args, format, opts).await,
        }
    }
}

fn resolve_dev(name: &str) -> Result<i32> {
    util::ifindex(name)
        .map(|i| i as i32)
        .ok_or_else(|| Error::DeviceNotFound {
            name: name.to_string(),
        })
}

fn parse_parent(s: &str) -> Result<u32> {
    tc_handle::parse(s).ok_or_else(|| Error::invalid_arg("parent", s.to_string()))
}

fn parse_protocol(s: &str) -> Result<u16> {
    proto::parse(s).ok_or_else(|| Error::invalid_arg("protocol", s.to_string()))
}

fn parse_filter_handle(s: &str) -> Result<u32> {
    let digits = s.strip_prefix("0x");
    match digits {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
    .ok_or_else(|| Error::invalid_arg("handle", s.to_string()))
}

async fn modify_filter(conn: &Connection, args: FilterModArgs, replace: bool) -> Result<()> {
    if args.kind != "flower" {
        return Err(Error::invalid_arg("filter kind", args.kind));
    }

    let ifindex = resolve_dev(&args.dev)?;
    let parent = parse_parent(&args.parent)?;
    let protocol = parse_protocol(&args.protocol)?;
    let handle = args
        .handle
        .as_deref()
        .map(parse_filter_handle)
        .transpose()?
        .unwrap_or(0);

    let tcmsg = TcMsg::new()
        .with_ifindex(ifindex)
        .with_parent(parent)
        .with_handle(handle)
        .with_info(TcMsg::filter_info(args.prio, protocol));

    let mode = if replace { NLM_F_CREATE } else { NLM_F_CREATE | NLM_F_EXCL };
    let mut b = MessageBuilder::new(NlMsgType::RTM_NEWTFILTER, NLM_F_REQUEST | NLM_F_ACK | mode);
    b.append(&tcmsg)?;
    b.append_attr_str(tca::KIND, "flower")?;

    let options = b.nest_start(tca::OPTIONS)?;
    flower::parse_match_list(&args.matches, protocol, parent, &mut b)?;
    b.nest_end(options)?;

    conn.request_ack(b).await
}

async fn del_filter(conn: &Connection, args: FilterDelArgs) -> Result<()> {
    let ifindex = resolve_dev(&args.dev)?;
    let parent = parse_parent(&args.parent)?;
    let protocol = parse_protocol(&args.protocol)?;
    let handle = args
        .handle
        .as_deref()
        .map(parse_filter_handle)
        .transpose()?
        .unwrap_or(0);

    let tcmsg = TcMsg::new()
        .with_ifindex(ifindex)
        .with_parent(parent)
        .with_handle(handle)
        .with_info(TcMsg::filter_info(args.prio, protocol));

    let mut b = MessageBuilder::new(NlMsgType::RTM_DELTFILTER, NLM_F_REQUEST | NLM_F_ACK);
    b.append(&tcmsg)?;

    conn.request_ack(b).await
}

async fn show_filters(
    conn: &Connection,
    args: FilterShowArgs,
    format: OutputFormat,
    opts: &OutputOptions,
) -> Result<()> {
    let ifindex = resolve_dev(&args.dev)?;
    let parent = parse_parent(&args.parent)?;
    let protocol = args.protocol.as_deref().map(parse_protocol).transpose()?;

    let tcmsg = TcMsg::new()
        .with_ifindex(ifindex)
        .with_parent(parent)
        .with_info(TcMsg::filter_info(
            args.prio.unwrap_or(0),
            protocol.unwrap_or(0),
        ));

    let mut b = rtnl::netlink::dump_request(NlMsgType::RTM_GETTFILTER);
    b.append(&tcmsg)?;

    let records = conn.dump(b).await?;

    let stdout = std::io::stdout();
    let mut printer = Printer::new(stdout.lock(), format, opts);
    printer.open_array(None);

    for record in &records {
        let header = NlMsgHdr::from_bytes(record)?;
        if header.nlmsg_type != NlMsgType::RTM_NEWTFILTER {
            continue;
        }
        let payload = &record[NLMSG_HDRLEN..];
        let Ok(tcmsg) = TcMsg::from_bytes(payload) else {
            continue;
        };
        let table = AttrTable::for_schema(&payload[TcMsg::SIZE..], &schema::TCA);
        print_filter(&mut printer, tcmsg, &table, opts);
    }

    printer.close_array();
    printer.finish()?;
    Ok(())
}

fn eth_type_str(eth_type: u16) -> String {
    match eth_type {
        proto::IP => "ipv4".to_string(),
        proto::IPV6 => "ipv6".to_string(),
        proto::ARP => "arp".to_string(),
        proto::RARP => "rarp".to_string(),
        other => format!("{:04x}", other),
    }
}

fn ip_proto_str(ip_proto: u8) -> String {
    ipproto::name(ip_proto)
        .map(String::from)
        .unwrap_or_else(|| format!("{:02x}", ip_proto))
}

fn protocol_str(protocol: u16, opts: &OutputOptions) -> String {
    if !opts.numeric
        && let Some(name) = proto::name(protocol)
    {
        return name.to_string();
    }
    format!("{:04x}", protocol)
}

fn print_filter<W: std::io::Write>(
    p: &mut Printer<W>,
    tcmsg: &TcMsg,
    table: &AttrTable<'_>,
    opts: &OutputOptions,
) {
    p.open_object(None);

    p.text("filter ");
    if tcmsg.tcm_parent == tc_handle::ROOT {
        p.string(Some("parent"), "root ", "root");
    } else {
        let parent = tc_handle::format(tcmsg.tcm_parent);
        p.string(Some("parent"), &format!("parent {} ", parent), &parent);
    }

    let protocol = protocol_str(tcmsg.protocol(), opts);
    p.text("protocol ");
    p.string(Some("protocol"), &format!("{} ", protocol), &protocol);

    let pref = tcmsg.priority();
    p.uint(Some("pref"), &format!("pref {} ", pref), pref as u64);

    let kind = table
        .get(tca::KIND)
        .and_then(|d| get::string(d).ok())
        .unwrap_or("unknown");
    p.string(Some("kind"), &format!("{} ", kind), kind);

    if let Ok(Some(chain)) = table.scalar(&schema::TCA, tca::CHAIN) {
        p.uint(Some("chain"), &format!("chain {} ", chain), chain);
    }

    if tcmsg.tcm_handle != 0 {
        let handle = format!("0x{:x}", tcmsg.tcm_handle);
        p.string(Some("handle"), &format!("handle {} ", handle), &handle);
    }

    if kind == "flower"
        && let Some(options) = table.get(tca::OPTIONS)
    {
        match FlowerOptions::parse(options) {
            Ok(flower_opts) => print_flower(p, &flower_opts, opts),
            Err(err) => tracing::debug!(%err, "undecodable flower options"),
        }
    }

    p.newline();
    p.close_object();
}

fn field<W: std::io::Write>(p: &mut Printer<W>, key: &'static str, value: &str) {
    p.string(Some(key), &format!("\n  {} {}", key, value), value);
}

fn masked_u8_str(m: &Masked<u8>) -> String {
    if m.is_exact() {
        m.value.to_string()
    } else {
        format!("{}/{}", m.value, m.mask)
    }
}

fn masked_hex_str(m: &Masked<u8>) -> String {
    if m.is_exact() {
        format!("0x{:x}", m.value)
    } else {
        format!("0x{:x}/{:x}", m.value, m.mask)
    }
}

fn port_str(selector: &PortSelector) -> String {
    match selector {
        PortSelector::Single(port) => port.to_string(),
        PortSelector::Range(min, max) => format!("{}-{}", min, max),
    }
}

fn print_flower<W: std::io::Write>(
    p: &mut Printer<W>,
    f: &FlowerOptions,
    _opts: &OutputOptions,
) {
    if let Some(classid) = f.classid {
        let min = (classid & 0xffff) as u32;
        if (0xFFE0..0xFFF0).contains(&min) {
            let hw_tc = min - 0xFFE0;
            p.uint(Some("hw_tc"), &format!("hw_tc {} ", hw_tc), hw_tc as u64);
        } else {
            let classid = tc_handle::format(classid);
            p.string(Some("classid"), &format!("classid {} ", classid), &classid);
        }
    }

    if let Some(ref indev) = f.indev {
        field(p, "indev", indev);
    }

    p.open_object(Some("keys"));

    if let Some(vlan_id) = f.vlan_id {
        p.uint(Some("vlan_id"), &format!("\n  vlan_id {}", vlan_id), vlan_id as u64);
    }
    if let Some(vlan_prio) = f.vlan_prio {
        p.uint(
            Some("vlan_prio"),
            &format!("\n  vlan_prio {}", vlan_prio),
            vlan_prio as u64,
        );
    }
    if let Some(eth) = f.vlan_ethtype {
        field(p, "vlan_ethtype", &eth_type_str(eth));
    }
    if let Some(cvlan_id) = f.cvlan_id {
        p.uint(
            Some("cvlan_id"),
            &format!("\n  cvlan_id {}", cvlan_id),
            cvlan_id as u64,
        );
    }
    if let Some(cvlan_prio) = f.cvlan_prio {
        p.uint(
            Some("cvlan_prio"),
            &format!("\n  cvlan_prio {}", cvlan_prio),
            cvlan_prio as u64,
        );
    }
    if let Some(eth) = f.cvlan_ethtype {
        field(p, "cvlan_ethtype", &eth_type_str(eth));
    }

    if let Some(ref mac) = f.dst_mac {
        field(p, "dst_mac", &mac.format());
    }
    if let Some(ref mac) = f.src_mac {
        field(p, "src_mac", &mac.format());
    }

    // Ethertype before addresses, protocol before ports: the render
    // order mirrors the interpretation order.
    if let Some(eth_type) = f.eth_type {
        field(p, "eth_type", &eth_type_str(eth_type));
    }
    if let Some(ip_proto) = f.ip_proto {
        field(p, "ip_proto", &ip_proto_str(ip_proto));
    }

    if let Some(ref tos) = f.ip_tos {
        field(p, "ip_tos", &masked_hex_str(tos));
    }
    if let Some(ref ttl) = f.ip_ttl {
        field(p, "ip_ttl", &masked_hex_str(ttl));
    }

    if let Some(label) = f.mpls_label {
        p.uint(
            Some("mpls_label"),
            &format!("\n  mpls_label {}", label),
            label as u64,
        );
    }
    if let Some(tc) = f.mpls_tc {
        p.uint(Some("mpls_tc"), &format!("\n  mpls_tc {}", tc), tc as u64);
    }
    if let Some(bos) = f.mpls_bos {
        p.uint(Some("mpls_bos"), &format!("\n  mpls_bos {}", bos), bos as u64);
    }
    if let Some(ttl) = f.mpls_ttl {
        p.uint(Some("mpls_ttl"), &format!("\n  mpls_ttl {}", ttl), ttl as u64);
    }

    if let Some(ref ip) = f.dst_ip {
        field(p, "dst_ip", &ip.format());
    }
    if let Some(ref ip) = f.src_ip {
        field(p, "src_ip", &ip.format());
    }

    if let Some(ref port) = f.dst_port {
        field(p, "dst_port", &port_str(port));
    }
    if let Some(ref port) = f.src_port {
        field(p, "src_port", &port_str(port));
    }

    if let Some(ref flags) = f.tcp_flags {
        let text = if flags.mask == u16::MAX {
            format!("0x{:x}", flags.value)
        } else {
            format!("0x{:x}/{:x}", flags.value, flags.mask)
        };
        field(p, "tcp_flags", &text);
    }

    if let Some(ref icmp_type) = f.icmp_type {
        field(p, "icmp_type", &masked_u8_str(icmp_type));
    }
    if let Some(ref icmp_code) = f.icmp_code {
        field(p, "icmp_code", &masked_u8_str(icmp_code));
    }

    if let Some(ref ip) = f.arp_sip {
        field(p, "arp_sip", &ip.format());
    }
    if let Some(ref ip) = f.arp_tip {
        field(p, "arp_tip", &ip.format());
    }
    if let Some(ref op) = f.arp_op {
        let text = match (op.is_exact(), op.value) {
            (true, 1) => "request".to_string(),
            (true, 2) => "reply".to_string(),
            _ => masked_u8_str(op),
        };
        field(p, "arp_op", &text);
    }
    if let Some(ref mac) = f.arp_sha {
        field(p, "arp_sha", &mac.format());
    }
    if let Some(ref mac) = f.arp_tha {
        field(p, "arp_tha", &mac.format());
    }

    if let Some(ref ip) = f.enc_dst_ip {
        field(p, "enc_dst_ip", &ip.format());
    }
    if let Some(ref ip) = f.enc_src_ip {
        field(p, "enc_src_ip", &ip.format());
    }
    if let Some(key_id) = f.enc_key_id {
        p.uint(
            Some("enc_key_id"),
            &format!("\n  enc_key_id {}", key_id),
            key_id as u64,
        );
    }
    if let Some(port) = f.enc_dst_port {
        p.uint(
            Some("enc_dst_port"),
            &format!("\n  enc_dst_port {}", port),
            port as u64,
        );
    }
    if let Some(ref tos) = f.enc_tos {
        field(p, "enc_tos", &masked_hex_str(tos));
    }
    if let Some(ref ttl) = f.enc_ttl {
        field(p, "enc_ttl", &masked_hex_str(ttl));
    }

    if !f.geneve_opts.is_empty() {
        let rendered: Vec<String> = f
            .geneve_opts
            .iter()
            .map(|(key, mask)| {
                let key_s = format!(
                    "{:04x}:{:02x}:{}",
                    key.class.unwrap_or(0),
                    key.opt_type.unwrap_or(0),
                    bytes_to_hex(&key.data)
                );
                match mask {
                    Some(mask) => format!(
                        "{}/{:04x}:{:02x}:{}",
                        key_s,
                        mask.class.unwrap_or(0),
                        mask.opt_type.unwrap_or(0),
                        bytes_to_hex(&mask.data)
                    ),
                    None => key_s,
                }
            })
            .collect();
        field(p, "geneve_opt", &rendered.join(","));
    }

    if let Some((value, mask)) = f.ip_flags {
        let mut parts = Vec::new();
        for (bit, name) in [(1u32, "frag"), (2u32, "firstfrag")] {
            if mask & bit != 0 {
                if value & bit != 0 {
                    parts.push(name.to_string());
                } else {
                    parts.push(format!("no{}", name));
                }
            }
        }
        field(p, "ip_flags", &parts.join("/"));
    }

    p.close_object();

    if f.flags & cls_flags::SKIP_HW != 0 {
        p.bool(Some("skip_hw"), "\n  skip_hw", true);
    }
    if f.flags & cls_flags::SKIP_SW != 0 {
        p.bool(Some("skip_sw"), "\n  skip_sw", true);
    }
    if f.flags & cls_flags::IN_HW != 0 {
        p.bool(Some("in_hw"), "\n  in_hw", true);
        if let Some(count) = f.in_hw_count {
            p.uint(
                Some("in_hw_count"),
                &format!(" in_hw_count {}", count),
                count as u64,
            );
        }
    } else if f.flags & cls_flags::NOT_IN_HW != 0 {
        p.bool(Some("not_in_hw"), "\n  not_in_hw", true);
    }
}
