//! `bridge fdb` command implementation.

use std::net::IpAddr;

use clap::{Args, Subcommand};
use rtnl::netlink::fdb::{
    FdbEntry, FdbFilter, FdbFlushRequest, FdbGetRequest, FdbRequest, FdbShowRequest,
};
use rtnl::netlink::types::neigh::{ntf, ntf_ext, nud, state_name};
use rtnl::netlink::{Connection, Error, FromNetlink, NLMSG_HDRLEN, NlMsgHdr, NlMsgType, Result};
use rtnl::util;
use rtnl::util::addr::parse_mac;
use rtnl_output::{OutputFormat, OutputOptions, Printer};

#[derive(Args)]
pub struct FdbCmd {
    #[command(subcommand)]
    command: Option<FdbCommand>,
}

#[derive(Subcommand)]
enum FdbCommand {
    /// Show FDB entries
    #[command(visible_alias = "list", visible_alias = "ls")]
    Show(FdbShowArgs),
    /// Add an FDB entry
    Add(FdbModArgs),
    /// Append a destination to an existing entry
    Append(FdbModArgs),
    /// Replace an FDB entry (add or update)
    Replace(FdbModArgs),
    /// Delete an FDB entry
    #[command(visible_alias = "delete")]
    Del(FdbModArgs),
    /// Look up one FDB entry by MAC
    Get(FdbGetArgs),
    /// Bulk-delete entries matching state and flag conditions
    Flush(FdbFlushArgs),
}

#[derive(Args, Default)]
struct FdbShowArgs {
    /// Bridge master device
    #[arg(long)]
    br: Option<String>,

    /// Bridge port device
    #[arg(long, visible_alias = "dev")]
    brport: Option<String>,

    /// Only entries in this VLAN
    #[arg(long)]
    vlan: Option<u16>,

    /// Only entries in these states (permanent, static, stale, dynamic, all)
    #[arg(long)]
    state: Vec<String>,

    /// Only dynamic entries
    #[arg(long)]
    dynamic: bool,
}

#[derive(Args)]
struct FdbModArgs {
    /// MAC address
    mac: String,

    /// Bridge port device
    #[arg(long)]
    dev: String,

    /// Remote endpoint address (VXLAN)
    #[arg(long)]
    dst: Option<IpAddr>,

    /// Remote UDP port (VXLAN)
    #[arg(long)]
    port: Option<u16>,

    /// VXLAN network identifier
    #[arg(long)]
    vni: Option<u32>,

    /// Source VNI
    #[arg(long)]
    src_vni: Option<u32>,

    /// Via device
    #[arg(long)]
    via: Option<String>,

    /// Nexthop group id (excludes dst, port, vni)
    #[arg(long)]
    nhid: Option<u32>,

    /// VLAN ID
    #[arg(long)]
    vlan: Option<u16>,

    /// Install into the device's own FDB
    #[arg(long = "self")]
    self_entry: bool,

    /// Forward to the master bridge
    #[arg(long)]
    master: bool,

    /// Router entry
    #[arg(long)]
    router: bool,

    /// In-use entry
    #[arg(long = "use")]
    use_entry: bool,

    /// Externally learned entry
    #[arg(long)]
    extern_learn: bool,

    /// Sticky entry
    #[arg(long)]
    sticky: bool,

    /// Local/permanent entry
    #[arg(long, visible_alias = "permanent")]
    local: bool,

    /// Static entry
    #[arg(long = "static", visible_alias = "temp")]
    static_entry: bool,

    /// Dynamic entry (ages out)
    #[arg(long)]
    dynamic: bool,
}

#[derive(Args)]
struct FdbGetArgs {
    /// MAC address
    mac: String,

    /// Bridge port device
    #[arg(long, visible_alias = "brport")]
    dev: Option<String>,

    /// Bridge master device
    #[arg(long)]
    br: Option<String>,

    /// VLAN ID
    #[arg(long)]
    vlan: Option<u16>,

    /// VXLAN network identifier
    #[arg(long)]
    vni: Option<u32>,

    /// Look in the device's own FDB
    #[arg(long = "self")]
    self_entry: bool,

    /// Look in the master bridge's FDB
    #[arg(long)]
    master: bool,

    /// Only dynamic entries
    #[arg(long)]
    dynamic: bool,
}

#[derive(Args)]
struct FdbFlushArgs {
    /// Device to flush
    #[arg(long)]
    dev: String,

    /// Restrict to one bridge port
    #[arg(long)]
    brport: Option<String>,

    /// Restrict to a VLAN
    #[arg(long)]
    vlan: Option<u16>,

    /// Flush the device's own FDB
    #[arg(long = "self")]
    self_entries: bool,

    /// Flush the master bridge's FDB
    #[arg(long)]
    master: bool,

    #[arg(long)]
    permanent: bool,
    #[arg(long)]
    nopermanent: bool,
    #[arg(long = "static")]
    static_entries: bool,
    #[arg(long)]
    nostatic: bool,
    #[arg(long)]
    dynamic: bool,
    #[arg(long)]
    nodynamic: bool,
    #[arg(long)]
    added_by_user: bool,
    #[arg(long)]
    noadded_by_user: bool,
    #[arg(long)]
    extern_learn: bool,
    #[arg(long)]
    noextern_learn: bool,
    #[arg(long)]
    sticky: bool,
    #[arg(long)]
    nosticky: bool,
    #[arg(long)]
    offloaded: bool,
    #[arg(long)]
    nooffloaded: bool,
}

impl FdbCmd {
    pub async fn run(
        self,
        conn: &Connection,
        format: OutputFormat,
        opts: &OutputOptions,
    ) -> Result<()> {
        match self.command {
            None => show_fdb(conn, FdbShowArgs::default(), format, opts).await,
            Some(FdbCommand::Show(args)) => show_fdb(conn, args, format, opts).await,
            Some(FdbCommand::Add(args)) => {
                conn.request_ack(to_request(&args)?.build_add()?).await
            }
            Some(FdbCommand::Append(args)) => {
                conn.request_ack(to_request(&args)?.build_append()?).await
            }
            Some(FdbCommand::Replace(args)) => {
                conn.request_ack(to_request(&args)?.build_replace()?).await
            }
            Some(FdbCommand::Del(args)) => {
                conn.request_ack(to_request(&args)?.build_del()?).await
            }
            Some(FdbCommand::Get(args)) => get_fdb(conn, args, format, opts).await,
            Some(FdbCommand::Flush(args)) => conn.request_ack(to_flush(&args)?.build()?).await,
        }
    }
}

fn to_request(args: &FdbModArgs) -> Result<FdbRequest> {
    let mac = parse_mac(&args.mac)
        .map_err(|_| Error::invalid_arg("MAC address", args.mac.clone()))?;

    let mut req = FdbRequest::new(mac).dev(&args.dev);

    if let Some(dst) = args.dst {
        req = req.dst(dst);
    }
    if let Some(port) = args.port {
        req = req.port(port);
    }
    if let Some(vni) = args.vni {
        req = req.vni(vni)?;
    }
    if let Some(src_vni) = args.src_vni {
        req = req.src_vni(src_vni)?;
    }
    if let Some(ref via) = args.via {
        req = req.via(via);
    }
    if let Some(nhid) = args.nhid {
        req = req.nhid(nhid);
    }
    if let Some(vlan) = args.vlan {
        req = req.vlan(vlan);
    }
    if args.self_entry {
        req = req.self_entry();
    }
    if args.master {
        req = req.master();
    }
    if args.router {
        req = req.router();
    }
    if args.use_entry {
        req = req.use_entry();
    }
    if args.extern_learn {
        req = req.extern_learn();
    }
    if args.sticky {
        req = req.sticky();
    }
    if args.local {
        req = req.permanent();
    }
    if args.static_entry {
        req = req.static_entry();
    }
    if args.dynamic {
        req = req.dynamic();
    }

    Ok(req)
}

fn to_flush(args: &FdbFlushArgs) -> Result<FdbFlushRequest> {
    let mut req = FdbFlushRequest::new(&args.dev);

    if let Some(ref brport) = args.brport {
        req = req.brport(brport);
    }
    if let Some(vlan) = args.vlan {
        req = req.vlan(vlan)?;
    }
    if args.self_entries {
        req = req.self_entries();
    }
    if args.master {
        req = req.master();
    }
    if args.permanent {
        req = req.permanent();
    }
    if args.nopermanent {
        req = req.nopermanent();
    }
    if args.static_entries {
        req = req.static_entries();
    }
    if args.nostatic {
        req = req.nostatic();
    }
    if args.dynamic {
        req = req.dynamic();
    }
    if args.nodynamic {
        req = req.nodynamic();
    }
    if args.added_by_user {
        req = req.added_by_user(true);
    }
    if args.noadded_by_user {
        req = req.added_by_user(false);
    }
    if args.extern_learn {
        req = req.extern_learn(true);
    }
    if args.noextern_learn {
        req = req.extern_learn(false);
    }
    if args.sticky {
        req = req.sticky(true);
    }
    if args.nosticky {
        req = req.sticky(false);
    }
    if args.offloaded {
        req = req.offloaded(true);
    }
    if args.nooffloaded {
        req = req.offloaded(false);
    }

    Ok(req)
}

fn parse_state(arg: &str) -> Result<u16> {
    Ok(match arg {
        "permanent" => nud::PERMANENT,
        "static" | "temp" => nud::NOARP,
        "stale" => nud::STALE,
        "reachable" | "dynamic" => nud::REACHABLE,
        "all" => !0,
        other => {
            let parsed = if let Some(hex) = other.strip_prefix("0x") {
                u16::from_str_radix(hex, 16).ok()
            } else {
                other.parse().ok()
            };
            parsed.ok_or_else(|| Error::invalid_arg("state", other.to_string()))?
        }
    })
}

async fn show_fdb(
    conn: &Connection,
    args: FdbShowArgs,
    format: OutputFormat,
    opts: &OutputOptions,
) -> Result<()> {
    let mut req = FdbShowRequest::new();
    if let Some(ref br) = args.br {
        req = req.br(br);
    }
    if let Some(ref brport) = args.brport {
        req = req.dev(brport);
    }
    if let Some(vlan) = args.vlan {
        req = req.vlan(vlan);
    }
    for state in &args.state {
        req = req.state(parse_state(state)?);
    }
    if args.dynamic {
        req = req.dynamic();
    }

    let filter = req.filter()?;
    let records = conn.dump(req.build_dump()?).await?;

    let stdout = std::io::stdout();
    let mut printer = Printer::new(stdout.lock(), format, opts);
    printer.open_array(None);

    for record in &records {
        let header = NlMsgHdr::from_bytes(record)?;
        if header.nlmsg_type != NlMsgType::RTM_NEWNEIGH
            && header.nlmsg_type != NlMsgType::RTM_DELNEIGH
        {
            continue;
        }
        let entry = match FdbEntry::from_bytes(&record[NLMSG_HDRLEN..]) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(%err, "skipping unparseable fdb record");
                continue;
            }
        };
        if !filter.matches(&entry) {
            continue;
        }
        let deleted = header.nlmsg_type == NlMsgType::RTM_DELNEIGH;
        print_fdb_entry(&mut printer, &entry, &filter, opts, deleted);
    }

    printer.close_array();
    printer.finish()?;
    Ok(())
}

async fn get_fdb(
    conn: &Connection,
    args: FdbGetArgs,
    format: OutputFormat,
    opts: &OutputOptions,
) -> Result<()> {
    let mac = parse_mac(&args.mac)
        .map_err(|_| Error::invalid_arg("MAC address", args.mac.clone()))?;

    let mut req = FdbGetRequest::new(mac);
    if let Some(ref dev) = args.dev {
        req = req.dev(dev);
    }
    if let Some(ref br) = args.br {
        req = req.br(br);
    }
    if let Some(vlan) = args.vlan {
        req = req.vlan(vlan);
    }
    if let Some(vni) = args.vni {
        req = req.vni(vni)?;
    }
    if args.self_entry {
        req = req.self_entry();
    }
    if args.master {
        req = req.master();
    }

    let response = conn.request(req.build()?).await?;
    let payload = conn.single_reply(&response, NlMsgType::RTM_NEWNEIGH)?;
    let entry = FdbEntry::from_bytes(payload)?;

    let filter = FdbFilter {
        dynamic_only: args.dynamic,
        ..Default::default()
    };
    if !filter.matches(&entry) {
        return Ok(());
    }

    let stdout = std::io::stdout();
    let mut printer = Printer::new(stdout.lock(), format, opts);
    printer.open_array(None);
    print_fdb_entry(&mut printer, &entry, &filter, opts, false);
    printer.close_array();
    printer.finish()?;
    Ok(())
}

fn user_hz() -> u64 {
    // SAFETY: sysconf is thread-safe and has no preconditions.
    let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if hz > 0 { hz as u64 } else { 100 }
}

fn dev_name(opts: &OutputOptions, ifindex: u32) -> String {
    if opts.numeric {
        ifindex.to_string()
    } else {
        util::ifname::ifname_or_index(ifindex)
    }
}

fn print_fdb_entry<W: std::io::Write>(
    p: &mut Printer<W>,
    entry: &FdbEntry,
    filter: &FdbFilter,
    opts: &OutputOptions,
    deleted: bool,
) {
    p.open_object(None);

    if deleted {
        p.bool(Some("deleted"), "Deleted ", true);
    }

    if let Some(mac) = entry.mac_str() {
        p.string(Some("mac"), &format!("{} ", mac), &mac);
    }

    if filter.ifindex.is_none() && entry.ifindex != 0 {
        let name = dev_name(opts, entry.ifindex);
        p.text("dev ");
        p.string(Some("ifname"), &format!("{} ", name), &name);
    }

    if let Some(dst) = entry.dst {
        let dst = dst.to_string();
        p.text("dst ");
        p.string(Some("dst"), &format!("{} ", dst), &dst);
    }

    if let Some(vlan) = entry.vlan
        && vlan != 0
    {
        p.uint(Some("vlan"), &format!("vlan {} ", vlan), vlan as u64);
    }

    if let Some(port) = entry.port {
        p.uint(Some("port"), &format!("port {} ", port), port as u64);
    }

    if let Some(vni) = entry.vni {
        p.uint(Some("vni"), &format!("vni {} ", vni), vni as u64);
    }

    if let Some(src_vni) = entry.src_vni {
        p.uint(Some("src_vni"), &format!("src_vni {} ", src_vni), src_vni as u64);
    }

    if let Some(via) = entry.via_ifindex {
        if entry.link_netnsid.is_some() {
            p.uint(Some("viaIfIndex"), &format!("via ifindex {} ", via), via as u64);
        } else {
            let name = dev_name(opts, via);
            p.string(Some("viaIf"), &format!("via {} ", name), &name);
        }
    }

    if let Some(nhid) = entry.nhid {
        p.uint(Some("nhid"), &format!("nhid {} ", nhid), nhid as u64);
    }

    if let Some(nsid) = entry.link_netnsid {
        p.uint(
            Some("linkNetNsId"),
            &format!("link-netnsid {} ", nsid),
            nsid as u64,
        );
    }

    if opts.stats
        && let Some((used, updated)) = entry.cacheinfo
    {
        let hz = user_hz();
        let used = used as u64 / hz;
        let updated = updated as u64 / hz;
        p.uint(Some("used"), &format!("used {}/", used), used);
        p.uint(Some("updated"), &format!("{} ", updated), updated);
    }

    p.open_array(Some("flags"));
    if entry.is_self() {
        p.string(None, "self ", "self");
    }
    if entry.flags & ntf::ROUTER != 0 {
        p.string(None, "router ", "router");
    }
    if entry.is_extern_learn() {
        p.string(None, "extern_learn ", "extern_learn");
    }
    if entry.flags & ntf::OFFLOADED != 0 {
        p.string(None, "offload ", "offload");
    }
    if entry.is_master() {
        p.string(None, "master ", "master");
    }
    if entry.flags & ntf::STICKY != 0 {
        p.string(None, "sticky ", "sticky");
    }
    if entry.ext_flags & ntf_ext::LOCKED != 0 {
        p.string(None, "locked ", "locked");
    }
    p.close_array();

    if let Some(master) = entry.master {
        let name = dev_name(opts, master);
        p.string(Some("master"), &format!("master {} ", name), &name);
    }

    match state_name(entry.state) {
        Some(state) => p.string(Some("state"), state, state),
        None => {
            let state = format!("{:#x}", entry.state);
            p.string(Some("state"), &format!("state={}", state), &state);
        }
    }

    p.newline();
    p.close_object();
}
