//! `ip link` command implementation.

use clap::{Args, Subcommand};
use rtnl::names::NameTable;
use rtnl::netlink::link::{
    self, IpvlanIsolation, IpvlanMode, LinkEntry, LinkKind, LinkRequest,
};
use rtnl::netlink::types::link::iff;
use rtnl::netlink::{Connection, Error, FromNetlink, NLMSG_HDRLEN, NlMsgHdr, NlMsgType, Result};
use rtnl::util;
use rtnl::util::addr::{format_mac, parse_mac};
use rtnl_output::{OutputFormat, OutputOptions, Printer};

#[derive(Args)]
pub struct LinkCmd {
    #[command(subcommand)]
    command: Option<LinkCommand>,
}

#[derive(Subcommand)]
enum LinkCommand {
    /// Show links
    #[command(visible_alias = "list", visible_alias = "ls")]
    Show {
        /// Only this device
        dev: Option<String>,
    },
    /// Add a link
    Add(LinkAddArgs),
    /// Delete a link
    #[command(visible_alias = "delete")]
    Del {
        /// Device name
        dev: String,
    },
}

#[derive(Args)]
struct LinkAddArgs {
    /// Interface name
    name: String,

    /// Link type (vrf, ipvlan, veth)
    #[arg(long = "type")]
    kind: String,

    /// Routing table (vrf), by name or number
    #[arg(long)]
    table: Option<String>,

    /// Operating mode (ipvlan: l2, l3, l3s)
    #[arg(long)]
    mode: Option<String>,

    /// Isolate slaves from each other (ipvlan)
    #[arg(long)]
    private: bool,

    /// Hairpin slave traffic via the external switch (ipvlan)
    #[arg(long)]
    vepa: bool,

    /// Peer name (veth)
    #[arg(long)]
    peer: Option<String>,

    /// Lower device (ipvlan)
    #[arg(long)]
    link: Option<String>,

    /// MTU
    #[arg(long)]
    mtu: Option<u32>,

    /// Hardware address
    #[arg(long)]
    address: Option<String>,

    /// Master device
    #[arg(long)]
    master: Option<String>,

    /// Bring the link up after creation
    #[arg(long)]
    up: bool,
}

impl LinkCmd {
    pub async fn run(
        self,
        conn: &Connection,
        format: OutputFormat,
        opts: &OutputOptions,
    ) -> Result<()> {
        match self.command {
            None | Some(LinkCommand::Show { dev: None }) => {
                show_links(conn, None, format, opts).await
            }
            Some(LinkCommand::Show { dev }) => show_links(conn, dev, format, opts).await,
            Some(LinkCommand::Add(args)) => add_link(conn, args).await,
            Some(LinkCommand::Del { dev }) => del_link(conn, &dev).await,
        }
    }
}

fn resolve_dev(name: &str) -> Result<u32> {
    util::ifindex(name).ok_or_else(|| Error::DeviceNotFound {
        name: name.to_string(),
    })
}

fn to_kind(args: &LinkAddArgs) -> Result<LinkKind> {
    match args.kind.as_str() {
        "vrf" => {
            let table = args
                .table
                .as_deref()
                .ok_or_else(|| Error::InvalidMessage("vrf requires a table".into()))?;
            let tables = NameTable::rt_tables();
            let table = tables
                .resolve(table)
                .ok_or_else(|| Error::invalid_arg("table", table.to_string()))?;
            Ok(LinkKind::Vrf { table })
        }
        "ipvlan" => {
            let mode = match args.mode.as_deref() {
                Some(mode) => IpvlanMode::parse(mode)?,
                None => IpvlanMode::L3,
            };
            let isolation = match (args.private, args.vepa) {
                (true, true) => {
                    return Err(Error::ConflictingOptions(
                        "private and vepa are mutually exclusive",
                    ));
                }
                (true, false) => IpvlanIsolation::Private,
                (false, true) => IpvlanIsolation::Vepa,
                (false, false) => IpvlanIsolation::Bridge,
            };
            Ok(LinkKind::Ipvlan { mode, isolation })
        }
        "veth" => Ok(LinkKind::Veth {
            peer: args.peer.clone(),
        }),
        other => Err(Error::invalid_arg("link type", other.to_string())),
    }
}

async fn add_link(conn: &Connection, args: LinkAddArgs) -> Result<()> {
    let kind = to_kind(&args)?;

    let mut req = LinkRequest::new(&args.name).kind(kind);
    if let Some(mtu) = args.mtu {
        req = req.mtu(mtu);
    }
    if let Some(ref address) = args.address {
        let mac = parse_mac(address)
            .map_err(|_| Error::invalid_arg("address", address.clone()))?;
        req = req.address(mac);
    }
    if let Some(ref master) = args.master {
        req = req.master_ifindex(resolve_dev(master)?);
    }
    if let Some(ref link) = args.link {
        req = req.link_ifindex(resolve_dev(link)?);
    }
    if args.up {
        req = req.up();
    }

    conn.request_ack(req.build_add()?).await
}

async fn del_link(conn: &Connection, dev: &str) -> Result<()> {
    // Resolve first for a friendlier error than the kernel's EINVAL.
    let ifindex = resolve_dev(dev)?;
    conn.request_ack(link::build_del_by_index(ifindex)?).await
}

async fn show_links(
    conn: &Connection,
    dev: Option<String>,
    format: OutputFormat,
    opts: &OutputOptions,
) -> Result<()> {
    let only_index = dev.as_deref().map(resolve_dev).transpose()?;

    let records = conn.dump(link::build_dump()?).await?;
    let groups = NameTable::device_groups();

    let stdout = std::io::stdout();
    let mut printer = Printer::new(stdout.lock(), format, opts);
    printer.open_array(None);

    for record in &records {
        let header = NlMsgHdr::from_bytes(record)?;
        if header.nlmsg_type != NlMsgType::RTM_NEWLINK {
            continue;
        }
        let entry = match LinkEntry::from_bytes(&record[NLMSG_HDRLEN..]) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(%err, "skipping unparseable link record");
                continue;
            }
        };
        if let Some(only) = only_index
            && entry.index != only
        {
            continue;
        }
        print_link(&mut printer, &entry, &groups, opts);
    }

    printer.close_array();
    printer.finish()?;
    Ok(())
}

fn print_link<W: std::io::Write>(
    p: &mut Printer<W>,
    entry: &LinkEntry,
    groups: &NameTable,
    opts: &OutputOptions,
) {
    p.open_object(None);

    p.uint(Some("ifindex"), &format!("{}: ", entry.index), entry.index as u64);

    let name = entry.name.clone().unwrap_or_else(|| "?".to_string());
    p.string(Some("ifname"), &format!("{}: ", name), &name);

    let mut flag_names = Vec::new();
    if entry.flags & iff::UP != 0 {
        flag_names.push("UP");
    }
    if entry.flags & iff::LOWER_UP != 0 {
        flag_names.push("LOWER_UP");
    }
    p.open_array(Some("flags"));
    let joined = flag_names.join(",");
    p.text(&format!("<{}> ", joined));
    for flag in &flag_names {
        p.string(None, "", flag);
    }
    p.close_array();

    if let Some(mtu) = entry.mtu {
        p.uint(Some("mtu"), &format!("mtu {} ", mtu), mtu as u64);
    }

    if let Some(master) = entry.master {
        let master = if opts.numeric {
            master.to_string()
        } else {
            util::ifname::ifname_or_index(master)
        };
        p.string(Some("master"), &format!("master {} ", master), &master);
    }

    let state = entry.operstate.name();
    p.string(Some("operstate"), &format!("state {} ", state), state);

    if let Some(group) = entry.group {
        let group = if opts.numeric {
            group.to_string()
        } else {
            groups.resolve_reverse(group)
        };
        p.string(Some("group"), &format!("group {} ", group), &group);
    }

    if let Some(ref kind) = entry.kind {
        p.string(Some("linkinfo_kind"), &format!("type {} ", kind), kind);
    }

    if opts.details
        && let Some(ref address) = entry.address
    {
        let mac = format_mac(address);
        p.text("link/ether ");
        p.string(Some("address"), &format!("{} ", mac), &mac);
    }

    p.newline();
    p.close_object();
}
