//! bridge - Bridge FDB management utility
//!
//! Manages the bridge forwarding database over rtnetlink.

mod commands;

use clap::{Parser, Subcommand};
use rtnl::Result;
use rtnl::netlink::{Connection, Protocol};
use rtnl_output::{OutputFormat, OutputOptions};

use commands::fdb::FdbCmd;

#[derive(Parser)]
#[command(name = "bridge")]
#[command(about = "Bridge FDB management utility", long_about = None)]
#[command(version)]
struct Cli {
    /// Output JSON
    #[arg(short = 'j', long, global = true)]
    json: bool,

    /// Pretty print JSON
    #[arg(short = 'p', long, global = true)]
    pretty: bool,

    /// Show statistics
    #[arg(short = 's', long, global = true)]
    stats: bool,

    /// Show details
    #[arg(short = 'd', long, global = true)]
    details: bool,

    /// Show numeric values instead of names
    #[arg(short = 'n', long, global = true)]
    numeric: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage forwarding database entries
    Fdb(FdbCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let opts = OutputOptions {
        stats: cli.stats,
        details: cli.details,
        numeric: cli.numeric,
        pretty: cli.pretty,
        color: atty::is(atty::Stream::Stdout),
    };

    let conn = Connection::new(Protocol::Route)?;

    match cli.command {
        Command::Fdb(cmd) => cmd.run(&conn, format, &opts).await,
    }
}
