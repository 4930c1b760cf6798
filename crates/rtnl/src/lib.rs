//! RTNetlink attribute codec and typed builders for Linux network objects.
//!
//! This crate implements the netlink type-length-value attribute protocol
//! and builds on it: typed request builders and reply parsers for bridge
//! forwarding-database entries, link types (vrf, ipvlan, veth) and the
//! flower traffic-control classifier.
//!
//! # Example
//!
//! ```ignore
//! use rtnl::netlink::{Connection, Protocol};
//! use rtnl::netlink::fdb::FdbRequest;
//!
//! #[tokio::main]
//! async fn main() -> rtnl::Result<()> {
//!     let conn = Connection::new(Protocol::Route)?;
//!
//!     let mac = rtnl::util::addr::parse_mac("de:ad:be:ef:00:01")?;
//!     let req = FdbRequest::new(mac).dev("br0").vlan(10);
//!     conn.request_ack(req.build_add()?).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod names;
pub mod netlink;
pub mod util;

// Re-export common types at crate root for convenience
pub use netlink::{Connection, Error, Protocol, Result};
