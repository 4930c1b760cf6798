//! Netlink protocol implementation: wire codec, schema registry, typed
//! object builders and the socket transport.
//!
//! The layering goes bottom-up:
//!
//! - [`attr`] / [`builder`] / [`message`] implement the TLV wire format
//!   (encode with patched nest lengths, decode into attribute tables).
//! - [`schema`] is the single source of truth for attribute widths and
//!   byte orders, consumed by both sides of the codec.
//! - [`fdb`], [`flower`] and [`link`] build request messages and parse
//!   kernel replies for their object kinds.
//! - [`connection`] / the socket carry finished messages to the kernel
//!   (request/ack, request/reply and multipart dumps).

pub mod attr;
mod builder;
pub mod connection;
mod error;
pub mod fdb;
pub mod flower;
pub mod link;
pub mod message;
pub mod parse;
pub mod schema;
mod socket;
pub mod types;

pub use attr::{AttrIter, AttrTable, NlAttr};
pub use builder::{MessageBuilder, NestToken};
pub use connection::{Connection, create_request, dump_request};
pub use error::{Error, Result};
pub use message::{MessageIter, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
pub use parse::FromNetlink;
pub use socket::{NetlinkSocket, Protocol};
