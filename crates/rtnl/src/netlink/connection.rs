//! High-level netlink connection with request/response handling.
//!
//! This is the transport collaborator: finished messages go in, ACKs,
//! single replies or multipart dump records come out. No retry policy
//! lives here; kernel errors are surfaced verbatim because rtnetlink
//! mutations are not idempotent-safe to replay.

use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{MessageIter, NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, NLMSG_HDRLEN, NlMsgError};
use super::socket::{NetlinkSocket, Protocol};

/// High-level netlink connection.
pub struct Connection {
    socket: NetlinkSocket,
}

impl Connection {
    /// Create a new connection for the given protocol.
    pub fn new(protocol: Protocol) -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::new(protocol)?,
        })
    }

    /// Get the underlying socket.
    pub fn socket(&self) -> &NetlinkSocket {
        &self.socket
    }

    /// Send a request and wait for a single response (or an error ACK).
    ///
    /// Returns the raw receive buffer; iterate it with
    /// [`MessageIter`](super::MessageIter).
    pub async fn request(&self, mut builder: MessageBuilder) -> Result<Vec<u8>> {
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());

        let msg = builder.finish();
        self.socket.send(&msg).await?;

        let response = self.socket.recv_msg().await?;
        self.check_errors(&response, seq)?;

        Ok(response)
    }

    /// Send a request that expects an ACK only (no data response).
    pub async fn request_ack(&self, mut builder: MessageBuilder) -> Result<()> {
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());

        let msg = builder.finish();
        self.socket.send(&msg).await?;

        let response = self.socket.recv_msg().await?;
        self.process_ack(&response, seq)
    }

    /// Send a dump request and collect all records.
    ///
    /// The kernel delivers a dump as however many receive buffers it
    /// likes; records never span buffers but a single buffer carries
    /// many records. Each returned element is one complete message
    /// (header plus payload) so callers can build an independent
    /// attribute table per record and drop it after rendering.
    pub async fn dump(&self, mut builder: MessageBuilder) -> Result<Vec<Vec<u8>>> {
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());

        let msg = builder.finish();
        self.socket.send(&msg).await?;

        let mut records = Vec::new();

        loop {
            let data = self.socket.recv_msg().await?;
            let mut done = false;

            for result in MessageIter::new(&data) {
                let (header, payload) = result?;

                if header.nlmsg_seq != seq {
                    continue;
                }

                if header.is_error() {
                    let err = NlMsgError::from_bytes(payload)?;
                    if !err.is_ack() {
                        return Err(Error::from_errno(err.error));
                    }
                    continue;
                }

                if header.is_done() {
                    done = true;
                    break;
                }

                // Collect the full message (header + payload).
                let mut record = Vec::with_capacity(NLMSG_HDRLEN + payload.len());
                record.extend_from_slice(header.as_bytes());
                record.extend_from_slice(payload);
                records.push(record);
            }

            if done {
                break;
            }
        }

        Ok(records)
    }

    /// Check a response buffer for error messages matching `seq`.
    fn check_errors(&self, data: &[u8], expected_seq: u32) -> Result<()> {
        for result in MessageIter::new(data) {
            let (header, payload) = result?;

            if header.nlmsg_seq != expected_seq {
                continue;
            }

            if header.is_error() {
                let err = NlMsgError::from_bytes(payload)?;
                if !err.is_ack() {
                    return Err(Error::from_errno(err.error));
                }
            }
        }

        Ok(())
    }

    /// Process an ACK response.
    fn process_ack(&self, data: &[u8], expected_seq: u32) -> Result<()> {
        for result in MessageIter::new(data) {
            let (header, payload) = result?;

            if header.nlmsg_seq != expected_seq {
                continue;
            }

            if header.is_error() {
                let err = NlMsgError::from_bytes(payload)?;
                if !err.is_ack() {
                    return Err(Error::from_errno(err.error));
                }
                return Ok(());
            }
        }

        Err(Error::InvalidMessage("expected ACK message".into()))
    }

    /// Extract the first data message payload for `msg_type` from a
    /// `request` response buffer.
    pub fn single_reply<'a>(&self, response: &'a [u8], msg_type: u16) -> Result<&'a [u8]> {
        for result in MessageIter::new(response) {
            let (header, payload) = result?;
            if header.nlmsg_type == msg_type {
                return Ok(payload);
            }
        }
        Err(Error::InvalidMessage(format!(
            "no message of type {} in reply",
            msg_type
        )))
    }
}

/// Helper to build a dump request.
pub fn dump_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_DUMP)
}

/// Helper to build an acknowledged request.
pub fn create_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_ACK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::message::{NlMsgHdr, NlMsgType};

    #[test]
    fn test_request_builders() {
        let dump = dump_request(NlMsgType::RTM_GETNEIGH).finish();
        let header = NlMsgHdr::from_bytes(&dump).unwrap();
        assert_eq!(header.nlmsg_type, NlMsgType::RTM_GETNEIGH);
        assert_eq!(header.nlmsg_flags, NLM_F_REQUEST | NLM_F_DUMP);

        let req = create_request(NlMsgType::RTM_NEWNEIGH).finish();
        let header = NlMsgHdr::from_bytes(&req).unwrap();
        assert_eq!(header.nlmsg_flags, NLM_F_REQUEST | NLM_F_ACK);
    }
}
