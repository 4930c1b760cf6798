//! Message builder for constructing netlink messages.
//!
//! The builder owns a growable buffer with an explicit byte budget: every
//! append is checked against it and fails with
//! [`Error::CapacityExceeded`] rather than silently producing a message
//! the kernel would reject. Nested attributes are opened with
//! [`MessageBuilder::nest_start`] and closed strictly LIFO; the
//! placeholder length is patched on close.

use super::attr::{NLA_F_NESTED, NlAttr, nla_align};
use super::error::{Error, Result};
use super::message::{NLMSG_HDRLEN, NlMsgHdr, nlmsg_align};
use super::schema::{AttrKind, ByteOrder, Schema};
use zerocopy::{Immutable, IntoBytes};

/// Default message budget, matching the request buffers iproute2 sizes
/// for rtnetlink commands.
pub const MAX_MSG: usize = 16 * 1024;

/// Token returned when starting a nested attribute.
/// Used to finalize the nested attribute length.
#[derive(Debug, Clone, Copy)]
pub struct NestToken {
    /// Offset of the nested attribute header in the buffer.
    offset: usize,
    /// Nesting depth at which the token was issued.
    depth: usize,
}

/// Builder for constructing netlink messages.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    buf: Vec<u8>,
    cap: usize,
    depth: usize,
}

impl MessageBuilder {
    /// Create a new message builder with the given type and flags.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self::with_capacity(msg_type, flags, MAX_MSG)
    }

    /// Create a builder with an explicit byte budget.
    pub fn with_capacity(msg_type: u16, flags: u16, cap: usize) -> Self {
        let header = NlMsgHdr::new(msg_type, flags);
        let mut buf = vec![0u8; NLMSG_HDRLEN];
        buf[..std::mem::size_of::<NlMsgHdr>()].copy_from_slice(header.as_bytes());
        Self { buf, cap, depth: 0 }
    }

    /// Get the current message length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if the message is empty (header only).
    pub fn is_empty(&self) -> bool {
        self.buf.len() == NLMSG_HDRLEN
    }

    /// Fail if appending `extra` bytes (plus alignment) would exceed the
    /// budget.
    fn ensure(&self, extra: usize) -> Result<()> {
        let needed = nla_align(self.buf.len() + extra);
        if needed > self.cap {
            return Err(Error::CapacityExceeded {
                needed,
                capacity: self.cap,
            });
        }
        Ok(())
    }

    /// Append raw bytes to the message (with alignment padding).
    pub fn append_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.ensure(data.len())?;
        self.buf.extend_from_slice(data);
        let aligned = nlmsg_align(self.buf.len());
        self.buf.resize(aligned, 0);
        Ok(())
    }

    /// Append a fixed-size wire struct to the message.
    pub fn append<T: IntoBytes + Immutable>(&mut self, data: &T) -> Result<()> {
        self.append_bytes(data.as_bytes())
    }

    /// Append an attribute with the given type and data.
    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) -> Result<()> {
        self.ensure(NlAttr::new(attr_type, data.len()).nla_len as usize)?;
        let attr = NlAttr::new(attr_type, data.len());
        self.buf.extend_from_slice(attr.as_bytes());
        self.buf.extend_from_slice(data);
        let aligned = nla_align(self.buf.len());
        self.buf.resize(aligned, 0);
        Ok(())
    }

    /// Append an empty (flag) attribute with no payload.
    pub fn append_attr_empty(&mut self, attr_type: u16) -> Result<()> {
        self.append_attr(attr_type, &[])
    }

    /// Append a u8 attribute.
    pub fn append_attr_u8(&mut self, attr_type: u16, value: u8) -> Result<()> {
        self.append_attr(attr_type, &[value])
    }

    /// Append a u16 attribute (native endian).
    pub fn append_attr_u16(&mut self, attr_type: u16, value: u16) -> Result<()> {
        self.append_attr(attr_type, &value.to_ne_bytes())
    }

    /// Append a u32 attribute (native endian).
    pub fn append_attr_u32(&mut self, attr_type: u16, value: u32) -> Result<()> {
        self.append_attr(attr_type, &value.to_ne_bytes())
    }

    /// Append a u16 attribute (big endian / network order).
    pub fn append_attr_u16_be(&mut self, attr_type: u16, value: u16) -> Result<()> {
        self.append_attr(attr_type, &value.to_be_bytes())
    }

    /// Append a u32 attribute (big endian / network order).
    pub fn append_attr_u32_be(&mut self, attr_type: u16, value: u32) -> Result<()> {
        self.append_attr(attr_type, &value.to_be_bytes())
    }

    /// Append a null-terminated string attribute.
    pub fn append_attr_str(&mut self, attr_type: u16, value: &str) -> Result<()> {
        let mut data = value.as_bytes().to_vec();
        data.push(0); // null terminator
        self.append_attr(attr_type, &data)
    }

    /// Append a scalar attribute through the schema registry.
    ///
    /// The schema decides width and byte order; builders never restate
    /// them at the call site.
    pub fn put(&mut self, schema: &Schema, id: u16, value: u64) -> Result<()> {
        let spec = schema.get(id).ok_or_else(|| {
            Error::InvalidAttribute(format!("attribute {} not in schema {}", id, schema.name))
        })?;
        match (spec.kind, spec.order) {
            (AttrKind::U8, _) => self.append_attr_u8(id, value as u8),
            (AttrKind::U16, ByteOrder::Host) => self.append_attr_u16(id, value as u16),
            (AttrKind::U16, ByteOrder::Network) => self.append_attr_u16_be(id, value as u16),
            (AttrKind::U32, ByteOrder::Host) => self.append_attr_u32(id, value as u32),
            (AttrKind::U32, ByteOrder::Network) => self.append_attr_u32_be(id, value as u32),
            (kind, _) => Err(Error::InvalidAttribute(format!(
                "attribute {} in schema {} is {:?}, not a scalar",
                id, schema.name, kind
            ))),
        }
    }

    /// Append a variable-length attribute, checked against the schema.
    pub fn put_bytes(&mut self, schema: &Schema, id: u16, data: &[u8]) -> Result<()> {
        let spec = schema.get(id).ok_or_else(|| {
            Error::InvalidAttribute(format!("attribute {} not in schema {}", id, schema.name))
        })?;
        match spec.kind {
            AttrKind::Bytes => self.append_attr(id, data),
            kind => Err(Error::InvalidAttribute(format!(
                "attribute {} in schema {} is {:?}, not bytes",
                id, schema.name, kind
            ))),
        }
    }

    /// Start a nested attribute. Returns a token to finalize it.
    pub fn nest_start(&mut self, attr_type: u16) -> Result<NestToken> {
        self.ensure(std::mem::size_of::<NlAttr>())?;
        let offset = self.buf.len();
        // Placeholder header with nested flag; length patched on close.
        let attr = NlAttr::new(attr_type | NLA_F_NESTED, 0);
        self.buf.extend_from_slice(attr.as_bytes());
        self.depth += 1;
        Ok(NestToken {
            offset,
            depth: self.depth,
        })
    }

    /// End a nested attribute started with `nest_start`.
    ///
    /// Tokens must be closed in reverse order of issue; anything else is
    /// a programming error in the builder's caller.
    pub fn nest_end(&mut self, token: NestToken) -> Result<()> {
        if token.depth != self.depth {
            return Err(Error::NestOrder {
                depth: self.depth,
                token: token.depth,
            });
        }
        self.depth -= 1;
        let len = self.buf.len() - token.offset;
        let len_bytes = (len as u16).to_ne_bytes();
        self.buf[token.offset] = len_bytes[0];
        self.buf[token.offset + 1] = len_bytes[1];
        let aligned = nla_align(self.buf.len());
        self.buf.resize(aligned, 0);
        Ok(())
    }

    /// Set the sequence number.
    pub fn set_seq(&mut self, seq: u32) {
        let bytes = seq.to_ne_bytes();
        self.buf[8..12].copy_from_slice(&bytes);
    }

    /// Set the port ID.
    pub fn set_pid(&mut self, pid: u32) {
        let bytes = pid.to_ne_bytes();
        self.buf[12..16].copy_from_slice(&bytes);
    }

    /// Finalize and return the message bytes.
    pub fn finish(mut self) -> Vec<u8> {
        debug_assert_eq!(self.depth, 0, "unclosed nested attribute");
        let len = self.buf.len() as u32;
        let len_bytes = len.to_ne_bytes();
        self.buf[0..4].copy_from_slice(&len_bytes);
        self.buf
    }

    /// Get the current buffer for inspection.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::attr::{AttrIter, AttrTable, NLA_HDRLEN, get};
    use crate::netlink::message::NLM_F_REQUEST;

    #[test]
    fn test_simple_message() {
        let msg = MessageBuilder::new(16, NLM_F_REQUEST).finish();
        assert_eq!(msg.len(), NLMSG_HDRLEN);

        let header = NlMsgHdr::from_bytes(&msg).unwrap();
        assert_eq!(header.nlmsg_len as usize, NLMSG_HDRLEN);
        assert_eq!(header.nlmsg_type, 16);
        assert_eq!(header.nlmsg_flags, NLM_F_REQUEST);
    }

    #[test]
    fn test_attribute_roundtrip() {
        let mut builder = MessageBuilder::new(16, NLM_F_REQUEST);
        builder.append_attr_u32(1, 0x12345678).unwrap();
        builder.append_attr_u16_be(2, 443).unwrap();
        let msg = builder.finish();

        let table = AttrTable::parse(&msg[NLMSG_HDRLEN..], 4);
        assert_eq!(get::u32_ne(table.get(1).unwrap()).unwrap(), 0x12345678);
        assert_eq!(get::u16_be(table.get(2).unwrap()).unwrap(), 443);
    }

    #[test]
    fn test_header_length_tracks_payload() {
        let mut builder = MessageBuilder::new(16, NLM_F_REQUEST);
        builder.append_attr(1, &[0xab; 3]).unwrap(); // padded to 4
        let msg = builder.finish();

        let header = NlMsgHdr::from_bytes(&msg).unwrap();
        assert_eq!(header.nlmsg_len as usize, msg.len());
        assert_eq!(msg.len(), NLMSG_HDRLEN + NLA_HDRLEN + 4);
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut builder = MessageBuilder::with_capacity(16, NLM_F_REQUEST, 32);
        let err = builder.append_attr(1, &[0u8; 64]).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { .. }));
    }

    #[test]
    fn test_nest_roundtrip() {
        let mut builder = MessageBuilder::new(16, NLM_F_REQUEST);
        let outer = builder.nest_start(1).unwrap();
        builder.append_attr_u32(2, 100).unwrap();
        let inner = builder.nest_start(3).unwrap();
        builder.append_attr_u8(4, 7).unwrap();
        builder.nest_end(inner).unwrap();
        builder.nest_end(outer).unwrap();
        let msg = builder.finish();

        let header = NlMsgHdr::from_bytes(&msg).unwrap();
        assert_eq!(header.nlmsg_len as usize, msg.len());

        // Decode back the whole nested tree.
        let attrs: Vec<_> = AttrIter::new(&msg[NLMSG_HDRLEN..]).collect();
        assert_eq!(attrs.len(), 1);
        let (outer_id, outer_payload) = attrs[0];
        assert_eq!(outer_id, 1);

        let inner: Vec<_> = AttrIter::new(outer_payload).collect();
        assert_eq!(inner.len(), 2);
        assert_eq!(inner[0].0, 2);
        assert_eq!(get::u32_ne(inner[0].1).unwrap(), 100);
        assert_eq!(inner[1].0, 3);

        let innermost: Vec<_> = AttrIter::new(inner[1].1).collect();
        assert_eq!(innermost.len(), 1);
        assert_eq!(innermost[0].0, 4);
        assert_eq!(innermost[0].1, &[7]);
    }

    #[test]
    fn test_nest_out_of_order() {
        let mut builder = MessageBuilder::new(16, NLM_F_REQUEST);
        let outer = builder.nest_start(1).unwrap();
        let _inner = builder.nest_start(2).unwrap();
        let err = builder.nest_end(outer).unwrap_err();
        assert!(matches!(err, Error::NestOrder { depth: 2, token: 1 }));
    }
}
