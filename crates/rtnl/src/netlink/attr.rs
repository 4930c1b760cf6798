//! Netlink attribute (rtattr/nlattr) decoding.
//!
//! Attributes are 4-byte-aligned `{u16 len, u16 type, payload, padding}`
//! records; the length covers header plus unpadded payload. Nested
//! attributes are records whose payload is itself a run of records.

use super::error::{Error, Result};
use super::schema::{AttrKind, ByteOrder, Schema};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4;

/// Netlink attribute header (mirrors struct nlattr / struct rtattr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including header.
    pub nla_len: u16,
    /// Attribute type.
    pub nla_type: u16,
}

/// Attribute type flags.
pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

impl NlAttr {
    /// Create a new attribute header.
    pub fn new(attr_type: u16, data_len: usize) -> Self {
        Self {
            nla_len: (NLA_HDRLEN + data_len) as u16,
            nla_type: attr_type,
        }
    }

    /// Get the attribute type without flags.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    /// Check if this is a nested attribute.
    pub fn is_nested(&self) -> bool {
        self.nla_type & NLA_F_NESTED != 0
    }

    /// Get the payload length (total length minus header).
    pub fn payload_len(&self) -> usize {
        (self.nla_len as usize).saturating_sub(NLA_HDRLEN)
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// Iterator over netlink attributes in a buffer.
///
/// Malformed trailing records (a declared length overrunning the buffer)
/// terminate the iteration; the remainder is logged and dropped rather
/// than treated as fatal, since newer kernels may append attributes we
/// do not know how to frame.
pub struct AttrIter<'a> {
    data: &'a [u8],
}

impl<'a> AttrIter<'a> {
    /// Create a new attribute iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Check if there are no more attributes.
    pub fn is_empty(&self) -> bool {
        self.data.len() < NLA_HDRLEN
    }
}

impl<'a> Iterator for AttrIter<'a> {
    /// Returns (attribute type, payload data).
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < NLA_HDRLEN {
            return None;
        }

        let attr = match NlAttr::from_bytes(self.data) {
            Ok(a) => a,
            Err(_) => return None,
        };

        let len = attr.nla_len as usize;
        if len < NLA_HDRLEN || len > self.data.len() {
            tracing::debug!(
                declared = len,
                remaining = self.data.len(),
                "dropping malformed trailing attribute"
            );
            self.data = &[];
            return None;
        }

        let payload = &self.data[NLA_HDRLEN..len];
        let aligned_len = nla_align(len);

        // Move to next attribute
        if aligned_len >= self.data.len() {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some((attr.kind(), payload))
    }
}

/// Decoded attribute table for one nesting level.
///
/// Indexed by attribute id, bounded by the schema's `max_id`. The first
/// occurrence of an id wins; later duplicates are ignored (kernel dump
/// convention). Attributes above `max_id` are skipped, not fatal.
pub struct AttrTable<'a> {
    slots: Vec<Option<&'a [u8]>>,
}

impl<'a> AttrTable<'a> {
    /// Scan `data` into a table accepting ids up to and including `max_id`.
    pub fn parse(data: &'a [u8], max_id: u16) -> Self {
        let mut slots: Vec<Option<&'a [u8]>> = vec![None; max_id as usize + 1];
        for (id, payload) in AttrIter::new(data) {
            let Some(slot) = slots.get_mut(id as usize) else {
                tracing::debug!(id, max_id, "skipping unknown attribute");
                continue;
            };
            if slot.is_none() {
                *slot = Some(payload);
            }
        }
        Self { slots }
    }

    /// Scan `data` against a schema (bounded by the schema's max id).
    pub fn for_schema(data: &'a [u8], schema: &Schema) -> Self {
        Self::parse(data, schema.max_id)
    }

    /// Raw payload of an attribute, if present.
    pub fn get(&self, id: u16) -> Option<&'a [u8]> {
        self.slots.get(id as usize).copied().flatten()
    }

    /// Whether an attribute is present.
    pub fn contains(&self, id: u16) -> bool {
        self.get(id).is_some()
    }

    /// Number of present attributes.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Whether the table holds no attributes at all.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    /// Decode a scalar attribute through the schema registry.
    ///
    /// The schema decides the width and byte order, so call sites cannot
    /// disagree with the encoder about either. Returns `Ok(None)` when
    /// the attribute is absent.
    pub fn scalar(&self, schema: &Schema, id: u16) -> Result<Option<u64>> {
        let Some(payload) = self.get(id) else {
            return Ok(None);
        };
        let spec = schema.get(id).ok_or_else(|| {
            Error::InvalidAttribute(format!("attribute {} not in schema {}", id, schema.name))
        })?;
        let value = match (spec.kind, spec.order) {
            (AttrKind::U8, _) => get::u8(payload)? as u64,
            (AttrKind::U16, ByteOrder::Host) => get::u16_ne(payload)? as u64,
            (AttrKind::U16, ByteOrder::Network) => get::u16_be(payload)? as u64,
            (AttrKind::U32, ByteOrder::Host) => get::u32_ne(payload)? as u64,
            (AttrKind::U32, ByteOrder::Network) => get::u32_be(payload)? as u64,
            (kind, _) => {
                return Err(Error::InvalidAttribute(format!(
                    "attribute {} in schema {} is {:?}, not a scalar",
                    id, schema.name, kind
                )));
            }
        };
        Ok(Some(value))
    }
}

/// Helper functions for extracting typed values from attribute payloads.
pub mod get {
    use super::*;

    /// Extract a u8 value.
    pub fn u8(data: &[u8]) -> Result<u8> {
        if data.is_empty() {
            return Err(Error::InvalidAttribute("empty u8 attribute".into()));
        }
        Ok(data[0])
    }

    /// Extract a u16 value (native endian).
    pub fn u16_ne(data: &[u8]) -> Result<u16> {
        if data.len() < 2 {
            return Err(Error::InvalidAttribute("truncated u16 attribute".into()));
        }
        Ok(u16::from_ne_bytes([data[0], data[1]]))
    }

    /// Extract a u32 value (native endian).
    pub fn u32_ne(data: &[u8]) -> Result<u32> {
        if data.len() < 4 {
            return Err(Error::InvalidAttribute("truncated u32 attribute".into()));
        }
        Ok(u32::from_ne_bytes([data[0], data[1], data[2], data[3]]))
    }

    /// Extract a u16 value (big endian / network order).
    pub fn u16_be(data: &[u8]) -> Result<u16> {
        if data.len() < 2 {
            return Err(Error::InvalidAttribute("truncated u16 attribute".into()));
        }
        Ok(u16::from_be_bytes([data[0], data[1]]))
    }

    /// Extract a u32 value (big endian / network order).
    pub fn u32_be(data: &[u8]) -> Result<u32> {
        if data.len() < 4 {
            return Err(Error::InvalidAttribute("truncated u32 attribute".into()));
        }
        Ok(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
    }

    /// Extract a null-terminated string.
    pub fn string(data: &[u8]) -> Result<&str> {
        // Find null terminator or use whole buffer
        let len = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        std::str::from_utf8(&data[..len])
            .map_err(|e| Error::InvalidAttribute(format!("invalid UTF-8: {}", e)))
    }

    /// Extract bytes (no interpretation).
    pub fn bytes(data: &[u8]) -> &[u8] {
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr_bytes(id: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = NlAttr::new(id, payload.len()).as_bytes().to_vec();
        out.extend_from_slice(payload);
        out.resize(nla_align(out.len()), 0);
        out
    }

    #[test]
    fn test_iter_walks_records() {
        let mut buf = attr_bytes(1, &[0xaa]);
        buf.extend(attr_bytes(2, &[0x11, 0x22, 0x33, 0x44]));

        let attrs: Vec<_> = AttrIter::new(&buf).collect();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].0, 1);
        assert_eq!(attrs[0].1, &[0xaa]);
        assert_eq!(attrs[1].0, 2);
        assert_eq!(attrs[1].1, &[0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn test_iter_stops_on_overrun() {
        // Well-formed record followed by a record claiming more bytes
        // than remain.
        let mut buf = attr_bytes(1, &[0xaa]);
        buf.extend_from_slice(&[0xff, 0x00, 0x02, 0x00]); // len 255, id 2

        let attrs: Vec<_> = AttrIter::new(&buf).collect();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].0, 1);
    }

    #[test]
    fn test_table_first_occurrence_wins() {
        let mut buf = attr_bytes(3, &[1, 0]);
        buf.extend(attr_bytes(3, &[2, 0]));

        let table = AttrTable::parse(&buf, 8);
        assert_eq!(table.get(3), Some(&[1u8, 0][..]));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_table_skips_unknown_ids() {
        let mut buf = attr_bytes(2, &[7]);
        buf.extend(attr_bytes(200, &[1, 2, 3]));

        let table = AttrTable::parse(&buf, 10);
        assert!(table.contains(2));
        assert!(!table.contains(10));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_get_widths() {
        assert_eq!(get::u16_be(&[0x1f, 0x90]).unwrap(), 8080);
        assert_eq!(get::u16_ne(&8080u16.to_ne_bytes()).unwrap(), 8080);
        assert!(get::u32_ne(&[1, 2]).is_err());
        assert_eq!(get::string(b"eth0\0junk").unwrap(), "eth0");
    }
}
