//! Parsing trait and combinators for strongly-typed reply messages.
//!
//! Fixed headers are consumed with winnow combinators; the attribute run
//! that follows goes through [`AttrTable`](super::attr::AttrTable).

use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::take;

use super::error::{Error, Result};

/// Result type for winnow parsers.
pub type PResult<T> = core::result::Result<T, winnow::error::ErrMode<ContextError>>;

/// Trait for types parsed from a netlink message payload (the bytes
/// after the nlmsghdr).
pub trait FromNetlink: Sized {
    /// Parse from a mutable byte slice reference.
    /// The slice is advanced past the consumed bytes.
    fn parse(input: &mut &[u8]) -> PResult<Self>;

    /// Parse from a complete byte slice.
    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut input = data;
        Self::parse(&mut input).map_err(|e| Error::Parse(format!("{}", e)))
    }
}

/// Consume a fixed-size zerocopy wire struct from the input.
pub fn take_header<'a, T>(input: &mut &'a [u8]) -> PResult<T>
where
    T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable + Copy,
{
    let size = std::mem::size_of::<T>();
    let bytes: &[u8] = take(size).parse_next(input)?;
    T::read_from_bytes(bytes).map_err(|_| winnow::error::ErrMode::Cut(ContextError::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::types::neigh::NdMsg;

    #[test]
    fn test_take_header() {
        let msg = NdMsg::new().with_ifindex(3).with_state(0x80);
        let mut buf = msg.as_bytes().to_vec();
        buf.extend_from_slice(&[1, 2, 3, 4]); // trailing attribute bytes

        let mut input = buf.as_slice();
        let parsed: NdMsg = take_header(&mut input).unwrap();
        assert_eq!(parsed.ndm_ifindex, 3);
        assert_eq!(parsed.ndm_state, 0x80);
        assert_eq!(input, &[1, 2, 3, 4]);
    }
}
