#![allow(missing_docs)]

use std::mem::size_of;

use aseflat_common::error::{NeededBytes, WhileParsingType};
use aseflat_common::{ensure_attach, Result, ResultExt};
use bitflags::Flags;
use bytes::Buf;

use super::DecodeError;

/// A fixed-size little-endian value in the Aseprite format.
pub trait AsePrim: Sized {
    const ENCODED_LEN: u32;
    fn parse<B: Buf>(buf: B) -> Result<Self, DecodeError>;
}

/// Marker for [`bitflags`] types stored as their raw little-endian bits. Unknown bits are kept.
pub trait AseFlags: Flags {}

/// `LEN` bytes whose content is ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reserved<const LEN: u32>(());

/// A length-prefixed string: a `u16` byte count followed by UTF-8 bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AseString(pub String);

//
// AsePrim impls
//

macro_rules! ase_int {
    ($($ty:ty => $get_fun:ident),+ $(,)?) => {
        $(impl AsePrim for $ty {
            const ENCODED_LEN: u32 = size_of::<Self>() as u32;

            fn parse<B: Buf>(mut buf: B) -> Result<Self, DecodeError> {
                ensure_attach!(
                    buf.remaining() >= Self::ENCODED_LEN as usize,
                    DecodeError::Truncated,
                    WhileParsingType::new::<Self>(),
                );
                Ok(buf.$get_fun())
            }
        })+
    };
}

ase_int! {
    u8 => get_u8,
    u16 => get_u16_le,
    u32 => get_u32_le,
    i16 => get_i16_le,
}

impl<T: AseFlags> AsePrim for T
where
    T::Bits: TryFrom<u64>,
{
    const ENCODED_LEN: u32 = size_of::<<Self as Flags>::Bits>() as u32;

    fn parse<B: Buf>(mut buf: B) -> Result<Self, DecodeError> {
        ensure_attach!(
            buf.remaining() >= Self::ENCODED_LEN as usize,
            DecodeError::Truncated,
            WhileParsingType::new::<Self>(),
        );
        let value = buf.get_uint_le(Self::ENCODED_LEN as usize);
        let bits = value.try_into().unwrap_or_else(|_| unreachable!());
        Ok(Self::from_bits_retain(bits))
    }
}

//
// Reserved impls
//

impl<const LEN: u32> AsePrim for Reserved<LEN> {
    const ENCODED_LEN: u32 = LEN;

    fn parse<B: Buf>(mut buf: B) -> Result<Self, DecodeError> {
        ensure_attach!(
            buf.remaining() >= LEN as usize,
            DecodeError::Truncated,
            WhileParsingType::new::<Self>(),
        );
        buf.advance(LEN as usize);
        Ok(Self(()))
    }
}

//
// AseString impls
//

impl AseString {
    pub fn parse<B: Buf>(mut buf: B) -> Result<Self, DecodeError> {
        let len = u16::parse(&mut buf).while_parsing_type()?;
        let len = usize::from(len);
        ensure_attach!(
            buf.remaining() >= len,
            DecodeError::Truncated,
            NeededBytes((len - buf.remaining()) as u64),
            WhileParsingType::new::<Self>(),
        );
        let mut bytes = vec![0; len];
        buf.copy_to_slice(&mut bytes);
        // Names are advisory only, so invalid UTF-8 is replaced rather than rejected.
        Ok(Self(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn little_endian_ints() {
        let mut buf = &[0x34, 0x12, 0xfe, 0xff, 0x78, 0x56, 0x34, 0x12][..];
        assert_eq!(u16::parse(&mut buf).unwrap(), 0x1234);
        assert_eq!(i16::parse(&mut buf).unwrap(), -2);
        assert_eq!(u32::parse(&mut buf).unwrap(), 0x12345678);
    }

    #[test]
    fn truncated_int() {
        let err = u32::parse(&[1, 2, 3][..]).unwrap_err();
        assert_matches!(err.get_ref(), DecodeError::Truncated);
    }

    #[test]
    fn string() {
        let mut buf = &b"\x05\x00Layer rest"[..];
        assert_eq!(AseString::parse(&mut buf).unwrap(), AseString("Layer".into()));
        assert_eq!(buf, b" rest");
    }

    #[test]
    fn truncated_string() {
        let err = AseString::parse(&b"\x09\x00Layer"[..]).unwrap_err();
        assert_matches!(err.get_ref(), DecodeError::Truncated);
    }

    #[test]
    fn reserved_skips() {
        let mut buf = &[9, 9, 9, 1][..];
        Reserved::<3>::parse(&mut buf).unwrap();
        assert_eq!(buf, [1]);
    }
}
