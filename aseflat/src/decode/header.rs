#![allow(missing_docs)]

use std::fmt;

use aseflat_common::error::WhileParsingType;
use aseflat_common::{ensure_attach, Result, ResultExt};
use bytes::Buf;

use super::{AseFlags, AsePrim, DecodeError, Reserved};

/// The 128-byte header at the start of every Aseprite file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AseHeader {
    pub file_size: u32,
    pub frames: u16,
    pub width: u16,
    pub height: u16,
    pub color_depth: u16,
    pub flags: HeaderFlags,
    pub transparent_index: u8,
    pub num_colors: u16,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct HeaderFlags: u32 {
        const LAYER_OPACITY_VALID = 0x0001;
        const GROUP_OPACITY_VALID = 0x0002;
        const LAYERS_HAVE_UUID = 0x0004;
    }
}

/// The 16-byte header at the start of every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub size: u32,
    pub duration_ms: u16,
    pub chunk_count: u32,
}

/// The 6-byte header at the start of every chunk. `size` counts the header itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    pub size: u32,
    pub chunk_type: ChunkType,
}

/// The type code of a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkType(pub u16);

macro_rules! chunk_type {
    ($($code:ident = $value:literal),+ $(,)?) => {
        pub mod chunk_type {
            use super::ChunkType;
            $(
                #[doc = concat!("The `", stringify!($code), "` chunk type.")]
                pub const $code: ChunkType = ChunkType($value);
            )+

            pub(super) fn name(chunk_type: ChunkType) -> Option<&'static str> {
                match chunk_type {
                    $($code => Some(stringify!($code)),)+
                    _ => None,
                }
            }
        }
    };
}

chunk_type! {
    OLD_PALETTE = 0x0004,
    OLD_PALETTE_64 = 0x0011,
    LAYER = 0x2004,
    CEL = 0x2005,
    CEL_EXTRA = 0x2006,
    COLOR_PROFILE = 0x2007,
    EXTERNAL_FILES = 0x2008,
    MASK = 0x2016,
    PATH = 0x2017,
    TAGS = 0x2018,
    PALETTE = 0x2019,
    USER_DATA = 0x2020,
    SLICE = 0x2022,
    TILESET = 0x2023,
}

/// The chunk type used to label errors in the file and frame headers, which are not chunks themselves.
pub const HEADER: ChunkType = ChunkType(0);

//
// AseHeader impls
//

impl AseHeader {
    pub const MAGIC: u16 = 0xA5E0;

    /// Offset of [`MAGIC`](Self::MAGIC) from the start of the file.
    pub const MAGIC_OFFSET: usize = 4;
}

impl AsePrim for AseHeader {
    const ENCODED_LEN: u32 = 128;

    fn parse<B: Buf>(mut buf: B) -> Result<Self, DecodeError> {
        ensure_attach!(
            buf.remaining() >= Self::ENCODED_LEN as usize,
            DecodeError::Truncated,
            WhileParsingType::new::<Self>(),
        );
        let file_size = u32::parse(&mut buf)?;
        let magic = u16::parse(&mut buf)?;
        ensure_attach!(
            magic == Self::MAGIC,
            DecodeError::InvalidHeader,
            "not an Aseprite file",
            WhileParsingType::new::<Self>(),
        );
        let frames = u16::parse(&mut buf)?;
        let width = u16::parse(&mut buf)?;
        let height = u16::parse(&mut buf)?;
        let color_depth = u16::parse(&mut buf)?;
        let flags = HeaderFlags::parse(&mut buf)?;
        let _speed = u16::parse(&mut buf)?;
        Reserved::<8>::parse(&mut buf)?;
        let transparent_index = u8::parse(&mut buf)?;
        Reserved::<3>::parse(&mut buf)?;
        let num_colors = u16::parse(&mut buf)?;
        // pixel ratio, grid position and grid size
        Reserved::<10>::parse(&mut buf)?;
        Reserved::<84>::parse(&mut buf)?;
        Ok(Self { file_size, frames, width, height, color_depth, flags, transparent_index, num_colors })
    }
}

impl AseFlags for HeaderFlags {}

//
// FrameHeader impls
//

impl FrameHeader {
    pub const MAGIC: u16 = 0xF1FA;
}

impl AsePrim for FrameHeader {
    const ENCODED_LEN: u32 = 16;

    fn parse<B: Buf>(mut buf: B) -> Result<Self, DecodeError> {
        let size = u32::parse(&mut buf).while_parsing_type()?;
        let magic = u16::parse(&mut buf).while_parsing_type()?;
        ensure_attach!(
            magic == Self::MAGIC,
            DecodeError::InvalidInput,
            "bad frame magic number",
            WhileParsingType::new::<Self>(),
        );
        let old_chunk_count = u16::parse(&mut buf).while_parsing_type()?;
        let duration_ms = u16::parse(&mut buf).while_parsing_type()?;
        Reserved::<2>::parse(&mut buf).while_parsing_type()?;
        let new_chunk_count = u32::parse(&mut buf).while_parsing_type()?;
        let chunk_count = match (old_chunk_count, new_chunk_count) {
            (old, 0) => u32::from(old),
            (_, new) => new,
        };
        ensure_attach!(
            size >= Self::ENCODED_LEN,
            DecodeError::InvalidInput,
            "frame smaller than its header",
            WhileParsingType::new::<Self>(),
        );
        Ok(Self { size, duration_ms, chunk_count })
    }
}

//
// ChunkHeader impls
//

impl AsePrim for ChunkHeader {
    const ENCODED_LEN: u32 = 6;

    fn parse<B: Buf>(mut buf: B) -> Result<Self, DecodeError> {
        let size = u32::parse(&mut buf).while_parsing_type()?;
        let chunk_type = ChunkType(u16::parse(&mut buf).while_parsing_type()?);
        ensure_attach!(
            size >= Self::ENCODED_LEN,
            DecodeError::InvalidInput,
            "chunk smaller than its header",
            WhileParsingType::new::<Self>(),
        );
        Ok(Self { size, chunk_type })
    }
}

impl ChunkHeader {
    /// The length of the chunk's data, excluding the header.
    pub fn data_len(&self) -> u32 {
        self.size - Self::ENCODED_LEN
    }
}

//
// ChunkType impls
//

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chunk_type::name(*self) {
            Some(name) => write!(f, "`{name}` (0x{:04x})", self.0),
            None => write!(f, "0x{:04x}", self.0),
        }
    }
}
