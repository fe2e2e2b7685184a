#![allow(missing_docs)]

use aseflat_common::{ensure_attach, Result};
use bytes::Buf;

use super::chunk_type::{OLD_PALETTE, OLD_PALETTE_64, PALETTE};
use super::error::{DecodeResultExt, WhileParsingChunk};
use super::{AsePrim, AseString, ChunkType, DecodeError, ParseChunk, Reserved};
use crate::doc::Palette;

/// A palette chunk, setting entries `first..=last` and resizing the palette to `size`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaletteChunk {
    pub size: u32,
    pub first: u32,
    pub entries: Vec<[u8; 4]>,
}

/// A pre-1.2 palette chunk: packets of opaque RGB colors, each after skipping some entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OldPaletteChunk {
    pub packets: Vec<(u8, Vec<[u8; 3]>)>,
}

/// The 6-bit-per-channel flavor of [`OldPaletteChunk`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OldPalette64Chunk(pub OldPaletteChunk);

/// Palettes beyond this many entries are not meaningful for 8-bit indices.
const MAX_PALETTE_LEN: u32 = 0x10000;

//
// PaletteChunk impls
//

impl PaletteChunk {
    const ENTRY_HAS_NAME: u16 = 0x0001;

    pub fn apply(&self, palette: &mut Palette) {
        palette.resize(self.size as usize);
        for (index, color) in (self.first as usize..).zip(&self.entries) {
            palette.set(index, *color);
        }
    }
}

impl ParseChunk for PaletteChunk {
    const TYPE: ChunkType = PALETTE;

    fn parse<B: Buf>(mut buf: B) -> Result<Self, DecodeError> {
        let size = u32::parse(&mut buf).while_parsing_field(Self::TYPE, "size")?;
        let first = u32::parse(&mut buf).while_parsing_field(Self::TYPE, "first")?;
        let last = u32::parse(&mut buf).while_parsing_field(Self::TYPE, "last")?;
        Reserved::<8>::parse(&mut buf).while_parsing_field(Self::TYPE, "reserved")?;
        ensure_attach!(
            first <= last && last < size.max(1) && size <= MAX_PALETTE_LEN,
            DecodeError::InvalidInput,
            "bad palette range",
            WhileParsingChunk(Self::TYPE),
        );

        let mut entries = Vec::with_capacity((last - first + 1) as usize);
        for _ in first..=last {
            let flags = u16::parse(&mut buf).while_parsing_field(Self::TYPE, "entry_flags")?;
            let mut color = [0; 4];
            for channel in &mut color {
                *channel = u8::parse(&mut buf).while_parsing_field(Self::TYPE, "entry_color")?;
            }
            if flags & Self::ENTRY_HAS_NAME != 0 {
                AseString::parse(&mut buf).while_parsing_field(Self::TYPE, "entry_name")?;
            }
            entries.push(color);
        }
        Ok(Self { size, first, entries })
    }
}

//
// OldPaletteChunk impls
//

impl OldPaletteChunk {
    fn parse_packets<B: Buf>(mut buf: B, chunk_type: ChunkType) -> Result<Self, DecodeError> {
        let packet_count = u16::parse(&mut buf).while_parsing_field(chunk_type, "packet_count")?;
        let mut packets = Vec::with_capacity(usize::from(packet_count));
        for _ in 0..packet_count {
            let skip = u8::parse(&mut buf).while_parsing_field(chunk_type, "skip")?;
            let count = match u8::parse(&mut buf).while_parsing_field(chunk_type, "count")? {
                0 => 256,
                count => usize::from(count),
            };
            let mut colors = Vec::with_capacity(count);
            for _ in 0..count {
                let mut color = [0; 3];
                for channel in &mut color {
                    *channel = u8::parse(&mut buf).while_parsing_field(chunk_type, "color")?;
                }
                colors.push(color);
            }
            packets.push((skip, colors));
        }
        Ok(Self { packets })
    }

    pub fn apply(&self, palette: &mut Palette) {
        self.apply_scaled(palette, |channel| channel)
    }

    fn apply_scaled(&self, palette: &mut Palette, scale: impl Fn(u8) -> u8) {
        let mut index = 0;
        for (skip, colors) in &self.packets {
            index += usize::from(*skip);
            for &[r, g, b] in colors {
                palette.set(index, [scale(r), scale(g), scale(b), u8::MAX]);
                index += 1;
            }
        }
    }
}

impl ParseChunk for OldPaletteChunk {
    const TYPE: ChunkType = OLD_PALETTE;

    fn parse<B: Buf>(buf: B) -> Result<Self, DecodeError> {
        Self::parse_packets(buf, Self::TYPE)
    }
}

//
// OldPalette64Chunk impls
//

impl OldPalette64Chunk {
    pub fn apply(&self, palette: &mut Palette) {
        // Expand 0..=63 to 0..=255.
        self.0.apply_scaled(palette, |channel| {
            let channel = channel & 0x3f;
            (channel << 2) | (channel >> 4)
        })
    }
}

impl ParseChunk for OldPalette64Chunk {
    const TYPE: ChunkType = OLD_PALETTE_64;

    fn parse<B: Buf>(buf: B) -> Result<Self, DecodeError> {
        OldPaletteChunk::parse_packets(buf, Self::TYPE).map(Self)
    }
}
