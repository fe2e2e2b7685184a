#![allow(missing_docs)]

use std::io::Read;

use aseflat_common::error::NeededBytes;
use aseflat_common::{bail_attach, ensure_attach, report_attach, Result};
use bytes::{Buf, Bytes};
use libflate::zlib;

use super::chunk_type::CEL;
use super::error::{DecodeResultExt, WhileParsingChunk};
use super::{AsePrim, ChunkType, DecodeError, ParseChunk, Reserved};
use crate::doc::{ColorMode, Image};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CelChunk {
    pub layer_index: u16,
    pub x: i16,
    pub y: i16,
    pub opacity: u8,
    pub content: CelContent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CelContent {
    /// Uncompressed pixels, row-major.
    Raw { width: u16, height: u16, data: Bytes },
    /// The same cel as this layer has in another frame.
    Linked { frame: u16 },
    /// zlib-compressed pixels, row-major.
    Compressed { width: u16, height: u16, data: Bytes },
    /// A compressed tilemap; tilesets are not rendered.
    Tilemap,
    Unknown(u16),
}

//
// CelChunk impls
//

impl CelChunk {
    pub const TYPE_RAW: u16 = 0;
    pub const TYPE_LINKED: u16 = 1;
    pub const TYPE_COMPRESSED: u16 = 2;
    pub const TYPE_TILEMAP: u16 = 3;
}

impl ParseChunk for CelChunk {
    const TYPE: ChunkType = CEL;

    fn parse<B: Buf>(mut buf: B) -> Result<Self, DecodeError> {
        let layer_index = u16::parse(&mut buf).while_parsing_field(Self::TYPE, "layer_index")?;
        let x = i16::parse(&mut buf).while_parsing_field(Self::TYPE, "x")?;
        let y = i16::parse(&mut buf).while_parsing_field(Self::TYPE, "y")?;
        let opacity = u8::parse(&mut buf).while_parsing_field(Self::TYPE, "opacity")?;
        let cel_type = u16::parse(&mut buf).while_parsing_field(Self::TYPE, "cel_type")?;
        let _z_index = i16::parse(&mut buf).while_parsing_field(Self::TYPE, "z_index")?;
        Reserved::<5>::parse(&mut buf).while_parsing_field(Self::TYPE, "reserved")?;

        let content = match cel_type {
            Self::TYPE_RAW | Self::TYPE_COMPRESSED => {
                let width = u16::parse(&mut buf).while_parsing_field(Self::TYPE, "width")?;
                let height = u16::parse(&mut buf).while_parsing_field(Self::TYPE, "height")?;
                let data = buf.copy_to_bytes(buf.remaining());
                match cel_type {
                    Self::TYPE_RAW => CelContent::Raw { width, height, data },
                    _ => CelContent::Compressed { width, height, data },
                }
            }
            Self::TYPE_LINKED => {
                let frame = u16::parse(&mut buf).while_parsing_field(Self::TYPE, "linked_frame")?;
                CelContent::Linked { frame }
            }
            Self::TYPE_TILEMAP => CelContent::Tilemap,
            other => CelContent::Unknown(other),
        };
        Ok(Self { layer_index, x, y, opacity, content })
    }
}

//
// CelContent impls
//

impl CelContent {
    /// Returns the pixel count of the image this cel carries, if it carries one.
    pub fn pixel_count(&self) -> Option<u64> {
        match self {
            CelContent::Raw { width, height, .. } | CelContent::Compressed { width, height, .. } => {
                Some(u64::from(*width) * u64::from(*height))
            }
            _ => None,
        }
    }

    /// Decode the pixels of a raw or compressed cel into an [`Image`] in `mode`.
    ///
    /// Raw data longer than the image is truncated to it, matching what Aseprite writes for padded chunks.
    pub fn decode_image(&self, mode: ColorMode) -> Result<Option<Image>, DecodeError> {
        let (width, height, data, compressed) = match self {
            CelContent::Raw { width, height, data } => (*width, *height, data, false),
            CelContent::Compressed { width, height, data } => (*width, *height, data, true),
            _ => return Ok(None),
        };
        let (width, height) = (u32::from(width), u32::from(height));
        let Some(expected_len) = Image::expected_len(width, height, mode) else {
            bail_attach!(DecodeError::InvalidInput, "cel size overflow", WhileParsingChunk(CEL));
        };

        let pixels = if compressed {
            inflate(data, expected_len).while_parsing_chunk(CEL)?
        } else {
            ensure_attach!(
                data.len() >= expected_len,
                DecodeError::Truncated,
                NeededBytes((expected_len - data.len()) as u64),
                "while reading raw cel pixels",
            );
            data.slice(..expected_len)
        };
        Ok(Some(Image::new(width, height, mode, pixels)))
    }
}

fn inflate(data: &Bytes, expected_len: usize) -> Result<Bytes, DecodeError> {
    let mut decoder = zlib::Decoder::new(&data[..])
        .map_err(|err| report_attach!(DecodeError::InvalidImageData, format!("bad zlib header: {err}")))?;
    let mut pixels = Vec::new();
    // One extra byte lets an oversized stream be detected without inflating all of it.
    (&mut decoder)
        .take(expected_len as u64 + 1)
        .read_to_end(&mut pixels)
        .map_err(|err| report_attach!(DecodeError::InvalidImageData, format!("inflate failed: {err}")))?;
    ensure_attach!(
        pixels.len() == expected_len,
        DecodeError::InvalidImageData,
        format!("inflated to {} bytes, expected {expected_len}", pixels.len()),
    );
    Ok(pixels.into())
}
