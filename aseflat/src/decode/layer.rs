#![allow(missing_docs)]

use aseflat_common::Result;
use bytes::Buf;

use super::chunk_type::LAYER;
use super::error::DecodeResultExt;
use super::{AseFlags, AsePrim, AseString, ChunkType, DecodeError, HeaderFlags, ParseChunk, Reserved};
use crate::doc::{BlendMode, Layer, LayerFlags, LayerKind};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerChunk {
    pub flags: LayerFlags,
    pub layer_type: u16,
    pub child_level: u16,
    pub blend_mode: u16,
    pub opacity: u8,
    pub name: String,
}

//
// LayerChunk impls
//

impl LayerChunk {
    pub const TYPE_IMAGE: u16 = 0;
    pub const TYPE_GROUP: u16 = 1;
    pub const TYPE_TILEMAP: u16 = 2;

    pub fn kind(&self) -> Option<LayerKind> {
        match self.layer_type {
            Self::TYPE_IMAGE => Some(LayerKind::Image),
            Self::TYPE_GROUP => Some(LayerKind::Group),
            Self::TYPE_TILEMAP => Some(LayerKind::Tilemap),
            _ => None,
        }
    }

    /// Build the document layer for this chunk. Layer opacity only counts when the file header says it is valid;
    /// otherwise layers are opaque.
    pub fn to_layer(&self, header_flags: HeaderFlags, parent: Option<usize>) -> Layer {
        let opacity_valid = match self.kind() {
            Some(LayerKind::Group) => header_flags.contains(HeaderFlags::GROUP_OPACITY_VALID),
            _ => header_flags.contains(HeaderFlags::LAYER_OPACITY_VALID),
        };
        Layer {
            name: self.name.clone(),
            kind: self.kind().unwrap_or(LayerKind::Image),
            flags: self.flags,
            opacity: if opacity_valid { self.opacity } else { u8::MAX },
            blend_mode: BlendMode::from_code(self.blend_mode).unwrap_or_default(),
            parent,
        }
    }
}

impl ParseChunk for LayerChunk {
    const TYPE: ChunkType = LAYER;

    fn parse<B: Buf>(mut buf: B) -> Result<Self, DecodeError> {
        let flags = LayerFlags::parse(&mut buf).while_parsing_field(Self::TYPE, "flags")?;
        let layer_type = u16::parse(&mut buf).while_parsing_field(Self::TYPE, "layer_type")?;
        let child_level = u16::parse(&mut buf).while_parsing_field(Self::TYPE, "child_level")?;
        Reserved::<4>::parse(&mut buf).while_parsing_field(Self::TYPE, "default_size")?;
        let blend_mode = u16::parse(&mut buf).while_parsing_field(Self::TYPE, "blend_mode")?;
        let opacity = u8::parse(&mut buf).while_parsing_field(Self::TYPE, "opacity")?;
        Reserved::<3>::parse(&mut buf).while_parsing_field(Self::TYPE, "reserved")?;
        let AseString(name) = AseString::parse(&mut buf).while_parsing_field(Self::TYPE, "name")?;
        // Tilemap layers carry a tileset index and, optionally, a UUID afterwards; neither affects flattening.
        Ok(Self { flags, layer_type, child_level, blend_mode, opacity, name })
    }
}

impl AseFlags for LayerFlags {}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;
    use crate::util::test::write_test_layer;

    #[test]
    fn parse_layer() {
        let mut data = vec![];
        write_test_layer(&mut data, 0x0009, LayerChunk::TYPE_IMAGE, 1, 2, 128, "Background");
        let chunk = LayerChunk::parse(&data[..]).unwrap();
        assert_eq!(chunk.flags, LayerFlags::VISIBLE | LayerFlags::BACKGROUND);
        assert_eq!(chunk.kind(), Some(LayerKind::Image));
        assert_eq!(chunk.child_level, 1);
        assert_eq!(chunk.name, "Background");

        let layer = chunk.to_layer(HeaderFlags::LAYER_OPACITY_VALID, Some(0));
        assert_eq!(layer.blend_mode, BlendMode::Screen);
        assert_eq!(layer.opacity, 128);
        assert_eq!(layer.parent, Some(0));
    }

    #[test]
    fn opacity_ignored_without_header_flag() {
        let mut data = vec![];
        write_test_layer(&mut data, 0x0001, LayerChunk::TYPE_IMAGE, 0, 0, 10, "Layer 1");
        let layer = LayerChunk::parse(&data[..]).unwrap().to_layer(HeaderFlags::empty(), None);
        assert_eq!(layer.opacity, 255);
    }

    #[test]
    fn unknown_blend_mode_is_normal() {
        let mut data = vec![];
        write_test_layer(&mut data, 0x0001, LayerChunk::TYPE_IMAGE, 0, 99, 255, "Layer 1");
        let layer = LayerChunk::parse(&data[..]).unwrap().to_layer(HeaderFlags::empty(), None);
        assert_eq!(layer.blend_mode, BlendMode::Normal);
    }

    #[test]
    fn truncated_name() {
        let mut data = vec![];
        write_test_layer(&mut data, 0x0001, LayerChunk::TYPE_GROUP, 0, 0, 255, "Group");
        let err = LayerChunk::parse(&data[..data.len() - 1]).unwrap_err();
        assert_matches!(err.get_ref(), DecodeError::Truncated);
    }
}
