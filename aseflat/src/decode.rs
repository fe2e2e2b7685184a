//! The Aseprite container decoder.

mod cel;
pub mod error;
mod header;
mod integers;
mod layer;
mod palette;
mod reader;

use std::num::NonZeroU32;

use aseflat_common::error::WhileParsingType;
use aseflat_common::{bail_attach, ensure_attach, report_attach, FileInterface, InputSpan};
use bytes::Buf;

use crate::delegate::DecodeDelegate;
use crate::doc::{BlendMode, Cel, ColorMode, Frame, LayerKind, Sprite};
use crate::Error;

use self::chunk_type::{CEL, LAYER, OLD_PALETTE, OLD_PALETTE_64, PALETTE};
use self::error::{FrameResultExt, WhileParsingChunk};

pub use self::cel::{CelChunk, CelContent};
pub use self::error::DecodeError;
pub use self::header::{chunk_type, AseHeader, ChunkHeader, ChunkType, FrameHeader, HeaderFlags, HEADER};
pub use self::integers::{AseFlags, AsePrim, AseString, Reserved};
pub use self::layer::LayerChunk;
pub use self::palette::{OldPalette64Chunk, OldPaletteChunk, PaletteChunk};
pub use self::reader::AseReader;

/// The body of a chunk with a fixed type code.
pub trait ParseChunk: Sized {
    /// The chunk type code this body is stored under.
    const TYPE: ChunkType;

    /// Parse the chunk body, excluding the 6-byte chunk header.
    fn parse<B: Buf>(buf: B) -> aseflat_common::Result<Self, DecodeError>;
}

/// Parses a container from a [`FileInterface`], reporting to a [`DecodeDelegate`].
///
/// On success the parsed [`Sprite`] has been passed to [`DecodeDelegate::on_sprite`]; it is never returned directly.
pub trait ContainerDecoder {
    /// Decode the container starting at the current position of `input`.
    fn decode(&self, input: &mut dyn FileInterface, delegate: &mut dyn DecodeDelegate) -> Result<(), Error>;
}

/// The default limit on canvas and cel sizes, in pixels.
pub const DEFAULT_MAX_PIXELS: u64 = 1 << 28;

/// A [`ContainerDecoder`] for Aseprite `.ase`/`.aseprite` files.
#[derive(Clone, Copy, Debug)]
pub struct AseDecoder {
    max_pixels: u64,
}

/// Per-file state carried from one chunk to the next.
struct DecodeContext {
    header: AseHeader,
    color_mode: ColorMode,
    /// Indices of the group layers enclosing the next layer, outermost first.
    groups: Vec<usize>,
    seen_new_palette: bool,
}

//
// AseDecoder impls
//

impl AseDecoder {
    /// A decoder rejecting canvases and cels larger than `max_pixels`.
    pub fn new(max_pixels: u64) -> Self {
        Self { max_pixels }
    }

    fn decode_sprite(&self, input: &mut dyn FileInterface, delegate: &mut dyn DecodeDelegate) -> Result<Sprite, Error> {
        let mut reader = AseReader::new(input);

        let start = reader.position()?;
        let header: AseHeader = reader.read_prim()?;
        log::info!(
            "header @ 0x{start:08x}: {}x{} depth {}, {} frames",
            header.width,
            header.height,
            header.color_depth,
            header.frames,
        );

        let color_mode = ColorMode::from_depth(header.color_depth).ok_or_else(|| {
            report_attach!(
                DecodeError::UnsupportedColorDepth(header.color_depth),
                WhileParsingType::new::<AseHeader>()
            )
        })?;
        let (Some(width), Some(height)) = (NonZeroU32::new(header.width.into()), NonZeroU32::new(header.height.into()))
        else {
            bail_attach!(DecodeError::InvalidHeader, "zero canvas size", WhileParsingType::new::<AseHeader>());
        };
        let canvas_pixels = u64::from(width.get()) * u64::from(height.get());
        ensure_attach!(
            canvas_pixels <= self.max_pixels,
            DecodeError::TooLarge(canvas_pixels, self.max_pixels),
            WhileParsingType::new::<AseHeader>(),
        );

        let mut sprite = Sprite::new(width, height, color_mode);
        if color_mode == ColorMode::Indexed {
            sprite.set_transparent_index(header.transparent_index);
            let num_colors = match header.num_colors {
                0 => 256,
                num_colors => num_colors,
            };
            sprite.palette_mut().resize(num_colors.into());
        }

        let mut context = DecodeContext { header, color_mode, groups: Vec::new(), seen_new_palette: false };
        let mut frame_start = start + u64::from(AseHeader::ENCODED_LEN);
        for frame_index in 0..u32::from(header.frames) {
            if !delegate.decode_one_frame() {
                log::info!("decoding stopped after {frame_index} of {} frames", header.frames);
                break;
            }
            let frame_span = self
                .decode_frame(&mut reader, &mut context, &mut sprite, delegate, frame_start)
                .while_parsing_frame(frame_index)?;
            frame_start = frame_span.end();
        }
        Ok(sprite)
    }

    fn decode_frame(
        &self,
        reader: &mut AseReader<'_>,
        context: &mut DecodeContext,
        sprite: &mut Sprite,
        delegate: &mut dyn DecodeDelegate,
        frame_start: u64,
    ) -> Result<InputSpan, Error> {
        if reader.position()? != frame_start {
            reader.seek(frame_start)?;
        }
        let frame_header: FrameHeader = reader.read_prim()?;
        let frame_span = InputSpan { offset: frame_start, len: frame_header.size.into() };
        log::info!(
            "frame @ 0x{frame_start:08x}: {} bytes, {} chunks",
            frame_header.size,
            frame_header.chunk_count,
        );

        let mut frame = Frame::new(frame_header.duration_ms);
        let frame_index = sprite.frame_count();
        for _ in 0..frame_header.chunk_count {
            let (chunk_type, chunk_span) = reader.read_chunk_header()?;
            ensure_attach!(
                chunk_span.end() <= frame_span.end(),
                DecodeError::InvalidInput,
                "chunk extends past the end of its frame",
                WhileParsingChunk(chunk_type),
            );
            log::info!("{chunk_type} @ 0x{:08x}: {} bytes", chunk_span.offset, chunk_span.len);
            match chunk_type {
                LAYER => Self::decode_layer(reader, context, sprite, delegate)?,
                CEL => self.decode_cel(reader, context, sprite, &mut frame, frame_index, delegate)?,
                PALETTE => {
                    let palette: PaletteChunk = reader.parse_chunk()?;
                    palette.apply(sprite.palette_mut());
                    context.seen_new_palette = true;
                }
                // Files written since the new palette chunk was introduced carry both; the new one wins.
                OLD_PALETTE | OLD_PALETTE_64 if context.seen_new_palette => reader.skip_chunk()?,
                OLD_PALETTE => reader.parse_chunk::<OldPaletteChunk>()?.apply(sprite.palette_mut()),
                OLD_PALETTE_64 => reader.parse_chunk::<OldPalette64Chunk>()?.apply(sprite.palette_mut()),
                _ => {
                    log::debug!("skipping {chunk_type} @ 0x{:08x}: {} bytes", chunk_span.offset, chunk_span.len);
                    reader.skip_chunk()?;
                }
            }
        }
        sprite.add_frame(frame);
        Ok(frame_span)
    }

    fn decode_layer(
        reader: &mut AseReader<'_>,
        context: &mut DecodeContext,
        sprite: &mut Sprite,
        delegate: &mut dyn DecodeDelegate,
    ) -> Result<(), Error> {
        let chunk: LayerChunk = reader.parse_chunk()?;
        let level = usize::from(chunk.child_level);
        ensure_attach!(
            level <= context.groups.len(),
            DecodeError::InvalidInput,
            "layer nested below a group that does not exist",
            WhileParsingChunk(LAYER),
        );
        let parent = match level {
            0 => None,
            _ => Some(context.groups[level - 1]),
        };
        context.groups.truncate(level);

        match chunk.kind() {
            Some(LayerKind::Image | LayerKind::Group) => (),
            Some(LayerKind::Tilemap) => {
                delegate.incompatibility_error(&format!("tilemap layer `{}` is not rendered", chunk.name))
            }
            None => delegate.incompatibility_error(&format!(
                "layer `{}` has unknown type {}; treating it as an image layer",
                chunk.name, chunk.layer_type
            )),
        }
        if BlendMode::from_code(chunk.blend_mode).is_none() {
            delegate.incompatibility_error(&format!(
                "layer `{}` has unknown blend mode {}; using normal",
                chunk.name, chunk.blend_mode
            ));
        }

        let layer = chunk.to_layer(context.header.flags, parent);
        let is_group = layer.is_group();
        let index = sprite.add_layer(layer);
        if is_group {
            context.groups.push(index);
        }
        Ok(())
    }

    fn decode_cel(
        &self,
        reader: &mut AseReader<'_>,
        context: &DecodeContext,
        sprite: &Sprite,
        frame: &mut Frame,
        frame_index: u32,
        delegate: &mut dyn DecodeDelegate,
    ) -> Result<(), Error> {
        let chunk: CelChunk = reader.parse_chunk()?;
        let layer = usize::from(chunk.layer_index);
        ensure_attach!(
            layer < sprite.layers().len(),
            DecodeError::InvalidInput,
            format!("cel references unknown layer {layer}"),
            WhileParsingChunk(CEL),
        );

        let cel = match &chunk.content {
            CelContent::Linked { frame: linked_frame } => {
                let linked_frame = u32::from(*linked_frame);
                ensure_attach!(
                    linked_frame < frame_index,
                    DecodeError::InvalidInput,
                    format!("cel in frame {frame_index} links to frame {linked_frame}"),
                    WhileParsingChunk(CEL),
                );
                let Some(linked) = sprite.cel(layer, linked_frame) else {
                    bail_attach!(
                        DecodeError::InvalidInput,
                        format!("cel links to frame {linked_frame}, which has no cel on layer {layer}"),
                        WhileParsingChunk(CEL),
                    );
                };
                linked.clone()
            }
            CelContent::Tilemap => {
                delegate.incompatibility_error(&format!("tilemap cel on layer {layer} is not rendered"));
                return Ok(());
            }
            CelContent::Unknown(cel_type) => {
                delegate.incompatibility_error(&format!("cel on layer {layer} has unknown type {cel_type}"));
                return Ok(());
            }
            content @ (CelContent::Raw { .. } | CelContent::Compressed { .. }) => {
                let pixels = content.pixel_count().unwrap_or_default();
                ensure_attach!(
                    pixels <= self.max_pixels,
                    DecodeError::TooLarge(pixels, self.max_pixels),
                    WhileParsingChunk(CEL),
                );
                let Some(image) = content.decode_image(context.color_mode)? else {
                    return Ok(());
                };
                Cel { x: chunk.x.into(), y: chunk.y.into(), opacity: chunk.opacity, image }
            }
        };
        frame.set_cel(layer, cel);
        Ok(())
    }
}

impl Default for AseDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PIXELS)
    }
}

impl ContainerDecoder for AseDecoder {
    fn decode(&self, input: &mut dyn FileInterface, delegate: &mut dyn DecodeDelegate) -> Result<(), Error> {
        match self.decode_sprite(input, delegate) {
            Ok(sprite) => {
                delegate.on_sprite(sprite);
                Ok(())
            }
            Err(err) => {
                delegate.error(&err.to_string());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;
    use crate::delegate::{Diagnostic, SpriteDelegate};
    use crate::doc::LayerFlags;
    use crate::util::test::{test_ase, test_frame, test_header, TestCelData};

    fn rgba(pixels: &[[u8; 4]]) -> Vec<u8> {
        pixels.concat()
    }

    #[test]
    fn minimal() {
        let frame = test_frame()
            .add_layer(1, LayerChunk::TYPE_IMAGE, 0, 0, 255, "Layer 1")
            .add_cel(0, 1, 2, 255, TestCelData::Raw(1, 1, rgba(&[[1, 2, 3, 4]])))
            .clone();
        let sprite = test_ase().add_frame(frame).build().decode().unwrap();
        assert_eq!((sprite.width().get(), sprite.height().get()), (4, 4));
        assert_eq!(sprite.color_mode(), ColorMode::Rgb);
        assert_eq!(sprite.layers().len(), 1);
        assert_eq!(sprite.frame_count(), 1);
        let cel = sprite.cel(0, 0).unwrap();
        assert_eq!((cel.x, cel.y), (1, 2));
        assert_eq!(&cel.image.pixels[..], [1, 2, 3, 4]);
    }

    #[test]
    fn bad_magic() {
        let test = test_ase().header(test_header().magic(0x1234).clone()).build();
        assert_matches!(test.decode(), Err(Error::Decode(err)) => {
            assert_matches!(err.get_ref(), DecodeError::InvalidHeader, "{err:?}");
        });
    }

    #[test]
    fn unsupported_depth() {
        let test = test_ase().header(test_header().color_depth(24).clone()).build();
        assert_matches!(test.decode(), Err(Error::Decode(err)) => {
            assert_matches!(err.get_ref(), DecodeError::UnsupportedColorDepth(24), "{err:?}");
        });
    }

    #[test]
    fn zero_canvas() {
        let test = test_ase().header(test_header().width(0).clone()).build();
        assert_matches!(test.decode(), Err(Error::Decode(err)) => {
            assert_matches!(err.get_ref(), DecodeError::InvalidHeader, "{err:?}");
        });
    }

    #[test]
    fn canvas_too_large() {
        let test = test_ase().header(test_header().width(100).height(100).clone()).build();
        let mut delegate = SpriteDelegate::new();
        let result = AseDecoder::new(9_999).decode(&mut test.stream(), &mut delegate);
        assert_matches!(result, Err(Error::Decode(err)) => {
            assert_matches!(err.get_ref(), DecodeError::TooLarge(10_000, 9_999), "{err:?}");
        });
        assert_matches!(delegate.diagnostics(), [Diagnostic::Error(_)]);
    }

    #[test]
    fn truncated_file() {
        let frame = test_frame()
            .add_layer(1, LayerChunk::TYPE_IMAGE, 0, 0, 255, "Layer 1")
            .add_cel(0, 0, 0, 255, TestCelData::Raw(2, 2, vec![7; 16]))
            .clone();
        let mut test = test_ase().add_frame(frame).build();
        test.data.truncate(test.data.len() - 3);
        assert_matches!(test.decode(), Err(Error::Decode(err)) => {
            assert_matches!(err.get_ref(), DecodeError::Truncated, "{err:?}");
        });
    }

    #[test]
    fn chunk_past_frame_end() {
        let frame = test_frame()
            .add_layer(1, LayerChunk::TYPE_IMAGE, 0, 0, 255, "Layer 1")
            .size(Some(20))
            .clone();
        let test = test_ase().add_frame(frame).build();
        assert_matches!(test.decode(), Err(Error::Decode(err)) => {
            assert_matches!(err.get_ref(), DecodeError::InvalidInput, "{err:?}");
        });
    }

    #[test]
    fn cel_unknown_layer() {
        let frame = test_frame().add_cel(0, 0, 0, 255, TestCelData::Raw(1, 1, vec![0; 4])).clone();
        let test = test_ase().add_frame(frame).build();
        assert_matches!(test.decode(), Err(Error::Decode(err)) => {
            assert_matches!(err.get_ref(), DecodeError::InvalidInput, "{err:?}");
        });
    }

    #[test]
    fn cel_too_large() {
        let frame = test_frame()
            .add_layer(1, LayerChunk::TYPE_IMAGE, 0, 0, 255, "Layer 1")
            .add_cel(0, 0, 0, 255, TestCelData::Compressed(200, 200, vec![]))
            .clone();
        let test = test_ase().add_frame(frame).build();
        let mut delegate = SpriteDelegate::new();
        let result = AseDecoder::new(1000).decode(&mut test.stream(), &mut delegate);
        assert_matches!(result, Err(Error::Decode(err)) => {
            assert_matches!(err.get_ref(), DecodeError::TooLarge(40_000, 1000), "{err:?}");
        });
    }

    #[test]
    fn linked_cel() {
        let first = test_frame()
            .add_layer(1, LayerChunk::TYPE_IMAGE, 0, 0, 255, "Layer 1")
            .add_cel(0, 3, 1, 200, TestCelData::Raw(1, 1, rgba(&[[9, 9, 9, 9]])))
            .clone();
        let second = test_frame().add_cel(0, 0, 0, 255, TestCelData::Linked(0)).clone();
        let sprite = test_ase().add_frame(first).add_frame(second).build().decode().unwrap();
        let linked = sprite.cel(0, 1).unwrap();
        assert_eq!((linked.x, linked.y, linked.opacity), (3, 1, 200));
        assert_eq!(linked.image, sprite.cel(0, 0).unwrap().image);
    }

    #[test]
    fn linked_cel_to_later_frame() {
        let first = test_frame()
            .add_layer(1, LayerChunk::TYPE_IMAGE, 0, 0, 255, "Layer 1")
            .add_cel(0, 0, 0, 255, TestCelData::Linked(1))
            .clone();
        let second = test_frame().add_cel(0, 0, 0, 255, TestCelData::Raw(1, 1, vec![0; 4])).clone();
        let test = test_ase().add_frame(first).add_frame(second).build();
        assert_matches!(test.decode(), Err(Error::Decode(err)) => {
            assert_matches!(err.get_ref(), DecodeError::InvalidInput, "{err:?}");
        });
    }

    #[test]
    fn linked_cel_to_nothing() {
        let first = test_frame().add_layer(1, LayerChunk::TYPE_IMAGE, 0, 0, 255, "Layer 1").clone();
        let second = test_frame().add_cel(0, 0, 0, 255, TestCelData::Linked(0)).clone();
        let test = test_ase().add_frame(first).add_frame(second).build();
        assert_matches!(test.decode(), Err(Error::Decode(err)) => {
            assert_matches!(err.get_ref(), DecodeError::InvalidInput, "{err:?}");
        });
    }

    #[test]
    fn layer_tree() {
        let frame = test_frame()
            .add_layer(1, LayerChunk::TYPE_IMAGE, 0, 0, 255, "Background")
            .add_layer(1, LayerChunk::TYPE_GROUP, 0, 0, 255, "Group")
            .add_layer(1, LayerChunk::TYPE_IMAGE, 1, 0, 255, "Child")
            .add_layer(1, LayerChunk::TYPE_GROUP, 1, 0, 255, "Nested")
            .add_layer(1, LayerChunk::TYPE_IMAGE, 2, 0, 255, "Grandchild")
            .add_layer(1, LayerChunk::TYPE_IMAGE, 0, 0, 255, "Top")
            .clone();
        let sprite = test_ase().add_frame(frame).build().decode().unwrap();
        let parents: Vec<_> = sprite.layers().iter().map(|layer| layer.parent).collect();
        assert_eq!(parents, [None, None, Some(1), Some(1), Some(3), None]);
    }

    #[test]
    fn layer_too_deep() {
        let frame = test_frame()
            .add_layer(1, LayerChunk::TYPE_IMAGE, 0, 0, 255, "Layer 1")
            .add_layer(1, LayerChunk::TYPE_IMAGE, 1, 0, 255, "Orphan")
            .clone();
        let test = test_ase().add_frame(frame).build();
        assert_matches!(test.decode(), Err(Error::Decode(err)) => {
            assert_matches!(err.get_ref(), DecodeError::InvalidInput, "{err:?}");
        });
    }

    #[test]
    fn tilemap_cel_is_diagnosed() {
        let frame = test_frame()
            .add_layer(1, LayerChunk::TYPE_TILEMAP, 0, 0, 255, "Tiles")
            .add_cel(0, 0, 0, 255, TestCelData::Other(CelChunk::TYPE_TILEMAP, vec![0; 32]))
            .clone();
        let test = test_ase().add_frame(frame).build();
        let mut delegate = SpriteDelegate::new();
        AseDecoder::default().decode(&mut test.stream(), &mut delegate).unwrap();
        assert_matches!(delegate.diagnostics(), [Diagnostic::Incompatibility(_), Diagnostic::Incompatibility(_)]);
        let sprite = delegate.take_sprite().unwrap();
        assert!(sprite.cel(0, 0).is_none());
    }

    #[test]
    fn unknown_blend_mode_is_diagnosed() {
        let frame = test_frame().add_layer(1, LayerChunk::TYPE_IMAGE, 0, 77, 255, "Layer 1").clone();
        let test = test_ase().add_frame(frame).build();
        let mut delegate = SpriteDelegate::new();
        AseDecoder::default().decode(&mut test.stream(), &mut delegate).unwrap();
        assert_matches!(delegate.diagnostics(), [Diagnostic::Incompatibility(_)]);
        let sprite = delegate.take_sprite().unwrap();
        assert_eq!(sprite.layers()[0].blend_mode, BlendMode::Normal);
    }

    #[test]
    fn unknown_chunks_skipped() {
        let frame = test_frame()
            .add_chunk((ChunkType(0x2018), vec![0xaa; 33]))
            .add_layer(0x0009, LayerChunk::TYPE_IMAGE, 0, 0, 255, "Layer 1")
            .add_chunk((ChunkType(0x7777), vec![]))
            .clone();
        let sprite = test_ase().add_frame(frame).build().decode().unwrap();
        assert_eq!(sprite.layers()[0].flags, LayerFlags::VISIBLE | LayerFlags::BACKGROUND);
    }

    #[test]
    fn indexed_palette() {
        let header = test_header().color_depth(8).transparent_index(2).num_colors(4).clone();
        let frame = test_frame()
            .add_old_palette(&[(0, vec![[1, 1, 1]; 3])])
            .add_palette(4, 1, &[[10, 20, 30, 40]])
            .clone();
        let sprite = test_ase().header(header).add_frame(frame).build().decode().unwrap();
        assert_eq!(sprite.color_mode(), ColorMode::Indexed);
        assert_eq!(sprite.transparent_index(), 2);
        assert_eq!(sprite.palette().len(), 4);
        assert_eq!(sprite.palette().get(0), Some([1, 1, 1, 255]));
        assert_eq!(sprite.palette().get(1), Some([10, 20, 30, 40]));
    }

    #[test]
    fn old_palette_ignored_after_new() {
        let header = test_header().color_depth(8).num_colors(2).clone();
        let frame = test_frame()
            .add_palette(2, 0, &[[10, 20, 30, 40], [50, 60, 70, 80]])
            .add_old_palette(&[(0, vec![[1, 1, 1]])])
            .clone();
        let sprite = test_ase().header(header).add_frame(frame).build().decode().unwrap();
        assert_eq!(sprite.palette().get(0), Some([10, 20, 30, 40]));
    }

    #[test]
    fn frame_limit() {
        let first = test_frame().add_layer(1, LayerChunk::TYPE_IMAGE, 0, 0, 255, "Layer 1").clone();
        let test = test_ase().add_frame(first).add_frame(test_frame()).add_frame(test_frame()).build();
        let mut delegate = SpriteDelegate::with_frame_limit(2);
        AseDecoder::default().decode(&mut test.stream(), &mut delegate).unwrap();
        assert_eq!(delegate.take_sprite().unwrap().frame_count(), 2);
    }

    #[test]
    fn frame_durations() {
        let test = test_ase()
            .add_frame(test_frame().duration_ms(100).clone())
            .add_frame(test_frame().duration_ms(250).clone())
            .build();
        let sprite = test.decode().unwrap();
        let durations: Vec<_> = sprite.frames().iter().map(|frame| frame.duration_ms).collect();
        assert_eq!(durations, [100, 250]);
    }
}
