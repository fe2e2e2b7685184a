//! Flattening one frame of a [`Sprite`] into a [`Raster`].

pub mod blend;

use std::fmt;

use aseflat_common::{bail_attach, ensure_attach, Result};
use derive_more::Display;

use crate::doc::{ColorMode, Image, Layer, LayerKind, Sprite};

use self::blend::{blend, mul_un8, Rgba};

/// Error type returned by the compositor.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CompositeError {
    /// The requested frame does not exist.
    #[error("Frame `{_0}` out of range for `{_1}` frames")]
    FrameOutOfRange(u32, u32),

    /// A cel image is in a different color mode than its sprite.
    #[error("Cel in `{found}` mode in a `{expected}` sprite")]
    #[allow(missing_docs)]
    ColorModeMismatch { expected: ColorMode, found: ColorMode },

    /// A cel image's buffer does not match its dimensions.
    #[error("Invalid cel image")]
    InvalidImage,

    /// A layer's parent is not a group layer beneath it.
    #[error("Invalid layer tree")]
    InvalidLayerTree,

    /// The canvas does not fit in memory.
    #[error("Canvas too large")]
    TooLarge,
}

/// How a [`Raster`] lays out each pixel in memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelLayout {
    /// Bytes red, green, blue, alpha.
    #[default]
    Rgba8888,
    /// A native-endian `u32` of `0xAARRGGBB`.
    Argb32,
}

/// A flattened frame: `width * height` straight-alpha pixels, row-major, without padding.
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    layout: PixelLayout,
    pixels: Vec<u8>,
}

#[derive(Clone, Debug, Display)]
#[display(fmt = "while compositing layer {} `{}`", _0, _1)]
struct WhileCompositingLayer(usize, String);

//
// public functions
//

/// Flatten frame `frame` of `sprite` into an RGBA raster the size of the sprite.
///
/// Layers composite from the lowest index up. Hidden layers, layers inside hidden groups, and reference layers are
/// skipped. Each cel is blended at its offset with the layer's blend mode and an opacity combining the cel, the layer
/// and every enclosing group.
pub fn render_frame(sprite: &Sprite, frame: u32) -> Result<Raster, CompositeError> {
    let frame_count = sprite.frame_count();
    let Some(frame_data) = sprite.frame(frame) else {
        bail_attach!(CompositeError::FrameOutOfRange(frame, frame_count));
    };

    let ancestry = LayerAncestry::new(sprite)?;

    let (width, height) = (sprite.width().get(), sprite.height().get());
    let len = usize::try_from(u64::from(width) * u64::from(height)).ok();
    let Some(len) = len.filter(|len| len.checked_mul(4).is_some()) else {
        bail_attach!(CompositeError::TooLarge);
    };
    let mut canvas: Vec<Rgba> = vec![[0; 4]; len];

    for (index, layer) in sprite.layers().iter().enumerate() {
        if layer.kind != LayerKind::Image || layer.is_reference() || !ancestry.visible[index] {
            continue;
        }
        let Some(cel) = frame_data.cel(index) else {
            continue;
        };
        let opacity = mul_un8(mul_un8(cel.opacity, layer.opacity), ancestry.group_opacity[index]);
        if opacity == 0 {
            continue;
        }

        let image = &cel.image;
        ensure_attach!(
            image.mode == sprite.color_mode(),
            CompositeError::ColorModeMismatch { expected: sprite.color_mode(), found: image.mode },
            WhileCompositingLayer(index, layer.name.clone()),
        );
        ensure_attach!(
            Image::expected_len(image.width, image.height, image.mode) == Some(image.pixels.len()),
            CompositeError::InvalidImage,
            WhileCompositingLayer(index, layer.name.clone()),
        );

        log::debug!("compositing layer {index} `{}` at ({}, {}), opacity {opacity}", layer.name, cel.x, cel.y);
        draw_image(&mut canvas, width, height, sprite, layer, image, (cel.x, cel.y), opacity);
    }

    let pixels = canvas.into_iter().flatten().collect();
    Ok(Raster { width, height, layout: PixelLayout::Rgba8888, pixels })
}

//
// private functions
//

#[allow(clippy::too_many_arguments)]
fn draw_image(
    canvas: &mut [Rgba],
    width: u32,
    height: u32,
    sprite: &Sprite,
    layer: &Layer,
    image: &Image,
    (cel_x, cel_y): (i32, i32),
    opacity: u8,
) {
    let bytes_per_pixel = image.mode.bytes_per_pixel() as usize;
    // Clip the cel rectangle to the canvas, in canvas coordinates.
    let x_range = i64::from(cel_x).max(0)..(i64::from(cel_x) + i64::from(image.width)).min(width.into());
    let y_range = i64::from(cel_y).max(0)..(i64::from(cel_y) + i64::from(image.height)).min(height.into());

    for y in y_range {
        let image_row = (y - i64::from(cel_y)) as usize * image.width as usize;
        let canvas_row = y as usize * width as usize;
        for x in x_range.clone() {
            let image_index = image_row + (x - i64::from(cel_x)) as usize;
            let pixel = &image.pixels[image_index * bytes_per_pixel..][..bytes_per_pixel];
            let src = to_rgba(sprite, layer, pixel);
            let dst = &mut canvas[canvas_row + x as usize];
            *dst = blend(layer.blend_mode, *dst, src, opacity);
        }
    }
}

fn to_rgba(sprite: &Sprite, layer: &Layer, pixel: &[u8]) -> Rgba {
    match *pixel {
        [r, g, b, a] => [r, g, b, a],
        [value, alpha] => [value, value, value, alpha],
        [index] if index == sprite.transparent_index() && !layer.is_background() => [0; 4],
        [index] => sprite.palette().get(index).unwrap_or([0; 4]),
        _ => [0; 4],
    }
}

/// Visibility and group opacity of every layer, inherited from its ancestors.
struct LayerAncestry {
    visible: Vec<bool>,
    group_opacity: Vec<u8>,
}

impl LayerAncestry {
    fn new(sprite: &Sprite) -> Result<Self, CompositeError> {
        let layers = sprite.layers();
        let mut visible = Vec::with_capacity(layers.len());
        let mut group_opacity = Vec::with_capacity(layers.len());
        for (index, layer) in layers.iter().enumerate() {
            let (parent_visible, parent_opacity) = match layer.parent {
                None => (true, u8::MAX),
                Some(parent) => {
                    ensure_attach!(
                        parent < index && layers[parent].is_group(),
                        CompositeError::InvalidLayerTree,
                        WhileCompositingLayer(index, layer.name.clone()),
                    );
                    let parent_layer = &layers[parent];
                    (
                        visible[parent] && parent_layer.is_visible(),
                        mul_un8(group_opacity[parent], parent_layer.opacity),
                    )
                }
            };
            visible.push(parent_visible && layer.is_visible());
            group_opacity.push(parent_opacity);
        }
        Ok(Self { visible, group_opacity })
    }
}

//
// Raster impls
//

impl Raster {
    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The layout of [`pixels`](Self::pixels).
    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    /// The pixel buffer, 4 bytes per pixel in [`layout`](Self::layout).
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Unwrap the pixel buffer.
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// The RGBA value of the pixel at (`x`, `y`), whatever the layout.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let bytes: [u8; 4] = self.pixels.get(offset..offset + 4)?.try_into().ok()?;
        Some(match self.layout {
            PixelLayout::Rgba8888 => bytes,
            PixelLayout::Argb32 => argb_to_rgba(bytes),
        })
    }

    /// Convert the pixels to `layout`.
    pub fn into_layout(mut self, layout: PixelLayout) -> Self {
        if self.layout == layout {
            return self;
        }
        let convert = match layout {
            PixelLayout::Argb32 => rgba_to_argb,
            PixelLayout::Rgba8888 => argb_to_rgba,
        };
        for pixel in self.pixels.chunks_exact_mut(4) {
            let bytes = [pixel[0], pixel[1], pixel[2], pixel[3]];
            pixel.copy_from_slice(&convert(bytes));
        }
        self.layout = layout;
        self
    }
}

impl fmt::Debug for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { width, height, layout, pixels } = self;
        write!(f, "Raster({width}x{height} {layout:?}, {} bytes)", pixels.len())
    }
}

fn rgba_to_argb([r, g, b, a]: Rgba) -> [u8; 4] {
    u32::from_be_bytes([a, r, g, b]).to_ne_bytes()
}

fn argb_to_rgba(bytes: [u8; 4]) -> Rgba {
    let [a, r, g, b] = u32::from_ne_bytes(bytes).to_be_bytes();
    [r, g, b, a]
}
