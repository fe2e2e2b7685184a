//! The in-memory document a container decoder produces.
//!
//! A [`Sprite`] owns its [`Layer`]s and [`Frame`]s; each frame holds at most one [`Cel`] per layer. Cel pixel buffers
//! are [`Bytes`], so a linked cel can share its pixels with the cel it links to while the sprite itself keeps a single
//! owner.

#![allow(missing_docs)]

use std::fmt;
use std::num::NonZeroU32;

use bytes::Bytes;

//
// public types
//

/// A parsed sprite document.
#[derive(Clone, Debug)]
pub struct Sprite {
    width: NonZeroU32,
    height: NonZeroU32,
    color_mode: ColorMode,
    transparent_index: u8,
    palette: Palette,
    layers: Vec<Layer>,
    frames: Vec<Frame>,
}

/// The pixel format cel images are stored in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorMode {
    /// 4 bytes per pixel: red, green, blue, alpha.
    Rgb,
    /// 2 bytes per pixel: value, alpha.
    Grayscale,
    /// 1 byte per pixel: an index into the sprite's [`Palette`].
    Indexed,
}

/// A drawing surface, or a group of them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layer {
    pub name: String,
    pub kind: LayerKind,
    pub flags: LayerFlags,
    pub opacity: u8,
    pub blend_mode: BlendMode,
    /// The index of the group layer containing this layer. Always lower than this layer's own index.
    pub parent: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerKind {
    Image,
    Group,
    Tilemap,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct LayerFlags: u16 {
        const VISIBLE = 0x0001;
        const EDITABLE = 0x0002;
        const LOCK_MOVEMENT = 0x0004;
        const BACKGROUND = 0x0008;
        const PREFER_LINKED_CELS = 0x0010;
        const COLLAPSED = 0x0020;
        const REFERENCE = 0x0040;
    }
}

/// How a layer's pixels combine with what lies beneath them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
    Addition,
    Subtract,
    Divide,
}

/// One time step of the animation.
#[derive(Clone, Debug, Default)]
pub struct Frame {
    /// Display duration in milliseconds.
    pub duration_ms: u16,
    cels: Vec<Option<Cel>>,
}

/// The content of one layer in one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cel {
    pub x: i32,
    pub y: i32,
    pub opacity: u8,
    pub image: Image,
}

/// A rectangular pixel buffer in some [`ColorMode`].
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub mode: ColorMode,
    pub pixels: Bytes,
}

/// RGBA palette entries, indexed by the pixel values of indexed images.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Palette {
    entries: Vec<[u8; 4]>,
}

//
// Sprite impls
//

impl Sprite {
    pub fn new(width: NonZeroU32, height: NonZeroU32, color_mode: ColorMode) -> Self {
        Self {
            width,
            height,
            color_mode,
            transparent_index: 0,
            palette: Palette::default(),
            layers: Vec::new(),
            frames: Vec::new(),
        }
    }

    pub fn width(&self) -> NonZeroU32 {
        self.width
    }

    pub fn height(&self) -> NonZeroU32 {
        self.height
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    /// The palette index treated as transparent on non-background layers of indexed sprites.
    pub fn transparent_index(&self) -> u8 {
        self.transparent_index
    }

    pub fn set_transparent_index(&mut self, index: u8) {
        self.transparent_index = index;
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn palette_mut(&mut self) -> &mut Palette {
        &mut self.palette
    }

    /// Layers in z-order, bottom first.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Append a layer on top of the stack, returning its index.
    pub fn add_layer(&mut self, layer: Layer) -> usize {
        self.layers.push(layer);
        self.layers.len() - 1
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame_count(&self) -> u32 {
        self.frames.len() as u32
    }

    pub fn frame(&self, index: u32) -> Option<&Frame> {
        self.frames.get(index as usize)
    }

    pub fn frame_mut(&mut self, index: u32) -> Option<&mut Frame> {
        self.frames.get_mut(index as usize)
    }

    /// Append a frame, returning its index.
    pub fn add_frame(&mut self, frame: Frame) -> u32 {
        self.frames.push(frame);
        self.frames.len() as u32 - 1
    }

    /// The cel of `layer` at `frame`, if there is one.
    pub fn cel(&self, layer: usize, frame: u32) -> Option<&Cel> {
        self.frame(frame)?.cel(layer)
    }
}

//
// ColorMode impls
//

impl ColorMode {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            ColorMode::Rgb => 4,
            ColorMode::Grayscale => 2,
            ColorMode::Indexed => 1,
        }
    }

    /// The color depth field value used by the Aseprite format.
    pub fn from_depth(depth: u16) -> Option<Self> {
        match depth {
            32 => Some(ColorMode::Rgb),
            16 => Some(ColorMode::Grayscale),
            8 => Some(ColorMode::Indexed),
            _ => None,
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorMode::Rgb => write!(f, "RGBA"),
            ColorMode::Grayscale => write!(f, "grayscale"),
            ColorMode::Indexed => write!(f, "indexed"),
        }
    }
}

//
// Layer impls
//

impl Layer {
    /// A visible, fully opaque image layer with normal blending.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: LayerKind::Image,
            flags: LayerFlags::VISIBLE | LayerFlags::EDITABLE,
            opacity: u8::MAX,
            blend_mode: BlendMode::Normal,
            parent: None,
        }
    }

    /// A visible, fully opaque group layer.
    pub fn group(name: impl Into<String>) -> Self {
        Self { kind: LayerKind::Group, ..Self::new(name) }
    }

    pub fn is_visible(&self) -> bool {
        self.flags.contains(LayerFlags::VISIBLE)
    }

    pub fn is_background(&self) -> bool {
        self.flags.contains(LayerFlags::BACKGROUND)
    }

    pub fn is_reference(&self) -> bool {
        self.flags.contains(LayerFlags::REFERENCE)
    }

    pub fn is_group(&self) -> bool {
        self.kind == LayerKind::Group
    }
}

//
// BlendMode impls
//

impl BlendMode {
    /// Map the Aseprite format's blend mode code.
    pub fn from_code(code: u16) -> Option<Self> {
        use BlendMode::*;
        const MODES: [BlendMode; 19] = [
            Normal, Multiply, Screen, Overlay, Darken, Lighten, ColorDodge, ColorBurn, HardLight, SoftLight,
            Difference, Exclusion, Hue, Saturation, Color, Luminosity, Addition, Subtract, Divide,
        ];
        MODES.get(usize::from(code)).copied()
    }
}

//
// Frame impls
//

impl Frame {
    pub fn new(duration_ms: u16) -> Self {
        Self { duration_ms, cels: Vec::new() }
    }

    pub fn cel(&self, layer: usize) -> Option<&Cel> {
        self.cels.get(layer)?.as_ref()
    }

    /// Set the cel of `layer`, replacing any previous one.
    pub fn set_cel(&mut self, layer: usize, cel: Cel) {
        if self.cels.len() <= layer {
            self.cels.resize(layer + 1, None);
        }
        self.cels[layer] = Some(cel);
    }
}

//
// Image impls
//

impl Image {
    pub fn new(width: u32, height: u32, mode: ColorMode, pixels: impl Into<Bytes>) -> Self {
        Self { width, height, mode, pixels: pixels.into() }
    }

    /// The buffer length `width * height * bytes_per_pixel`, or `None` on overflow.
    pub fn expected_len(width: u32, height: u32, mode: ColorMode) -> Option<usize> {
        let len = u64::from(width)
            .checked_mul(u64::from(height))?
            .checked_mul(u64::from(mode.bytes_per_pixel()))?;
        usize::try_from(len).ok()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { width, height, mode, pixels } = self;
        write!(f, "Image({width}x{height} {mode}, {} bytes)", pixels.len())
    }
}

//
// Palette impls
//

impl Palette {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u8) -> Option<[u8; 4]> {
        self.entries.get(usize::from(index)).copied()
    }

    /// Grow or shrink the palette to `len` entries. New entries are opaque black.
    pub fn resize(&mut self, len: usize) {
        self.entries.resize(len, [0, 0, 0, u8::MAX]);
    }

    /// Set entry `index`, growing the palette if needed.
    pub fn set(&mut self, index: usize, color: [u8; 4]) {
        if self.entries.len() <= index {
            self.resize(index + 1);
        }
        self.entries[index] = color;
    }
}

impl FromIterator<[u8; 4]> for Palette {
    fn from_iter<T: IntoIterator<Item = [u8; 4]>>(iter: T) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}
