#![warn(missing_docs)]

//! `aseflat` decodes Aseprite (`.ase`/`.aseprite`) files and flattens one frame into an RGBA raster.
//!
//! The pipeline runs in four steps:
//!
//! - The input is wrapped in a [`FileInterface`], a seekable byte stream with a sticky failure flag.
//! - The first bytes are [sniffed](sniff) to reject foreign files before any decoding happens.
//! - A [`ContainerDecoder`] parses the file and hands the resulting [`Sprite`](doc::Sprite) to a [`DecodeDelegate`].
//! - The requested frame is [composited](render::render_frame) into a [`Raster`].
//!
//! # Usage
//!
//! The main entry points are [`open`] and [`open_with_config`], which take a [`Read`] + [`Seek`] input. A [`Reader`]
//! additionally exposes the pipeline's [`Stage`] and lets the decoder and delegate be substituted.
//!
//! ```no_run
//! let file = std::fs::File::open("sprite.aseprite")?;
//! let config = aseflat::Config::builder().frame(2).build();
//! let raster = aseflat::open_with_config(file, config)?;
//! println!("{}x{}", raster.width(), raster.height());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The [`decode`] module also contains a less stable API which can be used to parse individual Aseprite chunk types.

pub mod decode;
pub mod delegate;
pub mod doc;
pub mod render;
pub mod sniff;

use std::any::Any;
use std::fmt::Display;
use std::io;
use std::io::{Read, Seek};
use std::panic::{catch_unwind, AssertUnwindSafe};

use aseflat_common::report_attach;
use derive_builder::Builder;

use crate::decode::{AseDecoder, ContainerDecoder, DecodeError, DEFAULT_MAX_PIXELS};
use crate::delegate::{DecodeDelegate, SpriteDelegate};
use crate::render::{render_frame, CompositeError};

//
// public types
//

pub use aseflat_common::{BufferStream, FileInterface, Report, StreamAdapter};
pub use render::{PixelLayout, Raster};

#[derive(Builder, Clone, Debug)]
#[builder(build_fn(name = "try_build"))]
/// Configuration for a [`Reader`].
pub struct Config {
    /// The frame to flatten.
    ///
    /// The default is `0`.
    #[builder(default)]
    pub frame: u32,

    /// The pixel layout of the returned [`Raster`].
    ///
    /// The default is [`PixelLayout::Rgba8888`].
    #[builder(default)]
    pub pixel_layout: PixelLayout,

    /// The largest canvas or cel to decode, in pixels.
    ///
    /// This bounds memory use on hostile input. The default is 2<sup>28</sup>.
    #[builder(default = "DEFAULT_MAX_PIXELS")]
    pub max_pixels: u64,
}

/// Error type returned by `aseflat`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An IO error occurred while reading the given input.
    #[error("IO error: {0}")]
    Stream(#[from] io::Error),

    /// The input does not start with an Aseprite header.
    #[error("Not an Aseprite file")]
    FormatMismatch,

    /// The input could not be decoded as an Aseprite file.
    ///
    /// The [`Report`]'s [`Debug`](std::fmt::Debug) implementation prints where in the decoder the error occurred; the
    /// underlying [`DecodeError`] can be retrieved with [`Report::get_ref`].
    #[error("Decode error: {0}")]
    Decode(#[from] Report<DecodeError>),

    /// The decoded sprite could not be flattened.
    #[error("Composite error: {0}")]
    Composite(#[from] Report<CompositeError>),

    /// The decoder or compositor panicked.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Where a [`Reader`] is in its pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Stage {
    /// Nothing opened yet.
    #[default]
    Unopened,
    /// Checking the input's signature.
    Sniffing,
    /// The input is not an Aseprite file.
    Rejected,
    /// Running the container decoder.
    Decoding,
    /// Decoding or compositing failed.
    Failed,
    /// Flattening the requested frame.
    Compositing,
    /// The last open produced a raster.
    Ready,
}

/// Opens Aseprite files into [`Raster`]s.
///
/// Every [`open`](Self::open) runs the whole pipeline from scratch; nothing is kept between calls besides the
/// [`Stage`] the last call ended in.
#[derive(Clone, Debug, Default)]
pub struct Reader {
    config: Config,
    stage: Stage,
}

//
// public functions
//

/// Decode an Aseprite input and flatten its first frame.
///
/// # Errors
///
/// If the input is not an Aseprite file, cannot be decoded or composited, or an IO error occurs, an [`Error`] is
/// returned.
pub fn open<R: Read + Seek>(input: R) -> Result<Raster, Error> {
    open_with_config(input, Config::default())
}

/// Decode an Aseprite input and flatten a frame, with the given [`Config`].
///
/// # Errors
///
/// If the input is not an Aseprite file, cannot be decoded or composited, or an IO error occurs, an [`Error`] is
/// returned.
pub fn open_with_config<R: Read + Seek>(input: R, config: Config) -> Result<Raster, Error> {
    Reader::with_config(config).open(input)
}

//
// Config impls
//

impl Config {
    /// Construct a builder for a new [`Config`].
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ConfigBuilder {
    /// Build a new [`Config`].
    pub fn build(&self) -> Config {
        self.try_build().unwrap()
    }
}

//
// Error impls
//

impl Error {
    /// Attach `printable` if this is a [`Error::Decode`].
    #[track_caller]
    pub(crate) fn attach_decode<P: Display + Send + Sync + 'static>(self, printable: P) -> Self {
        match self {
            Error::Decode(report) => Error::Decode(report.attach_printable(printable)),
            other => other,
        }
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast_ref::<&str>() {
                Some(message) => message.to_string(),
                None => "unknown panic".to_string(),
            },
        };
        Error::Internal(message)
    }
}

//
// Reader impls
//

impl Reader {
    /// A reader with the default [`Config`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A reader with the given [`Config`].
    pub fn with_config(config: Config) -> Self {
        Self { config, stage: Stage::Unopened }
    }

    /// The configuration this reader was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The stage the last call to [`open`](Self::open) reached.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Whether `input` looks like an Aseprite file. Only the first bytes are read; the position is restored.
    pub fn can_open<R: Read + Seek + ?Sized>(&self, input: &mut R) -> bool {
        sniff::peek(input).is_match()
    }

    /// Decode `input` and flatten the configured frame.
    ///
    /// # Errors
    ///
    /// If the input is not an Aseprite file, cannot be decoded or composited, or an IO error occurs, an [`Error`] is
    /// returned.
    pub fn open<R: Read + Seek>(&mut self, input: R) -> Result<Raster, Error> {
        let mut input = StreamAdapter::new(input);
        let decoder = AseDecoder::new(self.config.max_pixels);
        let mut delegate = SpriteDelegate::new();
        self.open_with(&mut input, &decoder, &mut delegate)
    }

    /// Decode `input` with `decoder` reporting to `delegate`, then flatten the configured frame.
    ///
    /// Panics inside `decoder`, `delegate` or the compositor are caught and returned as [`Error::Internal`]. The
    /// sprite is taken from `delegate` and dropped before this returns, whether or not it succeeds.
    ///
    /// # Errors
    ///
    /// If the input is not an Aseprite file, cannot be decoded or composited, or an IO error occurs, an [`Error`] is
    /// returned.
    pub fn open_with(
        &mut self,
        input: &mut dyn FileInterface,
        decoder: &dyn ContainerDecoder,
        delegate: &mut dyn DecodeDelegate,
    ) -> Result<Raster, Error> {
        self.set_stage(Stage::Sniffing);
        if !sniff::peek_file(input).is_match() {
            if let Some(err) = input.take_error() {
                self.set_stage(Stage::Failed);
                return Err(Error::Stream(err));
            }
            self.set_stage(Stage::Rejected);
            return Err(Error::FormatMismatch);
        }

        self.set_stage(Stage::Decoding);
        let result = catch_unwind(AssertUnwindSafe(|| self.decode_and_render(input, decoder, &mut *delegate)))
            .unwrap_or_else(|payload| Err(Error::from_panic(payload)));

        match &result {
            Ok(raster) => {
                log::info!("flattened frame {}: {}x{}", self.config.frame, raster.width(), raster.height());
                self.set_stage(Stage::Ready);
            }
            Err(err) => {
                log::info!("open failed: {err}");
                log::debug!("{err:?}");
                // Leave no document behind in a caller-provided delegate.
                let _ = catch_unwind(AssertUnwindSafe(|| delegate.take_sprite()));
                self.set_stage(Stage::Failed);
            }
        }
        result
    }

    fn decode_and_render(
        &mut self,
        input: &mut dyn FileInterface,
        decoder: &dyn ContainerDecoder,
        delegate: &mut dyn DecodeDelegate,
    ) -> Result<Raster, Error> {
        input.seek(0);
        decoder.decode(input, delegate)?;
        let sprite = delegate
            .take_sprite()
            .ok_or_else(|| report_attach!(DecodeError::MissingSprite))?;
        log::info!(
            "decoded {}x{} {} sprite: {} layers, {} frames",
            sprite.width(),
            sprite.height(),
            sprite.color_mode(),
            sprite.layers().len(),
            sprite.frame_count(),
        );

        self.set_stage(Stage::Compositing);
        let raster = render_frame(&sprite, self.config.frame)?;
        drop(sprite);
        Ok(raster.into_layout(self.config.pixel_layout))
    }

    fn set_stage(&mut self, stage: Stage) {
        log::debug!("reader stage {:?} -> {stage:?}", self.stage);
        self.stage = stage;
    }
}

#[cfg(doctest)]
#[doc = include_str!("../README.md")]
pub mod readme {}
