//! Error types returned by the Aseprite decoder.

use std::fmt::{Debug, Display};
use std::result::Result as StdResult;

use aseflat_common::{Result, ResultExt};
use derive_more::Display;

use super::ChunkType;
use crate::Error;

/// Error type returned by the Aseprite decoder.
///
/// The variants are not a stable API; matching on them is meant for tests and diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The file header is malformed, e.g. it carries the wrong magic number.
    #[error("Invalid file header")]
    InvalidHeader,

    /// The input is structurally invalid.
    #[error("Invalid input")]
    InvalidInput,

    /// A compressed cel could not be inflated to the size its header declares.
    #[error("Invalid cel image data")]
    InvalidImageData,

    /// The input ended, or a chunk ended, before a structure inside it was complete.
    #[error("Truncated data")]
    Truncated,

    /// The canvas or a cel is larger than the configured pixel limit.
    #[error("Image of `{_0}` pixels exceeds the `{_1}` pixel limit")]
    TooLarge(u64, u64),

    /// The header declares a color depth this decoder does not know.
    #[error("Unsupported color depth `{_0}`")]
    UnsupportedColorDepth(u16),

    /// The decoder finished without producing a sprite.
    #[error("No sprite was produced")]
    MissingSprite,
}

pub(crate) trait DecodeResultExt: ResultExt + Sized {
    #[track_caller]
    fn while_parsing_chunk(self, chunk_type: ChunkType) -> Self {
        self.attach_printable(WhileParsingChunk(chunk_type))
    }

    #[track_caller]
    fn while_parsing_field<T>(self, chunk_type: ChunkType, field_name: T) -> Self
    where
        T: Display + Debug + Send + Sync + 'static,
    {
        self.attach_printable(WhileParsingField(chunk_type, field_name))
    }
}

#[derive(Clone, Copy, Debug, Display)]
#[display(fmt = "while parsing {} chunk", _0)]
pub(crate) struct WhileParsingChunk(pub(crate) ChunkType);

#[derive(Clone, Copy, Debug, Display)]
#[display(fmt = "while parsing {} chunk field `{}`", _0, _1)]
pub(crate) struct WhileParsingField<T>(pub(crate) ChunkType, pub(crate) T);

#[derive(Clone, Copy, Debug, Display)]
#[display(fmt = "while parsing frame {}", _0)]
pub(crate) struct WhileParsingFrame(pub(crate) u32);

pub(crate) trait FrameResultExt: Sized {
    #[track_caller]
    fn while_parsing_frame(self, frame: u32) -> Self;
}

impl<T> DecodeResultExt for Result<T, DecodeError> {}

impl<T> FrameResultExt for StdResult<T, Error> {
    #[track_caller]
    fn while_parsing_frame(self, frame: u32) -> Self {
        match self {
            Err(Error::Decode(report)) => Err(Error::Decode(report.attach_printable(WhileParsingFrame(frame)))),
            _ => self,
        }
    }
}
