#![warn(missing_docs)]

//! `aseflat-common` is a common library shared by the `aseflat` crates.
//!
//! It provides the byte stream a container decoder reads through ([`FileInterface`]) and the [`Report`] error type
//! used to trace where decoding went wrong.

#[macro_use]
pub mod macros;

pub mod error;
pub mod stream;

//
// public types
//

pub use error::{Report, Result, ResultExt};
pub use stream::{BufferStream, FileInterface, StreamAdapter};

/// A pointer to a span in the given input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct InputSpan {
    /// The offset from the beginning of the input where the span begins.
    pub offset: u64,

    /// The length of the span.
    pub len: u64,
}

impl InputSpan {
    /// Returns the offset one past the end of the span.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.len)
    }
}
