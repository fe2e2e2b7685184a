//! Error reports carrying a trail of context attached while unwinding out of the decoder.

use std::any::type_name;
use std::fmt;
use std::fmt::{Debug, Display};
use std::panic::Location;
use std::result::Result as StdResult;

use derive_more::Display;

//
// public types
//

/// An error of type `E` plus the context it was raised in.
///
/// The [`Display`] implementation prints only the underlying error. The [`Debug`] implementation additionally prints
/// where the report was created and every message attached on the way out, which reads like a stack trace through the
/// decoder. When the `error-detail` feature is disabled the attachments are discarded.
#[derive(thiserror::Error)]
#[error("{error}")]
pub struct Report<E: Display + Debug> {
    #[source]
    error: E,
    trail: Trail,
}

/// A convenience type alias for a [`Result`](std::result::Result) whose error is wrapped by a [`Report`].
pub type Result<T, E> = StdResult<T, Report<E>>;

/// Extensions for attaching context to the error side of a [`Result`].
pub trait ResultExt: Sized {
    /// Attach a [`Display`]-able message to the error's trail.
    #[track_caller]
    fn attach_printable<P: Display + Send + Sync + 'static>(self, printable: P) -> Self;

    /// Attach "while parsing value of type `T`" to the error's trail.
    #[track_caller]
    fn while_parsing_type(self) -> Self;
}

/// Attachment noting which type was being parsed.
#[derive(Clone, Copy, Debug, Display)]
#[display(fmt = "while parsing value of type `{}`", _0)]
pub struct WhileParsingType(&'static str);

/// Attachment noting that the input ended where more data was required.
#[derive(Clone, Copy, Debug, Display)]
#[display(fmt = "needed {} more bytes", _0)]
pub struct NeededBytes(pub u64);

//
// private types
//

struct Trail {
    #[cfg_attr(not(feature = "error-detail"), allow(dead_code))]
    origin: &'static Location<'static>,
    #[cfg(feature = "error-detail")]
    entries: Vec<TrailEntry>,
}

#[cfg(feature = "error-detail")]
#[derive(Display)]
#[display(fmt = "{message} at {location}")]
struct TrailEntry {
    message: Box<dyn Display + Send + Sync + 'static>,
    location: &'static Location<'static>,
}

//
// Report impls
//

impl<E: Display + Debug> Report<E> {
    /// Create a report for `error`, recording the caller as its origin.
    #[track_caller]
    pub fn new(error: E) -> Self {
        Self { error, trail: Trail::new(Location::caller()) }
    }

    /// Get a reference to the underlying error.
    pub fn get_ref(&self) -> &E {
        &self.error
    }

    /// Unwrap this report, returning the underlying error.
    pub fn into_inner(self) -> E {
        self.error
    }

    /// Attach a [`Display`]-able message to the trail.
    #[track_caller]
    pub fn attach_printable<P: Display + Send + Sync + 'static>(mut self, message: P) -> Self {
        self.trail.push(message, Location::caller());
        self
    }
}

impl<E: Display + Debug> From<E> for Report<E> {
    #[track_caller]
    fn from(error: E) -> Self {
        Self { error, trail: Trail::new(Location::caller()) }
    }
}

impl<E: Display + Debug> Debug for Report<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.error, self.trail)
    }
}

//
// Trail impls
//

impl Trail {
    fn new(origin: &'static Location<'static>) -> Self {
        Self {
            origin,
            #[cfg(feature = "error-detail")]
            entries: Vec::new(),
        }
    }

    #[cfg(feature = "error-detail")]
    fn push<P: Display + Send + Sync + 'static>(&mut self, message: P, location: &'static Location<'static>) {
        self.entries.push(TrailEntry { message: Box::new(message), location });
    }

    #[cfg(not(feature = "error-detail"))]
    fn push<P: Display + Send + Sync + 'static>(&mut self, _message: P, _location: &'static Location<'static>) {}
}

impl Display for Trail {
    #[cfg(feature = "error-detail")]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, " at {}", self.origin)?;
        for entry in &self.entries {
            write!(f, "\n - {entry}")?;
        }
        Ok(())
    }

    #[cfg(not(feature = "error-detail"))]
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ok(())
    }
}

//
// WhileParsingType impls
//

impl WhileParsingType {
    /// Construct a [`WhileParsingType`] naming `T`.
    pub fn new<T: ?Sized>() -> Self {
        Self(type_name::<T>())
    }
}

//
// ResultExt impls
//

impl<T, E: Display + Debug> ResultExt for Result<T, E> {
    #[track_caller]
    fn attach_printable<P: Display + Send + Sync + 'static>(self, printable: P) -> Self {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(err.attach_printable(printable)),
        }
    }

    #[track_caller]
    fn while_parsing_type(self) -> Self {
        self.attach_printable(WhileParsingType::new::<T>())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const TEST_ERROR_DISPLAY: &str = "test error display";
    const TEST_ATTACHMENT: &str = "test attachment";

    #[derive(Debug, thiserror::Error)]
    #[error("{}", TEST_ERROR_DISPLAY)]
    struct TestError;

    fn test_report() -> Report<TestError> {
        report_attach!(TestError, TEST_ATTACHMENT)
    }

    #[test]
    fn report_display_is_only_the_error() {
        assert_eq!(test_report().to_string(), TEST_ERROR_DISPLAY);
    }

    #[test]
    #[cfg(feature = "error-detail")]
    fn report_debug_lists_attachments() {
        let report_debug = format!("{report:?}", report = test_report());
        assert!(report_debug.starts_with(TEST_ERROR_DISPLAY));
        assert!(report_debug.contains(TEST_ATTACHMENT));
        assert!(report_debug.contains(file!()));
    }

    #[test]
    fn while_parsing_type_names_the_ok_type() {
        let result: Result<u16, TestError> = Err(TestError.into());
        let report = result.while_parsing_type().unwrap_err();
        if cfg!(feature = "error-detail") {
            assert!(format!("{report:?}").contains("`u16`"));
        }
    }
}
