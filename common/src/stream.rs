//! A seekable byte stream with a sticky failure flag.
//!
//! The container decoder reads through [`FileInterface`] without checking every call for errors. Instead, the first
//! failure latches the stream into a failed state: [`ok`](FileInterface::ok) turns `false` for good, and every later
//! read yields zeroes without touching the underlying source. Callers check [`ok`](FileInterface::ok) once after a
//! batch of reads.

use std::io;
use std::io::{Read, Seek, SeekFrom};

//
// public types
//

/// The byte-level contract a container decoder reads through.
pub trait FileInterface {
    /// Returns `false` once any operation on this stream has failed.
    fn ok(&self) -> bool;

    /// Returns the current absolute position in the stream.
    fn tell(&mut self) -> u64;

    /// Move to the absolute position `pos`. Seeking past the end of the stream fails the stream.
    fn seek(&mut self, pos: u64);

    /// Read one byte. Reading at the end of the stream fails the stream and returns `0`.
    fn read8(&mut self) -> u8;

    /// Read up to `buf.len()` bytes, returning how many were read. A short count at the end of the stream is not a
    /// failure.
    fn read_bytes(&mut self, buf: &mut [u8]) -> usize;

    /// Write one byte at the current position.
    fn write8(&mut self, value: u8);

    /// Take the error which failed this stream, if one was recorded and not yet taken.
    fn take_error(&mut self) -> Option<io::Error>;
}

/// A read-only [`FileInterface`] over any [`Read`] + [`Seek`] source, e.g. a [`File`](std::fs::File) or an
/// [`io::Cursor`].
pub struct StreamAdapter<R> {
    inner: R,
    state: StreamState,
}

/// An in-memory, readable and writable [`FileInterface`].
#[derive(Clone, Debug, Default)]
pub struct BufferStream {
    data: Vec<u8>,
    pos: u64,
    state: StreamState,
}

//
// private types
//

#[derive(Debug, Default)]
struct StreamState {
    failed: bool,
    error: Option<io::Error>,
}

//
// StreamState impls
//

impl StreamState {
    fn fail(&mut self, error: io::Error) {
        if !self.failed {
            log::debug!("stream failed: {error}");
            self.failed = true;
            self.error = Some(error);
        }
    }
}

impl Clone for StreamState {
    fn clone(&self) -> Self {
        let error = self.error.as_ref().map(|error| io::Error::new(error.kind(), error.to_string()));
        Self { failed: self.failed, error }
    }
}

//
// StreamAdapter impls
//

impl<R: Read + Seek> StreamAdapter<R> {
    /// Wrap `inner`, starting from its current position.
    pub fn new(inner: R) -> Self {
        Self { inner, state: StreamState::default() }
    }

    /// Unwrap this adapter, returning the underlying source.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn stream_len(&mut self) -> io::Result<u64> {
        let stream_pos = self.inner.stream_position()?;
        let len = self.inner.seek(SeekFrom::End(0))?;
        if stream_pos != len {
            self.inner.seek(SeekFrom::Start(stream_pos))?;
        }
        Ok(len)
    }
}

impl<R: Read + Seek> FileInterface for StreamAdapter<R> {
    fn ok(&self) -> bool {
        !self.state.failed
    }

    fn tell(&mut self) -> u64 {
        if self.state.failed {
            return 0;
        }
        match self.inner.stream_position() {
            Ok(pos) => pos,
            Err(err) => {
                self.state.fail(err);
                0
            }
        }
    }

    fn seek(&mut self, pos: u64) {
        if self.state.failed {
            return;
        }
        let result = self.stream_len().and_then(|len| {
            if pos > len {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, format!("seek to {pos} past end {len}")));
            }
            self.inner.seek(SeekFrom::Start(pos))
        });
        if let Err(err) = result {
            self.state.fail(err);
        }
    }

    fn read8(&mut self) -> u8 {
        let mut byte = [0];
        match self.read_bytes(&mut byte) {
            1 => byte[0],
            _ => {
                self.state.fail(io::ErrorKind::UnexpectedEof.into());
                0
            }
        }
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        if self.state.failed {
            buf.fill(0);
            return 0;
        }
        let mut read = 0;
        while read < buf.len() {
            match self.inner.read(&mut buf[read..]) {
                Ok(0) => break,
                Ok(amount) => read += amount,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.state.fail(err);
                    buf.fill(0);
                    return 0;
                }
            }
        }
        read
    }

    fn write8(&mut self, _value: u8) {
        self.state
            .fail(io::Error::new(io::ErrorKind::Unsupported, "write to a read-only stream"));
    }

    fn take_error(&mut self) -> Option<io::Error> {
        self.state.error.take()
    }
}

//
// BufferStream impls
//

impl BufferStream {
    /// Construct a stream over `data`, positioned at its start.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into(), pos: 0, state: StreamState::default() }
    }

    /// Returns the bytes held by this stream.
    pub fn get_ref(&self) -> &[u8] {
        &self.data
    }

    /// Unwrap this stream, returning its bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl FileInterface for BufferStream {
    fn ok(&self) -> bool {
        !self.state.failed
    }

    fn tell(&mut self) -> u64 {
        if self.state.failed {
            return 0;
        }
        self.pos
    }

    fn seek(&mut self, pos: u64) {
        if self.state.failed {
            return;
        }
        if pos > self.data.len() as u64 {
            let len = self.data.len();
            self.state.fail(io::Error::new(io::ErrorKind::UnexpectedEof, format!("seek to {pos} past end {len}")));
            return;
        }
        self.pos = pos;
    }

    fn read8(&mut self) -> u8 {
        let mut byte = [0];
        match self.read_bytes(&mut byte) {
            1 => byte[0],
            _ => {
                self.state.fail(io::ErrorKind::UnexpectedEof.into());
                0
            }
        }
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        if self.state.failed {
            buf.fill(0);
            return 0;
        }
        let start = self.pos as usize;
        let available = self.data.len().saturating_sub(start);
        let amount = buf.len().min(available);
        buf[..amount].copy_from_slice(&self.data[start..start + amount]);
        self.pos += amount as u64;
        amount
    }

    fn write8(&mut self, value: u8) {
        if self.state.failed {
            return;
        }
        let pos = self.pos as usize;
        match self.data.get_mut(pos) {
            Some(byte) => *byte = value,
            None => self.data.push(value),
        }
        self.pos += 1;
    }

    fn take_error(&mut self) -> Option<io::Error> {
        self.state.error.take()
    }
}

//
// FileInterface impls
//

impl<T: FileInterface + ?Sized> FileInterface for &mut T {
    fn ok(&self) -> bool {
        (**self).ok()
    }

    fn tell(&mut self) -> u64 {
        (**self).tell()
    }

    fn seek(&mut self, pos: u64) {
        (**self).seek(pos)
    }

    fn read8(&mut self) -> u8 {
        (**self).read8()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        (**self).read_bytes(buf)
    }

    fn write8(&mut self, value: u8) {
        (**self).write8(value)
    }

    fn take_error(&mut self) -> Option<io::Error> {
        (**self).take_error()
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;

    struct FailingReader {
        data: Cursor<Vec<u8>>,
        fail_after: u64,
        reads: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            if self.data.position() >= self.fail_after {
                return Err(io::Error::new(io::ErrorKind::Other, "device unplugged"));
            }
            let allowed = (self.fail_after - self.data.position()) as usize;
            let len = buf.len().min(allowed);
            self.data.read(&mut buf[..len])
        }
    }

    impl Seek for FailingReader {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.data.seek(pos)
        }
    }

    fn failing(data: &[u8], fail_after: u64) -> StreamAdapter<FailingReader> {
        StreamAdapter::new(FailingReader { data: Cursor::new(data.to_vec()), fail_after, reads: 0 })
    }

    #[test]
    fn read_sequence() {
        let mut stream = StreamAdapter::new(Cursor::new(b"abcdef".to_vec()));
        assert_eq!(stream.read8(), b'a');
        let mut buf = [0; 3];
        assert_eq!(stream.read_bytes(&mut buf), 3);
        assert_eq!(&buf, b"bcd");
        assert_eq!(stream.tell(), 4);
        assert!(stream.ok());
    }

    #[test]
    fn short_read_is_not_a_failure() {
        let mut stream = StreamAdapter::new(Cursor::new(b"ab".to_vec()));
        let mut buf = [0; 8];
        assert_eq!(stream.read_bytes(&mut buf), 2);
        assert!(stream.ok());
        assert_eq!(stream.read_bytes(&mut buf), 0);
        assert!(stream.ok());
    }

    #[test]
    fn read8_at_end_fails() {
        let mut stream = StreamAdapter::new(Cursor::new(b"a".to_vec()));
        assert_eq!(stream.read8(), b'a');
        assert_eq!(stream.read8(), 0);
        assert!(!stream.ok());
        assert_matches!(stream.take_error(), Some(err) if err.kind() == io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn seek_past_end_fails() {
        let mut stream = StreamAdapter::new(Cursor::new(b"abc".to_vec()));
        stream.seek(3);
        assert!(stream.ok());
        stream.seek(4);
        assert!(!stream.ok());
    }

    #[test]
    fn failure_is_sticky() {
        let mut stream = failing(b"abcdefgh", 2);
        let mut buf = [0; 4];
        assert_eq!(stream.read_bytes(&mut buf), 0);
        assert!(!stream.ok());
        let reads = stream.inner.reads;

        stream.seek(0);
        assert_eq!(stream.read8(), 0);
        assert_eq!(stream.read_bytes(&mut buf), 0);
        assert_eq!(buf, [0; 4]);
        assert_eq!(stream.tell(), 0);
        assert!(!stream.ok());
        assert_eq!(stream.inner.reads, reads, "failed stream touched its source");
        assert_matches!(stream.take_error(), Some(err) if err.kind() == io::ErrorKind::Other);
        assert_matches!(stream.take_error(), None);
    }

    #[test]
    fn write_to_read_only_fails() {
        let mut stream = StreamAdapter::new(Cursor::new(vec![0; 4]));
        stream.write8(1);
        assert!(!stream.ok());
        assert_matches!(stream.take_error(), Some(err) if err.kind() == io::ErrorKind::Unsupported);
    }

    #[test]
    fn buffer_write_then_read() {
        let mut stream = BufferStream::new(b"xy".to_vec());
        stream.seek(1);
        stream.write8(b'Y');
        stream.write8(b'z');
        stream.seek(0);
        let mut buf = [0; 3];
        assert_eq!(stream.read_bytes(&mut buf), 3);
        assert_eq!(&buf, b"xYz");
        assert!(stream.ok());
        assert_eq!(stream.into_inner(), b"xYz");
    }

    #[test]
    fn buffer_seek_past_end_fails() {
        let mut stream = BufferStream::new(b"xy".to_vec());
        stream.seek(3);
        assert!(!stream.ok());
        stream.write8(b'a');
        assert_eq!(stream.get_ref(), b"xy");
    }
}
