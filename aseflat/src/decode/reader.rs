use std::io;

use aseflat_common::error::{NeededBytes, WhileParsingType};
use aseflat_common::{ensure_attach, FileInterface, InputSpan};
use bytes::{BufMut, BytesMut};

use super::error::{DecodeResultExt, WhileParsingChunk};
use super::{AsePrim, ChunkHeader, ChunkType, DecodeError, ParseChunk};
use crate::Error;

/// Reads headers and chunk bodies through a [`FileInterface`], turning its sticky failure flag into [`Error`]s.
pub struct AseReader<'a> {
    input: &'a mut dyn FileInterface,
    state: State,
}

enum State {
    Idle,
    ReadingBody { header: ChunkHeader, span: InputSpan },
}

/// Bodies are read this much at a time, so a lying size field costs no more memory than the input really holds.
const READ_BATCH_LEN: usize = 8 * 1024;

//
// AseReader impls
//

impl<'a> AseReader<'a> {
    pub fn new(input: &'a mut dyn FileInterface) -> Self {
        Self { input, state: State::Idle }
    }

    /// Returns the current offset into the input.
    pub fn position(&mut self) -> Result<u64, Error> {
        let pos = self.input.tell();
        self.check_stream()?;
        Ok(pos)
    }

    /// Move to `pos`, abandoning any chunk body not yet read.
    pub fn seek(&mut self, pos: u64) -> Result<(), Error> {
        self.input.seek(pos);
        self.check_stream()?;
        self.state = State::Idle;
        Ok(())
    }

    /// Read and parse a fixed-size structure.
    pub fn read_prim<T: AsePrim>(&mut self) -> Result<T, Error> {
        let data = self
            .read_exact(T::ENCODED_LEN.into())
            .map_err(|err| err.attach_decode(WhileParsingType::new::<T>()))?;
        Ok(T::parse(data)?)
    }

    /// Read a chunk header, returning its type and where the whole chunk lies in the input.
    pub fn read_chunk_header(&mut self) -> Result<(ChunkType, InputSpan), Error> {
        let offset = self.position()?;
        let header: ChunkHeader = self.read_prim()?;
        let span = InputSpan { offset, len: header.size.into() };
        self.state = State::ReadingBody { header, span };
        Ok((header.chunk_type, span))
    }

    /// Read and parse the body of the chunk whose header was just read.
    pub fn parse_chunk<T: ParseChunk>(&mut self) -> Result<T, Error> {
        let data = self.read_chunk_data()?;
        Ok(T::parse(data).while_parsing_chunk(T::TYPE)?)
    }

    /// Read the body of the chunk whose header was just read.
    pub fn read_chunk_data(&mut self) -> Result<BytesMut, Error> {
        let header = match std::mem::replace(&mut self.state, State::Idle) {
            State::ReadingBody { header, .. } => header,
            State::Idle => return Ok(BytesMut::new()),
        };
        let data = self
            .read_exact(header.data_len().into())
            .map_err(|err| err.attach_decode(WhileParsingChunk(header.chunk_type)))?;
        Ok(data)
    }

    /// Skip the body of the chunk whose header was just read.
    pub fn skip_chunk(&mut self) -> Result<(), Error> {
        if let State::ReadingBody { span, .. } = std::mem::replace(&mut self.state, State::Idle) {
            self.seek(span.end())?;
        }
        Ok(())
    }

    fn read_exact(&mut self, len: u64) -> Result<BytesMut, Error> {
        let mut data = BytesMut::new();
        while (data.len() as u64) < len {
            let batch_len = (len - data.len() as u64).min(READ_BATCH_LEN as u64) as usize;
            let start = data.len();
            data.put_bytes(0, batch_len);
            let read = self.input.read_bytes(&mut data[start..]);
            self.check_stream()?;
            data.truncate(start + read);
            ensure_attach!(read == batch_len, DecodeError::Truncated, NeededBytes(len - data.len() as u64));
        }
        Ok(data)
    }

    fn check_stream(&mut self) -> Result<(), Error> {
        if self.input.ok() {
            return Ok(());
        }
        let err = self.input.take_error().unwrap_or_else(|| io::ErrorKind::Other.into());
        Err(Error::Stream(err))
    }
}
