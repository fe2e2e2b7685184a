//! Content-based detection of Aseprite files.

use std::io::{Read, Seek, SeekFrom};

use aseflat_common::FileInterface;

use crate::decode::AseHeader;

/// Number of bytes [`sniff_bytes`] needs to decide.
pub const SNIFF_LEN: usize = 8;

/// The outcome of sniffing a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sniff {
    /// The stream starts like an Aseprite file.
    Match,
    /// The stream is not recognized.
    NoMatch,
}

bitflags::bitflags! {
    /// What a host may do with a stream or format.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        /// The stream or format can be decoded.
        const CAN_READ = 0x1;
    }
}

/// Format names recognized by [`capabilities`], compared case-insensitively.
pub const FORMAT_NAMES: [&str; 2] = ["ase", "aseprite"];

//
// public functions
//

/// Classify a stream from its first bytes. Fewer than [`SNIFF_LEN`] bytes never match.
pub fn sniff_bytes(prefix: &[u8]) -> Sniff {
    let Some(prefix) = prefix.get(..SNIFF_LEN) else {
        return Sniff::NoMatch;
    };
    let magic_end = AseHeader::MAGIC_OFFSET + 2;
    match prefix[AseHeader::MAGIC_OFFSET..magic_end] == AseHeader::MAGIC.to_le_bytes() {
        true => Sniff::Match,
        false => Sniff::NoMatch,
    }
}

/// Sniff `input` from its current position, restoring the position afterwards.
///
/// I/O errors are logged and reported as [`Sniff::NoMatch`].
pub fn peek<R: Read + Seek + ?Sized>(input: &mut R) -> Sniff {
    match try_peek(input) {
        Ok(sniff) => sniff,
        Err(err) => {
            log::debug!("sniffing failed: {err}");
            Sniff::NoMatch
        }
    }
}

/// Sniff a [`FileInterface`] from its current position, restoring the position afterwards.
///
/// A failed stream never matches; its error is left in place for the caller to [take](FileInterface::take_error).
pub fn peek_file(input: &mut dyn FileInterface) -> Sniff {
    let start = input.tell();
    let mut prefix = [0; SNIFF_LEN];
    let read = input.read_bytes(&mut prefix);
    input.seek(start);
    if !input.ok() {
        return Sniff::NoMatch;
    }
    sniff_bytes(&prefix[..read])
}

/// [`peek`] a stream the host may not have provided.
pub fn peek_device<R: Read + Seek + ?Sized>(device: Option<&mut R>) -> Sniff {
    device.map_or(Sniff::NoMatch, peek)
}

/// Answer a host's capability query for `format_name` and an optional `device`.
///
/// A recognized format name is enough; otherwise the device's content decides.
pub fn capabilities<R: Read + Seek + ?Sized>(format_name: &str, device: Option<&mut R>) -> Capabilities {
    if FORMAT_NAMES.iter().any(|name| name.eq_ignore_ascii_case(format_name)) {
        return Capabilities::CAN_READ;
    }
    match peek_device(device) {
        Sniff::Match => Capabilities::CAN_READ,
        Sniff::NoMatch => Capabilities::empty(),
    }
}

fn try_peek<R: Read + Seek + ?Sized>(input: &mut R) -> std::io::Result<Sniff> {
    let start = input.stream_position()?;
    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    let read_result = (&mut *input).take(SNIFF_LEN as u64).read_to_end(&mut prefix);
    input.seek(SeekFrom::Start(start))?;
    read_result?;
    Ok(sniff_bytes(&prefix))
}

//
// Sniff impls
//

impl Sniff {
    /// Whether this is [`Sniff::Match`].
    pub fn is_match(self) -> bool {
        self == Sniff::Match
    }
}
