//! Frame recognisers for the three protocols a u-blox GNSS chip emits.
//!
//! Each parser is handed a [`ParseCursor`] positioned at a candidate frame start
//! and pulls bytes one at a time. It answers with the decoded [`MessageId`] (the
//! frame length is what it consumed), [`ParseError::NotFound`] as soon as a byte
//! rules its protocol out, or [`ParseError::Incomplete`] when the cursor runs dry
//! before a decision can be made.

mod checksum;
mod nmea;
mod rtcm;
mod ubx;

pub use checksum::{Crc24Q, NmeaChecksum, UbxChecksum};
pub use nmea::parse_nmea;
pub use rtcm::parse_rtcm;
pub use ubx::{decode_ubx_frame, encode_ubx, parse_ubx, UbxFrame};

use crate::{error::ParseError, message_id::MessageId};

/// Signature shared by the frame recognisers
pub type FrameParser = fn(&mut ParseCursor<'_>) -> Result<MessageId, ParseError>;

/// Recognisers in the order they are tried at each byte offset
pub const PARSERS: [FrameParser; 3] = [parse_ubx, parse_nmea, parse_rtcm];

/// Read cursor over buffered data that may wrap around the end of a ring,
/// exposed as two slices: `head` followed by `tail`.
#[derive(Clone)]
pub struct ParseCursor<'a> {
    head: &'a [u8],
    tail: &'a [u8],
    start: usize,
    pos: usize,
}

impl<'a> ParseCursor<'a> {
    pub const fn new(head: &'a [u8], tail: &'a [u8]) -> Self {
        Self {
            head,
            tail,
            start: 0,
            pos: 0,
        }
    }

    pub const fn from_slice(data: &'a [u8]) -> Self {
        Self::new(data, &[])
    }

    /// Total bytes in the view
    pub fn len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Restarts parsing at `offset` into the view
    pub(crate) fn rewind_to(&mut self, offset: usize) {
        self.start = offset;
        self.pos = offset;
    }

    /// Bytes left after the cursor
    pub fn available(&self) -> usize {
        self.len().saturating_sub(self.pos)
    }

    /// Bytes taken since the last rewind, the frame length on success
    pub fn consumed(&self) -> usize {
        self.pos - self.start
    }

    pub fn next_byte(&mut self) -> Result<u8, ParseError> {
        let b = if self.pos < self.head.len() {
            self.head[self.pos]
        } else {
            *self
                .tail
                .get(self.pos - self.head.len())
                .ok_or(ParseError::Incomplete)?
        };
        self.pos += 1;
        Ok(b)
    }

    /// Fails with `Incomplete`, without moving, unless `count` more bytes are there
    pub fn require(&self, count: usize) -> Result<(), ParseError> {
        if self.available() < count {
            Err(ParseError::Incomplete)
        } else {
            Ok(())
        }
    }
}

/// Runs `parsers` against `cursor` from its start, one byte offset at a time.
///
/// Returns the frame length and id of the first recognised frame. Leading
/// bytes no parser recognises are reported on their own, as a length with
/// [`MessageId::Unknown`], so the frame behind them is found by the next call.
/// An empty view, or a frame that is still arriving, gives `Incomplete`.
pub fn dispatch(
    cursor: &mut ParseCursor<'_>,
    parsers: &[FrameParser],
) -> Result<(usize, MessageId), ParseError> {
    let total = cursor.len();
    let mut discard = 0;
    let mut result = Err(ParseError::Incomplete);
    while discard < total {
        result = Err(ParseError::NotFound);
        for parser in parsers {
            cursor.rewind_to(discard);
            result = parser(cursor).map(|id| (cursor.consumed(), id));
            if result != Err(ParseError::NotFound) {
                break;
            }
        }
        if result != Err(ParseError::NotFound) {
            break;
        }
        discard += 1;
    }
    if discard > 0 {
        return Ok((discard, MessageId::Unknown));
    }
    result
}
