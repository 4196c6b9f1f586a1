//! Entry codec
//!
//! Encoding and decoding of a single entry frame.
//!
//! ## Frame Format (big-endian)
//! ```text
//! ┌───────────┬─────────┬───────────┬──────────────────────┬────────────┬─────────┐
//! │FrameLen(4)│ Seq (8) │RefCount(4)│ Reference × RefCount │PayloadLen(4)│ Payload │
//! └───────────┴─────────┴───────────┴──────────────────────┴────────────┴─────────┘
//!
//! Reference:
//! ┌──────────────┬──────────────┬───────────────┬──────────┐
//! │TargetOff (8) │TargetSeq (8) │ RelationLen(4)│ Relation │
//! └──────────────┴──────────────┴───────────────┴──────────┘
//! ```
//!
//! `FrameLen` counts the whole frame including itself. The reserved signature
//! is neither written nor counted.

use std::io::{self, Read};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Entry, EntryReference};
use crate::error::{LogError, Result};

/// Size of the frame length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Frame length + sequence number + reference count
pub const FRAME_HEADER_SIZE: usize = 16;

/// Target offset + target sequence number + relation length
pub const REFERENCE_HEADER_SIZE: usize = 20;

/// Size of the payload length field
pub const PAYLOAD_LENGTH_SIZE: usize = 4;

/// Smallest possible frame: header + empty payload
pub const MIN_FRAME_SIZE: usize = FRAME_HEADER_SIZE + PAYLOAD_LENGTH_SIZE;

/// The sequence number and references of a frame, without its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReferences {
    pub sequence_number: u64,
    pub frame_len: u32,
    pub references: Vec<EntryReference>,
}

// =============================================================================
// Encoding
// =============================================================================

/// Exact number of bytes `encode` produces for this entry
pub fn encoded_len(entry: &Entry) -> u64 {
    let references: u64 = entry
        .references()
        .iter()
        .map(|r| (REFERENCE_HEADER_SIZE + r.relation_type.len()) as u64)
        .sum();

    (FRAME_HEADER_SIZE + PAYLOAD_LENGTH_SIZE) as u64 + references + entry.payload().len() as u64
}

/// Encode an entry into a fresh buffer
pub fn encode(entry: &Entry, max_frame_size: u32) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    encode_into(entry, max_frame_size, &mut buf)?;
    Ok(buf.freeze())
}

/// Append an entry's frame to `buf`, returning the frame length
pub fn encode_into(entry: &Entry, max_frame_size: u32, buf: &mut BytesMut) -> Result<usize> {
    let frame_len = encoded_len(entry);
    if frame_len > max_frame_size as u64 {
        return Err(LogError::FrameTooLarge {
            size: frame_len,
            limit: max_frame_size,
        });
    }

    let frame_len = frame_len as usize;
    buf.reserve(frame_len);

    buf.put_u32(frame_len as u32);
    buf.put_u64(entry.sequence_number());
    buf.put_u32(entry.references().len() as u32);

    for reference in entry.references() {
        let relation = reference.relation_type.as_bytes();
        buf.put_u64(reference.target_offset);
        buf.put_u64(reference.target_sequence_number);
        buf.put_u32(relation.len() as u32);
        buf.put_slice(relation);
    }

    buf.put_u32(entry.payload().len() as u32);
    buf.put_slice(entry.payload());

    Ok(frame_len)
}

// =============================================================================
// Decoding from memory
// =============================================================================

/// Decode the frame at the start of `data`
///
/// `offset` is the file position the frame was read from; it becomes the
/// entry's offset and is used in error reports. Returns the entry and the
/// number of bytes consumed. Bytes past the declared frame length are left
/// alone.
pub fn decode(data: &[u8], offset: u64) -> Result<(Entry, usize)> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Err(LogError::TruncatedFrame {
            offset,
            expected: LENGTH_PREFIX_SIZE as u64,
            available: data.len() as u64,
        });
    }

    let frame_len = (&data[..LENGTH_PREFIX_SIZE]).get_u32();
    check_frame_len(frame_len, offset, u32::MAX)?;

    let frame_len = frame_len as usize;
    if data.len() < frame_len {
        return Err(LogError::TruncatedFrame {
            offset,
            expected: frame_len as u64,
            available: data.len() as u64,
        });
    }

    // Every field below is read from this one slice, bounded by the frame
    let mut cursor = &data[LENGTH_PREFIX_SIZE..frame_len];

    let sequence_number = cursor.get_u64();
    let reference_count = cursor.get_u32();

    let mut references = Vec::with_capacity(
        (reference_count as usize).min(cursor.remaining() / REFERENCE_HEADER_SIZE),
    );
    for _ in 0..reference_count {
        references.push(decode_reference(&mut cursor, offset)?);
    }

    let payload_len = take_u32(&mut cursor, offset, "payload length")? as usize;
    if cursor.remaining() < payload_len {
        return Err(malformed(
            offset,
            format!(
                "payload declares {} bytes but only {} remain in frame",
                payload_len,
                cursor.remaining()
            ),
        ));
    }
    let payload = Bytes::copy_from_slice(&cursor[..payload_len]);
    cursor.advance(payload_len);

    if cursor.has_remaining() {
        return Err(malformed(
            offset,
            format!("{} unaccounted bytes at end of frame", cursor.remaining()),
        ));
    }

    Ok((
        Entry::from_parts(sequence_number, offset, payload, references),
        frame_len,
    ))
}

fn decode_reference(cursor: &mut &[u8], offset: u64) -> Result<EntryReference> {
    if cursor.remaining() < REFERENCE_HEADER_SIZE {
        return Err(malformed(
            offset,
            format!(
                "reference header needs {} bytes but only {} remain in frame",
                REFERENCE_HEADER_SIZE,
                cursor.remaining()
            ),
        ));
    }

    let target_offset = cursor.get_u64();
    let target_sequence_number = cursor.get_u64();
    let relation_len = cursor.get_u32() as usize;

    if cursor.remaining() < relation_len {
        return Err(malformed(
            offset,
            format!(
                "relation declares {} bytes but only {} remain in frame",
                relation_len,
                cursor.remaining()
            ),
        ));
    }

    let relation_type = parse_relation(cursor[..relation_len].to_vec(), offset)?;
    cursor.advance(relation_len);

    Ok(EntryReference {
        target_offset,
        target_sequence_number,
        relation_type,
    })
}

fn take_u32(cursor: &mut &[u8], offset: u64, field: &str) -> Result<u32> {
    if cursor.remaining() < 4 {
        return Err(malformed(
            offset,
            format!("{} missing from frame", field),
        ));
    }
    Ok(cursor.get_u32())
}

// =============================================================================
// Decoding from a stream
// =============================================================================

/// Read one complete frame from `reader`
///
/// Returns `Ok(None)` when the stream is already exhausted at the frame
/// boundary (clean end of log). A stream that ends partway through a frame
/// yields `TruncatedFrame`.
pub fn read_frame<R: Read>(reader: &mut R, offset: u64, max_frame_size: u32) -> Result<Option<Bytes>> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let n = read_fully(reader, &mut prefix)?;
    if n == 0 {
        return Ok(None);
    }
    if n < LENGTH_PREFIX_SIZE {
        return Err(LogError::TruncatedFrame {
            offset,
            expected: LENGTH_PREFIX_SIZE as u64,
            available: n as u64,
        });
    }

    let frame_len = u32::from_be_bytes(prefix);
    check_frame_len(frame_len, offset, max_frame_size)?;

    let mut frame = vec![0u8; frame_len as usize];
    frame[..LENGTH_PREFIX_SIZE].copy_from_slice(&prefix);

    let n = read_fully(reader, &mut frame[LENGTH_PREFIX_SIZE..])?;
    if n < frame.len() - LENGTH_PREFIX_SIZE {
        return Err(LogError::TruncatedFrame {
            offset,
            expected: frame_len as u64,
            available: (LENGTH_PREFIX_SIZE + n) as u64,
        });
    }

    Ok(Some(Bytes::from(frame)))
}

/// Read only the sequence number and references of the frame at the
/// reader's position, never touching the payload bytes
///
/// The payload length is still read so the declared frame length can be
/// checked against the fields actually present.
pub fn read_references<R: Read>(
    reader: &mut R,
    offset: u64,
    max_frame_size: u32,
) -> Result<Option<FrameReferences>> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    let n = read_fully(reader, &mut header)?;
    if n == 0 {
        return Ok(None);
    }
    if n < FRAME_HEADER_SIZE {
        return Err(LogError::TruncatedFrame {
            offset,
            expected: FRAME_HEADER_SIZE as u64,
            available: n as u64,
        });
    }

    let mut cursor = &header[..];
    let frame_len = cursor.get_u32();
    let sequence_number = cursor.get_u64();
    let reference_count = cursor.get_u32();
    check_frame_len(frame_len, offset, max_frame_size)?;

    let mut stream = StreamFrame {
        reader,
        offset,
        frame_len: frame_len as u64,
        consumed: FRAME_HEADER_SIZE as u64,
    };

    let mut references = Vec::new();
    for _ in 0..reference_count {
        stream.reserve(REFERENCE_HEADER_SIZE as u64 + PAYLOAD_LENGTH_SIZE as u64, "reference header")?;
        let mut fixed = [0u8; REFERENCE_HEADER_SIZE];
        stream.fill(&mut fixed)?;

        let mut cursor = &fixed[..];
        let target_offset = cursor.get_u64();
        let target_sequence_number = cursor.get_u64();
        let relation_len = cursor.get_u32() as u64;

        stream.reserve(relation_len + PAYLOAD_LENGTH_SIZE as u64, "relation")?;
        let mut relation = vec![0u8; relation_len as usize];
        stream.fill(&mut relation)?;

        references.push(EntryReference {
            target_offset,
            target_sequence_number,
            relation_type: parse_relation(relation, offset)?,
        });
    }

    let mut payload_len = [0u8; PAYLOAD_LENGTH_SIZE];
    stream.fill(&mut payload_len)?;
    let payload_len = u32::from_be_bytes(payload_len) as u64;

    if stream.consumed + payload_len != stream.frame_len {
        return Err(malformed(
            offset,
            format!(
                "frame declares {} bytes but its fields account for {}",
                stream.frame_len,
                stream.consumed + payload_len
            ),
        ));
    }

    Ok(Some(FrameReferences {
        sequence_number,
        frame_len,
        references,
    }))
}

/// Tracks how much of a frame has been pulled from a stream
struct StreamFrame<'r, R> {
    reader: &'r mut R,
    offset: u64,
    frame_len: u64,
    consumed: u64,
}

impl<R: Read> StreamFrame<'_, R> {
    /// Fail as malformed unless `len` more bytes fit inside the frame
    fn reserve(&self, len: u64, field: &str) -> Result<()> {
        if self.consumed + len > self.frame_len {
            return Err(malformed(
                self.offset,
                format!(
                    "{} overruns declared frame length {}",
                    field, self.frame_len
                ),
            ));
        }
        Ok(())
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let n = read_fully(self.reader, buf)?;
        self.consumed += n as u64;
        if n < buf.len() {
            return Err(LogError::TruncatedFrame {
                offset: self.offset,
                expected: self.frame_len,
                available: self.consumed,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn check_frame_len(frame_len: u32, offset: u64, max_frame_size: u32) -> Result<()> {
    if (frame_len as usize) < MIN_FRAME_SIZE {
        return Err(malformed(
            offset,
            format!(
                "declared length {} is below the {} byte minimum",
                frame_len, MIN_FRAME_SIZE
            ),
        ));
    }
    // Well-formed but over the configured limit; not damage
    if frame_len > max_frame_size {
        return Err(LogError::FrameTooLarge {
            size: frame_len as u64,
            limit: max_frame_size,
        });
    }
    Ok(())
}

fn parse_relation(bytes: Vec<u8>, offset: u64) -> Result<String> {
    String::from_utf8(bytes).map_err(|_| malformed(offset, "relation label is not valid UTF-8".to_string()))
}

fn malformed(offset: u64, reason: String) -> LogError {
    LogError::MalformedFrame { offset, reason }
}

/// Read until `buf` is full or the stream ends; returns bytes read
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
