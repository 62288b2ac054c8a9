//! Record framing for chunk streams

use crate::config::MAX_RECORD_SIZE;
use crate::{Document, FtdcError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::{ErrorKind, Read};

/// Record type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Metadata document
    Metadata = 0,
    /// Compressed chunk
    Chunk = 1,
}

impl TryFrom<u8> for RecordKind {
    type Error = FtdcError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(RecordKind::Metadata),
            1 => Ok(RecordKind::Chunk),
            _ => Err(FtdcError::InvalidFormat(format!(
                "Invalid record kind: {}",
                value
            ))),
        }
    }
}

/// One framed record of a chunk stream
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: RecordKind,
    pub body: Bytes,
}

impl Record {
    /// Create a metadata record
    pub fn metadata(doc: &Document) -> Result<Self> {
        Ok(Self {
            kind: RecordKind::Metadata,
            body: doc.to_bytes()?,
        })
    }

    /// Create a chunk record from a compressed chunk payload
    pub fn chunk(payload: Bytes) -> Self {
        Self {
            kind: RecordKind::Chunk,
            body: payload,
        }
    }

    /// Serialize the record with length prefix and CRC checksum
    ///
    /// Format:
    /// - 4 bytes: record length (excluding this field)
    /// - 1 byte: record kind
    /// - N bytes: body
    /// - 4 bytes: CRC32 of kind and body
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + 1 + self.body.len() + 4);

        buf.put_u32_le(0);
        buf.put_u8(self.kind as u8);
        buf.put_slice(&self.body);

        let checksum = crc32fast::hash(&buf[4..]);
        buf.put_u32_le(checksum);

        let len = (buf.len() - 4) as u32;
        buf[0..4].copy_from_slice(&len.to_le_bytes());

        buf.freeze()
    }

    /// Deserialize a record from the front of `data`, returning it and the
    /// number of bytes consumed
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 4 {
            return Err(FtdcError::InvalidFormat("Record too short".into()));
        }

        let mut cursor = data;
        let len = cursor.get_u32_le() as usize;
        if data.len() < 4 + len {
            return Err(FtdcError::InvalidFormat("Incomplete record".into()));
        }

        let record = Self::from_frame(&data[4..4 + len])?;
        Ok((record, 4 + len))
    }

    /// Read the next record from a byte source
    ///
    /// Returns `Ok(None)` on a clean end of stream; a stream ending inside
    /// a record is an error.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<Self>> {
        let mut header = [0u8; 4];
        let mut filled = 0;
        while filled < header.len() {
            match reader.read(&mut header[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(FtdcError::InvalidFormat(
                        "Truncated record header".into(),
                    ))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let len = u32::from_le_bytes(header) as usize;
        if len > MAX_RECORD_SIZE {
            return Err(FtdcError::InvalidFormat(format!(
                "Record length {} exceeds limit {}",
                len, MAX_RECORD_SIZE
            )));
        }

        let mut frame = vec![0u8; len];
        reader.read_exact(&mut frame).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => FtdcError::InvalidFormat("Incomplete record".into()),
            _ => FtdcError::Io(e),
        })?;

        Self::from_frame(&frame).map(Some)
    }

    fn from_frame(frame: &[u8]) -> Result<Self> {
        if frame.len() < 5 {
            return Err(FtdcError::InvalidFormat("Record too short".into()));
        }

        let (content, trailer) = frame.split_at(frame.len() - 4);
        let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = crc32fast::hash(content);
        if expected != actual {
            return Err(FtdcError::ChecksumMismatch { expected, actual });
        }

        let kind = RecordKind::try_from(content[0])?;
        Ok(Self {
            kind,
            body: Bytes::copy_from_slice(&content[1..]),
        })
    }
}
