//! Chunk segment files (`chunks/NNNNNN`).
//!
//! ```text
//! [4 bytes: magic 0x85BD40DD, big-endian]
//! [1 byte:  format version]
//! [3 bytes: padding]
//! records:
//!   [uvarint: data length]
//!   [1 byte:  encoding]
//!   [N bytes: data]
//!   [4 bytes: CRC32 of encoding + data, big-endian]
//! ```

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::encoding::{encode_uvarint, encode_varint, Decbuf};
use crate::error::{TsdbError, TsdbResult};

pub const MAGIC_CHUNKS: u32 = 0x85BD_40DD;
pub const CHUNKS_FORMAT_V1: u8 = 1;
pub const SEGMENT_HEADER_SIZE: usize = 8;

/// Default upper bound for a segment before the writer starts a new one.
pub const DEFAULT_MAX_SEGMENT_SIZE: usize = 512 * 1024 * 1024;

/// Chunk payload encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkEncoding {
    /// Delta-encoded timestamps with raw float values.
    Raw = 1,
}

impl ChunkEncoding {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Raw),
            _ => None,
        }
    }
}

/// One sample of a series.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

/// Reference to a chunk: segment sequence number in the upper 32 bits,
/// byte offset of the record inside the segment in the lower 32 bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkRef(pub u64);

impl ChunkRef {
    pub fn new(segment: u32, offset: u32) -> Self {
        Self(((segment as u64) << 32) | offset as u64)
    }

    pub fn segment(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn offset(&self) -> u32 {
        self.0 as u32
    }
}

/// Encode samples with [`ChunkEncoding::Raw`].
pub fn encode_samples(samples: &[Sample]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(samples.len() * 10 + 2);
    encode_uvarint(&mut buf, samples.len() as u64);
    let mut prev = 0i64;
    for (i, s) in samples.iter().enumerate() {
        if i == 0 {
            encode_varint(&mut buf, s.timestamp);
        } else {
            encode_varint(&mut buf, s.timestamp.wrapping_sub(prev));
        }
        prev = s.timestamp;
        buf.extend_from_slice(&s.value.to_bits().to_be_bytes());
    }
    buf
}

/// Decode a [`ChunkEncoding::Raw`] payload.
pub fn decode_samples(data: &[u8]) -> TsdbResult<Vec<Sample>> {
    let mut d = Decbuf::new(data, 0);
    let n = d.uvarint()?;
    let mut samples = Vec::with_capacity(n.min(data.len() as u64) as usize);
    let mut prev = 0i64;
    for i in 0..n {
        let delta = d.varint()?;
        let timestamp = if i == 0 { delta } else { prev.wrapping_add(delta) };
        prev = timestamp;
        let value = f64::from_bits(d.be_u64()?);
        samples.push(Sample { timestamp, value });
    }
    Ok(samples)
}

/// Builds one segment file in memory.
pub struct SegmentWriter {
    buf: Vec<u8>,
}

impl SegmentWriter {
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(4096);
        buf.extend_from_slice(&MAGIC_CHUNKS.to_be_bytes());
        buf.push(CHUNKS_FORMAT_V1);
        buf.extend_from_slice(&[0u8; 3]);
        Self { buf }
    }

    /// Append a chunk record and return its offset in the segment.
    pub fn append(&mut self, encoding: ChunkEncoding, data: &[u8]) -> u32 {
        let offset = self.buf.len() as u32;
        encode_uvarint(&mut self.buf, data.len() as u64);
        let start = self.buf.len();
        self.buf.push(encoding as u8);
        self.buf.extend_from_slice(data);
        let crc = crc32fast::hash(&self.buf[start..]);
        self.buf.extend_from_slice(&crc.to_be_bytes());
        offset
    }

    /// Current size in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether no chunk has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.buf.len() == SEGMENT_HEADER_SIZE
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for SegmentWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// A decoded chunk record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkRecord {
    pub offset: u32,
    pub encoding: u8,
    pub data: Vec<u8>,
}

/// Check the header of a segment.
fn check_header(data: &[u8]) -> TsdbResult<()> {
    let mut d = Decbuf::new(data, 0);
    let magic = d.be_u32()?;
    if magic != MAGIC_CHUNKS {
        return Err(TsdbError::InvalidMagic {
            expected: MAGIC_CHUNKS,
            actual: magic,
        });
    }
    let version = d.byte()?;
    if version != CHUNKS_FORMAT_V1 {
        return Err(TsdbError::UnsupportedVersion(version));
    }
    d.bytes(3)?;
    Ok(())
}

/// Walk every record of a segment, verifying its checksum.
///
/// Returns the offsets of all records. `is_cancelled` is polled between
/// records.
pub fn verify_segment(data: &[u8], is_cancelled: &dyn Fn() -> bool) -> TsdbResult<Vec<u32>> {
    check_header(data)?;

    let mut d = Decbuf::new(&data[SEGMENT_HEADER_SIZE..], SEGMENT_HEADER_SIZE);
    let mut offsets = Vec::new();
    while d.remaining() > 0 {
        if is_cancelled() {
            return Err(TsdbError::Cancelled);
        }
        let offset = d.offset();
        let len = d.uvarint_len()?;
        let body = d.bytes(len + 1)?;
        let expected = d.be_u32()?;
        let computed = crc32fast::hash(body);
        if expected != computed {
            return Err(TsdbError::ChecksumMismatch {
                what: format!("chunk at offset {offset}"),
                expected,
                computed,
            });
        }
        if ChunkEncoding::from_byte(body[0]).is_none() {
            return Err(TsdbError::corrupt(offset, format!("unknown chunk encoding {}", body[0])));
        }
        offsets.push(offset as u32);
    }
    Ok(offsets)
}

/// Read the record at `offset`, verifying its checksum.
pub fn read_chunk(data: &[u8], offset: u32) -> TsdbResult<ChunkRecord> {
    check_header(data)?;
    let start = offset as usize;
    if start < SEGMENT_HEADER_SIZE || start >= data.len() {
        return Err(TsdbError::corrupt(start, "chunk offset outside segment"));
    }
    let mut d = Decbuf::new(&data[start..], start);
    let len = d.uvarint_len()?;
    let body = d.bytes(len + 1)?;
    let expected = d.be_u32()?;
    let computed = crc32fast::hash(body);
    if expected != computed {
        return Err(TsdbError::ChecksumMismatch {
            what: format!("chunk at offset {offset}"),
            expected,
            computed,
        });
    }
    Ok(ChunkRecord {
        offset,
        encoding: body[0],
        data: body[1..].to_vec(),
    })
}

/// Memory-map a segment file. Zero-length files are rejected up front.
pub fn map_segment(path: &Path) -> TsdbResult<Mmap> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(TsdbError::EmptyFile(path.to_path_buf()));
    }
    // SAFETY: block files are immutable once staged; nothing truncates them
    // while the map is alive.
    let map = unsafe { Mmap::map(&file)? };
    Ok(map)
}
