//! The block index file.
//!
//! ```text
//! [4 bytes: magic 0xBAAAD700, big-endian]
//! [1 byte:  format version]
//! series section:
//!   [u32: series count]
//!   per series:
//!     [uvarint: label count] then (uvarint len, name, uvarint len, value)*
//!     [uvarint: chunk count] then (varint min, varint max, u64 ref)*
//!   [u32: CRC32 of the section]
//! postings section:
//!   [u32: entry count] [u32 series ordinal]*
//!   [u32: CRC32 of the section]
//! toc:
//!   [u64: series section offset] [u64: postings section offset]
//!   [u32: CRC32 of the toc]
//! ```
//!
//! All fixed-width integers are big-endian.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::chunks::ChunkRef;
use crate::encoding::{encode_uvarint, encode_uvarint_bytes, encode_varint, Decbuf};
use crate::error::{TsdbError, TsdbResult};
use crate::labels::{Label, Labels};

pub const MAGIC_INDEX: u32 = 0xBAAA_D700;
pub const INDEX_FORMAT_V2: u8 = 2;

const HEADER_SIZE: usize = 5;
const TOC_SIZE: usize = 8 + 8 + 4;

/// Where a chunk lives and which time range it covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkMeta {
    pub min_time: i64,
    pub max_time: i64,
    pub chunk_ref: ChunkRef,
}

/// A series and its chunks as recorded in the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeriesEntry {
    pub labels: Labels,
    pub chunks: Vec<ChunkMeta>,
}

/// Assembles an index file in memory.
#[derive(Default)]
pub struct IndexWriter {
    series: Vec<SeriesEntry>,
}

impl IndexWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_series(&mut self, labels: Labels, chunks: Vec<ChunkMeta>) {
        self.series.push(SeriesEntry { labels, chunks });
    }

    pub fn num_series(&self) -> usize {
        self.series.len()
    }

    /// Serialize the index. Postings list every series ordered by label set.
    pub fn finish(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + self.series.len() * 64);
        buf.extend_from_slice(&MAGIC_INDEX.to_be_bytes());
        buf.push(INDEX_FORMAT_V2);

        let series_off = buf.len() as u64;
        buf.extend_from_slice(&(self.series.len() as u32).to_be_bytes());
        for s in &self.series {
            encode_uvarint(&mut buf, s.labels.len() as u64);
            for l in s.labels.iter() {
                encode_uvarint_bytes(&mut buf, l.name.as_bytes());
                encode_uvarint_bytes(&mut buf, l.value.as_bytes());
            }
            encode_uvarint(&mut buf, s.chunks.len() as u64);
            for c in &s.chunks {
                encode_varint(&mut buf, c.min_time);
                encode_varint(&mut buf, c.max_time);
                buf.extend_from_slice(&c.chunk_ref.0.to_be_bytes());
            }
        }
        let crc = crc32fast::hash(&buf[series_off as usize..]);
        buf.extend_from_slice(&crc.to_be_bytes());

        let mut order: Vec<u32> = (0..self.series.len() as u32).collect();
        order.sort_by(|a, b| self.series[*a as usize].labels.cmp(&self.series[*b as usize].labels));

        let postings_off = buf.len() as u64;
        buf.extend_from_slice(&(order.len() as u32).to_be_bytes());
        for ord in &order {
            buf.extend_from_slice(&ord.to_be_bytes());
        }
        let crc = crc32fast::hash(&buf[postings_off as usize..]);
        buf.extend_from_slice(&crc.to_be_bytes());

        let toc_off = buf.len();
        buf.extend_from_slice(&series_off.to_be_bytes());
        buf.extend_from_slice(&postings_off.to_be_bytes());
        let crc = crc32fast::hash(&buf[toc_off..]);
        buf.extend_from_slice(&crc.to_be_bytes());
        buf
    }
}

/// A fully decoded index.
#[derive(Debug)]
pub struct IndexReader {
    series: Vec<SeriesEntry>,
    postings: Vec<u32>,
}

impl IndexReader {
    /// Map and decode the index at `path`.
    pub fn open(path: &Path) -> TsdbResult<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(TsdbError::EmptyFile(path.to_path_buf()));
        }
        // SAFETY: the index is not modified while it is being decoded.
        let map = unsafe { Mmap::map(&file)? };
        Self::from_bytes(&map)
    }

    pub fn from_bytes(data: &[u8]) -> TsdbResult<Self> {
        let mut d = Decbuf::new(data, 0);
        let magic = d.be_u32()?;
        if magic != MAGIC_INDEX {
            return Err(TsdbError::InvalidMagic {
                expected: MAGIC_INDEX,
                actual: magic,
            });
        }
        let version = d.byte()?;
        if version != INDEX_FORMAT_V2 {
            return Err(TsdbError::UnsupportedVersion(version));
        }

        if data.len() < HEADER_SIZE + TOC_SIZE {
            return Err(TsdbError::corrupt(data.len(), "index too short for table of contents"));
        }
        let toc_at = data.len() - TOC_SIZE;
        let mut toc = Decbuf::new(&data[toc_at..], toc_at);
        let series_off = toc.be_u64()? as usize;
        let postings_off = toc.be_u64()? as usize;
        let expected = toc.be_u32()?;
        let computed = crc32fast::hash(&data[toc_at..toc_at + 16]);
        if expected != computed {
            return Err(TsdbError::ChecksumMismatch {
                what: "index table of contents".into(),
                expected,
                computed,
            });
        }
        if series_off < HEADER_SIZE || series_off > postings_off || postings_off > toc_at {
            return Err(TsdbError::corrupt(toc_at, "section offsets out of bounds"));
        }

        let series_data = section(data, series_off, postings_off, "series")?;
        let postings_data = section(data, postings_off, toc_at, "postings")?;

        let series = decode_series(series_data, series_off)?;
        let postings = decode_postings(postings_data, postings_off, series.len())?;
        Ok(Self { series, postings })
    }

    pub fn series(&self) -> &[SeriesEntry] {
        &self.series
    }

    /// Series ordinals in posting order.
    pub fn postings(&self) -> &[u32] {
        &self.postings
    }

    /// Series in posting order.
    pub fn series_by_postings(&self) -> impl Iterator<Item = &SeriesEntry> {
        self.postings.iter().map(|o| &self.series[*o as usize])
    }
}

/// Slice out `[start, end)` minus its trailing CRC after checking it.
fn section<'a>(data: &'a [u8], start: usize, end: usize, name: &str) -> TsdbResult<&'a [u8]> {
    if end - start < 8 {
        return Err(TsdbError::corrupt(start, format!("{name} section too short")));
    }
    let body = &data[start..end - 4];
    let mut d = Decbuf::new(&data[end - 4..end], end - 4);
    let expected = d.be_u32()?;
    let computed = crc32fast::hash(body);
    if expected != computed {
        return Err(TsdbError::ChecksumMismatch {
            what: format!("index {name} section"),
            expected,
            computed,
        });
    }
    Ok(body)
}

fn decode_series(data: &[u8], base: usize) -> TsdbResult<Vec<SeriesEntry>> {
    let mut d = Decbuf::new(data, base);
    let count = d.be_u32()? as usize;
    let mut series = Vec::with_capacity(count.min(data.len()));
    for _ in 0..count {
        let n = d.uvarint_len()?;
        let mut labels = Vec::with_capacity(n);
        for _ in 0..n {
            let name = d.uvarint_str()?;
            let value = d.uvarint_str()?;
            labels.push(Label::new(name, value));
        }
        let n = d.uvarint_len()?;
        let mut chunks = Vec::with_capacity(n);
        for _ in 0..n {
            let min_time = d.varint()?;
            let max_time = d.varint()?;
            let chunk_ref = ChunkRef(d.be_u64()?);
            chunks.push(ChunkMeta {
                min_time,
                max_time,
                chunk_ref,
            });
        }
        series.push(SeriesEntry {
            labels: Labels::from_vec(labels),
            chunks,
        });
    }
    if d.remaining() != 0 {
        return Err(TsdbError::corrupt(d.offset(), "trailing bytes in series section"));
    }
    Ok(series)
}

fn decode_postings(data: &[u8], base: usize, num_series: usize) -> TsdbResult<Vec<u32>> {
    let mut d = Decbuf::new(data, base);
    let count = d.be_u32()? as usize;
    let mut postings = Vec::with_capacity(count.min(num_series));
    for _ in 0..count {
        let at = d.offset();
        let ord = d.be_u32()?;
        if ord as usize >= num_series {
            return Err(TsdbError::corrupt(at, format!("posting references unknown series {ord}")));
        }
        postings.push(ord);
    }
    if d.remaining() != 0 {
        return Err(TsdbError::corrupt(d.offset(), "trailing bytes in postings section"));
    }
    Ok(postings)
}
