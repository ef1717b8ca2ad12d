//! Integer encodings and a bounds-checked decoding cursor.

use crate::error::{TsdbError, TsdbResult};

/// Encode a u64 as an unsigned LEB128 varint.
pub(crate) fn encode_uvarint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Encode an i64 as a zig-zag varint.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, value: i64) {
    encode_uvarint(buf, ((value << 1) ^ (value >> 63)) as u64);
}

/// Decode an unsigned varint. Returns (value, bytes_consumed).
pub(crate) fn decode_uvarint(data: &[u8]) -> TsdbResult<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        if shift >= 64 {
            return Err(TsdbError::corrupt(0, "varint overflow"));
        }
    }
    Err(TsdbError::corrupt(0, "truncated varint"))
}

/// Append a length-prefixed byte string.
pub(crate) fn encode_uvarint_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    encode_uvarint(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

/// Cursor over an encoded buffer.
///
/// Every read is bounds-checked and reports the absolute offset of the
/// failure, so corruption anywhere in a file surfaces as an error rather
/// than a panic.
pub(crate) struct Decbuf<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Decbuf<'a> {
    /// Cursor over `data`, whose first byte sits at `base` in the file.
    pub(crate) fn new(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    pub(crate) fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn bytes(&mut self, n: usize) -> TsdbResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(TsdbError::corrupt(
                self.offset(),
                format!("need {n} bytes, have {}", self.remaining()),
            ));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn byte(&mut self) -> TsdbResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn be_u32(&mut self) -> TsdbResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn be_u64(&mut self) -> TsdbResult<u64> {
        let b = self.bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_be_bytes(arr))
    }

    pub(crate) fn uvarint(&mut self) -> TsdbResult<u64> {
        let at = self.offset();
        let (value, consumed) = decode_uvarint(&self.data[self.pos..]).map_err(|e| match e {
            TsdbError::Corrupt { reason, .. } => TsdbError::corrupt(at, reason),
            other => other,
        })?;
        self.pos += consumed;
        Ok(value)
    }

    pub(crate) fn varint(&mut self) -> TsdbResult<i64> {
        let u = self.uvarint()?;
        Ok(((u >> 1) as i64) ^ -((u & 1) as i64))
    }

    /// Read a uvarint used as a length or count, capped by what is left.
    pub(crate) fn uvarint_len(&mut self) -> TsdbResult<usize> {
        let at = self.offset();
        let n = self.uvarint()?;
        if n > self.remaining() as u64 {
            return Err(TsdbError::corrupt(at, format!("length {n} exceeds remaining data")));
        }
        Ok(n as usize)
    }

    pub(crate) fn uvarint_str(&mut self) -> TsdbResult<&'a str> {
        let n = self.uvarint_len()?;
        let at = self.offset();
        let raw = self.bytes(n)?;
        std::str::from_utf8(raw).map_err(|_| TsdbError::corrupt(at, "invalid UTF-8 string"))
    }
}
