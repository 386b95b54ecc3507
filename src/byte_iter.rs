use crate::error::*;
use crate::leb128::{read_leb128, read_sleb128};

/// Cursor over a module's bytes.
#[derive(Clone, Copy)]
pub struct ByteIter<'a> {
    pub bytes: &'a [u8],
    pub idx: usize,
}

impl<'a> ByteIter<'a> {
    #[inline]
    pub fn new(bytes: &'a [u8], idx: usize) -> Self { Self { bytes, idx } }
    #[inline]
    pub fn empty(&self) -> bool { self.idx >= self.bytes.len() }
    #[inline]
    pub fn has_n_left(&self, n: usize) -> bool { self.idx.saturating_add(n) <= self.bytes.len() }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, Error> {
        let b = *self.bytes.get(self.idx).ok_or(Error::compile(UNEXPECTED_END))?;
        self.idx += 1;
        Ok(b)
    }

    #[inline]
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if !self.has_n_left(len) { return compile(UNEXPECTED_END); }
        let out = &self.bytes[self.idx..self.idx + len];
        self.idx += len;
        Ok(out)
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(read_leb128(self.bytes, &mut self.idx, 32)? as u32)
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(read_sleb128(self.bytes, &mut self.idx, 32)? as i32)
    }

    #[inline]
    pub fn read_i64(&mut self) -> Result<i64, Error> {
        read_sleb128(self.bytes, &mut self.idx, 64)
    }

    #[inline]
    pub fn read_f32_bits(&mut self) -> Result<u32, Error> {
        let raw = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    #[inline]
    pub fn read_f64_bits(&mut self) -> Result<u64, Error> {
        let raw = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_name(&mut self) -> Result<String, Error> {
        let len = self.read_u32()? as usize;
        let raw = self.read_bytes(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| Error::compile(INVALID_UTF8))
    }

    /// Length-prefixed vector, decoding each element with `f`.
    pub fn read_vec<T>(&mut self, mut f: impl FnMut(&mut Self) -> Result<T, Error>) -> Result<Vec<T>, Error> {
        let count = self.read_u32()? as usize;
        let mut out = Vec::with_capacity(count.min(self.bytes.len()));
        for _ in 0..count {
            out.push(f(self)?);
        }
        Ok(out)
    }
}
