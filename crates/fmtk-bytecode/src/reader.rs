use crate::error::{BytecodeError, Result};

/// Cursor over a little-endian chunk with 4-byte `int` and 8-byte `size_t`.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(BytecodeError::UnexpectedEof {
                need: n,
                at: self.pos,
            })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn int(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn size_t(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub(crate) fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    /// A non-negative `int` count, bounded by the bytes left so a corrupt count
    /// cannot trigger a huge allocation.
    pub(crate) fn count(&mut self) -> Result<usize> {
        let n = self.int()?;
        match usize::try_from(n) {
            Ok(n) if n <= self.remaining() => Ok(n),
            _ => Err(BytecodeError::BadCount(i64::from(n))),
        }
    }

    /// `size_t` length including the trailing NUL; zero means no string.
    pub(crate) fn string(&mut self) -> Result<Option<Vec<u8>>> {
        let len = self.size_t()?;
        if len == 0 {
            return Ok(None);
        }
        let len = usize::try_from(len)
            .ok()
            .filter(|len| *len <= self.remaining())
            .ok_or(BytecodeError::BadCount(len as i64))?;
        let bytes = self.bytes(len)?;
        Ok(Some(bytes[..len - 1].to_vec()))
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }
}
