use std::cmp::Ordering;
use std::fmt::Write;

use crate::exception::{ExcType, RunResult};
use crate::types::slice::{normalize_index, Slice};

/// An immutable sequence of octets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Bytes(Vec<u8>);

impl Bytes {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn index(&self, index: i64) -> RunResult<u8> {
        match normalize_index(index, self.0.len()) {
            Some(idx) => Ok(self.0[idx]),
            None => Err(ExcType::index_error("bytes")),
        }
    }

    pub fn slice(&self, slice: &Slice) -> RunResult<Vec<u8>> {
        slice_bytes(&self.0, slice)
    }

    pub fn concat(&self, other: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() + other.len());
        out.extend_from_slice(&self.0);
        out.extend_from_slice(other);
        out
    }

    pub fn repeat(&self, count: usize) -> Vec<u8> {
        self.0.repeat(count)
    }

    pub fn cmp(&self, other: &[u8]) -> Ordering {
        self.0.as_slice().cmp(other)
    }

    pub fn repr_fmt(&self, f: &mut impl Write) -> std::fmt::Result {
        repr_bytes(&self.0, f)
    }
}

/// A mutable sequence of octets with a buffer-export guard.
///
/// Consumers that take a raw view of the storage register an outstanding
/// export; while any export is live, every operation that could resize or
/// reallocate the storage fails with BufferError, so a view never observes
/// the buffer relocated or truncated beneath it. Element writes that keep the
/// length unchanged remain allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ByteArray {
    data: Vec<u8>,
    exports: usize,
}

impl ByteArray {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, exports: 0 }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Registers an outstanding export of the storage.
    pub fn acquire_export(&mut self) {
        self.exports += 1;
    }

    /// Releases one outstanding export.
    pub fn release_export(&mut self) -> RunResult<()> {
        if self.exports == 0 {
            return Err(crate::exception::RunError::internal(
                "bytearray export released with none outstanding",
            ));
        }
        self.exports -= 1;
        Ok(())
    }

    pub fn has_exports(&self) -> bool {
        self.exports > 0
    }

    fn check_resizable(&self) -> RunResult<()> {
        if self.exports > 0 {
            Err(ExcType::buffer_error_resize())
        } else {
            Ok(())
        }
    }

    pub fn index(&self, index: i64) -> RunResult<u8> {
        match normalize_index(index, self.data.len()) {
            Some(idx) => Ok(self.data[idx]),
            None => Err(ExcType::index_error("bytearray")),
        }
    }

    /// In-place element write; allowed even while exports are outstanding
    /// because it never moves the storage.
    pub fn set_index(&mut self, index: i64, byte: i64) -> RunResult<()> {
        let Some(idx) = normalize_index(index, self.data.len()) else {
            return Err(ExcType::index_error("bytearray"));
        };
        let byte = u8::try_from(byte)
            .map_err(|_| ExcType::value_error("byte must be in range(0, 256)"))?;
        self.data[idx] = byte;
        Ok(())
    }

    pub fn slice(&self, slice: &Slice) -> RunResult<Vec<u8>> {
        slice_bytes(&self.data, slice)
    }

    /// Removes one element, shrinking the storage.
    pub fn remove_index(&mut self, index: i64) -> RunResult<()> {
        self.check_resizable()?;
        let Some(idx) = normalize_index(index, self.data.len()) else {
            return Err(ExcType::index_error("bytearray"));
        };
        self.data.remove(idx);
        Ok(())
    }

    pub fn push(&mut self, byte: i64) -> RunResult<()> {
        self.check_resizable()?;
        let byte = u8::try_from(byte)
            .map_err(|_| ExcType::value_error("byte must be in range(0, 256)"))?;
        self.data.push(byte);
        Ok(())
    }

    pub fn extend_from(&mut self, other: &[u8]) -> RunResult<()> {
        self.check_resizable()?;
        self.data.extend_from_slice(other);
        Ok(())
    }

    pub fn clear(&mut self) -> RunResult<()> {
        self.check_resizable()?;
        self.data.clear();
        Ok(())
    }

    pub fn repr_fmt(&self, f: &mut impl Write) -> std::fmt::Result {
        f.write_str("bytearray(")?;
        repr_bytes(&self.data, f)?;
        f.write_char(')')
    }
}

fn slice_bytes(data: &[u8], slice: &Slice) -> RunResult<Vec<u8>> {
    let (start, stop, step, count) = slice.indices(data.len())?;
    if step == 1 {
        return Ok(data[start as usize..stop.max(start) as usize].to_vec());
    }
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        out.push(data[(start + step * i as i64) as usize]);
    }
    Ok(out)
}

fn repr_bytes(data: &[u8], f: &mut impl Write) -> std::fmt::Result {
    f.write_str("b'")?;
    for &b in data {
        match b {
            b'\\' => f.write_str("\\\\")?,
            b'\'' => f.write_str("\\'")?,
            b'\n' => f.write_str("\\n")?,
            b'\r' => f.write_str("\\r")?,
            b'\t' => f.write_str("\\t")?,
            0x20..=0x7e => f.write_char(b as char)?,
            _ => write!(f, "\\x{b:02x}")?,
        }
    }
    f.write_char('\'')
}
