use std::cmp::Ordering;
use std::fmt::Write;

use crate::exception::{ExcType, RunResult};
use crate::types::slice::{normalize_index, Slice};

/// An immutable text value, indexed by code point.
///
/// Storage is UTF-8. For ASCII-only text a code-point index is a byte index
/// and no extra structure is kept; otherwise an offset table mapping each
/// code-point index to its byte offset is built once at construction, keeping
/// indexing and slicing O(1) instead of rescanning from the start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Str {
    data: String,
    char_len: usize,
    /// Byte offset of each code point, plus a final entry for the total
    /// length. Only present when `data` contains non-ASCII text.
    offsets: Option<Vec<u32>>,
}

impl Str {
    pub fn new(data: String) -> Self {
        if data.is_ascii() {
            let char_len = data.len();
            Self {
                data,
                char_len,
                offsets: None,
            }
        } else {
            let mut offsets: Vec<u32> = data.char_indices().map(|(i, _)| i as u32).collect();
            offsets.push(data.len() as u32);
            let char_len = offsets.len() - 1;
            Self {
                data,
                char_len,
                offsets: Some(offsets),
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// Length in code points.
    pub fn char_len(&self) -> usize {
        self.char_len
    }

    pub fn is_empty(&self) -> bool {
        self.char_len == 0
    }

    fn byte_offset(&self, char_idx: usize) -> usize {
        match &self.offsets {
            None => char_idx,
            Some(offsets) => offsets[char_idx] as usize,
        }
    }

    fn char_at(&self, char_idx: usize) -> char {
        let start = self.byte_offset(char_idx);
        self.data[start..].chars().next().expect("index in range")
    }

    /// Code-point indexing with negative-index support.
    pub fn index(&self, index: i64) -> RunResult<char> {
        match normalize_index(index, self.char_len) {
            Some(idx) => Ok(self.char_at(idx)),
            None => Err(ExcType::index_error("string")),
        }
    }

    /// Slicing by code-point offsets with Python slice semantics.
    pub fn slice(&self, slice: &Slice) -> RunResult<String> {
        let (start, stop, step, count) = slice.indices(self.char_len)?;
        if step == 1 {
            let lo = self.byte_offset(start as usize);
            let hi = self.byte_offset(stop.max(start) as usize);
            return Ok(self.data[lo..hi].to_string());
        }
        let mut out = String::with_capacity(count);
        for i in 0..count {
            out.push(self.char_at((start + step * i as i64) as usize));
        }
        Ok(out)
    }

    pub fn concat(&self, other: &Str) -> String {
        let mut out = String::with_capacity(self.data.len() + other.data.len());
        out.push_str(&self.data);
        out.push_str(&other.data);
        out
    }

    pub fn repeat(&self, count: usize) -> String {
        self.data.repeat(count)
    }

    pub fn contains(&self, needle: &Str) -> bool {
        self.data.contains(needle.as_str())
    }

    /// Lexicographic comparison by code point.
    pub fn cmp(&self, other: &Str) -> Ordering {
        self.data.cmp(&other.data)
    }

    /// Writes the quoted, escaped repr form.
    pub fn repr_fmt(&self, f: &mut impl Write) -> std::fmt::Result {
        let quote = if self.data.contains('\'') && !self.data.contains('"') {
            '"'
        } else {
            '\''
        };
        f.write_char(quote)?;
        for c in self.data.chars() {
            match c {
                '\\' => f.write_str("\\\\")?,
                '\n' => f.write_str("\\n")?,
                '\r' => f.write_str("\\r")?,
                '\t' => f.write_str("\\t")?,
                c if c == quote => {
                    f.write_char('\\')?;
                    f.write_char(c)?;
                }
                c if (c as u32) < 0x20 => write!(f, "\\x{:02x}", c as u32)?,
                c => f.write_char(c)?,
            }
        }
        f.write_char(quote)
    }
}

impl From<&str> for Str {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl From<String> for Str {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_has_no_offset_table() {
        let s = Str::from("hello");
        assert!(s.offsets.is_none());
        assert_eq!(s.char_len(), 5);
        assert_eq!(s.index(1).unwrap(), 'e');
        assert_eq!(s.index(-1).unwrap(), 'o');
    }

    #[test]
    fn test_code_point_indexing_non_ascii() {
        // Mixed 1, 2 and 4 byte encodings.
        let s = Str::from("aé𐍈z");
        assert!(s.offsets.is_some());
        assert_eq!(s.char_len(), 4);
        assert_eq!(s.index(0).unwrap(), 'a');
        assert_eq!(s.index(1).unwrap(), 'é');
        assert_eq!(s.index(2).unwrap(), '𐍈');
        assert_eq!(s.index(3).unwrap(), 'z');
        assert_eq!(s.index(-2).unwrap(), '𐍈');
        assert!(s.index(4).is_err());
    }

    #[test]
    fn test_slice_round_trip() {
        let s = Str::from("héllo wörld");
        for i in 0..=s.char_len() {
            let head = s.slice(&Slice::new(None, Some(i as i64), None)).unwrap();
            let tail = s.slice(&Slice::new(Some(i as i64), None, None)).unwrap();
            assert_eq!(format!("{head}{tail}"), s.as_str());
        }
    }

    #[test]
    fn test_slice_then_index_matches_offset_index() {
        let s = Str::from("αβγδεζ");
        let sub = Str::new(s.slice(&Slice::new(Some(1), Some(5), None)).unwrap());
        for k in 0..sub.char_len() {
            assert_eq!(sub.index(k as i64).unwrap(), s.index(1 + k as i64).unwrap());
        }
    }

    #[test]
    fn test_reverse_slice() {
        let s = Str::from("abc");
        assert_eq!(s.slice(&Slice::new(None, None, Some(-1))).unwrap(), "cba");
    }

    #[test]
    fn test_repr_escaping() {
        let mut out = String::new();
        Str::from("a'b\nc").repr_fmt(&mut out).unwrap();
        assert_eq!(out, "\"a'b\\nc\"");

        let mut out = String::new();
        Str::from("plain").repr_fmt(&mut out).unwrap();
        assert_eq!(out, "'plain'");
    }
}
