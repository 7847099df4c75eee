use crate::heap::HeapId;

/// Iteration state over a heap sequence, created by `GET_ITER` and advanced
/// by `FOR_ITER` (see `Heap::advance_iterator`).
///
/// Sequence variants hold the container's heap id plus a cursor; the dict
/// variant also remembers the length observed at creation so mutation during
/// iteration is detected.
#[derive(Debug, Clone)]
pub(crate) enum SeqIterator {
    List { id: HeapId, index: usize },
    Tuple { id: HeapId, index: usize },
    /// Cursor is a code-point index.
    Str { id: HeapId, index: usize },
    Bytes { id: HeapId, index: usize },
    ByteArray { id: HeapId, index: usize },
    Dict { id: HeapId, index: usize, expected_len: usize },
    Range { next: i64, stop: i64, step: i64 },
}

impl SeqIterator {
    /// The container this iterator walks, if it references one.
    pub fn source(&self) -> Option<HeapId> {
        match self {
            Self::List { id, .. }
            | Self::Tuple { id, .. }
            | Self::Str { id, .. }
            | Self::Bytes { id, .. }
            | Self::ByteArray { id, .. }
            | Self::Dict { id, .. } => Some(*id),
            Self::Range { .. } => None,
        }
    }
}
