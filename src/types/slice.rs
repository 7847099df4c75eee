use crate::exception::{ExcType, RunResult};

/// A slice object: the `start:stop:step` triple from subscript syntax or
/// `BUILD_SLICE`. Missing components are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Slice {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl Slice {
    pub fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Self { start, stop, step }
    }

    /// Resolves the slice against a sequence of `length` elements, producing
    /// concrete `(start, stop, step, count)` values.
    ///
    /// Negative indices count from the end, out-of-range bounds clamp, and a
    /// negative step walks backwards. `count` is the number of elements the
    /// slice selects; iteration is `start, start+step, ...` for `count` steps.
    pub fn indices(&self, length: usize) -> RunResult<(i64, i64, i64, usize)> {
        let length = length as i64;
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(ExcType::value_error("slice step cannot be zero"));
        }

        let clamp = |idx: i64, low: i64, high: i64| -> i64 {
            let idx = if idx < 0 { idx + length } else { idx };
            idx.clamp(low, high)
        };

        let (default_start, default_stop, low, high) = if step > 0 {
            (0, length, 0, length)
        } else {
            (length - 1, -1, -1, length - 1)
        };

        let start = self.start.map_or(default_start, |s| clamp(s, low, high));
        let stop = self.stop.map_or(default_stop, |s| clamp(s, low, high));

        let count = if step > 0 {
            if stop > start {
                ((stop - start - 1) / step + 1) as usize
            } else {
                0
            }
        } else if start > stop {
            ((start - stop - 1) / (-step) + 1) as usize
        } else {
            0
        };
        Ok((start, stop, step, count))
    }

    /// The element indices the slice selects, in order.
    pub fn iter_indices(&self, length: usize) -> RunResult<impl Iterator<Item = usize>> {
        let (start, _, step, count) = self.indices(length)?;
        Ok((0..count).map(move |i| (start + step * i as i64) as usize))
    }
}

/// Normalizes a single subscript index against a sequence length. Negative
/// indices count from the end; anything out of range is `None`.
pub(crate) fn normalize_index(index: i64, length: usize) -> Option<usize> {
    let length = length as i64;
    let idx = if index < 0 { index + length } else { index };
    if (0..length).contains(&idx) {
        Some(idx as usize)
    } else {
        None
    }
}
