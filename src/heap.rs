use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::exception::{ExcType, RunResult, SimpleException};
use crate::types::{
    ByteArray, Bytes, Complex, Dict, Function, GenState, Generator, List, LongInt, Module, Range,
    SeqIterator, Slice, Str, Tuple, Type,
};
use crate::value::Value;

/// Index of a value stored in the heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapId(usize);

impl HeapId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Every runtime value that lives in the arena rather than inline in `Value`.
#[derive(Debug)]
pub(crate) enum HeapData {
    Long(LongInt),
    Complex(Complex),
    Str(Str),
    Bytes(Bytes),
    ByteArray(ByteArray),
    Tuple(Tuple),
    List(List),
    Dict(Dict),
    Slice(Slice),
    Range(Range),
    Function(Function),
    /// A single mutable value shared between a closure and the scope that
    /// created it.
    Cell(Value),
    Exception(SimpleException),
    Iterator(SeqIterator),
    Generator(Generator),
    Module(Module),
}

impl HeapData {
    pub fn py_type(&self) -> Type {
        match self {
            Self::Long(_) => Type::Int,
            Self::Complex(_) => Type::Complex,
            Self::Str(_) => Type::Str,
            Self::Bytes(_) => Type::Bytes,
            Self::ByteArray(_) => Type::ByteArray,
            Self::Tuple(_) => Type::Tuple,
            Self::List(_) => Type::List,
            Self::Dict(_) => Type::Dict,
            Self::Slice(_) => Type::Slice,
            Self::Range(_) => Type::Range,
            Self::Function(_) => Type::Function,
            Self::Cell(_) => Type::Cell,
            Self::Exception(_) => Type::Exception,
            Self::Iterator(_) => Type::Iterator,
            Self::Generator(_) => Type::Generator,
            Self::Module(_) => Type::Module,
        }
    }

    pub fn py_len(&self) -> Option<usize> {
        match self {
            Self::Str(s) => Some(s.char_len()),
            Self::Bytes(b) => Some(b.len()),
            Self::ByteArray(b) => Some(b.len()),
            Self::Tuple(t) => Some(t.len()),
            Self::List(l) => Some(l.len()),
            Self::Dict(d) => Some(d.len()),
            Self::Range(r) => Some(r.len()),
            _ => None,
        }
    }

    pub fn py_bool(&self) -> bool {
        match self {
            Self::Long(l) => !l.is_zero(),
            Self::Complex(c) => !c.is_zero(),
            Self::Str(s) => !s.is_empty(),
            Self::Bytes(b) => !b.is_empty(),
            Self::ByteArray(b) => !b.is_empty(),
            Self::Tuple(t) => !t.is_empty(),
            Self::List(l) => !l.is_empty(),
            Self::Dict(d) => !d.is_empty(),
            Self::Range(r) => !r.is_empty(),
            Self::Slice(_)
            | Self::Function(_)
            | Self::Cell(_)
            | Self::Exception(_)
            | Self::Iterator(_)
            | Self::Generator(_)
            | Self::Module(_) => true,
        }
    }

    /// Enumerates the heap ids this value keeps alive, for the collector.
    fn trace(&self, out: &mut Vec<HeapId>) {
        fn trace_values(values: &[Value], out: &mut Vec<HeapId>) {
            out.extend(values.iter().filter_map(Value::heap_id));
        }
        match self {
            Self::Tuple(t) => trace_values(t.as_vec(), out),
            Self::List(l) => trace_values(l.as_vec(), out),
            Self::Dict(d) => {
                for entry in d.entries() {
                    out.extend(entry.key.heap_id());
                    out.extend(entry.value.heap_id());
                }
            }
            Self::Function(f) => {
                trace_values(f.defaults(), out);
                out.extend_from_slice(f.closure());
                out.extend(f.globals());
            }
            Self::Cell(v) => out.extend(v.heap_id()),
            Self::Iterator(it) => out.extend(it.source()),
            Self::Generator(gen) => match gen.state() {
                GenState::Created(frame) | GenState::Suspended(frame) => frame.trace(out),
                GenState::Running | GenState::Done => {}
            },
            Self::Module(m) => out.push(m.globals()),
            Self::Long(_)
            | Self::Complex(_)
            | Self::Str(_)
            | Self::Bytes(_)
            | Self::ByteArray(_)
            | Self::Slice(_)
            | Self::Range(_)
            | Self::Exception(_) => {}
        }
    }
}

/// Hash caching state for a heap entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HashState {
    /// Possibly hashable, not yet computed.
    Unknown,
    Cached(u64),
    /// Mutable or otherwise unhashable; using it as a dict key is a TypeError.
    Unhashable,
}

impl HashState {
    fn for_data(data: &HeapData) -> Self {
        match data {
            HeapData::Long(_)
            | HeapData::Complex(_)
            | HeapData::Str(_)
            | HeapData::Bytes(_)
            | HeapData::Tuple(_)
            | HeapData::Slice(_)
            | HeapData::Range(_)
            | HeapData::Function(_)
            | HeapData::Cell(_) => Self::Unknown,
            HeapData::ByteArray(_)
            | HeapData::List(_)
            | HeapData::Dict(_)
            | HeapData::Exception(_)
            | HeapData::Iterator(_)
            | HeapData::Generator(_)
            | HeapData::Module(_) => Self::Unhashable,
        }
    }
}

#[derive(Debug)]
struct HeapEntry {
    /// `None` while the payload is temporarily taken out by
    /// `with_entry_mut`/`with_two`.
    data: Option<HeapData>,
    hash_state: HashState,
    marked: bool,
}

macro_rules! take_data {
    ($self:ident, $id:expr, $func_name:literal) => {
        $self
            .entries
            .get_mut($id.index())
            .expect(concat!("Heap::", $func_name, ": slot missing"))
            .as_mut()
            .expect(concat!("Heap::", $func_name, ": object already collected"))
            .data
            .take()
            .expect(concat!("Heap::", $func_name, ": data already borrowed"))
    };
}

macro_rules! restore_data {
    ($self:ident, $id:expr, $new_data:expr, $func_name:literal) => {{
        let entry = $self
            .entries
            .get_mut($id.index())
            .expect(concat!("Heap::", $func_name, ": slot missing"))
            .as_mut()
            .expect(concat!("Heap::", $func_name, ": object already collected"));
        entry.data = Some($new_data);
    }};
}

/// Arena backing all heap-resident runtime values, reclaimed by mark-sweep.
///
/// Containers, cells and generator frames form arbitrary reference cycles, so
/// there is no per-object reference counting: [`Heap::collect`] traces from a
/// root set and frees everything unreached. Collection only runs when the
/// runtime asks for it (no interpreter is mid-flight with values on a host
/// stack the heap cannot see), so between collections the arena only grows.
/// Freed slots are reused through a free list.
#[derive(Debug, Default)]
pub(crate) struct Heap {
    entries: Vec<Option<HeapEntry>>,
    free_list: Vec<HeapId>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live values.
    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn allocate(&mut self, data: HeapData) -> HeapId {
        let hash_state = HashState::for_data(&data);
        let entry = HeapEntry {
            data: Some(data),
            hash_state,
            marked: false,
        };
        if let Some(id) = self.free_list.pop() {
            self.entries[id.index()] = Some(entry);
            id
        } else {
            let id = HeapId(self.entries.len());
            self.entries.push(Some(entry));
            id
        }
    }

    /// # Panics
    /// Panics if the id is stale or the payload is currently borrowed; both
    /// indicate an interpreter bug, not a user error.
    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        self.entries
            .get(id.index())
            .expect("Heap::get: slot missing")
            .as_ref()
            .expect("Heap::get: object already collected")
            .data
            .as_ref()
            .expect("Heap::get: data currently borrowed")
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        self.entries
            .get_mut(id.index())
            .expect("Heap::get_mut: slot missing")
            .as_mut()
            .expect("Heap::get_mut: object already collected")
            .data
            .as_mut()
            .expect("Heap::get_mut: data currently borrowed")
    }

    /// Mutable access to one entry while the heap itself stays usable inside
    /// the closure (to read other values or allocate results). The payload is
    /// taken out for the duration and restored afterwards.
    pub fn with_entry_mut<F, R>(&mut self, id: HeapId, f: F) -> R
    where
        F: FnOnce(&mut Self, &mut HeapData) -> R,
    {
        let mut data = take_data!(self, id, "with_entry_mut");
        let result = f(self, &mut data);
        restore_data!(self, id, data, "with_entry_mut");
        result
    }

    /// Borrows two entries at once, with reentrant heap access. Handles the
    /// aliased case where both ids name the same entry.
    pub fn with_two<F, R>(&mut self, left: HeapId, right: HeapId, f: F) -> R
    where
        F: FnOnce(&mut Self, &HeapData, &HeapData) -> R,
    {
        if left == right {
            let data = take_data!(self, left, "with_two");
            let result = f(self, &data, &data);
            restore_data!(self, left, data, "with_two");
            result
        } else {
            let left_data = take_data!(self, left, "with_two (left)");
            let right_data = take_data!(self, right, "with_two (right)");
            let result = f(self, &left_data, &right_data);
            restore_data!(self, right, right_data, "with_two (right)");
            restore_data!(self, left, left_data, "with_two (left)");
            result
        }
    }

    /// Returns the hash of an immutable heap value, computing and caching it
    /// on first use. `None` means the value is unhashable.
    pub fn get_or_compute_hash(&mut self, id: HeapId) -> Option<u64> {
        let entry = self
            .entries
            .get_mut(id.index())
            .expect("Heap::get_or_compute_hash: slot missing")
            .as_mut()
            .expect("Heap::get_or_compute_hash: object already collected");
        match entry.hash_state {
            HashState::Unhashable => return None,
            HashState::Cached(hash) => return Some(hash),
            HashState::Unknown => {}
        }

        // Cells and functions hash by identity.
        if matches!(entry.data, Some(HeapData::Cell(_) | HeapData::Function(_))) {
            let mut hasher = DefaultHasher::new();
            id.hash(&mut hasher);
            let hash = hasher.finish();
            entry.hash_state = HashState::Cached(hash);
            return Some(hash);
        }

        // Tuples need reentrant access to hash their elements.
        let data = take_data!(self, id, "get_or_compute_hash");
        let hash = self.compute_hash(&data);
        restore_data!(self, id, data, "get_or_compute_hash");

        let entry = self
            .entries
            .get_mut(id.index())
            .expect("Heap::get_or_compute_hash: slot missing")
            .as_mut()
            .expect("Heap::get_or_compute_hash: object already collected");
        entry.hash_state = match hash {
            Some(h) => HashState::Cached(h),
            None => HashState::Unhashable,
        };
        hash
    }

    fn compute_hash(&mut self, data: &HeapData) -> Option<u64> {
        match data {
            // Content-only hashes, consistent with `hash_str`/`hash_i64` so
            // equal values hash equally across representations.
            HeapData::Long(l) => Some(l.hash()),
            HeapData::Str(s) => {
                let mut hasher = DefaultHasher::new();
                s.as_str().hash(&mut hasher);
                Some(hasher.finish())
            }
            HeapData::Bytes(b) => {
                let mut hasher = DefaultHasher::new();
                b.as_slice().hash(&mut hasher);
                Some(hasher.finish())
            }
            HeapData::Complex(c) => {
                if c.im == 0.0 {
                    Some(crate::value::hash_f64(c.re))
                } else {
                    let mut hasher = DefaultHasher::new();
                    c.re.to_bits().hash(&mut hasher);
                    c.im.to_bits().hash(&mut hasher);
                    Some(hasher.finish())
                }
            }
            HeapData::Tuple(t) => {
                let mut hasher = DefaultHasher::new();
                "tuple".hash(&mut hasher);
                for item in t.as_vec().to_vec() {
                    item.py_hash(self).ok()?.hash(&mut hasher);
                }
                Some(hasher.finish())
            }
            HeapData::Slice(s) => {
                let mut hasher = DefaultHasher::new();
                "slice".hash(&mut hasher);
                s.hash(&mut hasher);
                Some(hasher.finish())
            }
            HeapData::Range(r) => {
                let mut hasher = DefaultHasher::new();
                "range".hash(&mut hasher);
                r.hash(&mut hasher);
                Some(hasher.finish())
            }
            _ => None,
        }
    }

    /// Mark-sweep collection from the given roots. Returns how many values
    /// were freed.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = HeapId>) -> usize {
        let mut worklist: Vec<HeapId> = roots.into_iter().collect();
        while let Some(id) = worklist.pop() {
            let Some(entry) = self.entries.get_mut(id.index()).and_then(Option::as_mut) else {
                continue;
            };
            if entry.marked {
                continue;
            }
            entry.marked = true;
            if let Some(data) = &entry.data {
                data.trace(&mut worklist);
            }
        }

        let mut freed = 0;
        for (index, slot) in self.entries.iter_mut().enumerate() {
            match slot {
                Some(entry) if entry.marked => entry.marked = false,
                Some(_) => {
                    *slot = None;
                    self.free_list.push(HeapId(index));
                    freed += 1;
                }
                None => {}
            }
        }
        freed
    }

    /// Advances a heap iterator, returning the next element or `None` when
    /// exhausted. Detects dict mutation during iteration.
    pub fn advance_iterator(&mut self, iter_id: HeapId) -> RunResult<Option<Value>> {
        let HeapData::Iterator(iter) = self.get(iter_id) else {
            return Err(crate::exception::RunError::internal(
                "advance_iterator: not an iterator",
            ));
        };
        let state = iter.clone();

        let value = match state {
            SeqIterator::List { id, index } => {
                let HeapData::List(list) = self.get(id) else {
                    return Err(crate::exception::RunError::internal("iterator source not a list"));
                };
                match list.as_vec().get(index) {
                    Some(v) => v.clone(),
                    None => return Ok(None),
                }
            }
            SeqIterator::Tuple { id, index } => {
                let HeapData::Tuple(tuple) = self.get(id) else {
                    return Err(crate::exception::RunError::internal("iterator source not a tuple"));
                };
                match tuple.as_vec().get(index) {
                    Some(v) => v.clone(),
                    None => return Ok(None),
                }
            }
            SeqIterator::Str { id, index } => {
                let HeapData::Str(s) = self.get(id) else {
                    return Err(crate::exception::RunError::internal("iterator source not a str"));
                };
                if index >= s.char_len() {
                    return Ok(None);
                }
                let c = s.index(index as i64)?;
                Value::Ref(self.allocate(HeapData::Str(Str::new(c.to_string()))))
            }
            SeqIterator::Bytes { id, index } => {
                let HeapData::Bytes(b) = self.get(id) else {
                    return Err(crate::exception::RunError::internal("iterator source not bytes"));
                };
                match b.as_slice().get(index) {
                    Some(&byte) => Value::Int(i64::from(byte)),
                    None => return Ok(None),
                }
            }
            SeqIterator::ByteArray { id, index } => {
                let HeapData::ByteArray(b) = self.get(id) else {
                    return Err(crate::exception::RunError::internal(
                        "iterator source not a bytearray",
                    ));
                };
                match b.as_slice().get(index) {
                    Some(&byte) => Value::Int(i64::from(byte)),
                    None => return Ok(None),
                }
            }
            SeqIterator::Dict {
                id,
                index,
                expected_len,
            } => {
                let HeapData::Dict(d) = self.get(id) else {
                    return Err(crate::exception::RunError::internal("iterator source not a dict"));
                };
                if d.len() != expected_len {
                    return Err(ExcType::runtime_error(
                        "dictionary changed size during iteration",
                    ));
                }
                match d.key_at(index) {
                    Some(key) => key.clone(),
                    None => return Ok(None),
                }
            }
            SeqIterator::Range { next, stop, step } => {
                let exhausted = if step > 0 { next >= stop } else { next <= stop };
                if exhausted {
                    return Ok(None);
                }
                Value::Int(next)
            }
        };

        let HeapData::Iterator(iter) = self.get_mut(iter_id) else {
            unreachable!("iterator vanished during advance");
        };
        match iter {
            SeqIterator::List { index, .. }
            | SeqIterator::Tuple { index, .. }
            | SeqIterator::Str { index, .. }
            | SeqIterator::Bytes { index, .. }
            | SeqIterator::ByteArray { index, .. }
            | SeqIterator::Dict { index, .. } => *index += 1,
            SeqIterator::Range { next, step, .. } => *next += *step,
        }
        Ok(Some(value))
    }
}
