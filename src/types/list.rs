use crate::exception::{ExcType, RunResult};
use crate::types::slice::{normalize_index, Slice};
use crate::value::Value;

/// A mutable sequence with reference semantics: assignment shares the list,
/// it never copies.
#[derive(Debug, Clone, Default)]
pub(crate) struct List(Vec<Value>);

impl List {
    pub fn new(items: Vec<Value>) -> Self {
        Self(items)
    }

    pub fn as_vec(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, value: Value) {
        self.0.push(value);
    }

    pub fn extend_from(&mut self, items: &[Value]) {
        self.0.extend_from_slice(items);
    }

    pub fn get(&self, index: i64) -> RunResult<Value> {
        match normalize_index(index, self.0.len()) {
            Some(idx) => Ok(self.0[idx].clone()),
            None => Err(ExcType::index_error("list")),
        }
    }

    pub fn set(&mut self, index: i64, value: Value) -> RunResult<()> {
        match normalize_index(index, self.0.len()) {
            Some(idx) => {
                self.0[idx] = value;
                Ok(())
            }
            None => Err(ExcType::IndexError
                .with_arg("list assignment index out of range")
                .into()),
        }
    }

    pub fn remove(&mut self, index: i64) -> RunResult<Value> {
        match normalize_index(index, self.0.len()) {
            Some(idx) => Ok(self.0.remove(idx)),
            None => Err(ExcType::IndexError
                .with_arg("list assignment index out of range")
                .into()),
        }
    }

    pub fn slice(&self, slice: &Slice) -> RunResult<Vec<Value>> {
        Ok(slice.iter_indices(self.0.len())?.map(|i| self.0[i].clone()).collect())
    }

    pub fn concat(&self, other: &List) -> Vec<Value> {
        let mut out = Vec::with_capacity(self.0.len() + other.0.len());
        out.extend_from_slice(&self.0);
        out.extend_from_slice(&other.0);
        out
    }

    pub fn repeat(&self, count: usize) -> Vec<Value> {
        let mut out = Vec::with_capacity(self.0.len() * count);
        for _ in 0..count {
            out.extend_from_slice(&self.0);
        }
        out
    }
}

/// An immutable sequence.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tuple(Vec<Value>);

impl Tuple {
    pub fn new(items: Vec<Value>) -> Self {
        Self(items)
    }

    pub fn as_vec(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: i64) -> RunResult<Value> {
        match normalize_index(index, self.0.len()) {
            Some(idx) => Ok(self.0[idx].clone()),
            None => Err(ExcType::index_error("tuple")),
        }
    }

    pub fn slice(&self, slice: &Slice) -> RunResult<Vec<Value>> {
        Ok(slice.iter_indices(self.0.len())?.map(|i| self.0[i].clone()).collect())
    }

    pub fn concat(&self, other: &Tuple) -> Vec<Value> {
        let mut out = Vec::with_capacity(self.0.len() + other.0.len());
        out.extend_from_slice(&self.0);
        out.extend_from_slice(&other.0);
        out
    }

    pub fn repeat(&self, count: usize) -> Vec<Value> {
        let mut out = Vec::with_capacity(self.0.len() * count);
        for _ in 0..count {
            out.extend_from_slice(&self.0);
        }
        out
    }
}
