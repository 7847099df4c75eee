use hashbrown::HashTable;

use crate::exception::RunResult;
use crate::heap::{Heap, HeapData};
use crate::types::Str;
use crate::value::{hash_str, Value};

/// One key/value pair, with the key's hash cached so rehashing and equality
/// pre-checks never recompute it.
#[derive(Debug, Clone)]
pub(crate) struct DictEntry {
    pub hash: u64,
    pub key: Value,
    pub value: Value,
}

/// A hash map keyed by `Value`.
///
/// Storage is a dense vector of entries plus a `HashTable` of indices into
/// it. Lookups locate an index by cached hash then confirm with `Value`
/// equality, so keys that compare equal across kinds (`1`, `1.0`, a promoted
/// long `1`) hit the same entry. Removal swap-removes from the dense vector
/// and patches the moved entry's index.
#[derive(Debug, Clone, Default)]
pub(crate) struct Dict {
    table: HashTable<usize>,
    entries: Vec<DictEntry>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DictEntry] {
        &self.entries
    }

    pub fn key_at(&self, index: usize) -> Option<&Value> {
        self.entries.get(index).map(|e| &e.key)
    }

    fn find_index(&self, heap: &mut Heap, hash: u64, key: &Value) -> Option<usize> {
        let entries = &self.entries;
        self.table
            .find(hash, |&i| {
                let entry = &entries[i];
                entry.hash == hash && entry.key.py_eq(key, heap)
            })
            .copied()
    }

    /// Inserts or overwrites. Fails only if the key is unhashable.
    pub fn set(&mut self, heap: &mut Heap, key: Value, value: Value) -> RunResult<()> {
        let hash = key.py_hash(heap)?;
        if let Some(idx) = self.find_index(heap, hash, &key) {
            self.entries[idx].value = value;
            return Ok(());
        }
        let idx = self.entries.len();
        self.entries.push(DictEntry { hash, key, value });
        let entries = &self.entries;
        self.table.insert_unique(hash, idx, |&i| entries[i].hash);
        Ok(())
    }

    pub fn get(&self, heap: &mut Heap, key: &Value) -> RunResult<Option<Value>> {
        let hash = key.py_hash(heap)?;
        Ok(self.find_index(heap, hash, key).map(|idx| self.entries[idx].value.clone()))
    }

    pub fn contains(&self, heap: &mut Heap, key: &Value) -> RunResult<bool> {
        let hash = key.py_hash(heap)?;
        Ok(self.find_index(heap, hash, key).is_some())
    }

    /// Removes a key, returning its value if present.
    pub fn remove(&mut self, heap: &mut Heap, key: &Value) -> RunResult<Option<Value>> {
        let hash = key.py_hash(heap)?;
        let Some(idx) = self.find_index(heap, hash, key) else {
            return Ok(None);
        };
        if let Ok(entry) = self.table.find_entry(hash, |&i| i == idx) {
            entry.remove();
        }
        let removed = self.entries.swap_remove(idx);
        // The former last entry now lives at `idx`; repoint its table slot.
        if idx < self.entries.len() {
            let moved_from = self.entries.len();
            let moved_hash = self.entries[idx].hash;
            if let Ok(mut entry) = self.table.find_entry(moved_hash, |&i| i == moved_from) {
                *entry.get_mut() = idx;
            }
        }
        Ok(Some(removed.value))
    }

    /// String-keyed lookup, used for name/global/attribute tables. Hashes the
    /// bare `&str` the same way a heap `Str` key hashes, so both access paths
    /// agree.
    pub fn get_str(&self, heap: &Heap, name: &str) -> Option<Value> {
        let hash = hash_str(name);
        let entries = &self.entries;
        self.table
            .find(hash, |&i| {
                let entry = &entries[i];
                entry.hash == hash && key_is_str(heap, &entry.key, name)
            })
            .map(|&i| entries[i].value.clone())
    }

    pub fn set_str(&mut self, heap: &mut Heap, name: &str, value: Value) {
        let hash = hash_str(name);
        let entries = &self.entries;
        if let Some(&idx) = self.table.find(hash, |&i| {
            let entry = &entries[i];
            entry.hash == hash && key_is_str(heap, &entry.key, name)
        }) {
            self.entries[idx].value = value;
            return;
        }
        let key = Value::Ref(heap.allocate(HeapData::Str(Str::from(name))));
        let idx = self.entries.len();
        self.entries.push(DictEntry { hash, key, value });
        let entries = &self.entries;
        self.table.insert_unique(hash, idx, |&i| entries[i].hash);
    }

    pub fn remove_str(&mut self, heap: &Heap, name: &str) -> Option<Value> {
        let hash = hash_str(name);
        let entries = &self.entries;
        let idx = self
            .table
            .find(hash, |&i| {
                let entry = &entries[i];
                entry.hash == hash && key_is_str(heap, &entry.key, name)
            })
            .copied()?;
        if let Ok(entry) = self.table.find_entry(hash, |&i| i == idx) {
            entry.remove();
        }
        let removed = self.entries.swap_remove(idx);
        if idx < self.entries.len() {
            let moved_from = self.entries.len();
            let moved_hash = self.entries[idx].hash;
            if let Ok(mut entry) = self.table.find_entry(moved_hash, |&i| i == moved_from) {
                *entry.get_mut() = idx;
            }
        }
        Some(removed.value)
    }

    /// Structural equality: same length and every key maps to an equal value.
    pub fn eq(&self, other: &Dict, heap: &mut Heap) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }
        for entry in &self.entries {
            let Some(other_idx) = other.find_index(heap, entry.hash, &entry.key) else {
                return false;
            };
            let other_value = other.entries[other_idx].value.clone();
            if !entry.value.py_eq(&other_value, heap) {
                return false;
            }
        }
        true
    }
}

fn key_is_str(heap: &Heap, key: &Value, name: &str) -> bool {
    match key {
        Value::Ref(id) => matches!(heap.get(*id), HeapData::Str(s) if s.as_str() == name),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_overwrite() {
        let mut heap = Heap::new();
        let mut d = Dict::new();
        d.set(&mut heap, Value::Int(1), Value::Int(10)).unwrap();
        d.set(&mut heap, Value::Int(2), Value::Int(20)).unwrap();
        assert_eq!(d.get(&mut heap, &Value::Int(1)).unwrap(), Some(Value::Int(10)));
        d.set(&mut heap, Value::Int(1), Value::Int(11)).unwrap();
        assert_eq!(d.get(&mut heap, &Value::Int(1)).unwrap(), Some(Value::Int(11)));
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn test_cross_kind_keys_collide() {
        // 1, 1.0 and True are the same key.
        let mut heap = Heap::new();
        let mut d = Dict::new();
        d.set(&mut heap, Value::Int(1), Value::Int(100)).unwrap();
        assert_eq!(
            d.get(&mut heap, &Value::Float(1.0)).unwrap(),
            Some(Value::Int(100))
        );
        d.set(&mut heap, Value::Bool(true), Value::Int(200)).unwrap();
        assert_eq!(d.len(), 1);
        assert_eq!(d.get(&mut heap, &Value::Int(1)).unwrap(), Some(Value::Int(200)));
    }

    #[test]
    fn test_str_keys_match_heap_keys() {
        let mut heap = Heap::new();
        let mut d = Dict::new();
        let key = Value::Ref(heap.allocate(HeapData::Str(Str::from("x"))));
        d.set(&mut heap, key, Value::Int(5)).unwrap();
        assert_eq!(d.get_str(&heap, "x"), Some(Value::Int(5)));

        d.set_str(&mut heap, "y", Value::Int(6));
        let key2 = Value::Ref(heap.allocate(HeapData::Str(Str::from("y"))));
        assert_eq!(d.get(&mut heap, &key2).unwrap(), Some(Value::Int(6)));
    }

    #[test]
    fn test_remove_patches_swapped_index() {
        let mut heap = Heap::new();
        let mut d = Dict::new();
        for i in 0..10 {
            d.set(&mut heap, Value::Int(i), Value::Int(i * 10)).unwrap();
        }
        assert_eq!(d.remove(&mut heap, &Value::Int(0)).unwrap(), Some(Value::Int(0)));
        assert_eq!(d.len(), 9);
        // Entry 9 was swapped into slot 0; it must still be findable.
        for i in 1..10 {
            assert_eq!(
                d.get(&mut heap, &Value::Int(i)).unwrap(),
                Some(Value::Int(i * 10)),
                "lost key {i} after removal"
            );
        }
        assert_eq!(d.remove(&mut heap, &Value::Int(0)).unwrap(), None);
    }

    #[test]
    fn test_unhashable_key_rejected() {
        let mut heap = Heap::new();
        let mut d = Dict::new();
        let list = Value::Ref(heap.allocate(HeapData::List(crate::types::List::new(vec![]))));
        assert!(d.set(&mut heap, list, Value::None).is_err());
    }

    #[test]
    fn test_dict_eq() {
        let mut heap = Heap::new();
        let mut a = Dict::new();
        let mut b = Dict::new();
        a.set(&mut heap, Value::Int(1), Value::Int(2)).unwrap();
        b.set(&mut heap, Value::Float(1.0), Value::Int(2)).unwrap();
        assert!(a.eq(&b, &mut heap));
        b.set(&mut heap, Value::Int(3), Value::None).unwrap();
        assert!(!a.eq(&b, &mut heap));
    }
}
