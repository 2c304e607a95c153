//! A generic open-addressed hash table, shared by symbol interning and by
//! the global binding table. Collisions are resolved by linear probing;
//! deletions leave a tombstone rather than compacting, so a probe sequence
//! started before a deletion still finds entries placed after it.
//!
//! Each slot remembers the hash it was inserted under alongside its value,
//! so a rehash can redistribute every live entry into a bigger table
//! without asking the caller to re-hash its own keys.
//!
//! The table owns plain Rust storage, not region-allocated memory: its
//! entries hold tagged pointers into the permanent region, but the table
//! itself lives for the process's whole lifetime, just like the
//! interpreter that owns it.

use bone_core::Value;

#[derive(Clone, Copy)]
enum Slot {
    Unused,
    Deleted,
    Occupied(u64, Value),
}

/// Above this load factor (as 256ths, matching the original's integer
/// arithmetic) the table is rehashed into one twice-plus-one the size.
const MAX_LOAD_256: usize = 175;

pub struct HashTable {
    slots: Vec<Slot>,
    count: usize,
}

impl HashTable {
    pub fn with_capacity(capacity: usize) -> HashTable {
        let capacity = capacity.max(8);
        HashTable {
            slots: vec![Slot::Unused; capacity],
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Probe from `hash % capacity`, returning the index of the matching
    /// live entry, or (if none matches) the first unused-or-deleted slot
    /// encountered, suitable for insertion.
    fn probe(&self, hash: u64, mut eq: impl FnMut(Value) -> bool) -> usize {
        let cap = self.capacity();
        let mut i = (hash as usize) % cap;
        loop {
            match self.slots[i] {
                Slot::Unused => return i,
                Slot::Occupied(h, v) if h == hash && eq(v) => return i,
                _ => i = (i + 1) % cap,
            }
        }
    }

    pub fn find(&self, hash: u64, eq: impl FnMut(Value) -> bool) -> Option<Value> {
        let i = self.probe(hash, eq);
        match self.slots[i] {
            Slot::Occupied(_, v) => Some(v),
            _ => None,
        }
    }

    /// Insert `entry` under `hash` unless an entry matching `eq` is already
    /// present, in which case the existing entry is returned unchanged.
    pub fn insert_if_absent(
        &mut self,
        hash: u64,
        entry: Value,
        eq: impl FnMut(Value) -> bool,
    ) -> Value {
        if self.count * 256 >= MAX_LOAD_256 * self.capacity() {
            self.rehash(2 * self.capacity() + 1);
        }
        let i = self.probe(hash, eq);
        match self.slots[i] {
            Slot::Occupied(_, v) => v,
            _ => {
                self.slots[i] = Slot::Occupied(hash, entry);
                self.count += 1;
                entry
            }
        }
    }

    /// Remove the entry matching `eq`, if any, leaving a tombstone behind.
    pub fn remove(&mut self, hash: u64, eq: impl FnMut(Value) -> bool) -> bool {
        let i = self.probe(hash, eq);
        match self.slots[i] {
            Slot::Occupied(..) => {
                self.slots[i] = Slot::Deleted;
                self.count -= 1;
                true
            }
            _ => false,
        }
    }

    fn rehash(&mut self, new_capacity: usize) {
        let old = std::mem::replace(&mut self.slots, vec![Slot::Unused; new_capacity]);
        self.count = 0;
        for slot in old {
            if let Slot::Occupied(hash, value) = slot {
                let i = self.probe(hash, |_| false);
                self.slots[i] = Slot::Occupied(hash, value);
                self.count += 1;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        self.slots.iter().filter_map(|s| match s {
            Slot::Occupied(_, v) => Some(*v),
            _ => None,
        })
    }
}

/// djb2, the string hash used throughout (symbol interning, `hash` on
/// strings).
pub fn djb2(bytes: &[u8]) -> u64 {
    let mut h: u64 = 5381;
    for &b in bytes {
        h = h.wrapping_mul(33).wrapping_add(b as u64);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn djb2_is_deterministic_and_order_sensitive() {
        assert_eq!(djb2(b"bone"), djb2(b"bone"));
        assert_ne!(djb2(b"bone"), djb2(b"enob"));
    }

    #[test]
    fn insert_then_find_round_trips() {
        let mut table = HashTable::with_capacity(8);
        let h = djb2(b"x");
        let v = Value::of_int(42);
        table.insert_if_absent(h, v, |slot| slot == v);
        assert_eq!(table.find(h, |slot| slot == v), Some(v));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn insert_if_absent_does_not_duplicate() {
        let mut table = HashTable::with_capacity(8);
        let h = djb2(b"x");
        let v = Value::of_int(1);
        let first = table.insert_if_absent(h, v, |slot| slot == v);
        let second = table.insert_if_absent(h, v, |slot| slot == v);
        assert_eq!(first, second);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remove_leaves_tombstone_but_later_entries_still_found() {
        let mut table = HashTable::with_capacity(8);
        let a = Value::of_int(1);
        let b = Value::of_int(2);
        let hash = 3u64;
        table.insert_if_absent(hash, a, |slot| slot == a);
        table.insert_if_absent(hash, b, |slot| slot == b);
        assert!(table.remove(hash, |slot| slot == a));
        assert_eq!(table.find(hash, |slot| slot == b), Some(b));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn rehash_preserves_all_live_entries() {
        let mut table = HashTable::with_capacity(8);
        let mut inserted = Vec::new();
        for i in 0..50 {
            let v = Value::of_int(i);
            table.insert_if_absent(i as u64, v, |slot| slot == v);
            inserted.push(v);
        }
        for v in inserted {
            assert_eq!(table.find(v.int_of().unwrap() as u64, |slot| slot == v), Some(v));
        }
    }
}
