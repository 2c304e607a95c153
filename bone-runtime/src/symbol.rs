//! Symbol interning: every occurrence of a given name reads the same
//! `Sym`-tagged value, so symbols compare equal with a single word
//! comparison and a symbol's print name is a cheap pointer-chase away.
//!
//! Interned symbols are allocated in the permanent region — they, and the
//! bindings keyed on them, live for the process's entire run.

use crate::hash::{HashTable, djb2};
use crate::pair::{str_of, string_of};
use crate::region::RegionAllocator;
use bone_core::{Tag, Value};

/// A symbol is a pointer to a one-element structure holding its print name
/// as a `Str` value, tagged `Sym` instead of the `Str` tag the name itself
/// carries. Re-tagging (rather than wrapping in a pair) keeps a symbol the
/// same width as every other value.
pub struct SymbolTable {
    table: HashTable,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable {
            table: HashTable::with_capacity(512),
        }
    }

    /// Intern `name`, allocating a fresh symbol in the permanent region
    /// only if this exact name has never been seen before.
    ///
    /// Looked up by a djb2 hash of `name` plus an equality predicate over
    /// the candidate's actual print name, so two different names sharing a
    /// hash bucket still probe past each other to their own slot rather
    /// than being treated as the same symbol.
    pub fn intern(&mut self, regions: &mut RegionAllocator, name: &str) -> Value {
        let hash = djb2(name.as_bytes());
        let found = self.table.find(hash, |sym| symbol_name_matches(sym, name));
        if let Some(sym) = found {
            return sym;
        }
        let _guard = regions.enter(regions.permanent());
        let name_value = str_of(regions, name);
        let sym = Value::tag(name_value.untag(), Tag::Sym);
        self.table
            .insert_if_absent(hash, sym, |slot| slot == sym)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

fn symbol_name_matches(sym: Value, name: &str) -> bool {
    name_of(sym).map(|n| n == name).unwrap_or(false)
}

/// The print name of a symbol, e.g. for the printer or for `UnboundSym`
/// diagnostics.
pub fn name_of(sym: Value) -> Result<String, bone_core::TypeError> {
    sym.check(Tag::Sym)?;
    let as_str = Value::tag(sym.untag(), Tag::Str);
    string_of(as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_the_same_name_twice_gives_the_same_symbol() {
        let mut regions = RegionAllocator::new();
        let mut symbols = SymbolTable::new();
        let a = symbols.intern(&mut regions, "foo");
        let b = symbols.intern(&mut regions, "foo");
        assert_eq!(a, b);
        assert_eq!(symbols.len(), 1);
    }

    #[test]
    fn distinct_names_intern_to_distinct_symbols() {
        let mut regions = RegionAllocator::new();
        let mut symbols = SymbolTable::new();
        let a = symbols.intern(&mut regions, "foo");
        let b = symbols.intern(&mut regions, "bar");
        assert_ne!(a, b);
    }

    #[test]
    fn name_of_recovers_the_original_string() {
        let mut regions = RegionAllocator::new();
        let mut symbols = SymbolTable::new();
        let sym = symbols.intern(&mut regions, "quasiquote");
        assert_eq!(name_of(sym).unwrap(), "quasiquote");
    }
}
