//! The global binding table: the top-level namespace mapping symbols to
//! values.
//!
//! There is no lexical scoping at the top level — `def` and `declare`
//! both act on this single table, which lives in the permanent region for
//! the process's whole run. Lexical bindings (lambda parameters, `let`
//! locals) are a compiler concern entirely separate from this table; see
//! `bone-compiler`.

use crate::hash::HashTable;
use crate::pair::{car, cdr, cons, set_car, set_cdr};
use crate::region::RegionAllocator;
use bone_core::Value;

/// A binding table entry is `(sym . (status . value))`, letting `define`
/// update an existing entry in place with `set_cdr` rather than growing
/// the table.
pub struct BindingTable {
    table: HashTable,
}

impl BindingTable {
    pub fn new() -> BindingTable {
        BindingTable {
            table: HashTable::with_capacity(1024),
        }
    }

    fn hash_of(sym: Value) -> u64 {
        // Symbols are interned, so a given name always produces the same
        // tagged word; that word is as good a hash as any.
        sym.0
    }

    fn entry_of(&self, sym: Value) -> Option<Value> {
        self.table.find(Self::hash_of(sym), |e| car(e) == Ok(sym))
    }

    /// `declare`: ensure `sym` has a table entry, defaulting to the
    /// "declared but not yet defined" status if it has none yet. A symbol
    /// that is already bound (declared or defined) is left alone.
    pub fn declare(&mut self, regions: &mut RegionAllocator, sym: Value) {
        if self.entry_of(sym).is_some() {
            return;
        }
        let _guard = regions.enter(regions.permanent());
        let status_value = cons(regions, Value::BINDING_DECLARED, Value::NIL);
        let entry = cons(regions, sym, status_value);
        self.table
            .insert_if_absent(Self::hash_of(sym), entry, |e| car(e) == Ok(sym));
    }

    /// `def`: bind `sym` to `value`, creating the entry if necessary and
    /// overwriting it (in place, if it already exists) otherwise.
    pub fn define(&mut self, regions: &mut RegionAllocator, sym: Value, value: Value) {
        if let Some(entry) = self.entry_of(sym) {
            let status_value = cdr(entry).expect("binding entries are always (sym . (status . value))");
            set_car(status_value, Value::BINDING_DEFINED).unwrap();
            set_cdr(status_value, value).unwrap();
            return;
        }
        let _guard = regions.enter(regions.permanent());
        let status_value = cons(regions, Value::BINDING_DEFINED, value);
        let entry = cons(regions, sym, status_value);
        self.table
            .insert_if_absent(Self::hash_of(sym), entry, |e| car(e) == Ok(sym));
    }

    /// The bound value of `sym`, or `None` if it is unbound or only
    /// declared.
    pub fn lookup(&self, sym: Value) -> Option<Value> {
        let entry = self.entry_of(sym)?;
        let status_value = cdr(entry).ok()?;
        let status = car(status_value).ok()?;
        if status == Value::BINDING_DEFINED {
            cdr(status_value).ok()
        } else {
            None
        }
    }

    pub fn is_bound(&self, sym: Value) -> bool {
        self.entry_of(sym).is_some()
    }

    /// The first symbol (in table order) bound to exactly `value`, for
    /// diagnostics that want to name a sub by its top-level binding. `O(n)`
    /// in the table size; only ever called while formatting an error or a
    /// `print` result, never on a hot path.
    pub fn sym_bound_to(&self, value: Value) -> Option<Value> {
        self.table.iter().find_map(|entry| {
            let sym = car(entry).ok()?;
            let status_value = cdr(entry).ok()?;
            let status = car(status_value).ok()?;
            let bound_value = cdr(status_value).ok()?;
            (status == Value::BINDING_DEFINED && bound_value == value).then_some(sym)
        })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for BindingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;

    #[test]
    fn define_then_lookup_round_trips() {
        let mut regions = RegionAllocator::new();
        let mut symbols = SymbolTable::new();
        let mut bindings = BindingTable::new();
        let sym = symbols.intern(&mut regions, "x");
        bindings.define(&mut regions, sym, Value::of_int(10));
        assert_eq!(bindings.lookup(sym), Some(Value::of_int(10)));
    }

    #[test]
    fn declare_without_define_is_not_looked_up() {
        let mut regions = RegionAllocator::new();
        let mut symbols = SymbolTable::new();
        let mut bindings = BindingTable::new();
        let sym = symbols.intern(&mut regions, "y");
        bindings.declare(&mut regions, sym);
        assert!(bindings.is_bound(sym));
        assert_eq!(bindings.lookup(sym), None);
    }

    #[test]
    fn redefine_overwrites_in_place() {
        let mut regions = RegionAllocator::new();
        let mut symbols = SymbolTable::new();
        let mut bindings = BindingTable::new();
        let sym = symbols.intern(&mut regions, "z");
        bindings.define(&mut regions, sym, Value::of_int(1));
        bindings.define(&mut regions, sym, Value::of_int(2));
        assert_eq!(bindings.lookup(sym), Some(Value::of_int(2)));
        assert_eq!(bindings.len(), 1);
    }

    #[test]
    fn unbound_symbol_is_not_bound() {
        let mut regions = RegionAllocator::new();
        let mut symbols = SymbolTable::new();
        let bindings = BindingTable::new();
        let sym = symbols.intern(&mut regions, "never-bound");
        assert!(!bindings.is_bound(sym));
    }
}
