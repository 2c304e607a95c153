//! `Interpreter`: the single context struct threading together everything
//! a running program needs — the region allocator, the symbol and binding
//! tables, and the primitive function table.
//!
//! The original interpreter keeps this state in a handful of C globals;
//! collecting it into one struct instead (rather than, say, `thread_local!`
//! statics mirroring them one for one) is what lets more than one
//! `Interpreter` exist in a process — useful for tests, which otherwise
//! would all fight over shared global symbol/region state.

use crate::bindings::BindingTable;
use crate::error::BoneResult;
use crate::pair;
use crate::primitives::Primitives;
use crate::region::RegionAllocator;
use crate::sub::{self, Body};
use crate::symbol::SymbolTable;
use bone_core::{Tag, Value};

pub struct Interpreter {
    pub regions: RegionAllocator,
    pub symbols: SymbolTable,
    pub bindings: BindingTable,
    pub primitives: Primitives,
    /// The value of the last top-level form evaluated, bound to `_` and
    /// echoed as `@N: value` by the REPL.
    pub last_value: Value,
}

impl Interpreter {
    /// A bare interpreter with no standard library installed — used by
    /// the VM and primitive unit tests, which wire up only the primitives
    /// they need.
    pub fn new() -> Interpreter {
        Interpreter {
            regions: RegionAllocator::new(),
            symbols: SymbolTable::new(),
            bindings: BindingTable::new(),
            primitives: Primitives::new(),
            last_value: Value::NIL,
        }
    }

    /// An interpreter with the full standard library installed, as the
    /// REPL and compiler driver construct it.
    pub fn with_stdlib() -> Interpreter {
        let mut interp = Interpreter::new();
        crate::primitives::install(&mut interp);
        interp
    }

    pub fn call_primitive(&mut self, index: u32, args: &[Value]) -> BoneResult<Value> {
        let (_, f) = self.primitives.get(index);
        f(self, args)
    }

    /// Best-effort name for a sub, for `WrongNumberOfArgs` diagnostics: its
    /// binding-table name if one is bound to it, else its compiled name,
    /// else an anonymous placeholder.
    pub fn describe_sub(&self, s: Value) -> String {
        if let Some(sym) = self.bindings.sym_bound_to(s) {
            if let Ok(name) = crate::symbol::name_of(sym) {
                return name;
            }
        }
        if s.is_tagged(Tag::Sub) {
            if let Ok(Body::Compiled { code, .. }) = sub::body_of(s) {
                if let Ok(obj) = crate::code::of_value(code) {
                    if let Some(name) = &obj.name {
                        return name.clone();
                    }
                }
            }
        }
        "lambda".to_string()
    }

    /// A minimal, non-sugared rendering of a value, for the `print`
    /// primitive. The full reader-inverse printer (quote sugar, lambda
    /// short form) lives in `bone-compiler`, which echoes the REPL's
    /// results; this one only needs to be legible, not exact.
    pub fn print_to_string(&self, v: Value) -> String {
        match v.tag_of() {
            Tag::Num => v.int_of().unwrap().to_string(),
            Tag::Uniq => match v {
                Value::NIL => "()".to_string(),
                Value::TRUE => "#t".to_string(),
                Value::FALSE => "#f".to_string(),
                Value::EOF => "#{eof}".to_string(),
                _ => format!("#{{uniq {:#x}}}", v.untag()),
            },
            Tag::Sym => crate::symbol::name_of(v).unwrap_or_else(|_| "#{bad-sym}".to_string()),
            Tag::Str => format!("{:?}", pair::string_of(v).unwrap_or_default()),
            Tag::Cons => self.print_list(v),
            Tag::Sub => format!("#{{sub {}}}", self.describe_sub(v)),
            Tag::Reg => format!("#{{reg {:#x}}}", v.untag()),
            Tag::Other => format!("#{{other {:#x}}}", v.untag()),
        }
    }

    /// A minimal rendering of `v` the way the `say` primitive uses: a
    /// `Str` prints as its raw characters, a list flattens its elements
    /// with no enclosing parens, anything else falls back to
    /// `print_to_string`.
    pub fn say_to_string(&self, v: Value) -> String {
        match v.tag_of() {
            Tag::Str => pair::string_of(v).unwrap_or_default(),
            Tag::Cons => {
                let mut out = String::new();
                let mut x = v;
                loop {
                    match pair::car(x) {
                        Ok(head) => {
                            out.push_str(&self.say_to_string(head));
                            match pair::cdr(x) {
                                Ok(next) if next.is_tagged(Tag::Cons) => x = next,
                                _ => break,
                            }
                        }
                        Err(_) => break,
                    }
                }
                out
            }
            _ => self.print_to_string(v),
        }
    }

    fn print_list(&self, mut x: Value) -> String {
        let mut parts = Vec::new();
        loop {
            match pair::car(x) {
                Ok(head) => {
                    parts.push(self.print_to_string(head));
                    match pair::cdr(x) {
                        Ok(next) if next.is_nil() => break,
                        Ok(next) if next.is_tagged(Tag::Cons) => x = next,
                        Ok(next) => {
                            parts.push(".".to_string());
                            parts.push(self.print_to_string(next));
                            break;
                        }
                        Err(_) => break,
                    }
                }
                Err(_) => break,
            }
        }
        format!("({})", parts.join(" "))
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_interpreter_has_no_bindings() {
        let interp = Interpreter::new();
        assert!(interp.bindings.is_empty());
    }

    #[test]
    fn with_stdlib_binds_arithmetic() {
        let mut interp = Interpreter::with_stdlib();
        let sym = interp.symbols.intern(&mut interp.regions, "+");
        assert!(interp.bindings.is_bound(sym));
    }

    #[test]
    fn print_to_string_renders_lists_and_atoms() {
        let mut interp = Interpreter::new();
        let list = pair::list_from_slice(&mut interp.regions, &[Value::of_int(1), Value::of_int(2)]);
        assert_eq!(interp.print_to_string(list), "(1 2)");
        assert_eq!(interp.print_to_string(Value::NIL), "()");
        assert_eq!(interp.print_to_string(Value::TRUE), "#t");
    }

    #[test]
    fn say_to_string_flattens_lists_and_unquotes_strings() {
        let mut interp = Interpreter::new();
        let s = pair::str_of(&mut interp.regions, "hi");
        let list = pair::list_from_slice(&mut interp.regions, &[s, Value::of_int(1)]);
        assert_eq!(interp.say_to_string(list), "hi1");
    }
}
