//! `Sub`: the representation shared by primitives, compiled closures, and
//! their partial-application environments.
//!
//! A sub is a permanent-region object with a fixed layout:
//!
//! ```text
//! word 0: argument count (negative means "at least -n - 1", variadic)
//! word 1: kind tag (Primitive | Compiled)
//! word 2: payload — a `usize` primitive index, or the bytecode + env pair
//! ```
//!
//! Primitives are addressed by index into a process-wide table rather than
//! by function pointer so that a `Sub` value stays plain data (no raw
//! fn-pointer bit patterns to tag-check).

use crate::region::RegionAllocator;
use bone_core::{Tag, TypeError, Value};

const WORD_ARGC: isize = 0;
const WORD_KIND: isize = 1;
const WORD_PAYLOAD: isize = 2;
const SUB_WORDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Primitive = 0,
    Compiled = 1,
}

/// How many arguments a sub takes: either exactly `n`, or at least `n`
/// (the rest collected into a list bound to its last parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(u32),
    AtLeast(u32),
}

impl Arity {
    fn encode(self) -> i32 {
        match self {
            Arity::Exact(n) => n as i32,
            Arity::AtLeast(n) => -(n as i32) - 1,
        }
    }

    fn decode(n: i32) -> Arity {
        if n >= 0 {
            Arity::Exact(n as u32)
        } else {
            Arity::AtLeast((-n - 1) as u32)
        }
    }

    pub fn accepts(self, n_args: usize) -> bool {
        match self {
            Arity::Exact(n) => n_args == n as usize,
            Arity::AtLeast(n) => n_args >= n as usize,
        }
    }

    /// Number of fixed (non-variadic-tail) parameters.
    pub fn fixed(self) -> u32 {
        match self {
            Arity::Exact(n) | Arity::AtLeast(n) => n,
        }
    }

    pub fn is_variadic(self) -> bool {
        matches!(self, Arity::AtLeast(_))
    }
}

unsafe fn cell(x: Value) -> Result<*mut Value, TypeError> {
    Ok(x.untag_checked(Tag::Sub)? as *mut Value)
}

fn make(regions: &mut RegionAllocator, arity: Arity, kind: Kind, payload: Value) -> Value {
    let _guard = regions.enter(regions.permanent());
    let p = regions.alloc(SUB_WORDS);
    unsafe {
        *p.offset(WORD_ARGC) = Value::of_int(arity.encode());
        *p.offset(WORD_KIND) = Value::of_int(kind as i32);
        *p.offset(WORD_PAYLOAD) = payload;
    }
    Value::tag(p as u64, Tag::Sub)
}

/// A primitive is identified by its index into `Primitives::table`.
pub fn make_primitive(regions: &mut RegionAllocator, arity: Arity, index: u32) -> Value {
    make(regions, arity, Kind::Primitive, Value::of_int(index as i32))
}

/// A compiled closure: `code` is a `Sub`-internal bytecode blob value (see
/// `vm::CodeBlob`), and `env` is the list of captured values, or `NIL` for
/// a closure with no free variables.
pub fn make_compiled(regions: &mut RegionAllocator, arity: Arity, code: Value, env: Value) -> Value {
    let pair = crate::pair::cons(regions, code, env);
    make(regions, arity, Kind::Compiled, pair)
}

pub fn arity_of(sub: Value) -> Result<Arity, TypeError> {
    let p = unsafe { cell(sub)? };
    let n = unsafe { (*p.offset(WORD_ARGC)).int_of().expect("argc is always a Num") };
    Ok(Arity::decode(n))
}

pub enum Body {
    Primitive { index: u32 },
    Compiled { code: Value, env: Value },
}

pub fn body_of(sub: Value) -> Result<Body, TypeError> {
    let p = unsafe { cell(sub)? };
    let kind = unsafe { (*p.offset(WORD_KIND)).int_of().expect("kind is always a Num") };
    let payload = unsafe { *p.offset(WORD_PAYLOAD) };
    if kind == Kind::Primitive as i32 {
        Ok(Body::Primitive {
            index: payload.int_of().expect("primitive payload is always a Num") as u32,
        })
    } else {
        Ok(Body::Compiled {
            code: crate::pair::car(payload).expect("compiled payload is always a pair"),
            env: crate::pair::cdr(payload).expect("compiled payload is always a pair"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_arity_round_trips() {
        let mut regions = RegionAllocator::new();
        let sub = make_primitive(&mut regions, Arity::Exact(2), 7);
        assert_eq!(arity_of(sub).unwrap(), Arity::Exact(2));
        assert!(arity_of(sub).unwrap().accepts(2));
        assert!(!arity_of(sub).unwrap().accepts(1));
    }

    #[test]
    fn variadic_arity_round_trips() {
        let mut regions = RegionAllocator::new();
        let sub = make_primitive(&mut regions, Arity::AtLeast(1), 3);
        let arity = arity_of(sub).unwrap();
        assert!(arity.is_variadic());
        assert!(arity.accepts(1));
        assert!(arity.accepts(5));
        assert!(!arity.accepts(0));
    }

    #[test]
    fn primitive_body_carries_its_index() {
        let mut regions = RegionAllocator::new();
        let sub = make_primitive(&mut regions, Arity::Exact(0), 42);
        match body_of(sub).unwrap() {
            Body::Primitive { index } => assert_eq!(index, 42),
            Body::Compiled { .. } => panic!("expected a primitive"),
        }
    }

    #[test]
    fn compiled_body_carries_code_and_env() {
        let mut regions = RegionAllocator::new();
        let code = Value::of_int(99);
        let env = Value::NIL;
        let sub = make_compiled(&mut regions, Arity::Exact(1), code, env);
        match body_of(sub).unwrap() {
            Body::Compiled { code: c, env: e } => {
                assert_eq!(c, code);
                assert_eq!(e, env);
            }
            Body::Primitive { .. } => panic!("expected compiled"),
        }
    }
}
