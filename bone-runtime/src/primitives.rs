//! The primitive function table and the standard library built on it.
//!
//! A primitive is a plain Rust `fn`, not a closure — this lets
//! [`Interpreter::call_primitive`] copy the function pointer out of the
//! table before calling it, sidestepping the double-borrow that a closure
//! capturing `&mut Interpreter` inside `Interpreter` itself would create.
//! Every primitive receives the whole interpreter, so it can allocate,
//! intern symbols, or (for `apply`, `each`, etc.) invoke back into the VM.
//!
//! The set installed by [`install`] and its arities/aliases are carried
//! over from the original interpreter's builtin table verbatim, including
//! which names share a function (`full+`/`+`, `full-`/`-`, `id`/`list`,
//! `intern`/`str->sym`).

use crate::error::BoneResult;
use crate::interpreter::Interpreter;
use crate::pair;
use crate::sub::Arity;
use bone_core::{Tag, Value};

pub type PrimitiveFn = fn(&mut Interpreter, &[Value]) -> BoneResult<Value>;

pub struct Primitives {
    entries: Vec<(Arity, PrimitiveFn)>,
}

impl Primitives {
    pub fn new() -> Primitives {
        Primitives { entries: Vec::new() }
    }

    pub fn register(&mut self, arity: Arity, f: PrimitiveFn) -> u32 {
        self.entries.push((arity, f));
        (self.entries.len() - 1) as u32
    }

    pub fn arity(&self, index: u32) -> Arity {
        self.entries[index as usize].0
    }

    /// Copy a registered primitive's `(arity, fn pointer)` out of the
    /// table. Both are `Copy`, so callers can hold the result across a
    /// `&mut Interpreter` call without any borrow of `self` outliving this
    /// call — which matters because the primitive itself may recurse back
    /// into another primitive (e.g. `apply`).
    pub fn get(&self, index: u32) -> (Arity, PrimitiveFn) {
        self.entries[index as usize]
    }
}

impl Default for Primitives {
    fn default() -> Self {
        Self::new()
    }
}

fn int_arg(args: &[Value], i: usize) -> BoneResult<i32> {
    Ok(args[i].int_of()?)
}

fn sum_of_list(list: Value) -> BoneResult<i32> {
    let mut total = 0i32;
    for n in pair::list_to_vec(list)? {
        total = total.wrapping_add(n.int_of()?);
    }
    Ok(total)
}

fn simple_plus(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::of_int(int_arg(args, 0)?.wrapping_add(int_arg(args, 1)?)))
}

/// `full+`/`+`: bound with `Arity::AtLeast(0)`, so `args[0]` is the whole
/// rest-collected list of the call's actual arguments.
fn full_plus(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::of_int(sum_of_list(args[0])?))
}

fn cons_(interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(pair::cons(&mut interp.regions, args[0], args[1]))
}

/// `print`: prints `args[0]`, then sets `last_value` to `(args[0])`, a
/// one-element list holding it — not `args[0]` itself.
fn print_(interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    println!("{}", interp.print_to_string(args[0]));
    Ok(pair::cons(&mut interp.regions, args[0], Value::NIL))
}

fn apply_(interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    let trailing = pair::list_to_vec(args[1])?;
    crate::vm::call(interp, args[0], &trailing)
}

/// `id`: returns its single argument. Also bound as `list` with
/// `Arity::AtLeast(0)`, under which `args[0]` is already the full
/// rest-collected list of actual arguments, so the same body serves both.
fn id_(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(args[0])
}

fn is_nil(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::bool_of(args[0].is_nil()))
}

fn is_eq(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::bool_of(args[0] == args[1]))
}

fn not_(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::bool_of(!args[0].is_truthy()))
}

fn car_(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(pair::car(args[0])?)
}

fn cdr_(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(pair::cdr(args[0])?)
}

fn is_cons(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::bool_of(args[0].is_tagged(Tag::Cons) && !args[0].is_nil()))
}

fn is_sym(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::bool_of(args[0].is_tagged(Tag::Sym)))
}

fn is_sub(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::bool_of(args[0].is_tagged(Tag::Sub)))
}

fn is_num(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::bool_of(args[0].is_tagged(Tag::Num)))
}

fn is_str(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::bool_of(args[0].is_tagged(Tag::Str)))
}

fn str_(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(pair::string_of_chars(args[0]))
}

fn unstr_(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(pair::unstring(args[0])?)
}

fn len_(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::of_int(pair::len(args[0]) as i32))
}

fn assoq_(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(pair::assoc(args[0], args[1])?)
}

/// `intern`/`str->sym`: both names bind this same function — intern the
/// symbol whose print name is the `Str` argument.
fn intern_(interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    let name = pair::string_of(args[0])?;
    Ok(interp.symbols.intern(&mut interp.regions, &name))
}

fn copy_(interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(crate::copy::copy(&mut interp.regions, args[0]))
}

/// `say`: bound with `Arity::AtLeast(0)`, so `args[0]` is the whole
/// rest-collected list of actual arguments. Says each in turn (raw,
/// unquoted, flattening nested lists) and returns that same list.
fn say_(interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    print!("{}", interp.say_to_string(args[0]));
    Ok(args[0])
}

fn unary_minus(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::of_int(-int_arg(args, 0)?))
}

fn simple_minus(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::of_int(int_arg(args, 0)?.wrapping_sub(int_arg(args, 1)?)))
}

/// `full-`/`-`: bound with `Arity::AtLeast(1)`, so `args[0]` is the fixed
/// first (minuend) argument and `args[1]` is the rest-collected list of
/// values subtracted from it in order.
fn full_minus(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    let mut res = int_arg(args, 0)?;
    for n in pair::list_to_vec(args[1])? {
        res = res.wrapping_sub(n.int_of()?);
    }
    Ok(Value::of_int(res))
}

fn simple_num_eq(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::bool_of(int_arg(args, 0)? == int_arg(args, 1)?))
}

fn simple_num_neq(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::bool_of(int_arg(args, 0)? != int_arg(args, 1)?))
}

fn simple_num_gt(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::bool_of(int_arg(args, 0)? > int_arg(args, 1)?))
}

fn simple_num_lt(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::bool_of(int_arg(args, 0)? < int_arg(args, 1)?))
}

fn simple_num_geq(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::bool_of(int_arg(args, 0)? >= int_arg(args, 1)?))
}

fn simple_num_leq(_interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    Ok(Value::bool_of(int_arg(args, 0)? <= int_arg(args, 1)?))
}

/// `(each list sub)`: call `sub` once per element, for effect; returns
/// whatever the last call returned, or `()` if `list` is empty.
fn each(interp: &mut Interpreter, args: &[Value]) -> BoneResult<Value> {
    let items = pair::list_to_vec(args[0])?;
    let mut result = Value::NIL;
    for item in items {
        result = crate::vm::call(interp, args[1], &[item])?;
    }
    Ok(result)
}

/// Install the standard library into `interp`'s binding table, each entry
/// a `Sub` value wrapping one primitive above. This is the closed set of
/// builtins the reader/compiler/printer can assume are always bound.
pub fn install(interp: &mut Interpreter) {
    let entries: &[(&str, Arity, PrimitiveFn)] = &[
        ("simple+", Arity::Exact(2), simple_plus),
        ("full+", Arity::AtLeast(0), full_plus),
        ("+", Arity::AtLeast(0), full_plus),
        ("cons", Arity::Exact(2), cons_),
        ("print", Arity::Exact(1), print_),
        ("apply", Arity::Exact(2), apply_),
        ("id", Arity::Exact(1), id_),
        ("list", Arity::AtLeast(0), id_),
        ("nil?", Arity::Exact(1), is_nil),
        ("eq?", Arity::Exact(2), is_eq),
        ("not", Arity::Exact(1), not_),
        ("car", Arity::Exact(1), car_),
        ("cdr", Arity::Exact(1), cdr_),
        ("cons?", Arity::Exact(1), is_cons),
        ("sym?", Arity::Exact(1), is_sym),
        ("sub?", Arity::Exact(1), is_sub),
        ("num?", Arity::Exact(1), is_num),
        ("str?", Arity::Exact(1), is_str),
        ("str", Arity::Exact(1), str_),
        ("unstr", Arity::Exact(1), unstr_),
        ("len", Arity::Exact(1), len_),
        ("assoq", Arity::Exact(2), assoq_),
        ("intern", Arity::Exact(1), intern_),
        ("str->sym", Arity::Exact(1), intern_),
        ("copy", Arity::Exact(1), copy_),
        ("say", Arity::AtLeast(0), say_),
        ("unary-", Arity::Exact(1), unary_minus),
        ("simple-", Arity::Exact(2), simple_minus),
        ("full-", Arity::AtLeast(1), full_minus),
        ("-", Arity::AtLeast(1), full_minus),
        ("simple=?", Arity::Exact(2), simple_num_eq),
        ("=?", Arity::Exact(2), simple_num_eq),
        ("simple<>?", Arity::Exact(2), simple_num_neq),
        ("<>?", Arity::Exact(2), simple_num_neq),
        ("simple>?", Arity::Exact(2), simple_num_gt),
        (">?", Arity::Exact(2), simple_num_gt),
        ("simple<?", Arity::Exact(2), simple_num_lt),
        ("<?", Arity::Exact(2), simple_num_lt),
        ("simple>=?", Arity::Exact(2), simple_num_geq),
        (">=?", Arity::Exact(2), simple_num_geq),
        ("simple<=?", Arity::Exact(2), simple_num_leq),
        ("<=?", Arity::Exact(2), simple_num_leq),
        ("each", Arity::Exact(2), each),
    ];
    for &(name, arity, f) in entries {
        let index = interp.primitives.register(arity, f);
        let sub = crate::sub::make_primitive(&mut interp.regions, arity, index);
        let sym = interp.symbols.intern(&mut interp.regions, name);
        interp.bindings.define(&mut interp.regions, sym, sub);
    }
}
