//! Cons cells, the only compound data type: every list, lambda body, and
//! piece of compiled syntax is built from them. A string is represented as
//! a list of character `Num`s, exactly as in the original interpreter —
//! there is no separate byte-string heap object.

use crate::region::RegionAllocator;
use bone_core::{Tag, TypeError, Value};

/// Allocate a new pair `(a . d)` in the active region.
pub fn cons(regions: &mut RegionAllocator, a: Value, d: Value) -> Value {
    let p = regions.alloc(2);
    unsafe {
        *p = a;
        *p.add(1) = d;
    }
    Value::tag(p as u64, Tag::Cons)
}

/// `cons`, but writes the arguments in reverse build order: used by the
/// reader and compiler, which discover a list's tail before its head is
/// known, so they grow the list behind a cursor with `precons` and only
/// learn the final `car` once the cursor is filled in.
pub fn precons(regions: &mut RegionAllocator, d: Value) -> (Value, *mut Value) {
    let p = regions.alloc(2);
    unsafe {
        *p.add(1) = d;
    }
    (Value::tag(p as u64, Tag::Cons), p)
}

#[inline(always)]
fn cell(x: Value) -> Result<*mut Value, TypeError> {
    Ok(x.untag_checked(Tag::Cons)? as *mut Value)
}

pub fn car(x: Value) -> Result<Value, TypeError> {
    let p = cell(x)?;
    Ok(unsafe { *p })
}

pub fn cdr(x: Value) -> Result<Value, TypeError> {
    let p = cell(x)?;
    Ok(unsafe { *p.add(1) })
}

pub fn set_car(x: Value, v: Value) -> Result<(), TypeError> {
    let p = cell(x)?;
    unsafe {
        *p = v;
    }
    Ok(())
}

pub fn set_cdr(x: Value, v: Value) -> Result<(), TypeError> {
    let p = cell(x)?;
    unsafe {
        *p.add(1) = v;
    }
    Ok(())
}

/// Walk a list and count its cells, stopping (rather than erroring) the
/// first time the tail is not itself a pair — an improper list's trailing
/// non-pair value is simply not counted, matching `bone.c`'s `len`, whose
/// `foreach` macro stops at the same point.
pub fn len(mut x: Value) -> usize {
    let mut n = 0usize;
    while x.is_tagged(Tag::Cons) && !x.is_nil() {
        n += 1;
        x = cdr(x).expect("Cons-tagged value has a cdr");
    }
    n
}

/// `assoq`: the `cdr` of the first pair in `alist` whose `car` is `key`, or
/// `#f` if none matches — matching `bone.c`'s `assoq`, which returns the
/// matched entry's cdr rather than the entry itself, and `BFALSE` on a miss
/// rather than `()`.
pub fn assoc(key: Value, alist: Value) -> Result<Value, TypeError> {
    let mut rest = alist;
    while !rest.is_nil() {
        let entry = car(rest)?;
        if car(entry)? == key {
            return cdr(entry);
        }
        rest = cdr(rest)?;
    }
    Ok(Value::FALSE)
}

/// Build a list from a Rust slice, innermost (last element) first so the
/// whole thing is assembled with one pass and no reversal.
pub fn list_from_slice(regions: &mut RegionAllocator, items: &[Value]) -> Value {
    let mut acc = Value::NIL;
    for &item in items.iter().rev() {
        acc = cons(regions, item, acc);
    }
    acc
}

/// Collect a proper list into a `Vec`, for callers that want random access
/// (primitive argument lists, printer output).
pub fn list_to_vec(mut x: Value) -> Result<Vec<Value>, TypeError> {
    let mut out = Vec::new();
    while !x.is_nil() {
        out.push(car(x)?);
        x = cdr(x)?;
    }
    Ok(out)
}

/// A `Str` value is a char list (`Cons`-tagged, `NIL`-terminated) with its
/// tag bits changed to `Str`. `NIL`'s untagged payload is always zero and
/// no heap address ever is, so the two cases never collide and the
/// conversion is lossless in both directions.
fn list_as_str(list: Value) -> Value {
    Value::tag(list.untag(), Tag::Str)
}

fn str_as_list(x: Value) -> Value {
    let payload = x.untag();
    if payload == 0 {
        Value::NIL
    } else {
        Value::tag(payload, Tag::Cons)
    }
}

/// Tag an arbitrary list as a `Str`, without checking that its elements are
/// character `Num`s — the `str` primitive's job, matching `bone.c`'s `str`,
/// which just re-tags the pointer it is handed.
pub fn string_of_chars(list: Value) -> Value {
    list_as_str(list)
}

/// The char list underlying a `Str` value — the `unstr` primitive's job,
/// matching `bone.c`'s `unstr`.
pub fn unstring(s: Value) -> Result<Value, TypeError> {
    s.check(Tag::Str)?;
    Ok(str_as_list(s))
}

/// Build the character-list representation of a Rust string.
pub fn str_of(regions: &mut RegionAllocator, s: &str) -> Value {
    let chars: Vec<Value> = s.chars().map(|c| Value::of_int(c as i32)).collect();
    let list = list_from_slice(regions, &chars);
    list_as_str(list)
}

/// Recover a Rust `String` from the character-list representation. Chars
/// outside the Unicode scalar range cannot occur because only `str_of` and
/// the reader ever build `Str` values, both from real `char`s.
pub fn string_of(x: Value) -> Result<String, TypeError> {
    x.check(Tag::Str)?;
    let chars = list_to_vec(str_as_list(x))?;
    let mut s = String::with_capacity(chars.len());
    for c in chars {
        let n = c.int_of()?;
        s.push(char::from_u32(n as u32).unwrap_or(char::REPLACEMENT_CHARACTER));
    }
    Ok(s)
}

/// Cons a character onto the front of a `Str` value, as used by `strcons`.
pub fn str_cons(regions: &mut RegionAllocator, c: Value, s: Value) -> Result<Value, TypeError> {
    s.check(Tag::Str)?;
    let list = cons(regions, c, str_as_list(s));
    Ok(list_as_str(list))
}

/// The first character of a non-empty `Str`, and the rest as a `Str`.
pub fn str_car(s: Value) -> Result<Value, TypeError> {
    s.check(Tag::Str)?;
    car(str_as_list(s))
}

pub fn str_cdr(s: Value) -> Result<Value, TypeError> {
    s.check(Tag::Str)?;
    Ok(list_as_str(cdr(str_as_list(s))?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cons_car_cdr_round_trip() {
        let mut regions = RegionAllocator::new();
        let p = cons(&mut regions, Value::of_int(1), Value::of_int(2));
        assert_eq!(car(p).unwrap(), Value::of_int(1));
        assert_eq!(cdr(p).unwrap(), Value::of_int(2));
    }

    #[test]
    fn set_car_set_cdr_mutate_in_place() {
        let mut regions = RegionAllocator::new();
        let p = cons(&mut regions, Value::of_int(1), Value::of_int(2));
        set_car(p, Value::of_int(9)).unwrap();
        set_cdr(p, Value::of_int(8)).unwrap();
        assert_eq!(car(p).unwrap(), Value::of_int(9));
        assert_eq!(cdr(p).unwrap(), Value::of_int(8));
    }

    #[test]
    fn len_counts_proper_lists() {
        let mut regions = RegionAllocator::new();
        let list = list_from_slice(&mut regions, &[Value::of_int(1), Value::of_int(2), Value::of_int(3)]);
        assert_eq!(len(list), 3);
        assert_eq!(len(Value::NIL), 0);
    }

    #[test]
    fn len_counts_pairs_up_to_an_improper_tail() {
        let mut regions = RegionAllocator::new();
        let p = cons(&mut regions, Value::of_int(1), Value::of_int(2));
        assert_eq!(len(p), 1);
    }

    #[test]
    fn assoc_finds_matching_key() {
        let mut regions = RegionAllocator::new();
        let e1 = cons(&mut regions, Value::of_int(1), Value::of_int(10));
        let e2 = cons(&mut regions, Value::of_int(2), Value::of_int(20));
        let alist = list_from_slice(&mut regions, &[e1, e2]);
        let found = assoc(Value::of_int(2), alist).unwrap();
        assert_eq!(found, Value::of_int(20));
        assert_eq!(assoc(Value::of_int(3), alist).unwrap(), Value::FALSE);
    }

    #[test]
    fn string_round_trips_through_char_list() {
        let mut regions = RegionAllocator::new();
        let s = str_of(&mut regions, "bone");
        assert_eq!(string_of(s).unwrap(), "bone");
    }

    #[test]
    fn empty_string_is_nil_tagged_str() {
        let mut regions = RegionAllocator::new();
        let s = str_of(&mut regions, "");
        assert_eq!(string_of(s).unwrap(), "");
    }
}
