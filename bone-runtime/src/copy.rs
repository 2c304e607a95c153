//! Structural copying between regions.
//!
//! A value built in one region cannot simply be handed to code running in
//! another, shorter-lived region: once the source region is freed, any
//! pointer into it dangles. `copy` walks a value and rebuilds every `Cons`
//! and `Str` cell it finds in the *currently active* region, so the result
//! is safe to keep after the original is gone. `Sym` values are never
//! copied (they already live permanently and are compared by identity),
//! `Num`/`Uniq` carry no pointer at all, and `Sub`/`Reg` values are treated
//! as opaque handles rather than walked into — a closure's captured
//! environment is copied by the VM at the point the closure itself is
//! built, not implicitly by every value that happens to reference it.

use crate::pair::{car, cdr, cons};
use crate::region::RegionAllocator;
use bone_core::{Tag, Value};

/// Deep-copy `x`'s `Cons`/`Str` structure into the region currently active
/// on `regions`. Anything else is returned unchanged.
pub fn copy(regions: &mut RegionAllocator, x: Value) -> Value {
    match x.tag_of() {
        Tag::Cons if !x.is_nil() => {
            let a = copy(regions, car(x).expect("Cons-tagged, non-nil value has a car"));
            let d = copy(regions, cdr(x).expect("Cons-tagged, non-nil value has a cdr"));
            cons(regions, a, d)
        }
        Tag::Str => {
            let list = crate::pair::list_to_vec(str_as_list(x)).unwrap_or_default();
            let copied: Vec<Value> = list.into_iter().map(|c| copy(regions, c)).collect();
            let rebuilt = crate::pair::list_from_slice(regions, &copied);
            Value::tag(rebuilt.untag(), Tag::Str)
        }
        _ => x,
    }
}

/// `str_as_list` duplicated locally rather than made `pub` on `pair`: this
/// module is the only caller outside of `pair.rs` that ever needs to
/// reinterpret a `Str`'s tag bits, and only to recurse structurally.
fn str_as_list(x: Value) -> Value {
    let payload = x.untag();
    if payload == 0 {
        Value::NIL
    } else {
        Value::tag(payload, Tag::Cons)
    }
}

/// Copy `x` into `dest`, restoring `regions`' active region afterward.
/// This is `copy_back`: the usual way a value built in a scratch region
/// escapes into the region it will actually be used from.
pub fn copy_back(regions: &mut RegionAllocator, dest: crate::region::RegionHandle, x: Value) -> Value {
    let _guard = regions.enter(dest);
    copy(regions, x)
}
