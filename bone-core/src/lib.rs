//! Bone Core: the tagged value representation shared by the rest of the
//! workspace.
//!
//! A [`Value`] is a single 64-bit word: a 3-bit type tag in the low bits and
//! a 61-bit payload in the high bits. Every heap-resident object (pairs,
//! strings, symbols, subs, regions) is 8-byte aligned, so its address alone
//! carries the tag in its otherwise-unused low bits. Numbers are the
//! exception: they are unboxed and carry their 32-bit payload directly in
//! the high half of the word rather than pointing anywhere.
//!
//! This crate has no allocator, no I/O, and no notion of "the current
//! region" — it only knows how to tag, untag, and classify words. Everything
//! that allocates lives in `bone-runtime`.

mod tag;
mod value;

pub use tag::Tag;
pub use value::{TypeError, Value};
