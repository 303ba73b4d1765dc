//! Key shapes: the hashing and equality policy a `Table` is instantiated with.
//!
//! A shape is resolved statically, so each table monomorphizes its probe
//! loop. The one contract every shape must keep: whenever
//! `is_match(key, entry)` holds, `hash(key) == hash_for_entry(entry)`.
//! Breaking it lets the table store two canonical copies of one value.

use crate::heap::{Heap, StrRef};
use crate::key::StringTableKey;
use crate::string::hash_of_field;
use slotmap::Key;

pub trait Shape {
    /// What lookups probe with.
    type Key<'k>;
    /// What occupied slots hold.
    type Entry: Copy + Eq + core::fmt::Debug;

    fn hash<H>(heap: &H, key: &Self::Key<'_>) -> u32
    where
        H: Heap + ?Sized;

    /// Hash of a stored entry, or `None` once the collector cleared it.
    fn hash_for_entry<H>(heap: &H, entry: Self::Entry) -> Option<u32>
    where
        H: Heap + ?Sized;

    /// Must be false for cleared entries.
    fn is_match<H>(heap: &H, key: &Self::Key<'_>, entry: Self::Entry) -> bool
    where
        H: Heap + ?Sized;

    fn is_live<H>(heap: &H, entry: Self::Entry) -> bool
    where
        H: Heap + ?Sized,
    {
        Self::hash_for_entry(heap, entry).is_some()
    }
}

/// Content hashing over code units; keys may be lazy or materialized.
#[derive(Clone, Copy, Debug, Default)]
pub struct StringTableShape;

impl Shape for StringTableShape {
    type Key<'k> = StringTableKey<'k>;
    type Entry = StrRef;

    #[inline]
    fn hash<H>(heap: &H, key: &StringTableKey<'_>) -> u32
    where
        H: Heap + ?Sized,
    {
        // A reclaimed key matches nothing, so any fixed hash will do.
        key.hash(heap).unwrap_or(0)
    }

    #[inline]
    fn hash_for_entry<H>(heap: &H, entry: StrRef) -> Option<u32>
    where
        H: Heap + ?Sized,
    {
        let seed = heap.hash_seed();
        heap.get(entry).map(|s| hash_of_field(s.hash_field(seed)))
    }

    #[inline]
    fn is_match<H>(heap: &H, key: &StringTableKey<'_>, entry: StrRef) -> bool
    where
        H: Heap + ?Sized,
    {
        heap.get(entry)
            .map_or(false, |s| key.is_match(heap, entry, s))
    }

    #[inline]
    fn is_live<H>(heap: &H, entry: StrRef) -> bool
    where
        H: Heap + ?Sized,
    {
        heap.get(entry).is_some()
    }
}

/// Identity hashing over canonical strings.
#[derive(Clone, Copy, Debug, Default)]
pub struct StringSetShape;

#[inline]
fn identity_hash(r: StrRef) -> u32 {
    let bits = r.data().as_ffi();
    (bits as u32) ^ ((bits >> 32) as u32).rotate_left(16)
}

impl Shape for StringSetShape {
    type Key<'k> = StrRef;
    type Entry = StrRef;

    #[inline]
    fn hash<H>(_heap: &H, key: &StrRef) -> u32
    where
        H: Heap + ?Sized,
    {
        identity_hash(*key)
    }

    #[inline]
    fn hash_for_entry<H>(heap: &H, entry: StrRef) -> Option<u32>
    where
        H: Heap + ?Sized,
    {
        heap.get(entry).map(|_| identity_hash(entry))
    }

    #[inline]
    fn is_match<H>(heap: &H, key: &StrRef, entry: StrRef) -> bool
    where
        H: Heap + ?Sized,
    {
        *key == entry && heap.get(entry).is_some()
    }
}
