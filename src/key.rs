//! Lookup keys for the string table.
//!
//! A `StringTableKey` is either a string that already lives on the heap or a
//! `LazyKey` over raw code units. Lazy keys let a lookup hit without
//! allocating; they only become heap strings on an insert miss.

use crate::heap::{Heap, HeapError, StrRef};
use crate::string::{hash_of_field, CharSpan, HashFieldCache, HeapString};

#[derive(Clone, Copy, Debug)]
enum LazyChars<'a> {
    Span(CharSpan<'a>),
    Pair([u16; 2]),
}

/// Deferred key over borrowed (or two inline) code units.
///
/// The hash field is computed on first request under a given seed and
/// cached; later requests under that seed return the same bits.
#[derive(Clone, Debug)]
pub struct LazyKey<'a> {
    chars: LazyChars<'a>,
    hash_field: HashFieldCache,
}

impl<'a> LazyKey<'a> {
    pub fn new(span: CharSpan<'a>) -> Self {
        Self {
            chars: LazyChars::Span(span),
            hash_field: HashFieldCache::default(),
        }
    }

    pub fn one_byte(bytes: &'a [u8]) -> Self {
        Self::new(CharSpan::OneByte(bytes))
    }

    pub fn two_byte(units: &'a [u16]) -> Self {
        Self::new(CharSpan::TwoByte(units))
    }

    /// Key over exactly two code units, held inline.
    pub fn two_chars(c1: u16, c2: u16) -> LazyKey<'static> {
        LazyKey {
            chars: LazyChars::Pair([c1, c2]),
            hash_field: HashFieldCache::default(),
        }
    }

    pub fn chars(&self) -> CharSpan<'_> {
        match &self.chars {
            LazyChars::Span(span) => *span,
            LazyChars::Pair(pair) => CharSpan::TwoByte(pair),
        }
    }

    /// Hash field under `seed`, memoized per seed.
    pub fn hash_field(&self, seed: u64) -> u32 {
        self.hash_field.get_or_compute(seed, self.chars())
    }

    pub fn hash(&self, seed: u64) -> u32 {
        hash_of_field(self.hash_field(seed))
    }

    pub fn is_match(&self, s: &HeapString) -> bool {
        self.chars().content_eq(&s.chars())
    }

    /// Materializes the key as a new heap string.
    ///
    /// This allocates, so the collector may run: any heap reference the
    /// caller read before this call must be re-read afterwards.
    pub fn as_handle<H>(&self, heap: &mut H) -> Result<StrRef, HeapError>
    where
        H: Heap + ?Sized,
    {
        let seed = heap.hash_seed();
        let field = self.hash_field(seed);
        let r = heap.allocate_string(self.chars())?;
        if let Some(s) = heap.get(r) {
            s.seed_hash_field(seed, field);
        }
        Ok(r)
    }
}

/// Key accepted by `StringTable` lookups.
#[derive(Clone, Debug)]
pub enum StringTableKey<'a> {
    Lazy(LazyKey<'a>),
    String(StrRef),
}

impl<'a> StringTableKey<'a> {
    /// Table hash of the key, or `None` when it names a reclaimed string.
    pub fn hash<H>(&self, heap: &H) -> Option<u32>
    where
        H: Heap + ?Sized,
    {
        let seed = heap.hash_seed();
        match self {
            StringTableKey::Lazy(k) => Some(k.hash(seed)),
            StringTableKey::String(r) => heap.get(*r).map(|s| hash_of_field(s.hash_field(seed))),
        }
    }

    /// Whether the key denotes the same content as `entry`, whose resolved
    /// string is `s`.
    pub fn is_match<H>(&self, heap: &H, entry: StrRef, s: &HeapString) -> bool
    where
        H: Heap + ?Sized,
    {
        match self {
            StringTableKey::Lazy(k) => k.is_match(s),
            StringTableKey::String(r) if *r == entry => true,
            StringTableKey::String(r) => heap
                .get(*r)
                .map_or(false, |own| own.chars().content_eq(&s.chars())),
        }
    }

    /// The heap string this key stands for, allocating only for lazy keys.
    pub(crate) fn materialize<H>(&self, heap: &mut H) -> Result<StrRef, HeapError>
    where
        H: Heap + ?Sized,
    {
        match self {
            StringTableKey::Lazy(k) => k.as_handle(heap),
            StringTableKey::String(r) => Ok(*r),
        }
    }
}

impl<'a> From<LazyKey<'a>> for StringTableKey<'a> {
    fn from(k: LazyKey<'a>) -> Self {
        StringTableKey::Lazy(k)
    }
}

impl From<StrRef> for StringTableKey<'_> {
    fn from(r: StrRef) -> Self {
        StringTableKey::String(r)
    }
}
