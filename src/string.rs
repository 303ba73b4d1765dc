//! Heap string storage and the seeded string hasher.
//!
//! Strings are sequences of UTF-16 code units. A string whose units all fit
//! in a byte is stored one byte per unit; anything else is stored two bytes
//! per unit. Hashing and equality always run over the widened code units, so
//! the same text hashes and compares identically in either encoding.

use core::cell::Cell;
use core::slice;

/// Bits of the hash field below the hash itself.
pub(crate) const HASH_SHIFT: u32 = 2;

/// Set in the hash field when the string is not a canonical array index.
pub(crate) const NOT_ARRAY_INDEX_BIT: u32 = 1 << 1;

/// A hash field of zero means "not computed yet"; valid fields are never zero.
pub(crate) const HASH_NOT_COMPUTED: u32 = 0;

const HASH_BIT_MASK: u32 = (1 << 30) - 1;
const ZERO_HASH: u32 = 27;
const MAX_ARRAY_INDEX: u64 = (u32::MAX - 1) as u64;
const MAX_ARRAY_INDEX_LEN: usize = 10;

/// Borrowed view over a string's code units.
#[derive(Copy, Clone, Debug)]
pub enum CharSpan<'a> {
    OneByte(&'a [u8]),
    TwoByte(&'a [u16]),
}

impl<'a> CharSpan<'a> {
    pub fn len(&self) -> usize {
        match self {
            CharSpan::OneByte(b) => b.len(),
            CharSpan::TwoByte(w) => w.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn units(&self) -> Units<'a> {
        match *self {
            CharSpan::OneByte(b) => Units::OneByte(b.iter()),
            CharSpan::TwoByte(w) => Units::TwoByte(w.iter()),
        }
    }

    /// Code-unit equality, independent of encoding.
    pub fn content_eq(&self, other: &CharSpan<'_>) -> bool {
        if self.len() != other.len() {
            return false;
        }
        match (self, other) {
            (CharSpan::OneByte(a), CharSpan::OneByte(b)) => a == b,
            (CharSpan::TwoByte(a), CharSpan::TwoByte(b)) => a == b,
            _ => self.units().eq(other.units()),
        }
    }
}

/// Iterator over widened code units.
pub enum Units<'a> {
    OneByte(slice::Iter<'a, u8>),
    TwoByte(slice::Iter<'a, u16>),
}

impl<'a> Iterator for Units<'a> {
    type Item = u16;

    #[inline]
    fn next(&mut self) -> Option<u16> {
        match self {
            Units::OneByte(it) => it.next().map(|&b| u16::from(b)),
            Units::TwoByte(it) => it.next().copied(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Units::OneByte(it) => it.size_hint(),
            Units::TwoByte(it) => it.size_hint(),
        }
    }
}

#[inline]
fn add_unit(running: u32, unit: u16) -> u32 {
    let mut h = running.wrapping_add(u32::from(unit));
    h = h.wrapping_add(h << 10);
    h ^ (h >> 6)
}

#[inline]
fn finalize(running: u32) -> u32 {
    let mut h = running.wrapping_add(running << 3);
    h ^= h >> 11;
    h = h.wrapping_add(h << 15);
    h &= HASH_BIT_MASK;
    if h == 0 {
        ZERO_HASH
    } else {
        h
    }
}

/// Value of `span` as a canonical array index, if it is one.
///
/// Canonical means decimal digits only, no leading zero (except `"0"`
/// itself), and a value no larger than `2^32 - 2`.
pub fn array_index(span: CharSpan<'_>) -> Option<u32> {
    let len = span.len();
    if len == 0 || len > MAX_ARRAY_INDEX_LEN {
        return None;
    }
    let mut units = span.units();
    let first = units.next()?;
    if !(u16::from(b'0')..=u16::from(b'9')).contains(&first) {
        return None;
    }
    if first == u16::from(b'0') && len > 1 {
        return None;
    }
    let mut value = u64::from(first - u16::from(b'0'));
    for u in units {
        if !(u16::from(b'0')..=u16::from(b'9')).contains(&u) {
            return None;
        }
        value = value * 10 + u64::from(u - u16::from(b'0'));
    }
    if value > MAX_ARRAY_INDEX {
        return None;
    }
    Some(value as u32)
}

/// Both halves of the seed feed the running hash.
#[inline]
fn fold_seed(seed: u64) -> u32 {
    (seed as u32) ^ ((seed >> 32) as u32)
}

/// Computes the full hash field for `span` under `seed`.
pub fn compute_hash_field(span: CharSpan<'_>, seed: u64) -> u32 {
    let running = span.units().fold(fold_seed(seed), add_unit);
    let hash = finalize(running);
    let flags = if array_index(span).is_some() {
        0
    } else {
        NOT_ARRAY_INDEX_BIT
    };
    (hash << HASH_SHIFT) | flags
}

/// Extracts the table hash from a hash field.
#[inline]
pub fn hash_of_field(field: u32) -> u32 {
    debug_assert_ne!(field, HASH_NOT_COMPUTED);
    field >> HASH_SHIFT
}

/// A memoized hash field and the seed it was computed under. A query
/// under any other seed recomputes.
#[derive(Clone, Debug, Default)]
pub(crate) struct HashFieldCache {
    seed: Cell<u64>,
    field: Cell<u32>,
}

impl HashFieldCache {
    pub(crate) fn get_or_compute(&self, seed: u64, span: CharSpan<'_>) -> u32 {
        if let Some(field) = self.cached(seed) {
            return field;
        }
        let field = compute_hash_field(span, seed);
        self.install(seed, field);
        field
    }

    pub(crate) fn cached(&self, seed: u64) -> Option<u32> {
        let field = self.field.get();
        (field != HASH_NOT_COMPUTED && self.seed.get() == seed).then_some(field)
    }

    pub(crate) fn install(&self, seed: u64, field: u32) {
        self.seed.set(seed);
        self.field.set(field);
    }
}

#[derive(Clone, Debug)]
enum Chars {
    OneByte(Box<[u8]>),
    TwoByte(Box<[u16]>),
}

/// A string as stored by the heap collaborator.
#[derive(Debug)]
pub struct HeapString {
    chars: Chars,
    hash_field: HashFieldCache,
    internalized: Cell<bool>,
}

impl HeapString {
    /// Copies `span` into a fresh string, narrowing to one byte per unit when
    /// every unit fits.
    pub fn new(span: CharSpan<'_>) -> Self {
        let chars = match span {
            CharSpan::OneByte(b) => Chars::OneByte(b.into()),
            CharSpan::TwoByte(w) if w.iter().all(|&u| u <= 0xFF) => {
                Chars::OneByte(w.iter().map(|&u| u as u8).collect())
            }
            CharSpan::TwoByte(w) => Chars::TwoByte(w.into()),
        };
        Self {
            chars,
            hash_field: HashFieldCache::default(),
            internalized: Cell::new(false),
        }
    }

    pub fn from_text(s: &str) -> Self {
        let units: Vec<u16> = s.encode_utf16().collect();
        Self::new(CharSpan::TwoByte(&units))
    }

    pub fn chars(&self) -> CharSpan<'_> {
        match &self.chars {
            Chars::OneByte(b) => CharSpan::OneByte(b),
            Chars::TwoByte(w) => CharSpan::TwoByte(w),
        }
    }

    pub fn len(&self) -> usize {
        self.chars().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_one_byte(&self) -> bool {
        matches!(self.chars, Chars::OneByte(_))
    }

    /// Storage footprint charged against the heap budget.
    pub fn byte_size(&self) -> usize {
        match &self.chars {
            Chars::OneByte(b) => b.len(),
            Chars::TwoByte(w) => w.len() * 2,
        }
    }

    /// Hash field under `seed`, memoized per seed.
    pub fn hash_field(&self, seed: u64) -> u32 {
        self.hash_field.get_or_compute(seed, self.chars())
    }

    /// Installs a hash field a lazy key over the same content computed
    /// under `seed`, sparing the recomputation.
    pub(crate) fn seed_hash_field(&self, seed: u64, field: u32) {
        if let Some(current) = self.hash_field.cached(seed) {
            debug_assert_eq!(current, field, "hash field drift under seed {seed:#x}");
        }
        self.hash_field.install(seed, field);
    }

    pub fn array_index(&self) -> Option<u32> {
        array_index(self.chars())
    }

    /// Whether a string table holds this string as a canonical entry.
    pub fn is_internalized(&self) -> bool {
        self.internalized.get()
    }

    pub(crate) fn mark_internalized(&self) {
        self.internalized.set(true);
    }

    pub fn to_string_lossy(&self) -> String {
        char::decode_utf16(self.chars().units())
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}
