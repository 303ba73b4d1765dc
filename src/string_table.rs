//! StringTable: the canonicalizing table every interned string goes through.
//!
//! Strings a table stores are marked internalized. The mark is a heap-wide
//! hint for string sets; a table answers only from its own slots, so several
//! tables may share one heap.

use crate::error::TableError;
use crate::heap::{Heap, StrRef};
use crate::key::{LazyKey, StringTableKey};
use crate::shape::{Shape, StringTableShape};
use crate::table::{Table, TableConfig, TableStats};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct StringTable {
    table: Table<StringTableShape>,
}

impl StringTable {
    pub fn new<H>(heap: &mut H) -> Result<Self, TableError>
    where
        H: Heap + ?Sized,
    {
        Self::with_config(heap, TableConfig::default())
    }

    pub fn with_config<H>(heap: &mut H, config: TableConfig) -> Result<Self, TableError>
    where
        H: Heap + ?Sized,
    {
        Ok(Self {
            table: Table::new(heap, config)?,
        })
    }

    /// Returns the canonical copy of `candidate`'s content. If none exists,
    /// `candidate` itself becomes canonical.
    ///
    /// May grow the table, which allocates: treat every other heap reference
    /// as stale afterwards.
    pub fn lookup_or_insert<H>(&mut self, heap: &mut H, candidate: StrRef) -> Result<StrRef, TableError>
    where
        H: Heap + ?Sized,
    {
        if heap.get(candidate).is_none() {
            return Err(TableError::DanglingReference);
        }
        self.intern(heap, &StringTableKey::String(candidate))
    }

    /// Like `lookup_or_insert`, but only allocates a string on a miss.
    pub fn lookup_lazy<H>(&mut self, heap: &mut H, key: LazyKey<'_>) -> Result<StrRef, TableError>
    where
        H: Heap + ?Sized,
    {
        self.intern(heap, &StringTableKey::Lazy(key))
    }

    fn intern<H>(&mut self, heap: &mut H, key: &StringTableKey<'_>) -> Result<StrRef, TableError>
    where
        H: Heap + ?Sized,
    {
        let (canonical, inserted) = self
            .table
            .find_or_insert_with(heap, key, |heap| key.materialize(heap))?;
        if inserted {
            if let Some(s) = heap.get(canonical) {
                s.mark_internalized();
            }
        }
        Ok(canonical)
    }

    /// Pure probe: never allocates, never mutates.
    pub fn lookup_if_exists<H>(&self, heap: &H, key: &StringTableKey<'_>) -> Option<StrRef>
    where
        H: Heap + ?Sized,
    {
        self.table.find(heap, key).and_then(|i| self.table.entry(i))
    }

    /// Pure probe by an existing heap string.
    pub fn lookup_string_if_exists<H>(&self, heap: &H, string: StrRef) -> Option<StrRef>
    where
        H: Heap + ?Sized,
    {
        heap.get(string)?;
        self.lookup_if_exists(heap, &StringTableKey::String(string))
    }

    /// Pure probe for the two-unit string `c1 c2`.
    pub fn lookup_two_chars_if_exists<H>(&self, heap: &H, c1: u16, c2: u16) -> Option<StrRef>
    where
        H: Heap + ?Sized,
    {
        self.lookup_if_exists(heap, &StringTableKey::Lazy(LazyKey::two_chars(c1, c2)))
    }

    /// Sizes the table for `expected` strings about to be restored from a
    /// snapshot, so that restoring them never rehashes.
    ///
    /// # Panics
    ///
    /// If the table has already seen an insert.
    pub fn ensure_capacity_for_restore<H>(&mut self, heap: &mut H, expected: usize) -> Result<(), TableError>
    where
        H: Heap + ?Sized,
    {
        assert!(
            self.table.is_pristine(),
            "restore reservation after the string table was already used"
        );
        let before = self.table.capacity();
        self.table.ensure_capacity(heap, expected)?;
        debug!(expected, from = before, to = self.table.capacity(), "reserved for restore");
        Ok(())
    }

    /// Raw insert of a string read back from a snapshot.
    pub fn add_restored<H>(&mut self, heap: &mut H, string: StrRef) -> Result<StrRef, TableError>
    where
        H: Heap + ?Sized,
    {
        let hash = StringTableShape::hash_for_entry(&*heap, string).ok_or(TableError::DanglingReference)?;
        let key = StringTableKey::String(string);
        let existing = self
            .table
            .find_hashed(&*heap, &key, hash)
            .and_then(|i| self.table.entry(i));
        debug_assert!(existing.is_none(), "snapshot holds {:?} twice", string);
        if let Some(existing) = existing {
            return Ok(existing);
        }
        let (_, grew) = self.table.insert_absent(heap, hash, string)?;
        if grew {
            warn!(capacity = self.table.capacity(), "restore overran its reservation");
        }
        if let Some(s) = heap.get(string) {
            s.mark_internalized();
        }
        Ok(string)
    }

    /// Tombstones slots whose strings the collector reclaimed. Returns how
    /// many.
    pub fn clear_reclaimed<H>(&mut self, heap: &H) -> usize
    where
        H: Heap + ?Sized,
    {
        self.table.clear_reclaimed(heap)
    }

    /// Compacts away tombstones and reclaimed entries, shrinking when sparse.
    /// Returns whether the table was rehashed.
    pub fn shrink<H>(&mut self, heap: &mut H) -> Result<bool, TableError>
    where
        H: Heap + ?Sized,
    {
        Ok(self.table.shrink(heap)?)
    }

    /// Live canonical strings, in no particular order.
    pub fn iter<'a, H>(&'a self, heap: &'a H) -> impl Iterator<Item = StrRef> + 'a
    where
        H: Heap + ?Sized,
    {
        self.table
            .iter()
            .filter(move |&r| StringTableShape::is_live(heap, r))
    }

    /// Occupied slots, counting reclaimed strings not yet compacted.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn stats(&self) -> TableStats {
        self.table.stats()
    }
}
