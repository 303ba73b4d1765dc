//! Table: open-addressing slot array parameterized by a `Shape`.
//!
//! Slots are `Empty`, `Deleted` (tombstone), or `Occupied` with the entry and
//! the hash it was inserted under. Capacity is a power of two and the probe
//! sequence is triangular, which visits every slot exactly once per cycle.
//!
//! An occupied slot whose entry the collector reclaimed is "cleared". Probes
//! step over it like a tombstone (it never matches and never ends a chain).
//! An insert reuses the first cleared or deleted slot on its path; rehashing
//! drops cleared entries altogether.

use crate::heap::{Heap, HeapError};
use crate::shape::Shape;
use core::marker::PhantomData;
use core::mem;
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot<E> {
    Empty,
    Deleted,
    Occupied { entry: E, hash: u32 },
}

/// Position of a slot in the current generation of the table. Invalidated by
/// any rehash.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct InternalIndex(usize);

/// Sizing policy. All capacities are rounded up to powers of two.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableConfig {
    pub initial_capacity: usize,
    pub min_capacity: usize,
    pub min_shrink_capacity: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 16,
            min_capacity: 4,
            min_shrink_capacity: 16,
        }
    }
}

impl TableConfig {
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn with_min_capacity(mut self, capacity: usize) -> Self {
        self.min_capacity = capacity;
        self
    }

    pub fn with_min_shrink_capacity(mut self, capacity: usize) -> Self {
        self.min_shrink_capacity = capacity;
        self
    }

    fn normalized(self) -> Self {
        let min_capacity = self.min_capacity.max(2).next_power_of_two();
        Self {
            initial_capacity: self.initial_capacity.max(min_capacity).next_power_of_two(),
            min_capacity,
            min_shrink_capacity: self.min_shrink_capacity.max(min_capacity).next_power_of_two(),
        }
    }
}

/// Bookkeeping snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableStats {
    /// Occupied slots, including cleared ones not yet compacted.
    pub len: usize,
    pub deleted: usize,
    pub capacity: usize,
}

struct Probe {
    pos: usize,
    step: usize,
    mask: usize,
    remaining: usize,
}

impl Probe {
    fn new(hash: u32, capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        let mask = capacity - 1;
        Self {
            pos: hash as usize & mask,
            step: 0,
            mask,
            remaining: capacity,
        }
    }
}

impl Iterator for Probe {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.pos;
        self.remaining -= 1;
        self.step += 1;
        self.pos = (self.pos + self.step) & self.mask;
        Some(current)
    }
}

pub struct Table<S: Shape> {
    slots: Box<[Slot<S::Entry>]>,
    live: usize,
    deleted: usize,
    config: TableConfig,
    touched: bool,
    _shape: PhantomData<fn() -> S>,
}

impl<S: Shape> Clone for Table<S> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            live: self.live,
            deleted: self.deleted,
            config: self.config.clone(),
            touched: self.touched,
            _shape: PhantomData,
        }
    }
}

impl<S: Shape> core::fmt::Debug for Table<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Table")
            .field("live", &self.live)
            .field("deleted", &self.deleted)
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl<S: Shape> Table<S> {
    pub fn new<H>(heap: &mut H, config: TableConfig) -> Result<Self, HeapError>
    where
        H: Heap + ?Sized,
    {
        let config = config.normalized();
        let slots = Self::allocate_slots(heap, config.initial_capacity)?;
        Ok(Self {
            slots,
            live: 0,
            deleted: 0,
            config,
            touched: false,
            _shape: PhantomData,
        })
    }

    fn allocate_slots<H>(heap: &mut H, capacity: usize) -> Result<Box<[Slot<S::Entry>]>, HeapError>
    where
        H: Heap + ?Sized,
    {
        let bytes = capacity
            .checked_mul(mem::size_of::<Slot<S::Entry>>())
            .filter(|&bytes| bytes <= isize::MAX as usize)
            .ok_or(HeapError::OutOfMemory {
                requested: usize::MAX,
            })?;
        heap.allocate_backing_store(bytes)?;
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| HeapError::OutOfMemory { requested: bytes })?;
        slots.resize(capacity, Slot::Empty);
        Ok(slots.into_boxed_slice())
    }

    /// Bytes held by the slot array.
    pub fn backing_bytes(&self) -> usize {
        self.capacity() * mem::size_of::<Slot<S::Entry>>()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn deleted(&self) -> usize {
        self.deleted
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            len: self.live,
            deleted: self.deleted,
            capacity: self.capacity(),
        }
    }

    /// True until the first insert.
    pub fn is_pristine(&self) -> bool {
        !self.touched
    }

    fn probe(&self, hash: u32) -> Probe {
        Probe::new(hash, self.capacity())
    }

    pub fn find<H>(&self, heap: &H, key: &S::Key<'_>) -> Option<InternalIndex>
    where
        H: Heap + ?Sized,
    {
        self.find_hashed(heap, key, S::hash(heap, key))
    }

    /// Probes for `key` known to hash to `hash`. Never mutates, never
    /// allocates.
    pub fn find_hashed<H>(&self, heap: &H, key: &S::Key<'_>, hash: u32) -> Option<InternalIndex>
    where
        H: Heap + ?Sized,
    {
        for i in self.probe(hash) {
            match self.slots[i] {
                Slot::Empty => return None,
                Slot::Deleted => continue,
                Slot::Occupied { entry, hash: stored } => {
                    // Debug builds test every slot on the chain so a shape whose
                    // equality outruns its hash is caught instead of skipped.
                    if (cfg!(debug_assertions) || stored == hash) && S::is_match(heap, key, entry) {
                        debug_assert_eq!(
                            stored, hash,
                            "shape invariant violated: matching key hashes differently from entry {:?}",
                            entry
                        );
                        debug_assert_eq!(
                            S::hash_for_entry(heap, entry),
                            Some(stored),
                            "shape invariant violated: stored hash of {:?} drifted",
                            entry
                        );
                        return Some(InternalIndex(i));
                    }
                }
            }
        }
        None
    }

    pub fn entry(&self, index: InternalIndex) -> Option<S::Entry> {
        match self.slots.get(index.0) {
            Some(Slot::Occupied { entry, .. }) => Some(*entry),
            _ => None,
        }
    }

    /// Finds `key`, or materializes and inserts it. Returns the entry and
    /// whether it was inserted.
    ///
    /// `materialize` and any growth are suspension points. The key's hash is
    /// computed once, before either runs. A failure in either leaves the
    /// table's membership unchanged.
    pub fn find_or_insert_with<H, F>(
        &mut self,
        heap: &mut H,
        key: &S::Key<'_>,
        materialize: F,
    ) -> Result<(S::Entry, bool), HeapError>
    where
        H: Heap + ?Sized,
        F: FnOnce(&mut H) -> Result<S::Entry, HeapError>,
    {
        let hash = S::hash(heap, key);
        if let Some(entry) = self.find_hashed(heap, key, hash).and_then(|i| self.entry(i)) {
            return Ok((entry, false));
        }
        let entry = materialize(heap)?;
        trace!(hash, ?entry, "materialized on miss");
        debug_assert_eq!(
            S::hash_for_entry(heap, entry),
            Some(hash),
            "shape invariant violated: materialized entry hashes differently from its key"
        );
        self.insert_absent(heap, hash, entry)?;
        Ok((entry, true))
    }

    /// Inserts an entry the caller knows is absent, growing first if needed.
    /// Returns the slot and whether a rehash happened.
    pub fn insert_absent<H>(
        &mut self,
        heap: &mut H,
        hash: u32,
        entry: S::Entry,
    ) -> Result<(InternalIndex, bool), HeapError>
    where
        H: Heap + ?Sized,
    {
        let grew = self.ensure_capacity(heap, 1)?;
        Ok((self.place(heap, hash, entry), grew))
    }

    /// Writes `entry` at the first free, deleted, or cleared slot on its
    /// probe path. Requires room for one more entry.
    fn place<H>(&mut self, heap: &H, hash: u32, entry: S::Entry) -> InternalIndex
    where
        H: Heap + ?Sized,
    {
        self.touched = true;
        for i in self.probe(hash) {
            match self.slots[i] {
                Slot::Empty => {
                    self.live += 1;
                }
                Slot::Deleted => {
                    self.deleted -= 1;
                    self.live += 1;
                }
                Slot::Occupied { entry: old, .. } if !S::is_live(heap, old) => {
                    trace!(slot = i, ?old, "reusing cleared slot");
                }
                Slot::Occupied { .. } => continue,
            }
            self.slots[i] = Slot::Occupied { entry, hash };
            return InternalIndex(i);
        }
        unreachable!("table has no free slot despite capacity check");
    }

    /// Marks the slot deleted. Returns the entry it held.
    pub fn delete(&mut self, index: InternalIndex) -> Option<S::Entry> {
        let slot = self.slots.get_mut(index.0)?;
        match *slot {
            Slot::Occupied { entry, .. } => {
                *slot = Slot::Deleted;
                self.live -= 1;
                self.deleted += 1;
                Some(entry)
            }
            _ => None,
        }
    }

    /// Turns every cleared slot into a tombstone. Returns how many.
    pub fn clear_reclaimed<H>(&mut self, heap: &H) -> usize
    where
        H: Heap + ?Sized,
    {
        let mut cleared = 0;
        for slot in self.slots.iter_mut() {
            if let Slot::Occupied { entry, .. } = *slot {
                if !S::is_live(heap, entry) {
                    *slot = Slot::Deleted;
                    cleared += 1;
                }
            }
        }
        self.live -= cleared;
        self.deleted += cleared;
        cleared
    }

    /// Whether `additional` more entries fit without rehashing: at least a
    /// third of the slots stay free, and tombstones fill at most half of
    /// what remains.
    pub fn has_sufficient_capacity(&self, additional: usize) -> bool {
        let capacity = self.capacity();
        let nof = self.live.saturating_add(additional);
        let needed_free = nof / 2;
        nof.saturating_add(needed_free) <= capacity && self.deleted <= (capacity - nof) / 2
    }

    /// Smallest capacity that holds `at_least` entries with room to spare.
    fn compute_capacity(&self, at_least: usize) -> Result<usize, HeapError> {
        at_least
            .checked_add(at_least / 2)
            .and_then(usize::checked_next_power_of_two)
            .map(|c| c.max(self.config.min_capacity))
            .ok_or(HeapError::OutOfMemory {
                requested: usize::MAX,
            })
    }

    /// Rehashes if `additional` entries would not fit. Returns whether it did.
    pub fn ensure_capacity<H>(&mut self, heap: &mut H, additional: usize) -> Result<bool, HeapError>
    where
        H: Heap + ?Sized,
    {
        if self.has_sufficient_capacity(additional) {
            return Ok(false);
        }
        let nof = self.live.saturating_add(additional);
        let capacity = self.compute_capacity(nof)?;
        self.rehash(heap, capacity)?;
        Ok(true)
    }

    /// Rehashes into fewer slots while at most a quarter are live, never
    /// below `min_shrink_capacity`; otherwise rehashes in place when
    /// tombstones or cleared slots exist. Returns whether it rehashed.
    pub fn shrink<H>(&mut self, heap: &mut H) -> Result<bool, HeapError>
    where
        H: Heap + ?Sized,
    {
        let live = self.iter().filter(|&e| S::is_live(&*heap, e)).count();
        let capacity = self.capacity();
        let target = if live <= capacity / 4 {
            self.compute_capacity(live)?
                .max(self.config.min_shrink_capacity)
                .min(capacity)
        } else {
            capacity
        };
        if target == capacity && self.deleted == 0 && live == self.live {
            return Ok(false);
        }
        self.rehash(heap, target)?;
        Ok(true)
    }

    /// Moves every live entry into a fresh array of `capacity` slots,
    /// dropping tombstones and cleared entries. The new array is obtained
    /// before anything changes, so a refusal leaves the table untouched.
    fn rehash<H>(&mut self, heap: &mut H, capacity: usize) -> Result<(), HeapError>
    where
        H: Heap + ?Sized,
    {
        let mut slots = Self::allocate_slots(heap, capacity)?;
        let from = self.capacity();
        let (old_live, old_deleted) = (self.live, self.deleted);
        let mut live = 0;
        for slot in self.slots.iter() {
            if let Slot::Occupied { entry, hash } = *slot {
                if !S::is_live(&*heap, entry) {
                    continue;
                }
                let i = Probe::new(hash, capacity)
                    .find(|&i| slots[i] == Slot::Empty)
                    .unwrap_or_else(|| unreachable!("rehash target too small"));
                slots[i] = Slot::Occupied { entry, hash };
                live += 1;
            }
        }
        debug!(
            from,
            to = capacity,
            live,
            dropped_deleted = old_deleted,
            dropped_cleared = old_live - live,
            "rehashed table"
        );
        self.slots = slots;
        self.live = live;
        self.deleted = 0;
        Ok(())
    }

    /// Entries of occupied slots, cleared ones included. Order unspecified.
    pub fn iter(&self) -> impl Iterator<Item = S::Entry> + '_ {
        self.slots.iter().filter_map(|slot| match *slot {
            Slot::Occupied { entry, .. } => Some(entry),
            _ => None,
        })
    }
}
