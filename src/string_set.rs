//! StringSet: identity-hashed set of canonical strings.
//!
//! Sets are values. `add` returns a set containing the new member and leaves
//! the receiver as it was; storage is shared until one side is modified.

use crate::error::TableError;
use crate::heap::{Heap, StrRef};
use crate::shape::{Shape, StringSetShape};
use crate::table::{Table, TableConfig, TableStats};
use std::rc::Rc;

#[derive(Clone, Debug)]
pub struct StringSet {
    table: Rc<Table<StringSetShape>>,
}

impl StringSet {
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
            table: Rc::new(Table::new(heap, config)?),
        })
    }

    /// A set that contains `value`. When `value` is already a member this is
    /// `self` again, sharing its storage.
    ///
    /// `value` must be a canonical (interned) string.
    pub fn add<H>(&self, heap: &mut H, value: StrRef) -> Result<StringSet, TableError>
    where
        H: Heap + ?Sized,
    {
        let mut next = self.clone();
        next.insert(heap, value)?;
        Ok(next)
    }

    /// In-place variant of `add`; copies storage only while it is shared,
    /// and asks the heap for the copy first. Returns whether `value` was
    /// newly added.
    pub fn insert<H>(&mut self, heap: &mut H, value: StrRef) -> Result<bool, TableError>
    where
        H: Heap + ?Sized,
    {
        let s = heap.get(value).ok_or(TableError::DanglingReference)?;
        debug_assert!(s.is_internalized(), "string sets hold canonical strings only");
        if self.has(&*heap, value) {
            return Ok(false);
        }
        let hash = StringSetShape::hash(&*heap, &value);
        if Rc::get_mut(&mut self.table).is_none() {
            heap.allocate_backing_store(self.table.backing_bytes())?;
        }
        Rc::make_mut(&mut self.table).insert_absent(heap, hash, value)?;
        Ok(true)
    }

    /// Pure probe: never allocates.
    pub fn has<H>(&self, heap: &H, value: StrRef) -> bool
    where
        H: Heap + ?Sized,
    {
        self.table.find(heap, &value).is_some()
    }

    /// Whether both sets share the same storage.
    pub fn ptr_eq(a: &StringSet, b: &StringSet) -> bool {
        Rc::ptr_eq(&a.table, &b.table)
    }

    /// Live members, in no particular order.
    pub fn iter<'a, H>(&'a self, heap: &'a H) -> impl Iterator<Item = StrRef> + 'a
    where
        H: Heap + ?Sized,
    {
        self.table
            .iter()
            .filter(move |&r| StringSetShape::is_live(heap, r))
    }

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
