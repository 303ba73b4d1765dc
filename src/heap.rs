//! The heap collaborator: allocation, reclamation, and opaque string handles.
//!
//! The table never owns string storage. It holds `StrRef` handles and asks a
//! `Heap` to resolve them. A handle whose referent was reclaimed resolves to
//! `None`; the table treats such a slot as cleared. Any `&mut Heap` call is a
//! potential suspension point at which the collector may run; `&Heap` calls
//! never allocate.

use crate::string::{CharSpan, HeapString};
use slotmap::SlotMap;
use thiserror::Error;
use tracing::trace;

slotmap::new_key_type! {
    /// Opaque, generational handle to a heap string. Stays valid across
    /// relocation; stops resolving once the string is reclaimed.
    pub struct StrRef;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HeapError {
    #[error("heap exhausted: {requested} bytes requested")]
    OutOfMemory { requested: usize },
}

/// Interface the string table consumes from the managed heap.
pub trait Heap {
    /// Heap-wide seed mixed into every string hash.
    fn hash_seed(&self) -> u64;

    /// Current content of `r`, or `None` once the collector reclaimed it.
    fn get(&self, r: StrRef) -> Option<&HeapString>;

    /// Copies `content` into a new heap string.
    fn allocate_string(&mut self, content: CharSpan<'_>) -> Result<StrRef, HeapError>;

    /// Grants a table backing array of `bytes` bytes.
    fn allocate_backing_store(&mut self, bytes: usize) -> Result<(), HeapError>;
}

/// Settings for `StringHeap`.
#[derive(Clone, Debug, Default)]
pub struct HeapConfig {
    pub hash_seed: u64,
    /// Upper bound on live string bytes plus any single backing array.
    pub byte_limit: Option<usize>,
}

impl HeapConfig {
    pub fn with_hash_seed(mut self, seed: u64) -> Self {
        self.hash_seed = seed;
        self
    }

    pub fn with_byte_limit(mut self, limit: usize) -> Self {
        self.byte_limit = Some(limit);
        self
    }
}

/// Slotmap-backed heap for embedders without a collector of their own, and
/// for tests that need to script allocation failure and reclamation.
///
/// Backing arrays are checked against the budget when requested but are not
/// retained in it: the table owns them for as long as it lives.
#[derive(Debug, Default)]
pub struct StringHeap {
    config: HeapConfig,
    strings: SlotMap<StrRef, HeapString>,
    used_bytes: usize,
    allocations: usize,
    pending_reclaim: Vec<StrRef>,
}

impl StringHeap {
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    pub fn with_config(config: HeapConfig) -> Self {
        Self {
            config,
            strings: SlotMap::with_key(),
            used_bytes: 0,
            allocations: 0,
            pending_reclaim: Vec::new(),
        }
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Allocates a string from UTF-8 text, stored one byte per unit when it
    /// fits.
    pub fn allocate_str(&mut self, s: &str) -> Result<StrRef, HeapError> {
        let units: Vec<u16> = s.encode_utf16().collect();
        self.allocate_string(CharSpan::TwoByte(&units))
    }

    /// Number of live strings.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    /// Successful allocations so far, strings and backing arrays alike.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Reclaims `r` immediately. Returns false if it was already gone.
    pub fn reclaim(&mut self, r: StrRef) -> bool {
        match self.strings.remove(r) {
            Some(s) => {
                self.used_bytes -= s.byte_size();
                true
            }
            None => false,
        }
    }

    /// Schedules `r` for reclamation at the next allocation, modelling a
    /// collection that the mutator triggers without controlling.
    pub fn reclaim_at_next_allocation(&mut self, r: StrRef) {
        self.pending_reclaim.push(r);
    }

    /// Reclaims every string for which `keep` returns false. Returns the
    /// number reclaimed.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(StrRef, &HeapString) -> bool,
    {
        let mut freed = 0;
        let mut reclaimed = 0;
        self.strings.retain(|r, s| {
            let k = keep(r, s);
            if !k {
                freed += s.byte_size();
                reclaimed += 1;
            }
            k
        });
        self.used_bytes -= freed;
        reclaimed
    }

    /// Suspension point: runs scheduled reclamation, then checks the budget.
    fn charge(&mut self, bytes: usize) -> Result<(), HeapError> {
        for r in core::mem::take(&mut self.pending_reclaim) {
            if self.reclaim(r) {
                trace!(?r, "reclaimed during allocation");
            }
        }
        if let Some(limit) = self.config.byte_limit {
            if self.used_bytes.saturating_add(bytes) > limit {
                return Err(HeapError::OutOfMemory { requested: bytes });
            }
        }
        self.allocations += 1;
        Ok(())
    }
}

impl Heap for StringHeap {
    fn hash_seed(&self) -> u64 {
        self.config.hash_seed
    }

    fn get(&self, r: StrRef) -> Option<&HeapString> {
        self.strings.get(r)
    }

    fn allocate_string(&mut self, content: CharSpan<'_>) -> Result<StrRef, HeapError> {
        let s = HeapString::new(content);
        let bytes = s.byte_size();
        self.charge(bytes)?;
        self.used_bytes += bytes;
        Ok(self.strings.insert(s))
    }

    fn allocate_backing_store(&mut self, bytes: usize) -> Result<(), HeapError> {
        self.charge(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reclaimed_handle_stops_resolving() {
        let mut heap = StringHeap::new();
        let r = heap.allocate_str("gone").unwrap();
        assert!(heap.get(r).is_some());
        assert!(heap.reclaim(r));
        assert!(heap.get(r).is_none());
        assert!(!heap.reclaim(r));
        assert_eq!(heap.used_bytes(), 0);
    }

    #[test]
    fn stale_handle_does_not_alias_new_string() {
        let mut heap = StringHeap::new();
        let old = heap.allocate_str("old").unwrap();
        heap.reclaim(old);
        let new = heap.allocate_str("new").unwrap();
        assert_ne!(old, new);
        assert!(heap.get(old).is_none());
        assert_eq!(heap.get(new).unwrap().to_string_lossy(), "new");
    }

    #[test]
    fn byte_limit_refuses_allocation() {
        let mut heap = StringHeap::with_config(HeapConfig::default().with_byte_limit(4));
        heap.allocate_str("abcd").unwrap();
        let before = heap.allocations();
        match heap.allocate_str("e") {
            Err(HeapError::OutOfMemory { requested: 1 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(heap.allocations(), before);
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn scheduled_reclaim_runs_at_next_allocation() {
        let mut heap = StringHeap::new();
        let victim = heap.allocate_str("victim").unwrap();
        heap.reclaim_at_next_allocation(victim);
        assert!(heap.get(victim).is_some());
        heap.allocate_backing_store(64).unwrap();
        assert!(heap.get(victim).is_none());
    }

    #[test]
    fn retain_sweeps_unkept_strings() {
        let mut heap = StringHeap::new();
        let keep = heap.allocate_str("keep").unwrap();
        let drop_me = heap.allocate_str("drop").unwrap();
        assert_eq!(heap.retain(|r, _| r == keep), 1);
        assert!(heap.get(keep).is_some());
        assert!(heap.get(drop_me).is_none());
        assert_eq!(heap.used_bytes(), 4);
    }
}
