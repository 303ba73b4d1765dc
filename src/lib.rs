//! canon-strings: a canonicalizing string table for a managed heap, plus a
//! string set built on the same open-addressing engine.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: at most one live copy of each distinct string value, so interned
//!   strings can be compared by identity.
//! - Layers:
//!   - Heap: the collaborator that owns string storage. The table only holds
//!     `StrRef` handles and resolves them through `Heap::get`.
//!   - Shape: static hashing/equality policy. `StringTableShape` hashes
//!     content; `StringSetShape` hashes identity.
//!   - Table<S>: open addressing with tombstones, triangular probing over a
//!     power-of-two slot array, and growth/shrink policy.
//!   - StringTable / StringSet: the public surface.
//!
//! Constraints
//! - Single mutator: `!Sync` by construction, no atomics.
//! - Every `&mut Heap` call is a suspension point at which the collector may
//!   reclaim strings. Handles stay valid across relocation; a reclaimed
//!   referent simply stops resolving.
//! - `*_if_exists` and `has` take `&Heap`, so they cannot allocate.
//! - A failed allocation (string or backing array) leaves membership as it
//!   was.
//!
//! Hashing invariants
//! - Whenever a shape says a key matches an entry, both hash the same. Debug
//!   builds check this on every probe hit.
//! - Each slot stores the hash its entry was inserted under; rehashing uses
//!   it and never re-hashes content.
//! - String hashes are seeded per heap and computed over UTF-16 code units,
//!   so one-byte and two-byte encodings of the same text coincide.
//!
//! Reclamation
//! - A slot whose string was reclaimed is cleared: probes skip it without
//!   ending the chain, inserts may reuse it, and rehashing drops it.
//!   `StringTable::clear_reclaimed` tombstones them eagerly.
//!
//! Notes and non-goals
//! - Insertion order is not observable.
//! - No general-purpose map API; the table is only as generic as its two
//!   shapes need.
//! - A table answers only from its own slots. The internalized mark on a
//!   heap string is a hint for string sets, never a lookup shortcut.
//! - A hash field is cached together with the seed it was computed under.

mod error;
pub mod heap;
pub mod key;
pub mod shape;
pub mod string;
mod string_set;
mod string_table;
#[cfg(feature = "bench_internal")]
pub mod table;
#[cfg(not(feature = "bench_internal"))]
mod table;
mod table_proptest;

// Public surface
pub use error::TableError;
pub use heap::{Heap, HeapConfig, HeapError, StrRef, StringHeap};
pub use key::{LazyKey, StringTableKey};
pub use string::{CharSpan, HeapString};
pub use string_set::StringSet;
pub use string_table::StringTable;
pub use table::{TableConfig, TableStats};
