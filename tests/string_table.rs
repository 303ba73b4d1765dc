// StringTable integration suite.
//
// Each test documents the behavior verified and the invariants it leans on:
// - Canonicalization: equal content interns to one identical StrRef.
// - Idempotence: re-interning never changes membership or identity.
// - Purity: *_if_exists lookups never change the bookkeeping.
// - Growth: every interned string stays reachable across rehashes.
// - Restore: a reserved table absorbs a snapshot without rehashing.
// - Reclamation: a reclaimed canonical string is never returned again.
use canon_strings::{
    Heap, HeapConfig, LazyKey, StrRef, StringHeap, StringTable, StringTableKey, TableConfig,
    TableError,
};

fn utf16(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn setup() -> (StringHeap, StringTable) {
    let mut heap = StringHeap::new();
    let table = StringTable::new(&mut heap).expect("fresh table");
    (heap, table)
}

fn probe(table: &StringTable, heap: &StringHeap, s: &str) -> Option<StrRef> {
    let units = utf16(s);
    table.lookup_if_exists(heap, &StringTableKey::Lazy(LazyKey::two_byte(&units)))
}

// Test: interning the same content twice.
// Verifies: both calls return the first candidate; one live entry.
#[test]
fn hello_twice_is_one_entry() {
    let (mut heap, mut table) = setup();
    let a = heap.allocate_str("hello").unwrap();
    let b = heap.allocate_str("hello").unwrap();
    assert_ne!(a, b);

    let ca = table.lookup_or_insert(&mut heap, a).unwrap();
    let cb = table.lookup_or_insert(&mut heap, b).unwrap();
    assert_eq!(ca, a);
    assert_eq!(cb, a);
    assert_eq!(table.len(), 1);
    assert!(heap.get(a).unwrap().is_internalized());
    assert!(!heap.get(b).unwrap().is_internalized());
}

// Test: pure probe on an empty table.
// Verifies: None, and stats are untouched.
#[test]
fn missing_on_empty_table() {
    let (heap, table) = setup();
    let before = table.stats();
    assert_eq!(probe(&table, &heap, "missing"), None);
    assert_eq!(table.stats(), before);
    assert_eq!(before.len, 0);
    assert_eq!(before.deleted, 0);
}

// Test: two-unit probe before and after interning "ab".
// Verifies: None, then the canonical "ab".
#[test]
fn two_chars_lookup() {
    let (mut heap, mut table) = setup();
    let (a, b) = (u16::from(b'a'), u16::from(b'b'));
    assert_eq!(table.lookup_two_chars_if_exists(&heap, a, b), None);

    let ab = heap.allocate_str("ab").unwrap();
    let canonical = table.lookup_or_insert(&mut heap, ab).unwrap();
    assert_eq!(table.lookup_two_chars_if_exists(&heap, a, b), Some(canonical));
    assert_eq!(table.lookup_two_chars_if_exists(&heap, b, a), None);
}

// Test: one-byte and two-byte keys for identical text.
// Verifies: they meet at one canonical entry.
#[test]
fn encodings_share_one_canonical_entry() {
    let (mut heap, mut table) = setup();
    let narrow = table.lookup_lazy(&mut heap, LazyKey::one_byte(b"shared")).unwrap();
    let units = utf16("shared");
    let wide = table.lookup_lazy(&mut heap, LazyKey::two_byte(&units)).unwrap();
    assert_eq!(narrow, wide);
    assert_eq!(table.len(), 1);
}

// Test: lazy lookups only allocate on a miss.
// Verifies: the allocation count moves on the first call only.
#[test]
fn lazy_key_allocates_only_on_miss() {
    let (mut heap, mut table) = setup();
    let before = heap.allocations();
    let first = table.lookup_lazy(&mut heap, LazyKey::one_byte(b"lazy")).unwrap();
    assert_eq!(heap.allocations(), before + 1);
    let second = table.lookup_lazy(&mut heap, LazyKey::one_byte(b"lazy")).unwrap();
    assert_eq!(first, second);
    assert_eq!(heap.allocations(), before + 1);
}

// Test: empty and non-Latin-1 strings are ordinary keys.
#[test]
fn degenerate_and_wide_strings() {
    let (mut heap, mut table) = setup();
    let empty = table.lookup_lazy(&mut heap, LazyKey::one_byte(b"")).unwrap();
    assert_eq!(heap.get(empty).unwrap().len(), 0);
    let empty_again = heap.allocate_str("").unwrap();
    assert_eq!(table.lookup_or_insert(&mut heap, empty_again).unwrap(), empty);

    let greek = heap.allocate_str("\u{3bb}\u{3bc}").unwrap();
    let canonical = table.lookup_or_insert(&mut heap, greek).unwrap();
    let units = utf16("\u{3bb}\u{3bc}");
    assert_eq!(
        table.lookup_two_chars_if_exists(&heap, units[0], units[1]),
        Some(canonical)
    );
}

// Test: growth from a tiny table.
// Verifies: every string stays reachable; membership is unchanged by rehash.
#[test]
fn growth_preserves_membership() {
    let mut heap = StringHeap::new();
    let config = TableConfig::default().with_initial_capacity(4);
    let mut table = StringTable::with_config(&mut heap, config).unwrap();
    let mut interned = Vec::new();
    for i in 0..500 {
        let r = heap.allocate_str(&format!("grow-{i}")).unwrap();
        interned.push(table.lookup_or_insert(&mut heap, r).unwrap());
    }
    assert!(table.stats().capacity >= 750);
    for (i, r) in interned.iter().enumerate() {
        assert_eq!(probe(&table, &heap, &format!("grow-{i}")), Some(*r));
    }
    let mut members: Vec<StrRef> = table.iter(&heap).collect();
    members.sort();
    interned.sort();
    assert_eq!(members, interned);
}

// Test: snapshot restore of 1000 strings.
// Assumes: ensure_capacity_for_restore runs on an untouched table.
// Verifies: capacity is fixed up front; every string is found afterwards.
#[test]
fn restore_thousand_without_rehash() {
    let (mut heap, mut table) = setup();
    table.ensure_capacity_for_restore(&mut heap, 1000).unwrap();
    let reserved = table.stats().capacity;

    let mut restored = Vec::new();
    for i in 0..1000 {
        let r = heap.allocate_str(&format!("snap-{i}")).unwrap();
        restored.push(table.add_restored(&mut heap, r).unwrap());
        assert_eq!(table.stats().capacity, reserved, "rehash during restore");
    }
    assert_eq!(table.len(), 1000);
    for (i, r) in restored.iter().enumerate() {
        assert_eq!(probe(&table, &heap, &format!("snap-{i}")), Some(*r));
        assert!(heap.get(*r).unwrap().is_internalized());
    }
}

// Test: a table serialized through iter() and restored into a new heap.
// Verifies: the same contents are canonical on the other side.
#[test]
fn snapshot_round_trip() {
    let (mut heap, mut table) = setup();
    let words = ["alpha", "beta", "", "\u{3b3}amma", "42"];
    for w in words {
        let r = heap.allocate_str(w).unwrap();
        table.lookup_or_insert(&mut heap, r).unwrap();
    }
    let snapshot: Vec<String> = table
        .iter(&heap)
        .map(|r| heap.get(r).unwrap().to_string_lossy())
        .collect();

    let mut heap2 = StringHeap::with_config(HeapConfig::default().with_hash_seed(0x5eed));
    let mut table2 = StringTable::new(&mut heap2).unwrap();
    table2.ensure_capacity_for_restore(&mut heap2, snapshot.len()).unwrap();
    for s in &snapshot {
        let r = heap2.allocate_str(s).unwrap();
        table2.add_restored(&mut heap2, r).unwrap();
    }
    for w in words {
        assert!(probe(&table2, &heap2, w).is_some(), "{w:?} lost in restore");
    }
    assert_eq!(table2.len(), words.len());
}

// Test: the collector reclaims a canonical string.
// Verifies: lookups stop returning it; re-interning makes a new canonical.
#[test]
fn reclaimed_canonical_is_replaced() {
    let (mut heap, mut table) = setup();
    let first = table.lookup_lazy(&mut heap, LazyKey::one_byte(b"weak")).unwrap();
    heap.reclaim(first);
    assert_eq!(probe(&table, &heap, "weak"), None);

    let second = table.lookup_lazy(&mut heap, LazyKey::one_byte(b"weak")).unwrap();
    assert_ne!(second, first);
    assert_eq!(probe(&table, &heap, "weak"), Some(second));
    assert_eq!(table.iter(&heap).count(), 1);
}

// Test: a collection runs inside the allocation of a lazy miss.
// Verifies: the entry reclaimed mid-call is gone; the new one is canonical.
#[test]
fn collection_during_materialization() {
    let (mut heap, mut table) = setup();
    let victim = table.lookup_lazy(&mut heap, LazyKey::one_byte(b"victim")).unwrap();
    heap.reclaim_at_next_allocation(victim);

    let fresh = table.lookup_lazy(&mut heap, LazyKey::one_byte(b"fresh")).unwrap();
    assert!(heap.get(victim).is_none());
    assert_eq!(probe(&table, &heap, "victim"), None);
    assert_eq!(probe(&table, &heap, "fresh"), Some(fresh));
    // The victim's slot was either reused by "fresh" or is tombstoned now.
    table.clear_reclaimed(&heap);
    assert_eq!(table.len(), 1);
    assert_eq!(table.iter(&heap).collect::<Vec<_>>(), vec![fresh]);
}

// Test: allocation failure while interning.
// Verifies: OutOfMemory surfaces and membership is unchanged.
#[test]
fn out_of_memory_is_reported() {
    let mut heap = StringHeap::with_config(HeapConfig::default().with_byte_limit(1024));
    let mut table = StringTable::new(&mut heap).unwrap();
    let kept = table.lookup_lazy(&mut heap, LazyKey::one_byte(b"kept")).unwrap();
    let before = table.stats();
    let big = vec![b'z'; 4096];
    match table.lookup_lazy(&mut heap, LazyKey::one_byte(&big)) {
        Err(TableError::OutOfMemory { requested }) => assert_eq!(requested, 4096),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(table.stats(), before);
    assert_eq!(probe(&table, &heap, "kept"), Some(kept));
}

// Test: probing by an existing string without allocating.
#[test]
fn lookup_string_if_exists_finds_canonical() {
    let (mut heap, mut table) = setup();
    let canonical = table.lookup_lazy(&mut heap, LazyKey::one_byte(b"probe")).unwrap();
    let copy = heap.allocate_str("probe").unwrap();
    let other = heap.allocate_str("other").unwrap();
    let before = table.stats();
    assert_eq!(table.lookup_string_if_exists(&heap, copy), Some(canonical));
    assert_eq!(table.lookup_string_if_exists(&heap, canonical), Some(canonical));
    assert_eq!(table.lookup_string_if_exists(&heap, other), None);
    assert_eq!(table.stats(), before);
}

// Test: tombstones left by a collection are dropped by the next rehash.
// Assumes: clear_reclaimed turns every reclaimed slot into a tombstone.
// Verifies: once interning forces a rehash, deleted == 0 and every survivor
// and every newcomer is still found.
#[test]
fn rehash_after_collection_drops_tombstones() {
    let (mut heap, mut table) = setup();
    let refs: Vec<StrRef> = (0..10)
        .map(|i| {
            let s = format!("t{i}");
            table.lookup_lazy(&mut heap, LazyKey::one_byte(s.as_bytes())).unwrap()
        })
        .collect();
    for r in &refs[2..] {
        heap.reclaim(*r);
    }
    assert_eq!(table.clear_reclaimed(&heap), 8);
    assert_eq!(table.stats().deleted, 8);

    let capacity = table.stats().capacity;
    let mut fresh = Vec::new();
    while table.stats().capacity == capacity {
        assert!(fresh.len() < 1_000, "table never rehashed");
        let s = format!("n{}", fresh.len());
        fresh.push(table.lookup_lazy(&mut heap, LazyKey::one_byte(s.as_bytes())).unwrap());
    }
    assert_eq!(table.stats().deleted, 0);
    assert_eq!(table.len(), 2 + fresh.len());
    for (i, r) in refs[..2].iter().enumerate() {
        assert_eq!(probe(&table, &heap, &format!("t{i}")), Some(*r));
    }
    for (i, r) in fresh.iter().enumerate() {
        assert_eq!(probe(&table, &heap, &format!("n{i}")), Some(*r));
    }
}
