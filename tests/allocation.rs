#![no_std]

const HEAP_SIZE: usize = 4 * 1024 * 1024;

#[global_allocator]
static ALLOCATOR: buddyfit::Allocator<HEAP_SIZE> = buddyfit::Allocator::new();

extern crate alloc;

#[test]
fn vec() {
    let mut v = alloc::vec![1, 2, 3];
    v.push(4);

    assert_eq!((1..=4).collect::<alloc::vec::Vec<_>>(), v);
}

#[test]
fn map_and_formatting() {
    let mut map = alloc::collections::BTreeMap::new();
    map.insert(10, "Hello");
    map.insert(11, "world");
    map.insert(20, "Hallo");
    map.insert(21, "Welt");
    map.insert(-1, "english");
    map.insert(-2, "german");

    let english = alloc::format!("[{}]: {}, {}!", map[&-1], map[&10], map[&11]);
    let german = alloc::format!("[{}]: {}, {}!", map[&-2], map[&20], map[&21]);
    assert_eq!(english, "[english]: Hello, world!");
    assert_eq!(german, "[german]: Hallo, Welt!");
}

#[test]
fn fragmentation_then_large_allocation_falls_back_to_the_emergency_heap() {
    // Lots of small, oddly-sized allocations fragment the buddy side's
    // power-of-two free lists; interleaved frees leave a mix of
    // differently-sized gaps that no single buddy class can satisfy, so
    // later large requests must be served by the emergency heap instead.
    let mut handles = alloc::vec::Vec::new();
    for i in 0..64 {
        let mut v = alloc::vec::Vec::with_capacity(3 + i % 5);
        v.push(i);
        handles.push(v);
    }
    handles.retain(|v| v[0] % 2 == 0);
    let big: alloc::vec::Vec<u8> = alloc::vec![0u8; 64 * 1024];
    assert_eq!(big.len(), 64 * 1024);
}
