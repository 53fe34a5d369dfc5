#[test]
fn is_usable_in_const_contexts() {
    const _ALLOCATOR1: buddyfit::Allocator<32> = buddyfit::Allocator::new();
    static _ALLOCATOR2: buddyfit::Allocator<32> = buddyfit::Allocator::new();
}

#[test]
fn supports_global_alloc() {
    fn assert<T: core::alloc::GlobalAlloc>(_: T) {}
    assert(buddyfit::Allocator::<64>::new())
}

#[test]
fn emergency_heap_can_be_disabled_via_the_second_const_parameter() {
    const _ALLOCATOR: buddyfit::Allocator<64, false> = buddyfit::Allocator::new();
}

#[test]
#[should_panic(expected = "too small heap memory")]
fn min_heap_size_of_at_least_sixteen() {
    let _allocator = buddyfit::Allocator::<8>::new(); // panic here
}
