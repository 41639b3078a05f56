use std::ffi::c_void;
use std::ptr::{self, NonNull};

use tracing::error;

use super::BoundedHeap;

/// Lua allocator entry point. `ud` is the `BoundedHeap` owned by the host.
///
/// `new_size == 0` frees, a null `block` allocates, anything else resizes.
/// A refused request returns null, which Lua turns into a memory error.
pub(crate) unsafe extern "C-unwind" fn lua_alloc(
    ud: *mut c_void,
    block: *mut c_void,
    _old_size: usize,
    new_size: usize,
) -> *mut c_void {
    let heap = &*(ud as *const BoundedHeap);

    match (NonNull::new(block as *mut u8), new_size) {
        (None, 0) => ptr::null_mut(),
        (Some(block), 0) => {
            if let Err(err) = heap.free(block) {
                error!(%err, "interpreter released a block the heap does not own");
            }
            ptr::null_mut()
        }
        (None, size) => heap
            .allocate(size)
            .map_or(ptr::null_mut(), |fresh| fresh.as_ptr().cast()),
        (Some(block), size) => heap
            .reallocate(block, size)
            .map_or(ptr::null_mut(), |moved| moved.as_ptr().cast()),
    }
}
