use std::alloc::{self, Layout};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ptr::NonNull;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::{COMMIT_GRANULARITY, DEFAULT_LARGE_ALLOC_WARNING};

const BLOCK_ALIGN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("allocation of {requested} bytes refused ({used} of {limit} bytes in use)")]
    OutOfMemory {
        requested: usize,
        used: usize,
        limit: usize,
    },

    #[error("pointer {0:#x} was not allocated by this heap")]
    UnknownPointer(usize),

    #[error("invalid heap reservation: {0}")]
    InvalidReservation(String),
}

/// Sizing of a [`BoundedHeap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapConfig {
    pub max_bytes: usize,
    pub initial_bytes: usize,
    pub large_alloc_warning: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024 * 1024,
            initial_bytes: 1024 * 1024,
            large_alloc_warning: DEFAULT_LARGE_ALLOC_WARNING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub reserved: usize,
    pub committed: usize,
    pub used: usize,
    pub peak: usize,
    pub live_blocks: usize,
}

/// Fixed-maximum arena. Not synchronized: one interpreter, one thread.
pub struct BoundedHeap {
    max_bytes: usize,
    large_alloc_warning: usize,
    committed: Cell<usize>,
    used: Cell<usize>,
    peak: Cell<usize>,
    failed: Cell<bool>,
    // block address -> requested size
    blocks: RefCell<HashMap<usize, usize>>,
}

impl BoundedHeap {
    pub fn new(config: HeapConfig) -> Result<Self, HeapError> {
        if config.max_bytes == 0 {
            return Err(HeapError::InvalidReservation(
                "maximum size must be non-zero".to_string(),
            ));
        }
        if config.initial_bytes > config.max_bytes {
            return Err(HeapError::InvalidReservation(format!(
                "initial size {} exceeds maximum {}",
                config.initial_bytes, config.max_bytes
            )));
        }

        debug!(
            max = config.max_bytes,
            initial = config.initial_bytes,
            "reserved interpreter heap"
        );

        Ok(Self {
            max_bytes: config.max_bytes,
            large_alloc_warning: config.large_alloc_warning,
            committed: Cell::new(config.initial_bytes),
            used: Cell::new(0),
            peak: Cell::new(0),
            failed: Cell::new(false),
            blocks: RefCell::new(HashMap::new()),
        })
    }

    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, HeapError> {
        let next_used = self.check(size, 0)?;
        let layout = block_layout(size);

        let block = unsafe { alloc::alloc(layout) };
        let Some(block) = NonNull::new(block) else {
            return Err(self.refuse(size));
        };

        self.blocks.borrow_mut().insert(block.as_ptr() as usize, size);
        self.commit(next_used);
        Ok(block)
    }

    /// Resize a block. On failure the original block is left untouched.
    pub fn reallocate(&self, block: NonNull<u8>, new_size: usize) -> Result<NonNull<u8>, HeapError> {
        let addr = block.as_ptr() as usize;
        let old_size = self
            .blocks
            .borrow()
            .get(&addr)
            .copied()
            .ok_or(HeapError::UnknownPointer(addr))?;

        let next_used = self.check(new_size, old_size)?;
        let moved = unsafe {
            alloc::realloc(block.as_ptr(), block_layout(old_size), new_size.max(1))
        };
        let Some(moved) = NonNull::new(moved) else {
            return Err(self.refuse(new_size));
        };

        let mut blocks = self.blocks.borrow_mut();
        blocks.remove(&addr);
        blocks.insert(moved.as_ptr() as usize, new_size);
        drop(blocks);

        self.commit(next_used);
        Ok(moved)
    }

    pub fn free(&self, block: NonNull<u8>) -> Result<(), HeapError> {
        let addr = block.as_ptr() as usize;
        let size = self
            .blocks
            .borrow_mut()
            .remove(&addr)
            .ok_or(HeapError::UnknownPointer(addr))?;

        unsafe { alloc::dealloc(block.as_ptr(), block_layout(size)) };
        self.used.set(self.used.get() - size);
        Ok(())
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            reserved: self.max_bytes,
            committed: self.committed.get(),
            used: self.used.get(),
            peak: self.peak.get(),
            live_blocks: self.blocks.borrow().len(),
        }
    }

    /// Returns whether an allocation was refused since the last call, and
    /// clears the flag.
    pub fn take_failure(&self) -> bool {
        self.failed.replace(false)
    }

    fn check(&self, requested: usize, released: usize) -> Result<usize, HeapError> {
        if requested >= self.large_alloc_warning {
            warn!(
                requested,
                used = self.used.get(),
                limit = self.max_bytes,
                "large interpreter allocation"
            );
        }

        let next_used = (self.used.get() - released).checked_add(requested);
        match next_used {
            Some(next) if next <= self.max_bytes => Ok(next),
            _ => Err(self.refuse(requested)),
        }
    }

    fn refuse(&self, requested: usize) -> HeapError {
        self.failed.set(true);
        HeapError::OutOfMemory {
            requested,
            used: self.used.get(),
            limit: self.max_bytes,
        }
    }

    fn commit(&self, next_used: usize) {
        self.used.set(next_used);
        if next_used > self.peak.get() {
            self.peak.set(next_used);
        }
        if next_used > self.committed.get() {
            let grown = next_used
                .div_ceil(COMMIT_GRANULARITY)
                .saturating_mul(COMMIT_GRANULARITY)
                .min(self.max_bytes);
            self.committed.set(grown);
        }
    }
}

impl Drop for BoundedHeap {
    fn drop(&mut self) {
        for (addr, size) in self.blocks.get_mut().drain() {
            unsafe { alloc::dealloc(addr as *mut u8, block_layout(size)) };
        }
    }
}

fn block_layout(size: usize) -> Layout {
    // Sizes that passed `check` are bounded by the reservation, so rounding
    // up to the alignment cannot overflow `isize`.
    Layout::from_size_align(size.max(1), BLOCK_ALIGN).unwrap_or(Layout::new::<u8>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap(max: usize) -> BoundedHeap {
        BoundedHeap::new(HeapConfig {
            max_bytes: max,
            initial_bytes: 0,
            large_alloc_warning: usize::MAX,
        })
        .expect("valid heap config")
    }

    #[test]
    fn test_allocate_and_free_accounting() {
        let heap = heap(4096);
        let a = heap.allocate(100).unwrap();
        let b = heap.allocate(200).unwrap();
        assert_eq!(heap.stats().used, 300);
        assert_eq!(heap.stats().live_blocks, 2);

        heap.free(a).unwrap();
        assert_eq!(heap.stats().used, 200);
        heap.free(b).unwrap();
        assert_eq!(heap.stats().used, 0);
        assert_eq!(heap.stats().peak, 300);
    }

    #[test]
    fn test_refused_allocation_leaves_state_untouched() {
        let heap = heap(1000);
        let _a = heap.allocate(600).unwrap();
        let before = heap.stats();

        let err = heap.allocate(500).unwrap_err();
        assert_eq!(
            err,
            HeapError::OutOfMemory {
                requested: 500,
                used: 600,
                limit: 1000
            }
        );
        assert_eq!(heap.stats(), before);
        assert!(heap.take_failure());
        assert!(!heap.take_failure(), "failure flag should clear once read");
    }

    #[test]
    fn test_one_byte_over_the_maximum_fails_immediately() {
        let heap = heap(8192);
        let before = heap.stats();
        assert!(matches!(
            heap.allocate(8193),
            Err(HeapError::OutOfMemory { requested: 8193, .. })
        ));
        assert_eq!(heap.stats(), before);
    }

    #[test]
    fn test_reallocate_keeps_block_on_failure() {
        let heap = heap(1024);
        let block = heap.allocate(16).unwrap();
        unsafe { block.as_ptr().write(0xAB) };

        assert!(heap.reallocate(block, 2048).is_err());
        assert_eq!(heap.stats().used, 16);
        assert_eq!(unsafe { block.as_ptr().read() }, 0xAB);

        let grown = heap.reallocate(block, 512).unwrap();
        assert_eq!(unsafe { grown.as_ptr().read() }, 0xAB);
        assert_eq!(heap.stats().used, 512);
        assert_eq!(heap.stats().live_blocks, 1);

        let shrunk = heap.reallocate(grown, 8).unwrap();
        assert_eq!(heap.stats().used, 8);
        heap.free(shrunk).unwrap();
    }

    #[test]
    fn test_free_of_foreign_pointer_is_rejected() {
        let heap = heap(1024);
        let mut local = 0u8;
        let foreign = NonNull::from(&mut local);
        assert!(matches!(heap.free(foreign), Err(HeapError::UnknownPointer(_))));
    }

    #[test]
    fn test_commit_grows_in_steps_and_stays_under_maximum() {
        let max = COMMIT_GRANULARITY * 2 + 100;
        let heap = heap(max);
        assert_eq!(heap.stats().committed, 0);

        let a = heap.allocate(10).unwrap();
        assert_eq!(heap.stats().committed, COMMIT_GRANULARITY);

        let b = heap.allocate(COMMIT_GRANULARITY * 2).unwrap();
        assert_eq!(heap.stats().committed, max);
        assert!(heap.stats().committed <= heap.stats().reserved);

        heap.free(a).unwrap();
        heap.free(b).unwrap();
        assert_eq!(heap.stats().committed, max, "commit never shrinks");
    }

    #[test]
    fn test_invalid_reservations() {
        let zero = HeapConfig {
            max_bytes: 0,
            ..HeapConfig::default()
        };
        assert!(BoundedHeap::new(zero).is_err());

        let inverted = HeapConfig {
            max_bytes: 10,
            initial_bytes: 20,
            large_alloc_warning: 0,
        };
        assert!(BoundedHeap::new(inverted).is_err());
    }
}
