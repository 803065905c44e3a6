//! Control block - shared ownership accounting for strong and weak handles
//!
//! Design: Every block starts with a `repr(C)` [`BlockHeader`] holding the two
//! counters and a pointer to a per-type static vtable. Handles only ever see a
//! type-erased `NonNull<BlockHeader>`, so a handle may point at a different
//! type than the block owns (aliasing).
//!
//! Two shapes:
//! 1. Detached - payload lives in its own `Box`, block stores the address
//! 2. Embedded - payload storage is inline, one allocation for both
//!
//! Both teardown protocols live here so strong and weak handles share them.

mod detached;
mod embedded;

#[cfg(test)]
mod tests;

pub(crate) use detached::DetachedBlock;
pub(crate) use embedded::EmbeddedBlock;

use crate::logging::{log_block_freed, log_payload_destroyed};
use crate::stats;
use core::cell::Cell;
use core::fmt;
use core::ptr::NonNull;

/// Which allocation strategy produced a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Payload allocated separately, block holds its address
    Detached,
    /// Payload stored inside the block itself
    Embedded,
}

impl BlockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detached => "detached",
            Self::Embedded => "embedded",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-type dispatch table - the only point where the two shapes differ
pub(crate) struct BlockVTable {
    pub kind: BlockKind,
    /// Run the payload's teardown. Called at most once per block.
    pub destroy_payload: unsafe fn(NonNull<BlockHeader>),
    /// Release the block's own allocation.
    pub deallocate: unsafe fn(NonNull<BlockHeader>),
}

/// Counter header - first field of every block shape
#[repr(C)]
pub(crate) struct BlockHeader {
    strong: Cell<usize>,
    weak: Cell<usize>,
    vtable: &'static BlockVTable,
}

impl BlockHeader {
    /// New header owned by exactly one strong handle
    #[inline]
    pub(crate) const fn new(vtable: &'static BlockVTable) -> Self {
        Self {
            strong: Cell::new(1),
            weak: Cell::new(0),
            vtable,
        }
    }

    #[inline]
    pub(crate) fn strong_count(&self) -> usize {
        self.strong.get()
    }

    #[inline]
    pub(crate) fn weak_count(&self) -> usize {
        self.weak.get()
    }

    #[inline]
    pub(crate) fn increment_strong(&self) {
        self.strong.set(checked_increment(self.strong.get()));
    }

    #[inline]
    pub(crate) fn decrement_strong(&self) {
        let count = self.strong.get();
        debug_assert!(count > 0, "strong count underflow");
        self.strong.set(count.wrapping_sub(1));
    }

    #[inline]
    pub(crate) fn increment_weak(&self) {
        self.weak.set(checked_increment(self.weak.get()));
    }

    #[inline]
    pub(crate) fn decrement_weak(&self) {
        let count = self.weak.get();
        debug_assert!(count > 0, "weak count underflow");
        self.weak.set(count.wrapping_sub(1));
    }

    #[inline]
    pub(crate) fn kind(&self) -> BlockKind {
        self.vtable.kind
    }
}

/// Counters never wrap; a leak loop that gets here is unrecoverable.
#[inline(always)]
fn checked_increment(count: usize) -> usize {
    match count.checked_add(1) {
        Some(next) if next <= isize::MAX as usize => next,
        _ => std::process::abort(),
    }
}

/// Borrow the header of a live block.
///
/// # Safety
/// `block` must point to a block that has not been deallocated.
#[inline(always)]
pub(crate) unsafe fn header<'a>(block: NonNull<BlockHeader>) -> &'a BlockHeader {
    &*block.as_ptr()
}

/// Destroy the payload through the block's vtable.
///
/// # Safety
/// Must be called at most once per block, while the block is allocated.
#[cold]
pub(crate) unsafe fn destroy_payload(block: NonNull<BlockHeader>) {
    let (kind, destroy) = {
        let h = header(block);
        (h.kind(), h.vtable.destroy_payload)
    };
    log_payload_destroyed(kind, block.as_ptr() as *const u8);
    stats::record_payload_destroyed();
    destroy(block);
}

/// Free the block's allocation through its vtable.
///
/// # Safety
/// Must be called exactly once per block; the block is gone afterwards.
#[cold]
pub(crate) unsafe fn deallocate(block: NonNull<BlockHeader>) {
    let (kind, dealloc) = {
        let h = header(block);
        (h.kind(), h.vtable.deallocate)
    };
    log_block_freed(kind, block.as_ptr() as *const u8);
    stats::record_block_freed();
    dealloc(block);
}

/// Decrement protocol for one strong unit.
///
/// Checks both counts before touching either: a sole strong owner with no
/// observers tears down payload and block together. Otherwise the strong count
/// drops first, and reaching zero destroys only the payload; the block stays
/// for the weak handles.
///
/// The payload is destroyed under a temporary weak unit so a payload that owns
/// weak handles to its own block (a populated `WeakThis`) cannot free the block
/// out from under its own destructor. That unit is released through
/// [`release_weak`], which frees the block if nothing else observes it.
///
/// # Safety
/// The caller must own one strong unit of `block` and give it up.
pub(crate) unsafe fn release_strong(block: NonNull<BlockHeader>) {
    let (strong, weak) = {
        let h = header(block);
        (h.strong_count(), h.weak_count())
    };

    if strong == 1 && weak == 0 {
        destroy_payload(block);
        deallocate(block);
        return;
    }

    let h = header(block);
    h.decrement_strong();
    if h.strong_count() == 0 {
        h.increment_weak();
        destroy_payload(block);
        release_weak(block);
    }
}

/// Decrement protocol for one weak unit.
///
/// `weak <= 1` is deliberate: an already-zero weak count with no strong owner
/// is treated as the last observer.
///
/// # Safety
/// The caller must own one weak unit of `block` and give it up.
pub(crate) unsafe fn release_weak(block: NonNull<BlockHeader>) {
    let (strong, weak) = {
        let h = header(block);
        (h.strong_count(), h.weak_count())
    };

    if strong == 0 && weak <= 1 {
        deallocate(block);
        return;
    }

    header(block).decrement_weak();
}
