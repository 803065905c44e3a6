//! Detached block - owns a separately allocated payload by address

use super::{BlockHeader, BlockKind, BlockVTable};
use crate::logging::log_block_alloc;
use crate::stats;
use core::ptr::NonNull;

/// Block for a payload that already lives in its own `Box`.
///
/// Wrapping costs a second allocation on top of the payload's. The payload
/// may be unsized (`Box<dyn Trait>`, `Box<[T]>`, `Box<str>`).
#[repr(C)]
pub(crate) struct DetachedBlock<T: ?Sized> {
    header: BlockHeader,
    payload: NonNull<T>,
}

impl<T: ?Sized> DetachedBlock<T> {
    const VTABLE: BlockVTable = BlockVTable {
        kind: BlockKind::Detached,
        destroy_payload: Self::destroy_payload,
        deallocate: Self::deallocate,
    };

    /// Take ownership of `payload` and allocate a block for it with one
    /// strong unit. Returns the erased block and the payload address.
    pub(crate) fn allocate(payload: Box<T>) -> (NonNull<BlockHeader>, NonNull<T>) {
        // SAFETY: Box::into_raw never returns null
        let payload = unsafe { NonNull::new_unchecked(Box::into_raw(payload)) };

        let block = Box::new(Self {
            header: BlockHeader::new(&Self::VTABLE),
            payload,
        });
        // SAFETY: as above; header is the first field of a repr(C) struct
        let block = unsafe { NonNull::new_unchecked(Box::into_raw(block)) }.cast::<BlockHeader>();

        log_block_alloc(
            BlockKind::Detached,
            block.as_ptr() as *const u8,
            payload.as_ptr() as *const u8,
        );
        stats::record_block_allocated(BlockKind::Detached);

        (block, payload)
    }

    unsafe fn destroy_payload(block: NonNull<BlockHeader>) {
        let payload = (*block.cast::<Self>().as_ptr()).payload;
        drop(Box::from_raw(payload.as_ptr()));
    }

    unsafe fn deallocate(block: NonNull<BlockHeader>) {
        drop(Box::from_raw(block.cast::<Self>().as_ptr()));
    }
}
