//! Embedded block - payload storage shares the block's allocation

use super::{BlockHeader, BlockKind, BlockVTable};
use crate::logging::log_block_alloc;
use crate::stats;
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};

/// Block with in-place payload storage.
///
/// Layout: `[BlockHeader | payload]` in a single allocation. The storage is
/// `MaybeUninit` so freeing the block never drops the payload a second time.
#[repr(C)]
pub(crate) struct EmbeddedBlock<T> {
    header: BlockHeader,
    storage: UnsafeCell<MaybeUninit<T>>,
}

impl<T> EmbeddedBlock<T> {
    const VTABLE: BlockVTable = BlockVTable {
        kind: BlockKind::Embedded,
        destroy_payload: Self::destroy_payload,
        deallocate: Self::deallocate,
    };

    /// Allocate a block and move `value` into its storage, with one strong
    /// unit. Returns the erased block and the payload address.
    pub(crate) fn allocate(value: T) -> (NonNull<BlockHeader>, NonNull<T>) {
        let block = Box::new(Self {
            header: BlockHeader::new(&Self::VTABLE),
            storage: UnsafeCell::new(MaybeUninit::new(value)),
        });
        let raw = Box::into_raw(block);

        // SAFETY: raw comes from Box::into_raw and is non-null. The storage
        // cell is transparent over MaybeUninit<T>, which is transparent over T.
        let (block, payload) = unsafe {
            let payload = ptr::addr_of_mut!((*raw).storage).cast::<T>();
            (
                NonNull::new_unchecked(raw).cast::<BlockHeader>(),
                NonNull::new_unchecked(payload),
            )
        };

        log_block_alloc(
            BlockKind::Embedded,
            block.as_ptr() as *const u8,
            payload.as_ptr() as *const u8,
        );
        stats::record_block_allocated(BlockKind::Embedded);

        (block, payload)
    }

    unsafe fn destroy_payload(block: NonNull<BlockHeader>) {
        let raw = block.cast::<Self>().as_ptr();
        ptr::drop_in_place(ptr::addr_of_mut!((*raw).storage).cast::<T>());
    }

    unsafe fn deallocate(block: NonNull<BlockHeader>) {
        drop(Box::from_raw(block.cast::<Self>().as_ptr()));
    }
}
