//! Block statistics - per-thread lifecycle counters
//!
//! Handles are single-threaded, so every block is allocated, destroyed and
//! freed on one thread. Counting per thread keeps snapshots exact even when
//! several threads use the crate independently.

use crate::block::BlockKind;
use core::cell::Cell;

thread_local! {
    static COUNTERS: Counters = const { Counters::new() };
}

struct Counters {
    detached_blocks: Cell<usize>,
    embedded_blocks: Cell<usize>,
    blocks_freed: Cell<usize>,
    payloads_destroyed: Cell<usize>,
}

impl Counters {
    const fn new() -> Self {
        Self {
            detached_blocks: Cell::new(0),
            embedded_blocks: Cell::new(0),
            blocks_freed: Cell::new(0),
            payloads_destroyed: Cell::new(0),
        }
    }
}

#[inline]
fn bump(cell: &Cell<usize>) {
    cell.set(cell.get().wrapping_add(1));
}

/// Snapshot of the current thread's block counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStats {
    pub detached_blocks: usize,
    pub embedded_blocks: usize,
    pub blocks_freed: usize,
    pub payloads_destroyed: usize,
}

impl BlockStats {
    /// Blocks allocated by either strategy
    pub fn blocks_allocated(&self) -> usize {
        self.detached_blocks + self.embedded_blocks
    }

    /// Blocks allocated but not yet freed
    pub fn live_blocks(&self) -> usize {
        self.blocks_allocated() - self.blocks_freed
    }

    /// Payloads still alive (allocated blocks whose payload was not destroyed)
    pub fn live_payloads(&self) -> usize {
        self.blocks_allocated() - self.payloads_destroyed
    }

    /// Counter deltas between an earlier snapshot and this one
    pub fn since(&self, earlier: &BlockStats) -> BlockStats {
        BlockStats {
            detached_blocks: self.detached_blocks - earlier.detached_blocks,
            embedded_blocks: self.embedded_blocks - earlier.embedded_blocks,
            blocks_freed: self.blocks_freed - earlier.blocks_freed,
            payloads_destroyed: self.payloads_destroyed - earlier.payloads_destroyed,
        }
    }
}

/// Read the current thread's counters
pub fn snapshot() -> BlockStats {
    COUNTERS
        .try_with(|c| BlockStats {
            detached_blocks: c.detached_blocks.get(),
            embedded_blocks: c.embedded_blocks.get(),
            blocks_freed: c.blocks_freed.get(),
            payloads_destroyed: c.payloads_destroyed.get(),
        })
        .unwrap_or_default()
}

// Handles can be dropped from other thread-locals' destructors, after
// COUNTERS is gone, so every recorder tolerates a missing slot.

pub(crate) fn record_block_allocated(kind: BlockKind) {
    let _ = COUNTERS.try_with(|c| match kind {
        BlockKind::Detached => bump(&c.detached_blocks),
        BlockKind::Embedded => bump(&c.embedded_blocks),
    });
}

pub(crate) fn record_block_freed() {
    let _ = COUNTERS.try_with(|c| bump(&c.blocks_freed));
}

pub(crate) fn record_payload_destroyed() {
    let _ = COUNTERS.try_with(|c| bump(&c.payloads_destroyed));
}
