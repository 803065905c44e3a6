//! Control block tests - counters and both teardown protocols

use super::*;
use crate::stats;
use std::cell::Cell;
use std::rc::Rc;

/// Payload that counts its own drops
struct Tracked {
    drops: Rc<Cell<usize>>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

fn tracked() -> (Tracked, Rc<Cell<usize>>) {
    let drops = Rc::new(Cell::new(0));
    (Tracked { drops: Rc::clone(&drops) }, drops)
}

mod header_tests {
    use super::*;

    #[test]
    fn test_new_header_counts() {
        let (payload, _) = tracked();
        let (block, _) = EmbeddedBlock::allocate(payload);
        unsafe {
            let h = header(block);
            assert_eq!(h.strong_count(), 1);
            assert_eq!(h.weak_count(), 0);
            assert_eq!(h.kind(), BlockKind::Embedded);
            release_strong(block);
        }
    }

    #[test]
    fn test_increment_decrement() {
        let (payload, _) = tracked();
        let (block, _) = DetachedBlock::allocate(Box::new(payload));
        unsafe {
            let h = header(block);
            h.increment_strong();
            h.increment_weak();
            h.increment_weak();
            assert_eq!(h.strong_count(), 2);
            assert_eq!(h.weak_count(), 2);

            h.decrement_strong();
            h.decrement_weak();
            assert_eq!(h.strong_count(), 1);
            assert_eq!(h.weak_count(), 1);
            assert_eq!(h.kind(), BlockKind::Detached);

            release_strong(block);
            release_weak(block);
        }
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(BlockKind::Detached.to_string(), "detached");
        assert_eq!(BlockKind::Embedded.as_str(), "embedded");
    }
}

mod strong_protocol_tests {
    use super::*;

    #[test]
    fn test_sole_owner_frees_everything() {
        let before = stats::snapshot();
        let (payload, drops) = tracked();
        let (block, _) = EmbeddedBlock::allocate(payload);

        unsafe { release_strong(block) };

        assert_eq!(drops.get(), 1);
        let delta = stats::snapshot().since(&before);
        assert_eq!(delta.embedded_blocks, 1);
        assert_eq!(delta.payloads_destroyed, 1);
        assert_eq!(delta.blocks_freed, 1);
    }

    #[test]
    fn test_shared_owner_only_decrements() {
        let before = stats::snapshot();
        let (payload, drops) = tracked();
        let (block, _) = DetachedBlock::allocate(Box::new(payload));

        unsafe {
            header(block).increment_strong();
            release_strong(block);
            assert_eq!(header(block).strong_count(), 1);
            assert_eq!(drops.get(), 0);

            release_strong(block);
        }

        assert_eq!(drops.get(), 1);
        assert_eq!(stats::snapshot().since(&before).live_blocks(), 0);
    }

    #[test]
    fn test_observed_block_survives_payload() {
        let before = stats::snapshot();
        let (payload, drops) = tracked();
        let (block, _) = EmbeddedBlock::allocate(payload);

        unsafe {
            header(block).increment_weak();
            release_strong(block);

            // Payload gone, counters still readable
            assert_eq!(drops.get(), 1);
            assert_eq!(header(block).strong_count(), 0);
            assert_eq!(header(block).weak_count(), 1);
            assert_eq!(stats::snapshot().since(&before).live_blocks(), 1);

            release_weak(block);
        }

        let delta = stats::snapshot().since(&before);
        assert_eq!(delta.blocks_freed, 1);
        assert_eq!(delta.payloads_destroyed, 1);
    }
}

mod weak_protocol_tests {
    use super::*;

    #[test]
    fn test_weak_release_with_live_owner_decrements() {
        let (payload, drops) = tracked();
        let (block, _) = EmbeddedBlock::allocate(payload);

        unsafe {
            header(block).increment_weak();
            release_weak(block);
            assert_eq!(header(block).weak_count(), 0);
            assert_eq!(header(block).strong_count(), 1);
            assert_eq!(drops.get(), 0);

            release_strong(block);
        }
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_not_last_weak_decrements() {
        let before = stats::snapshot();
        let (payload, _) = tracked();
        let (block, _) = DetachedBlock::allocate(Box::new(payload));

        unsafe {
            header(block).increment_weak();
            header(block).increment_weak();
            release_strong(block);

            release_weak(block);
            assert_eq!(header(block).weak_count(), 1);
            assert_eq!(stats::snapshot().since(&before).live_blocks(), 1);

            release_weak(block);
        }
        assert_eq!(stats::snapshot().since(&before).live_blocks(), 0);
    }

    #[test]
    fn test_zero_weak_count_still_frees() {
        // An inconsistent weak count of 0 with no strong owner counts as the
        // last observer.
        let before = stats::snapshot();
        let (payload, drops) = tracked();
        let (block, _) = EmbeddedBlock::allocate(payload);

        unsafe {
            header(block).increment_weak();
            release_strong(block);
            assert_eq!(drops.get(), 1);

            header(block).decrement_weak();
            assert_eq!(header(block).weak_count(), 0);

            release_weak(block);
        }

        let delta = stats::snapshot().since(&before);
        assert_eq!(delta.blocks_freed, 1);
        assert_eq!(delta.payloads_destroyed, 1);
    }
}

mod layout_tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[repr(align(64))]
    struct Aligned([u8; 64]);

    #[test]
    fn test_embedded_payload_is_aligned() {
        let (block, payload) = EmbeddedBlock::allocate(Aligned([7; 64]));
        assert_eq!(payload.as_ptr() as usize % align_of::<Aligned>(), 0);
        unsafe {
            assert_eq!((*payload.as_ptr()).0[63], 7);
            release_strong(block);
        }
    }

    #[test]
    fn test_embedded_payload_follows_header() {
        let (block, payload) = EmbeddedBlock::allocate(0u64);
        let offset = payload.as_ptr() as usize - block.as_ptr() as usize;
        assert!(offset >= size_of::<BlockHeader>());
        unsafe { release_strong(block) };
    }

    #[test]
    fn test_zero_sized_payloads() {
        let before = stats::snapshot();
        let (a, _) = EmbeddedBlock::allocate(());
        let (b, _) = DetachedBlock::allocate(Box::new(()));
        unsafe {
            release_strong(a);
            release_strong(b);
        }
        assert_eq!(stats::snapshot().since(&before).live_blocks(), 0);
    }
}
