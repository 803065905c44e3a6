//! Weak handle - non-owning observer of a control block
//!
//! A weak handle keeps the block (and so the counters) allocated but never the
//! payload. It cannot read the payload directly: [`Weak::lock`] or
//! [`Shared::from_weak`] first.


use crate::block::{self, BlockHeader};
use crate::shared::Shared;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};

/// Weak observer handle
pub struct Weak<T: ?Sized> {
    pub(crate) ptr: Option<NonNull<T>>,
    pub(crate) block: Option<NonNull<BlockHeader>>,
    /// Carried over from the strong handle it was made from
    pub(crate) projected: bool,
    _marker: PhantomData<*const T>,
}

impl<T> Weak<T> {
    /// Observed payload address (null when empty); never dereference it
    /// without promoting
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.map_or(ptr::null(), |p| p.as_ptr() as *const T)
    }
}

impl<T: ?Sized> Weak<T> {
    /// Observer of nothing; always expired
    #[inline]
    pub const fn new() -> Self {
        Self {
            ptr: None,
            block: None,
            projected: false,
            _marker: PhantomData,
        }
    }

    /// Attach to `block` as one more weak observer.
    ///
    /// # Safety
    /// `block`, if present, must be live.
    #[inline]
    unsafe fn attach(
        ptr: Option<NonNull<T>>,
        block: Option<NonNull<BlockHeader>>,
        projected: bool,
    ) -> Self {
        if let Some(block) = block {
            block::header(block).increment_weak();
        }
        Self {
            ptr,
            block,
            projected,
            _marker: PhantomData,
        }
    }

    /// Strong handles still alive on the block (0 if empty)
    #[inline]
    pub fn use_count(&self) -> usize {
        match self.block {
            // SAFETY: our weak unit keeps the block allocated
            Some(block) => unsafe { block::header(block).strong_count() },
            None => 0,
        }
    }

    /// Weak units on the block, this one included (0 if empty).
    ///
    /// While the payload is being destroyed the block holds one extra
    /// internal weak unit, so a destructor that inspects a weak handle to
    /// its own block sees one more than the number of weak handles.
    #[inline]
    pub fn weak_count(&self) -> usize {
        match self.block {
            // SAFETY: as above
            Some(block) => unsafe { block::header(block).weak_count() },
            None => 0,
        }
    }

    /// True iff there is no block or its payload has been destroyed
    #[inline]
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Non-failing promotion: an empty handle when expired
    pub fn lock(&self) -> Shared<T> {
        if self.expired() {
            return Shared::empty();
        }
        // SAFETY: the strong count is non-zero, the payload is alive
        unsafe { Shared::attach(self.ptr, self.block, self.projected) }
    }

    /// Same observed address
    #[inline]
    pub fn ptr_eq<U: ?Sized>(&self, other: &Weak<U>) -> bool {
        self.addr() == other.addr()
    }

    #[inline]
    fn addr(&self) -> *const () {
        self.ptr.map_or(ptr::null(), |p| p.as_ptr() as *const ())
    }

    /// Observer of the same block addressing a projection of the payload.
    ///
    /// `f` only runs while the payload is alive. An expired handle maps to
    /// one that keeps observing the block but has no address.
    pub fn map<U: ?Sized, F>(&self, f: F) -> Weak<U>
    where
        F: FnOnce(&T) -> &U,
    {
        let locked = self.lock();
        if !locked.is_null() {
            return locked.map(f).downgrade();
        }
        // SAFETY: our own weak unit keeps the block allocated
        unsafe { Weak::attach(None, self.block, true) }
    }

    /// Give up this handle's weak unit and become empty
    pub fn reset(&mut self) {
        let block = self.block.take();
        self.ptr = None;
        self.projected = false;
        if let Some(block) = block {
            // SAFETY: the unit was ours and the handle no longer refers to it
            unsafe { block::release_weak(block) };
        }
    }

    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }
}

impl<T: ?Sized> From<&Shared<T>> for Weak<T> {
    #[inline]
    fn from(shared: &Shared<T>) -> Self {
        // SAFETY: the strong handle keeps its block live
        unsafe { Self::attach(shared.ptr, shared.block, shared.projected) }
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    #[inline]
    fn clone(&self) -> Self {
        // SAFETY: our own weak unit keeps the block allocated
        unsafe { Self::attach(self.ptr, self.block, self.projected) }
    }

    /// Assignment: release the old block before attaching to the new one
    fn clone_from(&mut self, source: &Self) {
        self.reset();
        // SAFETY: source holds a weak unit on its block
        unsafe {
            if let Some(block) = source.block {
                block::header(block).increment_weak();
            }
        }
        self.ptr = source.ptr;
        self.block = source.block;
        self.projected = source.projected;
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    #[inline]
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            // SAFETY: this handle owned one weak unit
            unsafe { block::release_weak(block) };
        }
    }
}

impl<T: ?Sized> Default for Weak<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Weak")
            .field("ptr", &self.addr())
            .field("use_count", &self.use_count())
            .finish()
    }
}
