//! Strong handle - shared ownership of a heap payload
//!
//! Design: a handle is the payload address plus a type-erased control block.
//! Keeping them separate is what allows aliasing: a `Shared<U>` can point into
//! a `T` while keeping the whole `T` alive. Every way a handle lets go of its
//! block (drop, reset, reassignment) runs the same strong decrement protocol.
//!
//! Handles built by [`Shared::alias`] or [`Shared::map`] are projections:
//! their address was derived from a shared borrow (or from anywhere at all),
//! so they never hand out `&mut`.


use crate::block::{self, BlockHeader, DetachedBlock, EmbeddedBlock};
use crate::error::PromotionError;
use crate::logging::{log_promotion_failure, log_unattached_this};
use crate::this::SharedFromThis;
use crate::weak::Weak;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::{self, NonNull};

/// Reference counted strong handle.
///
/// Not `Send`/`Sync`: counters are plain cells.
pub struct Shared<T: ?Sized> {
    pub(crate) ptr: Option<NonNull<T>>,
    pub(crate) block: Option<NonNull<BlockHeader>>,
    /// Address did not come from the block's own payload allocation
    pub(crate) projected: bool,
    _marker: PhantomData<T>,
}

/// Allocate block and payload together (single allocation)
#[inline]
pub fn make_shared<T>(value: T) -> Shared<T> {
    Shared::new(value)
}

/// [`make_shared`] for self-aware payloads: also populates the `WeakThis` field
#[inline]
pub fn make_shared_this<T: SharedFromThis>(value: T) -> Shared<T> {
    Shared::new_this(value)
}

impl<T> Shared<T> {
    /// Combined allocation: one embedded block holding `value`.
    ///
    /// Never touches a `WeakThis` field; see [`Shared::new_this`].
    pub fn new(value: T) -> Self {
        let (block, payload) = EmbeddedBlock::allocate(value);
        Self::owning(block, payload)
    }

    /// Payload address (null when empty)
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.map_or(ptr::null(), |p| p.as_ptr() as *const T)
    }
}

impl<T: ?Sized> Shared<T> {
    /// Handle with no payload and no block
    #[inline]
    pub const fn empty() -> Self {
        Self {
            ptr: None,
            block: None,
            projected: false,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn owning(block: NonNull<BlockHeader>, payload: NonNull<T>) -> Self {
        Self {
            ptr: Some(payload),
            block: Some(block),
            projected: false,
            _marker: PhantomData,
        }
    }

    /// Wrap an already boxed payload in a fresh detached block.
    ///
    /// Accepts unsized payloads, so `Box<dyn Trait>` becomes
    /// `Shared<dyn Trait>`.
    pub fn from_box(payload: Box<T>) -> Self {
        let (block, payload) = DetachedBlock::allocate(payload);
        Self::owning(block, payload)
    }

    /// Wrap a raw payload address. A null pointer yields an empty handle.
    ///
    /// # Safety
    /// A non-null `ptr` must come from [`Box::into_raw`] and must not be
    /// owned by anything else.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        if ptr.is_null() {
            return Self::empty();
        }
        Self::from_box(Box::from_raw(ptr))
    }

    /// Attach to `block` as one more strong owner.
    ///
    /// # Safety
    /// `block`, if present, must be live and its strong count non-zero
    /// (or the caller must be promoting under the promotion check).
    #[inline]
    pub(crate) unsafe fn attach(
        ptr: Option<NonNull<T>>,
        block: Option<NonNull<BlockHeader>>,
        projected: bool,
    ) -> Self {
        if let Some(block) = block {
            block::header(block).increment_strong();
        }
        Self {
            ptr,
            block,
            projected,
            _marker: PhantomData,
        }
    }

    /// Aliasing constructor: address `ptr`, lifetime of `owner`'s block.
    ///
    /// The result is a projection and never grants mutable access.
    ///
    /// # Safety
    /// `ptr` must stay valid for reads for as long as `owner`'s payload is
    /// alive, typically because it points into that payload.
    pub unsafe fn alias<U: ?Sized>(owner: &Shared<U>, ptr: *const T) -> Self {
        Self::attach(NonNull::new(ptr as *mut T), owner.block, true)
    }

    /// Explicit promotion; fails if the payload is already destroyed
    pub fn from_weak(weak: &Weak<T>) -> Result<Self, PromotionError> {
        let Some(block) = weak.block else {
            log_promotion_failure(ptr::null(), &PromotionError::Empty);
            return Err(PromotionError::Empty);
        };
        // SAFETY: a weak unit keeps the block allocated
        unsafe {
            if block::header(block).strong_count() == 0 {
                log_promotion_failure(block.as_ptr() as *const u8, &PromotionError::Expired);
                return Err(PromotionError::Expired);
            }
            Ok(Self::attach(weak.ptr, Some(block), weak.projected))
        }
    }

    /// New weak observer of this handle's block
    #[inline]
    pub fn downgrade(&self) -> Weak<T> {
        Weak::from(self)
    }

    /// Project to a sub-object (or an unsized view such as `&dyn Trait`),
    /// sharing this handle's block. An empty handle maps to an empty handle.
    ///
    /// This is also how a handle converts to a handle of another type:
    /// `shared.map(|x| x as &dyn Trait)`.
    pub fn map<U: ?Sized, F>(&self, f: F) -> Shared<U>
    where
        F: FnOnce(&T) -> &U,
    {
        match self.get() {
            // SAFETY: the projection is valid for reads while the payload
            // is, and the payload lives as long as any strong unit does
            Some(value) => unsafe { Shared::alias(self, f(value) as *const U) },
            None => Shared::empty(),
        }
    }

    /// Borrow the payload, if any
    #[inline]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: a present address is valid while this strong unit lives
        self.ptr.map(|p| unsafe { &*p.as_ptr() })
    }

    /// Mutable access when this is the only handle of any kind on the block
    /// and it addresses the block's own payload (not a projection)
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.projected {
            return None;
        }
        let block = self.block?;
        // SAFETY: we hold a strong unit, so the block is live
        let unique = unsafe {
            let h = block::header(block);
            h.strong_count() == 1 && h.weak_count() == 0
        };
        match self.ptr {
            // SAFETY: the address came from the payload allocation with
            // write access and no other handle can observe it
            Some(p) if unique => Some(unsafe { &mut *p.as_ptr() }),
            _ => None,
        }
    }

    /// Number of strong handles on this block (0 if empty)
    #[inline]
    pub fn use_count(&self) -> usize {
        match self.block {
            // SAFETY: we hold a strong unit
            Some(block) => unsafe { block::header(block).strong_count() },
            None => 0,
        }
    }

    /// Number of weak units on this block (0 if empty); see
    /// [`Weak::weak_count`] for the count seen during payload teardown
    #[inline]
    pub fn weak_count(&self) -> usize {
        match self.block {
            // SAFETY: we hold a strong unit
            Some(block) => unsafe { block::header(block).weak_count() },
            None => 0,
        }
    }

    /// Address test, the handle's truthiness
    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Thin payload address, null when empty
    #[inline]
    pub(crate) fn addr(&self) -> *const () {
        self.ptr.map_or(ptr::null(), |p| p.as_ptr() as *const ())
    }

    /// Same payload address (the block may differ for aliases)
    #[inline]
    pub fn ptr_eq<U: ?Sized>(&self, other: &Shared<U>) -> bool {
        self.addr() == other.addr()
    }

    /// Same control block, whatever the addresses
    #[inline]
    pub fn owner_eq<U: ?Sized>(&self, other: &Shared<U>) -> bool {
        self.block == other.block
    }

    /// Give up this handle's strong unit and become empty
    pub fn reset(&mut self) {
        let block = self.block.take();
        self.ptr = None;
        self.projected = false;
        if let Some(block) = block {
            // SAFETY: the unit was ours and the handle no longer refers to it
            unsafe { block::release_strong(block) };
        }
    }

    /// Give up the current block, then wrap `payload` in a new one
    pub fn reset_with(&mut self, payload: Box<T>) {
        self.reset();
        *self = Self::from_box(payload);
    }

    /// Move out, leaving this handle empty
    #[inline]
    pub fn take(&mut self) -> Self {
        core::mem::take(self)
    }

    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }
}

impl<T: SharedFromThis> Shared<T> {
    /// [`Shared::new`], then populate the payload's `WeakThis` field
    pub fn new_this(value: T) -> Self {
        let shared = Self::new(value);
        shared.attach_this();
        shared
    }

    /// [`Shared::from_box`], then populate the payload's `WeakThis` field
    pub fn from_box_this(payload: Box<T>) -> Self {
        let shared = Self::from_box(payload);
        shared.attach_this();
        shared
    }

    fn attach_this(&self) {
        if let Some(value) = self.get() {
            value.weak_this().attach(self);
        }
    }

    /// Populate the `WeakThis` field of a payload built by a plain
    /// constructor. Returns false, leaving the field alone, for an empty
    /// handle or a projection.
    pub fn enable_this(&self) -> bool {
        if self.projected || self.is_null() {
            log_unattached_this("Shared::enable_this on an empty or projected handle");
            return false;
        }
        self.attach_this();
        true
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    #[inline]
    fn clone(&self) -> Self {
        // SAFETY: our own strong unit keeps the block live
        unsafe { Self::attach(self.ptr, self.block, self.projected) }
    }

    /// Assignment: release the old block before attaching to the new one
    fn clone_from(&mut self, source: &Self) {
        self.reset();
        // SAFETY: source holds a strong unit on its block
        unsafe {
            if let Some(block) = source.block {
                block::header(block).increment_strong();
            }
        }
        self.ptr = source.ptr;
        self.block = source.block;
        self.projected = source.projected;
    }
}

impl<T: ?Sized> Drop for Shared<T> {
    #[inline]
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            // SAFETY: this handle owned one strong unit
            unsafe { block::release_strong(block) };
        }
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced an empty Shared handle"),
        }
    }
}

impl<T: ?Sized> Default for Shared<T> {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> From<Box<T>> for Shared<T> {
    #[inline]
    fn from(payload: Box<T>) -> Self {
        Self::from_box(payload)
    }
}

impl<T: ?Sized> TryFrom<&Weak<T>> for Shared<T> {
    type Error = PromotionError;

    #[inline]
    fn try_from(weak: &Weak<T>) -> Result<Self, Self::Error> {
        Self::from_weak(weak)
    }
}

// Equality, ordering and hashing are by address, across payload types

impl<T: ?Sized, U: ?Sized> PartialEq<Shared<U>> for Shared<T> {
    #[inline]
    fn eq(&self, other: &Shared<U>) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: ?Sized> Eq for Shared<T> {}

impl<T: ?Sized> PartialOrd for Shared<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ?Sized> Ord for Shared<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl<T: ?Sized> Hash for Shared<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f
                .debug_struct("Shared")
                .field("value", &value)
                .field("use_count", &self.use_count())
                .finish(),
            None => f.write_str("Shared(<empty>)"),
        }
    }
}

impl<T: ?Sized> fmt::Pointer for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.addr(), f)
    }
}
