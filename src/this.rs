//! Self-reference capability - let a payload mint handles to itself
//!
//! A type opts in by holding a [`WeakThis`] field and implementing
//! [`SharedFromThis`]. The field stays empty until the value is wrapped by
//! [`Shared::new_this`], [`Shared::from_box_this`] or
//! [`make_shared_this`](crate::make_shared_this); all of them populate it
//! only after the value sits in its block, so it is never usable while the
//! value is still being built.
//!
//! The plain constructors ([`Shared::new`], [`Shared::from_box`],
//! [`make_shared`](crate::make_shared)) cannot tell a self-aware payload
//! apart from any other and leave the field empty. Such a handle can be
//! fixed up afterwards with [`Shared::enable_this`]. Until then
//! `shared_from_this` fails with [`PromotionError::Empty`] and, in debug
//! builds, logs a warning naming the self-aware constructors.
//!
//! ```
//! use ownshare::{Shared, SharedFromThis, WeakThis};
//!
//! struct Node {
//!     this: WeakThis<Node>,
//!     id: u32,
//! }
//!
//! impl SharedFromThis for Node {
//!     fn weak_this(&self) -> &WeakThis<Self> {
//!         &self.this
//!     }
//! }
//!
//! let node = Shared::new_this(Node { this: WeakThis::new(), id: 7 });
//! let again = node.shared_from_this().unwrap();
//! assert_eq!(again.id, 7);
//! assert_eq!(node.use_count(), 2);
//! ```

use crate::error::PromotionError;
use crate::logging::log_unattached_this;
use crate::shared::Shared;
use crate::weak::Weak;
use core::cell::RefCell;
use core::fmt;

/// Weak back-reference stored inside a payload
pub struct WeakThis<T> {
    slot: RefCell<Weak<T>>,
}

impl<T> WeakThis<T> {
    /// Unpopulated back-reference
    pub const fn new() -> Self {
        Self {
            slot: RefCell::new(Weak::new()),
        }
    }

    /// Point the back-reference at `owner`'s block
    pub(crate) fn attach(&self, owner: &Shared<T>) {
        // Drop the previous observer outside the borrow
        let previous = self.slot.replace(Weak::from(owner));
        drop(previous);
    }

    /// Copy of the stored weak handle
    pub fn get(&self) -> Weak<T> {
        self.slot.borrow().clone()
    }

    /// Whether a strong constructor has populated the field
    pub fn is_attached(&self) -> bool {
        self.slot.borrow().block.is_some()
    }
}

impl<T> Default for WeakThis<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A copied payload is a new object with no owner yet
impl<T> Clone for WeakThis<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for WeakThis<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakThis")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Opt-in capability for payloads that need handles to themselves
pub trait SharedFromThis: Sized {
    /// The payload's back-reference field
    fn weak_this(&self) -> &WeakThis<Self>;

    /// New strong handle sharing the block that owns `self`.
    ///
    /// Fails if `self` was never wrapped by a self-aware constructor, or if
    /// it is already being destroyed.
    fn shared_from_this(&self) -> Result<Shared<Self>, PromotionError> {
        let field = self.weak_this();
        if cfg!(debug_assertions) && !field.is_attached() {
            log_unattached_this("SharedFromThis::shared_from_this");
        }
        Shared::from_weak(&field.get())
    }

    /// Copy of the back-reference (empty if never wrapped by a self-aware
    /// constructor)
    fn weak_from_this(&self) -> Weak<Self> {
        self.weak_this().get()
    }
}
