//! ownshare - deterministic shared ownership with an explicit control block
//!
//! A [`Shared`] handle owns one strong unit of a control block; a [`Weak`]
//! handle owns one weak unit. The payload is destroyed when the last strong
//! unit goes away, the block when the last unit of either kind does.
//!
//! Single-threaded by design: neither handle is `Send` or `Sync`.
//!
//! ```
//! use ownshare::{make_shared, Weak};
//!
//! let h1 = make_shared(42);
//! let h2 = h1.clone();
//! assert_eq!(h2.use_count(), 2);
//!
//! let w = Weak::from(&h2);
//! drop(h1);
//! drop(h2);
//! assert!(w.expired());
//! assert!(w.lock().is_null());
//! ```

// Core modules
mod block;
mod shared;
mod this;
mod weak;

pub mod error;
pub mod logging;
pub mod stats;

// Re-export commonly used items
pub use block::BlockKind;
pub use error::PromotionError;
pub use shared::{make_shared, make_shared_this, Shared};
pub use stats::BlockStats;
pub use this::{SharedFromThis, WeakThis};
pub use weak::Weak;
