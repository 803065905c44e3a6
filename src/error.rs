use std::fmt;

/// Failure to promote a weak reference into a strong handle.
///
/// Returned by [`Shared::from_weak`](crate::Shared::from_weak) and
/// [`SharedFromThis::shared_from_this`](crate::SharedFromThis::shared_from_this).
/// The payload is gone (or was never there); there is nothing to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionError {
    /// The weak handle is not attached to any control block
    Empty,
    /// Every strong owner is gone and the payload has been destroyed
    Expired,
}

impl fmt::Display for PromotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Cannot promote an empty weak handle"),
            Self::Expired => write!(f, "Cannot promote a weak handle: payload already destroyed"),
        }
    }
}

impl std::error::Error for PromotionError {}
