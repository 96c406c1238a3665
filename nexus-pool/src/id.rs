//! Sentinel-based id trait shared by the hash index and the slot store.
//!
//! Ids are small unsigned integers. The maximum value of each type is
//! reserved as the "no id" sentinel so quick slots can be stored as a flat
//! array of ids rather than `Option<Id>`.

/// A copyable integer id with a sentinel "none" value.
///
/// # Example
///
/// ```
/// use nexus_pool::Id;
///
/// let id: u32 = 5;
/// assert!(id.is_some());
/// assert!(u32::NONE.is_none());
/// assert_eq!(u32::from_usize(7).as_usize(), 7);
/// ```
pub trait Id: Copy + Eq + core::fmt::Debug {
    /// Sentinel value representing "no id" (an empty quick slot).
    const NONE: Self;

    /// Largest id that can be minted, one below the sentinel.
    const MAX_ID: usize;

    /// Returns `true` if this is the sentinel value.
    #[inline]
    fn is_none(self) -> bool {
        self == Self::NONE
    }

    /// Returns `true` if this is not the sentinel value.
    #[inline]
    fn is_some(self) -> bool {
        !self.is_none()
    }

    /// Returns the id as a storage index.
    fn as_usize(self) -> usize;

    /// Creates an id from a storage index.
    ///
    /// Values above [`Id::MAX_ID`] are truncated; callers check first.
    fn from_usize(val: usize) -> Self;
}

macro_rules! impl_id_for_unsigned {
    ($($ty:ty),*) => {
        $(
            impl Id for $ty {
                const NONE: Self = <$ty>::MAX;

                const MAX_ID: usize = if (<$ty>::MAX as u128) < (usize::MAX as u128) {
                    <$ty>::MAX as usize - 1
                } else {
                    usize::MAX - 1
                };

                #[inline]
                fn as_usize(self) -> usize {
                    self as usize
                }

                #[inline]
                fn from_usize(val: usize) -> Self {
                    val as Self
                }
            }
        )*
    };
}

impl_id_for_unsigned!(u16, u32, u64, usize);
