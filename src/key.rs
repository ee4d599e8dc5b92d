use alloc::sync::Arc;
use core::{
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
};

use crate::any::TypeInfo;

/// Stable identifier of a registerable type.
///
/// The name is the identity: the registry, caches and overrides are indexed by it,
/// and the same name must be used at every registration and lookup site.
/// The type parameter only fixes what the key resolves to, so a lookup through a key
/// never needs a manual downcast.
///
/// ```
/// use nestdi::Key;
///
/// struct Logger;
///
/// const LOGGER: Key<Logger> = Key::new("logger");
///
/// assert_eq!(LOGGER.name(), "logger");
/// ```
pub struct Key<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T> Key<T> {
    #[inline]
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: 'static> Key<T> {
    #[inline]
    #[must_use]
    pub fn type_info(&self) -> TypeInfo {
        TypeInfo::of::<T>()
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<T> Eq for Key<T> {}

impl<T> Debug for Key<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Key").field(&self.name).finish()
    }
}
