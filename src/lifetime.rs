use core::fmt::{self, Display, Formatter};

/// Lifetime policy of a registered key.
///
/// Decides in which scope of the chain an instance lives:
/// - [`Lifetime::Singleton`]: cached in the root scope and shared by the whole tree
/// - [`Lifetime::Scoped`]: cached in the scope that resolved it
/// - [`Lifetime::Transient`]: built on every resolution and never cached
/// - [`Lifetime::ExplicitOnly`]: never built by the container, only supplied through explicit instances
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Lifetime {
    Singleton,
    Scoped,
    Transient,
    ExplicitOnly,
}

impl Lifetime {
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Lifetime::Singleton => "singleton",
            Lifetime::Scoped => "scoped",
            Lifetime::Transient => "transient",
            Lifetime::ExplicitOnly => "explicit-only",
        }
    }

    /// Returns `true` if instances of this lifetime are stored in a scope cache
    #[inline]
    #[must_use]
    pub const fn is_cached(&self) -> bool {
        matches!(self, Lifetime::Singleton | Lifetime::Scoped)
    }

    /// Returns `true` if the container is allowed to build instances of this lifetime
    #[inline]
    #[must_use]
    pub const fn is_constructible(&self) -> bool {
        !matches!(self, Lifetime::ExplicitOnly)
    }
}

impl Display for Lifetime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::Lifetime::*;

    #[test]
    fn test_is_cached() {
        assert!(Singleton.is_cached());
        assert!(Scoped.is_cached());
        assert!(!Transient.is_cached());
        assert!(!ExplicitOnly.is_cached());
    }

    #[test]
    fn test_is_constructible() {
        assert!(Transient.is_constructible());
        assert!(!ExplicitOnly.is_constructible());
    }
}
