use alloc::sync::Arc;
use core::cell::Cell;

use crate::{
    descriptor::{Bindings, EMPTY_DESCRIPTORS},
    errors::ResolveErrorKind,
    key::Key,
    scope::Scope,
};

/// Construction context passed to factories.
///
/// Everything resolved through it is resolved against the scope that requested the
/// instance under construction.
pub struct Resolver<'a> {
    scope: &'a Scope,
    owner: &'static str,
    bound: Cell<bool>,
}

impl<'a> Resolver<'a> {
    #[inline]
    #[must_use]
    pub(crate) const fn new(scope: &'a Scope, owner: &'static str) -> Self {
        Self {
            scope,
            owner,
            bound: Cell::new(false),
        }
    }

    /// Resolves a dependency of the instance under construction
    ///
    /// # Errors
    /// Same as [`Scope::resolve`]
    #[inline]
    pub fn resolve<T: Send + Sync + 'static>(&self, key: &Key<T>) -> Result<Arc<T>, ResolveErrorKind> {
        self.scope.resolve_with(key)
    }

    /// Scope that requested the instance
    #[inline]
    #[must_use]
    pub const fn scope(&self) -> &'a Scope {
        self.scope
    }

    /// Key of the instance under construction
    #[inline]
    #[must_use]
    pub const fn owner(&self) -> &'static str {
        self.owner
    }

    /// Lazy fields declared for the instance under construction, bound to the requesting scope
    #[must_use]
    pub fn bindings(&self) -> Bindings {
        self.bound.set(true);
        let descriptors = self.scope.registry().descriptors(self.owner).unwrap_or(&EMPTY_DESCRIPTORS);
        Bindings::bind(self.owner, descriptors, self.scope)
    }

    #[inline]
    pub(crate) fn is_bound(&self) -> bool {
        self.bound.get()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use crate::{Key, Registry, Resolution, Scope};

    use alloc::{
        format,
        string::{String, ToString as _},
    };
    use tracing_test::traced_test;

    struct Port(u16);
    struct Server;

    const PORT: Key<Port> = Key::new("port");
    const SERVER: Key<Server> = Key::new("server");

    #[test]
    #[traced_test]
    fn test_unbound_fields_logged() {
        let root = Scope::new(
            Registry::builder()
                .singleton(&PORT, |_| Ok(Port(8080)))
                .transient(&SERVER, |resolver| {
                    assert_eq!(resolver.owner(), "server");
                    assert_eq!(resolver.resolve(&PORT)?.0, 8080);
                    Ok(Server)
                })
                .declare(&SERVER, "port", Resolution::key(&PORT))
                .build()
                .unwrap(),
        );

        root.resolve(&SERVER).unwrap();

        assert!(logs_contain("factory didn't bind them"));
    }

    #[test]
    #[traced_test]
    fn test_bound_fields_not_logged() {
        let root = Scope::new(
            Registry::builder()
                .singleton(&PORT, |_| Ok(Port(8080)))
                .transient(&SERVER, |resolver| {
                    let bindings = resolver.bindings();
                    assert_eq!(bindings.fields(), ["port"]);
                    Ok(Server)
                })
                .declare(&SERVER, "port", Resolution::key(&PORT))
                .build()
                .unwrap(),
        );

        root.resolve(&SERVER).unwrap();

        assert!(!logs_contain("factory didn't bind them"));
    }
}
