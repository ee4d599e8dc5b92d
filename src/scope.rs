use alloc::{
    string::String,
    sync::{Arc, Weak},
    vec::Vec,
};
use core::{
    any::type_name,
    fmt::{self, Debug, Formatter},
    future::Future,
};
use parking_lot::Mutex;
use tracing::{debug, debug_span, error, info_span, warn};

use crate::{
    any::AnyInstance,
    cache::Cache,
    context::Context,
    dispose,
    errors::{DisposeErrorKind, InstantiateErrorKind, ResolveErrorKind, ScopeErrorKind},
    key::Key,
    lifetime::Lifetime,
    lock::{Claim, Constructions},
    registry::{InstantiatorData, Registry},
    resolver::Resolver,
};

pub(crate) struct ScopeState {
    pub(crate) cache: Cache,
    pub(crate) explicit: Context,
    pub(crate) children: Vec<Arc<ScopeInner>>,
    pub(crate) disposed: bool,
}

pub(crate) struct ScopeInner {
    pub(crate) label: String,
    pub(crate) registry: Arc<Registry>,
    pub(crate) parent: Option<Weak<ScopeInner>>,
    pub(crate) state: Mutex<ScopeState>,
    pub(crate) constructions: Arc<Constructions>,
}

impl ScopeInner {
    fn new(
        label: String,
        registry: Arc<Registry>,
        constructions: Arc<Constructions>,
        parent: Option<Weak<ScopeInner>>,
        explicit: Context,
    ) -> Self {
        Self {
            label,
            registry,
            parent,
            state: Mutex::new(ScopeState {
                cache: Cache::new(),
                explicit,
                children: Vec::new(),
                disposed: false,
            }),
            constructions,
        }
    }

    #[inline]
    pub(crate) fn parent(&self) -> Option<Arc<ScopeInner>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    #[inline]
    pub(crate) fn use_after_dispose(&self) -> ResolveErrorKind {
        ResolveErrorKind::UseAfterDispose {
            scope: self.label.clone(),
        }
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        if let Err(err) = dispose::dispose(self) {
            error!(scope = %self.label, "{}", err);
            for rejection in err.rejections() {
                error!(scope = %self.label, "{}", rejection);
            }
        }
        debug!(scope = %self.label, "Scope closed on drop");
    }
}

/// Resolution and caching unit of a scope tree.
///
/// The root scope owns singletons, every scope owns the scoped instances resolved through it.
/// Parents hold their children strongly, children hold their parent weakly,
/// so dropping the last handle of the root tears the whole tree down.
/// Cloning the handle is cheap and clones share the same scope.
#[derive(Clone)]
pub struct Scope {
    pub(crate) inner: Arc<ScopeInner>,
}

impl Scope {
    /// Creates a root scope labelled `root`
    #[inline]
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self::new_with_label(registry, "root")
    }

    #[inline]
    #[must_use]
    pub fn new_with_label(registry: Registry, label: impl Into<String>) -> Self {
        Self::from_inner(Arc::new(ScopeInner::new(
            label.into(),
            Arc::new(registry),
            Arc::default(),
            None,
            Context::new(),
        )))
    }

    #[inline]
    pub(crate) const fn from_inner(inner: Arc<ScopeInner>) -> Self {
        Self { inner }
    }

    /// Creates child scope builder
    #[inline]
    #[must_use]
    pub fn enter(&self, label: impl Into<String>) -> ChildScopeBuilder {
        ChildScopeBuilder {
            parent: self.clone(),
            label: label.into(),
            context: Context::new(),
        }
    }

    /// Creates child scope
    ///
    /// # Errors
    /// [`ScopeErrorKind::UseAfterDispose`] if the scope is disposed
    #[inline]
    pub fn create_child(&self, label: impl Into<String>) -> Result<Scope, ScopeErrorKind> {
        self.enter(label).build()
    }

    /// Resolves the key.
    ///
    /// The nearest explicit instance from this scope up to the root wins, otherwise the
    /// lifetime of the key decides where the instance is cached:
    /// singletons in the root, scoped instances in this scope, transient ones nowhere.
    ///
    /// # Errors
    /// - [`ResolveErrorKind::UseAfterDispose`] if the scope is disposed
    /// - [`ResolveErrorKind::NotRegistered`] if the key isn't registered and no explicit instance is set
    /// - [`ResolveErrorKind::NoExplicitInstance`] if the key is explicit-only and no explicit instance is set
    /// - [`ResolveErrorKind::CircularDependency`] if the key depends on itself
    /// - [`ResolveErrorKind::IncorrectType`] if the key resolves to another type
    /// - [`ResolveErrorKind::Instantiate`] if a factory fails
    #[inline]
    pub fn resolve<T: Send + Sync + 'static>(&self, key: &Key<T>) -> Result<Arc<T>, ResolveErrorKind> {
        self.resolve_with(key)
    }

    /// Type-erased [`Scope::resolve`]
    ///
    /// # Errors
    /// Same as [`Scope::resolve`], except [`ResolveErrorKind::IncorrectType`]
    #[inline]
    pub fn resolve_dyn(&self, key: &'static str) -> Result<AnyInstance, ResolveErrorKind> {
        self.resolve_in(key)
    }

    /// Sets an explicit instance, shadowing the key for this scope and its descendants.
    /// The instance stays owned by the caller: the scope never finalizes it.
    ///
    /// # Errors
    /// [`ScopeErrorKind::UseAfterDispose`] if the scope is disposed
    #[inline]
    pub fn set_explicit_instance<T: Send + Sync + 'static>(&self, key: &Key<T>, value: T) -> Result<(), ScopeErrorKind> {
        self.set_explicit_instance_arc(key, Arc::new(value))
    }

    /// # Errors
    /// [`ScopeErrorKind::UseAfterDispose`] if the scope is disposed
    pub fn set_explicit_instance_arc<T: Send + Sync + 'static>(&self, key: &Key<T>, value: Arc<T>) -> Result<(), ScopeErrorKind> {
        let mut state = self.inner.state.lock();
        if state.disposed {
            let err = ScopeErrorKind::UseAfterDispose {
                scope: self.inner.label.clone(),
            };
            error!("{}", err);
            return Err(err);
        }

        let replaced = state.explicit.insert_arc(key, value);
        drop(state);
        drop(replaced);

        debug!(key = key.name(), scope = %self.inner.label, "Explicit instance set");
        Ok(())
    }

    #[inline]
    pub fn remove_explicit_instance<T: Send + Sync + 'static>(&self, key: &Key<T>) -> Option<Arc<T>> {
        self.inner.state.lock().explicit.remove(key)
    }

    /// Disposes the scope: children first, then finalizers of the instances it owns
    /// in reverse construction order.
    /// Async finalizers can't run here and are reported as failed.
    /// Calling it again is a no-op.
    ///
    /// # Errors
    /// [`DisposeErrorKind::Aggregated`] with every finalizer failure of the cascade
    #[inline]
    pub fn dispose(&self) -> Result<(), DisposeErrorKind> {
        dispose::dispose(&self.inner)
    }

    /// Same as [`Scope::dispose`], awaiting async finalizers
    ///
    /// # Errors
    /// [`DisposeErrorKind::Aggregated`] with every finalizer failure of the cascade
    #[inline]
    pub fn dispose_async(&self) -> impl Future<Output = Result<(), DisposeErrorKind>> + Send + 'static {
        dispose::dispose_async(self.inner.clone())
    }

    /// Finalizes and drops the instance cached in this scope for the key, ahead of the scope disposal.
    /// Returns `false` if nothing is cached for the key.
    ///
    /// # Errors
    /// [`DisposeErrorKind::Aggregated`] if the finalizer fails or is async
    #[inline]
    pub fn dispose_instance<T>(&self, key: &Key<T>) -> Result<bool, DisposeErrorKind> {
        dispose::dispose_instance(&self.inner, key.name())
    }

    /// Same as [`Scope::dispose_instance`], awaiting async finalizers
    ///
    /// # Errors
    /// [`DisposeErrorKind::Aggregated`] if the finalizer fails
    #[inline]
    pub fn dispose_instance_async<T>(&self, key: &Key<T>) -> impl Future<Output = Result<bool, DisposeErrorKind>> + Send + 'static {
        dispose::dispose_instance_async(self.inner.clone(), key.name())
    }
}

impl Scope {
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// Returns `None` for the root and for a scope whose parent is gone
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<Scope> {
        self.inner.parent().map(Scope::from_inner)
    }

    #[inline]
    #[must_use]
    pub fn children_len(&self) -> usize {
        self.inner.state.lock().children.len()
    }

    /// Keys of the instances cached in this scope
    #[inline]
    #[must_use]
    pub fn cached_keys(&self) -> Vec<&'static str> {
        self.inner.state.lock().cache.keys()
    }

    /// Keys of the instances cached in the root scope
    #[inline]
    #[must_use]
    pub fn singleton_keys(&self) -> Vec<&'static str> {
        self.root().map(|root| root.cached_keys()).unwrap_or_default()
    }

    /// Keys of the explicit instances set on this scope
    #[inline]
    #[must_use]
    pub fn explicit_keys(&self) -> Vec<&'static str> {
        self.inner.state.lock().explicit.keys()
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Returns `true` if both handles point to the same scope
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Scope {
    pub(crate) fn resolve_with<T: Send + Sync + 'static>(&self, key: &Key<T>) -> Result<Arc<T>, ResolveErrorKind> {
        let instance = self.resolve_in(key.name())?;
        instance.downcast::<T>().map_err(|_| {
            let err = ResolveErrorKind::IncorrectType {
                key: key.name(),
                expected: type_name::<T>(),
                actual: self.registered_type_name(key.name()),
            };
            error!("{}", err);
            err
        })
    }

    pub(crate) fn resolve_in(&self, key: &'static str) -> Result<AnyInstance, ResolveErrorKind> {
        let span = info_span!("resolve", key, scope = %self.inner.label);
        let _guard = span.enter();

        self.ensure_active()?;

        if let Some(instance) = self.find_explicit(key) {
            debug!("Found explicit instance");
            return Ok(instance);
        }

        let Some(data) = self.inner.registry.get(key) else {
            let err = ResolveErrorKind::NotRegistered { key };
            error!("{}", err);
            return Err(err);
        };

        match data.lifetime {
            Lifetime::Singleton => {
                let root = self.root()?;
                root.get_or_instantiate(self, key, data)
            }
            Lifetime::Scoped => self.get_or_instantiate(self, key, data),
            Lifetime::Transient => self.instantiate(key, data),
            Lifetime::ExplicitOnly => {
                let err = ResolveErrorKind::NoExplicitInstance {
                    key,
                    scope: self.inner.label.clone(),
                };
                error!("{}", err);
                Err(err)
            }
        }
    }

    pub(crate) fn ensure_active(&self) -> Result<(), ResolveErrorKind> {
        if self.inner.state.lock().disposed {
            let err = self.inner.use_after_dispose();
            warn!("{}", err);
            return Err(err);
        }
        Ok(())
    }

    fn find_explicit(&self, key: &str) -> Option<AnyInstance> {
        let mut current = Some(self.inner.clone());
        while let Some(scope) = current {
            if let Some(explicit) = scope.state.lock().explicit.get(key) {
                return Some(explicit.instance.clone());
            }
            current = scope.parent();
        }
        None
    }

    fn registered_type_name(&self, key: &str) -> &'static str {
        let mut current = Some(self.inner.clone());
        while let Some(scope) = current {
            if let Some(explicit) = scope.state.lock().explicit.get(key) {
                return explicit.type_info.name;
            }
            current = scope.parent();
        }
        self.inner.registry.get(key).map_or("unknown", |data| data.type_info.name)
    }

    fn root(&self) -> Result<Scope, ResolveErrorKind> {
        let mut current = self.inner.clone();
        loop {
            let parent = current.parent.as_ref().map(Weak::upgrade);
            match parent {
                None => return Ok(Scope::from_inner(current)),
                Some(Some(parent)) => current = parent,
                // Parents dispose their children before going away
                Some(None) => {
                    let err = self.inner.use_after_dispose();
                    warn!("{}", err);
                    return Err(err);
                }
            }
        }
    }

    fn cached(&self, key: &str) -> Result<Option<AnyInstance>, ResolveErrorKind> {
        let state = self.inner.state.lock();
        if state.disposed {
            return Err(self.inner.use_after_dispose());
        }
        Ok(state.cache.get(key))
    }

    /// Gets the instance from this scope cache, building it through the resolving scope on a miss
    fn get_or_instantiate(&self, resolving: &Scope, key: &'static str, data: &InstantiatorData) -> Result<AnyInstance, ResolveErrorKind> {
        if let Some(instance) = self.cached(key)? {
            debug!(owner = %self.inner.label, "Found in cache");
            return Ok(instance);
        }
        debug!(owner = %self.inner.label, "Not found in cache");

        let slot = (Arc::as_ptr(&self.inner) as usize, key);
        let claim = match self.inner.constructions.claim(slot, || self.cached(key)) {
            Ok(Claim::Cached(instance)) => {
                debug!(owner = %self.inner.label, "Found in cache after waiting for construction");
                return Ok(instance);
            }
            Ok(Claim::Build(claim)) => claim,
            Err(err) => {
                error!("{}", err);
                return Err(err);
            }
        };

        let instance = resolving.instantiate(key, data)?;

        let mut state = self.inner.state.lock();
        if state.disposed {
            let err = self.inner.use_after_dispose();
            warn!("Scope disposed while the instance was under construction");
            return Err(err);
        }
        state.cache.insert(key, instance.clone(), data.finalizer.clone());
        drop(state);
        drop(claim);

        debug!(owner = %self.inner.label, "Cached");
        Ok(instance)
    }

    fn instantiate(&self, key: &'static str, data: &InstantiatorData) -> Result<AnyInstance, ResolveErrorKind> {
        let Some(instantiator) = data.instantiator.as_ref() else {
            let err = ResolveErrorKind::NoExplicitInstance {
                key,
                scope: self.inner.label.clone(),
            };
            error!("{}", err);
            return Err(err);
        };

        let entered = match self.inner.constructions.enter(key) {
            Ok(entered) => entered,
            Err(err) => {
                error!("{}", err);
                return Err(err);
            }
        };
        let resolver = Resolver::new(self, key);
        let result = instantiator(&resolver);
        drop(entered);

        if !data.descriptors.is_empty() && !resolver.is_bound() {
            warn!("Lazy fields are declared, but the factory didn't bind them");
        }

        match result {
            Ok(instance) => Ok(instance),
            Err(InstantiateErrorKind::Resolve(err)) => {
                error!("{}", err);
                Err(*err)
            }
            Err(err) => {
                error!("{}", err);
                Err(ResolveErrorKind::Instantiate(err))
            }
        }
    }
}

impl Debug for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("label", &self.inner.label)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

pub struct ChildScopeBuilder {
    parent: Scope,
    label: String,
    context: Context,
}

impl ChildScopeBuilder {
    /// Seeds the child with explicit instances
    #[inline]
    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Creates the child and attaches it to the parent
    ///
    /// # Errors
    /// [`ScopeErrorKind::UseAfterDispose`] if the parent is disposed
    pub fn build(self) -> Result<Scope, ScopeErrorKind> {
        let span = debug_span!("create_child", parent = %self.parent.inner.label, label = %self.label);
        let _guard = span.enter();

        let mut state = self.parent.inner.state.lock();
        if state.disposed {
            let err = ScopeErrorKind::UseAfterDispose {
                scope: self.parent.inner.label.clone(),
            };
            error!("{}", err);
            return Err(err);
        }

        let child = Arc::new(ScopeInner::new(
            self.label,
            self.parent.inner.registry.clone(),
            self.parent.inner.constructions.clone(),
            Some(Arc::downgrade(&self.parent.inner)),
            self.context,
        ));
        state.children.push(child.clone());

        debug!("Child scope created");
        Ok(Scope::from_inner(child))
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::{Scope, ScopeInner};
    use crate::{errors::ScopeErrorKind, Context, InstantiateErrorKind, Key, Registry, ResolveErrorKind};

    use alloc::{
        format,
        string::{String, ToString as _},
        sync::Arc,
    };
    use core::sync::atomic::{AtomicU8, Ordering};
    use tracing_test::traced_test;

    struct Config;
    struct Session(Arc<Config>);
    struct Request(#[allow(dead_code)] Arc<Session>);

    const CONFIG: Key<Config> = Key::new("config");
    const SESSION: Key<Session> = Key::new("session");
    const REQUEST: Key<Request> = Key::new("request");

    fn registry(instantiator_call_count: Arc<AtomicU8>) -> Registry {
        Registry::builder()
            .singleton(&CONFIG, move |_| {
                instantiator_call_count.fetch_add(1, Ordering::SeqCst);
                Ok(Config)
            })
            .scoped(&SESSION, |resolver| Ok(Session(resolver.resolve(&CONFIG)?)))
            .transient(&REQUEST, |resolver| Ok(Request(resolver.resolve(&SESSION)?)))
            .build()
            .unwrap()
    }

    #[test]
    #[traced_test]
    fn test_lifetimes() {
        let instantiator_call_count = Arc::new(AtomicU8::new(0));
        let root = Scope::new(registry(instantiator_call_count.clone()));
        let child = root.create_child("child").unwrap();

        let config = child.resolve(&CONFIG).unwrap();
        assert!(Arc::ptr_eq(&config, &root.resolve(&CONFIG).unwrap()));
        assert_eq!(instantiator_call_count.load(Ordering::SeqCst), 1);

        let session = child.resolve(&SESSION).unwrap();
        assert!(Arc::ptr_eq(&session, &child.resolve(&SESSION).unwrap()));
        assert!(!Arc::ptr_eq(&session, &root.resolve(&SESSION).unwrap()));
        assert!(Arc::ptr_eq(&session.0, &config));

        assert!(!Arc::ptr_eq(&child.resolve(&REQUEST).unwrap(), &child.resolve(&REQUEST).unwrap()));

        assert_eq!(root.singleton_keys(), ["config", "session"]);
        assert_eq!(child.cached_keys(), ["session"]);
        assert_eq!(child.singleton_keys(), root.cached_keys());
    }

    #[test]
    #[traced_test]
    fn test_factory_error() {
        const FAILING: Key<Config> = Key::new("failing");

        let root = Scope::new(
            Registry::builder()
                .scoped(&FAILING, |_| Err(InstantiateErrorKind::Custom(anyhow::anyhow!("boom"))))
                .scoped(&SESSION, |resolver| Ok(Session(resolver.resolve(&FAILING)?)))
                .build()
                .unwrap(),
        );

        assert!(matches!(
            root.resolve(&FAILING),
            Err(ResolveErrorKind::Instantiate(InstantiateErrorKind::Custom(_)))
        ));
        assert!(matches!(
            root.resolve(&SESSION),
            Err(ResolveErrorKind::Instantiate(InstantiateErrorKind::Custom(_)))
        ));
        assert!(root.cached_keys().is_empty());
    }

    #[test]
    #[traced_test]
    fn test_nested_resolve_error_kept() {
        let root = Scope::new(
            Registry::builder()
                .scoped(&SESSION, |resolver| Ok(Session(resolver.resolve(&CONFIG)?)))
                .build()
                .unwrap(),
        );

        assert!(matches!(
            root.resolve(&SESSION),
            Err(ResolveErrorKind::NotRegistered { key: "config" })
        ));
    }

    #[test]
    #[traced_test]
    fn test_explicit_keys() {
        let root = Scope::new(registry(Arc::new(AtomicU8::new(0))));
        let mut context = Context::new();
        context.insert(&CONFIG, Config);

        let child = root.enter("child").with_context(context).build().unwrap();

        assert_eq!(child.explicit_keys(), ["config"]);
        assert!(root.explicit_keys().is_empty());
        assert!(child.remove_explicit_instance(&CONFIG).is_some());
        assert!(child.explicit_keys().is_empty());
    }

    #[test]
    #[traced_test]
    fn test_tree_links() {
        let root = Scope::new(registry(Arc::new(AtomicU8::new(0))));
        let child = root.create_child("child").unwrap();
        let grandchild = child.create_child("grandchild").unwrap();

        assert!(root.is_root());
        assert!(!child.is_root());
        assert_eq!(root.children_len(), 1);
        assert!(grandchild.parent().unwrap().ptr_eq(&child));
        assert_eq!(grandchild.label(), "grandchild");

        child.dispose().unwrap();

        assert_eq!(root.children_len(), 0);
        assert!(grandchild.is_disposed());
        assert!(matches!(
            child.create_child("late"),
            Err(ScopeErrorKind::UseAfterDispose { .. })
        ));
        assert!(child.set_explicit_instance(&CONFIG, Config).is_err());
        assert!(matches!(
            grandchild.resolve(&CONFIG),
            Err(ResolveErrorKind::UseAfterDispose { .. })
        ));
    }

    #[test]
    #[traced_test]
    fn test_thread_safe() {
        fn impl_bounds<T: Send + Sync + 'static>() {}

        impl_bounds::<(Scope, ScopeInner)>();

        let instantiator_call_count = Arc::new(AtomicU8::new(0));
        let root = Scope::new(registry(instantiator_call_count.clone()));

        let handles = (0..4)
            .map(|_| {
                let root = root.clone();
                std::thread::spawn(move || root.resolve(&CONFIG).unwrap())
            })
            .collect::<alloc::vec::Vec<_>>();
        let configs = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<alloc::vec::Vec<_>>();

        assert!(configs.iter().all(|config| Arc::ptr_eq(config, &configs[0])));
        assert_eq!(instantiator_call_count.load(Ordering::SeqCst), 1);
    }
}
