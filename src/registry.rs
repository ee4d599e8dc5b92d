use alloc::{collections::BTreeMap, sync::Arc, vec::Vec};
use core::future::Future;
use tracing::{debug, error};

use crate::{
    any::TypeInfo,
    descriptor::{Descriptor, Descriptors, Resolution},
    errors::{InstantiateErrorKind, RegistryErrorKind, ResolveErrorKind},
    finalizer::{boxed_async_finalizer, boxed_finalizer, AsyncDispose, BoxedFinalizer, Dispose},
    instantiator::{boxed_instantiator, BoxedInstantiator},
    key::Key,
    lifetime::Lifetime,
    resolver::Resolver,
};

pub(crate) struct InstantiatorData {
    pub(crate) lifetime: Lifetime,
    pub(crate) type_info: TypeInfo,
    /// `None` for explicit-only keys
    pub(crate) instantiator: Option<BoxedInstantiator>,
    pub(crate) finalizer: Option<BoxedFinalizer>,
    pub(crate) descriptors: Descriptors,
}

/// Collects registrations and validates them on [`RegistryBuilder::build`].
///
/// Conflicts are recorded as they happen and reported by `build`, so registrations
/// can be chained without handling errors at every step.
#[derive(Default)]
pub struct RegistryBuilder {
    instantiators: BTreeMap<&'static str, InstantiatorData>,
    finalizers: BTreeMap<&'static str, (TypeInfo, BoxedFinalizer)>,
    descriptors: BTreeMap<&'static str, Descriptors>,
    errors: Vec<RegistryErrorKind>,
}

impl RegistryBuilder {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for the key.
    ///
    /// Registering the key again with the same lifetime and type replaces the factory,
    /// with another lifetime or type it's rejected by [`RegistryBuilder::build`].
    #[must_use]
    pub fn provide<T, F>(mut self, key: &Key<T>, lifetime: Lifetime, instantiator: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    {
        let instantiator = if lifetime.is_constructible() {
            Some(boxed_instantiator::<T, F>(instantiator))
        } else {
            None
        };
        self.add_instantiator(key.name(), lifetime, TypeInfo::of::<T>(), instantiator);
        self
    }

    #[inline]
    #[must_use]
    pub fn singleton<T, F>(self, key: &Key<T>, instantiator: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    {
        self.provide(key, Lifetime::Singleton, instantiator)
    }

    #[inline]
    #[must_use]
    pub fn scoped<T, F>(self, key: &Key<T>, instantiator: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    {
        self.provide(key, Lifetime::Scoped, instantiator)
    }

    #[inline]
    #[must_use]
    pub fn transient<T, F>(self, key: &Key<T>, instantiator: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    {
        self.provide(key, Lifetime::Transient, instantiator)
    }

    /// Registers a key that only resolves to explicit instances set on a scope or its ancestors
    #[inline]
    #[must_use]
    pub fn explicit<T: Send + Sync + 'static>(mut self, key: &Key<T>) -> Self {
        self.add_instantiator(key.name(), Lifetime::ExplicitOnly, TypeInfo::of::<T>(), None);
        self
    }

    #[must_use]
    pub fn add_finalizer<T, F>(mut self, key: &Key<T>, finalizer: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.finalizers
            .insert(key.name(), (TypeInfo::of::<T>(), boxed_finalizer::<T, F>(finalizer)));
        self
    }

    /// Adds a finalizer that only async disposal can run
    #[must_use]
    pub fn add_async_finalizer<T, F, Fut>(mut self, key: &Key<T>, finalizer: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.finalizers
            .insert(key.name(), (TypeInfo::of::<T>(), boxed_async_finalizer::<T, F>(finalizer)));
        self
    }

    /// Uses the [`Dispose`] impl of the value as its finalizer
    #[inline]
    #[must_use]
    pub fn add_dispose<T: Dispose>(self, key: &Key<T>) -> Self {
        self.add_finalizer(key, |instance: Arc<T>| Dispose::dispose(&*instance))
    }

    /// Uses the [`AsyncDispose`] impl of the value as its finalizer
    #[inline]
    #[must_use]
    pub fn add_async_dispose<T: AsyncDispose>(self, key: &Key<T>) -> Self {
        self.add_async_finalizer(key, |instance: Arc<T>| async move { AsyncDispose::dispose(&*instance).await })
    }

    /// Declares a lazy field of the owner's instances.
    /// A later declaration of the same field replaces the earlier one.
    ///
    /// Fields are bound only when the owner's factory calls [`Resolver::bindings`] and keeps
    /// the result in the instance. A factory that never does leaves them unbound, which is
    /// logged at `warn` level after construction.
    #[must_use]
    pub fn declare<T: 'static>(mut self, owner: &Key<T>, field: &'static str, resolution: Resolution) -> Self {
        self.descriptors.entry(owner.name()).or_default().declare(Descriptor {
            owner: owner.name(),
            field,
            resolution,
        });
        self
    }

    /// Freezes the registrations
    ///
    /// # Errors
    /// The first [`RegistryErrorKind`] found
    pub fn build(mut self) -> Result<Registry, RegistryErrorKind> {
        if let Some(err) = self.errors.into_iter().next() {
            error!("{}", err);
            return Err(err);
        }

        for (key, (type_info, finalizer)) in self.finalizers {
            let Some(data) = self.instantiators.get_mut(key) else {
                let err = RegistryErrorKind::FinalizerWithoutRegistration { key };
                error!("{}", err);
                return Err(err);
            };
            if data.type_info != type_info {
                let err = RegistryErrorKind::TypeConflict {
                    key,
                    registered: data.type_info.name,
                    attempted: type_info.name,
                };
                error!("{}", err);
                return Err(err);
            }
            if !data.lifetime.is_cached() {
                let err = RegistryErrorKind::FinalizerNotApplicable {
                    key,
                    lifetime: data.lifetime,
                };
                error!("{}", err);
                return Err(err);
            }
            data.finalizer = Some(finalizer);
        }

        for (owner, descriptors) in self.descriptors {
            let Some(data) = self.instantiators.get_mut(owner) else {
                let err = RegistryErrorKind::DescriptorWithoutOwner {
                    owner,
                    field: descriptors.iter().next().map_or("", |descriptor| descriptor.field),
                };
                error!("{}", err);
                return Err(err);
            };
            data.descriptors = descriptors;
        }

        debug!(len = self.instantiators.len(), "Registry built");

        Ok(Registry {
            instantiators: self.instantiators,
        })
    }
}

impl RegistryBuilder {
    fn add_instantiator(
        &mut self,
        key: &'static str,
        lifetime: Lifetime,
        type_info: TypeInfo,
        instantiator: Option<BoxedInstantiator>,
    ) {
        let Some(data) = self.instantiators.get_mut(key) else {
            self.instantiators.insert(
                key,
                InstantiatorData {
                    lifetime,
                    type_info,
                    instantiator,
                    finalizer: None,
                    descriptors: Descriptors::new(),
                },
            );
            return;
        };

        if data.lifetime != lifetime {
            self.errors.push(RegistryErrorKind::LifetimeConflict {
                key,
                registered: data.lifetime,
                attempted: lifetime,
            });
        } else if data.type_info != type_info {
            self.errors.push(RegistryErrorKind::TypeConflict {
                key,
                registered: data.type_info.name,
                attempted: type_info.name,
            });
        } else {
            debug!(key, "Instantiator replaced");
            data.instantiator = instantiator;
        }
    }
}

/// Frozen registrations, shared read-only by every scope of a tree
pub struct Registry {
    instantiators: BTreeMap<&'static str, InstantiatorData>,
}

impl Registry {
    #[inline]
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// # Errors
    /// [`ResolveErrorKind::NotRegistered`] if the key isn't registered
    pub fn lifetime(&self, key: &'static str) -> Result<Lifetime, ResolveErrorKind> {
        let Some(data) = self.instantiators.get(key) else {
            let err = ResolveErrorKind::NotRegistered { key };
            error!("{}", err);
            return Err(err);
        };
        Ok(data.lifetime)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.instantiators.contains_key(key)
    }

    #[inline]
    #[must_use]
    pub fn descriptors(&self, owner: &str) -> Option<&Descriptors> {
        self.instantiators.get(owner).map(|data| &data.descriptors)
    }

    #[inline]
    #[must_use]
    pub fn has_finalizer(&self, key: &str) -> bool {
        self.instantiators.get(key).is_some_and(|data| data.finalizer.is_some())
    }

    #[inline]
    #[must_use]
    pub fn keys(&self) -> Vec<&'static str> {
        self.instantiators.keys().copied().collect()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.instantiators.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instantiators.is_empty()
    }

    #[inline]
    #[must_use]
    pub(crate) fn get(&self, key: &str) -> Option<&InstantiatorData> {
        self.instantiators.get(key)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::Registry;
    use crate::{Key, Lifetime, RegistryErrorKind, Resolution, ResolveErrorKind};

    use alloc::{
        format,
        string::{String, ToString as _},
        sync::Arc,
    };
    use tracing_test::traced_test;

    struct Config;
    struct Request;

    const CONFIG: Key<Config> = Key::new("config");
    const REQUEST: Key<Request> = Key::new("request");
    const CONFIG_AS_REQUEST: Key<Request> = Key::new("config");

    #[test]
    #[traced_test]
    fn test_lifetime() {
        let registry = Registry::builder()
            .singleton(&CONFIG, |_| Ok(Config))
            .explicit(&REQUEST)
            .build()
            .unwrap();

        assert_eq!(registry.lifetime("config").unwrap(), Lifetime::Singleton);
        assert_eq!(registry.lifetime("request").unwrap(), Lifetime::ExplicitOnly);
        assert!(matches!(
            registry.lifetime("missing"),
            Err(ResolveErrorKind::NotRegistered { key: "missing" })
        ));
        assert!(logs_contain("Key `missing` not registered"));
        assert_eq!(registry.keys(), ["config", "request"]);
    }

    #[test]
    #[traced_test]
    fn test_same_lifetime_replaces() {
        let registry = Registry::builder()
            .singleton(&CONFIG, |_| Ok(Config))
            .singleton(&CONFIG, |_| Ok(Config))
            .build()
            .unwrap();

        assert_eq!(registry.len(), 1);
    }

    #[test]
    #[traced_test]
    fn test_conflicts() {
        assert_eq!(
            Registry::builder()
                .singleton(&CONFIG, |_| Ok(Config))
                .scoped(&CONFIG, |_| Ok(Config))
                .build()
                .err(),
            Some(RegistryErrorKind::LifetimeConflict {
                key: "config",
                registered: Lifetime::Singleton,
                attempted: Lifetime::Scoped,
            })
        );
        assert!(matches!(
            Registry::builder()
                .singleton(&CONFIG, |_| Ok(Config))
                .singleton(&CONFIG_AS_REQUEST, |_| Ok(Request))
                .build(),
            Err(RegistryErrorKind::TypeConflict { key: "config", .. })
        ));
    }

    #[test]
    #[traced_test]
    fn test_finalizer_errors() {
        assert_eq!(
            Registry::builder()
                .transient(&CONFIG, |_| Ok(Config))
                .add_finalizer(&CONFIG, |_: Arc<Config>| Ok(()))
                .build()
                .err(),
            Some(RegistryErrorKind::FinalizerNotApplicable {
                key: "config",
                lifetime: Lifetime::Transient,
            })
        );
        assert_eq!(
            Registry::builder()
                .add_finalizer(&CONFIG, |_: Arc<Config>| Ok(()))
                .build()
                .err(),
            Some(RegistryErrorKind::FinalizerWithoutRegistration { key: "config" })
        );

        let registry = Registry::builder()
            .scoped(&CONFIG, |_| Ok(Config))
            .add_finalizer(&CONFIG, |_: Arc<Config>| Ok(()))
            .build()
            .unwrap();

        assert!(registry.has_finalizer("config"));
    }

    #[test]
    #[traced_test]
    fn test_declare() {
        let registry = Registry::builder()
            .singleton(&CONFIG, |_| Ok(Config))
            .scoped(&REQUEST, |_| Ok(Request))
            .declare(&REQUEST, "config", Resolution::computed(|_| Ok(1u8)))
            .declare(&REQUEST, "config", Resolution::key(&CONFIG))
            .build()
            .unwrap();

        let descriptors = registry.descriptors("request").unwrap();
        assert_eq!(descriptors.len(), 1);
        assert!(!descriptors.get("config").unwrap().resolution.is_computed());

        assert_eq!(
            Registry::builder()
                .declare(&REQUEST, "config", Resolution::key(&CONFIG))
                .build()
                .err(),
            Some(RegistryErrorKind::DescriptorWithoutOwner {
                owner: "request",
                field: "config"
            })
        );
    }
}
