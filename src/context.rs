use alloc::{collections::BTreeMap, sync::Arc, vec::Vec};

use crate::{
    any::{AnyInstance, TypeInfo},
    key::Key,
};

#[derive(Clone)]
pub(crate) struct Explicit {
    pub(crate) instance: AnyInstance,
    pub(crate) type_info: TypeInfo,
}

/// Explicit instances keyed by name.
///
/// Used as the override table of a scope and to seed a child scope on creation,
/// see [`crate::ChildScopeBuilder::with_context`].
/// Instances put here are owned by the caller: the container never finalizes them.
#[derive(Clone, Default)]
pub struct Context {
    pub(crate) map: BTreeMap<&'static str, Explicit>,
}

impl Context {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self { map: BTreeMap::new() }
    }

    #[inline]
    pub fn insert<T: Send + Sync + 'static>(&mut self, key: &Key<T>, value: T) -> Option<AnyInstance> {
        self.insert_arc(key, Arc::new(value))
    }

    #[inline]
    pub fn insert_arc<T: Send + Sync + 'static>(&mut self, key: &Key<T>, value: Arc<T>) -> Option<AnyInstance> {
        self.map
            .insert(
                key.name(),
                Explicit {
                    instance: value,
                    type_info: TypeInfo::of::<T>(),
                },
            )
            .map(|explicit| explicit.instance)
    }

    #[inline]
    pub fn remove<T: Send + Sync + 'static>(&mut self, key: &Key<T>) -> Option<Arc<T>> {
        self.map
            .remove(key.name())
            .and_then(|explicit| explicit.instance.downcast().ok())
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    #[inline]
    #[must_use]
    pub fn keys(&self) -> Vec<&'static str> {
        self.map.keys().copied().collect()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    #[must_use]
    pub(crate) fn get(&self, name: &str) -> Option<&Explicit> {
        self.map.get(name)
    }
}
