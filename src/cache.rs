use alloc::{collections::BTreeMap, vec::Vec};
use core::mem;

use crate::{any::AnyInstance, finalizer::BoxedFinalizer};

/// Instances owned by a scope
#[derive(Default)]
pub(crate) struct Cache {
    map: BTreeMap<&'static str, AnyInstance>,
    resolved: ResolvedSet,
}

impl Cache {
    #[inline]
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub(crate) fn get(&self, key: &str) -> Option<AnyInstance> {
        self.map.get(key).cloned()
    }

    /// Caches the instance. Only instances with a finalizer are tracked for disposal.
    pub(crate) fn insert(&mut self, key: &'static str, instance: AnyInstance, finalizer: Option<BoxedFinalizer>) {
        self.map.insert(key, instance.clone());
        if let Some(finalizer) = finalizer {
            self.resolved.push(Resolved { key, instance, finalizer });
        }
    }

    /// Removes the instance from the cache and from the disposal track
    pub(crate) fn remove(&mut self, key: &str) -> Option<(AnyInstance, Option<BoxedFinalizer>)> {
        let instance = self.map.remove(key)?;
        let finalizer = self.resolved.remove(key).map(|resolved| resolved.finalizer);
        Some((instance, finalizer))
    }

    #[inline]
    #[must_use]
    pub(crate) fn finalizer(&self, key: &str) -> Option<&BoxedFinalizer> {
        self.resolved.0.iter().find(|resolved| resolved.key == key).map(|resolved| &resolved.finalizer)
    }

    #[inline]
    #[must_use]
    pub(crate) fn keys(&self) -> Vec<&'static str> {
        self.map.keys().copied().collect()
    }

    /// Empties the cache, returning instances that need finalization in construction order
    #[inline]
    #[must_use]
    pub(crate) fn take_resolved_set(&mut self) -> ResolvedSet {
        self.map.clear();
        mem::take(&mut self.resolved)
    }
}

pub(crate) struct Resolved {
    pub(crate) key: &'static str,
    pub(crate) instance: AnyInstance,
    pub(crate) finalizer: BoxedFinalizer,
}

#[derive(Default)]
pub(crate) struct ResolvedSet(pub(crate) Vec<Resolved>);

impl ResolvedSet {
    fn push(&mut self, resolved: Resolved) {
        self.0.push(resolved);
    }

    fn remove(&mut self, key: &str) -> Option<Resolved> {
        let index = self.0.iter().position(|resolved| resolved.key == key)?;
        Some(self.0.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::Cache;
    use crate::{any::AnyInstance, finalizer::BoxedFinalizer};

    use alloc::sync::Arc;

    fn noop_finalizer() -> BoxedFinalizer {
        BoxedFinalizer::Sync(Arc::new(|_: AnyInstance| Ok::<_, anyhow::Error>(())))
    }

    #[test]
    fn test_only_finalizable_tracked() {
        let mut cache = Cache::new();
        cache.insert("a", Arc::new(1u8), None);
        cache.insert("b", Arc::new(2u8), Some(noop_finalizer()));
        cache.insert("c", Arc::new(3u8), Some(noop_finalizer()));

        assert_eq!(cache.keys(), ["a", "b", "c"]);

        let resolved = cache.take_resolved_set();
        let keys = resolved.0.iter().map(|resolved| resolved.key).collect::<alloc::vec::Vec<_>>();

        assert_eq!(keys, ["b", "c"]);
        assert!(cache.keys().is_empty());
    }

    #[test]
    fn test_remove_untracks() {
        let mut cache = Cache::new();
        cache.insert("a", Arc::new(1u8), Some(noop_finalizer()));

        let (_, finalizer) = cache.remove("a").unwrap();

        assert!(finalizer.is_some());
        assert!(cache.get("a").is_none());
        assert!(cache.take_resolved_set().0.is_empty());
    }
}
