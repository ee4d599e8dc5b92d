use alloc::sync::Arc;
use core::{
    any::{type_name, Any, TypeId},
    cmp::Ordering,
};

#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub name: &'static str,
    pub id: TypeId,
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl PartialOrd for TypeInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl TypeInfo {
    #[inline]
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self {
            name: type_name::<T>(),
            id: TypeId::of::<T>(),
        }
    }

    #[inline]
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit_once("::").map_or(self.name, |(_, name)| name)
    }
}

/// Type-erased instance as it is stored in caches and overrides
pub type AnyInstance = Arc<dyn Any + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::TypeInfo;

    struct Logger;

    #[test]
    fn test_short_name() {
        let type_info = TypeInfo::of::<Logger>();

        assert_eq!(type_info.short_name(), "Logger");
        assert!(type_info.name.ends_with("::Logger"));
    }

    #[test]
    fn test_eq_by_id() {
        assert_eq!(TypeInfo::of::<Logger>(), TypeInfo::of::<Logger>());
        assert_ne!(TypeInfo::of::<Logger>(), TypeInfo::of::<u8>());
    }
}
