use alloc::{
    collections::BTreeMap,
    string::String,
    sync::{Arc, Weak},
    vec::Vec,
};
use core::{
    any::type_name,
    fmt::{self, Debug, Formatter},
};
use parking_lot::Mutex;
use tracing::{debug, debug_span, error, warn};

use crate::{
    any::{AnyInstance, TypeInfo},
    errors::{FieldErrorKind, ResolveErrorKind},
    key::Key,
    scope::{Scope, ScopeInner},
};

type ComputeFn = Arc<dyn Fn(&Scope) -> Result<AnyInstance, ResolveErrorKind> + Send + Sync>;

#[derive(Clone)]
enum ResolutionKind {
    Key(&'static str),
    Computed(ComputeFn),
}

/// How a lazy field gets its value on first read
#[derive(Clone)]
pub struct Resolution {
    type_info: TypeInfo,
    kind: ResolutionKind,
}

impl Resolution {
    /// Resolves the key against the bound scope
    #[inline]
    #[must_use]
    pub fn key<T: Send + Sync + 'static>(key: &Key<T>) -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            kind: ResolutionKind::Key(key.name()),
        }
    }

    /// Calls the closure with the bound scope
    #[must_use]
    pub fn computed<T, F>(compute: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Scope) -> Result<T, ResolveErrorKind> + Send + Sync + 'static,
    {
        Self {
            type_info: TypeInfo::of::<T>(),
            kind: ResolutionKind::Computed(Arc::new(move |scope: &Scope| -> Result<AnyInstance, ResolveErrorKind> {
                let value = compute(scope)?;
                Ok(Arc::new(value))
            })),
        }
    }

    #[inline]
    #[must_use]
    pub const fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    #[inline]
    #[must_use]
    pub const fn is_computed(&self) -> bool {
        matches!(self.kind, ResolutionKind::Computed(_))
    }

    fn resolve(&self, scope: &Scope) -> Result<AnyInstance, ResolveErrorKind> {
        match &self.kind {
            ResolutionKind::Key(name) => scope.resolve_dyn(*name),
            ResolutionKind::Computed(compute) => {
                scope.ensure_active()?;
                compute(scope)
            }
        }
    }
}

impl Debug for Resolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ResolutionKind::Key(name) => f.debug_tuple("Key").field(name).finish(),
            ResolutionKind::Computed(_) => f.debug_tuple("Computed").field(&self.type_info.name).finish(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Descriptor {
    pub owner: &'static str,
    pub field: &'static str,
    pub resolution: Resolution,
}

/// Lazy fields declared for one owner key, at most one per field name
#[derive(Clone, Debug, Default)]
pub struct Descriptors {
    fields: BTreeMap<&'static str, Descriptor>,
}

pub(crate) static EMPTY_DESCRIPTORS: Descriptors = Descriptors { fields: BTreeMap::new() };

impl Descriptors {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: BTreeMap::new() }
    }

    /// Adds the descriptor, replacing and returning an earlier one for the same field
    #[inline]
    pub fn declare(&mut self, descriptor: Descriptor) -> Option<Descriptor> {
        self.fields.insert(descriptor.field, descriptor)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Descriptor> {
        self.fields.get(field)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.fields.values()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

struct Slot {
    resolution: Resolution,
    value: Mutex<Option<AnyInstance>>,
}

/// Lazy fields of one instance.
///
/// Bound to the scope the instance was constructed in. Each field is resolved on its
/// first read and the value is kept here, so later reads return the same `Arc`.
/// Fields are read-only: every write is rejected.
/// Only a weak reference to the scope is held, so an instance never keeps its scope alive.
pub struct Bindings {
    owner: &'static str,
    scope_label: String,
    scope: Weak<ScopeInner>,
    slots: BTreeMap<&'static str, Slot>,
}

impl Bindings {
    #[must_use]
    pub fn bind(owner: &'static str, descriptors: &Descriptors, scope: &Scope) -> Self {
        let slots = descriptors
            .iter()
            .map(|descriptor| {
                (
                    descriptor.field,
                    Slot {
                        resolution: descriptor.resolution.clone(),
                        value: Mutex::new(None),
                    },
                )
            })
            .collect();

        Self {
            owner,
            scope_label: scope.label().into(),
            scope: Arc::downgrade(&scope.inner),
            slots,
        }
    }

    /// Reads the field, resolving it on first access
    ///
    /// # Errors
    /// - [`ResolveErrorKind::UndeclaredField`] if the field isn't declared for the owner
    /// - [`ResolveErrorKind::UseAfterDispose`] if the bound scope is disposed or dropped
    /// - [`ResolveErrorKind::IncorrectType`] if the field holds another type
    /// - any error of resolving the field itself
    pub fn get<T: Send + Sync + 'static>(&self, field: &'static str) -> Result<Arc<T>, ResolveErrorKind> {
        let span = debug_span!("field", owner = self.owner, field);
        let _guard = span.enter();

        let Some(slot) = self.slots.get(field) else {
            let err = ResolveErrorKind::UndeclaredField { owner: self.owner, field };
            error!("{}", err);
            return Err(err);
        };

        let cached = slot.value.lock().clone();
        let value = match cached {
            Some(value) => {
                debug!("Found in field cache");
                value
            }
            None => {
                let Some(scope) = self.scope.upgrade().map(Scope::from_inner) else {
                    let err = ResolveErrorKind::UseAfterDispose {
                        scope: self.scope_label.clone(),
                    };
                    warn!("{}", err);
                    return Err(err);
                };
                let resolved = slot.resolution.resolve(&scope)?;

                debug!("Field resolved");

                // Another thread may have won the race, first value stays
                slot.value.lock().get_or_insert(resolved).clone()
            }
        };

        value.downcast::<T>().map_err(|_| {
            let err = ResolveErrorKind::IncorrectType {
                key: field,
                expected: type_name::<T>(),
                actual: slot.resolution.type_info().name,
            };
            error!("{}", err);
            err
        })
    }

    /// Fields can't be assigned, neither before nor after the first read
    ///
    /// # Errors
    /// Always [`FieldErrorKind::ReadOnlyField`]
    pub fn set<T>(&self, field: &'static str, _value: T) -> Result<(), FieldErrorKind> {
        let err = FieldErrorKind::ReadOnlyField { owner: self.owner, field };
        warn!("{}", err);
        Err(err)
    }

    #[inline]
    #[must_use]
    pub fn is_resolved(&self, field: &str) -> bool {
        self.slots.get(field).is_some_and(|slot| slot.value.lock().is_some())
    }

    #[inline]
    #[must_use]
    pub fn fields(&self) -> Vec<&'static str> {
        self.slots.keys().copied().collect()
    }

    #[inline]
    #[must_use]
    pub const fn owner(&self) -> &'static str {
        self.owner
    }

    /// Label of the scope the fields are bound to
    #[inline]
    #[must_use]
    pub fn scope_label(&self) -> &str {
        &self.scope_label
    }
}

impl Debug for Bindings {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("owner", &self.owner)
            .field("scope", &self.scope_label)
            .field("fields", &self.fields())
            .finish_non_exhaustive()
    }
}
