use alloc::sync::Arc;
use tracing::debug;

use crate::{any::AnyInstance, errors::InstantiateErrorKind, resolver::Resolver};

/// Factory of a registered key.
///
/// Gets the [`Resolver`] of the scope that requested the instance,
/// closures `Fn(&Resolver) -> Result<T, InstantiateErrorKind>` implement it.
pub trait Instantiator<T>: Send + Sync + 'static {
    fn instantiate(&self, resolver: &Resolver<'_>) -> Result<T, InstantiateErrorKind>;
}

impl<F, T> Instantiator<T> for F
where
    F: Fn(&Resolver<'_>) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
{
    #[inline]
    fn instantiate(&self, resolver: &Resolver<'_>) -> Result<T, InstantiateErrorKind> {
        self(resolver)
    }
}

pub(crate) type BoxedInstantiator = Arc<dyn Fn(&Resolver<'_>) -> Result<AnyInstance, InstantiateErrorKind> + Send + Sync>;

#[must_use]
pub(crate) fn boxed_instantiator<T, Inst>(instantiator: Inst) -> BoxedInstantiator
where
    T: Send + Sync + 'static,
    Inst: Instantiator<T>,
{
    Arc::new(move |resolver: &Resolver<'_>| -> Result<AnyInstance, InstantiateErrorKind> {
        let instance = instantiator.instantiate(resolver)?;

        debug!("Instantiated");

        Ok(Arc::new(instance))
    })
}

/// Factory that hands out clones of a ready value
#[inline]
#[must_use]
pub fn instance<T>(value: T) -> impl Fn(&Resolver<'_>) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static
where
    T: Clone + Send + Sync + 'static,
{
    move |_: &Resolver<'_>| Ok(value.clone())
}
