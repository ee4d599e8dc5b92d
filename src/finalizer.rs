use alloc::{boxed::Box, sync::Arc};
use core::{any::type_name, future::Future};

use crate::{any::AnyInstance, utils::future::BoxFuture};

/// Dispose hook of a cached instance.
///
/// Called once, when the scope owning the instance is disposed or when the instance is
/// disposed early with [`crate::Scope::dispose_instance`].
/// Closures `Fn(Arc<Dep>) -> anyhow::Result<()>` implement it.
pub trait Finalizer<Dep>: Send + Sync + 'static {
    fn finalize(&self, dependency: Arc<Dep>) -> anyhow::Result<()>;
}

impl<F, Dep> Finalizer<Dep> for F
where
    F: Fn(Arc<Dep>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    #[inline]
    fn finalize(&self, dependency: Arc<Dep>) -> anyhow::Result<()> {
        self(dependency)
    }
}

/// Async dispose hook of a cached instance.
///
/// Only async disposal ([`crate::Scope::dispose_async`]) runs it.
pub trait AsyncFinalizer<Dep>: Send + Sync + 'static {
    fn finalize(&self, dependency: Arc<Dep>) -> impl Future<Output = anyhow::Result<()>> + Send + 'static;
}

impl<F, Fut, Dep> AsyncFinalizer<Dep> for F
where
    F: Fn(Arc<Dep>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    #[inline]
    fn finalize(&self, dependency: Arc<Dep>) -> impl Future<Output = anyhow::Result<()>> + Send + 'static {
        self(dependency)
    }
}

/// Dispose hook implemented by the instance type itself
pub trait Dispose: Send + Sync + 'static {
    fn dispose(&self) -> anyhow::Result<()>;
}

/// Async dispose hook implemented by the instance type itself
pub trait AsyncDispose: Send + Sync + 'static {
    fn dispose(&self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

pub(crate) type SyncFinalizerFn = Arc<dyn Fn(AnyInstance) -> anyhow::Result<()> + Send + Sync>;
pub(crate) type AsyncFinalizerFn = Arc<dyn Fn(AnyInstance) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum BoxedFinalizer {
    Sync(SyncFinalizerFn),
    Async(AsyncFinalizerFn),
}

impl BoxedFinalizer {
    #[inline]
    #[must_use]
    pub(crate) const fn is_async(&self) -> bool {
        matches!(self, BoxedFinalizer::Async(_))
    }
}

fn downcast_error<Dep>() -> anyhow::Error {
    anyhow::anyhow!("Failed to downcast instance to `{}` in finalizer", type_name::<Dep>())
}

#[must_use]
pub(crate) fn boxed_finalizer<Dep, Fin>(finalizer: Fin) -> BoxedFinalizer
where
    Dep: Send + Sync + 'static,
    Fin: Finalizer<Dep>,
{
    BoxedFinalizer::Sync(Arc::new(move |dependency: AnyInstance| {
        let dependency = dependency.downcast::<Dep>().map_err(|_| downcast_error::<Dep>())?;
        finalizer.finalize(dependency)
    }))
}

#[must_use]
pub(crate) fn boxed_async_finalizer<Dep, Fin>(finalizer: Fin) -> BoxedFinalizer
where
    Dep: Send + Sync + 'static,
    Fin: AsyncFinalizer<Dep>,
{
    BoxedFinalizer::Async(Arc::new(move |dependency: AnyInstance| -> BoxFuture<'static, anyhow::Result<()>> {
        match dependency.downcast::<Dep>() {
            Ok(dependency) => Box::pin(finalizer.finalize(dependency)),
            Err(_) => Box::pin(async { Err::<(), _>(downcast_error::<Dep>()) }),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::{boxed_finalizer, BoxedFinalizer};
    use crate::any::AnyInstance;

    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicU8, Ordering};

    struct Connection;

    #[test]
    fn test_boxed_finalizer_downcasts() {
        let call_count = Arc::new(AtomicU8::new(0));

        let finalizer = boxed_finalizer({
            let call_count = call_count.clone();
            move |_: Arc<Connection>| -> anyhow::Result<()> {
                call_count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let BoxedFinalizer::Sync(finalizer) = finalizer else {
            panic!("sync finalizer expected");
        };

        let connection: AnyInstance = Arc::new(Connection);
        let not_connection: AnyInstance = Arc::new(0u8);

        assert!(finalizer(connection).is_ok());
        assert!(finalizer(not_connection).is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }
}
