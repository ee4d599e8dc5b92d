use alloc::{boxed::Box, sync::Arc, vec::Vec};
use core::{mem, ptr};
use tracing::{debug, debug_span, error, Instrument as _};

use crate::{
    cache::{Cache, Resolved},
    context::Context,
    errors::{DisposeErrorKind, FinalizeErrorKind, Rejection},
    finalizer::BoxedFinalizer,
    scope::ScopeInner,
    utils::future::BoxFuture,
};

/// What a scope still owns once it's flagged as disposed
struct Teardown {
    children: Vec<Arc<ScopeInner>>,
    cache: Cache,
    /// Released without finalization, the caller owns explicit instances
    _explicit: Context,
}

impl ScopeInner {
    /// Flips the disposed flag. Returns `None` if the scope is already disposed.
    fn begin_dispose(&self) -> Option<Teardown> {
        let mut state = self.state.lock();
        if state.disposed {
            return None;
        }
        state.disposed = true;

        Some(Teardown {
            children: mem::take(&mut state.children),
            cache: mem::take(&mut state.cache),
            _explicit: mem::take(&mut state.explicit),
        })
    }

    fn finish_dispose(&self) {
        if let Some(parent) = self.parent() {
            parent
                .state
                .lock()
                .children
                .retain(|child| !ptr::eq(Arc::as_ptr(child), self));
            debug!("Detached from parent");
        }
    }
}

fn record(rejections: &mut Vec<Rejection>, scope: &ScopeInner, key: &'static str, result: Result<(), FinalizeErrorKind>) {
    match result {
        Ok(()) => debug!(key, "Finalizer called"),
        Err(source) => {
            let rejection = Rejection {
                scope: scope.label.clone(),
                key,
                source,
            };
            error!("{}", rejection);
            rejections.push(rejection);
        }
    }
}

fn aggregate(rejections: Vec<Rejection>) -> Result<(), DisposeErrorKind> {
    if rejections.is_empty() {
        Ok(())
    } else {
        Err(DisposeErrorKind::Aggregated { rejections })
    }
}

pub(crate) fn dispose(scope: &ScopeInner) -> Result<(), DisposeErrorKind> {
    let span = debug_span!("dispose", scope = %scope.label);
    let _guard = span.enter();

    let Some(Teardown { children, mut cache, .. }) = scope.begin_dispose() else {
        debug!("Already disposed");
        return Ok(());
    };

    let mut rejections = Vec::new();
    for child in children {
        if let Err(err) = dispose(&child) {
            rejections.extend(err.into_rejections());
        }
        debug!(child = %child.label, "Child scope disposed");
    }

    for Resolved { key, instance, finalizer } in cache.take_resolved_set().0.into_iter().rev() {
        let result = match finalizer {
            BoxedFinalizer::Sync(finalizer) => finalizer(instance).map_err(FinalizeErrorKind::Failed),
            BoxedFinalizer::Async(_) => Err(FinalizeErrorKind::RequiresAsync),
        };
        record(&mut rejections, scope, key, result);
    }

    scope.finish_dispose();
    aggregate(rejections)
}

pub(crate) fn dispose_async(scope: Arc<ScopeInner>) -> BoxFuture<'static, Result<(), DisposeErrorKind>> {
    let span = debug_span!("dispose_async", scope = %scope.label);

    Box::pin(
        async move {
            let Some(Teardown { children, mut cache, .. }) = scope.begin_dispose() else {
                debug!("Already disposed");
                return Ok(());
            };

            let mut rejections = Vec::new();
            for child in children {
                let label = child.label.clone();
                if let Err(err) = dispose_async(child).await {
                    rejections.extend(err.into_rejections());
                }
                debug!(child = %label, "Child scope disposed");
            }

            for Resolved { key, instance, finalizer } in cache.take_resolved_set().0.into_iter().rev() {
                let result = match finalizer {
                    BoxedFinalizer::Sync(finalizer) => finalizer(instance),
                    BoxedFinalizer::Async(finalizer) => finalizer(instance).await,
                };
                record(&mut rejections, &scope, key, result.map_err(FinalizeErrorKind::Failed));
            }

            scope.finish_dispose();
            aggregate(rejections)
        }
        .instrument(span),
    )
}

pub(crate) fn dispose_instance(scope: &ScopeInner, key: &'static str) -> Result<bool, DisposeErrorKind> {
    let span = debug_span!("dispose_instance", key, scope = %scope.label);
    let _guard = span.enter();

    let removed = {
        let mut state = scope.state.lock();
        if state.cache.finalizer(key).is_some_and(BoxedFinalizer::is_async) {
            drop(state);

            let mut rejections = Vec::new();
            record(&mut rejections, scope, key, Err(FinalizeErrorKind::RequiresAsync));
            return aggregate(rejections).map(|()| false);
        }
        state.cache.remove(key)
    };
    let Some((instance, finalizer)) = removed else {
        debug!("Not cached");
        return Ok(false);
    };

    let mut rejections = Vec::new();
    if let Some(BoxedFinalizer::Sync(finalizer)) = finalizer {
        record(&mut rejections, scope, key, finalizer(instance).map_err(FinalizeErrorKind::Failed));
    }
    aggregate(rejections).map(|()| true)
}

pub(crate) fn dispose_instance_async(scope: Arc<ScopeInner>, key: &'static str) -> BoxFuture<'static, Result<bool, DisposeErrorKind>> {
    let span = debug_span!("dispose_instance_async", key, scope = %scope.label);

    Box::pin(
        async move {
            let removed = scope.state.lock().cache.remove(key);
            let Some((instance, finalizer)) = removed else {
                debug!("Not cached");
                return Ok(false);
            };

            let result = match finalizer {
                None => Ok(()),
                Some(BoxedFinalizer::Sync(finalizer)) => finalizer(instance),
                Some(BoxedFinalizer::Async(finalizer)) => finalizer(instance).await,
            };

            let mut rejections = Vec::new();
            record(&mut rejections, &scope, key, result.map_err(FinalizeErrorKind::Failed));
            aggregate(rejections).map(|()| true)
        }
        .instrument(span),
    )
}

#[cfg(test)]
mod tests {
    extern crate std;

    use crate::{FinalizeErrorKind, Key, Registry, Scope};

    use alloc::{
        format,
        string::{String, ToString as _},
        sync::Arc,
        vec,
        vec::Vec,
    };
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    struct Pool;
    struct Connection;

    const POOL: Key<Pool> = Key::new("pool");
    const CONNECTION: Key<Connection> = Key::new("connection");

    fn registry(order: Arc<Mutex<Vec<&'static str>>>) -> Registry {
        Registry::builder()
            .singleton(&POOL, |_| Ok(Pool))
            .add_finalizer(&POOL, {
                let order = order.clone();
                move |_: Arc<Pool>| -> anyhow::Result<()> {
                    order.lock().push("pool");
                    Ok(())
                }
            })
            .scoped(&CONNECTION, |resolver| {
                resolver.resolve(&POOL)?;
                Ok(Connection)
            })
            .add_finalizer(&CONNECTION, move |_: Arc<Connection>| {
                order.lock().push("connection");
                Ok(())
            })
            .build()
            .unwrap()
    }

    #[test]
    #[traced_test]
    fn test_lifo_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let root = Scope::new(registry(order.clone()));

        root.resolve(&CONNECTION).unwrap();
        root.dispose().unwrap();

        assert_eq!(*order.lock(), vec!["connection", "pool"]);
        assert!(root.cached_keys().is_empty());
    }

    #[test]
    #[traced_test]
    fn test_children_before_parent() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let root = Scope::new(registry(order.clone()));
        let child = root.create_child("child").unwrap();

        child.resolve(&CONNECTION).unwrap();
        root.dispose().unwrap();

        assert_eq!(*order.lock(), vec!["connection", "pool"]);
        assert!(child.is_disposed());
    }

    #[test]
    #[traced_test]
    fn test_idempotent() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let root = Scope::new(registry(order.clone()));

        root.resolve(&POOL).unwrap();
        root.dispose().unwrap();
        root.dispose().unwrap();
        drop(root);

        assert_eq!(*order.lock(), vec!["pool"]);
    }

    #[test]
    #[traced_test]
    fn test_dispose_on_drop() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let root = Scope::new(registry(order.clone()));
        let child = root.create_child("child").unwrap();

        child.resolve(&CONNECTION).unwrap();
        drop(child);

        assert!(order.lock().is_empty());

        drop(root);

        assert_eq!(*order.lock(), vec!["connection", "pool"]);
    }

    #[test]
    #[traced_test]
    fn test_dispose_instance_once() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let root = Scope::new(registry(order.clone()));

        root.resolve(&CONNECTION).unwrap();

        assert!(root.dispose_instance(&CONNECTION).unwrap());
        assert!(!root.dispose_instance(&CONNECTION).unwrap());

        root.dispose().unwrap();

        assert_eq!(*order.lock(), vec!["connection", "pool"]);
    }

    #[test]
    #[traced_test]
    fn test_async_finalizer_in_sync_dispose() {
        let root = Scope::new(
            Registry::builder()
                .scoped(&POOL, |_| Ok(Pool))
                .add_async_finalizer(&POOL, |_: Arc<Pool>| async { Ok::<_, anyhow::Error>(()) })
                .build()
                .unwrap(),
        );

        root.resolve(&POOL).unwrap();

        let err = root.dispose_instance(&POOL).unwrap_err();
        assert!(matches!(err.rejections()[0].source, FinalizeErrorKind::RequiresAsync));
        assert_eq!(root.cached_keys(), ["pool"]);

        let err = root.dispose().unwrap_err();
        let rejections = err.into_rejections();

        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].key, "pool");
        assert_eq!(rejections[0].scope, "root");
        assert!(matches!(rejections[0].source, FinalizeErrorKind::RequiresAsync));
    }
}
