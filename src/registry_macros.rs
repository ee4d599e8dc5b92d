/// Builds a [`crate::Registry`] from a list of entries.
///
/// ```
/// use nestdi::{registry, Key, Resolution};
/// use std::sync::Arc;
///
/// struct Config {
///     port: u16,
/// }
/// struct Request;
/// struct Handler;
///
/// const CONFIG: Key<Config> = Key::new("config");
/// const REQUEST: Key<Request> = Key::new("request");
/// const HANDLER: Key<Handler> = Key::new("handler");
///
/// let registry = registry! {
///     singleton(CONFIG, |_| Ok(Config { port: 8080 }), finalizer = |_: Arc<Config>| Ok(())),
///     explicit(REQUEST),
///     scoped(HANDLER, |_| Ok(Handler)),
///     declare(HANDLER, "config", Resolution::key(&CONFIG)),
/// }
/// .unwrap();
///
/// assert_eq!(registry.len(), 3);
/// ```
#[macro_export]
macro_rules! registry {
    ( $( $entries:tt )* ) => {
        $crate::registry_internal!(@entries ($crate::RegistryBuilder::new()) [ $($entries)* ])
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! registry_internal {
    // === Base case ===
    // Example: registry_internal!(@entries (builder) [])
    (@entries ($($builder:tt)*) []) => {
        $($builder)*.build()
    };

    // === Lazy field ===
    // Example: registry_internal!(@entries (builder) [ declare(HANDLER, "config", Resolution::key(&CONFIG)) ])
    (@entries ($($builder:tt)*) [ declare ( $owner:expr, $field:expr, $resolution:expr $(,)? ) $(, $($rest:tt)*)? ]) => {
        $crate::registry_internal!(@entries ($($builder)*.declare(&$owner, $field, $resolution)) [ $($($rest)*)? ])
    };

    // === Explicit-only key ===
    // Example: registry_internal!(@entries (builder) [ explicit(REQUEST) ])
    (@entries ($($builder:tt)*) [ explicit ( $key:expr $(,)? ) $(, $($rest:tt)*)? ]) => {
        $crate::registry_internal!(@entries ($($builder)*.explicit(&$key)) [ $($($rest)*)? ])
    };

    // === Entry with finalizer ===
    // Example: registry_internal!(@entries (builder) [ singleton(CONFIG, inst, finalizer = fin) ])
    (@entries ($($builder:tt)*) [ $lifetime:ident ( $key:expr, $inst:expr, finalizer = $fin:expr $(,)? ) $(, $($rest:tt)*)? ]) => {
        $crate::registry_internal!(
            @entries ($($builder)*.$lifetime(&$key, $inst).add_finalizer(&$key, $fin)) [ $($($rest)*)? ]
        )
    };

    // === Entry with async finalizer ===
    // Example: registry_internal!(@entries (builder) [ scoped(POOL, inst, async_finalizer = fin) ])
    (@entries ($($builder:tt)*) [ $lifetime:ident ( $key:expr, $inst:expr, async_finalizer = $fin:expr $(,)? ) $(, $($rest:tt)*)? ]) => {
        $crate::registry_internal!(
            @entries ($($builder)*.$lifetime(&$key, $inst).add_async_finalizer(&$key, $fin)) [ $($($rest)*)? ]
        )
    };

    // === Entry with no options ===
    // Example: registry_internal!(@entries (builder) [ transient(ID, inst) ])
    (@entries ($($builder:tt)*) [ $lifetime:ident ( $key:expr, $inst:expr $(,)? ) $(, $($rest:tt)*)? ]) => {
        $crate::registry_internal!(@entries ($($builder)*.$lifetime(&$key, $inst)) [ $($($rest)*)? ])
    };
}
