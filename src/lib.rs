#![no_std]

extern crate alloc;

#[macro_use]
pub(crate) mod registry_macros;

pub(crate) mod any;
pub(crate) mod cache;
pub(crate) mod context;
pub(crate) mod descriptor;
pub(crate) mod dispose;
pub(crate) mod errors;
pub(crate) mod finalizer;
pub(crate) mod instantiator;
pub(crate) mod key;
pub(crate) mod lifetime;
pub(crate) mod lock;
pub(crate) mod registry;
pub(crate) mod resolver;
pub(crate) mod scope;
pub(crate) mod utils;

pub use any::{AnyInstance, TypeInfo};
pub use context::Context;
pub use descriptor::{Bindings, Descriptor, Descriptors, Resolution};
pub use errors::{
    DisposeErrorKind, FieldErrorKind, FinalizeErrorKind, InstantiateErrorKind, InstantiateResult, Rejection, RegistryErrorKind,
    ResolveErrorKind, ScopeErrorKind,
};
pub use finalizer::{AsyncDispose, AsyncFinalizer, Dispose, Finalizer};
pub use instantiator::{instance, Instantiator};
pub use key::Key;
pub use lifetime::Lifetime;
pub use registry::{Registry, RegistryBuilder};
pub use resolver::Resolver;
pub use scope::{ChildScopeBuilder, Scope};
