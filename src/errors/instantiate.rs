use alloc::boxed::Box;

use super::resolve::ResolveErrorKind;

/// Error returned by a factory.
///
/// A nested resolution failure keeps its own kind, so `?` on [`crate::Resolver::resolve`]
/// inside a factory surfaces the original [`ResolveErrorKind`] to the outer caller.
#[derive(thiserror::Error, Debug)]
pub enum InstantiateErrorKind {
    #[error(transparent)]
    Resolve(Box<ResolveErrorKind>),
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
}

impl From<ResolveErrorKind> for InstantiateErrorKind {
    fn from(err: ResolveErrorKind) -> Self {
        Self::Resolve(Box::new(err))
    }
}
