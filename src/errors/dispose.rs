use alloc::{string::String, vec::Vec};

#[derive(thiserror::Error, Debug)]
pub enum FinalizeErrorKind {
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
    #[error("Finalizer is async, the instance can only be finalized by async disposal")]
    RequiresAsync,
}

/// A single failure collected during disposal
#[derive(thiserror::Error, Debug)]
#[error("Finalizer of `{key}` in scope `{scope}` failed: {source}")]
pub struct Rejection {
    pub scope: String,
    pub key: &'static str,
    pub source: FinalizeErrorKind,
}

#[derive(thiserror::Error, Debug)]
pub enum DisposeErrorKind {
    /// Every failure of a disposal cascade, children first, in the order they happened
    #[error("Disposal finished with {} failed finalizer(s)", .rejections.len())]
    Aggregated { rejections: Vec<Rejection> },
}

impl DisposeErrorKind {
    #[inline]
    #[must_use]
    pub fn rejections(&self) -> &[Rejection] {
        match self {
            DisposeErrorKind::Aggregated { rejections } => rejections,
        }
    }

    #[inline]
    #[must_use]
    pub fn into_rejections(self) -> Vec<Rejection> {
        match self {
            DisposeErrorKind::Aggregated { rejections } => rejections,
        }
    }
}
