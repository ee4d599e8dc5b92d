use alloc::{string::String, vec::Vec};

use super::instantiate::InstantiateErrorKind;

#[derive(thiserror::Error, Debug)]
pub enum ResolveErrorKind {
    #[error("Key `{key}` not registered")]
    NotRegistered { key: &'static str },
    #[error("Circular dependency detected: {}", .path.join(" -> "))]
    CircularDependency { path: Vec<&'static str> },
    #[error("Key `{key}` is explicit-only, but no explicit instance found from scope `{scope}` up to the root")]
    NoExplicitInstance { key: &'static str, scope: String },
    #[error("Scope `{scope}` is disposed")]
    UseAfterDispose { scope: String },
    #[error("Incorrect type for key `{key}`. Actual: {actual}, expected: {expected}")]
    IncorrectType {
        key: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("Field `{field}` isn't declared for `{owner}`")]
    UndeclaredField { owner: &'static str, field: &'static str },
    #[error(transparent)]
    Instantiate(InstantiateErrorKind),
}
