mod dispose;
mod field;
mod instantiate;
mod registry;
mod resolve;
mod scope;

pub use dispose::{DisposeErrorKind, FinalizeErrorKind, Rejection};
pub use field::FieldErrorKind;
pub use instantiate::InstantiateErrorKind;
pub use registry::RegistryErrorKind;
pub use resolve::ResolveErrorKind;
pub use scope::ScopeErrorKind;

pub type InstantiateResult<T> = Result<T, InstantiateErrorKind>;
