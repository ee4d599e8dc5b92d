use alloc::string::String;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ScopeErrorKind {
    #[error("Scope `{scope}` is disposed")]
    UseAfterDispose { scope: String },
}
