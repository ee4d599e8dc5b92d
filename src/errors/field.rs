#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FieldErrorKind {
    #[error("Field `{field}` of `{owner}` is lazily bound and read-only")]
    ReadOnlyField { owner: &'static str, field: &'static str },
}
