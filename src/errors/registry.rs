use crate::lifetime::Lifetime;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RegistryErrorKind {
    #[error("Key `{key}` already registered as {registered}, can't register it as {attempted}")]
    LifetimeConflict {
        key: &'static str,
        registered: Lifetime,
        attempted: Lifetime,
    },
    #[error("Key `{key}` already registered for `{registered}`, can't register it for `{attempted}`")]
    TypeConflict {
        key: &'static str,
        registered: &'static str,
        attempted: &'static str,
    },
    #[error("Finalizer for key `{key}` can't be added, because {lifetime} instances aren't owned by any scope")]
    FinalizerNotApplicable { key: &'static str, lifetime: Lifetime },
    #[error("Finalizer for key `{key}` added, but the key isn't registered")]
    FinalizerWithoutRegistration { key: &'static str },
    #[error("Field `{field}` declared for `{owner}`, but the owner isn't registered")]
    DescriptorWithoutOwner { owner: &'static str, field: &'static str },
}
