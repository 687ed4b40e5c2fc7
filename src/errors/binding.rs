use crate::{any::TypeInfo, key::ScopeKey};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingErrorKind {
    #[error("Binding not found for {key}")]
    NoBinding { key: ScopeKey },
    #[error("Unable to resolve target type for {key}: {description}")]
    UnresolvedTarget { key: ScopeKey, description: String },
    #[error("Provider for {key} provides {provides}, which is not the key type")]
    IncompatibleProvider { key: ScopeKey, provides: TypeInfo },
    #[error("Linked bindings form a cycle at {key}")]
    CyclicLink { key: ScopeKey },
}
