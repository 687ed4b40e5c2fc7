use super::{instantiate::InstantiateErrorKind, scope::StateErrorKind};
use crate::{any::TypeInfo, key::ScopeKey};

#[derive(thiserror::Error, Debug)]
pub enum ResolveErrorKind {
    #[error(
        "\
        Cannot access scoped object {key}. \
        Either we are not currently inside a request, \
        or you may have forgotten to apply `ScopeInterceptor` as an interceptor for this request. \
        Outside of a request use `RequestScope::scope_request`.\
        "
    )]
    OutOfScope { key: ScopeKey },
    #[error("Incorrect cached type for {key}. Expected: {expected}")]
    IncorrectType { key: ScopeKey, expected: TypeInfo },
    #[error(transparent)]
    State(#[from] StateErrorKind),
    #[error(transparent)]
    Instantiate(#[from] InstantiateErrorKind),
}
