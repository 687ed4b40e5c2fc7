mod binding;
mod fault;
mod instantiate;
mod invoke;
mod resolve;
mod scope;

pub use binding::BindingErrorKind;
pub use fault::Fault;
pub use instantiate::InstantiateErrorKind;
pub use invoke::InvokeErrorKind;
pub use resolve::ResolveErrorKind;
pub use scope::{SeedErrorKind, StateErrorKind};
