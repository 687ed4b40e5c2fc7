use crate::{
    any::{RcAny, TypeInfo},
    errors::InvokeErrorKind,
    message::Message,
};

/// Invokes the service method for a message.
pub trait Invoker: Send + Sync + 'static {
    /// # Errors
    /// Returns an error if the service method fails
    fn invoke(&self, message: &Message) -> anyhow::Result<Option<RcAny>>;

    /// Concrete type of the invoker, also behind `dyn Invoker`.
    #[must_use]
    fn type_info(&self) -> TypeInfo {
        TypeInfo::of::<Self>()
    }
}

/// Placeholder bound when no real invoker is configured. Do not use for actual invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInvoker;

impl Invoker for DefaultInvoker {
    fn invoke(&self, _message: &Message) -> anyhow::Result<Option<RcAny>> {
        Err(InvokeErrorKind::Unsupported.into())
    }
}

/// Checks whether `invoker` is the [`DefaultInvoker`] marker.
#[inline]
#[must_use]
pub fn is_default(invoker: &dyn Invoker) -> bool {
    invoker.type_info() == TypeInfo::of::<DefaultInvoker>()
}
