#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeErrorKind {
    #[error("Default invoker is a marker and can't be invoked. Configure a real invoker")]
    Unsupported,
}
