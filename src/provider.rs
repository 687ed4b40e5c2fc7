use std::sync::Arc;

use crate::errors::ResolveErrorKind;

/// Value produced by a creator.
pub enum Provided<T> {
    Instance(Arc<T>),
    /// The creator legitimately has nothing to provide.
    Null,
    /// Placeholder used to break a dependency cycle. Returned to the caller but never cached.
    CircularProxy(Arc<T>),
}

impl<T> Provided<T> {
    #[inline]
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::Instance(Arc::new(value))
    }

    #[inline]
    #[must_use]
    pub fn from_option(value: Option<T>) -> Self {
        value.map_or(Self::Null, Self::new)
    }

    #[inline]
    #[must_use]
    pub fn is_circular_proxy(&self) -> bool {
        matches!(self, Self::CircularProxy(_))
    }

    #[inline]
    #[must_use]
    pub fn into_option(self) -> Option<Arc<T>> {
        match self {
            Self::Instance(value) | Self::CircularProxy(value) => Some(value),
            Self::Null => None,
        }
    }
}

impl<T> Clone for Provided<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Instance(value) => Self::Instance(value.clone()),
            Self::Null => Self::Null,
            Self::CircularProxy(value) => Self::CircularProxy(value.clone()),
        }
    }
}

/// Source of values handed to the host binding system.
pub trait Provider<T>: Send + Sync {
    /// # Errors
    /// Returns an error if the value can't be provided in the current context
    fn get(&self) -> Result<Option<Arc<T>>, ResolveErrorKind>;
}

impl<T, F> Provider<T> for F
where
    F: Fn() -> Result<Option<Arc<T>>, ResolveErrorKind> + Send + Sync,
{
    #[inline]
    fn get(&self) -> Result<Option<Arc<T>>, ResolveErrorKind> {
        self()
    }
}
