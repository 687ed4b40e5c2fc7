use std::sync::Arc;
use tracing::{debug, error};

use crate::{any::TypeInfo, errors::ResolveErrorKind, message::Message, provider::Provider};

/// Supplies resource instances to the server for each message.
pub trait ResourceProvider: Send + Sync {
    type Resource;

    /// # Errors
    /// Returns an error if the resource can't be provided
    fn instance(&self, message: &Message) -> Result<Arc<Self::Resource>, ResolveErrorKind>;

    fn release_instance(&self, message: &Message, instance: Arc<Self::Resource>);

    #[must_use]
    fn resource_type(&self) -> TypeInfo;

    #[must_use]
    fn is_singleton(&self) -> bool;
}

/// Asks its provider for the resource on every message.
///
/// Backed by a request-scoped provider it yields one instance per request.
pub struct PerRequestResourceProvider<T, P> {
    provider: P,
    resource_type: TypeInfo,
    _resource: core::marker::PhantomData<fn() -> T>,
}

impl<T: 'static, P: Provider<T>> PerRequestResourceProvider<T, P> {
    #[inline]
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            resource_type: TypeInfo::of::<T>(),
            _resource: core::marker::PhantomData,
        }
    }
}

impl<T: 'static, P: Provider<T>> ResourceProvider for PerRequestResourceProvider<T, P> {
    type Resource = T;

    fn instance(&self, message: &Message) -> Result<Arc<T>, ResolveErrorKind> {
        match self.provider.get()? {
            Some(instance) => {
                debug!(message = message.id(), resource = self.resource_type.name, "Resource provided");
                Ok(instance)
            }
            None => {
                let err = ResolveErrorKind::Instantiate(anyhow::anyhow!("Provider of {} returned no resource", self.resource_type).into());
                error!("{}", err);
                Err(err)
            }
        }
    }

    fn release_instance(&self, _message: &Message, _instance: Arc<T>) {}

    fn resource_type(&self) -> TypeInfo {
        self.resource_type
    }

    fn is_singleton(&self) -> bool {
        false
    }
}
