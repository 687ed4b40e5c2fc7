use std::collections::BTreeSet;

use crate::{key::ScopeKey, message::Message};

/// Config for a request scope
/// ## Fields
/// - `intrinsic_keys`:
///   Keys whose values are tied to the live request itself.
///   While a request context is bound they are never cached: the creator is invoked on every resolve.
///
///   Defaults to the key of [`Message`].
#[derive(Clone, Debug)]
pub struct Config {
    pub intrinsic_keys: BTreeSet<ScopeKey>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            intrinsic_keys: BTreeSet::from([ScopeKey::of::<Message>()]),
        }
    }
}

impl Config {
    #[inline]
    #[must_use]
    pub fn with_intrinsic_key(mut self, key: ScopeKey) -> Self {
        self.intrinsic_keys.insert(key);
        self
    }

    #[inline]
    #[must_use]
    pub fn is_intrinsic(&self, key: &ScopeKey) -> bool {
        self.intrinsic_keys.contains(key)
    }
}
