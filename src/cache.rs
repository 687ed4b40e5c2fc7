use std::{collections::BTreeMap, sync::Arc};

use crate::{any::RcAny, key::ScopeKey};

/// Cache entry. A missing entry means "not computed yet".
#[derive(Clone, Debug)]
pub(crate) enum Cached {
    /// The creator provided no value.
    Null,
    Value(RcAny),
}

impl Cached {
    #[inline]
    #[must_use]
    pub(crate) fn from_option(value: Option<RcAny>) -> Self {
        value.map_or(Self::Null, Self::Value)
    }
}

pub(crate) type Map = BTreeMap<ScopeKey, Cached>;

/// Result of looking a key up in a cache.
pub(crate) enum Lookup<T> {
    Missing,
    Hit(Option<Arc<T>>),
    IncorrectType,
}

#[must_use]
pub(crate) fn lookup<T: Send + Sync + 'static>(map: &Map, key: &ScopeKey) -> Lookup<T> {
    match map.get(key) {
        None => Lookup::Missing,
        Some(Cached::Null) => Lookup::Hit(None),
        Some(Cached::Value(value)) => match value.clone().downcast::<T>() {
            Ok(value) => Lookup::Hit(Some(value)),
            Err(_) => Lookup::IncorrectType,
        },
    }
}
