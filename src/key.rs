use core::fmt::{self, Display, Formatter};

use crate::any::TypeInfo;

/// Identifies a scoped value: a type with an optional qualifier.
///
/// Two keys are equal iff both their types and qualifiers are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeKey {
    type_info: TypeInfo,
    qualifier: Option<&'static str>,
}

impl ScopeKey {
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            qualifier: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn qualified<T: ?Sized + 'static>(qualifier: &'static str) -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            qualifier: Some(qualifier),
        }
    }

    #[inline]
    #[must_use]
    pub const fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    #[inline]
    #[must_use]
    pub const fn qualifier(&self) -> Option<&'static str> {
        self.qualifier
    }
}

impl Display for ScopeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.qualifier {
            Some(qualifier) => write!(f, "Key[type={}, qualifier={qualifier}]", self.type_info),
            None => write!(f, "Key[type={}, qualifier=[none]]", self.type_info),
        }
    }
}
