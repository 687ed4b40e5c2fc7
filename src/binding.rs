use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error};

use crate::{any::TypeInfo, errors::BindingErrorKind, key::ScopeKey, scope::RequestScope};

/// How a binding produces its value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindingTarget {
    /// Built by a constructor of the declaring type.
    Constructor { declaring: TypeInfo },
    /// Delegates to the binding of another key.
    LinkedKey { target: ScopeKey },
    /// Produced by a provider of the given type.
    Provider { provides: TypeInfo },
    /// Bound without a target: the key type is built as is.
    Untargetted,
    Other { description: String },
}

/// Scoping of a binding, as reported by the host binding system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scoping {
    Unscoped,
    NoScope,
    Singleton,
    EagerSingleton,
    /// Scoped with a scope instance, identified by its name.
    Instance(&'static str),
    /// Scoped with a scope annotation, identified by its name.
    Annotation(&'static str),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    pub key: ScopeKey,
    pub target: BindingTarget,
    pub scoping: Scoping,
}

impl Binding {
    #[inline]
    #[must_use]
    pub fn new(key: ScopeKey, target: BindingTarget, scoping: Scoping) -> Self {
        Self { key, target, scoping }
    }

    /// Concrete type the binding builds.
    ///
    /// # Errors
    /// - Returns [`BindingErrorKind::IncompatibleProvider`] if a provider doesn't provide the key type
    /// - Returns [`BindingErrorKind::UnresolvedTarget`] for targets of unknown kind
    pub fn actual_type(&self) -> Result<TypeInfo, BindingErrorKind> {
        match &self.target {
            BindingTarget::Constructor { declaring } => Ok(*declaring),
            BindingTarget::LinkedKey { target } => Ok(target.type_info()),
            BindingTarget::Provider { provides } => {
                if *provides == self.key.type_info() {
                    Ok(*provides)
                } else {
                    let err = BindingErrorKind::IncompatibleProvider {
                        key: self.key,
                        provides: *provides,
                    };
                    error!("{}", err);
                    Err(err)
                }
            }
            BindingTarget::Untargetted => Ok(self.key.type_info()),
            BindingTarget::Other { description } => {
                let err = BindingErrorKind::UnresolvedTarget {
                    key: self.key,
                    description: description.clone(),
                };
                error!("{}", err);
                Err(err)
            }
        }
    }
}

/// Binding resolution service of the host binding system.
pub trait Bindings {
    #[must_use]
    fn binding(&self, key: &ScopeKey) -> Option<&Binding>;

    /// Resolves a scope annotation to the name of the scope instance bound to it.
    #[must_use]
    fn scope_annotation(&self, annotation: &str) -> Option<&'static str>;
}

#[derive(Clone, Debug)]
pub struct BindingMap {
    bindings: BTreeMap<ScopeKey, Binding>,
    scope_annotations: BTreeMap<&'static str, &'static str>,
}

impl Default for BindingMap {
    fn default() -> Self {
        Self::new()
    }
}

impl BindingMap {
    /// Creates bindings with the request scope annotation bound to the request scope.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: BTreeMap::new(),
            scope_annotations: BTreeMap::from([(RequestScope::ANNOTATION, RequestScope::NAME)]),
        }
    }

    #[inline]
    #[must_use]
    pub fn bind(mut self, binding: Binding) -> Self {
        self.bindings.insert(binding.key, binding);
        self
    }

    #[inline]
    #[must_use]
    pub fn bind_scope(mut self, annotation: &'static str, scope: &'static str) -> Self {
        self.scope_annotations.insert(annotation, scope);
        self
    }
}

impl Bindings for BindingMap {
    #[inline]
    fn binding(&self, key: &ScopeKey) -> Option<&Binding> {
        self.bindings.get(key)
    }

    #[inline]
    fn scope_annotation(&self, annotation: &str) -> Option<&'static str> {
        self.scope_annotations.get(annotation).copied()
    }
}

/// Looks up the concrete type and scoping that satisfy `key`.
///
/// # Errors
/// - Returns [`BindingErrorKind::NoBinding`] if `key` isn't bound
/// - See [`Binding::actual_type`]
pub fn resolve_binding_target<B: Bindings + ?Sized>(bindings: &B, key: &ScopeKey) -> Result<(TypeInfo, Scoping), BindingErrorKind> {
    let Some(binding) = bindings.binding(key) else {
        let err = BindingErrorKind::NoBinding { key: *key };
        error!("{}", err);
        return Err(err);
    };
    let actual_type = binding.actual_type()?;
    debug!(%key, actual_type = actual_type.name, scoping = ?binding.scoping, "Binding target resolved");
    Ok((actual_type, binding.scoping))
}

/// Checks whether `binding` is request-scoped.
/// Linked key bindings are followed through `bindings`, so a link to a request-scoped binding is request-scoped too.
///
/// # Errors
/// Returns [`BindingErrorKind::CyclicLink`] if linked keys form a cycle
pub fn is_request_scoped<B: Bindings + ?Sized>(binding: &Binding, bindings: &B) -> Result<bool, BindingErrorKind> {
    let mut visited = BTreeSet::new();
    let mut binding = binding;
    loop {
        if !visited.insert(binding.key) {
            let err = BindingErrorKind::CyclicLink { key: binding.key };
            error!("{}", err);
            return Err(err);
        }

        let scoped = match binding.scoping {
            Scoping::Instance(name) => name == RequestScope::NAME,
            Scoping::Annotation(annotation) => bindings.scope_annotation(annotation) == Some(RequestScope::NAME),
            Scoping::Unscoped | Scoping::NoScope | Scoping::Singleton | Scoping::EagerSingleton => false,
        };
        if scoped {
            return Ok(true);
        }

        match &binding.target {
            BindingTarget::LinkedKey { target } => match bindings.binding(target) {
                Some(linked) => binding = linked,
                None => return Ok(false),
            },
            _ => return Ok(false),
        }
    }
}
