//! Runtime symbol tables.
//!
//! A [`Scope`] is a cheap handle to a table of bindings plus a link to its
//! enclosing scope. Lookups walk outward; declarations only ever touch the
//! innermost table. The chain is rooted at the frozen universe scope holding
//! the predefined constants and built-in steps.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScopeError {
    #[error("identifier {0} already declared in this scope")]
    AlreadyDeclared(String),
    #[error("identifier {0} does not exist")]
    Undefined(String),
    #[error("cannot assign to predefined identifier {0}")]
    ReadOnly(String),
}

type Extension = Arc<dyn Any + Send + Sync>;

struct ScopeData {
    bindings: RwLock<IndexMap<String, Value>>,
    outer: Option<Scope>,
    frozen: AtomicBool,
    extensions: RwLock<HashMap<TypeId, Extension>>,
}

#[derive(Clone)]
pub struct Scope(Arc<ScopeData>);

impl Scope {
    /// A root scope with no outer link.
    pub fn new() -> Self {
        Scope::with_outer(None)
    }

    fn with_outer(outer: Option<Scope>) -> Self {
        Scope(Arc::new(ScopeData {
            bindings: RwLock::new(IndexMap::new()),
            outer,
            frozen: AtomicBool::new(false),
            extensions: RwLock::new(HashMap::new()),
        }))
    }

    /// A new, empty scope chained under this one.
    pub fn child(&self) -> Scope {
        Scope::with_outer(Some(self.clone()))
    }

    pub fn outer(&self) -> Option<&Scope> {
        self.0.outer.as_ref()
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut scope = Some(self);
        while let Some(s) = scope {
            if let Some(value) = s.0.bindings.read().get(name) {
                return Some(value.clone());
            }
            scope = s.outer();
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn contains_local(&self, name: &str) -> bool {
        self.0.bindings.read().contains_key(name)
    }

    /// Declares `name` in this scope. Fails when it is already declared here;
    /// shadowing an outer binding is fine.
    pub fn define(&self, name: impl Into<String>, value: Value) -> Result<(), ScopeError> {
        let name = name.into();
        if self.is_frozen() {
            return Err(ScopeError::ReadOnly(name));
        }
        let mut bindings = self.0.bindings.write();
        if bindings.contains_key(&name) {
            return Err(ScopeError::AlreadyDeclared(name));
        }
        bindings.insert(name, value);
        Ok(())
    }

    /// Binds `name` in this scope, replacing any existing local binding.
    /// Used by hosts installing values and by closure calls binding
    /// parameters; frozen scopes ignore it.
    pub fn insert(&self, name: impl Into<String>, value: Value) {
        if self.is_frozen() {
            return;
        }
        self.0.bindings.write().insert(name.into(), value);
    }

    /// Updates the nearest existing binding of `name`.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), ScopeError> {
        let mut scope = Some(self);
        while let Some(s) = scope {
            if s.contains_local(name) {
                if s.is_frozen() {
                    return Err(ScopeError::ReadOnly(name.to_string()));
                }
                s.0.bindings.write().insert(name.to_string(), value);
                return Ok(());
            }
            scope = s.outer();
        }
        Err(ScopeError::Undefined(name.to_string()))
    }

    /// Makes every binding of this scope read-only. Outer scopes are not
    /// affected.
    pub fn freeze(&self) {
        self.0.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.load(Ordering::Acquire)
    }

    /// Names bound directly in this scope, in binding order.
    pub fn names(&self) -> Vec<String> {
        self.0.bindings.read().keys().cloned().collect()
    }

    /// Registers a typed host object for steps to retrieve through
    /// [`crate::step::Context::get`].
    pub fn insert_extension<T: Any + Send + Sync>(&self, value: T) {
        self.insert_extension_arc(Arc::new(value));
    }

    /// Like [`Scope::insert_extension`] for an object the host keeps
    /// sharing.
    pub fn insert_extension_arc<T: Any + Send + Sync>(&self, value: Arc<T>) {
        self.0.extensions.write().insert(TypeId::of::<T>(), value);
    }

    /// Nearest extension of type `T` along the chain.
    pub fn extension<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let mut scope = Some(self);
        while let Some(s) = scope {
            let found = s.0.extensions.read().get(&TypeId::of::<T>()).cloned();
            if let Some(ext) = found {
                return ext.downcast::<T>().ok();
            }
            scope = s.outer();
        }
        None
    }
}

impl Default for Scope {
    fn default() -> Self {
        Scope::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("names", &self.names())
            .field("frozen", &self.is_frozen())
            .field("outer", &self.outer())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_outward() {
        let root = Scope::new();
        root.insert("x", Value::from(1));
        let inner = root.child().child();
        assert_eq!(inner.lookup("x"), Some(Value::from(1)));
        assert_eq!(inner.lookup("y"), None);
    }

    #[test]
    fn test_define_rejects_local_redeclaration() {
        let root = Scope::new();
        root.define("x", Value::from(1)).unwrap();
        assert_eq!(
            root.define("x", Value::from(2)),
            Err(ScopeError::AlreadyDeclared("x".into()))
        );

        // shadowing an outer name is allowed
        let inner = root.child();
        inner.define("x", Value::from(3)).unwrap();
        assert_eq!(inner.lookup("x"), Some(Value::from(3)));
        assert_eq!(root.lookup("x"), Some(Value::from(1)));
    }

    #[test]
    fn test_assign_updates_where_found() {
        let root = Scope::new();
        root.define("x", Value::from(1)).unwrap();
        let inner = root.child();
        inner.assign("x", Value::from(5)).unwrap();
        assert_eq!(root.lookup("x"), Some(Value::from(5)));
        assert!(!inner.contains_local("x"));

        assert_eq!(
            inner.assign("missing", Value::Nil),
            Err(ScopeError::Undefined("missing".into()))
        );
    }

    #[test]
    fn test_frozen_scope_is_read_only() {
        let root = Scope::new();
        root.insert("true", Value::Bool(true));
        root.freeze();
        let inner = root.child();
        assert_eq!(
            inner.assign("true", Value::Bool(false)),
            Err(ScopeError::ReadOnly("true".into()))
        );
        assert_eq!(inner.lookup("true"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_extensions_are_found_through_the_chain() {
        #[derive(Debug, PartialEq)]
        struct Deadline(u64);

        let root = Scope::new();
        root.insert_extension(Deadline(30));
        let inner = root.child();
        assert_eq!(inner.extension::<Deadline>().as_deref(), Some(&Deadline(30)));
        assert!(inner.extension::<String>().is_none());
    }
}
