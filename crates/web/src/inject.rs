//! Type-keyed dependency injection.
//!
//! An [`Injector`] maps type identities to values: storing a `T` makes it
//! retrievable by asking for `T`. Trait objects are first-class citizens:
//! [`map_to`](Injector::map_to) stores an `Arc<dyn Trait>` under the type
//! identity of the trait object itself, so a handler can depend on the
//! abstraction rather than the concrete type providing it.
//!
//! Injectors form a hierarchy. Every request gets a fresh child injector
//! whose parent is the application injector: lookups that miss locally fall
//! back to the parent, so request-scoped values shadow application services
//! of the same type.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use ember_web::Injector;
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct English;
//! impl Greeter for English {
//!     fn greet(&self) -> String {
//!         "hello".to_string()
//!     }
//! }
//!
//! let injector = Injector::new();
//! injector.map(42_i32);
//! injector.map_to::<dyn Greeter>(Arc::new(English));
//!
//! assert_eq!(*injector.value::<i32>().unwrap(), 42);
//! assert_eq!(injector.value::<dyn Greeter>().unwrap().greet(), "hello");
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use thiserror::Error;

/// An error raised when a dependency cannot be resolved.
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("value not found for type {type_name}")]
    ValueNotFound { type_name: &'static str },
}

impl InjectError {
    pub fn value_not_found<T: ?Sized>() -> Self {
        Self::ValueNotFound { type_name: std::any::type_name::<T>() }
    }
}

/// A hierarchical registry of values keyed by their type identity.
///
/// The registry is meant to be populated during application setup and read
/// from request handlers; reads take a shared lock and never block each
/// other.
#[derive(Default)]
pub struct Injector {
    values: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    parent: OnceLock<Arc<Injector>>,
}

impl Injector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value keyed by its own type. A later `map` of the same type
    /// replaces the earlier value.
    pub fn map<T: Send + Sync + 'static>(&self, value: T) -> &Self {
        self.map_to::<T>(Arc::new(value))
    }

    /// Stores a shared value keyed by `T`, which may be a trait object type
    /// such as `dyn Service`. This is the way to register a concrete value
    /// under the interface it satisfies:
    ///
    /// ```ignore
    /// injector.map_to::<dyn Service>(Arc::new(ServiceImpl::new()));
    /// ```
    pub fn map_to<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) -> &Self {
        self.values
            .write()
            .unwrap()
            .insert(TypeId::of::<T>(), Box::new(value));
        self
    }

    /// Returns the value stored for `T`, consulting the parent injector when
    /// the lookup misses locally.
    pub fn value<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        if let Some(entry) = self.values.read().unwrap().get(&TypeId::of::<T>()) {
            if let Some(value) = entry.downcast_ref::<Arc<T>>() {
                return Some(value.clone());
            }
        }
        self.parent.get()?.value::<T>()
    }

    /// Returns true if a value is stored for `T`, locally or in a parent.
    pub fn contains<T: ?Sized + Send + Sync + 'static>(&self) -> bool {
        self.value::<T>().is_some()
    }

    /// Installs the parent injector consulted when lookups miss locally.
    /// The parent can be set only once; later calls are ignored.
    pub fn set_parent(&self, parent: Arc<Injector>) -> &Self {
        let _ = self.parent.set(parent);
        self
    }
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector")
            .field("values", &self.values.read().unwrap().len())
            .field("has_parent", &self.parent.get().is_some())
            .finish()
    }
}
