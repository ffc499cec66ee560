use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Strongly-typed key for the request attribute bag.
///
/// Keys are declared once as constants; the type parameter pins what can be
/// stored and read under the key, so there is no stringly-typed access and no
/// downcasting at call sites.
pub struct AttributeKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttributeKey<T> {
    /// Declare a new attribute key
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Key name, used for diagnostics only
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for AttributeKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AttributeKey<T> {}

impl<T> fmt::Debug for AttributeKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttributeKey").field(&self.name).finish()
    }
}

/// Per-request context bag for cross-component state.
///
/// Values are stored behind `Arc`, so cloning the bag for a retry attempt
/// shares them instead of copying.
#[derive(Default, Clone)]
pub struct Attributes {
    values: HashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under the key, replacing any previous value
    pub fn set<T: Send + Sync + 'static>(&mut self, key: AttributeKey<T>, value: T) {
        self.values.insert(key.name, Arc::new(value));
    }

    /// Read the value stored under the key
    pub fn get<T: Send + Sync + 'static>(&self, key: AttributeKey<T>) -> Option<Arc<T>> {
        self.values
            .get(key.name)
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Remove the value stored under the key, reporting whether one existed
    pub fn remove<T: Send + Sync + 'static>(&mut self, key: AttributeKey<T>) -> bool {
        self.values.remove(key.name).is_some()
    }

    pub fn contains<T: Send + Sync + 'static>(&self, key: AttributeKey<T>) -> bool {
        self.values.contains_key(key.name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attributes")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}
