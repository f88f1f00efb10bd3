//! Source registry for resolving class references to factories.
//!
//! The registry maps paths to factories. A class reference is validated
//! against the registry before any constructor runs: it must name a type,
//! the type must be registered, and its name accessor must be type-level.
//!
//! # Example
//!
//! ```ignore
//! use datasource_worker::source::{ClassReference, SourceRegistry};
//!
//! let mut registry = SourceRegistry::new();
//! registry.register::<CsvSource>("demos.CsvSource");
//!
//! let validated = registry.validate(&ClassReference::of_type("demos.CsvSource"))?;
//! assert_eq!(validated.name(), "csv");
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;

use tracing::debug;

use super::contract::{guard_plugin, DataSource, PluginError, SourceInstance};
use super::reference::ClassReference;
use crate::error::{Result, WorkerError};
use crate::options::OptionsMap;

const EXPECTED_SOURCE: &str = "a subclass of DataSource";
const EXPECTED_TYPE_LEVEL_NAME: &str = "'name()' method to be a type-level accessor";

/// How a factory exposes its provider name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameAccessor {
    /// Known without an instance.
    TypeLevel(String),
    /// Only available on an instance, which the contract forbids.
    Instance,
}

/// Object-safe constructor for one data source type.
pub trait SourceFactory: Send + Sync + 'static {
    /// The factory's name accessor.
    fn name_accessor(&self) -> NameAccessor;

    /// Build an instance from the request options.
    fn create(&self, options: OptionsMap) -> std::result::Result<Box<dyn SourceInstance>, PluginError>;
}

/// Factory for a [`DataSource`] type.
pub struct TypedFactory<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T: DataSource> TypedFactory<T> {
    /// Create a new typed factory.
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: DataSource> Default for TypedFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DataSource> SourceFactory for TypedFactory<T> {
    fn name_accessor(&self) -> NameAccessor {
        NameAccessor::TypeLevel(T::name())
    }

    fn create(&self, options: OptionsMap) -> std::result::Result<Box<dyn SourceInstance>, PluginError> {
        let instance = T::new(options)?;
        Ok(Box::new(instance))
    }
}

/// A class reference that passed validation.
pub struct ValidatedSource<'a> {
    path: &'a str,
    name: String,
    factory: &'a dyn SourceFactory,
}

impl<'a> ValidatedSource<'a> {
    /// Registry path of the type.
    pub fn path(&self) -> &str {
        self.path
    }

    /// Declared provider name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `provider` names this source, ignoring case and
    /// surrounding whitespace.
    pub fn matches_provider(&self, provider: &str) -> bool {
        normalize_name(provider) == normalize_name(&self.name)
    }

    /// Instantiate with the given options.
    pub fn instantiate(&self, options: OptionsMap) -> Result<Box<dyn SourceInstance>> {
        let instance = guard_plugin("constructor", || self.factory.create(options))??;
        Ok(instance)
    }
}

/// Registry mapping paths to data source factories.
pub struct SourceRegistry {
    factories: HashMap<String, Box<dyn SourceFactory>>,
}

impl SourceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a data source type under a path.
    pub fn register<T: DataSource>(&mut self, path: &str) {
        self.register_factory(path, TypedFactory::<T>::new());
    }

    /// Register a custom factory under a path.
    pub fn register_factory<F: SourceFactory>(&mut self, path: &str, factory: F) {
        if self
            .factories
            .insert(path.to_string(), Box::new(factory))
            .is_some()
        {
            debug!(path, "replaced data source registration");
        }
    }

    /// Check whether a path is registered.
    pub fn contains(&self, path: &str) -> bool {
        self.factories.contains_key(path)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Validate a class reference against the capability contract.
    ///
    /// # Errors
    ///
    /// Returns a type mismatch if the reference is not a type, is not
    /// registered, or its name accessor is not type-level.
    pub fn validate<'a>(&'a self, reference: &ClassReference) -> Result<ValidatedSource<'a>> {
        let path = match reference {
            ClassReference::Type { path } => path,
            ClassReference::Value { type_name } => {
                return Err(WorkerError::type_mismatch(
                    EXPECTED_SOURCE,
                    format!("'{}'", type_name),
                ));
            }
        };

        let (path, factory) = self
            .factories
            .get_key_value(path.as_str())
            .ok_or_else(|| WorkerError::type_mismatch(EXPECTED_SOURCE, format!("'{}'", path)))?;

        match factory.name_accessor() {
            NameAccessor::TypeLevel(name) => Ok(ValidatedSource {
                path,
                name,
                factory: factory.as_ref(),
            }),
            NameAccessor::Instance => Err(WorkerError::type_mismatch(
                EXPECTED_TYPE_LEVEL_NAME,
                "'instance method'",
            )),
        }
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
