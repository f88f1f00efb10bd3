//! Source module - the data source contract and its registry.
//!
//! Provides:
//! - [`DataSource`] - the trait a plugin type implements
//! - [`SourceRegistry`] - maps class reference paths to factories
//! - [`ClassReference`] - the decoded class blob sent by the host
//!
//! # Example
//!
//! ```
//! use datasource_worker::options::OptionsMap;
//! use datasource_worker::source::{ClassReference, DataSource, PluginError, SourceRegistry};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct Foo;
//!
//! impl DataSource for Foo {
//!     fn name() -> String {
//!         "foo".to_string()
//!     }
//!
//!     fn new(_options: OptionsMap) -> Result<Self, PluginError> {
//!         Ok(Foo)
//!     }
//! }
//!
//! let mut registry = SourceRegistry::new();
//! registry.register::<Foo>("demos.Foo");
//!
//! let validated = registry.validate(&ClassReference::of_type("demos.Foo")).unwrap();
//! assert!(validated.matches_provider("FOO"));
//! ```

mod contract;
mod reference;
mod registry;

pub use contract::{DataSource, PluginError, SourceInstance};
pub use reference::ClassReference;
pub use registry::{NameAccessor, SourceFactory, SourceRegistry, TypedFactory, ValidatedSource};
