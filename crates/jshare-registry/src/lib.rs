//! Class loader identity for jshare.
//!
//! A class loader is described by its kind, its runtime type name and the
//! classpath it can resolve classes from. Custom loaders are bound to a
//! stable string identifier in a [`ClassLoaderRegistry`] so that classes they
//! define can be re-associated with "the same" loader in a later process.

mod classpath;
mod error;
mod loader;
mod registry;

pub use classpath::{ClasspathEntry, LocatedClass};
pub use error::RegistryError;
pub use loader::{ClassLoader, LoaderKind};
pub use registry::ClassLoaderRegistry;
