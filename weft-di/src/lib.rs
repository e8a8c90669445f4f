//! Weft IoC container
//!
//! The container compiles a module graph from a root module and resolves
//! providers on demand:
//!
//! - [`Container`] owns the module registry, the compiled graph and the
//!   resolver, and supports late module additions and replacements
//! - [`ProviderResolver`] instantiates providers honoring their scope,
//!   injecting nothing for unreached or circular dependencies
//! - [`ModuleManifest`] loads module definitions from TOML or JSON against a
//!   [`ProviderCatalog`] of named classes and factories

pub mod config;
pub mod container;
pub mod error;
pub mod manifest;
pub mod resolver;

pub use config::ContainerConfig;
pub use container::{Container, RequestScope};
pub use error::{DiError, DiResult};
pub use manifest::{ModuleManifest, ModuleSpec, ProviderCatalog, ProviderSpec};
pub use resolver::{ProviderResolver, ResolutionContext};

pub use weft_graph::{DuplicatePolicy, GraphIssue};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{Container, ContainerConfig, DiError, DiResult, RequestScope};
    pub use weft_core::prelude::*;
}
