//! Core definitions for the Weft IoC container
//!
//! This crate holds the metadata the container consumes:
//! - Tokens identifying modules and providers
//! - Provider descriptors (class, value and factory providers)
//! - Static, dynamic, deferred and forward module references
//! - Lifecycle hooks and the resolved-dependency bundle handed to constructors
//!
//! Nothing here resolves anything; see `weft-graph` and `weft-di`.

pub mod injected;
pub mod lifecycle;
pub mod module;
pub mod provider;
pub mod scope;
pub mod token;

pub use injected::Injected;
pub use lifecycle::{InitHook, Lifecycle};
pub use module::{
    DeferredModule, DynamicModule, ForwardRef, ModuleDef, ModuleDefBuilder, ModuleFactory,
    ModuleRef,
};
pub use provider::{
    factory_fn, ClassDef, ClassDefBuilder, ClassProvider, Constructor, Dependency, DependencyKind,
    FactoryFn, FactoryProvider, InjectionSite, Provider, ValueProvider, MAX_PARAM_INDEX,
};
pub use scope::Scope;
pub use token::{Symbol, Token, TypeToken};

use std::any::Any;
use std::sync::Arc;

/// A constructed provider instance
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        ClassDef, DeferredModule, DynamicModule, Injected, Instance, Lifecycle, ModuleDef,
        ModuleRef, Provider, Scope, Token,
    };
}
