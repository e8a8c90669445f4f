//! Module graph for the Weft IoC container
//!
//! `weft-graph` turns module definitions into a directed multigraph:
//!
//! - [`ModuleRegistry`] creates one [`ModuleRecord`] per distinct module,
//!   running deferred module factories and following forward and named
//!   references
//! - [`ModuleGraph::compile`] walks the imports breadth-first from the roots,
//!   adds module, provider and dependency nodes and edges, and flags
//!   dependencies that are not visible from their module
//! - two independent passes then mark edges on dependency cycles and on
//!   import cycles
//!
//! Structural problems that do not prevent resolution are collected as
//! [`GraphIssue`]s; everything else fails with a [`GraphError`].
//!
//! ```no_run
//! # async fn demo() -> weft_graph::Result<()> {
//! use weft_core::{ModuleDef, Provider};
//! use weft_graph::{ModuleGraph, ModuleRegistry};
//!
//! let app = ModuleDef::builder("App")
//!     .provider(Provider::value("CONFIG", 42u32))
//!     .build();
//!
//! let mut registry = ModuleRegistry::new();
//! let mut graph = ModuleGraph::default();
//! graph.compile(&mut registry, &[app.into()]).await?;
//! assert!(graph.get_provider(&"CONFIG".into()).is_some());
//! # Ok(())
//! # }
//! ```

mod builder;
mod cycles;
pub mod error;
pub mod graph;
pub mod issues;
pub mod registry;
mod visibility;

pub use error::{GraphError, Result};
pub use graph::{
    CompileOptions, DuplicatePolicy, EdgeKind, EdgeMetadata, GraphEdge, GraphNode, GraphState,
    ModuleGraph, ModuleNode, ProviderNode,
};
pub use issues::GraphIssue;
pub use registry::{dynamic_token, Metatype, ModuleRecord, ModuleRegistry, RecordSet};
