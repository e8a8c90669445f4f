//! Module graph error types

use thiserror::Error;
use weft_core::{DependencyKind, InjectionSite, Token};

/// Type alias for module graph results
pub type Result<T> = std::result::Result<T, GraphError>;

/// Fatal errors raised while compiling a module graph
#[derive(Error, Debug)]
pub enum GraphError {
    /// `compile` was called on a graph that already finished compiling
    #[error("Module graph already compiled")]
    AlreadyCompiled,

    /// `compile` was entered while a compile was running
    #[error("Module graph compilation already in progress")]
    CompileInProgress,

    /// A dependency declaration carries no token
    #[error(
        "Missing dependency token for {provider} at {site} ({kind:?}); \
         the dependency was declared before its token was defined"
    )]
    MissingDependencyToken {
        /// Provider owning the declaration
        provider: Token,
        /// Constructor, property or factory dependency
        kind: DependencyKind,
        /// Parameter index or property key
        site: InjectionSite,
    },

    /// A positional dependency index exceeds [`MAX_PARAM_INDEX`]
    ///
    /// [`MAX_PARAM_INDEX`]: weft_core::MAX_PARAM_INDEX
    #[error("Dependency of {provider} at index {index} exceeds the parameter limit of {max}")]
    ParamIndexOutOfRange {
        provider: Token,
        index: usize,
        max: usize,
    },

    /// A named module reference has no registered definition
    #[error("Module not found: {token}")]
    UnknownModule {
        /// Token that was referenced
        token: Token,
    },

    /// A module and a provider share a token
    #[error("Token {token} is used by both a module and a provider")]
    TokenCollision {
        /// The shared token
        token: Token,
    },

    /// Two providers share a token and duplicates are rejected
    #[error("Provider {token} is declared in {kept} and again in {duplicate}")]
    DuplicateProviderToken {
        /// The provider token
        token: Token,
        /// Module of the first declaration
        kept: Token,
        /// Module of the rejected declaration
        duplicate: Token,
    },

    /// A deferred module factory failed
    #[error("Failed to build module {module}: {source}")]
    ModuleFactory {
        /// Label of the deferred module
        module: String,
        /// The factory error
        #[source]
        source: anyhow::Error,
    },
}
