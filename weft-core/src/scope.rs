//! Provider scopes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Instance sharing policy of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// One instance per container
    #[default]
    Singleton,
    /// A new instance for every resolution
    Transient,
    /// One instance per top-level resolution (or request scope)
    Request,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Singleton => write!(f, "Singleton"),
            Scope::Transient => write!(f, "Transient"),
            Scope::Request => write!(f, "Request"),
        }
    }
}
