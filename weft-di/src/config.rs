//! Container configuration

use serde::{Deserialize, Serialize};
use weft_core::Scope;
use weft_graph::{CompileOptions, DuplicatePolicy};

use crate::error::{DiError, DiResult};

/// Container configuration
///
/// ```toml
/// default_scope = "transient"
/// duplicate_providers = "reject"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Scope of class and factory providers that declare none
    pub default_scope: Scope,
    /// Handling of provider tokens declared by more than one module
    pub duplicate_providers: DuplicatePolicy,
}

impl ContainerConfig {
    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> DiResult<Self> {
        toml::from_str(toml_str)
            .map_err(|e| DiError::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from JSON string
    pub fn from_json(json_str: &str) -> DiResult<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| DiError::Config(format!("Failed to parse JSON: {}", e)))
    }

    pub fn with_default_scope(mut self, scope: Scope) -> Self {
        self.default_scope = scope;
        self
    }

    pub fn with_duplicate_providers(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_providers = policy;
        self
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            default_scope: self.default_scope,
            duplicate_providers: self.duplicate_providers,
        }
    }
}
