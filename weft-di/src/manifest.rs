//! Declarative module manifests

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use weft_core::{
    factory_fn, ClassDef, FactoryFn, FactoryProvider, Injected, ModuleDef, ModuleRef, Provider,
    Scope, Token,
};

use crate::error::{DiError, DiResult};

/// Modules described as data
///
/// ```toml
/// root = "App"
///
/// [[modules]]
/// name = "App"
/// imports = ["Config"]
///
/// [[modules.providers]]
/// kind = "factory"
/// provide = "db"
/// factory = "connect"
/// inject = ["DATABASE_URL"]
///
/// [[modules]]
/// name = "Config"
/// global = true
/// exports = ["DATABASE_URL"]
///
/// [[modules.providers]]
/// kind = "value"
/// provide = "DATABASE_URL"
/// value = "postgres://localhost/app"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Root module name; the first module when absent
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub name: String,
    #[serde(default)]
    pub global: bool,
    /// Names of imported modules
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(default)]
    pub providers: Vec<ProviderSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderSpec {
    /// Resolves to the value as a `serde_json::Value`
    Value {
        provide: String,
        value: serde_json::Value,
    },
    /// Catalog class; registered under its class token unless `provide` is set
    Class {
        #[serde(default)]
        provide: Option<String>,
        class: String,
        #[serde(default)]
        scope: Option<Scope>,
    },
    Factory {
        provide: String,
        factory: String,
        #[serde(default)]
        inject: Vec<String>,
        #[serde(default)]
        scope: Option<Scope>,
    },
}

impl ModuleManifest {
    pub fn from_toml(toml_str: &str) -> DiResult<Self> {
        toml::from_str(toml_str)
            .map_err(|e| DiError::Config(format!("Failed to parse TOML: {}", e)))
    }

    pub fn from_json(json_str: &str) -> DiResult<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| DiError::Config(format!("Failed to parse JSON: {}", e)))
    }

    /// Token of the root module
    pub fn root(&self) -> Option<Token> {
        self.root
            .as_deref()
            .or_else(|| self.modules.first().map(|module| module.name.as_str()))
            .map(Token::name)
    }

    /// Build module definitions; imports become named references
    pub fn into_modules(&self, catalog: &ProviderCatalog) -> DiResult<Vec<ModuleDef>> {
        self.modules
            .iter()
            .map(|module| module.build(catalog))
            .collect()
    }
}

impl ModuleSpec {
    fn build(&self, catalog: &ProviderCatalog) -> DiResult<ModuleDef> {
        let mut builder = ModuleDef::builder(&self.name);
        for import in &self.imports {
            builder = builder.import(ModuleRef::named(import.as_str()));
        }
        for provider in &self.providers {
            builder = builder.provider(provider.build(&self.name, catalog)?);
        }
        for export in &self.exports {
            builder = builder.export(export.as_str());
        }
        if self.global {
            builder = builder.global();
        }
        Ok(builder.build())
    }
}

impl ProviderSpec {
    fn build(&self, module: &str, catalog: &ProviderCatalog) -> DiResult<Provider> {
        let provider = match self {
            ProviderSpec::Value { provide, value } => Provider::value(provide.as_str(), value.clone()),
            ProviderSpec::Class {
                provide,
                class,
                scope,
            } => {
                let class = catalog.classes.get(class).cloned().ok_or_else(|| {
                    DiError::Config(format!("Unknown class {} in module {}", class, module))
                })?;
                let provider = match provide {
                    Some(provide) => Provider::use_class(provide.as_str(), class),
                    None => Provider::class(class),
                };
                with_scope(provider, *scope)
            }
            ProviderSpec::Factory {
                provide,
                factory,
                inject,
                scope,
            } => {
                let factory = catalog.factories.get(factory).cloned().ok_or_else(|| {
                    DiError::Config(format!("Unknown factory {} in module {}", factory, module))
                })?;
                Provider::Factory(FactoryProvider {
                    provide: Token::name(provide),
                    inject: inject.iter().map(Token::name).collect(),
                    factory,
                    scope: *scope,
                })
            }
        };
        Ok(provider)
    }
}

fn with_scope(provider: Provider, scope: Option<Scope>) -> Provider {
    match scope {
        Some(scope) => provider.with_scope(scope),
        None => provider,
    }
}

/// Named classes and factories a manifest can refer to
#[derive(Default, Clone)]
pub struct ProviderCatalog {
    classes: FxHashMap<String, ClassDef>,
    factories: FxHashMap<String, FactoryFn>,
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(mut self, name: impl Into<String>, class: ClassDef) -> Self {
        self.classes.insert(name.into(), class);
        self
    }

    pub fn factory<T, F, Fut>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Injected) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.factories.insert(name.into(), factory_fn(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name) || self.factories.contains_key(name)
    }
}

impl std::fmt::Debug for ProviderCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCatalog")
            .field("classes", &self.classes.keys().collect::<Vec<_>>())
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
