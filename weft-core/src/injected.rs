//! Resolved dependencies handed to constructors and factories

use anyhow::anyhow;
use rustc_hash::FxHashMap;
use std::any::{type_name, Any};
use std::sync::Arc;

use crate::Instance;

/// Resolved constructor parameters and injected properties
///
/// A slot is `None` when its dependency could not be resolved: the token is
/// unreached from the owning module, no provider exists for it, or it closes
/// a circular reference.
#[derive(Clone, Default)]
pub struct Injected {
    params: Vec<Option<Instance>>,
    properties: FxHashMap<String, Option<Instance>>,
}

impl Injected {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bundle of positional arguments, as passed to factories
    pub fn from_params(params: Vec<Option<Instance>>) -> Self {
        Self {
            params,
            properties: FxHashMap::default(),
        }
    }

    /// Set the parameter at `index`, growing the parameter list as needed
    pub fn set_param(&mut self, index: usize, value: Option<Instance>) {
        if self.params.len() <= index {
            self.params.resize(index.saturating_add(1), None);
        }
        self.params[index] = value;
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: Option<Instance>) {
        self.properties.insert(key.into(), value);
    }

    /// Number of positional slots
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.properties.is_empty()
    }

    /// Raw parameter instance
    pub fn param_instance(&self, index: usize) -> Option<&Instance> {
        self.params.get(index).and_then(|slot| slot.as_ref())
    }

    /// Raw property instance
    pub fn property_instance(&self, key: &str) -> Option<&Instance> {
        self.properties.get(key).and_then(|slot| slot.as_ref())
    }

    /// Parameter downcast to `T`; `None` if absent or of another type
    pub fn param<T: Any + Send + Sync>(&self, index: usize) -> Option<Arc<T>> {
        self.param_instance(index)
            .and_then(|instance| instance.clone().downcast::<T>().ok())
    }

    /// Property downcast to `T`; `None` if absent or of another type
    pub fn property<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.property_instance(key)
            .and_then(|instance| instance.clone().downcast::<T>().ok())
    }

    /// Parameter that must be present and of type `T`
    pub fn require_param<T: Any + Send + Sync>(&self, index: usize) -> anyhow::Result<Arc<T>> {
        let instance = self
            .param_instance(index)
            .ok_or_else(|| anyhow!("parameter {} was not resolved", index))?;
        instance
            .clone()
            .downcast::<T>()
            .map_err(|_| anyhow!("parameter {} is not a {}", index, type_name::<T>()))
    }

    /// Property that must be present and of type `T`
    pub fn require_property<T: Any + Send + Sync>(&self, key: &str) -> anyhow::Result<Arc<T>> {
        let instance = self
            .property_instance(key)
            .ok_or_else(|| anyhow!("property '{}' was not resolved", key))?;
        instance
            .clone()
            .downcast::<T>()
            .map_err(|_| anyhow!("property '{}' is not a {}", key, type_name::<T>()))
    }
}
