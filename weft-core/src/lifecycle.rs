//! Provider lifecycle hooks

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::Instance;

/// Trait for classes that need initialization after construction
///
/// The hook runs once per constructed instance, before the instance is
/// handed to its dependents. For singletons that means exactly once.
#[async_trait]
pub trait Lifecycle: Send + Sync + 'static {
    /// Called after the instance and all of its dependencies are built
    async fn on_init(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Type-erased initialization hook attached to a class definition
pub type InitHook = Arc<dyn Fn(Instance) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Builds the erased hook for `T`. Instances of another type are skipped.
pub(crate) fn init_hook<T: Lifecycle>() -> InitHook {
    Arc::new(|instance: Instance| -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            match instance.downcast::<T>() {
                Ok(typed) => typed.on_init().await,
                Err(_) => Ok(()),
            }
        })
    })
}
