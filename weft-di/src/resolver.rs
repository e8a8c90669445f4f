//! Scope-aware provider resolution over a compiled graph

use futures::future::BoxFuture;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::{debug, trace};
use weft_core::{Injected, InjectionSite, Instance, Provider, Scope, Token};
use weft_graph::{GraphEdge, ModuleGraph, ProviderNode};

use crate::error::{DiError, DiResult};

/// State of one top-level resolution, or of one request scope
///
/// Tracks the tokens currently being constructed and caches request-scoped
/// instances.
#[derive(Default)]
pub struct ResolutionContext {
    in_progress: FxHashSet<Token>,
    request: FxHashMap<Token, Instance>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_progress(&self, token: &Token) -> bool {
        self.in_progress.contains(token)
    }

    /// Number of request-scoped instances cached so far
    pub fn request_instances(&self) -> usize {
        self.request.len()
    }
}

/// Instantiates providers of a compiled graph
pub struct ProviderResolver {
    graph: Arc<ModuleGraph>,
    singletons: RwLock<FxHashMap<Token, Instance>>,
}

impl ProviderResolver {
    pub fn new(graph: Arc<ModuleGraph>) -> Self {
        Self {
            graph,
            singletons: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn graph(&self) -> &Arc<ModuleGraph> {
        &self.graph
    }

    /// Number of cached singleton instances
    pub fn singleton_count(&self) -> usize {
        self.singletons.read().len()
    }

    /// Resolve `token` in a fresh resolution context
    ///
    /// Returns `Ok(None)` when the graph has no provider for `token`.
    pub async fn resolve_provider(&self, token: &Token) -> DiResult<Option<Instance>> {
        let mut context = ResolutionContext::new();
        self.resolve_in(token, &mut context).await
    }

    /// Resolve `token` within an existing context
    ///
    /// A token that is already being constructed in `context` resolves to
    /// `None`, which is how circular dependencies terminate.
    pub fn resolve_in<'a>(
        &'a self,
        token: &'a Token,
        context: &'a mut ResolutionContext,
    ) -> BoxFuture<'a, DiResult<Option<Instance>>> {
        Box::pin(async move {
            let Some(node) = self.graph.get_provider(token) else {
                trace!("No provider for {}", token);
                return Ok(None);
            };

            if let Provider::Value(value) = &node.provider {
                return Ok(Some(Arc::clone(&value.value)));
            }

            if let Some(instance) = self.cached(node, context) {
                trace!("Cache hit for {} ({})", token, node.scope);
                return Ok(Some(instance));
            }

            if !context.in_progress.insert(token.clone()) {
                debug!("{} is already being resolved; injecting nothing", token);
                return Ok(None);
            }
            let result = self.instantiate(node, context).await;
            context.in_progress.remove(token);

            Ok(Some(self.store(node, context, result?)))
        })
    }

    fn cached(&self, node: &ProviderNode, context: &ResolutionContext) -> Option<Instance> {
        match node.scope {
            Scope::Singleton => self.singletons.read().get(&node.token).cloned(),
            Scope::Request => context.request.get(&node.token).cloned(),
            Scope::Transient => None,
        }
    }

    /// Cache `instance` per the node's scope; the first stored instance wins
    fn store(&self, node: &ProviderNode, context: &mut ResolutionContext, instance: Instance) -> Instance {
        match node.scope {
            Scope::Singleton => {
                let mut singletons = self.singletons.write();
                Arc::clone(singletons.entry(node.token.clone()).or_insert(instance))
            }
            Scope::Request => Arc::clone(
                context
                    .request
                    .entry(node.token.clone())
                    .or_insert(instance),
            ),
            Scope::Transient => instance,
        }
    }

    async fn instantiate(&self, node: &ProviderNode, context: &mut ResolutionContext) -> DiResult<Instance> {
        let token = &node.token;
        match &node.provider {
            Provider::Value(value) => Ok(Arc::clone(&value.value)),
            Provider::Class(class) => {
                let injected = self.resolve_dependencies(token, context).await?;
                let instance = class
                    .class
                    .construct(&injected)
                    .map_err(|source| DiError::InstantiationFailed {
                        token: token.clone(),
                        source,
                    })?;
                debug!("Constructed {} as {}", token, class.class.name());

                if let Some(hook) = class.class.init_hook() {
                    hook(Arc::clone(&instance))
                        .await
                        .map_err(|source| DiError::InitHookFailed {
                            token: token.clone(),
                            source,
                        })?;
                    trace!("Init hook of {} completed", token);
                }
                Ok(instance)
            }
            Provider::Factory(factory) => {
                let injected = self.resolve_dependencies(token, context).await?;
                let instance = (factory.factory)(injected)
                    .await
                    .map_err(|source| DiError::InstantiationFailed {
                        token: token.clone(),
                        source,
                    })?;
                debug!("Produced {} from factory", token);
                Ok(instance)
            }
        }
    }

    /// Resolve the dependency edges of `token` in declaration order
    async fn resolve_dependencies(&self, token: &Token, context: &mut ResolutionContext) -> DiResult<Injected> {
        let edges: Vec<&GraphEdge> = self.graph.dependency_edges(token).collect();
        let mut injected = Injected::new();

        for edge in edges {
            let value = if edge.is_unreached() {
                trace!("{} -> {} is unreached; injecting nothing", token, edge.target);
                None
            } else {
                self.resolve_in(&edge.target, context).await?
            };

            match &edge.metadata.site {
                Some(InjectionSite::Index(index)) => injected.set_param(*index, value),
                Some(InjectionSite::Key(key)) => injected.set_property(key.to_string(), value),
                None => {}
            }
        }

        Ok(injected)
    }
}
