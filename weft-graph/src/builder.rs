//! Graph construction from module records

use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use weft_core::{InjectionSite, ModuleRef, Token, MAX_PARAM_INDEX};

use crate::graph::{
    DuplicatePolicy, EdgeKind, EdgeMetadata, GraphEdge, GraphNode, GraphState, ModuleGraph,
    ModuleNode, ProviderNode,
};
use crate::issues::GraphIssue;
use crate::registry::{ModuleRecord, ModuleRegistry};
use crate::{GraphError, Result};

impl ModuleGraph {
    /// Build the graph reachable from `roots`
    ///
    /// Runs once per graph. A failed compile leaves the graph empty and
    /// uncompiled.
    pub async fn compile(&mut self, registry: &mut ModuleRegistry, roots: &[ModuleRef]) -> Result<()> {
        match self.state {
            GraphState::Compiled => return Err(GraphError::AlreadyCompiled),
            GraphState::Compiling => return Err(GraphError::CompileInProgress),
            GraphState::Uncompiled => {}
        }

        self.state = GraphState::Compiling;
        match self.build(registry, roots).await {
            Ok(()) => {
                self.state = GraphState::Compiled;
                info!(
                    "Compiled module graph: {} nodes, {} edges, {} issues",
                    self.nodes.len(),
                    self.edges.len(),
                    self.issues.len()
                );
                Ok(())
            }
            Err(err) => {
                self.reset();
                Err(err)
            }
        }
    }

    async fn build(&mut self, registry: &mut ModuleRegistry, roots: &[ModuleRef]) -> Result<()> {
        let mut worklist: VecDeque<Arc<ModuleRecord>> = VecDeque::new();
        for root in roots {
            worklist.push_back(registry.insert(root).await?);
        }

        let mut visited: FxHashSet<Token> = FxHashSet::default();
        while let Some(record) = worklist.pop_front() {
            if !visited.insert(record.token().clone()) {
                trace!("Module {} already in graph", record.token());
                continue;
            }

            let imports = registry.resolve_imports(&record).await?;
            self.add_module(&record)?;
            worklist.extend(imports);
        }

        self.add_dependencies()?;
        self.detect_circular_dependencies();
        self.detect_circular_imports();
        Ok(())
    }

    fn add_module(&mut self, record: &Arc<ModuleRecord>) -> Result<()> {
        let token = record.token().clone();
        if self.get_provider(&token).is_some() {
            return Err(GraphError::TokenCollision { token });
        }

        debug!(
            "Adding module {} (global: {}, dynamic: {})",
            record.name(),
            record.is_global(),
            record.is_dynamic()
        );
        let node = GraphNode::Module(ModuleNode {
            id: self.nodes.len(),
            label: record.name().to_string(),
            token: token.clone(),
            record: Arc::clone(record),
            is_global: record.is_global(),
            is_dynamic: record.is_dynamic(),
        });
        self.push_node(token.clone(), node);

        if record.is_global() {
            self.global_exports.extend(record.exports().iter().cloned());
        }

        for provider in record.providers() {
            let provider_token = provider.token().clone();
            match self.get_node(&provider_token) {
                Some(GraphNode::Module(_)) => {
                    return Err(GraphError::TokenCollision {
                        token: provider_token,
                    })
                }
                Some(GraphNode::Provider(existing)) => {
                    let kept = existing.module.clone();
                    if self.options.duplicate_providers == DuplicatePolicy::Reject {
                        return Err(GraphError::DuplicateProviderToken {
                            token: provider_token,
                            kept,
                            duplicate: token,
                        });
                    }
                    warn!(
                        "Provider {} declared in {} is ignored; already provided by {}",
                        provider_token, token, kept
                    );
                    self.issues.push(GraphIssue::DuplicateProviderToken {
                        token: provider_token.clone(),
                        kept,
                        ignored: token.clone(),
                    });
                }
                None => {
                    let node = GraphNode::Provider(ProviderNode {
                        id: self.nodes.len(),
                        label: format!("{} ({})", provider_token, provider.kind()),
                        token: provider_token.clone(),
                        scope: provider.scope_or(self.options.default_scope),
                        provider: provider.clone(),
                        module: token.clone(),
                    });
                    self.push_node(provider_token.clone(), node);
                }
            }

            self.push_edge(GraphEdge {
                kind: EdgeKind::Provider,
                source: provider_token,
                target: token.clone(),
                metadata: EdgeMetadata::default(),
            });
        }

        for imported in record.imports() {
            self.push_edge(GraphEdge {
                kind: EdgeKind::Import,
                source: imported.clone(),
                target: token.clone(),
                metadata: EdgeMetadata::default(),
            });
        }

        Ok(())
    }

    fn add_dependencies(&mut self) -> Result<()> {
        let providers: Vec<(Token, Token, Vec<_>)> = self
            .providers()
            .map(|node| {
                (
                    node.token.clone(),
                    node.module.clone(),
                    node.provider.dependencies(),
                )
            })
            .collect();

        for (provider, module, dependencies) in providers {
            for dependency in dependencies {
                let target = dependency
                    .token
                    .clone()
                    .ok_or_else(|| GraphError::MissingDependencyToken {
                        provider: provider.clone(),
                        kind: dependency.kind,
                        site: dependency.site.clone(),
                    })?;
                if let InjectionSite::Index(index) = dependency.site {
                    if index > MAX_PARAM_INDEX {
                        return Err(GraphError::ParamIndexOutOfRange {
                            provider,
                            index,
                            max: MAX_PARAM_INDEX,
                        });
                    }
                }

                let unreached = !self.is_provider_exported(&module, &target);
                if unreached {
                    warn!(
                        "{} in {} depends on {} at {}, which is not visible from {}",
                        provider, module, target, dependency.site, module
                    );
                    self.issues.push(GraphIssue::UnreachedDependency {
                        provider: provider.clone(),
                        module: module.clone(),
                        dependency: target.clone(),
                        kind: dependency.kind,
                        site: dependency.site.clone(),
                    });
                }

                self.push_edge(GraphEdge {
                    kind: EdgeKind::Dependency,
                    source: provider.clone(),
                    target,
                    metadata: EdgeMetadata {
                        is_circular: false,
                        unreached,
                        site: Some(dependency.site),
                        dependency: Some(dependency.kind),
                        lazy: dependency.lazy,
                    },
                });
            }
        }

        Ok(())
    }
}
