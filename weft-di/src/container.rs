//! Container orchestrating registry, graph and resolver

use std::any::{type_name, Any};
use std::sync::Arc;
use tracing::{debug, info, warn};
use weft_core::{Instance, ModuleRef, Token};
use weft_graph::{dynamic_token, GraphIssue, ModuleGraph, ModuleRecord, ModuleRegistry};

use crate::config::ContainerConfig;
use crate::error::{DiError, DiResult};
use crate::manifest::{ModuleManifest, ProviderCatalog};
use crate::resolver::{ProviderResolver, ResolutionContext};

/// Upper bound on forward references followed to name a module
const MAX_FORWARD_HOPS: usize = 64;

/// IoC container: one registry, one compiled graph and one resolver
///
/// ```no_run
/// # async fn demo() -> weft_di::DiResult<()> {
/// use weft_core::{ModuleDef, Provider};
/// use weft_di::Container;
///
/// let app = ModuleDef::builder("App")
///     .provider(Provider::value("PORT", 8080u16))
///     .build();
///
/// let mut container = Container::new();
/// container.run(app).await?;
/// let port = container.get::<u16>("PORT").await?;
/// assert_eq!(port.as_deref(), Some(&8080));
/// # Ok(())
/// # }
/// ```
pub struct Container {
    config: ContainerConfig,
    registry: ModuleRegistry,
    root: Option<ModuleRef>,
    extra_roots: Vec<ModuleRef>,
    resolver: Option<Arc<ProviderResolver>>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        Self {
            config,
            registry: ModuleRegistry::new(),
            root: None,
            extra_roots: Vec::new(),
            resolver: None,
        }
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Build and compile the graph rooted at `root`
    ///
    /// On failure a running container keeps serving its previous graph.
    pub async fn run(&mut self, root: impl Into<ModuleRef>) -> DiResult<()> {
        let root = root.into();
        info!("Starting container from {}", root.describe());
        let previous = self.root.replace(root);
        if let Err(err) = self.compile().await {
            self.root = previous;
            return Err(err);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.resolver.is_some()
    }

    /// Compile a fresh graph and swap it in
    ///
    /// The registry records of the previous graph are restored when the
    /// compile fails, and the current resolver is left in place.
    async fn compile(&mut self) -> DiResult<()> {
        let Some(root) = self.root.clone() else {
            return Ok(());
        };

        let mut roots = vec![root];
        roots.extend(self.extra_roots.iter().cloned());

        let previous = self.registry.take_records();
        let mut graph = ModuleGraph::new(self.config.compile_options());
        if let Err(err) = graph.compile(&mut self.registry, &roots).await {
            warn!("Compile failed, keeping the previous graph: {}", err);
            self.registry.restore_records(previous);
            return Err(err.into());
        }

        self.resolver = Some(Arc::new(ProviderResolver::new(Arc::new(graph))));
        Ok(())
    }

    fn resolver(&self) -> DiResult<&Arc<ProviderResolver>> {
        self.resolver.as_ref().ok_or(DiError::NotCompiled)
    }

    /// The compiled graph
    pub fn graph(&self) -> DiResult<&ModuleGraph> {
        Ok(&**self.resolver()?.graph())
    }

    /// Problems recorded while compiling the graph
    pub fn issues(&self) -> DiResult<&[GraphIssue]> {
        Ok(self.graph()?.issues())
    }

    /// Resolve `token` to an untyped instance
    pub async fn get_instance(&self, token: impl Into<Token>) -> DiResult<Option<Instance>> {
        let token = token.into();
        self.resolver()?.resolve_provider(&token).await
    }

    /// Resolve `token` to an instance of `T`
    pub async fn get<T: Any + Send + Sync>(&self, token: impl Into<Token>) -> DiResult<Option<Arc<T>>> {
        let token = token.into();
        let instance = self.resolver()?.resolve_provider(&token).await?;
        instance.map(|instance| downcast(&token, instance)).transpose()
    }

    /// Resolve the provider registered under the class token of `T`
    pub async fn resolve<T: Any + Send + Sync>(&self) -> DiResult<Option<Arc<T>>> {
        self.get::<T>(Token::of::<T>()).await
    }

    /// Resolution scope whose request-scoped instances are shared across calls
    pub fn request_scope(&self) -> DiResult<RequestScope> {
        Ok(RequestScope {
            resolver: Arc::clone(self.resolver()?),
            context: ResolutionContext::new(),
        })
    }

    /// Register a module under its token and compile it as an extra root
    ///
    /// Other modules can import it as `ModuleRef::Named(token)`. A running
    /// container recompiles, dropping cached singletons. For deferred modules
    /// the token is the module label, an alias of the record token the
    /// factory output gets; [`get_module`] accepts either.
    ///
    /// When the recompile fails the module is not added and the container
    /// keeps its previous graph.
    ///
    /// [`get_module`]: Container::get_module
    pub async fn add_module(&mut self, module: impl Into<ModuleRef>) -> DiResult<Token> {
        let module = module.into();
        let token = module_token(&module)?;
        debug!("Adding module {}", token);
        let previous = self.registry.define(token.clone(), module.clone());
        self.extra_roots.push(module);

        if self.is_running() {
            if let Err(err) = self.compile().await {
                self.extra_roots.pop();
                match previous {
                    Some(definition) => self.registry.define(token, definition),
                    None => self.registry.remove_definition(&token),
                };
                return Err(err);
            }
        }
        Ok(token)
    }

    /// Use `replacement` wherever the module `original` is referenced
    ///
    /// `original` may be a record token or a name the module was defined
    /// under. A running container recompiles, dropping cached singletons;
    /// when that fails the override is withdrawn and the previous graph
    /// stays in place.
    pub async fn replace_module(
        &mut self,
        original: impl Into<Token>,
        replacement: impl Into<ModuleRef>,
    ) -> DiResult<()> {
        let original = original.into();
        let original = self
            .registry
            .lookup(&original)
            .map(|record| record.token().clone())
            .unwrap_or(original);
        let replacement = replacement.into();
        debug!("Replacing module {} with {}", original, replacement.describe());
        let previous = self.registry.override_module(original.clone(), replacement);

        if self.is_running() {
            if let Err(err) = self.compile().await {
                match previous {
                    Some(replacement) => self.registry.override_module(original, replacement),
                    None => self.registry.remove_override(&original),
                };
                return Err(err);
            }
        }
        Ok(())
    }

    /// The record of a compiled module, by record token or defined name
    pub fn get_module(&self, token: impl Into<Token>) -> Option<Arc<ModuleRecord>> {
        self.registry.lookup(&token.into())
    }

    /// Register the modules of a manifest and return a reference to its root
    pub fn load_manifest(
        &mut self,
        manifest: &ModuleManifest,
        catalog: &ProviderCatalog,
    ) -> DiResult<ModuleRef> {
        let root = manifest
            .root()
            .ok_or_else(|| DiError::Config("Manifest declares no modules".to_string()))?;

        for module in manifest.into_modules(catalog)? {
            self.registry
                .define(module.token().clone(), ModuleRef::Static(module));
        }
        Ok(ModuleRef::Named(root))
    }
}

/// Resolution scope sharing request-scoped instances across `get` calls
pub struct RequestScope {
    resolver: Arc<ProviderResolver>,
    context: ResolutionContext,
}

impl RequestScope {
    pub async fn get_instance(&mut self, token: impl Into<Token>) -> DiResult<Option<Instance>> {
        let token = token.into();
        self.resolver.resolve_in(&token, &mut self.context).await
    }

    pub async fn get<T: Any + Send + Sync>(&mut self, token: impl Into<Token>) -> DiResult<Option<Arc<T>>> {
        let token = token.into();
        let instance = self.resolver.resolve_in(&token, &mut self.context).await?;
        instance.map(|instance| downcast(&token, instance)).transpose()
    }
}

fn downcast<T: Any + Send + Sync>(token: &Token, instance: Instance) -> DiResult<Arc<T>> {
    instance.downcast::<T>().map_err(|_| DiError::TypeMismatch {
        token: token.clone(),
        expected: type_name::<T>(),
    })
}

/// Token a module is registered under
fn module_token(module: &ModuleRef) -> DiResult<Token> {
    let mut current = module.clone();
    for _ in 0..MAX_FORWARD_HOPS {
        current = match current {
            ModuleRef::Static(module) => return Ok(module.token().clone()),
            ModuleRef::Dynamic(module) => return Ok(dynamic_token(&module)),
            ModuleRef::Deferred(module) => return Ok(Token::name(module.label())),
            ModuleRef::Forward(forward) => forward.resolve(),
            ModuleRef::Named(token) => {
                return Err(DiError::Config(format!(
                    "Cannot register named reference {} as a module",
                    token
                )))
            }
        };
    }
    Err(DiError::Config(format!(
        "Forward reference {} does not resolve to a module",
        module.describe()
    )))
}
