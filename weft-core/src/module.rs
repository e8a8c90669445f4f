//! Module definitions and module references

use futures::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::{Provider, Token};

static NEXT_DEFERRED: AtomicU64 = AtomicU64::new(1);

/// Static module definition
#[derive(Clone)]
pub struct ModuleDef {
    inner: Arc<ModuleInner>,
}

struct ModuleInner {
    token: Token,
    name: String,
    imports: Vec<ModuleRef>,
    providers: Vec<Provider>,
    exports: Vec<Token>,
    global: bool,
}

impl ModuleDef {
    /// Module identified by a string token
    pub fn builder(name: impl Into<String>) -> ModuleDefBuilder {
        let name = name.into();
        ModuleDefBuilder {
            token: Token::name(&name),
            name,
            imports: Vec::new(),
            providers: Vec::new(),
            exports: Vec::new(),
            global: false,
        }
    }

    /// Module identified by the class token of `T`
    pub fn builder_for<T: Any>() -> ModuleDefBuilder {
        let token = Token::of::<T>();
        ModuleDefBuilder {
            name: token.label(),
            token,
            imports: Vec::new(),
            providers: Vec::new(),
            exports: Vec::new(),
            global: false,
        }
    }

    pub fn token(&self) -> &Token {
        &self.inner.token
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn imports(&self) -> &[ModuleRef] {
        &self.inner.imports
    }

    pub fn providers(&self) -> &[Provider] {
        &self.inner.providers
    }

    pub fn exports(&self) -> &[Token] {
        &self.inner.exports
    }

    pub fn is_global(&self) -> bool {
        self.inner.global
    }
}

impl fmt::Debug for ModuleDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDef")
            .field("token", &self.inner.token)
            .field("imports", &self.inner.imports.len())
            .field("providers", &self.inner.providers.len())
            .field("exports", &self.inner.exports)
            .field("global", &self.inner.global)
            .finish()
    }
}

/// Builder for [`ModuleDef`]
pub struct ModuleDefBuilder {
    token: Token,
    name: String,
    imports: Vec<ModuleRef>,
    providers: Vec<Provider>,
    exports: Vec<Token>,
    global: bool,
}

impl ModuleDefBuilder {
    pub fn import(mut self, module: impl Into<ModuleRef>) -> Self {
        self.imports.push(module.into());
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn export(mut self, token: impl Into<Token>) -> Self {
        self.exports.push(token.into());
        self
    }

    /// Exports of a global module are visible everywhere
    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    pub fn build(self) -> ModuleDef {
        ModuleDef {
            inner: Arc::new(ModuleInner {
                token: self.token,
                name: self.name,
                imports: self.imports,
                providers: self.providers,
                exports: self.exports,
                global: self.global,
            }),
        }
    }
}

/// Module computed at graph-build time on top of a static base module
///
/// The effective shape is the base module's imports, providers and exports
/// followed by the dynamic additions.
#[derive(Clone)]
pub struct DynamicModule {
    inner: Arc<DynamicInner>,
}

#[derive(Clone)]
struct DynamicInner {
    module: ModuleDef,
    imports: Vec<ModuleRef>,
    providers: Vec<Provider>,
    exports: Vec<Token>,
    global: Option<bool>,
}

impl DynamicModule {
    pub fn new(module: &ModuleDef) -> Self {
        Self {
            inner: Arc::new(DynamicInner {
                module: module.clone(),
                imports: Vec::new(),
                providers: Vec::new(),
                exports: Vec::new(),
                global: None,
            }),
        }
    }

    fn edit(mut self, f: impl FnOnce(&mut DynamicInner)) -> Self {
        f(Arc::make_mut(&mut self.inner));
        self
    }

    pub fn import(self, module: impl Into<ModuleRef>) -> Self {
        let module = module.into();
        self.edit(|inner| inner.imports.push(module))
    }

    pub fn provider(self, provider: Provider) -> Self {
        self.edit(|inner| inner.providers.push(provider))
    }

    pub fn export(self, token: impl Into<Token>) -> Self {
        let token = token.into();
        self.edit(|inner| inner.exports.push(token))
    }

    /// Override the base module's global flag
    pub fn global(self, global: bool) -> Self {
        self.edit(|inner| inner.global = Some(global))
    }

    /// The static module this dynamic module extends
    pub fn base(&self) -> &ModuleDef {
        &self.inner.module
    }

    pub fn imports(&self) -> impl Iterator<Item = &ModuleRef> {
        self.inner.module.imports().iter().chain(self.inner.imports.iter())
    }

    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.inner
            .module
            .providers()
            .iter()
            .chain(self.inner.providers.iter())
    }

    pub fn exports(&self) -> impl Iterator<Item = &Token> {
        self.inner.module.exports().iter().chain(self.inner.exports.iter())
    }

    pub fn is_global(&self) -> bool {
        self.inner.global.unwrap_or_else(|| self.inner.module.is_global())
    }
}

impl fmt::Debug for DynamicModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicModule")
            .field("module", self.inner.module.token())
            .field("imports", &self.inner.imports.len())
            .field("providers", &self.inner.providers.len())
            .field("exports", &self.inner.exports)
            .finish()
    }
}

/// Async factory producing a dynamic module
pub type ModuleFactory = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<DynamicModule>> + Send + Sync>;

/// Dynamic module whose shape comes from an async factory
///
/// Each `DeferredModule` value has its own identity; clones share it. A
/// registry runs the factory at most once per identity.
#[derive(Clone)]
pub struct DeferredModule {
    id: u64,
    label: Arc<str>,
    factory: ModuleFactory,
}

impl DeferredModule {
    pub fn new<F, Fut>(label: &str, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<DynamicModule>> + Send + 'static,
    {
        let factory: ModuleFactory = Arc::new(move || -> BoxFuture<'static, anyhow::Result<DynamicModule>> {
            Box::pin(factory())
        });
        Self {
            id: NEXT_DEFERRED.fetch_add(1, Ordering::Relaxed),
            label: Arc::from(label),
            factory,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run the factory
    pub fn produce(&self) -> BoxFuture<'static, anyhow::Result<DynamicModule>> {
        (self.factory)()
    }
}

/// Lazily evaluated module reference, for modules that import each other
#[derive(Clone)]
pub struct ForwardRef {
    resolve: Arc<dyn Fn() -> ModuleRef + Send + Sync>,
}

impl ForwardRef {
    pub fn resolve(&self) -> ModuleRef {
        (self.resolve)()
    }

    /// Address of the closure, stable for the lifetime of this reference
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.resolve) as *const () as usize
    }
}

/// An entry of a module's `imports`, or a compile root
#[derive(Clone)]
pub enum ModuleRef {
    Static(ModuleDef),
    Dynamic(DynamicModule),
    Deferred(DeferredModule),
    Forward(ForwardRef),
    /// Module registered with the container under this token
    Named(Token),
}

impl ModuleRef {
    pub fn forward<F>(resolve: F) -> Self
    where
        F: Fn() -> ModuleRef + Send + Sync + 'static,
    {
        ModuleRef::Forward(ForwardRef {
            resolve: Arc::new(resolve),
        })
    }

    pub fn named(token: impl Into<Token>) -> Self {
        ModuleRef::Named(token.into())
    }

    /// Short description for logs and error messages
    pub fn describe(&self) -> String {
        match self {
            ModuleRef::Static(module) => module.name().to_string(),
            ModuleRef::Dynamic(module) => format!("{} (dynamic)", module.base().name()),
            ModuleRef::Deferred(module) => format!("{} (deferred)", module.label()),
            ModuleRef::Forward(_) => "<forward ref>".to_string(),
            ModuleRef::Named(token) => token.to_string(),
        }
    }
}

impl fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleRef::Static(module) => f.debug_tuple("Static").field(module.token()).finish(),
            ModuleRef::Dynamic(module) => f.debug_tuple("Dynamic").field(module).finish(),
            ModuleRef::Deferred(module) => f
                .debug_tuple("Deferred")
                .field(&module.id)
                .field(&&*module.label)
                .finish(),
            ModuleRef::Forward(_) => f.write_str("Forward(..)"),
            ModuleRef::Named(token) => f.debug_tuple("Named").field(token).finish(),
        }
    }
}

impl From<ModuleDef> for ModuleRef {
    fn from(module: ModuleDef) -> Self {
        ModuleRef::Static(module)
    }
}

impl From<&ModuleDef> for ModuleRef {
    fn from(module: &ModuleDef) -> Self {
        ModuleRef::Static(module.clone())
    }
}

impl From<DynamicModule> for ModuleRef {
    fn from(module: DynamicModule) -> Self {
        ModuleRef::Dynamic(module)
    }
}

impl From<DeferredModule> for ModuleRef {
    fn from(module: DeferredModule) -> Self {
        ModuleRef::Deferred(module)
    }
}
