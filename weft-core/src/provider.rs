//! Provider descriptors and class definitions

use futures::future::BoxFuture;
use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::injected::Injected;
use crate::lifecycle::{init_hook, InitHook, Lifecycle};
use crate::{Instance, Scope, Token};

/// Constructor of a class definition
pub type Constructor = Arc<dyn Fn(&Injected) -> anyhow::Result<Instance> + Send + Sync>;

/// Factory function of a factory provider
pub type FactoryFn = Arc<dyn Fn(Injected) -> BoxFuture<'static, anyhow::Result<Instance>> + Send + Sync>;

/// Erase an async factory returning `T` into a [`FactoryFn`]
pub fn factory_fn<T, F, Fut>(factory: F) -> FactoryFn
where
    T: Any + Send + Sync,
    F: Fn(Injected) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    Arc::new(move |args: Injected| -> BoxFuture<'static, anyhow::Result<Instance>> {
        let fut = factory(args);
        Box::pin(async move { fut.await.map(|value| Arc::new(value) as Instance) })
    })
}

/// Kind of a dependency declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// Constructor parameter
    Constructor,
    /// Property injection
    Property,
    /// Entry of a factory `inject` list
    Factory,
}

/// Highest positional injection index a graph accepts
pub const MAX_PARAM_INDEX: usize = 255;

/// Where a resolved dependency is delivered
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InjectionSite {
    /// Positional constructor or factory argument
    Index(usize),
    /// Named property
    Key(Arc<str>),
}

impl fmt::Display for InjectionSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionSite::Index(index) => write!(f, "#{}", index),
            InjectionSite::Key(key) => write!(f, ".{}", key),
        }
    }
}

/// A declared dependency of a provider
///
/// `token` is `None` when the metadata source could not determine what to
/// inject. Compiling a graph containing such a declaration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub kind: DependencyKind,
    pub site: InjectionSite,
    pub token: Option<Token>,
    pub lazy: bool,
}

impl Dependency {
    pub fn param(index: usize, token: impl Into<Token>) -> Self {
        Self {
            kind: DependencyKind::Constructor,
            site: InjectionSite::Index(index),
            token: Some(token.into()),
            lazy: false,
        }
    }

    pub fn property(key: &str, token: impl Into<Token>) -> Self {
        Self {
            kind: DependencyKind::Property,
            site: InjectionSite::Key(Arc::from(key)),
            token: Some(token.into()),
            lazy: false,
        }
    }

    /// Mark as a deliberately deferred reference
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }
}

/// Class definition: identity, dependency metadata and constructor
#[derive(Clone)]
pub struct ClassDef {
    inner: Arc<ClassInner>,
}

struct ClassInner {
    token: Token,
    name: &'static str,
    dependencies: Vec<Dependency>,
    constructor: Constructor,
    init: Option<InitHook>,
}

impl ClassDef {
    /// Start a definition for `T` built by `constructor`
    pub fn builder<T, F>(constructor: F) -> ClassDefBuilder
    where
        T: Any + Send + Sync,
        F: Fn(&Injected) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        ClassDefBuilder {
            token: Token::of::<T>(),
            name: type_name::<T>(),
            dependencies: Vec::new(),
            next_index: 0,
            constructor: Arc::new(move |injected: &Injected| {
                constructor(injected).map(|value| Arc::new(value) as Instance)
            }),
            init: None,
        }
    }

    /// The class token, `Token::of::<T>()`
    pub fn token(&self) -> &Token {
        &self.inner.token
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Constructor parameters followed by properties, in declaration order
    pub fn dependencies(&self) -> &[Dependency] {
        &self.inner.dependencies
    }

    pub fn construct(&self, injected: &Injected) -> anyhow::Result<Instance> {
        (self.inner.constructor)(injected)
    }

    pub fn init_hook(&self) -> Option<&InitHook> {
        self.inner.init.as_ref()
    }

    /// Address of the shared definition; clones report the same value
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.inner.name)
            .field("dependencies", &self.inner.dependencies)
            .field("init", &self.inner.init.is_some())
            .finish()
    }
}

/// Builder for [`ClassDef`]
pub struct ClassDefBuilder {
    token: Token,
    name: &'static str,
    dependencies: Vec<Dependency>,
    next_index: usize,
    constructor: Constructor,
    init: Option<InitHook>,
}

impl ClassDefBuilder {
    /// Next constructor parameter
    pub fn param(self, token: impl Into<Token>) -> Self {
        let index = self.next_index;
        self.dependency(Dependency::param(index, token))
    }

    /// Next constructor parameter, marked lazy
    pub fn lazy_param(self, token: impl Into<Token>) -> Self {
        let index = self.next_index;
        self.dependency(Dependency::param(index, token).lazy())
    }

    /// Injected property
    pub fn property(self, key: &str, token: impl Into<Token>) -> Self {
        self.dependency(Dependency::property(key, token))
    }

    /// Raw dependency metadata, as produced by an external metadata source
    pub fn dependency(mut self, dependency: Dependency) -> Self {
        if let InjectionSite::Index(index) = dependency.site {
            self.next_index = self.next_index.max(index.saturating_add(1));
        }
        self.dependencies.push(dependency);
        self
    }

    /// Run `T::on_init` after construction
    pub fn on_init<T: Lifecycle>(mut self) -> Self {
        self.init = Some(init_hook::<T>());
        self
    }

    pub fn build(self) -> ClassDef {
        // Parameters first in index order, then properties as declared.
        let mut dependencies = self.dependencies;
        dependencies.sort_by_key(|dependency| match dependency.site {
            InjectionSite::Index(index) => (0, index),
            InjectionSite::Key(_) => (1, 0),
        });

        ClassDef {
            inner: Arc::new(ClassInner {
                token: self.token,
                name: self.name,
                dependencies,
                constructor: self.constructor,
                init: self.init,
            }),
        }
    }
}

/// A unit of injectable behavior registered under a token
#[derive(Clone, Debug)]
pub enum Provider {
    Class(ClassProvider),
    Value(ValueProvider),
    Factory(FactoryProvider),
}

/// Class provider, shorthand or `use_class`
#[derive(Clone, Debug)]
pub struct ClassProvider {
    pub provide: Token,
    pub class: ClassDef,
    pub scope: Option<Scope>,
}

/// Value provider, returned as-is
#[derive(Clone)]
pub struct ValueProvider {
    pub provide: Token,
    pub value: Instance,
}

/// Factory provider
#[derive(Clone)]
pub struct FactoryProvider {
    pub provide: Token,
    pub inject: Vec<Token>,
    pub factory: FactoryFn,
    pub scope: Option<Scope>,
}

impl Provider {
    /// Shorthand class provider: the class is its own token
    pub fn class(class: ClassDef) -> Self {
        Provider::Class(ClassProvider {
            provide: class.token().clone(),
            class,
            scope: None,
        })
    }

    /// Class provider registered under another token
    pub fn use_class(provide: impl Into<Token>, class: ClassDef) -> Self {
        Provider::Class(ClassProvider {
            provide: provide.into(),
            class,
            scope: None,
        })
    }

    pub fn value<T: Any + Send + Sync>(provide: impl Into<Token>, value: T) -> Self {
        Self::value_instance(provide, Arc::new(value))
    }

    /// Value provider around an already shared instance
    pub fn value_instance(provide: impl Into<Token>, value: Instance) -> Self {
        Provider::Value(ValueProvider {
            provide: provide.into(),
            value,
        })
    }

    /// Factory provider; `factory` receives the resolved `inject` tokens
    /// positionally
    pub fn factory<T, F, Fut>(provide: impl Into<Token>, inject: Vec<Token>, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Injected) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Provider::Factory(FactoryProvider {
            provide: provide.into(),
            inject,
            factory: factory_fn(factory),
            scope: None,
        })
    }

    /// Set an explicit scope. Value providers ignore it.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        match &mut self {
            Provider::Class(class) => class.scope = Some(scope),
            Provider::Factory(factory) => factory.scope = Some(scope),
            Provider::Value(_) => {}
        }
        self
    }

    pub fn token(&self) -> &Token {
        match self {
            Provider::Class(class) => &class.provide,
            Provider::Value(value) => &value.provide,
            Provider::Factory(factory) => &factory.provide,
        }
    }

    /// Effective scope, falling back to `default` when none was declared
    pub fn scope_or(&self, default: Scope) -> Scope {
        match self {
            Provider::Class(class) => class.scope.unwrap_or(default),
            Provider::Factory(factory) => factory.scope.unwrap_or(default),
            Provider::Value(_) => Scope::Singleton,
        }
    }

    /// Declared dependencies in resolution order
    pub fn dependencies(&self) -> Vec<Dependency> {
        match self {
            Provider::Class(class) => class.class.dependencies().to_vec(),
            Provider::Value(_) => Vec::new(),
            Provider::Factory(factory) => factory
                .inject
                .iter()
                .enumerate()
                .map(|(index, token)| Dependency {
                    kind: DependencyKind::Factory,
                    site: InjectionSite::Index(index),
                    token: Some(token.clone()),
                    lazy: false,
                })
                .collect(),
        }
    }

    /// Address of the shared class, value or factory behind this provider
    pub fn identity(&self) -> usize {
        match self {
            Provider::Class(class) => class.class.identity(),
            Provider::Value(value) => Arc::as_ptr(&value.value) as *const () as usize,
            Provider::Factory(factory) => Arc::as_ptr(&factory.factory) as *const () as usize,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Provider::Class(_) => "class",
            Provider::Value(_) => "value",
            Provider::Factory(_) => "factory",
        }
    }
}

impl fmt::Debug for ValueProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueProvider")
            .field("provide", &self.provide)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for FactoryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryProvider")
            .field("provide", &self.provide)
            .field("inject", &self.inject)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
