use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use weft_core::{
    ClassDef, DeferredModule, DynamicModule, Injected, Lifecycle, ModuleDef, ModuleRef, Provider,
    Scope, Token,
};
use weft_di::{
    Container, ContainerConfig, DiError, GraphIssue, ModuleManifest, ProviderCatalog,
};
use weft_graph::{EdgeKind, GraphError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug)]
struct ServiceA;

struct ServiceB {
    a: Option<Arc<ServiceA>>,
}

fn service_a() -> ClassDef {
    ClassDef::builder(|_: &Injected| Ok(ServiceA)).build()
}

fn service_b() -> ClassDef {
    ClassDef::builder(|deps: &Injected| {
        Ok(ServiceB {
            a: deps.param::<ServiceA>(0),
        })
    })
    .param(Token::of::<ServiceA>())
    .build()
}

#[tokio::test]
async fn test_get_before_run_fails() {
    let container = Container::new();
    let err = container.get::<ServiceA>(Token::of::<ServiceA>()).await.unwrap_err();
    assert!(matches!(err, DiError::NotCompiled));
    assert!(matches!(container.graph(), Err(DiError::NotCompiled)));
}

#[tokio::test]
async fn test_exported_service_is_injected() {
    init_tracing();
    let m1 = ModuleDef::builder("M1")
        .provider(Provider::class(service_a()))
        .export(Token::of::<ServiceA>())
        .build();
    let m2 = ModuleDef::builder("M2")
        .import(m1)
        .provider(Provider::class(service_b()))
        .build();

    let mut container = Container::new();
    container.run(m2).await.unwrap();

    let b = container.resolve::<ServiceB>().await.unwrap().unwrap();
    let a = container.resolve::<ServiceA>().await.unwrap().unwrap();
    assert!(Arc::ptr_eq(b.a.as_ref().unwrap(), &a));
    assert!(container.issues().unwrap().is_empty());
}

#[tokio::test]
async fn test_unexported_service_is_not_injected() {
    let m1 = ModuleDef::builder("M1")
        .provider(Provider::class(service_a()))
        .build();
    let m2 = ModuleDef::builder("M2")
        .import(m1)
        .provider(Provider::class(service_b()))
        .build();

    let mut container = Container::new();
    container.run(m2).await.unwrap();

    let b = container.resolve::<ServiceB>().await.unwrap().unwrap();
    assert!(b.a.is_none());
    assert!(matches!(
        container.issues().unwrap(),
        [GraphIssue::UnreachedDependency { .. }]
    ));
}

struct Left {
    right: Option<Arc<Right>>,
}

struct Right {
    left: Option<Arc<Left>>,
}

#[tokio::test]
async fn test_cycle_between_unrelated_modules_resolves() {
    init_tracing();
    let left = ClassDef::builder(|deps: &Injected| {
        Ok(Left {
            right: deps.property::<Right>("right"),
        })
    })
    .property("right", "Right")
    .build();
    let right = ClassDef::builder(|deps: &Injected| {
        Ok(Right {
            left: deps.property::<Left>("left"),
        })
    })
    .property("left", "Left")
    .build();
    let x = ModuleDef::builder("X")
        .provider(Provider::use_class("Left", left))
        .build();
    let y = ModuleDef::builder("Y")
        .provider(Provider::use_class("Right", right))
        .build();
    let root = ModuleDef::builder("Root").import(x).import(y).build();

    let mut container = Container::new();
    container.run(root).await.unwrap();

    let l = container.get::<Left>("Left").await.unwrap().unwrap();
    let r = container.get::<Right>("Right").await.unwrap().unwrap();
    assert!(l.right.is_none());
    assert!(r.left.is_none());

    let graph = container.graph().unwrap();
    assert!(graph.get_edge(&"Left".into(), &"Right".into()).unwrap().is_circular());
    assert!(graph.get_edge(&"Right".into(), &"Left".into()).unwrap().is_circular());
}

#[tokio::test]
async fn test_cycle_across_importing_modules_terminates() {
    fn left_module() -> ModuleRef {
        let left = ClassDef::builder(|deps: &Injected| {
            Ok(Left {
                right: deps.param::<Right>(0),
            })
        })
        .param(Token::of::<Right>())
        .build();
        ModuleDef::builder("LeftModule")
            .import(ModuleRef::forward(right_module))
            .provider(Provider::class(left))
            .export(Token::of::<Left>())
            .build()
            .into()
    }

    fn right_module() -> ModuleRef {
        let right = ClassDef::builder(|deps: &Injected| {
            Ok(Right {
                left: deps.param::<Left>(0),
            })
        })
        .param(Token::of::<Left>())
        .build();
        ModuleDef::builder("RightModule")
            .import(ModuleRef::forward(left_module))
            .provider(Provider::class(right))
            .export(Token::of::<Right>())
            .build()
            .into()
    }

    let mut container = Container::with_config(ContainerConfig::default().with_default_scope(Scope::Transient));
    container.run(left_module()).await.unwrap();

    let left = container.resolve::<Left>().await.unwrap().unwrap();
    let right = left.right.as_ref().unwrap();
    assert!(right.left.is_none());

    let right = container.resolve::<Right>().await.unwrap().unwrap();
    assert!(right.left.as_ref().unwrap().right.is_none());

    let graph = container.graph().unwrap();
    let forward = graph.get_edge(&Token::of::<Left>(), &Token::of::<Right>()).unwrap();
    let back = graph.get_edge(&Token::of::<Right>(), &Token::of::<Left>()).unwrap();
    assert!(forward.is_circular() && !forward.is_unreached());
    assert!(back.is_circular() && !back.is_unreached());

    let issues = container.issues().unwrap();
    assert!(issues.iter().any(|i| matches!(i, GraphIssue::CircularImport { .. })));
    assert!(issues
        .iter()
        .any(|i| matches!(i, GraphIssue::CircularProviderDependency { .. })));
}

fn app_module() -> ModuleDef {
    let shared = ModuleDef::builder("Shared")
        .provider(Provider::class(service_a()))
        .export(Token::of::<ServiceA>())
        .build();
    let users = ModuleDef::builder("Users")
        .import(&shared)
        .provider(Provider::class(service_b()))
        .build();
    let orders = ModuleDef::builder("Orders")
        .import(&shared)
        .provider(Provider::value("ORDERS", "orders"))
        .build();
    ModuleDef::builder("App").import(users).import(orders).build()
}

#[tokio::test]
async fn test_compiles_are_structurally_identical() {
    let summary = |container: &Container| {
        let graph = container.graph().unwrap();
        let edges: Vec<_> = graph
            .edges()
            .iter()
            .map(|e| (e.kind, e.source.clone(), e.target.clone(), e.is_circular(), e.is_unreached()))
            .collect();
        (graph.nodes().len(), edges)
    };

    let mut first = Container::new();
    first.run(app_module()).await.unwrap();
    let mut second = Container::new();
    second.run(app_module()).await.unwrap();

    assert_eq!(summary(&first), summary(&second));
}

#[tokio::test]
async fn test_diamond_import_single_node() {
    let mut container = Container::new();
    container.run(app_module()).await.unwrap();

    let graph = container.graph().unwrap();
    let shared = graph
        .modules()
        .filter(|module| module.token == Token::name("Shared"))
        .count();
    assert_eq!(shared, 1);
    assert_eq!(
        graph
            .edges_from(&Token::name("Shared"))
            .filter(|e| e.kind == EdgeKind::Import)
            .count(),
        2
    );
    assert!(container.get_module("Shared").is_some());
}

#[derive(Debug, PartialEq)]
struct AppConfig {
    a: u32,
}

#[tokio::test]
async fn test_value_provider_identity() {
    let root = ModuleDef::builder("App")
        .provider(Provider::value("CONFIG", AppConfig { a: 1 }))
        .build();
    let mut container = Container::new();
    container.run(root).await.unwrap();

    let first = container.get::<AppConfig>("CONFIG").await.unwrap().unwrap();
    let second = container.get::<AppConfig>("CONFIG").await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.a, 1);
}

struct Helper {
    id: usize,
}

struct Connection {
    url: String,
    helper: usize,
}

#[tokio::test]
async fn test_factory_receives_injected_values_in_order() {
    let order = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&order);
    let url = Provider::factory("URL", vec![], move |_: Injected| {
        log.lock().push("URL");
        async { Ok::<_, anyhow::Error>("postgres://db".to_string()) }
    });
    let log = Arc::clone(&order);
    let helper = ClassDef::builder(move |_: &Injected| {
        log.lock().push("Helper");
        Ok(Helper { id: 7 })
    })
    .build();
    let log = Arc::clone(&order);
    let connection = Provider::factory(
        "CONNECTION",
        vec!["URL".into(), Token::of::<Helper>()],
        move |args: Injected| {
            log.lock().push("factory");
            async move {
                let url = args.require_param::<String>(0)?;
                let helper = args.require_param::<Helper>(1)?;
                Ok::<_, anyhow::Error>(Connection {
                    url: url.to_string(),
                    helper: helper.id,
                })
            }
        },
    );
    let root = ModuleDef::builder("Db")
        .provider(url)
        .provider(Provider::class(helper))
        .provider(connection)
        .build();

    let mut container = Container::new();
    container.run(root).await.unwrap();

    let connection = container.get::<Connection>("CONNECTION").await.unwrap().unwrap();
    assert_eq!(connection.url, "postgres://db");
    assert_eq!(connection.helper, 7);
    assert_eq!(*order.lock(), vec!["URL", "Helper", "factory"]);
}

struct Session;

#[tokio::test]
async fn test_request_scope_shares_instances() {
    let session = ClassDef::builder(|_: &Injected| Ok(Session)).build();
    let root = ModuleDef::builder("App")
        .provider(Provider::class(session).with_scope(Scope::Request))
        .build();
    let mut container = Container::new();
    container.run(root).await.unwrap();

    let mut scope = container.request_scope().unwrap();
    let a = scope.get::<Session>(Token::of::<Session>()).await.unwrap().unwrap();
    let b = scope.get::<Session>(Token::of::<Session>()).await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let other = container.resolve::<Session>().await.unwrap().unwrap();
    assert!(!Arc::ptr_eq(&a, &other));
}

struct RequestState;

struct Handler {
    state: Option<Arc<RequestState>>,
}

struct Endpoint {
    state: Option<Arc<RequestState>>,
    handler: Option<Arc<Handler>>,
}

#[tokio::test]
async fn test_request_scope_spans_one_resolution_tree() {
    let state = ClassDef::builder(|_: &Injected| Ok(RequestState)).build();
    let handler = ClassDef::builder(|deps: &Injected| {
        Ok(Handler {
            state: deps.param::<RequestState>(0),
        })
    })
    .param(Token::of::<RequestState>())
    .build();
    let endpoint = ClassDef::builder(|deps: &Injected| {
        Ok(Endpoint {
            state: deps.param::<RequestState>(0),
            handler: deps.param::<Handler>(1),
        })
    })
    .param(Token::of::<RequestState>())
    .param(Token::of::<Handler>())
    .build();
    let root = ModuleDef::builder("App")
        .provider(Provider::class(state).with_scope(Scope::Request))
        .provider(Provider::class(handler).with_scope(Scope::Transient))
        .provider(Provider::class(endpoint).with_scope(Scope::Transient))
        .build();
    let mut container = Container::new();
    container.run(root).await.unwrap();

    let first = container.resolve::<Endpoint>().await.unwrap().unwrap();
    let direct = first.state.clone().unwrap();
    let via_handler = first.handler.as_ref().unwrap().state.clone().unwrap();
    assert!(Arc::ptr_eq(&direct, &via_handler));

    let second = container.resolve::<Endpoint>().await.unwrap().unwrap();
    assert!(!Arc::ptr_eq(&direct, second.state.as_ref().unwrap()));
}

#[tokio::test]
async fn test_transient_default_scope() {
    let root = ModuleDef::builder("App")
        .provider(Provider::class(service_a()))
        .build();
    let config = ContainerConfig::from_toml(r#"default_scope = "transient""#).unwrap();
    let mut container = Container::with_config(config);
    container.run(root).await.unwrap();

    let a = container.resolve::<ServiceA>().await.unwrap().unwrap();
    let b = container.resolve::<ServiceA>().await.unwrap().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
}

static DATABASE_INITS: AtomicUsize = AtomicUsize::new(0);

struct Database;

#[async_trait]
impl Lifecycle for Database {
    async fn on_init(&self) -> anyhow::Result<()> {
        DATABASE_INITS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_init_hook_runs_once_for_singletons() {
    let database = ClassDef::builder(|_: &Injected| Ok(Database))
        .on_init::<Database>()
        .build();
    let root = ModuleDef::builder("App")
        .provider(Provider::class(database))
        .build();
    let mut container = Container::new();
    container.run(root).await.unwrap();

    container.resolve::<Database>().await.unwrap().unwrap();
    container.resolve::<Database>().await.unwrap().unwrap();
    assert_eq!(DATABASE_INITS.load(Ordering::SeqCst), 1);
}

static BROKEN_ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug)]
struct Broken;

#[async_trait]
impl Lifecycle for Broken {
    async fn on_init(&self) -> anyhow::Result<()> {
        BROKEN_ATTEMPTS.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("migration failed")
    }
}

#[tokio::test]
async fn test_failing_init_hook_is_not_cached() {
    let broken = ClassDef::builder(|_: &Injected| Ok(Broken))
        .on_init::<Broken>()
        .build();
    let root = ModuleDef::builder("App")
        .provider(Provider::class(broken))
        .build();
    let mut container = Container::new();
    container.run(root).await.unwrap();

    for _ in 0..2 {
        let err = container.resolve::<Broken>().await.unwrap_err();
        assert!(matches!(err, DiError::InitHookFailed { .. }));
    }
    assert_eq!(BROKEN_ATTEMPTS.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_type_mismatch() {
    let root = ModuleDef::builder("App")
        .provider(Provider::value("PORT", 8080u16))
        .build();
    let mut container = Container::new();
    container.run(root).await.unwrap();

    let err = container.get::<String>("PORT").await.unwrap_err();
    assert!(matches!(err, DiError::TypeMismatch { .. }));
    assert!(container.get_instance("PORT").await.unwrap().is_some());
    assert!(container.get_instance("HOST").await.unwrap().is_none());
}

#[tokio::test]
async fn test_replace_module_after_run() {
    let real = ModuleDef::builder("Mail")
        .provider(Provider::value("SENDER", "smtp"))
        .export("SENDER")
        .build();
    let root = ModuleDef::builder("App").import(real).build();
    let mut container = Container::new();
    container.run(root).await.unwrap();
    let sender = container.get::<&str>("SENDER").await.unwrap().unwrap();
    assert_eq!(*sender, "smtp");

    let mock = ModuleDef::builder("MailMock")
        .provider(Provider::value("SENDER", "memory"))
        .export("SENDER")
        .build();
    container.replace_module("Mail", mock).await.unwrap();

    let sender = container.get::<&str>("SENDER").await.unwrap().unwrap();
    assert_eq!(*sender, "memory");
    assert!(container.get_module("Mail").is_none());
    assert!(container.get_module("MailMock").is_some());
}

#[tokio::test]
async fn test_named_import_of_added_module() {
    let mut container = Container::new();
    let token = container
        .add_module(
            ModuleDef::builder("Metrics")
                .provider(Provider::value("METRICS_PREFIX", "app"))
                .export("METRICS_PREFIX")
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(token, Token::name("Metrics"));

    let prefix = ClassDef::builder(|deps: &Injected| deps.require_param::<&str>(0).map(|p| p.to_string()))
        .param("METRICS_PREFIX")
        .build();
    let root = ModuleDef::builder("App")
        .import(ModuleRef::named("Metrics"))
        .provider(Provider::use_class("PREFIX", prefix))
        .build();
    container.run(root).await.unwrap();

    let prefix = container.get::<String>("PREFIX").await.unwrap().unwrap();
    assert_eq!(prefix.as_str(), "app");
}

#[tokio::test]
async fn test_add_module_after_run_recompiles() {
    let mut container = Container::new();
    container.run(app_module()).await.unwrap();
    let before = container.resolve::<ServiceA>().await.unwrap().unwrap();

    let extra = ModuleDef::builder("Extra")
        .provider(Provider::value("EXTRA", 1u8))
        .build();
    container.add_module(extra).await.unwrap();

    assert!(container.get::<u8>("EXTRA").await.unwrap().is_some());
    let after = container.resolve::<ServiceA>().await.unwrap().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
}

#[tokio::test]
async fn test_failed_add_module_keeps_previous_graph() {
    init_tracing();
    let root = ModuleDef::builder("App")
        .provider(Provider::value("PORT", 8080u16))
        .build();
    let mut container = Container::new();
    container.run(root).await.unwrap();

    let bad = ModuleDef::builder("Bad")
        .import(ModuleRef::named("Nowhere"))
        .build();
    let err = container.add_module(bad).await.unwrap_err();
    assert!(matches!(err, DiError::Graph(GraphError::UnknownModule { .. })));

    assert!(container.is_running());
    assert_eq!(*container.get::<u16>("PORT").await.unwrap().unwrap(), 8080);
    assert!(container.get_module("App").is_some());
    assert!(container.get_module("Bad").is_none());

    let good = ModuleDef::builder("Good")
        .provider(Provider::value("GOOD", true))
        .build();
    container.add_module(good).await.unwrap();
    assert!(container.get::<bool>("GOOD").await.unwrap().is_some());
    assert!(container.get::<u16>("PORT").await.unwrap().is_some());
}

#[tokio::test]
async fn test_failed_replace_module_is_withdrawn() {
    let mail = ModuleDef::builder("Mail")
        .provider(Provider::value("SENDER", "smtp"))
        .export("SENDER")
        .build();
    let root = ModuleDef::builder("App").import(mail).build();
    let mut container = Container::new();
    container.run(root).await.unwrap();

    let broken = ModuleDef::builder("MailMock")
        .import(ModuleRef::named("Nowhere"))
        .build();
    assert!(container.replace_module("Mail", broken).await.is_err());
    assert_eq!(*container.get::<&str>("SENDER").await.unwrap().unwrap(), "smtp");

    let extra = ModuleDef::builder("Extra").build();
    container.add_module(extra).await.unwrap();
    assert!(container.get_module("Mail").is_some());
    assert!(container.get_module("MailMock").is_none());
}

#[tokio::test]
async fn test_failed_rerun_keeps_previous_root() {
    let mut container = Container::new();
    container.run(app_module()).await.unwrap();

    let bad = ModuleDef::builder("Bad")
        .import(ModuleRef::named("Nowhere"))
        .build();
    assert!(container.run(bad).await.is_err());
    assert!(container.resolve::<ServiceA>().await.unwrap().is_some());

    container
        .add_module(ModuleDef::builder("Extra").build())
        .await
        .unwrap();
    assert!(container.resolve::<ServiceA>().await.unwrap().is_some());
}

#[tokio::test]
async fn test_unknown_named_module_fails_run() {
    let root = ModuleDef::builder("App")
        .import(ModuleRef::named("Nowhere"))
        .build();
    let mut container = Container::new();
    let err = container.run(root).await.unwrap_err();
    assert!(matches!(err, DiError::Graph(GraphError::UnknownModule { .. })));
    assert!(!container.is_running());
}

#[tokio::test]
async fn test_deferred_module() {
    let base = ModuleDef::builder("Cache").build();
    let deferred = DeferredModule::new("cache", move || {
        let base = base.clone();
        async move {
            Ok(DynamicModule::new(&base)
                .provider(Provider::value("CACHE_TTL", 30u64))
                .export("CACHE_TTL"))
        }
    });
    let ttl = ClassDef::builder(|deps: &Injected| deps.require_param::<u64>(0).map(|ttl| *ttl))
        .param("CACHE_TTL")
        .build();
    let root = ModuleDef::builder("App")
        .import(deferred)
        .provider(Provider::use_class("TTL", ttl))
        .build();

    let mut container = Container::new();
    container.run(root).await.unwrap();
    assert_eq!(*container.get::<u64>("TTL").await.unwrap().unwrap(), 30);
}

#[tokio::test]
async fn test_added_deferred_module_is_found_by_label() {
    let base = ModuleDef::builder("Flags").build();
    let deferred = DeferredModule::new("flags", move || {
        let base = base.clone();
        async move { Ok(DynamicModule::new(&base).provider(Provider::value("BETA", true))) }
    });
    let mut container = Container::new();
    container.run(ModuleDef::builder("App").build()).await.unwrap();

    let token = container.add_module(deferred).await.unwrap();
    assert_eq!(token, Token::name("flags"));
    let record = container.get_module(token.clone()).unwrap();
    assert!(record.is_dynamic());
    assert_ne!(record.token(), &token);

    let replacement = ModuleDef::builder("FlagsOff")
        .provider(Provider::value("BETA", false))
        .build();
    container.replace_module(token, replacement).await.unwrap();
    assert!(!*container.get::<bool>("BETA").await.unwrap().unwrap());
    assert!(container.get_module("FlagsOff").is_some());
}

struct Mailer {
    retries: Option<Arc<serde_json::Value>>,
}

#[tokio::test]
async fn test_load_manifest() {
    init_tracing();
    let manifest = ModuleManifest::from_toml(
        r#"
        root = "App"

        [[modules]]
        name = "App"
        imports = ["Config"]

        [[modules.providers]]
        kind = "class"
        provide = "mailer"
        class = "Mailer"

        [[modules]]
        name = "Config"
        global = true
        exports = ["RETRIES"]

        [[modules.providers]]
        kind = "value"
        provide = "RETRIES"
        value = 3
        "#,
    )
    .unwrap();
    let mailer = ClassDef::builder(|deps: &Injected| {
        Ok(Mailer {
            retries: deps.param::<serde_json::Value>(0),
        })
    })
    .param("RETRIES")
    .build();
    let catalog = ProviderCatalog::new().class("Mailer", mailer);

    let mut container = Container::new();
    let root = container.load_manifest(&manifest, &catalog).unwrap();
    container.run(root).await.unwrap();

    let mailer = container.get::<Mailer>("mailer").await.unwrap().unwrap();
    assert_eq!(mailer.retries.as_deref(), Some(&serde_json::json!(3)));
}
