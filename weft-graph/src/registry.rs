//! Module registry: one record per distinct module

use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};
use weft_core::{DynamicModule, ModuleDef, ModuleRef, Provider, Token};

use crate::{GraphError, Result};

/// Upper bound on forward/named indirections followed for one reference
const MAX_REFERENCE_HOPS: usize = 64;

/// What a module record was built from
#[derive(Debug, Clone)]
pub enum Metatype {
    Static(ModuleDef),
    Dynamic(DynamicModule),
}

/// One module instance in a compile
pub struct ModuleRecord {
    token: Token,
    name: String,
    metatype: Metatype,
    import_refs: Vec<ModuleRef>,
    providers: Vec<Provider>,
    provider_tokens: FxHashSet<Token>,
    exports: Vec<Token>,
    export_set: FxHashSet<Token>,
    global: bool,
    imports: OnceLock<Vec<Token>>,
}

impl ModuleRecord {
    fn new(metatype: Metatype) -> Self {
        let (token, name, import_refs, providers, exports, global) = match &metatype {
            Metatype::Static(module) => (
                module.token().clone(),
                module.name().to_string(),
                module.imports().to_vec(),
                module.providers().to_vec(),
                module.exports().to_vec(),
                module.is_global(),
            ),
            Metatype::Dynamic(module) => (
                dynamic_token(module),
                module.base().name().to_string(),
                module.imports().cloned().collect(),
                module.providers().cloned().collect(),
                module.exports().cloned().collect(),
                module.is_global(),
            ),
        };

        Self {
            provider_tokens: providers.iter().map(|p| p.token().clone()).collect(),
            export_set: exports.iter().cloned().collect(),
            token,
            name,
            metatype,
            import_refs,
            providers,
            exports,
            global,
            imports: OnceLock::new(),
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metatype(&self) -> &Metatype {
        &self.metatype
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.metatype, Metatype::Dynamic(_))
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    /// Declared providers in declaration order
    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn declares_provider(&self, token: &Token) -> bool {
        self.provider_tokens.contains(token)
    }

    pub fn exports(&self) -> &[Token] {
        &self.exports
    }

    pub fn exports_token(&self, token: &Token) -> bool {
        self.export_set.contains(token)
    }

    /// Unresolved import references
    pub fn import_refs(&self) -> &[ModuleRef] {
        &self.import_refs
    }

    /// Resolved import tokens; empty until the registry resolved them
    pub fn imports(&self) -> &[Token] {
        self.imports.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn imports_resolved(&self) -> bool {
        self.imports.get().is_some()
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("token", &self.token)
            .field("dynamic", &self.is_dynamic())
            .field("global", &self.global)
            .field("providers", &self.provider_tokens.len())
            .field("exports", &self.exports)
            .field("imports", &self.imports.get())
            .finish()
    }
}

#[derive(Hash)]
enum ImportKey {
    Token(Token),
    Deferred(u64),
    Forward(usize),
}

fn import_key(module: &ModuleRef) -> ImportKey {
    match module {
        ModuleRef::Static(module) => ImportKey::Token(module.token().clone()),
        ModuleRef::Dynamic(module) => ImportKey::Token(dynamic_token(module)),
        ModuleRef::Deferred(module) => ImportKey::Deferred(module.id()),
        ModuleRef::Forward(forward) => ImportKey::Forward(forward.identity()),
        ModuleRef::Named(token) => ImportKey::Token(token.clone()),
    }
}

/// Token of a dynamic module, derived from its shape
///
/// Clones of one dynamic module share a token. Dynamic modules assembled
/// separately get distinct tokens because provider identities are hashed.
pub fn dynamic_token(module: &DynamicModule) -> Token {
    let mut hasher = FxHasher::default();
    module.base().token().hash(&mut hasher);
    for provider in module.providers() {
        provider.token().hash(&mut hasher);
        provider.identity().hash(&mut hasher);
    }
    for export in module.exports() {
        export.hash(&mut hasher);
    }
    for import in module.imports() {
        import_key(import).hash(&mut hasher);
    }
    module.is_global().hash(&mut hasher);

    Token::name(format!("{}#{:016x}", module.base().name(), hasher.finish()))
}

/// Registry of module records, definitions and overrides
///
/// Records are created lazily the first time a module reference is inserted
/// and deduplicated by token. Definitions registered with [`define`] make
/// `ModuleRef::Named` references resolvable; overrides swap a module for
/// another wherever it is referenced.
///
/// [`define`]: ModuleRegistry::define
#[derive(Default)]
pub struct ModuleRegistry {
    records: FxHashMap<Token, Arc<ModuleRecord>>,
    order: Vec<Token>,
    definitions: FxHashMap<Token, ModuleRef>,
    overrides: FxHashMap<Token, ModuleRef>,
    deferred: FxHashMap<u64, DynamicModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `module` resolvable as `ModuleRef::Named(token)`, returning the
    /// definition it replaces
    pub fn define(&mut self, token: Token, module: ModuleRef) -> Option<ModuleRef> {
        debug!("Defined module {}", token);
        self.definitions.insert(token, module)
    }

    pub fn definition(&self, token: &Token) -> Option<&ModuleRef> {
        self.definitions.get(token)
    }

    pub fn remove_definition(&mut self, token: &Token) -> Option<ModuleRef> {
        self.definitions.remove(token)
    }

    /// Use `replacement` wherever the module `original` is referenced,
    /// returning the override it replaces
    pub fn override_module(&mut self, original: Token, replacement: ModuleRef) -> Option<ModuleRef> {
        debug!("Module {} overridden by {}", original, replacement.describe());
        self.overrides.insert(original, replacement)
    }

    pub fn remove_override(&mut self, token: &Token) -> Option<ModuleRef> {
        self.overrides.remove(token)
    }

    pub fn is_overridden(&self, token: &Token) -> bool {
        self.overrides.contains_key(token)
    }

    /// Get or create the record for `module`
    pub async fn insert(&mut self, module: &ModuleRef) -> Result<Arc<ModuleRecord>> {
        let mut metatype = self.materialize(module).await?;
        let original = metatype_token(&metatype);

        if let Some(replacement) = self.overrides.get(&original).cloned() {
            trace!("Applying override for module {}", original);
            metatype = self.materialize(&replacement).await?;
        }

        let token = metatype_token(&metatype);
        if let Some(record) = self.records.get(&token) {
            trace!("Module {} already registered", token);
            return Ok(Arc::clone(record));
        }

        let record = Arc::new(ModuleRecord::new(metatype));
        debug!(
            "Registered module {} ({} providers, {} imports)",
            record.token(),
            record.providers().len(),
            record.import_refs().len()
        );
        self.order.push(token.clone());
        self.records.insert(token, Arc::clone(&record));
        Ok(record)
    }

    /// Resolve the imports of `record` to records, attaching their tokens
    /// to the record the first time
    pub async fn resolve_imports(&mut self, record: &Arc<ModuleRecord>) -> Result<Vec<Arc<ModuleRecord>>> {
        if let Some(tokens) = record.imports.get() {
            return Ok(tokens
                .iter()
                .filter_map(|token| self.records.get(token).cloned())
                .collect());
        }

        let mut imports = Vec::with_capacity(record.import_refs().len());
        for import in record.import_refs() {
            imports.push(self.insert(import).await?);
        }

        let tokens = imports.iter().map(|import| import.token().clone()).collect();
        // A concurrent resolution may have won; both computed the same list.
        let _ = record.imports.set(tokens);
        Ok(imports)
    }

    /// Follow forward, named and deferred references down to a definition
    async fn materialize(&mut self, module: &ModuleRef) -> Result<Metatype> {
        let mut current = module.clone();
        for _ in 0..MAX_REFERENCE_HOPS {
            current = match current {
                ModuleRef::Static(module) => return Ok(Metatype::Static(module)),
                ModuleRef::Dynamic(module) => return Ok(Metatype::Dynamic(module)),
                ModuleRef::Deferred(deferred) => {
                    if let Some(module) = self.deferred.get(&deferred.id()) {
                        return Ok(Metatype::Dynamic(module.clone()));
                    }
                    debug!("Building deferred module {}", deferred.label());
                    let module = deferred.produce().await.map_err(|source| {
                        GraphError::ModuleFactory {
                            module: deferred.label().to_string(),
                            source,
                        }
                    })?;
                    self.deferred.insert(deferred.id(), module.clone());
                    return Ok(Metatype::Dynamic(module));
                }
                ModuleRef::Forward(forward) => forward.resolve(),
                ModuleRef::Named(token) => self
                    .definitions
                    .get(&token)
                    .cloned()
                    .ok_or(GraphError::UnknownModule { token })?,
            };
        }

        Err(GraphError::UnknownModule {
            token: Token::name(module.describe()),
        })
    }

    pub fn get(&self, token: &Token) -> Option<Arc<ModuleRecord>> {
        self.records.get(token).cloned()
    }

    /// Record for `token`, following definitions when `token` is a name a
    /// module was defined under rather than its record token
    ///
    /// Deferred definitions are found once their factory has run.
    pub fn lookup(&self, token: &Token) -> Option<Arc<ModuleRecord>> {
        if let Some(record) = self.records.get(token) {
            return Some(Arc::clone(record));
        }

        let mut current = self.definitions.get(token)?.clone();
        for _ in 0..MAX_REFERENCE_HOPS {
            current = match current {
                ModuleRef::Static(module) => return self.get(module.token()),
                ModuleRef::Dynamic(module) => return self.get(&dynamic_token(&module)),
                ModuleRef::Deferred(deferred) => {
                    let module = self.deferred.get(&deferred.id())?;
                    return self.get(&dynamic_token(module));
                }
                ModuleRef::Forward(forward) => forward.resolve(),
                ModuleRef::Named(token) => match self.records.get(&token) {
                    Some(record) => return Some(Arc::clone(record)),
                    None => self.definitions.get(&token)?.clone(),
                },
            };
        }
        None
    }

    pub fn contains(&self, token: &Token) -> bool {
        self.records.contains_key(token)
    }

    /// Records in creation order
    pub fn records(&self) -> impl Iterator<Item = &Arc<ModuleRecord>> {
        self.order.iter().filter_map(|token| self.records.get(token))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Move all records out, keeping definitions, overrides and built
    /// deferred modules
    pub fn take_records(&mut self) -> RecordSet {
        RecordSet {
            records: std::mem::take(&mut self.records),
            order: std::mem::take(&mut self.order),
        }
    }

    /// Replace the current records with `records`
    pub fn restore_records(&mut self, records: RecordSet) {
        self.records = records.records;
        self.order = records.order;
    }
}

/// Records moved out of a registry by [`ModuleRegistry::take_records`]
#[derive(Default)]
pub struct RecordSet {
    records: FxHashMap<Token, Arc<ModuleRecord>>,
    order: Vec<Token>,
}

impl RecordSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn metatype_token(metatype: &Metatype) -> Token {
    match metatype {
        Metatype::Static(module) => module.token().clone(),
        Metatype::Dynamic(module) => dynamic_token(module),
    }
}
