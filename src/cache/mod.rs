//! Sessions, views and snapshots: the scopes the manifest caches live in.
//!
//! # Architecture Overview
//!
//! - [`Session`]: one long-lived backend instance. Owns the memoization
//!   [`Store`], the [`FileSource`] and the [`GoRunner`].
//! - [`View`]: one project root and the environment the tool runs with. Its
//!   environment fingerprint is part of every derived cache key.
//! - [`Snapshot`]: one consistent state of the project. Each snapshot owns a
//!   memoization [`Generation`] plus per-URI handle registries, so that a
//!   repeated lookup for an unchanged file is served by the same handle.
//!
//! # Cache keys
//!
//! ```text
//! CacheKey::Parse(FileIdentity)                                    parse cache
//! CacheKey::Derived(ModKey { session, env, view, file, action })   why / upgrade caches
//! ```
//!
//! A key is fully built before its computation starts. Any change in file
//! content, session id, environment fingerprint or root path yields a new
//! key and therefore a fresh computation.
//!
//! # Snapshot lifecycle
//!
//! [`Snapshot::clone_with_changes`] starts the next generation and carries
//! over the handles whose inputs did not change. When the previous snapshot
//! is dropped its generation is destroyed, and handles no other generation
//! holds are evicted from the store.
//!
//! # Locking
//!
//! The per-URI registries sit behind a `std::sync::Mutex` that is held only
//! for lookup-or-insert. Computations run in tasks spawned by the handle,
//! outside every lock.

pub mod derived;
pub mod errors;
pub mod parse;

pub use derived::{decode_upgrades, explain_requirements};
pub use errors::{
    DECLARATION_PRECEDENCE, ErrorPosition, StatementKind, extract_positioned, find_declaration,
    find_module_version, parse_error_position,
};
pub use parse::ParsedManifest;

use crate::config::CacheConfig;
use crate::core::ModError;
use crate::gocmd::{GoRunner, Invocation};
use crate::memoize::{Generation, Handle, Store, lock};
use crate::modfile::sum::sum_filename;
use crate::source::{FileHandle, FileIdentity, FileKind, FileSource, hash_contents};
use crate::span::Uri;
use futures::future::{BoxFuture, FutureExt};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Which derived computation a [`ModKey`] is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModAction {
    Why,
    Upgrade,
}

/// Key of a derived-info computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModKey {
    pub session_id: String,
    /// Environment fingerprint of the view.
    pub env: String,
    /// Root of the view.
    pub view: PathBuf,
    pub file: FileIdentity,
    pub action: ModAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Parse(FileIdentity),
    Derived(ModKey),
}

/// A result held by a memoization handle. Computation errors are part of
/// the value so that they are cached like successes.
#[derive(Debug, Clone)]
pub enum CachedValue {
    Parsed(Result<Arc<ParsedManifest>, ModError>),
    Derived(Result<Arc<HashMap<String, String>>, ModError>),
}

/// The memoization store every cache in a session shares.
pub type CacheStore = Store<CacheKey, CachedValue, Arc<Snapshot>>;
type CacheGeneration = Generation<CacheKey, CachedValue, Arc<Snapshot>>;
type CacheHandle = Arc<Handle<CacheKey, CachedValue, Arc<Snapshot>>>;

/// One backend instance.
pub struct Session {
    id: String,
    store: CacheStore,
    files: Arc<dyn FileSource>,
    runner: Arc<dyn GoRunner>,
    next_snapshot: AtomicU64,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("handles", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(id: impl Into<String>, files: Arc<dyn FileSource>, runner: Arc<dyn GoRunner>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            store: CacheStore::new(),
            files,
            runner,
            next_snapshot: AtomicU64::new(1),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Starts an empty snapshot of `view`.
    pub fn new_snapshot(self: &Arc<Self>, view: Arc<View>) -> Arc<Snapshot> {
        let id = self.next_snapshot.fetch_add(1, Ordering::Relaxed);
        let generation = self.store.generation(format!("{}/{}", self.id, id));
        tracing::debug!(target: "cache", "session {}: snapshot {} of {}", self.id, id, view.root.display());
        Arc::new(Snapshot {
            id,
            session: Arc::clone(self),
            view,
            generation,
            handles: Mutex::new(SnapshotHandles::default()),
        })
    }
}

/// A project root and the environment the tool runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    root: PathBuf,
    env: BTreeMap<String, String>,
    env_hash: String,
    temp_modfile: bool,
}

impl View {
    pub fn new(root: impl Into<PathBuf>, env: BTreeMap<String, String>, temp_modfile: bool) -> Self {
        let rendered: String = env.iter().map(|(k, v)| format!("{k}={v}\n")).collect();
        Self {
            root: root.into(),
            env_hash: hash_contents(rendered.as_bytes()),
            env,
            temp_modfile,
        }
    }

    pub fn from_config(root: impl Into<PathBuf>, config: &CacheConfig) -> Self {
        Self::new(root, config.env.clone(), config.temp_modfile)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Fingerprint of the environment, used in derived cache keys.
    pub fn env_hash(&self) -> &str {
        &self.env_hash
    }

    pub fn temp_modfile(&self) -> bool {
        self.temp_modfile
    }
}

#[derive(Debug, Clone, Copy)]
enum Registry {
    ParseMod,
    ModWhy,
    ModUpgrade,
}

#[derive(Default, Clone)]
struct SnapshotHandles {
    parse_mod: HashMap<Uri, CacheHandle>,
    mod_why: HashMap<Uri, CacheHandle>,
    mod_upgrade: HashMap<Uri, CacheHandle>,
}

impl SnapshotHandles {
    fn registry_mut(&mut self, registry: Registry) -> &mut HashMap<Uri, CacheHandle> {
        match registry {
            Registry::ParseMod => &mut self.parse_mod,
            Registry::ModWhy => &mut self.mod_why,
            Registry::ModUpgrade => &mut self.mod_upgrade,
        }
    }
}

/// One consistent state of the project.
pub struct Snapshot {
    id: u64,
    session: Arc<Session>,
    view: Arc<View>,
    generation: CacheGeneration,
    handles: Mutex<SnapshotHandles>,
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("id", &self.id)
            .field("session", &self.session.id)
            .field("root", &self.view.root)
            .finish_non_exhaustive()
    }
}

impl Snapshot {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn view(&self) -> &Arc<View> {
        &self.view
    }

    /// Returns the handle registered for `uri` when its key still matches,
    /// binding a new one from `function` otherwise.
    fn handle_for<F>(
        &self,
        registry: Registry,
        uri: &Uri,
        key: CacheKey,
        function: F,
    ) -> Result<CacheHandle, ModError>
    where
        F: FnOnce(Arc<Snapshot>) -> BoxFuture<'static, CachedValue> + Send + 'static,
    {
        let mut handles = lock(&self.handles);
        let map = handles.registry_mut(registry);
        if let Some(existing) = map.get(uri) {
            if existing.key() == &key {
                return Ok(Arc::clone(existing));
            }
        }
        let handle = self.generation.bind(key, function)?;
        map.insert(uri.clone(), Arc::clone(&handle));
        Ok(handle)
    }

    async fn await_handle(self: &Arc<Self>, handle: &CacheHandle) -> Result<Arc<CachedValue>, ModError> {
        Ok(handle.get(&self.generation, Arc::clone(self)).await?)
    }

    fn unexpected_value(handle: &CacheHandle) -> ModError {
        ModError::UnexpectedValue {
            key: format!("{:?}", handle.key()),
        }
    }

    fn resolve(&self, uri: &Uri) -> Uri {
        if uri.is_relative() {
            Uri::from_path(self.view.root.join(uri.path()))
        } else {
            uri.clone()
        }
    }

    /// The current handle for `uri`; relative paths resolve against the view
    /// root.
    pub async fn get_file(&self, uri: &Uri) -> Result<Arc<dyn FileHandle>, ModError> {
        let uri = self.resolve(uri);
        self.session.files.get_file(&uri).await
    }

    /// Content of the checksum file next to the manifest at `manifest`, if it
    /// exists and is readable.
    pub async fn go_sum(&self, manifest: &Uri) -> Option<Arc<[u8]>> {
        let uri = Uri::from_path(sum_filename(self.resolve(manifest).path()));
        let file = self.get_file(&uri).await.ok()?;
        file.read().ok()
    }

    /// Runs `invocation` with the view's environment underneath its own.
    pub async fn run_go_command_direct(&self, invocation: Invocation) -> Result<String, ModError> {
        let mut env: Vec<(String, String)> =
            self.view.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        env.extend(invocation.env);
        let invocation = Invocation {
            env,
            ..invocation
        };
        tracing::debug!(target: "cache", "snapshot {}: {}", self.id, invocation.describe());
        self.session.runner.run(&invocation).await
    }

    /// Starts the next snapshot after `changed` files were modified.
    ///
    /// Parse handles of unchanged files carry over. Derived handles carry over
    /// only when no manifest or checksum file changed, since their tool output
    /// depends on the whole module graph.
    pub fn clone_with_changes(self: &Arc<Self>, changed: &[Uri]) -> Arc<Snapshot> {
        let next = self.session.new_snapshot(Arc::clone(&self.view));
        let changed: Vec<Uri> = changed.iter().map(|uri| self.resolve(uri)).collect();
        let graph_changed = changed
            .iter()
            .any(|uri| matches!(FileKind::from_path(uri.path()), FileKind::Mod | FileKind::Sum));

        let current = lock(&self.handles).clone();
        let mut inherited = SnapshotHandles::default();
        let carry = |from: HashMap<Uri, CacheHandle>, to: &mut HashMap<Uri, CacheHandle>| {
            for (uri, handle) in from {
                if changed.contains(&uri) {
                    continue;
                }
                if let Ok(handle) = next.generation.inherit(&handle) {
                    to.insert(uri, handle);
                }
            }
        };
        carry(current.parse_mod, &mut inherited.parse_mod);
        if !graph_changed {
            carry(current.mod_why, &mut inherited.mod_why);
            carry(current.mod_upgrade, &mut inherited.mod_upgrade);
        }
        tracing::debug!(
            target: "cache",
            "snapshot {} -> {}: {} changed, {} parse / {} why / {} upgrade handles inherited",
            self.id,
            next.id,
            changed.len(),
            inherited.parse_mod.len(),
            inherited.mod_why.len(),
            inherited.mod_upgrade.len()
        );
        *lock(&next.handles) = inherited;
        next
    }
}

impl FileSource for Snapshot {
    fn get_file<'a>(&'a self, uri: &'a Uri) -> BoxFuture<'a, Result<Arc<dyn FileHandle>, ModError>> {
        Snapshot::get_file(self, uri).boxed()
    }
}

/// Resolves relative paths against `base_dir` and serves one pinned handle
/// for its own URI, so that positions found in a file's error text are mapped
/// against the exact content that produced them.
pub struct ResolvingSource {
    base_dir: PathBuf,
    pinned: Option<Arc<dyn FileHandle>>,
    fallback: Arc<dyn FileSource>,
}

impl ResolvingSource {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        pinned: Option<Arc<dyn FileHandle>>,
        fallback: Arc<dyn FileSource>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            pinned,
            fallback,
        }
    }

    /// Resolves against the directory of `file` and pins it.
    pub fn for_file(file: &Arc<dyn FileHandle>, fallback: Arc<dyn FileSource>) -> Self {
        Self::new(file.uri().dir(), Some(Arc::clone(file)), fallback)
    }
}

impl FileSource for ResolvingSource {
    fn get_file<'a>(&'a self, uri: &'a Uri) -> BoxFuture<'a, Result<Arc<dyn FileHandle>, ModError>> {
        let resolved = if uri.is_relative() {
            Uri::from_path(self.base_dir.join(uri.path()))
        } else {
            uri.clone()
        };
        if let Some(pinned) = self.pinned.as_ref().filter(|p| p.uri() == &resolved) {
            let file = Arc::clone(pinned);
            return async move { Ok(file) }.boxed();
        }
        async move { self.fallback.get_file(&resolved).await }.boxed()
    }
}
