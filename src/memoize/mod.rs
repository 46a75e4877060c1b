//! Generation-scoped memoization with single-flight execution.
//!
//! A [`Store`] owns the registry of [`Handle`]s, one per key. A [`Handle`]
//! wraps a computation that runs at most once: the first [`Handle::get`]
//! spawns it on the tokio runtime and every caller, the first included,
//! waits for the shared result.
//!
//! Handles are scoped by [`Generation`]s. A handle is reachable through
//! every generation it was bound to (by [`Generation::bind`] or
//! [`Generation::inherit`]); destroying a generation unbinds it, and a handle
//! left with no generation is evicted from the store.
//!
//! # Lifecycle of a handle
//!
//! ```text
//! Idle(function) --first get--> Running(receiver) --task ends--> Completed(outcome)
//! ```
//!
//! Whatever the computation produces is final for the handle's lifetime,
//! including error values and panics. There is no retry: a fresh attempt
//! needs a new key or a new handle.
//!
//! # Cancellation
//!
//! The computation runs in its own task. Dropping a `get` future only
//! abandons that caller's wait; the computation continues and later callers
//! still receive its result.
//!
//! # Examples
//!
//! ```rust
//! use futures::FutureExt;
//! use modcache::memoize::Store;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let store: Store<String, usize, ()> = Store::new();
//! let generation = store.generation("example");
//! let handle = generation.bind("answer".to_string(), |()| async { 42 }.boxed())?;
//! assert_eq!(*handle.get(&generation, ()).await?, 42);
//! # Ok(())
//! # }
//! ```

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::watch;

/// Failures of the memoization framework itself.
///
/// These never come from the computation; its errors are part of the value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoizeError {
    #[error("generation {generation} has been destroyed")]
    GenerationDestroyed { generation: String },

    #[error("{key} is not bound to generation {generation}")]
    NotBound { key: String, generation: String },

    #[error("computation for {key} panicked")]
    Panicked { key: String },

    /// The computation's task was dropped before producing a value, which
    /// only happens when the runtime shuts down.
    #[error("computation for {key} was abandoned before completing")]
    Abandoned { key: String },
}

type Function<V, A> = Box<dyn FnOnce(A) -> BoxFuture<'static, V> + Send>;
type Outcome<V> = Result<Arc<V>, MemoizeError>;

enum State<V, A> {
    Idle(Option<Function<V, A>>),
    Running(watch::Receiver<Option<Outcome<V>>>),
    Completed(Outcome<V>),
}

/// Locks `mutex`, recovering the data if a previous holder panicked. None of
/// the guarded sections in this module can leave their data half-updated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct StoreInner<K, V, A>
where
    K: Eq + Hash,
{
    handles: DashMap<K, Arc<Handle<K, V, A>>>,
    next_generation: AtomicU64,
}

/// Registry of handles, keyed by `K`.
///
/// Cloning a store is cheap and yields a view of the same registry.
pub struct Store<K, V, A>
where
    K: Eq + Hash,
{
    inner: Arc<StoreInner<K, V, A>>,
}

impl<K, V, A> Clone for Store<K, V, A>
where
    K: Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, A> Default for Store<K, V, A>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
    A: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, A> Store<K, V, A>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
    A: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                handles: DashMap::new(),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Starts a new generation. `name` only appears in logs and errors.
    pub fn generation(&self, name: impl Into<String>) -> Generation<K, V, A> {
        let id = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        tracing::trace!(target: "memoize", "new generation {} (#{})", name, id);
        Generation {
            id,
            name,
            destroyed: AtomicBool::new(false),
            store: Arc::clone(&self.inner),
        }
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.inner.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.handles.is_empty()
    }
}

/// A scope of handle validity.
///
/// Dropping a generation destroys it.
pub struct Generation<K, V, A>
where
    K: Eq + Hash,
{
    id: u64,
    name: String,
    destroyed: AtomicBool,
    store: Arc<StoreInner<K, V, A>>,
}

impl<K, V, A> fmt::Debug for Generation<K, V, A>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("destroyed", &self.destroyed.load(Ordering::Acquire))
            .finish()
    }
}

impl<K, V, A> Generation<K, V, A>
where
    K: Eq + Hash,
{
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn destroyed_error(&self) -> MemoizeError {
        MemoizeError::GenerationDestroyed {
            generation: self.name.clone(),
        }
    }

    /// Marks the generation destroyed, unbinds it from every handle and evicts
    /// the handles it was the last generation of. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut evicted = 0usize;
        self.store.handles.retain(|_, handle| {
            let mut generations = lock(&handle.generations);
            generations.remove(&self.id);
            let keep = !generations.is_empty();
            if !keep {
                evicted += 1;
            }
            keep
        });
        tracing::debug!(
            target: "memoize",
            "destroyed generation {} ({} handles evicted, {} live)",
            self.name,
            evicted,
            self.store.handles.len()
        );
    }
}

impl<K, V, A> Generation<K, V, A>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
    A: Send + 'static,
{
    /// Returns the handle registered for `key`, creating it from `function`
    /// if there is none, and binds it to this generation.
    ///
    /// `function` is not called here. When a handle already exists the new
    /// `function` is dropped unused.
    pub fn bind<F>(&self, key: K, function: F) -> Result<Arc<Handle<K, V, A>>, MemoizeError>
    where
        F: FnOnce(A) -> BoxFuture<'static, V> + Send + 'static,
    {
        if self.is_destroyed() {
            return Err(self.destroyed_error());
        }

        // The generation is recorded while the shard is still locked so that
        // a concurrent destroy of another generation cannot evict the handle
        // in between.
        let handle = match self.store.handles.entry(key) {
            Entry::Occupied(entry) => {
                let handle = Arc::clone(entry.get());
                lock(&handle.generations).insert(self.id);
                handle
            }
            Entry::Vacant(entry) => {
                tracing::trace!(target: "memoize", "bind {:?} in {}", entry.key(), self.name);
                let handle = Arc::new(Handle::new(entry.key().clone(), Box::new(function)));
                lock(&handle.generations).insert(self.id);
                entry.insert(Arc::clone(&handle));
                handle
            }
        };
        Ok(handle)
    }

    /// Binds an existing handle to this generation.
    ///
    /// If the handle was evicted in the meantime it is registered again; if a
    /// different handle has since taken its key, that one is bound and
    /// returned instead.
    pub fn inherit(&self, handle: &Arc<Handle<K, V, A>>) -> Result<Arc<Handle<K, V, A>>, MemoizeError> {
        if self.is_destroyed() {
            return Err(self.destroyed_error());
        }

        let handle = match self.store.handles.entry(handle.key.clone()) {
            Entry::Occupied(entry) => {
                let registered = Arc::clone(entry.get());
                lock(&registered.generations).insert(self.id);
                registered
            }
            Entry::Vacant(entry) => {
                lock(&handle.generations).insert(self.id);
                entry.insert(Arc::clone(handle));
                Arc::clone(handle)
            }
        };
        Ok(handle)
    }
}

impl<K, V, A> Drop for Generation<K, V, A>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.destroy();
    }
}

/// A memoized computation for one key.
pub struct Handle<K, V, A> {
    key: K,
    state: Mutex<State<V, A>>,
    generations: Mutex<HashSet<u64>>,
}

impl<K: fmt::Debug, V, A> fmt::Debug for Handle<K, V, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*lock(&self.state) {
            State::Idle(_) => "idle",
            State::Running(_) => "running",
            State::Completed(_) => "completed",
        };
        f.debug_struct("Handle").field("key", &self.key).field("state", &state).finish()
    }
}

impl<K, V, A> Handle<K, V, A>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
    A: Send + 'static,
{
    fn new(key: K, function: Function<V, A>) -> Self {
        Self {
            key,
            state: Mutex::new(State::Idle(Some(function))),
            generations: Mutex::new(HashSet::new()),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    fn check_bound(&self, generation: &Generation<K, V, A>) -> Result<(), MemoizeError> {
        if generation.is_destroyed() {
            return Err(generation.destroyed_error());
        }
        if !lock(&self.generations).contains(&generation.id) {
            return Err(MemoizeError::NotBound {
                key: format!("{:?}", self.key),
                generation: generation.name.clone(),
            });
        }
        Ok(())
    }

    /// Returns the computed value, running the computation if no caller has
    /// started it yet.
    ///
    /// `arg` is handed to the computation by the caller that starts it and
    /// dropped by every other caller.
    pub async fn get(self: &Arc<Self>, generation: &Generation<K, V, A>, arg: A) -> Outcome<V> {
        self.check_bound(generation)?;

        let mut receiver = {
            let mut state = lock(&self.state);
            match &mut *state {
                State::Completed(outcome) => return outcome.clone(),
                State::Running(receiver) => receiver.clone(),
                State::Idle(function) => {
                    let Some(function) = function.take() else {
                        return Err(self.abandoned());
                    };
                    let (sender, receiver) = watch::channel(None);
                    self.spawn(function, arg, sender);
                    *state = State::Running(receiver.clone());
                    receiver
                }
            }
        };

        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(self.abandoned()))
    }

    fn spawn(self: &Arc<Self>, function: Function<V, A>, arg: A, sender: watch::Sender<Option<Outcome<V>>>) {
        let handle = Arc::clone(self);
        tracing::trace!(target: "memoize", "start {:?}", self.key);
        tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(async move { function(arg).await }).catch_unwind().await {
                Ok(value) => Ok(Arc::new(value)),
                Err(_) => {
                    tracing::warn!(target: "memoize", "computation for {:?} panicked", handle.key);
                    Err(MemoizeError::Panicked {
                        key: format!("{:?}", handle.key),
                    })
                }
            };
            *lock(&handle.state) = State::Completed(outcome.clone());
            sender.send_replace(Some(outcome));
            tracing::trace!(target: "memoize", "done {:?}", handle.key);
        });
    }

    fn abandoned(&self) -> MemoizeError {
        MemoizeError::Abandoned {
            key: format!("{:?}", self.key),
        }
    }

    /// The value if the computation already succeeded; never waits.
    pub fn cached(&self, generation: &Generation<K, V, A>) -> Option<Arc<V>> {
        self.check_bound(generation).ok()?;
        match &*lock(&self.state) {
            State::Completed(Ok(value)) => Some(Arc::clone(value)),
            _ => None,
        }
    }
}
