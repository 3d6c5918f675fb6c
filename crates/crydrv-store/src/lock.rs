//! Per-path reader/writer locks
//!
//! A registry maps each storage path to a reference-counted `RwLock`. Entries
//! are created on first demand and removed as soon as the last holder or
//! waiter releases them, so the registry only ever holds paths that are in
//! use. Many shared holders may coexist on one path; an exclusive holder
//! excludes everyone else on that path.
//!
//! Lookup/creation and the count updates happen under the registry mutex; the
//! wait for the path lock itself happens outside it, so a blocked writer on
//! one path never stalls requests for other paths.

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, Mutex, RawRwLock, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often an empty registry may be reallocated
const REBUILD_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Lock mode requested for a path
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    /// Readers; any number may hold the lock at once
    Shared,
    /// A single writer or deleter
    Exclusive,
}

struct Entry {
    lock: Arc<RwLock<()>>,
    refs: usize,
}

struct Registry {
    locks: HashMap<PathBuf, Entry>,
    last_rebuild: Instant,
    rebuilds: u64,
}

/// Process-wide registry of path locks.
///
/// Shared between request handlers behind an `Arc`.
pub struct LockManager {
    registry: Mutex<Registry>,
    rebuild_interval: Duration,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::with_rebuild_interval(REBUILD_INTERVAL)
    }

    /// Create an empty registry that reallocates itself at most once per `interval`
    pub fn with_rebuild_interval(interval: Duration) -> Self {
        Self {
            registry: Mutex::new(Registry {
                locks: HashMap::new(),
                last_rebuild: Instant::now(),
                rebuilds: 0,
            }),
            rebuild_interval: interval,
        }
    }

    /// Number of paths currently locked or waited on
    pub fn len(&self) -> usize {
        self.registry.lock().locks.len()
    }

    /// Whether no path is locked or waited on
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lock `path` in `mode`, blocking the calling thread until granted.
    ///
    /// The lock is released when the returned guard is dropped.
    pub fn acquire(self: &Arc<Self>, path: &Path, mode: LockMode) -> PathGuard {
        let lock = {
            let mut registry = self.registry.lock();
            let entry = registry
                .locks
                .entry(path.to_path_buf())
                .or_insert_with(|| Entry {
                    lock: Arc::new(RwLock::new(())),
                    refs: 0,
                });
            entry.refs += 1;
            Arc::clone(&entry.lock)
        };

        let held = match mode {
            LockMode::Shared => Held::Shared {
                _guard: lock.read_arc(),
            },
            LockMode::Exclusive => Held::Exclusive {
                _guard: lock.write_arc(),
            },
        };
        tracing::trace!(?mode, "Path lock acquired");

        PathGuard {
            manager: Arc::clone(self),
            path: path.to_path_buf(),
            mode,
            held: Some(held),
        }
    }

    /// Drop one reference to `path`, removing its entry at zero.
    ///
    /// Panics if `path` has no entry: that is a release without an acquire.
    fn release(&self, path: &Path, mode: LockMode) {
        let mut registry = self.registry.lock();
        let Some(entry) = registry.locks.get_mut(path) else {
            panic!("path lock released without acquire ({mode:?})");
        };
        entry.refs = entry
            .refs
            .checked_sub(1)
            .unwrap_or_else(|| panic!("path lock reference count went negative ({mode:?})"));
        if entry.refs == 0 {
            registry.locks.remove(path);
        }

        if registry.locks.is_empty() && registry.last_rebuild.elapsed() >= self.rebuild_interval {
            registry.locks = HashMap::new();
            registry.last_rebuild = Instant::now();
            registry.rebuilds += 1;
            tracing::debug!(rebuilds = registry.rebuilds, "Rebuilt empty path lock registry");
        }
    }
}

enum Held {
    Shared {
        _guard: ArcRwLockReadGuard<RawRwLock, ()>,
    },
    Exclusive {
        _guard: ArcRwLockWriteGuard<RawRwLock, ()>,
    },
}

/// Holds a path lock until dropped
pub struct PathGuard {
    manager: Arc<LockManager>,
    path: PathBuf,
    mode: LockMode,
    held: Option<Held>,
}

impl PathGuard {
    /// The mode this guard holds
    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl std::fmt::Debug for PathGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathGuard")
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        // Unlock first so the entry is never removed while still held
        if let Some(held) = self.held.take() {
            drop(held);
            self.manager.release(&self.path, self.mode);
            tracing::trace!(mode = ?self.mode, "Path lock released");
        }
    }
}
