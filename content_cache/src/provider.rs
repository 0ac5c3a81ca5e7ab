// Copyright 2025 ReductSoftware UG
// Licensed under the Business Source License 1.1

use crate::cache::{BudgetController, CacheFileContext, CacheStore};
use crate::cfg::cache::{CacheConfig, EvictionMode};
use bytesize::ByteSize;
use cache_base::bad_request;
use cache_base::error::{CacheError, ErrorCode};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::{fs, io};
use tokio::task::JoinHandle;

/// Prefix of partially written files, never indexed.
const STAGING_PREFIX: &str = ".staging-";

/// Gets notified about files removed from the cache to keep it in budget.
pub trait EvictionObserver: Send + Sync {
    fn on_evicted(&self, paths: &[PathBuf]);
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub max_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evicted: u64,
}

struct CacheState {
    store: CacheStore,
    budget: BudgetController,
    hits: u64,
    misses: u64,
    evicted: u64,
}

impl CacheState {
    /// Evicts and unlinks files until the store is in budget.
    fn enforce_budget(&mut self) -> Result<Vec<PathBuf>, CacheError> {
        let evicted = self.budget.enforce(&mut self.store)?;
        remove_files(&evicted);
        self.evicted += evicted.len() as u64;
        Ok(evicted)
    }
}

/// Local cache of files fetched from a provided (remote) file system.
///
/// The cache keeps the metadata of every file under its root directory and
/// deletes the least recently used files once their total size exceeds the
/// budget. Content is written to a staging file outside the metadata lock.
/// Publishing it, registering it and unlinking evicted files happen under
/// the lock, so a tracked path always has its file on disk.
///
/// Paths may be given relative to the root or as absolute paths inside it.
pub struct ProvidedFileCache {
    root: PathBuf,
    eviction_mode: EvictionMode,
    state: Mutex<CacheState>,
    observers: RwLock<Vec<Box<dyn EvictionObserver>>>,
}

impl ProvidedFileCache {
    /// Opens the cache directory, creating it if needed.
    ///
    /// Files already in the directory are indexed by modification time, the
    /// oldest becoming the least recently used, and the budget is enforced.
    /// With `cleanup_on_start` the directory is emptied instead.
    pub fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        let root = config.path.clone();
        if config.cleanup_on_start {
            info!("Cleaning up local cache at {:?}", root);
            if let Err(err) = fs::remove_dir_all(&root) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to clean up local cache at {:?}: {}", root, err);
                }
            }
        }
        fs::create_dir_all(&root)?;

        let cache = ProvidedFileCache {
            root,
            eviction_mode: config.eviction_mode.clone(),
            state: Mutex::new(CacheState {
                store: CacheStore::new(),
                budget: BudgetController::new(config.max_bytes),
                hits: 0,
                misses: 0,
                evicted: 0,
            }),
            observers: RwLock::new(Vec::new()),
        };

        let staged = cache.rebuild_index()?;
        if !staged.is_empty() {
            info!("Removing {} unfinished files from {:?}", staged.len(), cache.root);
            remove_files(&staged);
        }

        cache.enforce_budget()?;
        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn eviction_mode(&self) -> &EvictionMode {
        &self.eviction_mode
    }

    pub fn add_observer(&self, observer: Box<dyn EvictionObserver>) {
        self.observers.write().unwrap().push(observer);
    }

    /// Registers a file already written to the cache directory.
    ///
    /// The caller must not rewrite the file while registering it; use
    /// [`ProvidedFileCache::write_file`] for content shared between threads.
    ///
    /// # Returns
    ///
    /// The files evicted to stay in budget, already deleted from disk.
    /// Always empty in periodic eviction mode.
    pub fn cache_file(&self, path: &Path) -> Result<Vec<PathBuf>, CacheError> {
        let full_path = self.resolve(path)?;
        let result = {
            let mut state = self.lock_state();
            let metadata = fs::metadata(&full_path)?;
            if !metadata.is_file() {
                return Err(bad_request!("{:?} is not a file", full_path));
            }
            self.register(&mut state, &full_path, metadata.len())
        };

        self.complete_eviction(result)
    }

    /// Writes fetched content into the cache directory and registers it.
    ///
    /// The content goes to a staging file first and replaces the cached file
    /// in one rename.
    pub fn write_file(&self, path: &Path, content: &[u8]) -> Result<Vec<PathBuf>, CacheError> {
        let full_path = self.resolve(path)?;
        let parent = full_path.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(parent)?;

        let mut staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(parent)?;
        staged.write_all(content)?;

        let result = {
            let mut state = self.lock_state();
            staged.persist(&full_path).map_err(|err| err.error)?;
            self.register(&mut state, &full_path, content.len() as u64)
        };

        self.complete_eviction(result)
    }

    /// Marks a cached file as used.
    ///
    /// Returns false on a cache miss: the file must be fetched and cached again.
    pub fn access_file(&self, path: &Path) -> Result<bool, CacheError> {
        let full_path = self.resolve(path)?;
        let mut state = self.lock_state();
        let hit = state.store.touch(&full_path);
        if hit {
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        Ok(hit)
    }

    /// Reads a cached file, `None` on a cache miss.
    pub fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>, CacheError> {
        let full_path = self.resolve(path)?;
        if !self.access_file(&full_path)? {
            return Ok(None);
        }

        match fs::read(&full_path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let mut state = self.lock_state();
                // the path may have been evicted and cached again meanwhile
                if is_missing(&full_path) && state.store.remove(&full_path) {
                    warn!(
                        "Cached file {:?} is missing on disk, dropping it from cache",
                        full_path
                    );
                }
                state.hits = state.hits.saturating_sub(1);
                state.misses += 1;
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Metadata of a cached file. Doesn't count as an access.
    pub fn context(&self, path: &Path) -> Result<Option<CacheFileContext>, CacheError> {
        let full_path = self.resolve(path)?;
        Ok(self.lock_state().store.get(&full_path))
    }

    /// Drops a file from the cache and deletes it regardless of the budget.
    ///
    /// Used when the remote file is gone. Returns false if it wasn't cached.
    /// If the file can't be deleted, it stays cached and the error is returned.
    pub fn invalidate(&self, path: &Path) -> Result<bool, CacheError> {
        let full_path = self.resolve(path)?;
        let mut state = self.lock_state();

        if let Err(err) = fs::remove_file(&full_path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove invalidated file {:?}: {}", full_path, err);
                return Err(err.into());
            }
        }

        let removed = state.store.remove(&full_path);
        debug!("Invalidated {:?} (cached: {})", full_path, removed);
        Ok(removed)
    }

    /// Drops all files under a directory and deletes the directory.
    ///
    /// If the directory can't be deleted completely, files left on disk stay
    /// cached and the error is returned.
    pub fn invalidate_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, CacheError> {
        let full_dir = self.resolve(dir)?;
        let mut state = self.lock_state();
        let paths = state.store.paths_under(&full_dir);

        let result = fs::remove_dir_all(&full_dir);
        let removed: Vec<PathBuf> = match &result {
            Err(err) if err.kind() != io::ErrorKind::NotFound => {
                warn!("Failed to remove invalidated directory {:?}: {}", full_dir, err);
                paths.into_iter().filter(|path| is_missing(path)).collect()
            }
            _ => paths,
        };

        for path in &removed {
            state.store.remove(path);
        }
        debug!("Invalidated {} files in {:?}", removed.len(), full_dir);

        match result {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(removed),
        }
    }

    /// Changes the budget and evicts files right away if needed.
    pub fn set_budget(&self, max_bytes: u64) -> Result<Vec<PathBuf>, CacheError> {
        let result = {
            let mut state = self.lock_state();
            state.budget.configure(max_bytes);
            state.enforce_budget()
        };

        self.complete_eviction(result)
    }

    /// Evicts least recently used files until the cache is in budget.
    ///
    /// # Returns
    ///
    /// The evicted files, oldest first, already deleted from disk.
    ///
    /// # Errors
    ///
    /// A consistency fault if the metadata was corrupted. The index is then
    /// rebuilt from the directory, so the files stay tracked.
    pub fn enforce_budget(&self) -> Result<Vec<PathBuf>, CacheError> {
        let result = self.lock_state().enforce_budget();
        self.complete_eviction(result)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock_state();
        CacheStats {
            entries: state.store.len(),
            total_bytes: state.store.total_bytes(),
            max_bytes: state.budget.max_bytes(),
            hits: state.hits,
            misses: state.misses,
            evicted: state.evicted,
        }
    }

    /// Full scan check of the metadata, see [`CacheStore::check_consistency`].
    pub fn check_consistency(&self) -> Result<(), CacheError> {
        self.lock_state().store.check_consistency()
    }

    /// Starts a task enforcing the budget periodically.
    ///
    /// Returns `None` if the cache evicts on write. The task stops on its own
    /// once the cache is dropped.
    pub fn spawn_eviction_worker(cache: &Arc<Self>) -> Option<JoinHandle<()>> {
        let EvictionMode::Periodic(interval) = cache.eviction_mode else {
            return None;
        };

        let weak = Arc::downgrade(cache);
        Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(cache) = weak.upgrade() else {
                    debug!("Cache is dropped, stopping eviction worker");
                    break;
                };

                match tokio::task::spawn_blocking(move || cache.enforce_budget()).await {
                    Ok(Ok(evicted)) => {
                        if !evicted.is_empty() {
                            info!("Evicted {} files from local cache", evicted.len());
                        }
                    }
                    Ok(Err(err)) => error!("Failed to enforce cache budget: {}", err),
                    Err(err) => error!("Eviction task failed: {}", err),
                }
            }
        }))
    }

    /// Puts a file published under the lock and evicts in on-write mode.
    fn register(
        &self,
        state: &mut CacheState,
        full_path: &Path,
        size: u64,
    ) -> Result<Vec<PathBuf>, CacheError> {
        state.store.put(full_path, CacheFileContext::now(size));
        debug!(
            "Cached {:?} ({}), cache size {}",
            full_path,
            ByteSize::b(size),
            ByteSize::b(state.store.total_bytes())
        );

        match self.eviction_mode {
            EvictionMode::OnWrite => state.enforce_budget(),
            EvictionMode::Periodic(_) => Ok(vec![]),
        }
    }

    /// Re-creates the metadata from the files in the cache directory.
    ///
    /// Returns the staging files found during the scan.
    fn rebuild_index(&self) -> Result<Vec<PathBuf>, CacheError> {
        let mut state = self.lock_state();
        let mut scan = DirScan::default();
        scan_dir(&self.root, &mut scan)?;
        scan.files
            .sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));

        state.store.clear();
        for file in scan.files {
            state
                .store
                .put(&file.path, CacheFileContext::new(file.size, file.modified));
        }

        info!(
            "Indexed {} cached files ({}) in {:?}",
            state.store.len(),
            ByteSize::b(state.store.total_bytes()),
            self.root
        );
        Ok(scan.staged)
    }

    fn complete_eviction(
        &self,
        result: Result<Vec<PathBuf>, CacheError>,
    ) -> Result<Vec<PathBuf>, CacheError> {
        match result {
            Ok(evicted) => {
                self.notify(&evicted);
                Ok(evicted)
            }
            Err(err) => {
                if err.status() == ErrorCode::ConsistencyFault {
                    warn!("Rebuilding index of {:?} after: {}", self.root, err);
                    self.rebuild_index()?;
                }
                Err(err)
            }
        }
    }

    fn notify(&self, paths: &[PathBuf]) {
        if paths.is_empty() {
            return;
        }

        for observer in self.observers.read().unwrap().iter() {
            observer.on_evicted(paths);
        }
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf, CacheError> {
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(bad_request!("Path {:?} must not contain '..'", path));
        }

        let full_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        if full_path == self.root || !full_path.starts_with(&self.root) {
            return Err(bad_request!(
                "Path {:?} is outside of cache directory {:?}",
                path,
                self.root
            ));
        }
        Ok(full_path)
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap()
    }
}

fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        if let Err(err) = fs::remove_file(path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove {:?}: {}", path, err);
            }
        }
    }
}

fn is_missing(path: &Path) -> bool {
    matches!(fs::symlink_metadata(path), Err(err) if err.kind() == io::ErrorKind::NotFound)
}

struct ScannedFile {
    path: PathBuf,
    size: u64,
    modified: DateTime<Utc>,
}

#[derive(Default)]
struct DirScan {
    files: Vec<ScannedFile>,
    staged: Vec<PathBuf>,
}

fn scan_dir(dir: &Path, scan: &mut DirScan) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            scan_dir(&entry.path(), scan)?;
        } else if file_type.is_file() {
            if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                scan.staged.push(entry.path());
                continue;
            }

            let metadata = entry.metadata()?;
            scan.files.push(ScannedFile {
                path: entry.path(),
                size: metadata.len(),
                modified: metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now()),
            });
        }
    }
    Ok(())
}
