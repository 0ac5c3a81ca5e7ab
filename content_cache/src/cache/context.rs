// Copyright 2025 ReductSoftware UG
// Licensed under the Business Source License 1.1

use crate::core::hashing::{hash_key, PathKey, PathKeyed};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::borrow::Borrow;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Metadata of one file materialized on local disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CacheFileContext {
    /// Bytes the cached file occupies on local storage.
    pub bytes_on_disk: u64,
    /// Last read or write of the cached file.
    pub accessed_time: DateTime<Utc>,
}

impl CacheFileContext {
    pub fn new(bytes_on_disk: u64, accessed_time: DateTime<Utc>) -> Self {
        CacheFileContext {
            bytes_on_disk,
            accessed_time,
        }
    }

    /// Context of a file accessed right now.
    pub fn now(bytes_on_disk: u64) -> Self {
        Self::new(bytes_on_disk, Utc::now())
    }
}

/// One row of the cache: a path and its context.
///
/// Rows hash and compare by path only, the context is payload.
#[derive(Clone, Debug)]
pub struct PathContextPair {
    path: PathKey,
    context: CacheFileContext,
}

impl PathContextPair {
    pub fn new(path: PathKey, context: CacheFileContext) -> Self {
        PathContextPair { path, context }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn path_key(&self) -> &PathKey {
        &self.path
    }

    pub fn context(&self) -> &CacheFileContext {
        &self.context
    }

    pub(crate) fn context_mut(&mut self) -> &mut CacheFileContext {
        &mut self.context
    }

    pub fn into_parts(self) -> (PathKey, CacheFileContext) {
        (self.path, self.context)
    }
}

impl PathKeyed for PathContextPair {
    fn key(&self) -> &Path {
        self.path.as_path()
    }
}

impl PartialEq for PathContextPair {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for PathContextPair {}

impl Hash for PathContextPair {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_key(self, state)
    }
}

impl Borrow<Path> for PathContextPair {
    fn borrow(&self) -> &Path {
        self.path.as_path()
    }
}
