// Copyright 2025 ReductSoftware UG
// Licensed under the Business Source License 1.1

//! Hashing and equality over the path of a cache row.
//!
//! A cache row is a path plus metadata that changes on every access. Identity
//! must depend on the path alone, so rows hash and compare through the
//! [`PathKeyed`] projection. The path itself lives in a shared [`PathKey`]:
//! the store and the eviction index hold clones of the same allocation.

use std::borrow::Borrow;
use std::fmt::{Display, Formatter};
use std::hash::{BuildHasher, Hash};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared immutable path used as a cache key.
///
/// Hashes exactly like the [`Path`] it wraps, so maps keyed by `PathKey`
/// can be queried with a `&Path`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathKey(Arc<Path>);

impl PathKey {
    pub fn new(path: &Path) -> Self {
        PathKey(Arc::from(path))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.0.to_path_buf()
    }

    /// True if both keys share the same allocation.
    pub fn ptr_eq(&self, other: &PathKey) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Borrow<Path> for PathKey {
    fn borrow(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for PathKey {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl From<&Path> for PathKey {
    fn from(path: &Path) -> Self {
        PathKey::new(path)
    }
}

impl From<PathBuf> for PathKey {
    fn from(path: PathBuf) -> Self {
        PathKey(Arc::from(path))
    }
}

impl Display for PathKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Anything addressable by a path.
pub trait PathKeyed {
    fn key(&self) -> &Path;
}

impl PathKeyed for Path {
    fn key(&self) -> &Path {
        self
    }
}

impl PathKeyed for PathBuf {
    fn key(&self) -> &Path {
        self.as_path()
    }
}

impl PathKeyed for PathKey {
    fn key(&self) -> &Path {
        self.as_path()
    }
}

impl<T: PathKeyed + ?Sized> PathKeyed for &T {
    fn key(&self) -> &Path {
        (**self).key()
    }
}

pub fn key_of<T: PathKeyed + ?Sized>(item: &T) -> &Path {
    item.key()
}

/// Hash of the path component.
///
/// Equal for a row and its bare path when computed with the same builder.
pub fn hash_of<S: BuildHasher, T: PathKeyed + ?Sized>(build_hasher: &S, item: &T) -> u64 {
    build_hasher.hash_one(item.key())
}

/// Two items are the same cache row iff their paths are equal.
pub fn equal<A: PathKeyed + ?Sized, B: PathKeyed + ?Sized>(a: &A, b: &B) -> bool {
    a.key() == b.key()
}

/// Helper for implementing [`Hash`] on path-keyed rows.
pub(crate) fn hash_key<T: PathKeyed + ?Sized, H: std::hash::Hasher>(item: &T, state: &mut H) {
    item.key().hash(state)
}
