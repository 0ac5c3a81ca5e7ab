// Copyright 2025 ReductSoftware UG
// Licensed under the Business Source License 1.1

use crate::core::hashing::PathKey;
use std::collections::HashMap;
use std::path::Path;

const NIL: usize = usize::MAX;

struct Node {
    key: Option<PathKey>,
    prev: usize,
    next: usize,
}

/// Recency order over cached paths.
///
/// A doubly linked list kept in an arena (head = most recently used,
/// tail = least recently used) plus a map from path to arena slot, so that
/// promotion, removal by path and popping the tail are all O(1).
/// Freed slots are recycled through a free list threaded over `next`.
pub(crate) struct EvictionIndex {
    slots: HashMap<PathKey, usize>,
    arena: Vec<Node>,
    head: usize,
    tail: usize,
    free: usize,
}

impl EvictionIndex {
    pub fn new() -> Self {
        EvictionIndex {
            slots: HashMap::new(),
            arena: Vec::new(),
            head: NIL,
            tail: NIL,
            free: NIL,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.slots.contains_key(path)
    }

    /// Moves `key` to the head, inserting it if it isn't indexed yet.
    pub fn insert_or_promote(&mut self, key: PathKey) {
        if let Some(&idx) = self.slots.get(key.as_path()) {
            if self.head != idx {
                self.unlink(idx);
                self.push_head(idx);
            }
            return;
        }

        let idx = self.alloc(key.clone());
        self.push_head(idx);
        self.slots.insert(key, idx);
    }

    pub fn peek_least_recently_used(&self) -> Option<&Path> {
        if self.tail == NIL {
            return None;
        }
        self.arena[self.tail].key.as_ref().map(|key| key.as_path())
    }

    pub fn pop_least_recently_used(&mut self) -> Option<PathKey> {
        if self.tail == NIL {
            return None;
        }

        let idx = self.tail;
        let key = self.release(idx)?;
        self.slots.remove(key.as_path());
        Some(key)
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        match self.slots.remove(path) {
            Some(idx) => {
                self.release(idx);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.arena.clear();
        self.head = NIL;
        self.tail = NIL;
        self.free = NIL;
    }

    /// Iterates from the least to the most recently used path.
    pub fn iter_lru(&self) -> LruIter<'_> {
        LruIter {
            arena: &self.arena,
            current: self.tail,
        }
    }

    fn alloc(&mut self, key: PathKey) -> usize {
        let node = Node {
            key: Some(key),
            prev: NIL,
            next: NIL,
        };

        if self.free == NIL {
            self.arena.push(node);
            return self.arena.len() - 1;
        }

        let idx = self.free;
        self.free = self.arena[idx].next;
        self.arena[idx] = node;
        idx
    }

    /// Unlinks the node and puts its slot on the free list.
    fn release(&mut self, idx: usize) -> Option<PathKey> {
        self.unlink(idx);
        let key = self.arena[idx].key.take();
        self.arena[idx].next = self.free;
        self.free = idx;
        key
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.arena[idx].prev, self.arena[idx].next);

        if prev == NIL {
            self.head = next;
        } else {
            self.arena[prev].next = next;
        }

        if next == NIL {
            self.tail = prev;
        } else {
            self.arena[next].prev = prev;
        }

        self.arena[idx].prev = NIL;
        self.arena[idx].next = NIL;
    }

    fn push_head(&mut self, idx: usize) {
        self.arena[idx].prev = NIL;
        self.arena[idx].next = self.head;

        if self.head != NIL {
            self.arena[self.head].prev = idx;
        }
        self.head = idx;

        if self.tail == NIL {
            self.tail = idx;
        }
    }
}

pub(crate) struct LruIter<'a> {
    arena: &'a [Node],
    current: usize,
}

impl<'a> Iterator for LruIter<'a> {
    type Item = &'a Path;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == NIL {
            return None;
        }

        let node = &self.arena[self.current];
        self.current = node.prev;
        node.key.as_ref().map(|key| key.as_path())
    }
}
