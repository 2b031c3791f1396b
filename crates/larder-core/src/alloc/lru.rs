//! Recency-ordered key list with O(1) promotion and tail eviction.
//!
//! A doubly linked list stored in an arena plus a key -> node index map.
//! Freed nodes go onto a free list and are reused by later inserts, so a
//! list that has reached its working size stops allocating.
//!
//! The head is the most recently used key, the tail the least recently used.

use std::hash::Hash;

use super::HashMap;
use crate::profiling::profile_function;

const NIL: u32 = u32::MAX;

#[derive(Debug, Clone)]
struct Node<K> {
    key: Option<K>,
    prev: u32,
    next: u32,
}

/// An LRU ordering over keys.
#[derive(Debug, Clone)]
pub struct LruList<K: Copy + Eq + Hash> {
    nodes: Vec<Node<K>>,
    free: Vec<u32>,
    head: u32,
    tail: u32,
    index: HashMap<K, u32>,
}

impl<K: Copy + Eq + Hash> Default for LruList<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq + Hash> LruList<K> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a list with room for `capacity` keys before reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            index: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Insert `key` at the head. A key already present is promoted instead.
    pub fn insert_to_head(&mut self, key: K) {
        profile_function!();
        if let Some(&node) = self.index.get(&key) {
            self.move_to_head(node);
            return;
        }

        let node = self.alloc_node(key);
        self.link_at_head(node);
        self.index.insert(key, node);
    }

    /// Promote `key` to the head. Returns `false` if it is not in the list.
    pub fn refresh(&mut self, key: &K) -> bool {
        match self.index.get(key) {
            Some(&node) => {
                self.move_to_head(node);
                true
            }
            None => false,
        }
    }

    /// Remove `key` from the list. Returns `false` if it was not present.
    pub fn remove(&mut self, key: &K) -> bool {
        profile_function!();
        let Some(node) = self.index.remove(key) else {
            return false;
        };
        self.unlink(node);
        self.release_node(node);
        true
    }

    /// The most recently inserted or refreshed key.
    pub fn front(&self) -> Option<K> {
        self.key_at(self.head)
    }

    /// The least recently used key: the next eviction victim.
    pub fn back(&self) -> Option<K> {
        self.key_at(self.tail)
    }

    /// Remove and return the least recently used key.
    pub fn pop_back(&mut self) -> Option<K> {
        let key = self.back()?;
        self.remove(&key);
        Some(key)
    }

    /// Remove every key, keeping node storage for reuse.
    pub fn clear(&mut self) {
        while self.pop_back().is_some() {}
    }

    /// Iterate keys from most to least recently used.
    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    fn key_at(&self, node: u32) -> Option<K> {
        if node == NIL {
            return None;
        }
        self.nodes[node as usize].key
    }

    fn alloc_node(&mut self, key: K) -> u32 {
        let fresh = Node {
            key: Some(key),
            prev: NIL,
            next: NIL,
        };
        if let Some(node) = self.free.pop() {
            self.nodes[node as usize] = fresh;
            node
        } else {
            self.nodes.push(fresh);
            (self.nodes.len() - 1) as u32
        }
    }

    fn release_node(&mut self, node: u32) {
        let slot = &mut self.nodes[node as usize];
        slot.key = None;
        slot.prev = NIL;
        slot.next = NIL;
        self.free.push(node);
    }

    fn link_at_head(&mut self, node: u32) {
        let old_head = self.head;
        {
            let slot = &mut self.nodes[node as usize];
            slot.prev = NIL;
            slot.next = old_head;
        }
        if old_head != NIL {
            self.nodes[old_head as usize].prev = node;
        } else {
            self.tail = node;
        }
        self.head = node;
    }

    fn unlink(&mut self, node: u32) {
        let (prev, next) = {
            let slot = &self.nodes[node as usize];
            (slot.prev, slot.next)
        };
        if prev != NIL {
            self.nodes[prev as usize].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.nodes[next as usize].prev = prev;
        } else {
            self.tail = prev;
        }
        let slot = &mut self.nodes[node as usize];
        slot.prev = NIL;
        slot.next = NIL;
    }

    fn move_to_head(&mut self, node: u32) {
        if self.head == node {
            return;
        }
        self.unlink(node);
        self.link_at_head(node);
    }
}

/// Iterator over an [`LruList`], head to tail.
pub struct Iter<'a, K: Copy + Eq + Hash> {
    list: &'a LruList<K>,
    cursor: u32,
}

impl<K: Copy + Eq + Hash> Iterator for Iter<'_, K> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        if self.cursor == NIL {
            return None;
        }
        let node = &self.list.nodes[self.cursor as usize];
        self.cursor = node.next;
        node.key
    }
}
