//! # RbTree - Ordered Hash Index
//!
//! A red-black tree used by the mapper to look up cache records by their
//! 64-bit content hash. Keys are any `K: Ord`; values are opaque to the tree.
//!
//! ## Layout
//!
//! Nodes live in an arena (`Vec<Node>`). Slot 0 is the **sentinel**: a black
//! placeholder shared by every leaf and by the root's parent. It is never
//! handed out and never freed. Slots released by [`RbTree::remove`] are kept
//! on a free list and recycled by later inserts.
//!
//! ## Invariants
//!
//! - the root is black;
//! - no red node has a red child;
//! - every root-to-sentinel path carries the same number of black nodes.
//!
//! [`RbTree::check_invariants`] verifies all three (plus parent links and key
//! order) and is what the tests lean on after insert/remove churn.
//!
//! ## Example
//!
//! ```rust
//! use rbtree::RbTree;
//!
//! let mut t = RbTree::new();
//! t.insert(42u64, "answer").unwrap();
//! let loc = t.find(&42).unwrap();
//! assert_eq!(t.value(loc), Some(&"answer"));
//! assert_eq!(t.remove(loc).unwrap(), (42, "answer"));
//! ```

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

/// Arena slot of the shared sentinel.
const NIL: usize = 0;

/// Errors reported by index operations. None of them are fatal to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IndexError {
    /// An equal key is already present.
    #[error("duplicate key")]
    DuplicateKey,

    /// The node arena could not grow.
    #[error("memory exhausted while growing the index")]
    MemoryExhausted,

    /// The key (or locator) does not refer to a live entry.
    #[error("key not found")]
    KeyNotFound,
}

/// A broken red-black or search-tree property, as found by
/// [`RbTree::check_invariants`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("root is red")]
    RedRoot,
    #[error("red node at slot {0} has a red child")]
    RedRed(usize),
    #[error("black height differs below slot {0}")]
    BlackHeight(usize),
    #[error("parent link of slot {0} is wrong")]
    ParentLink(usize),
    #[error("keys out of order at slot {0}")]
    Order(usize),
    #[error("tree holds {found} entries but len is {len}")]
    Length { found: usize, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

struct Node<K, V> {
    /// `None` for the sentinel and for free slots.
    entry: Option<(K, V)>,
    color: Color,
    left: usize,
    right: usize,
    parent: usize,
}

impl<K, V> Node<K, V> {
    fn vacant() -> Self {
        Self {
            entry: None,
            color: Color::Black,
            left: NIL,
            right: NIL,
            parent: NIL,
        }
    }
}

/// Opaque locator for a live entry, returned by [`RbTree::find`] and
/// [`RbTree::insert`].
///
/// A locator stays valid until its entry is removed. Removing an entry with
/// two children moves the in-order successor's entry into the removed slot,
/// so a locator held for that successor no longer points at it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(usize);

/// Red-black tree keyed by `K`, with a shared black sentinel.
pub struct RbTree<K, V> {
    nodes: Vec<Node<K, V>>,
    free: Vec<usize>,
    root: usize,
    len: usize,
}

impl<K: Ord, V> RbTree<K, V> {
    /// Creates an empty tree holding only the sentinel.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::vacant()],
            free: Vec::new(),
            root: NIL,
            len: 0,
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts `key -> value`.
    ///
    /// # Errors
    ///
    /// - [`IndexError::DuplicateKey`] if an equal key is present (the tree is
    ///   left untouched).
    /// - [`IndexError::MemoryExhausted`] if the arena cannot grow.
    pub fn insert(&mut self, key: K, value: V) -> Result<NodeRef, IndexError> {
        let mut parent = NIL;
        let mut cur = self.root;
        let mut go_left = false;

        while cur != NIL {
            parent = cur;
            match key.cmp(self.key_at(cur)) {
                Ordering::Less => {
                    go_left = true;
                    cur = self.nodes[cur].left;
                }
                Ordering::Greater => {
                    go_left = false;
                    cur = self.nodes[cur].right;
                }
                Ordering::Equal => return Err(IndexError::DuplicateKey),
            }
        }

        let z = self.alloc(key, value)?;
        self.nodes[z].parent = parent;
        if parent == NIL {
            self.root = z;
        } else if go_left {
            self.nodes[parent].left = z;
        } else {
            self.nodes[parent].right = z;
        }
        self.len += 1;

        self.insert_fixup(z);
        Ok(NodeRef(z))
    }

    /// Returns a locator for `key`, or `None` if absent.
    #[must_use]
    pub fn find(&self, key: &K) -> Option<NodeRef> {
        let mut cur = self.root;
        while cur != NIL {
            match key.cmp(self.key_at(cur)) {
                Ordering::Less => cur = self.nodes[cur].left,
                Ordering::Greater => cur = self.nodes[cur].right,
                Ordering::Equal => return Some(NodeRef(cur)),
            }
        }
        None
    }

    /// Point lookup returning the value directly.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key).and_then(|loc| self.value(loc))
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let loc = self.find(key)?;
        self.value_mut(loc)
    }

    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Key behind a locator; `None` once the entry has been removed.
    #[must_use]
    pub fn key(&self, loc: NodeRef) -> Option<&K> {
        self.live(loc).map(|(k, _)| k)
    }

    /// Value behind a locator; `None` once the entry has been removed.
    #[must_use]
    pub fn value(&self, loc: NodeRef) -> Option<&V> {
        self.live(loc).map(|(_, v)| v)
    }

    pub fn value_mut(&mut self, loc: NodeRef) -> Option<&mut V> {
        if loc.0 == NIL {
            return None;
        }
        self.nodes
            .get_mut(loc.0)
            .and_then(|n| n.entry.as_mut())
            .map(|(_, v)| v)
    }

    /// Removes the entry behind `loc` and hands its key and value back.
    ///
    /// A node with two children takes over its in-order successor's entry and
    /// the successor's slot is the one physically unlinked. When the unlinked
    /// slot was black the delete fixup restores the black height.
    ///
    /// # Errors
    ///
    /// [`IndexError::KeyNotFound`] if `loc` is stale.
    pub fn remove(&mut self, loc: NodeRef) -> Result<(K, V), IndexError> {
        let z = loc.0;
        if self.live(loc).is_none() {
            return Err(IndexError::KeyNotFound);
        }

        let y = if self.nodes[z].left == NIL || self.nodes[z].right == NIL {
            z
        } else {
            self.minimum(self.nodes[z].right)
        };
        let x = if self.nodes[y].left != NIL {
            self.nodes[y].left
        } else {
            self.nodes[y].right
        };

        // x may be the sentinel; its parent link is borrowed by the fixup.
        let yp = self.nodes[y].parent;
        self.nodes[x].parent = yp;
        if yp == NIL {
            self.root = x;
        } else if y == self.nodes[yp].left {
            self.nodes[yp].left = x;
        } else {
            self.nodes[yp].right = x;
        }

        let removed_color = self.nodes[y].color;
        let y_entry = self.nodes[y].entry.take();
        let removed = if y != z {
            std::mem::replace(&mut self.nodes[z].entry, y_entry)
        } else {
            y_entry
        };

        if removed_color == Color::Black {
            self.delete_fixup(x);
        }

        self.release(y);
        self.nodes[NIL].parent = NIL;
        self.len -= 1;

        removed.ok_or(IndexError::KeyNotFound)
    }

    /// `find` followed by `remove`.
    pub fn remove_key(&mut self, key: &K) -> Result<(K, V), IndexError> {
        let loc = self.find(key).ok_or(IndexError::KeyNotFound)?;
        self.remove(loc)
    }

    /// Drops every entry, visiting nodes in post-order.
    pub fn clear(&mut self) {
        for _ in self.drain_post_order() {}
    }

    /// Consumes the tree, returning every entry in post-order (children
    /// before their parent).
    #[must_use]
    pub fn into_post_order(mut self) -> Vec<(K, V)> {
        self.drain_post_order()
    }

    /// In-order iterator over `(key, value)`.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut it = Iter {
            tree: self,
            stack: Vec::new(),
        };
        it.push_left(self.root);
        it
    }

    /// Checks every red-black and ordering invariant, returning the black
    /// height of the tree (sentinel counted) on success.
    pub fn check_invariants(&self) -> Result<usize, InvariantViolation> {
        if self.nodes[self.root].color == Color::Red {
            return Err(InvariantViolation::RedRoot);
        }
        if self.root != NIL && self.nodes[self.root].parent != NIL {
            return Err(InvariantViolation::ParentLink(self.root));
        }
        let height = self.check_subtree(self.root)?;

        let mut found = 0usize;
        let mut prev: Option<&K> = None;
        for (k, _) in self.iter() {
            if let Some(p) = prev {
                if p >= k {
                    return Err(InvariantViolation::Order(found));
                }
            }
            prev = Some(k);
            found += 1;
        }
        if found != self.len {
            return Err(InvariantViolation::Length {
                found,
                len: self.len,
            });
        }
        Ok(height)
    }

    // ---- Internal helpers ----

    fn live(&self, loc: NodeRef) -> Option<(&K, &V)> {
        if loc.0 == NIL {
            return None;
        }
        self.nodes
            .get(loc.0)
            .and_then(|n| n.entry.as_ref())
            .map(|(k, v)| (k, v))
    }

    fn key_at(&self, i: usize) -> &K {
        match self.nodes[i].entry {
            Some((ref k, _)) => k,
            None => unreachable!("slot {} is linked into the tree but vacant", i),
        }
    }

    fn alloc(&mut self, key: K, value: V) -> Result<usize, IndexError> {
        let node = Node {
            entry: Some((key, value)),
            color: Color::Red,
            left: NIL,
            right: NIL,
            parent: NIL,
        };
        if let Some(slot) = self.free.pop() {
            self.nodes[slot] = node;
            return Ok(slot);
        }
        self.nodes
            .try_reserve(1)
            .map_err(|_| IndexError::MemoryExhausted)?;
        self.nodes.push(node);
        Ok(self.nodes.len() - 1)
    }

    fn release(&mut self, slot: usize) {
        self.nodes[slot] = Node::vacant();
        self.free.push(slot);
    }

    fn minimum(&self, mut i: usize) -> usize {
        while self.nodes[i].left != NIL {
            i = self.nodes[i].left;
        }
        i
    }

    fn rotate_left(&mut self, x: usize) {
        let y = self.nodes[x].right;
        let yl = self.nodes[y].left;
        self.nodes[x].right = yl;
        if yl != NIL {
            self.nodes[yl].parent = x;
        }
        let xp = self.nodes[x].parent;
        self.nodes[y].parent = xp;
        if xp == NIL {
            self.root = y;
        } else if x == self.nodes[xp].left {
            self.nodes[xp].left = y;
        } else {
            self.nodes[xp].right = y;
        }
        self.nodes[y].left = x;
        self.nodes[x].parent = y;
    }

    fn rotate_right(&mut self, x: usize) {
        let y = self.nodes[x].left;
        let yr = self.nodes[y].right;
        self.nodes[x].left = yr;
        if yr != NIL {
            self.nodes[yr].parent = x;
        }
        let xp = self.nodes[x].parent;
        self.nodes[y].parent = xp;
        if xp == NIL {
            self.root = y;
        } else if x == self.nodes[xp].right {
            self.nodes[xp].right = y;
        } else {
            self.nodes[xp].left = y;
        }
        self.nodes[y].right = x;
        self.nodes[x].parent = y;
    }

    fn insert_fixup(&mut self, mut z: usize) {
        while self.nodes[self.nodes[z].parent].color == Color::Red {
            let p = self.nodes[z].parent;
            let g = self.nodes[p].parent;

            if p == self.nodes[g].left {
                let uncle = self.nodes[g].right;
                if self.nodes[uncle].color == Color::Red {
                    self.nodes[p].color = Color::Black;
                    self.nodes[uncle].color = Color::Black;
                    self.nodes[g].color = Color::Red;
                    z = g;
                } else {
                    if z == self.nodes[p].right {
                        z = p;
                        self.rotate_left(z);
                    }
                    let p = self.nodes[z].parent;
                    let g = self.nodes[p].parent;
                    self.nodes[p].color = Color::Black;
                    self.nodes[g].color = Color::Red;
                    self.rotate_right(g);
                }
            } else {
                let uncle = self.nodes[g].left;
                if self.nodes[uncle].color == Color::Red {
                    self.nodes[p].color = Color::Black;
                    self.nodes[uncle].color = Color::Black;
                    self.nodes[g].color = Color::Red;
                    z = g;
                } else {
                    if z == self.nodes[p].left {
                        z = p;
                        self.rotate_right(z);
                    }
                    let p = self.nodes[z].parent;
                    let g = self.nodes[p].parent;
                    self.nodes[p].color = Color::Black;
                    self.nodes[g].color = Color::Red;
                    self.rotate_left(g);
                }
            }
        }
        let root = self.root;
        self.nodes[root].color = Color::Black;
    }

    fn delete_fixup(&mut self, mut x: usize) {
        while x != self.root && self.nodes[x].color == Color::Black {
            let p = self.nodes[x].parent;

            if x == self.nodes[p].left {
                let mut w = self.nodes[p].right;
                if self.nodes[w].color == Color::Red {
                    self.nodes[w].color = Color::Black;
                    self.nodes[p].color = Color::Red;
                    self.rotate_left(p);
                    w = self.nodes[p].right;
                }
                let wl = self.nodes[w].left;
                let wr = self.nodes[w].right;
                if self.nodes[wl].color == Color::Black && self.nodes[wr].color == Color::Black {
                    self.nodes[w].color = Color::Red;
                    x = p;
                } else {
                    if self.nodes[wr].color == Color::Black {
                        self.nodes[wl].color = Color::Black;
                        self.nodes[w].color = Color::Red;
                        self.rotate_right(w);
                        w = self.nodes[p].right;
                    }
                    self.nodes[w].color = self.nodes[p].color;
                    self.nodes[p].color = Color::Black;
                    let wr = self.nodes[w].right;
                    self.nodes[wr].color = Color::Black;
                    self.rotate_left(p);
                    x = self.root;
                }
            } else {
                let mut w = self.nodes[p].left;
                if self.nodes[w].color == Color::Red {
                    self.nodes[w].color = Color::Black;
                    self.nodes[p].color = Color::Red;
                    self.rotate_right(p);
                    w = self.nodes[p].left;
                }
                let wl = self.nodes[w].left;
                let wr = self.nodes[w].right;
                if self.nodes[wl].color == Color::Black && self.nodes[wr].color == Color::Black {
                    self.nodes[w].color = Color::Red;
                    x = p;
                } else {
                    if self.nodes[wl].color == Color::Black {
                        self.nodes[wr].color = Color::Black;
                        self.nodes[w].color = Color::Red;
                        self.rotate_left(w);
                        w = self.nodes[p].left;
                    }
                    self.nodes[w].color = self.nodes[p].color;
                    self.nodes[p].color = Color::Black;
                    let wl = self.nodes[w].left;
                    self.nodes[wl].color = Color::Black;
                    self.rotate_right(p);
                    x = self.root;
                }
            }
        }
        self.nodes[x].color = Color::Black;
    }

    /// Post-order teardown. Leaves the tree empty with only the sentinel.
    fn drain_post_order(&mut self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.len);
        let mut stack = Vec::new();
        let mut last = NIL;
        let mut cur = self.root;

        while cur != NIL || !stack.is_empty() {
            if cur != NIL {
                stack.push(cur);
                cur = self.nodes[cur].left;
                continue;
            }
            let top = match stack.last() {
                Some(&t) => t,
                None => break,
            };
            let right = self.nodes[top].right;
            if right != NIL && right != last {
                cur = right;
            } else {
                stack.pop();
                if let Some(entry) = self.nodes[top].entry.take() {
                    out.push(entry);
                }
                last = top;
            }
        }

        self.nodes.truncate(1);
        self.nodes[NIL] = Node::vacant();
        self.free.clear();
        self.root = NIL;
        self.len = 0;
        out
    }

    fn check_subtree(&self, i: usize) -> Result<usize, InvariantViolation> {
        if i == NIL {
            return Ok(1);
        }
        let node = &self.nodes[i];
        for child in [node.left, node.right] {
            if child != NIL && self.nodes[child].parent != i {
                return Err(InvariantViolation::ParentLink(child));
            }
            if node.color == Color::Red && self.nodes[child].color == Color::Red {
                return Err(InvariantViolation::RedRed(i));
            }
        }
        let lh = self.check_subtree(node.left)?;
        let rh = self.check_subtree(node.right)?;
        if lh != rh {
            return Err(InvariantViolation::BlackHeight(i));
        }
        Ok(lh + usize::from(node.color == Color::Black))
    }
}

impl<K: Ord, V> Default for RbTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + fmt::Debug, V> fmt::Debug for RbTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RbTree")
            .field("len", &self.len)
            .field("slots", &self.nodes.len())
            .field("free_slots", &self.free.len())
            .finish()
    }
}

/// In-order iterator returned by [`RbTree::iter`].
pub struct Iter<'a, K, V> {
    tree: &'a RbTree<K, V>,
    stack: Vec<usize>,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn push_left(&mut self, mut i: usize) {
        while i != NIL {
            self.stack.push(i);
            i = self.tree.nodes[i].left;
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        let i = self.stack.pop()?;
        self.push_left(tree.nodes[i].right);
        tree.nodes[i].entry.as_ref().map(|(k, v)| (k, v))
    }
}
