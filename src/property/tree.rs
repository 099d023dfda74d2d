//! Generic arena backing the four paint property trees.
//!
//! Nodes are addressed by generational [`NodeId`] handles. A node stores only a parent link;
//! there are no child links. Destroyed slots are recycled through a free list and the
//! generation counter makes stale handles detectable.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::foundation::error::{StippleError, StippleResult};

/// Handle to a node in a [`PropertyTree`] whose nodes carry state `S`.
pub struct NodeId<S> {
    idx: u32,
    generation: u32,
    _state: PhantomData<fn() -> S>,
}

impl<S> NodeId<S> {
    fn new(idx: u32, generation: u32) -> Self {
        Self {
            idx,
            generation,
            _state: PhantomData,
        }
    }

    /// Slot index inside the owning tree. Stable for the lifetime of the node.
    pub fn index(self) -> u32 {
        self.idx
    }
}

impl<S> Clone for NodeId<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for NodeId<S> {}

impl<S> PartialEq for NodeId<S> {
    fn eq(&self, other: &Self) -> bool {
        self.idx == other.idx && self.generation == other.generation
    }
}

impl<S> Eq for NodeId<S> {}

impl<S> Hash for NodeId<S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.idx.hash(state);
        self.generation.hash(state);
    }
}

impl<S> fmt::Debug for NodeId<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}g{}", self.idx, self.generation)
    }
}

/// How much a property node changed, ordered from least to most invasive.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize,
)]
pub enum PaintPropertyChangeType {
    /// Nothing changed.
    #[default]
    Unchanged,
    /// Only values that a compositor animation drives directly changed.
    ChangedOnlyCompositedValues,
    /// Only simple values changed (2D translation, opacity).
    ChangedOnlySimpleValues,
    /// Arbitrary values changed.
    ChangedOnlyValues,
    /// The node was created, reparented or turned into/out of an alias.
    NodeAddedOrRemoved,
}

/// Per-variant node state.
pub trait NodeState: Clone + PartialEq + fmt::Debug {
    /// Memoized geometry kept alongside each node; stale entries are detected by generation.
    type GeometryCache: Default + fmt::Debug;

    /// Classifies the change from `old` to `self`.
    fn change_from(&self, old: &Self) -> PaintPropertyChangeType {
        if self == old {
            PaintPropertyChangeType::Unchanged
        } else {
            PaintPropertyChangeType::ChangedOnlyValues
        }
    }
}

/// A node either owns state or transparently forwards to its parent.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind<S> {
    /// Node with its own state.
    Real(S),
    /// Contributes no value of its own; readers must [`PropertyTree::unalias`] first.
    Alias,
}

#[derive(Debug)]
struct Slot<S: NodeState> {
    kind: NodeKind<S>,
    parent: Option<u32>,
    changed: PaintPropertyChangeType,
    generation: u32,
    live: bool,
    cache: S::GeometryCache,
}

/// Arena of property nodes rooted at slot 0.
#[derive(Debug)]
pub struct PropertyTree<S: NodeState> {
    slots: Vec<Slot<S>>,
    free_list: Vec<u32>,
}

impl<S: NodeState> PropertyTree<S> {
    /// Creates a tree containing only the root node.
    pub fn new(root_state: S) -> Self {
        Self {
            slots: vec![Slot {
                kind: NodeKind::Real(root_state),
                parent: None,
                changed: PaintPropertyChangeType::Unchanged,
                generation: 0,
                live: true,
                cache: S::GeometryCache::default(),
            }],
            free_list: Vec::new(),
        }
    }

    /// Handle of the root node.
    pub fn root(&self) -> NodeId<S> {
        NodeId::new(0, self.slots[0].generation)
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    /// Always false: the root is never destroyed.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `id` refers to a live node of this tree.
    pub fn is_alive(&self, id: NodeId<S>) -> bool {
        self.slots
            .get(id.idx as usize)
            .is_some_and(|s| s.live && s.generation == id.generation)
    }

    fn check(&self, id: NodeId<S>) -> StippleResult<()> {
        if self.is_alive(id) {
            Ok(())
        } else {
            Err(StippleError::tree(format!("stale or foreign node handle {id:?}")))
        }
    }

    fn slot(&self, id: NodeId<S>) -> &Slot<S> {
        let slot = &self.slots[id.idx as usize];
        assert!(
            slot.live && slot.generation == id.generation,
            "stale property node handle {id:?}"
        );
        slot
    }

    fn handle(&self, idx: u32) -> NodeId<S> {
        NodeId::new(idx, self.slots[idx as usize].generation)
    }

    fn alloc(&mut self, kind: NodeKind<S>, parent: u32) -> NodeId<S> {
        let slot = Slot {
            kind,
            parent: Some(parent),
            changed: PaintPropertyChangeType::NodeAddedOrRemoved,
            generation: 0,
            live: true,
            cache: S::GeometryCache::default(),
        };
        if let Some(idx) = self.free_list.pop() {
            let generation = self.slots[idx as usize].generation + 1;
            self.slots[idx as usize] = Slot { generation, ..slot };
            NodeId::new(idx, generation)
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(slot);
            NodeId::new(idx, 0)
        }
    }

    /// Creates a node with its own state under `parent`. The node starts out changed.
    pub fn create(&mut self, parent: NodeId<S>, state: S) -> StippleResult<NodeId<S>> {
        self.check(parent)?;
        Ok(self.alloc(NodeKind::Real(state), parent.idx))
    }

    /// Creates an alias of `parent`.
    pub fn create_alias(&mut self, parent: NodeId<S>) -> StippleResult<NodeId<S>> {
        self.check(parent)?;
        Ok(self.alloc(NodeKind::Alias, parent.idx))
    }

    /// Frees a node. Fails for the root and for nodes that still have children.
    pub fn destroy(&mut self, id: NodeId<S>) -> StippleResult<()> {
        self.check(id)?;
        if id.idx == 0 {
            return Err(StippleError::tree("cannot destroy the root node"));
        }
        let has_children = self
            .slots
            .iter()
            .any(|s| s.live && s.parent == Some(id.idx));
        if has_children {
            return Err(StippleError::tree(format!(
                "cannot destroy node {id:?} with children"
            )));
        }
        let slot = &mut self.slots[id.idx as usize];
        slot.live = false;
        slot.parent = None;
        slot.kind = NodeKind::Alias;
        slot.cache = S::GeometryCache::default();
        self.free_list.push(id.idx);
        Ok(())
    }

    fn reparent(&mut self, id: NodeId<S>, parent: NodeId<S>) -> StippleResult<bool> {
        self.check(parent)?;
        if self.slots[id.idx as usize].parent == Some(parent.idx) {
            return Ok(false);
        }
        if self.is_ancestor_or_self(id, parent) {
            return Err(StippleError::tree(format!(
                "reparenting {id:?} under {parent:?} would create a cycle"
            )));
        }
        self.slots[id.idx as usize].parent = Some(parent.idx);
        Ok(true)
    }

    /// Stores a new parent and state, returning how much the node changed.
    ///
    /// The node's changed flag is raised to the returned value; it is only lowered by
    /// [`Self::clear_changed_to`] or [`Self::clear_all_changed`].
    pub fn update(
        &mut self,
        id: NodeId<S>,
        parent: NodeId<S>,
        state: S,
    ) -> StippleResult<PaintPropertyChangeType> {
        self.check(id)?;
        if id.idx == 0 {
            return Err(StippleError::tree("the root node cannot be updated"));
        }
        let parent_changed = self.reparent(id, parent)?;
        let slot = &mut self.slots[id.idx as usize];
        let mut change = match &slot.kind {
            NodeKind::Real(old) => state.change_from(old),
            NodeKind::Alias => PaintPropertyChangeType::NodeAddedOrRemoved,
        };
        if parent_changed {
            change = PaintPropertyChangeType::NodeAddedOrRemoved;
        }
        if change != PaintPropertyChangeType::Unchanged {
            slot.kind = NodeKind::Real(state);
            slot.changed = slot.changed.max(change);
        }
        Ok(change)
    }

    /// Points an alias at a (possibly new) parent.
    pub fn update_alias(
        &mut self,
        id: NodeId<S>,
        parent: NodeId<S>,
    ) -> StippleResult<PaintPropertyChangeType> {
        self.check(id)?;
        if !self.is_alias(id) {
            return Err(StippleError::tree(format!("{id:?} is not an alias")));
        }
        if !self.reparent(id, parent)? {
            return Ok(PaintPropertyChangeType::Unchanged);
        }
        let slot = &mut self.slots[id.idx as usize];
        slot.changed = PaintPropertyChangeType::NodeAddedOrRemoved;
        Ok(PaintPropertyChangeType::NodeAddedOrRemoved)
    }

    /// Parent of `id`, or `None` for the root.
    pub fn parent(&self, id: NodeId<S>) -> Option<NodeId<S>> {
        self.slot(id).parent.map(|p| self.handle(p))
    }

    /// Whether `id` is an alias node.
    pub fn is_alias(&self, id: NodeId<S>) -> bool {
        matches!(self.slot(id).kind, NodeKind::Alias)
    }

    /// Resolves aliases up to the nearest node with its own state.
    pub fn unalias(&self, mut id: NodeId<S>) -> NodeId<S> {
        while self.is_alias(id) {
            match self.parent(id) {
                Some(p) => id = p,
                None => break,
            }
        }
        id
    }

    /// State of `id` after alias resolution.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn state(&self, id: NodeId<S>) -> &S {
        match &self.slot(self.unalias(id)).kind {
            NodeKind::Real(s) => s,
            NodeKind::Alias => unreachable!("root nodes always carry state"),
        }
    }

    /// Fallible variant of [`Self::state`].
    pub fn try_state(&self, id: NodeId<S>) -> StippleResult<&S> {
        self.check(id)?;
        Ok(self.state(id))
    }

    /// The node's own changed flag.
    pub fn change_type(&self, id: NodeId<S>) -> PaintPropertyChangeType {
        self.slot(id).changed
    }

    pub(crate) fn cache(&self, id: NodeId<S>) -> &S::GeometryCache {
        &self.slot(id).cache
    }

    /// Iterates `id` and its ancestors up to and including the root.
    pub fn ancestors(&self, id: NodeId<S>) -> impl Iterator<Item = NodeId<S>> + '_ {
        std::iter::successors(Some(id), move |&n| self.parent(n))
    }

    /// Number of edges between `id` and the root.
    pub fn depth(&self, id: NodeId<S>) -> usize {
        self.ancestors(id).count() - 1
    }

    /// Whether `ancestor` is `node` or on `node`'s parent chain.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId<S>, node: NodeId<S>) -> bool {
        self.ancestors(node).any(|n| n == ancestor)
    }

    /// Deepest node that is an ancestor-or-self of both `a` and `b`.
    pub fn lowest_common_ancestor(&self, a: NodeId<S>, b: NodeId<S>) -> NodeId<S> {
        let (mut a, mut b) = (a, b);
        let (mut da, mut db) = (self.depth(a), self.depth(b));
        while da > db {
            a = self.slot_parent(a);
            da -= 1;
        }
        while db > da {
            b = self.slot_parent(b);
            db -= 1;
        }
        while a != b {
            a = self.slot_parent(a);
            b = self.slot_parent(b);
        }
        a
    }

    fn slot_parent(&self, id: NodeId<S>) -> NodeId<S> {
        self.parent(id).unwrap_or(id)
    }

    /// Maximum change along the chain from `id` up to (excluding) `ancestor`.
    ///
    /// If `ancestor` is not on the chain the walk runs to the root.
    pub fn changed(&self, id: NodeId<S>, ancestor: NodeId<S>) -> PaintPropertyChangeType {
        self.ancestors(id)
            .take_while(|&n| n != ancestor)
            .map(|n| self.slot(n).changed)
            .max()
            .unwrap_or_default()
    }

    /// Clears changed flags from `id` up to (excluding) `ancestor`.
    pub fn clear_changed_to(&mut self, id: NodeId<S>, ancestor: NodeId<S>) {
        let chain: Vec<u32> = self
            .ancestors(id)
            .take_while(|&n| n != ancestor)
            .map(|n| n.idx)
            .collect();
        for idx in chain {
            self.slots[idx as usize].changed = PaintPropertyChangeType::Unchanged;
        }
    }

    /// Clears every node's changed flag.
    pub fn clear_all_changed(&mut self) {
        for slot in &mut self.slots {
            slot.changed = PaintPropertyChangeType::Unchanged;
        }
    }

    /// Checks structural invariants: live parents, acyclic chains, a stateful root.
    pub fn validate(&self) -> StippleResult<()> {
        if !matches!(self.slots[0].kind, NodeKind::Real(_)) || self.slots[0].parent.is_some() {
            return Err(StippleError::tree("root must be a parentless node with state"));
        }
        for (idx, slot) in self.slots.iter().enumerate().skip(1) {
            if !slot.live {
                continue;
            }
            let mut cur = idx as u32;
            let mut steps = 0usize;
            while let Some(p) = self.slots[cur as usize].parent {
                if !self.slots[p as usize].live {
                    return Err(StippleError::tree(format!(
                        "node #{idx} has a destroyed ancestor #{p}"
                    )));
                }
                steps += 1;
                if steps > self.slots.len() {
                    return Err(StippleError::tree(format!(
                        "parent chain of node #{idx} contains a cycle"
                    )));
                }
                cur = p;
            }
            if cur != 0 {
                return Err(StippleError::tree(format!(
                    "node #{idx} does not reach the root"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/property/tree.rs"]
mod tests;
