use std::cell::Cell;

use crate::foundation::core::{Affine, Point, Vec2, is_translation_only};
use crate::property::scroll::ScrollId;
use crate::property::tree::{NodeId, NodeState, PaintPropertyChangeType};

/// Handle to a transform node.
pub type TransformId = NodeId<TransformState>;

#[derive(Clone, Debug, PartialEq)]
/// Local transform of a transform node, applied about `origin`.
pub struct TransformState {
    pub matrix: Affine,
    pub origin: Point,
    /// Set when this node is the scroll offset translation of a scroll node.
    pub scroll: Option<ScrollId>,
    /// Whether the matrix is driven by a compositor animation.
    pub composited_animation: bool,
}

impl Default for TransformState {
    fn default() -> Self {
        Self {
            matrix: Affine::IDENTITY,
            origin: Point::ORIGIN,
            scroll: None,
            composited_animation: false,
        }
    }
}

impl TransformState {
    pub fn translation(offset: Vec2) -> Self {
        Self {
            matrix: Affine::translate(offset),
            ..Self::default()
        }
    }

    pub fn from_matrix(matrix: Affine) -> Self {
        Self {
            matrix,
            ..Self::default()
        }
    }

    pub fn with_origin(mut self, origin: Point) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_scroll(mut self, scroll: ScrollId) -> Self {
        self.scroll = Some(scroll);
        self
    }

    /// Matrix mapping local space into the parent's space, origin folded in.
    pub fn local_matrix(&self) -> Affine {
        if self.origin == Point::ORIGIN {
            return self.matrix;
        }
        let o = self.origin.to_vec2();
        Affine::translate(o) * self.matrix * Affine::translate(-o)
    }

    pub fn is_identity_or_2d_translation(&self) -> bool {
        is_translation_only(self.matrix)
    }
}

impl NodeState for TransformState {
    type GeometryCache = TransformCache;

    fn change_from(&self, old: &Self) -> PaintPropertyChangeType {
        if self == old {
            return PaintPropertyChangeType::Unchanged;
        }
        let only_matrix = self.origin == old.origin
            && self.scroll == old.scroll
            && self.composited_animation == old.composited_animation;
        if !only_matrix {
            return PaintPropertyChangeType::ChangedOnlyValues;
        }
        if self.composited_animation {
            return PaintPropertyChangeType::ChangedOnlyCompositedValues;
        }
        if self.is_identity_or_2d_translation() && old.is_identity_or_2d_translation() {
            PaintPropertyChangeType::ChangedOnlySimpleValues
        } else {
            PaintPropertyChangeType::ChangedOnlyValues
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct TransformCacheEntry {
    pub(crate) generation: u64,
    pub(crate) to_root: Affine,
}

/// Memoized local-to-root matrix for one transform node.
#[derive(Debug, Default)]
pub struct TransformCache {
    pub(crate) entry: Cell<Option<TransformCacheEntry>>,
}

impl TransformCache {
    pub(crate) fn get(&self, generation: u64) -> Option<Affine> {
        self.entry
            .get()
            .filter(|e| e.generation == generation)
            .map(|e| e.to_root)
    }

    pub(crate) fn set(&self, generation: u64, to_root: Affine) {
        self.entry.set(Some(TransformCacheEntry {
            generation,
            to_root,
        }));
    }
}
