use std::cell::RefCell;

use smallvec::SmallVec;

use crate::foundation::core::{BezPath, INFINITE_RECT, Rect, RoundedRect};
use crate::property::geometry::FloatClipRect;
use crate::property::transform::TransformId;
use crate::property::tree::{NodeId, NodeState};

/// Handle to a clip node.
pub type ClipId = NodeId<ClipState>;

#[derive(Clone, Debug, PartialEq)]
/// A clip expressed in the space of `local_transform_space`.
pub struct ClipState {
    pub local_transform_space: TransformId,
    pub clip_rect: RoundedRect,
    /// Optional path applied on top of `clip_rect`.
    pub clip_path: Option<BezPath>,
}

impl ClipState {
    pub fn rect(local_transform_space: TransformId, rect: Rect) -> Self {
        Self {
            local_transform_space,
            clip_rect: RoundedRect::from_rect(rect, 0.0),
            clip_path: None,
        }
    }

    pub fn rounded(local_transform_space: TransformId, clip_rect: RoundedRect) -> Self {
        Self {
            local_transform_space,
            clip_rect,
            clip_path: None,
        }
    }

    pub(crate) fn infinite(local_transform_space: TransformId) -> Self {
        Self::rect(local_transform_space, INFINITE_RECT)
    }

    pub fn with_path(mut self, path: BezPath) -> Self {
        self.clip_path = Some(path);
        self
    }

    pub fn has_radius(&self) -> bool {
        let r = self.clip_rect.radii();
        r.top_left > 0.0 || r.top_right > 0.0 || r.bottom_right > 0.0 || r.bottom_left > 0.0
    }

    /// Bounding rect of the clip in its local transform space.
    pub fn bounds(&self) -> Rect {
        self.clip_rect.rect()
    }

    /// Whether the clip is a plain axis-aligned rect in its own space.
    pub fn is_rectangular(&self) -> bool {
        !self.has_radius() && self.clip_path.is_none()
    }
}

impl NodeState for ClipState {
    type GeometryCache = ClipCache;
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct ClipCacheEntry {
    pub(crate) generation: u64,
    pub(crate) ancestor_clip: ClipId,
    pub(crate) ancestor_transform: TransformId,
    pub(crate) clip_rect: FloatClipRect,
}

/// Memoized clip rects of one clip node relative to the ancestors it was mapped to.
#[derive(Debug, Default)]
pub struct ClipCache {
    entries: RefCell<SmallVec<[ClipCacheEntry; 2]>>,
}

impl ClipCache {
    pub(crate) fn get(
        &self,
        generation: u64,
        ancestor_clip: ClipId,
        ancestor_transform: TransformId,
    ) -> Option<FloatClipRect> {
        self.entries
            .borrow()
            .iter()
            .find(|e| {
                e.generation == generation
                    && e.ancestor_clip == ancestor_clip
                    && e.ancestor_transform == ancestor_transform
            })
            .map(|e| e.clip_rect)
    }

    pub(crate) fn set(&self, entry: ClipCacheEntry) {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|e| e.generation == entry.generation);
        entries.push(entry);
    }
}
