//! Geometry queries across the property trees, memoized per node.

use crate::foundation::core::{
    Affine, INFINITE_RECT, Rect, is_translation_only, map_rect, preserves_axis_alignment,
    rect_intersect, rect_is_infinite,
};
use crate::property::clip::{ClipCacheEntry, ClipState};
use crate::property::state::{PropertyTreeState, PropertyTrees};
use crate::property::transform::TransformId;

/// A clip rect plus flags describing how exact it is.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FloatClipRect {
    rect: Rect,
    has_radius: bool,
    is_tight: bool,
}

impl Default for FloatClipRect {
    fn default() -> Self {
        Self::infinite()
    }
}

impl FloatClipRect {
    pub fn infinite() -> Self {
        Self {
            rect: INFINITE_RECT,
            has_radius: false,
            is_tight: true,
        }
    }

    pub fn from_rect(rect: Rect) -> Self {
        Self {
            rect,
            has_radius: false,
            is_tight: true,
        }
    }

    pub(crate) fn from_clip(clip: &ClipState) -> Self {
        Self {
            rect: clip.bounds(),
            has_radius: clip.has_radius(),
            // A path clip is only approximated by its bounds.
            is_tight: clip.clip_path.is_none() && !clip.has_radius(),
        }
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn is_infinite(&self) -> bool {
        rect_is_infinite(self.rect)
    }

    pub fn has_radius(&self) -> bool {
        self.has_radius
    }

    /// Whether `rect()` is exactly the clipped area rather than a bound of it.
    pub fn is_tight(&self) -> bool {
        self.is_tight
    }

    pub fn intersect(&mut self, other: &FloatClipRect) {
        if other.is_infinite() {
            return;
        }
        if self.is_infinite() {
            *self = *other;
            return;
        }
        self.rect = rect_intersect(self.rect, other.rect);
        self.has_radius |= other.has_radius;
        self.is_tight &= other.is_tight;
    }

    pub fn map(&mut self, t: Affine) {
        if self.is_infinite() {
            return;
        }
        self.rect = map_rect(t, self.rect);
        if !preserves_axis_alignment(t) {
            self.is_tight = false;
        }
    }
}

/// Stateless mapper; all memoization lives on the nodes of [`PropertyTrees`].
pub struct GeometryMapper;

impl GeometryMapper {
    /// Matrix mapping `id`'s local space to the root transform space.
    pub fn local_to_root(trees: &PropertyTrees, id: TransformId) -> Affine {
        let generation = trees.cache_generation();
        let tree = trees.transforms();

        let mut pending = Vec::new();
        let mut cur = id;
        let mut acc = loop {
            if let Some(m) = tree.cache(cur).get(generation) {
                break m;
            }
            pending.push(cur);
            match tree.parent(cur) {
                Some(p) => cur = p,
                None => break Affine::IDENTITY,
            }
        };

        for node in pending.into_iter().rev() {
            if !tree.is_alias(node) {
                acc = acc * tree.state(node).local_matrix();
            }
            tree.cache(node).set(generation, acc);
        }
        acc
    }

    /// Matrix mapping `src`'s local space into `dst`'s local space.
    ///
    /// A non-invertible destination collapses everything to a point.
    pub fn source_to_destination_projection(
        trees: &PropertyTrees,
        src: TransformId,
        dst: TransformId,
    ) -> Affine {
        if src == dst {
            return Affine::IDENTITY;
        }
        let src_to_root = Self::local_to_root(trees, src);
        if dst == trees.transforms().root() {
            return src_to_root;
        }
        let dst_to_root = Self::local_to_root(trees, dst);
        if is_translation_only(src_to_root) && is_translation_only(dst_to_root) {
            return Affine::translate(src_to_root.translation() - dst_to_root.translation());
        }
        if dst_to_root.determinant() == 0.0 {
            return Affine::scale(0.0);
        }
        dst_to_root.inverse() * src_to_root
    }

    /// Accumulated clip between `local` and `ancestor`, in `ancestor.transform` space.
    pub fn local_to_ancestor_clip_rect(
        trees: &PropertyTrees,
        local: &PropertyTreeState,
        ancestor: &PropertyTreeState,
    ) -> FloatClipRect {
        if local.clip == ancestor.clip {
            return FloatClipRect::infinite();
        }
        let generation = trees.cache_generation();
        let clips = trees.clips();
        let cache = clips.cache(local.clip);
        if let Some(hit) = cache.get(generation, ancestor.clip, ancestor.transform) {
            return hit;
        }

        let mut result = FloatClipRect::infinite();
        for node in clips.ancestors(local.clip).take_while(|&c| c != ancestor.clip) {
            if clips.is_alias(node) {
                continue;
            }
            let state = clips.state(node);
            let mut mapped = FloatClipRect::from_clip(state);
            mapped.map(Self::source_to_destination_projection(
                trees,
                state.local_transform_space,
                ancestor.transform,
            ));
            result.intersect(&mapped);
        }

        cache.set(ClipCacheEntry {
            generation,
            ancestor_clip: ancestor.clip,
            ancestor_transform: ancestor.transform,
            clip_rect: result,
        });
        result
    }

    /// Maps a visual rect painted under `local` into `ancestor.transform` space, expanding
    /// through pixel-moving filters and intersecting with the clips in between.
    pub fn local_to_ancestor_visual_rect(
        trees: &PropertyTrees,
        rect: Rect,
        local: &PropertyTreeState,
        ancestor: &PropertyTreeState,
    ) -> Rect {
        let effects = trees.effects();
        let mut space = local.transform;
        let mut r = rect;
        for node in effects
            .ancestors(local.effect)
            .take_while(|&e| e != ancestor.effect)
        {
            if effects.is_alias(node) {
                continue;
            }
            let effect = effects.state(node);
            if !effect.has_filter_that_moves_pixels() {
                continue;
            }
            r = map_rect(
                Self::source_to_destination_projection(trees, space, effect.local_transform_space),
                r,
            );
            r = effect.map_rect(r);
            space = effect.local_transform_space;
        }

        r = map_rect(
            Self::source_to_destination_projection(trees, space, ancestor.transform),
            r,
        );
        let clip = Self::local_to_ancestor_clip_rect(trees, local, ancestor);
        if clip.is_infinite() {
            r
        } else {
            rect_intersect(r, clip.rect())
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/property/geometry.rs"]
mod tests;
