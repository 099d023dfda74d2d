use crate::foundation::core::{
    Affine, Rect, Vec2, enclosing_int_rect, map_rect, rect_intersect, rect_is_empty,
};
use crate::paint::chunk::PaintChunk;
use crate::property::geometry::{FloatClipRect, GeometryMapper};
use crate::property::state::{PropertyTreeState, PropertyTrees};

/// Maps chunk-local rects into the space of one layer.
///
/// Layer space is the layer's transform space shifted so the layer origin is at (0, 0).
/// Switching chunks recomputes the transform and clip only when the chunk state differs from
/// the previous chunk.
pub struct ChunkToLayerMapper<'a> {
    trees: &'a PropertyTrees,
    layer_state: PropertyTreeState,
    layer_offset: Vec2,
    chunk_state: Option<PropertyTreeState>,
    transform: Affine,
    clip_rect: FloatClipRect,
    has_filter_that_moves_pixels: bool,
}

impl<'a> ChunkToLayerMapper<'a> {
    pub fn new(
        trees: &'a PropertyTrees,
        layer_state: &PropertyTreeState,
        layer_offset: Vec2,
    ) -> Self {
        Self {
            trees,
            layer_state: layer_state.unalias(trees),
            layer_offset,
            chunk_state: None,
            transform: Affine::translate(-layer_offset),
            clip_rect: FloatClipRect::infinite(),
            has_filter_that_moves_pixels: false,
        }
    }

    pub fn switch_to_chunk(&mut self, chunk: &PaintChunk) {
        let state = chunk.properties.unalias(self.trees);
        if self.chunk_state == Some(state) {
            return;
        }
        self.chunk_state = Some(state);

        let to_layer = Affine::translate(-self.layer_offset);
        self.transform = to_layer
            * GeometryMapper::source_to_destination_projection(
                self.trees,
                state.transform,
                self.layer_state.transform,
            );

        let mut clip =
            GeometryMapper::local_to_ancestor_clip_rect(self.trees, &state, &self.layer_state);
        clip.map(to_layer);
        self.clip_rect = clip;

        let effects = self.trees.effects();
        self.has_filter_that_moves_pixels = effects
            .ancestors(state.effect)
            .take_while(|&e| e != self.layer_state.effect)
            .any(|e| !effects.is_alias(e) && effects.state(e).has_filter_that_moves_pixels());
    }

    /// Chunk-to-layer matrix of the current chunk.
    pub fn transform(&self) -> Affine {
        self.transform
    }

    /// Accumulated clip of the current chunk in layer space.
    pub fn clip_rect(&self) -> FloatClipRect {
        self.clip_rect
    }

    /// Maps a visual rect of the current chunk into layer space, rounded out to whole pixels.
    pub fn map_visual_rect(&self, rect: Rect) -> Rect {
        if rect_is_empty(rect) {
            return Rect::ZERO;
        }
        let mapped = match self.chunk_state {
            Some(state) if self.has_filter_that_moves_pixels => {
                let r = GeometryMapper::local_to_ancestor_visual_rect(
                    self.trees,
                    rect,
                    &state,
                    &self.layer_state,
                );
                map_rect(Affine::translate(-self.layer_offset), r)
            }
            _ => {
                let r = map_rect(self.transform, rect);
                if self.clip_rect.is_infinite() {
                    r
                } else {
                    rect_intersect(r, self.clip_rect.rect())
                }
            }
        };
        enclosing_int_rect(mapped)
    }
}
