use std::ops::Range;

use crate::foundation::core::{Rect, rect_contains, rect_is_empty, rect_union};
use crate::paint::item::{HitTestData, PaintItem, PaintItemId};
use crate::property::state::PropertyTreeState;

/// Chunk ids share the item id space; a chunk defaults to the id of its first item.
pub type PaintChunkId = PaintItemId;

/// A contiguous run of paint items painted under one [`PropertyTreeState`].
#[derive(Clone, Debug)]
pub struct PaintChunk {
    /// Index of the first item in the owning artifact.
    pub begin: usize,
    /// One past the last item.
    pub end: usize,
    pub id: PaintChunkId,
    pub properties: PropertyTreeState,
    /// Union of the visual rects of all items, in the chunk's transform space.
    pub bounds: Rect,
    /// Union of the visual rects of items that draw pixels.
    pub drawable_bounds: Rect,
    pub rect_known_to_be_opaque: Rect,
    pub hit_test_data: Option<HitTestData>,
    pub is_cacheable: bool,
    pub client_is_just_created: bool,
    /// Set when the chunk was block-copied from the previous artifact.
    pub is_moved_from_cached_subsequence: bool,
}

impl PaintChunk {
    pub(crate) fn new(
        begin: usize,
        id: PaintChunkId,
        properties: PropertyTreeState,
        first: &PaintItem,
    ) -> Self {
        let mut chunk = Self {
            begin,
            end: begin,
            id,
            properties,
            bounds: Rect::ZERO,
            drawable_bounds: Rect::ZERO,
            rect_known_to_be_opaque: Rect::ZERO,
            hit_test_data: None,
            is_cacheable: first.is_cacheable(),
            client_is_just_created: first.client_is_just_created(),
            is_moved_from_cached_subsequence: false,
        };
        chunk.extend(first);
        chunk
    }

    /// Grows the chunk by the next item.
    pub(crate) fn extend(&mut self, item: &PaintItem) {
        self.end += 1;
        self.bounds = rect_union(self.bounds, item.visual_rect());
        if !item.is_cacheable() {
            self.is_cacheable = false;
        }
        if item.draws_content() {
            self.drawable_bounds = rect_union(self.drawable_bounds, item.visual_rect());
            let opaque = item.rect_known_to_be_opaque();
            if opaque.area() > self.rect_known_to_be_opaque.area() {
                self.rect_known_to_be_opaque = opaque;
            }
        }
        if let Some(data) = item.hit_test_data() {
            self.hit_test_data
                .get_or_insert_with(HitTestData::default)
                .append(data);
        }
    }

    pub fn size(&self) -> usize {
        self.end - self.begin
    }

    pub fn range(&self) -> Range<usize> {
        self.begin..self.end
    }

    /// Whether this chunk is the same logical chunk as `old` from the previous cycle.
    ///
    /// A just-created client never matches; its id may belong to a different object now.
    pub fn matches(&self, old: &PaintChunk) -> bool {
        self.is_cacheable && old.is_cacheable && self.id == old.id && !self.client_is_just_created
    }

    /// Whether the opaque area covers the whole of the chunk's bounds.
    pub fn known_to_be_opaque(&self) -> bool {
        !rect_is_empty(self.bounds) && rect_contains(self.rect_known_to_be_opaque, self.bounds)
    }

    pub fn draws_content(&self) -> bool {
        !rect_is_empty(self.drawable_bounds)
    }
}

/// A view over a contiguous range of an artifact's chunks.
#[derive(Clone, Debug)]
pub struct PaintChunkSubset<'a> {
    chunks: &'a [PaintChunk],
    items: &'a [PaintItem],
    first: usize,
}

impl<'a> PaintChunkSubset<'a> {
    pub(crate) fn new(chunks: &'a [PaintChunk], items: &'a [PaintItem], first: usize) -> Self {
        Self {
            chunks,
            items,
            first,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Index of the first chunk of this view in the artifact.
    pub fn first_index(&self) -> usize {
        self.first
    }

    pub fn chunks(&self) -> &'a [PaintChunk] {
        self.chunks
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a PaintChunk> + 'a {
        self.chunks.iter()
    }

    pub fn items_in(&self, chunk: &PaintChunk) -> &'a [PaintItem] {
        &self.items[chunk.range()]
    }
}

#[cfg(test)]
#[path = "../../tests/unit/paint/chunk.rs"]
mod tests;
