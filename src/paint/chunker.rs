use crate::foundation::error::{StippleError, StippleResult};
use crate::paint::chunk::{PaintChunk, PaintChunkId};
use crate::paint::item::PaintItem;
use crate::property::state::PropertyTreeState;

/// Slices the item stream of one paint cycle into [`PaintChunk`]s.
///
/// A new chunk starts whenever the current properties change, when a new chunk is forced,
/// and around foreign-layer items, which always sit alone in their chunk.
#[derive(Debug, Default)]
pub struct PaintChunker {
    chunks: Vec<PaintChunk>,
    current_properties: Option<PropertyTreeState>,
    next_chunk_id: Option<PaintChunkId>,
    force_new_chunk: bool,
    item_count: usize,
}

impl PaintChunker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_properties(&self) -> Option<PropertyTreeState> {
        self.current_properties
    }

    /// Sets the properties for the following items.
    ///
    /// An explicit id that differs from the open chunk's id closes that chunk. An id that no
    /// item has used yet is kept while the properties stay the same: the id of the outer
    /// painting is usually the more stable one.
    pub fn update_current_paint_chunk_properties(
        &mut self,
        id: Option<PaintChunkId>,
        properties: PropertyTreeState,
    ) {
        let keep_pending =
            self.next_chunk_id.is_some() && self.current_properties == Some(properties);
        if !keep_pending {
            self.next_chunk_id = id;
            if let Some(id) = id
                && self.chunks.last().is_some_and(|last| last.id != id)
            {
                self.force_new_chunk = true;
            }
        }
        self.current_properties = Some(properties);
    }

    /// The next item starts a new chunk even if the properties do not change.
    pub fn force_new_chunk(&mut self) {
        self.force_new_chunk = true;
    }

    pub fn will_force_new_chunk(&self) -> bool {
        self.force_new_chunk || self.chunks.is_empty()
    }

    /// Number of items accounted for so far.
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn chunks(&self) -> &[PaintChunk] {
        &self.chunks
    }

    pub fn last_chunk(&self) -> Option<&PaintChunk> {
        self.chunks.last()
    }

    /// Extends the open chunk by `item`. Returns whether a new chunk was opened for it.
    pub fn increment_display_item_index(&mut self, item: &PaintItem) -> StippleResult<bool> {
        let Some(properties) = self.current_properties else {
            return Err(StippleError::lifecycle(format!(
                "item {} appended before paint chunk properties were set",
                item.id()
            )));
        };

        let item_forces_new_chunk = item.is_foreign();
        if item_forces_new_chunk {
            self.force_new_chunk = true;
        }

        let begin = self.item_count;
        self.item_count += 1;

        let continues = match self.chunks.last_mut() {
            Some(last) if !self.force_new_chunk && last.properties == properties => {
                last.extend(item);
                true
            }
            _ => false,
        };
        if continues {
            // The pending id named the open chunk; it must not leak onto a later one.
            self.next_chunk_id = None;
            return Ok(false);
        }

        let id = self.next_chunk_id.take().unwrap_or_else(|| item.id());
        self.chunks.push(PaintChunk::new(begin, id, properties, item));
        // A foreign item also closes its chunk behind it.
        self.force_new_chunk = item_forces_new_chunk;
        Ok(true)
    }

    /// Appends a chunk copied from a previous artifact, rebasing its item range to the
    /// current end of the stream.
    pub fn append_by_moving(&mut self, mut chunk: PaintChunk) {
        let len = chunk.size();
        chunk.begin = self.item_count;
        chunk.end = self.item_count + len;
        chunk.is_moved_from_cached_subsequence = true;
        chunk.client_is_just_created = false;
        self.item_count += len;
        self.chunks.push(chunk);
        self.force_new_chunk = true;
    }

    /// Hands out the chunks of this cycle and resets for the next one.
    pub fn release_paint_chunks(&mut self) -> Vec<PaintChunk> {
        self.current_properties = None;
        self.next_chunk_id = None;
        self.force_new_chunk = false;
        self.item_count = 0;
        std::mem::take(&mut self.chunks)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/paint/chunker.rs"]
mod tests;
