use std::collections::{BTreeMap, HashSet};
use std::ops::Range;

use crate::foundation::core::ClientId;
use crate::foundation::error::{StippleError, StippleResult};
use crate::foundation::math::Fnv1a64;
use crate::paint::chunk::{PaintChunk, PaintChunkSubset};
use crate::paint::item::PaintItem;

/// Immutable result of one paint cycle: the item list and its partition into chunks.
///
/// Handed to raster invalidation and compositing after commit. Nothing mutates an artifact
/// once built, so it is shared behind an `Arc` across the handoff.
#[derive(Clone, Debug, Default)]
pub struct PaintArtifact {
    items: Vec<PaintItem>,
    chunks: Vec<PaintChunk>,
    debug_names: BTreeMap<ClientId, String>,
}

impl PaintArtifact {
    pub fn new(
        items: Vec<PaintItem>,
        chunks: Vec<PaintChunk>,
        debug_names: BTreeMap<ClientId, String>,
    ) -> Self {
        Self {
            items,
            chunks,
            debug_names,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[PaintItem] {
        &self.items
    }

    pub fn chunks(&self) -> &[PaintChunk] {
        &self.chunks
    }

    pub fn items_in_chunk(&self, chunk: &PaintChunk) -> &[PaintItem] {
        &self.items[chunk.range()]
    }

    pub fn client_debug_name(&self, client: ClientId) -> Option<&str> {
        self.debug_names.get(&client).map(String::as_str)
    }

    pub fn debug_names(&self) -> &BTreeMap<ClientId, String> {
        &self.debug_names
    }

    /// Clients that painted into this artifact, in first-paint order.
    pub fn client_ids(&self) -> Vec<ClientId> {
        let mut seen = HashSet::new();
        self.items
            .iter()
            .map(PaintItem::client_id)
            .filter(|c| seen.insert(*c))
            .collect()
    }

    /// View over all chunks.
    pub fn all_chunks(&self) -> PaintChunkSubset<'_> {
        PaintChunkSubset::new(&self.chunks, &self.items, 0)
    }

    /// View over `range` of the chunk list.
    pub fn subset(&self, range: Range<usize>) -> StippleResult<PaintChunkSubset<'_>> {
        if range.start > range.end || range.end > self.chunks.len() {
            return Err(StippleError::lifecycle(format!(
                "chunk range {range:?} out of bounds for {} chunks",
                self.chunks.len()
            )));
        }
        let first = range.start;
        Ok(PaintChunkSubset::new(&self.chunks[range], &self.items, first))
    }

    /// Checks the chunk partition and uniqueness of cacheable item ids.
    pub fn validate(&self) -> StippleResult<()> {
        let mut expected_begin = 0;
        for (i, chunk) in self.chunks.iter().enumerate() {
            if chunk.begin != expected_begin || chunk.begin >= chunk.end {
                return Err(StippleError::lifecycle(format!(
                    "chunk {i} covers [{}, {}), expected to start at {expected_begin}",
                    chunk.begin, chunk.end
                )));
            }
            expected_begin = chunk.end;
        }
        if expected_begin != self.items.len() {
            return Err(StippleError::lifecycle(format!(
                "chunks cover {expected_begin} of {} items",
                self.items.len()
            )));
        }

        let mut ids = HashSet::with_capacity(self.items.len());
        for item in self.items.iter().filter(|i| i.is_cacheable()) {
            if !ids.insert(item.id()) {
                let name = self.client_debug_name(item.client_id()).unwrap_or("?");
                return Err(StippleError::duplicate_id(format!("{} ({name})", item.id())));
            }
        }
        Ok(())
    }

    /// Structural hash over item ids, rects, payloads and the chunk partition.
    pub fn fingerprint(&self) -> StippleResult<u64> {
        let mut h = Fnv1a64::new();
        h.write_u64(self.items.len() as u64);
        for item in &self.items {
            let id = item.id();
            h.write_u64(id.client.0);
            h.write_u32(id.kind.code());
            h.write_u32(id.fragment);
            h.write_u8(u8::from(item.is_cacheable()));
            h.write_rect(item.visual_rect());
            h.write_bytes(&serde_json::to_vec(item.payload())?);
        }
        h.write_u64(self.chunks.len() as u64);
        for chunk in &self.chunks {
            h.write_u64(chunk.begin as u64);
            h.write_u64(chunk.end as u64);
            h.write_u64(chunk.id.client.0);
            h.write_u32(chunk.id.kind.code());
            h.write_u32(chunk.id.fragment);
            h.write_u32(chunk.properties.transform.index());
            h.write_u32(chunk.properties.clip.index());
            h.write_u32(chunk.properties.effect.index());
        }
        Ok(h.finish())
    }

    /// Human-readable dump for tooling.
    pub fn to_debug_json(&self) -> StippleResult<serde_json::Value> {
        let mut chunks = Vec::with_capacity(self.chunks.len());
        for chunk in &self.chunks {
            let mut items = Vec::with_capacity(chunk.size());
            for item in self.items_in_chunk(chunk) {
                items.push(serde_json::json!({
                    "id": item.id().to_string(),
                    "client": self.client_debug_name(item.client_id()),
                    "visual_rect": item.visual_rect(),
                    "cacheable": item.is_cacheable(),
                    "payload": serde_json::to_value(item.payload())?,
                }));
            }
            chunks.push(serde_json::json!({
                "id": chunk.id.to_string(),
                "range": [chunk.begin, chunk.end],
                "properties": {
                    "transform": chunk.properties.transform.index(),
                    "clip": chunk.properties.clip.index(),
                    "effect": chunk.properties.effect.index(),
                },
                "bounds": chunk.bounds,
                "known_to_be_opaque": chunk.known_to_be_opaque(),
                "hit_test": chunk.hit_test_data,
                "items": items,
            }));
        }
        Ok(serde_json::json!({ "chunks": chunks }))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/paint/artifact.rs"]
mod tests;
