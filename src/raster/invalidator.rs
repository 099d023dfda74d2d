use std::collections::HashMap;
use std::ops::Range;

use crate::foundation::core::{
    Affine, ClientId, Point, Rect, differ_only_in_translation, rect_intersect, rect_is_empty,
    rect_subtract, rect_union,
};
use crate::foundation::error::StippleResult;
use crate::paint::artifact::PaintArtifact;
use crate::paint::chunk::{PaintChunk, PaintChunkId, PaintChunkSubset};
use crate::paint::client::PaintInvalidationReason;
use crate::paint::item::PaintItemId;
use crate::property::effect::EffectId;
use crate::property::geometry::FloatClipRect;
use crate::property::state::{PropertyTreeState, PropertyTrees};
use crate::property::tree::PaintPropertyChangeType;
use crate::raster::mapper::ChunkToLayerMapper;
use crate::raster::tracking::{RasterInvalidationInfo, RasterInvalidationTracking};

/// Options for [`RasterInvalidator`].
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RasterInvalidatorOpts {
    /// Keep a [`RasterInvalidationTracking`] log with debug names.
    pub track_invalidations: bool,
}

/// A layer-space rect that must be re-rasterized.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct RasterInvalidation {
    pub rect: Rect,
    /// `None` for whole-layer invalidations.
    pub client_id: Option<ClientId>,
    pub reason: PaintInvalidationReason,
}

#[derive(Clone, Debug)]
struct ItemInfo {
    id: PaintItemId,
    rect: Rect,
}

/// What the invalidator keeps of a chunk between two `generate` calls.
#[derive(Clone, Debug)]
struct ChunkInfo {
    id: PaintChunkId,
    is_cacheable: bool,
    bounds_in_layer: Rect,
    transform: Affine,
    clip: FloatClipRect,
    effect: EffectId,
    items: Vec<ItemInfo>,
    debug_name: Option<String>,
}

/// Computes raster invalidations of one layer from one artifact to the next.
///
/// The invalidator remembers the layer-space geometry of the chunks it saw last time, so the
/// property trees may be mutated freely between two calls. Node change flags must describe
/// the changes since the previous call: a changed clip, a non-translation transform change
/// or a non-composited effect change invalidates the whole chunk even when its layer-space
/// geometry is the same.
#[derive(Debug, Default)]
pub struct RasterInvalidator {
    opts: RasterInvalidatorOpts,
    layer_bounds: Option<Rect>,
    old_infos: Vec<ChunkInfo>,
    tracking: Option<RasterInvalidationTracking>,
}

struct Emitter<'t> {
    layer_rect: Rect,
    out: Vec<RasterInvalidation>,
    tracking: Option<&'t mut RasterInvalidationTracking>,
}

impl Emitter<'_> {
    fn push(
        &mut self,
        rect: Rect,
        client_id: Option<ClientId>,
        debug_name: Option<&str>,
        reason: PaintInvalidationReason,
    ) {
        let rect = rect_intersect(rect, self.layer_rect);
        if rect_is_empty(rect) {
            return;
        }
        self.out.push(RasterInvalidation {
            rect,
            client_id,
            reason,
        });
        if let Some(tracking) = self.tracking.as_deref_mut() {
            tracking.add(RasterInvalidationInfo {
                rect,
                client_id,
                debug_name: debug_name.unwrap_or_default().to_owned(),
                reason,
            });
        }
    }

    /// Invalidates the parts of `old` and `new` that are not covered by the other.
    fn incremental(&mut self, old: Rect, new: Rect, client: ClientId, debug_name: Option<&str>) {
        for r in rect_subtract(old, new).into_iter().chain(rect_subtract(new, old)) {
            self.push(r, Some(client), debug_name, PaintInvalidationReason::Incremental);
        }
    }

    /// Invalidates `old` and `new` separately, once if they are equal.
    fn old_and_new(
        &mut self,
        old: Rect,
        new: Rect,
        client: ClientId,
        debug_name: Option<&str>,
        reason: PaintInvalidationReason,
    ) {
        self.push(old, Some(client), debug_name, reason);
        if new != old {
            self.push(new, Some(client), debug_name, reason);
        }
    }
}

impl RasterInvalidator {
    pub fn new(opts: RasterInvalidatorOpts) -> Self {
        let tracking = opts.track_invalidations.then(RasterInvalidationTracking::default);
        Self {
            opts,
            layer_bounds: None,
            old_infos: Vec::new(),
            tracking,
        }
    }

    pub fn tracking(&self) -> Option<&RasterInvalidationTracking> {
        self.tracking.as_ref()
    }

    pub fn tracking_mut(&mut self) -> Option<&mut RasterInvalidationTracking> {
        self.tracking.as_mut()
    }

    /// Forgets the retained chunk state; the next `generate` invalidates the whole layer.
    pub fn clear_old_states(&mut self) {
        self.layer_bounds = None;
        self.old_infos.clear();
    }

    /// Diffs `chunks` of `artifact` against the chunks seen by the previous call.
    ///
    /// `layer_bounds` is in the space of `layer_state.transform`; returned rects are relative
    /// to its origin and clipped to its size. The whole layer is invalidated on the first
    /// call, after `clear_old_states`, and when the layer size changes.
    #[tracing::instrument(skip_all, fields(chunks = chunks.len()))]
    pub fn generate(
        &mut self,
        trees: &PropertyTrees,
        artifact: &PaintArtifact,
        chunks: Range<usize>,
        layer_bounds: Rect,
        layer_state: &PropertyTreeState,
    ) -> StippleResult<Vec<RasterInvalidation>> {
        let subset = artifact.subset(chunks)?;
        layer_state.check(trees)?;
        for chunk in subset.iter() {
            chunk.properties.check(trees)?;
        }
        let layer = layer_state.unalias(trees);
        let offset = layer_bounds.origin().to_vec2();
        let layer_rect = Rect::from_origin_size(Point::ZERO, layer_bounds.size());
        let track = self.opts.track_invalidations;

        let mut mapper = ChunkToLayerMapper::new(trees, &layer, offset);
        let new_infos: Vec<ChunkInfo> = subset
            .iter()
            .map(|chunk| {
                mapper.switch_to_chunk(chunk);
                let items = subset
                    .items_in(chunk)
                    .iter()
                    .filter(|item| item.draws_content())
                    .map(|item| ItemInfo {
                        id: item.id(),
                        rect: rect_intersect(
                            mapper.map_visual_rect(item.visual_rect()),
                            layer_rect,
                        ),
                    })
                    .collect();
                ChunkInfo {
                    id: chunk.id,
                    is_cacheable: chunk.is_cacheable,
                    bounds_in_layer: rect_intersect(
                        mapper.map_visual_rect(chunk.drawable_bounds),
                        layer_rect,
                    ),
                    transform: mapper.transform(),
                    clip: mapper.clip_rect(),
                    effect: trees.effects().unalias(chunk.properties.effect),
                    items,
                    debug_name: track
                        .then(|| artifact.client_debug_name(chunk.id.client))
                        .flatten()
                        .map(str::to_owned),
                }
            })
            .collect();

        let mut emit = Emitter {
            layer_rect,
            out: Vec::new(),
            tracking: self.tracking.as_mut(),
        };
        let full_layer = self
            .layer_bounds
            .is_none_or(|old| old.size() != layer_bounds.size());
        if full_layer {
            emit.push(layer_rect, None, None, PaintInvalidationReason::Full);
        } else {
            let diff = ChunkDiff {
                trees,
                artifact,
                layer: &layer,
                track,
            };
            diff.run(&self.old_infos, &new_infos, &subset, &mut emit);
        }
        let out = emit.out;

        tracing::debug!(
            old_chunks = self.old_infos.len(),
            new_chunks = new_infos.len(),
            invalidations = out.len(),
            full_layer,
            "raster invalidation generated"
        );
        self.old_infos = new_infos;
        self.layer_bounds = Some(layer_bounds);
        Ok(out)
    }
}

struct ChunkDiff<'a> {
    trees: &'a PropertyTrees,
    artifact: &'a PaintArtifact,
    layer: &'a PropertyTreeState,
    track: bool,
}

impl ChunkDiff<'_> {
    fn run(
        &self,
        old: &[ChunkInfo],
        new: &[ChunkInfo],
        subset: &PaintChunkSubset<'_>,
        emit: &mut Emitter<'_>,
    ) {
        let mut matcher = OldChunkMatcher::new(old);
        let mut max_matched: Option<usize> = None;

        for (info, chunk) in new.iter().zip(subset.iter()) {
            let name = info.debug_name.as_deref();
            let Some(old_index) = matcher.find(chunk) else {
                let reason = if chunk.is_cacheable {
                    PaintInvalidationReason::ChunkAppeared
                } else {
                    PaintInvalidationReason::ChunkUncacheable
                };
                emit.push(info.bounds_in_layer, Some(chunk.id.client), name, reason);
                continue;
            };

            let old_info = &old[old_index];
            let reordered = max_matched.is_some_and(|m| old_index < m);
            max_matched = Some(max_matched.map_or(old_index, |m| m.max(old_index)));
            if reordered {
                emit.old_and_new(
                    old_info.bounds_in_layer,
                    info.bounds_in_layer,
                    chunk.id.client,
                    name,
                    PaintInvalidationReason::ChunkReordered,
                );
                continue;
            }
            self.matched_chunk(old_info, info, chunk, subset, emit);
        }

        for (index, info) in old.iter().enumerate() {
            if matcher.matched[index] {
                continue;
            }
            let reason = if info.is_cacheable {
                PaintInvalidationReason::ChunkDisappeared
            } else {
                PaintInvalidationReason::ChunkUncacheable
            };
            emit.push(
                info.bounds_in_layer,
                Some(info.id.client),
                info.debug_name.as_deref(),
                reason,
            );
        }
    }

    fn matched_chunk(
        &self,
        old: &ChunkInfo,
        new: &ChunkInfo,
        chunk: &PaintChunk,
        subset: &PaintChunkSubset<'_>,
        emit: &mut Emitter<'_>,
    ) {
        let client = chunk.id.client;
        let name = new.debug_name.as_deref();
        let effect_changed = old.effect != new.effect
            || self.trees.effects().changed(new.effect, self.layer.effect)
                > PaintPropertyChangeType::ChangedOnlyCompositedValues;
        // The layer-space clip keeps only bounds, so path and radius edits show up only in
        // the node flags.
        let clip_changed = self
            .trees
            .clips()
            .changed(chunk.properties.clip, self.layer.clip)
            > PaintPropertyChangeType::ChangedOnlyCompositedValues;
        let transform_changed = self
            .trees
            .transforms()
            .changed(chunk.properties.transform, self.layer.transform)
            > PaintPropertyChangeType::ChangedOnlySimpleValues;
        if effect_changed || clip_changed || transform_changed {
            emit.push(
                rect_union(old.bounds_in_layer, new.bounds_in_layer),
                Some(client),
                name,
                PaintInvalidationReason::PaintProperty,
            );
            return;
        }
        let items = subset.items_in(chunk);
        let same_items = old.items.len() == new.items.len()
            && old.items.iter().zip(&new.items).all(|(o, n)| o.id == n.id);

        if old.transform == new.transform && old.clip == new.clip {
            if !same_items {
                let reason = items
                    .iter()
                    .map(|i| i.invalidation_reason())
                    .find(|r| !r.is_valid())
                    .unwrap_or(PaintInvalidationReason::Full);
                emit.old_and_new(old.bounds_in_layer, new.bounds_in_layer, client, name, reason);
                return;
            }
            let drawn = items.iter().filter(|i| i.draws_content());
            for ((o, n), item) in old.items.iter().zip(&new.items).zip(drawn) {
                let reason = item.invalidation_reason();
                if reason.is_valid() {
                    continue;
                }
                let item_name = if self.track {
                    self.artifact.client_debug_name(item.client_id())
                } else {
                    None
                };
                if reason == PaintInvalidationReason::Incremental {
                    emit.incremental(o.rect, n.rect, item.client_id(), item_name);
                } else {
                    emit.old_and_new(o.rect, n.rect, item.client_id(), item_name, reason);
                }
            }
            return;
        }

        let content_unchanged =
            same_items && items.iter().all(|i| i.invalidation_reason().is_valid());
        if content_unchanged
            && differ_only_in_translation(old.transform, new.transform)
            && clip_moved_with_translation(&old.clip, &new.clip, old.transform, new.transform)
        {
            emit.incremental(old.bounds_in_layer, new.bounds_in_layer, client, name);
            return;
        }

        emit.push(
            rect_union(old.bounds_in_layer, new.bounds_in_layer),
            Some(client),
            name,
            PaintInvalidationReason::PaintProperty,
        );
    }
}

/// Whether `new` is `old` shifted by the translation between the two transforms.
fn clip_moved_with_translation(
    old: &FloatClipRect,
    new: &FloatClipRect,
    old_transform: Affine,
    new_transform: Affine,
) -> bool {
    if old.is_infinite() || new.is_infinite() {
        return old.is_infinite() && new.is_infinite();
    }
    if old.has_radius() != new.has_radius() || old.is_tight() != new.is_tight() {
        return false;
    }
    let delta = new_transform.translation() - old_transform.translation();
    old.rect() + delta == new.rect() || old.rect() == new.rect()
}

/// Finds old chunks for new ones: next in order first, then an index of the old chunks
/// skipped so far, then a forward scan that indexes what it passes.
struct OldChunkMatcher<'a> {
    old: &'a [ChunkInfo],
    matched: Vec<bool>,
    next_to_match: usize,
    next_to_index: usize,
    index: HashMap<PaintChunkId, usize>,
}

impl<'a> OldChunkMatcher<'a> {
    fn new(old: &'a [ChunkInfo]) -> Self {
        Self {
            old,
            matched: vec![false; old.len()],
            next_to_match: 0,
            next_to_index: 0,
            index: HashMap::new(),
        }
    }

    fn matches(chunk: &PaintChunk, old: &ChunkInfo) -> bool {
        chunk.is_cacheable
            && old.is_cacheable
            && chunk.id == old.id
            && !chunk.client_is_just_created
    }

    fn find(&mut self, chunk: &PaintChunk) -> Option<usize> {
        if !chunk.is_cacheable || chunk.client_is_just_created {
            return None;
        }
        let found = self.lookup(chunk)?;
        self.matched[found] = true;
        self.next_to_match = found + 1;
        self.next_to_index = self.next_to_index.max(self.next_to_match);
        Some(found)
    }

    fn lookup(&mut self, chunk: &PaintChunk) -> Option<usize> {
        let next = self.next_to_match;
        if next < self.old.len() && !self.matched[next] && Self::matches(chunk, &self.old[next]) {
            return Some(next);
        }
        if let Some(i) = self.index.remove(&chunk.id)
            && !self.matched[i]
        {
            return Some(i);
        }
        let mut i = self.next_to_index.max(self.next_to_match);
        while i < self.old.len() {
            let index = i;
            i += 1;
            let candidate = &self.old[index];
            if self.matched[index] || !candidate.is_cacheable {
                continue;
            }
            if Self::matches(chunk, candidate) {
                self.next_to_index = i;
                return Some(index);
            }
            self.index.insert(candidate.id, index);
        }
        self.next_to_index = self.old.len();
        None
    }
}

#[cfg(test)]
#[path = "../../tests/unit/raster/invalidator.rs"]
mod tests;
