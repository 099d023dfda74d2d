use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::foundation::core::ClientId;
use crate::foundation::error::{StippleError, StippleResult};
use crate::paint::artifact::PaintArtifact;
use crate::paint::chunk::PaintChunkId;
use crate::paint::chunker::PaintChunker;
use crate::paint::client::DisplayItemClient;
use crate::paint::item::{DisplayItemPayload, DrawingRecord, PaintItem, PaintItemId, PaintItemKind};
use crate::paint::subsequence::{SubsequenceMarkers, SubsequenceToken, Subsequences};
use crate::property::state::PropertyTreeState;

/// Options for [`PaintController`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PaintControllerOpts {
    /// Force clients to re-record on cache hits and compare against the cached content.
    pub under_invalidation_checking: bool,
    /// Validate the committed artifact (chunk partition, unique cacheable ids).
    pub check_duplicate_ids: bool,
    /// Keep a client to debug-name map in every artifact.
    pub record_debug_names: bool,
}

impl Default for PaintControllerOpts {
    fn default() -> Self {
        Self {
            under_invalidation_checking: false,
            check_duplicate_ids: cfg!(any(debug_assertions, feature = "validation")),
            record_debug_names: true,
        }
    }
}

/// Counters of one paint cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PaintControllerStats {
    /// Cache hits on the next old item in order.
    pub sequential_matches: u64,
    /// Cache hits found by scanning ahead of the sequential position.
    pub forward_scan_matches: u64,
    /// Cache hits served from the out-of-order index.
    pub out_of_order_matches: u64,
    /// Old items added to the out-of-order index while scanning.
    pub indexed_items: u64,
    /// Lookups in the out-of-order index.
    pub index_lookups: u64,
    /// Items copied from the previous artifact, including subsequence copies.
    pub reused_items: u64,
    pub reused_subsequences: u64,
    /// Items recorded fresh.
    pub recorded_items: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CyclePhase {
    Idle,
    Recording,
    Committed,
}

/// Per-cycle cache of paint items.
///
/// Each cycle the paint walk either reuses items (and whole subsequences) from the previous
/// artifact or records fresh ones; [`commit_new_display_items`](Self::commit_new_display_items)
/// freezes the result into a new [`PaintArtifact`].
///
/// Matching an item against the old list tries the next old item first, then an index of
/// old items already skipped over, then scans forward while indexing what it skips. Every
/// old item is indexed at most once per cycle, so a cycle costs time linear in the size of
/// the old artifact however the items were reordered.
#[derive(Debug)]
pub struct PaintController {
    opts: PaintControllerOpts,
    phase: CyclePhase,

    current: Arc<PaintArtifact>,
    current_subsequences: Subsequences,

    new_items: Vec<PaintItem>,
    chunker: PaintChunker,
    new_subsequences: Subsequences,
    new_debug_names: BTreeMap<ClientId, String>,

    consumed: Vec<bool>,
    next_item_to_match: usize,
    next_item_to_index: usize,
    out_of_order_item_indices: HashMap<PaintItemId, usize>,

    skipping_cache_count: u32,
    current_fragment: u32,
    cache_misses: HashSet<ClientId>,

    under_invalidation_items: HashMap<PaintItemId, usize>,
    under_invalidation_subsequences: HashMap<ClientId, SubsequenceMarkers>,
    under_invalidation_failure: Option<String>,

    stats: PaintControllerStats,
}

impl Default for PaintController {
    fn default() -> Self {
        Self::new(PaintControllerOpts::default())
    }
}

impl PaintController {
    pub fn new(opts: PaintControllerOpts) -> Self {
        Self {
            opts,
            phase: CyclePhase::Idle,
            current: Arc::new(PaintArtifact::empty()),
            current_subsequences: Subsequences::default(),
            new_items: Vec::new(),
            chunker: PaintChunker::new(),
            new_subsequences: Subsequences::default(),
            new_debug_names: BTreeMap::new(),
            consumed: Vec::new(),
            next_item_to_match: 0,
            next_item_to_index: 0,
            out_of_order_item_indices: HashMap::new(),
            skipping_cache_count: 0,
            current_fragment: 0,
            cache_misses: HashSet::new(),
            under_invalidation_items: HashMap::new(),
            under_invalidation_subsequences: HashMap::new(),
            under_invalidation_failure: None,
            stats: PaintControllerStats::default(),
        }
    }

    pub fn opts(&self) -> &PaintControllerOpts {
        &self.opts
    }

    /// The last committed artifact.
    pub fn current_artifact(&self) -> Arc<PaintArtifact> {
        Arc::clone(&self.current)
    }

    /// Counters of the cycle in progress, or of the last committed one.
    pub fn stats(&self) -> PaintControllerStats {
        self.stats
    }

    pub fn is_recording(&self) -> bool {
        self.phase == CyclePhase::Recording
    }

    pub fn new_item_count(&self) -> usize {
        self.new_items.len()
    }

    fn ensure_recording(&mut self) -> StippleResult<()> {
        match self.phase {
            CyclePhase::Recording => Ok(()),
            CyclePhase::Idle => {
                self.begin_cycle();
                Ok(())
            }
            CyclePhase::Committed => Err(StippleError::lifecycle(
                "finish_cycle must be called before recording the next cycle",
            )),
        }
    }

    fn begin_cycle(&mut self) {
        let old_len = self.current.items().len();
        self.consumed.clear();
        self.consumed.resize(old_len, false);
        self.next_item_to_match = 0;
        self.next_item_to_index = 0;
        self.out_of_order_item_indices.clear();
        self.new_items = Vec::with_capacity(old_len);
        self.chunker.release_paint_chunks();
        self.new_subsequences.clear();
        self.new_debug_names.clear();
        self.skipping_cache_count = 0;
        self.cache_misses.clear();
        self.under_invalidation_items.clear();
        self.under_invalidation_subsequences.clear();
        self.under_invalidation_failure = None;
        self.stats = PaintControllerStats::default();
        self.phase = CyclePhase::Recording;
    }

    /// Sets the properties (and optionally the chunk id) for the items that follow.
    pub fn update_current_paint_chunk_properties(
        &mut self,
        id: Option<PaintChunkId>,
        properties: PropertyTreeState,
    ) -> StippleResult<()> {
        self.ensure_recording()?;
        self.chunker.update_current_paint_chunk_properties(id, properties);
        Ok(())
    }

    pub fn current_paint_chunk_properties(&self) -> Option<PropertyTreeState> {
        self.chunker.current_properties()
    }

    /// Sets the fragment index used in the ids of following items; returns the previous one.
    pub fn set_current_fragment(&mut self, fragment: u32) -> u32 {
        std::mem::replace(&mut self.current_fragment, fragment)
    }

    pub fn current_fragment(&self) -> u32 {
        self.current_fragment
    }

    /// Items recorded until the matching `end_skipping_cache` neither use nor populate the
    /// cache.
    pub fn begin_skipping_cache(&mut self) -> StippleResult<()> {
        self.ensure_recording()?;
        self.skipping_cache_count += 1;
        Ok(())
    }

    pub fn end_skipping_cache(&mut self) -> StippleResult<()> {
        if self.skipping_cache_count == 0 {
            return Err(StippleError::lifecycle(
                "end_skipping_cache without begin_skipping_cache",
            ));
        }
        self.skipping_cache_count -= 1;
        Ok(())
    }

    pub fn is_skipping_cache(&self) -> bool {
        self.skipping_cache_count > 0
    }

    fn item_id(&self, client: &dyn DisplayItemClient, kind: PaintItemKind) -> PaintItemId {
        PaintItemId::new(client.client_id(), kind, self.current_fragment)
    }

    fn note_client(&mut self, client: &dyn DisplayItemClient) {
        if self.opts.record_debug_names {
            self.new_debug_names
                .entry(client.client_id())
                .or_insert_with(|| client.debug_name());
        }
    }

    fn append(&mut self, item: PaintItem) -> StippleResult<()> {
        self.chunker.increment_display_item_index(&item)?;
        self.new_items.push(item);
        Ok(())
    }

    /// Appends a freshly recorded item.
    pub fn create_and_append(
        &mut self,
        client: &dyn DisplayItemClient,
        kind: PaintItemKind,
        payload: DisplayItemPayload,
    ) -> StippleResult<()> {
        self.ensure_recording()?;
        let id = self.item_id(client, kind);
        let mut item = PaintItem::new(client, id, payload);
        if self.is_skipping_cache() {
            item.set_uncacheable();
        }

        if let Some(old_index) = self.under_invalidation_items.remove(&id) {
            let old = &self.current.items()[old_index];
            if !old.equals_for_under_invalidation(&item) {
                let msg = format!(
                    "{id} ({}) changed without being invalidated",
                    client.debug_name()
                );
                tracing::error!(item = %id, "under-invalidation detected");
                self.under_invalidation_failure = Some(msg.clone());
                return Err(StippleError::under_invalidation(msg));
            }
        }

        self.note_client(client);
        self.append(item)?;
        self.stats.recorded_items += 1;
        Ok(())
    }

    /// Reuses the client's cached drawing of `kind`, or records one with `record`.
    pub fn record_drawing(
        &mut self,
        client: &dyn DisplayItemClient,
        kind: PaintItemKind,
        record: impl FnOnce(&mut DrawingRecord),
    ) -> StippleResult<()> {
        if self.use_cached_item_if_possible(client, kind)? {
            return Ok(());
        }
        let mut drawing = DrawingRecord::new();
        record(&mut drawing);
        self.create_and_append(client, kind, DisplayItemPayload::Drawing(drawing))
    }

    /// Copies the client's item of `kind` from the previous artifact if it is still valid.
    ///
    /// Returns false when the caller must record the item: the client is uncacheable or
    /// invalidated, the cache is being skipped, no matching item exists, or
    /// under-invalidation checking wants the content re-recorded for comparison.
    pub fn use_cached_item_if_possible(
        &mut self,
        client: &dyn DisplayItemClient,
        kind: PaintItemKind,
    ) -> StippleResult<bool> {
        self.ensure_recording()?;
        if self.is_skipping_cache() || !client.is_cacheable() || !client.is_valid() {
            return Ok(false);
        }

        let id = self.item_id(client, kind);
        let Some(index) = self.find_cached_item(id) else {
            self.cache_misses.insert(id.client);
            return Ok(false);
        };
        self.consumed[index] = true;
        self.next_item_to_match = index + 1;
        self.next_item_to_index = self.next_item_to_index.max(self.next_item_to_match);

        if self.opts.under_invalidation_checking {
            self.under_invalidation_items.insert(id, index);
            return Ok(false);
        }

        let item = self.current.items()[index].cached_copy();
        self.note_client(client);
        self.append(item)?;
        self.stats.reused_items += 1;
        Ok(true)
    }

    fn find_cached_item(&mut self, id: PaintItemId) -> Option<usize> {
        let current = Arc::clone(&self.current);
        let old = current.items();

        let next = self.next_item_to_match;
        if next < old.len()
            && !self.consumed[next]
            && old[next].is_cacheable()
            && old[next].id() == id
        {
            self.stats.sequential_matches += 1;
            return Some(next);
        }

        self.stats.index_lookups += 1;
        if let Some(index) = self.out_of_order_item_indices.remove(&id)
            && !self.consumed[index]
        {
            self.stats.out_of_order_matches += 1;
            tracing::debug!(item = %id, old_index = index, "out-of-order cache match");
            return Some(index);
        }

        let mut i = self.next_item_to_index.max(self.next_item_to_match);
        while i < old.len() {
            let candidate = &old[i];
            let index = i;
            i += 1;
            if self.consumed[index] || !candidate.is_cacheable() {
                continue;
            }
            if candidate.id() == id {
                self.next_item_to_index = i;
                self.stats.forward_scan_matches += 1;
                return Some(index);
            }
            self.out_of_order_item_indices.insert(candidate.id(), index);
            self.stats.indexed_items += 1;
        }
        self.next_item_to_index = old.len();
        None
    }

    /// Copies the client's whole subsequence from the previous artifact if it is still
    /// valid. Returns false when the caller must paint it with `begin_subsequence` /
    /// `end_subsequence`.
    pub fn use_cached_subsequence_if_possible(
        &mut self,
        client: &dyn DisplayItemClient,
    ) -> StippleResult<bool> {
        self.ensure_recording()?;
        if self.is_skipping_cache() || !client.is_cacheable() || !client.is_valid() {
            return Ok(false);
        }
        let Some(markers) = self.current_subsequences.get(client.client_id()) else {
            return Ok(false);
        };
        if markers.end_item > self.current.items().len()
            || self.consumed[markers.start_item..markers.end_item]
                .iter()
                .any(|&c| c)
        {
            return Ok(false);
        }

        if self.opts.under_invalidation_checking {
            self.under_invalidation_subsequences.insert(client.client_id(), markers);
            return Ok(false);
        }

        let current = Arc::clone(&self.current);
        let start_item = self.new_items.len();
        let start_chunk = self.chunker.chunks().len();

        for chunk in &current.chunks()[markers.start_chunk..markers.end_chunk] {
            self.chunker.append_by_moving(chunk.clone());
        }
        for (index, item) in current.items()[markers.start_item..markers.end_item]
            .iter()
            .enumerate()
        {
            self.consumed[markers.start_item + index] = true;
            if self.opts.record_debug_names
                && let Some(name) = current.client_debug_name(item.client_id())
            {
                self.new_debug_names
                    .entry(item.client_id())
                    .or_insert_with(|| name.to_owned());
            }
            self.new_items.push(item.cached_copy());
        }
        self.note_client(client);

        self.new_subsequences.copy_from(
            &self.current_subsequences,
            client.client_id(),
            start_item,
            start_chunk,
        );

        if self.next_item_to_match == markers.start_item {
            self.next_item_to_match = markers.end_item;
            self.next_item_to_index = self.next_item_to_index.max(self.next_item_to_match);
        }
        self.stats.reused_items += markers.item_count() as u64;
        self.stats.reused_subsequences += 1;
        tracing::trace!(
            client = client.client_id().0,
            items = markers.item_count(),
            "reused cached subsequence"
        );
        Ok(true)
    }

    /// Starts a subsequence; it is chunk-aligned so it can be copied as a block later.
    pub fn begin_subsequence(&mut self) -> StippleResult<SubsequenceToken> {
        self.ensure_recording()?;
        self.chunker.force_new_chunk();
        Ok(SubsequenceToken {
            start_item: self.new_items.len(),
            start_chunk: self.chunker.chunks().len(),
        })
    }

    pub fn end_subsequence(
        &mut self,
        client: &dyn DisplayItemClient,
        token: SubsequenceToken,
    ) -> StippleResult<()> {
        self.ensure_recording()?;
        let end_item = self.new_items.len();
        if token.start_item > end_item {
            return Err(StippleError::lifecycle(
                "subsequence token does not belong to this cycle",
            ));
        }

        if let Some(old) = self.under_invalidation_subsequences.remove(&client.client_id()) {
            self.check_subsequence_under_invalidation(client, &old, token.start_item)?;
        }

        if end_item == token.start_item {
            return Ok(());
        }
        self.chunker.force_new_chunk();
        if client.is_cacheable() && !self.is_skipping_cache() {
            self.new_subsequences.push(SubsequenceMarkers {
                client: client.client_id(),
                start_item: token.start_item,
                end_item,
                start_chunk: token.start_chunk,
                end_chunk: self.chunker.chunks().len(),
            });
        }
        Ok(())
    }

    fn check_subsequence_under_invalidation(
        &mut self,
        client: &dyn DisplayItemClient,
        old: &SubsequenceMarkers,
        start_item: usize,
    ) -> StippleResult<()> {
        let fresh = &self.new_items[start_item..];
        let cached = &self.current.items()[old.start_item..old.end_item];
        let same = fresh.len() == cached.len()
            && fresh
                .iter()
                .zip(cached)
                .all(|(a, b)| a.equals_for_under_invalidation(b));
        if same {
            return Ok(());
        }
        let msg = format!(
            "subsequence of {} ({}) changed without being invalidated",
            client.client_id().0,
            client.debug_name()
        );
        tracing::error!(client = client.client_id().0, "subsequence under-invalidation");
        self.under_invalidation_failure = Some(msg.clone());
        Err(StippleError::under_invalidation(msg))
    }

    /// Whether everything the client painted last cycle was reused this cycle.
    ///
    /// New items of a valid client do not make it invalid; only a miss on one of its
    /// cached items does.
    pub fn client_cache_is_valid(&self, client: &dyn DisplayItemClient) -> bool {
        !self.is_skipping_cache()
            && client.is_cacheable()
            && client.is_valid()
            && !self.cache_misses.contains(&client.client_id())
    }

    /// Freezes this cycle's items into the current artifact.
    ///
    /// If validation or under-invalidation checking fails, the cycle is dropped and the
    /// previous artifact stays current.
    #[tracing::instrument(skip(self), fields(items = self.new_items.len()))]
    pub fn commit_new_display_items(&mut self) -> StippleResult<Arc<PaintArtifact>> {
        self.ensure_recording()?;

        if let Some(msg) = self.under_invalidation_failure.take() {
            self.abandon_cycle();
            return Err(StippleError::under_invalidation(msg));
        }
        if self.skipping_cache_count != 0 {
            self.abandon_cycle();
            return Err(StippleError::lifecycle(
                "commit while skipping cache; missing end_skipping_cache",
            ));
        }

        let items = std::mem::take(&mut self.new_items);
        let chunks = self.chunker.release_paint_chunks();
        let names = std::mem::take(&mut self.new_debug_names);
        let artifact = PaintArtifact::new(items, chunks, names);

        if self.opts.check_duplicate_ids
            && let Err(err) = artifact.validate()
        {
            tracing::error!(error = %err, "rejecting paint artifact");
            self.abandon_cycle();
            return Err(err);
        }

        tracing::debug!(
            chunks = artifact.chunks().len(),
            recorded = self.stats.recorded_items,
            reused = self.stats.reused_items,
            reused_subsequences = self.stats.reused_subsequences,
            out_of_order = self.stats.out_of_order_matches,
            "committed paint artifact"
        );
        if self.stats.out_of_order_matches > 0 {
            tracing::warn!(
                out_of_order = self.stats.out_of_order_matches,
                indexed = self.stats.indexed_items,
                "paint order changed; cache matching fell back to the index"
            );
        }

        self.current = Arc::new(artifact);
        self.current_subsequences = std::mem::take(&mut self.new_subsequences);
        self.phase = CyclePhase::Committed;
        Ok(Arc::clone(&self.current))
    }

    fn abandon_cycle(&mut self) {
        self.new_items.clear();
        self.chunker.release_paint_chunks();
        self.new_subsequences.clear();
        self.new_debug_names.clear();
        self.under_invalidation_failure = None;
        self.current_fragment = 0;
        self.phase = CyclePhase::Idle;
    }

    /// Ends the committed cycle. Returns the clients painted in the committed artifact,
    /// followed by subsequence owners that painted no item of their own; the host marks them
    /// valid before the next cycle.
    pub fn finish_cycle(&mut self) -> StippleResult<Vec<ClientId>> {
        if self.phase != CyclePhase::Committed {
            return Err(StippleError::lifecycle(
                "finish_cycle called without a committed cycle",
            ));
        }
        self.consumed.clear();
        self.out_of_order_item_indices.clear();
        self.current_fragment = 0;
        self.phase = CyclePhase::Idle;
        let mut clients = self.current.client_ids();
        let mut seen: HashSet<ClientId> = clients.iter().copied().collect();
        clients.extend(
            self.current_subsequences
                .clients()
                .filter(|c| seen.insert(*c)),
        );
        Ok(clients)
    }

    /// Drops all cached items and subsequences; the next cycle records everything fresh.
    ///
    /// Hosts pair this with `PropertyTrees::invalidate_geometry_caches` and
    /// `RasterInvalidator::clear_old_states`.
    pub fn invalidate_all(&mut self) -> StippleResult<()> {
        if self.phase == CyclePhase::Recording {
            return Err(StippleError::lifecycle(
                "invalidate_all during a recording cycle",
            ));
        }
        self.current = Arc::new(PaintArtifact::empty());
        self.current_subsequences.clear();
        tracing::debug!("paint cache invalidated");
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/paint/controller.rs"]
mod tests;
