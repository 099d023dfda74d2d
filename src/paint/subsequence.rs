use std::collections::HashMap;

use crate::foundation::core::ClientId;

/// Item and chunk range painted by one client as a cacheable unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubsequenceMarkers {
    pub client: ClientId,
    pub start_item: usize,
    pub end_item: usize,
    pub start_chunk: usize,
    pub end_chunk: usize,
}

impl SubsequenceMarkers {
    pub fn item_count(&self) -> usize {
        self.end_item - self.start_item
    }

    fn rebased(&self, item_delta: isize, chunk_delta: isize) -> Self {
        Self {
            client: self.client,
            start_item: self.start_item.saturating_add_signed(item_delta),
            end_item: self.end_item.saturating_add_signed(item_delta),
            start_chunk: self.start_chunk.saturating_add_signed(chunk_delta),
            end_chunk: self.end_chunk.saturating_add_signed(chunk_delta),
        }
    }
}

/// Opaque handle returned by `begin_subsequence`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubsequenceToken {
    pub(crate) start_item: usize,
    pub(crate) start_chunk: usize,
}

/// Markers of one artifact, kept in the order the subsequences ended.
///
/// Inner subsequences end before their outer one, so the nested markers of a subsequence are
/// the run directly before it whose start lies inside it.
#[derive(Clone, Debug, Default)]
pub(crate) struct Subsequences {
    markers: Vec<SubsequenceMarkers>,
    by_client: HashMap<ClientId, usize>,
}

impl Subsequences {
    pub(crate) fn len(&self) -> usize {
        self.markers.len()
    }

    pub(crate) fn clear(&mut self) {
        self.markers.clear();
        self.by_client.clear();
    }

    pub(crate) fn clients(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.markers.iter().map(|m| m.client)
    }

    pub(crate) fn get(&self, client: ClientId) -> Option<SubsequenceMarkers> {
        self.by_client.get(&client).map(|&i| self.markers[i])
    }

    /// Records `markers`; a later subsequence of the same client replaces the lookup entry.
    pub(crate) fn push(&mut self, markers: SubsequenceMarkers) {
        self.by_client.insert(markers.client, self.markers.len());
        self.markers.push(markers);
    }

    /// Markers nested inside `client`'s subsequence, innermost-last order preserved.
    pub(crate) fn nested(&self, client: ClientId) -> &[SubsequenceMarkers] {
        let Some(&pos) = self.by_client.get(&client) else {
            return &[];
        };
        let outer = self.markers[pos];
        let mut first = pos;
        while first > 0 && self.markers[first - 1].start_item >= outer.start_item {
            first -= 1;
        }
        &self.markers[first..pos]
    }

    /// Copies `old`'s marker for `client`, with its nested markers, rebased so the subsequence
    /// starts at `start_item` / `start_chunk` in the new artifact.
    pub(crate) fn copy_from(
        &mut self,
        old: &Subsequences,
        client: ClientId,
        start_item: usize,
        start_chunk: usize,
    ) {
        let Some(outer) = old.get(client) else {
            return;
        };
        let item_delta = start_item as isize - outer.start_item as isize;
        let chunk_delta = start_chunk as isize - outer.start_chunk as isize;
        for nested in old.nested(client) {
            self.push(nested.rebased(item_delta, chunk_delta));
        }
        self.push(outer.rebased(item_delta, chunk_delta));
    }
}
