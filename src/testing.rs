//! Test doubles for hosts and tests driving the paint pipeline.

use std::cell::Cell;

use crate::foundation::core::{ClientId, Rect};
use crate::paint::client::{DisplayItemClient, PaintInvalidationReason};

/// A [`DisplayItemClient`] whose visual rect and invalidation state can be changed in place.
///
/// New clients start out [`PaintInvalidationReason::JustCreated`]; call
/// [`validate`](Self::validate) after a committed cycle, as a real host would for every client
/// returned by `PaintController::finish_cycle`.
#[derive(Debug)]
pub struct FakeDisplayItemClient {
    id: ClientId,
    name: String,
    visual_rect: Cell<Rect>,
    reason: Cell<PaintInvalidationReason>,
    cacheable: Cell<bool>,
}

impl FakeDisplayItemClient {
    pub fn new(id: u64, name: impl Into<String>, visual_rect: Rect) -> Self {
        Self {
            id: ClientId(id),
            name: name.into(),
            visual_rect: Cell::new(visual_rect),
            reason: Cell::new(PaintInvalidationReason::JustCreated),
            cacheable: Cell::new(true),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn set_visual_rect(&self, rect: Rect) {
        self.visual_rect.set(rect);
    }

    pub fn set_cacheable(&self, cacheable: bool) {
        self.cacheable.set(cacheable);
    }

    pub fn invalidate(&self, reason: PaintInvalidationReason) {
        self.reason.set(reason);
    }

    pub fn validate(&self) {
        self.reason.set(PaintInvalidationReason::None);
    }
}

impl DisplayItemClient for FakeDisplayItemClient {
    fn client_id(&self) -> ClientId {
        self.id
    }

    fn debug_name(&self) -> String {
        self.name.clone()
    }

    fn visual_rect(&self) -> Rect {
        self.visual_rect.get()
    }

    fn invalidation_reason(&self) -> PaintInvalidationReason {
        self.reason.get()
    }

    fn is_cacheable(&self) -> bool {
        self.cacheable.get()
    }
}
