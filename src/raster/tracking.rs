use crate::foundation::core::{ClientId, Rect, rect_union};
use crate::foundation::error::StippleResult;
use crate::paint::client::PaintInvalidationReason;

/// One recorded raster invalidation, for diagnostics and tests.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct RasterInvalidationInfo {
    pub rect: Rect,
    /// `None` for whole-layer invalidations.
    pub client_id: Option<ClientId>,
    pub debug_name: String,
    pub reason: PaintInvalidationReason,
}

/// Per-layer log of raster invalidations.
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct RasterInvalidationTracking {
    invalidations: Vec<RasterInvalidationInfo>,
}

impl RasterInvalidationTracking {
    pub fn add(&mut self, info: RasterInvalidationInfo) {
        self.invalidations.push(info);
    }

    pub fn invalidations(&self) -> &[RasterInvalidationInfo] {
        &self.invalidations
    }

    pub fn is_empty(&self) -> bool {
        self.invalidations.is_empty()
    }

    pub fn clear(&mut self) {
        self.invalidations.clear();
    }

    /// Union of every tracked rect.
    pub fn bounds(&self) -> Rect {
        self.invalidations
            .iter()
            .fold(Rect::ZERO, |acc, i| rect_union(acc, i.rect))
    }

    pub fn to_json(&self) -> StippleResult<String> {
        Ok(serde_json::to_string_pretty(&self.invalidations)?)
    }
}
