use std::sync::Arc;

use kurbo::Shape;

use crate::foundation::core::{
    BezPath, ClientId, Rect, Rgba8Premul, RoundedRect, Size, Vec2, rect_is_empty, rect_union,
};
use crate::paint::client::{DisplayItemClient, PaintInvalidationReason};

/// What a paint item records.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PaintItemKind {
    BoxDecorationBackground,
    Border,
    Foreground,
    Outline,
    Caret,
    Selection,
    ScrollbarTrack,
    ScrollbarThumb,
    /// Hit-test data only; draws nothing.
    HitTest,
    /// Content composited outside of this pipeline (video, canvas, plugin).
    ForeignLayer,
    /// Host-defined drawing kind.
    Custom(u16),
}

impl PaintItemKind {
    pub fn is_hit_test(self) -> bool {
        self == Self::HitTest
    }

    pub fn is_foreign(self) -> bool {
        self == Self::ForeignLayer
    }

    pub fn is_drawing(self) -> bool {
        !self.is_hit_test() && !self.is_foreign()
    }

    /// Stable numeric code, used for fingerprints.
    pub(crate) fn code(self) -> u32 {
        match self {
            Self::BoxDecorationBackground => 0,
            Self::Border => 1,
            Self::Foreground => 2,
            Self::Outline => 3,
            Self::Caret => 4,
            Self::Selection => 5,
            Self::ScrollbarTrack => 6,
            Self::ScrollbarThumb => 7,
            Self::HitTest => 8,
            Self::ForeignLayer => 9,
            Self::Custom(n) => 0x1_0000 | u32::from(n),
        }
    }
}

/// Identity of a paint item: unique among cacheable items of one artifact.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct PaintItemId {
    pub client: ClientId,
    pub kind: PaintItemKind,
    pub fragment: u32,
}

impl PaintItemId {
    pub fn new(client: ClientId, kind: PaintItemKind, fragment: u32) -> Self {
        Self {
            client,
            kind,
            fragment,
        }
    }
}

impl std::fmt::Display for PaintItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:?}:{}", self.client.0, self.kind, self.fragment)
    }
}

/// A single drawing command in local coordinates.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawOp {
    FillRect {
        rect: Rect,
        color: Rgba8Premul,
    },
    FillRoundedRect {
        rect: RoundedRect,
        color: Rgba8Premul,
    },
    FillPath {
        path: BezPath,
        color: Rgba8Premul,
    },
    StrokeRect {
        rect: Rect,
        width: f64,
        color: Rgba8Premul,
    },
    Image {
        image: u64,
        dest: Rect,
    },
}

impl DrawOp {
    pub fn bounds(&self) -> Rect {
        match self {
            Self::FillRect { rect, .. } => *rect,
            Self::FillRoundedRect { rect, .. } => rect.rect(),
            Self::FillPath { path, .. } => path.bounding_box(),
            Self::StrokeRect { rect, width, .. } => rect.inflate(width / 2.0, width / 2.0),
            Self::Image { dest, .. } => *dest,
        }
    }

    /// Area fully covered by opaque color, if the op has one.
    fn opaque_rect(&self) -> Option<Rect> {
        match self {
            Self::FillRect { rect, color } if color.is_opaque() => Some(*rect),
            _ => None,
        }
    }
}

/// Recorded drawing commands of one paint item.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DrawingRecord {
    pub ops: Vec<DrawOp>,
}

impl DrawingRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: DrawOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Rgba8Premul) -> &mut Self {
        self.push(DrawOp::FillRect { rect, color })
    }

    pub fn bounds(&self) -> Rect {
        self.ops
            .iter()
            .fold(Rect::ZERO, |acc, op| rect_union(acc, op.bounds()))
    }

    /// Largest single opaque fill. Conservative: other ops may cover more.
    pub fn rect_known_to_be_opaque(&self) -> Rect {
        self.ops
            .iter()
            .filter_map(DrawOp::opaque_rect)
            .max_by(|a, b| a.area().total_cmp(&b.area()))
            .unwrap_or(Rect::ZERO)
    }
}

/// Touch behavior allowed inside a hit-test rect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouchAction {
    Auto,
    None,
    PanX,
    PanY,
    Manipulation,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TouchActionRect {
    pub rect: Rect,
    pub action: TouchAction,
}

/// Hit-test regions recorded by a hit-test item and merged per chunk.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HitTestData {
    pub touch_action_rects: Vec<TouchActionRect>,
}

impl HitTestData {
    pub fn bounds(&self) -> Rect {
        self.touch_action_rects
            .iter()
            .fold(Rect::ZERO, |acc, r| rect_union(acc, r.rect))
    }

    pub fn append(&mut self, other: &HitTestData) {
        self.touch_action_rects
            .extend_from_slice(&other.touch_action_rects);
    }
}

/// Reference to content composited by an external layer.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForeignLayerData {
    pub layer_id: u64,
    pub offset: Vec2,
    pub size: Size,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Opaque content of a paint item.
pub enum DisplayItemPayload {
    Drawing(DrawingRecord),
    HitTest(HitTestData),
    ForeignLayer(ForeignLayerData),
}

/// One recorded drawing or hit-test operation.
///
/// The visual rect is copied from the client at record time so the item stays meaningful
/// after the client is gone. Payloads are shared so cached copies are cheap.
#[derive(Clone, Debug)]
pub struct PaintItem {
    id: PaintItemId,
    visual_rect: Rect,
    cacheable: bool,
    invalidation: PaintInvalidationReason,
    payload: Arc<DisplayItemPayload>,
}

impl PaintItem {
    pub fn new(
        client: &dyn DisplayItemClient,
        id: PaintItemId,
        payload: DisplayItemPayload,
    ) -> Self {
        Self {
            id,
            visual_rect: client.visual_rect(),
            cacheable: client.is_cacheable(),
            invalidation: client.invalidation_reason(),
            payload: Arc::new(payload),
        }
    }

    /// A copy of a previously committed item, reused without re-recording.
    pub(crate) fn cached_copy(&self) -> Self {
        Self {
            invalidation: PaintInvalidationReason::None,
            ..self.clone()
        }
    }

    pub(crate) fn set_uncacheable(&mut self) {
        self.cacheable = false;
    }

    pub fn id(&self) -> PaintItemId {
        self.id
    }

    pub fn client_id(&self) -> ClientId {
        self.id.client
    }

    pub fn kind(&self) -> PaintItemKind {
        self.id.kind
    }

    pub fn visual_rect(&self) -> Rect {
        self.visual_rect
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    /// Invalidation reason of the client when this item was freshly recorded;
    /// `None` for cached copies.
    pub fn invalidation_reason(&self) -> PaintInvalidationReason {
        self.invalidation
    }

    pub fn client_is_just_created(&self) -> bool {
        self.invalidation == PaintInvalidationReason::JustCreated
    }

    pub fn payload(&self) -> &DisplayItemPayload {
        &self.payload
    }

    pub fn is_foreign(&self) -> bool {
        matches!(*self.payload, DisplayItemPayload::ForeignLayer(_))
    }

    pub fn hit_test_data(&self) -> Option<&HitTestData> {
        match &*self.payload {
            DisplayItemPayload::HitTest(data) => Some(data),
            _ => None,
        }
    }

    /// Whether this item draws pixels (as opposed to hit-test only).
    pub fn draws_content(&self) -> bool {
        match &*self.payload {
            DisplayItemPayload::Drawing(rec) => !rec.ops.is_empty(),
            DisplayItemPayload::ForeignLayer(_) => true,
            DisplayItemPayload::HitTest(_) => false,
        }
    }

    pub fn rect_known_to_be_opaque(&self) -> Rect {
        match &*self.payload {
            DisplayItemPayload::Drawing(rec) => {
                let r = rec.rect_known_to_be_opaque();
                if rect_is_empty(r) { Rect::ZERO } else { r }
            }
            _ => Rect::ZERO,
        }
    }

    /// Byte-for-byte payload comparison over the serialized form.
    pub fn equals_for_under_invalidation(&self, other: &PaintItem) -> bool {
        if self.id != other.id || self.visual_rect != other.visual_rect {
            return false;
        }
        if Arc::ptr_eq(&self.payload, &other.payload) {
            return true;
        }
        match (
            serde_json::to_vec(&*self.payload),
            serde_json::to_vec(&*other.payload),
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/paint/item.rs"]
mod tests;
