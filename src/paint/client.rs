use crate::foundation::core::{ClientId, Rect};

/// Why a client (or a region of a layer) must be repainted.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PaintInvalidationReason {
    /// The client is valid; its cached output may be reused.
    #[default]
    None,
    /// Only the difference between old and new bounds needs repainting.
    Incremental,
    Full,
    /// The client identity is new (or was reused for a different object).
    JustCreated,
    Layout,
    Style,
    Subtree,
    Uncacheable,
    ChunkAppeared,
    ChunkDisappeared,
    ChunkReordered,
    ChunkUncacheable,
    PaintProperty,
}

impl PaintInvalidationReason {
    pub fn is_valid(self) -> bool {
        self == Self::None
    }

    /// Whether the reason requires repainting the whole visual rect.
    pub fn is_full(self) -> bool {
        !matches!(self, Self::None | Self::Incremental)
    }
}

/// An object that paints items and is identified stably across paint cycles.
///
/// The layout collaborator implements this. It must keep `client_id` stable while the object
/// is unchanged and report [`PaintInvalidationReason::JustCreated`] when an id is reused for
/// a logically different object.
pub trait DisplayItemClient {
    fn client_id(&self) -> ClientId;

    fn debug_name(&self) -> String;

    /// Visual rect in the space of the property state the client paints under.
    fn visual_rect(&self) -> Rect;

    fn invalidation_reason(&self) -> PaintInvalidationReason;

    fn is_cacheable(&self) -> bool {
        true
    }

    fn is_valid(&self) -> bool {
        self.invalidation_reason().is_valid()
    }

    fn is_just_created(&self) -> bool {
        self.invalidation_reason() == PaintInvalidationReason::JustCreated
    }
}
