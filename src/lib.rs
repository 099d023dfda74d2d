//! Stipple is a retained paint pipeline: it records display items, caches them across
//! frames, groups them into property-tree-scoped chunks and works out what must be
//! re-rasterized.
//!
//! # Pipeline overview
//!
//! 1. **Properties**: the host maintains [`PropertyTrees`] (transform, clip, effect, scroll)
//!    and hands every paintable unit a [`PropertyTreeState`].
//! 2. **Record**: a [`PaintController`] records [`PaintItem`]s for [`DisplayItemClient`]s,
//!    reusing cached items and subsequences of clients that did not change.
//! 3. **Commit**: the items are chunked by property state into an immutable [`PaintArtifact`].
//! 4. **Invalidate**: a [`RasterInvalidator`] diffs the chunks of a layer against the previous
//!    frame and emits [`RasterInvalidation`] rects.
//! 5. **Composite** (optional): a [`PropertyTreeManager`] flattens the property trees into
//!    [`CompositorPropertyTrees`], and [`PaintArtifact::replay`] draws chunks into any
//!    [`PaintCanvas`].
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Single-threaded cycles**: a paint cycle runs to completion on one thread; only the
//!   committed artifact (behind an `Arc`) crosses to the next stage.
//! - **Linear matching**: cache and chunk matching stay `O(n)` under arbitrary reordering.
//! - **Explicit validation**: duplicate ids and under-invalidation are reported as errors
//!   from commit when the corresponding checks are enabled, never as panics.
//!
//! # Frame contract
//!
//! After a committed cycle the host calls [`PaintController::finish_cycle`], marks every
//! returned client as validated, and clears the property-tree change flags with
//! [`PropertyTrees::clear_all_changed`].
#![forbid(unsafe_code)]

mod compositor;
mod foundation;
mod paint;
mod property;
mod raster;

/// Test doubles for driving the pipeline without a real host.
pub mod testing;

pub use compositor::property_tree_manager::{
    CompositorClipNode, CompositorEffectNode, CompositorEffectSource, CompositorNodeIds,
    CompositorOutput, CompositorPropertyTrees, CompositorTransformNode, PropertyTreeManager,
    SynthesizedClipLayer,
};
pub use foundation::core::{
    Affine, BezPath, ClientId, INFINITE_RECT, Point, Rect, Rgba8Premul, RoundedRect,
    RoundedRectRadii, Size, Vec2, differ_only_in_translation, enclosing_int_rect,
    is_translation_only, map_rect, preserves_axis_alignment, rect_contains, rect_intersect,
    rect_is_empty, rect_is_infinite, rect_subtract, rect_union,
};
pub use foundation::error::{StippleError, StippleResult};
pub use paint::artifact::PaintArtifact;
pub use paint::chunk::{PaintChunk, PaintChunkId, PaintChunkSubset};
pub use paint::chunker::PaintChunker;
pub use paint::client::{DisplayItemClient, PaintInvalidationReason};
pub use paint::controller::{PaintController, PaintControllerOpts, PaintControllerStats};
pub use paint::item::{
    DisplayItemPayload, DrawOp, DrawingRecord, ForeignLayerData, HitTestData, PaintItem,
    PaintItemId, PaintItemKind, TouchAction, TouchActionRect,
};
pub use paint::replay::{CanvasOp, PaintCanvas, RecordingCanvas};
pub use paint::subsequence::{SubsequenceMarkers, SubsequenceToken};
pub use property::clip::{ClipId, ClipState};
pub use property::effect::{BlendMode, EffectId, EffectState, FilterOp};
pub use property::geometry::{FloatClipRect, GeometryMapper};
pub use property::scroll::{ScrollId, ScrollState};
pub use property::state::{AliasTarget, PropertyTreeState, PropertyTrees};
pub use property::transform::{TransformId, TransformState};
pub use property::tree::{NodeId, NodeKind, NodeState, PaintPropertyChangeType, PropertyTree};
pub use raster::invalidator::{RasterInvalidation, RasterInvalidator, RasterInvalidatorOpts};
pub use raster::mapper::ChunkToLayerMapper;
pub use raster::tracking::{RasterInvalidationInfo, RasterInvalidationTracking};
