use crate::foundation::core::{Rect, Vec2};
use crate::property::clip::ClipId;
use crate::property::transform::TransformId;
use crate::property::tree::{NodeId, NodeState, PaintPropertyChangeType};

/// Handle to an effect node.
pub type EffectId = NodeId<EffectState>;

/// Blend mode applied when an effect's output is composited into its parent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    /// Keeps destination where the source is opaque. Used for synthesized clip masks.
    DstIn,
}

/// One filter primitive.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterOp {
    Blur { std_deviation: f64 },
    DropShadow { offset: Vec2, std_deviation: f64 },
    Grayscale { amount: f64 },
    Brightness { amount: f64 },
}

impl FilterOp {
    fn moves_pixels(&self) -> bool {
        matches!(self, Self::Blur { .. } | Self::DropShadow { .. })
    }

    fn map_rect(&self, r: Rect) -> Rect {
        match *self {
            // Three standard deviations cover the visible extent of a gaussian.
            Self::Blur { std_deviation } => r.inflate(3.0 * std_deviation, 3.0 * std_deviation),
            Self::DropShadow {
                offset,
                std_deviation,
            } => {
                let shadow = (r + offset).inflate(3.0 * std_deviation, 3.0 * std_deviation);
                r.union(shadow)
            }
            Self::Grayscale { .. } | Self::Brightness { .. } => r,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
/// Group effect applied to everything painted under the node.
pub struct EffectState {
    pub local_transform_space: TransformId,
    /// Clip applied to the effect's output, if any.
    pub output_clip: Option<ClipId>,
    pub opacity: f32,
    pub filter: Vec<FilterOp>,
    pub blend_mode: BlendMode,
    /// Whether opacity is driven by a compositor animation.
    pub composited_animation: bool,
}

impl EffectState {
    pub fn new(local_transform_space: TransformId) -> Self {
        Self {
            local_transform_space,
            output_clip: None,
            opacity: 1.0,
            filter: Vec::new(),
            blend_mode: BlendMode::Normal,
            composited_animation: false,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_output_clip(mut self, clip: ClipId) -> Self {
        self.output_clip = Some(clip);
        self
    }

    pub fn with_filter(mut self, filter: Vec<FilterOp>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    /// Whether any filter can move pixels outside of the input bounds.
    pub fn has_filter_that_moves_pixels(&self) -> bool {
        self.filter.iter().any(FilterOp::moves_pixels)
    }

    /// Maps a rect in the effect's local space through its filters.
    pub fn map_rect(&self, r: Rect) -> Rect {
        self.filter.iter().fold(r, |acc, op| op.map_rect(acc))
    }

    /// Whether the effect needs an isolated group when rasterized.
    pub fn needs_group(&self) -> bool {
        self.opacity < 1.0 || !self.filter.is_empty() || self.blend_mode != BlendMode::Normal
    }
}

impl NodeState for EffectState {
    type GeometryCache = ();

    fn change_from(&self, old: &Self) -> PaintPropertyChangeType {
        if self == old {
            return PaintPropertyChangeType::Unchanged;
        }
        let only_opacity = self.local_transform_space == old.local_transform_space
            && self.output_clip == old.output_clip
            && self.filter == old.filter
            && self.blend_mode == old.blend_mode
            && self.composited_animation == old.composited_animation;
        if !only_opacity {
            return PaintPropertyChangeType::ChangedOnlyValues;
        }
        if self.composited_animation {
            PaintPropertyChangeType::ChangedOnlyCompositedValues
        } else {
            PaintPropertyChangeType::ChangedOnlySimpleValues
        }
    }
}
