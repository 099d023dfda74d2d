use std::ops::Range;

use crate::foundation::core::{Affine, BezPath, Rect, RoundedRect};
use crate::foundation::error::{StippleError, StippleResult};
use crate::paint::artifact::PaintArtifact;
use crate::paint::item::{DisplayItemPayload, DrawOp, ForeignLayerData};
use crate::property::effect::BlendMode;
use crate::property::geometry::GeometryMapper;
use crate::property::state::{PropertyTreeState, PropertyTrees};

/// A generic 2D drawing surface an artifact can be replayed into.
///
/// `set_matrix` replaces the current transform (it is not concatenated); clips and layers
/// nest with `save` / `restore`.
pub trait PaintCanvas {
    fn save(&mut self);
    fn restore(&mut self);
    fn set_matrix(&mut self, matrix: Affine);
    fn clip_rect(&mut self, rect: Rect);
    fn clip_rounded_rect(&mut self, rect: RoundedRect);
    fn clip_path(&mut self, path: &BezPath);
    /// Opens an isolated group composited with `alpha` and `blend_mode` on restore.
    fn save_layer_alpha(&mut self, alpha: f32, blend_mode: BlendMode);
    fn draw_op(&mut self, op: &DrawOp);

    /// Placeholder for content composited elsewhere. Ignored by default.
    fn foreign_layer(&mut self, _layer: &ForeignLayerData, _bounds: Rect) {}
}

/// One call recorded by [`RecordingCanvas`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum CanvasOp {
    Save,
    Restore,
    SetMatrix { matrix: Affine },
    ClipRect { rect: Rect },
    ClipRoundedRect { rect: RoundedRect },
    ClipPath { path: BezPath },
    SaveLayerAlpha { alpha: f32, blend_mode: BlendMode },
    Draw { op: DrawOp },
    ForeignLayer { layer_id: u64, bounds: Rect },
}

/// Canvas that records every call, for tests and serialization to a compositor display list.
#[derive(Clone, Debug, Default)]
pub struct RecordingCanvas {
    pub ops: Vec<CanvasOp>,
}

impl RecordingCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_json(&self) -> StippleResult<String> {
        Ok(serde_json::to_string(&self.ops)?)
    }
}

impl PaintCanvas for RecordingCanvas {
    fn save(&mut self) {
        self.ops.push(CanvasOp::Save);
    }

    fn restore(&mut self) {
        self.ops.push(CanvasOp::Restore);
    }

    fn set_matrix(&mut self, matrix: Affine) {
        self.ops.push(CanvasOp::SetMatrix { matrix });
    }

    fn clip_rect(&mut self, rect: Rect) {
        self.ops.push(CanvasOp::ClipRect { rect });
    }

    fn clip_rounded_rect(&mut self, rect: RoundedRect) {
        self.ops.push(CanvasOp::ClipRoundedRect { rect });
    }

    fn clip_path(&mut self, path: &BezPath) {
        self.ops.push(CanvasOp::ClipPath { path: path.clone() });
    }

    fn save_layer_alpha(&mut self, alpha: f32, blend_mode: BlendMode) {
        self.ops.push(CanvasOp::SaveLayerAlpha { alpha, blend_mode });
    }

    fn draw_op(&mut self, op: &DrawOp) {
        self.ops.push(CanvasOp::Draw { op: op.clone() });
    }

    fn foreign_layer(&mut self, layer: &ForeignLayerData, bounds: Rect) {
        self.ops.push(CanvasOp::ForeignLayer {
            layer_id: layer.layer_id,
            bounds,
        });
    }
}

impl PaintArtifact {
    /// Replays `chunks` into `canvas` in the space of `layer_state`.
    ///
    /// Each chunk is wrapped in the groups of the effects and the clips between its state
    /// and the layer state; drawing ops are issued under the chunk-to-layer matrix. Chunks
    /// must be painted under descendants of the layer state.
    #[tracing::instrument(skip(self, trees, layer_state, canvas))]
    pub fn replay(
        &self,
        trees: &PropertyTrees,
        chunks: Range<usize>,
        layer_state: &PropertyTreeState,
        canvas: &mut dyn PaintCanvas,
    ) -> StippleResult<()> {
        let subset = self.subset(chunks)?;
        layer_state.check(trees)?;
        for chunk in subset.iter() {
            chunk.properties.check(trees)?;
        }
        let layer = layer_state.unalias(trees);
        let clips = trees.clips();
        let effects = trees.effects();

        for chunk in subset.iter() {
            let state = chunk.properties.unalias(trees);
            if !clips.is_ancestor_or_self(layer.clip, state.clip)
                || !effects.is_ancestor_or_self(layer.effect, state.effect)
            {
                return Err(StippleError::tree(format!(
                    "chunk {} is not painted under the layer state",
                    chunk.id
                )));
            }

            canvas.save();

            let mut effect_chain: Vec<_> = effects
                .ancestors(state.effect)
                .take_while(|&e| e != layer.effect)
                .filter(|&e| !effects.is_alias(e))
                .collect();
            effect_chain.reverse();
            let mut groups = 0;
            for e in effect_chain {
                let effect = effects.state(e);
                if effect.needs_group() {
                    canvas.save_layer_alpha(effect.opacity, effect.blend_mode);
                    groups += 1;
                }
            }

            let mut clip_chain: Vec<_> = clips
                .ancestors(state.clip)
                .take_while(|&c| c != layer.clip)
                .filter(|&c| !clips.is_alias(c))
                .collect();
            clip_chain.reverse();
            for c in clip_chain {
                let clip = clips.state(c);
                canvas.set_matrix(GeometryMapper::source_to_destination_projection(
                    trees,
                    clip.local_transform_space,
                    layer.transform,
                ));
                if let Some(path) = &clip.clip_path {
                    canvas.clip_path(path);
                } else if clip.has_radius() {
                    canvas.clip_rounded_rect(clip.clip_rect);
                } else {
                    canvas.clip_rect(clip.clip_rect.rect());
                }
            }

            canvas.set_matrix(GeometryMapper::source_to_destination_projection(
                trees,
                state.transform,
                layer.transform,
            ));
            for item in subset.items_in(chunk) {
                match item.payload() {
                    DisplayItemPayload::Drawing(record) => {
                        for op in &record.ops {
                            canvas.draw_op(op);
                        }
                    }
                    DisplayItemPayload::ForeignLayer(layer) => {
                        canvas.foreign_layer(layer, item.visual_rect());
                    }
                    DisplayItemPayload::HitTest(_) => {}
                }
            }

            for _ in 0..groups {
                canvas.restore();
            }
            canvas.restore();
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/paint/replay.rs"]
mod tests;
