use std::collections::HashMap;

use crate::foundation::core::{Affine, BezPath, Rect, RoundedRect, preserves_axis_alignment};
use crate::foundation::error::StippleResult;
use crate::paint::artifact::PaintArtifact;
use crate::property::clip::ClipId;
use crate::property::effect::{BlendMode, EffectId, FilterOp};
use crate::property::geometry::GeometryMapper;
use crate::property::state::{PropertyTreeState, PropertyTrees};
use crate::property::transform::TransformId;

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct CompositorTransformNode {
    pub parent: Option<usize>,
    pub local: Affine,
    /// Accumulated local-to-root matrix.
    pub to_screen: Affine,
    pub animated: bool,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct CompositorClipNode {
    pub parent: Option<usize>,
    pub transform: usize,
    /// Bounding rect in the space of `transform`. Rounded corners and paths are not
    /// representable here; they go through a synthesized mask instead.
    pub rect: Rect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositorEffectSource {
    Root,
    Effect,
    /// Isolation group created to apply a clip as a mask.
    SynthesizedClip,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct CompositorEffectNode {
    pub parent: Option<usize>,
    pub transform: usize,
    pub clip: usize,
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub filter: Vec<FilterOp>,
    pub source: CompositorEffectSource,
}

/// Flattened property trees in the shape a compositor consumes: plain vectors with parent
/// indices. Index 0 of every vector is the root.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct CompositorPropertyTrees {
    pub transforms: Vec<CompositorTransformNode>,
    pub clips: Vec<CompositorClipNode>,
    pub effects: Vec<CompositorEffectNode>,
}

impl CompositorPropertyTrees {
    pub fn to_json(&self) -> StippleResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Mask layer drawn last inside a synthesized clip effect.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct SynthesizedClipLayer {
    /// The synthesized effect node the mask composites into.
    pub effect: usize,
    pub transform: usize,
    pub clip: usize,
    pub mask: RoundedRect,
    pub path: Option<BezPath>,
    pub blend_mode: BlendMode,
}

/// Compositor node indices a chunk is drawn with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize)]
pub struct CompositorNodeIds {
    pub transform: usize,
    pub clip: usize,
    pub effect: usize,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct CompositorOutput {
    pub trees: CompositorPropertyTrees,
    /// In the order their synthesized effects were closed.
    pub synthesized_clips: Vec<SynthesizedClipLayer>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameKind {
    Effect,
    SynthesizedClip,
}

/// One open compositor effect.
#[derive(Clone, Copy, Debug)]
struct Frame {
    kind: FrameKind,
    /// Nearest real effect at or below this frame.
    effect: EffectId,
    /// Clip already applied once this frame is open.
    clip: ClipId,
    compositor_effect: usize,
}

/// Converts paint property trees into [`CompositorPropertyTrees`], one chunk at a time.
///
/// Chunks must be fed in paint order. Clips the compositor cannot apply natively (rounded,
/// path-based, or not axis-aligned in the space of the enclosing effect) become extra effect
/// nodes with a mask layer. Open effects live on an explicit stack and are closed in reverse
/// order, which fixes the order of the emitted [`SynthesizedClipLayer`]s.
pub struct PropertyTreeManager<'a> {
    trees: &'a PropertyTrees,
    out: CompositorPropertyTrees,
    transform_index: HashMap<TransformId, usize>,
    clip_index: HashMap<ClipId, usize>,
    effect_index: HashMap<EffectId, usize>,
    stack: Vec<Frame>,
    root: Frame,
    synthesized_clips: Vec<SynthesizedClipLayer>,
}

impl<'a> PropertyTreeManager<'a> {
    pub fn new(trees: &'a PropertyTrees) -> Self {
        let root_state = trees.root_state();
        let transform = trees.transforms().state(root_state.transform);
        let clip = trees.clips().state(root_state.clip);
        let effect = trees.effects().state(root_state.effect);

        let out = CompositorPropertyTrees {
            transforms: vec![CompositorTransformNode {
                parent: None,
                local: transform.local_matrix(),
                to_screen: transform.local_matrix(),
                animated: transform.composited_animation,
            }],
            clips: vec![CompositorClipNode {
                parent: None,
                transform: 0,
                rect: clip.bounds(),
            }],
            effects: vec![CompositorEffectNode {
                parent: None,
                transform: 0,
                clip: 0,
                opacity: effect.opacity,
                blend_mode: effect.blend_mode,
                filter: effect.filter.clone(),
                source: CompositorEffectSource::Root,
            }],
        };
        Self {
            trees,
            out,
            transform_index: HashMap::from([(root_state.transform, 0)]),
            clip_index: HashMap::from([(root_state.clip, 0)]),
            effect_index: HashMap::from([(root_state.effect, 0)]),
            stack: Vec::new(),
            root: Frame {
                kind: FrameKind::Effect,
                effect: root_state.effect,
                clip: root_state.clip,
                compositor_effect: 0,
            },
            synthesized_clips: Vec::new(),
        }
    }

    /// Builds compositor trees for every chunk of `artifact`, in order.
    #[tracing::instrument(skip_all, fields(chunks = artifact.chunks().len()))]
    pub fn build(
        trees: &PropertyTrees,
        artifact: &PaintArtifact,
    ) -> StippleResult<(CompositorOutput, Vec<CompositorNodeIds>)> {
        let mut manager = PropertyTreeManager::new(trees);
        let ids = artifact
            .chunks()
            .iter()
            .map(|chunk| manager.switch_to_chunk(&chunk.properties))
            .collect::<StippleResult<Vec<_>>>()?;
        let output = manager.finish();
        tracing::debug!(
            transforms = output.trees.transforms.len(),
            clips = output.trees.clips.len(),
            effects = output.trees.effects.len(),
            synthesized_clips = output.synthesized_clips.len(),
            "compositor property trees built"
        );
        Ok((output, ids))
    }

    /// Opens and closes effects so that the next chunk can be drawn under `state`.
    pub fn switch_to_chunk(
        &mut self,
        state: &PropertyTreeState,
    ) -> StippleResult<CompositorNodeIds> {
        state.check(self.trees)?;
        let state = state.unalias(self.trees);

        self.switch_to_effect(state.effect)?;
        self.switch_to_clip(state.clip)?;
        Ok(CompositorNodeIds {
            transform: self.ensure_transform(state.transform),
            clip: self.ensure_clip(state.clip),
            effect: self.top().compositor_effect,
        })
    }

    /// Closes every open effect.
    pub fn finish(mut self) -> CompositorOutput {
        while !self.stack.is_empty() {
            self.pop();
        }
        CompositorOutput {
            trees: self.out,
            synthesized_clips: self.synthesized_clips,
        }
    }

    fn top(&self) -> Frame {
        self.stack.last().copied().unwrap_or(self.root)
    }

    fn pop(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        if frame.kind != FrameKind::SynthesizedClip {
            return;
        }
        let trees = self.trees;
        let clip = trees.clips().state(frame.clip);
        let node = &self.out.effects[frame.compositor_effect];
        self.synthesized_clips.push(SynthesizedClipLayer {
            effect: frame.compositor_effect,
            transform: node.transform,
            clip: node.clip,
            mask: clip.clip_rect,
            path: clip.clip_path.clone(),
            blend_mode: BlendMode::DstIn,
        });
    }

    fn switch_to_effect(&mut self, target: EffectId) -> StippleResult<()> {
        let trees = self.trees;
        let effects = trees.effects();
        while let Some(top) = self.stack.last()
            && !effects.is_ancestor_or_self(top.effect, target)
        {
            self.pop();
        }

        let current = self.top().effect;
        let mut path: Vec<EffectId> = effects
            .ancestors(target)
            .take_while(|&e| e != current)
            .filter(|&e| !effects.is_alias(e))
            .collect();
        path.reverse();
        for effect in path {
            self.enter_effect(effect)?;
        }
        Ok(())
    }

    fn enter_effect(&mut self, effect: EffectId) -> StippleResult<()> {
        let trees = self.trees;
        let state = trees.effects().state(effect);
        let clip = match state.output_clip {
            Some(output_clip) => {
                self.switch_to_clip(output_clip)?;
                trees.clips().unalias(output_clip)
            }
            None => self.top().clip,
        };

        let compositor_effect = match self.effect_index.get(&effect) {
            Some(&index) => index,
            None => {
                let node = CompositorEffectNode {
                    parent: Some(self.top().compositor_effect),
                    transform: self.ensure_transform(state.local_transform_space),
                    clip: self.ensure_clip(clip),
                    opacity: state.opacity,
                    blend_mode: state.blend_mode,
                    filter: state.filter.clone(),
                    source: CompositorEffectSource::Effect,
                };
                let index = self.out.effects.len();
                self.out.effects.push(node);
                self.effect_index.insert(effect, index);
                index
            }
        };
        self.stack.push(Frame {
            kind: FrameKind::Effect,
            effect,
            clip,
            compositor_effect,
        });
        Ok(())
    }

    fn switch_to_clip(&mut self, target: ClipId) -> StippleResult<()> {
        let trees = self.trees;
        let clips = trees.clips();
        clips.try_state(target)?;
        let target = clips.unalias(target);
        while let Some(top) = self.stack.last()
            && top.kind == FrameKind::SynthesizedClip
            && !clips.is_ancestor_or_self(top.clip, target)
        {
            self.pop();
        }

        let frame = self.top();
        let stop = clips.lowest_common_ancestor(frame.clip, target);
        let effect_space = trees.effects().state(frame.effect).local_transform_space;
        let mut needs_mask: Vec<ClipId> = clips
            .ancestors(target)
            .take_while(|&c| c != stop)
            .filter(|&c| !clips.is_alias(c) && !self.is_native_clip(c, effect_space))
            .collect();
        needs_mask.reverse();
        for clip in needs_mask {
            self.push_synthesized_clip(clip);
        }
        Ok(())
    }

    /// Whether the compositor can apply `clip` as a plain rect inside an effect drawn in
    /// `effect_space`.
    fn is_native_clip(&self, clip: ClipId, effect_space: TransformId) -> bool {
        let state = self.trees.clips().state(clip);
        state.is_rectangular()
            && preserves_axis_alignment(GeometryMapper::source_to_destination_projection(
                self.trees,
                state.local_transform_space,
                effect_space,
            ))
    }

    fn push_synthesized_clip(&mut self, clip: ClipId) {
        let trees = self.trees;
        let state = trees.clips().state(clip);
        let node = CompositorEffectNode {
            parent: Some(self.top().compositor_effect),
            transform: self.ensure_transform(state.local_transform_space),
            clip: self.ensure_clip(clip),
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            filter: Vec::new(),
            source: CompositorEffectSource::SynthesizedClip,
        };
        let index = self.out.effects.len();
        self.out.effects.push(node);
        let effect = self.top().effect;
        self.stack.push(Frame {
            kind: FrameKind::SynthesizedClip,
            effect,
            clip,
            compositor_effect: index,
        });
    }

    fn ensure_transform(&mut self, id: TransformId) -> usize {
        let trees = self.trees;
        let transforms = trees.transforms();
        let mut parent = 0;
        let mut missing = Vec::new();
        for node in transforms.ancestors(transforms.unalias(id)) {
            if transforms.is_alias(node) {
                continue;
            }
            if let Some(&index) = self.transform_index.get(&node) {
                parent = index;
                break;
            }
            missing.push(node);
        }

        for node in missing.into_iter().rev() {
            let state = transforms.state(node);
            let index = self.out.transforms.len();
            self.out.transforms.push(CompositorTransformNode {
                parent: Some(parent),
                local: state.local_matrix(),
                to_screen: GeometryMapper::local_to_root(trees, node),
                animated: state.composited_animation,
            });
            self.transform_index.insert(node, index);
            parent = index;
        }
        parent
    }

    fn ensure_clip(&mut self, id: ClipId) -> usize {
        let trees = self.trees;
        let clips = trees.clips();
        let mut parent = 0;
        let mut missing = Vec::new();
        for node in clips.ancestors(clips.unalias(id)) {
            if clips.is_alias(node) {
                continue;
            }
            if let Some(&index) = self.clip_index.get(&node) {
                parent = index;
                break;
            }
            missing.push(node);
        }

        for node in missing.into_iter().rev() {
            let state = clips.state(node);
            let transform = self.ensure_transform(state.local_transform_space);
            let index = self.out.clips.len();
            self.out.clips.push(CompositorClipNode {
                parent: Some(parent),
                transform,
                rect: state.bounds(),
            });
            self.clip_index.insert(node, index);
            parent = index;
        }
        parent
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compositor/property_tree_manager.rs"]
mod tests;
