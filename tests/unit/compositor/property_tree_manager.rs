use super::*;
use crate::foundation::core::Vec2;
use crate::foundation::error::StippleError;
use crate::property::clip::ClipState;
use crate::property::effect::EffectState;
use crate::property::transform::TransformState;

fn rounded(trees: &mut PropertyTrees, parent: ClipId, rect: Rect) -> ClipId {
    let root = trees.root_state();
    trees
        .create_clip(parent, ClipState::rounded(root.transform, RoundedRect::from_rect(rect, 4.0)))
        .unwrap()
}

fn state(trees: &PropertyTrees, clip: ClipId) -> PropertyTreeState {
    let root = trees.root_state();
    PropertyTreeState::new(root.transform, clip, root.effect)
}

#[test]
fn root_chunk_maps_to_root_nodes() {
    let trees = PropertyTrees::new();
    let mut manager = PropertyTreeManager::new(&trees);
    let ids = manager.switch_to_chunk(&trees.root_state()).unwrap();
    assert_eq!(ids, CompositorNodeIds::default());

    let out = manager.finish();
    assert_eq!(out.trees.transforms.len(), 1);
    assert_eq!(out.trees.clips.len(), 1);
    assert_eq!(out.trees.effects.len(), 1);
    assert_eq!(out.trees.effects[0].source, CompositorEffectSource::Root);
    assert!(out.synthesized_clips.is_empty());
}

#[test]
fn transforms_are_memoized_with_parent_chain() {
    let mut trees = PropertyTrees::new();
    let root = trees.root_state();
    let t1 = trees
        .create_transform(root.transform, TransformState::translation(Vec2::new(5.0, 0.0)))
        .unwrap();
    let t2 = trees
        .create_transform(t1, TransformState::translation(Vec2::new(0.0, 7.0)))
        .unwrap();
    let alias = trees.create_transform_alias(t2).unwrap();

    let mut manager = PropertyTreeManager::new(&trees);
    let a = manager
        .switch_to_chunk(&PropertyTreeState::new(t2, root.clip, root.effect))
        .unwrap();
    let b = manager
        .switch_to_chunk(&PropertyTreeState::new(alias, root.clip, root.effect))
        .unwrap();
    assert_eq!(a.transform, 2);
    assert_eq!(a, b);

    let out = manager.finish();
    assert_eq!(out.trees.transforms.len(), 3);
    assert_eq!(out.trees.transforms[1].parent, Some(0));
    assert_eq!(out.trees.transforms[2].parent, Some(1));
    assert_eq!(
        out.trees.transforms[2].to_screen,
        Affine::translate((5.0, 7.0))
    );
}

#[test]
fn effects_are_entered_and_reused() {
    let mut trees = PropertyTrees::new();
    let root = trees.root_state();
    let e = trees
        .create_effect(root.effect, EffectState::new(root.transform).with_opacity(0.5))
        .unwrap();
    let inner = PropertyTreeState::new(root.transform, root.clip, e);

    let mut manager = PropertyTreeManager::new(&trees);
    assert_eq!(manager.switch_to_chunk(&inner).unwrap().effect, 1);
    assert_eq!(manager.switch_to_chunk(&root).unwrap().effect, 0);
    assert_eq!(manager.switch_to_chunk(&inner).unwrap().effect, 1);

    let out = manager.finish();
    assert_eq!(out.trees.effects.len(), 2);
    assert_eq!(out.trees.effects[1].parent, Some(0));
    assert_eq!(out.trees.effects[1].opacity, 0.5);
    assert_eq!(out.trees.effects[1].source, CompositorEffectSource::Effect);
}

#[test]
fn rounded_clip_is_synthesized_as_mask() {
    let mut trees = PropertyTrees::new();
    let root = trees.root_state();
    let c = rounded(&mut trees, root.clip, Rect::new(0.0, 0.0, 50.0, 50.0));

    let mut manager = PropertyTreeManager::new(&trees);
    let ids = manager.switch_to_chunk(&state(&trees, c)).unwrap();
    assert_eq!(ids.effect, 1);
    assert_eq!(ids.clip, 1);

    let out = manager.finish();
    assert_eq!(out.trees.effects[1].source, CompositorEffectSource::SynthesizedClip);
    assert_eq!(out.trees.clips[1].rect, Rect::new(0.0, 0.0, 50.0, 50.0));
    assert_eq!(out.synthesized_clips.len(), 1);
    let layer = &out.synthesized_clips[0];
    assert_eq!(layer.effect, 1);
    assert_eq!(layer.clip, 1);
    assert_eq!(layer.blend_mode, BlendMode::DstIn);
    assert_eq!(layer.mask.radii().top_left, 4.0);
}

#[test]
fn rect_clip_needs_mask_only_when_rotated() {
    let mut trees = PropertyTrees::new();
    let root = trees.root_state();
    let moved = trees
        .create_transform(root.transform, TransformState::translation(Vec2::new(3.0, 3.0)))
        .unwrap();
    let rotated = trees
        .create_transform(root.transform, TransformState::from_matrix(Affine::rotate(0.3)))
        .unwrap();
    let plain = trees
        .create_clip(root.clip, ClipState::rect(moved, Rect::new(0.0, 0.0, 10.0, 10.0)))
        .unwrap();
    let tilted = trees
        .create_clip(root.clip, ClipState::rect(rotated, Rect::new(0.0, 0.0, 10.0, 10.0)))
        .unwrap();

    let mut manager = PropertyTreeManager::new(&trees);
    assert_eq!(manager.switch_to_chunk(&state(&trees, plain)).unwrap().effect, 0);
    assert_eq!(manager.switch_to_chunk(&state(&trees, tilted)).unwrap().effect, 1);
    let out = manager.finish();
    assert_eq!(out.synthesized_clips.len(), 1);
    assert_eq!(out.synthesized_clips[0].transform, 2);
}

#[test]
fn nested_masks_close_inner_first() {
    let mut trees = PropertyTrees::new();
    let root = trees.root_state();
    let outer = rounded(&mut trees, root.clip, Rect::new(0.0, 0.0, 100.0, 100.0));
    let inner = rounded(&mut trees, outer, Rect::new(10.0, 10.0, 50.0, 50.0));

    let mut manager = PropertyTreeManager::new(&trees);
    let ids = manager.switch_to_chunk(&state(&trees, inner)).unwrap();
    assert_eq!(ids.effect, 2);
    // Back under the outer clip only: the inner mask closes, the outer stays open.
    assert_eq!(manager.switch_to_chunk(&state(&trees, outer)).unwrap().effect, 1);
    assert_eq!(manager.switch_to_chunk(&root).unwrap().effect, 0);

    let out = manager.finish();
    assert_eq!(out.trees.effects[2].parent, Some(1));
    let closed: Vec<usize> = out.synthesized_clips.iter().map(|l| l.effect).collect();
    assert_eq!(closed, vec![2, 1]);
}

#[test]
fn sibling_mask_closes_previous_one() {
    let mut trees = PropertyTrees::new();
    let root = trees.root_state();
    let left = rounded(&mut trees, root.clip, Rect::new(0.0, 0.0, 10.0, 10.0));
    let right = rounded(&mut trees, root.clip, Rect::new(20.0, 0.0, 30.0, 10.0));

    let (out, ids) = {
        let mut manager = PropertyTreeManager::new(&trees);
        let ids = vec![
            manager.switch_to_chunk(&state(&trees, left)).unwrap(),
            manager.switch_to_chunk(&state(&trees, right)).unwrap(),
        ];
        (manager.finish(), ids)
    };
    assert_eq!(ids[0].effect, 1);
    assert_eq!(ids[1].effect, 2);
    assert_eq!(out.trees.effects[2].parent, Some(0));
    let closed: Vec<usize> = out.synthesized_clips.iter().map(|l| l.effect).collect();
    assert_eq!(closed, vec![1, 2]);
}

#[test]
fn effect_output_clip_is_masked_outside_the_effect() {
    let mut trees = PropertyTrees::new();
    let root = trees.root_state();
    let c = rounded(&mut trees, root.clip, Rect::new(0.0, 0.0, 40.0, 40.0));
    let e = trees
        .create_effect(
            root.effect,
            EffectState::new(root.transform)
                .with_opacity(0.25)
                .with_output_clip(c),
        )
        .unwrap();

    let mut manager = PropertyTreeManager::new(&trees);
    let ids = manager
        .switch_to_chunk(&PropertyTreeState::new(root.transform, c, e))
        .unwrap();
    let out = manager.finish();
    assert_eq!(ids.effect, 2);
    assert_eq!(out.trees.effects[1].source, CompositorEffectSource::SynthesizedClip);
    assert_eq!(out.trees.effects[2].parent, Some(1));
    assert_eq!(out.trees.effects[2].clip, ids.clip);
    assert_eq!(out.synthesized_clips.len(), 1);
}

#[test]
fn stale_node_is_rejected() {
    let mut trees = PropertyTrees::new();
    let root = trees.root_state();
    let t = trees
        .create_transform(root.transform, TransformState::translation(Vec2::new(1.0, 0.0)))
        .unwrap();
    trees.destroy_transform(t).unwrap();

    let mut manager = PropertyTreeManager::new(&trees);
    let err = manager
        .switch_to_chunk(&PropertyTreeState::new(t, root.clip, root.effect))
        .unwrap_err();
    assert!(matches!(err, StippleError::PropertyTree(_)));
}

#[test]
fn build_covers_every_chunk() {
    use crate::foundation::core::Rgba8Premul;
    use crate::paint::controller::PaintController;
    use crate::paint::item::PaintItemKind;
    use crate::testing::FakeDisplayItemClient;

    let mut trees = PropertyTrees::new();
    let root = trees.root_state();
    let c = rounded(&mut trees, root.clip, Rect::new(0.0, 0.0, 20.0, 20.0));
    let a = FakeDisplayItemClient::new(1, "a", Rect::new(0.0, 0.0, 10.0, 10.0));
    let b = FakeDisplayItemClient::new(2, "b", Rect::new(0.0, 0.0, 30.0, 30.0));

    let mut pc = PaintController::default();
    for (client, chunk_state) in [(&a, state(&trees, c)), (&b, root)] {
        pc.update_current_paint_chunk_properties(None, chunk_state)
            .unwrap();
        pc.record_drawing(client, PaintItemKind::Foreground, |rec| {
            rec.fill_rect(Rect::new(0.0, 0.0, 10.0, 10.0), Rgba8Premul::transparent());
        })
        .unwrap();
    }
    let artifact = pc.commit_new_display_items().unwrap();

    let (out, ids) = PropertyTreeManager::build(&trees, &artifact).unwrap();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0].effect, 1);
    assert_eq!(ids[1], CompositorNodeIds::default());
    assert_eq!(out.synthesized_clips.len(), 1);
    let json = out.trees.to_json().unwrap();
    assert_eq!(json["effects"][1]["source"], "synthesized_clip");
}
