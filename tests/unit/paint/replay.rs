use super::*;
use crate::foundation::core::{Rgba8Premul, Vec2};
use crate::paint::controller::PaintController;
use crate::paint::item::PaintItemKind;
use crate::property::clip::ClipState;
use crate::property::effect::EffectState;
use crate::property::transform::TransformState;
use crate::testing::FakeDisplayItemClient;

#[test]
fn chunk_is_wrapped_in_effect_group_and_clip() {
    let mut trees = PropertyTrees::new();
    let root = trees.root_state();
    let moved = trees
        .create_transform(root.transform, TransformState::translation(Vec2::new(5.0, 0.0)))
        .unwrap();
    let clip = trees
        .create_clip(
            root.clip,
            ClipState::rect(root.transform, Rect::new(0.0, 0.0, 50.0, 50.0)),
        )
        .unwrap();
    let fade = trees
        .create_effect(root.effect, EffectState::new(root.transform).with_opacity(0.5))
        .unwrap();
    let state = PropertyTreeState::new(moved, clip, fade);

    let client = FakeDisplayItemClient::new(1, "box", Rect::new(0.0, 0.0, 10.0, 10.0));
    let color = Rgba8Premul::from_straight_rgba(10, 20, 30, 255);
    let mut pc = PaintController::default();
    pc.update_current_paint_chunk_properties(None, state).unwrap();
    pc.record_drawing(&client, PaintItemKind::Foreground, |rec| {
        rec.fill_rect(Rect::new(0.0, 0.0, 10.0, 10.0), color);
    })
    .unwrap();
    let artifact = pc.commit_new_display_items().unwrap();

    let mut canvas = RecordingCanvas::new();
    artifact.replay(&trees, 0..1, &root, &mut canvas).unwrap();
    assert_eq!(
        canvas.ops,
        vec![
            CanvasOp::Save,
            CanvasOp::SaveLayerAlpha {
                alpha: 0.5,
                blend_mode: BlendMode::Normal,
            },
            CanvasOp::SetMatrix {
                matrix: Affine::IDENTITY,
            },
            CanvasOp::ClipRect {
                rect: Rect::new(0.0, 0.0, 50.0, 50.0),
            },
            CanvasOp::SetMatrix {
                matrix: Affine::translate((5.0, 0.0)),
            },
            CanvasOp::Draw {
                op: DrawOp::FillRect {
                    rect: Rect::new(0.0, 0.0, 10.0, 10.0),
                    color,
                },
            },
            CanvasOp::Restore,
            CanvasOp::Restore,
        ]
    );
    let json = canvas.to_json().unwrap();
    assert!(json.contains(r#""call":"save_layer_alpha""#));
    assert!(json.contains(r#""call":"draw","op":{"op":"fill_rect""#));
    let parsed: Vec<CanvasOp> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, canvas.ops);
}

#[test]
fn replay_under_unrelated_layer_state_fails() {
    let mut trees = PropertyTrees::new();
    let root = trees.root_state();
    let a = trees
        .create_clip(root.clip, ClipState::rect(root.transform, Rect::new(0.0, 0.0, 5.0, 5.0)))
        .unwrap();
    let b = trees
        .create_clip(root.clip, ClipState::rect(root.transform, Rect::new(0.0, 0.0, 9.0, 9.0)))
        .unwrap();

    let client = FakeDisplayItemClient::new(1, "box", Rect::new(0.0, 0.0, 10.0, 10.0));
    let mut pc = PaintController::default();
    pc.update_current_paint_chunk_properties(
        None,
        PropertyTreeState::new(root.transform, a, root.effect),
    )
    .unwrap();
    pc.record_drawing(&client, PaintItemKind::Foreground, |_| {})
        .unwrap();
    let artifact = pc.commit_new_display_items().unwrap();

    let layer = PropertyTreeState::new(root.transform, b, root.effect);
    let mut canvas = RecordingCanvas::new();
    assert!(artifact.replay(&trees, 0..1, &layer, &mut canvas).is_err());
}

#[test]
fn replay_with_destroyed_clip_fails_without_drawing() {
    let mut trees = PropertyTrees::new();
    let root = trees.root_state();
    let clip = trees
        .create_clip(root.clip, ClipState::rect(root.transform, Rect::new(0.0, 0.0, 5.0, 5.0)))
        .unwrap();

    let client = FakeDisplayItemClient::new(1, "box", Rect::new(0.0, 0.0, 10.0, 10.0));
    let mut pc = PaintController::default();
    pc.update_current_paint_chunk_properties(
        None,
        PropertyTreeState::new(root.transform, clip, root.effect),
    )
    .unwrap();
    pc.record_drawing(&client, PaintItemKind::Foreground, |_| {})
        .unwrap();
    let artifact = pc.commit_new_display_items().unwrap();
    trees.destroy_clip(clip).unwrap();

    let mut canvas = RecordingCanvas::new();
    let err = artifact.replay(&trees, 0..1, &root, &mut canvas).unwrap_err();
    assert!(matches!(err, crate::StippleError::PropertyTree(_)));
    assert!(canvas.ops.is_empty());
}
