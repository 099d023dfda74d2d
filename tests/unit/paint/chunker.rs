use super::*;
use crate::foundation::core::{ClientId, Rect, Size, Vec2};
use crate::paint::item::{
    DisplayItemPayload, DrawingRecord, ForeignLayerData, PaintItemId, PaintItemKind,
};
use crate::property::state::PropertyTrees;
use crate::property::transform::TransformState;
use crate::testing::FakeDisplayItemClient;

fn item(client: u64, kind: PaintItemKind) -> PaintItem {
    let c = FakeDisplayItemClient::new(client, "c", Rect::new(0.0, 0.0, 10.0, 10.0));
    PaintItem::new(
        &c,
        PaintItemId::new(ClientId(client), kind, 0),
        DisplayItemPayload::Drawing(DrawingRecord::new()),
    )
}

fn foreign(client: u64) -> PaintItem {
    let c = FakeDisplayItemClient::new(client, "video", Rect::new(0.0, 0.0, 10.0, 10.0));
    PaintItem::new(
        &c,
        PaintItemId::new(ClientId(client), PaintItemKind::ForeignLayer, 0),
        DisplayItemPayload::ForeignLayer(ForeignLayerData {
            layer_id: 1,
            offset: Vec2::ZERO,
            size: Size::new(10.0, 10.0),
        }),
    )
}

fn two_states() -> (PropertyTreeState, PropertyTreeState) {
    let mut trees = PropertyTrees::new();
    let root = trees.root_state();
    let t = trees
        .create_transform(root.transform, TransformState::translation(Vec2::new(1.0, 0.0)))
        .unwrap();
    (root, PropertyTreeState::new(t, root.clip, root.effect))
}

#[test]
fn items_before_properties_are_rejected() {
    let mut chunker = PaintChunker::new();
    let err = chunker
        .increment_display_item_index(&item(1, PaintItemKind::Foreground))
        .unwrap_err();
    assert!(err.to_string().starts_with("lifecycle error:"));
}

#[test]
fn property_changes_split_chunks() {
    let (a, b) = two_states();
    let mut chunker = PaintChunker::new();
    chunker.update_current_paint_chunk_properties(None, a);
    assert!(chunker.increment_display_item_index(&item(1, PaintItemKind::Foreground)).unwrap());
    assert!(!chunker.increment_display_item_index(&item(2, PaintItemKind::Foreground)).unwrap());
    chunker.update_current_paint_chunk_properties(None, b);
    assert!(chunker.increment_display_item_index(&item(3, PaintItemKind::Foreground)).unwrap());
    chunker.update_current_paint_chunk_properties(None, a);
    assert!(chunker.increment_display_item_index(&item(4, PaintItemKind::Foreground)).unwrap());

    let chunks = chunker.release_paint_chunks();
    let ranges: Vec<_> = chunks.iter().map(|c| (c.begin, c.end)).collect();
    assert_eq!(ranges, vec![(0, 2), (2, 3), (3, 4)]);
    assert_eq!(chunks[0].id.client, ClientId(1));
    assert_eq!(chunks[2].id.client, ClientId(4));
    assert!(chunker.current_properties().is_none());
}

#[test]
fn explicit_id_survives_same_property_update() {
    let (a, _) = two_states();
    let outer = PaintItemId::new(ClientId(99), PaintItemKind::BoxDecorationBackground, 0);
    let inner = PaintItemId::new(ClientId(98), PaintItemKind::BoxDecorationBackground, 0);
    let mut chunker = PaintChunker::new();
    chunker.update_current_paint_chunk_properties(Some(outer), a);
    chunker.update_current_paint_chunk_properties(Some(inner), a);
    chunker
        .increment_display_item_index(&item(1, PaintItemKind::Foreground))
        .unwrap();
    assert_eq!(chunker.chunks()[0].id, outer);
}

#[test]
fn new_explicit_id_splits_chunk_and_is_not_reused() {
    let (a, _) = two_states();
    let first = PaintItemId::new(ClientId(50), PaintItemKind::BoxDecorationBackground, 0);
    let second = PaintItemId::new(ClientId(60), PaintItemKind::BoxDecorationBackground, 0);
    let mut chunker = PaintChunker::new();
    chunker.update_current_paint_chunk_properties(Some(first), a);
    chunker
        .increment_display_item_index(&item(1, PaintItemKind::Foreground))
        .unwrap();
    chunker.update_current_paint_chunk_properties(Some(second), a);
    assert!(chunker.increment_display_item_index(&item(2, PaintItemKind::Foreground)).unwrap());
    chunker.update_current_paint_chunk_properties(None, a);
    chunker.force_new_chunk();
    chunker
        .increment_display_item_index(&item(3, PaintItemKind::Foreground))
        .unwrap();

    let chunks: Vec<_> = chunker.chunks().iter().map(|c| (c.range(), c.id)).collect();
    assert_eq!(
        chunks,
        vec![
            (0..1, first),
            (1..2, second),
            (2..3, PaintItemId::new(ClientId(3), PaintItemKind::Foreground, 0)),
        ]
    );
}

#[test]
fn repeating_the_open_chunk_id_keeps_extending_it() {
    let (a, _) = two_states();
    let id = PaintItemId::new(ClientId(50), PaintItemKind::BoxDecorationBackground, 0);
    let mut chunker = PaintChunker::new();
    chunker.update_current_paint_chunk_properties(Some(id), a);
    chunker
        .increment_display_item_index(&item(1, PaintItemKind::Foreground))
        .unwrap();
    chunker.update_current_paint_chunk_properties(Some(id), a);
    assert!(!chunker.increment_display_item_index(&item(2, PaintItemKind::Foreground)).unwrap());
    chunker.force_new_chunk();
    chunker
        .increment_display_item_index(&item(3, PaintItemKind::Foreground))
        .unwrap();

    assert_eq!(chunker.chunks().len(), 2);
    assert_eq!(chunker.chunks()[1].id.client, ClientId(3));
}

#[test]
fn foreign_items_sit_alone() {
    let (a, _) = two_states();
    let mut chunker = PaintChunker::new();
    chunker.update_current_paint_chunk_properties(None, a);
    for it in [
        item(1, PaintItemKind::Foreground),
        foreign(2),
        item(3, PaintItemKind::Foreground),
        item(4, PaintItemKind::Foreground),
    ] {
        chunker.increment_display_item_index(&it).unwrap();
    }
    let ranges: Vec<_> = chunker.chunks().iter().map(|c| c.range()).collect();
    assert_eq!(ranges, vec![0..1, 1..2, 2..4]);
}

#[test]
fn forced_chunk_starts_on_next_item() {
    let (a, _) = two_states();
    let mut chunker = PaintChunker::new();
    chunker.update_current_paint_chunk_properties(None, a);
    chunker
        .increment_display_item_index(&item(1, PaintItemKind::Foreground))
        .unwrap();
    chunker.force_new_chunk();
    assert!(chunker.will_force_new_chunk());
    assert!(chunker.increment_display_item_index(&item(2, PaintItemKind::Foreground)).unwrap());
    assert_eq!(chunker.chunks().len(), 2);
}

#[test]
fn moved_chunks_are_rebased_and_flagged() {
    let (a, _) = two_states();
    let mut old = PaintChunker::new();
    old.update_current_paint_chunk_properties(None, a);
    for c in 1..=3 {
        old.increment_display_item_index(&item(c, PaintItemKind::Foreground))
            .unwrap();
    }
    let moved = old.release_paint_chunks().remove(0);

    let mut chunker = PaintChunker::new();
    chunker.update_current_paint_chunk_properties(None, a);
    chunker
        .increment_display_item_index(&item(9, PaintItemKind::Foreground))
        .unwrap();
    chunker.append_by_moving(moved);
    assert_eq!(chunker.item_count(), 4);
    let last = chunker.last_chunk().unwrap();
    assert_eq!(last.range(), 1..4);
    assert!(last.is_moved_from_cached_subsequence);

    // The next item does not extend the moved chunk.
    assert!(chunker.increment_display_item_index(&item(10, PaintItemKind::Foreground)).unwrap());
}
