use super::*;
use crate::foundation::core::{Rect, Rgba8Premul};
use crate::paint::client::PaintInvalidationReason;
use crate::property::state::PropertyTrees;
use crate::testing::FakeDisplayItemClient;

fn clients(n: u64) -> Vec<FakeDisplayItemClient> {
    (0..n)
        .map(|i| {
            let x = i as f64 * 10.0;
            FakeDisplayItemClient::new(i + 1, format!("box {i}"), Rect::new(x, 0.0, x + 10.0, 10.0))
        })
        .collect()
}

fn fill(client: &FakeDisplayItemClient) -> impl FnOnce(&mut DrawingRecord) + '_ {
    move |rec| {
        rec.fill_rect(client.visual_rect(), Rgba8Premul::from_straight_rgba(0, 128, 0, 255));
    }
}

fn paint(
    pc: &mut PaintController,
    state: PropertyTreeState,
    order: &[&FakeDisplayItemClient],
) -> Arc<PaintArtifact> {
    pc.update_current_paint_chunk_properties(None, state).unwrap();
    for c in order {
        pc.record_drawing(*c, PaintItemKind::BoxDecorationBackground, fill(c))
            .unwrap();
    }
    pc.commit_new_display_items().unwrap()
}

fn finish(pc: &mut PaintController, all: &[FakeDisplayItemClient]) {
    let painted = pc.finish_cycle().unwrap();
    for c in all.iter().filter(|c| painted.contains(&c.id())) {
        c.validate();
    }
}

#[test]
fn unchanged_second_cycle_reuses_everything_in_order() {
    let state = PropertyTrees::new().root_state();
    let cs = clients(5);
    let order: Vec<_> = cs.iter().collect();
    let mut pc = PaintController::default();

    let first = paint(&mut pc, state, &order);
    assert_eq!(pc.stats().recorded_items, 5);
    finish(&mut pc, &cs);

    let second = paint(&mut pc, state, &order);
    let stats = pc.stats();
    assert_eq!(stats.recorded_items, 0);
    assert_eq!(stats.reused_items, 5);
    assert_eq!(stats.sequential_matches, 5);
    assert_eq!(stats.indexed_items, 0);
    assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
    assert!(cs.iter().all(|c| pc.client_cache_is_valid(c)));
}

#[test]
fn invalidated_client_is_re_recorded() {
    let state = PropertyTrees::new().root_state();
    let cs = clients(3);
    let order: Vec<_> = cs.iter().collect();
    let mut pc = PaintController::default();
    paint(&mut pc, state, &order);
    finish(&mut pc, &cs);

    cs[1].invalidate(PaintInvalidationReason::Style);
    assert!(!pc.client_cache_is_valid(&cs[1]));
    let artifact = paint(&mut pc, state, &order);
    assert_eq!(pc.stats().recorded_items, 1);
    assert_eq!(pc.stats().reused_items, 2);
    assert_eq!(
        artifact.items()[1].invalidation_reason(),
        PaintInvalidationReason::Style
    );
}

#[test]
fn reversed_order_uses_the_index_and_stays_linear() {
    let state = PropertyTrees::new().root_state();
    let cs = clients(50);
    let mut pc = PaintController::default();
    paint(&mut pc, state, &cs.iter().collect::<Vec<_>>());
    finish(&mut pc, &cs);

    let reversed: Vec<_> = cs.iter().rev().collect();
    paint(&mut pc, state, &reversed);
    let stats = pc.stats();
    assert_eq!(stats.reused_items, 50);
    assert_eq!(stats.forward_scan_matches, 1);
    assert_eq!(stats.out_of_order_matches, 49);
    assert!(stats.indexed_items <= 50);
    assert!(stats.index_lookups <= 50);
}

#[test]
fn removed_and_added_items() {
    let state = PropertyTrees::new().root_state();
    let cs = clients(4);
    let mut pc = PaintController::default();
    paint(&mut pc, state, &[&cs[0], &cs[1], &cs[2]]);
    finish(&mut pc, &cs);

    let artifact = paint(&mut pc, state, &[&cs[0], &cs[2], &cs[3]]);
    assert_eq!(pc.stats().reused_items, 2);
    assert_eq!(pc.stats().recorded_items, 1);
    let ids: Vec<_> = artifact.items().iter().map(|i| i.client_id().0).collect();
    assert_eq!(ids, vec![1, 3, 4]);
}

#[test]
fn cached_subsequence_is_copied_with_nested_markers() {
    let state = PropertyTrees::new().root_state();
    let cs = clients(4);
    let (outer, inner) = (&cs[0], &cs[1]);
    let mut pc = PaintController::default();

    let paint_tree = |pc: &mut PaintController| {
        pc.update_current_paint_chunk_properties(None, state).unwrap();
        if pc.use_cached_subsequence_if_possible(outer).unwrap() {
            return;
        }
        let token = pc.begin_subsequence().unwrap();
        pc.record_drawing(outer, PaintItemKind::BoxDecorationBackground, fill(outer))
            .unwrap();
        if !pc.use_cached_subsequence_if_possible(inner).unwrap() {
            let inner_token = pc.begin_subsequence().unwrap();
            pc.record_drawing(inner, PaintItemKind::Foreground, fill(inner))
                .unwrap();
            pc.record_drawing(&cs[2], PaintItemKind::Foreground, fill(&cs[2]))
                .unwrap();
            pc.end_subsequence(inner, inner_token).unwrap();
        }
        pc.end_subsequence(outer, token).unwrap();
    };

    paint_tree(&mut pc);
    pc.commit_new_display_items().unwrap();
    finish(&mut pc, &cs);

    paint_tree(&mut pc);
    let artifact = pc.commit_new_display_items().unwrap();
    assert_eq!(pc.stats().reused_subsequences, 1);
    assert_eq!(pc.stats().reused_items, 3);
    assert!(artifact.chunks().iter().all(|c| c.is_moved_from_cached_subsequence));
    finish(&mut pc, &cs);

    // The nested marker was carried along, so the inner subsequence alone is reusable.
    outer.invalidate(PaintInvalidationReason::Layout);
    paint_tree(&mut pc);
    pc.commit_new_display_items().unwrap();
    assert_eq!(pc.stats().reused_subsequences, 1);
    assert_eq!(pc.stats().recorded_items, 1);
    assert_eq!(pc.stats().reused_items, 2);
}

#[test]
fn skipped_items_are_never_cached() {
    let state = PropertyTrees::new().root_state();
    let cs = clients(1);
    let mut pc = PaintController::default();
    for _ in 0..2 {
        pc.update_current_paint_chunk_properties(None, state).unwrap();
        pc.begin_skipping_cache().unwrap();
        assert!(!pc.use_cached_item_if_possible(&cs[0], PaintItemKind::Foreground).unwrap());
        pc.record_drawing(&cs[0], PaintItemKind::Foreground, fill(&cs[0]))
            .unwrap();
        pc.end_skipping_cache().unwrap();
        let artifact = pc.commit_new_display_items().unwrap();
        assert!(!artifact.items()[0].is_cacheable());
        finish(&mut pc, &cs);
    }
    assert_eq!(pc.stats().reused_items, 0);
    assert!(pc.end_skipping_cache().is_err());
}

#[test]
fn fragments_distinguish_items_of_one_client() {
    let state = PropertyTrees::new().root_state();
    let cs = clients(1);
    let mut pc = PaintController::default();
    pc.update_current_paint_chunk_properties(None, state).unwrap();
    for fragment in 0..3 {
        pc.set_current_fragment(fragment);
        pc.record_drawing(&cs[0], PaintItemKind::Foreground, fill(&cs[0]))
            .unwrap();
    }
    let artifact = pc.commit_new_display_items().unwrap();
    let fragments: Vec<_> = artifact.items().iter().map(|i| i.id().fragment).collect();
    assert_eq!(fragments, vec![0, 1, 2]);
}

#[test]
fn under_invalidation_rejects_the_cycle() {
    let state = PropertyTrees::new().root_state();
    let cs = clients(1);
    let mut pc = PaintController::new(PaintControllerOpts {
        under_invalidation_checking: true,
        ..PaintControllerOpts::default()
    });
    let first = paint(&mut pc, state, &[&cs[0]]);
    finish(&mut pc, &cs);

    // Content changes but the client stays valid.
    cs[0].set_visual_rect(Rect::new(0.0, 0.0, 20.0, 20.0));
    pc.update_current_paint_chunk_properties(None, state).unwrap();
    let err = pc
        .record_drawing(&cs[0], PaintItemKind::BoxDecorationBackground, fill(&cs[0]))
        .unwrap_err();
    assert!(matches!(err, StippleError::UnderInvalidation(_)));
    assert!(pc.commit_new_display_items().is_err());
    assert!(Arc::ptr_eq(&pc.current_artifact(), &first));
}

#[test]
fn under_invalidation_accepts_identical_content() {
    let state = PropertyTrees::new().root_state();
    let cs = clients(2);
    let order: Vec<_> = cs.iter().collect();
    let mut pc = PaintController::new(PaintControllerOpts {
        under_invalidation_checking: true,
        ..PaintControllerOpts::default()
    });
    paint(&mut pc, state, &order);
    finish(&mut pc, &cs);
    paint(&mut pc, state, &order);
    assert_eq!(pc.stats().recorded_items, 2);
    assert_eq!(pc.stats().sequential_matches, 2);
}

#[test]
fn duplicate_ids_reject_the_commit() {
    let state = PropertyTrees::new().root_state();
    let cs = clients(1);
    let mut pc = PaintController::new(PaintControllerOpts {
        check_duplicate_ids: true,
        ..PaintControllerOpts::default()
    });
    pc.update_current_paint_chunk_properties(None, state).unwrap();
    for _ in 0..2 {
        pc.create_and_append(
            &cs[0],
            PaintItemKind::Foreground,
            DisplayItemPayload::Drawing(DrawingRecord::new()),
        )
        .unwrap();
    }
    let err = pc.commit_new_display_items().unwrap_err();
    assert!(matches!(err, StippleError::DuplicateItemId(_)));
    assert!(pc.current_artifact().is_empty());
    assert!(!pc.is_recording());
}

#[test]
fn lifecycle_order_is_enforced() {
    let state = PropertyTrees::new().root_state();
    let cs = clients(1);
    let mut pc = PaintController::default();
    assert!(pc.finish_cycle().is_err());

    paint(&mut pc, state, &[&cs[0]]);
    assert!(pc.update_current_paint_chunk_properties(None, state).is_err());
    assert!(pc.commit_new_display_items().is_err());
    let painted = pc.finish_cycle().unwrap();
    assert_eq!(painted, vec![cs[0].id()]);
}

#[test]
fn invalidate_all_drops_the_cache() {
    let state = PropertyTrees::new().root_state();
    let cs = clients(3);
    let order: Vec<_> = cs.iter().collect();
    let mut pc = PaintController::default();
    paint(&mut pc, state, &order);
    finish(&mut pc, &cs);

    pc.invalidate_all().unwrap();
    paint(&mut pc, state, &order);
    assert_eq!(pc.stats().reused_items, 0);
    assert_eq!(pc.stats().recorded_items, 3);
}
