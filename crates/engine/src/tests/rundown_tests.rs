use super::*;
use crate::fixtures::*;
use shared::domain::OverlayPersistence;

#[test]
fn find_next_actionable_skips_blocks_and_notes() {
    let index = RundownIndex::new(single_cue(vec![
        media(1),
        block(2, &[20, 21]),
        note(3),
        media(4),
    ]));
    assert_eq!(index.find_next_actionable(0), Some(ItemId(1)));
    assert_eq!(index.find_next_actionable(1), Some(ItemId(4)));
    assert_eq!(index.next_actionable_after(ItemId(1)), Some(ItemId(4)));
}

#[test]
fn trailing_run_of_non_actionable_items_yields_none() {
    let index = RundownIndex::new(single_cue(vec![
        media(1),
        note(2),
        block(3, &[30]),
        note(4),
    ]));
    assert_eq!(index.find_next_actionable(1), None);
    assert_eq!(index.find_next_actionable(99), None);

    for from in 0..index.len() {
        if let Some(found) = index.find_next_actionable(from) {
            assert!(is_actionable(index.kind(found).expect("kind")));
        }
    }
}

#[test]
fn overlays_attach_to_preceding_item_and_leave_the_sequence() {
    let index = RundownIndex::new(single_cue(vec![
        media(1),
        overlay(10, 0.0, 3.0, OverlayPersistence::AutoOut),
        overlay(11, 1.0, 3.0, OverlayPersistence::LeaveInLocal),
        media(2),
        overlay(12, 0.0, 0.0, OverlayPersistence::Manual),
    ]));
    assert_eq!(index.len(), 2);
    assert_eq!(index.overlays_for(ItemId(1)), &[ItemId(10), ItemId(11)]);
    assert_eq!(index.overlays_for(ItemId(2)), &[ItemId(12)]);
    assert_eq!(index.position(ItemId(10)), None);
    assert_eq!(
        index.get(ItemId(11)).and_then(|entry| entry.parent_item_id),
        Some(ItemId(1))
    );
    assert_eq!(index.next_actionable_after(ItemId(1)), Some(ItemId(2)));
}

#[test]
fn overlay_runs_do_not_cross_cue_boundaries() {
    let segments = vec![segment(
        1,
        vec![
            cue(1, vec![media(1)]),
            cue(2, vec![overlay(10, 0.0, 1.0, OverlayPersistence::AutoOut), media(2)]),
        ],
    )];
    let index = RundownIndex::new(segments);
    assert!(index.overlays_for(ItemId(1)).is_empty());
    assert_eq!(index.get(ItemId(10)).and_then(|e| e.parent_item_id), None);
}

#[test]
fn manual_items_resolve_to_their_block() {
    let index = RundownIndex::new(single_cue(vec![media(1), block(2, &[20, 21])]));
    assert_eq!(index.manual_parent(ManualItemId(21)), Some(ItemId(2)));
    assert!(!index.contains_manual_item(ManualItemId(99)));
}
