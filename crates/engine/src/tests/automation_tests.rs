use super::*;
use crate::fixtures::*;

#[test]
fn manual_items_never_start_a_countdown() {
    let mut scheduler = AutomationScheduler::new();
    scheduler.start(&media(1), t0());
    assert_eq!(scheduler.phase(), CountdownPhase::Idle);
    assert_eq!(scheduler.tick(at(100.0)), None);
}

#[test]
fn expiry_uses_the_absolute_deadline_and_fires_once() {
    let mut scheduler = AutomationScheduler::new();
    scheduler.start(&auto_media(1, 5.0), t0());
    assert_eq!(scheduler.phase(), CountdownPhase::Running);

    assert_eq!(scheduler.tick(at(4.9)), None);
    assert_eq!(scheduler.display_remaining(), Some(0.1));

    assert_eq!(scheduler.tick(at(5.05)), Some(ItemId(1)));
    assert_eq!(scheduler.phase(), CountdownPhase::Expired);
    assert_eq!(scheduler.tick(at(6.0)), None);

    scheduler.supersede();
    assert_eq!(scheduler.phase(), CountdownPhase::Superseded);
}

#[test]
fn pause_captures_remaining_and_resume_does_not_reset() {
    let mut scheduler = AutomationScheduler::new();
    scheduler.start(&auto_media(1, 10.0), t0());

    let remaining = scheduler.pause(at(3.0)).expect("remaining");
    assert!((remaining - 7.0).abs() < 0.11, "remaining was {remaining}");
    assert_eq!(scheduler.phase(), CountdownPhase::Paused);
    assert_eq!(scheduler.tick(at(60.0)), None, "paused countdown never expires");

    scheduler.resume(at(60.0));
    assert_eq!(scheduler.remaining(at(60.0)), Some(7.0));
    assert_eq!(scheduler.tick(at(66.9)), None);
    assert_eq!(scheduler.tick(at(67.0)), Some(ItemId(1)));
}

#[test]
fn starting_a_new_item_supersedes_the_previous_timer() {
    let mut scheduler = AutomationScheduler::new();
    scheduler.start(&auto_media(1, 5.0), t0());
    scheduler.start(&auto_media(2, 8.0), at(2.0));
    assert_eq!(scheduler.item_id(), Some(ItemId(2)));
    assert_eq!(scheduler.tick(at(6.0)), None);
    assert_eq!(scheduler.tick(at(10.0)), Some(ItemId(2)));

    scheduler.start(&auto_media(3, 5.0), at(10.0));
    scheduler.start(&media(4), at(11.0));
    assert_eq!(scheduler.phase(), CountdownPhase::Idle);
    assert_eq!(scheduler.tick(at(30.0)), None);
}
