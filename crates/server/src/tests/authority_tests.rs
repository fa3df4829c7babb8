use super::*;
use chrono::Duration as ChronoDuration;
use shared::{
    domain::{AutomationMode, Cue, CueId, ItemId, ItemKind, RundownItem, SegmentId},
    protocol::{Button, TimerPulse},
};

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000).expect("ts")
}

fn at_ms(ms: i64) -> DateTime<Utc> {
    t0() + ChronoDuration::milliseconds(ms)
}

fn media(id: i64, auto_seconds: Option<f64>) -> RundownItem {
    RundownItem {
        id: ItemId(id),
        kind: ItemKind::StandardMedia,
        cue_id: CueId(1),
        title: format!("item {id}"),
        automation_mode: if auto_seconds.is_some() {
            AutomationMode::Auto
        } else {
            AutomationMode::Manual
        },
        automation_duration_seconds: auto_seconds.unwrap_or(0.0),
        overlay: None,
        manual_items: Vec::new(),
    }
}

fn rundown(items: Vec<RundownItem>) -> Vec<Segment> {
    vec![Segment {
        id: SegmentId(1),
        title: "opener".to_string(),
        allotted_time_seconds: 60,
        cues: vec![Cue {
            id: CueId(1),
            title: String::new(),
            items,
        }],
    }]
}

fn authority() -> (
    Authority,
    Arc<ScratchSpace>,
    mpsc::UnboundedReceiver<SceneCommand>,
) {
    let scratch = Arc::new(ScratchSpace::new());
    let (scene_tx, scene_rx) = mpsc::unbounded_channel();
    let mut authority = Authority::new(
        ChronoDuration::milliseconds(5_000),
        None,
        scratch.clone(),
        scene_tx,
    );
    authority.load_episode(
        EpisodeId(1),
        rundown(vec![media(1, None), media(2, Some(2.0)), media(3, None)]),
    );
    (authority, scratch, scene_rx)
}

fn next_at(ms: i64) -> ActionEnvelope {
    ActionEnvelope::new(Button::Next, at_ms(ms))
}

fn current(authority: &Authority) -> Option<ItemId> {
    authority.engine().state().current_item_id
}

#[test]
fn stale_action_changes_nothing_and_publishes_nothing() {
    let (mut authority, _scratch, _scene) = authority();
    let mut frames = authority.subscribe();
    let before = authority.engine().state().clone();

    let result = authority.apply_action(next_at(0), ActionSource::Socket, at_ms(5_001));
    assert!(matches!(result, Err(ActionRejected::Stale { .. })));
    assert_eq!(authority.engine().state(), &before);
    assert_eq!(authority.gate().last_processed(), None);
    assert!(frames.try_recv().is_err());
}

#[test]
fn racing_advances_both_apply_in_arrival_order() {
    let (mut authority, _scratch, _scene) = authority();
    let mut frames = authority.subscribe();

    authority
        .apply_action(next_at(100), ActionSource::Socket, at_ms(150))
        .expect("first");
    authority
        .apply_action(next_at(101), ActionSource::Socket, at_ms(150))
        .expect("second");

    assert_eq!(current(&authority), Some(ItemId(2)));
    for expected in [ItemId(1), ItemId(2)] {
        match frames.try_recv().expect("state frame") {
            SyncMessage::State(snapshot) => {
                assert_eq!(snapshot.state.current_item_id, Some(expected))
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

#[test]
fn replayed_action_is_discarded() {
    let (mut authority, _scratch, _scene) = authority();
    authority
        .apply_action(next_at(100), ActionSource::Socket, at_ms(150))
        .expect("first");
    let replay = authority.apply_action(next_at(100), ActionSource::Scratch, at_ms(400));
    assert!(matches!(replay, Err(ActionRejected::Duplicate { .. })));
    assert_eq!(current(&authority), Some(ItemId(1)));
}

#[test]
fn cuts_reach_the_scene_dispatcher() {
    let (mut authority, _scratch, mut scene) = authority();
    authority
        .apply_action(next_at(0), ActionSource::Socket, at_ms(10))
        .expect("advance");
    assert_eq!(
        scene.try_recv().expect("cut"),
        SceneCommand::Cut {
            item_id: Some(ItemId(1)),
            manual_item_id: None,
            transition: None,
        }
    );
}

#[test]
fn automation_expiry_is_published_from_tick() {
    let (mut authority, _scratch, _scene) = authority();
    authority
        .apply_action(next_at(0), ActionSource::Socket, at_ms(0))
        .expect("to 1");
    authority
        .apply_action(next_at(1), ActionSource::Socket, at_ms(1))
        .expect("to 2");
    let mut frames = authority.subscribe();

    authority.tick(at_ms(1_500));
    assert!(frames.try_recv().is_err());
    authority.tick(at_ms(2_001));
    assert_eq!(current(&authority), Some(ItemId(3)));
    assert!(matches!(frames.try_recv(), Ok(SyncMessage::State(_))));
}

#[test]
fn scratch_actions_drain_through_the_gate() {
    let (mut authority, scratch, _scene) = authority();
    scratch.post_action(next_at(10));
    scratch.post_action(next_at(10));
    authority.drain_scratch(at_ms(50));

    assert_eq!(current(&authority), Some(ItemId(1)));
    let frames = scratch.read_frames();
    match &frames[0] {
        SyncMessage::State(snapshot) => assert_eq!(snapshot.state.current_item_id, Some(ItemId(1))),
        other => panic!("unexpected frame {other:?}"),
    }
}

#[test]
fn pulse_reaches_every_tier() {
    let scratch = Arc::new(ScratchSpace::new());
    let (scene_tx, _scene_rx) = mpsc::unbounded_channel();
    let (bus, _bus_actions) = LocalBus::new(8);
    let mut authority = Authority::new(
        ChronoDuration::milliseconds(5_000),
        Some(bus.clone()),
        scratch.clone(),
        scene_tx,
    );
    authority.load_episode(EpisodeId(1), rundown(vec![media(1, None)]));
    authority
        .apply_action(next_at(0), ActionSource::LocalBus, at_ms(0))
        .expect("advance");
    let (_, mut bus_frames) = bus.subscribe();
    let mut frames = authority.subscribe();

    authority.pulse(at_ms(3_000));
    let expected = SyncMessage::Timer(TimerPulse {
        elapsed_seconds: 3.0,
        is_running: true,
    });
    assert_eq!(frames.try_recv().expect("socket frame"), expected);
    assert_eq!(bus_frames.try_recv().expect("bus frame"), expected);
    assert_eq!(scratch.read_frames().last(), Some(&expected));
}

#[test]
fn refresh_keeps_episode_and_drops_vanished_preview() {
    let (mut authority, _scratch, _scene) = authority();
    authority
        .apply_action(next_at(0), ActionSource::Socket, at_ms(0))
        .expect("advance");
    let snapshot = authority.refresh(rundown(vec![media(1, None)]), at_ms(100));
    assert_eq!(snapshot.current_episode_id, Some(EpisodeId(1)));
    assert_eq!(snapshot.state.current_item_id, Some(ItemId(1)));
    assert_eq!(snapshot.state.preview_item_id, None);
}

#[tokio::test]
async fn spawned_authority_serves_local_bus_actions() {
    let (bus, bus_actions) = LocalBus::new(8);
    let (scene_tx, _scene_rx) = mpsc::unbounded_channel();
    let config = AuthorityConfig {
        tick_interval: Duration::from_millis(10),
        pulse_interval: Duration::from_millis(50),
        scratch_poll: Duration::from_millis(10),
        ..AuthorityConfig::default()
    };
    let handle = spawn_authority(
        config,
        Some((bus.clone(), bus_actions)),
        Arc::new(ScratchSpace::new()),
        scene_tx,
    );

    let loaded = handle
        .load_episode(EpisodeId(4), rundown(vec![media(1, None), media(2, None)]))
        .await
        .expect("load");
    assert!(loaded.state.stopped);
    assert_eq!(handle.current_episode(), Some(EpisodeId(4)));

    bus.send_action(ActionEnvelope::new(Button::Next, Utc::now()))
        .await
        .expect("send");
    for _ in 0..100 {
        if handle.latest().state.current_item_id == Some(ItemId(1)) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("local bus action never applied");
}
