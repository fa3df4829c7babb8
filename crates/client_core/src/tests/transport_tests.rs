use super::*;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use futures::StreamExt;
use server::config::Settings;
use shared::{
    bus::LocalBus,
    domain::{AutomationMode, Cue, CueId, EpisodeId, ItemId, ItemKind, RundownItem, Segment, SegmentId, SurfaceRole},
    protocol::{Button, Snapshot, TimerPulse},
    state::ExecutionState,
};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use storage::StaticContent;
use tokio::net::TcpListener;

fn snapshot(episode: i64) -> Snapshot {
    Snapshot {
        state: ExecutionState::stopped(),
        segments: Vec::new(),
        current_episode_id: Some(EpisodeId(episode)),
    }
}

fn pulse(elapsed_seconds: f64) -> TimerPulse {
    TimerPulse {
        elapsed_seconds,
        is_running: true,
    }
}

fn pad() -> Subscription {
    Subscription {
        role: SurfaceRole::Pad,
        episode_id: None,
    }
}

fn rundown() -> Vec<Segment> {
    vec![Segment {
        id: SegmentId(1),
        title: "open".into(),
        allotted_time_seconds: 60,
        cues: vec![Cue {
            id: CueId(1),
            title: String::new(),
            items: [1, 2]
                .into_iter()
                .map(|id| RundownItem {
                    id: ItemId(id),
                    kind: ItemKind::StandardMedia,
                    cue_id: CueId(1),
                    title: format!("item {id}"),
                    automation_mode: AutomationMode::Manual,
                    automation_duration_seconds: 0.0,
                    overlay: None,
                    manual_items: Vec::new(),
                })
                .collect(),
        }],
    }]
}

async fn next(frames: &mut FrameStream) -> Option<SyncMessage> {
    tokio::time::timeout(Duration::from_secs(2), frames.next())
        .await
        .expect("frame before timeout")
}

#[test]
fn http_urls_map_to_socket_urls() {
    assert_eq!(
        http_to_ws("http://127.0.0.1:8787/").as_deref(),
        Some("ws://127.0.0.1:8787")
    );
    assert_eq!(
        http_to_ws("https://rundown.example").as_deref(),
        Some("wss://rundown.example")
    );
    assert_eq!(http_to_ws("ftp://nope"), None);
    assert!(WebSocketTransport::new("127.0.0.1:8787").is_err());
}

#[test]
fn presenter_filter_only_applies_to_state_frames() {
    let presenter = Subscription {
        role: SurfaceRole::Presenter,
        episode_id: Some(EpisodeId(1)),
    };
    assert!(accepts(&presenter, &SyncMessage::State(snapshot(1))));
    assert!(!accepts(&presenter, &SyncMessage::State(snapshot(2))));
    assert!(accepts(&presenter, &SyncMessage::Timer(pulse(1.0))));
    assert!(!accepts(
        &presenter,
        &SyncMessage::Action(ActionEnvelope::new(Button::Next, Utc::now()))
    ));
}

#[tokio::test]
async fn local_bus_replays_latest_state_then_follows_live_frames() {
    let (bus, mut actions) = LocalBus::new(16);
    bus.publish(SyncMessage::State(snapshot(1)));
    let transport = LocalBusTransport::new(bus.clone());
    assert!(transport.is_available().await);

    let mut frames = transport.subscribe(pad()).await.expect("subscribe");
    assert_eq!(next(&mut frames).await, Some(SyncMessage::State(snapshot(1))));
    bus.publish(SyncMessage::Timer(pulse(3.0)));
    assert_eq!(next(&mut frames).await, Some(SyncMessage::Timer(pulse(3.0))));

    transport
        .send(ActionEnvelope::new(Button::Next, Utc::now()))
        .await
        .expect("send");
    assert_eq!(actions.recv().await.map(|a| a.button), Some(Button::Next));

    drop(actions);
    assert_eq!(next(&mut frames).await, None);
    assert!(!transport.is_available().await);
    assert!(transport
        .send(ActionEnvelope::new(Button::Stop, Utc::now()))
        .await
        .is_err());
}

#[tokio::test]
async fn local_bus_applies_the_presenter_filter() {
    let (bus, _actions) = LocalBus::new(16);
    let transport = LocalBusTransport::new(bus.clone());
    let mut frames = transport
        .subscribe(Subscription {
            role: SurfaceRole::Presenter,
            episode_id: Some(EpisodeId(2)),
        })
        .await
        .expect("subscribe");

    bus.publish(SyncMessage::State(snapshot(1)));
    bus.publish(SyncMessage::State(snapshot(2)));
    assert_eq!(next(&mut frames).await, Some(SyncMessage::State(snapshot(2))));
}

#[derive(Clone, Default)]
struct Scratch {
    frames: Arc<Mutex<Vec<SyncMessage>>>,
    posted: Arc<Mutex<Vec<ActionEnvelope>>>,
}

async fn scratch_server(scratch: Scratch) -> String {
    async fn frames(State(scratch): State<Scratch>) -> Result<Json<Vec<SyncMessage>>, StatusCode> {
        let frames = scratch.frames.lock().unwrap().clone();
        if frames.is_empty() {
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
        Ok(Json(frames))
    }
    async fn post(State(scratch): State<Scratch>, Json(action): Json<ActionEnvelope>) -> StatusCode {
        scratch.posted.lock().unwrap().push(action);
        StatusCode::ACCEPTED
    }

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/scratch/state", get(frames))
        .route("/scratch/actions", axum::routing::post(post))
        .with_state(scratch);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("http://{addr}")
}

#[tokio::test]
async fn polling_yields_only_changed_frames() {
    let scratch = Scratch::default();
    let url = scratch_server(scratch.clone()).await;
    let transport =
        PollingTransport::with_interval(&url, Duration::from_millis(10)).expect("transport");
    assert!(transport.is_available().await);

    let mut frames = transport.subscribe(pad()).await.expect("subscribe");
    *scratch.frames.lock().unwrap() = vec![
        SyncMessage::State(snapshot(1)),
        SyncMessage::Timer(pulse(1.0)),
    ];
    assert_eq!(next(&mut frames).await, Some(SyncMessage::State(snapshot(1))));
    assert_eq!(next(&mut frames).await, Some(SyncMessage::Timer(pulse(1.0))));

    *scratch.frames.lock().unwrap() = vec![
        SyncMessage::State(snapshot(1)),
        SyncMessage::Timer(pulse(2.0)),
    ];
    assert_eq!(next(&mut frames).await, Some(SyncMessage::Timer(pulse(2.0))));
    assert!(
        tokio::time::timeout(Duration::from_millis(100), frames.next())
            .await
            .is_err(),
        "unchanged frames must not repeat"
    );

    transport
        .send(ActionEnvelope::new(Button::Pause, Utc::now()))
        .await
        .expect("post");
    assert_eq!(scratch.posted.lock().unwrap()[0].button, Button::Pause);
}

#[tokio::test]
async fn unreachable_scratch_space_is_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let transport = PollingTransport::new(&format!("http://{addr}")).expect("transport");
    assert!(!transport.is_available().await);
    assert!(matches!(
        transport.subscribe(pad()).await,
        Err(TransportError::Unavailable {
            tier: Tier::Polling,
            ..
        })
    ));
}

#[tokio::test]
async fn socket_round_trip_against_a_running_authority() {
    let settings = Settings {
        server_bind: "127.0.0.1:0".into(),
        episode_id: Some(EpisodeId(1)),
        ..Settings::default()
    };
    let content = StaticContent::new().with_episode(EpisodeId(1), rundown());
    let running = server::start_with_content(settings, Arc::new(content))
        .await
        .expect("server");
    let transport =
        WebSocketTransport::new(&format!("http://{}", running.local_addr)).expect("transport");
    assert!(transport.is_available().await);
    assert!(matches!(
        transport
            .send(ActionEnvelope::new(Button::Next, Utc::now()))
            .await,
        Err(TransportError::NotSubscribed(Tier::Socket))
    ));

    let mut frames = transport.subscribe(pad()).await.expect("subscribe");
    let Some(SyncMessage::State(first)) = next(&mut frames).await else {
        panic!("expected the current snapshot first");
    };
    assert_eq!(first.current_episode_id, Some(EpisodeId(1)));
    assert_eq!(first.state.current_item_id, None);

    transport
        .send(ActionEnvelope::new(Button::Next, Utc::now()))
        .await
        .expect("send");
    loop {
        match next(&mut frames).await {
            Some(SyncMessage::State(snapshot)) => {
                assert_eq!(snapshot.state.current_item_id, Some(ItemId(1)));
                assert_eq!(snapshot.state.preview_item_id, Some(ItemId(2)));
                break;
            }
            Some(_) => continue,
            None => panic!("socket closed"),
        }
    }
    running.shutdown();
}
