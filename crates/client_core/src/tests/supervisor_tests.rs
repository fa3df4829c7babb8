use super::*;
use crate::transport::TransportError;
use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::SurfaceRole,
    protocol::{Button, TimerPulse},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};
use tokio_stream::wrappers::UnboundedReceiverStream;

struct FakeTransport {
    tier: Tier,
    up: AtomicBool,
    accepts_sends: AtomicBool,
    link: Mutex<Option<mpsc::UnboundedSender<SyncMessage>>>,
    sent: Mutex<Vec<ActionEnvelope>>,
}

impl FakeTransport {
    fn new(tier: Tier, up: bool) -> Arc<Self> {
        Arc::new(Self {
            tier,
            up: AtomicBool::new(up),
            accepts_sends: AtomicBool::new(true),
            link: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn push(&self, frame: SyncMessage) -> bool {
        self.link
            .lock()
            .unwrap()
            .as_ref()
            .map(|tx| tx.send(frame).is_ok())
            .unwrap_or(false)
    }

    fn go_down(&self) {
        self.up.store(false, Ordering::SeqCst);
        self.link.lock().unwrap().take();
    }

    fn come_up(&self) {
        self.up.store(true, Ordering::SeqCst);
    }

    fn sent(&self) -> Vec<Button> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|action| action.button)
            .collect()
    }
}

#[async_trait]
impl SyncTransport for FakeTransport {
    fn tier(&self) -> Tier {
        self.tier
    }

    async fn is_available(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    async fn subscribe(&self, _subscription: Subscription) -> Result<FrameStream, TransportError> {
        if !self.up.load(Ordering::SeqCst) {
            return Err(TransportError::unavailable(self.tier, "down"));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.link.lock().unwrap() = Some(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn send(&self, action: ActionEnvelope) -> Result<(), TransportError> {
        if !self.up.load(Ordering::SeqCst) || !self.accepts_sends.load(Ordering::SeqCst) {
            return Err(TransportError::unavailable(self.tier, "down"));
        }
        self.sent.lock().unwrap().push(action);
        Ok(())
    }
}

fn config() -> SupervisorConfig {
    SupervisorConfig {
        poll_interval: Duration::from_millis(10),
        promote_probe: Duration::from_millis(20),
        reconnect_backoff: Duration::from_millis(10),
    }
}

fn pad() -> Subscription {
    Subscription {
        role: SurfaceRole::Pad,
        episode_id: None,
    }
}

fn supervise(rungs: Vec<Arc<FakeTransport>>) -> SupervisorHandle {
    let rungs = rungs
        .into_iter()
        .map(|rung| rung as Arc<dyn SyncTransport>)
        .collect();
    SyncSupervisor::new(TierLadder::new(rungs), pad(), config()).spawn()
}

async fn next(handle: &mut SupervisorHandle) -> FollowerEvent {
    tokio::time::timeout(Duration::from_secs(2), handle.next_event())
        .await
        .expect("event before timeout")
        .expect("supervisor running")
}

async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held");
}

#[test]
fn ladder_orders_by_preference_and_keeps_one_rung_per_tier() {
    let rungs: Vec<Arc<dyn SyncTransport>> = vec![
        FakeTransport::new(Tier::Polling, true),
        FakeTransport::new(Tier::Socket, true),
        FakeTransport::new(Tier::LocalBus, true),
        FakeTransport::new(Tier::Socket, false),
    ];
    let ladder = TierLadder::new(rungs);
    assert_eq!(ladder.tiers(), vec![Tier::Socket, Tier::LocalBus, Tier::Polling]);
    assert_eq!(ladder.top(), Some(Tier::Socket));
    let above: Vec<Tier> = ladder.above(Tier::Polling).map(|rung| rung.tier()).collect();
    assert_eq!(above, vec![Tier::Socket, Tier::LocalBus]);
    let below: Vec<Tier> = ladder.below(Tier::Socket).map(|rung| rung.tier()).collect();
    assert_eq!(below, vec![Tier::LocalBus, Tier::Polling]);
}

#[tokio::test]
async fn connects_to_the_highest_available_tier() {
    let socket = FakeTransport::new(Tier::Socket, false);
    let bus = FakeTransport::new(Tier::LocalBus, true);
    let polling = FakeTransport::new(Tier::Polling, true);
    let mut handle = supervise(vec![polling, bus.clone(), socket]);

    assert_eq!(next(&mut handle).await, FollowerEvent::Connected(Tier::LocalBus));

    let pulse = SyncMessage::Timer(TimerPulse {
        elapsed_seconds: 2.0,
        is_running: true,
    });
    assert!(bus.push(pulse.clone()));
    assert_eq!(next(&mut handle).await, FollowerEvent::Frame(pulse));
}

#[tokio::test]
async fn lost_link_demotes_and_recovery_promotes() {
    let socket = FakeTransport::new(Tier::Socket, true);
    let polling = FakeTransport::new(Tier::Polling, true);
    let mut handle = supervise(vec![socket.clone(), polling.clone()]);
    assert_eq!(next(&mut handle).await, FollowerEvent::Connected(Tier::Socket));

    socket.go_down();
    assert_eq!(next(&mut handle).await, FollowerEvent::Connected(Tier::Polling));

    socket.come_up();
    assert_eq!(next(&mut handle).await, FollowerEvent::Connected(Tier::Socket));

    handle
        .send(ActionEnvelope::new(Button::Next, Utc::now()))
        .await
        .expect("send");
    wait_until(|| socket.sent() == vec![Button::Next]).await;
    assert!(polling.sent().is_empty());
}

#[tokio::test]
async fn failed_send_falls_back_to_a_lower_tier() {
    let socket = FakeTransport::new(Tier::Socket, true);
    let polling = FakeTransport::new(Tier::Polling, true);
    let mut handle = supervise(vec![socket.clone(), polling.clone()]);
    assert_eq!(next(&mut handle).await, FollowerEvent::Connected(Tier::Socket));

    socket.accepts_sends.store(false, Ordering::SeqCst);
    handle
        .send(ActionEnvelope::new(Button::Stop, Utc::now()))
        .await
        .expect("send");
    wait_until(|| polling.sent() == vec![Button::Stop]).await;
    assert!(socket.sent().is_empty());
}

#[tokio::test]
async fn all_tiers_down_is_reported_once_until_a_tier_returns() {
    let socket = FakeTransport::new(Tier::Socket, false);
    let polling = FakeTransport::new(Tier::Polling, false);
    let mut handle = supervise(vec![socket, polling.clone()]);

    assert_eq!(next(&mut handle).await, FollowerEvent::Disconnected);
    tokio::time::sleep(Duration::from_millis(50)).await;
    polling.come_up();
    assert_eq!(next(&mut handle).await, FollowerEvent::Connected(Tier::Polling));
}
