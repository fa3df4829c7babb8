use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use shared::{
    domain::EpisodeId,
    error::{ApiError, ErrorCode},
    protocol::{ActionEnvelope, Snapshot, Subscription, SyncMessage},
};
use tokio::sync::{broadcast::error::RecvError, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{app_state::AppState, authority::ActionSource};

type HttpError = (StatusCode, Json<ApiError>);

pub(crate) fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/state", get(current_state))
        .route("/scratch/state", get(scratch_frames))
        .route("/scratch/actions", post(scratch_action))
        .route("/episodes/:episode_id/load", post(load_episode))
        .route("/rundown/refresh", post(refresh_rundown))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn current_state(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.authority.latest())
}

async fn scratch_frames(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SyncMessage>>, HttpError> {
    let frames = state.scratch.read_frames();
    if frames.is_empty() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::unavailable("no state published yet")),
        ));
    }
    Ok(Json(frames))
}

async fn scratch_action(
    State(state): State<Arc<AppState>>,
    Json(action): Json<ActionEnvelope>,
) -> StatusCode {
    debug!(button = ?action.button, "action posted to scratch space");
    state.scratch.post_action(action);
    StatusCode::ACCEPTED
}

async fn load_episode(
    State(state): State<Arc<AppState>>,
    Path(episode_id): Path<i64>,
) -> Result<Json<Snapshot>, HttpError> {
    let episode_id = EpisodeId(episode_id);
    let exists = state
        .content
        .has_episode(episode_id)
        .await
        .map_err(unavailable)?;
    if !exists {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiError::not_found(format!(
                "episode {} not found",
                episode_id.0
            ))),
        ));
    }
    let segments = state
        .content
        .get_segments(episode_id)
        .await
        .map_err(unavailable)?;
    let snapshot = state
        .authority
        .load_episode(episode_id, segments)
        .await
        .map_err(internal)?;
    info!(episode_id = episode_id.0, "episode loaded over http");
    Ok(Json(snapshot))
}

async fn refresh_rundown(State(state): State<Arc<AppState>>) -> Result<Json<Snapshot>, HttpError> {
    let Some(episode_id) = state.authority.current_episode() else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(ErrorCode::Validation, "no episode loaded")),
        ));
    };
    let segments = state
        .content
        .get_segments(episode_id)
        .await
        .map_err(unavailable)?;
    let snapshot = state.authority.refresh(segments).await.map_err(internal)?;
    Ok(Json(snapshot))
}

fn unavailable(error: anyhow::Error) -> HttpError {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ApiError::unavailable(format!("content source: {error:#}"))),
    )
}

fn internal(error: anyhow::Error) -> HttpError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::internal(error.to_string())),
    )
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

/// First frame must be `SUBSCRIBE`. After that the follower gets the current
/// snapshot, then every frame its subscription accepts, and may send actions.
async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let connection_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    let subscription = loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => match SyncMessage::from_text(&text) {
                Ok(SyncMessage::Subscribe(subscription)) => break subscription,
                Ok(_) => debug!(%connection_id, "frame before subscribe ignored"),
                Err(error) => warn!(%connection_id, %error, "malformed frame"),
            },
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
            Some(Ok(_)) => {}
        }
    };
    info!(%connection_id, role = ?subscription.role, episode_id = ?subscription.episode_id.map(|e| e.0), "follower subscribed");

    let (subscription_tx, subscription_rx) = watch::channel(subscription);
    let authority = state.authority.clone();
    let send_task = tokio::spawn(async move {
        let mut frames = authority.subscribe();
        let mut subscription_rx = subscription_rx;
        if !send_snapshot(&mut sender, &subscription_rx, authority.latest()).await {
            return;
        }
        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Ok(SyncMessage::State(snapshot)) => {
                        if !send_snapshot(&mut sender, &subscription_rx, snapshot).await {
                            break;
                        }
                    }
                    Ok(frame) => {
                        if !send_frame(&mut sender, &frame).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%connection_id, skipped, "follower lagging; resending latest state");
                        if !send_snapshot(&mut sender, &subscription_rx, authority.latest()).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                changed = subscription_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if !send_snapshot(&mut sender, &subscription_rx, authority.latest()).await {
                        break;
                    }
                }
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match SyncMessage::from_text(&text) {
            Ok(SyncMessage::Action(action)) => {
                if state
                    .authority
                    .submit(action, ActionSource::Socket)
                    .await
                    .is_err()
                {
                    warn!(%connection_id, "authority unavailable; dropping action");
                    break;
                }
            }
            Ok(SyncMessage::Subscribe(subscription)) => {
                debug!(%connection_id, role = ?subscription.role, "subscription changed");
                subscription_tx.send_replace(subscription);
            }
            Ok(_) => debug!(%connection_id, "unexpected frame from follower"),
            Err(error) => warn!(%connection_id, %error, "malformed frame"),
        }
    }

    send_task.abort();
    info!(%connection_id, "follower disconnected");
}

type WsSender = SplitSink<WebSocket, Message>;

async fn send_snapshot(
    sender: &mut WsSender,
    subscription: &watch::Receiver<Subscription>,
    snapshot: Snapshot,
) -> bool {
    if !subscription.borrow().accepts(&snapshot) {
        return true;
    }
    send_frame(sender, &SyncMessage::State(snapshot)).await
}

async fn send_frame(sender: &mut WsSender, frame: &SyncMessage) -> bool {
    let text = match frame.to_text() {
        Ok(text) => text,
        Err(error) => {
            warn!(%error, "failed to encode frame");
            return true;
        }
    };
    sender.send(Message::Text(text)).await.is_ok()
}

#[cfg(test)]
#[path = "tests/routes_tests.rs"]
mod tests;
