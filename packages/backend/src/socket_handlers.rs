// packages/backend/src/socket_handlers.rs
use super::{
    error::TransportError,
    hub::PushChannel,
    session::Session,
    types::{Event, LeaderboardAction, RespondentId, RespondentQuery},
    ServerState,
};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{
    future::BoxFuture,
    stream::{SplitSink, Stream},
    SinkExt, StreamExt,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One inbound frame as seen by the connection loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Text(String),
    Close,
    /// Ping, pong, binary: nothing to do.
    Ignored,
}

/// Outbound half of an axum WebSocket.
pub struct WsPushChannel {
    sink: Mutex<SplitSink<WebSocket, WsMessage>>,
}

impl WsPushChannel {
    pub fn new(sink: SplitSink<WebSocket, WsMessage>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }
}

impl PushChannel for WsPushChannel {
    fn push(&self, frame: Arc<str>) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.sink
                .lock()
                .await
                .send(WsMessage::Text(frame.to_string().into()))
                .await
                .map_err(|e| TransportError::Send(e.to_string()))
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let _ = self.sink.lock().await.close().await;
        })
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
    Query(query): Query<RespondentQuery>,
) -> Response {
    let respondent = query.respondent_or_generate();
    ws.on_upgrade(move |socket| on_socket_connect(socket, state, respondent))
}

pub async fn on_socket_connect(socket: WebSocket, state: ServerState, respondent: RespondentId) {
    let (sink, stream) = socket.split();
    let inbound = stream.map(|msg| match msg {
        Ok(WsMessage::Text(text)) => Ok(Inbound::Text(text.as_str().to_owned())),
        Ok(WsMessage::Close(_)) => Ok(Inbound::Close),
        Ok(_) => Ok(Inbound::Ignored),
        Err(e) => Err(TransportError::Receive(e.to_string())),
    });
    run_connection(&state.session, Arc::new(WsPushChannel::new(sink)), respondent, inbound).await;
}

/// Registers the connection, then reads frames until the peer goes away.
///
/// Malformed frames are dropped one at a time; a transport error or a close
/// frame ends the loop, after which the connection leaves the hub and is closed.
pub async fn run_connection<S>(
    session: &Session,
    conn: Arc<dyn PushChannel>,
    respondent: RespondentId,
    mut inbound: S,
) where
    S: Stream<Item = Result<Inbound, TransportError>> + Unpin,
{
    let (id, live) = session.register_connection(conn.clone()).await;
    info!("🔌 [WS] {} connected as {} ({} live)", id, respondent, live);

    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(Inbound::Text(text)) => handle_frame(session, &respondent, &text).await,
            Ok(Inbound::Ignored) => {}
            Ok(Inbound::Close) => {
                debug!("[WS] {} sent close", id);
                break;
            }
            Err(e) => {
                warn!("⚠️ [WS] {} read failed: {}", id, e);
                break;
            }
        }
    }

    let live = session.unregister_connection(&id).await;
    conn.close().await;
    info!("🔌 [WS] {} disconnected ({} live)", id, live);
}

async fn handle_frame(session: &Session, respondent: &RespondentId, text: &str) {
    let event = match Event::decode(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("❌ [WS] Dropping malformed frame from {}: {}", respondent, e);
            return;
        }
    };

    let action = match &event {
        Event::Emoji(_) => LeaderboardAction::Spawn,
        Event::EmojiPopped(_) => LeaderboardAction::Pop,
        other => {
            debug!("[WS] Ignoring inbound '{}' from {}", other.kind(), respondent);
            return;
        }
    };

    // leaderboard lock is released before the publish can block
    session.record_leaderboard_action(respondent, action).await;
    session.publish_event(event).await;
}
