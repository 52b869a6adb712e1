use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;
use uuid::Uuid;

use crate::{
    dto::sse::{ControlHandshake, Handshake, ServerEvent},
    error::ServiceError,
    state::SharedState,
};

const EVENT_CONTROL_TOKEN: &str = "control_token";
const EVENT_INFO: &str = "info";
const EVENT_HANDSHAKE: &str = "handshake";

pub fn subscribe_public(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.public_sse().subscribe()
}

/// Subscribe to the control stream, claiming the control token.
pub async fn subscribe_control(
    state: &SharedState,
) -> Result<(broadcast::Receiver<ServerEvent>, String), ServiceError> {
    let token = claim_control_token(state).await?;
    let receiver = state.control_sse().subscribe();
    Ok((receiver, token))
}

/// Target stream, so teardown can release the control token.
#[derive(Clone)]
pub enum StreamKind {
    Public,
    Control(SharedState),
}

/// Events sent to one subscriber only, before anything broadcast.
pub async fn initial_events(
    state: &SharedState,
    stream: &str,
    token: Option<&str>,
) -> Vec<ServerEvent> {
    let handshake = Handshake {
        stream: stream.to_string(),
        message: format!("{stream} stream connected"),
        degraded: state.is_degraded().await,
    };

    let mut events: Vec<ServerEvent> = ServerEvent::json(EVENT_HANDSHAKE, &handshake)
        .into_iter()
        .collect();

    if let Some(token) = token {
        let token = ControlHandshake {
            token: token.to_string(),
        };
        events.extend(ServerEvent::json(EVENT_CONTROL_TOKEN, &token));
    }

    events
}

/// Turn a broadcast receiver into an SSE response. `initial` events are sent
/// first to this subscriber only.
pub fn to_sse_stream(
    initial: Vec<ServerEvent>,
    mut receiver: broadcast::Receiver<ServerEvent>,
    kind: StreamKind,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let mut open = true;
        for payload in initial {
            if tx.send(Ok(to_event(payload))).await.is_err() {
                open = false;
                break;
            }
        }

        while open {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        // Slow subscribers skip what they missed.
                        Err(RecvError::Lagged(_)) => continue,
                    }
                }
            }
        }

        match kind {
            StreamKind::Public => info!("public SSE stream disconnected"),
            StreamKind::Control(state) => {
                release_control_token(state).await;
                info!("control SSE stream disconnected")
            }
        }
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    Event::default().event(payload.name).data(payload.data)
}

/// Reserve the control token, failing while another client holds it.
async fn claim_control_token(state: &SharedState) -> Result<String, ServiceError> {
    let mut guard = state.control_token().lock().await;
    match &mut *guard {
        slot @ None => {
            let token = Uuid::new_v4().simple().to_string();
            slot.replace(token.clone());
            Ok(token)
        }
        Some(_) => Err(ServiceError::Unauthorized(
            "another control stream is already active".into(),
        )),
    }
}

/// Send a human-readable message on the public stream.
pub fn broadcast_public_info(state: &SharedState, message: &str) {
    state
        .public_sse()
        .broadcast(ServerEvent::text(EVENT_INFO, message));
}

async fn release_control_token(state: SharedState) {
    let mut guard = state.control_token().lock().await;
    guard.take();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    #[tokio::test]
    async fn only_one_control_subscriber_at_a_time() {
        let state = AppState::new();
        let (_receiver, token) = subscribe_control(&state).await.unwrap();
        assert!(!token.is_empty());

        assert!(matches!(
            subscribe_control(&state).await,
            Err(ServiceError::Unauthorized(_))
        ));

        release_control_token(state.clone()).await;
        assert!(subscribe_control(&state).await.is_ok());
    }

    #[tokio::test]
    async fn control_subscriber_gets_its_token_first() {
        let state = AppState::new();
        let events = initial_events(&state, "control", Some("abc")).await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "handshake");
        assert_eq!(events[1].name, "control_token");
        assert!(events[1].data.contains("abc"));
    }
}
