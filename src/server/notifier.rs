// src/server/notifier.rs

//! Reload notifications over WebSocket and Server-Sent Events.
//!
//! Each connection subscribes to the reload event for as long as it lives.
//! The bus handler only `try_send`s into a one-slot channel, so a slow
//! client has at most one write pending and never stalls the bus workers.

use std::convert::Infallible;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::{debug, info};

use crate::events::{ReloadBus, Subscription, RELOAD_EVENT};
use crate::server::AppState;

/// Subscribe to reloads, forwarding payloads into a one-slot channel.
fn subscribe(bus: &ReloadBus) -> (Subscription<String>, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(1);
    let subscription = bus.on(RELOAD_EVENT, move |event| {
        if tx.try_send(event.payload.clone()).is_err() {
            debug!("client has a notification pending; skipping");
        }
    });
    (subscription, rx)
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(mut socket: WebSocket, state: AppState) {
    let (subscription, mut rx) = subscribe(&state.bus);
    info!("live-reload client connected (ws)");

    loop {
        tokio::select! {
            Some(payload) = rx.recv() => {
                if let Err(e) = socket.send(Message::Text(payload.into())).await {
                    debug!(error = %e, "websocket write failed");
                    break;
                }
            }
            _ = state.shutdown.cancelled() => break,
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "websocket read failed");
                    break;
                }
            },
        }
    }

    subscription.unregister();
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        })))
        .await;
    info!("live-reload client disconnected (ws)");
}

pub async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (subscription, mut rx) = subscribe(&state.bus);
    let shutdown = state.shutdown.clone();
    info!("live-reload client connected (sse)");

    // The stream owns the subscription; it unregisters when the client goes away.
    let stream = async_stream::stream! {
        let _subscription = subscription;
        loop {
            let next = tokio::select! {
                payload = rx.recv() => payload,
                _ = shutdown.cancelled() => None,
            };
            let Some(payload) = next else { break };
            yield Ok::<_, Infallible>(SseEvent::default().data(payload));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
