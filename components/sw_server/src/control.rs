//! WebSocket control channel
//!
//! A companion browser extension keeps a socket open and sends
//! `{"type":"navigate"}` just before a top-level page load, plus
//! `{"type":"postMessage","data":...}` to talk to the worker. Messages the
//! worker posts back are broadcast to every open socket.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use lifecycle::LifecycleManager;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use worker_runtime::{Event, MessageEvent};

use crate::server::AppState;

/// A frame received on the control channel
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    /// The next HTTP request is a navigation
    Navigate,
    /// Deliver `data` to the active worker
    PostMessage {
        /// Application payload
        #[serde(default)]
        data: Value,
    },
}

impl ControlMessage {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Serve one control connection until it closes
pub async fn serve_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut queue) = mpsc::unbounded_channel::<String>();
    let id = state.messenger.add(outbound);
    info!(client = id, "control channel connected");

    let writer = tokio::spawn(async move {
        while let Some(text) = queue.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_text(&state, &text),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(client = id, error = %err, "control channel read failed");
                break;
            }
        }
    }

    state.messenger.remove(id);
    writer.abort();
    info!(client = id, "control channel closed");
}

/// Act on one text frame.
///
/// Message delivery runs on its own task, so a frame queued behind a pending
/// activation never holds up the frames after it.
pub fn handle_text(state: &AppState, text: &str) {
    match ControlMessage::parse(text) {
        Ok(ControlMessage::Navigate) => {
            debug!("next request flagged as navigation");
            state.navigation.raise();
        }
        Ok(ControlMessage::PostMessage { data }) => {
            let lifecycle = state.lifecycle.clone();
            tokio::spawn(async move {
                post_message(&lifecycle, data).await;
            });
        }
        Err(err) => warn!(error = %err, frame = %text, "ignoring malformed control message"),
    }
}

/// Deliver `data` to the active worker once any in-flight activation settles.
///
/// Returns `false` when the message was dropped because no worker is active
/// or the worker failed to handle it.
pub async fn post_message(lifecycle: &LifecycleManager, data: Value) -> bool {
    lifecycle.await_activation().await;
    let Some(current) = lifecycle.current() else {
        debug!("no active worker, dropping message");
        return false;
    };
    let (event, _pending) = MessageEvent::new(data);
    match current.instance.dispatch_event(&Event::Message(event)) {
        Ok(()) => true,
        Err(err) => {
            warn!(version = %current.version, error = %err, "message handler failed");
            false
        }
    }
}
