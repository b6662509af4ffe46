//! Push connection: delivers queued snapshots to the UI

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};

use super::BroadcastQueue;

/// Serve one push connection until the client leaves or the session ends
///
/// A second connection is accepted but waits for the queue until the first
/// one closes, so snapshots are never split between clients.
pub(super) async fn deliver(socket: WebSocket, queue: BroadcastQueue, connections: Arc<AtomicUsize>) {
    let open = connections.fetch_add(1, Ordering::SeqCst) + 1;
    if open > 1 {
        tracing::warn!(
            "{} UI connections open; only one is served, the rest wait for it to close",
            open
        );
    } else {
        tracing::info!("UI connected");
    }

    let (mut sender, mut receiver) = socket.split();

    let mut subscription = tokio::select! {
        subscription = queue.subscribe() => subscription,
        _ = closed(&mut receiver) => {
            connections.fetch_sub(1, Ordering::SeqCst);
            return;
        }
    };

    loop {
        tokio::select! {
            message = subscription.recv() => match message {
                Some(Some(snapshot)) => {
                    let text = match serde_json::to_string(&snapshot) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!("Failed to encode snapshot: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(None) => {
                    // end of a run's stream; keep serving the next run
                    tracing::debug!("Run stream ended");
                }
                None => {
                    tracing::debug!("Session dropped, closing push connection");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    connections.fetch_sub(1, Ordering::SeqCst);
    tracing::info!("UI disconnected");
}

/// Resolves once the client closes its side
async fn closed(receiver: &mut SplitStream<WebSocket>) {
    while let Some(Ok(message)) = receiver.next().await {
        if let Message::Close(_) = message {
            break;
        }
    }
}
