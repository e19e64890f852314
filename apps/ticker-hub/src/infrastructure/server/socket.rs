//! Per-connection task for the push channel.
//!
//! One task per subscriber multiplexes the hub's outbound queue with inbound
//! frames, so writes to a socket never race each other.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::infrastructure::hub::{BroadcastHub, Outbound};

pub(super) async fn serve_subscriber(
    socket: WebSocket,
    hub: Arc<BroadcastHub>,
    cancel: CancellationToken,
) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = hub.outbound_channel();
    let id = hub.on_connect(tx);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                hub.on_disconnect(id);
                break;
            }
            outbound = rx.recv() => {
                let message = match outbound {
                    Some(Outbound::Frame(text)) => Message::Text(text.as_ref().into()),
                    Some(Outbound::Probe) => Message::Ping(Bytes::new()),
                    Some(Outbound::Close) | None => {
                        // Already deregistered by the hub.
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                };
                if let Err(e) = sink.send(message).await {
                    hub.on_error(id, &e.to_string());
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let reply = hub
                            .on_message(id, text.as_str())
                            .and_then(|envelope| envelope.encode().ok());
                        if let Some(reply) = reply
                            && let Err(e) = sink.send(Message::Text(reply.into())).await
                        {
                            hub.on_error(id, &e.to_string());
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => hub.mark_alive(id),
                    Some(Ok(Message::Close(_))) | None => {
                        hub.on_disconnect(id);
                        break;
                    }
                    Some(Ok(Message::Binary(_) | Message::Ping(_))) => {}
                    Some(Err(e)) => {
                        hub.on_error(id, &e.to_string());
                        break;
                    }
                }
            }
        }
    }
}
