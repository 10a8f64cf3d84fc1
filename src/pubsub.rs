//! Subscription streamer (module F): turns a SUBSCRIBE/PSUBSCRIBE request
//! into a chunked HTTP response body that emits one JSON array per
//! incoming message. Grounded on `cmd.c::pubsub_client` for the framing
//! and `server.c::server_copy`'s "clone the session" pattern for
//! connection isolation, re-grounded on the `redis` crate's native
//! `get_async_pubsub()`.

use crate::error::GatewayError;
use crate::upstream::Upstream;
use async_stream::stream;
use axum::body::{Body, Bytes};
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Whether the subscribe call should use PSUBSCRIBE (pattern) or
/// SUBSCRIBE (exact channel name) framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeKind {
    Channel,
    Pattern,
}

/// Builds the streamed response body for a SUBSCRIBE/PSUBSCRIBE command.
/// `channels` is argv[1..] — one or more channel/pattern names. Each
/// upstream message becomes a chunk shaped
/// `{"VERB":["message", channel, payload]}\n` (plain strings, not the
/// bool-wrapped pairs the general JSON formatter uses — this is the
/// dedicated pub/sub shape spec.md calls out separately from 4.D).
pub async fn stream_body(
    upstream: Arc<Upstream>,
    verb_upper: String,
    kind: SubscribeKind,
    channels: Vec<Vec<u8>>,
) -> Result<Body, GatewayError> {
    let mut pubsub = upstream.open_pubsub().await?;

    for channel in &channels {
        let name = String::from_utf8_lossy(channel).into_owned();
        match kind {
            SubscribeKind::Channel => pubsub.subscribe(&name).await?,
            SubscribeKind::Pattern => pubsub.psubscribe(&name).await?,
        }
    }

    let body_stream = stream! {
        let mut messages = pubsub.into_on_message();
        loop {
            match messages.next().await {
                Some(msg) => {
                    let channel: String = msg.get_channel_name().to_string();
                    let payload: Vec<u8> = match msg.get_payload() {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(error = %e, "dropping undecodable pubsub payload");
                            continue;
                        }
                    };
                    let payload_str = String::from_utf8_lossy(&payload).into_owned();
                    let kind_label = match kind {
                        SubscribeKind::Channel => "message",
                        SubscribeKind::Pattern => "pmessage",
                    };
                    let frame = json!({ &verb_upper: [kind_label, channel, payload_str] });
                    let mut chunk = frame.to_string().into_bytes();
                    chunk.push(b'\n');
                    yield Ok::<Bytes, std::io::Error>(Bytes::from(chunk));
                }
                None => {
                    debug!("pubsub connection closed by upstream");
                    break;
                }
            }
        }
    };

    Ok(Body::from_stream(body_stream))
}
