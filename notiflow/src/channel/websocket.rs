//! WebSocket push transport.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, stream};
use serde::Serialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, trace};
use url::Url;

use super::SessionIdentity;
use super::transport::{PushStream, PushTransport};
use crate::{Error, Result};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Handshake<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    identity: &'a SessionIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    resume_token: Option<String>,
}

/// Push transport over a WebSocket connection.
///
/// After connecting it sends one JSON handshake frame and then yields every
/// text frame the server sends. Ping/pong is answered by tungstenite.
pub struct WebSocketTransport {
    url: Url,
}

impl WebSocketTransport {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url.trim())?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self { url }),
            scheme => Err(Error::config(format!(
                "push URL must use ws:// or wss://, got {scheme}://"
            ))),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl PushTransport for WebSocketTransport {
    async fn open(
        &self,
        session: &SessionIdentity,
        resume_token: Option<String>,
    ) -> Result<PushStream> {
        info!(url = %self.url, user_id = %session.user_id, "Connecting push channel");
        let (mut ws_stream, _) = connect_async(self.url.as_str()).await?;

        let handshake = serde_json::to_string(&Handshake {
            kind: "handshake",
            identity: session,
            resume_token,
        })?;
        ws_stream.send(Message::text(handshake)).await?;
        debug!("Push handshake sent");

        let frames = stream::unfold(Some(ws_stream), |state| async move {
            let Some(mut ws_stream) = state else {
                return None;
            };
            loop {
                match ws_stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return Some((Ok(text.as_str().to_owned()), Some(ws_stream)));
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => return Some((Ok(text), Some(ws_stream))),
                        Err(_) => debug!(len = data.len(), "Skipping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "Push server closed the connection");
                        return None;
                    }
                    Some(Ok(other)) => trace!(?other, "Ignoring control frame"),
                    Some(Err(e)) => return Some((Err(Error::from(e)), None)),
                    None => return None,
                }
            }
        });

        Ok(frames.boxed())
    }
}
