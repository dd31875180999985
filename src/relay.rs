use crate::envelopes::{parse_message, Envelope, EnvelopeError};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::{net::TcpStream, time::Instant};
use tokio_tungstenite::{
    connect_async_tls_with_config,
    tungstenite::{self, client::IntoClientRequest, Message},
    MaybeTlsStream, WebSocketStream,
};
use url::Url;

/// how long a close handshake may take before the socket is simply dropped
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error("relay connection error: {0}")]
    Websocket(String),

    #[error("timed out while connecting")]
    TimedOut,
}

#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("connection already closed")]
    Closed,

    #[error("websocket error: {0}")]
    Websocket(#[from] tungstenite::Error),

    #[error("failed to encode message: {0}")]
    Envelope(#[from] EnvelopeError),
}

/// one websocket connection to a relay, owned by whoever opened it
pub struct Relay {
    pub url: Url,
    stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl Relay {
    /// open a connection, giving up at `deadline`
    pub async fn connect(url: &Url, deadline: Instant) -> Result<Self, ConnectError> {
        let request = url
            .as_str()
            .into_client_request()
            .map_err(|err| ConnectError::Websocket(err.to_string()))?;

        let (stream, _) = tokio::time::timeout_at(
            deadline,
            connect_async_tls_with_config(request, None, false, None),
        )
        .await
        .map_err(|_| ConnectError::TimedOut)?
        .map_err(|err| ConnectError::Websocket(err.to_string()))?;

        log::debug!("[{}] connected", url);

        Ok(Self {
            url: url.clone(),
            stream: Some(stream),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), RelayError> {
        let text = envelope.to_json()?;
        let stream = self.stream.as_mut().ok_or(RelayError::Closed)?;
        stream.send(Message::text(text)).await?;
        Ok(())
    }

    /// wait for the next nostr message; `Ok(None)` means the relay went away.
    /// pings are answered and malformed frames are skipped.
    pub async fn next_message(&mut self) -> Result<Option<Envelope>, RelayError> {
        loop {
            let stream = self.stream.as_mut().ok_or(RelayError::Closed)?;
            let text = match stream.next().await {
                None => return Ok(None),
                Some(Err(err)) => return Err(err.into()),
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Ping(payload))) => {
                    stream.send(Message::Pong(payload)).await?;
                    continue;
                }
                Some(Ok(Message::Close(frame))) => {
                    log::debug!(
                        "[{}] closed by relay: {}",
                        self.url,
                        frame.map_or("broken close".to_string(), |c| format!(
                            "close ({}) {}",
                            c.code, c.reason
                        ))
                    );
                    return Ok(None);
                }
                Some(Ok(_)) => continue,
            };

            match parse_message(&text) {
                Ok(envelope) => return Ok(Some(envelope)),
                Err(err) => {
                    log::info!("[{}] wrong message: {}", self.url, err);
                }
            }
        }
    }

    /// close the socket; calling it again does nothing
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            match tokio::time::timeout(CLOSE_GRACE, stream.close(None)).await {
                Ok(Ok(())) => log::debug!("[{}] connection closed", self.url),
                Ok(Err(err)) => log::debug!("[{}] close failed: {}", self.url, err),
                Err(_) => log::debug!("[{}] close handshake timed out", self.url),
            }
        }
    }
}

impl std::fmt::Display for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<relay url={}>", self.url)
    }
}
