//! Event-stream transports for the native client
//!
//! `EventSource` is the seam between the driver and the network: opening a
//! subscription yields a stream of decoded message payloads. The stream ends
//! with an error when the connection drops or the server closes it.

use crate::core::SseDecoder;
use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, trace};

/// Decoded message payloads of one subscription
pub type MessageStream = BoxStream<'static, Result<String, TransportError>>;

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open a subscription; resolves once the handshake succeeded
    async fn open(&self, url: &str) -> Result<MessageStream, TransportError>;
}

/// `text/event-stream` over HTTP
pub struct HttpEventSource {
    client: reqwest::Client,
}

impl HttpEventSource {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(client)
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpEventSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn open(&self, url: &str) -> Result<MessageStream, TransportError> {
        debug!(url, "Opening event stream");
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        Ok(decode_messages(Box::pin(response.bytes_stream())).boxed())
    }
}

/// Turn a raw byte stream into message payloads
///
/// A transport error or the end of the byte stream is yielded as a final
/// error item.
pub fn decode_messages<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, TransportError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let decoder = SseDecoder::new();
    stream::unfold(
        (bytes, decoder, VecDeque::new(), false),
        |(mut bytes, mut decoder, mut ready, mut done)| async move {
            loop {
                if let Some(msg) = ready.pop_front() {
                    return Some((Ok(msg), (bytes, decoder, ready, done)));
                }
                if done {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        trace!(len = chunk.as_ref().len(), "Event stream chunk");
                        ready.extend(decoder.feed(chunk.as_ref()));
                    }
                    Some(Err(e)) => {
                        done = true;
                        let err = TransportError::Stream(e.to_string());
                        return Some((Err(err), (bytes, decoder, ready, done)));
                    }
                    None => {
                        done = true;
                        return Some((Err(TransportError::Closed), (bytes, decoder, ready, done)));
                    }
                }
            }
        },
    )
}
