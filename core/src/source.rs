//! Byte sources feeding a decode session.
//!
//! The decoder is transport-agnostic; it only needs ordered chunk delivery.
//! A [`ChunkSource`] is that delivery: an HTTP response body, an in-process
//! channel, or any stream of byte chunks.

use crate::config::HttpConfig;
use crate::{Result, RillError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Ordered producer of raw byte chunks
#[async_trait]
pub trait ChunkSource: Send {
    /// Establish the stream. Called once before the first read; the session
    /// is `Connecting` until it returns.
    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Next chunk, or `Ok(None)` once the stream has ended naturally.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

// =============================================================================
// Channel source
// =============================================================================

/// Sending half of a [`ChannelSource`]. Dropping every sender ends the stream.
#[derive(Clone, Debug)]
pub struct ChunkSender {
    tx: mpsc::Sender<Result<Bytes>>,
}

impl ChunkSender {
    /// Queue one chunk, waiting for room if the channel is full
    pub async fn send(&self, chunk: impl Into<Bytes>) -> Result<()> {
        self.tx
            .send(Ok(chunk.into()))
            .await
            .map_err(|_| RillError::Transport("chunk receiver dropped".into()))
    }

    /// Fail the stream with a transport error
    pub async fn fail(&self, message: impl Into<String>) -> Result<()> {
        self.tx
            .send(Err(RillError::Transport(message.into())))
            .await
            .map_err(|_| RillError::Transport("chunk receiver dropped".into()))
    }

    /// Whether the receiving session has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// In-process source backed by a bounded mpsc channel
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Result<Bytes>>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> (ChunkSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (ChunkSender { tx }, Self { rx })
    }
}

#[async_trait]
impl ChunkSource for ChannelSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        self.rx.recv().await.transpose()
    }
}

// =============================================================================
// Stream source
// =============================================================================

/// Adapter for any stream of byte chunks
pub struct StreamSource<S> {
    stream: S,
}

impl<S> StreamSource<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<S, B, E> ChunkSource for StreamSource<S>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin,
    B: Into<Bytes> + Send,
    E: Display + Send,
{
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        match self.stream.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk.into())),
            Some(Err(e)) => Err(RillError::Transport(e.to_string())),
            None => Ok(None),
        }
    }
}

// =============================================================================
// HTTP source
// =============================================================================

/// Streaming HTTP response body.
///
/// The request is sent on `open`; a non-success status is a transport
/// failure. Dropping the source closes the connection.
pub struct HttpSource {
    request: Option<reqwest::RequestBuilder>,
    body: Option<BoxStream<'static, reqwest::Result<Bytes>>>,
}

impl HttpSource {
    pub fn new(request: reqwest::RequestBuilder) -> Self {
        Self {
            request: Some(request),
            body: None,
        }
    }

    /// GET an event stream at `path` relative to the configured base URL
    pub fn get(client: &reqwest::Client, cfg: &HttpConfig, path: &str) -> Self {
        let req = client
            .get(cfg.url(path))
            .header(reqwest::header::ACCEPT, "text/event-stream");
        Self::new(cfg.authorize(req))
    }

    /// POST a JSON body and stream the response (agent execution endpoints)
    pub fn post_json(
        client: &reqwest::Client,
        cfg: &HttpConfig,
        path: &str,
        body: &serde_json::Value,
    ) -> Self {
        let req = client
            .post(cfg.url(path))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(body);
        Self::new(cfg.authorize(req))
    }
}

#[async_trait]
impl ChunkSource for HttpSource {
    async fn open(&mut self) -> Result<()> {
        let request = self
            .request
            .take()
            .ok_or_else(|| RillError::Transport("HTTP source already opened".into()))?;

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(target: "source", %status, body = %body, "Stream request rejected");
            return Err(RillError::Transport(format!(
                "unexpected status {status}: {body}"
            )));
        }

        debug!(target: "source", %status, url = %resp.url(), "Stream response opened");
        self.body = Some(resp.bytes_stream().boxed());
        Ok(())
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let body = self
            .body
            .as_mut()
            .ok_or_else(|| RillError::Transport("HTTP source not opened".into()))?;
        match body.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(RillError::Transport(format!("body read failed: {e}"))),
            None => Ok(None),
        }
    }
}
