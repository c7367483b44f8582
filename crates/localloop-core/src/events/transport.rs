//! Opening the event stream.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Client;

use super::sse::{SseFrame, SseParser};
use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Decoded frames of one live connection. The stream ends when the
/// server closes the connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame>> + Send>>;

#[async_trait]
pub trait PushTransport: Send + Sync + 'static {
    /// Open a stream authenticated with `access_token`.
    async fn connect(&self, access_token: &str) -> Result<FrameStream>;
}

/// `GET {base}/events/stream?token=...` over reqwest.
pub struct HttpPushTransport {
    url: String,
    client: Client,
}

impl HttpPushTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        // No overall timeout: the response body is long-lived.
        let client = Client::builder()
            .connect_timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            url: config.events_url(),
            client,
        })
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn connect(&self, access_token: &str) -> Result<FrameStream> {
        tracing::debug!(url = %self.url, "Opening event stream");
        let response = self
            .client
            .get(&self.url)
            .query(&[("token", access_token)])
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status, &body));
        }

        let body = response.bytes_stream();
        let frames = futures_util::stream::unfold(
            (Box::pin(body), SseParser::new(), VecDeque::new(), false),
            |(mut body, mut parser, mut ready, failed)| async move {
                if failed {
                    return None;
                }
                loop {
                    if let Some(frame) = ready.pop_front() {
                        return Some((Ok(frame), (body, parser, ready, false)));
                    }
                    match body.next().await {
                        Some(Ok(chunk)) => ready.extend(parser.feed(&chunk)),
                        Some(Err(error)) => {
                            return Some((Err(Error::from(error)), (body, parser, ready, true)));
                        }
                        None => return None,
                    }
                }
            },
        );
        Ok(Box::pin(frames))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// What one scripted connection attempt does.
    pub enum Script {
        /// Connection is refused with this error
        Refuse(Error),
        /// Frames are delivered, then the stream stays open
        Open(Vec<Result<SseFrame>>),
        /// Frames are delivered, then the server hangs up
        Close(Vec<Result<SseFrame>>),
    }

    /// Replays scripted connections in order; unscripted attempts stay
    /// open without sending anything.
    #[derive(Default)]
    pub struct ScriptedTransport {
        scripts: Mutex<VecDeque<Script>>,
        tokens: Mutex<Vec<String>>,
        attempts: AtomicUsize,
    }

    impl ScriptedTransport {
        pub fn push(&self, script: Script) {
            self.scripts.lock().unwrap().push_back(script);
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        pub fn tokens(&self) -> Vec<String> {
            self.tokens.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PushTransport for ScriptedTransport {
        async fn connect(&self, access_token: &str) -> Result<FrameStream> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.tokens.lock().unwrap().push(access_token.to_string());
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Script::Open(Vec::new()));
            match script {
                Script::Refuse(error) => Err(error),
                Script::Open(frames) => Ok(Box::pin(
                    futures_util::stream::iter(frames).chain(futures_util::stream::pending()),
                )),
                Script::Close(frames) => Ok(Box::pin(futures_util::stream::iter(frames))),
            }
        }
    }
}
