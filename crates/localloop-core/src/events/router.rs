//! Push connection supervisor.
//!
//! Keeps at most one live stream, follows the session (connect on sign-in,
//! tear down on sign-out, rebuild when the token changes) and recovers
//! from connection errors. Frames are decoded here and handed to the
//! [`EventHandler`] strictly in arrival order.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;

use super::{ConnectionState, EventHandler, FrameStream, PushEvent, PushTransport, SseFrame};
use crate::auth::{AuthState, SessionManager};
use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Why a live stream stopped being read.
enum StreamEnd {
    Shutdown,
    /// Signed out, or the access token was replaced
    SessionChanged,
    Failed(Error),
}

pub struct NotificationRouter {
    transport: Arc<dyn PushTransport>,
    session: Arc<SessionManager>,
    handler: Arc<dyn EventHandler>,
    reconnect_delay: Duration,
    heartbeat_timeout: Option<Duration>,
    state: watch::Sender<ConnectionState>,
    running: AtomicBool,
    recovering: AtomicBool,
}

impl NotificationRouter {
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn PushTransport>,
        session: Arc<SessionManager>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            session,
            handler,
            reconnect_delay: config.reconnect_delay(),
            heartbeat_timeout: config.heartbeat_timeout(),
            state,
            running: AtomicBool::new(false),
            recovering: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Whether a refresh-then-reconnect cycle is in flight.
    pub fn is_recovering(&self) -> bool {
        self.recovering.load(Ordering::SeqCst)
    }

    /// Supervise the push connection until `shutdown` resolves.
    ///
    /// Only one `run` may be active per router.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::InvalidInput(
                "notification router is already running".to_string(),
            ));
        }
        tokio::pin!(shutdown);
        self.supervise(shutdown.as_mut()).await;
        self.set_state(ConnectionState::Disconnected);
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Notification router stopped");
        Ok(())
    }

    async fn supervise<F>(&self, mut shutdown: Pin<&mut F>)
    where
        F: Future<Output = ()> + Send,
    {
        let mut auth = self.session.subscribe();
        loop {
            if !auth.borrow_and_update().is_signed_in() {
                self.set_state(ConnectionState::Disconnected);
                tokio::select! {
                    () = shutdown.as_mut() => return,
                    changed = auth.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
                continue;
            }

            let token = match self.session.valid_access_token().await {
                Ok(token) => token,
                Err(error) => {
                    tracing::warn!("No usable access token for the event stream: {}", error);
                    self.set_state(ConnectionState::Error(error.to_string()));
                    if !self.pause(shutdown.as_mut()).await {
                        return;
                    }
                    continue;
                }
            };
            // Read after any proactive refresh so the new token's generation
            // does not look like a session change.
            let current = auth.borrow_and_update().clone();
            let AuthState::SignedIn { generation, .. } = current else {
                continue;
            };

            self.set_state(ConnectionState::Connecting);
            let connected = tokio::select! {
                () = shutdown.as_mut() => return,
                result = self.transport.connect(&token) => result,
            };
            let stream = match connected {
                Ok(stream) => stream,
                Err(error) => {
                    if !self.recover(error, shutdown.as_mut()).await {
                        return;
                    }
                    continue;
                }
            };

            self.set_state(ConnectionState::Connected);
            tracing::info!("Event stream connected");
            match self
                .pump(stream, &mut auth, generation, shutdown.as_mut())
                .await
            {
                StreamEnd::Shutdown => return,
                StreamEnd::SessionChanged => {
                    self.set_state(ConnectionState::Disconnected);
                    tracing::info!("Session changed; event stream closed");
                    let signed_in = auth.borrow().is_signed_in();
                    if signed_in && !self.pause(shutdown.as_mut()).await {
                        return;
                    }
                }
                StreamEnd::Failed(error) => {
                    if !self.recover(error, shutdown.as_mut()).await {
                        return;
                    }
                }
            }
        }
    }

    /// Read frames until the stream ends, the session changes or shutdown.
    async fn pump<F>(
        &self,
        mut stream: FrameStream,
        auth: &mut watch::Receiver<AuthState>,
        generation: u64,
        mut shutdown: Pin<&mut F>,
    ) -> StreamEnd
    where
        F: Future<Output = ()> + Send,
    {
        loop {
            let silence = heartbeat_deadline(self.heartbeat_timeout);
            tokio::select! {
                () = shutdown.as_mut() => return StreamEnd::Shutdown,
                changed = auth.changed() => {
                    if changed.is_err() {
                        return StreamEnd::Shutdown;
                    }
                    let still_current = matches!(
                        &*auth.borrow_and_update(),
                        AuthState::SignedIn { generation: current, .. } if *current == generation
                    );
                    if !still_current {
                        return StreamEnd::SessionChanged;
                    }
                }
                () = silence => {
                    return StreamEnd::Failed(Error::Network(
                        "no events within the heartbeat timeout".to_string(),
                    ));
                }
                frame = stream.next() => match frame {
                    Some(Ok(frame)) => self.handle_frame(&frame).await,
                    Some(Err(error)) => return StreamEnd::Failed(error),
                    None => {
                        return StreamEnd::Failed(Error::Network(
                            "event stream closed by server".to_string(),
                        ));
                    }
                },
            }
        }
    }

    async fn handle_frame(&self, frame: &SseFrame) {
        match PushEvent::from_frame(frame) {
            Ok(Some(PushEvent::Connected)) => tracing::debug!("Event stream acknowledged"),
            Ok(Some(PushEvent::Heartbeat)) => tracing::trace!("Heartbeat"),
            Ok(Some(event)) => {
                tracing::debug!(event = event.name(), "Dispatching push event");
                self.handler.handle(event).await;
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(event = %frame.event, "Dropping undecodable push event: {}", error);
            }
        }
    }

    /// Handle a connection-level error. An expired token gets exactly one
    /// refresh; the next attempt waits out the reconnect delay either way.
    /// Returns `false` on shutdown.
    async fn recover<F>(&self, error: Error, shutdown: Pin<&mut F>) -> bool
    where
        F: Future<Output = ()> + Send,
    {
        tracing::warn!("Event stream error: {}", error);
        self.set_state(ConnectionState::Error(error.to_string()));

        if self.session.access_token_expired() {
            if self.recovering.swap(true, Ordering::SeqCst) {
                tracing::debug!("Token recovery already in flight");
            } else {
                match self.session.refresh().await {
                    Ok(_) => tracing::info!("Access token refreshed; reconnecting event stream"),
                    Err(error) => tracing::warn!("Event stream token refresh failed: {}", error),
                }
                self.recovering.store(false, Ordering::SeqCst);
            }
        }
        self.pause(shutdown).await
    }

    /// Wait out the reconnect delay. Returns `false` on shutdown.
    async fn pause<F>(&self, shutdown: Pin<&mut F>) -> bool
    where
        F: Future<Output = ()> + Send,
    {
        tokio::select! {
            () = shutdown => false,
            () = tokio::time::sleep(self.reconnect_delay) => true,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

async fn heartbeat_deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}
