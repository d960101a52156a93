//! WebSocket echo session flow.
//!
//! Each iteration opens a connection, sends one JSON probe, waits for the
//! echo and closes. The protocol decisions live in
//! [`SessionController`]; this module performs the I/O and the metric
//! recording around it.

use crate::loadtest::context::{IterationContext, IterationResult};
use crate::loadtest::decode::body_preview;
use crate::loadtest::error::ProbeError;
use crate::loadtest::metrics::{MetricSink, Observation, CHECKS};
use crate::loadtest::session::{resolution, SessionAction, SessionController, SessionEvent};
use crate::loadtest::vu::IterationFlow;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use std::io;
use std::time::{Duration, Instant};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Trend of connect-to-resolution time per session (ms).
pub const WEBSOCKET_SESSION_DURATION: &str = "websocket_session_duration";
/// Rate of sessions that received their echo.
pub const WEBSOCKET_SUCCESS_RATE: &str = "websocket_success_rate";
/// Counter of probe messages sent.
pub const WEBSOCKET_TOTAL_MESSAGES: &str = "websocket_total_messages";

/// Public echo service used when no URL is configured.
pub const DEFAULT_WS_URL: &str = "wss://echo.websocket.org";
/// Session deadline measured from connect initiation.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(5);
/// How long a forced close may wait for the peer's confirmation.
pub const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Name of the check recorded for each message received on an open session.
pub const RECEIVED_RESPONSE: &str = "received response";

/// Wire format of the probe message.
#[derive(Debug, Serialize)]
pub struct ProbeMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub vu: u32,
    pub iteration: u64,
    /// Send time in Unix milliseconds.
    pub timestamp: i64,
}

impl ProbeMessage {
    /// Builds the probe for `ctx`, stamped with the current wall-clock time.
    pub fn for_iteration(ctx: &IterationContext) -> Self {
        Self {
            kind: "test",
            vu: ctx.vu,
            iteration: ctx.iteration,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// The WebSocket echo session flow.
#[derive(Debug, Clone)]
pub struct WebSocketProbe {
    url: String,
    session_timeout: Duration,
    close_grace: Duration,
}

impl WebSocketProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            close_grace: CLOSE_GRACE,
        }
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Runs one session and records its metrics.
    ///
    /// Exactly one `websocket_session_duration` sample and one
    /// `websocket_success_rate` outcome are recorded per call, whether the
    /// session ends by echo, close, error or deadline.
    pub async fn run_session(&self, ctx: &IterationContext, sink: &dyn MetricSink) -> IterationResult {
        let started = Instant::now();
        let deadline = tokio::time::Instant::from_std(started + self.session_timeout);
        let mut controller = SessionController::new(started);

        tracing::info!("VU {} connecting to WebSocket...", ctx.vu);

        let resolved = tokio::select! {
            connected = tokio_tungstenite::connect_async(self.url.as_str()) => match connected {
                Ok((stream, _response)) => {
                    tracing::info!("VU {} connected", ctx.vu);
                    self.drive(stream, &mut controller, ctx, sink, deadline).await
                },
                Err(err) => {
                    let err = ProbeError::classify_ws(&err);
                    tracing::warn!(category = err.error_category(), "VU {} error: {err}", ctx.vu);
                    resolution(&controller.handle(SessionEvent::ConnectFailed(err), Instant::now()))
                },
            },
            () = tokio::time::sleep_until(deadline) => {
                tracing::warn!("VU {} timeout", ctx.vu);
                resolution(&controller.handle(SessionEvent::Deadline, Instant::now()))
            },
        };

        let result = resolved.unwrap_or_else(|| IterationResult::failed(started.elapsed()));
        sink.record(Observation::duration(WEBSOCKET_SESSION_DURATION, result.duration))
            .await;
        sink.record(Observation::outcome(WEBSOCKET_SUCCESS_RATE, result.success))
            .await;

        tracing::info!("VU {} disconnected", ctx.vu);
        result
    }

    /// Pumps events from an established connection into `controller` until it
    /// resolves. Every socket write and read races the current deadline.
    async fn drive<S>(
        &self,
        mut stream: S,
        controller: &mut SessionController,
        ctx: &IterationContext,
        sink: &dyn MetricSink,
        mut deadline: tokio::time::Instant,
    ) -> Option<IterationResult>
    where
        S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
    {
        let mut pending = controller.handle(SessionEvent::Connected, Instant::now());
        let mut result = None;

        loop {
            while !pending.is_empty() {
                let actions = std::mem::take(&mut pending);
                for action in actions {
                    let event = match action {
                        SessionAction::SendProbe => {
                            sink.record(Observation::increment(WEBSOCKET_TOTAL_MESSAGES, 1))
                                .await;
                            let probe = Message::text(ProbeMessage::for_iteration(ctx).to_json());
                            tokio::select! {
                                sent = stream.send(probe) => match sent {
                                    Ok(()) => Some(SessionEvent::ProbeSent),
                                    Err(err) => Some(stream_error_event(&err, ctx)),
                                },
                                () = tokio::time::sleep_until(deadline) => Some(SessionEvent::Deadline),
                            }
                        },
                        SessionAction::CheckResponse(passed) => {
                            sink.record(
                                Observation::outcome(CHECKS, passed)
                                    .with_tag("check", RECEIVED_RESPONSE),
                            )
                            .await;
                            None
                        },
                        SessionAction::RequestClose => tokio::select! {
                            closed = stream.close() => {
                                if let Err(err) = closed {
                                    tracing::debug!("VU {} close failed: {err}", ctx.vu);
                                }
                                None
                            },
                            () = tokio::time::sleep_until(deadline) => Some(SessionEvent::Deadline),
                        },
                        SessionAction::Resolve(verdict) => {
                            result = Some(verdict);
                            None
                        },
                    };
                    if let Some(event) = event {
                        pending.extend(self.apply(controller, event, &mut deadline, ctx));
                    }
                }
            }

            if controller.is_resolved() {
                return result;
            }

            let event = tokio::select! {
                () = tokio::time::sleep_until(deadline) => SessionEvent::Deadline,
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        tracing::info!("VU {} received: {}", ctx.vu, body_preview(text.as_bytes()));
                        SessionEvent::Message(text.len())
                    },
                    Some(Ok(Message::Binary(data))) => {
                        tracing::info!("VU {} received: {}", ctx.vu, body_preview(&data));
                        SessionEvent::Message(data.len())
                    },
                    Some(Ok(Message::Close(_))) | None => SessionEvent::CloseConfirmed,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => stream_error_event(&err, ctx),
                },
            };

            pending = self.apply(controller, event, &mut deadline, ctx);
        }
    }

    /// Feeds `event` to `controller`. A deadline that forces a close re-arms
    /// `deadline` to the close grace period.
    fn apply(
        &self,
        controller: &mut SessionController,
        event: SessionEvent,
        deadline: &mut tokio::time::Instant,
        ctx: &IterationContext,
    ) -> Vec<SessionAction> {
        if event == SessionEvent::Deadline && controller.state().is_open() {
            tracing::warn!("VU {} timeout", ctx.vu);
            *deadline = tokio::time::Instant::now() + self.close_grace;
        }
        controller.handle(event, Instant::now())
    }
}

/// Returns `true` for errors meaning the peer went away without finishing the
/// closing handshake.
fn is_disconnect(err: &WsError) -> bool {
    match err {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        WsError::Io(io) => matches!(
            io.kind(),
            io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}

fn stream_error_event(err: &WsError, ctx: &IterationContext) -> SessionEvent {
    if is_disconnect(err) {
        tracing::debug!("VU {} peer disconnected: {err}", ctx.vu);
        return SessionEvent::Disconnected;
    }
    let err = ProbeError::classify_ws(err);
    tracing::warn!(category = err.error_category(), "VU {} error: {err}", ctx.vu);
    SessionEvent::Error(err)
}

#[async_trait]
impl IterationFlow for WebSocketProbe {
    fn name(&self) -> &str {
        "WebSocket Test Suite"
    }

    async fn run_iteration(&self, ctx: &IterationContext, sink: &dyn MetricSink) -> IterationResult {
        self.run_session(ctx, sink).await
    }
}
