//! Sync stream state machine.
//!
//! One `SyncStream` serves one connected device. It polls the sync log on a
//! fixed interval with its watermark cursor and pushes whatever the pull
//! returns. The stream keeps no state across connections; a reconnecting
//! client resumes from the last cursor it saw.
//!
//! ```text
//! Connecting --connected--> Open --cancel / client close / send failure--> Closed
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use labledger_core::{clamp_pull_limit, Cursor, ValidationError};
use labledger_store::Store;

use crate::error::Result;
use crate::messages::{limits, ClientFrame, ServerMessage};
use crate::transport::Transport;

/// Configuration for stream behavior.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Time between polls. The first poll happens one interval after
    /// `connected`.
    pub poll_interval: Duration,
    /// Events per pull; clamped to the pull cap.
    pub page_size: usize,
    /// Largest client frame tolerated.
    pub max_client_message_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval: limits::DEFAULT_POLL_INTERVAL,
            page_size: labledger_core::DEFAULT_PULL_LIMIT,
            max_client_message_bytes: limits::MAX_CLIENT_MESSAGE_BYTES,
        }
    }
}

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Connecting,
    Open,
    Closed,
}

/// Why a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The owner of the stream asked it to stop.
    Cancelled,
    /// The client sent a close frame or went away.
    ClientClosed,
    /// The client broke the protocol (e.g. an oversized frame).
    ProtocolViolation(String),
    /// Writing to the client failed.
    TransportFailed(String),
}

/// Result of a finished stream.
#[derive(Debug, Clone)]
pub struct StreamReport {
    pub reason: CloseReason,
    /// Watermark at close: the last cursor delivered to the client.
    pub cursor: Cursor,
    pub events_delivered: usize,
    pub polls: usize,
    pub pull_errors: usize,
}

/// Push adapter over the sync log for one client.
pub struct SyncStream<S: Store + ?Sized, T: Transport> {
    store: Arc<S>,
    transport: Arc<T>,
    user_id: String,
    cursor: Cursor,
    config: StreamConfig,
    phase: StreamPhase,
}

impl<S, T> SyncStream<S, T>
where
    S: Store + ?Sized,
    T: Transport + 'static,
{
    /// Create a stream for `user_id` starting after `cursor`.
    pub fn new(
        store: Arc<S>,
        transport: Arc<T>,
        user_id: impl Into<String>,
        cursor: Cursor,
        config: StreamConfig,
    ) -> Result<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(ValidationError::MissingField("user_id").into());
        }
        if cursor.get() < 0 {
            return Err(ValidationError::InvalidCursor(cursor.get()).into());
        }
        Ok(Self {
            store,
            transport,
            user_id,
            cursor,
            config,
            phase: StreamPhase::Connecting,
        })
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Current watermark.
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Run until cancelled, the client leaves, or a send fails.
    ///
    /// Sending `true` on (or dropping the sender of) `shutdown` cancels the
    /// stream; it is observed within one poll interval, even while a send to
    /// a slow client is pending.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> StreamReport {
        let mut report = StreamReport {
            reason: CloseReason::Cancelled,
            cursor: self.cursor,
            events_delivered: 0,
            polls: 0,
            pull_errors: 0,
        };

        if *shutdown.borrow_and_update() {
            return self.finish(report, CloseReason::Cancelled).await;
        }

        let connected = ServerMessage::Connected {
            cursor: self.cursor,
        };
        if let Err(e) = self.transport.send(connected).await {
            return self
                .finish(report, CloseReason::TransportFailed(e.to_string()))
                .await;
        }
        self.phase = StreamPhase::Open;
        tracing::info!(user_id = %self.user_id, cursor = %self.cursor, "sync stream open");

        let (reader_tx, mut reader_rx) = oneshot::channel();
        let reader = tokio::spawn(read_client(
            Arc::clone(&self.transport),
            self.config.max_client_message_bytes,
            reader_tx,
        ));

        let period = self.config.poll_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender counts as cancellation.
                    if changed.is_err() || *shutdown.borrow_and_update() {
                        break CloseReason::Cancelled;
                    }
                }
                read = &mut reader_rx => {
                    break read.unwrap_or_else(|_| {
                        CloseReason::TransportFailed("client reader stopped".into())
                    });
                }
                // The pull and send race the branches above, so a client that
                // stopped draining cannot hold off cancellation or its own close.
                // A poll dropped mid-send leaves the cursor where it was.
                polled = async {
                    ticker.tick().await;
                    self.poll_once(&mut report).await
                } => {
                    if let Err(reason) = polled {
                        break reason;
                    }
                }
            }
        };

        reader.abort();
        self.finish(report, reason).await
    }

    /// Pull one page and push it. Only a failed send ends the stream.
    async fn poll_once(&mut self, report: &mut StreamReport) -> std::result::Result<(), CloseReason> {
        report.polls += 1;
        let limit = clamp_pull_limit(Some(self.config.page_size));

        let message = match self
            .store
            .pull_sync_events(&self.user_id, self.cursor, Some(limit))
            .await
        {
            Ok(page) => ServerMessage::from_page(page),
            Err(e) => {
                report.pull_errors += 1;
                tracing::warn!(user_id = %self.user_id, cursor = %self.cursor, error = %e, "sync pull failed");
                ServerMessage::Error {
                    error: e.to_string(),
                }
            }
        };

        let watermark = message.cursor();
        let delivered = message.event_count();
        self.transport
            .send(message)
            .await
            .map_err(|e| CloseReason::TransportFailed(e.to_string()))?;

        if let Some(cursor) = watermark {
            self.cursor = cursor;
        }
        if delivered > 0 {
            tracing::debug!(user_id = %self.user_id, delivered, cursor = %self.cursor, "pushed sync events");
        }
        report.events_delivered += delivered;
        Ok(())
    }

    async fn finish(&mut self, mut report: StreamReport, reason: CloseReason) -> StreamReport {
        self.phase = StreamPhase::Closed;
        if let Err(e) = self.transport.close().await {
            tracing::debug!(error = %e, "closing transport failed");
        }
        match &reason {
            CloseReason::ProtocolViolation(detail) => {
                tracing::warn!(user_id = %self.user_id, %detail, "sync stream closed: protocol violation")
            }
            CloseReason::TransportFailed(detail) => {
                tracing::warn!(user_id = %self.user_id, %detail, "sync stream closed: transport failed")
            }
            other => tracing::info!(user_id = %self.user_id, reason = ?other, "sync stream closed"),
        }
        report.reason = reason;
        report.cursor = self.cursor;
        report
    }
}

/// Read client frames until the connection ends or the client misbehaves.
async fn read_client<T: Transport>(
    transport: Arc<T>,
    max_bytes: usize,
    done: oneshot::Sender<CloseReason>,
) {
    let reason = loop {
        match transport.recv().await {
            Ok(None) | Ok(Some(ClientFrame::Close)) => break CloseReason::ClientClosed,
            Ok(Some(frame)) if frame.len() > max_bytes => {
                break CloseReason::ProtocolViolation(format!(
                    "client frame of {} bytes exceeds the {} byte limit",
                    frame.len(),
                    max_bytes
                ));
            }
            Ok(Some(ClientFrame::Text(_) | ClientFrame::Binary(_))) => {
                tracing::debug!("ignoring client application message");
            }
            Ok(Some(_)) => {}
            Err(e) => break CloseReason::TransportFailed(e.to_string()),
        }
    };
    // The stream may already be closing.
    let _ = done.send(reason);
}
