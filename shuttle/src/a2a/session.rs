//! Per-(context, task) session event processor.
//!
//! A single-writer validated event stream: every send serialises through
//! the session mutex, is validated against the session's context and task,
//! written through to task storage for task events, and fanned out to
//! subscribers in completion order. Terminal events close the session and
//! emit a synthetic close marker; subscribers attaching after close observe
//! the marker immediately.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex, Notify};

use crate::error::RuntimeError;

use super::storage::{TaskStorage, TaskStorageError};
use super::task::SessionEvent;

/// Errors surfaced on session sends.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Write to a closed session.
    #[error("session is not active")]
    SessionNotActive,
    /// Context/task mismatch or forbidden transition.
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    /// Task storage rejected the write-through.
    #[error(transparent)]
    Storage(#[from] TaskStorageError),
}

/// Frame delivered to subscribers: an event, or the close marker.
#[derive(Clone, Debug)]
pub enum SessionFrame {
    Event(SessionEvent),
    Closed,
}

struct SessionInner {
    open: bool,
    task_event_sent: bool,
    subscribers: Vec<mpsc::UnboundedSender<SessionFrame>>,
}

/// Validated single-writer event stream for one `(context_id, task_id)`.
pub struct SessionProcessor {
    context_id: String,
    task_id: String,
    storage: Arc<TaskStorage>,
    inner: Mutex<SessionInner>,
    subscribed: Notify,
}

impl SessionProcessor {
    pub fn new(
        context_id: impl Into<String>,
        task_id: impl Into<String>,
        storage: Arc<TaskStorage>,
    ) -> Self {
        Self {
            context_id: context_id.into(),
            task_id: task_id.into(),
            storage,
            inner: Mutex::new(SessionInner {
                open: true,
                task_event_sent: false,
                subscribers: Vec::new(),
            }),
            subscribed: Notify::new(),
        }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.open
    }

    /// Sends one event through the session. Validation, storage
    /// write-through, fan-out, and closure all happen under the session
    /// mutex, so subscribers observe events in the order their writes
    /// completed.
    pub async fn send(&self, event: SessionEvent) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if !inner.open {
            return Err(SessionError::SessionNotActive);
        }
        if event.context_id() != self.context_id {
            return Err(SessionError::InvalidEvent("contextId".into()));
        }

        let close_after = match &event {
            SessionEvent::Message { .. } => {
                if inner.task_event_sent {
                    return Err(SessionError::InvalidEvent("TaskEventSent".into()));
                }
                // A session accepts exactly one message event, then closes.
                true
            }
            task_event => {
                if task_event.task_id() != Some(self.task_id.as_str()) {
                    return Err(SessionError::InvalidEvent("taskId".into()));
                }
                let task = self.storage.update(task_event).await?;
                inner.task_event_sent = true;
                let final_update = matches!(
                    task_event,
                    SessionEvent::StatusUpdate(update) if update.final_
                );
                final_update || task.status.state.is_terminal()
            }
        };

        Self::fan_out(&mut inner, SessionFrame::Event(event));
        if close_after {
            Self::close_locked(&mut inner);
        }
        Ok(())
    }

    /// Closes the session explicitly; idempotent.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.open {
            Self::close_locked(&mut inner);
        }
    }

    /// Attaches a subscriber. After close, the subscription immediately
    /// observes the close marker.
    pub async fn subscribe(&self) -> SessionSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;
        if inner.open {
            inner.subscribers.push(tx);
        } else {
            let _ = tx.send(SessionFrame::Closed);
        }
        drop(inner);
        self.subscribed.notify_waiters();
        SessionSubscription { rx }
    }

    /// Waits until at least one subscriber is attached.
    pub async fn await_first_subscriber(&self, timeout: Duration) -> Result<(), RuntimeError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.subscribed.notified();
            if !self.inner.lock().await.subscribers.is_empty() {
                return Ok(());
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(RuntimeError::Timeout);
            }
        }
    }

    fn fan_out(inner: &mut SessionInner, frame: SessionFrame) {
        inner
            .subscribers
            .retain(|tx| tx.send(frame.clone()).is_ok());
    }

    fn close_locked(inner: &mut SessionInner) {
        inner.open = false;
        Self::fan_out(inner, SessionFrame::Closed);
        inner.subscribers.clear();
    }
}

/// One subscriber's view of a session: events until the close marker.
pub struct SessionSubscription {
    rx: mpsc::UnboundedReceiver<SessionFrame>,
}

impl SessionSubscription {
    /// Next event; None once the session has closed.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        match self.rx.recv().await {
            Some(SessionFrame::Event(event)) => Some(event),
            Some(SessionFrame::Closed) | None => None,
        }
    }

    /// Next raw frame, including the close marker.
    pub async fn next_frame(&mut self) -> Option<SessionFrame> {
        self.rx.recv().await
    }

    /// Adapts the subscription into a stream of events that ends at the
    /// close marker.
    pub fn into_stream(self) -> impl futures::Stream<Item = SessionEvent> {
        use tokio_stream::StreamExt;
        tokio_stream::wrappers::UnboundedReceiverStream::new(self.rx)
            .take_while(|frame| matches!(frame, SessionFrame::Event(_)))
            .filter_map(|frame| match frame {
                SessionFrame::Event(event) => Some(event),
                SessionFrame::Closed => None,
            })
    }
}
