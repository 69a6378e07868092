//! Background reconciliation of the open conversation with the backend.
//!
//! Answers can land server-side through other channels (another admin
//! session, a retried stream). The reconciler reloads the open conversation
//! on a fixed interval and swaps in the server's message set when it grew.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::events::{ReplaceOrigin, SessionEvent};
use crate::service::chat_session::ChatSession;
use crate::state::SessionState;

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A guard was set or no conversation is open; nothing was fetched.
    Skipped,
    /// Fetched, but the server has no new messages.
    Unchanged,
    /// The log was replaced by `count` server messages.
    Merged { count: usize },
    /// The fetch failed for a reason other than authentication.
    Failed,
    /// The backend rejected the session; polling should stop.
    SessionExpired,
}

impl ChatSession {
    /// Runs one reconciliation pass against the open conversation.
    pub async fn reconcile(&self) -> PollOutcome {
        let id = {
            let mut state = self.state().await;
            let Some(id) = state.active_conversation_id else {
                return PollOutcome::Skipped;
            };
            if state.is_polling || state.is_loading_conversation {
                return PollOutcome::Skipped;
            }
            if self.send_blocks_polling(&state) {
                return PollOutcome::Skipped;
            }
            state.is_polling = true;
            id
        };

        let result = self.api().get_conversation(id).await;

        let mut state = self.state().await;
        state.is_polling = false;
        let detail = match result {
            Ok(detail) => detail,
            Err(e) if e.is_auth() => {
                drop(state);
                self.end_session().await;
                return PollOutcome::SessionExpired;
            }
            Err(e) => {
                warn!("Polling conversation {id} failed: {e}");
                return PollOutcome::Failed;
            }
        };

        if !state.is_active(id) || state.is_loading_conversation {
            debug!("Discarding poll result for {id}: conversation changed meanwhile");
            return PollOutcome::Skipped;
        }
        // A send may have started while the fetch was in flight; its
        // placeholder is not in the server copy yet.
        if self.send_blocks_polling(&state) {
            debug!("Discarding poll result for {id}: an answer is streaming");
            return PollOutcome::Skipped;
        }
        let count = detail.messages.len();
        if count <= state.last_known_message_count {
            return PollOutcome::Unchanged;
        }

        let scroll_to_bottom = state.viewport_at_bottom;
        state.log.replace_all(detail.messages);
        state.last_known_message_count = count;
        let references =
            state.log.last_assistant().map(|m| m.references.clone()).unwrap_or_default();
        state.references.show(references.clone());
        let messages = state.log.messages().to_vec();
        let hidden = state.log.hidden_count();
        drop(state);

        info!("Conversation {id} grew to {count} messages");
        self.emit(SessionEvent::LogReplaced {
            origin: ReplaceOrigin::Poll,
            messages,
            hidden,
            scroll_to_bottom,
        });
        self.emit(SessionEvent::ReferencesShown(references));
        PollOutcome::Merged { count }
    }

    fn send_blocks_polling(&self, state: &SessionState) -> bool {
        state.is_sending && !self.settings().poll_during_send
    }
}

/// Owns the polling task. The task runs while the chat panel is visible.
pub struct PollingReconciler {
    session: ChatSession,
    interval: Duration,
    running: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

impl PollingReconciler {
    pub fn new(session: ChatSession) -> Self {
        let interval = session.settings().poll_interval;
        Self { session, interval, running: None }
    }

    /// One pass, outside the timer.
    pub async fn tick(&self) -> PollOutcome {
        self.session.reconcile().await
    }

    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// Starts the timer task; a no-op when it is already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(poll_loop(self.session.clone(), self.interval, stop_rx));
        self.running = Some((stop_tx, handle));
        debug!("Polling started every {:?}", self.interval);
    }

    /// Signals the task to stop. A pass already in flight completes so the
    /// polling guard is always released.
    pub fn stop(&mut self) {
        if let Some((stop_tx, _handle)) = self.running.take() {
            let _ = stop_tx.send(true);
            debug!("Polling stopped");
        }
    }

    /// Polling follows the chat panel: visible starts it, hidden stops it.
    pub fn set_panel_visible(&mut self, visible: bool) {
        if visible {
            self.start();
        } else {
            self.stop();
        }
    }
}

impl Drop for PollingReconciler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(session: ChatSession, period: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick of an interval fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
                continue;
            }
        }

        if session.reconcile().await == PollOutcome::SessionExpired {
            info!("Polling ended: session expired");
            break;
        }
    }
}
