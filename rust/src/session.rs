//! One participant's open conversation screen.
//!
//! Lifecycle: `Closed -> Opening -> Open -> Closed`. Opening creates the record if
//! needed, starts a best-effort reset of the opener's unread counter and subscribes to
//! the message log. Closing cancels both; nothing is written on behalf of a closed
//! session.

use std::sync::Arc;

use souk_storage_traits::messages::types::Message;
use souk_storage_traits::{ConversationId, Identity, ParticipantPair};
use tokio::task::JoinHandle;

use crate::clock::MonotonicClock;
use crate::error::{Error, Result};
use crate::message_log::MessageLog;
use crate::store::ConversationStore;
use crate::subscription::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Open,
}

pub struct ConversationSession {
    me: Identity,
    counterpart: Identity,
    conversation_id: ConversationId,
    state: SessionState,
    messages: Option<Subscription<Vec<Message>>>,
    pending_reset: Option<JoinHandle<()>>,
    store: ConversationStore,
    log: MessageLog,
    clock: Arc<MonotonicClock>,
}

impl std::fmt::Debug for ConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSession")
            .field("me", &self.me)
            .field("counterpart", &self.counterpart)
            .field("conversation_id", &self.conversation_id)
            .field("state", &self.state)
            .finish()
    }
}

impl ConversationSession {
    pub(crate) async fn open(
        me: Identity,
        with: Identity,
        store: ConversationStore,
        log: MessageLog,
        clock: Arc<MonotonicClock>,
    ) -> Result<Self> {
        let pair = ParticipantPair::new(me.clone(), with.clone())?;
        let conversation_id = pair.conversation_id();
        let mut session = Self {
            me,
            counterpart: with,
            conversation_id,
            state: SessionState::Closed,
            messages: None,
            pending_reset: None,
            store,
            log,
            clock,
        };

        session.state = SessionState::Opening;
        tracing::debug!(
            conversation_id = %session.conversation_id,
            identity = %session.me,
            "opening conversation"
        );
        session
            .store
            .ensure_exists(&session.conversation_id, &pair)
            .await?;
        session.pending_reset = Some(session.spawn_reset());
        session.messages = Some(session.log.subscribe(session.conversation_id.clone()));
        session.state = SessionState::Open;
        Ok(session)
    }

    /// Failure only leaves the badge on a little longer, so it is logged, not returned.
    fn spawn_reset(&self) -> JoinHandle<()> {
        let store = self.store.clone();
        let conversation_id = self.conversation_id.clone();
        let me = self.me.clone();
        tokio::spawn(async move {
            match store.reset_unread(&conversation_id, &me).await {
                Ok(changed) => {
                    tracing::debug!(
                        conversation_id = %conversation_id,
                        identity = %me,
                        changed,
                        "reset unread on open"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        identity = %me,
                        error = %e,
                        "failed to reset unread on open"
                    );
                }
            }
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn me(&self) -> &Identity {
        &self.me
    }

    pub fn counterpart(&self) -> &Identity {
        &self.counterpart
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state != SessionState::Open {
            return Err(Error::SessionClosed);
        }
        Ok(())
    }

    /// Appends to the log first, then applies the summary and counter effect, so the
    /// summary never points past the log tail.
    pub async fn send(&self, text: &str) -> Result<Message> {
        self.ensure_open()?;
        self.log.validate_text(text)?;
        let sent_at = self.clock.next();
        let message = self
            .log
            .append(&self.conversation_id, &self.me, text, sent_at)
            .await?;
        if let Err(e) = self
            .store
            .append_message_effect(&self.conversation_id, &self.me, &message)
            .await
        {
            tracing::error!(
                conversation_id = %self.conversation_id,
                message_id = %message.id,
                error = %e,
                "message stored but conversation effect failed"
            );
            return Err(e);
        }
        Ok(message)
    }

    /// Resets the unread counter again, e.g. after new messages arrived while open.
    /// Supersedes the reset started on open if that one has not finished.
    pub async fn mark_read(&mut self) -> Result<bool> {
        self.ensure_open()?;
        if let Some(reset) = self.pending_reset.take() {
            reset.abort();
        }
        self.store.reset_unread(&self.conversation_id, &self.me).await
    }

    /// Next unseen snapshot of the log; `None` once closed.
    pub async fn next_messages(&mut self) -> Option<Vec<Message>> {
        self.messages.as_mut()?.next().await
    }

    /// Waits for a log snapshot satisfying `predicate`; `None` once closed.
    pub async fn wait_for_messages<P>(&mut self, predicate: P) -> Option<Vec<Message>>
    where
        P: FnMut(&Vec<Message>) -> bool,
    {
        self.messages.as_mut()?.wait_for(predicate).await
    }

    pub fn latest_messages(&self) -> Option<Vec<Message>> {
        self.messages.as_ref()?.latest()
    }

    /// Cancels the message subscription and any reset still in flight.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(mut messages) = self.messages.take() {
            messages.cancel();
        }
        if let Some(reset) = self.pending_reset.take() {
            reset.abort();
        }
        self.state = SessionState::Closed;
        tracing::debug!(
            conversation_id = %self.conversation_id,
            identity = %self.me,
            "closed conversation"
        );
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        self.close();
    }
}
