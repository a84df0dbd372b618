//! The session state and its single writer.
//!
//! [`SessionState`] is a plain value with one mutation entry point,
//! [`SessionState::apply`]. At runtime it is owned by a spawned task that
//! receives [`StoreCommand`]s over an unbounded channel and applies them in
//! arrival order, so no mutation ever observes another half-applied. Every
//! change is published as a [`SessionView`] on a `watch` channel.

use rapport_types::{
    ApiFailure, AsyncStatus, FormPatch, FormSnapshot, Message, NonEmptyString, OperationKind,
    OperationResult, OperationStatuses, StoredInteraction, SuggestionItem,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::render::{
    SUGGESTIONS_UPDATED, UPDATE_ACKNOWLEDGED, UPDATE_APOLOGY, history_message, summary_message,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store has shut down")]
    StoreClosed,
    #[error(transparent)]
    InvalidField(#[from] rapport_types::FieldValueError),
    #[error("operation task failed: {0}")]
    OperationTask(String),
}

/// How the store treats results that arrive late.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorePolicy {
    /// Drop a suggestions result whose HCP name no longer matches the form.
    pub discard_stale_suggestions: bool,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self {
            discard_stale_suggestions: true,
        }
    }
}

/// The resolved outcome of one issued operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub kind: OperationKind,
    /// HCP name a lookup was issued for.
    pub subject: Option<NonEmptyString>,
    pub result: OperationResult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    SetFormFields(FormPatch),
    AppendMessage(Message),
    Begin(OperationKind),
    Complete(Completion),
}

/// Read-only copy of the session as last published.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub form: FormSnapshot,
    pub messages: Vec<Message>,
    pub records: Vec<StoredInteraction>,
    pub suggestions: Vec<SuggestionItem>,
    /// Latest lifecycle transition of any operation.
    pub status: AsyncStatus,
    pub statuses: OperationStatuses,
    /// Kept after later successes; cleared by nothing.
    pub last_error: Option<ApiFailure>,
    /// Failed completions so far. Tells repeated failures apart even when a
    /// watcher misses the Pending state between them.
    pub failures: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    view: SessionView,
    policy: StorePolicy,
}

impl SessionState {
    #[must_use]
    pub fn new(form: FormSnapshot, policy: StorePolicy) -> Self {
        Self {
            view: SessionView {
                form,
                messages: Vec::new(),
                records: Vec::new(),
                suggestions: Vec::new(),
                status: AsyncStatus::Idle,
                statuses: OperationStatuses::default(),
                last_error: None,
                failures: 0,
            },
            policy,
        }
    }

    #[must_use]
    pub fn view(&self) -> &SessionView {
        &self.view
    }

    /// Apply one mutation. Returns whether anything observable changed.
    pub fn apply(&mut self, mutation: Mutation) -> bool {
        match mutation {
            Mutation::SetFormFields(patch) => !self.view.form.apply(&patch).is_empty(),
            Mutation::AppendMessage(message) => {
                self.view.messages.push(message);
                true
            }
            Mutation::Begin(kind) => {
                tracing::debug!(operation = %kind, "Operation pending");
                self.set_status(kind, AsyncStatus::Pending);
                true
            }
            Mutation::Complete(completion) => {
                self.complete(completion);
                true
            }
        }
    }

    fn set_status(&mut self, kind: OperationKind, status: AsyncStatus) {
        self.view.status = status;
        self.view.statuses.set(kind, status);
    }

    fn complete(&mut self, completion: Completion) {
        let Completion {
            kind,
            subject,
            result,
        } = completion;
        let subject_text = subject.as_ref().map_or("", NonEmptyString::as_str);

        if let OperationResult::Failure(failure) = result {
            tracing::debug!(operation = %kind, failure = %failure.diagnostic(), "Operation failed");
            self.set_status(kind, AsyncStatus::Failed);
            self.view.last_error = Some(failure);
            self.view.failures += 1;
            if kind == OperationKind::ConversationalUpdate {
                self.view.messages.push(Message::notice(UPDATE_APOLOGY));
            }
            return;
        }

        tracing::debug!(operation = %kind, "Operation succeeded");
        self.set_status(kind, AsyncStatus::Succeeded);

        match result {
            OperationResult::Created(record) => self.view.records.push(record),
            OperationResult::ConversationPatch(patch) => {
                self.view.form.apply(&patch);
                self.view.messages.push(Message::notice(UPDATE_ACKNOWLEDGED));
            }
            OperationResult::History(page) => {
                self.view
                    .messages
                    .push(history_message(subject_text, &page));
            }
            OperationResult::Summary(summary) => {
                self.view
                    .messages
                    .push(summary_message(subject_text, &summary));
            }
            OperationResult::Suggestions(items) => {
                if self.is_stale(subject.as_ref()) {
                    tracing::warn!(
                        subject = subject_text,
                        current = %self.view.form.hcp_name.trim(),
                        "Dropping suggestions for a previous HCP name"
                    );
                    return;
                }
                self.view.suggestions = items;
                self.view
                    .messages
                    .push(Message::notice(SUGGESTIONS_UPDATED));
            }
            OperationResult::Failure(_) => {}
        }
    }

    fn is_stale(&self, subject: Option<&NonEmptyString>) -> bool {
        self.policy.discard_stale_suggestions
            && subject.is_some_and(|name| name.as_str() != self.view.form.hcp_name.trim())
    }
}

pub enum StoreCommand {
    Mutate(Mutation),
    /// Reply with the view after every earlier command has been applied.
    Snapshot(oneshot::Sender<SessionView>),
}

/// Cloneable handle to the store task.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    tx: mpsc::UnboundedSender<StoreCommand>,
    view: watch::Receiver<SessionView>,
}

impl std::fmt::Debug for StoreCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mutate(mutation) => f.debug_tuple("Mutate").field(mutation).finish(),
            Self::Snapshot(_) => f.write_str("Snapshot"),
        }
    }
}

impl StoreHandle {
    /// Spawn the writer task. It runs until every handle is dropped.
    #[must_use]
    pub fn spawn(state: SessionState) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<StoreCommand>();
        let (view_tx, view_rx) = watch::channel(state.view().clone());

        let task = tokio::spawn(async move {
            let mut state = state;
            while let Some(command) = rx.recv().await {
                match command {
                    StoreCommand::Mutate(mutation) => {
                        if state.apply(mutation) {
                            view_tx.send_replace(state.view().clone());
                        }
                    }
                    StoreCommand::Snapshot(reply) => {
                        let _ = reply.send(state.view().clone());
                    }
                }
            }
            tracing::debug!("Session store stopped");
        });

        (Self { tx, view: view_rx }, task)
    }

    pub fn submit(&self, mutation: Mutation) -> Result<(), SessionError> {
        self.tx
            .send(StoreCommand::Mutate(mutation))
            .map_err(|_| SessionError::StoreClosed)
    }

    /// The view after all previously submitted mutations.
    pub async fn snapshot(&self) -> Result<SessionView, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::Snapshot(reply_tx))
            .map_err(|_| SessionError::StoreClosed)?;
        reply_rx.await.map_err(|_| SessionError::StoreClosed)
    }

    /// Latest published view, without waiting for queued mutations.
    #[must_use]
    pub fn current(&self) -> SessionView {
        self.view.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }
}
