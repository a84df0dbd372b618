//! Core engine for Rapport: conversation-to-form reconciliation.
//!
//! # Architecture
//!
//! ```text
//! utterance -> intent::classify -> dispatch::dispatch -> Gateway::issue -> store task
//!                                                                              |
//!                          debounce trigger <- watch<SessionView> <------------+
//! ```
//!
//! - [`intent`] - keyword routing of chat input.
//! - [`dispatch`] - local replies versus remote requests.
//! - [`Gateway`] - runs one backend call per request and hands the normalized
//!   result to the store.
//! - [`store`] - the single writer owning the form, transcript, suggestions
//!   and status.
//! - [`debounce`] - fetches suggestions after the HCP name stops changing.
//! - [`render`] - text for replies and read-only views.
//!
//! [`Session`] wires these together.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use rapport_client::{self, Backend, ClientConfig, HttpBackend};
pub use rapport_types::{
    ApiFailure, AsyncStatus, FormField, FormPatch, FormSnapshot, Message, NonEmptyString,
    OperationKind, OperationResult, OperationStatuses, Sender, SuggestionItem,
};

mod config;
pub mod debounce;
pub mod dispatch;
mod gateway;
pub mod intent;
pub mod render;
pub mod store;

#[cfg(test)]
mod tests;

pub use config::{
    BACKEND_URL_ENV, BackendConfig, ConfigError, EngineSettings, RapportConfig,
    SuggestionsConfig, config_path, expand_env_vars,
};
pub use debounce::{DebounceSettings, spawn_suggestion_trigger};
pub use dispatch::{Action, Dispatch, OperationRequest};
pub use gateway::{Gateway, PendingOperation, execute};
pub use intent::{Intent, classify};
pub use store::{SessionError, SessionView, StoreHandle, StorePolicy};

use store::{Mutation, SessionState};

/// What [`Session::send`] did with the input.
#[derive(Debug)]
pub enum SendOutcome {
    /// Blank input; nothing was recorded.
    Ignored,
    /// Answered locally, e.g. a lookup without an HCP name.
    Replied,
    Requested(PendingOperation),
}

/// One assistant session: a store task, a gateway, and the suggestions
/// trigger. Must be started inside a Tokio runtime.
///
/// Dropping the session cancels the trigger; in-flight requests still
/// complete into the store.
#[derive(Debug)]
pub struct Session {
    store: StoreHandle,
    gateway: Gateway,
    shutdown: CancellationToken,
    trigger: Option<JoinHandle<()>>,
}

impl Session {
    #[must_use]
    pub fn start(backend: Arc<dyn Backend>, form: FormSnapshot, settings: EngineSettings) -> Self {
        let (store, _store_task) = StoreHandle::spawn(SessionState::new(form, settings.store));
        let gateway = Gateway::new(backend, store.clone());
        let shutdown = CancellationToken::new();
        let trigger = spawn_suggestion_trigger(
            gateway.clone(),
            store.subscribe(),
            settings.debounce,
            shutdown.child_token(),
        );
        tracing::debug!(?settings, "Session started");

        Self {
            store,
            gateway,
            shutdown,
            trigger: Some(trigger),
        }
    }

    /// Handle one chat input.
    ///
    /// The utterance is appended to the transcript before anything else
    /// happens, including local rejections.
    pub async fn send(&self, input: &str) -> Result<SendOutcome, SessionError> {
        let Ok(utterance) = NonEmptyString::new(input) else {
            return Ok(SendOutcome::Ignored);
        };

        let view = self.store.snapshot().await?;
        let intent = classify(utterance.as_str());
        tracing::debug!(%intent, "Classified input");
        let Dispatch { echo, action } = dispatch::dispatch(intent, utterance, &view.form);

        self.store.submit(Mutation::AppendMessage(echo))?;
        match action {
            Action::Reply(reply) => {
                self.store.submit(Mutation::AppendMessage(reply))?;
                Ok(SendOutcome::Replied)
            }
            Action::Request(request) => self.gateway.issue(request).map(SendOutcome::Requested),
        }
    }

    /// Direct edit: overwrite the fields present in `patch`.
    pub fn edit_form(&self, patch: FormPatch) -> Result<(), SessionError> {
        self.store.submit(Mutation::SetFormFields(patch))
    }

    /// Direct edit of one field by its wire name.
    pub fn set_field(&self, name: &str, raw: &str) -> Result<(), SessionError> {
        let patch = FormPatch::from_named_input(name, raw)?;
        self.edit_form(patch)
    }

    /// Submit the current form as a new interaction record.
    pub async fn submit(&self) -> Result<PendingOperation, SessionError> {
        let view = self.store.snapshot().await?;
        let record = view.form.to_record(&view.suggestions);
        self.gateway.issue(OperationRequest::CreateRecord(record))
    }

    /// Latest published view.
    #[must_use]
    pub fn view(&self) -> SessionView {
        self.store.current()
    }

    /// View after every mutation submitted so far has been applied.
    pub async fn snapshot(&self) -> Result<SessionView, SessionError> {
        self.store.snapshot().await
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.store.subscribe()
    }

    /// Stop the suggestions trigger and wait for it to exit. Any armed
    /// timer is dropped without firing.
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        if let Some(trigger) = self.trigger.take()
            && let Err(e) = trigger.await
        {
            tracing::warn!(error = %e, "Suggestions trigger ended abnormally");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
