//! Issues remote operations and feeds their outcomes back to the store.
//!
//! `issue` records the Pending transition before the request leaves, then
//! runs the call on its own task. The completion is submitted to the store
//! when the call resolves, so transcript order follows completion order.

use std::sync::Arc;

use rapport_client::Backend;
use rapport_types::{ApiFailure, FormPatch, FormSnapshot, OperationKind, OperationResult};
use tokio::task::JoinHandle;

use crate::dispatch::OperationRequest;
use crate::store::{Completion, Mutation, SessionError, StoreHandle};

/// An issued operation that may still be in flight.
#[derive(Debug)]
pub struct PendingOperation {
    kind: OperationKind,
    task: JoinHandle<()>,
}

impl PendingOperation {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Wait until the outcome has been handed to the store.
    pub async fn finished(self) -> Result<(), SessionError> {
        self.task
            .await
            .map_err(|e| SessionError::OperationTask(e.to_string()))
    }
}

#[derive(Clone)]
pub struct Gateway {
    backend: Arc<dyn Backend>,
    store: StoreHandle,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway").finish_non_exhaustive()
    }
}

impl Gateway {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, store: StoreHandle) -> Self {
        Self { backend, store }
    }

    pub fn issue(&self, request: OperationRequest) -> Result<PendingOperation, SessionError> {
        let kind = request.kind();
        self.store.submit(Mutation::Begin(kind))?;

        let backend = Arc::clone(&self.backend);
        let store = self.store.clone();
        let task = tokio::spawn(async move {
            let subject = request.subject().cloned();
            let result = execute(backend.as_ref(), request).await;
            let completion = Completion {
                kind,
                subject,
                result,
            };
            if store.submit(Mutation::Complete(completion)).is_err() {
                tracing::warn!(operation = %kind, "Store closed before operation completed");
            }
        });

        Ok(PendingOperation { kind, task })
    }
}

/// Perform one request and normalize its outcome.
pub async fn execute(backend: &dyn Backend, request: OperationRequest) -> OperationResult {
    let outcome = match request {
        OperationRequest::CreateRecord(record) => backend
            .create_interaction(&record)
            .await
            .map(OperationResult::Created),
        OperationRequest::ConversationalUpdate { message, current } => backend
            .conversation(message.as_str(), &current)
            .await
            .and_then(|merged| decode_patch(&merged, &current))
            .map(OperationResult::ConversationPatch),
        OperationRequest::FetchHistory(name) => backend
            .history(name.as_str())
            .await
            .map(OperationResult::History),
        OperationRequest::FetchSummary(name) => backend
            .summary(name.as_str())
            .await
            .map(OperationResult::Summary),
        OperationRequest::FetchSuggestions(name) => backend
            .suggestions(name.as_str())
            .await
            .map(OperationResult::Suggestions),
    };
    outcome.unwrap_or_else(OperationResult::Failure)
}

/// Decode the backend's merged form and keep only what it changed relative
/// to the snapshot that was sent, so edits made while the request was in
/// flight survive.
fn decode_patch(
    merged: &serde_json::Value,
    sent: &FormSnapshot,
) -> Result<FormPatch, ApiFailure> {
    let decoded =
        FormPatch::from_json(merged).map_err(|e| ApiFailure::MalformedResponse(e.to_string()))?;
    if !decoded.rejected.is_empty() {
        let fields: Vec<&str> = decoded.rejected.iter().map(|f| f.wire_name()).collect();
        tracing::warn!(fields = ?fields, "Ignoring invalid values in conversational update");
    }
    if !decoded.ignored.is_empty() {
        tracing::debug!(keys = ?decoded.ignored, "Ignoring unknown keys in conversational update");
    }
    Ok(decoded.patch.changes_from(sent))
}
