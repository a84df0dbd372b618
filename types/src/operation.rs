//! Operation identities, lifecycle status, and typed results.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::failure::ApiFailure;
use crate::form::FormPatch;
use crate::record::StoredInteraction;

/// The five remote operations the assistant can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateRecord,
    ConversationalUpdate,
    FetchHistory,
    FetchSummary,
    FetchSuggestions,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        Self::CreateRecord,
        Self::ConversationalUpdate,
        Self::FetchHistory,
        Self::FetchSummary,
        Self::FetchSuggestions,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateRecord => "create_record",
            Self::ConversationalUpdate => "conversational_update",
            Self::FetchHistory => "fetch_history",
            Self::FetchSummary => "fetch_summary",
            Self::FetchSuggestions => "fetch_suggestions",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::CreateRecord => 0,
            Self::ConversationalUpdate => 1,
            Self::FetchHistory => 2,
            Self::FetchSummary => 3,
            Self::FetchSuggestions => 4,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsyncStatus {
    #[default]
    Idle,
    Pending,
    Succeeded,
    Failed,
}

impl AsyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for AsyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of each operation kind, tracked independently.
///
/// Overlapping operations of different kinds no longer mask each other here,
/// unlike the single latest-transition flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationStatuses([AsyncStatus; 5]);

impl OperationStatuses {
    #[must_use]
    pub fn get(&self, kind: OperationKind) -> AsyncStatus {
        self.0[kind.index()]
    }

    pub fn set(&mut self, kind: OperationKind, status: AsyncStatus) {
        self.0[kind.index()] = status;
    }

    #[must_use]
    pub fn any_pending(&self) -> bool {
        self.0.contains(&AsyncStatus::Pending)
    }

    pub fn iter(&self) -> impl Iterator<Item = (OperationKind, AsyncStatus)> + '_ {
        OperationKind::ALL
            .into_iter()
            .map(|kind| (kind, self.get(kind)))
    }
}

/// One next-step suggestion; order is preserved exactly as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionItem {
    pub suggestion: String,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub relationship_status: String,
    pub key_takeaways: Vec<String>,
    pub suggested_focus: String,
}

/// History endpoint payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub data: Vec<StoredInteraction>,
    /// Passed through untouched; never rendered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Value>,
}

/// Typed outcome of one remote operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    Created(StoredInteraction),
    ConversationPatch(FormPatch),
    History(HistoryPage),
    Summary(Summary),
    Suggestions(Vec<SuggestionItem>),
    Failure(ApiFailure),
}
