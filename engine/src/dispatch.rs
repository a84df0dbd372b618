//! Turns a classified utterance into either a local reply or a request.

use rapport_types::{
    FormSnapshot, InteractionRecord, Message, NonEmptyStaticStr, NonEmptyString, OperationKind,
};

use crate::intent::Intent;

pub const MISSING_NAME_FOR_HISTORY: NonEmptyStaticStr =
    NonEmptyStaticStr::new("Please enter an HCP name in the form first to get their history.");
pub const MISSING_NAME_FOR_SUMMARY: NonEmptyStaticStr =
    NonEmptyStaticStr::new("Please enter an HCP name in the form first to get a summary.");
pub const MISSING_NAME_FOR_SUGGESTIONS: NonEmptyStaticStr =
    NonEmptyStaticStr::new("Please enter an HCP name in the form first to get suggestions.");

/// One remote operation with its typed input.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationRequest {
    CreateRecord(InteractionRecord),
    ConversationalUpdate {
        message: NonEmptyString,
        current: FormSnapshot,
    },
    FetchHistory(NonEmptyString),
    FetchSummary(NonEmptyString),
    FetchSuggestions(NonEmptyString),
}

impl OperationRequest {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::CreateRecord(_) => OperationKind::CreateRecord,
            Self::ConversationalUpdate { .. } => OperationKind::ConversationalUpdate,
            Self::FetchHistory(_) => OperationKind::FetchHistory,
            Self::FetchSummary(_) => OperationKind::FetchSummary,
            Self::FetchSuggestions(_) => OperationKind::FetchSuggestions,
        }
    }

    /// The HCP name a lookup was issued for.
    #[must_use]
    pub fn subject(&self) -> Option<&NonEmptyString> {
        match self {
            Self::FetchHistory(name) | Self::FetchSummary(name) | Self::FetchSuggestions(name) => {
                Some(name)
            }
            Self::CreateRecord(_) | Self::ConversationalUpdate { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Answered locally; nothing goes over the network.
    Reply(Message),
    Request(OperationRequest),
}

/// Outcome of dispatching one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// The user's utterance, appended before `action` is carried out.
    pub echo: Message,
    pub action: Action,
}

/// Decide what an utterance does against the current form.
///
/// Lookups need an HCP name; a blank or whitespace-only name yields the
/// matching warning as a local reply.
#[must_use]
pub fn dispatch(intent: Intent, utterance: NonEmptyString, form: &FormSnapshot) -> Dispatch {
    let echo = Message::user(utterance.clone());
    let subject = NonEmptyString::trimmed(&form.hcp_name).ok();

    let action = match (intent, subject) {
        (Intent::UpdateForm, _) => Action::Request(OperationRequest::ConversationalUpdate {
            message: utterance,
            current: form.clone(),
        }),
        (Intent::FetchHistory, Some(name)) => Action::Request(OperationRequest::FetchHistory(name)),
        (Intent::FetchSummary, Some(name)) => Action::Request(OperationRequest::FetchSummary(name)),
        (Intent::FetchSuggestions, Some(name)) => {
            Action::Request(OperationRequest::FetchSuggestions(name))
        }
        (Intent::FetchHistory, None) => Action::Reply(Message::notice(MISSING_NAME_FOR_HISTORY)),
        (Intent::FetchSummary, None) => Action::Reply(Message::notice(MISSING_NAME_FOR_SUMMARY)),
        (Intent::FetchSuggestions, None) => {
            Action::Reply(Message::notice(MISSING_NAME_FOR_SUGGESTIONS))
        }
    };

    Dispatch { echo, action }
}
