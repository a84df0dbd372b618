//! Utterance classification.
//!
//! Keyword routing over a fixed table, checked in priority order. The first
//! row with a matching keyword wins; anything else is a conversational update.

use std::fmt;

use rapport_types::OperationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    FetchHistory,
    FetchSummary,
    FetchSuggestions,
    UpdateForm,
}

impl Intent {
    /// The lookup operation this intent requests, if it is a lookup.
    #[must_use]
    pub const fn lookup(self) -> Option<OperationKind> {
        match self {
            Self::FetchHistory => Some(OperationKind::FetchHistory),
            Self::FetchSummary => Some(OperationKind::FetchSummary),
            Self::FetchSuggestions => Some(OperationKind::FetchSuggestions),
            Self::UpdateForm => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FetchHistory => "fetch_history",
            Self::FetchSummary => "fetch_summary",
            Self::FetchSuggestions => "fetch_suggestions",
            Self::UpdateForm => "update_form",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IntentSpec {
    pub intent: Intent,
    /// Lowercase substrings; any one of them selects `intent`.
    pub keywords: &'static [&'static str],
    pub description: &'static str,
}

/// Checked top to bottom.
const INTENT_SPECS: &[IntentSpec] = &[
    IntentSpec {
        intent: Intent::FetchHistory,
        keywords: &["history", "records"],
        description: "Show past interactions with the HCP",
    },
    IntentSpec {
        intent: Intent::FetchSummary,
        keywords: &["summary", "summarize"],
        description: "Summarize the relationship with the HCP",
    },
    IntentSpec {
        intent: Intent::FetchSuggestions,
        keywords: &["suggestion", "next step"],
        description: "Suggest next steps for the HCP",
    },
];

#[must_use]
pub fn intent_specs() -> &'static [IntentSpec] {
    INTENT_SPECS
}

/// Classify an utterance. Total: unmatched input is [`Intent::UpdateForm`].
///
/// Callers reject blank input before getting here.
#[must_use]
pub fn classify(utterance: &str) -> Intent {
    let lowered = utterance.to_lowercase();
    INTENT_SPECS
        .iter()
        .find(|spec| spec.keywords.iter().any(|kw| lowered.contains(kw)))
        .map_or(Intent::UpdateForm, |spec| spec.intent)
}
