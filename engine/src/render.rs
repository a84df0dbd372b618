//! Text rendering for assistant replies and the read-only views.
//!
//! Everything here is a pure function of its inputs.

use rapport_types::{
    ApiFailure, AsyncStatus, FormField, FormSnapshot, HistoryPage, Message, NonEmptyStaticStr,
    NonEmptyString, Sender, StoredInteraction, SuggestionItem, Summary, format_failure,
};

pub const UPDATE_ACKNOWLEDGED: NonEmptyStaticStr =
    NonEmptyStaticStr::new("OK, I've updated the details. Is there anything else?");
pub const UPDATE_APOLOGY: NonEmptyStaticStr =
    NonEmptyStaticStr::new("Sorry, I couldn't process that. Please try rephrasing.");
pub const SUGGESTIONS_UPDATED: NonEmptyStaticStr =
    NonEmptyStaticStr::new("I've updated the suggested next steps based on the history.");

pub const EMPTY_TRANSCRIPT_PLACEHOLDER: &str = "Describe an interaction or ask for help.";
pub const EMPTY_SUGGESTIONS_PLACEHOLDER: &str = "Enter an HCP name to generate suggestions.";

const HISTORY_HEADER: NonEmptyStaticStr = NonEmptyStaticStr::new("Here is the history for ");
const SUMMARY_HEADER: NonEmptyStaticStr = NonEmptyStaticStr::new("Here is the summary for ");

/// `On {date}: A {type} about "{topics}" resulted in "{outcomes}".`
#[must_use]
pub fn history_line(item: &StoredInteraction) -> String {
    format!(
        "On {}: A {} about \"{}\" resulted in \"{}\".",
        item.date,
        item.interaction_type,
        item.topics_discussed,
        item.outcomes.as_deref().unwrap_or_default()
    )
}

/// One message for a whole history page, one line per past record.
#[must_use]
pub fn history_message(subject: &str, page: &HistoryPage) -> Message {
    let lines: Vec<String> = page.data.iter().map(history_line).collect();
    let text = NonEmptyString::from(HISTORY_HEADER)
        .append(subject)
        .append(":\n")
        .append(lines.join("\n"));
    Message::assistant(text)
}

/// The summary body without the header line.
#[must_use]
pub fn summary_body(summary: &Summary) -> String {
    format!(
        "Status: {}\n\nTakeaways:\n- {}\n\nFocus: {}",
        summary.relationship_status,
        summary.key_takeaways.join("\n- "),
        summary.suggested_focus
    )
}

#[must_use]
pub fn summary_message(subject: &str, summary: &Summary) -> Message {
    let text = NonEmptyString::from(SUMMARY_HEADER)
        .append(subject)
        .append(":\n")
        .append(summary_body(summary));
    Message::assistant(text)
}

/// A transcript message prepared for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry<'a> {
    pub sender: Sender,
    pub label: &'static str,
    pub lines: Vec<&'a str>,
}

impl TranscriptEntry<'_> {
    /// `label: first line`, continuation lines indented under it.
    #[must_use]
    pub fn to_text(&self) -> String {
        let indent = " ".repeat(self.label.len() + 2);
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i == 0 {
                out.push_str(&format!("{}: {line}", self.label));
            } else {
                out.push('\n');
                if !line.is_empty() {
                    out.push_str(&indent);
                    out.push_str(line);
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptView<'a> {
    Placeholder(&'static str),
    Entries(Vec<TranscriptEntry<'a>>),
}

#[must_use]
pub const fn sender_label(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "You",
        Sender::Assistant => "Assistant",
    }
}

#[must_use]
pub fn render_entry(message: &Message) -> TranscriptEntry<'_> {
    TranscriptEntry {
        sender: message.sender(),
        label: sender_label(message.sender()),
        lines: message.text().split('\n').collect(),
    }
}

#[must_use]
pub fn render_transcript(messages: &[Message]) -> TranscriptView<'_> {
    if messages.is_empty() {
        return TranscriptView::Placeholder(EMPTY_TRANSCRIPT_PLACEHOLDER);
    }
    TranscriptView::Entries(messages.iter().map(render_entry).collect())
}

/// `- {suggestion}` followed by an indented rationale line, in received order.
#[must_use]
pub fn render_suggestions(items: &[SuggestionItem]) -> Vec<String> {
    if items.is_empty() {
        return vec![EMPTY_SUGGESTIONS_PLACEHOLDER.to_string()];
    }
    items
        .iter()
        .flat_map(|item| {
            [
                format!("- {}", item.suggestion),
                format!("  Rationale: {}", item.rationale),
            ]
        })
        .collect()
}

/// Aligned `field  value` rows for every form field, in form order.
#[must_use]
pub fn render_form(form: &FormSnapshot) -> Vec<String> {
    let width = FormField::ALL
        .iter()
        .map(|field| field.wire_name().len())
        .max()
        .unwrap_or_default();
    FormField::ALL
        .iter()
        .map(|field| {
            let value = form.field_text(*field).replace('\n', " / ");
            format!("{:<width$}  {value}", field.wire_name())
        })
        .collect()
}

/// The form-level error line; only shown while the status is Failed.
#[must_use]
pub fn status_line(status: AsyncStatus, last_error: Option<&ApiFailure>) -> Option<String> {
    (status == AsyncStatus::Failed).then(|| format_failure(last_error))
}
