//! Interaction form model.
//!
//! [`FormSnapshot`] is the fixed-shape record the user fills in, either by
//! editing fields directly or through conversational updates. Every write
//! goes through a [`FormPatch`], so the field set can never grow: keys the
//! backend invents have nowhere to land.

use std::fmt;

use chrono::{Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::operation::SuggestionItem;
use crate::record::InteractionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InteractionType {
    #[default]
    Meeting,
    Call,
    Virtual,
}

impl InteractionType {
    pub const ALL: [InteractionType; 3] = [Self::Meeting, Self::Call, Self::Virtual];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Meeting => "Meeting",
            Self::Call => "Call",
            Self::Virtual => "Virtual",
        }
    }

    /// Case-insensitive parse of the display name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed or inferred sentiment of the contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Self::Positive, Self::Neutral, Self::Negative];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "Positive",
            Self::Neutral => "Neutral",
            Self::Negative => "Negative",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|sentiment| sentiment.as_str().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of form fields, named as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    HcpName,
    InteractionType,
    Date,
    Time,
    Attendees,
    TopicsDiscussed,
    Sentiment,
    Outcomes,
    FollowUpActions,
    MaterialsShared,
    SamplesDistributed,
}

impl FormField {
    pub const ALL: [FormField; 11] = [
        Self::HcpName,
        Self::InteractionType,
        Self::Date,
        Self::Time,
        Self::Attendees,
        Self::TopicsDiscussed,
        Self::Sentiment,
        Self::Outcomes,
        Self::FollowUpActions,
        Self::MaterialsShared,
        Self::SamplesDistributed,
    ];

    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::HcpName => "hcp_name",
            Self::InteractionType => "interaction_type",
            Self::Date => "date",
            Self::Time => "time",
            Self::Attendees => "attendees",
            Self::TopicsDiscussed => "topics_discussed",
            Self::Sentiment => "sentiment",
            Self::Outcomes => "outcomes",
            Self::FollowUpActions => "follow_up_actions",
            Self::MaterialsShared => "materials_shared",
            Self::SamplesDistributed => "samples_distributed",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|field| field.wire_name() == name)
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldValueError {
    #[error("unknown form field '{0}'")]
    UnknownField(String),
    #[error("'{value}' is not a valid {field}; expected one of: {expected}")]
    InvalidChoice {
        field: FormField,
        value: String,
        expected: &'static str,
    },
}

/// Current contents of the interaction form.
///
/// Text fields hold exactly what the user typed. `attendees` and
/// `follow_up_actions` stay free text here; they only become lists when the
/// form is materialized into an [`InteractionRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSnapshot {
    pub hcp_name: String,
    pub interaction_type: InteractionType,
    pub date: String,
    pub time: String,
    pub attendees: String,
    pub topics_discussed: String,
    pub sentiment: Sentiment,
    pub outcomes: String,
    pub follow_up_actions: String,
    pub materials_shared: Vec<String>,
    pub samples_distributed: Vec<String>,
}

impl FormSnapshot {
    /// Blank form stamped with the given date and time.
    #[must_use]
    pub fn at(date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            hcp_name: String::new(),
            interaction_type: InteractionType::default(),
            date: date.format("%Y-%m-%d").to_string(),
            time: time.format("%H:%M").to_string(),
            attendees: String::new(),
            topics_discussed: String::new(),
            sentiment: Sentiment::default(),
            outcomes: String::new(),
            follow_up_actions: String::new(),
            materials_shared: Vec::new(),
            samples_distributed: Vec::new(),
        }
    }

    /// Blank form stamped with the local clock.
    #[must_use]
    pub fn new_session() -> Self {
        let now = Local::now();
        Self::at(now.date_naive(), now.time())
    }

    /// Shallow merge: every field present in `patch` overwrites, the rest are
    /// untouched. Returns the fields whose value actually changed.
    pub fn apply(&mut self, patch: &FormPatch) -> Vec<FormField> {
        fn assign<T: PartialEq + Clone>(
            slot: &mut T,
            value: Option<&T>,
            field: FormField,
            changed: &mut Vec<FormField>,
        ) {
            if let Some(value) = value
                && *slot != *value
            {
                *slot = value.clone();
                changed.push(field);
            }
        }

        let mut changed = Vec::new();

        assign(
            &mut self.hcp_name,
            patch.hcp_name.as_ref(),
            FormField::HcpName,
            &mut changed,
        );
        assign(
            &mut self.interaction_type,
            patch.interaction_type.as_ref(),
            FormField::InteractionType,
            &mut changed,
        );
        assign(&mut self.date, patch.date.as_ref(), FormField::Date, &mut changed);
        assign(&mut self.time, patch.time.as_ref(), FormField::Time, &mut changed);
        assign(
            &mut self.attendees,
            patch.attendees.as_ref(),
            FormField::Attendees,
            &mut changed,
        );
        assign(
            &mut self.topics_discussed,
            patch.topics_discussed.as_ref(),
            FormField::TopicsDiscussed,
            &mut changed,
        );
        assign(
            &mut self.sentiment,
            patch.sentiment.as_ref(),
            FormField::Sentiment,
            &mut changed,
        );
        assign(
            &mut self.outcomes,
            patch.outcomes.as_ref(),
            FormField::Outcomes,
            &mut changed,
        );
        assign(
            &mut self.follow_up_actions,
            patch.follow_up_actions.as_ref(),
            FormField::FollowUpActions,
            &mut changed,
        );
        assign(
            &mut self.materials_shared,
            patch.materials_shared.as_ref(),
            FormField::MaterialsShared,
            &mut changed,
        );
        assign(
            &mut self.samples_distributed,
            patch.samples_distributed.as_ref(),
            FormField::SamplesDistributed,
            &mut changed,
        );

        changed
    }

    /// Display text of a field. List fields are joined with ", ".
    #[must_use]
    pub fn field_text(&self, field: FormField) -> String {
        match field {
            FormField::HcpName => self.hcp_name.clone(),
            FormField::InteractionType => self.interaction_type.to_string(),
            FormField::Date => self.date.clone(),
            FormField::Time => self.time.clone(),
            FormField::Attendees => self.attendees.clone(),
            FormField::TopicsDiscussed => self.topics_discussed.clone(),
            FormField::Sentiment => self.sentiment.to_string(),
            FormField::Outcomes => self.outcomes.clone(),
            FormField::FollowUpActions => self.follow_up_actions.clone(),
            FormField::MaterialsShared => self.materials_shared.join(", "),
            FormField::SamplesDistributed => self.samples_distributed.join(", "),
        }
    }

    /// Materialize the submittable record.
    ///
    /// `attendees` is split on commas and `follow_up_actions` on line breaks;
    /// both drop empty entries. `ai_suggested_followups` carries the text of
    /// the suggestions currently on screen.
    #[must_use]
    pub fn to_record(&self, suggestions: &[SuggestionItem]) -> InteractionRecord {
        InteractionRecord {
            hcp_name: self.hcp_name.trim().to_string(),
            interaction_type: self.interaction_type,
            date: self.date.clone(),
            time: self.time.clone(),
            attendees: split_items(&self.attendees, ','),
            topics_discussed: self.topics_discussed.clone(),
            sentiment: self.sentiment,
            outcomes: self.outcomes.clone(),
            follow_up_actions: split_items(&self.follow_up_actions, '\n'),
            materials_shared: self.materials_shared.clone(),
            samples_distributed: self.samples_distributed.clone(),
            ai_suggested_followups: suggestions
                .iter()
                .map(|item| item.suggestion.clone())
                .collect(),
        }
    }
}

impl Default for FormSnapshot {
    fn default() -> Self {
        Self::new_session()
    }
}

fn split_items(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// A partial form: `Some` fields overwrite, `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hcp_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_type: Option<InteractionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics_discussed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcomes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_actions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materials_shared: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples_distributed: Option<Vec<String>>,
}

/// Result of decoding a backend-provided patch object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedPatch {
    pub patch: FormPatch,
    /// Known fields whose value had the wrong type or an invalid choice.
    pub rejected: Vec<FormField>,
    /// Keys that are not form fields at all.
    pub ignored: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("form patch must be a JSON object, got {kind}")]
pub struct PatchShapeError {
    pub kind: &'static str,
}

impl FormPatch {
    /// Single-field patch from user-entered text.
    ///
    /// Enum fields must name one of their variants. List fields split the
    /// text on commas, which is how list entry works in a single text input.
    pub fn from_input(field: FormField, raw: &str) -> Result<Self, FieldValueError> {
        let mut patch = Self::default();
        match field {
            FormField::HcpName => patch.hcp_name = Some(raw.to_string()),
            FormField::InteractionType => {
                let kind =
                    InteractionType::parse(raw).ok_or_else(|| FieldValueError::InvalidChoice {
                        field,
                        value: raw.to_string(),
                        expected: "Meeting, Call, Virtual",
                    })?;
                patch.interaction_type = Some(kind);
            }
            FormField::Date => patch.date = Some(raw.to_string()),
            FormField::Time => patch.time = Some(raw.to_string()),
            FormField::Attendees => patch.attendees = Some(raw.to_string()),
            FormField::TopicsDiscussed => patch.topics_discussed = Some(raw.to_string()),
            FormField::Sentiment => {
                let sentiment =
                    Sentiment::parse(raw).ok_or_else(|| FieldValueError::InvalidChoice {
                        field,
                        value: raw.to_string(),
                        expected: "Positive, Neutral, Negative",
                    })?;
                patch.sentiment = Some(sentiment);
            }
            FormField::Outcomes => patch.outcomes = Some(raw.to_string()),
            FormField::FollowUpActions => patch.follow_up_actions = Some(raw.to_string()),
            FormField::MaterialsShared => patch.materials_shared = Some(split_items(raw, ',')),
            FormField::SamplesDistributed => {
                patch.samples_distributed = Some(split_items(raw, ','));
            }
        }
        Ok(patch)
    }

    /// Same as [`FormPatch::from_input`] but looks the field up by wire name.
    pub fn from_named_input(name: &str, raw: &str) -> Result<Self, FieldValueError> {
        let field =
            FormField::parse(name).ok_or_else(|| FieldValueError::UnknownField(name.to_string()))?;
        Self::from_input(field, raw)
    }

    /// Decode a patch object returned by the backend, one key at a time.
    ///
    /// A bad value for one field does not poison the others: it is reported
    /// in [`DecodedPatch::rejected`] and left out of the patch.
    pub fn from_json(value: &Value) -> Result<DecodedPatch, PatchShapeError> {
        let Value::Object(map) = value else {
            return Err(PatchShapeError {
                kind: json_kind(value),
            });
        };
        Ok(Self::from_json_map(map))
    }

    fn from_json_map(map: &Map<String, Value>) -> DecodedPatch {
        let mut decoded = DecodedPatch::default();

        for (key, value) in map {
            let Some(field) = FormField::parse(key) else {
                decoded.ignored.push(key.clone());
                continue;
            };
            let accepted = match field {
                FormField::HcpName => text_value(value).map(|v| decoded.patch.hcp_name = Some(v)),
                FormField::InteractionType => value
                    .as_str()
                    .and_then(InteractionType::parse)
                    .map(|v| decoded.patch.interaction_type = Some(v)),
                FormField::Date => text_value(value).map(|v| decoded.patch.date = Some(v)),
                FormField::Time => text_value(value).map(|v| decoded.patch.time = Some(v)),
                FormField::Attendees => joined_text_value(value, ", ")
                    .map(|v| decoded.patch.attendees = Some(v)),
                FormField::TopicsDiscussed => {
                    text_value(value).map(|v| decoded.patch.topics_discussed = Some(v))
                }
                FormField::Sentiment => value
                    .as_str()
                    .and_then(Sentiment::parse)
                    .map(|v| decoded.patch.sentiment = Some(v)),
                FormField::Outcomes => text_value(value).map(|v| decoded.patch.outcomes = Some(v)),
                FormField::FollowUpActions => joined_text_value(value, "\n")
                    .map(|v| decoded.patch.follow_up_actions = Some(v)),
                FormField::MaterialsShared => {
                    list_value(value).map(|v| decoded.patch.materials_shared = Some(v))
                }
                FormField::SamplesDistributed => {
                    list_value(value).map(|v| decoded.patch.samples_distributed = Some(v))
                }
            };
            if accepted.is_none() {
                decoded.rejected.push(field);
            }
        }

        decoded
    }

    /// Keep only the entries that differ from `base`.
    ///
    /// A backend that echoes the whole form it was sent would otherwise
    /// overwrite every field with its value at request time.
    #[must_use]
    pub fn changes_from(mut self, base: &FormSnapshot) -> Self {
        fn keep_changed<T: PartialEq>(slot: &mut Option<T>, base: &T) {
            if slot.as_ref() == Some(base) {
                *slot = None;
            }
        }

        keep_changed(&mut self.hcp_name, &base.hcp_name);
        keep_changed(&mut self.interaction_type, &base.interaction_type);
        keep_changed(&mut self.date, &base.date);
        keep_changed(&mut self.time, &base.time);
        keep_changed(&mut self.attendees, &base.attendees);
        keep_changed(&mut self.topics_discussed, &base.topics_discussed);
        keep_changed(&mut self.sentiment, &base.sentiment);
        keep_changed(&mut self.outcomes, &base.outcomes);
        keep_changed(&mut self.follow_up_actions, &base.follow_up_actions);
        keep_changed(&mut self.materials_shared, &base.materials_shared);
        keep_changed(&mut self.samples_distributed, &base.samples_distributed);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Fields this patch would write.
    #[must_use]
    pub fn fields(&self) -> Vec<FormField> {
        let present = [
            (FormField::HcpName, self.hcp_name.is_some()),
            (FormField::InteractionType, self.interaction_type.is_some()),
            (FormField::Date, self.date.is_some()),
            (FormField::Time, self.time.is_some()),
            (FormField::Attendees, self.attendees.is_some()),
            (FormField::TopicsDiscussed, self.topics_discussed.is_some()),
            (FormField::Sentiment, self.sentiment.is_some()),
            (FormField::Outcomes, self.outcomes.is_some()),
            (FormField::FollowUpActions, self.follow_up_actions.is_some()),
            (FormField::MaterialsShared, self.materials_shared.is_some()),
            (FormField::SamplesDistributed, self.samples_distributed.is_some()),
        ];
        present
            .into_iter()
            .filter_map(|(field, is_set)| is_set.then_some(field))
            .collect()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// Null clears a text field, matching how an absent value renders.
fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

fn joined_text_value(value: &Value, separator: &str) -> Option<String> {
    match value {
        Value::Array(items) => string_items(items).map(|items| items.join(separator)),
        other => text_value(other),
    }
}

fn list_value(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => string_items(items),
        Value::String(s) => Some(split_items(s, ',')),
        Value::Null => Some(Vec::new()),
        _ => None,
    }
}

fn string_items(items: &[Value]) -> Option<Vec<String>> {
    items
        .iter()
        .map(|item| item.as_str().map(ToString::to_string))
        .collect()
}
