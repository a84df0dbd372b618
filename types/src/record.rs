//! Interaction records as exchanged with the backend.

use serde::{Deserialize, Serialize};

use crate::form::{InteractionType, Sentiment};

/// The submittable record built from a [`FormSnapshot`](crate::FormSnapshot).
///
/// Unlike the form, every list-shaped field is an actual list here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub hcp_name: String,
    pub interaction_type: InteractionType,
    pub date: String,
    pub time: String,
    pub attendees: Vec<String>,
    pub topics_discussed: String,
    pub sentiment: Sentiment,
    pub outcomes: String,
    pub follow_up_actions: Vec<String>,
    pub materials_shared: Vec<String>,
    pub samples_distributed: Vec<String>,
    pub ai_suggested_followups: Vec<String>,
}

/// A record as stored by the backend: the created-record echo and the
/// entries of a history page.
///
/// Decoding is lenient. Enumerated fields stay as text because they are only
/// ever displayed, and any field the backend omits falls back to its default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredInteraction {
    pub id: Option<i64>,
    pub hcp_name: String,
    pub interaction_type: String,
    pub date: String,
    pub time: Option<String>,
    pub attendees: Option<Vec<String>>,
    pub topics_discussed: String,
    pub voice_note_summary: Option<String>,
    pub materials_shared: Option<Vec<String>>,
    pub samples_distributed: Option<Vec<String>>,
    pub sentiment: Option<String>,
    pub outcomes: Option<String>,
    pub follow_up_actions: Option<Vec<String>>,
    pub ai_suggested_followups: Option<Vec<String>>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}
