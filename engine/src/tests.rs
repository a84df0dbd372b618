//! Session-level tests against an in-memory backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use rapport_types::{
    HistoryPage, InteractionRecord, InteractionType, Sentiment, StoredInteraction, Summary,
};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep};

use super::*;
use crate::dispatch::MISSING_NAME_FOR_SUMMARY;
use crate::render::{SUGGESTIONS_UPDATED, UPDATE_ACKNOWLEDGED, UPDATE_APOLOGY};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Call {
    kind: OperationKind,
    subject: String,
    at: Instant,
}

/// Backend double. Every call is recorded; individual operations can be
/// held back with a gate or slowed down with a delay.
#[derive(Default)]
struct FakeBackend {
    calls: Mutex<Vec<Call>>,
    created: Mutex<Vec<InteractionRecord>>,
    summary_gate: Mutex<Option<oneshot::Receiver<()>>>,
    conversation_gate: Mutex<Option<oneshot::Receiver<()>>>,
    conversation_replies: Mutex<VecDeque<Result<Value, ApiFailure>>>,
    /// Reply with the whole sent form merged with the queued update, the
    /// way the real conversation endpoint does.
    echo_form: bool,
    suggestions_delay: Option<Duration>,
}

impl FakeBackend {
    fn with_suggestions_delay(delay: Duration) -> Self {
        Self {
            suggestions_delay: Some(delay),
            ..Self::default()
        }
    }

    fn echoing_form() -> Self {
        Self {
            echo_form: true,
            ..Self::default()
        }
    }

    fn record(&self, kind: OperationKind, subject: &str) {
        self.calls.lock().unwrap().push(Call {
            kind,
            subject: subject.to_string(),
            at: Instant::now(),
        });
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn hold_summary(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.summary_gate.lock().unwrap() = Some(rx);
        tx
    }

    fn hold_conversation(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.conversation_gate.lock().unwrap() = Some(rx);
        tx
    }

    fn reply_to_conversation(&self, reply: Result<Value, ApiFailure>) {
        self.conversation_replies.lock().unwrap().push_back(reply);
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn create_interaction(
        &self,
        record: &InteractionRecord,
    ) -> Result<StoredInteraction, ApiFailure> {
        self.record(OperationKind::CreateRecord, &record.hcp_name);
        self.created.lock().unwrap().push(record.clone());
        Ok(StoredInteraction {
            id: Some(1),
            hcp_name: record.hcp_name.clone(),
            ..StoredInteraction::default()
        })
    }

    async fn conversation(
        &self,
        message: &str,
        current: &FormSnapshot,
    ) -> Result<Value, ApiFailure> {
        self.record(OperationKind::ConversationalUpdate, message);
        let gate = self.conversation_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let reply = self.conversation_replies.lock().unwrap().pop_front();
        let reply = reply.unwrap_or_else(|| Ok(json!({})));
        if !self.echo_form {
            return reply;
        }
        reply.map(|update| {
            let mut merged = serde_json::to_value(current).unwrap();
            if let (Some(fields), Value::Object(update)) = (merged.as_object_mut(), update) {
                fields.extend(update);
            }
            merged
        })
    }

    async fn history(&self, hcp_name: &str) -> Result<HistoryPage, ApiFailure> {
        self.record(OperationKind::FetchHistory, hcp_name);
        Ok(HistoryPage {
            data: vec![StoredInteraction {
                date: "2025-07-01".to_string(),
                interaction_type: "Call".to_string(),
                topics_discussed: "Dosing".to_string(),
                outcomes: Some("Agreed to trial".to_string()),
                ..StoredInteraction::default()
            }],
            pagination: None,
        })
    }

    async fn summary(&self, hcp_name: &str) -> Result<Summary, ApiFailure> {
        self.record(OperationKind::FetchSummary, hcp_name);
        let gate = self.summary_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(Summary {
            relationship_status: "Warm".to_string(),
            key_takeaways: vec![
                "Interested in trial data".to_string(),
                "Price sensitive".to_string(),
            ],
            suggested_focus: "Share trial results".to_string(),
        })
    }

    async fn suggestions(&self, hcp_name: &str) -> Result<Vec<SuggestionItem>, ApiFailure> {
        self.record(OperationKind::FetchSuggestions, hcp_name);
        if let Some(delay) = self.suggestions_delay {
            sleep(delay).await;
        }
        Ok(vec![SuggestionItem {
            suggestion: format!("Follow up with {hcp_name}"),
            rationale: "Last visit was positive".to_string(),
        }])
    }
}

fn blank_form() -> FormSnapshot {
    FormSnapshot::at(
        NaiveDate::from_ymd_opt(2025, 8, 20).unwrap(),
        NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
    )
}

fn form_for(name: &str) -> FormSnapshot {
    FormSnapshot {
        hcp_name: name.to_string(),
        ..blank_form()
    }
}

fn start(backend: &Arc<FakeBackend>, form: FormSnapshot) -> Session {
    let backend: Arc<dyn Backend> = backend.clone();
    Session::start(backend, form, EngineSettings::default())
}

async fn wait_until(session: &Session, pred: impl Fn(&SessionView) -> bool) -> SessionView {
    let mut rx = session.subscribe();
    let waited = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            {
                let view = rx.borrow_and_update();
                if pred(&view) {
                    return view.clone();
                }
            }
            rx.changed().await.unwrap();
        }
    })
    .await;
    waited.expect("session never reached the expected state")
}

fn texts(view: &SessionView) -> Vec<&str> {
    view.messages.iter().map(Message::text).collect()
}

#[tokio::test]
async fn blank_input_is_ignored() {
    let backend = Arc::new(FakeBackend::default());
    let session = start(&backend, blank_form());

    let outcome = session.send("   ").await.unwrap();

    assert!(matches!(outcome, SendOutcome::Ignored));
    assert!(session.snapshot().await.unwrap().messages.is_empty());
}

#[tokio::test]
async fn summary_without_name_replies_locally() {
    let backend = Arc::new(FakeBackend::default());
    let session = start(&backend, blank_form());

    let outcome = session.send("Can you give me a summary?").await.unwrap();
    assert!(matches!(outcome, SendOutcome::Replied));

    let view = session.snapshot().await.unwrap();
    assert_eq!(
        texts(&view),
        vec!["Can you give me a summary?", MISSING_NAME_FOR_SUMMARY.as_str()]
    );
    assert_eq!(view.messages[0].sender(), Sender::User);
    assert_eq!(view.messages[1].sender(), Sender::Assistant);
    assert_eq!(view.status, AsyncStatus::Idle);
    assert!(!view.statuses.any_pending());
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn every_lookup_without_name_issues_no_calls() {
    let backend = Arc::new(FakeBackend::default());
    let session = start(&backend, form_for("  "));

    for input in ["show history", "summarize", "next step?"] {
        let outcome = session.send(input).await.unwrap();
        assert!(matches!(outcome, SendOutcome::Replied), "{input}");
    }

    let view = session.snapshot().await.unwrap();
    assert_eq!(view.messages.len(), 6);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn summary_reply_is_formatted() {
    let backend = Arc::new(FakeBackend::default());
    let session = start(&backend, form_for("Dr. Smith"));

    let SendOutcome::Requested(op) = session.send("summary please").await.unwrap() else {
        panic!("expected a request");
    };
    assert_eq!(op.kind(), OperationKind::FetchSummary);
    op.finished().await.unwrap();

    let view = session.snapshot().await.unwrap();
    assert_eq!(
        view.messages.last().unwrap().text(),
        "Here is the summary for Dr. Smith:\nStatus: Warm\n\nTakeaways:\n- Interested in trial data\n- Price sensitive\n\nFocus: Share trial results"
    );
    assert_eq!(view.status, AsyncStatus::Succeeded);
    assert_eq!(backend.calls()[0].subject, "Dr. Smith");
}

#[tokio::test]
async fn transcript_follows_completion_order() {
    let backend = Arc::new(FakeBackend::default());
    let release_summary = backend.hold_summary();
    let session = start(&backend, form_for("Dr. Smith"));

    let SendOutcome::Requested(slow) = session.send("summary").await.unwrap() else {
        panic!("expected a request");
    };
    let SendOutcome::Requested(fast) = session.send("history").await.unwrap() else {
        panic!("expected a request");
    };
    fast.finished().await.unwrap();

    let view = wait_until(&session, |v| v.messages.len() == 3).await;
    assert!(view.messages[2].text().starts_with("Here is the history for Dr. Smith:"));
    assert_eq!(
        view.statuses.get(OperationKind::FetchSummary),
        AsyncStatus::Pending
    );

    release_summary.send(()).unwrap();
    slow.finished().await.unwrap();

    let view = session.snapshot().await.unwrap();
    let texts = texts(&view);
    assert_eq!(texts[0], "summary");
    assert_eq!(texts[1], "history");
    assert!(texts[2].starts_with("Here is the history for Dr. Smith:"));
    assert!(texts[3].starts_with("Here is the summary for Dr. Smith:"));
    assert_eq!(view.status, AsyncStatus::Succeeded);
}

#[tokio::test]
async fn conversational_update_merges_only_returned_fields() {
    let backend = Arc::new(FakeBackend::default());
    backend.reply_to_conversation(Ok(json!({"interaction_type": "Call"})));
    let mut form = form_for("Dr. Smith");
    form.topics_discussed = "CardioPlus efficacy".to_string();
    form.sentiment = Sentiment::Positive;
    let session = start(&backend, form.clone());

    let SendOutcome::Requested(op) = session.send("It was actually a phone call").await.unwrap()
    else {
        panic!("expected a request");
    };
    op.finished().await.unwrap();

    let view = session.snapshot().await.unwrap();
    assert_eq!(
        view.form,
        FormSnapshot {
            interaction_type: InteractionType::Call,
            ..form
        }
    );
    assert_eq!(
        texts(&view),
        vec!["It was actually a phone call", UPDATE_ACKNOWLEDGED.as_str()]
    );
    assert_eq!(backend.calls()[0].kind, OperationKind::ConversationalUpdate);
}

#[tokio::test]
async fn conversational_update_keeps_edits_made_in_flight() {
    let backend = Arc::new(FakeBackend::echoing_form());
    backend.reply_to_conversation(Ok(json!({"interaction_type": "Call"})));
    let release = backend.hold_conversation();
    let session = start(&backend, form_for("Dr. Smith"));

    let SendOutcome::Requested(op) = session.send("it was a call").await.unwrap() else {
        panic!("expected a request");
    };
    session.set_field("outcomes", "Agreed to pilot").unwrap();
    session.set_field("topics_discussed", "Dosing").unwrap();
    release.send(()).unwrap();
    op.finished().await.unwrap();

    let view = session.snapshot().await.unwrap();
    assert_eq!(view.form.interaction_type, InteractionType::Call);
    assert_eq!(view.form.outcomes, "Agreed to pilot");
    assert_eq!(view.form.topics_discussed, "Dosing");
    assert_eq!(view.form.hcp_name, "Dr. Smith");
    assert_eq!(
        view.messages.last().unwrap().text(),
        UPDATE_ACKNOWLEDGED.as_str()
    );
}

#[tokio::test(start_paused = true)]
async fn echoed_form_does_not_restore_old_name() {
    let backend = Arc::new(FakeBackend::echoing_form());
    backend.reply_to_conversation(Ok(json!({"sentiment": "Positive"})));
    let release = backend.hold_conversation();
    let session = start(&backend, form_for("Dr. Smith"));

    let SendOutcome::Requested(op) = session.send("they loved it").await.unwrap() else {
        panic!("expected a request");
    };
    session.set_field("hcp_name", "Dr. Jones").unwrap();
    release.send(()).unwrap();
    op.finished().await.unwrap();
    sleep(Duration::from_secs(5)).await;

    let view = session.snapshot().await.unwrap();
    assert_eq!(view.form.hcp_name, "Dr. Jones");
    assert_eq!(view.form.sentiment, Sentiment::Positive);
    let fetched: Vec<_> = backend
        .calls()
        .into_iter()
        .filter(|c| c.kind == OperationKind::FetchSuggestions)
        .map(|c| c.subject)
        .collect();
    assert_eq!(fetched, vec!["Dr. Jones"]);
}

#[tokio::test]
async fn conversational_failure_apologizes() {
    let backend = Arc::new(FakeBackend::default());
    backend.reply_to_conversation(Err(ApiFailure::Transport("connection reset".to_string())));
    let session = start(&backend, blank_form());

    let SendOutcome::Requested(op) = session.send("met with the team").await.unwrap() else {
        panic!("expected a request");
    };
    op.finished().await.unwrap();

    let view = session.snapshot().await.unwrap();
    assert_eq!(view.status, AsyncStatus::Failed);
    assert_eq!(view.messages.last().unwrap().text(), UPDATE_APOLOGY.as_str());
    assert_eq!(
        render::status_line(view.status, view.last_error.as_ref()).as_deref(),
        Some(rapport_types::GENERIC_FAILURE_TEXT)
    );

    // The store stays usable after a failure.
    backend.reply_to_conversation(Ok(json!({"outcomes": "Agreed to pilot"})));
    let SendOutcome::Requested(op) = session.send("they agreed to a pilot").await.unwrap() else {
        panic!("expected a request");
    };
    op.finished().await.unwrap();
    let view = session.snapshot().await.unwrap();
    assert_eq!(view.form.outcomes, "Agreed to pilot");
    assert_eq!(view.status, AsyncStatus::Succeeded);
}

#[tokio::test]
async fn direct_edits_round_trip() {
    let backend = Arc::new(FakeBackend::default());
    let session = start(&backend, blank_form());

    session.set_field("attendees", "Ana,  Bo").unwrap();
    session
        .set_field("follow_up_actions", "Send deck\nBook lunch")
        .unwrap();
    session.set_field("sentiment", "negative").unwrap();
    assert!(matches!(
        session.set_field("interaction_type", "Dinner"),
        Err(SessionError::InvalidField(_))
    ));

    let view = session.snapshot().await.unwrap();
    assert_eq!(view.form.attendees, "Ana,  Bo");
    assert_eq!(view.form.follow_up_actions, "Send deck\nBook lunch");
    assert_eq!(view.form.sentiment, Sentiment::Negative);
    assert_eq!(view.form.interaction_type, InteractionType::Meeting);
}

#[tokio::test]
async fn submit_materializes_record() {
    let backend = Arc::new(FakeBackend::default());
    let session = start(&backend, blank_form());
    session.set_field("hcp_name", "Dr. Chen").unwrap();
    session.set_field("attendees", "Ana, Bo").unwrap();
    session
        .set_field("follow_up_actions", "Send deck\n\nBook lunch")
        .unwrap();

    session.submit().await.unwrap().finished().await.unwrap();

    let created = backend.created.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].attendees, vec!["Ana", "Bo"]);
    assert_eq!(created[0].follow_up_actions, vec!["Send deck", "Book lunch"]);

    let view = session.snapshot().await.unwrap();
    assert_eq!(view.records.len(), 1);
    assert_eq!(view.records[0].id, Some(1));
    assert_eq!(
        view.statuses.get(OperationKind::CreateRecord),
        AsyncStatus::Succeeded
    );
}

#[tokio::test(start_paused = true)]
async fn typing_a_name_fires_one_suggestions_fetch() {
    let backend = Arc::new(FakeBackend::default());
    let session = start(&backend, blank_form());

    session.set_field("hcp_name", "Dr. Sm").unwrap();
    sleep(Duration::from_millis(200)).await;
    session.set_field("hcp_name", "Dr. Smi").unwrap();
    sleep(Duration::from_millis(200)).await;
    session.set_field("hcp_name", "Dr. Smith").unwrap();
    let last_edit = Instant::now();

    sleep(Duration::from_millis(999)).await;
    assert!(backend.calls().is_empty());

    let view = wait_until(&session, |v| !v.suggestions.is_empty()).await;
    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].kind, OperationKind::FetchSuggestions);
    assert_eq!(calls[0].subject, "Dr. Smith");
    assert_eq!(calls[0].at - last_edit, Duration::from_millis(1000));
    assert_eq!(view.suggestions[0].suggestion, "Follow up with Dr. Smith");
    assert_eq!(texts(&view), vec![SUGGESTIONS_UPDATED.as_str()]);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(backend.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn short_names_never_trigger() {
    let backend = Arc::new(FakeBackend::default());
    let session = start(&backend, blank_form());

    session.set_field("hcp_name", "Dr.").unwrap();
    sleep(Duration::from_secs(3)).await;
    session.set_field("hcp_name", "  Bo  ").unwrap();
    sleep(Duration::from_secs(3)).await;

    assert!(backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_armed_timer() {
    let backend = Arc::new(FakeBackend::default());
    let mut session = start(&backend, blank_form());

    session.set_field("hcp_name", "Dr. Smith").unwrap();
    sleep(Duration::from_millis(500)).await;
    session.shutdown().await;
    sleep(Duration::from_secs(5)).await;

    assert!(backend.calls().is_empty());
    // Direct use still works after the trigger is gone.
    session.set_field("hcp_name", "Dr. Jones").unwrap();
    assert_eq!(session.snapshot().await.unwrap().form.hcp_name, "Dr. Jones");
}

#[tokio::test(start_paused = true)]
async fn dropping_session_cancels_armed_timer() {
    let backend = Arc::new(FakeBackend::default());
    let session = start(&backend, blank_form());

    session.set_field("hcp_name", "Dr. Smith").unwrap();
    sleep(Duration::from_millis(500)).await;
    drop(session);
    sleep(Duration::from_secs(5)).await;

    assert!(backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_suggestions_are_discarded() {
    let backend = Arc::new(FakeBackend::with_suggestions_delay(Duration::from_millis(500)));
    let session = start(&backend, blank_form());

    session.set_field("hcp_name", "Dr. Smith").unwrap();
    // Fetch for "Dr. Smith" starts at 1000ms and resolves at 1500ms.
    sleep(Duration::from_millis(1100)).await;
    session.set_field("hcp_name", "Dr. Jones").unwrap();

    let view = wait_until(&session, |v| !v.suggestions.is_empty()).await;

    let subjects: Vec<_> = backend.calls().into_iter().map(|c| c.subject).collect();
    assert_eq!(subjects, vec!["Dr. Smith", "Dr. Jones"]);
    assert_eq!(view.suggestions[0].suggestion, "Follow up with Dr. Jones");
    assert_eq!(texts(&view), vec![SUGGESTIONS_UPDATED.as_str()]);
}

#[tokio::test]
async fn lookup_uses_trimmed_name() {
    let backend = Arc::new(FakeBackend::default());
    let session = start(&backend, form_for("  Dr. Smith  "));

    let SendOutcome::Requested(op) = session.send("Show me the RECORDS").await.unwrap() else {
        panic!("expected a request");
    };
    op.finished().await.unwrap();

    assert_eq!(backend.calls()[0].subject, "Dr. Smith");
    let view = session.snapshot().await.unwrap();
    assert_eq!(
        view.messages[1].text(),
        "Here is the history for Dr. Smith:\nOn 2025-07-01: A Call about \"Dosing\" resulted in \"Agreed to trial\"."
    );
}
