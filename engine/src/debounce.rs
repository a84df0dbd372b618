//! Debounced suggestions trigger.
//!
//! [`Debouncer`] is the pure state machine (`Idle -> Armed -> Fired`); it is
//! fed observed HCP-name values and clock readings and never touches a timer
//! itself. [`spawn_suggestion_trigger`] drives it from the session's watch
//! channel and a sleep, and stops when its cancellation token fires.

use std::time::Duration;

use rapport_types::NonEmptyString;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::dispatch::OperationRequest;
use crate::gateway::Gateway;
use crate::store::SessionView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceSettings {
    /// Quiet period after the last edit.
    pub quiet: Duration,
    /// The trimmed name must be longer than this many characters.
    pub min_name_chars: usize,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            quiet: Duration::from_millis(1000),
            min_name_chars: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Armed {
        subject: NonEmptyString,
        deadline: Instant,
    },
    Fired {
        subject: NonEmptyString,
    },
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    settings: DebounceSettings,
    state: DebounceState,
    last_seen: Option<String>,
}

impl Debouncer {
    #[must_use]
    pub fn new(settings: DebounceSettings) -> Self {
        Self {
            settings,
            state: DebounceState::Idle,
            last_seen: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> &DebounceState {
        &self.state
    }

    /// Record `value` as already seen without arming. A name the session
    /// starts with is not an edit.
    pub fn prime(&mut self, value: &str) {
        self.last_seen = Some(value.to_string());
    }

    /// Feed the current value of the watched field.
    ///
    /// Repeats of the last observed value are not edits and leave the state
    /// alone. An edit always cancels a pending timer; it re-arms only when
    /// the new name is long enough. Returns whether the value was an edit.
    pub fn observe(&mut self, value: &str, now: Instant) -> bool {
        if self.last_seen.as_deref() == Some(value) {
            return false;
        }
        self.last_seen = Some(value.to_string());

        let trimmed = value.trim();
        self.state = if trimmed.chars().count() > self.settings.min_name_chars
            && let Ok(subject) = NonEmptyString::trimmed(trimmed)
        {
            DebounceState::Armed {
                subject,
                deadline: now + self.settings.quiet,
            }
        } else {
            DebounceState::Idle
        };
        true
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            DebounceState::Armed { deadline, .. } => Some(*deadline),
            DebounceState::Idle | DebounceState::Fired { .. } => None,
        }
    }

    /// Transition `Armed -> Fired` once the deadline has passed, yielding the
    /// name to fetch suggestions for.
    pub fn fire(&mut self, now: Instant) -> Option<NonEmptyString> {
        match &self.state {
            DebounceState::Armed { subject, deadline } if now >= *deadline => {
                let subject = subject.clone();
                self.state = DebounceState::Fired {
                    subject: subject.clone(),
                };
                Some(subject)
            }
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        self.state = DebounceState::Idle;
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Watch `hcp_name` in published views and fetch suggestions once it has
/// been quiet for the configured period.
///
/// Cancelling `shutdown` drops any armed timer; nothing fires afterwards.
pub fn spawn_suggestion_trigger(
    gateway: Gateway,
    mut views: watch::Receiver<SessionView>,
    settings: DebounceSettings,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut debouncer = Debouncer::new(settings);
    debouncer.prime(&views.borrow_and_update().form.hcp_name);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    debouncer.cancel();
                    break;
                }
                changed = views.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Session view closed; stopping suggestions trigger");
                        break;
                    }
                    let name = views.borrow_and_update().form.hcp_name.clone();
                    if debouncer.observe(&name, Instant::now()) {
                        tracing::debug!(state = ?debouncer.state(), "HCP name edited");
                    }
                }
                () = sleep_until_deadline(debouncer.deadline()) => {
                    if let Some(subject) = debouncer.fire(Instant::now()) {
                        tracing::debug!(subject = %subject, "Fetching suggestions after quiet period");
                        if let Err(e) = gateway.issue(OperationRequest::FetchSuggestions(subject)) {
                            tracing::warn!(error = %e, "Could not issue suggestions fetch");
                            break;
                        }
                    }
                }
            }
        }
    })
}
