//! Transcript message model.
//!
//! A transcript is append-only: messages have no setters and the store never
//! exposes a way to remove one.

use serde::{Deserialize, Serialize};

use crate::proofs::{NonEmptyStaticStr, NonEmptyString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    sender: Sender,
    text: NonEmptyString,
}

impl Message {
    #[must_use]
    pub fn user(text: NonEmptyString) -> Self {
        Self {
            sender: Sender::User,
            text,
        }
    }

    #[must_use]
    pub fn assistant(text: NonEmptyString) -> Self {
        Self {
            sender: Sender::Assistant,
            text,
        }
    }

    /// Assistant message from one of the fixed notices.
    #[must_use]
    pub fn notice(text: NonEmptyStaticStr) -> Self {
        Self::assistant(text.into())
    }

    #[must_use]
    pub fn sender(&self) -> Sender {
        self.sender
    }

    #[must_use]
    pub fn text(&self) -> &str {
        self.text.as_str()
    }
}
