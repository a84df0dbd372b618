//! Core domain types for Rapport.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod failure;
mod form;
mod message;
mod operation;
mod proofs;
mod record;

pub use failure::{
    ApiFailure, FieldError, GENERIC_FAILURE_TEXT, UNKNOWN_ERROR_TEXT, format_failure,
};
pub use form::{
    DecodedPatch, FieldValueError, FormField, FormPatch, FormSnapshot, InteractionType,
    PatchShapeError, Sentiment,
};
pub use message::{Message, Sender};
pub use operation::{
    AsyncStatus, HistoryPage, OperationKind, OperationResult, OperationStatuses, SuggestionItem,
    Summary,
};
pub use proofs::{EmptyStringError, NonEmptyStaticStr, NonEmptyString};
pub use record::{InteractionRecord, StoredInteraction};
