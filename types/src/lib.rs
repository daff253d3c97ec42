//! Core domain types for Lumen.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod error;
mod ids;
mod message;
mod provider;
mod request;
mod text;

pub use error::{GenerationError, TransportFailure};
pub use ids::SessionId;
pub use message::{ChatMessage, Role};
pub use provider::ProviderKind;
pub use request::{
    Credential, DEFAULT_CHAT_TEMPERATURE, GenerationRequest, ReasoningEffort, Temperature,
};
pub use text::{collapse_whitespace, sanitize_input, truncate_chars, truncate_with_ellipsis};

use serde::{Deserialize, Serialize};

// ============================================================================
// Generation Lifecycle
// ============================================================================

/// Lifecycle of one generation session.
///
/// `Active` transitions to exactly one terminal state, exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GenerationState {
    #[default]
    Active,
    Completed,
    Aborted,
    Failed,
}

impl GenerationState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for GenerationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
