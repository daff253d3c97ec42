//! Presentation-boundary logic for Lumen.
//!
//! Error classification and formatting for the user, and the security
//! checks applied before a credential or page URL leaves the process.

pub mod errors;
pub mod security;

pub use errors::{ErrorCategory, extract_error_message, format_generation_error, split_api_error};
pub use security::{
    ALLOWED_API_HOSTS, ProviderValidationError, is_sensitive_page, is_valid_api_url,
    redact_api_keys, safe_referer, sanitize_display_text, sanitize_terminal_text,
    validate_api_key, validate_provider,
};
