//! Authentication error taxonomy

use crate::storage::StorageError;

/// Failures of the token lifecycle.
///
/// None of these escape the widget-facing token callback or the page-load
/// handler; they are logged and folded into a defined end state there.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No identity account is known.
    #[error("no signed-in account")]
    NoAccount,
    /// The cached session could not produce a token without interaction.
    #[error("silent token acquisition failed: {0}")]
    SilentAcquire(String),
    /// The response of a previous redirect could not be processed.
    #[error("could not resolve redirect response: {0}")]
    RedirectResolution(String),
    /// A persisted marker was malformed and has been discarded.
    #[error("malformed marker {key}: {reason}")]
    MarkerParse { key: &'static str, reason: String },
    /// The browser refused access to a storage tier.
    #[error("storage unavailable: {0}")]
    StorageAccess(#[from] StorageError),
    /// Any other identity client failure.
    #[error("identity client error: {0}")]
    Identity(String),
}
