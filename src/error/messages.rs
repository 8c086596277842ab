//! User-facing text and recovery hints.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::kind::ErrorKind;

/// What the client should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    WaitAndRetry,
    CheckConnection,
    FixInput,
    Reauthenticate,
    RequestAccess,
    Refresh,
    ResolveConflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryHint {
    pub action: RecoveryAction,
    pub message: &'static str,
}

impl RecoveryHint {
    pub fn for_kind(kind: ErrorKind) -> Self {
        let (action, message) = match kind {
            ErrorKind::Network => (
                RecoveryAction::CheckConnection,
                "Check your internet connection and try again.",
            ),
            ErrorKind::Validation => (
                RecoveryAction::FixInput,
                "Correct the highlighted fields and submit again.",
            ),
            ErrorKind::Auth => (RecoveryAction::Reauthenticate, "Please log in again."),
            ErrorKind::Authorization => (
                RecoveryAction::RequestAccess,
                "Only the owner can change this item.",
            ),
            ErrorKind::RateLimit => (
                RecoveryAction::WaitAndRetry,
                "Wait a moment before trying again.",
            ),
            ErrorKind::NotFound => (
                RecoveryAction::Refresh,
                "Refresh the list; the item may have been removed.",
            ),
            ErrorKind::Offline => (
                RecoveryAction::CheckConnection,
                "You appear to be offline. Reconnect and try again.",
            ),
            ErrorKind::Conflict => (
                RecoveryAction::ResolveConflict,
                "Reload the latest version, resolve the differences, then retry.",
            ),
            ErrorKind::Server => (
                RecoveryAction::Retry,
                "Something went wrong on our side. Try again shortly.",
            ),
        };
        Self { action, message }
    }
}

/// Generic safe description of a kind, used when the raw text is internal.
pub fn generic_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Network => "A network error occurred",
        ErrorKind::Validation => "The request contains invalid data",
        ErrorKind::Auth => "Authentication failed",
        ErrorKind::Authorization => "You are not allowed to perform this action",
        ErrorKind::RateLimit => "Too many requests",
        ErrorKind::NotFound => "The requested item was not found",
        ErrorKind::Offline => "The service is offline",
        ErrorKind::Conflict => "The item was changed by someone else",
        ErrorKind::Server => "An unexpected server error occurred",
    }
}

/// Table of user messages keyed by (operation, kind).
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    entries: HashMap<(String, ErrorKind), String>,
}

impl MessageCatalog {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn with(mut self, operation: &str, kind: ErrorKind, message: &str) -> Self {
        self.entries
            .insert((operation.to_string(), kind), message.to_string());
        self
    }

    /// Operation-specific text, falling back to the per-kind default.
    pub fn user_message(&self, operation: Option<&str>, kind: ErrorKind) -> String {
        operation
            .and_then(|op| self.entries.get(&(op.to_string(), kind)))
            .cloned()
            .unwrap_or_else(|| default_user_message(kind).to_string())
    }
}

impl Default for MessageCatalog {
    fn default() -> Self {
        use ErrorKind::*;

        Self::empty()
            .with("login", Auth, "Incorrect email or password.")
            .with("login", RateLimit, "Too many login attempts. Try again in 15 minutes.")
            .with("login", Network, "Could not reach the server to log you in.")
            .with("forgot_password", RateLimit, "Too many reset requests. Try again in an hour.")
            .with("load_profile", Auth, "Your session has expired. Please log in again.")
            .with("list_farms", Network, "Could not load farms. Pull to refresh.")
            .with("load_farm", NotFound, "This farm no longer exists.")
            .with("create_farm", Validation, "Please check the farm details.")
            .with("create_farm", Network, "Farm not saved. Check your connection.")
            .with("update_farm", Authorization, "You can only edit your own farms.")
            .with("update_farm", NotFound, "This farm no longer exists.")
            .with("update_farm", Conflict, "This farm was updated elsewhere. Reload it first.")
            .with("delete_farm", Authorization, "You can only delete your own farms.")
            .with("delete_farm", NotFound, "This farm was already removed.")
            .with("load_crop", NotFound, "This crop no longer exists.")
            .with("create_crop", Validation, "Please check the crop details.")
            .with("update_crop", Authorization, "You can only edit crops on your farms.")
            .with("delete_crop", Authorization, "You can only delete crops on your farms.")
            .with("list_posts", Network, "Could not load the community feed.")
            .with("create_post", RateLimit, "You are posting too quickly. Please wait a bit.")
            .with("create_post", Validation, "Posts need a title and some content.")
            .with("update_post", Authorization, "You can only edit your own posts.")
            .with("delete_post", Authorization, "You can only delete your own posts.")
            .with("delete_post", NotFound, "This post was already removed.")
            .with("upload_image", RateLimit, "Upload limit reached. Try again in a minute.")
            .with("upload_image", Network, "Upload failed. Check your connection and retry.")
            .with("upload_image", Validation, "Only JPEG, PNG or WebP images up to 5 MB.")
    }
}

fn default_user_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Network => "Network problem. Please check your connection.",
        ErrorKind::Validation => "Some of the information provided is invalid.",
        ErrorKind::Auth => "Please log in to continue.",
        ErrorKind::Authorization => "You don't have permission to do that.",
        ErrorKind::RateLimit => "Too many requests. Please slow down.",
        ErrorKind::NotFound => "We couldn't find what you were looking for.",
        ErrorKind::Offline => "You're offline. Changes will need a connection.",
        ErrorKind::Conflict => "Someone else changed this. Please reload.",
        ErrorKind::Server => "Something went wrong. Please try again later.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_specific_message() {
        let catalog = MessageCatalog::default();
        assert_eq!(
            catalog.user_message(Some("update_farm"), ErrorKind::Authorization),
            "You can only edit your own farms."
        );
    }

    #[test]
    fn test_fallback_message() {
        let catalog = MessageCatalog::default();
        let generic = catalog.user_message(None, ErrorKind::Server);
        assert_eq!(generic, catalog.user_message(Some("update_farm"), ErrorKind::Server));
        assert_eq!(
            catalog.user_message(Some("no_such_op"), ErrorKind::Offline),
            default_user_message(ErrorKind::Offline)
        );
    }
}
