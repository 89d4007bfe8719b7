//! Storage types for the Tidegate storage abstraction layer.
//!
//! This module defines the data types shared by storage backends and
//! store decorators.

use std::collections::HashMap;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// A single stored resource instance: an untyped mapping from field name
/// to arbitrary JSON value.
///
/// No schema is enforced at this layer. Field keys are opaque to storage
/// decorators; their meaning belongs to the embedding application.
pub type Item = serde_json::Map<String, Value>;

/// Recognized option key marking a query that originates from a
/// single-item fetch.
///
/// Transformers may behave differently for by-id lookups than for list
/// contexts, e.g. to include fields that are normally omitted from
/// collection responses.
pub const BY_ID_OPTION: &str = "byId";

/// Execution mode for list calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListMode {
    /// Transform items one at a time, preserving input order.
    #[default]
    Sequential,
    /// Transform items concurrently. Result order is unspecified: items
    /// are appended as their transforms complete.
    Concurrent,
}

/// Options passed through storage calls.
///
/// Carries the bag of recognized string options, the list execution mode,
/// the request-scoped cancellation token, and the force-trace flag for
/// timing diagnostics. Unrecognized options are opaque pass-through.
///
/// The mode and token are decided by the caller/router, not queried from
/// ambient request state, so stores stay testable without a full request
/// context.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    mode: ListMode,
    options: HashMap<String, String>,
    cancel: CancellationToken,
    force_trace: bool,
}

impl QueryOptions {
    /// Creates empty options with the default (sequential) list mode.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the list execution mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ListMode) -> Self {
        self.mode = mode;
        self
    }

    /// Adds a string option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Scopes the call to the given cancellation token.
    ///
    /// Concurrent list transformation observes this token; everything
    /// else runs synchronously in the caller and is cancelled by dropping
    /// the call future.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Enables timing diagnostics for this call.
    #[must_use]
    pub fn with_force_trace(mut self, force_trace: bool) -> Self {
        self.force_trace = force_trace;
        self
    }

    /// Returns the list execution mode.
    #[must_use]
    pub fn mode(&self) -> ListMode {
        self.mode
    }

    /// Looks up a string option by key.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Returns true if this call originates from a single-item fetch.
    #[must_use]
    pub fn is_by_id(&self) -> bool {
        self.option(BY_ID_OPTION) == Some("true")
    }

    /// Returns the cancellation token scoping this call.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns true if timing diagnostics were requested.
    #[must_use]
    pub fn force_trace(&self) -> bool {
        self.force_trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode_is_sequential() {
        let opts = QueryOptions::new();
        assert_eq!(opts.mode(), ListMode::Sequential);
        assert!(!opts.force_trace());
        assert!(!opts.is_by_id());
    }

    #[test]
    fn test_builder() {
        let opts = QueryOptions::new()
            .with_mode(ListMode::Concurrent)
            .with_option("fields", "all")
            .with_force_trace(true);

        assert_eq!(opts.mode(), ListMode::Concurrent);
        assert_eq!(opts.option("fields"), Some("all"));
        assert_eq!(opts.option("missing"), None);
        assert!(opts.force_trace());
    }

    #[test]
    fn test_by_id_marker() {
        let opts = QueryOptions::new().with_option(BY_ID_OPTION, "true");
        assert!(opts.is_by_id());

        let opts = QueryOptions::new().with_option(BY_ID_OPTION, "false");
        assert!(!opts.is_by_id());
    }

    #[test]
    fn test_cancellation_token_shared() {
        let token = tokio_util::sync::CancellationToken::new();
        let opts = QueryOptions::new().with_cancellation(token.clone());
        token.cancel();
        assert!(opts.cancellation().is_cancelled());
    }
}
