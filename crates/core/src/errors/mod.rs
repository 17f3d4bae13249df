//! Error types and failover classification for the routing core.
//!
//! This module provides:
//! - [`ExtractError`]: The main error enum for all extraction operations
//! - [`RetryClass`]: Classification for determining failover behavior
//! - [`FailureKind`]: Category tag recorded against a provider's breaker

mod failure;

pub use failure::{FailureKind, RetryClass};

use thiserror::Error;

/// Errors that can occur while routing and extracting data.
///
/// Each variant is classified into a [`RetryClass`] via the
/// [`retry_class`](Self::retry_class) method, which determines how the
/// failover loop should handle the error, and into a [`FailureKind`] via
/// [`failure_kind`](Self::failure_kind), which is what gets recorded in the
/// provider's circuit breaker window.
#[derive(Error, Debug, Clone)]
pub enum ExtractError {
    /// The query pinned a provider that is not registered.
    /// This is a configuration error - fail fast, don't failover.
    #[error("Unknown provider: {provider}")]
    UnknownProvider {
        /// The provider id named by the query
        provider: String,
    },

    /// A required query field is missing or empty.
    #[error("Missing query field: {field}")]
    MissingQueryField {
        /// Name of the missing field
        field: &'static str,
    },

    /// No registered provider can serve the requested data/asset type.
    #[error("No providers available")]
    NoProvidersAvailable,

    /// The extraction call to a provider timed out.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// The provider could not be reached.
    #[error("Connection error: {provider} - {message}")]
    Connection {
        /// The provider that was unreachable
        provider: String,
        /// Transport-level detail
        message: String,
    },

    /// The provider rate limited the request.
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// The provider returned an internal/server-side error.
    #[error("Server error: {provider} - {message}")]
    ServerError {
        /// The provider that returned the error
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The provider replied, but the payload is unusable.
    #[error("Data quality error: {provider} - {message}")]
    DataQuality {
        /// The provider that returned the bad payload
        provider: String,
        /// Description of what was wrong
        message: String,
    },

    /// The provider does not support the requested operation.
    /// Try the next provider without penalty.
    #[error("Not supported by {provider}: {operation}")]
    NotSupported {
        /// The provider that declined
        provider: String,
        /// The operation it declined
        operation: String,
    },

    /// An unclassified provider error.
    #[error("Provider error: {provider} - {message}")]
    Provider {
        /// The provider that returned the error
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The circuit breaker is open for this provider.
    /// Skip it until the circuit closes.
    #[error("Circuit open: {provider}")]
    CircuitOpen {
        /// The provider with an open circuit
        provider: String,
    },

    /// The request's timeout budget ran out before all candidates were tried.
    #[error("Request budget exhausted, {skipped} candidate(s) skipped")]
    BudgetExhausted {
        /// How many ranked candidates were never attempted
        skipped: usize,
    },

    /// Field mapping validation failed beyond recovery.
    /// Normally recovered locally by falling back to rename-only mapping.
    #[error("Mapping failed: {message}")]
    MappingFailed {
        /// Description of the mapping failure
        message: String,
    },

    /// Every eligible candidate was tried and all failed.
    /// Carries the per-provider error messages for diagnostics.
    #[error("All providers failed after {} attempt(s): {}", attempted.len(), messages.join("; "))]
    AllProvidersFailed {
        /// Providers that were attempted, in order
        attempted: Vec<String>,
        /// One error message per attempt
        messages: Vec<String>,
    },
}

impl ExtractError {
    /// Returns the failover classification for this error.
    ///
    /// - [`RetryClass::Never`]: surface to the caller, don't failover
    /// - [`RetryClass::FailoverWithPenalty`]: record a breaker failure, try next
    /// - [`RetryClass::NextProvider`]: try next, no penalty
    /// - [`RetryClass::CircuitOpen`]: provider circuit is open, skip it
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Configuration and terminal errors - never retry
            Self::UnknownProvider { .. }
            | Self::MissingQueryField { .. }
            | Self::NoProvidersAvailable
            | Self::BudgetExhausted { .. }
            | Self::MappingFailed { .. }
            | Self::AllProvidersFailed { .. } => RetryClass::Never,

            // Extraction failures - failover and penalize the provider
            Self::Timeout { .. }
            | Self::Connection { .. }
            | Self::RateLimited { .. }
            | Self::ServerError { .. }
            | Self::DataQuality { .. }
            | Self::Provider { .. } => RetryClass::FailoverWithPenalty,

            // Provider can't serve this request, but isn't at fault
            Self::NotSupported { .. } => RetryClass::NextProvider,

            // Circuit breaker open
            Self::CircuitOpen { .. } => RetryClass::CircuitOpen,
        }
    }

    /// Returns the failure category recorded in the breaker's window.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Connection { .. } => FailureKind::Connection,
            Self::RateLimited { .. } => FailureKind::RateLimit,
            Self::ServerError { .. } => FailureKind::ServerError,
            Self::DataQuality { .. } => FailureKind::DataQuality,
            _ => FailureKind::Unknown,
        }
    }
}
