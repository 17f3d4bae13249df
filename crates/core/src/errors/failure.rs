/// Classification for failover policy.
///
/// Used to determine how the pipeline should respond to errors from providers.
///
/// # Behavior Summary
///
/// | Class | Try Next Provider? | Record Circuit Breaker Failure? |
/// |-------|-------------------|--------------------------------|
/// | `Never` | No | No |
/// | `FailoverWithPenalty` | Yes | Yes (affects future requests) |
/// | `NextProvider` | Yes | No |
/// | `CircuitOpen` | Yes (skip this one) | No (already recorded) |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - bad query, unknown provider, or terminal failure.
    /// The request is fundamentally invalid and retrying won't help.
    Never,

    /// Failover to the next provider and record a circuit breaker penalty.
    ///
    /// Used for extraction failures (timeout, connection, rate limiting,
    /// server errors, bad data). The failure is recorded in the provider's
    /// circuit breaker, which may cause the provider to be skipped in future
    /// requests if failures accumulate.
    FailoverWithPenalty,

    /// Try the next provider without recording any penalty.
    ///
    /// Used when this provider can't handle the request (e.g., unsupported
    /// operation) but another provider might succeed.
    NextProvider,

    /// Circuit breaker is open for this provider.
    /// Skip this provider until the circuit closes.
    CircuitOpen,
}

/// Category of a provider extraction failure.
///
/// Attached to each failure recorded in a circuit breaker's sliding window
/// for diagnostics. The category does not influence the breaker's state
/// machine; only the failure itself does.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FailureKind {
    /// The extraction call exceeded its time budget.
    Timeout,
    /// The provider could not be reached.
    Connection,
    /// The provider rejected the call due to rate limiting.
    RateLimit,
    /// The provider returned an internal error.
    ServerError,
    /// The provider replied, but the payload failed validation.
    DataQuality,
    /// Anything that doesn't fit the categories above.
    Unknown,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::RateLimit => "rate_limit",
            Self::ServerError => "server_error",
            Self::DataQuality => "data_quality",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}
