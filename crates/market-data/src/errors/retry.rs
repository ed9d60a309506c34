/// Classification for retry policy.
///
/// Used by the retry executor to decide whether, and how patiently, a failed
/// upstream call is attempted again.
///
/// # Behavior Summary
///
/// | Class | Retry? | Delay |
/// |-------|--------|-------|
/// | `Never` | No | - |
/// | `WithBackoff` | Yes | exponential from the policy base delay |
/// | `LongBackoff` | Yes | exponential, scaled by the policy's long-backoff factor |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - bad symbol, unparseable payload, or terminal failure.
    /// The request is fundamentally invalid and retrying won't help.
    Never,

    /// Retry with exponential backoff.
    ///
    /// Used for transient I/O errors (timeouts, dropped connections, 5xx).
    WithBackoff,

    /// Retry with a longer backoff.
    ///
    /// Used when the provider rate limited the request (429). Hammering a
    /// provider that is already throttling only extends the penalty window.
    LongBackoff,
}

impl RetryClass {
    /// Returns true if the error may succeed on another attempt.
    pub fn is_retryable(self) -> bool {
        !matches!(self, RetryClass::Never)
    }
}
