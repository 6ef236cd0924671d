use core::fmt;

/// Errors raised while building, breaking or painting block sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakError {
    /// An IPD restart hit a break that does not carry its original position.
    UnsupportedRestartPosition { detail: String },
    /// Content did not fit its part and the overflow policy rejects it.
    Overflow { part_index: usize, amount: i32 },
    /// Configuration could not be parsed or is inconsistent.
    InvalidConfig(String),
    /// A sequence handed to the breaking algorithm is malformed.
    InvalidSequence { index: usize, reason: &'static str },
    /// Failure reported by a content source or area sink.
    Content(String),
}

impl fmt::Display for BreakError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakError::UnsupportedRestartPosition { detail } => {
                write!(f, "restart position is not a space-handling break: {}", detail)
            }
            BreakError::Overflow { part_index, amount } => write!(
                f,
                "content overflows part {} by {} mpt",
                part_index, amount
            ),
            BreakError::InvalidConfig(msg) => write!(f, "invalid breaker config: {}", msg),
            BreakError::InvalidSequence { index, reason } => {
                write!(f, "invalid element at index {}: {}", index, reason)
            }
            BreakError::Content(msg) => write!(f, "content error: {}", msg),
        }
    }
}

impl std::error::Error for BreakError {}

impl From<serde_json::Error> for BreakError {
    fn from(err: serde_json::Error) -> Self {
        BreakError::InvalidConfig(err.to_string())
    }
}
