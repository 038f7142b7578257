use thiserror::Error;

/// Top-level error type for the edgeflow pipeline.
#[derive(Debug, Error)]
pub enum EdgeError {
    /// Model file missing/unreadable, or settings that cannot describe a valid runner.
    #[error("configuration error: {0}")]
    Config(String),

    /// An accelerator runtime call returned a non-success status.
    #[error("device call {op} failed with status {code}")]
    Device { op: String, code: i64 },

    /// Wrong input count, wrong payload variant or wrong frame shape.
    /// Local to one call; stages fold it into an empty result.
    #[error("input mismatch: {0}")]
    InputMismatch(String),

    #[error("device allocation of {requested} bytes failed: {reason}")]
    ResourceExhausted { requested: usize, reason: String },

    /// A previous execution failed and the device session may be inconsistent.
    /// The runner has to be rebuilt.
    #[error("runner is unusable after a fatal device error")]
    RunnerPoisoned,

    #[error("image decode error: {0}")]
    ImageDecode(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EdgeError {
    /// Shorthand for a failed accelerator call.
    pub fn device(op: impl Into<String>, code: impl Into<i64>) -> Self {
        EdgeError::Device {
            op: op.into(),
            code: code.into(),
        }
    }

    /// Whether the pipeline may simply move on to the next input.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EdgeError::InputMismatch(_))
    }
}

pub type Result<T> = std::result::Result<T, EdgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_input_mismatch_is_recoverable() {
        assert!(EdgeError::InputMismatch("2 inputs".into()).is_recoverable());
        assert!(!EdgeError::device("aclmdlExecute", 507011).is_recoverable());
        assert!(!EdgeError::RunnerPoisoned.is_recoverable());
        assert!(!EdgeError::Config("missing model".into()).is_recoverable());
    }

    #[test]
    fn device_error_message_names_the_call() {
        let err = EdgeError::device("aclrtMalloc", 207001);
        assert_eq!(
            err.to_string(),
            "device call aclrtMalloc failed with status 207001"
        );
    }
}
