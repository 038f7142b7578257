use std::sync::Arc;

use crate::error::{EdgeError, Result};
use crate::types::Payload;

/// A single unit in the pipeline chain.
///
/// `process` returns `Ok(None)` when the inputs do not fit the stage (wrong
/// count, wrong variant, wrong shape). That is a per-frame condition and the
/// driver moves on. `Err` is reserved for failures that make the stage itself
/// unusable.
pub trait Stage: Send {
    /// Human-readable name for tracing.
    fn name(&self) -> &str;

    fn process(&mut self, inputs: &[Arc<Payload>]) -> Result<Option<Payload>>;
}

/// The one payload of a single-input stage, or `InputMismatch`.
pub fn single_input(inputs: &[Arc<Payload>]) -> Result<&Payload> {
    match inputs {
        [only] => Ok(only.as_ref()),
        _ => Err(EdgeError::InputMismatch(format!(
            "expected exactly 1 input, got {}",
            inputs.len()
        ))),
    }
}

impl<S: Stage + ?Sized> Stage for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn process(&mut self, inputs: &[Arc<Payload>]) -> Result<Option<Payload>> {
        (**self).process(inputs)
    }
}
