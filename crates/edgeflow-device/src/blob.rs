use std::path::Path;

use edgeflow_core::{EdgeError, Result};

/// A model artifact read fully into host memory.
///
/// The format is private to the accelerator runtime. The blob only has to
/// live until the backend's load call returns.
pub struct ModelBlob {
    data: Vec<u8>,
}

impl ModelBlob {
    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "failed to read model file");
            EdgeError::Config(format!("failed to read model {}: {e}", path.display()))
        })?;
        if data.is_empty() {
            return Err(EdgeError::Config(format!(
                "model file is empty: {}",
                path.display()
            )));
        }
        tracing::debug!(path = %path.display(), bytes = data.len(), "read model blob");
        Ok(Self { data })
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for ModelBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBlob").field("len", &self.data.len()).finish()
    }
}
