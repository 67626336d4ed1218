//! JSON fixture loading.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::{VerifyError, VerifyResult};

/// Reads a JSON document from disk.
pub fn load_json(path: impl AsRef<Path>) -> VerifyResult<Value> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading JSON fixture");

    let contents = std::fs::read_to_string(path).map_err(|source| VerifyError::FixtureIo {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&contents).map_err(|source| VerifyError::FixtureParse {
        path: path.to_path_buf(),
        source,
    })
}
