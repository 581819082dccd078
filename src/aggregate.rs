//! Merging of a collection's documents into a single JSON object.
//!
//! Document bytes are spliced into the output verbatim. Nothing is parsed,
//! so one malformed document makes the whole aggregate invalid JSON. Stored
//! content is returned byte for byte, which clients rely on.

use std::path::Path;

use tokio::fs;
use tracing::{debug, warn};

use crate::error::DataError;
use crate::listing::read_entries;
use crate::paths::DOCUMENT_SUFFIX;

/// Build `{"<name>": <content>, ...}` from every `.json` file directly in `dir`.
///
/// Sub-directories are ignored, even when their name ends in `.json`, and so
/// are documents that cannot be read. An empty collection yields `{\n}`.
pub async fn aggregate(dir: &Path) -> Result<Vec<u8>, DataError> {
    debug!("Aggregating documents in: {}", dir.display());

    let mut out = b"{\n".to_vec();
    let mut first = true;

    for entry in read_entries(dir).await? {
        if entry.is_dir {
            continue;
        }
        let Some(key) = entry.name.strip_suffix(DOCUMENT_SUFFIX) else {
            continue;
        };

        let content = match fs::read(dir.join(&entry.name)).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping unreadable document {}: {}", entry.name, e);
                continue;
            }
        };

        if !first {
            out.extend_from_slice(b",\n");
        }
        first = false;

        // Keys are escaped properly, values are not touched.
        let key = serde_json::to_string(key)
            .map_err(|e| DataError::Io(std::io::Error::other(e)))?;
        out.extend_from_slice(key.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(&content);
    }

    out.extend_from_slice(b"\n}");
    Ok(out)
}
