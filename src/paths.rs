//! Mapping of request paths under `/data/` onto the data directory.
//!
//! Resolution is purely lexical: a request path is split into a collection
//! (directory) and an optional document (JSON file) without consulting the
//! filesystem. [`ensure_within_root`] is the separate, filesystem-aware check
//! that catches symlinks pointing out of the data directory.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::warn;

use crate::error::DataError;

/// Fixed prefix of the data namespace.
pub const DATA_PREFIX: &str = "/data/";

/// Suffix appended to every document leaf.
pub const DOCUMENT_SUFFIX: &str = ".json";

/// Collection name of the data root after canonicalization.
const ROOT_COLLECTION: &str = ".";

/// Upper bound on dangling links followed while checking a target.
const MAX_LINK_HOPS: usize = 40;

/// A request path resolved into the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPath {
    /// Canonical collection path relative to the data root, `"."` for the root.
    pub collection: String,
    /// Document file name including [`DOCUMENT_SUFFIX`], `None` when the
    /// request addresses the collection itself.
    pub document: Option<String>,
}

impl DataPath {
    /// True when the path addresses the data root collection.
    pub fn is_root_collection(&self) -> bool {
        self.document.is_none() && self.collection == ROOT_COLLECTION
    }

    /// Path of the target relative to the data root, as shown to clients.
    pub fn relative(&self) -> String {
        match (&self.document, self.collection.as_str()) {
            (Some(doc), ROOT_COLLECTION) => doc.clone(),
            (Some(doc), dir) => format!("{dir}/{doc}"),
            (None, dir) => dir.to_string(),
        }
    }

    /// Filesystem location of the collection under `root`.
    pub fn collection_dir(&self, root: &Path) -> PathBuf {
        if self.collection == ROOT_COLLECTION {
            root.to_path_buf()
        } else {
            root.join(&self.collection)
        }
    }

    /// Filesystem location of the target (document or collection) under `root`.
    pub fn target(&self, root: &Path) -> PathBuf {
        let dir = self.collection_dir(root);
        match &self.document {
            Some(doc) => dir.join(doc),
            None => dir,
        }
    }
}

/// Resolve a request path such as `/data/a/b/c` into a [`DataPath`].
///
/// A trailing `/` (empty leaf) addresses a collection; anything else addresses
/// a document and gets [`DOCUMENT_SUFFIX`] appended.
pub fn resolve(url_path: &str) -> Result<DataPath, DataError> {
    let remainder = url_path.strip_prefix(DATA_PREFIX).ok_or_else(|| {
        DataError::InvalidPath(format!(
            "path needs to start with {DATA_PREFIX} but was: {url_path}"
        ))
    })?;

    if remainder.contains('\0') {
        warn!("Request path contains null byte: {:?}", url_path);
        return Err(DataError::InvalidPath("path contains null byte".to_string()));
    }
    if remainder.contains('\\') {
        return Err(DataError::InvalidPath(format!(
            "backslash not allowed in path: {url_path}"
        )));
    }

    let (dir, leaf) = match remainder.rfind('/') {
        Some(idx) => (&remainder[..idx], &remainder[idx + 1..]),
        None => ("", remainder),
    };

    let collection = clean(dir);
    if collection.split('/').next() == Some("..") {
        warn!("Path traversal attempt detected: {}", url_path);
        return Err(DataError::PathEscape(collection));
    }

    let document = if leaf.is_empty() {
        None
    } else {
        Some(format!("{leaf}{DOCUMENT_SUFFIX}"))
    };

    Ok(DataPath {
        collection,
        document,
    })
}

/// Lexically canonicalize a slash separated relative path.
///
/// Empty and `.` segments are dropped and `..` pops the previous segment.
/// Leading `..` segments that cannot be popped are kept, so the caller can
/// detect an escape. The empty path becomes `"."`.
fn clean(dir: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in dir.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ => segments.push(".."),
            },
            name => segments.push(name),
        }
    }

    if segments.is_empty() {
        ROOT_COLLECTION.to_string()
    } else {
        segments.join("/")
    }
}

/// Verify that the target of `path`, once symlinks are resolved, still lives
/// inside `root`.
///
/// Targets that do not exist yet are checked through their closest existing
/// ancestor, which covers writes into a symlinked directory. Dangling links
/// along the way are followed through their stored destination, since a write
/// would create the file wherever they point.
pub async fn ensure_within_root(root: &Path, path: &DataPath) -> Result<(), DataError> {
    // Nothing exists yet that could point elsewhere.
    let Ok(canonical_root) = fs::canonicalize(root).await else {
        return Ok(());
    };

    let target = path.target(root);
    let mut probe = target.clone();
    let mut hops = 0;
    loop {
        match fs::canonicalize(&probe).await {
            Ok(canonical) => {
                if canonical.starts_with(&canonical_root) {
                    return Ok(());
                }
                warn!(
                    "Symlink escape attempt: {:?} resolved to {:?} which is outside {:?}",
                    target, canonical, canonical_root
                );
                return Err(DataError::PathEscape(path.relative()));
            }
            Err(_) => {
                let link = if hops < MAX_LINK_HOPS {
                    fs::read_link(&probe).await.ok()
                } else {
                    None
                };
                if let Some(link) = link {
                    hops += 1;
                    let base = probe.parent().map(Path::to_path_buf).unwrap_or_default();
                    probe = base.join(link);
                    continue;
                }
                match probe.parent() {
                    Some(parent) => probe = parent.to_path_buf(),
                    None => return Ok(()),
                }
            }
        }
    }
}
