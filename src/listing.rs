use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tokio::fs;
use tracing::debug;

use crate::config::Config;
use crate::error::DataError;

/// Immediate entries of a directory, split by kind.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct Listing {
    pub files: Vec<String>,
    pub dirs: Vec<String>,
}

/// An application bundle found under the application root.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AppEntry {
    /// Directory name, usable as `/app/<path>/`
    pub path: String,
    /// Display name
    pub name: String,
}

/// A directory entry with symlinks followed. Dangling links count as files.
pub(crate) struct Entry {
    pub name: String,
    pub is_dir: bool,
}

/// Read the immediate entries of `dir`, sorted by name.
///
/// Names that are not valid UTF-8 cannot be addressed through the API and are
/// left out.
pub(crate) async fn read_entries(dir: &Path) -> Result<Vec<Entry>, DataError> {
    let mut reader = fs::read_dir(dir)
        .await
        .map_err(|e| DataError::NotFound(e.to_string()))?;

    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| DataError::NotFound(e.to_string()))?
    {
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                debug!("Skipping non UTF-8 entry {:?} in {}", raw, dir.display());
                continue;
            }
        };
        let is_dir = match fs::metadata(entry.path()).await {
            Ok(metadata) => metadata.is_dir(),
            Err(_) => false,
        };
        entries.push(Entry { name, is_dir });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// List the files and sub-directories directly inside `dir`.
pub async fn list_entries(dir: &Path) -> Result<Listing, DataError> {
    debug!("Listing directory: {}", dir.display());

    let mut listing = Listing::default();
    for entry in read_entries(dir).await? {
        if entry.is_dir {
            listing.dirs.push(entry.name);
        } else {
            listing.files.push(entry.name);
        }
    }
    Ok(listing)
}

/// Display name of an application directory.
pub fn display_name(dir_name: &str) -> String {
    dir_name.replace('_', " ")
}

/// List the application bundles under `app_dir`, skipping reserved names.
pub async fn list_apps(
    app_dir: &Path,
    config: &Config,
) -> Result<BTreeMap<String, AppEntry>, DataError> {
    let listing = list_entries(app_dir).await?;

    Ok(listing
        .dirs
        .into_iter()
        .filter(|dir| !config.is_reserved_app_dir(dir))
        .map(|dir| {
            let entry = AppEntry {
                name: display_name(&dir),
                path: dir.clone(),
            };
            (dir, entry)
        })
        .collect())
}
