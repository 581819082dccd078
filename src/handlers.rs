use std::collections::BTreeMap;
use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use axum::{
    Json,
    body::Bytes,
    extract::{
        ConnectInfo, OriginalUri, Query, State,
        rejection::{BytesRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Redirect, Response},
};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::aggregate::aggregate;
use crate::error::{DataError, MessageResponse};
use crate::listing::{AppEntry, list_apps, list_entries};
use crate::paths::{self, DataPath};

/// Header carrying the shutdown token when one is configured.
pub const SHUTDOWN_TOKEN_HEADER: &str = "x-shutdown-token";

/// Query parameters for collection reads
#[derive(Debug, Default)]
pub struct DataQuery {
    /// `true` returns a listing instead of the aggregate
    pub ls: Option<String>,
}

impl DataQuery {
    /// Keep the first value of each known key. Repeated keys are not an error.
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let ls = pairs
            .into_iter()
            .find_map(|(key, value)| (key == "ls").then_some(value));
        Self { ls }
    }

    fn list_mode(&self) -> bool {
        self.ls.as_deref() == Some("true")
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Percent-decode the request path and resolve it into the data directory.
fn resolve_request(uri: &Uri) -> Result<DataPath, DataError> {
    let decoded = urlencoding::decode(uri.path())
        .map_err(|_| DataError::InvalidPath(format!("path is not valid UTF-8: {}", uri.path())))?;
    paths::resolve(&decoded)
}

/// Reject targets reached through a symlink that leaves the data directory.
async fn verify_target(state: &AppState, path: &DataPath) -> Result<(), DataError> {
    if state.config.allow_symlink_escape {
        return Ok(());
    }
    paths::ensure_within_root(&state.data_dir, path).await
}

fn json_bytes(body: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

/// Write `body` to a temp file next to `target` and rename it into place.
async fn write_atomic(dir: PathBuf, target: PathBuf, body: Bytes) -> Result<(), DataError> {
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".waserver-")
            .tempfile_in(&dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))?;
        }

        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|err| DataError::Io(std::io::Error::other(err.to_string())))??;

    Ok(())
}

/// Loopback check that also accepts IPv4-mapped IPv6 loopback peers.
fn is_loopback_peer(addr: &SocketAddr) -> bool {
    match addr.ip() {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map_or(v6.is_loopback(), |v4| v4.is_loopback()),
        ip => ip.is_loopback(),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /data/... - Read a document, or aggregate/list a collection
pub async fn get_data(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Response, DataError> {
    debug!("GET {}", uri.path());
    // An unparsable query string reads as no parameters at all
    let query = DataQuery::from_pairs(query.map(|Query(pairs)| pairs).unwrap_or_default());
    let path = resolve_request(&uri)?;
    verify_target(&state, &path).await?;

    if path.document.is_none() {
        let dir = path.collection_dir(&state.data_dir);
        if query.list_mode() {
            let listing = list_entries(&dir).await?;
            return Ok(Json(listing).into_response());
        }
        let body = aggregate(&dir).await?;
        return Ok(json_bytes(body));
    }

    let target = path.target(&state.data_dir);
    let data = fs::read(&target)
        .await
        .map_err(|e| DataError::NotFound(e.to_string()))?;
    Ok(json_bytes(data))
}

/// POST /data/... - Create or overwrite a document
pub async fn post_data(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<MessageResponse>, DataError> {
    debug!("POST {}", uri.path());
    let body = body.inspect_err(|e| warn!("Rejected body for {}: {}", uri.path(), e.body_text()))?;
    let path = resolve_request(&uri)?;
    if path.document.is_none() {
        return Err(DataError::Forbidden(
            "POST to directory not allowed".to_string(),
        ));
    }
    verify_target(&state, &path).await?;

    let dir = path.collection_dir(&state.data_dir);
    fs::create_dir_all(&dir).await.map_err(|e| {
        error!("Failed to create directory {}: {}", dir.display(), e);
        DataError::Io(e)
    })?;

    let target = path.target(&state.data_dir);
    info!("Writing document: {} ({} bytes)", path.relative(), body.len());

    if state.config.atomic_writes {
        write_atomic(dir, target, body).await.inspect_err(|e| {
            error!("Failed to write document {}: {}", path.relative(), e);
        })?;
    } else {
        fs::write(&target, &body).await.map_err(|e| {
            error!("Failed to write document {}: {}", path.relative(), e);
            DataError::Io(e)
        })?;
    }

    Ok(Json(MessageResponse::new("JSON post successful")))
}

/// DELETE /data/... - Remove a document or a whole collection
pub async fn delete_data(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
) -> Result<Json<MessageResponse>, DataError> {
    debug!("DELETE {}", uri.path());
    let path = resolve_request(&uri)?;
    if path.is_root_collection() {
        warn!("Attempted to delete data root: {}", uri.path());
        return Err(DataError::Forbidden(
            "Deleting root directory not allowed".to_string(),
        ));
    }
    verify_target(&state, &path).await?;

    let target = path.target(&state.data_dir);
    let metadata = fs::symlink_metadata(&target)
        .await
        .map_err(|e| DataError::NotFound(e.to_string()))?;

    info!("Deleting: {}", path.relative());

    if metadata.is_dir() {
        fs::remove_dir_all(&target).await?;
    } else {
        fs::remove_file(&target).await?;
    }

    Ok(Json(MessageResponse::new(format!(
        "Deleted {}",
        path.relative()
    ))))
}

/// GET /service/apps - List application bundles
pub async fn get_apps(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, AppEntry>>, DataError> {
    debug!("GET APPS");
    let apps = list_apps(&state.app_dir, &state.config).await?;
    Ok(Json(apps))
}

/// POST /service/shutdown - Stop the server gracefully
pub async fn shutdown(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<MessageResponse>), DataError> {
    if !state.config.allow_remote_shutdown && !is_loopback_peer(&peer) {
        warn!("Rejected shutdown request from {}", peer);
        return Err(DataError::Forbidden(
            "Shutdown only allowed from loopback".to_string(),
        ));
    }

    if let Some(expected) = &state.config.shutdown_token {
        let provided = headers
            .get(SHUTDOWN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            warn!("Rejected shutdown request from {}: bad token", peer);
            return Err(DataError::Forbidden("Invalid shutdown token".to_string()));
        }
    }

    info!("Shutdown requested by {}", peer);
    state.shutdown.cancel();

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new("Shutting down")),
    ))
}

/// Fallback - send everything unmatched to the application bundle
pub async fn redirect_to_app() -> Redirect {
    Redirect::to("/app/")
}
