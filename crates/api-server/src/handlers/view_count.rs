use crate::AppState;
use crate::error::{Error, Result};
use crate::requests::ViewCountRequest;
use faststr::FastStr;
use http::StatusCode;
use serde_json::json;
use storage::{ViewCount, ViewCountStore};
use tracing::{debug, error, info};
use volo_http::{
    Address,
    response::Response,
    server::{
        IntoResponse,
        extract::Json,
        route::{Router, post},
    },
    utils::Extension,
};

/// Counts a view of `req.object_id` by `viewer` unless the same viewer was
/// already counted within the cache TTL, and returns the persisted counter.
pub async fn record_view<S: ViewCountStore>(
    state: &AppState<S>,
    viewer: FastStr,
    req: ViewCountRequest,
) -> Result<ViewCount> {
    let object_id = req.object_key().ok_or(Error::NoObjectId)?;
    let community = req.community_key().ok_or(Error::NoChainOrComm)?;

    if !state.store.community_exists(&community).await? {
        return Err(Error::InvalidChainOrComm);
    }

    let record = state
        .store
        .find_view_count(&community, &object_id)
        .await?
        .ok_or(Error::InvalidThread)?;

    if !state.cache.view(viewer.clone(), object_id.clone()).await {
        debug!(viewer = %viewer, object_id = %object_id, "duplicate view ignored");
        return Ok(record);
    }

    // the cache lock is released here, a failure below under-counts one view
    let record = state.store.increment_view_count(record.id).await?;
    debug!(viewer = %viewer, object_id = %object_id, view_count = record.view_count, "view counted");
    Ok(record)
}

/// Viewer key for unix socket peers, which carry no IP. Such connections all
/// come through a local proxy and share one key.
const UNIX_SOCKET_VIEWER: &str = "unix";

pub fn viewer_id(peer: &Address) -> FastStr {
    match peer {
        Address::Ip(addr) => addr.ip().to_string().into(),
        #[cfg(unix)]
        Address::Unix(_) => FastStr::from_static_str(UNIX_SOCKET_VIEWER),
    }
}

async fn view_count_handler<S: ViewCountStore>(
    Extension(state): Extension<AppState<S>>,
    peer: Address,
    Json(req): Json<ViewCountRequest>,
) -> Response {
    let viewer = viewer_id(&peer);
    match record_view(&state, viewer, req).await {
        Ok(record) => (StatusCode::OK, success_body(&record)).into_response(),
        Err(e) => {
            let status = e.status_code();
            if status.is_server_error() {
                error!(error = %e, "view count failed");
            } else {
                info!(error = %e, "view count rejected");
            }
            (status, error_body(&e)).into_response()
        }
    }
}

pub fn view_count_router<S: ViewCountStore>() -> Router {
    Router::new().route("/api/viewCount", post(view_count_handler::<S>))
}

fn success_body(record: &ViewCount) -> FastStr {
    json!({
        "status": "Success",
        "result": record,
    })
    .to_string()
    .into()
}

fn error_body(e: &Error) -> FastStr {
    json!({ "error": e.public_message() }).to_string().into()
}
