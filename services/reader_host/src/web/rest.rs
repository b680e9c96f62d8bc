//! services/reader_host/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::{AppState, OpenAttempt};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
};
use chrono::{DateTime, Utc};
use note_access_core::domain::{AccessState, NoteId};
use note_access_core::orchestrator::AccessError;
use note_access_core::ports::PortError;
use note_access_core::reader::{OpenViewer, ReaderError, LOAD_FAILED_MESSAGE};
use note_access_core::viewer::{SurfaceSettings, ViewerTarget};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        open_note_handler,
        close_note_handler,
        viewer_page_handler,
        navigation_handler,
        download_handler,
        access_state_handler,
        set_premium_handler,
        practice_complete_handler,
        mock_test_complete_handler,
    ),
    components(
        schemas(
            OpenNoteResponse,
            ViewerDescriptor,
            SurfaceResponse,
            NavigationRequest,
            NavigationResponse,
            DownloadResponse,
            AccessStateResponse,
            PremiumRequest,
            AdShownResponse,
        )
    ),
    tags(
        (name = "Note Reader Host API", description = "Access gating and sandboxed viewing for study notes.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// How the surface should load the note.
#[derive(Serialize, ToSchema, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewerDescriptor {
    /// Load the generated page at `page_path`, using `base_url` as its base.
    Inline { page_path: String, base_url: String },
    /// Load `url` directly.
    Remote { url: String },
}

/// Surface settings the host must apply while the note is open.
#[derive(Serialize, ToSchema, Debug)]
pub struct SurfaceResponse {
    pub cache_enabled: bool,
    pub incognito: bool,
    pub javascript_enabled: bool,
    pub dom_storage_enabled: bool,
    pub multiple_windows: bool,
    pub back_forward_gestures: bool,
}

impl From<SurfaceSettings> for SurfaceResponse {
    fn from(s: SurfaceSettings) -> Self {
        Self {
            cache_enabled: s.cache_enabled,
            incognito: s.incognito,
            javascript_enabled: s.javascript_enabled,
            dom_storage_enabled: s.dom_storage_enabled,
            multiple_windows: s.multiple_windows,
            back_forward_gestures: s.back_forward_gestures,
        }
    }
}

/// The response payload sent after a note was opened.
#[derive(Serialize, ToSchema, Debug)]
pub struct OpenNoteResponse {
    pub note_id: i64,
    pub title: String,
    pub document_type: String,
    pub viewer: ViewerDescriptor,
    pub expires_in_seconds: i64,
    pub surface: SurfaceResponse,
}

impl OpenNoteResponse {
    fn from_viewer(viewer: &OpenViewer, now: DateTime<Utc>) -> Self {
        let note_id = viewer.note.id;
        let descriptor = match &viewer.target {
            ViewerTarget::InlineHtml { base_url, .. } => ViewerDescriptor::Inline {
                page_path: format!("/viewer/{}", note_id),
                base_url: base_url.clone(),
            },
            ViewerTarget::Remote { url } => ViewerDescriptor::Remote { url: url.clone() },
        };
        Self {
            note_id: note_id.0,
            title: viewer.note.localized_title(false).to_string(),
            document_type: viewer.note.document_type.as_str().to_string(),
            viewer: descriptor,
            expires_in_seconds: viewer.session.remaining(now).num_seconds(),
            surface: viewer.surface.into(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct NavigationRequest {
    pub url: String,
}

#[derive(Serialize, ToSchema)]
pub struct NavigationResponse {
    pub allowed: bool,
}

#[derive(Serialize, ToSchema)]
pub struct DownloadResponse {
    pub note_id: i64,
    pub granted: bool,
}

#[derive(Serialize, ToSchema)]
pub struct AccessStateResponse {
    pub is_premium: bool,
    /// `YYYY-MM-DD`, or null if no view ad was ever watched.
    pub last_view_ad_date: Option<String>,
    pub downloaded_note_ids: Vec<i64>,
    pub practice_session_count: u32,
}

impl From<AccessState> for AccessStateResponse {
    fn from(state: AccessState) -> Self {
        Self {
            is_premium: state.is_premium,
            last_view_ad_date: state.last_view_ad_date.map(|d| d.format("%Y-%m-%d").to_string()),
            downloaded_note_ids: state.downloaded_note_ids.into_iter().map(|id| id.0).collect(),
            practice_session_count: state.practice_session_count,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct PremiumRequest {
    pub is_premium: bool,
}

#[derive(Serialize, ToSchema)]
pub struct AdShownResponse {
    pub ad_shown: bool,
}

//=========================================================================================
// Error Mapping
//=========================================================================================

fn reader_error_response(note_id: NoteId, e: ReaderError) -> (StatusCode, String) {
    match e {
        ReaderError::AdNotCompleted => (StatusCode::FORBIDDEN, e.to_string()),
        ReaderError::Backend(PortError::NotFound(_)) => (StatusCode::NOT_FOUND, e.to_string()),
        ReaderError::Backend(_) => (StatusCode::BAD_GATEWAY, e.to_string()),
        ReaderError::Unmounted => (StatusCode::CONFLICT, e.to_string()),
        ReaderError::Access(inner) => {
            error!(%note_id, "Access check failed: {:?}", inner);
            (StatusCode::INTERNAL_SERVER_ERROR, LOAD_FAILED_MESSAGE.to_string())
        }
    }
}

fn access_error_response(e: AccessError) -> (StatusCode, String) {
    error!("Access operation failed: {:?}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Failed to update access state".to_string(),
    )
}

//=========================================================================================
// Reader Handlers
//=========================================================================================

/// Open a note for reading.
///
/// Shows a reward ad first if today's view pass has not been earned, then
/// fetches a fresh signed viewer URL from the backend.
#[utoipa::path(
    post,
    path = "/notes/{id}/open",
    responses(
        (status = 200, description = "Note opened", body = OpenNoteResponse),
        (status = 403, description = "The ad was closed before the reward"),
        (status = 404, description = "Unknown note"),
        (status = 409, description = "The reader was closed while opening"),
        (status = 502, description = "The backend refused or failed the access request")
    ),
    params(("id" = i64, Path, description = "The note id."))
)]
pub async fn open_note_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let note_id = NoteId(id);
    let reader = app_state.new_reader();
    let attempt = OpenAttempt::begin(app_state.clone(), note_id, reader.unmount_handle()).await;

    let viewer = match reader.open(note_id).await {
        Ok(viewer) => viewer,
        Err(e) => {
            attempt.abandon().await;
            return Err(reader_error_response(note_id, e));
        }
    };

    let response = OpenNoteResponse::from_viewer(&viewer, app_state.orchestrator.clock().now());
    if !attempt.finish(viewer).await {
        return Err(reader_error_response(note_id, ReaderError::Unmounted));
    }
    Ok((StatusCode::OK, Json(response)))
}

/// Close the reader for a note, cancelling it if it is still opening.
#[utoipa::path(
    delete,
    path = "/notes/{id}/open",
    responses(
        (status = 204, description = "Reader closed"),
        (status = 404, description = "No reader was open for this note")
    ),
    params(("id" = i64, Path, description = "The note id."))
)]
pub async fn close_note_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> StatusCode {
    let note_id = NoteId(id);
    if app_state.readers.lock().await.close(note_id) {
        info!(%note_id, "Reader closed.");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Serve the viewer for an open note.
///
/// PDF notes get the generated pdf.js page; office documents redirect to
/// the embedded office viewer. Nothing here may be cached.
#[utoipa::path(
    get,
    path = "/viewer/{id}",
    responses(
        (status = 200, description = "Generated PDF viewer page", body = String, content_type = "text/html"),
        (status = 307, description = "Redirect to the office document viewer"),
        (status = 404, description = "No reader is open for this note"),
        (status = 410, description = "The signed URL has expired")
    ),
    params(("id" = i64, Path, description = "The note id."))
)]
pub async fn viewer_page_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, (StatusCode, String)> {
    let note_id = NoteId(id);
    let readers = app_state.readers.lock().await;
    let viewer = readers.get(note_id).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            "No reader is open for this note".to_string(),
        )
    })?;

    if viewer.session.is_expired(app_state.orchestrator.clock().now()) {
        return Err((
            StatusCode::GONE,
            "The viewer link has expired. Reopen the note.".to_string(),
        ));
    }

    let response = match &viewer.target {
        ViewerTarget::InlineHtml { html, .. } => (
            [
                (header::CACHE_CONTROL, "no-store"),
                (header::PRAGMA, "no-cache"),
                (header::REFERRER_POLICY, "no-referrer"),
            ],
            Html(html.clone()),
        )
            .into_response(),
        ViewerTarget::Remote { url } => (
            [(header::CACHE_CONTROL, "no-store")],
            Redirect::temporary(url),
        )
            .into_response(),
    };
    Ok(response)
}

/// Check an in-viewer navigation against the allow-list.
///
/// Anything not explicitly allowed is refused, including navigations for
/// notes that are not open.
#[utoipa::path(
    post,
    path = "/viewer/{id}/navigation",
    request_body = NavigationRequest,
    responses((status = 200, description = "Navigation decision", body = NavigationResponse)),
    params(("id" = i64, Path, description = "The note id."))
)]
pub async fn navigation_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<NavigationRequest>,
) -> Json<NavigationResponse> {
    let readers = app_state.readers.lock().await;
    let allowed = readers
        .get(NoteId(id))
        .map(|viewer| viewer.navigation.allows(&req.url))
        .unwrap_or(false);
    Json(NavigationResponse { allowed })
}

//=========================================================================================
// Access Handlers
//=========================================================================================

/// Unlock a note for download, showing a reward ad unless it is already unlocked.
#[utoipa::path(
    post,
    path = "/notes/{id}/download",
    responses(
        (status = 200, description = "Download decision", body = DownloadResponse),
        (status = 500, description = "Internal server error")
    ),
    params(("id" = i64, Path, description = "The note id."))
)]
pub async fn download_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DownloadResponse>, (StatusCode, String)> {
    let granted = app_state
        .orchestrator
        .ensure_download_access(NoteId(id))
        .await
        .map_err(access_error_response)?;
    Ok(Json(DownloadResponse { note_id: id, granted }))
}

/// Current persisted access state.
#[utoipa::path(
    get,
    path = "/access",
    responses((status = 200, description = "Access state", body = AccessStateResponse))
)]
pub async fn access_state_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<AccessStateResponse>, (StatusCode, String)> {
    let state = app_state
        .orchestrator
        .access_state()
        .await
        .map_err(access_error_response)?;
    Ok(Json(state.into()))
}

/// Record a premium entitlement change from the billing collaborator.
#[utoipa::path(
    put,
    path = "/access/premium",
    request_body = PremiumRequest,
    responses((status = 200, description = "Updated access state", body = AccessStateResponse))
)]
pub async fn set_premium_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<PremiumRequest>,
) -> Result<Json<AccessStateResponse>, (StatusCode, String)> {
    let state = app_state
        .orchestrator
        .set_premium(req.is_premium)
        .await
        .map_err(access_error_response)?;
    Ok(Json(state.into()))
}

//=========================================================================================
// Interstitial Handlers
//=========================================================================================

/// Report a finished practice session; every second one shows an interstitial.
#[utoipa::path(
    post,
    path = "/ads/practice-complete",
    responses((status = 200, description = "Whether an ad was shown", body = AdShownResponse))
)]
pub async fn practice_complete_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<AdShownResponse>, (StatusCode, String)> {
    let ad_shown = app_state
        .orchestrator
        .show_after_practice()
        .await
        .map_err(access_error_response)?;
    Ok(Json(AdShownResponse { ad_shown }))
}

/// Report a finished mock test; shows an interstitial for non-premium users.
#[utoipa::path(
    post,
    path = "/ads/mock-test-complete",
    responses((status = 200, description = "Whether an ad was shown", body = AdShownResponse))
)]
pub async fn mock_test_complete_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<AdShownResponse>, (StatusCode, String)> {
    let ad_shown = app_state
        .orchestrator
        .show_after_mock_test()
        .await
        .map_err(access_error_response)?;
    Ok(Json(AdShownResponse { ad_shown }))
}
