//! REST API of the stowage console.
//!
//! Owns the staging area, runs uploaded CSV files through the normalization
//! pipeline and forwards submissions and queries to the stowage backend.
//! Uses Axum as the web framework and supports CORS.

use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Json, Multipart, Path, Query, State};
use axum::{
    Router,
    http::{StatusCode, Uri, header},
    response::{Html, IntoResponse, Response},
    routing::{get, patch, post},
};
use rust_embed::RustEmbed;
use serde::Serialize;
#[allow(unused_imports)]
use serde_json::json;
use std::sync::OnceLock;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};

use crate::batch::parse_batch;
use crate::client::{BackendClient, BackendError, RetrieveOutcome};
use crate::config::{ApiConfig, AppConfig, IngestConfig};
use crate::ingest::{IngestError, RawRow, RecordKind, build_preview, parse_rows};
use crate::model::{
    ContainerDetails, ContainerPatch, ContainerSummary, Dimensions, ItemPatch, LogEntry, LogQuery,
    NormalizedContainer, NormalizedItem, OperationAck, Placement, PlacementRequest, Position,
    RetrieveRequest, ReturnPlan, ReturnPlanRequest, StoredItem, ValidationError, WasteItem,
    WasteReport,
};
use crate::scene::{Scene, SceneBox, project_container, project_return_plan};
use crate::staging::{SharedStaging, StagingArea, StagingError, UploadSummary};
use crate::types::{Dimensional, Vec3};
use crate::upload::{UploadRejection, UploadedFile};

/// Multipart field carrying the uploaded file.
const FILE_FIELD: &str = "file";
/// Allowance for multipart framing on top of the file size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct ApiState {
    client: BackendClient,
    staging: SharedStaging,
    ingest: IngestConfig,
}

impl ApiState {
    pub fn new(client: BackendClient, ingest: IngestConfig) -> Self {
        Self {
            client,
            staging: StagingArea::shared(),
            ingest,
        }
    }
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>stowage console API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                window.ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                });
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Embedded Web Assets (HTML, CSS, JS)
#[derive(RustEmbed)]
#[folder = "web/"]
struct WebAssets;

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

/// Everything a handler can fail with, mapped onto status codes in one place.
#[derive(Debug, Error)]
enum ApiError {
    #[error(transparent)]
    Upload(#[from] UploadRejection),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Staging(#[from] StagingError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    NotMultipart(#[from] MultipartRejection),
    #[error(transparent)]
    Json(#[from] JsonRejection),
    #[error(transparent)]
    Query(#[from] QueryRejection),
    #[error(transparent)]
    Path(#[from] PathRejection),
    #[error("Batch file contains no usable placement rows ({rejected} rejected)")]
    EmptyBatch { rejected: usize },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let details = self.to_string();
        let (status, error) = match &self {
            ApiError::Upload(UploadRejection::NotCsv { .. }) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Unsupported file type")
            }
            ApiError::Upload(UploadRejection::TooLarge { .. }) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "Upload too large")
            }
            ApiError::Upload(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Invalid upload"),
            ApiError::Multipart(err) => (err.status(), "Invalid upload"),
            ApiError::NotMultipart(err) => (err.status(), "Invalid upload"),
            ApiError::Ingest(_) => (StatusCode::UNPROCESSABLE_ENTITY, "CSV parse failed"),
            ApiError::EmptyBatch { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "CSV parse failed"),
            ApiError::Staging(StagingError::UnknownIndex { .. }) => {
                (StatusCode::NOT_FOUND, "Unknown staged row")
            }
            ApiError::Staging(StagingError::NothingToSubmit) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "Nothing to submit")
            }
            ApiError::Staging(StagingError::Invalid(_)) | ApiError::Validation(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "Invalid input data")
            }
            ApiError::Json(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Invalid JSON data"),
            ApiError::Query(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Invalid query parameters"),
            ApiError::Path(_) => (StatusCode::BAD_REQUEST, "Invalid path parameter"),
            ApiError::Backend(BackendError::NotFound(_)) => (StatusCode::NOT_FOUND, "Not found"),
            ApiError::Backend(err @ BackendError::Configuration(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.status_line())
            }
            ApiError::Backend(err) => (StatusCode::BAD_GATEWAY, err.status_line()),
        };

        if status.is_server_error() {
            error!("❌ {error}: {details}");
        } else {
            warn!("⚠️ {error}: {details}");
        }
        error_response(status, error, details)
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Multipart body of the upload endpoints.
#[derive(ToSchema)]
#[allow(dead_code)]
struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

#[derive(Serialize, ToSchema)]
struct BatchUploadResponse {
    file_name: String,
    accepted: usize,
    rejected_count: usize,
    #[schema(value_type = Vec<Object>)]
    preview: Vec<RawRow>,
    result: OperationAck,
}

#[derive(Serialize, ToSchema)]
struct StagedItem {
    index: usize,
    item: NormalizedItem,
}

#[derive(Serialize, ToSchema)]
struct StagedContainer {
    index: usize,
    container: NormalizedContainer,
}

/// Outcome of a placement submission.
///
/// `status` is `success` when the backend placed at least one item and
/// `empty` when it answered without placements.
#[derive(Serialize, ToSchema)]
struct SubmissionResponse {
    status: String,
    message: String,
    placements: Vec<Placement>,
}

impl SubmissionResponse {
    fn from_placements(placements: Vec<Placement>) -> Self {
        if placements.is_empty() {
            return Self {
                status: "empty".to_string(),
                message: "Backend returned no placements".to_string(),
                placements,
            };
        }
        let waste = placements.iter().filter(|p| p.is_waste).count();
        Self {
            status: "success".to_string(),
            message: format!("{} placements, {} flagged as waste", placements.len(), waste),
            placements,
        }
    }
}

#[derive(Serialize, ToSchema)]
struct ContainersResponse {
    containers: Vec<ContainerSummary>,
}

#[derive(Serialize, ToSchema)]
struct ContainerView {
    container: ContainerDetails,
    scene: Scene,
}

#[derive(Serialize, ToSchema)]
struct ItemResponse {
    item: StoredItem,
}

#[derive(Serialize, ToSchema)]
struct ReturnPlanView {
    plan: ReturnPlan,
    scene: Scene,
}

#[derive(Serialize, ToSchema)]
struct LogsResponse {
    logs: Vec<LogEntry>,
}

/// Buffers the `file` field of a multipart body.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadedFile, ApiError> {
    let mut multipart = multipart?;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await?.to_vec();
        return Ok(UploadedFile::new(file_name, content_type, bytes));
    }
    Err(UploadRejection::MissingField(FILE_FIELD).into())
}

async fn stage_upload(
    state: &ApiState,
    multipart: Result<Multipart, MultipartRejection>,
    kind: RecordKind,
) -> ApiResult<UploadSummary> {
    let upload = read_upload(multipart).await?;
    info!(
        "📥 Upload received: {} ({} bytes, {})",
        upload.file_name,
        upload.bytes.len(),
        kind
    );
    let contents = upload.ensure_csv(state.ingest.max_upload_bytes())?;
    let parsed = parse_rows(contents, kind)?;
    info!(
        "📄 Parsed {}: {} accepted, {} rejected",
        kind,
        parsed.records.len(),
        parsed.rejected_count
    );
    if parsed.records.is_empty() {
        warn!("⚠️ {} contained no usable {} rows", upload.file_name, kind);
    }

    let summary = state
        .staging
        .write()
        .await
        .stage(&upload.file_name, parsed, state.ingest.preview_rows());
    Ok(Json(summary))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        upload_items,
        upload_containers,
        upload_batch_placement,
        get_staging,
        clear_staging,
        add_staged_item,
        update_staged_item,
        remove_staged_item,
        add_staged_container,
        update_staged_container,
        remove_staged_container,
        submit_placement,
        place_item,
        list_containers,
        container_details,
        search_item,
        retrieve_item,
        identify_waste,
        return_plan,
        list_logs
    ),
    components(
        schemas(
            ErrorResponse,
            UploadForm,
            UploadSummary,
            BatchUploadResponse,
            StagingArea,
            StagedItem,
            StagedContainer,
            NormalizedItem,
            NormalizedContainer,
            ItemPatch,
            ContainerPatch,
            SubmissionResponse,
            Placement,
            PlacementRequest,
            Position,
            Dimensions,
            OperationAck,
            ContainersResponse,
            ContainerView,
            Scene,
            SceneBox,
            Vec3,
            ItemResponse,
            RetrieveRequest,
            RetrieveOutcome,
            WasteItem,
            WasteReport,
            ReturnPlanRequest,
            ReturnPlanView,
            LogsResponse
        )
    ),
    tags(
        (name = "uploads", description = "CSV uploads and normalization"),
        (name = "staging", description = "Records staged for placement"),
        (name = "backend", description = "Calls forwarded to the stowage backend")
    )
)]
struct ApiDoc;

/// Assembles the console router around an existing state.
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);
    let body_limit = state.ingest.max_upload_bytes() + MULTIPART_OVERHEAD;

    Router::new()
        // CSV uploads
        .route("/api/uploads/items", post(upload_items))
        .route("/api/uploads/containers", post(upload_containers))
        .route("/api/uploads/batch-placement", post(upload_batch_placement))
        // Staging
        .route("/api/staging", get(get_staging).delete(clear_staging))
        .route("/api/staging/items", post(add_staged_item))
        .route(
            "/api/staging/items/{index}",
            patch(update_staged_item).delete(remove_staged_item),
        )
        .route("/api/staging/containers", post(add_staged_container))
        .route(
            "/api/staging/containers/{index}",
            patch(update_staged_container).delete(remove_staged_container),
        )
        // Backend
        .route("/api/placement/submit", post(submit_placement))
        .route("/api/place", post(place_item))
        .route("/api/containers", get(list_containers))
        .route("/api/containers/{id}", get(container_details))
        .route("/api/items/{id}", get(search_item))
        .route("/api/retrieve", post(retrieve_item))
        .route("/api/waste/identify", get(identify_waste))
        .route("/api/waste/return-plan", post(return_plan))
        .route("/api/logs", get(list_logs))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        // Web-UI (embedded)
        .route("/", get(serve_index))
        .route("/{*path}", get(serve_static))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

/// Starts the console server and blocks until it terminates.
pub async fn start_api_server(config: AppConfig) {
    let client = match BackendClient::new(&config.backend) {
        Ok(client) => client,
        Err(err) => {
            error!("❌ Could not create backend client: {err}");
            return;
        }
    };
    let app = build_router(ApiState::new(client, config.ingest));

    let api_config: ApiConfig = config.api;
    let addr = api_config.socket_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("❌ Could not bind API server to {}: {}", addr, err);
            return;
        }
    };

    let display_host = api_config.display_host();
    info!(
        "🚀 Server running on http://{}:{}",
        display_host,
        api_config.port()
    );
    if api_config.binds_to_all_interfaces() {
        info!("💡 Local access: http://localhost:{}", api_config.port());
    }
    info!("🛰️ Backend: {}", config.backend.base_url());
    info!("📑 Documentation: GET /docs, GET /docs/openapi.json");
    info!("🌐 Web-UI: http://{}:{}", display_host, api_config.port());

    if let Err(err) = axum::serve(listener, app).await {
        error!("❌ API server terminated with an error: {err}");
    }
}

/// Handler for POST /api/uploads/items.
///
/// Parses an item inventory and replaces the staged items with it.
#[utoipa::path(
    post,
    path = "/api/uploads/items",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Items staged", body = UploadSummary),
        (status = UNSUPPORTED_MEDIA_TYPE, description = "Not a CSV file", body = ErrorResponse),
        (status = PAYLOAD_TOO_LARGE, description = "File exceeds the upload limit", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "File could not be parsed", body = ErrorResponse)
    ),
    tag = "uploads"
)]
async fn upload_items(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<UploadSummary> {
    stage_upload(&state, multipart, RecordKind::Items).await
}

/// Handler for POST /api/uploads/containers.
#[utoipa::path(
    post,
    path = "/api/uploads/containers",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Containers staged", body = UploadSummary),
        (status = UNSUPPORTED_MEDIA_TYPE, description = "Not a CSV file", body = ErrorResponse),
        (status = PAYLOAD_TOO_LARGE, description = "File exceeds the upload limit", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "File could not be parsed", body = ErrorResponse)
    ),
    tag = "uploads"
)]
async fn upload_containers(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<UploadSummary> {
    stage_upload(&state, multipart, RecordKind::Containers).await
}

/// Handler for POST /api/uploads/batch-placement.
///
/// Batch rows carry their own coordinates; they skip staging and go straight
/// to the backend's batch endpoint.
#[utoipa::path(
    post,
    path = "/api/uploads/batch-placement",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Batch forwarded", body = BatchUploadResponse),
        (status = UNSUPPORTED_MEDIA_TYPE, description = "Not a CSV file", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "No usable rows", body = ErrorResponse),
        (status = BAD_GATEWAY, description = "Backend failed", body = ErrorResponse)
    ),
    tag = "uploads"
)]
async fn upload_batch_placement(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<BatchUploadResponse> {
    let upload = read_upload(multipart).await?;
    info!(
        "📥 Batch upload received: {} ({} bytes)",
        upload.file_name,
        upload.bytes.len()
    );
    let contents = upload.ensure_csv(state.ingest.max_upload_bytes())?;
    let parsed = parse_batch(contents)?;
    if parsed.requests.is_empty() {
        return Err(ApiError::EmptyBatch {
            rejected: parsed.rejected_count,
        });
    }

    let accepted = parsed.requests.len();
    let preview = build_preview(&parsed.raw_rows, state.ingest.preview_rows());
    let result = state.client.batch_place(parsed.requests).await?;
    info!(
        "📦 Batch placement: {} forwarded, {} rejected, success = {}",
        accepted, parsed.rejected_count, result.success
    );

    Ok(Json(BatchUploadResponse {
        file_name: upload.file_name,
        accepted,
        rejected_count: parsed.rejected_count,
        preview,
        result,
    }))
}

/// Handler for GET /api/staging.
#[utoipa::path(
    get,
    path = "/api/staging",
    responses((status = 200, description = "Currently staged records", body = StagingArea)),
    tag = "staging"
)]
async fn get_staging(State(state): State<ApiState>) -> Json<StagingArea> {
    Json(state.staging.read().await.clone())
}

/// Handler for DELETE /api/staging.
#[utoipa::path(
    delete,
    path = "/api/staging",
    responses((status = NO_CONTENT, description = "Staging area cleared")),
    tag = "staging"
)]
async fn clear_staging(State(state): State<ApiState>) -> StatusCode {
    state.staging.write().await.clear();
    info!("🧹 Staging area cleared");
    StatusCode::NO_CONTENT
}

/// Handler for POST /api/staging/items: appends a blank row for inline editing.
#[utoipa::path(
    post,
    path = "/api/staging/items",
    responses((status = CREATED, description = "Blank item appended", body = StagedItem)),
    tag = "staging"
)]
async fn add_staged_item(State(state): State<ApiState>) -> (StatusCode, Json<StagedItem>) {
    let mut staging = state.staging.write().await;
    let index = staging.add_item();
    let item = staging.items[index].clone();
    (StatusCode::CREATED, Json(StagedItem { index, item }))
}

/// Handler for PATCH /api/staging/items/{index}.
#[utoipa::path(
    patch,
    path = "/api/staging/items/{index}",
    params(("index" = usize, Path, description = "Row index in the staged items")),
    request_body = ItemPatch,
    responses(
        (status = 200, description = "Edited item", body = StagedItem),
        (status = NOT_FOUND, description = "No row at this index", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Edit rejected", body = ErrorResponse)
    ),
    tag = "staging"
)]
async fn update_staged_item(
    State(state): State<ApiState>,
    index: Result<Path<usize>, PathRejection>,
    patch: Result<Json<ItemPatch>, JsonRejection>,
) -> ApiResult<StagedItem> {
    let Path(index) = index?;
    let Json(patch) = patch?;
    let mut staging = state.staging.write().await;
    let item = staging.update_item(index, patch)?.clone();
    Ok(Json(StagedItem { index, item }))
}

/// Handler for DELETE /api/staging/items/{index}.
#[utoipa::path(
    delete,
    path = "/api/staging/items/{index}",
    params(("index" = usize, Path, description = "Row index in the staged items")),
    responses(
        (status = 200, description = "Removed item", body = StagedItem),
        (status = NOT_FOUND, description = "No row at this index", body = ErrorResponse)
    ),
    tag = "staging"
)]
async fn remove_staged_item(
    State(state): State<ApiState>,
    index: Result<Path<usize>, PathRejection>,
) -> ApiResult<StagedItem> {
    let Path(index) = index?;
    let item = state.staging.write().await.remove_item(index)?;
    Ok(Json(StagedItem { index, item }))
}

/// Handler for POST /api/staging/containers.
#[utoipa::path(
    post,
    path = "/api/staging/containers",
    responses((status = CREATED, description = "Blank container appended", body = StagedContainer)),
    tag = "staging"
)]
async fn add_staged_container(
    State(state): State<ApiState>,
) -> (StatusCode, Json<StagedContainer>) {
    let mut staging = state.staging.write().await;
    let index = staging.add_container();
    let container = staging.containers[index].clone();
    (StatusCode::CREATED, Json(StagedContainer { index, container }))
}

/// Handler for PATCH /api/staging/containers/{index}.
#[utoipa::path(
    patch,
    path = "/api/staging/containers/{index}",
    params(("index" = usize, Path, description = "Row index in the staged containers")),
    request_body = ContainerPatch,
    responses(
        (status = 200, description = "Edited container", body = StagedContainer),
        (status = NOT_FOUND, description = "No row at this index", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Edit rejected", body = ErrorResponse)
    ),
    tag = "staging"
)]
async fn update_staged_container(
    State(state): State<ApiState>,
    index: Result<Path<usize>, PathRejection>,
    patch: Result<Json<ContainerPatch>, JsonRejection>,
) -> ApiResult<StagedContainer> {
    let Path(index) = index?;
    let Json(patch) = patch?;
    let mut staging = state.staging.write().await;
    let container = staging.update_container(index, patch)?.clone();
    Ok(Json(StagedContainer { index, container }))
}

/// Handler for DELETE /api/staging/containers/{index}.
#[utoipa::path(
    delete,
    path = "/api/staging/containers/{index}",
    params(("index" = usize, Path, description = "Row index in the staged containers")),
    responses(
        (status = 200, description = "Removed container", body = StagedContainer),
        (status = NOT_FOUND, description = "No row at this index", body = ErrorResponse)
    ),
    tag = "staging"
)]
async fn remove_staged_container(
    State(state): State<ApiState>,
    index: Result<Path<usize>, PathRejection>,
) -> ApiResult<StagedContainer> {
    let Path(index) = index?;
    let container = state.staging.write().await.remove_container(index)?;
    Ok(Json(StagedContainer { index, container }))
}

/// Handler for POST /api/placement/submit.
///
/// Sends the staged containers and items to the placement engine. The staged
/// set is left as is, so a failed submission can be repeated by hand.
#[utoipa::path(
    post,
    path = "/api/placement/submit",
    responses(
        (status = 200, description = "Placement result", body = SubmissionResponse),
        (status = UNPROCESSABLE_ENTITY, description = "No items staged", body = ErrorResponse),
        (status = BAD_GATEWAY, description = "Backend failed", body = ErrorResponse)
    ),
    tag = "backend"
)]
async fn submit_placement(State(state): State<ApiState>) -> ApiResult<SubmissionResponse> {
    let payload = state.staging.read().await.submission_payload()?;
    info!(
        "📤 Submitting placement: {} items, {} containers",
        payload.items.len(),
        payload.containers.len()
    );
    let response = state.client.submit_placement(&payload).await?;
    let submission = SubmissionResponse::from_placements(response.placements);
    info!("📦 Placement result: {}", submission.message);
    Ok(Json(submission))
}

/// Handler for POST /api/place.
#[utoipa::path(
    post,
    path = "/api/place",
    request_body = PlacementRequest,
    responses(
        (status = 200, description = "Backend acknowledgement", body = OperationAck),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid placement", body = ErrorResponse),
        (status = BAD_GATEWAY, description = "Backend failed", body = ErrorResponse)
    ),
    tag = "backend"
)]
async fn place_item(
    State(state): State<ApiState>,
    payload: Result<Json<PlacementRequest>, JsonRejection>,
) -> ApiResult<OperationAck> {
    let Json(request) = payload?;
    request.validate()?;
    info!("📥 Manual placement of {} into {}", request.item_id, request.container_id);
    Ok(Json(state.client.place_item(&request).await?))
}

/// Handler for GET /api/containers.
#[utoipa::path(
    get,
    path = "/api/containers",
    responses(
        (status = 200, description = "Known containers", body = ContainersResponse),
        (status = BAD_GATEWAY, description = "Backend failed", body = ErrorResponse)
    ),
    tag = "backend"
)]
async fn list_containers(State(state): State<ApiState>) -> ApiResult<ContainersResponse> {
    let containers = state.client.list_containers().await?;
    Ok(Json(ContainersResponse { containers }))
}

/// Handler for GET /api/containers/{id}: contents plus their 3D projection.
#[utoipa::path(
    get,
    path = "/api/containers/{id}",
    params(("id" = String, Path, description = "Container identifier")),
    responses(
        (status = 200, description = "Container contents", body = ContainerView),
        (status = NOT_FOUND, description = "Unknown container", body = ErrorResponse),
        (status = BAD_GATEWAY, description = "Backend failed", body = ErrorResponse)
    ),
    tag = "backend"
)]
async fn container_details(
    State(state): State<ApiState>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<ContainerView> {
    let Path(id) = id?;
    let container = state.client.container_details(&id).await?;
    let scene = project_container(&container);
    let capacity = container.dimensions.volume();
    let fill = if capacity > 0.0 {
        scene.occupied_volume() / capacity * 100.0
    } else {
        0.0
    };
    info!(
        "📦 Container {}: {} items, {} drawn, {:.1}% filled",
        container.container_id,
        container.items.len(),
        scene.boxes.len(),
        fill
    );
    Ok(Json(ContainerView { container, scene }))
}

/// Handler for GET /api/items/{id}.
#[utoipa::path(
    get,
    path = "/api/items/{id}",
    params(("id" = String, Path, description = "Item identifier")),
    responses(
        (status = 200, description = "Item found", body = ItemResponse),
        (status = NOT_FOUND, description = "Unknown item", body = ErrorResponse),
        (status = BAD_GATEWAY, description = "Backend failed", body = ErrorResponse)
    ),
    tag = "backend"
)]
async fn search_item(
    State(state): State<ApiState>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<ItemResponse> {
    let Path(id) = id?;
    let item = state.client.search_item(&id).await?;
    Ok(Json(ItemResponse { item }))
}

/// Handler for POST /api/retrieve.
#[utoipa::path(
    post,
    path = "/api/retrieve",
    request_body = RetrieveRequest,
    responses(
        (status = 200, description = "Retrieved item or exhaustion notice", body = RetrieveOutcome),
        (status = UNPROCESSABLE_ENTITY, description = "Missing item id", body = ErrorResponse),
        (status = BAD_GATEWAY, description = "Backend failed", body = ErrorResponse)
    ),
    tag = "backend"
)]
async fn retrieve_item(
    State(state): State<ApiState>,
    payload: Result<Json<RetrieveRequest>, JsonRejection>,
) -> ApiResult<RetrieveOutcome> {
    let Json(request) = payload?;
    let item_id = request.item_id.trim();
    if item_id.is_empty() {
        return Err(ValidationError::MissingField("item_id").into());
    }
    info!("📤 Retrieving {}", item_id);
    Ok(Json(state.client.retrieve_item(item_id).await?))
}

/// Handler for GET /api/waste/identify.
#[utoipa::path(
    get,
    path = "/api/waste/identify",
    responses(
        (status = 200, description = "Items flagged as waste", body = WasteReport),
        (status = BAD_GATEWAY, description = "Backend failed", body = ErrorResponse)
    ),
    tag = "backend"
)]
async fn identify_waste(State(state): State<ApiState>) -> ApiResult<WasteReport> {
    let report = state.client.identify_waste().await?;
    info!("🗑️ {} waste items identified", report.waste_items.len());
    Ok(Json(report))
}

/// Handler for POST /api/waste/return-plan: plan plus its 3D projection.
#[utoipa::path(
    post,
    path = "/api/waste/return-plan",
    request_body = ReturnPlanRequest,
    responses(
        (status = 200, description = "Return plan", body = ReturnPlanView),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid request", body = ErrorResponse),
        (status = BAD_GATEWAY, description = "Backend failed", body = ErrorResponse)
    ),
    tag = "backend"
)]
async fn return_plan(
    State(state): State<ApiState>,
    payload: Result<Json<ReturnPlanRequest>, JsonRejection>,
) -> ApiResult<ReturnPlanView> {
    let Json(request) = payload?;
    request.validate()?;
    let plan = state.client.return_plan(&request).await?;
    let scene = project_return_plan(&plan);
    info!(
        "🚚 Return plan for {}: {} items, {:.1} kg, valid = {}",
        plan.container_id,
        plan.placed_items.len(),
        plan.total_mass,
        plan.plan_valid
    );
    Ok(Json(ReturnPlanView { plan, scene }))
}

/// Handler for GET /api/logs.
#[utoipa::path(
    get,
    path = "/api/logs",
    params(LogQuery),
    responses(
        (status = 200, description = "Matching log entries", body = LogsResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid filter", body = ErrorResponse),
        (status = BAD_GATEWAY, description = "Backend failed", body = ErrorResponse)
    ),
    tag = "backend"
)]
async fn list_logs(
    State(state): State<ApiState>,
    query: Result<Query<LogQuery>, QueryRejection>,
) -> ApiResult<LogsResponse> {
    let Query(query) = query?;
    query.validate()?;
    let logs = state.client.logs(&query).await?;
    Ok(Json(LogsResponse { logs }))
}

/// Serves the index.html main page
async fn serve_index() -> Response {
    match WebAssets::get("index.html") {
        Some(content) => Html(content.data).into_response(),
        None => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}

/// Serves static assets (JS, CSS, etc.)
async fn serve_static(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');

    match WebAssets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.as_ref())], content.data).into_response()
        }
        None => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}

async fn serve_openapi_json() -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use reqwest::multipart::{Form, Part};
    use serde_json::Value;
    use std::net::SocketAddr;
    use std::time::Duration;

    const ITEMS_CSV: &str = "\
Item ID,Name,Width (cm),Depth (cm),Height (cm),Mass (kg),Priority (1-100),Expiry Date (ISO Format),Usage Limit,Preferred Zone
001,Food Packet,10,10,20,5,80,2024-03-01,30 uses,Crew Quarters
002,Oxygen Cylinder,15,15,50,30,95,N/A,100,Airlock
,Orphan,1,1,1,1,1,,,Lab
";

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn mock_backend() -> Router {
        Router::new()
            .route(
                "/api/placement",
                post(|Json(body): Json<Value>| async move {
                    let placements: Vec<Value> = body["items"]
                        .as_array()
                        .map(|items| {
                            items
                                .iter()
                                .map(|item| {
                                    json!({
                                        "item_id": item["item_id"],
                                        "name": item["name"],
                                        "container_id": "contA",
                                        "position": {
                                            "start_coordinates": { "width": 0.0, "depth": 0.0, "height": 0.0 },
                                            "end_coordinates": { "width": 10.0, "depth": 10.0, "height": 20.0 }
                                        }
                                    })
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    Json(json!({ "placements": placements }))
                }),
            )
            .route(
                "/api/batch-place",
                post(|Json(body): Json<Value>| async move {
                    let count = body["items"].as_array().map(|a| a.len()).unwrap_or(0);
                    Json(json!({ "success": true, "message": format!("{count} placed") }))
                }),
            )
            .route(
                "/api/containers/{id}",
                get(|Path(id): Path<String>| async move {
                    if id != "contA" {
                        return Err(StatusCode::NOT_FOUND);
                    }
                    Ok(Json(json!({
                        "container": {
                            "container_id": "contA",
                            "zone": "Crew Quarters",
                            "dimensions": { "width": 100.0, "depth": 100.0, "height": 100.0 },
                            "occupied_volume": 2000.0,
                            "items": [
                                {
                                    "item_id": "001",
                                    "name": "Food Packet",
                                    "position": {
                                        "start_coordinates": { "width": 0.0, "depth": 0.0, "height": 0.0 },
                                        "end_coordinates": { "width": 10.0, "depth": 10.0, "height": 20.0 }
                                    }
                                },
                                { "item_id": "002", "name": "Loose" }
                            ]
                        }
                    })))
                }),
            )
            .route(
                "/api/waste/return-plan",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({
                        "container_id": body["undocking_container_id"],
                        "container_dimensions": { "width": 50.0, "depth": 50.0, "height": 50.0 },
                        "total_mass": 12.5,
                        "plan_valid": true,
                        "placed_items": [{
                            "item_id": "009",
                            "name": "Expired Food",
                            "dimensions": { "width": 10.0, "depth": 10.0, "height": 10.0 },
                            "position": {
                                "start_coordinates": { "width": 0.0, "depth": 0.0, "height": 0.0 },
                                "end_coordinates": { "width": 50.0, "depth": 50.0, "height": 50.0 }
                            }
                        }]
                    }))
                }),
            )
    }

    async fn console_with_backend(backend: Option<Router>, ingest: IngestConfig) -> SocketAddr {
        let backend_addr = match backend {
            Some(router) => serve(router).await,
            None => {
                // Reserve a port and release it so nothing is listening there.
                let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
                listener.local_addr().unwrap()
            }
        };
        let config =
            BackendConfig::new(format!("http://{backend_addr}/api"), Duration::from_secs(5));
        let client = BackendClient::new(&config).unwrap();
        serve(build_router(ApiState::new(client, ingest))).await
    }

    fn csv_form(file_name: &str, mime: &str, contents: &str) -> Form {
        let part = Part::bytes(contents.as_bytes().to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime)
            .unwrap();
        Form::new().part(FILE_FIELD, part)
    }

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        for path in [
            "/api/uploads/items",
            "/api/uploads/containers",
            "/api/uploads/batch-placement",
            "/api/staging",
            "/api/staging/items/{index}",
            "/api/placement/submit",
            "/api/containers/{id}",
            "/api/retrieve",
            "/api/waste/return-plan",
            "/api/logs",
        ] {
            assert!(
                paths.contains_key(path),
                "OpenAPI documentation is missing the {} path",
                path
            );
        }
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        for name in ["UploadSummary", "NormalizedItem", "Scene", "ErrorResponse"] {
            assert!(
                components.schemas.contains_key(name),
                "Expected schema '{}' is missing from OpenAPI spec",
                name
            );
        }
    }

    #[test]
    fn submission_status_distinguishes_empty_results() {
        assert_eq!(SubmissionResponse::from_placements(Vec::new()).status, "empty");
    }

    #[tokio::test]
    async fn upload_stage_and_submit_round_trip() {
        let console = console_with_backend(Some(mock_backend()), IngestConfig::default()).await;
        let http = reqwest::Client::new();

        let summary: Value = http
            .post(format!("http://{console}/api/uploads/items"))
            .multipart(csv_form("items.csv", "text/csv", ITEMS_CSV))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(summary["kind"], "items");
        assert_eq!(summary["accepted"], 2);
        assert_eq!(summary["rejected_count"], 1);
        assert_eq!(summary["preview"][2]["Name"], "Orphan");
        assert_eq!(summary["preview"][0]["Usage Limit"], "30 uses");

        let staging: Value = http
            .get(format!("http://{console}/api/staging"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(staging["items"][0]["usage_limit"], 30);
        assert_eq!(staging["items"][0]["expiry_date"], "2024-03-01T00:00:00");
        assert_eq!(staging["items"][1]["expiry_date"], "N/A");

        let response = http
            .post(format!("http://{console}/api/placement/submit"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let submission: Value = response.json().await.unwrap();
        assert_eq!(submission["status"], "success");
        assert_eq!(submission["placements"][1]["item_id"], "002");
    }

    #[tokio::test]
    async fn non_csv_uploads_are_rejected_without_staging() {
        let console = console_with_backend(None, IngestConfig::default()).await;
        let http = reqwest::Client::new();

        let response = http
            .post(format!("http://{console}/api/uploads/items"))
            .multipart(csv_form("items.json", "application/json", "[]"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Unsupported file type");

        let staging: Value = http
            .get(format!("http://{console}/api/staging"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(staging["items"].as_array().map(Vec::len), Some(0));
        assert!(staging["last_upload"].is_null());
    }

    #[tokio::test]
    async fn oversized_uploads_are_rejected() {
        let ingest = IngestConfig::builder().max_upload_bytes(64).build();
        let console = console_with_backend(None, ingest).await;
        let response = reqwest::Client::new()
            .post(format!("http://{console}/api/uploads/items"))
            .multipart(csv_form("items.csv", "text/csv", ITEMS_CSV))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn submit_without_items_and_with_dead_backend() {
        let console = console_with_backend(None, IngestConfig::default()).await;
        let http = reqwest::Client::new();

        let response = http
            .post(format!("http://{console}/api/placement/submit"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);

        http.post(format!("http://{console}/api/uploads/items"))
            .multipart(csv_form("items.csv", "text/csv", ITEMS_CSV))
            .send()
            .await
            .unwrap();
        let response = http
            .post(format!("http://{console}/api/placement/submit"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Backend unreachable");
    }

    #[tokio::test]
    async fn inline_edits_and_unknown_rows() {
        let console = console_with_backend(None, IngestConfig::default()).await;
        let http = reqwest::Client::new();

        let created = http
            .post(format!("http://{console}/api/staging/items"))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), reqwest::StatusCode::CREATED);

        let edited: Value = http
            .patch(format!("http://{console}/api/staging/items/0"))
            .json(&json!({ "item_id": "900", "expiry_date": "2025-12-31" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(edited["item"]["item_id"], "900");
        assert_eq!(edited["item"]["expiry_date"], "2025-12-31T00:00:00");

        let blanked = http
            .patch(format!("http://{console}/api/staging/items/0"))
            .json(&json!({ "item_id": "  " }))
            .send()
            .await
            .unwrap();
        assert_eq!(blanked.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);

        let missing = http
            .delete(format!("http://{console}/api/staging/items/4"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        let cleared = http
            .delete(format!("http://{console}/api/staging"))
            .send()
            .await
            .unwrap();
        assert_eq!(cleared.status(), reqwest::StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn batch_upload_forwards_valid_rows() {
        let console = console_with_backend(Some(mock_backend()), IngestConfig::default()).await;
        let csv = "\
itemId,userId,timestamp,containerId,start_width,start_depth,start_height,end_width,end_depth,end_height
001,astro,,contA,0,0,0,10,10,20
002,astro,,contA,0,0,x,10,10,20
";
        let body: Value = reqwest::Client::new()
            .post(format!("http://{console}/api/uploads/batch-placement"))
            .multipart(csv_form("batch.csv", "text/csv", csv))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["accepted"], 1);
        assert_eq!(body["rejected_count"], 1);
        assert_eq!(body["result"]["message"], "1 placed");
    }

    #[tokio::test]
    async fn container_view_includes_scene() {
        let console = console_with_backend(Some(mock_backend()), IngestConfig::default()).await;
        let http = reqwest::Client::new();

        let view: Value = http
            .get(format!("http://{console}/api/containers/contA"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(view["scene"]["skipped"], 1);
        assert_eq!(view["scene"]["boxes"][0]["center"]["x"], -45.0);
        assert_eq!(view["scene"]["boxes"][0]["hue"], 0);

        let missing = http
            .get(format!("http://{console}/api/containers/contZ"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_multipart_uploads_get_json_errors() {
        let console = console_with_backend(None, IngestConfig::default()).await;
        let response = reqwest::Client::new()
            .post(format!("http://{console}/api/uploads/items"))
            .json(&json!({ "file": "item_id\n001\n" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Invalid upload");
        assert!(body["details"].as_str().is_some_and(|d| !d.is_empty()));
    }

    #[tokio::test]
    async fn unreadable_csv_reports_parse_failure() {
        let console = console_with_backend(None, IngestConfig::default()).await;
        let part = Part::bytes(b"item_id,name\na,\xff\xfe\n".to_vec())
            .file_name("items.csv")
            .mime_str("text/csv")
            .unwrap();
        let response = reqwest::Client::new()
            .post(format!("http://{console}/api/uploads/items"))
            .multipart(Form::new().part(FILE_FIELD, part))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "CSV parse failed");
    }

    #[tokio::test]
    async fn missing_placement_route_is_a_gateway_error() {
        let console = console_with_backend(Some(Router::new()), IngestConfig::default()).await;
        let http = reqwest::Client::new();

        http.post(format!("http://{console}/api/uploads/items"))
            .multipart(csv_form("items.csv", "text/csv", ITEMS_CSV))
            .send()
            .await
            .unwrap();
        let response = http
            .post(format!("http://{console}/api/placement/submit"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Backend rejected the request");
    }

    #[tokio::test]
    async fn return_plan_view_includes_scene() {
        let console = console_with_backend(Some(mock_backend()), IngestConfig::default()).await;
        let http = reqwest::Client::new();

        let view: Value = http
            .post(format!("http://{console}/api/waste/return-plan"))
            .json(&json!({ "undocking_container_id": "contW", "max_weight": 100.0 }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(view["plan"]["container_id"], "contW");
        assert_eq!(view["scene"]["boxes"][0]["size"]["x"], 10.0);
        assert_eq!(view["scene"]["boxes"][0]["center"]["x"], -20.0);

        let invalid = http
            .post(format!("http://{console}/api/waste/return-plan"))
            .json(&json!({ "undocking_container_id": "contW", "max_weight": 0.0 }))
            .send()
            .await
            .unwrap();
        assert_eq!(invalid.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn manual_placement_rejects_out_of_range_coordinates() {
        let console = console_with_backend(None, IngestConfig::default()).await;
        let body = r#"{
            "item_id": "001",
            "timestamp": "2025-01-01T00:00:00Z",
            "container_id": "contA",
            "position": {
                "start_coordinates": { "width": 0, "depth": 0, "height": 0 },
                "end_coordinates": { "width": 1e400, "depth": 10, "height": 20 }
            }
        }"#;
        let response = reqwest::Client::new()
            .post(format!("http://{console}/api/place"))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn log_query_requires_dates() {
        let console = console_with_backend(None, IngestConfig::default()).await;
        let response = reqwest::Client::new()
            .get(format!("http://{console}/api/logs?start_date=&end_date=2025-01-01"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    }
}
