//! JSON HTTP API.
//!
//! Every user-facing action is one route; handlers validate input, call the
//! library operation and return its result as JSON.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET` `POST` | `/notebooks` | List / create notebooks |
//! | `GET` `DELETE` | `/notebooks/{id}` | Notebook view / delete |
//! | `POST` | `/notebooks/{id}/rename` | Rename a notebook |
//! | `GET` `POST` | `/notebooks/{id}/materials` | List / upload PDFs (multipart field `pdf`) |
//! | `POST` | `/materials/{id}/rename` | Change a material's display name |
//! | `DELETE` | `/materials/{id}` | Delete a material and its file |
//! | `GET` `POST` | `/notebooks/{id}/notes` | List / create notes |
//! | `GET` `POST` `DELETE` | `/notes/{id}` | Read / update / delete a note |
//! | `GET` `POST` | `/notebooks/{id}/sessions` | List / start chat sessions |
//! | `POST` | `/sessions/{id}/rename` | Rename a session |
//! | `DELETE` | `/sessions/{id}` | Delete a session and its messages |
//! | `GET` `POST` | `/notebooks/{id}/chat` | Session history / ask a question |
//! | `POST` | `/admin/reset` | Wipe the database and uploads |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Name cannot be empty!" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `internal` (500).

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::app::AppContext;
use crate::chat::{self, AskOutcome, AskRequest, ChatEntry};
use crate::config::Config;
use crate::error::NotebookError;
use crate::generate::Generator;
use crate::materials::{self, IngestReport, SkippedUpload, UploadedFile};
use crate::models::{ChatSession, Material, Note, NoteSummary, Notebook, NotebookSummary};
use crate::notebooks;
use crate::notes;
use crate::reset::{self, ClearReport};
use crate::selection::{format_selected_sources, parse_selection_str};
use crate::sessions;

/// Multipart field carrying uploaded PDFs.
const UPLOAD_FIELD: &str = "pdf";

/// Starts the HTTP server with the generator selected by `[llm]`.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let ctx = AppContext::open(config).await?;
    serve(ctx).await
}

/// Starts the HTTP server with a caller-supplied generator.
pub async fn run_server_with_generator(
    config: Config,
    generator: Arc<dyn Generator>,
) -> anyhow::Result<()> {
    let ctx = AppContext::open_with_generator(config, generator).await?;
    serve(ctx).await
}

async fn serve(ctx: AppContext) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    tokio::fs::create_dir_all(ctx.uploads_dir()).await?;
    info!(model = ctx.generator.model_name(), "answer generator ready");

    let app = router(ctx);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the route table over an opened context.
pub fn router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = ctx.config.uploads.max_upload_bytes();

    Router::new()
        .route("/health", get(handle_health))
        .route("/notebooks", get(handle_list_notebooks).post(handle_create_notebook))
        .route(
            "/notebooks/{id}",
            get(handle_notebook_view).delete(handle_delete_notebook),
        )
        .route("/notebooks/{id}/rename", post(handle_rename_notebook))
        .route(
            "/notebooks/{id}/materials",
            get(handle_list_materials).post(handle_upload),
        )
        .route("/materials/{id}/rename", post(handle_rename_material))
        .route("/materials/{id}", delete(handle_delete_material))
        .route(
            "/notebooks/{id}/notes",
            get(handle_list_notes).post(handle_create_note),
        )
        .route(
            "/notes/{id}",
            get(handle_get_note)
                .post(handle_update_note)
                .delete(handle_delete_note),
        )
        .route(
            "/notebooks/{id}/sessions",
            get(handle_list_sessions).post(handle_create_session),
        )
        .route("/sessions/{id}/rename", post(handle_rename_session))
        .route("/sessions/{id}", delete(handle_delete_session))
        .route("/notebooks/{id}/chat", get(handle_chat_view).post(handle_ask))
        .route("/admin/reset", post(handle_reset))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(ctx)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn conflict(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "conflict".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Maps domain errors to their status; everything else is a 500.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<NotebookError>() {
            Some(e @ NotebookError::Validation(_)) | Some(e @ NotebookError::InvalidSelection(_)) => {
                bad_request(e.to_string())
            }
            Some(e @ NotebookError::NotFound(_)) => not_found(e.to_string()),
            Some(e @ NotebookError::Conflict(_)) => conflict(e.to_string()),
            None => {
                error!(error = %format!("{:#}", err), "request failed");
                internal(err.to_string())
            }
        }
    }
}

impl From<NotebookError> for AppError {
    fn from(err: NotebookError) -> Self {
        anyhow::Error::from(err).into()
    }
}

type ApiResult<T> = Result<T, AppError>;

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Notebooks ============

#[derive(Serialize)]
struct NotebookListResponse {
    notebooks: Vec<NotebookSummary>,
}

async fn handle_list_notebooks(
    State(ctx): State<AppContext>,
) -> ApiResult<Json<NotebookListResponse>> {
    let notebooks = notebooks::list_notebooks(&ctx.pool).await?;
    Ok(Json(NotebookListResponse { notebooks }))
}

#[derive(Deserialize)]
struct CreateNotebookRequest {
    #[serde(default)]
    subject: String,
}

#[derive(Serialize)]
struct CreateNotebookResponse {
    message: String,
    notebook: Notebook,
}

async fn handle_create_notebook(
    State(ctx): State<AppContext>,
    Json(req): Json<CreateNotebookRequest>,
) -> ApiResult<(StatusCode, Json<CreateNotebookResponse>)> {
    let notebook = notebooks::create_notebook(&ctx.pool, &req.subject).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateNotebookResponse {
            message: format!("Notebook \"{}\" created!", notebook.subject),
            notebook,
        }),
    ))
}

#[derive(Deserialize, Default)]
struct SelectionQuery {
    #[serde(default)]
    selected_sources: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

/// Resolves a `selected_sources` query parameter; empty means every material.
async fn selection_from_query(
    ctx: &AppContext,
    notebook_id: i64,
    raw: Option<&str>,
) -> ApiResult<Vec<i64>> {
    let parsed = parse_selection_str(raw.unwrap_or(""))?;
    Ok(chat::effective_selection(&ctx.pool, notebook_id, parsed).await?)
}

#[derive(Serialize)]
struct NotebookView {
    notebook: Notebook,
    materials: Vec<Material>,
    notes: Vec<NoteSummary>,
    sessions: Vec<ChatSession>,
    selected_sources: Vec<i64>,
    /// `selected_sources` in query-parameter form.
    selected_sources_param: String,
}

async fn handle_notebook_view(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Query(query): Query<SelectionQuery>,
) -> ApiResult<Json<NotebookView>> {
    let notebook = notebooks::get_notebook(&ctx.pool, id).await?;
    let selected_sources =
        selection_from_query(&ctx, id, query.selected_sources.as_deref()).await?;
    Ok(Json(NotebookView {
        notebook,
        materials: materials::list_materials(&ctx.pool, id).await?,
        notes: notes::list_notes(&ctx.pool, id).await?,
        sessions: sessions::list_sessions(&ctx.pool, id).await?,
        selected_sources_param: format_selected_sources(&selected_sources),
        selected_sources,
    }))
}

#[derive(Deserialize)]
struct RenameNotebookRequest {
    #[serde(default)]
    name: String,
}

async fn handle_rename_notebook(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Json(req): Json<RenameNotebookRequest>,
) -> ApiResult<StatusCode> {
    notebooks::get_notebook(&ctx.pool, id).await?;
    notebooks::rename_notebook(&ctx.pool, id, &req.name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_delete_notebook(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if notebooks::delete_notebook(&ctx.pool, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Notebook not found"))
    }
}

// ============ Materials ============

#[derive(Serialize)]
struct MaterialListResponse {
    materials: Vec<Material>,
}

async fn handle_list_materials(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> ApiResult<Json<MaterialListResponse>> {
    notebooks::get_notebook(&ctx.pool, id).await?;
    let materials = materials::list_materials(&ctx.pool, id).await?;
    Ok(Json(MaterialListResponse { materials }))
}

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    materials: Vec<Material>,
    skipped: Vec<SkippedUpload>,
}

async fn handle_upload(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(e.to_string()))?;
        files.push(UploadedFile {
            file_name,
            bytes: bytes.to_vec(),
        });
    }

    let IngestReport { stored, skipped } =
        materials::ingest_uploads(&ctx.pool, ctx.uploads_dir(), id, files).await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "PDFs uploaded!".to_string(),
            materials: stored,
            skipped,
        }),
    ))
}

#[derive(Deserialize)]
struct RenameMaterialRequest {
    #[serde(default)]
    filename: String,
}

async fn handle_rename_material(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Json(req): Json<RenameMaterialRequest>,
) -> ApiResult<StatusCode> {
    materials::rename_material(&ctx.pool, id, &req.filename).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_delete_material(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    match materials::delete_material(&ctx.pool, ctx.uploads_dir(), id).await? {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(not_found("Material not found")),
    }
}

// ============ Notes ============

#[derive(Serialize)]
struct NoteListResponse {
    notes: Vec<NoteSummary>,
}

async fn handle_list_notes(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> ApiResult<Json<NoteListResponse>> {
    notebooks::get_notebook(&ctx.pool, id).await?;
    let notes = notes::list_notes(&ctx.pool, id).await?;
    Ok(Json(NoteListResponse { notes }))
}

#[derive(Deserialize, Default)]
struct NoteRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

async fn handle_create_note(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Json(req): Json<NoteRequest>,
) -> ApiResult<(StatusCode, Json<Note>)> {
    let note = notes::create_note(
        &ctx.pool,
        id,
        req.title.as_deref(),
        req.content.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(note)))
}

#[derive(Serialize)]
struct NoteResponse {
    title: String,
    content: String,
}

async fn handle_get_note(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> ApiResult<Json<NoteResponse>> {
    let note = notes::get_note(&ctx.pool, id).await?;
    Ok(Json(NoteResponse {
        title: note.title,
        content: note.content,
    }))
}

async fn handle_update_note(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Json(req): Json<NoteRequest>,
) -> ApiResult<StatusCode> {
    notes::update_note(&ctx.pool, id, req.title.as_deref(), req.content.as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_delete_note(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if notes::delete_note(&ctx.pool, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Note not found"))
    }
}

// ============ Sessions ============

#[derive(Serialize)]
struct SessionListResponse {
    sessions: Vec<ChatSession>,
}

async fn handle_list_sessions(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SessionListResponse>> {
    notebooks::get_notebook(&ctx.pool, id).await?;
    let sessions = sessions::list_sessions(&ctx.pool, id).await?;
    Ok(Json(SessionListResponse { sessions }))
}

async fn handle_create_session(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> ApiResult<(StatusCode, Json<ChatSession>)> {
    let session = sessions::create_session(&ctx.pool, id, ctx.config.chat.session_ids).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Deserialize)]
struct RenameSessionRequest {
    #[serde(default)]
    title: String,
}

async fn handle_rename_session(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Json(req): Json<RenameSessionRequest>,
) -> ApiResult<StatusCode> {
    sessions::rename_session(&ctx.pool, &id, &req.title).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_delete_session(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    sessions::delete_session(&ctx.pool, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Chat ============

#[derive(Serialize)]
struct ChatViewResponse {
    session: ChatSession,
    messages: Vec<ChatEntry>,
    sessions: Vec<ChatSession>,
    selected_sources: Vec<i64>,
    selected_sources_param: String,
}

async fn handle_chat_view(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Query(query): Query<SelectionQuery>,
) -> ApiResult<Json<ChatViewResponse>> {
    let selected_sources =
        selection_from_query(&ctx, id, query.selected_sources.as_deref()).await?;
    let view = chat::history(&ctx, id, query.session_id.as_deref()).await?;
    Ok(Json(ChatViewResponse {
        session: view.session,
        messages: view.messages,
        sessions: sessions::list_sessions(&ctx.pool, id).await?,
        selected_sources_param: format_selected_sources(&selected_sources),
        selected_sources,
    }))
}

async fn handle_ask(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Json(req): Json<AskRequest>,
) -> ApiResult<Json<AskOutcome>> {
    let outcome = chat::ask(&ctx, id, &req).await?;
    Ok(Json(outcome))
}

// ============ POST /admin/reset ============

#[derive(Serialize)]
struct ResetResponse {
    message: String,
    uploads: ClearReport,
}

async fn handle_reset(State(ctx): State<AppContext>) -> ApiResult<Json<ResetResponse>> {
    reset::reset_database(&ctx.pool).await?;
    let uploads = reset::clear_uploads(ctx.uploads_dir()).await?;
    Ok(Json(ResetResponse {
        message: "Database and uploads reset successfully!".to_string(),
        uploads,
    }))
}
