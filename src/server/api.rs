use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::stream::sse_response;
use crate::catalog::{ModuleCatalog, ModuleDescriptor};
use crate::document::{ConfigDocument, ConfigStore, stem};
use crate::errors::{ConfigError, LaunchError};
use crate::launch::{DeleteGuard, LaunchAction, LaunchCommandBuilder, LaunchRequest};
use crate::pipelines::{self, PipelineRun};
use crate::session::{ProcessOrchestrator, SessionRegistry, SessionSnapshot, SessionState};
use crate::settings::ServerSettings;
use crate::validation::{OrderingValidator, ValidationFailure};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub settings: ServerSettings,
    pub catalog: ModuleCatalog,
    pub store: ConfigStore,
    pub builder: LaunchCommandBuilder,
    pub orchestrator: ProcessOrchestrator,
}

impl AppState {
    pub fn new(settings: ServerSettings) -> Self {
        let registry = SessionRegistry::new();
        let guard = DeleteGuard::new(settings.protected_dirs());
        let orchestrator = ProcessOrchestrator::new(registry, guard, settings.pipelines_dir.clone())
            .with_poll_interval(settings.progress_poll);
        Self {
            catalog: ModuleCatalog::builtin().clone(),
            store: ConfigStore::new(settings.config_dir.clone()),
            builder: settings.launch_builder(),
            orchestrator,
            settings,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        self.orchestrator.registry()
    }
}

pub type SharedState = Arc<AppState>;

// ── Request / response payloads ───────────────────────────────────────

/// A document as the browser sends it: parallel key and value arrays.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentBody {
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub param_keys: Vec<String>,
    #[serde(default)]
    pub param_values: Vec<String>,
}

impl DocumentBody {
    fn into_document(self, source_name: &str) -> Result<ConfigDocument, ConfigError> {
        ConfigDocument::from_parallel(
            source_name,
            self.modules,
            self.param_keys,
            self.param_values,
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchBody {
    #[serde(flatten)]
    pub document: DocumentBody,
    #[serde(default)]
    pub partial_launch_arg: BTreeMap<String, String>,
    #[serde(default)]
    pub launch_action: LaunchAction,
    pub restart_project_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectExistsRequest {
    pub project_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub name: String,
    pub modules: Vec<String>,
    pub param_keys: Vec<String>,
    pub param_values: Vec<String>,
}

impl From<&ConfigDocument> for DocumentResponse {
    fn from(doc: &ConfigDocument) -> Self {
        Self {
            name: stem(doc.source_name()).to_string(),
            modules: doc.modules().to_vec(),
            param_keys: doc.param_keys(),
            param_values: doc.param_values(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedConfig {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ValidationFailure>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchResponse {
    pub run_id: String,
    pub state: SessionState,
    pub command: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectExistsResponse {
    pub exists: bool,
    pub project_name: String,
    pub project_path: PathBuf,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unprocessable(ValidationFailure),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({"error": msg})),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({"error": msg}))
            }
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, serde_json::json!({"error": msg})),
            ApiError::Unprocessable(failure) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({"error": failure.message, "validation": failure}),
            ),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({"error": msg}),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ConfigNotFound { .. } => ApiError::NotFound(err.to_string()),
            ConfigError::ReadFailed { .. } | ConfigError::WriteFailed { .. } => {
                ApiError::Internal(err.to_string())
            }
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<LaunchError> for ApiError {
    fn from(err: LaunchError) -> Self {
        match err {
            LaunchError::Validation(failure) => ApiError::Unprocessable(failure),
            LaunchError::Config(e) => e.into(),
            LaunchError::SessionBusy { .. } => ApiError::Conflict(err.to_string()),
            LaunchError::EraseFailed { .. } | LaunchError::ProcessSpawnFailure { .. } => {
                ApiError::Internal(err.to_string())
            }
            LaunchError::MissingConfigFileName
            | LaunchError::MissingRestartPath { .. }
            | LaunchError::DestructiveDeleteRefused { .. } => ApiError::BadRequest(err.to_string()),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/catalog", get(get_catalog))
        .route("/api/configs", get(list_configs))
        .route("/api/configs/{name}", get(get_config).put(put_config))
        .route("/api/validate", post(validate_config))
        .route("/api/launch", post(launch_pipeline))
        .route("/api/runs", get(list_sessions))
        .route("/api/runs/{id}", get(get_session))
        .route("/api/runs/{id}/log", get(stream_log))
        .route("/api/runs/{id}/progress", get(stream_progress))
        .route("/api/pipelines", get(list_pipelines))
        .route("/api/pipelines/exists", post(pipeline_exists))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn get_catalog(State(state): State<SharedState>) -> Json<Vec<ModuleDescriptor>> {
    Json(state.catalog.iter().cloned().collect())
}

async fn list_configs(State(state): State<SharedState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

async fn get_config(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let doc = state.store.load(&name, &state.catalog).await?;
    Ok(Json(DocumentResponse::from(&doc)))
}

async fn put_config(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(body): Json<DocumentBody>,
) -> Result<Json<SavedConfig>, ApiError> {
    let file_name = ConfigStore::file_name(&name)?;
    let doc = body.into_document(&file_name)?;
    let path = state.store.save(&doc).await?;
    Ok(Json(SavedConfig {
        name: stem(&file_name).to_string(),
        path,
    }))
}

async fn validate_config(
    State(state): State<SharedState>,
    Json(body): Json<DocumentBody>,
) -> Result<Json<ValidationReport>, ApiError> {
    let doc = body.into_document("")?;
    let report = match OrderingValidator::new(&state.catalog).validate(&doc) {
        Ok(()) => ValidationReport {
            valid: true,
            failure: None,
        },
        Err(failure) => ValidationReport {
            valid: false,
            failure: Some(failure),
        },
    };
    Ok(Json(report))
}

/// Persist, validate, build the argv, erase if asked, then spawn.
async fn launch_pipeline(
    State(state): State<SharedState>,
    Json(body): Json<LaunchBody>,
) -> Result<(StatusCode, Json<LaunchResponse>), ApiError> {
    let mut document = body.document.into_document("")?;
    let file_name = document
        .config_file_name()
        .ok_or(LaunchError::MissingConfigFileName)?;
    let file_name = ConfigStore::file_name(&file_name)?;
    document.set_source_name(file_name.as_str());
    let run_id = stem(&file_name);

    // The running tool reads this file; leave it alone while it is active.
    if state.sessions().is_active(run_id) {
        return Err(LaunchError::SessionBusy {
            run_id: run_id.to_string(),
        }
        .into());
    }

    let local_path = state.store.save(&document).await?;
    OrderingValidator::new(&state.catalog)
        .validate(&document)
        .map_err(LaunchError::from)?;

    let action = body.launch_action;
    let restart_path = body
        .restart_project_path
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| state.settings.resolve_restart_path(&p));
    if action.needs_restart_path() && restart_path.is_none() {
        return Err(LaunchError::MissingRestartPath {
            action: action.to_string(),
        }
        .into());
    }

    let config_path = state.settings.launch_config_path(&file_name, &local_path);
    let request = LaunchRequest {
        action,
        restart_path,
        document,
        passthrough: body.partial_launch_arg,
    };
    let command = state.builder.build_request(&request, Some(&config_path))?;

    let erase = match action {
        LaunchAction::EraseThenRestart => request.restart_path.as_deref(),
        _ => None,
    };
    tracing::info!(run_id, %action, "Launch requested");
    let session = state
        .orchestrator
        .launch(run_id, command.clone(), erase)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(LaunchResponse {
            run_id: run_id.to_string(),
            state: session.state(),
            command: command.argv,
        }),
    ))
}

async fn list_sessions(State(state): State<SharedState>) -> Json<Vec<SessionSnapshot>> {
    Json(state.sessions().snapshots())
}

async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state
        .sessions()
        .get(&id)
        .map(|s| Json(s.snapshot()))
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", id)))
}

/// Subscribing before a launch is allowed; the session is created idle.
async fn stream_log(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    sse_response(state.sessions().subscribe_logs(&id)).into_response()
}

async fn stream_progress(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    match state.sessions().get(&id) {
        Some(session) if session.has_launched() => {
            Ok(sse_response(session.progress().subscribe()).into_response())
        }
        _ => Err(ApiError::BadRequest("Pipeline not yet launched".to_string())),
    }
}

async fn list_pipelines(
    State(state): State<SharedState>,
) -> Result<Json<Vec<PipelineRun>>, ApiError> {
    let root = state.settings.pipelines_dir.clone();
    let runs = tokio::task::spawn_blocking(move || pipelines::list_runs(&root))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(format!("Failed to list pipelines: {}", e)))?;
    Ok(Json(runs))
}

async fn pipeline_exists(
    State(state): State<SharedState>,
    Json(req): Json<ProjectExistsRequest>,
) -> Result<Json<ProjectExistsResponse>, ApiError> {
    let file_name = ConfigStore::file_name(&req.project_name)?;
    let project_path = pipelines::project_dir(
        &state.settings.pipelines_dir,
        &file_name,
        chrono::Local::now().date_naive(),
    );
    let project_name = project_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Json(ProjectExistsResponse {
        exists: project_path.is_dir(),
        project_name,
        project_path,
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────
