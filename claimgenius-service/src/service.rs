use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
};
use claim_pipeline::{
    ClaimError, ClaimPipeline, ClaimRun, ClaimRunError, KnowledgeBase, UploadStore, looks_like_pdf,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
    config::Config,
    extractor::PdfInvoiceExtractor,
    knowledge::{DocumentKnowledgeBase, Embedder, FastEmbedder},
    llm::OpenRouterModel,
    telemetry::correlation_id_middleware,
    ui,
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn unsupported_media_error(message: &str) -> ApiError {
    (
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
        Json(json!({ "error": message })),
    )
}

fn status_for(err: &ClaimError) -> StatusCode {
    match err {
        ClaimError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ClaimError::Retrieval(_) | ClaimError::ModelInvocation(_) => StatusCode::BAD_GATEWAY,
        ClaimError::TemplateBinding { .. } | ClaimError::FileWrite { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn claim_error(err: &ClaimError) -> ApiError {
    (
        status_for(err),
        Json(json!({
            "error": err.to_string(),
            "kind": err.kind()
        })),
    )
}

fn claim_run_error(err: &ClaimRunError) -> ApiError {
    (
        status_for(&err.source),
        Json(json!({
            "error": err.source.to_string(),
            "kind": err.source.kind(),
            "failed_after": err.failed_after,
            "state": err.state,
            "partial": err.claim
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ClaimPipeline>,
    pub policy: Arc<dyn KnowledgeBase>,
    pub claim_forms: Arc<dyn KnowledgeBase>,
    pub uploads: UploadStore,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub saved_to: PathBuf,
    pub message: String,
    pub run: ClaimRun,
}

pub async fn create_app(config: &Config) -> anyhow::Result<Router> {
    let app_state = create_app_state(config).await?;
    Ok(build_router(app_state))
}

async fn create_app_state(config: &Config) -> anyhow::Result<AppState> {
    let model = Arc::new(OpenRouterModel::new(
        &config.openrouter_api_key,
        &config.model,
    ));
    let extractor = Arc::new(PdfInvoiceExtractor::new(
        &config.openrouter_api_key,
        &config.vision_model,
        config.llm_timeout,
    )?);

    let embedder: Arc<dyn Embedder> = Arc::new(FastEmbedder::new().await?);

    let policy: Arc<dyn KnowledgeBase> = Arc::new(
        DocumentKnowledgeBase::load(
            "policy",
            &config.policy_docs_dir,
            embedder.clone(),
            model.clone(),
        )
        .await?,
    );
    let claim_forms: Arc<dyn KnowledgeBase> = Arc::new(
        DocumentKnowledgeBase::load(
            "claim_forms",
            &config.claim_forms_dir,
            embedder,
            model.clone(),
        )
        .await?,
    );

    let pipeline = Arc::new(ClaimPipeline::new(extractor, policy.clone(), model));

    info!(
        model = %config.model,
        vision_model = %config.vision_model,
        upload_dir = %config.upload_dir.display(),
        "claim pipeline ready"
    );

    Ok(AppState {
        pipeline,
        policy,
        claim_forms,
        uploads: UploadStore::new(&config.upload_dir),
        max_upload_bytes: config.max_upload_bytes,
    })
}

pub fn build_router(app_state: AppState) -> Router {
    let body_limit = app_state.max_upload_bytes;

    Router::new()
        .route("/", get(ui::index))
        .route("/health", get(health_check))
        .route("/design", get(ui::design))
        .route("/policy/ask", post(ask_policy))
        .route("/claim-forms/ask", post(ask_claim_forms))
        .route("/claims", post(submit_claim))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn ask_policy(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> ApiResult<AskResponse> {
    answer_question(state.policy.as_ref(), "policy", &request.question).await
}

async fn ask_claim_forms(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> ApiResult<AskResponse> {
    answer_question(state.claim_forms.as_ref(), "claim_forms", &request.question).await
}

async fn answer_question(
    knowledge_base: &dyn KnowledgeBase,
    name: &str,
    question: &str,
) -> ApiResult<AskResponse> {
    let question = question.trim();
    if question.is_empty() {
        return Err(bad_request_error("Question is required"));
    }
    info!(knowledge_base = name, "answering question");

    match knowledge_base.query(question).await {
        Ok(answer) => Ok(Json(AskResponse { answer })),
        Err(e) => {
            error!(knowledge_base = name, error = %e, "question failed");
            Err(claim_error(&e))
        }
    }
}

async fn submit_claim(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<ClaimResponse> {
    let (file_name, bytes) = read_invoice_upload(multipart).await?;
    info!(file_name = %file_name, size = bytes.len(), "invoice received");

    if bytes.is_empty() {
        return Err(bad_request_error("Uploaded file is empty"));
    }
    if !looks_like_pdf(&bytes) {
        warn!(file_name = %file_name, "rejected non-PDF upload");
        return Err(unsupported_media_error("Only PDF invoices are accepted"));
    }

    let saved_to = state.uploads.persist(&file_name, &bytes).await.map_err(|e| {
        error!(error = %e, "failed to save upload");
        claim_error(&e)
    })?;

    match state.pipeline.run_claim(&saved_to).await {
        Ok(run) => Ok(Json(ClaimResponse {
            message: format!("File saved successfully to: {}", saved_to.display()),
            saved_to,
            run,
        })),
        Err(e) => Err(claim_run_error(&e)),
    }
}

/// Pulls the `file` field out of the form; other fields are ignored.
async fn read_invoice_upload(mut multipart: Multipart) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request_error(&e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request_error(&e.body_text()))?;
        return Ok((file_name, bytes.to_vec()));
    }
    Err(bad_request_error("Multipart field `file` is required"))
}
