//! Property Inspector - condition report extraction and property comparison server.

mod comparator;
mod config;
mod entitlement;
mod error;
mod extractor;
mod model;
mod normalizer;
mod schema;
mod service;
mod store;
#[cfg(test)]
mod testutil;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comparator::ReportComparator;
use config::AppConfig;
use entitlement::{Entitlement, ProjectView};
use error::AnalysisError;
use extractor::ReportExtractor;
use model::openrouter::OpenRouterClient;
use model::GenerativeModel;
use normalizer::{pair_declared_types, HttpFetcher, Normalizer, UploadedFile};
use schema::SavedComparison;
use service::{AnalysisOutcome, AnalysisService, ComparisonResponse, SaveComparisonRequest, Stores};
use store::memory::MemoryStore;
use store::supabase::SupabaseClient;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    service: Arc<AnalysisService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "property_inspector=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let model: Arc<dyn GenerativeModel> = Arc::new(
        OpenRouterClient::new(config.openrouter_api_key.clone()).with_model(config.model.clone()),
    );
    info!("Model backend initialized: {}", model.name());

    let stores = match &config.supabase {
        Some(supabase) => {
            let client = Arc::new(SupabaseClient::new(supabase));
            info!("Using Supabase at {}", supabase.url);
            Stores {
                projects: client.clone(),
                comparisons: client.clone(),
                entitlements: client,
            }
        }
        None => {
            warn!("SUPABASE_URL not set, projects are kept in memory only");
            let memory = Arc::new(MemoryStore::new());
            Stores {
                projects: memory.clone(),
                comparisons: memory.clone(),
                entitlements: memory,
            }
        }
    };

    let service = AnalysisService::new(
        Normalizer::new(Arc::new(HttpFetcher::new(config.fetch_user_agent.clone()))),
        ReportExtractor::new(model.clone(), config.prompt.clone()),
        ReportComparator::new(model, config.prompt.clone()),
        stores,
    );

    let state = AppState {
        service: Arc::new(service),
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/analyze", post(analyze_files))
        .route("/analyze/url", post(analyze_url))
        .route("/compare", post(compare))
        .route("/comparisons", get(list_comparisons).post(save_comparison))
        .route("/projects", get(list_projects))
        .route("/projects/:id", get(get_project))
        .route("/users/:id/entitlement", get(get_entitlement))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Run server
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Upload report files and analyse them together.
///
/// Multipart fields: `files` (repeated), `fileTypes` (JSON array of labels,
/// positional) and `userId`.
async fn analyze_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisOutcome>, AnalysisError> {
    let mut files = Vec::new();
    let mut declared_types = None;
    let mut owner = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AnalysisError::input(format!("Multipart error: {}", e)))?
    {
        match field.name() {
            Some("files") => {
                let filename = field.file_name().unwrap_or("document").to_string();
                let mime_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AnalysisError::input(format!("Failed to read file: {}", e)))?;
                files.push(UploadedFile {
                    filename,
                    mime_type,
                    bytes: bytes.to_vec(),
                    declared_type: None,
                });
            }
            Some("fileTypes") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AnalysisError::input(format!("Failed to read fileTypes: {}", e)))?;
                let types: Vec<String> = serde_json::from_str(&text)
                    .map_err(|e| AnalysisError::input(format!("Invalid fileTypes: {}", e)))?;
                declared_types = Some(types);
            }
            Some("userId") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AnalysisError::input(format!("Failed to read userId: {}", e)))?;
                owner = Some(text).filter(|t| !t.trim().is_empty());
            }
            _ => {}
        }
    }

    info!(
        "Received {} file(s) for analysis: {:?}",
        files.len(),
        files.iter().map(|f| f.filename.as_str()).collect::<Vec<_>>()
    );

    let files = pair_declared_types(files, declared_types);
    let outcome = state.service.analyze_files(owner, files).await?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeUrlRequest {
    url: String,
    user_id: Option<String>,
}

/// Analyse a public listing page.
async fn analyze_url(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeUrlRequest>,
) -> Result<Json<AnalysisOutcome>, AnalysisError> {
    let outcome = state
        .service
        .analyze_url(request.user_id, &request.url)
        .await?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompareRequest {
    #[serde(default)]
    project_ids: Vec<String>,
    user_id: Option<String>,
}

/// Compare two analysed projects.
async fn compare(
    State(state): State<AppState>,
    Json(request): Json<CompareRequest>,
) -> Result<Json<ComparisonResponse>, AnalysisError> {
    let response = state
        .service
        .compare(&request.project_ids, request.user_id.as_deref())
        .await?;
    Ok(Json(response))
}

async fn save_comparison(
    State(state): State<AppState>,
    Json(request): Json<SaveComparisonRequest>,
) -> Result<Json<SavedComparison>, AnalysisError> {
    Ok(Json(state.service.save_comparison(request).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_id: Option<String>,
}

async fn list_comparisons(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<SavedComparison>>, AnalysisError> {
    Ok(Json(
        state
            .service
            .list_comparisons(query.user_id.as_deref())
            .await?,
    ))
}

async fn list_projects(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<ProjectView>>, AnalysisError> {
    Ok(Json(
        state.service.list_projects(query.user_id.as_deref()).await?,
    ))
}

/// Get a project by ID, gated by the viewer's entitlement.
async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ProjectView>, AnalysisError> {
    Ok(Json(
        state
            .service
            .get_project(&id, query.user_id.as_deref())
            .await?,
    ))
}

async fn get_entitlement(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Entitlement>, AnalysisError> {
    Ok(Json(state.service.entitlement(&user_id).await?))
}
