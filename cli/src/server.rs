use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use ladle_core::db::Database;
use ladle_core::ingest::{ingest_records, parse_document};
use ladle_core::models::{Recipe, RecipePage, validate_page_request, validate_search_filter};
use ladle_core::query::{RecipeFilter, Sort};

const BODY_LIMIT: usize = 50 * 1024 * 1024; // 50 MB

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
}

impl AppState {
    fn db(&self) -> MutexGuard<'_, Database> {
        self.db
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct ListQuery {
    page: Option<i64>,
    limit: Option<i64>,
    sort_by: Option<String>,
    order: Option<String>,
}

#[derive(Deserialize)]
struct SearchQuery {
    title: Option<String>,
    cuisine: Option<String>,
    min_rating: Option<f64>,
    max_total_time: Option<i64>,
    min_calories: Option<i64>,
    max_calories: Option<i64>,
    page: Option<i64>,
    limit: Option<i64>,
    sort_by: Option<String>,
    order: Option<String>,
}

#[derive(Serialize)]
struct ImportResponse {
    records_seen: usize,
    inserted: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                tracing::error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err:#}"))
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

fn run_query(
    state: &AppState,
    filter: &RecipeFilter,
    page: Option<i64>,
    limit: Option<i64>,
    sort_by: Option<&str>,
    order: Option<&str>,
) -> Result<Json<RecipePage>, ApiError> {
    validate_search_filter(filter).map_err(|e| bad_request(&e))?;
    let page = validate_page_request(page, limit).map_err(|e| bad_request(&e))?;
    let sort = Sort::from_params(sort_by, order);

    let result = state
        .db()
        .query_recipes(filter, sort, page)
        .context("database error")?;
    Ok(Json(result))
}

async fn list_recipes(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<RecipePage>, ApiError> {
    run_query(
        &state,
        &RecipeFilter::default(),
        params.page,
        params.limit,
        params.sort_by.as_deref(),
        params.order.as_deref(),
    )
}

async fn search_recipes(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<RecipePage>, ApiError> {
    let filter = RecipeFilter {
        title: params.title,
        cuisine: params.cuisine,
        min_rating: params.min_rating,
        max_total_time: params.max_total_time,
        min_calories: params.min_calories,
        max_calories: params.max_calories,
    };
    run_query(
        &state,
        &filter,
        params.page,
        params.limit,
        params.sort_by.as_deref(),
        params.order.as_deref(),
    )
}

async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Recipe>, ApiError> {
    let recipe = state.db().get_recipe(id).context("database error")?;
    recipe
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Recipe {id} not found")))
}

async fn import_recipes(
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<ImportResponse>), ApiError> {
    let records = parse_document(&body).map_err(|e| bad_request(&e.into()))?;

    let summary = {
        let db = state.db();
        ingest_records(&db, &records).context("failed to ingest recipes")?
    };

    Ok((
        StatusCode::CREATED,
        Json(ImportResponse {
            records_seen: summary.records_seen,
            inserted: summary.inserted,
        }),
    ))
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/recipes", get(list_recipes))
        .route("/api/recipes/search", get(search_recipes))
        .route("/api/recipes/import", post(import_recipes))
        .route("/api/recipes/{id}", get(get_recipe))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(db: Database, port: u16, bind: &str) -> anyhow::Result<()> {
    let state = AppState {
        db: Arc::new(Mutex::new(db)),
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    tracing::info!("Listening on http://{bind}:{port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, shutting down");
}
