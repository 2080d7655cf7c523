use std::any::Any;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{Response, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::{ApiError, ErrorBody};
use crate::model::{Product, RecommendRequest, RecommendationResult};
use crate::recommend::Recommender;

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
pub struct AppState {
    pub recommender: Arc<Recommender>,
    pub catalog: Arc<Vec<Product>>,
}

impl AppState {
    pub fn new(recommender: Recommender, catalog: Vec<Product>) -> Self {
        Self {
            recommender: Arc::new(recommender),
            catalog: Arc::new(catalog),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/products", get(products))
        .route("/api/recommend", post(recommend))
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    search_enabled: bool,
    model_configured: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        search_enabled: state.recommender.search_enabled(),
        model_configured: state.recommender.model_configured(),
    })
}

async fn products(State(state): State<AppState>) -> Json<Vec<Product>> {
    Json(state.catalog.as_ref().clone())
}

async fn recommend(
    State(state): State<AppState>,
    payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> Result<Json<RecommendationResult>, ApiError> {
    let Json(request) = payload.map_err(|rejection| match rejection {
        // bodiless POSTs carry no content type
        JsonRejection::MissingJsonContentType(_) => {
            ApiError::BadRequest("missing query".to_string())
        }
        other => ApiError::BadRequest(other.body_text()),
    })?;

    let query = request
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing query".to_string()))?;

    let products = request
        .products
        .unwrap_or_else(|| state.catalog.as_ref().clone());

    info!(query, products = products.len(), "recommendation requested");

    let result = state
        .recommender
        .recommend(query, &products)
        .await
        .inspect_err(|e| error!(error = %e, "recommendation failed"))?;

    Ok(Json(result))
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response<axum::body::Body> {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(panic = %detail, "request handler panicked");

    let body = ErrorBody {
        error: format!("internal error: {detail}"),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
